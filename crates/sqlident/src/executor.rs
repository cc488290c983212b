//! Execution coordinator.
//!
//! [`InsertExecutor`] runs an [`ExecutionPlan`] over one session: every
//! prefetch first, then the INSERT statements in order, each followed by
//! its post-read when it has one. It assembles the primary key of every
//! input row from explicit input, prefetched values, returned rows and
//! post-read rows, in that order.

use asupersync::{Cx, Outcome};
use sqlident_core::{
    Capabilities, Connection, Error, IdentityError, IdentityErrorKind, Row, Value,
};
use sqlident_query::{
    Bound, ExecutionPlan, InsertRequest, InsertStatement, Parameters, ReadBack, plan_insert,
};
use sqlident_schema::Table;

/// Primary keys of the rows an insert wrote, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    primary_key: Vec<String>,
    rows: Vec<Vec<Option<Value>>>,
    statements: usize,
}

impl InsertOutcome {
    /// One tuple per input row, in primary-key declaration order.
    ///
    /// A value is `None` when it was generated but not read back (inline
    /// mode, or an unreported inline generator).
    pub fn rows(&self) -> &[Vec<Option<Value>>] {
        &self.rows
    }

    /// The first row's key: the common case of a single-row insert.
    pub fn inserted_primary_key(&self) -> Option<&[Option<Value>]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Primary-key column names, matching the tuple positions.
    pub fn primary_key_columns(&self) -> &[String] {
        &self.primary_key
    }

    /// Number of statements issued, side-effect queries included.
    pub fn statements(&self) -> usize {
        self.statements
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Vec<Option<Value>>> {
        self.rows
    }
}

/// Plans and executes inserts for one backend configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertExecutor {
    caps: Capabilities,
}

impl InsertExecutor {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Plan and run `request` against `table`.
    ///
    /// Planning errors (such as a batch needing a generator the backend
    /// cannot embed) are returned before any statement reaches the session.
    /// A key column left without a value is sent as is; the backend's NOT
    /// NULL rejection comes back as `MissingIdentityValue`.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, conn, table, request),
        fields(table = %table.name(), rows = request.len(), inline = request.is_inline())
    )]
    pub async fn insert<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table: &Table,
        request: &InsertRequest,
    ) -> Outcome<InsertOutcome, Error> {
        let plan = match plan_insert(table, request, &self.caps) {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };
        self.execute(cx, conn, &plan).await
    }

    /// Run an already-rendered plan.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, plan), fields(table = %plan.table))]
    pub async fn execute<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        plan: &ExecutionPlan,
    ) -> Outcome<InsertOutcome, Error> {
        let pk_len = plan.primary_key.len();
        let mut resolved = plan.known.clone();
        let mut issued = 0;

        let mut prefetched = Vec::with_capacity(plan.prefetches.len());
        for prefetch in &plan.prefetches {
            tracing::trace!(sql = %prefetch.sql, row = prefetch.row, "Prefetching sequence value");
            let row = match conn.query_one(cx, &prefetch.sql, &[]).await {
                Outcome::Ok(row) => row,
                Outcome::Err(e) => {
                    return Outcome::Err(side_effect_failed(
                        plan,
                        &prefetch.column,
                        "sequence prefetch failed",
                        e,
                    ));
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            issued += 1;
            let Some(value) = row.and_then(|r| r.into_values().into_iter().next()) else {
                return Outcome::Err(Error::identity(
                    IdentityErrorKind::ResultMismatch,
                    &plan.table,
                    Some(&prefetch.column),
                    "sequence prefetch returned no value",
                ));
            };
            if prefetch.target < pk_len {
                resolved[prefetch.row][prefetch.target] = Some(value.clone());
            }
            prefetched.push(value);
        }

        for statement in &plan.statements {
            tracing::trace!(sql = %statement.sql, rows = statement.rows.len(), "Executing insert");
            let returned = match &statement.params {
                Parameters::Single(params) => {
                    let params = bind(params, &prefetched);
                    if matches!(statement.read_back, ReadBack::Returning { .. }) {
                        match conn.query(cx, &statement.sql, &params).await {
                            Outcome::Ok(rows) => rows,
                            Outcome::Err(e) => {
                                return Outcome::Err(statement_failed(plan, statement, e));
                            }
                            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                            Outcome::Panicked(p) => return Outcome::Panicked(p),
                        }
                    } else {
                        match conn.execute(cx, &statement.sql, &params).await {
                            Outcome::Ok(_) => Vec::new(),
                            Outcome::Err(e) => {
                                return Outcome::Err(statement_failed(plan, statement, e));
                            }
                            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                            Outcome::Panicked(p) => return Outcome::Panicked(p),
                        }
                    }
                }
                Parameters::Many(sets) => {
                    let sets: Vec<Vec<Value>> =
                        sets.iter().map(|set| bind(set, &prefetched)).collect();
                    match conn.execute_many(cx, &statement.sql, &sets).await {
                        Outcome::Ok(rows) => rows,
                        Outcome::Err(e) => {
                            return Outcome::Err(statement_failed(plan, statement, e));
                        }
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    }
                }
            };
            issued += 1;

            match &statement.read_back {
                ReadBack::None => {}
                ReadBack::Returning { columns } => {
                    if returned.len() != statement.rows.len() {
                        return Outcome::Err(Error::identity(
                            IdentityErrorKind::ResultMismatch,
                            &plan.table,
                            None,
                            format!(
                                "returning clause produced {} rows for {} inserted",
                                returned.len(),
                                statement.rows.len()
                            ),
                        ));
                    }
                    for (&row_index, row) in statement.rows.iter().zip(&returned) {
                        fill(&mut resolved[row_index], columns, row);
                    }
                }
                ReadBack::PostRead {
                    sql,
                    params,
                    columns,
                } => {
                    let params = bind(params, &prefetched);
                    for &row_index in &statement.rows {
                        tracing::trace!(sql = %sql, row = row_index, "Reading back generated key");
                        let row = match conn.query_one(cx, sql, &params).await {
                            Outcome::Ok(row) => row,
                            Outcome::Err(e) => {
                                return Outcome::Err(side_effect_failed(
                                    plan,
                                    &plan.primary_key[columns[0]],
                                    "post-insert read failed",
                                    e,
                                ));
                            }
                            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                            Outcome::Panicked(p) => return Outcome::Panicked(p),
                        };
                        issued += 1;
                        let Some(row) = row else {
                            return Outcome::Err(Error::identity(
                                IdentityErrorKind::ResultMismatch,
                                &plan.table,
                                Some(&plan.primary_key[columns[0]]),
                                "post-insert read found no row",
                            ));
                        };
                        fill(&mut resolved[row_index], columns, &row);
                    }
                }
            }
        }

        tracing::debug!(
            rows = resolved.len(),
            statements = issued,
            "Insert complete"
        );
        Outcome::Ok(InsertOutcome {
            primary_key: plan.primary_key.clone(),
            rows: resolved,
            statements: issued,
        })
    }
}

fn bind(params: &[Bound], prefetched: &[Value]) -> Vec<Value> {
    params
        .iter()
        .map(|bound| match bound {
            Bound::Value(value) => value.clone(),
            Bound::Prefetched(slot) => prefetched.get(*slot).cloned().unwrap_or(Value::Null),
        })
        .collect()
}

fn fill(resolved: &mut [Option<Value>], columns: &[usize], row: &Row) {
    for (position, &column) in columns.iter().enumerate() {
        resolved[column] = row.get(position).cloned();
    }
}

/// A statement error, passed through unless it is the NOT NULL rejection of
/// a key column the plan left without a value.
fn statement_failed(plan: &ExecutionPlan, statement: &InsertStatement, source: Error) -> Error {
    let Some(column) = statement.unfilled.first() else {
        return source;
    };
    match &source {
        Error::Query(q) if q.is_not_null_violation() => {}
        _ => return source,
    }
    tracing::warn!(
        table = %plan.table,
        column = %column,
        sql = %statement.sql,
        "Backend rejected the insert: primary key column has no value"
    );
    Error::Identity(
        IdentityError::new(
            IdentityErrorKind::MissingIdentityValue,
            &plan.table,
            Some(column),
            "no value supplied and no default, sequence or autoincrement to generate one",
        )
        .with_source(source),
    )
}

fn side_effect_failed(plan: &ExecutionPlan, column: &str, message: &str, source: Error) -> Error {
    tracing::warn!(
        table = %plan.table,
        column = %column,
        sql = source.sql().unwrap_or_default(),
        error = %source,
        "{}", message
    );
    Error::Identity(
        IdentityError::new(
            IdentityErrorKind::SideEffectQueryFailed,
            &plan.table,
            Some(column),
            message,
        )
        .with_source(source),
    )
}
