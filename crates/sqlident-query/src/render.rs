//! Statement rendering.
//!
//! Turns per-row strategies into an [`ExecutionPlan`]: the prefetch queries,
//! the INSERT statements with their parameters, and how each statement's
//! generated values are read back.
//!
//! Rows of a batch are grouped by shape (rendered columns, generator terms
//! and read-back columns). A batch whose rows all share one shape becomes a
//! single statement executed with one parameter set per row. Any other
//! batch, and any batch needing a prefetch or post-read, is split into
//! single-row statements in input order.

use crate::strategy::{IdentityStrategy, InsertRequest, StrategyPlan, plan_strategies};
use sqlident_core::{
    Capabilities, ConfigError, Dialect, Error, IdentityErrorKind, Result, Value,
};
use sqlident_schema::{IdentityKind, Table};

/// A bound parameter: known now, or produced by a prefetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Value(Value),
    /// Index into [`ExecutionPlan::prefetches`].
    Prefetched(usize),
}

/// Parameters of one INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameters {
    /// Executed once.
    Single(Vec<Bound>),
    /// Executed once per parameter set (executemany).
    Many(Vec<Vec<Bound>>),
}

/// A scalar query that draws a sequence value before the insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefetch {
    pub sql: String,
    /// Input row the value belongs to.
    pub row: usize,
    /// Index into [`StrategyPlan::targets`].
    pub target: usize,
    pub column: String,
}

/// How a statement's generated primary-key values come back.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadBack {
    /// Nothing to read.
    None,
    /// The statement's returning clause yields one row per inserted row.
    /// `columns` are primary-key positions, in returning-clause order.
    Returning { columns: Vec<usize> },
    /// A follow-up query locates the row just inserted.
    PostRead {
        sql: String,
        params: Vec<Bound>,
        columns: Vec<usize>,
    },
}

/// One INSERT statement of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub sql: String,
    pub params: Parameters,
    /// Input rows covered, in parameter-set order.
    pub rows: Vec<usize>,
    pub read_back: ReadBack,
    /// Explicit-required columns sent without a value. A NOT NULL rejection
    /// of this statement is a missing identity value.
    pub unfilled: Vec<String>,
}

/// Everything the coordinator runs for one insert request, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub table: String,
    /// Primary-key column names in declaration order.
    pub primary_key: Vec<String>,
    pub prefetches: Vec<Prefetch>,
    pub statements: Vec<InsertStatement>,
    /// Per row, per primary-key column: the value already known before
    /// execution (explicit input).
    pub known: Vec<Vec<Option<Value>>>,
}

impl ExecutionPlan {
    /// SQL of every statement in execution order, post-reads included.
    pub fn sql(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.prefetches.iter().map(|p| p.sql.as_str()).collect();
        for statement in &self.statements {
            out.push(&statement.sql);
            if let ReadBack::PostRead { sql, .. } = &statement.read_back {
                out.push(sql);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Param(Bound),
    Generator(String),
}

/// One row before statements are formed.
#[derive(Debug)]
struct RowSketch {
    columns: Vec<String>,
    terms: Vec<Term>,
    returning: Vec<usize>,
    postfetch: Vec<usize>,
    unfilled: Vec<String>,
    prefetched: bool,
}

impl RowSketch {
    fn same_shape(&self, other: &RowSketch) -> bool {
        self.columns == other.columns
            && self.unfilled == other.unfilled
            && self.returning == other.returning
            && self.postfetch == other.postfetch
            && self
                .terms
                .iter()
                .zip(&other.terms)
                .all(|pair| match pair {
                    (Term::Param(_), Term::Param(_)) => true,
                    (Term::Generator(a), Term::Generator(b)) => a == b,
                    _ => false,
                })
    }

    fn params(&self) -> Vec<Bound> {
        self.terms
            .iter()
            .filter_map(|term| match term {
                Term::Param(bound) => Some(bound.clone()),
                Term::Generator(_) => None,
            })
            .collect()
    }
}

/// Select strategies and render the plan in one step.
#[allow(clippy::result_large_err)]
pub fn plan_insert(
    table: &Table,
    request: &InsertRequest,
    caps: &Capabilities,
) -> Result<ExecutionPlan> {
    let strategies = plan_strategies(table, request, caps)?;
    render(table, request, &strategies, caps)
}

/// Render an [`ExecutionPlan`] from already-selected strategies.
#[allow(clippy::result_large_err)]
pub fn render(
    table: &Table,
    request: &InsertRequest,
    strategies: &StrategyPlan,
    caps: &Capabilities,
) -> Result<ExecutionPlan> {
    let dialect = caps.dialect();
    let pk_len = strategies.primary_key_len();
    let mut prefetches = Vec::new();
    let mut sketches = Vec::with_capacity(request.len());
    let mut known = Vec::with_capacity(request.len());

    for (index, (row, row_strategies)) in request.rows().iter().zip(&strategies.rows).enumerate() {
        let mut sketch = RowSketch {
            columns: Vec::new(),
            terms: Vec::new(),
            returning: Vec::new(),
            postfetch: Vec::new(),
            unfilled: Vec::new(),
            prefetched: false,
        };
        let mut row_known = vec![None; pk_len];

        for column in table.columns() {
            let name = column.name();
            let target = strategies.targets.iter().position(|t| t.column == name);
            let Some(target) = target else {
                if let Some(value) = row.get(name) {
                    sketch.columns.push(name.to_string());
                    sketch.terms.push(Term::Param(Bound::Value(value.clone())));
                }
                continue;
            };

            let Some(strategy) = row_strategies[target] else {
                sketch.unfilled.push(name.to_string());
                continue;
            };
            match strategy {
                IdentityStrategy::ExplicitValue => {
                    let value = row.get(name).cloned().unwrap_or(Value::Null);
                    if target < pk_len {
                        row_known[target] = Some(value.clone());
                    }
                    sketch.columns.push(name.to_string());
                    sketch.terms.push(Term::Param(Bound::Value(value)));
                }
                IdentityStrategy::ClientPrefetch => {
                    let sequence = target_sequence(strategies, target, table)?;
                    let sql = dialect
                        .prefetch_sql(sequence)
                        .ok_or_else(|| no_sequence_syntax(dialect, sequence))?;
                    prefetches.push(Prefetch {
                        sql,
                        row: index,
                        target,
                        column: name.to_string(),
                    });
                    sketch.prefetched = true;
                    sketch.columns.push(name.to_string());
                    sketch
                        .terms
                        .push(Term::Param(Bound::Prefetched(prefetches.len() - 1)));
                }
                IdentityStrategy::InlineGenerator { reported } => {
                    let sequence = target_sequence(strategies, target, table)?;
                    let expr = dialect
                        .next_value_expr(sequence)
                        .ok_or_else(|| no_sequence_syntax(dialect, sequence))?;
                    sketch.columns.push(name.to_string());
                    sketch.terms.push(Term::Generator(expr));
                    if reported && target < pk_len {
                        sketch.returning.push(target);
                    }
                }
                IdentityStrategy::ServerReturning => {
                    if target < pk_len {
                        sketch.returning.push(target);
                    }
                }
                IdentityStrategy::ServerPostfetch => {
                    if target < pk_len {
                        sketch.postfetch.push(target);
                    }
                }
                IdentityStrategy::NoFetch => {}
            }
        }

        // Returning-clause order follows primary-key declaration order.
        sketch.returning.sort_unstable();
        sketches.push(sketch);
        known.push(row_known);
    }

    let homogeneous = request.is_batch()
        && sketches.iter().all(|s| !s.prefetched && s.postfetch.is_empty())
        && sketches.windows(2).all(|pair| pair[0].same_shape(&pair[1]));

    let mut statements = Vec::new();
    if homogeneous {
        let first = &sketches[0];
        statements.push(InsertStatement {
            sql: insert_sql(table, first, strategies, caps)?,
            params: Parameters::Many(sketches.iter().map(RowSketch::params).collect()),
            rows: (0..sketches.len()).collect(),
            read_back: returning_read_back(first),
            unfilled: first.unfilled.clone(),
        });
    } else {
        if request.is_batch() {
            tracing::debug!(
                table = %table.name(),
                rows = request.len(),
                "Batch rows need per-row handling; splitting into single-row statements"
            );
        }
        for (index, sketch) in sketches.iter().enumerate() {
            let read_back = if sketch.postfetch.is_empty() {
                returning_read_back(sketch)
            } else {
                post_read(table, sketch, strategies, &known[index], caps)?
            };
            statements.push(InsertStatement {
                sql: insert_sql(table, sketch, strategies, caps)?,
                params: Parameters::Single(sketch.params()),
                rows: vec![index],
                read_back,
                unfilled: sketch.unfilled.clone(),
            });
        }
    }

    for statement in &statements {
        tracing::trace!(sql = %statement.sql, rows = statement.rows.len(), "Rendered insert");
    }

    Ok(ExecutionPlan {
        table: table.name().to_string(),
        primary_key: strategies.targets[..pk_len]
            .iter()
            .map(|t| t.column.clone())
            .collect(),
        prefetches,
        statements,
        known,
    })
}

fn returning_read_back(sketch: &RowSketch) -> ReadBack {
    if sketch.returning.is_empty() {
        ReadBack::None
    } else {
        ReadBack::Returning {
            columns: sketch.returning.clone(),
        }
    }
}

#[allow(clippy::result_large_err)]
fn insert_sql(
    table: &Table,
    sketch: &RowSketch,
    strategies: &StrategyPlan,
    caps: &Capabilities,
) -> Result<String> {
    let dialect = caps.dialect();
    let table_name = dialect.ident(table.name());
    let mut sql = format!("INSERT INTO {}", table_name);

    if sketch.columns.is_empty() {
        match dialect {
            Dialect::Mysql => sql.push_str(" () VALUES ()"),
            Dialect::Postgres | Dialect::Sqlite => sql.push_str(" DEFAULT VALUES"),
        }
    } else {
        let columns: Vec<String> = sketch.columns.iter().map(|c| dialect.ident(c)).collect();
        let mut index = 0;
        let terms: Vec<String> = sketch
            .terms
            .iter()
            .map(|term| match term {
                Term::Param(_) => {
                    index += 1;
                    dialect.placeholder(index)
                }
                Term::Generator(expr) => expr.clone(),
            })
            .collect();
        sql.push_str(&format!(
            " ({}) VALUES ({})",
            columns.join(", "),
            terms.join(", ")
        ));
    }

    if !sketch.returning.is_empty() {
        if !caps.supports_returning() {
            debug_assert!(
                false,
                "returning clause planned for a backend without returning support"
            );
            return Err(Error::identity(
                IdentityErrorKind::ReturningUnsupported,
                table.name(),
                None,
                format!("{} has no returning clause enabled", dialect.name()),
            ));
        }
        let columns: Vec<String> = sketch
            .returning
            .iter()
            .map(|&t| format!("{}.{}", table_name, dialect.ident(&strategies.targets[t].column)))
            .collect();
        sql.push_str(" RETURNING ");
        sql.push_str(&columns.join(", "));
    }
    Ok(sql)
}

/// The read that follows one single-row statement. It runs right after that
/// row's insert, not after the whole batch: the anchor is the session's last
/// generated identity.
#[allow(clippy::result_large_err)]
fn post_read(
    table: &Table,
    sketch: &RowSketch,
    strategies: &StrategyPlan,
    known: &[Option<Value>],
    caps: &Capabilities,
) -> Result<ReadBack> {
    let dialect = caps.dialect();
    let table_name = dialect.ident(table.name());
    let generated = sketch
        .postfetch
        .iter()
        .map(|&t| &strategies.targets[t])
        .find(|t| t.kind == IdentityKind::NativeAutoincrement)
        .map(|t| t.column.as_str());

    let Some(anchor) = dialect.last_insert_anchor(table.name(), generated) else {
        let column = strategies.targets[sketch.postfetch[0]].column.as_str();
        return Err(Error::identity(
            IdentityErrorKind::PostfetchUnavailable,
            table.name(),
            Some(column),
            format!(
                "{} cannot locate the inserted row without a returning clause",
                dialect.name()
            ),
        ));
    };

    let mut conditions = vec![anchor];
    let mut params = Vec::new();
    let pk_len = known.len();
    for (target, value) in known.iter().enumerate() {
        let bound = match value {
            Some(value) => Bound::Value(value.clone()),
            None => match prefetched_slot(sketch, strategies, target) {
                Some(bound) => bound,
                None => continue,
            },
        };
        params.push(bound);
        conditions.push(format!(
            "{}.{} = {}",
            table_name,
            dialect.ident(&strategies.targets[target].column),
            dialect.placeholder(params.len())
        ));
    }
    debug_assert!(sketch.postfetch.iter().all(|&t| t < pk_len));

    let columns: Vec<String> = sketch
        .postfetch
        .iter()
        .map(|&t| format!("{}.{}", table_name, dialect.ident(&strategies.targets[t].column)))
        .collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        columns.join(", "),
        table_name,
        conditions.join(" AND ")
    );
    Ok(ReadBack::PostRead {
        sql,
        params,
        columns: sketch.postfetch.clone(),
    })
}

/// The prefetch slot bound for a primary-key target of this row, if any.
fn prefetched_slot(sketch: &RowSketch, strategies: &StrategyPlan, target: usize) -> Option<Bound> {
    let column = &strategies.targets[target].column;
    let position = sketch.columns.iter().position(|c| c == column)?;
    match &sketch.terms[position] {
        Term::Param(bound @ Bound::Prefetched(_)) => Some(bound.clone()),
        _ => None,
    }
}

#[allow(clippy::result_large_err)]
fn target_sequence<'p>(strategies: &'p StrategyPlan, target: usize, table: &Table) -> Result<&'p str> {
    strategies.targets[target].sequence.as_deref().ok_or_else(|| {
        Error::Config(ConfigError {
            message: format!(
                "column {}.{} draws from a sequence but none is bound",
                table.name(),
                strategies.targets[target].column
            ),
            source: None,
        })
    })
}

fn no_sequence_syntax(dialect: Dialect, sequence: &str) -> Error {
    Error::Config(ConfigError {
        message: format!(
            "{} has no sequence syntax for '{}'; disable sequence support in its capabilities",
            dialect.name(),
            sequence
        ),
        source: None,
    })
}
