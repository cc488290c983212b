//! Identity strategy selection.
//!
//! [`select_strategy`] is the decision table for one row-column; it is a
//! pure, total function of the column's [`IdentityKind`], whether the caller
//! supplied a value, the statement shape and the backend capabilities.
//! [`plan_strategies`] applies it to every row of an [`InsertRequest`].

use sqlident_core::{
    Capabilities, ConfigError, Error, Result, SchemaError, SchemaErrorKind, Value,
};
use sqlident_schema::{IdentityKind, Table, classify, resolution_targets};

/// One row of an insert: column name to value, in the order given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertRow {
    values: Vec<(String, Value)>,
}

impl InsertRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a column value.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Add or replace a column value in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.values.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
    }

    /// The value supplied for `column`, if any.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Supplied column names in the order given.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for InsertRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = InsertRow::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

/// The rows of one insert, plus whether generated values may be read back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertRequest {
    rows: Vec<InsertRow>,
    inline: bool,
}

impl InsertRequest {
    /// Create a request for `rows`; more than one row makes it a batch.
    pub fn new(rows: impl IntoIterator<Item = InsertRow>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
            inline: false,
        }
    }

    /// Create a single-row request.
    pub fn single(row: InsertRow) -> Self {
        Self::new([row])
    }

    /// Inline mode: never read generated values back, even when possible.
    pub fn inline(mut self, inline: bool) -> Self {
        self.inline = inline;
        self
    }

    pub fn rows(&self) -> &[InsertRow] {
        &self.rows
    }

    pub fn is_inline(&self) -> bool {
        self.inline
    }

    /// Is more than one row submitted together?
    pub fn is_batch(&self) -> bool {
        self.rows.len() > 1
    }

    pub fn shape(&self) -> StatementShape {
        if self.is_batch() {
            StatementShape::Batch
        } else {
            StatementShape::Single
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Single-row or multi-row request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementShape {
    Single,
    Batch,
}

/// How one column of one row gets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityStrategy {
    /// The caller supplied it; bound as a parameter and reported verbatim.
    ExplicitValue,
    /// A scalar query draws the next sequence value before the insert.
    ClientPrefetch,
    /// The sequence call is embedded in VALUES. `reported` means the value
    /// comes back through the returning clause.
    InlineGenerator { reported: bool },
    /// The insert itself returns the generated value.
    ServerReturning,
    /// A separate read after the insert retrieves the generated value.
    ServerPostfetch,
    /// Generated but never retrieved (inline mode).
    NoFetch,
}

impl IdentityStrategy {
    /// Will the generated or supplied value appear in the outcome?
    pub const fn is_reported(self) -> bool {
        match self {
            IdentityStrategy::ExplicitValue
            | IdentityStrategy::ClientPrefetch
            | IdentityStrategy::ServerReturning
            | IdentityStrategy::ServerPostfetch => true,
            IdentityStrategy::InlineGenerator { reported } => reported,
            IdentityStrategy::NoFetch => false,
        }
    }
}

/// Why no strategy applies to a row-column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// The column needs an explicit value and none was supplied. The row is
    /// still sent; the backend's NOT NULL constraint rejects it.
    MissingValue,
    /// A batch or inline insert needs the sequence call inside VALUES, but
    /// the backend cannot embed generator expressions.
    GeneratorNotEmbeddable,
}

/// Pick the strategy for one row-column.
pub fn select_strategy(
    kind: IdentityKind,
    supplied: bool,
    shape: StatementShape,
    inline: bool,
    caps: &Capabilities,
) -> std::result::Result<IdentityStrategy, Unresolved> {
    if supplied {
        return Ok(IdentityStrategy::ExplicitValue);
    }
    let strategy = match kind {
        IdentityKind::ExplicitRequired => return Err(Unresolved::MissingValue),
        IdentityKind::NativeAutoincrement | IdentityKind::ServerDefaultBound => {
            if inline {
                IdentityStrategy::NoFetch
            } else if caps.supports_returning() {
                IdentityStrategy::ServerReturning
            } else {
                IdentityStrategy::ServerPostfetch
            }
        }
        IdentityKind::SequenceBound => match (shape, inline) {
            (StatementShape::Single, false) => IdentityStrategy::ClientPrefetch,
            _ if caps.supports_inline_generator_expressions() => {
                IdentityStrategy::InlineGenerator {
                    reported: !inline && caps.supports_returning(),
                }
            }
            // Prefetch is single-row only, and inline mode never prefetches.
            _ => return Err(Unresolved::GeneratorNotEmbeddable),
        },
    };
    Ok(strategy)
}

/// A column whose value the insert path resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub column: String,
    pub kind: IdentityKind,
    pub sequence: Option<String>,
    pub primary_key: bool,
}

/// Strategies for every row of a request.
///
/// `targets` lists the primary key in declaration order first, then any
/// other sequence-bound column; `rows[i][t]` is the strategy of target `t`
/// in row `i`, or `None` when the row supplies no value for an
/// explicit-required column.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyPlan {
    pub targets: Vec<Target>,
    pub rows: Vec<Vec<Option<IdentityStrategy>>>,
}

impl StrategyPlan {
    /// Number of primary-key targets (they come first).
    pub fn primary_key_len(&self) -> usize {
        self.targets.iter().take_while(|t| t.primary_key).count()
    }

    /// Strategy of `column` in `row`, if the column is a target.
    pub fn strategy(&self, row: usize, column: &str) -> Option<IdentityStrategy> {
        let index = self.targets.iter().position(|t| t.column == column)?;
        self.rows.get(row).and_then(|r| r.get(index)).copied().flatten()
    }
}

/// Select strategies for every row of `request`.
///
/// A row that omits an explicit-required column is still planned; the
/// column is left out of the statement and the backend decides. Batch and
/// inline inserts into a sequence-bound column fail with a configuration
/// error when the backend cannot embed generator calls.
#[allow(clippy::result_large_err)]
pub fn plan_strategies(
    table: &Table,
    request: &InsertRequest,
    caps: &Capabilities,
) -> Result<StrategyPlan> {
    for (index, row) in request.rows().iter().enumerate() {
        if let Some(unknown) = row.columns().find(|c| table.column(c).is_none()) {
            return Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::ColumnNotFound,
                message: format!(
                    "row {} names unknown column '{}' of table '{}'",
                    index,
                    unknown,
                    table.name()
                ),
            }));
        }
    }

    let targets: Vec<Target> = resolution_targets(table, caps)
        .into_iter()
        .map(|column| {
            let kind = classify(table, column, caps);
            Target {
                column: column.name().to_string(),
                kind,
                sequence: match kind {
                    IdentityKind::SequenceBound => {
                        column.bound_sequence().map(|s| s.name().to_string())
                    }
                    _ => None,
                },
                primary_key: column.is_primary_key(),
            }
        })
        .collect();

    let shape = request.shape();
    let inline = request.is_inline();
    if shape == StatementShape::Batch && caps.supports_inline_generator_expressions() {
        for target in targets.iter().filter(|t| t.kind == IdentityKind::SequenceBound) {
            tracing::debug!(
                table = %table.name(),
                column = %target.column,
                rows = request.len(),
                "Batch cannot prefetch per row; drawing sequence values inline"
            );
        }
    }

    let mut rows = Vec::with_capacity(request.len());
    for row in request.rows() {
        let mut strategies = Vec::with_capacity(targets.len());
        for target in &targets {
            let supplied = row.get(&target.column).is_some_and(|value| {
                !value.is_null() || target.kind == IdentityKind::ExplicitRequired
            });
            match select_strategy(target.kind, supplied, shape, inline, caps) {
                Ok(strategy) => strategies.push(Some(strategy)),
                Err(Unresolved::MissingValue) => {
                    tracing::warn!(
                        table = %table.name(),
                        column = %target.column,
                        "Column is marked as a member of the primary key but has no \
                         client-side or server-side default generator, and no value was supplied"
                    );
                    strategies.push(None);
                }
                Err(Unresolved::GeneratorNotEmbeddable) => {
                    return Err(Error::Config(ConfigError {
                        message: format!(
                            "{}.{} draws from sequence '{}', but {} inserts need the \
                             generator call inside VALUES and the backend cannot embed it",
                            table.name(),
                            target.column,
                            target.sequence.as_deref().unwrap_or_default(),
                            if inline { "inline" } else { "batch" }
                        ),
                        source: None,
                    }));
                }
            }
        }
        rows.push(strategies);
    }

    Ok(StrategyPlan { targets, rows })
}
