//! Table, column and sequence metadata.

use serde::{Deserialize, Serialize};
use sqlident_core::{Error, Result, SchemaError, SchemaErrorKind};
use std::collections::HashSet;
use std::sync::Arc;

/// Tri-state autoincrement setting of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutoIncrement {
    /// Explicitly enabled.
    Enabled,
    /// Explicitly disabled: the caller always supplies a value.
    Disabled,
    /// Not stated. Enabled for a lone integer primary key without a foreign key.
    #[default]
    Auto,
}

/// A named database sequence bound to a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    name: String,
    optional: bool,
    start: Option<i64>,
    increment: Option<i64>,
}

impl Sequence {
    /// Create a non-optional sequence.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            start: None,
            increment: None,
        }
    }

    /// Only use this sequence on backends without native autoincrement.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Set the START WITH value used by DDL.
    pub fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    /// Set the INCREMENT BY value used by DDL.
    pub fn increment(mut self, increment: i64) -> Self {
        self.increment = Some(increment);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn start_value(&self) -> Option<i64> {
        self.start
    }

    pub fn increment_value(&self) -> Option<i64> {
        self.increment
    }
}

/// Metadata about one column of a table.
///
/// Built with the chained setters below, then frozen inside a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    sql_type: String,
    primary_key: bool,
    nullable: bool,
    autoincrement: AutoIncrement,
    sequence: Option<Arc<Sequence>>,
    server_default: Option<String>,
    foreign_key: Option<String>,
}

impl Column {
    /// Create a nullable, non-key column.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            primary_key: false,
            nullable: true,
            autoincrement: AutoIncrement::Auto,
            sequence: None,
            server_default: None,
            foreign_key: None,
        }
    }

    /// Mark as part of the primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the autoincrement flag.
    pub fn autoincrement(mut self, autoincrement: AutoIncrement) -> Self {
        self.autoincrement = autoincrement;
        self
    }

    /// Bind a sequence. Accepts an owned sequence or one shared with other columns.
    pub fn sequence(mut self, sequence: impl Into<Arc<Sequence>>) -> Self {
        self.sequence = Some(sequence.into());
        self
    }

    /// Set a server-side default expression (SQL text).
    pub fn server_default(mut self, expr: impl Into<String>) -> Self {
        self.server_default = Some(expr.into());
        self
    }

    /// Reference another table's column (`"table.column"`).
    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.foreign_key = Some(target.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql_type(&self) -> &str {
        &self.sql_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn autoincrement_setting(&self) -> AutoIncrement {
        self.autoincrement
    }

    pub fn bound_sequence(&self) -> Option<&Sequence> {
        self.sequence.as_deref()
    }

    pub fn default_expr(&self) -> Option<&str> {
        self.server_default.as_deref()
    }

    pub fn foreign_key(&self) -> Option<&str> {
        self.foreign_key.as_deref()
    }

    /// Is the declared type an integer type?
    pub fn is_integer(&self) -> bool {
        let base = self
            .sql_type
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_uppercase();
        matches!(
            base.as_str(),
            "INTEGER" | "INT" | "INT4" | "INT8" | "BIGINT" | "SMALLINT" | "INT2" | "SERIAL"
                | "BIGSERIAL"
        )
    }
}

/// A table: a name plus its columns in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    /// Create a table, rejecting duplicate or empty column lists.
    #[allow(clippy::result_large_err)]
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        if columns.is_empty() {
            return Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::Invalid,
                message: format!("table '{}' has no columns", name),
            }));
        }
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::Schema(SchemaError {
                    kind: SchemaErrorKind::Invalid,
                    message: format!("table '{}' declares column '{}' twice", name, column.name),
                }));
            }
        }
        Ok(Self { name, columns })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary-key columns in declaration order.
    pub fn primary_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// Whether `column` is the table's autoincrement column.
    ///
    /// An explicit setting wins. Otherwise only a lone integer primary key
    /// without a foreign key or server default qualifies.
    pub fn is_autoincrement_column(&self, column: &Column) -> bool {
        match column.autoincrement {
            AutoIncrement::Enabled => true,
            AutoIncrement::Disabled => false,
            AutoIncrement::Auto => {
                column.primary_key
                    && self.primary_key().count() == 1
                    && column.is_integer()
                    && column.foreign_key.is_none()
                    && column.server_default.is_none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn testtable(id: Column) -> Table {
        Table::new("testtable", vec![id, Column::new("data", "VARCHAR(30)")]).unwrap()
    }

    #[test]
    fn lone_integer_pk_is_implicitly_autoincrement() {
        let table = testtable(Column::new("id", "INTEGER").primary_key());
        let id = table.column("id").unwrap();
        assert!(table.is_autoincrement_column(id));
        assert!(!table.is_autoincrement_column(table.column("data").unwrap()));
    }

    #[test]
    fn explicit_setting_wins() {
        let table = testtable(
            Column::new("id", "INTEGER")
                .primary_key()
                .autoincrement(AutoIncrement::Disabled),
        );
        assert!(!table.is_autoincrement_column(table.column("id").unwrap()));
    }

    #[test]
    fn foreign_key_pk_is_not_autoincrement() {
        let table = Table::new(
            "t2",
            vec![Column::new("id", "INTEGER").primary_key().references("t1.id")],
        )
        .unwrap();
        assert!(!table.is_autoincrement_column(table.column("id").unwrap()));
    }

    #[test]
    fn composite_pk_needs_explicit_autoincrement() {
        let table = Table::new(
            "pair",
            vec![
                Column::new("a", "INTEGER").primary_key(),
                Column::new("b", "INTEGER").primary_key(),
            ],
        )
        .unwrap();
        assert!(table.primary_key().all(|c| !table.is_autoincrement_column(c)));
        let names: Vec<_> = table.primary_key().map(Column::name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn shared_sequence_is_one_allocation() {
        let seq = Arc::new(Sequence::new("shared_seq"));
        let a = Column::new("a", "INTEGER").sequence(Arc::clone(&seq));
        let b = Column::new("b", "INTEGER").sequence(Arc::clone(&seq));
        assert_eq!(a.bound_sequence().unwrap().name(), "shared_seq");
        assert_eq!(Arc::strong_count(&seq), 3);
        drop((a, b));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = Table::new(
            "dup",
            vec![Column::new("id", "INTEGER"), Column::new("id", "TEXT")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Schema(ref e) if e.kind == SchemaErrorKind::Invalid));
    }

    #[test]
    fn integer_types_are_recognised() {
        assert!(Column::new("id", "integer").is_integer());
        assert!(Column::new("id", "BIGINT").is_integer());
        assert!(!Column::new("id", "VARCHAR(30)").is_integer());
    }
}
