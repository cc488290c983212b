//! CREATE / DROP statement generation for declared tables.
//!
//! The generated column types follow the identity classification, so a
//! table created here reflects back to the same identity kinds.

use crate::identity::{IdentityKind, classify};
use crate::table::{Column, Table};
use sqlident_core::{Capabilities, Dialect};

/// Statements that create `table` and the sequences it uses, in execution order.
pub fn create_statements(table: &Table, caps: &Capabilities) -> Vec<String> {
    let dialect = caps.dialect();
    tracing::debug!(
        dialect = %dialect.name(),
        table = %table.name(),
        columns = table.columns().len(),
        "Generating CREATE TABLE DDL"
    );

    let mut statements: Vec<String> = used_sequences(table, caps)
        .into_iter()
        .map(|column| create_sequence(column, dialect))
        .collect();

    let lone_pk = table.primary_key().count() == 1;
    let mut parts = Vec::new();
    for column in table.columns() {
        let kind = classify(table, column, caps);
        let rowid_alias = lone_pk && column.is_primary_key();
        parts.push(format!(
            "  {}",
            format_column_def(column, kind, rowid_alias, dialect)
        ));
    }

    let pk: Vec<String> = table
        .primary_key()
        .map(|c| dialect.ident(c.name()))
        .collect();
    if !pk.is_empty() {
        parts.push(format!("  PRIMARY KEY ({})", pk.join(", ")));
    }

    for column in table.columns() {
        if let Some(target) = column.foreign_key() {
            parts.push(format!("  {}", format_fk_constraint(column, target, dialect)));
        }
    }

    let sql = format!(
        "CREATE TABLE {} (\n{}\n)",
        dialect.ident(table.name()),
        parts.join(",\n")
    );
    tracing::trace!(sql = %sql, "Generated CREATE TABLE statement");
    statements.push(sql);
    statements
}

/// Statements that drop `table` and then its sequences.
pub fn drop_statements(table: &Table, caps: &Capabilities) -> Vec<String> {
    let dialect = caps.dialect();
    tracing::debug!(table = %table.name(), "Generating DROP TABLE DDL");
    let mut statements = vec![format!("DROP TABLE {}", dialect.ident(table.name()))];
    for column in used_sequences(table, caps) {
        if let Some(sequence) = column.bound_sequence() {
            statements.push(format!("DROP SEQUENCE {}", dialect.ident(sequence.name())));
        }
    }
    statements
}

/// Columns whose bound sequence is in use on this backend, without
/// repeating a sequence shared between columns.
fn used_sequences<'t>(table: &'t Table, caps: &Capabilities) -> Vec<&'t Column> {
    let mut seen: Vec<&str> = Vec::new();
    let mut columns = Vec::new();
    for column in table.columns() {
        let Some(sequence) = column.bound_sequence() else {
            continue;
        };
        if classify(table, column, caps) != IdentityKind::SequenceBound
            || seen.contains(&sequence.name())
        {
            continue;
        }
        seen.push(sequence.name());
        columns.push(column);
    }
    columns
}

fn create_sequence(column: &Column, dialect: Dialect) -> String {
    let mut sql = String::from("CREATE SEQUENCE ");
    if let Some(sequence) = column.bound_sequence() {
        sql.push_str(&dialect.ident(sequence.name()));
        if let Some(increment) = sequence.increment_value() {
            sql.push_str(&format!(" INCREMENT BY {}", increment));
        }
        if let Some(start) = sequence.start_value() {
            sql.push_str(&format!(" START WITH {}", start));
        }
    }
    sql
}

fn format_column_def(
    column: &Column,
    kind: IdentityKind,
    rowid_alias: bool,
    dialect: Dialect,
) -> String {
    let name = dialect.ident(column.name());
    let native = kind == IdentityKind::NativeAutoincrement;

    let sql_type = match dialect {
        Dialect::Postgres if native => {
            if column.sql_type().eq_ignore_ascii_case("BIGINT") {
                "BIGSERIAL".to_string()
            } else {
                "SERIAL".to_string()
            }
        }
        // The rowid alias only applies to the exact type name INTEGER.
        Dialect::Sqlite if native => "INTEGER".to_string(),
        // A lone INTEGER key would alias the rowid and generate values anyway.
        Dialect::Sqlite if rowid_alias && column.sql_type().eq_ignore_ascii_case("INTEGER") => {
            "INT".to_string()
        }
        _ => column.sql_type().to_string(),
    };

    let mut def = format!("{} {}", name, sql_type);
    if let Some(default) = column.default_expr() {
        def.push_str(&format!(" DEFAULT {}", default));
    }
    if !column.is_nullable() {
        def.push_str(" NOT NULL");
    }
    if native && dialect == Dialect::Mysql {
        def.push_str(" AUTO_INCREMENT");
    }
    def
}

fn format_fk_constraint(column: &Column, target: &str, dialect: Dialect) -> String {
    let (table, referenced) = target.split_once('.').unwrap_or((target, column.name()));
    format!(
        "FOREIGN KEY({}) REFERENCES {} ({})",
        dialect.ident(column.name()),
        dialect.ident(table),
        dialect.ident(referenced)
    )
}
