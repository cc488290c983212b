//! Table reflection.
//!
//! Rebuilds a [`Table`] from the live catalog so that a reflected table
//! classifies exactly like the declared one. A column whose default draws
//! from its own sequence (SERIAL) reflects as an autoincrement column, not
//! as a sequence-bound one; the sequence stays the backend's business.

use crate::table::{AutoIncrement, Column, Table};
use asupersync::{Cx, Outcome};
use regex::Regex;
use sqlident_core::{Connection, Dialect, Error, Row, SchemaError, SchemaErrorKind, Value};
use std::sync::LazyLock;

static NEXTVAL_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^nextval\('([^']+)'(?:::regclass)?\)$").expect("valid nextval pattern")
});

/// Column metadata as read from the catalog, before it becomes a [`Column`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct CatalogColumn {
    name: String,
    sql_type: String,
    nullable: bool,
    default: Option<String>,
    primary_key: bool,
    generated: bool,
}

/// Reflects tables over a [`Connection`].
#[derive(Debug, Clone, Copy)]
pub struct Introspector {
    dialect: Dialect,
}

impl Introspector {
    /// Create a new introspector for the given dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Reflect `table_name` into a [`Table`].
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(dialect = %self.dialect.name()))]
    pub async fn reflect_table<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Table, Error> {
        let columns = match self.dialect {
            Dialect::Postgres => self.postgres_columns(cx, conn, table_name).await,
            Dialect::Sqlite => self.sqlite_columns(cx, conn, table_name).await,
            Dialect::Mysql => self.mysql_columns(cx, conn, table_name).await,
        };
        let columns = match columns {
            Outcome::Ok(columns) => columns,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        if columns.is_empty() {
            return Outcome::Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::TableNotFound,
                message: format!("table '{}' not found", table_name),
            }));
        }

        let pk_count = columns.iter().filter(|c| c.primary_key).count();
        let columns: Vec<Column> = columns
            .into_iter()
            .map(|c| into_column(c, pk_count))
            .collect();
        tracing::debug!(table = %table_name, columns = columns.len(), "Reflected table");

        match Table::new(table_name, columns) {
            Ok(table) => Outcome::Ok(table),
            Err(e) => Outcome::Err(e),
        }
    }

    async fn postgres_columns<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Vec<CatalogColumn>, Error> {
        let sql = "SELECT c.column_name, c.data_type, c.character_maximum_length, \
                   c.is_nullable, c.column_default, c.is_identity \
                   FROM information_schema.columns c \
                   WHERE c.table_name = $1 AND c.table_schema = 'public' \
                   ORDER BY c.ordinal_position";
        let params = [Value::Text(table_name.to_string())];
        let rows = match conn.query(cx, sql, &params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let pk_sql = "SELECT kcu.column_name \
                      FROM information_schema.table_constraints tc \
                      JOIN information_schema.key_column_usage kcu \
                      ON tc.constraint_name = kcu.constraint_name \
                      AND tc.table_schema = kcu.table_schema \
                      WHERE tc.table_name = $1 AND tc.table_schema = 'public' \
                      AND tc.constraint_type = 'PRIMARY KEY' \
                      ORDER BY kcu.ordinal_position";
        let pk_rows = match conn.query(cx, pk_sql, &params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let pk: Vec<String> = pk_rows
            .iter()
            .filter_map(|row| row.get_named::<String>("column_name").ok())
            .collect();

        let columns = rows
            .iter()
            .filter_map(|row| {
                let name = row.get_named::<String>("column_name").ok()?;
                let data_type = row.get_named::<String>("data_type").ok()?;
                let char_len = row
                    .get_named::<Option<i64>>("character_maximum_length")
                    .ok()
                    .flatten();
                let nullable = row.get_named::<bool>("is_nullable").unwrap_or(true);
                let default = row
                    .get_named::<Option<String>>("column_default")
                    .ok()
                    .flatten();
                let identity = row.get_named::<bool>("is_identity").unwrap_or(false);
                let serial = default
                    .as_deref()
                    .and_then(|d| NEXTVAL_DEFAULT.captures(d))
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string());
                if let Some(sequence) = &serial {
                    tracing::trace!(column = %name, sequence = %sequence, "Column draws from its own sequence");
                }
                let generated = identity || serial.is_some();

                Some(CatalogColumn {
                    primary_key: pk.contains(&name),
                    sql_type: postgres_type(&data_type, char_len),
                    nullable,
                    default: if generated { None } else { default },
                    generated,
                    name,
                })
            })
            .collect();
        Outcome::Ok(columns)
    }

    async fn sqlite_columns<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Vec<CatalogColumn>, Error> {
        let sql = format!("PRAGMA table_info({})", self.dialect.ident(table_name));
        let rows = match conn.query(cx, &sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut columns: Vec<CatalogColumn> = rows.iter().filter_map(sqlite_column).collect();
        mark_rowid_alias(&mut columns);
        Outcome::Ok(columns)
    }

    async fn mysql_columns<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Vec<CatalogColumn>, Error> {
        let sql = "SELECT column_name, column_type, is_nullable, column_default, column_key, extra \
                   FROM information_schema.columns \
                   WHERE table_name = ? AND table_schema = DATABASE() \
                   ORDER BY ordinal_position";
        let rows = match conn
            .query(cx, sql, &[Value::Text(table_name.to_string())])
            .await
        {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let columns = rows
            .iter()
            .filter_map(|row| {
                let extra = row.get_named::<String>("extra").unwrap_or_default();
                Some(CatalogColumn {
                    name: row.get_named::<String>("column_name").ok()?,
                    sql_type: row.get_named::<String>("column_type").ok()?.to_uppercase(),
                    nullable: row.get_named::<bool>("is_nullable").unwrap_or(true),
                    default: row
                        .get_named::<Option<String>>("column_default")
                        .ok()
                        .flatten(),
                    primary_key: row.get_named::<String>("column_key").ok().as_deref()
                        == Some("PRI"),
                    generated: extra.to_ascii_lowercase().contains("auto_increment"),
                })
            })
            .collect();
        Outcome::Ok(columns)
    }
}

fn sqlite_column(row: &Row) -> Option<CatalogColumn> {
    Some(CatalogColumn {
        name: row.get_named::<String>("name").ok()?,
        sql_type: row.get_named::<String>("type").ok()?,
        nullable: row.get_named::<i64>("notnull").unwrap_or(0) == 0,
        default: row.get_named::<Option<String>>("dflt_value").ok().flatten(),
        primary_key: row.get_named::<i64>("pk").unwrap_or(0) > 0,
        generated: false,
    })
}

/// A lone primary key typed exactly INTEGER aliases the rowid.
fn mark_rowid_alias(columns: &mut [CatalogColumn]) {
    let pk: Vec<usize> = (0..columns.len())
        .filter(|&i| columns[i].primary_key)
        .collect();
    if let [only] = pk[..] {
        if columns[only].sql_type.eq_ignore_ascii_case("INTEGER") {
            columns[only].generated = true;
        }
    }
}

fn into_column(info: CatalogColumn, pk_count: usize) -> Column {
    let mut column = Column::new(info.name, info.sql_type);
    if info.primary_key {
        column = column.primary_key();
    } else if !info.nullable {
        column = column.not_null();
    }
    if let Some(default) = info.default {
        column = column.server_default(default);
    }
    let autoincrement = if info.generated {
        AutoIncrement::Enabled
    } else if info.primary_key && pk_count == 1 {
        AutoIncrement::Disabled
    } else {
        AutoIncrement::Auto
    };
    column.autoincrement(autoincrement)
}

/// Map an information_schema data type back to declared type syntax.
fn postgres_type(data_type: &str, char_len: Option<i64>) -> String {
    match data_type {
        "character varying" => match char_len {
            Some(len) => format!("VARCHAR({})", len),
            None => "VARCHAR".to_string(),
        },
        "character" => match char_len {
            Some(len) => format!("CHAR({})", len),
            None => "CHAR".to_string(),
        },
        "double precision" => "DOUBLE PRECISION".to_string(),
        "timestamp without time zone" => "TIMESTAMP".to_string(),
        "timestamp with time zone" => "TIMESTAMPTZ".to_string(),
        other => other.to_uppercase(),
    }
}
