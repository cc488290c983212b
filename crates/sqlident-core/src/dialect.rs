//! SQL dialect details that matter for identity resolution.

use serde::{Deserialize, Serialize};

/// SQL dialect for generating dialect-specific SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Short lowercase name, as used in logs and config files.
    pub const fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
        }
    }

    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                let escaped = name.replace('"', "\"\"");
                format!("\"{}\"", escaped)
            }
            Dialect::Mysql => {
                let escaped = name.replace('`', "``");
                format!("`{}`", escaped)
            }
        }
    }

    /// Render an identifier, quoting it only when it is not a plain lowercase name.
    pub fn ident(self, name: &str) -> String {
        if is_plain_identifier(name) {
            name.to_string()
        } else {
            self.quote_identifier(name)
        }
    }

    /// The expression that draws the next value of a sequence inline, if the
    /// dialect has sequences.
    pub fn next_value_expr(self, sequence: &str) -> Option<String> {
        match self {
            Dialect::Postgres => Some(format!("nextval('{}')", sequence.replace('\'', "''"))),
            Dialect::Sqlite | Dialect::Mysql => None,
        }
    }

    /// The standalone scalar statement that draws the next sequence value.
    pub fn prefetch_sql(self, sequence: &str) -> Option<String> {
        self.next_value_expr(sequence)
            .map(|expr| format!("select {expr}"))
    }

    /// The session-scoped "last generated identity" function.
    pub const fn last_identity_fn(self) -> &'static str {
        match self {
            Dialect::Postgres => "lastval()",
            Dialect::Sqlite => "last_insert_rowid()",
            Dialect::Mysql => "LAST_INSERT_ID()",
        }
    }

    /// Build the predicate that locates the row the session inserted last.
    ///
    /// SQLite anchors on the rowid, so any column can be read back. The
    /// other dialects anchor on the natively generated column and return
    /// `None` when there is none.
    pub fn last_insert_anchor(self, table: &str, generated: Option<&str>) -> Option<String> {
        let table = self.ident(table);
        match self {
            Dialect::Sqlite => Some(format!("{table}.rowid = {}", self.last_identity_fn())),
            Dialect::Postgres | Dialect::Mysql => generated.map(|column| {
                format!("{table}.{} = {}", self.ident(column), self.last_identity_fn())
            }),
        }
    }
}

const RESERVED: &[&str] = &[
    "all", "and", "as", "by", "check", "column", "constraint", "default", "desc", "from",
    "group", "in", "insert", "into", "is", "key", "not", "null", "or", "order", "primary",
    "references", "select", "table", "to", "union", "unique", "user", "values", "where",
];

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !RESERVED.contains(&name)
}
