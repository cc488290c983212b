//! Error types for sqlident operations.

use std::fmt;

/// The primary error type for all sqlident operations.
#[derive(Debug)]
pub enum Error {
    /// The session itself failed (lost or unusable connection)
    Connection(ConnectionError),
    /// Query execution errors, passed through verbatim from the session
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Schema metadata errors
    Schema(SchemaError),
    /// Configuration errors
    Config(ConfigError),
    /// Identity resolution errors
    Identity(IdentityError),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub message: String,
    pub source: Option<BoxedSource>,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<BoxedSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, not-null, foreign key)
    Constraint,
    /// Table, column or sequence not found
    NotFound,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Table not found
    TableNotFound,
    /// Column not found
    ColumnNotFound,
    /// Invalid schema definition
    Invalid,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<BoxedSource>,
}

/// An identity resolution failure for one column of an insert.
#[derive(Debug)]
pub struct IdentityError {
    pub kind: IdentityErrorKind,
    pub table: String,
    pub column: Option<String>,
    pub message: String,
    pub source: Option<Box<Error>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityErrorKind {
    /// A column with no default, no sequence and no autoincrement got no value.
    MissingIdentityValue,
    /// A prefetch or post-read query failed; the whole insert is aborted.
    SideEffectQueryFailed,
    /// A returning clause was planned for a backend that cannot return values.
    ReturningUnsupported,
    /// A post-read was needed but the dialect has nothing to anchor it on.
    PostfetchUnavailable,
    /// The session returned a different number of identity rows than were inserted.
    ResultMismatch,
}

impl IdentityErrorKind {
    /// Short, stable name of this kind for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            IdentityErrorKind::MissingIdentityValue => "missing identity value",
            IdentityErrorKind::SideEffectQueryFailed => "side-effect query failed",
            IdentityErrorKind::ReturningUnsupported => "returning unsupported",
            IdentityErrorKind::PostfetchUnavailable => "postfetch unavailable",
            IdentityErrorKind::ResultMismatch => "result mismatch",
        }
    }
}

impl IdentityError {
    /// Create an identity error for a table/column.
    pub fn new(
        kind: IdentityErrorKind,
        table: impl Into<String>,
        column: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            column: column.map(str::to_string),
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying session error.
    pub fn with_source(mut self, source: Error) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl Error {
    /// Build an identity error.
    pub fn identity(
        kind: IdentityErrorKind,
        table: impl Into<String>,
        column: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Error::Identity(IdentityError::new(kind, table, column, message))
    }

    /// The identity error kind, if this is an identity error.
    pub fn identity_kind(&self) -> Option<IdentityErrorKind> {
        match self {
            Error::Identity(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            Error::Identity(IdentityError {
                source: Some(source),
                ..
            }) => source.sqlstate(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }

    /// Is this a not-null constraint violation?
    pub fn is_not_null_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23502")
    }

    /// Is this a foreign key violation?
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23503")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Identity(e) => write!(f, "Identity error: {}", e),
        }
    }
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

fn as_source(source: Option<&BoxedSource>) -> Option<&(dyn std::error::Error + 'static)> {
    source.map(|err| &**err as &(dyn std::error::Error + 'static))
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => as_source(e.source.as_ref()),
            Error::Query(e) => as_source(e.source.as_ref()),
            Error::Config(e) => as_source(e.source.as_ref()),
            Error::Identity(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Type(_) | Error::Schema(_) => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        match &self.sqlstate {
            Some(code) => write!(f, " (SQLSTATE {code})"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}", self.expected)?;
        if let Some(column) = &self.column {
            write!(f, " in column '{column}'")?;
        }
        write!(f, ", found {}", self.actual)
    }
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.kind.as_str(), self.table)?;
        if let Some(column) = &self.column {
            write!(f, ".{column}")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

macro_rules! error_from {
    ($($payload:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$payload> for Error {
                fn from(err: $payload) -> Self {
                    Error::$variant(err)
                }
            }
        )*
    };
}

error_from! {
    ConnectionError => Connection,
    QueryError => Query,
    TypeError => Type,
    SchemaError => Schema,
    ConfigError => Config,
    IdentityError => Identity,
}

/// Result type alias for sqlident operations.
pub type Result<T> = std::result::Result<T, Error>;
