//! Backend capability descriptor.
//!
//! [`Capabilities`] is plain configuration: it is built once per target (or
//! per session) and handed by reference to the classifier and the strategy
//! selector. It is `Copy` and holds no shared state, so two descriptors for
//! the same backend, one with the returning clause enabled and one without,
//! can be used side by side in one process.

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{ConfigError, Error, Result};

/// What a backend can do when an INSERT needs a generated primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    dialect: Dialect,
    supports_returning: bool,
    supports_sequences: bool,
    supports_inline_generator_expressions: bool,
    native_autoincrement: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::postgres()
    }
}

impl Capabilities {
    /// PostgreSQL: RETURNING, sequences, `nextval()` inline, SERIAL columns.
    pub const fn postgres() -> Self {
        Self {
            dialect: Dialect::Postgres,
            supports_returning: true,
            supports_sequences: true,
            supports_inline_generator_expressions: true,
            native_autoincrement: true,
        }
    }

    /// SQLite: RETURNING (3.35+), no sequences, rowid autoincrement.
    pub const fn sqlite() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            supports_returning: true,
            supports_sequences: false,
            supports_inline_generator_expressions: false,
            native_autoincrement: true,
        }
    }

    /// MySQL: no RETURNING, no sequences, AUTO_INCREMENT columns.
    pub const fn mysql() -> Self {
        Self {
            dialect: Dialect::Mysql,
            supports_returning: false,
            supports_sequences: false,
            supports_inline_generator_expressions: false,
            native_autoincrement: true,
        }
    }

    /// Preset descriptor for a dialect.
    pub const fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Postgres => Self::postgres(),
            Dialect::Sqlite => Self::sqlite(),
            Dialect::Mysql => Self::mysql(),
        }
    }

    /// Load a descriptor from JSON, e.g.
    /// `{"dialect": "postgres", "supports_returning": false}`.
    ///
    /// Missing flags take the postgres preset values.
    pub fn from_json(json: &str) -> Result<Self> {
        let caps: Self = serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid capability descriptor: {e}"),
                source: Some(Box::new(e)),
            })
        })?;
        tracing::debug!(
            dialect = caps.dialect.name(),
            returning = caps.supports_returning,
            sequences = caps.supports_sequences,
            inline_generators = caps.supports_inline_generator_expressions,
            "Loaded capability descriptor"
        );
        Ok(caps)
    }

    /// Enable or disable the value-returning insert clause.
    pub const fn implicit_returning(mut self, enabled: bool) -> Self {
        self.supports_returning = enabled;
        self
    }

    /// Enable or disable sequence support.
    pub const fn sequences(mut self, enabled: bool) -> Self {
        self.supports_sequences = enabled;
        self
    }

    /// Enable or disable generator expressions inside VALUES.
    pub const fn inline_generators(mut self, enabled: bool) -> Self {
        self.supports_inline_generator_expressions = enabled;
        self
    }

    /// Declare whether the backend generates integer keys on its own.
    pub const fn native_autoincrement(mut self, enabled: bool) -> Self {
        self.native_autoincrement = enabled;
        self
    }

    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub const fn supports_returning(&self) -> bool {
        self.supports_returning
    }

    pub const fn supports_sequences(&self) -> bool {
        self.supports_sequences
    }

    pub const fn supports_inline_generator_expressions(&self) -> bool {
        self.supports_inline_generator_expressions
    }

    pub const fn has_native_autoincrement(&self) -> bool {
        self.native_autoincrement
    }
}
