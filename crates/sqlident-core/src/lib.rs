//! Core types and traits for sqlident.
//!
//! This crate provides the foundational abstractions shared by the planner and
//! the execution coordinator:
//!
//! - `Capabilities` describing what a backend can do for inserts
//! - `Dialect` for parameter markers, generator syntax and post-read anchors
//! - `Value` for bound parameters and fetched identity values
//! - `Row` for result rows returned by the session
//! - `Connection` trait describing the session collaborator
//! - `Error` with the identity-resolution error kinds
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod capabilities;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod row;
pub mod value;

pub use capabilities::Capabilities;
pub use connection::Connection;
pub use dialect::Dialect;
pub use error::{
    ConfigError, ConnectionError, Error, IdentityError, IdentityErrorKind, QueryError,
    QueryErrorKind, Result, SchemaError, SchemaErrorKind, TypeError,
};
pub use row::{FromValue, Row};
pub use value::Value;
