//! Schema metadata for sqlident.
//!
//! This crate provides:
//! - `Table`, `Column` and `Sequence` definitions
//! - The column identity classifier
//! - CREATE / DROP generation that agrees with the classifier
//! - Table reflection from the live catalog

pub mod ddl;
pub mod identity;
pub mod introspect;
pub mod table;

pub use ddl::{create_statements, drop_statements};
pub use identity::{IdentityKind, classify, resolution_targets};
pub use introspect::Introspector;
pub use table::{AutoIncrement, Column, Sequence, Table};

use asupersync::{Cx, Outcome};
use sqlident_core::{Capabilities, Connection, Error};

/// Create the given tables (and their sequences) in order.
pub async fn create_all<C: Connection>(
    cx: &Cx,
    conn: &C,
    tables: &[&Table],
    caps: &Capabilities,
) -> Outcome<(), Error> {
    for table in tables {
        for sql in create_statements(table, caps) {
            match conn.execute(cx, &sql, &[]).await {
                Outcome::Ok(_) => continue,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
    }
    Outcome::Ok(())
}

/// Drop the given tables (and their sequences) in reverse order.
pub async fn drop_all<C: Connection>(
    cx: &Cx,
    conn: &C,
    tables: &[&Table],
    caps: &Capabilities,
) -> Outcome<(), Error> {
    for table in tables.iter().rev() {
        for sql in drop_statements(table, caps) {
            match conn.execute(cx, &sql, &[]).await {
                Outcome::Ok(_) => continue,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
    }
    Outcome::Ok(())
}
