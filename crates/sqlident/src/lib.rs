//! sqlident - primary-key identity resolution for SQL INSERT statements.
//!
//! Given a table whose primary key may be client-supplied, sequence-generated
//! or generated by the server, sqlident decides per row and per column how
//! to obtain the key, renders the INSERT accordingly and reports the key of
//! every inserted row:
//!
//! - Capability descriptors per backend (`Capabilities`)
//! - Column identity classification from schema metadata
//! - Strategy selection for single rows and batches
//! - Statement rendering with prefetch, inline generator, returning and
//!   post-read variants
//! - An execution coordinator over any `Connection`
//! - DDL generation and table reflection
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlident::prelude::*;
//!
//! async fn example(cx: &Cx, conn: &impl Connection) -> Outcome<(), Error> {
//!     let caps = Capabilities::postgres();
//!     let table = Table::new(
//!         "testtable",
//!         vec![
//!             Column::new("id", "INTEGER").primary_key().sequence(Sequence::new("my_seq")),
//!             Column::new("data", "VARCHAR(30)"),
//!         ],
//!     )?;
//!
//!     create_all(cx, conn, &[&table], &caps).await?;
//!
//!     // select nextval('my_seq'), then INSERT with the fetched id
//!     let outcome = insert(cx, conn, &caps, &table, vec![InsertRow::new().with("data", "d1")], false)
//!         .await?;
//!     println!("{:?}", outcome.inserted_primary_key());
//!     Outcome::Ok(())
//! }
//! ```

pub mod executor;

pub use asupersync::{Cx, Outcome};

pub use sqlident_core::{
    Capabilities, ConfigError, Connection, ConnectionError, Dialect, Error, FromValue,
    IdentityError, IdentityErrorKind, QueryError, QueryErrorKind, Result, Row, SchemaError,
    SchemaErrorKind, Value,
};
pub use sqlident_query::{
    ExecutionPlan, IdentityStrategy, InsertRequest, InsertRow, ReadBack, StatementShape,
    Unresolved, plan_insert, plan_strategies, select_strategy,
};
pub use sqlident_schema::{
    AutoIncrement, Column, IdentityKind, Introspector, Sequence, Table, classify, create_all,
    create_statements, drop_all, drop_statements,
};

pub use executor::{InsertExecutor, InsertOutcome};

/// Insert `rows` into `table` and report each row's primary key.
///
/// `inline` declines any read-back: generated values are left unreported.
pub async fn insert<C: Connection>(
    cx: &Cx,
    conn: &C,
    caps: &Capabilities,
    table: &Table,
    rows: Vec<InsertRow>,
    inline: bool,
) -> Outcome<InsertOutcome, Error> {
    let request = InsertRequest::new(rows).inline(inline);
    InsertExecutor::new(*caps)
        .insert(cx, conn, table, &request)
        .await
}

/// Reflect a table from the live catalog of the backend `caps` describes.
pub async fn reflect_table<C: Connection>(
    cx: &Cx,
    conn: &C,
    caps: &Capabilities,
    name: &str,
) -> Outcome<Table, Error> {
    Introspector::new(caps.dialect())
        .reflect_table(cx, conn, name)
        .await
}

/// Commonly used items.
pub mod prelude {
    pub use crate::{
        AutoIncrement, Capabilities, Column, Connection, Cx, Dialect, Error, IdentityErrorKind,
        InsertExecutor, InsertOutcome, InsertRequest, InsertRow, Outcome, Result, Row, Sequence,
        Table, Value, create_all, drop_all, insert, reflect_table,
    };
}
