//! The session collaborator.
//!
//! [`Connection`] is the only way the execution coordinator talks to a
//! database. Transaction management, pooling and the wire protocol all live
//! behind it; sqlident only issues statements over one session at a time.
//!
//! All operations integrate with asupersync's structured concurrency via `Cx`
//! context, so cancellation and timeouts are owned by the session.

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// A database session capable of executing the statements an insert plan needs.
///
/// Implementations must be `Send + Sync` for use across async boundaries.
///
/// # Example
///
/// ```rust,ignore
/// // Scalar side-effect query (sequence prefetch)
/// let row = conn.query_one(&cx, "select nextval('my_seq')", &[]).await?;
///
/// // executemany: one statement, one parameter set per row
/// conn.execute_many(&cx, "INSERT INTO t (data) VALUES ($1)", &[
///     vec![Value::Text("d5".into())],
///     vec![Value::Text("d6".into())],
/// ]).await?;
/// ```
pub trait Connection: Send + Sync {
    /// Execute a statement and return all rows it produces.
    ///
    /// Used for single-row inserts carrying a returning clause.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a query and return the first row, if any.
    ///
    /// Used for scalar side-effect queries: sequence prefetch and post-reads.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send;

    /// Execute a statement and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Execute one statement once per parameter set, in order.
    ///
    /// Returns the rows produced by a returning clause, one per parameter set
    /// in parameter-set order; statements without a returning clause yield an
    /// empty vector.
    fn execute_many(
        &self,
        cx: &Cx,
        sql: &str,
        param_sets: &[Vec<Value>],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;
}
