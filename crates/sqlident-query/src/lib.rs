//! INSERT planning for sqlident.
//!
//! `sqlident-query` is the **planning layer**. It decides, per row and per
//! identity column, how a primary-key value is obtained, and renders the
//! statements that realize that decision.
//!
//! # Role In The Architecture
//!
//! - **Strategy selection**: `select_strategy` is the decision table;
//!   `plan_strategies` applies it to a whole `InsertRequest`.
//! - **Rendering**: `render` / `plan_insert` produce an `ExecutionPlan`
//!   of prefetch queries, INSERT statements and read-back instructions.
//!
//! Nothing here touches a connection; the plan executes through the
//! coordinator in the `sqlident` facade crate.

pub mod render;
pub mod strategy;

pub use render::{
    Bound, ExecutionPlan, InsertStatement, Parameters, Prefetch, ReadBack, plan_insert, render,
};
pub use strategy::{
    IdentityStrategy, InsertRequest, InsertRow, StatementShape, StrategyPlan, Target, Unresolved,
    plan_strategies, select_strategy,
};
