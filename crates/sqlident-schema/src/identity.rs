//! Column identity classification.
//!
//! [`classify`] decides, from schema metadata and the backend's
//! capabilities alone, where a column's value comes from when the caller
//! does not supply one. It never looks at row data and never touches a
//! connection, so a column that needs an explicit value is only rejected
//! later, when a row actually omits it.

use crate::table::{Column, Table};
use sqlident_core::Capabilities;

/// Where a column's value comes from when the caller leaves it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    /// No generator at all: every row must carry a value.
    ExplicitRequired,
    /// The backend generates the value unassisted (SERIAL, rowid, AUTO_INCREMENT).
    NativeAutoincrement,
    /// A named sequence is authoritative.
    SequenceBound,
    /// A non-sequence server default expression fills the value.
    ServerDefaultBound,
}

impl IdentityKind {
    /// Does the database produce a value for this column on its own?
    pub const fn is_generated(self) -> bool {
        !matches!(self, IdentityKind::ExplicitRequired)
    }
}

/// Classify `column` of `table` for a backend described by `caps`.
///
/// Precedence: a usable sequence, then a server default, then native
/// autoincrement. An optional sequence yields to native autoincrement when
/// the backend has it and the column qualifies.
pub fn classify(table: &Table, column: &Column, caps: &Capabilities) -> IdentityKind {
    let native = caps.has_native_autoincrement() && table.is_autoincrement_column(column);

    if let Some(sequence) = column.bound_sequence() {
        if caps.supports_sequences() {
            let kind = if sequence.is_optional() && native {
                IdentityKind::NativeAutoincrement
            } else {
                IdentityKind::SequenceBound
            };
            tracing::trace!(
                table = %table.name(),
                column = %column.name(),
                sequence = %sequence.name(),
                optional = sequence.is_optional(),
                kind = ?kind,
                "Classified sequence column"
            );
            return kind;
        }
    }

    let kind = if column.default_expr().is_some() {
        IdentityKind::ServerDefaultBound
    } else if native {
        IdentityKind::NativeAutoincrement
    } else {
        IdentityKind::ExplicitRequired
    };
    tracing::trace!(
        table = %table.name(),
        column = %column.name(),
        kind = ?kind,
        "Classified column"
    );
    kind
}

/// Columns whose values the insert path must resolve: the primary key in
/// declaration order, followed by any other column drawing from a sequence.
pub fn resolution_targets<'t>(table: &'t Table, caps: &Capabilities) -> Vec<&'t Column> {
    let mut targets: Vec<&Column> = table.primary_key().collect();
    targets.extend(table.columns().iter().filter(|c| {
        !c.is_primary_key() && classify(table, c, caps) == IdentityKind::SequenceBound
    }));
    targets
}
