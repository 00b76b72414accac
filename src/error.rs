//! Typed precondition errors.
//!
//! Version mismatches, duplicate inserts and argument misuse are normal
//! outcomes of tree operations, not faults: callers are expected to branch
//! on them. They are modeled as a small enum carried inside the `eyre`
//! report chain so that the rest of the crate keeps the plain `eyre::Result`
//! flow while callers can still match precisely.
//!
//! Store I/O failures stay untyped (whatever the engine reports, wrapped
//! with context). Invariant violations do not appear here at all: they
//! indicate corruption and panic at the point of discovery.

use thiserror::Error;

/// Recoverable, caller-visible failure of a tree operation.
///
/// No tree or store state changes when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Insert-only put on a key that already holds a value.
    #[error("key already in use")]
    AlreadyExists,

    /// Compare-and-set expectation did not match the stored version.
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: i64, found: i64 },

    /// The key (or its value) does not exist.
    #[error("key not found")]
    NotFound,

    /// Malformed request: empty key, reserved prefix misuse, zero limit.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl TreeError {
    /// Extracts the typed error from an `eyre` report, if this report
    /// carries one.
    pub fn from_report(report: &eyre::Report) -> Option<&TreeError> {
        report.downcast_ref::<TreeError>()
    }
}
