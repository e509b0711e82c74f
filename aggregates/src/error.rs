use thiserror::Error;

/// Reasons an aggregate call is rejected before any kernel runs.
///
/// The kernels never report errors; every guard inside them is a silent
/// no-op. These cover malformed argument lists and calls that don't fit the
/// model they are run against.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("unknown aggregate op number {0}")]
    UnknownOp(i32),

    #[error("{op}: missing argument `{what}`")]
    MissingArgument {
        op: &'static str,
        what: &'static str,
    },

    #[error("{op}: argument `{what}` must not be negative, got {value}")]
    NegativeArgument {
        op: &'static str,
        what: &'static str,
        value: i64,
    },

    #[error("{op}: `{what}` has length {got}, expected {expected}")]
    LengthMismatch {
        op: &'static str,
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{op}: {what} row {row} out of range for a table with {rows} rows")]
    RowOutOfRange {
        op: &'static str,
        what: &'static str,
        row: usize,
        rows: usize,
    },

    #[error("{op}: invalid `{what}`: {reason}")]
    InvalidArgument {
        op: &'static str,
        what: &'static str,
        reason: String,
    },

    #[error("failed to allocate a table of {elements} elements")]
    Allocation { elements: usize },
}

pub type Result<T> = std::result::Result<T, AggregateError>;
