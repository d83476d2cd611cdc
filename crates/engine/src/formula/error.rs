// Formula error taxonomy and the host-facing outcome wire shape

use chartgrid_core::{CellAddr, Value};
use serde::Serialize;
use thiserror::Error;

/// Terminal evaluation failure. No partial value accompanies an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("invalid argument list (unbalanced parentheses)")]
    InvalidArgumentList,

    #[error("invalid cell reference '{0}'")]
    InvalidCellReference(String),

    #[error("cell {0} is outside the grid")]
    CellOutOfRange(CellAddr),

    #[error("range used where a single value is expected")]
    RangeWhereScalarExpected,

    #[error("circular reference through {0}")]
    CircularReference(CellAddr),

    #[error("cannot parse expression '{0}'")]
    UnparseableExpression(String),

    #[error("reference chain deeper than {0} cells")]
    DepthLimitExceeded(usize),
}

/// Payload-free discriminant of [`FormulaError`], stable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    UnknownFunction,
    InvalidArgumentList,
    InvalidCellReference,
    CellOutOfRange,
    RangeWhereScalarExpected,
    CircularReference,
    UnparseableExpression,
    DepthLimitExceeded,
}

impl FormulaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormulaError::UnknownFunction(_) => ErrorKind::UnknownFunction,
            FormulaError::InvalidArgumentList => ErrorKind::InvalidArgumentList,
            FormulaError::InvalidCellReference(_) => ErrorKind::InvalidCellReference,
            FormulaError::CellOutOfRange(_) => ErrorKind::CellOutOfRange,
            FormulaError::RangeWhereScalarExpected => ErrorKind::RangeWhereScalarExpected,
            FormulaError::CircularReference(_) => ErrorKind::CircularReference,
            FormulaError::UnparseableExpression(_) => ErrorKind::UnparseableExpression,
            FormulaError::DepthLimitExceeded(_) => ErrorKind::DepthLimitExceeded,
        }
    }

    /// Short code shown inline in the offending cell.
    pub fn code(&self) -> &'static str {
        match self {
            FormulaError::UnknownFunction(_) => "#NAME?",
            FormulaError::InvalidArgumentList => "#ARGS!",
            FormulaError::InvalidCellReference(_) | FormulaError::CellOutOfRange(_) => "#REF!",
            FormulaError::RangeWhereScalarExpected => "#VALUE!",
            FormulaError::CircularReference(_) => "#CIRC!",
            FormulaError::UnparseableExpression(_) => "#PARSE!",
            FormulaError::DepthLimitExceeded(_) => "#DEPTH!",
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            code: self.code(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
}

/// `{ "value": ... }` or `{ "error": { kind, code, message } }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EvalOutcome {
    Value { value: Value },
    Error { error: ErrorReport },
}

impl From<Result<Value, FormulaError>> for EvalOutcome {
    fn from(result: Result<Value, FormulaError>) -> Self {
        match result {
            Ok(value) => EvalOutcome::Value { value },
            Err(e) => EvalOutcome::Error { error: e.report() },
        }
    }
}
