// Formula parsing and evaluation
//
// Grammar is deliberately small: literals, single-cell references, ranges and
// function calls. There are no infix operators.

pub mod parser;
pub mod eval;
pub mod functions;
pub mod error;

pub(crate) mod eval_helpers;

pub use error::{ErrorKind, ErrorReport, EvalOutcome, FormulaError};
pub use eval::{evaluate_formula, CellLookup, Evaluator, DEFAULT_MAX_DEPTH};
pub use eval_helpers::coerce_number;
pub use functions::{FunctionImpl, FunctionRegistry};
pub use parser::{parse, parse_expr, Expr};
