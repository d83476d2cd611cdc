pub mod formula;
pub mod profile;
pub mod recalc;
pub mod search;
pub mod sheet;
pub mod stats;

pub use formula::{evaluate_formula, CellLookup, EvalOutcome, FormulaError, FunctionRegistry};
pub use profile::{profile_columns, ColumnProfile, ColumnType};
pub use search::{apply_replacement, row_matches_query, SearchConfig, SearchMode};
pub use sheet::Sheet;
pub use stats::{compute_segment_test, SegmentTestParams, TestOptions, TestResult};
