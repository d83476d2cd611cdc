// Shared data model for the tabular computation core

pub mod addr;
pub mod row;
pub mod value;

pub use addr::{col_to_letters, letters_to_col, parse_cell_ref, CellAddr, CellRange, OutOfBounds};
pub use row::Row;
pub use value::{format_value, Value};
