//! Cell addresses, rectangular ranges and the A1 column-letter codec.
//!
//! Internally every address is a 0-based (row, col) pair. Letters only appear
//! at the edges: parsing references typed into formulas and formatting
//! addresses back for display.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest column label accepted when parsing (ZZZ = column 18277).
const MAX_COL_LETTERS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddr {
    pub row: usize,
    pub col: usize,
}

impl CellAddr {
    #[inline]
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(&self, rows: usize, cols: usize) -> bool {
        self.row < rows && self.col < cols
    }
}

impl fmt::Display for CellAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", col_to_letters(self.col), self.row + 1)
    }
}

/// A corner of a range fell outside the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutOfBounds {
    pub addr: CellAddr,
    pub rows: usize,
    pub cols: usize,
}

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is outside the {}x{} grid", self.addr, self.rows, self.cols)
    }
}

impl std::error::Error for OutOfBounds {}

/// Inclusive axis-aligned rectangle of cells.
///
/// Corners are normalized on construction so `start` is always the
/// top-left and `end` the bottom-right, whatever order they were typed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    start: CellAddr,
    end: CellAddr,
}

impl CellRange {
    pub fn new(a: CellAddr, b: CellAddr) -> Self {
        Self {
            start: CellAddr::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellAddr::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn start(&self) -> CellAddr {
        self.start
    }

    pub fn end(&self) -> CellAddr {
        self.end
    }

    pub fn rows(&self) -> usize {
        self.end.row - self.start.row + 1
    }

    pub fn cols(&self) -> usize {
        self.end.col - self.start.col + 1
    }

    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    /// A range always holds at least one cell.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, addr: CellAddr) -> bool {
        (self.start.row..=self.end.row).contains(&addr.row)
            && (self.start.col..=self.end.col).contains(&addr.col)
    }

    /// Must be called before iterating against a concrete grid: iteration
    /// never clamps, so an out-of-grid corner is reported here instead.
    pub fn check_bounds(&self, rows: usize, cols: usize) -> Result<(), OutOfBounds> {
        for corner in [self.start, self.end] {
            if !corner.in_bounds(rows, cols) {
                return Err(OutOfBounds { addr: corner, rows, cols });
            }
        }
        Ok(())
    }

    /// Row-major iteration, columns varying fastest.
    pub fn iter(&self) -> impl Iterator<Item = CellAddr> {
        let (start, end) = (self.start, self.end);
        (start.row..=end.row)
            .flat_map(move |row| (start.col..=end.col).map(move |col| CellAddr::new(row, col)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Convert column index to letter(s): 0 -> A, 25 -> Z, 26 -> AA, etc.
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col + 1; // 1-indexed for calculation
    while n > 0 {
        n -= 1;
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    result
}

/// Convert column letters to a 0-based index (case-insensitive).
pub fn letters_to_col(letters: &str) -> Option<usize> {
    if letters.is_empty() || letters.len() > MAX_COL_LETTERS {
        return None;
    }
    let mut acc = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        acc = acc * 26 + digit;
    }
    Some(acc - 1)
}

/// Parse an A1-style reference (`B12`) into a 0-based address.
/// Rejects row 0, missing parts, trailing garbage and over-long column labels.
pub fn parse_cell_ref(s: &str) -> Option<CellAddr> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_alphabetic())?;
    let (letters, digits) = s.split_at(split);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let col = letters_to_col(letters)?;
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some(CellAddr::new(row - 1, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_col_to_letters() {
        assert_eq!(col_to_letters(0), "A");
        assert_eq!(col_to_letters(25), "Z");
        assert_eq!(col_to_letters(26), "AA");
        assert_eq!(col_to_letters(51), "AZ");
        assert_eq!(col_to_letters(702), "AAA");
        assert_eq!(col_to_letters(18277), "ZZZ");
    }

    #[test]
    fn test_letters_to_col() {
        assert_eq!(letters_to_col("A"), Some(0));
        assert_eq!(letters_to_col("z"), Some(25));
        assert_eq!(letters_to_col("AA"), Some(26));
        assert_eq!(letters_to_col("ZZZ"), Some(18277));
        assert_eq!(letters_to_col("AAAA"), None);
        assert_eq!(letters_to_col(""), None);
        assert_eq!(letters_to_col("A1"), None);
    }

    #[test]
    fn test_letters_roundtrip() {
        for col in [0, 1, 25, 26, 27, 100, 701, 702, 18277] {
            assert_eq!(letters_to_col(&col_to_letters(col)), Some(col));
        }
    }

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse_cell_ref("A1"), Some(CellAddr::new(0, 0)));
        assert_eq!(parse_cell_ref("b12"), Some(CellAddr::new(11, 1)));
        assert_eq!(parse_cell_ref("AB3"), Some(CellAddr::new(2, 27)));
        assert_eq!(parse_cell_ref("A0"), None);
        assert_eq!(parse_cell_ref("1A"), None);
        assert_eq!(parse_cell_ref("A"), None);
        assert_eq!(parse_cell_ref("A1B"), None);
        assert_eq!(parse_cell_ref("ABCD1"), None);
    }

    #[test]
    fn test_display_is_a1() {
        assert_eq!(CellAddr::new(11, 1).to_string(), "B12");
        let range = CellRange::new(CellAddr::new(2, 1), CellAddr::new(0, 0));
        assert_eq!(range.to_string(), "A1:B3");
    }

    #[test]
    fn test_range_normalizes_and_iterates_row_major() {
        let range = CellRange::new(CellAddr::new(1, 1), CellAddr::new(0, 0));
        let cells: Vec<CellAddr> = range.iter().collect();
        assert_eq!(
            cells,
            vec![
                CellAddr::new(0, 0),
                CellAddr::new(0, 1),
                CellAddr::new(1, 0),
                CellAddr::new(1, 1),
            ]
        );
        assert_eq!(range.len(), 4);
        assert!(range.contains(CellAddr::new(1, 0)));
        assert!(!range.contains(CellAddr::new(2, 0)));
    }

    #[test]
    fn test_range_bounds_check() {
        let range = CellRange::new(CellAddr::new(0, 0), CellAddr::new(4, 0));
        assert!(range.check_bounds(5, 1).is_ok());
        let err = range.check_bounds(4, 1).unwrap_err();
        assert_eq!(err.addr, CellAddr::new(4, 0));
    }
}
