// In-memory host grid: typed inputs plus per-cell formulas

use std::time::Instant;

use chartgrid_core::{CellAddr, OutOfBounds, Row, Value};
use rustc_hash::FxHashMap;

use crate::formula::{CellLookup, Evaluator, FormulaError, DEFAULT_MAX_DEPTH};
use crate::recalc::{CellOutcome, RecalcReport};

#[derive(Debug, Clone, PartialEq)]
enum CellInput {
    Value(Value),
    /// Formula text including the leading `=`.
    Formula(String),
}

/// A fixed-size grid. Cells not present in the map are empty.
#[derive(Debug, Clone)]
pub struct Sheet {
    rows: usize,
    cols: usize,
    cells: FxHashMap<CellAddr, CellInput>,
    max_depth: usize,
}

impl Sheet {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: FxHashMap::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build a grid from row maps. Columns follow `header`; one grid row per
    /// input row. Text values starting with `=` become formulas.
    pub fn from_rows(header: &[String], rows: &[Row]) -> Self {
        let mut sheet = Sheet::new(rows.len(), header.len());
        for (r, row) in rows.iter().enumerate() {
            for (c, key) in header.iter().enumerate() {
                let addr = CellAddr::new(r, c);
                match row.get(key) {
                    Some(Value::Text(s)) if s.trim_start().starts_with('=') => {
                        sheet.cells.insert(addr, CellInput::Formula(s.trim().to_string()));
                    }
                    Some(Value::Empty) | None => {}
                    Some(value) => {
                        sheet.cells.insert(addr, CellInput::Value(value.clone()));
                    }
                }
            }
        }
        sheet
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn check(&self, row: usize, col: usize) -> Result<CellAddr, OutOfBounds> {
        let addr = CellAddr::new(row, col);
        if addr.in_bounds(self.rows, self.cols) {
            Ok(addr)
        } else {
            Err(OutOfBounds { addr, rows: self.rows, cols: self.cols })
        }
    }

    /// Set a cell from user-typed text. A leading `=` stores a formula;
    /// anything else is classified into a typed value.
    pub fn set_input(&mut self, row: usize, col: usize, input: &str) -> Result<(), OutOfBounds> {
        let addr = self.check(row, col)?;
        let trimmed = input.trim();
        if trimmed.starts_with('=') {
            self.cells.insert(addr, CellInput::Formula(trimmed.to_string()));
        } else {
            match Value::from_input(trimmed) {
                Value::Empty => {
                    self.cells.remove(&addr);
                }
                value => {
                    self.cells.insert(addr, CellInput::Value(value));
                }
            }
        }
        Ok(())
    }

    /// Store a typed value as-is, replacing any formula.
    pub fn set_value(&mut self, row: usize, col: usize, value: Value) -> Result<(), OutOfBounds> {
        let addr = self.check(row, col)?;
        if value.is_empty() {
            self.cells.remove(&addr);
        } else {
            self.cells.insert(addr, CellInput::Value(value));
        }
        Ok(())
    }

    pub fn clear(&mut self, row: usize, col: usize) {
        self.cells.remove(&CellAddr::new(row, col));
    }

    /// Text as the user would see it in the cell editor.
    pub fn get_input(&self, row: usize, col: usize) -> String {
        match self.cells.get(&CellAddr::new(row, col)) {
            Some(CellInput::Formula(f)) => f.clone(),
            Some(CellInput::Value(v)) => chartgrid_core::format_value(v),
            None => String::new(),
        }
    }

    pub fn is_formula(&self, row: usize, col: usize) -> bool {
        matches!(self.cells.get(&CellAddr::new(row, col)), Some(CellInput::Formula(_)))
    }

    /// Evaluate formula text against this sheet.
    pub fn evaluate(&self, formula: &str) -> Result<Value, FormulaError> {
        Evaluator::new(self).with_max_depth(self.max_depth).evaluate(formula)
    }

    /// Effective value of one cell.
    pub fn evaluate_cell(&self, row: usize, col: usize) -> Result<Value, FormulaError> {
        Evaluator::new(self)
            .with_max_depth(self.max_depth)
            .evaluate_cell(CellAddr::new(row, col))
    }

    /// Formula cell addresses in row-major order.
    pub fn formula_cells(&self) -> Vec<CellAddr> {
        let mut addrs: Vec<CellAddr> = self
            .cells
            .iter()
            .filter(|(_, input)| matches!(input, CellInput::Formula(_)))
            .map(|(addr, _)| *addr)
            .collect();
        addrs.sort();
        addrs
    }

    /// Evaluate every formula cell from scratch.
    pub fn recalc(&self) -> RecalcReport {
        let start = Instant::now();
        let mut report = RecalcReport::default();

        let mut evaluator = Evaluator::new(self).with_max_depth(self.max_depth);
        for addr in self.formula_cells() {
            let result = evaluator.evaluate_cell(addr);
            report.push(CellOutcome::new(addr, result.into()));
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        log::debug!("recalc: {}", report.summary());
        report
    }
}

impl CellLookup for Sheet {
    fn get_value(&self, row: usize, col: usize) -> Value {
        match self.cells.get(&CellAddr::new(row, col)) {
            Some(CellInput::Value(v)) => v.clone(),
            _ => Value::Empty,
        }
    }

    fn get_formula(&self, row: usize, col: usize) -> Option<String> {
        match self.cells.get(&CellAddr::new(row, col)) {
            Some(CellInput::Formula(f)) => Some(f.clone()),
            _ => None,
        }
    }

    fn row_count(&self) -> usize {
        self.rows
    }

    fn col_count(&self) -> usize {
        self.cols
    }
}
