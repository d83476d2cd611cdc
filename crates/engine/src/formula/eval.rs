// Formula evaluator - resolves references recursively against a read-only grid
//
// Cycle detection is scoped to the current resolution path: a cell is marked
// while its own formula is being evaluated and unmarked when it finishes, so
// the same cell may appear any number of times in a formula tree as long as
// it is never its own ancestor. Finished cells are memoized per evaluator;
// a result only depends on the path when the depth limit cut it short, and
// those results are never stored.

use chartgrid_core::{CellAddr, CellRange, Value};
use rustc_hash::{FxHashMap, FxHashSet};

use super::error::FormulaError;
use super::functions::{FunctionRegistry, DEFAULT_REGISTRY};
use super::parser::{extract_cell_refs, parse_expr, Expr};

/// Nested formula resolutions allowed before giving up on a reference chain.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Read-only view of the grid for the duration of one evaluation.
pub trait CellLookup {
    /// Raw value of a plain cell. Formula cells have no independent raw value.
    fn get_value(&self, row: usize, col: usize) -> Value;

    /// The cell's formula text (starting with `=`), or None for a plain value.
    fn get_formula(&self, row: usize, col: usize) -> Option<String>;

    fn row_count(&self) -> usize;

    fn col_count(&self) -> usize;
}

/// Evaluate formula text against a grid using the built-in function registry.
///
/// Text that does not start with `=` is not a formula; it is classified as a
/// plain typed value instead.
pub fn evaluate_formula(formula: &str, lookup: &dyn CellLookup) -> Result<Value, FormulaError> {
    Evaluator::new(lookup).evaluate(formula)
}

pub struct Evaluator<'a> {
    lookup: &'a dyn CellLookup,
    registry: &'a FunctionRegistry,
    visiting: FxHashSet<CellAddr>,
    finished: FxHashMap<CellAddr, Result<Value, FormulaError>>,
    depth: usize,
    max_depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(lookup: &'a dyn CellLookup) -> Self {
        Self::with_registry(lookup, &DEFAULT_REGISTRY)
    }

    pub fn with_registry(lookup: &'a dyn CellLookup, registry: &'a FunctionRegistry) -> Self {
        Self {
            lookup,
            registry,
            visiting: FxHashSet::default(),
            finished: FxHashMap::default(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn evaluate(&mut self, formula: &str) -> Result<Value, FormulaError> {
        let trimmed = formula.trim();
        let Some(body) = trimmed.strip_prefix('=') else {
            return Ok(Value::from_input(trimmed));
        };
        let expr = parse_expr(body)?;
        self.eval_scalar(&expr)
    }

    /// Effective value of a cell, as if it were referenced from a formula.
    pub fn evaluate_cell(&mut self, addr: CellAddr) -> Result<Value, FormulaError> {
        self.resolve_cell(addr)
    }

    pub fn eval_scalar(&mut self, expr: &Expr) -> Result<Value, FormulaError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Text(s) => Ok(Value::Text(s.clone())),
            Expr::CellRef(addr) => self.resolve_cell(*addr),
            Expr::Range(_) => Err(FormulaError::RangeWhereScalarExpected),
            Expr::Function { name, args } => self.call(name, args),
        }
    }

    /// Resolve every cell of a range, row-major. The whole range is bounds
    /// checked before the first cell is visited.
    pub fn eval_range(&mut self, range: &CellRange) -> Result<Vec<Value>, FormulaError> {
        range
            .check_bounds(self.lookup.row_count(), self.lookup.col_count())
            .map_err(|e| FormulaError::CellOutOfRange(e.addr))?;

        let mut values = Vec::with_capacity(range.len());
        for addr in range.iter() {
            values.push(self.resolve_cell(addr)?);
        }
        Ok(values)
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<Value, FormulaError> {
        let func = self
            .registry
            .get(name)
            .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;
        func(args, self)
    }

    fn resolve_cell(&mut self, addr: CellAddr) -> Result<Value, FormulaError> {
        if !addr.in_bounds(self.lookup.row_count(), self.lookup.col_count()) {
            return Err(FormulaError::CellOutOfRange(addr));
        }

        let Some(formula) = self.lookup.get_formula(addr.row, addr.col) else {
            return Ok(self.lookup.get_value(addr.row, addr.col));
        };

        if let Some(done) = self.finished.get(&addr) {
            return done.clone();
        }
        if !self.visiting.insert(addr) {
            log::trace!("cycle detected re-entering {}", addr);
            return Err(FormulaError::CircularReference(addr));
        }
        if self.depth >= self.max_depth {
            self.visiting.remove(&addr);
            if let Some(cell) = self.find_reachable_cycle(addr) {
                log::trace!("depth limit hit at {}, cycle through {}", addr, cell);
                return Err(FormulaError::CircularReference(cell));
            }
            return Err(FormulaError::DepthLimitExceeded(self.max_depth));
        }

        self.depth += 1;
        let result = parse_formula_body(&formula).and_then(|expr| self.eval_scalar(&expr));
        self.depth -= 1;
        self.visiting.remove(&addr);

        if !matches!(result, Err(FormulaError::DepthLimitExceeded(_))) {
            self.finished.insert(addr, result.clone());
        }
        result
    }

    /// Walk formula references from `start` without evaluating anything and
    /// return the first cell reached twice along one path.
    fn find_reachable_cycle(&self, start: CellAddr) -> Option<CellAddr> {
        let mut on_path: FxHashSet<CellAddr> = FxHashSet::default();
        let mut cleared: FxHashSet<CellAddr> = FxHashSet::default();
        let mut stack: Vec<(CellAddr, Vec<CellAddr>)> = Vec::new();

        on_path.insert(start);
        stack.push((start, self.formula_refs(start)));

        while let Some((addr, pending)) = stack.last_mut() {
            let addr = *addr;
            let Some(next) = pending.pop() else {
                on_path.remove(&addr);
                cleared.insert(addr);
                stack.pop();
                continue;
            };
            if on_path.contains(&next) {
                return Some(next);
            }
            if cleared.contains(&next) {
                continue;
            }
            on_path.insert(next);
            let refs = self.formula_refs(next);
            stack.push((next, refs));
        }
        None
    }

    /// In-bounds formula cells read directly by the formula at `addr`.
    fn formula_refs(&self, addr: CellAddr) -> Vec<CellAddr> {
        let (rows, cols) = (self.lookup.row_count(), self.lookup.col_count());
        let Some(formula) = self.lookup.get_formula(addr.row, addr.col) else {
            return Vec::new();
        };
        let Ok(expr) = parse_formula_body(&formula) else {
            return Vec::new();
        };
        extract_cell_refs(&expr)
            .into_iter()
            .filter(|r| r.in_bounds(rows, cols) && self.lookup.get_formula(r.row, r.col).is_some())
            .collect()
    }
}

fn parse_formula_body(formula: &str) -> Result<Expr, FormulaError> {
    let trimmed = formula.trim();
    parse_expr(trimmed.strip_prefix('=').unwrap_or(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ErrorKind;
    use rustc_hash::FxHashMap;

    /// Simple lookup for testing: a fixed-size grid of typed inputs
    struct TestLookup {
        rows: usize,
        cols: usize,
        values: FxHashMap<(usize, usize), Value>,
        formulas: FxHashMap<(usize, usize), String>,
    }

    impl TestLookup {
        fn new(rows: usize, cols: usize) -> Self {
            Self { rows, cols, values: FxHashMap::default(), formulas: FxHashMap::default() }
        }

        fn set(&mut self, row: usize, col: usize, input: &str) {
            if input.starts_with('=') {
                self.formulas.insert((row, col), input.to_string());
            } else {
                self.values.insert((row, col), Value::from_input(input));
            }
        }

        fn set_value(&mut self, row: usize, col: usize, value: Value) {
            self.values.insert((row, col), value);
        }
    }

    impl CellLookup for TestLookup {
        fn get_value(&self, row: usize, col: usize) -> Value {
            self.values.get(&(row, col)).cloned().unwrap_or_default()
        }

        fn get_formula(&self, row: usize, col: usize) -> Option<String> {
            self.formulas.get(&(row, col)).cloned()
        }

        fn row_count(&self) -> usize {
            self.rows
        }

        fn col_count(&self) -> usize {
            self.cols
        }
    }

    fn eval(formula: &str, lookup: &TestLookup) -> Result<Value, FormulaError> {
        evaluate_formula(formula, lookup)
    }

    #[test]
    fn test_literals() {
        let lookup = TestLookup::new(1, 1);
        assert_eq!(eval("=7", &lookup), Ok(Value::Number(7.0)));
        assert_eq!(eval("=\"abc\"", &lookup), Ok(Value::Text("abc".into())));
    }

    #[test]
    fn test_non_formula_input_is_plain_value() {
        let lookup = TestLookup::new(1, 1);
        assert_eq!(eval("12", &lookup), Ok(Value::Number(12.0)));
        assert_eq!(eval("hello", &lookup), Ok(Value::Text("hello".into())));
    }

    #[test]
    fn test_cell_reference_returns_raw_value() {
        let mut lookup = TestLookup::new(3, 3);
        lookup.set(0, 1, "hello");
        lookup.set(2, 2, "3.5");
        assert_eq!(eval("=B1", &lookup), Ok(Value::Text("hello".into())));
        assert_eq!(eval("=C3", &lookup), Ok(Value::Number(3.5)));
        assert_eq!(eval("=A1", &lookup), Ok(Value::Empty));
    }

    #[test]
    fn test_reference_follows_formulas() {
        let mut lookup = TestLookup::new(3, 1);
        lookup.set(0, 0, "4");
        lookup.set(1, 0, "=A1");
        lookup.set(2, 0, "=SUM(A1:A2)");
        assert_eq!(eval("=A3", &lookup), Ok(Value::Number(8.0)));
    }

    #[test]
    fn test_sum_and_count_ignore_text() {
        let mut lookup = TestLookup::new(3, 1);
        lookup.set(0, 0, "x");
        lookup.set(1, 0, "5");
        lookup.set(2, 0, "7");
        assert_eq!(eval("=SUM(A1:A3)", &lookup), Ok(Value::Number(12.0)));
        assert_eq!(eval("=COUNT(A1:A3)", &lookup), Ok(Value::Number(2.0)));
    }

    #[test]
    fn test_average_of_nothing_is_null() {
        let mut lookup = TestLookup::new(2, 1);
        assert_eq!(eval("=AVERAGE(A1:A1)", &lookup), Ok(Value::Empty));
        lookup.set(0, 0, "n/a");
        assert_eq!(eval("=AVERAGE(A1:A1)", &lookup), Ok(Value::Empty));
        assert_eq!(eval("=MIN(A1)", &lookup), Ok(Value::Empty));
        assert_eq!(eval("=MAX(A1:A2)", &lookup), Ok(Value::Empty));
    }

    #[test]
    fn test_aggregates() {
        let mut lookup = TestLookup::new(4, 1);
        lookup.set(0, 0, "2");
        lookup.set(1, 0, "8");
        lookup.set(2, 0, "1,5");
        lookup.set_value(3, 0, Value::Boolean(true));
        assert_eq!(eval("=MIN(A1:A4)", &lookup), Ok(Value::Number(1.0)));
        assert_eq!(eval("=MAX(A1:A4)", &lookup), Ok(Value::Number(8.0)));
        assert_eq!(eval("=AVERAGE(A1:A4)", &lookup), Ok(Value::Number(12.5 / 4.0)));
        assert_eq!(eval("=COUNT(A1:A4)", &lookup), Ok(Value::Number(4.0)));
    }

    #[test]
    fn test_count_counts_members_not_arguments() {
        let mut lookup = TestLookup::new(3, 1);
        lookup.set(0, 0, "1");
        lookup.set(1, 0, "2");
        lookup.set(2, 0, "3");
        assert_eq!(eval("=COUNT(A1:A3, SUM(A1:A3), \"x\")", &lookup), Ok(Value::Number(4.0)));
    }

    #[test]
    fn test_function_names_are_case_insensitive() {
        let mut lookup = TestLookup::new(2, 1);
        lookup.set(0, 0, "1");
        lookup.set(1, 0, "2");
        assert_eq!(eval("=sum(A1:A2)", &lookup), Ok(Value::Number(3.0)));
        assert_eq!(eval("=Average(A1:A2)", &lookup), Ok(Value::Number(1.5)));
    }

    #[test]
    fn test_self_reference_is_circular() {
        let mut lookup = TestLookup::new(1, 1);
        lookup.set(0, 0, "=A1");
        let err = Evaluator::new(&lookup).evaluate_cell(CellAddr::new(0, 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularReference);
        assert_eq!(eval("=A1", &lookup).unwrap_err().kind(), ErrorKind::CircularReference);
    }

    #[test]
    fn test_mutual_reference_is_circular() {
        let mut lookup = TestLookup::new(1, 2);
        lookup.set(0, 0, "=B1");
        lookup.set(0, 1, "=A1");
        assert_eq!(eval("=A1", &lookup).unwrap_err().kind(), ErrorKind::CircularReference);
        assert_eq!(eval("=B1", &lookup).unwrap_err().kind(), ErrorKind::CircularReference);
    }

    #[test]
    fn test_range_through_cycle_is_circular() {
        let mut lookup = TestLookup::new(2, 1);
        lookup.set(0, 0, "=SUM(A1:A2)");
        lookup.set(1, 0, "3");
        assert_eq!(eval("=A1", &lookup).unwrap_err().kind(), ErrorKind::CircularReference);
    }

    #[test]
    fn test_shared_dependency_is_not_a_cycle() {
        // Diamond: B1 and C1 both read A1; D1 reads both.
        let mut lookup = TestLookup::new(1, 4);
        lookup.set(0, 0, "=5");
        lookup.set(0, 1, "=A1");
        lookup.set(0, 2, "=SUM(A1, A1)");
        lookup.set(0, 3, "=SUM(A1, B1, C1)");
        assert_eq!(eval("=D1", &lookup), Ok(Value::Number(20.0)));
    }

    #[test]
    fn test_out_of_range_references() {
        let lookup = TestLookup::new(2, 2);
        assert_eq!(
            eval("=C1", &lookup),
            Err(FormulaError::CellOutOfRange(CellAddr::new(0, 2)))
        );
        assert_eq!(
            eval("=SUM(A1:A3)", &lookup),
            Err(FormulaError::CellOutOfRange(CellAddr::new(2, 0)))
        );
    }

    #[test]
    fn test_range_where_scalar_expected() {
        let mut lookup = TestLookup::new(2, 2);
        assert_eq!(eval("=A1:B2", &lookup), Err(FormulaError::RangeWhereScalarExpected));
        lookup.set(0, 0, "=B1:B2");
        assert_eq!(eval("=SUM(A1)", &lookup), Err(FormulaError::RangeWhereScalarExpected));
    }

    #[test]
    fn test_unknown_function() {
        let lookup = TestLookup::new(1, 1);
        assert_eq!(
            eval("=MEDIAN(A1)", &lookup),
            Err(FormulaError::UnknownFunction("MEDIAN".into()))
        );
    }

    #[test]
    fn test_error_in_referenced_cell_propagates() {
        let mut lookup = TestLookup::new(2, 1);
        lookup.set(0, 0, "=NOPE()");
        lookup.set(1, 0, "1");
        assert_eq!(
            eval("=SUM(A1:A2)", &lookup),
            Err(FormulaError::UnknownFunction("NOPE".into()))
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut lookup = TestLookup::new(10, 1);
        lookup.set(0, 0, "1");
        for row in 1..10 {
            lookup.set(row, 0, &format!("=A{}", row));
        }
        let ok = Evaluator::new(&lookup).evaluate("=A10");
        assert_eq!(ok, Ok(Value::Number(1.0)));

        let limited = Evaluator::new(&lookup).with_max_depth(4).evaluate("=A10");
        assert_eq!(limited, Err(FormulaError::DepthLimitExceeded(4)));
    }

    #[test]
    fn test_ring_longer_than_depth_limit_is_circular() {
        let n = 300;
        let mut lookup = TestLookup::new(n, 1);
        for row in 0..n {
            let next = if row + 1 == n { 1 } else { row + 2 };
            lookup.set(row, 0, &format!("=A{}", next));
        }
        let err = Evaluator::new(&lookup).evaluate_cell(CellAddr::new(0, 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularReference);

        let err = Evaluator::new(&lookup).with_max_depth(8).evaluate("=A150").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularReference);
    }

    #[test]
    fn test_deep_chain_into_short_cycle_is_circular() {
        let mut lookup = TestLookup::new(12, 2);
        for row in 0..10 {
            lookup.set(row, 0, &format!("=A{}", row + 2));
        }
        lookup.set(10, 0, "=SUM(B11, B12)");
        lookup.set(10, 1, "=B12");
        lookup.set(11, 1, "=B11");
        let err = Evaluator::new(&lookup).with_max_depth(4).evaluate("=A1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularReference);
    }

    #[test]
    fn test_running_total_column_evaluates_quickly() {
        // Each row sums every row above it, so naive re-evaluation doubles per row.
        let n = 60;
        let mut lookup = TestLookup::new(n, 1);
        lookup.set(0, 0, "1");
        for row in 1..n {
            lookup.set(row, 0, &format!("=SUM(A1:A{})", row));
        }
        let mut ev = Evaluator::new(&lookup);
        assert_eq!(ev.evaluate_cell(CellAddr::new(20, 0)), Ok(Value::Number(524288.0)));
        assert_eq!(
            ev.evaluate_cell(CellAddr::new(n - 1, 0)),
            Ok(Value::Number(2f64.powi(n as i32 - 2)))
        );
    }

    #[test]
    fn test_depth_limited_results_are_not_reused() {
        let mut lookup = TestLookup::new(6, 1);
        lookup.set(0, 0, "1");
        for row in 1..6 {
            lookup.set(row, 0, &format!("=A{}", row));
        }
        let mut ev = Evaluator::new(&lookup).with_max_depth(3);
        assert_eq!(ev.evaluate_cell(CellAddr::new(5, 0)), Err(FormulaError::DepthLimitExceeded(3)));
        assert_eq!(ev.evaluate_cell(CellAddr::new(2, 0)), Ok(Value::Number(1.0)));
        assert_eq!(ev.evaluate_cell(CellAddr::new(5, 0)), Ok(Value::Number(1.0)));
    }

    #[test]
    fn test_custom_registry() {
        fn double(args: &[Expr], ev: &mut Evaluator<'_>) -> Result<Value, FormulaError> {
            let total: f64 = crate::formula::eval_helpers::collect_numbers(args, ev)?.iter().sum();
            Ok(Value::Number(total * 2.0))
        }

        let mut registry = FunctionRegistry::builtin();
        registry.register("double", double);

        let mut lookup = TestLookup::new(1, 1);
        lookup.set(0, 0, "21");
        let result = Evaluator::with_registry(&lookup, &registry).evaluate("=DOUBLE(A1)");
        assert_eq!(result, Ok(Value::Number(42.0)));
    }
}
