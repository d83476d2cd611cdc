// Built-in spreadsheet functions and the name -> implementation registry

use chartgrid_core::Value;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use super::error::FormulaError;
use super::eval::Evaluator;
use super::eval_helpers::collect_numbers;
use super::parser::Expr;

/// A function receives its arguments unevaluated so it can decide whether a
/// range expands or a scalar is resolved.
pub type FunctionImpl = fn(args: &[Expr], ev: &mut Evaluator<'_>) -> Result<Value, FormulaError>;

pub(crate) static DEFAULT_REGISTRY: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::builtin);

/// Function names are stored upper-case; lookup is case-insensitive.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<String, FunctionImpl>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("SUM", sum);
        registry.register("AVERAGE", average);
        registry.register("MIN", min);
        registry.register("MAX", max);
        registry.register("COUNT", count);
        registry
    }

    /// Add or replace a function.
    pub fn register(&mut self, name: &str, func: FunctionImpl) {
        self.functions.insert(name.to_uppercase(), func);
    }

    pub fn get(&self, name: &str) -> Option<FunctionImpl> {
        self.functions.get(&name.to_uppercase()).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry").field("functions", &self.names()).finish()
    }
}

pub fn sum(args: &[Expr], ev: &mut Evaluator<'_>) -> Result<Value, FormulaError> {
    let values = collect_numbers(args, ev)?;
    Ok(Value::Number(values.iter().sum()))
}

/// Null when no argument contributes a number.
pub fn average(args: &[Expr], ev: &mut Evaluator<'_>) -> Result<Value, FormulaError> {
    let values = collect_numbers(args, ev)?;
    if values.is_empty() {
        return Ok(Value::Empty);
    }
    Ok(Value::Number(values.iter().sum::<f64>() / values.len() as f64))
}

pub fn min(args: &[Expr], ev: &mut Evaluator<'_>) -> Result<Value, FormulaError> {
    let values = collect_numbers(args, ev)?;
    Ok(values.into_iter().reduce(f64::min).map(Value::Number).unwrap_or(Value::Empty))
}

pub fn max(args: &[Expr], ev: &mut Evaluator<'_>) -> Result<Value, FormulaError> {
    let values = collect_numbers(args, ev)?;
    Ok(values.into_iter().reduce(f64::max).map(Value::Number).unwrap_or(Value::Empty))
}

pub fn count(args: &[Expr], ev: &mut Evaluator<'_>) -> Result<Value, FormulaError> {
    let values = collect_numbers(args, ev)?;
    Ok(Value::Number(values.len() as f64))
}
