// Shared helper functions for formula evaluation

use chartgrid_core::Value;

use super::error::FormulaError;
use super::eval::Evaluator;
use super::parser::Expr;

/// Numeric coercion used by the aggregate functions.
///
/// Native numbers pass through, booleans count as 1/0, empties are skipped.
/// Text is tried against an ordered list of separator conventions and the
/// first normalization that parses to a finite number wins. The order is
/// load-bearing: `"1,234"` reads as 1.234 because comma-decimal is tried
/// before comma-thousands.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) if n.is_finite() => Some(*n),
        Value::Number(_) | Value::Empty => None,
        Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => coerce_text(s),
    }
}

type Normalization = fn(&str) -> Option<String>;

const NORMALIZATIONS: [Normalization; 4] = [
    as_is,
    comma_decimal,
    comma_thousands,
    dot_thousands,
];

fn coerce_text(text: &str) -> Option<f64> {
    let compact: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if compact.is_empty() {
        return None;
    }

    NORMALIZATIONS
        .iter()
        .filter_map(|normalize| normalize(&compact))
        .find_map(|candidate| candidate.parse::<f64>().ok().filter(|n| n.is_finite()))
}

fn as_is(s: &str) -> Option<String> {
    Some(s.to_string())
}

/// `1.234,5` -> `1234.5`: one comma, every dot before it.
fn comma_decimal(s: &str) -> Option<String> {
    let comma = s.find(',')?;
    if s.matches(',').count() != 1 || s[comma..].contains('.') {
        return None;
    }
    Some(s.replace('.', "").replace(',', "."))
}

/// `1,234.5` -> `1234.5`: commas are grouping, the last dot (if any) follows them.
fn comma_thousands(s: &str) -> Option<String> {
    let last_comma = s.rfind(',')?;
    if let Some(dot) = s.find('.') {
        if dot < last_comma {
            return None;
        }
    }
    Some(s.replace(',', ""))
}

/// `1.234.567` -> `1234567`: several dots and no comma can only be grouping.
fn dot_thousands(s: &str) -> Option<String> {
    if s.contains(',') || s.matches('.').count() < 2 {
        return None;
    }
    Some(s.replace('.', ""))
}

/// Gather the numeric members of every argument: ranges expand cell by cell,
/// anything else is evaluated as a scalar. Non-numeric values are skipped;
/// evaluation errors propagate.
pub(crate) fn collect_numbers(args: &[Expr], ev: &mut Evaluator<'_>) -> Result<Vec<f64>, FormulaError> {
    let mut values = Vec::new();

    for arg in args {
        match arg {
            Expr::Range(range) => {
                for value in ev.eval_range(range)? {
                    if let Some(n) = coerce_number(&value) {
                        values.push(n);
                    }
                }
            }
            _ => {
                let value = ev.eval_scalar(arg)?;
                if let Some(n) = coerce_number(&value) {
                    values.push(n);
                }
            }
        }
    }

    Ok(values)
}
