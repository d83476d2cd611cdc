// Value: the scalar primitive for raw cell values and evaluation results

use serde::{Deserialize, Serialize};

/// A raw cell value or the result of evaluating a formula.
///
/// Serialized untagged so that JSON `null`, numbers, strings and booleans map
/// directly onto `Empty`, `Number`, `Text` and `Boolean`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Empty,
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Classify typed input the way a grid cell editor does.
    /// Formulas are not recognised here; callers strip them first.
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Value::Empty;
        }

        if let Ok(num) = trimmed.parse::<f64>() {
            if num.is_finite() {
                return Value::Number(num);
            }
        }

        let upper = trimmed.to_uppercase();
        if upper == "TRUE" {
            return Value::Boolean(true);
        }
        if upper == "FALSE" {
            return Value::Boolean(false);
        }

        Value::Text(trimmed.to_string())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Native number, if this value is one. No text coercion.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// The canonical formatted text of a value.
///
/// Search matching, highlighting and replacement all run against this exact
/// string, so match offsets always line up with what is rendered.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Empty => String::new(),
        Value::Boolean(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        Value::Number(n) => format_number(*n),
        Value::Text(s) => s.clone(),
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "#NAN".to_string()
    } else if n.is_infinite() {
        "#INF".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
