//! Column profiling: turn heterogeneous row maps into typed column metadata.
//!
//! Profiling is pure and recomputed from scratch for every row set. It never
//! fails; cells that do not parse as numbers land in the text bucket.

use chartgrid_core::{format_value, Row, Value};
use serde::Serialize;

/// Placeholders treated as a missing value, compared case-insensitively
/// after trimming.
const EMPTY_PLACEHOLDERS: [&str; 6] = ["-", "n/a", "na", "null", "undefined", "nan"];

pub const DEFAULT_SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileOptions {
    /// Number of non-empty formatted values kept per column.
    pub sample_size: usize,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self { sample_size: DEFAULT_SAMPLE_SIZE }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub key: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub filled_count: usize,
    pub empty_count: usize,
    pub numeric_count: usize,
    pub text_count: usize,
    pub samples: Vec<String>,
}

impl ColumnProfile {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            column_type: ColumnType::Text,
            filled_count: 0,
            empty_count: 0,
            numeric_count: 0,
            text_count: 0,
            samples: Vec::new(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.column_type == ColumnType::Numeric
    }

    /// Text cells in a column typed numeric. Hosts surface these as a warning.
    pub fn unparsed_count(&self) -> usize {
        match self.column_type {
            ColumnType::Numeric => self.text_count,
            ColumnType::Text => 0,
        }
    }
}

/// True for null, NaN, blank text and the placeholder set.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Empty) => true,
        Some(Value::Number(n)) => n.is_nan(),
        Some(Value::Boolean(_)) => false,
        Some(Value::Text(s)) => is_empty_text(s),
    }
}

fn is_empty_text(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.is_empty()
        || EMPTY_PLACEHOLDERS
            .iter()
            .any(|p| trimmed.eq_ignore_ascii_case(p))
}

/// Numeric reading of a raw value: native finite numbers, or text that parses
/// after trimming and turning a single decimal comma into a dot.
pub fn parse_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) if n.is_finite() => Some(*n),
        Value::Text(s) => {
            let trimmed = s.trim();
            let normalized = if trimmed.matches(',').count() == 1 {
                trimmed.replace(',', ".")
            } else {
                trimmed.to_string()
            };
            normalized.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

pub fn profile_columns(rows: &[Row]) -> Vec<ColumnProfile> {
    profile_columns_with(rows, &ProfileOptions::default())
}

pub fn profile_columns_with(rows: &[Row], options: &ProfileOptions) -> Vec<ColumnProfile> {
    let keys = column_keys(rows);

    keys.iter()
        .map(|key| {
            let mut profile = ColumnProfile::new(key);
            for row in rows {
                let value = row.get(key);
                if is_empty_value(value) {
                    profile.empty_count += 1;
                    continue;
                }
                let Some(value) = value else { continue };

                profile.filled_count += 1;
                if parse_numeric(value).is_some() {
                    profile.numeric_count += 1;
                } else {
                    profile.text_count += 1;
                }
                if profile.samples.len() < options.sample_size {
                    profile.samples.push(format_value(value));
                }
            }
            profile.column_type = decide_type(profile.numeric_count, profile.text_count);
            profile
        })
        .collect()
}

/// Keys in first-seen order across all rows.
fn column_keys(rows: &[Row]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }
    keys
}

fn decide_type(numeric: usize, text: usize) -> ColumnType {
    if numeric > 0 && text == 0 {
        ColumnType::Numeric
    } else if numeric == 0 {
        ColumnType::Text
    } else if numeric >= text {
        ColumnType::Numeric
    } else {
        ColumnType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows_of(key: &str, values: &[&str]) -> Vec<Row> {
        values.iter().map(|v| Row::new().with(key, *v)).collect()
    }

    #[test]
    fn test_placeholder_is_empty() {
        let rows = rows_of("x", &["1", "2", "n/a"]);
        let cols = profile_columns(&rows);
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].key, "x");
        assert_eq!(cols[0].column_type, ColumnType::Numeric);
        assert_eq!(cols[0].filled_count, 2);
        assert_eq!(cols[0].empty_count, 1);
    }

    #[test]
    fn test_empty_values() {
        assert!(is_empty_value(None));
        assert!(is_empty_value(Some(&Value::Empty)));
        assert!(is_empty_value(Some(&Value::Number(f64::NAN))));
        for s in ["", "  ", "-", "N/A", "NA", "Null", "undefined", "NaN"] {
            assert!(is_empty_value(Some(&Value::Text(s.into()))), "{:?}", s);
        }
        assert!(!is_empty_value(Some(&Value::Number(0.0))));
        assert!(!is_empty_value(Some(&Value::Text("none".into()))));
        assert!(!is_empty_value(Some(&Value::Boolean(false))));
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric(&Value::Text(" 3,5 ".into())), Some(3.5));
        assert_eq!(parse_numeric(&Value::Text("1e3".into())), Some(1000.0));
        assert_eq!(parse_numeric(&Value::Text("1,000,000".into())), None);
        assert_eq!(parse_numeric(&Value::Text("inf".into())), None);
        assert_eq!(parse_numeric(&Value::Number(2.0)), Some(2.0));
        assert_eq!(parse_numeric(&Value::Boolean(true)), None);
    }

    #[test]
    fn test_type_decision() {
        assert_eq!(decide_type(3, 0), ColumnType::Numeric);
        assert_eq!(decide_type(0, 0), ColumnType::Text);
        assert_eq!(decide_type(0, 2), ColumnType::Text);
        assert_eq!(decide_type(2, 2), ColumnType::Numeric);
        assert_eq!(decide_type(1, 2), ColumnType::Text);
    }

    #[test]
    fn test_mixed_column_reports_unparsed() {
        let rows = rows_of("v", &["1", "2", "3", "oops"]);
        let col = &profile_columns(&rows)[0];
        assert!(col.is_numeric());
        assert_eq!(col.unparsed_count(), 1);
    }

    #[test]
    fn test_all_empty_column_is_text() {
        let rows = rows_of("v", &["", "null"]);
        let col = &profile_columns(&rows)[0];
        assert_eq!(col.column_type, ColumnType::Text);
        assert_eq!(col.empty_count, 2);
        assert!(col.samples.is_empty());
    }

    #[test]
    fn test_first_seen_key_order_and_missing_keys() {
        let rows = vec![
            Row::new().with("b", 1.0),
            Row::new().with("a", "x").with("b", 2.0),
            Row::new().with("c", true),
        ];
        let cols = profile_columns(&rows);
        let keys: Vec<&str> = cols.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(cols[0].empty_count, 1);
        assert_eq!(cols[1].empty_count, 2);
        assert_eq!(cols[2].filled_count, 1);
        assert_eq!(cols[2].column_type, ColumnType::Text);
    }

    #[test]
    fn test_samples_are_formatted_and_capped() {
        let rows: Vec<Row> = (1..=8).map(|n| Row::new().with("n", n as f64)).collect();
        let cols = profile_columns_with(&rows, &ProfileOptions { sample_size: 3 });
        assert_eq!(cols[0].samples, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_serialized_shape() {
        let rows = rows_of("x", &["1"]);
        let json = serde_json::to_value(profile_columns(&rows)).unwrap();
        assert_eq!(json[0]["type"], "numeric");
        assert_eq!(json[0]["filledCount"], 1);
    }
}
