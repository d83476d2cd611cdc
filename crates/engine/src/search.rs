//! Find and replace across row maps.
//!
//! Every mode compiles to one case-insensitive, Unicode-aware regex when the
//! config is built. Matching and replacement run against `format_value`, the
//! same text the host renders, so reported offsets line up with highlighting.
//! Offsets are char (Unicode scalar) positions, half-open.

use std::fmt;
use std::str::FromStr;

use chartgrid_core::{format_value, Row, Value};
use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// How a query is turned into a pattern.
///
/// Word boundaries are Unicode-aware: accented letters and other scripts
/// count as word characters, so whole-word `caf` does not match inside
/// `café`. Regex mode uses the `regex` crate syntax, which has no lookaround
/// or backreferences; such patterns leave the config inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    #[default]
    Substring,
    WholeWord,
    Regex,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Substring => "substring",
            SearchMode::WholeWord => "whole-word",
            SearchMode::Regex => "regex",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "substring" | "contains" => Ok(SearchMode::Substring),
            "whole-word" | "wholeword" | "word" => Ok(SearchMode::WholeWord),
            "regex" | "regexp" => Ok(SearchMode::Regex),
            other => Err(format!("unknown search mode '{}'", other)),
        }
    }
}

/// Immutable search settings plus the compiled pattern.
///
/// An empty query or a pattern that fails to compile leaves the config
/// inactive: it matches nothing and replaces nothing.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    query: String,
    mode: SearchMode,
    columns: Vec<String>,
    pattern: Option<Regex>,
}

impl SearchConfig {
    pub fn new(query: &str, mode: SearchMode, columns: &[String]) -> Self {
        let pattern = if query.is_empty() {
            None
        } else {
            compile(query, mode)
        };

        let mut unique: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            if !unique.contains(column) {
                unique.push(column.clone());
            }
        }

        Self {
            query: query.to_string(),
            mode,
            columns: unique,
            pattern,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Columns the search is restricted to. Empty means every column.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_active(&self) -> bool {
        self.pattern.is_some()
    }

    fn includes_column(&self, key: &str) -> bool {
        self.columns.is_empty() || self.columns.iter().any(|c| c == key)
    }

    /// Matches within one formatted string.
    pub fn find_spans(&self, text: &str) -> Vec<MatchSpan> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };

        let mut spans = Vec::new();
        let mut chars_before = 0;
        let mut last_byte = 0;
        for m in pattern.find_iter(text) {
            if m.start() == m.end() {
                continue;
            }
            chars_before += text[last_byte..m.start()].chars().count();
            let len = m.as_str().chars().count();
            spans.push(MatchSpan { start: chars_before, end: chars_before + len });
            chars_before += len;
            last_byte = m.end();
        }
        spans
    }
}

fn compile(query: &str, mode: SearchMode) -> Option<Regex> {
    let source = match mode {
        SearchMode::Substring => regex::escape(query),
        SearchMode::WholeWord => format!(r"\b{}\b", regex::escape(query)),
        SearchMode::Regex => query.to_string(),
    };

    match RegexBuilder::new(&source).case_insensitive(true).unicode(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            log::debug!("search pattern {:?} ({}) inactive: {}", query, mode, e);
            None
        }
    }
}

/// Half-open char range into a cell's formatted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMatches {
    pub column_key: String,
    pub spans: Vec<MatchSpan>,
}

/// Per-column matches for one row, in the row's column order. Columns with
/// no match are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowMatches {
    pub matches_by_column: Vec<ColumnMatches>,
}

impl RowMatches {
    pub fn is_empty(&self) -> bool {
        self.matches_by_column.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&[MatchSpan]> {
        self.matches_by_column
            .iter()
            .find(|m| m.column_key == column)
            .map(|m| m.spans.as_slice())
    }

    pub fn match_count(&self) -> usize {
        self.matches_by_column.iter().map(|m| m.spans.len()).sum()
    }
}

pub fn row_matches_query(row: &Row, config: &SearchConfig) -> RowMatches {
    let mut result = RowMatches::default();
    if !config.is_active() {
        return result;
    }

    for (key, value) in row.iter() {
        if !config.includes_column(key) {
            continue;
        }
        let spans = config.find_spans(&format_value(value));
        if !spans.is_empty() {
            result.matches_by_column.push(ColumnMatches {
                column_key: key.to_string(),
                spans,
            });
        }
    }
    result
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowHit {
    pub row: usize,
    #[serde(flatten)]
    pub matches: RowMatches,
}

/// Rows with at least one match, in input order.
pub fn find_in_rows(rows: &[Row], config: &SearchConfig) -> Vec<RowHit> {
    if !config.is_active() {
        return Vec::new();
    }
    rows.iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let matches = row_matches_query(row, config);
            (!matches.is_empty()).then_some(RowHit { row: index, matches })
        })
        .collect()
}

/// Replace every match in one formatted string.
///
/// Substring and whole-word modes insert `template` literally. Regex mode
/// expands capture references (`$1`, `${name}`, see [`expand_template`]).
/// Inactive configs return the input unchanged.
pub fn apply_replacement(formatted: &str, config: &SearchConfig, template: &str) -> String {
    replace_counted(formatted, config, template).0
}

fn replace_counted(text: &str, config: &SearchConfig, template: &str) -> (String, usize) {
    let Some(pattern) = &config.pattern else {
        return (text.to_string(), 0);
    };

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut count = 0;
    for caps in pattern.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        if m.start() == m.end() {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        match config.mode {
            SearchMode::Regex => expand_template(&caps, template, &mut out),
            SearchMode::Substring | SearchMode::WholeWord => out.push_str(template),
        }
        last = m.end();
        count += 1;
    }
    out.push_str(&text[last..]);
    (out, count)
}

/// Expand a replacement template against one match.
///
/// `$N` takes the longest group number (at most two digits) that exists, so
/// `$1a` is group 1 followed by `a`. `$0` and `$&` insert the whole match,
/// `${N}` and `${name}` are explicit references and `$$` is a literal dollar.
/// Groups that did not participate expand to nothing; a `$` that starts no
/// reference is kept as written.
fn expand_template(caps: &Captures<'_>, template: &str, out: &mut String) {
    let group_count = caps.len();
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take(2).take_while(u8::is_ascii_digit).count();

        if after.starts_with('$') {
            out.push('$');
            rest = &after[1..];
        } else if after.starts_with('&') {
            out.push_str(caps.get(0).map_or("", |m| m.as_str()));
            rest = &after[1..];
        } else if let Some(close) = after.strip_prefix('{').and_then(|inner| inner.find('}')) {
            let name = &after[1..close + 1];
            let group = match name.parse::<usize>() {
                Ok(index) => caps.get(index),
                Err(_) => caps.name(name),
            };
            out.push_str(group.map_or("", |m| m.as_str()));
            rest = &after[close + 2..];
        } else if let Some((index, used)) = (1..=digits)
            .rev()
            .filter_map(|n| after[..n].parse::<usize>().ok().map(|index| (index, n)))
            .find(|&(index, _)| index < group_count)
        {
            out.push_str(caps.get(index).map_or("", |m| m.as_str()));
            rest = &after[used..];
        } else {
            out.push('$');
            rest = after;
        }
    }
    out.push_str(rest);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceReport {
    pub rows: Vec<Row>,
    pub cells_replaced: usize,
    pub matches_replaced: usize,
}

/// Replace across a row set. Cells with at least one match become text;
/// every other cell keeps its original value and type.
pub fn replace_in_rows(rows: &[Row], config: &SearchConfig, template: &str) -> ReplaceReport {
    let mut report = ReplaceReport {
        rows: Vec::with_capacity(rows.len()),
        cells_replaced: 0,
        matches_replaced: 0,
    };

    for row in rows {
        let mut new_row = row.clone();
        if config.is_active() {
            for (key, value) in row.iter() {
                if !config.includes_column(key) {
                    continue;
                }
                let (replaced, count) = replace_counted(&format_value(value), config, template);
                if count > 0 {
                    new_row.insert(key, Value::Text(replaced));
                    report.cells_replaced += 1;
                    report.matches_replaced += count;
                }
            }
        }
        report.rows.push(new_row);
    }

    report
}
