// Formula parser - converts formula text into an AST
// Supports: quoted text, numbers, cell refs (A1), ranges (A1:B5), function calls (SUM(...))
// Rules are tried in a fixed priority order and the first match wins:
// range, cell reference, function call, quoted literal, numeric literal.

use chartgrid_core::{parse_cell_ref, CellAddr, CellRange};
use once_cell::sync::Lazy;
use regex::Regex;

use super::error::FormulaError;

static RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+[0-9]+)\s*:\s*([A-Za-z]+[0-9]+)$").unwrap());
static CELL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]+[0-9]+$").unwrap());
static CALL_HEAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    CellRef(CellAddr),
    Range(CellRange),
    /// Name is stored upper-case; arguments stay unevaluated until the
    /// function decides how to consume them.
    Function { name: String, args: Vec<Expr> },
}

/// Parse a full formula. Input must start with `=`.
pub fn parse(formula: &str) -> Result<Expr, FormulaError> {
    let formula = formula.trim();
    match formula.strip_prefix('=') {
        Some(body) => parse_expr(body),
        None => Err(FormulaError::UnparseableExpression(formula.to_string())),
    }
}

/// Parse a bare expression (no leading `=`).
pub fn parse_expr(input: &str) -> Result<Expr, FormulaError> {
    let s = input.trim();

    if let Some(caps) = RANGE_RE.captures(s) {
        let start = parse_ref(&caps[1])?;
        let end = parse_ref(&caps[2])?;
        return Ok(Expr::Range(CellRange::new(start, end)));
    }

    if CELL_RE.is_match(s) {
        return Ok(Expr::CellRef(parse_ref(s)?));
    }

    if let Some(caps) = CALL_HEAD_RE.captures(s) {
        let name = caps[1].to_uppercase();
        let open = caps.get(0).map(|m| m.end()).unwrap_or(0);
        if !s.ends_with(')') || s.len() <= open {
            return Err(FormulaError::InvalidArgumentList);
        }
        let inner = &s[open..s.len() - 1];
        let args = split_args(inner)?
            .into_iter()
            .map(parse_expr)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Expr::Function { name, args });
    }

    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        if let Some(text) = unquote(&s[1..s.len() - 1]) {
            return Ok(Expr::Text(text));
        }
    }

    if NUMBER_RE.is_match(s) {
        if let Ok(n) = s.parse::<f64>() {
            if n.is_finite() {
                return Ok(Expr::Number(n));
            }
        }
    }

    Err(FormulaError::UnparseableExpression(s.to_string()))
}

fn parse_ref(s: &str) -> Result<CellAddr, FormulaError> {
    parse_cell_ref(s).ok_or_else(|| FormulaError::InvalidCellReference(s.to_string()))
}

/// Body of a quoted literal; `""` is an escaped quote, a lone `"` is invalid.
fn unquote(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
            } else {
                return None;
            }
        }
        out.push(c);
    }
    Some(out)
}

/// Split an argument list on top-level commas.
///
/// Commas nested inside parentheses or quoted literals do not split. The
/// list must be balanced on its own: the call's opening paren has to close
/// exactly at the final character of the expression.
fn split_args(inner: &str) -> Result<Vec<&str>, FormulaError> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in inner.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                if depth == 0 {
                    return Err(FormulaError::InvalidArgumentList);
                }
                depth -= 1;
            }
            ',' if !in_quotes && depth == 0 => {
                args.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 || in_quotes {
        return Err(FormulaError::InvalidArgumentList);
    }
    args.push(&inner[start..]);
    Ok(args)
}

/// Extract all cell addresses an expression reads directly, ranges expanded.
pub fn extract_cell_refs(expr: &Expr) -> Vec<CellAddr> {
    let mut refs = Vec::new();
    collect_cell_refs(expr, &mut refs);
    refs
}

fn collect_cell_refs(expr: &Expr, refs: &mut Vec<CellAddr>) {
    match expr {
        Expr::Number(_) | Expr::Text(_) => {}
        Expr::CellRef(addr) => refs.push(*addr),
        Expr::Range(range) => refs.extend(range.iter()),
        Expr::Function { args, .. } => {
            for arg in args {
                collect_cell_refs(arg, refs);
            }
        }
    }
}
