// Reading input rows from CSV or JSON, file or stdin

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use chartgrid_core::{Row, Value};

/// Rows plus the column order they were read with.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn has_column(&self, key: &str) -> bool {
        self.header.iter().any(|h| h == key)
    }
}

/// Read `path` (`-` for stdin) as CSV with a header line, or as a JSON array
/// of objects when `json` is set.
pub fn load_table(path: &Path, json: bool) -> Result<Table> {
    let contents = read_source(path)?;
    let table = if json {
        parse_json(&contents).with_context(|| format!("invalid JSON rows in {}", path.display()))?
    } else {
        parse_csv(&contents).with_context(|| format!("invalid CSV in {}", path.display()))?
    };
    log::debug!(
        "loaded {} rows x {} columns from {}",
        table.rows.len(),
        table.header.len(),
        path.display()
    );
    Ok(table)
}

fn read_source(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
    }
}

/// Cells are classified like typed input: numbers, TRUE/FALSE, blanks.
/// Formula text is kept verbatim.
pub fn parse_csv(contents: &str) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_bytes());

    let header: Vec<String> = reader
        .headers()
        .context("missing header line")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut seen = Vec::with_capacity(header.len());
    for name in &header {
        if seen.contains(&name) {
            bail!("duplicate column name '{}'", name);
        }
        seen.push(name);
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad record at data row {}", line + 1))?;
        let row: Row = header
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let raw = record.get(i).unwrap_or("");
                let value = if raw.trim_start().starts_with('=') {
                    Value::Text(raw.trim().to_string())
                } else {
                    Value::from_input(raw)
                };
                (key.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok(Table { header, rows })
}

/// A JSON array of objects. The header is the first-seen key order.
pub fn parse_json(contents: &str) -> Result<Table> {
    let rows: Vec<Row> = serde_json::from_str(contents)?;
    let mut header: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !header.iter().any(|h| h == key) {
                header.push(key.to_string());
            }
        }
    }
    Ok(Table { header, rows })
}
