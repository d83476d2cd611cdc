//! Recalculation reporting.
//!
//! A recalc evaluates every formula cell of a sheet from scratch and records
//! what each one produced. No dependency graph is kept between runs.

use chartgrid_core::CellAddr;
use serde::Serialize;

use crate::formula::{ErrorKind, EvalOutcome};

/// Result of evaluating one formula cell during a recalc.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellOutcome {
    /// A1-style address, for display.
    pub cell: String,
    #[serde(skip)]
    pub addr: CellAddr,
    #[serde(flatten)]
    pub outcome: EvalOutcome,
}

impl CellOutcome {
    pub fn new(addr: CellAddr, outcome: EvalOutcome) -> Self {
        Self { cell: addr.to_string(), addr, outcome }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            EvalOutcome::Error { error } => Some(error.kind),
            EvalOutcome::Value { .. } => None,
        }
    }
}

/// Report from a full recompute.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcReport {
    /// Time taken for the full recompute in milliseconds.
    pub duration_ms: u64,

    /// Number of formula cells that were evaluated.
    pub cells_recomputed: usize,

    /// Cells whose formula ended in an error.
    pub error_count: usize,

    /// Cells that are part of (or read through) a reference cycle.
    pub cycle_cells: usize,

    /// Per-cell outcomes in row-major order.
    pub cells: Vec<CellOutcome>,
}

impl RecalcReport {
    pub fn push(&mut self, outcome: CellOutcome) {
        self.cells_recomputed += 1;
        match outcome.error_kind() {
            Some(ErrorKind::CircularReference) => {
                self.error_count += 1;
                self.cycle_cells += 1;
            }
            Some(_) => self.error_count += 1,
            None => {}
        }
        self.cells.push(outcome);
    }

    pub fn had_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn get(&self, addr: CellAddr) -> Option<&EvalOutcome> {
        self.cells.iter().find(|c| c.addr == addr).map(|c| &c.outcome)
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} cells in {}ms, errors={}, cycles={}",
            self.cells_recomputed, self.duration_ms, self.error_count, self.cycle_cells
        )
    }
}
