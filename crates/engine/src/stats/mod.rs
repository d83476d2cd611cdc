//! Significance tests comparing segments of one target column.
//!
//! Failures to compute a test are values (`TestResult::Failed`), never errors:
//! the user fixes them by changing the selection.

pub mod special;
mod segment;

use serde::{Serialize, Serializer};

use crate::profile::ColumnType;

pub use segment::compute_segment_test;

pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// What to compare: one target column split by the values of a segment column.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTestParams {
    pub target_column: String,
    pub target_type: ColumnType,
    pub segment_column: String,
    /// Segment values to compare, one group each. Duplicates collapse.
    pub segment_values: Vec<String>,
    /// For a categorical target, the category whose share is compared by a
    /// two-proportion test when exactly two groups are selected.
    pub target_category: Option<String>,
}

/// Thresholds for the test engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOptions {
    pub significance_level: f64,
    /// Welch groups smaller than this get a warning.
    pub min_numeric_group_size: usize,
    /// Proportion-test groups smaller than this get a warning.
    pub min_proportion_group_size: usize,
    /// Chi-square expected counts below this get a warning.
    pub min_expected_count: f64,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            min_numeric_group_size: 5,
            min_proportion_group_size: 10,
            min_expected_count: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestType {
    WelchT,
    TwoProportionZ,
    ChiSquare,
}

impl TestType {
    pub fn label(&self) -> &'static str {
        match self {
            TestType::WelchT => "Welch's t-test",
            TestType::TwoProportionZ => "two-proportion z-test",
            TestType::ChiSquare => "chi-square test of independence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
    pub share: f64,
}

/// Per-group numbers a host needs to render a results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub label: String,
    /// Valid observations used by the test.
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proportion: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub test_type: TestType,
    pub statistic: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degrees_of_freedom: Option<f64>,
    pub p_value: f64,
    pub significant: bool,
    pub significance_level: f64,
    pub interpretation: String,
    pub groups: Vec<GroupSummary>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestFailure {
    pub reason: String,
    pub warnings: Vec<String>,
}

/// Serialized with a boolean `ok` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum TestResult {
    Completed(TestOutcome),
    Failed(TestFailure),
}

impl TestResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, TestResult::Completed(_))
    }

    pub fn outcome(&self) -> Option<&TestOutcome> {
        match self {
            TestResult::Completed(outcome) => Some(outcome),
            TestResult::Failed(_) => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            TestResult::Failed(failure) => Some(&failure.reason),
            TestResult::Completed(_) => None,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            TestResult::Completed(outcome) => &outcome.warnings,
            TestResult::Failed(failure) => &failure.warnings,
        }
    }
}

impl Serialize for TestResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a, T> {
            ok: bool,
            #[serde(flatten)]
            inner: &'a T,
        }

        match self {
            TestResult::Completed(outcome) => Tagged { ok: true, inner: outcome }.serialize(serializer),
            TestResult::Failed(failure) => Tagged { ok: false, inner: failure }.serialize(serializer),
        }
    }
}
