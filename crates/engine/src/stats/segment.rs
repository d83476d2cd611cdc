// Test selection and the three tests: Welch's t, two-proportion z, chi-square

use chartgrid_core::{format_value, Row, Value};

use super::special::{chi_square_sf, normal_two_sided_p, student_t_two_sided_p};
use super::{
    CategoryCount, GroupSummary, NumericSummary, SegmentTestParams, TestFailure, TestOptions,
    TestOutcome, TestResult, TestType,
};
use crate::profile::{is_empty_value, parse_numeric, ColumnType};

/// Raw target values of one segment.
struct Group<'a> {
    label: String,
    values: Vec<&'a Value>,
}

/// Valid observations of one group, already typed for the chosen test.
struct Observed<T> {
    label: String,
    values: Vec<T>,
}

fn fail(reason: impl Into<String>, warnings: Vec<String>) -> TestResult {
    TestResult::Failed(TestFailure { reason: reason.into(), warnings })
}

pub fn compute_segment_test(
    samples: &[Row],
    params: &SegmentTestParams,
    options: &TestOptions,
) -> TestResult {
    let alpha = options.significance_level;
    if !(alpha > 0.0 && alpha < 1.0) {
        return fail(format!("significance level must be between 0 and 1, got {}", alpha), Vec::new());
    }

    let labels = selected_labels(&params.segment_values);
    if labels.len() < 2 {
        return fail("select at least two segment values to compare", Vec::new());
    }

    let groups = bucket_rows(samples, params, &labels);
    log::debug!(
        "segment test on '{}' by '{}': {} groups, sizes {:?}",
        params.target_column,
        params.segment_column,
        groups.len(),
        groups.iter().map(|g| g.values.len()).collect::<Vec<_>>()
    );

    match params.target_type {
        ColumnType::Numeric => numeric_test(groups, options),
        ColumnType::Text => {
            let category = params
                .target_category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty());
            categorical_test(groups, category, options)
        }
    }
}

/// Trimmed, non-empty, first occurrence wins.
fn selected_labels(values: &[String]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let label = value.trim();
        if !label.is_empty() && !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
    labels
}

/// One pass over the samples. Rows whose segment value is not selected are
/// ignored.
fn bucket_rows<'a>(samples: &'a [Row], params: &SegmentTestParams, labels: &[String]) -> Vec<Group<'a>> {
    let mut groups: Vec<Group<'a>> = labels
        .iter()
        .map(|label| Group { label: label.clone(), values: Vec::new() })
        .collect();

    for row in samples {
        let Some(segment) = row.get(&params.segment_column) else {
            continue;
        };
        let segment = format_value(segment);
        let segment = segment.trim();
        if let Some(group) = groups.iter_mut().find(|g| g.label == segment) {
            if let Some(value) = row.get(&params.target_column) {
                group.values.push(value);
            }
        }
    }
    groups
}

/// Drop groups with no valid observations. Fewer than two remaining groups is
/// a failure; otherwise each dropped group becomes a warning.
fn usable_groups<T>(observed: Vec<Observed<T>>, warnings: &mut Vec<String>) -> Result<Vec<Observed<T>>, TestResult> {
    let mut usable = Vec::with_capacity(observed.len());
    for group in observed {
        if group.values.is_empty() {
            warnings.push(format!("group '{}' has no valid observations and was excluded", group.label));
        } else {
            usable.push(group);
        }
    }
    if usable.len() < 2 {
        return Err(fail(
            format!("need at least two groups with valid observations, found {}", usable.len()),
            std::mem::take(warnings),
        ));
    }
    Ok(usable)
}

fn interpret(test: TestType, labels: &[&str], p_value: f64, alpha: f64) -> (bool, String) {
    let significant = p_value < alpha;
    let groups = labels.join(", ");
    let text = if significant {
        format!(
            "Significant difference between {} ({}, p = {:.4} < {})",
            groups,
            test.label(),
            p_value,
            alpha
        )
    } else {
        format!(
            "No significant difference between {} ({}, p = {:.4} >= {})",
            groups,
            test.label(),
            p_value,
            alpha
        )
    };
    (significant, text)
}

// --- Numeric target ---

fn numeric_test(groups: Vec<Group<'_>>, options: &TestOptions) -> TestResult {
    let mut warnings = Vec::new();

    let observed: Vec<Observed<f64>> = groups
        .into_iter()
        .map(|group| {
            let mut values = Vec::with_capacity(group.values.len());
            let mut unparsed = 0;
            for value in group.values {
                if is_empty_value(Some(value)) {
                    continue;
                }
                match parse_numeric(value) {
                    Some(n) => values.push(n),
                    None => unparsed += 1,
                }
            }
            if unparsed > 0 {
                warnings.push(format!(
                    "group '{}': {} non-numeric value(s) ignored",
                    group.label, unparsed
                ));
            }
            Observed { label: group.label, values }
        })
        .collect();

    let usable = match usable_groups(observed, &mut warnings) {
        Ok(usable) => usable,
        Err(failure) => return failure,
    };
    if usable.len() != 2 {
        return fail(
            format!(
                "Welch's t-test compares exactly two groups; {} groups have data",
                usable.len()
            ),
            warnings,
        );
    }

    for group in &usable {
        if group.values.len() < options.min_numeric_group_size {
            warnings.push(format!(
                "group '{}' has only {} numeric observation(s); results may be unreliable",
                group.label,
                group.values.len()
            ));
        }
    }

    let a = describe(&usable[0].values);
    let b = describe(&usable[1].values);
    let (n1, n2) = (usable[0].values.len() as f64, usable[1].values.len() as f64);

    let se1 = a.variance / n1;
    let se2 = b.variance / n2;
    let pooled = se1 + se2;
    if !(pooled > 0.0 && pooled.is_finite()) {
        return fail("both groups have zero variance; the t statistic is undefined", warnings);
    }

    let t = (a.mean - b.mean) / pooled.sqrt();
    let df_term = |se: f64, n: f64| if n > 1.0 { se * se / (n - 1.0) } else { 0.0 };
    let df = pooled * pooled / (df_term(se1, n1) + df_term(se2, n2));
    let p_value = student_t_two_sided_p(t, df);

    let labels: Vec<&str> = usable.iter().map(|g| g.label.as_str()).collect();
    let (significant, interpretation) = interpret(TestType::WelchT, &labels, p_value, options.significance_level);

    let groups = usable
        .iter()
        .zip([a, b])
        .map(|(group, summary)| GroupSummary {
            label: group.label.clone(),
            size: group.values.len(),
            numeric: Some(summary),
            successes: None,
            proportion: None,
            categories: Vec::new(),
        })
        .collect();

    log::debug!("welch t = {:.4}, df = {:.2}, p = {:.4}", t, df, p_value);
    TestResult::Completed(TestOutcome {
        test_type: TestType::WelchT,
        statistic: t,
        degrees_of_freedom: Some(df),
        p_value,
        significant,
        significance_level: options.significance_level,
        interpretation,
        groups,
        warnings,
    })
}

/// Mean and Bessel-corrected variance (zero for a single observation).
fn describe(values: &[f64]) -> NumericSummary {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = if values.len() > 1 {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    NumericSummary {
        mean,
        std_dev: variance.sqrt(),
        variance,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

// --- Categorical target ---

fn categorical_test(groups: Vec<Group<'_>>, category: Option<&str>, options: &TestOptions) -> TestResult {
    let mut warnings = Vec::new();

    let observed: Vec<Observed<String>> = groups
        .into_iter()
        .map(|group| Observed {
            label: group.label,
            values: group
                .values
                .into_iter()
                .filter(|v| !is_empty_value(Some(*v)))
                .map(|v| format_value(v).trim().to_string())
                .collect(),
        })
        .collect();

    let usable = match usable_groups(observed, &mut warnings) {
        Ok(usable) => usable,
        Err(failure) => return failure,
    };

    match category {
        Some(category) if usable.len() == 2 => proportion_test(&usable, category, options, warnings),
        _ => chi_square_test(&usable, options, warnings),
    }
}

fn category_breakdown(values: &[String]) -> Vec<CategoryCount> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(c, _)| c == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value.clone(), 1)),
        }
    }
    // Stable: ties keep first-seen order.
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let total = values.len() as f64;
    counts
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category,
            count,
            share: count as f64 / total,
        })
        .collect()
}

fn proportion_test(
    groups: &[Observed<String>],
    category: &str,
    options: &TestOptions,
    mut warnings: Vec<String>,
) -> TestResult {
    for group in groups {
        if group.values.len() < options.min_proportion_group_size {
            warnings.push(format!(
                "group '{}' has only {} observation(s); the normal approximation may be poor",
                group.label,
                group.values.len()
            ));
        }
    }

    let successes: Vec<usize> = groups
        .iter()
        .map(|g| g.values.iter().filter(|v| v.as_str() == category).count())
        .collect();
    let sizes: Vec<f64> = groups.iter().map(|g| g.values.len() as f64).collect();

    let p1 = successes[0] as f64 / sizes[0];
    let p2 = successes[1] as f64 / sizes[1];
    let pooled = (successes[0] + successes[1]) as f64 / (sizes[0] + sizes[1]);
    let variance = pooled * (1.0 - pooled) * (1.0 / sizes[0] + 1.0 / sizes[1]);
    if !(variance > 0.0 && variance.is_finite()) {
        return fail(
            format!(
                "'{}' is present in every row or in none; the proportions cannot be compared",
                category
            ),
            warnings,
        );
    }

    let z = (p1 - p2) / variance.sqrt();
    let p_value = normal_two_sided_p(z);

    let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
    let (significant, interpretation) =
        interpret(TestType::TwoProportionZ, &labels, p_value, options.significance_level);

    let summaries = groups
        .iter()
        .zip(successes)
        .map(|(group, hits)| GroupSummary {
            label: group.label.clone(),
            size: group.values.len(),
            numeric: None,
            successes: Some(hits),
            proportion: Some(hits as f64 / group.values.len() as f64),
            categories: category_breakdown(&group.values),
        })
        .collect();

    log::debug!("two-proportion z = {:.4}, p = {:.6}", z, p_value);
    TestResult::Completed(TestOutcome {
        test_type: TestType::TwoProportionZ,
        statistic: z,
        degrees_of_freedom: None,
        p_value,
        significant,
        significance_level: options.significance_level,
        interpretation,
        groups: summaries,
        warnings,
    })
}

fn chi_square_test(groups: &[Observed<String>], options: &TestOptions, mut warnings: Vec<String>) -> TestResult {
    let mut categories: Vec<&str> = Vec::new();
    for group in groups {
        for value in &group.values {
            if !categories.contains(&value.as_str()) {
                categories.push(value);
            }
        }
    }

    let dof = (groups.len() - 1) * categories.len().saturating_sub(1);
    if dof == 0 {
        return fail(
            "only one target category was observed; there is nothing to compare",
            warnings,
        );
    }

    let table: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| {
            categories
                .iter()
                .map(|c| g.values.iter().filter(|v| v.as_str() == *c).count() as f64)
                .collect()
        })
        .collect();

    let row_totals: Vec<f64> = table.iter().map(|r| r.iter().sum()).collect();
    let col_totals: Vec<f64> = (0..categories.len())
        .map(|j| table.iter().map(|r| r[j]).sum())
        .collect();
    let total: f64 = row_totals.iter().sum();

    let mut stat = 0.0;
    let mut low_expected = 0;
    for (i, row) in table.iter().enumerate() {
        for (j, &observed) in row.iter().enumerate() {
            let expected = row_totals[i] * col_totals[j] / total;
            if expected < options.min_expected_count {
                low_expected += 1;
            }
            if expected > 0.0 {
                stat += (observed - expected).powi(2) / expected;
            }
        }
    }
    if low_expected > 0 {
        warnings.push(format!(
            "{} of {} cells have an expected count below {}; the chi-square approximation may be poor",
            low_expected,
            groups.len() * categories.len(),
            options.min_expected_count
        ));
    }

    let p_value = chi_square_sf(stat, dof as f64);
    let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
    let (significant, interpretation) =
        interpret(TestType::ChiSquare, &labels, p_value, options.significance_level);

    let summaries = groups
        .iter()
        .map(|group| GroupSummary {
            label: group.label.clone(),
            size: group.values.len(),
            numeric: None,
            successes: None,
            proportion: None,
            categories: category_breakdown(&group.values),
        })
        .collect();

    log::debug!("chi-square = {:.4}, dof = {}, p = {:.4}", stat, dof, p_value);
    TestResult::Completed(TestOutcome {
        test_type: TestType::ChiSquare,
        statistic: stat,
        degrees_of_freedom: Some(dof as f64),
        p_value,
        significant,
        significance_level: options.significance_level,
        interpretation,
        groups: summaries,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_rows(groups: &[(&str, &[f64])]) -> Vec<Row> {
        groups
            .iter()
            .flat_map(|(label, values)| {
                values.iter().map(move |v| Row::new().with("seg", *label).with("y", *v))
            })
            .collect()
    }

    fn category_rows(groups: &[(&str, &[(&str, usize)])]) -> Vec<Row> {
        let mut rows = Vec::new();
        for (label, counts) in groups {
            for (category, count) in counts.iter() {
                for _ in 0..*count {
                    rows.push(Row::new().with("seg", *label).with("y", *category));
                }
            }
        }
        rows
    }

    fn params(target_type: ColumnType, values: &[&str], category: Option<&str>) -> SegmentTestParams {
        SegmentTestParams {
            target_column: "y".into(),
            target_type,
            segment_column: "seg".into(),
            segment_values: values.iter().map(|v| v.to_string()).collect(),
            target_category: category.map(str::to_string),
        }
    }

    fn run(rows: &[Row], params: &SegmentTestParams) -> TestResult {
        compute_segment_test(rows, params, &TestOptions::default())
    }

    #[test]
    fn test_welch_identical_groups() {
        let data: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let rows = numeric_rows(&[("a", data), ("b", data)]);
        let result = run(&rows, &params(ColumnType::Numeric, &["a", "b"], None));
        let outcome = result.outcome().expect("test should run");
        assert_eq!(outcome.test_type, TestType::WelchT);
        assert_eq!(outcome.statistic, 0.0);
        assert!((outcome.p_value - 1.0).abs() < 1e-12);
        assert!(!outcome.significant);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_welch_swap_negates_statistic() {
        let rows = numeric_rows(&[
            ("a", &[10.0, 12.0, 11.0, 13.0, 12.5, 11.5]),
            ("b", &[14.0, 15.5, 13.0, 16.0, 15.0, 14.5, 17.0]),
        ]);
        let ab = run(&rows, &params(ColumnType::Numeric, &["a", "b"], None));
        let ba = run(&rows, &params(ColumnType::Numeric, &["b", "a"], None));
        let (ab, ba) = (ab.outcome().unwrap(), ba.outcome().unwrap());

        assert!(ab.statistic < 0.0);
        assert!((ab.statistic + ba.statistic).abs() < 1e-12);
        assert!((ab.p_value - ba.p_value).abs() < 1e-12);
        assert_eq!(ab.degrees_of_freedom, ba.degrees_of_freedom);
        assert!(ab.significant);
    }

    #[test]
    fn test_welch_statistic_and_df() {
        // means 2 and 5, variances 1 and 2, n = 3 and 6
        let rows = numeric_rows(&[("a", &[1.0, 2.0, 3.0]), ("b", &[3.0, 4.0, 5.0, 5.0, 6.0, 7.0])]);
        let result = run(&rows, &params(ColumnType::Numeric, &["a", "b"], None));
        let outcome = result.outcome().unwrap();

        let expected_t = -3.0 / (2.0f64 / 3.0).sqrt();
        assert!((outcome.statistic - expected_t).abs() < 1e-12);
        assert!((outcome.degrees_of_freedom.unwrap() - 4.0 / 0.7).abs() < 1e-9);

        let b = outcome.groups[1].numeric.as_ref().unwrap();
        assert_eq!(outcome.groups[0].size, 3);
        assert_eq!(b.mean, 5.0);
        assert!((b.variance - 2.0).abs() < 1e-12);
        assert_eq!((b.min, b.max), (3.0, 7.0));
        // Only group a is below the default minimum of 5
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_welch_zero_variance_fails() {
        let rows = numeric_rows(&[("a", &[2.0, 2.0]), ("b", &[2.0, 2.0])]);
        let result = run(&rows, &params(ColumnType::Numeric, &["a", "b"], None));
        assert!(!result.is_ok());
        assert!(result.failure_reason().unwrap().contains("variance"));
    }

    #[test]
    fn test_welch_needs_exactly_two_groups() {
        let rows = numeric_rows(&[("a", &[1.0, 2.0]), ("b", &[3.0, 4.0]), ("c", &[5.0, 7.0])]);
        let result = run(&rows, &params(ColumnType::Numeric, &["a", "b", "c"], None));
        assert!(result.failure_reason().unwrap().contains("exactly two"));
    }

    #[test]
    fn test_empty_group_excluded_with_warning() {
        let rows = numeric_rows(&[("a", &[1.0, 2.0, 3.0]), ("b", &[2.0, 4.0, 5.0])]);
        let result = run(&rows, &params(ColumnType::Numeric, &["a", "b", "zzz"], None));
        let outcome = result.outcome().expect("two usable groups remain");
        assert_eq!(outcome.groups.len(), 2);
        assert!(outcome.warnings.iter().any(|w| w.contains("'zzz'")));
    }

    #[test]
    fn test_too_few_usable_groups_fails() {
        let rows = numeric_rows(&[("a", &[1.0, 2.0, 3.0])]);
        let result = run(&rows, &params(ColumnType::Numeric, &["a", "b"], None));
        assert!(!result.is_ok());
        assert_eq!(result.warnings().len(), 1);
    }

    #[test]
    fn test_selection_validation() {
        let rows = numeric_rows(&[("a", &[1.0, 2.0])]);
        let result = run(&rows, &params(ColumnType::Numeric, &["a", " a "], None));
        assert!(result.failure_reason().unwrap().contains("at least two"));

        let bad_alpha = TestOptions { significance_level: 1.5, ..TestOptions::default() };
        let result = compute_segment_test(&rows, &params(ColumnType::Numeric, &["a", "b"], None), &bad_alpha);
        assert!(!result.is_ok());
    }

    #[test]
    fn test_numeric_text_cells_warn() {
        let mut rows = numeric_rows(&[("a", &[1.0, 2.0, 3.0, 4.0, 5.0]), ("b", &[2.0, 3.0, 4.0, 5.0, 7.0])]);
        rows.push(Row::new().with("seg", "a").with("y", "oops"));
        rows.push(Row::new().with("seg", "a").with("y", "n/a"));
        let result = run(&rows, &params(ColumnType::Numeric, &["a", "b"], None));
        let outcome = result.outcome().unwrap();
        assert_eq!(outcome.groups[0].size, 5);
        assert_eq!(outcome.warnings, vec!["group 'a': 1 non-numeric value(s) ignored".to_string()]);
    }

    #[test]
    fn test_proportion_strong_difference() {
        let rows = category_rows(&[
            ("a", &[("yes", 50), ("no", 50)]),
            ("b", &[("yes", 90), ("no", 10)]),
        ]);
        let result = run(&rows, &params(ColumnType::Text, &["a", "b"], Some("yes")));
        let outcome = result.outcome().unwrap();
        assert_eq!(outcome.test_type, TestType::TwoProportionZ);
        assert!(outcome.statistic.abs() > 5.0);
        assert!(outcome.p_value < 1e-5);
        assert!(outcome.significant);
        assert_eq!(outcome.groups[1].successes, Some(90));
        assert_eq!(outcome.groups[1].proportion, Some(0.9));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_proportion_small_groups_warn() {
        let rows = category_rows(&[
            ("a", &[("yes", 2), ("no", 3)]),
            ("b", &[("yes", 4), ("no", 1)]),
        ]);
        let result = run(&rows, &params(ColumnType::Text, &["a", "b"], Some("yes")));
        assert_eq!(result.warnings().len(), 2);
    }

    #[test]
    fn test_proportion_degenerate_fails() {
        let rows = category_rows(&[("a", &[("no", 12)]), ("b", &[("no", 12)])]);
        let result = run(&rows, &params(ColumnType::Text, &["a", "b"], Some("yes")));
        assert!(!result.is_ok());
    }

    #[test]
    fn test_chi_square_independent_table() {
        let rows = category_rows(&[
            ("a", &[("x", 10), ("y", 20), ("z", 30)]),
            ("b", &[("x", 20), ("y", 40), ("z", 60)]),
        ]);
        let result = run(&rows, &params(ColumnType::Text, &["a", "b"], None));
        let outcome = result.outcome().unwrap();
        assert_eq!(outcome.test_type, TestType::ChiSquare);
        assert!(outcome.statistic.abs() < 1e-12);
        assert_eq!(outcome.p_value, 1.0);
        assert_eq!(outcome.degrees_of_freedom, Some(2.0));
        assert!(!outcome.significant);
        assert!(outcome.interpretation.starts_with("No significant difference"));
    }

    #[test]
    fn test_chi_square_three_groups_with_category() {
        // A target category with more than two groups still runs chi-square
        let rows = category_rows(&[
            ("a", &[("x", 30), ("y", 5)]),
            ("b", &[("x", 5), ("y", 30)]),
            ("c", &[("x", 2), ("y", 1)]),
        ]);
        let result = run(&rows, &params(ColumnType::Text, &["a", "b", "c"], Some("x")));
        let outcome = result.outcome().unwrap();
        assert_eq!(outcome.test_type, TestType::ChiSquare);
        assert!(outcome.significant);
        assert!(outcome.warnings.iter().any(|w| w.contains("expected count")));
        assert_eq!(outcome.groups[0].categories[0].category, "x");
        assert_eq!(outcome.groups[1].categories[0].category, "y");
    }

    #[test]
    fn test_chi_square_single_category_fails() {
        let rows = category_rows(&[("a", &[("x", 5)]), ("b", &[("x", 7)])]);
        let result = run(&rows, &params(ColumnType::Text, &["a", "b"], None));
        assert!(result.failure_reason().unwrap().contains("one target category"));
    }

    #[test]
    fn test_unselected_segments_ignored() {
        let mut rows = category_rows(&[
            ("a", &[("x", 10), ("y", 10)]),
            ("b", &[("x", 10), ("y", 10)]),
        ]);
        rows.extend(category_rows(&[("other", &[("z", 50)])]));
        let result = run(&rows, &params(ColumnType::Text, &["a", "b"], None));
        let outcome = result.outcome().unwrap();
        assert_eq!(outcome.degrees_of_freedom, Some(1.0));
        assert_eq!(outcome.groups[0].size + outcome.groups[1].size, 40);
    }
}
