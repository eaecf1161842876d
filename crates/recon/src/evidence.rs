use std::collections::BTreeMap;

use crate::model::{Category, CategoryCounts, ReconSummary, ReconciliationResult, Verdict};

/// Compute summary statistics from classified results.
///
/// Every verdict and every category appears in the maps, zero counts included,
/// so summaries of different runs line up column for column.
pub fn compute_summary(results: &[ReconciliationResult], diagnostics: usize) -> ReconSummary {
    let mut verdict_counts: BTreeMap<Verdict, usize> =
        [(Verdict::Ok, 0), (Verdict::ReviewRequired, 0)].into_iter().collect();
    let mut categories: BTreeMap<Category, CategoryCounts> = Category::ALL
        .iter()
        .map(|&c| (c, CategoryCounts::default()))
        .collect();
    let mut billed_lines = 0;

    for r in results {
        *verdict_counts.entry(r.verdict).or_insert(0) += 1;

        let counts = categories.entry(r.category).or_default();
        counts.total += 1;
        match r.verdict {
            Verdict::Ok => counts.ok += 1,
            Verdict::ReviewRequired => counts.review_required += 1,
        }

        if r.should_charge == Some(true) {
            billed_lines += 1;
        }
    }

    let ok = verdict_counts[&Verdict::Ok];
    let review_required = verdict_counts[&Verdict::ReviewRequired];

    ReconSummary {
        total_lines: results.len(),
        billed_lines,
        ok,
        review_required,
        issue_rate_percent: issue_rate(review_required, results.len()),
        verdict_counts,
        categories,
        diagnostics,
    }
}

/// Percentage with one decimal; 0 for an empty run.
fn issue_rate(issues: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (issues as f64 * 1000.0 / total as f64).round() / 10.0
}
