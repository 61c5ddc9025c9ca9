/// Summary statistics (mean, median, 25th percentile, 75th percentile) over samples.
///
/// Returns `None` for fewer than two samples. Non-finite samples are ignored.
pub fn compute_metrics(samples: &[f64]) -> Option<(f64, f64, f64, f64)> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.len() < 2 {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let median = sorted[n / 2];
    let p25 = sorted[n / 4];
    let p75 = sorted[3 * n / 4];
    Some((mean, median, p25, p75))
}

/// Load utilisation per instructor, in percent of their maximum load.
///
/// Uses the proposal's own load distribution when present, otherwise derives it
/// from the assignments (one sample per distinct instructor).
pub fn load_utilisation(proposal: &crate::model::AllocationProposal) -> Vec<f64> {
    let reported: Vec<f64> = proposal
        .summary
        .load_distribution
        .iter()
        .map(|l| l.utilisation_pct)
        .collect();
    if !reported.is_empty() {
        return reported;
    }

    let mut seen = std::collections::HashMap::new();
    for a in proposal.assignments() {
        if a.max_load > 0.0 {
            seen.entry(a.instructor_id)
                .or_insert(a.allocated_load / a.max_load * 100.0);
        }
    }
    seen.into_values().collect()
}
