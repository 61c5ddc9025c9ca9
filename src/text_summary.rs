//! Text summary builder for CLI output.
//!
//! Formats a proposal and its save statuses as human-readable lines for text mode.

use crate::metrics;
use crate::model::{AllocationProposal, OfferingId, SaveStatus};
use std::collections::HashMap;

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

fn status_label(status: Option<SaveStatus>) -> &'static str {
    match status {
        Some(SaveStatus::Saved) => "saved",
        Some(SaveStatus::Saving) => "saving",
        Some(SaveStatus::Unsaved) | None => "unsaved",
    }
}

/// Build a text summary of `proposal`. `statuses` comes from the save reconciler and
/// may be empty when nothing has been loaded into it.
pub fn build_text_summary(
    proposal: &AllocationProposal,
    statuses: &[(OfferingId, SaveStatus)],
) -> TextSummary {
    let mut lines = Vec::new();
    let summary = &proposal.summary;
    let params = &proposal.parameters;

    lines.push(format!(
        "Semester: {} (optimized in {:.1}s)",
        proposal.semester, proposal.elapsed_secs
    ));
    lines.push(format!(
        "Parameters: population {} generations {} crossover {:.2} mutation {:.2}",
        params.population_size,
        params.generations,
        params.crossover_probability,
        params.mutation_probability
    ));
    let p = &proposal.quality.penalties;
    lines.push(format!(
        "Fitness: {:.4} (penalties: incompetence {:.2}, overload {:.2}, imbalance {:.2})",
        proposal.quality.total_fitness, p.incompetence, p.overload, p.imbalance
    ));
    lines.push(format!(
        "Offerings: {} total, {} matched, {} unmatched ({:.1}% compatible)",
        summary.total_offerings,
        summary.matched_offerings,
        summary.unmatched_offerings,
        summary.compatibility_pct
    ));
    lines.push(format!(
        "Instructors used: {} of {}",
        summary.instructors_used, summary.total_instructors
    ));

    if let Some((mean, median, p25, p75)) =
        metrics::compute_metrics(&metrics::load_utilisation(proposal))
    {
        lines.push(format!(
            "Load utilisation: avg {mean:.1}% med {median:.1}% p25 {p25:.1}% p75 {p75:.1}%"
        ));
    }

    if proposal.feasibility.feasible {
        lines.push("Feasible: yes".to_string());
    } else {
        lines.push("Feasible: no".to_string());
        for problem in &proposal.feasibility.problems {
            lines.push(format!("  - {problem}"));
        }
    }

    let by_id: HashMap<OfferingId, SaveStatus> = statuses.iter().copied().collect();
    let saved = statuses
        .iter()
        .filter(|(_, s)| *s == SaveStatus::Saved)
        .count();
    lines.push(format!(
        "Assignments ({} saved of {}):",
        saved,
        proposal.assignments().len()
    ));
    for a in proposal.assignments() {
        let area = if a.compatible { "" } else { " [no area match]" };
        lines.push(format!(
            "  #{:<6} {} {} -> {} (id {}) {:.0}h [{}]{}",
            a.offering_id,
            a.course_name,
            a.section,
            a.instructor_name,
            a.instructor_id,
            a.course_hours,
            status_label(by_id.get(&a.offering_id).copied()),
            area
        ));
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::sample_proposal;

    #[test]
    fn lists_every_assignment_with_its_status() {
        let proposal = sample_proposal("2024.1", &[(1, 10), (2, 20)]);
        let summary = build_text_summary(
            &proposal,
            &[(1, SaveStatus::Saved), (2, SaveStatus::Unsaved)],
        );

        assert_eq!(summary.lines[0], "Semester: 2024.1 (optimized in 1.5s)");
        assert!(summary
            .lines
            .iter()
            .any(|l| l == "Assignments (1 saved of 2):"));
        let rows: Vec<&String> = summary.lines.iter().filter(|l| l.starts_with("  #")).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains("Instructor 10") && rows[0].ends_with("[saved]"));
        assert!(rows[1].ends_with("[unsaved]"));
    }

    #[test]
    fn infeasible_proposals_list_their_problems() {
        let mut proposal = sample_proposal("2024.1", &[(1, 10)]);
        proposal.feasibility.feasible = false;
        proposal.feasibility.problems = vec!["Instructor 10 overloaded".into()];

        let summary = build_text_summary(&proposal, &[]);

        assert!(summary.lines.contains(&"Feasible: no".to_string()));
        assert!(summary
            .lines
            .contains(&"  - Instructor 10 overloaded".to_string()));
    }
}
