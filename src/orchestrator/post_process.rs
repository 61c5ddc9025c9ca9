//! Post-run processing utilities.
//!
//! After a run succeeds: load the proposal into the reconciler, apply reassignments,
//! perform the requested saves, then export.

use super::reconciler::{SaveOutcome, SaveStateReconciler};
use crate::model::{AllocationProposal, InstructorId, OfferingId, SaveStatus};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What the caller asked for once the proposal is in.
#[derive(Debug, Clone, Default)]
pub struct PostRunActions {
    pub reassignments: Vec<(OfferingId, InstructorId)>,
    pub save_all: bool,
    pub save_offerings: Vec<OfferingId>,
    pub export_json: Option<PathBuf>,
}

/// Result of post-run processing, ready for presentation layers.
#[derive(Debug, Default)]
pub struct ProcessedRun {
    pub messages: Vec<String>,
    /// Number of requested actions that failed.
    pub failures: usize,
    pub exported_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct StatusEntry {
    offering_id: OfferingId,
    instructor_id: Option<InstructorId>,
    status: SaveStatus,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    proposal: &'a AllocationProposal,
    save_statuses: Vec<StatusEntry>,
}

/// Serialize the proposal with its current save statuses as pretty JSON.
pub fn export_document(
    proposal: &AllocationProposal,
    reconciler: &SaveStateReconciler,
) -> Result<String> {
    let save_statuses = reconciler
        .snapshot()
        .into_iter()
        .map(|(offering_id, status)| StatusEntry {
            offering_id,
            instructor_id: reconciler.instructor_for(offering_id),
            status,
        })
        .collect();
    serde_json::to_string_pretty(&ExportDocument {
        proposal,
        save_statuses,
    })
    .context("failed to serialize proposal")
}

pub fn export_json(
    path: &Path,
    proposal: &AllocationProposal,
    reconciler: &SaveStateReconciler,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let doc = export_document(proposal, reconciler)?;
    std::fs::write(path, doc).with_context(|| format!("failed to write {}", path.display()))
}

/// Process a successful run. Individual failures are reported in `messages` and
/// counted; they never stop the remaining actions.
pub async fn process_run_completion(
    reconciler: &SaveStateReconciler,
    proposal: Arc<AllocationProposal>,
    actions: &PostRunActions,
) -> ProcessedRun {
    let mut out = ProcessedRun::default();
    reconciler.load_proposal(proposal.clone());

    for &(offering_id, instructor_id) in &actions.reassignments {
        match reconciler.reassign(offering_id, instructor_id) {
            Ok(()) => out.messages.push(format!(
                "Offering {offering_id} reassigned to instructor {instructor_id}"
            )),
            Err(e) => {
                out.failures += 1;
                out.messages
                    .push(format!("Reassigning offering {offering_id} failed: {e}"));
            }
        }
    }

    for &offering_id in &actions.save_offerings {
        match reconciler.save_one(offering_id).await {
            Ok(SaveOutcome::Persisted { .. }) => {
                out.messages.push(format!("Saved offering {offering_id}"))
            }
            Ok(SaveOutcome::AlreadyComplete) => out
                .messages
                .push(format!("Offering {offering_id} already saved")),
            Err(e) => {
                out.failures += 1;
                out.messages
                    .push(format!("Saving offering {offering_id} failed: {e}"));
            }
        }
    }

    if actions.save_all {
        match reconciler.save_all().await {
            Ok(SaveOutcome::Persisted { count }) => {
                out.messages.push(format!("Saved {count} assignment(s)"))
            }
            Ok(SaveOutcome::AlreadyComplete) => {
                out.messages.push("All assignments already saved".into())
            }
            Err(e) => {
                out.failures += 1;
                out.messages.push(format!("Saving all assignments failed: {e}"));
            }
        }
    }

    if let Some(path) = actions.export_json.as_deref() {
        match export_json(path, &proposal, reconciler) {
            Ok(()) => {
                out.messages.push(format!("Exported JSON: {}", path.display()));
                out.exported_path = Some(path.to_path_buf());
            }
            Err(e) => {
                out.failures += 1;
                out.messages.push(format!("Export JSON failed: {e:#}"));
            }
        }
    }

    out
}
