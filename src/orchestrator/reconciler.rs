//! Save-state tracking for a proposal's assignments.
//!
//! Every status change is a check-and-set under one mutex, so the per-offering
//! `Saving` marker is a real guard even on a multi-threaded runtime. Each loaded
//! proposal opens a new epoch; persist outcomes from an older epoch are dropped.

use crate::api::SchedulerApi;
use crate::error::SaveError;
use crate::model::{
    AllocationProposal, InstructorId, OfferingId, PersistAssignment, ProposedAssignment,
    SaveStatus,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing left to persist; no call was made.
    AlreadyComplete,
    Persisted { count: usize },
}

#[derive(Default)]
struct Ledger {
    epoch: u64,
    proposal: Option<Arc<AllocationProposal>>,
    statuses: HashMap<OfferingId, SaveStatus>,
    overrides: HashMap<OfferingId, InstructorId>,
}

impl Ledger {
    fn status(&self, offering_id: OfferingId) -> SaveStatus {
        self.statuses
            .get(&offering_id)
            .copied()
            .unwrap_or(SaveStatus::Unsaved)
    }

    fn proposal(&self) -> Result<Arc<AllocationProposal>, SaveError> {
        self.proposal.clone().ok_or(SaveError::NoProposal)
    }

    fn in_flight(&self) -> Vec<OfferingId> {
        let mut ids: Vec<OfferingId> = self
            .statuses
            .iter()
            .filter(|(_, s)| **s == SaveStatus::Saving)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn payload(&self, a: &ProposedAssignment) -> PersistAssignment {
        PersistAssignment {
            offering_id: a.offering_id,
            instructor_id: self
                .overrides
                .get(&a.offering_id)
                .copied()
                .unwrap_or(a.instructor_id),
        }
    }
}

pub struct SaveStateReconciler {
    api: Arc<dyn SchedulerApi>,
    ledger: Mutex<Ledger>,
}

/// Marks a set of offerings as `Saving` for the lifetime of one persist call. If the
/// call's future is dropped before settling, the marks are rolled back to `Unsaved`.
struct SavingGuard<'a> {
    reconciler: &'a SaveStateReconciler,
    epoch: u64,
    offering_ids: Vec<OfferingId>,
    armed: bool,
}

impl SavingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut ledger = self.reconciler.ledger();
        if ledger.epoch != self.epoch {
            return;
        }
        tracing::debug!(offerings = ?self.offering_ids, "save abandoned; reverting to unsaved");
        for id in &self.offering_ids {
            ledger.statuses.insert(*id, SaveStatus::Unsaved);
        }
    }
}

impl SaveStateReconciler {
    pub fn new(api: Arc<dyn SchedulerApi>) -> Self {
        Self {
            api,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a new proposal and forget all save state from the previous one.
    pub fn load_proposal(&self, proposal: Arc<AllocationProposal>) {
        let mut ledger = self.ledger();
        ledger.epoch += 1;
        ledger.statuses.clear();
        ledger.overrides.clear();
        tracing::debug!(
            epoch = ledger.epoch,
            assignments = proposal.assignments().len(),
            "proposal loaded"
        );
        ledger.proposal = Some(proposal);
    }

    pub fn proposal(&self) -> Option<Arc<AllocationProposal>> {
        self.ledger().proposal.clone()
    }

    /// Status of one offering, or `None` when it isn't part of the current proposal.
    pub fn status(&self, offering_id: OfferingId) -> Option<SaveStatus> {
        let ledger = self.ledger();
        let proposal = ledger.proposal.as_ref()?;
        proposal.assignment(offering_id)?;
        Some(ledger.status(offering_id))
    }

    /// Statuses in proposal order.
    pub fn snapshot(&self) -> Vec<(OfferingId, SaveStatus)> {
        let ledger = self.ledger();
        let Some(proposal) = ledger.proposal.as_ref() else {
            return Vec::new();
        };
        proposal
            .assignments()
            .iter()
            .map(|a| (a.offering_id, ledger.status(a.offering_id)))
            .collect()
    }

    pub fn unsaved_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|(_, s)| *s != SaveStatus::Saved)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.proposal().is_some() && self.unsaved_count() == 0
    }

    /// Instructor that will be persisted for `offering_id`, including any reassignment.
    pub fn instructor_for(&self, offering_id: OfferingId) -> Option<InstructorId> {
        let ledger = self.ledger();
        let assignment = ledger.proposal.as_ref()?.assignment(offering_id)?;
        Some(ledger.payload(assignment).instructor_id)
    }

    /// Override the proposed instructor for an offering that hasn't been saved yet.
    pub fn reassign(
        &self,
        offering_id: OfferingId,
        instructor_id: InstructorId,
    ) -> Result<(), SaveError> {
        let mut ledger = self.ledger();
        let proposal = ledger.proposal()?;
        let proposed = proposal
            .assignment(offering_id)
            .ok_or(SaveError::UnknownOffering(offering_id))?;
        match ledger.status(offering_id) {
            SaveStatus::Saved => return Err(SaveError::AlreadySaved(offering_id)),
            SaveStatus::Saving => {
                return Err(SaveError::InProgress {
                    offering_ids: vec![offering_id],
                })
            }
            SaveStatus::Unsaved => {}
        }
        if proposed.instructor_id == instructor_id {
            ledger.overrides.remove(&offering_id);
        } else {
            ledger.overrides.insert(offering_id, instructor_id);
        }
        Ok(())
    }

    /// Persist every assignment not yet saved in one bulk call.
    ///
    /// On success every assignment of the proposal is `Saved`. On failure the entries
    /// sent in this call go back to `Unsaved`; the bulk call is treated as all-or-nothing.
    pub async fn save_all(&self) -> Result<SaveOutcome, SaveError> {
        let (guard, batch) = {
            let mut ledger = self.ledger();
            let proposal = ledger.proposal()?;
            let in_flight = ledger.in_flight();
            if !in_flight.is_empty() {
                return Err(SaveError::InProgress {
                    offering_ids: in_flight,
                });
            }
            let batch: Vec<PersistAssignment> = proposal
                .assignments()
                .iter()
                .filter(|a| ledger.status(a.offering_id) != SaveStatus::Saved)
                .map(|a| ledger.payload(a))
                .collect();
            if batch.is_empty() {
                return Ok(SaveOutcome::AlreadyComplete);
            }
            for a in &batch {
                ledger.statuses.insert(a.offering_id, SaveStatus::Saving);
            }
            let guard = SavingGuard {
                reconciler: self,
                epoch: ledger.epoch,
                offering_ids: batch.iter().map(|a| a.offering_id).collect(),
                armed: true,
            };
            (guard, batch)
        };

        tracing::info!(count = batch.len(), "saving assignments");
        let result = self.api.persist_assignments(&batch).await;

        let mut ledger = self.ledger();
        let current = ledger.epoch == guard.epoch;
        match result {
            Ok(()) => {
                if current {
                    if let Some(proposal) = ledger.proposal.clone() {
                        for a in proposal.assignments() {
                            ledger.statuses.insert(a.offering_id, SaveStatus::Saved);
                        }
                    }
                }
                drop(ledger);
                guard.disarm();
                Ok(SaveOutcome::Persisted { count: batch.len() })
            }
            Err(e) => {
                tracing::warn!(error = %e, count = batch.len(), "bulk save failed");
                // Dropping the armed guard rolls the batch back to `Unsaved`.
                drop(ledger);
                drop(guard);
                Err(SaveError::Persist(e))
            }
        }
    }

    /// Persist a single assignment. A second call for the same offering while the
    /// first is in flight is rejected; calls for different offerings are independent.
    pub async fn save_one(&self, offering_id: OfferingId) -> Result<SaveOutcome, SaveError> {
        let (guard, payload) = {
            let mut ledger = self.ledger();
            let proposal = ledger.proposal()?;
            let assignment = proposal
                .assignment(offering_id)
                .ok_or(SaveError::UnknownOffering(offering_id))?;
            match ledger.status(offering_id) {
                SaveStatus::Saved => return Ok(SaveOutcome::AlreadyComplete),
                SaveStatus::Saving => {
                    return Err(SaveError::InProgress {
                        offering_ids: vec![offering_id],
                    })
                }
                SaveStatus::Unsaved => {}
            }
            let payload = ledger.payload(assignment);
            ledger.statuses.insert(offering_id, SaveStatus::Saving);
            let guard = SavingGuard {
                reconciler: self,
                epoch: ledger.epoch,
                offering_ids: vec![offering_id],
                armed: true,
            };
            (guard, payload)
        };

        let result = self.api.persist_assignment(&payload).await;

        match result {
            Ok(()) => {
                let mut ledger = self.ledger();
                if ledger.epoch == guard.epoch {
                    ledger.statuses.insert(offering_id, SaveStatus::Saved);
                }
                drop(ledger);
                guard.disarm();
                tracing::info!(offering_id, instructor_id = payload.instructor_id, "assignment saved");
                Ok(SaveOutcome::Persisted { count: 1 })
            }
            Err(e) => {
                tracing::warn!(offering_id, error = %e, "assignment save failed");
                drop(guard);
                Err(SaveError::Persist(e))
            }
        }
    }
}
