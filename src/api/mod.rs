//! Collaborator contract for the scheduling backend.
//!
//! The orchestrator never talks HTTP directly; it goes through [`SchedulerApi`] so
//! that runs and saves can be driven against the real backend or an in-memory fake.

mod http;

pub use http::HttpSchedulerApi;

use crate::error::{ConfigUnavailable, PersistError, RemoteError};
use crate::model::{AllocationProposal, OptimizerDefaults, PersistAssignment, RunConfig, Semester};
use async_trait::async_trait;

#[async_trait]
pub trait SchedulerApi: Send + Sync {
    /// Default optimizer parameters advertised by the backend.
    async fn fetch_default_config(&self) -> Result<OptimizerDefaults, ConfigUnavailable>;

    /// Semesters that can be targeted by a run.
    async fn fetch_semester_candidates(&self) -> Result<Vec<Semester>, RemoteError>;

    /// Run the optimizer to completion. Single request/response, no progress signal.
    async fn execute_optimization(
        &self,
        config: &RunConfig,
    ) -> Result<AllocationProposal, RemoteError>;

    /// Persist a batch of assignments in one call.
    async fn persist_assignments(
        &self,
        assignments: &[PersistAssignment],
    ) -> Result<(), PersistError>;

    async fn persist_assignment(&self, assignment: &PersistAssignment) -> Result<(), PersistError>;
}
