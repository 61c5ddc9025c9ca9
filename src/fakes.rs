//! In-memory scripted [`SchedulerApi`] (testing only).
//!
//! Optimization replies are queued ahead of time and can be immediate, delayed, or
//! held open until the test releases them. Every call is recorded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::api::SchedulerApi;
use crate::error::{ConfigUnavailable, PersistError, RemoteError};
use crate::model::{
    AllocationProposal, Feasibility, FitnessEvolution, InstructorId, OfferingId,
    OptimizerDefaults, OptimizerParameters, PersistAssignment, ProposalSummary,
    ProposedAllocation, ProposedAssignment, QualityMetrics, RunConfig, Semester,
};

type OptimizationResult = Result<AllocationProposal, RemoteError>;

/// How the fake answers one optimization call.
pub enum Reply {
    Immediate(OptimizationResult),
    After(Duration, OptimizationResult),
    Gated(oneshot::Receiver<OptimizationResult>),
}

#[derive(Default)]
pub struct ScriptedApi {
    defaults: Mutex<Option<Result<OptimizerDefaults, ConfigUnavailable>>>,
    semesters: Mutex<Vec<Semester>>,
    replies: Mutex<VecDeque<Reply>>,
    optimization_calls: AtomicUsize,
    persist_delay: Mutex<Duration>,
    persist_failures: Mutex<VecDeque<PersistError>>,
    bulk_batches: Mutex<Vec<Vec<PersistAssignment>>>,
    single_persists: Mutex<Vec<PersistAssignment>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_defaults(&self, defaults: Result<OptimizerDefaults, ConfigUnavailable>) {
        *lock(&self.defaults) = Some(defaults);
    }

    pub fn set_semesters(&self, semesters: Vec<Semester>) {
        *lock(&self.semesters) = semesters;
    }

    pub fn push_reply(&self, reply: Reply) {
        lock(&self.replies).push_back(reply);
    }

    /// Queue a reply that stays pending until the returned sender is used.
    pub fn gate_optimization(&self) -> oneshot::Sender<OptimizationResult> {
        let (tx, rx) = oneshot::channel();
        self.push_reply(Reply::Gated(rx));
        tx
    }

    pub fn optimization_calls(&self) -> usize {
        self.optimization_calls.load(Ordering::SeqCst)
    }

    /// Delay applied to every persist call before it settles.
    pub fn set_persist_delay(&self, delay: Duration) {
        *lock(&self.persist_delay) = delay;
    }

    /// The next persist call (bulk or single) fails with `err`.
    pub fn fail_next_persist(&self, err: PersistError) {
        lock(&self.persist_failures).push_back(err);
    }

    pub fn bulk_batches(&self) -> Vec<Vec<PersistAssignment>> {
        lock(&self.bulk_batches).clone()
    }

    pub fn single_persists(&self) -> Vec<PersistAssignment> {
        lock(&self.single_persists).clone()
    }

    async fn settle_persist(&self) -> Result<(), PersistError> {
        let delay = *lock(&self.persist_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = lock(&self.persist_failures).pop_front();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SchedulerApi for ScriptedApi {
    async fn fetch_default_config(&self) -> Result<OptimizerDefaults, ConfigUnavailable> {
        lock(&self.defaults).clone().unwrap_or_else(|| {
            let cfg = RunConfig::builtin();
            Ok(OptimizerDefaults {
                parameters: cfg.parameters(),
                elite_size: None,
                tournament_size: None,
                seed: None,
            })
        })
    }

    async fn fetch_semester_candidates(&self) -> Result<Vec<Semester>, RemoteError> {
        Ok(lock(&self.semesters).clone())
    }

    async fn execute_optimization(
        &self,
        config: &RunConfig,
    ) -> Result<AllocationProposal, RemoteError> {
        self.optimization_calls.fetch_add(1, Ordering::SeqCst);
        let reply = lock(&self.replies).pop_front();
        match reply {
            None => Ok(sample_proposal(&config.semester, &[(1, 10), (2, 20)])),
            Some(Reply::Immediate(result)) => result,
            Some(Reply::After(delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            Some(Reply::Gated(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(RemoteError::Transport("reply gate dropped".into()))),
        }
    }

    async fn persist_assignments(
        &self,
        assignments: &[PersistAssignment],
    ) -> Result<(), PersistError> {
        lock(&self.bulk_batches).push(assignments.to_vec());
        self.settle_persist().await
    }

    async fn persist_assignment(&self, assignment: &PersistAssignment) -> Result<(), PersistError> {
        lock(&self.single_persists).push(*assignment);
        self.settle_persist().await
    }
}

/// Build a proposal with one compatible assignment per `(offering, instructor)` pair.
pub fn sample_proposal(
    semester: &str,
    pairs: &[(OfferingId, InstructorId)],
) -> AllocationProposal {
    let assignments: Vec<ProposedAssignment> = pairs
        .iter()
        .enumerate()
        .map(|(i, &(offering_id, instructor_id))| ProposedAssignment {
            idx: i as u32,
            offering_id,
            instructor_id,
            instructor_name: format!("Instructor {instructor_id}"),
            course_name: format!("Course {offering_id}"),
            section: "A".into(),
            course_hours: 4.0,
            max_load: 16.0,
            allocated_load: 4.0,
            course_area: "Computing".into(),
            compatible: true,
            instructor_level: 3,
            expected_level: 2,
            degree: "PhD".into(),
            contract: "full-time".into(),
            match_label: "ok".into(),
        })
        .collect();
    let n = assignments.len() as u32;
    AllocationProposal {
        semester: semester.to_string(),
        elapsed_secs: 1.5,
        parameters: OptimizerParameters {
            population_size: 100,
            generations: 50,
            crossover_probability: 0.7,
            mutation_probability: 0.2,
        },
        allocation: ProposedAllocation {
            total_offerings: n,
            assignments,
        },
        quality: QualityMetrics {
            total_fitness: 0.95,
            ..Default::default()
        },
        summary: ProposalSummary {
            total_offerings: n,
            matched_offerings: n,
            unmatched_offerings: 0,
            compatibility_pct: 100.0,
            instructors_used: n,
            total_instructors: n,
            load_distribution: Vec::new(),
            total_fitness: 0.95,
        },
        feasibility: Feasibility {
            feasible: true,
            problems: Vec::new(),
        },
        fitness_evolution: FitnessEvolution::default(),
    }
}
