//! Run lifecycle controller.
//!
//! Owns start/cancel orchestration and publishes `RunState` for presentation layers.
//! Only the controller writes the state; the engine talks to it through events.

use crate::api::SchedulerApi;
use crate::config::ConfigBounds;
use crate::engine::animator::{default_stages, Stage, StageAnimator, DEFAULT_TICKS_PER_STAGE};
use crate::engine::RunEngine;
use crate::error::RunError;
use crate::model::{AllocationProposal, RunConfig, RunEvent, RunId, RunProgress, RunState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const AWAITING_OPTIMIZER_LABEL: &str = "Waiting for optimizer";

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub stages: Vec<Stage>,
    pub ticks_per_stage: u32,
    pub bounds: ConfigBounds,
    /// Upper bound on the optimizer call; `None` waits indefinitely.
    pub remote_timeout: Option<Duration>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            ticks_per_stage: DEFAULT_TICKS_PER_STAGE,
            bounds: ConfigBounds::default(),
            remote_timeout: None,
        }
    }
}

/// State shared with the run task. The current run id gates every publication so
/// that a superseded run can never touch the state again.
struct Shared {
    current: Mutex<RunId>,
    state_tx: watch::Sender<RunState>,
}

impl Shared {
    fn current(&self) -> MutexGuard<'_, RunId> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, run_id: RunId, state: RunState) -> bool {
        let current = self.current();
        if *current != run_id {
            tracing::debug!(run_id, current = *current, "discarding update from stale run");
            return false;
        }
        self.state_tx.send_replace(state);
        true
    }
}

pub struct RunController {
    api: Arc<dyn SchedulerApi>,
    options: ControllerOptions,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RunController {
    pub fn new(api: Arc<dyn SchedulerApi>, options: ControllerOptions) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            api,
            options,
            shared: Arc::new(Shared {
                current: Mutex::new(0),
                state_tx,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.shared.state_tx.subscribe()
    }

    pub fn state(&self) -> RunState {
        self.shared.state_tx.borrow().clone()
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a run. Must be called from within a Tokio runtime.
    pub fn start(&self, cfg: RunConfig) -> Result<RunId, RunError> {
        self.options.bounds.validate(&cfg)?;

        let run_id = {
            let mut current = self.shared.current();
            if self.shared.state_tx.borrow().is_running() {
                return Err(RunError::RunAlreadyActive);
            }
            *current += 1;
            self.shared.state_tx.send_replace(RunState::Running {
                run_id: *current,
                progress: RunProgress::zero(),
            });
            *current
        };

        tracing::info!(
            run_id,
            semester = %cfg.semester,
            population = cfg.population_size,
            generations = cfg.generations,
            "allocation run started"
        );

        let generations = cfg.generations;
        let animator = StageAnimator::new(self.options.stages.clone())
            .with_ticks_per_stage(self.options.ticks_per_stage);
        let engine = RunEngine::new(self.api.clone(), cfg, animator)
            .with_remote_timeout(self.options.remote_timeout);
        let shared = self.shared.clone();
        let handle = tokio::spawn(supervise(shared, run_id, engine, generations));

        if let Some(previous) = self.task().replace(handle) {
            // Already settled, or `start` would have been rejected above.
            previous.abort();
        }
        Ok(run_id)
    }

    /// Abort the active run, if any, and return to `Idle`.
    ///
    /// Pending animation timers and the in-flight optimizer call are dropped; a result
    /// that still arrives later is discarded.
    pub fn cancel(&self) -> bool {
        let run_id = {
            let mut current = self.shared.current();
            if !self.shared.state_tx.borrow().is_running() {
                return false;
            }
            let run_id = *current;
            *current += 1;
            self.shared.state_tx.send_replace(RunState::Idle);
            run_id
        };
        if let Some(handle) = self.task().take() {
            handle.abort();
        }
        tracing::info!(run_id, "allocation run cancelled");
        true
    }

    /// Clear a finished run's outcome. Returns false while a run is active.
    pub fn reset(&self) -> bool {
        let _current = self.shared.current();
        let state = self.shared.state_tx.borrow().clone();
        if state.is_running() {
            return false;
        }
        if state.is_terminal() {
            self.shared.state_tx.send_replace(RunState::Idle);
        }
        true
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        if let Some(handle) = self.task().take() {
            handle.abort();
        }
    }
}

/// Drive one run and translate engine events into `RunState` updates.
async fn supervise(shared: Arc<Shared>, run_id: RunId, engine: RunEngine, generations: u32) {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let run = engine.run(event_tx);
    tokio::pin!(run);

    let mut progress = RunProgress::zero();
    let outcome = loop {
        tokio::select! {
            biased;
            Some(ev) = event_rx.recv() => {
                match ev {
                    RunEvent::Stage(tick) => {
                        progress = RunProgress::from_tick(&tick, generations);
                    }
                    RunEvent::AwaitingOptimizer => {
                        progress.stage_label = AWAITING_OPTIMIZER_LABEL.to_string();
                    }
                    RunEvent::ResultBuffered => {
                        tracing::debug!(run_id, "holding optimizer result until the animation ends");
                        continue;
                    }
                }
                shared.publish(run_id, RunState::Running { run_id, progress: progress.clone() });
            }
            res = &mut run => break res,
        }
    };

    // Events still queued at this point are superseded by the terminal state.
    match outcome {
        Ok(proposal) => {
            tracing::info!(
                run_id,
                assignments = proposal.assignments().len(),
                fitness = proposal.quality.total_fitness,
                "allocation run succeeded"
            );
            shared.publish(
                run_id,
                RunState::Succeeded {
                    run_id,
                    progress: RunProgress::completed(generations),
                    proposal: Arc::new(proposal),
                },
            );
        }
        Err(error) => {
            tracing::warn!(run_id, %error, "allocation run failed");
            shared.publish(run_id, RunState::Failed { run_id, error });
        }
    }
}

/// Wait until the run observed by `rx` settles.
pub async fn wait_for_outcome(
    rx: &mut watch::Receiver<RunState>,
) -> Result<Arc<AllocationProposal>, RunError> {
    loop {
        {
            let state = rx.borrow_and_update();
            match &*state {
                RunState::Succeeded { proposal, .. } => return Ok(proposal.clone()),
                RunState::Failed { error, .. } => return Err(RunError::Remote(error.clone())),
                RunState::Idle => return Err(RunError::Cancelled),
                RunState::Running { .. } => {}
            }
        }
        rx.changed().await.map_err(|_| RunError::Cancelled)?;
    }
}
