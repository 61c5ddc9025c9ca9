pub mod animator;

use crate::api::SchedulerApi;
use crate::error::RemoteError;
use crate::model::{AllocationProposal, RunConfig, RunEvent};
use animator::StageAnimator;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One allocation run: the remote optimizer call joined with the stage animation.
pub struct RunEngine {
    api: Arc<dyn SchedulerApi>,
    cfg: RunConfig,
    animator: StageAnimator,
    remote_timeout: Option<Duration>,
}

impl RunEngine {
    pub fn new(api: Arc<dyn SchedulerApi>, cfg: RunConfig, animator: StageAnimator) -> Self {
        Self {
            api,
            cfg,
            animator,
            remote_timeout: None,
        }
    }

    pub fn with_remote_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Drive the run to its outcome, reporting progress on `event_tx`.
    ///
    /// The animation always plays to the end before a proposal is returned; a result
    /// that arrives early is held back. A failed call ends the run at once.
    pub async fn run(
        self,
        event_tx: mpsc::UnboundedSender<RunEvent>,
    ) -> Result<AllocationProposal, RemoteError> {
        let RunEngine {
            api,
            cfg,
            animator,
            remote_timeout,
        } = self;

        let remote = async move {
            let call = api.execute_optimization(&cfg);
            match remote_timeout {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .unwrap_or(Err(RemoteError::Timeout(limit))),
                None => call.await,
            }
        };
        tokio::pin!(remote);

        let mut ticks = animator.run();
        let mut buffered: Option<AllocationProposal> = None;

        loop {
            tokio::select! {
                res = &mut remote, if buffered.is_none() => {
                    let proposal = res?;
                    tracing::debug!("optimizer answered before the animation finished");
                    let _ = event_tx.send(RunEvent::ResultBuffered);
                    buffered = Some(proposal);
                }
                tick = ticks.next() => match tick {
                    Some(tick) => {
                        let _ = event_tx.send(RunEvent::Stage(tick));
                    }
                    None => break,
                },
            }
        }

        match buffered {
            Some(proposal) => Ok(proposal),
            None => {
                let _ = event_tx.send(RunEvent::AwaitingOptimizer);
                remote.await
            }
        }
    }
}
