//! Application-level orchestration.
//!
//! Run lifecycle control lives in [`controller`], save-state tracking in [`reconciler`],
//! and after-run actions (saves, export) in [`post_process`]. The CLI calls into this
//! module and never drives the engine directly.

pub mod controller;
pub mod post_process;
pub mod reconciler;

pub use controller::{wait_for_outcome, ControllerOptions, RunController};
pub use post_process::{process_run_completion, PostRunActions, ProcessedRun};
pub use reconciler::{SaveOutcome, SaveStateReconciler};
