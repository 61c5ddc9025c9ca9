//! Orchestration for instructor-to-offering allocation runs.
//!
//! A run asks the scheduling backend's genetic optimizer for a proposal while a
//! synthetic stage animation reports progress. The resulting proposal can then be
//! saved in bulk or one assignment at a time.

pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod telemetry;
pub mod text_summary;
