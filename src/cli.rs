use crate::api::HttpSchedulerApi;
use crate::config::{pick_active_semester, today, ConfigResolver};
use crate::engine::animator::{default_stages, scale_stages};
use crate::model::{InstructorId, OfferingId, RunConfig, RunState};
use crate::orchestrator::post_process::export_document;
use crate::orchestrator::{
    process_run_completion, wait_for_outcome, ControllerOptions, PostRunActions, RunController,
    SaveStateReconciler,
};
use crate::text_summary::build_text_summary;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

fn parse_reassignment(s: &str) -> Result<(OfferingId, InstructorId), String> {
    let (offering, instructor) = s
        .split_once('=')
        .ok_or_else(|| format!("expected OFFERING=INSTRUCTOR, got `{s}`"))?;
    let offering = offering
        .trim()
        .parse()
        .map_err(|e| format!("bad offering id `{offering}`: {e}"))?;
    let instructor = instructor
        .trim()
        .parse()
        .map_err(|e| format!("bad instructor id `{instructor}`: {e}"))?;
    Ok((offering, instructor))
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "offering-allocator",
    version,
    about = "Run the instructor allocation optimizer and save its proposal"
)]
pub struct Cli {
    /// Base URL of the scheduling backend
    #[arg(long, env = "ALLOCATOR_API_URL", default_value = "http://localhost:8000/")]
    pub api_url: String,

    /// Target semester name (defaults to the semester in session)
    #[arg(long)]
    pub semester: Option<String>,

    /// Population size (50-200, step 10)
    #[arg(long)]
    pub population: Option<u32>,

    /// Number of generations (10-100, step 5)
    #[arg(long)]
    pub generations: Option<u32>,

    /// Crossover probability (0.0-1.0)
    #[arg(long)]
    pub crossover: Option<f64>,

    /// Mutation probability (0.01-0.5)
    #[arg(long)]
    pub mutation: Option<f64>,

    /// Total length of the progress animation
    #[arg(long)]
    pub animation: Option<humantime::Duration>,

    /// Give up on the optimizer after this long (0s waits indefinitely)
    #[arg(long, default_value = "10m")]
    pub timeout: humantime::Duration,

    /// Connect timeout for backend requests
    #[arg(long, default_value = "10s")]
    pub connect_timeout: humantime::Duration,

    /// Replace the proposed instructor before saving, as OFFERING=INSTRUCTOR
    #[arg(long = "reassign", value_parser = parse_reassignment)]
    pub reassign: Vec<(OfferingId, InstructorId)>,

    /// Save a single offering's assignment (repeatable)
    #[arg(long = "save")]
    pub save: Vec<OfferingId>,

    /// Save every assignment of the proposal
    #[arg(long)]
    pub save_all: bool,

    /// Export the proposal and its save statuses as JSON
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Print the proposal as JSON instead of a text summary
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    pub fn controller_options(&self) -> ControllerOptions {
        let mut options = ControllerOptions::default();
        if let Some(total) = self.animation {
            options.stages = scale_stages(&default_stages(), Duration::from(total));
        }
        let timeout = Duration::from(self.timeout);
        options.remote_timeout = (!timeout.is_zero()).then_some(timeout);
        options
    }

    pub fn post_run_actions(&self) -> PostRunActions {
        PostRunActions {
            reassignments: self.reassign.clone(),
            save_all: self.save_all,
            save_offerings: self.save.clone(),
            export_json: self.export_json.clone(),
        }
    }
}

/// Build the run configuration: backend defaults, then explicit overrides.
///
/// Overrides are applied verbatim so that out-of-range values are reported rather
/// than silently snapped.
async fn build_config(args: &Cli, resolver: &ConfigResolver) -> Result<RunConfig> {
    let mut cfg = resolver.resolve().await.into_config();
    if let Some(v) = args.population {
        cfg.population_size = v;
    }
    if let Some(v) = args.generations {
        cfg.generations = v;
    }
    if let Some(v) = args.crossover {
        cfg.crossover_probability = v;
    }
    if let Some(v) = args.mutation {
        cfg.mutation_probability = v;
    }

    cfg.semester = match args.semester.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            let candidates = resolver
                .semester_candidates()
                .await
                .context("failed to list semesters; pass --semester")?;
            pick_active_semester(&candidates, today())
                .map(|s| s.name.clone())
                .context("no semester available; pass --semester")?
        }
    };
    Ok(cfg)
}

/// Forward progress to stderr until the run settles.
///
/// An `Idle` state seen before the first `Running` one is the pre-start state and is
/// skipped; after that, `Idle` means the run was cancelled.
async fn render_progress(
    mut rx: watch::Receiver<RunState>,
    out_tx: mpsc::UnboundedSender<OutputLine>,
) {
    let mut started = false;
    let mut last_label = String::new();
    let mut last_decile = 0u32;
    loop {
        {
            let state = rx.borrow_and_update();
            match &*state {
                RunState::Running { progress, .. } => {
                    started = true;
                    let decile = (progress.overall_pct / 10.0).floor() as u32;
                    if !progress.stage_label.is_empty()
                        && (progress.stage_label != last_label || decile > last_decile)
                    {
                        let _ = out_tx.send(OutputLine::Stderr(format!(
                            "[{:>5.1}%] {} (generation ~{})",
                            progress.overall_pct,
                            progress.stage_label,
                            progress.estimated_generation
                        )));
                        last_label = progress.stage_label.clone();
                        last_decile = decile;
                    }
                }
                RunState::Idle if !started => {}
                RunState::Idle | RunState::Succeeded { .. } | RunState::Failed { .. } => return,
            }
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let connect_timeout = Duration::from(args.connect_timeout);
    let api = Arc::new(
        HttpSchedulerApi::new(&args.api_url, connect_timeout)
            .with_context(|| format!("invalid --api-url {}", args.api_url))?,
    );
    let resolver = ConfigResolver::new(api.clone());
    let cfg = build_config(&args, &resolver).await?;

    let (out_tx, out_handle) = spawn_output_writer();
    let controller = RunController::new(api.clone(), args.controller_options());
    let mut outcome_rx = controller.subscribe();

    let _ = out_tx.send(OutputLine::Stderr(format!(
        "Optimizing {} (population {}, generations {}, crossover {:.2}, mutation {:.2})",
        cfg.semester,
        cfg.population_size,
        cfg.generations,
        cfg.crossover_probability,
        cfg.mutation_probability
    )));
    controller.start(cfg).context("could not start allocation run")?;
    let progress = tokio::spawn(render_progress(controller.subscribe(), out_tx.clone()));

    let outcome = tokio::select! {
        res = wait_for_outcome(&mut outcome_rx) => res,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel();
            Err(crate::error::RunError::Cancelled)
        }
    };
    let _ = progress.await;

    let result = match outcome {
        Ok(proposal) => {
            let reconciler = SaveStateReconciler::new(api);
            let processed =
                process_run_completion(&reconciler, proposal.clone(), &args.post_run_actions())
                    .await;

            let mut failures = processed.failures;
            if args.json {
                match export_document(&proposal, &reconciler) {
                    Ok(doc) => {
                        let _ = out_tx.send(OutputLine::Stdout(doc));
                    }
                    Err(e) => {
                        failures += 1;
                        let _ = out_tx.send(OutputLine::Stderr(format!("{e:#}")));
                    }
                }
            } else {
                let summary = build_text_summary(&proposal, &reconciler.snapshot());
                for line in summary.lines {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                }
            }
            for msg in processed.messages {
                let _ = out_tx.send(OutputLine::Stderr(msg));
            }
            if failures > 0 {
                Err(anyhow::anyhow!("{failures} post-run action(s) failed"))
            } else {
                Ok(())
            }
        }
        Err(e) => Err(anyhow::Error::new(e).context("allocation run failed")),
    };

    drop(out_tx);
    let _ = out_handle.await;
    result
}
