use anyhow::Result;
use clap::Parser;
use offering_allocator::{cli, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    telemetry::init_tracing(args.log_json, telemetry::level_for_verbosity(args.verbose));
    cli::run(args).await
}
