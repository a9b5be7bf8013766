//! gauntlet: round-robin tournaments between UCI engines.

mod args;

use clap::Parser;
use tracing::info;

use gauntlet_core::RoundRobin;

use crate::args::Args;

fn main() -> anyhow::Result<()> {
    // Progress goes to stdout; tracing is diagnostics only, so default to
    // warnings unless RUST_LOG says otherwise.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (options, engines) = args.resolve()?;
    info!(engines = engines.len(), "configuration loaded");

    let tournament = RoundRobin::new(options, engines)?;
    tournament.run()?;
    Ok(())
}
