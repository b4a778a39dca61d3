//! # Rampart Server
//!
//! Headless harness for the Rampart combat core.
//!
//! Builds a small world on the tokio runtime, plays a scripted skirmish
//! through the combat service, and prints every outbound message as one JSON
//! line on stdout. Logs go to stderr.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod app;

use anyhow::Result;
use rampart_combat::config::{CombatConfig, CONFIG_FILE};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("rampart=info".parse()?))
        .init();

    info!("Project Rampart starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = CombatConfig::load_from(CONFIG_FILE);
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let report = runtime.block_on(app::run(config))?;

    info!(
        duel_strikes = report.duel_strikes,
        revived = report.duel_revived,
        war_kills = report.war_killer.faction_kills,
        victim_region = %report.war_victim_region,
        "Project Rampart shutdown complete"
    );
    Ok(())
}
