use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use crate::core::Config;
use crate::platform;
use crate::ui::formatters;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = Config::load()?;

    if let Err(e) = platform::ensure_elevated() {
        println!("{}", format!("Warning: {}", e).yellow());
    }

    let context = platform::system_context(&config);
    let snapshots = context.cpu_snapshots().context("CPU telemetry unavailable")?;

    if matches.get_flag("json") {
        let json = serde_json::to_string_pretty(&snapshots).context("Failed to serialize CPU snapshots")?;
        println!("{}", json);
        return Ok(());
    }

    for snapshot in &snapshots {
        formatters::print_cpu_snapshot(snapshot);
    }
    Ok(())
}
