use anyhow::{Context, Result};
use clap::ArgMatches;

use crate::core::Config;
use crate::platform;
use crate::ui::formatters;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = Config::load()?;
    let context = platform::system_context(&config);

    let topology = context.topology();

    if matches.get_flag("json") {
        let json = serde_json::to_string_pretty(&topology).context("Failed to serialize topology")?;
        println!("{}", json);
        return Ok(());
    }

    formatters::print_topology(&topology);
    Ok(())
}
