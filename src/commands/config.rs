use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use crate::core::{Config, GpuBackend};

pub fn execute(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => show(),
        Some(("set-adapter", sub_matches)) => set_adapter(sub_matches),
        Some(("set-backend", sub_matches)) => set_backend(sub_matches),
        _ => {
            println!("Use 'hardmon config --help' for more information.");
            Ok(())
        }
    }
}

fn show() -> Result<()> {
    let config = Config::load()?;
    let path = Config::get_config_path()?;

    println!("{}", "Current configuration:".bold().cyan());
    println!("  {:<18} {}", "File:", path.display().to_string().dimmed());
    println!("  {:<18} {}", "GPU backend:", config.gpu_backend);
    println!(
        "  {:<18} {}",
        "Adapter name:",
        config.adapter_name.as_deref().unwrap_or("(first adapter)")
    );
    println!("  {:<18} {} W", "Max power:", config.max_power_watts);
    println!("  {:<18} {} ms", "Bus lock timeout:", config.bus_lock_timeout_ms);
    println!("  {:<18} {}", "History size:", config.history_size);
    println!("  {:<18} {} ms", "Poll interval:", config.poll_interval_ms);
    Ok(())
}

fn set_adapter(matches: &ArgMatches) -> Result<()> {
    let name = matches
        .get_one::<String>("name")
        .context("Adapter name argument is required")?;

    let mut config = Config::load()?;
    // Blank clears the filter
    let name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
    config.set_adapter_name(name.clone());
    config.save()?;

    match name {
        Some(name) => println!("{} {}", "✓ GPU adapter filter set to:".green(), name.bold()),
        None => println!("{}", "✓ GPU adapter filter cleared".green()),
    }
    Ok(())
}

fn set_backend(matches: &ArgMatches) -> Result<()> {
    let backend = matches
        .get_one::<String>("backend")
        .context("Backend argument is required")?;
    let backend: GpuBackend = backend.parse().map_err(anyhow::Error::msg)?;

    let mut config = Config::load()?;
    config.set_gpu_backend(backend);
    config.save()?;

    println!("{} {}", "✓ GPU backend set to:".green(), backend.to_string().bold());
    Ok(())
}
