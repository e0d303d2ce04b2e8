use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::Serialize;

use crate::core::telemetry::{GpuSnapshot, SessionGpuSnapshot, TelemetryContext};
use crate::core::{Config, GpuBackend};
use crate::platform;
use crate::ui::formatters;

/// One GPU poll from whichever backend is configured.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GpuReading {
    Layered(GpuSnapshot),
    Session(SessionGpuSnapshot),
}

impl GpuReading {
    pub fn poll(context: &TelemetryContext, backend: GpuBackend) -> crate::Result<Self> {
        match backend {
            GpuBackend::Layered => context.gpu_snapshot().map(GpuReading::Layered),
            GpuBackend::Session => context.session_gpu_snapshot().map(GpuReading::Session),
        }
    }

    pub fn temperature(&self) -> Option<f32> {
        match self {
            GpuReading::Layered(s) => s.core_temperature(),
            GpuReading::Session(s) => s.temperature.value(),
        }
    }

    pub fn power(&self) -> Option<f32> {
        match self {
            GpuReading::Layered(s) => s.power(),
            GpuReading::Session(s) => s.board_power.value(),
        }
    }

    pub fn print(&self) {
        match self {
            GpuReading::Layered(s) => formatters::print_gpu_snapshot(s),
            GpuReading::Session(s) => formatters::print_session_gpu_snapshot(s),
        }
    }
}

/// Config with the command-line overrides applied.
pub fn effective_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = Config::load()?;

    if matches.get_flag("session") {
        config.set_gpu_backend(GpuBackend::Session);
    }
    if let Some(name) = matches.get_one::<String>("adapter") {
        config.set_adapter_name(Some(name.clone()));
    }

    Ok(config)
}

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = effective_config(matches)?;
    let context = platform::system_context(&config);

    let reading = GpuReading::poll(&context, config.gpu_backend)
        .with_context(|| format!("GPU telemetry unavailable ({} backend)", config.gpu_backend))?;

    if matches.get_flag("json") {
        let json = serde_json::to_string_pretty(&reading).context("Failed to serialize GPU snapshot")?;
        println!("{}", json);
        return Ok(());
    }

    reading.print();
    Ok(())
}
