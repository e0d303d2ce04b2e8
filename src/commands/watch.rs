//! Continuous polling of CPU and GPU telemetry.
//!
//! Each cycle goes through the same context, so a failed device is
//! released by its watchdog and picked up again on a later cycle.

use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::ArgMatches;
use colored::Colorize;
use serde::Serialize;

use super::gpu::{effective_config, GpuReading};
use crate::core::telemetry::sensor::sum_present;
use crate::core::telemetry::{CpuSnapshot, HistorySample, SnapshotHistory};
use crate::platform;
use crate::ui::formatters;

#[derive(Debug, Serialize)]
struct Frame {
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu: Option<Vec<CpuSnapshot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gpu: Option<GpuReading>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<Unavailable>,
}

#[derive(Debug, Serialize)]
struct Unavailable {
    class: &'static str,
    cause: String,
}

/// Hottest package temperature and summed package power. The power total
/// is absent unless every package reported one.
fn cpu_summary(snapshots: &[CpuSnapshot]) -> (Option<f32>, Option<f32>) {
    let temperature = snapshots
        .iter()
        .filter_map(CpuSnapshot::package_temperature_value)
        .reduce(f32::max);
    let power = sum_present(snapshots.iter().map(CpuSnapshot::package_power_value));
    (temperature, power)
}

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = effective_config(matches)?;

    let interval = matches
        .get_one::<u64>("interval")
        .copied()
        .unwrap_or(config.poll_interval_ms);
    let count = matches.get_one::<usize>("count").copied();
    let json_output = matches.get_flag("json");

    let cpu_only = matches.get_flag("cpu-only");
    let gpu_only = matches.get_flag("gpu-only");
    let (want_cpu, want_gpu) = if cpu_only || gpu_only {
        (cpu_only, gpu_only)
    } else {
        (true, true)
    };

    let context = platform::system_context(&config);
    let mut history = SnapshotHistory::with_capacity(config.history_size);
    let mut cpu_ok = false;
    let mut gpu_ok = false;
    let mut cycle = 0usize;

    loop {
        let mut frame = Frame {
            timestamp: Utc::now(),
            cpu: None,
            gpu: None,
            errors: Vec::new(),
        };

        if want_cpu {
            match context.cpu_snapshots() {
                Ok(snapshots) => {
                    cpu_ok = true;
                    frame.cpu = Some(snapshots);
                }
                Err(e) => frame.errors.push(Unavailable {
                    class: "CPU",
                    cause: e.to_string(),
                }),
            }
        }

        if want_gpu {
            match GpuReading::poll(&context, config.gpu_backend) {
                Ok(reading) => {
                    gpu_ok = true;
                    frame.gpu = Some(reading);
                }
                Err(e) => frame.errors.push(Unavailable {
                    class: "GPU",
                    cause: e.to_string(),
                }),
            }
        }

        let (cpu_temperature, cpu_power) = frame.cpu.as_deref().map(cpu_summary).unwrap_or((None, None));
        history.push(HistorySample {
            timestamp: frame.timestamp,
            cpu_temperature,
            cpu_power,
            gpu_temperature: frame.gpu.as_ref().and_then(GpuReading::temperature),
            gpu_power: frame.gpu.as_ref().and_then(GpuReading::power),
        });

        if json_output {
            println!("{}", serde_json::to_string(&frame)?);
        } else {
            print_frame(&frame);
            formatters::print_history_summary(&history);
        }

        cycle += 1;
        if count.is_some_and(|n| cycle >= n) {
            break;
        }
        std::thread::sleep(Duration::from_millis(interval));
    }

    log::debug!(
        "watch finished after {} cycle(s), {} CPU and {} GPU reset(s)",
        cycle,
        context.cpu_resets(),
        context.gpu_resets()
    );

    if (!want_cpu || !cpu_ok) && (!want_gpu || !gpu_ok) {
        bail!("no telemetry could be read from any requested device");
    }
    Ok(())
}

fn print_frame(frame: &Frame) {
    println!(
        "\n{}",
        format!("=== {} ===", frame.timestamp.format("%H:%M:%S")).dimmed()
    );

    if let Some(snapshots) = &frame.cpu {
        snapshots.iter().for_each(formatters::print_cpu_snapshot);
    }
    if let Some(reading) = &frame.gpu {
        reading.print();
    }
    for error in &frame.errors {
        formatters::print_unavailable(error.class, &error.cause);
    }
}
