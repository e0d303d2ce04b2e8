use colored::*;

use crate::core::telemetry::history::SnapshotHistory;
use crate::core::telemetry::{CpuSnapshot, GpuSnapshot, SessionGpuSnapshot, Sensor, SensorKind, Topology};

/// Plain-text reading with unit; absent values render as "n/a".
pub fn format_value(kind: SensorKind, value: Option<f32>) -> String {
    match value {
        None => "n/a".to_string(),
        Some(v) => match kind {
            SensorKind::Temperature | SensorKind::Power => format!("{:.1} {}", v, kind.unit()),
            SensorKind::Clock | SensorKind::Fan => format!("{:.0} {}", v, kind.unit()),
            SensorKind::Voltage => format!("{:.3} {}", v, kind.unit()),
            SensorKind::Load | SensorKind::FanPercent => format!("{:.0}{}", v, kind.unit()),
        },
    }
}

fn colored_reading(sensor: &Sensor) -> ColoredString {
    let text = format_value(sensor.kind, sensor.value);
    match (sensor.kind, sensor.value) {
        (_, None) => text.dimmed(),
        (SensorKind::Temperature, Some(t)) if t >= 85.0 => text.red(),
        (SensorKind::Temperature, Some(t)) if t >= 70.0 => text.yellow(),
        (SensorKind::Temperature, Some(_)) => text.green(),
        _ => text.normal(),
    }
}

fn print_section_header(title: &str) {
    println!("\n{}", title.bold().green());
    println!("{}", "-".repeat(title.chars().count()));
}

fn print_sensor(sensor: &Sensor) {
    println!("  {:<22} {}", format!("{}:", sensor.label), colored_reading(sensor));
}

fn print_optional(sensor: Option<&Sensor>) {
    if let Some(sensor) = sensor {
        print_sensor(sensor);
    }
}

pub fn print_topology(topology: &Topology) {
    print_section_header("PROCESSOR TOPOLOGY");

    if topology.is_empty() {
        println!("  {}", "No logical processors discovered".yellow());
        return;
    }

    for (p, package) in topology.packages.iter().enumerate() {
        let brand = package
            .first_thread()
            .map(|t| format!("{} {} (family {:#x}, model {:#x})", t.vendor, t.brand, t.family, t.model))
            .unwrap_or_default();
        println!("  {} {}", format!("Package #{}", p).bold(), brand.dimmed());

        for (c, core) in package.cores.iter().enumerate() {
            let threads: Vec<String> = core
                .threads
                .iter()
                .map(|t| format!("{}:{}", t.group, t.index))
                .collect();
            println!("    Core #{:<3} threads {}", c, threads.join(", "));
        }
    }

    println!(
        "\n  {} package(s), {} core(s), {} thread(s)",
        topology.packages.len(),
        topology.core_count(),
        topology.thread_count()
    );
}

pub fn print_cpu_snapshot(snapshot: &CpuSnapshot) {
    print_section_header(&format!("CPU #{} - {}", snapshot.index, snapshot.brand));
    println!("  {:<22} {}", "Strategy:", snapshot.family.cyan());

    print_optional(snapshot.package_temperature.as_ref());
    print_optional(snapshot.control_temperature.as_ref());
    snapshot.core_temperatures.iter().for_each(print_sensor);
    snapshot
        .ccd_temperatures
        .iter()
        .filter(|s| !s.is_absent())
        .for_each(print_sensor);
    print_optional(snapshot.ccd_max_temperature.as_ref());
    print_optional(snapshot.ccd_avg_temperature.as_ref());
    print_optional(snapshot.package_power.as_ref());
    print_optional(snapshot.cores_power.as_ref());
    print_optional(snapshot.bus_clock.as_ref());

    if !snapshot.core_clocks.is_empty() {
        let clocks: Vec<String> = snapshot
            .core_clocks
            .iter()
            .map(|s| format_value(s.kind, s.value))
            .collect();
        println!("  {:<22} {}", "Core clocks:", clocks.join(" | "));
    }
    if !snapshot.core_powers.is_empty() {
        let powers: Vec<String> = snapshot
            .core_powers
            .iter()
            .map(|s| format_value(s.kind, s.value))
            .collect();
        println!("  {:<22} {}", "Core powers:", powers.join(" | "));
    }
}

pub fn print_gpu_snapshot(snapshot: &GpuSnapshot) {
    print_section_header(&format!("GPU - {}", snapshot.name));
    println!(
        "  {:<22} adapter {} (bus {}, device {})",
        "Identity:", snapshot.index, snapshot.bus, snapshot.device
    );
    let tier = snapshot
        .tier
        .map(|t| t.to_string())
        .unwrap_or_else(|| "none".to_string());
    println!("  {:<22} {}", "Metrics surface:", tier.cyan());

    // Only what the active surface reported
    for sensor in snapshot.sensors.all() {
        if !sensor.is_absent() {
            println!(
                "  {:<22} {}",
                format!("{} {}:", sensor.label, kind_name(sensor.kind)),
                colored_reading(sensor)
            );
        }
    }
}

pub fn print_session_gpu_snapshot(snapshot: &SessionGpuSnapshot) {
    print_section_header(&format!("GPU - {}", snapshot.name));
    print_sensor(&snapshot.temperature);
    print_sensor(&snapshot.hotspot_temperature);
    println!(
        "  {:<22} {} / {:.0} W",
        format!("{}:", snapshot.board_power.label),
        colored_reading(&snapshot.board_power),
        snapshot.max_power_watts
    );
    print_sensor(&snapshot.fan);
    let fps = snapshot
        .fps
        .map(|f| format!("{:.0}", f))
        .unwrap_or_else(|| "n/a".to_string());
    println!("  {:<22} {}", "FPS:", fps);
}

pub fn print_history_summary(history: &SnapshotHistory) {
    if history.is_empty() {
        return;
    }

    let range = |kind: SensorKind, r: Option<(f32, f32)>| match r {
        Some((min, max)) => format!(
            "{} .. {}",
            format_value(kind, Some(min)),
            format_value(kind, Some(max))
        ),
        None => "n/a".to_string(),
    };

    println!(
        "  {} over {} sample(s): CPU {} / {}, GPU {} / {}",
        "Range".dimmed(),
        history.len(),
        range(SensorKind::Temperature, history.range(|s| s.cpu_temperature)),
        range(SensorKind::Power, history.range(|s| s.cpu_power)),
        range(SensorKind::Temperature, history.range(|s| s.gpu_temperature)),
        range(SensorKind::Power, history.range(|s| s.gpu_power)),
    );
}

pub fn print_unavailable(class: &str, cause: &dyn std::fmt::Display) {
    println!("\n{} {}: {}", class.bold(), "unavailable".red(), cause);
}

fn kind_name(kind: SensorKind) -> &'static str {
    match kind {
        SensorKind::Temperature => "Temp",
        SensorKind::Power => "Power",
        SensorKind::Clock => "Clock",
        SensorKind::Voltage => "Voltage",
        SensorKind::Load => "Load",
        SensorKind::Fan => "Fan",
        SensorKind::FanPercent => "Fan %",
    }
}
