//! Metrics-session path. Not layered: any failure fails the poll.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{MetricsSession, SessionAdapter};
use crate::core::telemetry::sensor::{Sensor, SensorKind};
use crate::error::{HardmonError, Result};

/// Point-in-time view of the session-path GPU.
#[derive(Debug, Clone, Serialize)]
pub struct SessionGpuSnapshot {
    pub name: String,
    pub temperature: Sensor,
    pub hotspot_temperature: Sensor,
    pub board_power: Sensor,
    /// Configured ceiling for client-side normalisation.
    pub max_power_watts: f32,
    pub fan: Sensor,
    pub fps: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

/// First adapter whose name contains `name`, ignoring case. With no name
/// the first adapter wins.
pub fn match_adapter<'a>(adapters: &'a [SessionAdapter], name: Option<&str>) -> Option<&'a SessionAdapter> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => {
            let needle = name.to_lowercase();
            adapters
                .iter()
                .find(|a| a.name.to_lowercase().contains(&needle))
        }
        None => adapters.first(),
    }
}

/// Enumerate adapters and resolve the configured target.
pub fn resolve_target(session: &dyn MetricsSession, name: Option<&str>) -> Result<SessionAdapter> {
    let adapters = session.adapters()?;
    let target = match_adapter(&adapters, name)
        .cloned()
        .ok_or_else(|| HardmonError::adapter_not_found(name.unwrap_or("<any>")))?;
    log::info!("Session GPU target resolved to '{}'", target.name);
    Ok(target)
}

/// Query current metrics and frame rate of `adapter`.
pub fn poll(
    session: &dyn MetricsSession,
    adapter: &SessionAdapter,
    max_power_watts: f32,
) -> Result<SessionGpuSnapshot> {
    let metrics = session.current_metrics(adapter)?;
    let fps = session.current_fps(adapter)?;

    let mut temperature = Sensor::new(SensorKind::Temperature, "GPU Temperature");
    temperature.set(metrics.temperature);
    let mut hotspot_temperature = Sensor::new(SensorKind::Temperature, "GPU Hot Spot");
    hotspot_temperature.set(metrics.hotspot_temperature);
    let mut board_power = Sensor::new(SensorKind::Power, "GPU Board Power");
    board_power.set(metrics.board_power);
    let mut fan = Sensor::new(SensorKind::Fan, "GPU Fan");
    fan.set(metrics.fan_rpm);

    Ok(SessionGpuSnapshot {
        name: adapter.name.clone(),
        temperature,
        hotspot_temperature,
        board_power,
        max_power_watts,
        fan,
        fps,
        timestamp: Utc::now(),
    })
}
