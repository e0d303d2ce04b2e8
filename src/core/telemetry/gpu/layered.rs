//! Layered control-library path: bulk log → OverdriveN → Overdrive5.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    AdapterInfo, ControlLibrary, GpuSensors, Od6Power, OdnTemperature, PmLogData, PmLogSensor,
    AMD_VENDOR_ID,
};
use crate::core::telemetry::sensor::all_absent;
use crate::error::{HardmonError, Result};

const BULK_MIN_VERSION: i32 = 8;
const MID_MIN_VERSION: i32 = 7;
const LEGACY_POWER_MIN_VERSION: i32 = 6;

/// Metrics surface generation, richest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bulk,
    Mid,
    Legacy,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Bulk, Tier::Mid, Tier::Legacy];

    /// Static preconditions for attempting this tier.
    pub fn is_available(self, has_context: bool, overdrive_version: i32) -> bool {
        match self {
            Tier::Bulk => has_context && overdrive_version >= BULK_MIN_VERSION,
            Tier::Mid => has_context && overdrive_version >= MID_MIN_VERSION,
            Tier::Legacy => true,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Bulk => write!(f, "PM log"),
            Tier::Mid => write!(f, "OverdriveN"),
            Tier::Legacy => write!(f, "Overdrive5"),
        }
    }
}

/// Replace "(TM)" with a space and collapse runs of spaces.
pub fn normalize_adapter_name(name: &str) -> String {
    name.replace("(TM)", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last AMD adapter that carries a UDID.
///
/// The library lists one entry per display output, so a single board can
/// appear several times; the last entry wins. The active flag is not
/// consulted.
pub fn select_adapter(adapters: &[AdapterInfo]) -> Option<&AdapterInfo> {
    adapters
        .iter()
        .rev()
        .find(|a| !a.udid.is_empty() && a.vendor_id == AMD_VENDOR_ID)
}

fn scaled(raw: Option<i32>, factor: f32) -> Option<f32> {
    raw.map(|value| value as f32 * factor)
}

fn positive(raw: i32, factor: f32) -> Option<f32> {
    (raw > 0).then(|| raw as f32 * factor)
}

/// Point-in-time view of the layered GPU.
#[derive(Debug, Clone, Serialize)]
pub struct GpuSnapshot {
    pub name: String,
    pub index: i32,
    pub bus: i32,
    pub device: i32,
    pub tier: Option<Tier>,
    pub sensors: GpuSensors,
    pub timestamp: DateTime<Utc>,
}

impl GpuSnapshot {
    pub fn core_temperature(&self) -> Option<f32> {
        self.sensors.temperature_core.value()
    }

    /// Total board power, falling back to the core rail.
    pub fn power(&self) -> Option<f32> {
        self.sensors
            .power_total
            .value()
            .or_else(|| self.sensors.power_core.value())
    }
}

/// Layered GPU engine bound to one adapter.
pub struct GpuDevice {
    library: Arc<dyn ControlLibrary>,
    adapter: AdapterInfo,
    overdrive_version: i32,
    tier: Option<Tier>,
    sensors: GpuSensors,
}

impl GpuDevice {
    /// Enumerate adapters and bind to the eligible one.
    pub fn resolve(library: Arc<dyn ControlLibrary>) -> Result<Self> {
        let adapters = library.adapters()?;
        let mut adapter = select_adapter(&adapters)
            .cloned()
            .ok_or_else(|| HardmonError::gpu_not_available("no AMD adapter with a UDID found"))?;
        adapter.name = normalize_adapter_name(&adapter.name);

        let overdrive_version = library.overdrive_version(adapter.index).unwrap_or(-1);
        log::info!(
            "GPU adapter {} '{}' (bus {}, device {}), overdrive version {}",
            adapter.index,
            adapter.name,
            adapter.bus,
            adapter.device,
            overdrive_version
        );

        Ok(Self {
            library,
            adapter,
            overdrive_version,
            tier: None,
            sensors: GpuSensors::default(),
        })
    }

    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    pub fn tier(&self) -> Option<Tier> {
        self.tier
    }

    pub fn sensors(&self) -> &GpuSensors {
        &self.sensors
    }

    /// Forget the negotiated tier; the next update starts from the top.
    pub fn renegotiate(&mut self) {
        self.tier = None;
    }

    /// Poll the adapter through the richest tier that answers this cycle.
    /// Every update starts from the top, so a tier that missed once is
    /// tried again next time. Returns the tier that won.
    pub fn update(&mut self) -> Option<Tier> {
        let has_context = self.library.has_context();

        for tier in Tier::ALL {
            if !tier.is_available(has_context, self.overdrive_version) {
                continue;
            }
            if self.read_tier(tier) {
                match self.tier {
                    None => log::debug!("Negotiated {} tier for '{}'", tier, self.adapter.name),
                    Some(cached) if tier > cached => log::warn!(
                        "{} tier failed for '{}', fell back to {}",
                        cached,
                        self.adapter.name,
                        tier
                    ),
                    Some(cached) if tier < cached => log::info!(
                        "{} tier for '{}' answers again, leaving {}",
                        tier,
                        self.adapter.name,
                        cached
                    ),
                    _ => {}
                }
                self.tier = Some(tier);
                return Some(tier);
            }
        }

        self.sensors.clear();
        None
    }

    /// Every temperature and every power is absent.
    pub fn is_degenerate(&self) -> bool {
        all_absent(
            self.sensors
                .temperatures()
                .into_iter()
                .chain(self.sensors.powers()),
        )
    }

    pub fn snapshot(&self) -> GpuSnapshot {
        GpuSnapshot {
            name: self.adapter.name.clone(),
            index: self.adapter.index,
            bus: self.adapter.bus,
            device: self.adapter.device,
            tier: self.tier,
            sensors: self.sensors.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Run one tier from an all-absent sensor set.
    fn read_tier(&mut self, tier: Tier) -> bool {
        self.sensors.clear();
        match tier {
            Tier::Bulk => match self.library.pm_log(self.adapter.index) {
                Some(log) => {
                    apply_pm_log(&mut self.sensors, &log);
                    true
                }
                None => false,
            },
            Tier::Mid => {
                if !self.read_overdrive_n() {
                    self.sensors.clear();
                    return false;
                }
                self.read_auxiliary();
                true
            }
            Tier::Legacy => {
                self.read_overdrive5();
                self.read_auxiliary();
                true
            }
        }
    }

    fn read_overdrive_n(&mut self) -> bool {
        let library = self.library.as_ref();
        let adapter = self.adapter.index;
        let sensors = &mut self.sensors;

        let temperatures = [
            (OdnTemperature::Core, &mut sensors.temperature_core),
            (OdnTemperature::Memory, &mut sensors.temperature_memory),
            (OdnTemperature::VrmCore, &mut sensors.temperature_vrm_core),
            (OdnTemperature::VrmMemory, &mut sensors.temperature_vrm_memory),
            (OdnTemperature::Liquid, &mut sensors.temperature_liquid),
            (OdnTemperature::Plx, &mut sensors.temperature_plx),
            (OdnTemperature::Hotspot, &mut sensors.temperature_hotspot),
        ];

        let mut any = false;
        for (kind, sensor) in temperatures {
            let value = scaled(library.odn_temperature(adapter, kind), 0.001);
            any |= value.is_some();
            sensor.set(value);
        }

        any | read_od6_powers(library, adapter, sensors)
    }

    fn read_overdrive5(&mut self) {
        let library = self.library.as_ref();
        let adapter = self.adapter.index;

        self.sensors
            .temperature_core
            .set(scaled(library.od5_temperature(adapter), 0.001));

        if library.has_context() && self.overdrive_version >= LEGACY_POWER_MIN_VERSION {
            read_od6_powers(library, adapter, &mut self.sensors);
        }
    }

    /// Fan and activity counters shared by the mid and legacy tiers.
    fn read_auxiliary(&mut self) {
        let library = self.library.as_ref();
        let adapter = self.adapter.index;
        let sensors = &mut self.sensors;

        sensors.fan.set(scaled(library.od5_fan_rpm(adapter), 1.0));
        sensors
            .fan_percentage
            .set(scaled(library.od5_fan_percent(adapter), 1.0));

        match library.od5_activity(adapter) {
            Some(activity) => {
                sensors.clock_core.set(positive(activity.engine_clock, 0.01));
                sensors.clock_memory.set(positive(activity.memory_clock, 0.01));
                sensors.voltage_core.set(positive(activity.vddc, 0.001));
                sensors.load_core.set(
                    (0..=100)
                        .contains(&activity.activity_percent)
                        .then_some(activity.activity_percent as f32),
                );
            }
            None => {
                sensors.clock_core.clear();
                sensors.clock_memory.clear();
                sensors.voltage_core.clear();
                sensors.load_core.clear();
            }
        }
    }
}

fn read_od6_powers(library: &dyn ControlLibrary, adapter: i32, sensors: &mut GpuSensors) -> bool {
    let powers = [
        (Od6Power::Total, &mut sensors.power_total),
        (Od6Power::Chip, &mut sensors.power_core),
        (Od6Power::Ppt, &mut sensors.power_ppt),
        (Od6Power::Socket, &mut sensors.power_socket),
    ];

    let mut any = false;
    for (kind, sensor) in powers {
        let value = scaled(library.od6_power(adapter, kind), 1.0 / 255.0);
        any |= value.is_some();
        sensor.set(value);
    }
    any
}

fn apply_pm_log(sensors: &mut GpuSensors, log: &PmLogData) {
    use PmLogSensor::*;

    let slots = [
        (TemperatureEdge, &mut sensors.temperature_core, 1.0),
        (TemperatureMem, &mut sensors.temperature_memory, 1.0),
        (TemperatureVrVddc, &mut sensors.temperature_vrm_core, 1.0),
        (TemperatureVrMvdd, &mut sensors.temperature_vrm_memory, 1.0),
        (TemperatureVrMvdd0, &mut sensors.temperature_vrm_memory0, 1.0),
        (TemperatureVrMvdd1, &mut sensors.temperature_vrm_memory1, 1.0),
        (TemperatureVrSoc, &mut sensors.temperature_vrm_soc, 1.0),
        (TemperatureLiquid, &mut sensors.temperature_liquid, 1.0),
        (TemperaturePlx, &mut sensors.temperature_plx, 1.0),
        (TemperatureHotspot, &mut sensors.temperature_hotspot, 1.0),
        (PowerGfx, &mut sensors.power_core, 1.0),
        (PowerAsic, &mut sensors.power_total, 1.0),
        (PowerSoc, &mut sensors.power_soc, 1.0),
        (FanRpm, &mut sensors.fan, 1.0),
        (FanPercentage, &mut sensors.fan_percentage, 1.0),
        (ClockGfx, &mut sensors.clock_core, 1.0),
        (ClockMem, &mut sensors.clock_memory, 1.0),
        (ClockSoc, &mut sensors.clock_soc, 1.0),
        (VoltageGfx, &mut sensors.voltage_core, 0.001),
        (VoltageMem, &mut sensors.voltage_memory, 0.001),
        (VoltageSoc, &mut sensors.voltage_soc, 0.001),
        (ActivityGfx, &mut sensors.load_core, 1.0),
        (ActivityMem, &mut sensors.load_memory, 1.0),
    ];

    for (slot, sensor, factor) in slots {
        sensor.set(scaled(log.get(slot), factor));
    }
}
