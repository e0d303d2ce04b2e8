//! GPU sensor engine and the vendor SDK surfaces it consumes.
//!
//! Two alternative paths exist: [`layered::GpuDevice`] negotiates between
//! the legacy control-library tiers, and [`session::SessionGpu`] talks to a
//! modern per-device metrics session. Which one runs is a configuration
//! choice; they are never mixed at runtime.

pub mod layered;
pub mod session;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::sensor::{Sensor, SensorKind};
use crate::error::Result;

/// PCI vendor id of AMD/ATI graphics adapters.
pub const AMD_VENDOR_ID: u32 = 0x1002;

/// Adapter as enumerated by the control library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub index: i32,
    pub name: String,
    pub udid: String,
    pub vendor_id: u32,
    pub bus: i32,
    pub device: i32,
    pub active: bool,
}

/// Slots of the bulk performance log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PmLogSensor {
    TemperatureEdge,
    TemperatureMem,
    TemperatureVrVddc,
    TemperatureVrMvdd,
    TemperatureVrMvdd0,
    TemperatureVrMvdd1,
    TemperatureVrSoc,
    TemperatureLiquid,
    TemperaturePlx,
    TemperatureHotspot,
    PowerGfx,
    PowerAsic,
    PowerSoc,
    FanRpm,
    FanPercentage,
    ClockGfx,
    ClockMem,
    ClockSoc,
    VoltageGfx,
    VoltageMem,
    VoltageSoc,
    ActivityGfx,
    ActivityMem,
}

impl PmLogSensor {
    pub const COUNT: usize = 23;
}

/// One (supported, value) pair of the bulk log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PmLogSlot {
    pub supported: bool,
    pub value: i32,
}

/// Fixed-size bulk log indexed by [`PmLogSensor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PmLogData {
    pub slots: [PmLogSlot; PmLogSensor::COUNT],
}

impl PmLogData {
    pub fn with(mut self, sensor: PmLogSensor, value: i32) -> Self {
        self.slots[sensor as usize] = PmLogSlot {
            supported: true,
            value,
        };
        self
    }

    /// Raw value of `sensor`, `None` when unsupported.
    pub fn get(&self, sensor: PmLogSensor) -> Option<i32> {
        self.slots
            .get(sensor as usize)
            .filter(|slot| slot.supported)
            .map(|slot| slot.value)
    }
}

/// Per-kind OverdriveN temperature query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OdnTemperature {
    Core,
    Memory,
    VrmCore,
    VrmMemory,
    Liquid,
    Plx,
    Hotspot,
}

/// Per-kind Overdrive6 power query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Od6Power {
    Total,
    Chip,
    Ppt,
    Socket,
}

/// Overdrive5 combined activity reading in raw SDK units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PmActivity {
    /// 10 kHz units
    pub engine_clock: i32,
    /// 10 kHz units
    pub memory_clock: i32,
    /// millivolts
    pub vddc: i32,
    pub activity_percent: i32,
}

/// Legacy vendor control library.
///
/// Every per-adapter query is fallible and reports failure as `None`.
pub trait ControlLibrary: Send + Sync {
    /// Whether a session context exists (required by the bulk and mid tiers).
    fn has_context(&self) -> bool;

    fn adapters(&self) -> Result<Vec<AdapterInfo>>;

    fn overdrive_version(&self, adapter: i32) -> Option<i32>;

    fn pm_log(&self, adapter: i32) -> Option<PmLogData>;

    /// Millidegrees Celsius.
    fn odn_temperature(&self, adapter: i32, kind: OdnTemperature) -> Option<i32>;

    /// 1/255 W units.
    fn od6_power(&self, adapter: i32, kind: Od6Power) -> Option<i32>;

    /// Millidegrees Celsius.
    fn od5_temperature(&self, adapter: i32) -> Option<i32>;

    fn od5_fan_rpm(&self, adapter: i32) -> Option<i32>;

    fn od5_fan_percent(&self, adapter: i32) -> Option<i32>;

    fn od5_activity(&self, adapter: i32) -> Option<PmActivity>;
}

/// Adapter as enumerated by a metrics session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAdapter {
    pub name: String,
    pub vendor_id: u32,
    pub bus_id: u32,
    /// Backend-specific handle.
    pub handle: usize,
}

/// Current metrics of one adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceMetrics {
    pub temperature: Option<f32>,
    pub hotspot_temperature: Option<f32>,
    pub board_power: Option<f32>,
    pub fan_rpm: Option<f32>,
}

/// Modern per-device metrics session.
pub trait MetricsSession: Send + Sync {
    fn adapters(&self) -> Result<Vec<SessionAdapter>>;

    fn current_metrics(&self, adapter: &SessionAdapter) -> Result<DeviceMetrics>;

    /// `Ok(None)` when the backend cannot measure frame rate.
    fn current_fps(&self, adapter: &SessionAdapter) -> Result<Option<f32>>;
}

/// Opens control-library handles.
pub trait ControlLibraryDriver: Send + Sync {
    fn open(&self) -> Result<Arc<dyn ControlLibrary>>;
}

/// Opens metrics sessions.
pub trait MetricsSessionDriver: Send + Sync {
    fn open(&self) -> Result<Arc<dyn MetricsSession>>;
}

/// Normalised sensor set of a GPU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSensors {
    pub temperature_core: Sensor,
    pub temperature_memory: Sensor,
    pub temperature_vrm_core: Sensor,
    pub temperature_vrm_memory: Sensor,
    pub temperature_vrm_memory0: Sensor,
    pub temperature_vrm_memory1: Sensor,
    pub temperature_vrm_soc: Sensor,
    pub temperature_liquid: Sensor,
    pub temperature_plx: Sensor,
    pub temperature_hotspot: Sensor,
    pub power_core: Sensor,
    pub power_ppt: Sensor,
    pub power_socket: Sensor,
    pub power_total: Sensor,
    pub power_soc: Sensor,
    pub fan: Sensor,
    pub fan_percentage: Sensor,
    pub clock_core: Sensor,
    pub clock_memory: Sensor,
    pub clock_soc: Sensor,
    pub voltage_core: Sensor,
    pub voltage_memory: Sensor,
    pub voltage_soc: Sensor,
    pub load_core: Sensor,
    pub load_memory: Sensor,
}

impl Default for GpuSensors {
    fn default() -> Self {
        use SensorKind::*;
        Self {
            temperature_core: Sensor::indexed(Temperature, "GPU Core", 0),
            temperature_memory: Sensor::indexed(Temperature, "GPU Memory", 1),
            temperature_vrm_core: Sensor::indexed(Temperature, "GPU VR VDDC", 2),
            temperature_vrm_memory: Sensor::indexed(Temperature, "GPU VR MVDD", 3),
            temperature_vrm_memory0: Sensor::indexed(Temperature, "GPU VR MVDD0", 4),
            temperature_vrm_memory1: Sensor::indexed(Temperature, "GPU VR MVDD1", 5),
            temperature_vrm_soc: Sensor::indexed(Temperature, "GPU VR SOC", 6),
            temperature_liquid: Sensor::indexed(Temperature, "GPU Liquid", 7),
            temperature_plx: Sensor::indexed(Temperature, "GPU PLX", 8),
            temperature_hotspot: Sensor::indexed(Temperature, "GPU Hot Spot", 9),
            power_core: Sensor::indexed(Power, "GPU Core", 0),
            power_ppt: Sensor::indexed(Power, "GPU PPT", 1),
            power_socket: Sensor::indexed(Power, "GPU Socket", 2),
            power_total: Sensor::indexed(Power, "GPU Total", 3),
            power_soc: Sensor::indexed(Power, "GPU SOC", 4),
            fan: Sensor::new(Fan, "GPU Fan"),
            fan_percentage: Sensor::new(FanPercent, "GPU Fan"),
            clock_core: Sensor::indexed(Clock, "GPU Core", 0),
            clock_memory: Sensor::indexed(Clock, "GPU Memory", 1),
            clock_soc: Sensor::indexed(Clock, "GPU SOC", 2),
            voltage_core: Sensor::indexed(Voltage, "GPU Core", 0),
            voltage_memory: Sensor::indexed(Voltage, "GPU Memory", 1),
            voltage_soc: Sensor::indexed(Voltage, "GPU SOC", 2),
            load_core: Sensor::indexed(Load, "GPU Core", 0),
            load_memory: Sensor::indexed(Load, "GPU Memory", 1),
        }
    }
}

impl GpuSensors {
    pub fn temperatures(&self) -> [&Sensor; 10] {
        [
            &self.temperature_core,
            &self.temperature_memory,
            &self.temperature_vrm_core,
            &self.temperature_vrm_memory,
            &self.temperature_vrm_memory0,
            &self.temperature_vrm_memory1,
            &self.temperature_vrm_soc,
            &self.temperature_liquid,
            &self.temperature_plx,
            &self.temperature_hotspot,
        ]
    }

    pub fn powers(&self) -> [&Sensor; 5] {
        [
            &self.power_core,
            &self.power_ppt,
            &self.power_socket,
            &self.power_total,
            &self.power_soc,
        ]
    }

    pub fn all(&self) -> Vec<&Sensor> {
        let mut sensors: Vec<&Sensor> = Vec::with_capacity(25);
        sensors.extend(self.temperatures());
        sensors.extend(self.powers());
        sensors.extend([
            &self.fan,
            &self.fan_percentage,
            &self.clock_core,
            &self.clock_memory,
            &self.clock_soc,
            &self.voltage_core,
            &self.voltage_memory,
            &self.voltage_soc,
            &self.load_core,
            &self.load_memory,
        ]);
        sensors
    }

    /// Set every reading to absent.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
