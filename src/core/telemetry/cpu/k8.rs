//! Family 0Fh (K8).

use super::{CpuSnapshot, EngineSettings};
use crate::core::telemetry::registers::{low_dword, lock_bus, GroupAffinity, PciAddress, RegisterAccess};
use crate::core::telemetry::sensor::{Sensor, SensorKind};
use crate::core::telemetry::topology::Package;

const THERMTRIP_STATUS: u32 = 0xE4;
const MSR_FIDVID_STATUS: u32 = 0xC001_0042;

pub fn temperature_offset(model: u32) -> f32 {
    let mut offset = -49.0;
    if model >= 0x69 && !matches!(model, 0xC1 | 0x6C | 0x7C) {
        offset += 21.0;
    }
    offset
}

/// Sensor-select values for core 0 and core 1.
pub fn core_select(model: u32) -> [u32; 2] {
    if model >= 0x40 {
        [0x0, 0x4]
    } else {
        [0x4, 0x0]
    }
}

pub fn decode_temperature(raw: u32, offset: f32) -> f32 {
    ((raw >> 16) & 0xFF) as f32 + offset
}

/// (current multiplier, maximum multiplier) from FIDVID status.
pub fn fidvid_multipliers(raw: u32) -> (f64, f64) {
    let current = 0.5 * ((raw & 0x3F) + 8) as f64;
    let maximum = 0.5 * (((raw >> 16) & 0x3F) + 8) as f64;
    (current, maximum)
}

struct K8Core {
    affinity: Option<GroupAffinity>,
    temperature: Sensor,
    clock: Sensor,
}

pub struct K8State {
    misc_control: PciAddress,
    offset: f32,
    select: [u32; 2],
    tsc_mhz: Option<f64>,
    cores: Vec<K8Core>,
    package_temperature: Sensor,
    bus_clock: Sensor,
}

impl K8State {
    pub fn new(misc_control: PciAddress, package: &Package, settings: &EngineSettings) -> Self {
        let model = package.first_thread().map(|t| t.model).unwrap_or_default();

        let cores = package
            .cores
            .iter()
            .enumerate()
            .map(|(i, core)| K8Core {
                affinity: core.affinity(),
                temperature: Sensor::indexed(
                    SensorKind::Temperature,
                    format!("Core #{}", i + 1),
                    i,
                ),
                clock: Sensor::indexed(SensorKind::Clock, format!("Core #{}", i + 1), i),
            })
            .collect();

        Self {
            misc_control,
            offset: temperature_offset(model),
            select: core_select(model),
            tsc_mhz: settings.tsc_mhz,
            cores,
            package_temperature: Sensor::new(SensorKind::Temperature, "Core Average"),
            bus_clock: Sensor::new(SensorKind::Clock, "Bus Speed"),
        }
    }

    pub fn update(&mut self, session: &dyn RegisterAccess, settings: &EngineSettings) {
        if let Some(_bus) = lock_bus(session, settings.bus_lock_timeout) {
            // Only the first two cores have a selectable sensor.
            for (i, core) in self.cores.iter_mut().take(2).enumerate() {
                let reading = session
                    .write_pci_config(self.misc_control, THERMTRIP_STATUS, self.select[i])
                    .then(|| session.read_pci_config(self.misc_control, THERMTRIP_STATUS))
                    .flatten()
                    .map(|raw| decode_temperature(raw, self.offset));
                core.temperature.set(reading);
            }

            let readings: Vec<f32> = self
                .cores
                .iter()
                .filter_map(|core| core.temperature.value())
                .collect();
            self.package_temperature.set(if readings.is_empty() {
                None
            } else {
                Some(readings.iter().sum::<f32>() / readings.len() as f32)
            });
        }

        for core in &mut self.cores {
            let Some(affinity) = core.affinity else {
                continue;
            };
            if let Some(raw) = session.read_msr_on(MSR_FIDVID_STATUS, affinity) {
                let (current, maximum) = fidvid_multipliers(low_dword(raw));
                if let Some(tsc_mhz) = self.tsc_mhz {
                    let bus = tsc_mhz / maximum;
                    core.clock.set(Some((current * bus) as f32));
                    self.bus_clock.set(Some(bus as f32));
                }
            }
        }
    }

    pub fn primary_absent(&self) -> bool {
        self.package_temperature.is_absent()
    }

    pub fn fill(&self, snapshot: &mut CpuSnapshot) {
        snapshot.package_temperature = Some(self.package_temperature.clone());
        snapshot.core_temperatures = self
            .cores
            .iter()
            .take(2)
            .map(|c| c.temperature.clone())
            .collect();
        snapshot.bus_clock = Some(self.bus_clock.clone());
        snapshot.core_clocks = self.cores.iter().map(|c| c.clock.clone()).collect();
    }
}
