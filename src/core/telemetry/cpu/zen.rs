//! Family 17h/19h (Zen) decoding.

use std::time::Instant;

use super::energy::{energy_unit, EnergyTracker};
use super::{CpuSnapshot, EngineSettings};
use crate::core::telemetry::registers::{low_dword, lock_bus, read_smn, GroupAffinity, RegisterAccess};
use crate::core::telemetry::sensor::{all_absent, sum_present, Sensor, SensorKind};
use crate::core::telemetry::topology::Package;

const THM_TCON_CUR_TMP: u32 = 0x0005_9800;
const THM_TCON_RANGE_SEL: u32 = 0x8_0000;
const CCD_TEMP_BASE: u32 = 0x0005_9954;
const CCD_TEMP_VALID: u32 = 0x800;

const MSR_RAPL_PWR_UNIT: u32 = 0xC001_0299;
const MSR_CORE_ENERGY_STAT: u32 = 0xC001_029A;
const MSR_PKG_ENERGY_STAT: u32 = 0xC001_029B;
const MSR_P_STATE_0: u32 = 0xC001_0064;
const MSR_HW_P_STATE_STATUS: u32 = 0xC001_0293;

/// Temperature shift applied when the range-select bit is set.
pub const RANGE_SEL_OFFSET: f32 = 49.0;

/// Brand-string prefixes whose Tctl reads hotter than the die.
const TCTL_OFFSETS: &[(&str, f32)] = &[
    ("AMD Ryzen 5 1600X", 20.0),
    ("AMD Ryzen 7 1700X", 20.0),
    ("AMD Ryzen 7 1800X", 20.0),
    ("AMD Ryzen 7 2700X", 10.0),
    ("AMD Ryzen Threadripper 19", 27.0),
    ("AMD Ryzen Threadripper 29", 27.0),
];

/// Decode THM_TCON_CUR_TMP into degrees Celsius.
pub fn decode_tctl(raw: u32) -> f32 {
    let temperature = ((raw >> 21) & 0x7FF) as f32 / 8.0;
    if raw & THM_TCON_RANGE_SEL != 0 {
        temperature - RANGE_SEL_OFFSET
    } else {
        temperature
    }
}

/// Decode a CCD temperature register, `None` when the valid bit is clear.
pub fn decode_ccd(raw: u32) -> Option<f32> {
    if raw & CCD_TEMP_VALID == 0 {
        return None;
    }
    Some((raw & 0x7FF) as f32 / 8.0 - RANGE_SEL_OFFSET)
}

pub fn ccd_register(index: u32) -> u32 {
    CCD_TEMP_BASE + index * 4
}

pub fn tctl_offset(brand: &str) -> f32 {
    TCTL_OFFSETS
        .iter()
        .find(|(prefix, _)| brand.starts_with(prefix))
        .map(|(_, offset)| *offset)
        .unwrap_or(0.0)
}

pub fn max_ccd_count(model: u32) -> u32 {
    match model & 0xF0 {
        0x30 | 0x70 => 8,
        _ => 4,
    }
}

/// Core multiplier from a P-state register (2·FID / DFS).
pub fn pstate_multiplier(raw: u32) -> Option<f64> {
    let dfs = (raw >> 8) & 0x3F;
    let fid = raw & 0xFF;
    if dfs == 0 {
        return None;
    }
    Some(2.0 * fid as f64 / dfs as f64)
}

struct ZenCore {
    affinity: Option<GroupAffinity>,
    energy: EnergyTracker,
    power: Sensor,
    clock: Sensor,
}

pub struct ZenState {
    affinity: Option<GroupAffinity>,
    tctl_offset: f32,
    energy_unit: Option<f32>,
    package_energy: EnergyTracker,
    cores: Vec<ZenCore>,
    package_temperature: Sensor,
    control_temperature: Option<Sensor>,
    ccd_temperatures: Vec<Sensor>,
    ccd_max: Sensor,
    ccd_avg: Sensor,
    package_power: Sensor,
    cores_power: Sensor,
    bus_clock: Sensor,
}

impl ZenState {
    pub fn new(session: &dyn RegisterAccess, package: &Package, settings: &EngineSettings) -> Self {
        let first = package.first_thread();
        let brand = first.map(|t| t.brand.as_str()).unwrap_or_default();
        let model = first.map(|t| t.model).unwrap_or_default();
        let affinity = first.map(|t| t.affinity());

        let tctl_offset = tctl_offset(brand);
        let ccd_count = max_ccd_count(model);

        let energy_unit = read_on(session, MSR_RAPL_PWR_UNIT, affinity)
            .map(|raw| energy_unit(low_dword(raw)))
            .filter(|unit| *unit != 0.0);

        let now = Instant::now();
        let package_energy = match energy_unit {
            Some(_) => EnergyTracker::primed(
                read_on(session, MSR_PKG_ENERGY_STAT, affinity).map(low_dword),
                now,
            ),
            None => EnergyTracker::default(),
        };

        let mut bus_clock = Sensor::new(SensorKind::Clock, "Bus Speed");
        let tsc_multiplier =
            read_on(session, MSR_P_STATE_0, affinity).and_then(|raw| pstate_multiplier(low_dword(raw)));
        if let (Some(tsc_mhz), Some(multiplier)) = (settings.tsc_mhz, tsc_multiplier) {
            if multiplier > 0.0 {
                bus_clock.set(Some((tsc_mhz / multiplier) as f32));
            }
        }

        let cores = package
            .cores
            .iter()
            .enumerate()
            .map(|(i, core)| {
                let affinity = core.affinity();
                let energy = match (energy_unit, affinity) {
                    (Some(_), Some(affinity)) => EnergyTracker::primed(
                        session.read_msr_on(MSR_CORE_ENERGY_STAT, affinity).map(low_dword),
                        Instant::now(),
                    ),
                    _ => EnergyTracker::default(),
                };
                ZenCore {
                    affinity,
                    energy,
                    power: Sensor::indexed(SensorKind::Power, format!("Core #{}", i + 1), i),
                    clock: Sensor::indexed(SensorKind::Clock, format!("Core #{}", i + 1), i),
                }
            })
            .collect();

        log::debug!(
            "Zen package: {} core(s), {} CCD slot(s), Tctl offset {}",
            package.cores.len(),
            ccd_count,
            tctl_offset
        );

        Self {
            affinity,
            tctl_offset,
            energy_unit,
            package_energy,
            cores,
            package_temperature: Sensor::new(SensorKind::Temperature, "Core (Tdie)"),
            control_temperature: (tctl_offset != 0.0)
                .then(|| Sensor::new(SensorKind::Temperature, "Core (Tctl)")),
            ccd_temperatures: (0..ccd_count as usize)
                .map(|i| Sensor::indexed(SensorKind::Temperature, format!("CCD #{}", i + 1), i))
                .collect(),
            ccd_max: Sensor::new(SensorKind::Temperature, "CCDs Max (Tdie)"),
            ccd_avg: Sensor::new(SensorKind::Temperature, "CCDs Average (Tdie)"),
            package_power: Sensor::new(SensorKind::Power, "Package"),
            cores_power: Sensor::new(SensorKind::Power, "Cores"),
            bus_clock,
        }
    }

    pub fn update(&mut self, session: &dyn RegisterAccess, settings: &EngineSettings) {
        if let Some(_bus) = lock_bus(session, settings.bus_lock_timeout) {
            self.update_temperatures(session);
        }

        if let Some(unit) = self.energy_unit {
            let raw = read_on(session, MSR_PKG_ENERGY_STAT, self.affinity).map(low_dword);
            let power = self.package_energy.update(raw, Instant::now(), unit);
            self.package_power.set(power);
        }

        let bus_clock = self.bus_clock.value();
        for core in &mut self.cores {
            let Some(affinity) = core.affinity else {
                continue;
            };
            let energy = session.read_msr_on(MSR_CORE_ENERGY_STAT, affinity).map(low_dword);
            let energy_time = Instant::now();
            let multiplier = session
                .read_msr_on(MSR_HW_P_STATE_STATUS, affinity)
                .and_then(|raw| pstate_multiplier(low_dword(raw)));

            if let Some(unit) = self.energy_unit {
                let power = core.energy.update(energy, energy_time, unit);
                core.power.set(power);
            }

            // A failed P-state read keeps the previous clock.
            if let Some(multiplier) = multiplier {
                core.clock.set(bus_clock.map(|bus| (multiplier * bus as f64) as f32));
            }
        }

        self.cores_power
            .set(sum_present(self.cores.iter().map(|core| core.power.value())));
    }

    /// Batch of SMN reads; the caller holds the bus lock.
    fn update_temperatures(&mut self, session: &dyn RegisterAccess) {
        match read_smn(session, THM_TCON_CUR_TMP) {
            Some(raw) => {
                let tctl = decode_tctl(raw);
                if let Some(control) = self.control_temperature.as_mut() {
                    control.set(Some(tctl));
                }
                self.package_temperature.set(Some(tctl - self.tctl_offset));
            }
            None => {
                self.package_temperature.clear();
                if let Some(control) = self.control_temperature.as_mut() {
                    control.clear();
                }
            }
        }

        let mut max = f32::MIN;
        let mut sum = 0.0f32;
        let mut valid = 0usize;
        for (i, sensor) in self.ccd_temperatures.iter_mut().enumerate() {
            let reading = read_smn(session, ccd_register(i as u32)).and_then(decode_ccd);
            sensor.set(reading);
            if let Some(temperature) = reading {
                max = max.max(temperature);
                sum += temperature;
                valid += 1;
            }
        }

        if valid > 1 {
            self.ccd_max.set(Some(max));
            self.ccd_avg.set(Some(sum / valid as f32));
        } else {
            self.ccd_max.clear();
            self.ccd_avg.clear();
        }
    }

    pub fn primary_absent(&self) -> bool {
        all_absent([&self.package_temperature, &self.package_power])
    }

    pub fn fill(&self, snapshot: &mut CpuSnapshot) {
        snapshot.package_temperature = Some(self.package_temperature.clone());
        snapshot.control_temperature = self.control_temperature.clone();
        snapshot.ccd_temperatures = self.ccd_temperatures.clone();
        if self.ccd_temperatures.len() > 1 {
            snapshot.ccd_max_temperature = Some(self.ccd_max.clone());
            snapshot.ccd_avg_temperature = Some(self.ccd_avg.clone());
        }
        snapshot.package_power = Some(self.package_power.clone());
        snapshot.cores_power = Some(self.cores_power.clone());
        snapshot.bus_clock = Some(self.bus_clock.clone());
        snapshot.core_clocks = self.cores.iter().map(|c| c.clock.clone()).collect();
        snapshot.core_powers = self.cores.iter().map(|c| c.power.clone()).collect();
    }
}

fn read_on(session: &dyn RegisterAccess, index: u32, affinity: Option<GroupAffinity>) -> Option<u64> {
    match affinity {
        Some(affinity) => session.read_msr_on(index, affinity),
        None => session.read_msr(index),
    }
}
