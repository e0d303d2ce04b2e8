//! Families 10h–16h (K10 and its successors).

use super::{CpuSnapshot, EngineSettings};
use crate::core::telemetry::registers::{low_dword, lock_bus, GroupAffinity, PciAddress, RegisterAccess};
use crate::core::telemetry::sensor::{Sensor, SensorKind};
use crate::core::telemetry::topology::Package;

const REPORTED_TEMPERATURE_CONTROL: u32 = 0xA4;
const RANGE_SEL_MASK: u32 = 0x3_0000;

const MSR_P_STATE_0: u32 = 0xC001_0064;
const MSR_COFVID_STATUS: u32 = 0xC001_0071;

pub fn decode_temperature(raw: u32, family: u32) -> f32 {
    let temperature = ((raw >> 21) & 0x7FF) as f32 / 8.0;
    if family >= 0x15 && raw & RANGE_SEL_MASK == RANGE_SEL_MASK {
        temperature - 49.0
    } else {
        temperature
    }
}

/// Multiplier from COFVID status or a P-state definition: (FID + 16) / 2^DID.
pub fn cofvid_multiplier(raw: u32) -> f64 {
    let fid = raw & 0x3F;
    let did = (raw >> 6) & 0x7;
    (fid + 0x10) as f64 / (1u32 << did) as f64
}

struct K10Core {
    affinity: Option<GroupAffinity>,
    clock: Sensor,
}

pub struct K10State {
    family: u32,
    misc_control: PciAddress,
    cores: Vec<K10Core>,
    package_temperature: Sensor,
    bus_clock: Sensor,
}

impl K10State {
    pub fn new(
        session: &dyn RegisterAccess,
        misc_control: PciAddress,
        package: &Package,
        settings: &EngineSettings,
    ) -> Self {
        let first = package.first_thread();
        let family = first.map(|t| t.family).unwrap_or_default();

        let mut bus_clock = Sensor::new(SensorKind::Clock, "Bus Speed");
        let p0 = first
            .and_then(|t| session.read_msr_on(MSR_P_STATE_0, t.affinity()))
            .map(|raw| cofvid_multiplier(low_dword(raw)));
        if let (Some(tsc_mhz), Some(multiplier)) = (settings.tsc_mhz, p0) {
            bus_clock.set(Some((tsc_mhz / multiplier) as f32));
        }

        let cores = package
            .cores
            .iter()
            .enumerate()
            .map(|(i, core)| K10Core {
                affinity: core.affinity(),
                clock: Sensor::indexed(SensorKind::Clock, format!("Core #{}", i + 1), i),
            })
            .collect();

        Self {
            family,
            misc_control,
            cores,
            package_temperature: Sensor::new(SensorKind::Temperature, "Core"),
            bus_clock,
        }
    }

    pub fn update(&mut self, session: &dyn RegisterAccess, settings: &EngineSettings) {
        if let Some(_bus) = lock_bus(session, settings.bus_lock_timeout) {
            let reading = session
                .read_pci_config(self.misc_control, REPORTED_TEMPERATURE_CONTROL)
                .map(|raw| decode_temperature(raw, self.family));
            self.package_temperature.set(reading);
        }

        let bus_clock = self.bus_clock.value();
        for core in &mut self.cores {
            let Some(affinity) = core.affinity else {
                continue;
            };
            if let Some(raw) = session.read_msr_on(MSR_COFVID_STATUS, affinity) {
                let multiplier = cofvid_multiplier(low_dword(raw));
                core.clock
                    .set(bus_clock.map(|bus| (multiplier * bus as f64) as f32));
            }
        }
    }

    pub fn primary_absent(&self) -> bool {
        self.package_temperature.is_absent()
    }

    pub fn fill(&self, snapshot: &mut CpuSnapshot) {
        snapshot.package_temperature = Some(self.package_temperature.clone());
        snapshot.bus_clock = Some(self.bus_clock.clone());
        snapshot.core_clocks = self.cores.iter().map(|c| c.clock.clone()).collect();
    }
}
