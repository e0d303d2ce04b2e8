//! CPU sensor engine: one device per physical package, with the decoding
//! strategy picked once from (vendor, family).

pub mod energy;
pub mod k10;
pub mod k8;
pub mod zen;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::registers::{PciAddress, RegisterAccess};
use super::sensor::Sensor;
use super::topology::{Package, Vendor};
use crate::error::{HardmonError, Result};

use self::k10::K10State;
use self::k8::K8State;
use self::zen::ZenState;

/// Knobs shared by every CPU device of one session.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Bounded wait for the PCI/SMN bus lock.
    pub bus_lock_timeout: Duration,
    /// Measured time-stamp-counter frequency.
    pub tsc_mhz: Option<f64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bus_lock_timeout: Duration::from_millis(10),
            tsc_mhz: None,
        }
    }
}

/// Packages addressable through devices 18h..1Fh on bus 0.
pub const MAX_NORTHBRIDGE_PACKAGES: usize = 8;

/// Northbridge miscellaneous-control function of package `index`, `None`
/// past the last northbridge device.
pub fn misc_control_address(index: usize) -> Option<PciAddress> {
    (index < MAX_NORTHBRIDGE_PACKAGES).then(|| PciAddress::new(0, 0x18 + index as u8, 3))
}

/// Decoding strategy, selected at construction.
pub enum Strategy {
    Generic,
    K8(K8State),
    K10(K10State),
    Zen(ZenState),
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Generic => "Generic",
            Strategy::K8(_) => "K8",
            Strategy::K10(_) => "K10",
            Strategy::Zen(_) => "Zen",
        }
    }
}

/// Point-in-time view of one package.
#[derive(Debug, Clone, Serialize)]
pub struct CpuSnapshot {
    pub index: usize,
    pub brand: String,
    pub family: String,
    pub package_temperature: Option<Sensor>,
    pub control_temperature: Option<Sensor>,
    pub core_temperatures: Vec<Sensor>,
    pub ccd_temperatures: Vec<Sensor>,
    pub ccd_max_temperature: Option<Sensor>,
    pub ccd_avg_temperature: Option<Sensor>,
    pub package_power: Option<Sensor>,
    pub cores_power: Option<Sensor>,
    pub bus_clock: Option<Sensor>,
    pub core_clocks: Vec<Sensor>,
    pub core_powers: Vec<Sensor>,
    pub timestamp: DateTime<Utc>,
}

impl CpuSnapshot {
    pub fn new(index: usize, brand: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            index,
            brand: brand.into(),
            family: family.into(),
            package_temperature: None,
            control_temperature: None,
            core_temperatures: Vec::new(),
            ccd_temperatures: Vec::new(),
            ccd_max_temperature: None,
            ccd_avg_temperature: None,
            package_power: None,
            cores_power: None,
            bus_clock: None,
            core_clocks: Vec::new(),
            core_powers: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn package_temperature_value(&self) -> Option<f32> {
        self.package_temperature.as_ref().and_then(Sensor::value)
    }

    pub fn package_power_value(&self) -> Option<f32> {
        self.package_power.as_ref().and_then(Sensor::value)
    }
}

/// Sensor engine bound to one package and one register session.
pub struct CpuDevice {
    index: usize,
    brand: String,
    session: Arc<dyn RegisterAccess>,
    settings: EngineSettings,
    strategy: Strategy,
}

impl CpuDevice {
    /// Pick the strategy for `package`. Non-AMD vendors are refused.
    pub fn new(
        index: usize,
        package: &Package,
        session: Arc<dyn RegisterAccess>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let first = package.first_thread().ok_or(HardmonError::NoProcessors)?;

        if first.vendor != Vendor::Amd {
            return Err(HardmonError::unsupported_vendor(first.vendor.to_string()));
        }

        let strategy = match (first.family, misc_control_address(index)) {
            (0x0F, Some(misc_control)) => Strategy::K8(K8State::new(misc_control, package, &settings)),
            (0x10 | 0x11 | 0x12 | 0x14 | 0x15 | 0x16, Some(misc_control)) => Strategy::K10(
                K10State::new(session.as_ref(), misc_control, package, &settings),
            ),
            (0x0F | 0x10 | 0x11 | 0x12 | 0x14 | 0x15 | 0x16, None) => {
                log::warn!(
                    "CPU #{}: no northbridge device beyond {} packages, temperatures unavailable",
                    index,
                    MAX_NORTHBRIDGE_PACKAGES
                );
                Strategy::Generic
            }
            (0x17 | 0x19, _) => Strategy::Zen(ZenState::new(session.as_ref(), package, &settings)),
            _ => Strategy::Generic,
        };

        log::info!(
            "CPU #{}: {} (family {:#x}, model {:#x}) using {} strategy",
            index,
            first.brand.trim(),
            first.family,
            first.model,
            strategy.label()
        );

        Ok(Self {
            index,
            brand: first.brand.trim().to_string(),
            session,
            settings,
            strategy,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Advance incremental state and refresh every sensor.
    pub fn update(&mut self) {
        let session = self.session.as_ref();
        match &mut self.strategy {
            Strategy::Generic => {}
            Strategy::K8(state) => state.update(session, &self.settings),
            Strategy::K10(state) => state.update(session, &self.settings),
            Strategy::Zen(state) => state.update(session, &self.settings),
        }
    }

    /// Primary temperature/power sensors are all absent after an update.
    pub fn is_degenerate(&self) -> bool {
        match &self.strategy {
            Strategy::Generic => false,
            Strategy::K8(state) => state.primary_absent(),
            Strategy::K10(state) => state.primary_absent(),
            Strategy::Zen(state) => state.primary_absent(),
        }
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        let mut snapshot = CpuSnapshot::new(self.index, &self.brand, self.strategy.label());
        match &self.strategy {
            Strategy::Generic => {}
            Strategy::K8(state) => state.fill(&mut snapshot),
            Strategy::K10(state) => state.fill(&mut snapshot),
            Strategy::Zen(state) => state.fill(&mut snapshot),
        }
        snapshot
    }
}
