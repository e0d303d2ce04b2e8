//! Owned telemetry state behind three independent lock scopes.
//!
//! * CPU state: register session, topology and per-package devices.
//! * GPU session: control-library handle and layered device, or the
//!   metrics session.
//! * Resolved target: the session-path adapter picked by name.
//!
//! Everything is built lazily by the first poll that needs it. When both
//! GPU scopes are held, the session lock is taken first.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;

use super::cpu::{CpuDevice, CpuSnapshot, EngineSettings};
use super::gpu::layered::{GpuDevice, GpuSnapshot};
use super::gpu::session::{self as metrics_path, SessionGpuSnapshot};
use super::gpu::{ControlLibrary, ControlLibraryDriver, MetricsSession, MetricsSessionDriver, SessionAdapter};
use super::registers::{RegisterAccess, RegisterDriver};
use super::topology::{ProcessorProbe, Topology, TopologyResolver};
use super::watchdog::{Verdict, WatchdogResetPolicy};
use crate::core::config::Config;
use crate::error::{HardmonError, Result};

/// Values the context takes from configuration.
#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub bus_lock_timeout: Duration,
    pub adapter_name: Option<String>,
    pub max_power_watts: f32,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            bus_lock_timeout: Duration::from_millis(10),
            adapter_name: None,
            max_power_watts: 300.0,
        }
    }
}

impl From<&Config> for ContextSettings {
    fn from(config: &Config) -> Self {
        Self {
            bus_lock_timeout: Duration::from_millis(config.bus_lock_timeout_ms),
            adapter_name: config.adapter_name.clone(),
            max_power_watts: config.max_power_watts,
        }
    }
}

struct CpuState {
    // Devices hold their own handles; this one keeps the session alive
    // even when the device list is empty.
    _session: Arc<dyn RegisterAccess>,
    topology: Topology,
    devices: Vec<CpuDevice>,
}

enum CpuSlot {
    Empty,
    Ready(CpuState),
    /// Construction refused the vendor; never retried.
    Unsupported(String),
}

struct CpuScope {
    slot: CpuSlot,
    watchdog: WatchdogResetPolicy,
}

#[derive(Default)]
struct GpuSession {
    library: Option<Arc<dyn ControlLibrary>>,
    device: Option<GpuDevice>,
    metrics: Option<Arc<dyn MetricsSession>>,
}

struct GpuScope {
    session: GpuSession,
    watchdog: WatchdogResetPolicy,
}

pub struct TelemetryContext {
    register_driver: Arc<dyn RegisterDriver>,
    probe: Arc<dyn ProcessorProbe>,
    control_driver: Option<Arc<dyn ControlLibraryDriver>>,
    metrics_driver: Option<Arc<dyn MetricsSessionDriver>>,
    settings: ContextSettings,
    tsc_mhz: OnceLock<Option<f64>>,
    cpu: Mutex<CpuScope>,
    gpu: Mutex<GpuScope>,
    target: Mutex<Option<SessionAdapter>>,
}

impl TelemetryContext {
    pub fn new(
        register_driver: Arc<dyn RegisterDriver>,
        probe: Arc<dyn ProcessorProbe>,
        settings: ContextSettings,
    ) -> Self {
        Self {
            register_driver,
            probe,
            control_driver: None,
            metrics_driver: None,
            settings,
            tsc_mhz: OnceLock::new(),
            cpu: Mutex::new(CpuScope {
                slot: CpuSlot::Empty,
                watchdog: WatchdogResetPolicy::new("CPU"),
            }),
            gpu: Mutex::new(GpuScope {
                session: GpuSession::default(),
                watchdog: WatchdogResetPolicy::new("GPU"),
            }),
            target: Mutex::new(None),
        }
    }

    pub fn with_control_library(mut self, driver: Arc<dyn ControlLibraryDriver>) -> Self {
        self.control_driver = Some(driver);
        self
    }

    pub fn with_metrics_session(mut self, driver: Arc<dyn MetricsSessionDriver>) -> Self {
        self.metrics_driver = Some(driver);
        self
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Processor tree of the live session, or a fresh resolution when no
    /// session is up.
    pub fn topology(&self) -> Topology {
        let cpu = self.cpu.lock();
        match &cpu.slot {
            CpuSlot::Ready(state) => state.topology.clone(),
            _ => TopologyResolver::new(self.probe.as_ref()).resolve(),
        }
    }

    /// Poll every CPU package once.
    pub fn cpu_snapshots(&self) -> Result<Vec<CpuSnapshot>> {
        let mut cpu = self.cpu.lock();
        let CpuScope { slot, watchdog } = &mut *cpu;

        let outcome = self.poll_cpu(slot);
        if watchdog.inspect(&outcome, |(_, degenerate)| *degenerate) == Verdict::Reset {
            Self::release_cpu(slot);
        }
        outcome.map(|(snapshots, _)| snapshots)
    }

    /// Poll the GPU through the layered control library.
    pub fn gpu_snapshot(&self) -> Result<GpuSnapshot> {
        let mut gpu = self.gpu.lock();
        let GpuScope { session, watchdog } = &mut *gpu;

        let outcome = self.poll_layered(session);
        if watchdog.inspect(&outcome, |(_, degenerate)| *degenerate) == Verdict::Reset {
            Self::release_layered(session);
        }
        outcome.map(|(snapshot, _)| snapshot)
    }

    /// Poll the GPU through the metrics session.
    pub fn session_gpu_snapshot(&self) -> Result<SessionGpuSnapshot> {
        let mut gpu = self.gpu.lock();
        let GpuScope { session, watchdog } = &mut *gpu;

        let outcome = self.poll_session(session);
        let degenerate =
            |s: &SessionGpuSnapshot| s.temperature.is_absent() && s.board_power.is_absent();
        if watchdog.inspect(&outcome, degenerate) == Verdict::Reset {
            session.metrics = None;
            *self.target.lock() = None;
        }
        outcome
    }

    /// Drop the register session and every derived device.
    pub fn reset_cpu(&self) {
        let mut cpu = self.cpu.lock();
        Self::release_cpu(&mut cpu.slot);
    }

    /// Drop every GPU handle and the resolved target.
    pub fn reset_gpu(&self) {
        let mut gpu = self.gpu.lock();
        gpu.session = GpuSession::default();
        *self.target.lock() = None;
        log::debug!("GPU state released");
    }

    pub fn cpu_resets(&self) -> u64 {
        self.cpu.lock().watchdog.resets()
    }

    pub fn gpu_resets(&self) -> u64 {
        self.gpu.lock().watchdog.resets()
    }

    fn poll_cpu(&self, slot: &mut CpuSlot) -> Result<(Vec<CpuSnapshot>, bool)> {
        if let CpuSlot::Unsupported(vendor) = slot {
            return Err(HardmonError::unsupported_vendor(vendor.as_str()));
        }

        if let CpuSlot::Empty = slot {
            match self.build_cpu_state() {
                Ok(state) => *slot = CpuSlot::Ready(state),
                Err(HardmonError::UnsupportedVendor { vendor }) => {
                    *slot = CpuSlot::Unsupported(vendor.clone());
                    return Err(HardmonError::UnsupportedVendor { vendor });
                }
                Err(error) => return Err(error),
            }
        }

        let CpuSlot::Ready(state) = slot else {
            return Err(HardmonError::other("CPU state unavailable"));
        };

        let mut degenerate = false;
        let mut snapshots = Vec::with_capacity(state.devices.len());
        for device in &mut state.devices {
            device.update();
            degenerate |= device.is_degenerate();
            snapshots.push(device.snapshot());
        }
        Ok((snapshots, degenerate))
    }

    fn build_cpu_state(&self) -> Result<CpuState> {
        let session = self.register_driver.open()?;
        log::debug!("Register session opened");

        let topology = TopologyResolver::new(self.probe.as_ref()).resolve();
        if topology.is_empty() {
            return Err(HardmonError::NoProcessors);
        }

        let settings = EngineSettings {
            bus_lock_timeout: self.settings.bus_lock_timeout,
            tsc_mhz: *self
                .tsc_mhz
                .get_or_init(|| self.probe.timestamp_counter_mhz()),
        };

        let devices = topology
            .packages
            .iter()
            .enumerate()
            .map(|(index, package)| CpuDevice::new(index, package, Arc::clone(&session), settings))
            .collect::<Result<Vec<_>>>()?;

        Ok(CpuState {
            _session: session,
            topology,
            devices,
        })
    }

    fn release_cpu(slot: &mut CpuSlot) {
        if let CpuSlot::Ready(_) = slot {
            *slot = CpuSlot::Empty;
            log::debug!("Register session released");
        }
    }

    fn poll_layered(&self, session: &mut GpuSession) -> Result<(GpuSnapshot, bool)> {
        if session.library.is_none() {
            let driver = self
                .control_driver
                .as_ref()
                .ok_or_else(|| HardmonError::gpu_not_available("no control library configured"))?;
            session.library = Some(driver.open()?);
        }

        if session.device.is_none() {
            if let Some(library) = &session.library {
                session.device = Some(GpuDevice::resolve(Arc::clone(library))?);
            }
        }

        let device = session
            .device
            .as_mut()
            .ok_or_else(|| HardmonError::gpu_not_available("GPU device unavailable"))?;

        device.update();
        Ok((device.snapshot(), device.is_degenerate()))
    }

    fn release_layered(session: &mut GpuSession) {
        session.device = None;
        session.library = None;
        log::debug!("Control library released");
    }

    fn poll_session(&self, gpu: &mut GpuSession) -> Result<SessionGpuSnapshot> {
        let metrics = match &gpu.metrics {
            Some(metrics) => Arc::clone(metrics),
            None => {
                let driver = self
                    .metrics_driver
                    .as_ref()
                    .ok_or_else(|| HardmonError::gpu_not_available("no metrics session configured"))?;
                let metrics = driver.open()?;
                gpu.metrics = Some(Arc::clone(&metrics));
                metrics
            }
        };

        let mut target = self.target.lock();
        if target.is_none() {
            *target = Some(metrics_path::resolve_target(
                metrics.as_ref(),
                self.settings.adapter_name.as_deref(),
            )?);
        }

        let adapter = target
            .as_ref()
            .ok_or_else(|| HardmonError::gpu_not_available("GPU target unresolved"))?;
        metrics_path::poll(metrics.as_ref(), adapter, self.settings.max_power_watts)
    }
}
