//! In-memory stand-ins for the privileged driver and the GPU libraries.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use hardmon::core::telemetry::gpu::{
    AdapterInfo, ControlLibrary, ControlLibraryDriver, DeviceMetrics, MetricsSession,
    MetricsSessionDriver, Od6Power, OdnTemperature, PmActivity, PmLogData, SessionAdapter,
    AMD_VENDOR_ID,
};
use hardmon::core::telemetry::{
    ContextSettings, GroupAffinity, LogicalProcessor, PciAddress, ProcessorProbe, RegisterAccess,
    RegisterDriver, TelemetryContext, Vendor,
};
use hardmon::{HardmonError, Result};

pub const SMN_INDEX: u32 = 0x60;
pub const SMN_DATA: u32 = 0x64;
pub const THM_TCON_CUR_TMP: u32 = 0x0005_9800;
pub const CCD_TEMP_BASE: u32 = 0x0005_9954;
pub const MSR_RAPL_PWR_UNIT: u32 = 0xC001_0299;
pub const MSR_CORE_ENERGY_STAT: u32 = 0xC001_029A;
pub const MSR_PKG_ENERGY_STAT: u32 = 0xC001_029B;
pub const MSR_P_STATE_0: u32 = 0xC001_0064;
pub const MSR_HW_P_STATE_STATUS: u32 = 0xC001_0293;
pub const MSR_COFVID_STATUS: u32 = 0xC001_0071;
pub const REPORTED_TEMPERATURE_CONTROL: u32 = 0xA4;
pub const THERMTRIP_STATUS: u32 = 0xE4;

/// Register contents shared by every session a driver opens.
#[derive(Default)]
pub struct RegisterFile {
    pub msrs: Mutex<HashMap<u32, u64>>,
    /// Per-processor MSR values, checked before `msrs`.
    pub cpu_msrs: Mutex<HashMap<(usize, u32), u64>>,
    pub smn: Mutex<HashMap<u32, u32>>,
    /// PCI config values keyed by the value last written to the register.
    pub pci: Mutex<HashMap<(PciAddress, u32, u32), u32>>,
    /// Every PCI config write outside the SMN index port, in order.
    pub pci_writes: Mutex<Vec<(PciAddress, u32, u32)>>,
    /// Every read fails while set.
    pub dead: AtomicBool,
}

impl RegisterFile {
    pub fn set_msr(&self, index: u32, value: u64) {
        self.msrs.lock().insert(index, value);
    }

    pub fn set_cpu_msr(&self, cpu: usize, index: u32, value: u64) {
        self.cpu_msrs.lock().insert((cpu, index), value);
    }

    pub fn set_pci(&self, address: PciAddress, register: u32, select: u32, value: u32) {
        self.pci.lock().insert((address, register, select), value);
    }

    pub fn set_smn(&self, address: u32, value: u32) {
        self.smn.lock().insert(address, value);
    }

    pub fn kill(&self, dead: bool) {
        self.dead.store(dead, Ordering::SeqCst);
    }

    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }
}

pub struct FakeSession {
    file: Arc<RegisterFile>,
    smn_index: Mutex<u32>,
    selects: Mutex<HashMap<(PciAddress, u32), u32>>,
    bus: Mutex<()>,
    closes: Arc<AtomicUsize>,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl RegisterAccess for FakeSession {
    fn read_msr(&self, index: u32) -> Option<u64> {
        if self.file.is_dead() {
            return None;
        }
        self.file.msrs.lock().get(&index).copied()
    }

    fn read_msr_on(&self, index: u32, affinity: GroupAffinity) -> Option<u64> {
        if self.file.is_dead() {
            return None;
        }
        let own = affinity
            .first_cpu()
            .and_then(|cpu| self.file.cpu_msrs.lock().get(&(cpu, index)).copied());
        own.or_else(|| self.read_msr(index))
    }

    fn write_msr(&self, index: u32, value: u64) -> bool {
        self.file.set_msr(index, value);
        true
    }

    fn read_pci_config(&self, address: PciAddress, register: u32) -> Option<u32> {
        if self.file.is_dead() {
            return None;
        }
        if address == PciAddress::ROOT && register == SMN_DATA {
            let index = *self.smn_index.lock();
            return self.file.smn.lock().get(&index).copied();
        }
        let select = self
            .selects
            .lock()
            .get(&(address, register))
            .copied()
            .unwrap_or(0);
        self.file.pci.lock().get(&(address, register, select)).copied()
    }

    fn write_pci_config(&self, address: PciAddress, register: u32, value: u32) -> bool {
        if self.file.is_dead() {
            return false;
        }
        if address == PciAddress::ROOT && register == SMN_INDEX {
            *self.smn_index.lock() = value;
            return true;
        }
        self.selects.lock().insert((address, register), value);
        self.file.pci_writes.lock().push((address, register, value));
        true
    }

    fn bus_mutex(&self) -> &Mutex<()> {
        &self.bus
    }
}

/// Counts how many sessions were opened and dropped.
#[derive(Default)]
pub struct FakeRegisterDriver {
    pub file: Arc<RegisterFile>,
    pub opens: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub refuse: AtomicBool,
}

impl FakeRegisterDriver {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl RegisterDriver for FakeRegisterDriver {
    fn open(&self) -> Result<Arc<dyn RegisterAccess>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(HardmonError::driver_unavailable("fake driver refused"));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            file: Arc::clone(&self.file),
            smn_index: Mutex::new(0),
            selects: Mutex::new(HashMap::new()),
            bus: Mutex::new(()),
            closes: Arc::clone(&self.closes),
        }))
    }
}

/// Probe answering from a fixed slot table.
pub struct FakeProbe {
    pub threads: Vec<LogicalProcessor>,
    pub tsc_mhz: Option<f64>,
}

impl FakeProbe {
    pub fn new(threads: Vec<LogicalProcessor>) -> Self {
        Self {
            threads,
            tsc_mhz: Some(3400.0),
        }
    }
}

impl ProcessorProbe for FakeProbe {
    fn group_count(&self) -> u16 {
        1
    }

    fn probe(&self, group: u16, index: u8) -> Option<LogicalProcessor> {
        self.threads
            .iter()
            .find(|t| t.group == group && t.index == index)
            .cloned()
    }

    fn timestamp_counter_mhz(&self) -> Option<f64> {
        self.tsc_mhz
    }
}

pub fn thread(index: u8, package_id: u32, core_id: u32, vendor: Vendor, family: u32, model: u32) -> LogicalProcessor {
    LogicalProcessor {
        group: 0,
        index,
        package_id,
        core_id,
        apic_id: index as u32,
        vendor,
        family,
        model,
        stepping: 0,
        brand: "AMD Ryzen 9 5950X 16-Core Processor".to_string(),
    }
}

/// One Zen package, two cores with two threads each.
pub fn zen_threads() -> Vec<LogicalProcessor> {
    (0..4)
        .map(|i| thread(i, 0, (i / 2) as u32, Vendor::Amd, 0x19, 0x21))
        .collect()
}

/// Registers of a healthy Zen part: 75 °C Tctl, one valid CCD at 45 °C,
/// 34x P-state multiplier.
pub fn seed_zen(file: &RegisterFile) {
    file.set_smn(THM_TCON_CUR_TMP, 600 << 21);
    file.set_smn(CCD_TEMP_BASE, 0x800 | 0x2F0);
    file.set_msr(MSR_RAPL_PWR_UNIT, 16 << 8);
    file.set_msr(MSR_PKG_ENERGY_STAT, 0);
    file.set_msr(MSR_CORE_ENERGY_STAT, 0);
    file.set_msr(MSR_P_STATE_0, 0x0888);
    file.set_msr(MSR_HW_P_STATE_STATUS, 0x0888);
}

pub fn cpu_context(driver: Arc<FakeRegisterDriver>, probe: FakeProbe) -> TelemetryContext {
    TelemetryContext::new(driver, Arc::new(probe), ContextSettings::default())
}

/// Control library whose answers are set per call family. Records which
/// calls were made.
#[derive(Default)]
pub struct FakeControlLibrary {
    pub context: bool,
    pub overdrive_version: Option<i32>,
    pub adapters: Vec<AdapterInfo>,
    pub pm_log: Mutex<Option<PmLogData>>,
    pub odn_temperatures: Mutex<HashMap<OdnTemperature, i32>>,
    pub od6_powers: Mutex<HashMap<Od6Power, i32>>,
    pub od5_temperature: Mutex<Option<i32>>,
    pub od5_fan_rpm: Option<i32>,
    pub activity: Option<PmActivity>,
    pub calls: Mutex<HashSet<&'static str>>,
}

impl FakeControlLibrary {
    pub fn called(&self, call: &'static str) -> bool {
        self.calls.lock().contains(call)
    }

    pub fn forget_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().insert(call);
    }
}

pub fn amd_adapter(index: i32) -> AdapterInfo {
    AdapterInfo {
        index,
        name: "AMD Radeon(TM) RX 6800 XT".to_string(),
        udid: format!("PCI_VEN_1002&DEV_73BF&{}", index),
        vendor_id: AMD_VENDOR_ID,
        bus: 11,
        device: 0,
        active: true,
    }
}

impl ControlLibrary for FakeControlLibrary {
    fn has_context(&self) -> bool {
        self.context
    }

    fn adapters(&self) -> Result<Vec<AdapterInfo>> {
        self.record("adapters");
        Ok(self.adapters.clone())
    }

    fn overdrive_version(&self, _adapter: i32) -> Option<i32> {
        self.overdrive_version
    }

    fn pm_log(&self, _adapter: i32) -> Option<PmLogData> {
        self.record("pm_log");
        self.pm_log.lock().clone()
    }

    fn odn_temperature(&self, _adapter: i32, kind: OdnTemperature) -> Option<i32> {
        self.record("odn_temperature");
        self.odn_temperatures.lock().get(&kind).copied()
    }

    fn od6_power(&self, _adapter: i32, kind: Od6Power) -> Option<i32> {
        self.record("od6_power");
        self.od6_powers.lock().get(&kind).copied()
    }

    fn od5_temperature(&self, _adapter: i32) -> Option<i32> {
        self.record("od5_temperature");
        *self.od5_temperature.lock()
    }

    fn od5_fan_rpm(&self, _adapter: i32) -> Option<i32> {
        self.od5_fan_rpm
    }

    fn od5_fan_percent(&self, _adapter: i32) -> Option<i32> {
        None
    }

    fn od5_activity(&self, _adapter: i32) -> Option<PmActivity> {
        self.activity
    }
}

/// Hands out the same library on every open.
pub struct FakeControlDriver {
    pub library: Arc<FakeControlLibrary>,
    pub opens: AtomicUsize,
}

impl FakeControlDriver {
    pub fn new(library: FakeControlLibrary) -> Self {
        Self {
            library: Arc::new(library),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl ControlLibraryDriver for FakeControlDriver {
    fn open(&self) -> Result<Arc<dyn ControlLibrary>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.library) as Arc<dyn ControlLibrary>)
    }
}

#[derive(Default)]
pub struct FakeMetricsSession {
    pub adapters: Mutex<Vec<SessionAdapter>>,
    pub metrics: Mutex<DeviceMetrics>,
    pub fps: Option<f32>,
    pub enumerations: AtomicUsize,
}

pub fn session_adapter(name: &str, handle: usize) -> SessionAdapter {
    SessionAdapter {
        name: name.to_string(),
        vendor_id: AMD_VENDOR_ID,
        bus_id: handle as u32 + 3,
        handle,
    }
}

impl MetricsSession for FakeMetricsSession {
    fn adapters(&self) -> Result<Vec<SessionAdapter>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        Ok(self.adapters.lock().clone())
    }

    fn current_metrics(&self, adapter: &SessionAdapter) -> Result<DeviceMetrics> {
        if !self.adapters.lock().iter().any(|a| a.handle == adapter.handle) {
            return Err(HardmonError::adapter_not_found(adapter.name.as_str()));
        }
        Ok(*self.metrics.lock())
    }

    fn current_fps(&self, _adapter: &SessionAdapter) -> Result<Option<f32>> {
        Ok(self.fps)
    }
}

pub struct FakeMetricsDriver {
    pub session: Arc<FakeMetricsSession>,
    pub opens: AtomicUsize,
}

impl FakeMetricsDriver {
    pub fn new(session: FakeMetricsSession) -> Self {
        Self {
            session: Arc::new(session),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl MetricsSessionDriver for FakeMetricsDriver {
    fn open(&self) -> Result<Arc<dyn MetricsSession>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.session) as Arc<dyn MetricsSession>)
    }
}

/// Context with no working CPU side, for GPU-only tests.
pub fn gpu_context(settings: ContextSettings) -> TelemetryContext {
    let driver = Arc::new(FakeRegisterDriver::default());
    driver.refuse.store(true, Ordering::SeqCst);
    TelemetryContext::new(driver, Arc::new(FakeProbe::new(Vec::new())), settings)
}

/// `value` is present and within a rounding error of `expected`.
pub fn close(value: Option<f32>, expected: f32) -> bool {
    value.is_some_and(|v| (v - expected).abs() < 1e-3)
}
