//! amdgpu sysfs backend.
//!
//! Serves both GPU surfaces from `/sys/class/drm/card*/device`. There is no
//! bulk performance log here, so the layered engine settles on the mid tier
//! when the hwmon exposes labelled temperatures and on the legacy tier
//! otherwise.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::telemetry::gpu::{
    AdapterInfo, ControlLibrary, ControlLibraryDriver, DeviceMetrics, MetricsSession,
    MetricsSessionDriver, Od6Power, OdnTemperature, PmActivity, PmLogData, SessionAdapter,
    AMD_VENDOR_ID,
};
use crate::error::{HardmonError, Result};

const DRM_ROOT: &str = "/sys/class/drm";

fn read_sysfs_str(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_sysfs_i64(path: &Path) -> Option<i64> {
    read_sysfs_str(path)?.parse().ok()
}

fn parse_hex(value: &str) -> Option<u32> {
    u32::from_str_radix(value.trim_start_matches("0x"), 16).ok()
}

/// `0000:03:00.0` → (bus 3, device 0).
pub fn parse_slot_name(slot: &str) -> Option<(i32, i32)> {
    let mut parts = slot.rsplitn(3, ':');
    let dev_fn = parts.next()?;
    let bus = parts.next()?;
    let device = dev_fn.split('.').next()?;
    Some((
        i32::from_str_radix(bus, 16).ok()?,
        i32::from_str_radix(device, 16).ok()?,
    ))
}

#[derive(Debug, Clone)]
struct Card {
    index: i32,
    name: String,
    slot: String,
    vendor_id: u32,
    bus: i32,
    device: i32,
    active: bool,
    device_path: PathBuf,
    hwmon: Option<PathBuf>,
}

impl Card {
    fn hwmon_file(&self, name: &str) -> Option<i64> {
        read_sysfs_i64(&self.hwmon.as_ref()?.join(name))
    }

    /// `tempN_input` of the channel whose label is `label`.
    fn labelled_temperature(&self, label: &str) -> Option<i64> {
        let hwmon = self.hwmon.as_ref()?;
        (1..=8).find_map(|n| {
            let found = read_sysfs_str(&hwmon.join(format!("temp{}_label", n)))?;
            if found.eq_ignore_ascii_case(label) {
                read_sysfs_i64(&hwmon.join(format!("temp{}_input", n)))
            } else {
                None
            }
        })
    }

    fn has_labelled_temperatures(&self) -> bool {
        self.hwmon
            .as_ref()
            .map(|h| h.join("temp1_label").exists())
            .unwrap_or(false)
    }

    fn board_power_microwatts(&self) -> Option<i64> {
        self.hwmon_file("power1_average")
            .or_else(|| self.hwmon_file("power1_input"))
    }
}

fn read_card_name(device_path: &Path) -> String {
    if let Some(name) = read_sysfs_str(&device_path.join("product_name")).filter(|n| !n.is_empty()) {
        return name;
    }
    if let Some(label) = read_sysfs_str(&device_path.join("label")) {
        return label;
    }
    match read_sysfs_str(&device_path.join("device")) {
        Some(id) => format!("AMD Radeon Graphics ({})", id),
        None => "AMD Radeon Graphics".to_string(),
    }
}

fn find_hwmon(device_path: &Path) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(device_path.join("hwmon"))
        .ok()?
        .flatten()
        .map(|e| e.path())
        .collect();
    entries.sort();
    entries.into_iter().next()
}

fn enumerate_cards(drm_root: &Path) -> Vec<Card> {
    let Ok(entries) = fs::read_dir(drm_root) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        // card0, card1, … but not card0-DP-1
        .filter(|n| n.starts_with("card") && !n.contains('-'))
        .collect();
    names.sort();

    names
        .into_iter()
        .filter_map(|name| {
            let index: i32 = name.trim_start_matches("card").parse().ok()?;
            let device_path = drm_root.join(&name).join("device");
            let uevent = read_sysfs_str(&device_path.join("uevent"))?;
            if !uevent.lines().any(|l| l == "DRIVER=amdgpu") {
                return None;
            }

            let slot = uevent
                .lines()
                .find_map(|l| l.strip_prefix("PCI_SLOT_NAME="))
                .unwrap_or_default()
                .to_string();
            let (bus, device) = parse_slot_name(&slot).unwrap_or((-1, -1));
            let vendor_id = read_sysfs_str(&device_path.join("vendor"))
                .and_then(|v| parse_hex(&v))
                .unwrap_or(AMD_VENDOR_ID);
            let active = read_sysfs_str(&device_path.join("enable"))
                .map(|v| v != "0")
                .unwrap_or(true);

            Some(Card {
                index,
                name: read_card_name(&device_path),
                slot,
                vendor_id,
                bus,
                device,
                active,
                hwmon: find_hwmon(&device_path),
                device_path,
            })
        })
        .collect()
}

/// Handle over every amdgpu card found at open time.
pub struct AmdgpuLibrary {
    cards: Vec<Card>,
}

impl AmdgpuLibrary {
    fn card(&self, adapter: i32) -> Option<&Card> {
        self.cards.iter().find(|c| c.index == adapter)
    }
}

impl ControlLibrary for AmdgpuLibrary {
    fn has_context(&self) -> bool {
        self.cards.iter().any(Card::has_labelled_temperatures)
    }

    fn adapters(&self) -> Result<Vec<AdapterInfo>> {
        Ok(self
            .cards
            .iter()
            .map(|c| AdapterInfo {
                index: c.index,
                name: c.name.clone(),
                udid: c.slot.clone(),
                vendor_id: c.vendor_id,
                bus: c.bus,
                device: c.device,
                active: c.active,
            })
            .collect())
    }

    fn overdrive_version(&self, adapter: i32) -> Option<i32> {
        let card = self.card(adapter)?;
        Some(if card.has_labelled_temperatures() { 7 } else { 5 })
    }

    fn pm_log(&self, _adapter: i32) -> Option<PmLogData> {
        None
    }

    fn odn_temperature(&self, adapter: i32, kind: OdnTemperature) -> Option<i32> {
        let label = match kind {
            OdnTemperature::Core => "edge",
            OdnTemperature::Hotspot => "junction",
            OdnTemperature::Memory => "mem",
            _ => return None,
        };
        self.card(adapter)?
            .labelled_temperature(label)
            .map(|millidegrees| millidegrees as i32)
    }

    fn od6_power(&self, adapter: i32, kind: Od6Power) -> Option<i32> {
        if kind != Od6Power::Total {
            return None;
        }
        let microwatts = self.card(adapter)?.board_power_microwatts()?;
        Some((microwatts as f64 / 1e6 * 255.0).round() as i32)
    }

    fn od5_temperature(&self, adapter: i32) -> Option<i32> {
        self.card(adapter)?
            .hwmon_file("temp1_input")
            .map(|millidegrees| millidegrees as i32)
    }

    fn od5_fan_rpm(&self, adapter: i32) -> Option<i32> {
        self.card(adapter)?.hwmon_file("fan1_input").map(|rpm| rpm as i32)
    }

    fn od5_fan_percent(&self, adapter: i32) -> Option<i32> {
        self.card(adapter)?
            .hwmon_file("pwm1")
            .map(|pwm| (pwm * 100 / 255) as i32)
    }

    fn od5_activity(&self, adapter: i32) -> Option<PmActivity> {
        let card = self.card(adapter)?;
        let engine = card.hwmon_file("freq1_input");
        let memory = card.hwmon_file("freq2_input");
        let vddc = card.hwmon_file("in0_input");
        let busy = read_sysfs_i64(&card.device_path.join("gpu_busy_percent"));

        if engine.is_none() && memory.is_none() && vddc.is_none() && busy.is_none() {
            return None;
        }

        // Hz → 10 kHz
        Some(PmActivity {
            engine_clock: engine.map(|hz| (hz / 10_000) as i32).unwrap_or(0),
            memory_clock: memory.map(|hz| (hz / 10_000) as i32).unwrap_or(0),
            vddc: vddc.map(|mv| mv as i32).unwrap_or(0),
            activity_percent: busy.map(|p| p as i32).unwrap_or(-1),
        })
    }
}

impl MetricsSession for AmdgpuLibrary {
    fn adapters(&self) -> Result<Vec<SessionAdapter>> {
        Ok(self
            .cards
            .iter()
            .enumerate()
            .map(|(handle, c)| SessionAdapter {
                name: c.name.clone(),
                vendor_id: c.vendor_id,
                bus_id: c.bus.max(0) as u32,
                handle,
            })
            .collect())
    }

    fn current_metrics(&self, adapter: &SessionAdapter) -> Result<DeviceMetrics> {
        let card = self
            .cards
            .get(adapter.handle)
            .ok_or_else(|| HardmonError::adapter_not_found(adapter.name.as_str()))?;
        if card.hwmon.is_none() {
            return Err(HardmonError::gpu_not_available(format!(
                "{} exposes no hwmon directory",
                card.name
            )));
        }

        let temperature = card
            .labelled_temperature("edge")
            .or_else(|| card.hwmon_file("temp1_input"));

        Ok(DeviceMetrics {
            temperature: temperature.map(|t| t as f32 / 1000.0),
            hotspot_temperature: card.labelled_temperature("junction").map(|t| t as f32 / 1000.0),
            board_power: card.board_power_microwatts().map(|uw| uw as f32 / 1e6),
            fan_rpm: card.hwmon_file("fan1_input").map(|rpm| rpm as f32),
        })
    }

    fn current_fps(&self, _adapter: &SessionAdapter) -> Result<Option<f32>> {
        Ok(None)
    }
}

/// Opens [`AmdgpuLibrary`] handles for either GPU path.
#[derive(Debug, Clone)]
pub struct AmdgpuDriver {
    drm_root: PathBuf,
}

impl Default for AmdgpuDriver {
    fn default() -> Self {
        Self::with_root(DRM_ROOT)
    }
}

impl AmdgpuDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(drm_root: impl AsRef<Path>) -> Self {
        Self {
            drm_root: drm_root.as_ref().to_path_buf(),
        }
    }

    fn open_library(&self) -> Result<Arc<AmdgpuLibrary>> {
        let cards = enumerate_cards(&self.drm_root);
        if cards.is_empty() {
            return Err(HardmonError::gpu_not_available(format!(
                "no amdgpu cards under {}",
                self.drm_root.display()
            )));
        }
        log::debug!("amdgpu backend found {} card(s)", cards.len());
        Ok(Arc::new(AmdgpuLibrary { cards }))
    }
}

impl ControlLibraryDriver for AmdgpuDriver {
    fn open(&self) -> Result<Arc<dyn ControlLibrary>> {
        Ok(self.open_library()?)
    }
}

impl MetricsSessionDriver for AmdgpuDriver {
    fn open(&self) -> Result<Arc<dyn MetricsSession>> {
        Ok(self.open_library()?)
    }
}
