//! Processor probe: CPUID under a pinned affinity plus sysfs topology ids.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::telemetry::registers::{GroupAffinity, GROUP_SIZE};
use crate::core::telemetry::topology::{LogicalProcessor, ProcessorProbe, Vendor};
use crate::platform::affinity::{configured_cpus, AffinityGuard};

const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";
const TSC_SAMPLE: Duration = Duration::from_millis(100);

/// Identity read by CPUID on the current processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuIdentity {
    pub vendor: Vendor,
    pub family: u32,
    pub model: u32,
    pub stepping: u32,
    pub brand: String,
    pub apic_id: u32,
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn read_identity() -> Option<CpuIdentity> {
    use raw_cpuid::CpuId;

    let cpuid = CpuId::new();
    let vendor = cpuid.get_vendor_info()?;
    let features = cpuid.get_feature_info()?;
    let brand = cpuid
        .get_processor_brand_string()
        .map(|b| b.as_str().trim().to_string())
        .unwrap_or_default();

    Some(CpuIdentity {
        vendor: Vendor::from_cpuid(vendor.as_str()),
        family: features.family_id() as u32,
        model: features.model_id() as u32,
        stepping: features.stepping_id() as u32,
        brand,
        apic_id: features.initial_local_apic_id() as u32,
    })
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn read_identity() -> Option<CpuIdentity> {
    None
}

/// Estimate the TSC rate by counting ticks across a short sleep.
#[cfg(target_arch = "x86_64")]
pub fn measure_tsc_mhz() -> Option<f64> {
    use std::arch::x86_64::_rdtsc;
    use std::time::Instant;

    let start = Instant::now();
    // SAFETY: rdtsc has no preconditions on x86_64.
    let begin = unsafe { _rdtsc() };
    std::thread::sleep(TSC_SAMPLE);
    let end = unsafe { _rdtsc() };
    let elapsed = start.elapsed().as_secs_f64();

    if elapsed <= 0.0 || end <= begin {
        return None;
    }
    Some((end - begin) as f64 / elapsed / 1e6)
}

#[cfg(not(target_arch = "x86_64"))]
pub fn measure_tsc_mhz() -> Option<f64> {
    let _ = TSC_SAMPLE;
    None
}

fn read_id(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Probe backed by the running machine.
#[derive(Debug, Clone)]
pub struct SystemProcessorProbe {
    sysfs_root: PathBuf,
    cpu_count: usize,
}

impl Default for SystemProcessorProbe {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(SYSFS_CPU_ROOT),
            cpu_count: configured_cpus(),
        }
    }
}

impl SystemProcessorProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// (package id, core id) from sysfs, falling back to package 0 and the
    /// APIC id.
    pub fn topology_ids(&self, cpu: usize, apic_id: u32) -> (u32, u32) {
        let topology = self.sysfs_root.join(format!("cpu{}", cpu)).join("topology");
        let package_id = read_id(&topology.join("physical_package_id")).unwrap_or(0);
        let core_id = read_id(&topology.join("core_id")).unwrap_or(apic_id);
        (package_id, core_id)
    }
}

impl ProcessorProbe for SystemProcessorProbe {
    fn group_count(&self) -> u16 {
        self.cpu_count.div_ceil(GROUP_SIZE) as u16
    }

    fn probe(&self, group: u16, index: u8) -> Option<LogicalProcessor> {
        let cpu = group as usize * GROUP_SIZE + index as usize;
        if cpu >= self.cpu_count {
            return None;
        }

        let affinity = GroupAffinity::single(group, index);
        let identity = {
            let _guard = AffinityGuard::bind(affinity)?;
            read_identity()?
        };
        let (package_id, core_id) = self.topology_ids(cpu, identity.apic_id);

        Some(LogicalProcessor {
            group,
            index,
            package_id,
            core_id,
            apic_id: identity.apic_id,
            vendor: identity.vendor,
            family: identity.family,
            model: identity.model,
            stepping: identity.stepping,
            brand: identity.brand,
        })
    }

    fn timestamp_counter_mhz(&self) -> Option<f64> {
        let mhz = measure_tsc_mhz();
        if let Some(mhz) = mhz {
            log::debug!("Measured TSC at {:.1} MHz", mhz);
        }
        mhz
    }
}
