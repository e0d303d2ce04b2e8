//! Register-access driver over the Linux `msr` device and PCI sysfs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::telemetry::registers::{RegisterAccess, RegisterDriver};
use crate::error::{HardmonError, Result};

const DEV_CPU_ROOT: &str = "/dev/cpu";
const PCI_DEVICES_ROOT: &str = "/sys/bus/pci/devices";

/// Opens sessions against `/dev/cpu/<n>/msr` and PCI config files.
#[derive(Debug, Clone)]
pub struct LinuxRegisterDriver {
    dev_root: PathBuf,
    pci_root: PathBuf,
}

impl Default for LinuxRegisterDriver {
    fn default() -> Self {
        Self::with_roots(DEV_CPU_ROOT, PCI_DEVICES_ROOT)
    }
}

impl LinuxRegisterDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver rooted somewhere other than the live device trees.
    pub fn with_roots(dev_root: impl AsRef<Path>, pci_root: impl AsRef<Path>) -> Self {
        Self {
            dev_root: dev_root.as_ref().to_path_buf(),
            pci_root: pci_root.as_ref().to_path_buf(),
        }
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::collections::HashMap;
    use std::fs::{File, OpenOptions};
    use std::os::unix::fs::FileExt;
    use std::path::PathBuf;

    use parking_lot::Mutex;

    use crate::core::telemetry::registers::{GroupAffinity, PciAddress, RegisterAccess};
    use crate::platform::affinity::{current_cpu, AffinityGuard};

    /// One open privileged session. Cached device handles close on drop.
    pub struct LinuxRegisterSession {
        pub(super) dev_root: PathBuf,
        pub(super) pci_root: PathBuf,
        pub(super) msr_files: Mutex<HashMap<usize, File>>,
        pub(super) bus: Mutex<()>,
    }

    impl LinuxRegisterSession {
        fn msr_path(&self, cpu: usize) -> PathBuf {
            self.dev_root.join(cpu.to_string()).join("msr")
        }

        fn pci_config_path(&self, address: PciAddress) -> PathBuf {
            self.pci_root.join(format!("0000:{}", address)).join("config")
        }

        fn with_msr_file<T>(&self, cpu: usize, op: impl FnOnce(&File) -> Option<T>) -> Option<T> {
            let mut files = self.msr_files.lock();
            if !files.contains_key(&cpu) {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(self.msr_path(cpu))
                    .or_else(|_| File::open(self.msr_path(cpu)))
                    .ok()?;
                files.insert(cpu, file);
            }
            files.get(&cpu).and_then(op)
        }

        pub(super) fn read_msr_cpu(&self, cpu: usize, index: u32) -> Option<u64> {
            self.with_msr_file(cpu, |file| {
                let mut buf = [0u8; 8];
                file.read_exact_at(&mut buf, index as u64).ok()?;
                Some(u64::from_le_bytes(buf))
            })
        }
    }

    impl RegisterAccess for LinuxRegisterSession {
        fn read_msr(&self, index: u32) -> Option<u64> {
            let cpu = current_cpu()?;
            self.read_msr_cpu(cpu, index)
        }

        fn read_msr_on(&self, index: u32, affinity: GroupAffinity) -> Option<u64> {
            let _guard = AffinityGuard::bind(affinity)?;
            self.read_msr(index)
        }

        fn write_msr(&self, index: u32, value: u64) -> bool {
            let Some(cpu) = current_cpu() else {
                return false;
            };
            self.with_msr_file(cpu, |file| {
                file.write_all_at(&value.to_le_bytes(), index as u64).ok()
            })
            .is_some()
        }

        fn read_pci_config(&self, address: PciAddress, register: u32) -> Option<u32> {
            let file = File::open(self.pci_config_path(address)).ok()?;
            let mut buf = [0u8; 4];
            file.read_exact_at(&mut buf, register as u64).ok()?;
            Some(u32::from_le_bytes(buf))
        }

        fn write_pci_config(&self, address: PciAddress, register: u32, value: u32) -> bool {
            OpenOptions::new()
                .write(true)
                .open(self.pci_config_path(address))
                .and_then(|file| file.write_all_at(&value.to_le_bytes(), register as u64))
                .is_ok()
        }

        fn bus_mutex(&self) -> &Mutex<()> {
            &self.bus
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::LinuxRegisterSession;

#[cfg(target_os = "linux")]
impl RegisterDriver for LinuxRegisterDriver {
    fn open(&self) -> Result<Arc<dyn RegisterAccess>> {
        use std::collections::HashMap;

        let probe = self.dev_root.join("0").join("msr");
        if let Err(e) = std::fs::File::open(&probe) {
            if !crate::platform::elevation::is_elevated() {
                return Err(HardmonError::elevation_required(format!(
                    "{} is not readable ({}); run as root with the msr module loaded",
                    probe.display(),
                    e
                )));
            }
            return Err(HardmonError::driver_unavailable(format!(
                "{}: {} (is the msr module loaded?)",
                probe.display(),
                e
            )));
        }

        log::debug!("Opened register session on {}", self.dev_root.display());
        Ok(Arc::new(LinuxRegisterSession {
            dev_root: self.dev_root.clone(),
            pci_root: self.pci_root.clone(),
            msr_files: parking_lot::Mutex::new(HashMap::new()),
            bus: parking_lot::Mutex::new(()),
        }))
    }
}

#[cfg(not(target_os = "linux"))]
impl RegisterDriver for LinuxRegisterDriver {
    fn open(&self) -> Result<Arc<dyn RegisterAccess>> {
        let _ = (&self.dev_root, &self.pci_root);
        Err(HardmonError::driver_unavailable(
            "register access is only implemented on Linux",
        ))
    }
}
