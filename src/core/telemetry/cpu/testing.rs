//! Register session stand-in for strategy unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::EngineSettings;
use crate::core::telemetry::registers::{GroupAffinity, PciAddress, RegisterAccess};
use crate::core::telemetry::topology::{LogicalProcessor, Package, Topology, Vendor};

const SMN_INDEX: u32 = 0x60;
const SMN_DATA: u32 = 0x64;

/// Answers from fixed tables and counts every bus transaction.
#[derive(Default)]
pub struct ScriptedAccess {
    pub msrs: Mutex<HashMap<u32, u64>>,
    pub smn: Mutex<HashMap<u32, u32>>,
    /// Keyed by the value last written to the same register (0 if none).
    pub pci: Mutex<HashMap<(PciAddress, u32, u32), u32>>,
    pub bus: Mutex<()>,
    smn_index: Mutex<u32>,
    selects: Mutex<HashMap<(PciAddress, u32), u32>>,
    bus_transactions: AtomicUsize,
}

impl ScriptedAccess {
    pub fn set_smn(&self, address: u32, value: u32) {
        self.smn.lock().insert(address, value);
    }

    pub fn set_pci(&self, address: PciAddress, register: u32, select: u32, value: u32) {
        self.pci.lock().insert((address, register, select), value);
    }

    pub fn bus_transactions(&self) -> usize {
        self.bus_transactions.load(Ordering::SeqCst)
    }
}

impl RegisterAccess for ScriptedAccess {
    fn read_msr(&self, index: u32) -> Option<u64> {
        self.msrs.lock().get(&index).copied()
    }

    fn read_msr_on(&self, index: u32, _affinity: GroupAffinity) -> Option<u64> {
        self.read_msr(index)
    }

    fn write_msr(&self, index: u32, value: u64) -> bool {
        self.msrs.lock().insert(index, value);
        true
    }

    fn read_pci_config(&self, address: PciAddress, register: u32) -> Option<u32> {
        self.bus_transactions.fetch_add(1, Ordering::SeqCst);
        if address == PciAddress::ROOT && register == SMN_DATA {
            let index = *self.smn_index.lock();
            return self.smn.lock().get(&index).copied();
        }
        let select = self
            .selects
            .lock()
            .get(&(address, register))
            .copied()
            .unwrap_or(0);
        self.pci.lock().get(&(address, register, select)).copied()
    }

    fn write_pci_config(&self, address: PciAddress, register: u32, value: u32) -> bool {
        self.bus_transactions.fetch_add(1, Ordering::SeqCst);
        if address == PciAddress::ROOT && register == SMN_INDEX {
            *self.smn_index.lock() = value;
        } else {
            self.selects.lock().insert((address, register), value);
        }
        true
    }

    fn bus_mutex(&self) -> &Mutex<()> {
        &self.bus
    }
}

/// Single AMD package with one thread per core.
pub fn amd_package(family: u32, model: u32, brand: &str, cores: u8) -> Package {
    let threads = (0..cores)
        .map(|i| LogicalProcessor {
            group: 0,
            index: i,
            package_id: 0,
            core_id: i as u32,
            apic_id: i as u32,
            vendor: Vendor::Amd,
            family,
            model,
            stepping: 0,
            brand: brand.to_string(),
        })
        .collect();
    Topology::from_threads(threads).packages.remove(0)
}

/// Short bus timeout so a held lock fails fast.
pub fn settings() -> EngineSettings {
    EngineSettings {
        bus_lock_timeout: Duration::from_millis(5),
        tsc_mhz: Some(3400.0),
    }
}
