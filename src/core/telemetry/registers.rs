//! Privileged register access surface.
//!
//! The driver itself is an external collaborator; this module only defines
//! what the sensor engines need from it and a few helpers layered on top.
//! Implementations live in the platform layer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Logical processors per processor group.
pub const GROUP_SIZE: usize = 64;

/// SMN index/data ports on the root complex.
const SMN_INDEX_REGISTER: u32 = 0x60;
const SMN_DATA_REGISTER: u32 = 0x64;

/// Set of logical processors inside one processor group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupAffinity {
    pub group: u16,
    pub mask: u64,
}

impl GroupAffinity {
    /// Affinity containing exactly one logical processor.
    pub fn single(group: u16, index: u8) -> Self {
        Self {
            group,
            mask: 1u64 << (index as u32 % GROUP_SIZE as u32),
        }
    }

    /// Flat processor number of the lowest processor in the mask.
    pub fn first_cpu(&self) -> Option<usize> {
        if self.mask == 0 {
            return None;
        }
        Some(self.group as usize * GROUP_SIZE + self.mask.trailing_zeros() as usize)
    }
}

impl fmt::Display for GroupAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.group, self.mask)
    }
}

/// PCI bus/device/function triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciAddress {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    /// Host bridge, home of the SMN index/data ports.
    pub const ROOT: PciAddress = PciAddress::new(0, 0, 0);

    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device: device & 0x1F,
            function: function & 0x07,
        }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// An open privileged session.
///
/// Every read/write is fallible and reports failure as `None`/`false`;
/// the engines convert that into absent sensor values.
pub trait RegisterAccess: Send + Sync {
    /// Read an MSR on whichever processor the calling thread runs on.
    fn read_msr(&self, index: u32) -> Option<u64>;

    /// Read an MSR on a specific processor. Implementations must restore
    /// the calling thread's previous binding before returning.
    fn read_msr_on(&self, index: u32, affinity: GroupAffinity) -> Option<u64>;

    fn write_msr(&self, index: u32, value: u64) -> bool;

    fn read_pci_config(&self, address: PciAddress, register: u32) -> Option<u32>;

    fn write_pci_config(&self, address: PciAddress, register: u32, value: u32) -> bool;

    /// Mutex guarding the shared PCI bus path.
    fn bus_mutex(&self) -> &Mutex<()>;
}

/// Opens privileged sessions. Dropping the last handle to a session
/// releases it.
pub trait RegisterDriver: Send + Sync {
    fn open(&self) -> Result<Arc<dyn RegisterAccess>>;
}

/// Acquire the bus mutex within `timeout`, or `None` when contended.
pub fn lock_bus(access: &dyn RegisterAccess, timeout: Duration) -> Option<MutexGuard<'_, ()>> {
    let guard = access.bus_mutex().try_lock_for(timeout);
    if guard.is_none() {
        log::debug!("PCI bus lock not acquired within {:?}", timeout);
    }
    guard
}

/// Read an SMN register through the root-complex index/data ports.
///
/// The caller must hold the bus lock.
pub fn read_smn(access: &dyn RegisterAccess, address: u32) -> Option<u32> {
    if !access.write_pci_config(PciAddress::ROOT, SMN_INDEX_REGISTER, address) {
        return None;
    }
    access.read_pci_config(PciAddress::ROOT, SMN_DATA_REGISTER)
}

/// Low dword of an MSR value.
pub fn low_dword(value: u64) -> u32 {
    (value & 0xFFFF_FFFF) as u32
}
