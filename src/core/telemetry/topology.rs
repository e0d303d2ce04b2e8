//! Logical-processor discovery and package → core → thread grouping.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::registers::{GroupAffinity, GROUP_SIZE};

/// Processor vendor as reported by CPUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vendor {
    Amd,
    Intel,
    Unknown(String),
}

impl Vendor {
    /// Map a CPUID vendor string.
    pub fn from_cpuid(vendor: &str) -> Self {
        match vendor {
            "AuthenticAMD" => Vendor::Amd,
            "GenuineIntel" => Vendor::Intel,
            other => Vendor::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vendor::Amd => write!(f, "AMD"),
            Vendor::Intel => write!(f, "Intel"),
            Vendor::Unknown(name) => write!(f, "{}", name),
        }
    }
}

/// One hardware thread, identified by (group, group-local index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalProcessor {
    pub group: u16,
    pub index: u8,
    pub package_id: u32,
    pub core_id: u32,
    pub apic_id: u32,
    pub vendor: Vendor,
    pub family: u32,
    pub model: u32,
    pub stepping: u32,
    pub brand: String,
}

impl LogicalProcessor {
    pub fn affinity(&self) -> GroupAffinity {
        GroupAffinity::single(self.group, self.index)
    }
}

/// Source of per-slot processor identity.
pub trait ProcessorProbe: Send + Sync {
    /// Number of processor groups on the platform.
    fn group_count(&self) -> u16;

    /// Identity of the processor at (group, index), queried under that
    /// affinity. `None` means no processor lives at this slot.
    fn probe(&self, group: u16, index: u8) -> Option<LogicalProcessor>;

    /// Measured time-stamp-counter frequency, if the platform can tell.
    fn timestamp_counter_mhz(&self) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Core {
    /// Raw core id shared by the threads.
    pub id: u32,
    pub threads: Vec<LogicalProcessor>,
}

impl Core {
    /// Affinity used for per-core register reads.
    pub fn affinity(&self) -> Option<GroupAffinity> {
        self.threads.first().map(LogicalProcessor::affinity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Raw package id shared by the cores.
    pub id: u32,
    pub cores: Vec<Core>,
}

impl Package {
    /// First thread of the package; identity source for dispatch.
    pub fn first_thread(&self) -> Option<&LogicalProcessor> {
        self.cores.first().and_then(|core| core.threads.first())
    }

    pub fn thread_count(&self) -> usize {
        self.cores.iter().map(|core| core.threads.len()).sum()
    }
}

/// Ordered processor tree. Positions, not raw ids, identify packages and
/// cores to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub packages: Vec<Package>,
}

impl Topology {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn thread_count(&self) -> usize {
        self.packages.iter().map(Package::thread_count).sum()
    }

    pub fn core_count(&self) -> usize {
        self.packages.iter().map(|p| p.cores.len()).sum()
    }

    /// Group already-discovered threads. Threads keep their relative
    /// discovery order inside each core.
    pub fn from_threads(threads: Vec<LogicalProcessor>) -> Self {
        let mut by_package: BTreeMap<u32, BTreeMap<u32, Vec<LogicalProcessor>>> = BTreeMap::new();

        for thread in threads {
            by_package
                .entry(thread.package_id)
                .or_default()
                .entry(thread.core_id)
                .or_default()
                .push(thread);
        }

        let packages = by_package
            .into_iter()
            .map(|(id, cores)| Package {
                id,
                cores: cores
                    .into_iter()
                    .map(|(id, threads)| Core { id, threads })
                    .collect(),
            })
            .collect();

        Topology { packages }
    }
}

/// Walks every processor slot and builds the [`Topology`].
pub struct TopologyResolver<'a> {
    probe: &'a dyn ProcessorProbe,
}

impl<'a> TopologyResolver<'a> {
    pub fn new(probe: &'a dyn ProcessorProbe) -> Self {
        Self { probe }
    }

    pub fn resolve(&self) -> Topology {
        let mut threads = Vec::new();

        for group in 0..self.probe.group_count() {
            for index in 0..GROUP_SIZE as u8 {
                // Empty or invalid slots are expected on sparse systems.
                if let Some(thread) = self.probe.probe(group, index) {
                    threads.push(thread);
                }
            }
        }

        let topology = Topology::from_threads(threads);
        log::debug!(
            "Resolved {} package(s), {} core(s), {} thread(s)",
            topology.packages.len(),
            topology.core_count(),
            topology.thread_count()
        );
        topology
    }
}
