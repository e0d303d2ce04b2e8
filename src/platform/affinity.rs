//! Scoped thread-affinity binding.

use crate::core::telemetry::registers::{GroupAffinity, GROUP_SIZE};

/// Pins the calling thread to an affinity until dropped, then restores the
/// previous mask on every exit path.
#[cfg(target_os = "linux")]
pub struct AffinityGuard {
    previous: libc::cpu_set_t,
}

#[cfg(target_os = "linux")]
impl AffinityGuard {
    /// `None` when the affinity names no processor or the kernel refuses it.
    pub fn bind(affinity: GroupAffinity) -> Option<Self> {
        let base = affinity.group as usize * GROUP_SIZE;
        let cpus: Vec<usize> = (0..GROUP_SIZE)
            .filter(|bit| affinity.mask & (1u64 << bit) != 0)
            .map(|bit| base + bit)
            .collect();

        if cpus.is_empty() || cpus.iter().any(|cpu| *cpu >= libc::CPU_SETSIZE as usize) {
            return None;
        }

        let size = std::mem::size_of::<libc::cpu_set_t>();
        // SAFETY: cpu_set_t is plain data; both sets live on this stack frame
        // and the sizes passed match their type.
        unsafe {
            let mut previous: libc::cpu_set_t = std::mem::zeroed();
            if libc::sched_getaffinity(0, size, &mut previous) != 0 {
                return None;
            }

            let mut target: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut target);
            for cpu in cpus {
                libc::CPU_SET(cpu, &mut target);
            }
            if libc::sched_setaffinity(0, size, &target) != 0 {
                log::debug!("sched_setaffinity({}) rejected", affinity);
                return None;
            }

            Some(Self { previous })
        }
    }
}

#[cfg(target_os = "linux")]
impl Drop for AffinityGuard {
    fn drop(&mut self) {
        let size = std::mem::size_of::<libc::cpu_set_t>();
        // SAFETY: restores the mask captured in `bind`.
        let status = unsafe { libc::sched_setaffinity(0, size, &self.previous) };
        if status != 0 {
            log::warn!("Failed to restore thread affinity");
        }
    }
}

/// Processor the calling thread runs on right now.
#[cfg(target_os = "linux")]
pub fn current_cpu() -> Option<usize> {
    // SAFETY: no arguments, no memory access.
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}

/// Processors configured on the machine, online or not.
#[cfg(target_os = "linux")]
pub fn configured_cpus() -> usize {
    // SAFETY: sysconf only reads system configuration.
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    usize::try_from(count).unwrap_or(1).max(1)
}

#[cfg(not(target_os = "linux"))]
pub struct AffinityGuard;

#[cfg(not(target_os = "linux"))]
impl AffinityGuard {
    pub fn bind(_affinity: GroupAffinity) -> Option<Self> {
        None
    }
}

#[cfg(not(target_os = "linux"))]
pub fn current_cpu() -> Option<usize> {
    None
}

#[cfg(not(target_os = "linux"))]
pub fn configured_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
