//! GPU backends.
//!
//! amdgpu sysfs serves both the layered and the session path. ROCm SMI is
//! an alternative session backend behind the `rocm` feature.

mod amdgpu;
mod rocm;

pub use amdgpu::{parse_slot_name, AmdgpuDriver, AmdgpuLibrary};
pub use rocm::{RocmDriver, RocmSession};

use std::sync::Arc;

use crate::core::telemetry::gpu::MetricsSessionDriver;

/// Preferred metrics-session backend: ROCm when compiled in, amdgpu sysfs
/// otherwise.
pub fn metrics_session_driver() -> Arc<dyn MetricsSessionDriver> {
    if cfg!(all(unix, feature = "rocm")) {
        Arc::new(RocmDriver)
    } else {
        Arc::new(AmdgpuDriver::new())
    }
}
