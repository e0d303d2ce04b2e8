// Platform-specific code module

pub mod affinity;
pub mod cpuid;
pub mod elevation;
pub mod gpu;
pub mod msr;

use std::sync::Arc;

use crate::core::config::Config;
use crate::core::telemetry::{ContextSettings, TelemetryContext};

// Re-exports para imports limpios
pub use affinity::AffinityGuard;
pub use cpuid::SystemProcessorProbe;
pub use elevation::{ensure_elevated, is_elevated};
pub use gpu::AmdgpuDriver;
pub use msr::LinuxRegisterDriver;

/// Telemetry context wired to this machine's drivers.
pub fn system_context(config: &Config) -> TelemetryContext {
    TelemetryContext::new(
        Arc::new(LinuxRegisterDriver::new()),
        Arc::new(SystemProcessorProbe::new()),
        ContextSettings::from(config),
    )
    .with_control_library(Arc::new(AmdgpuDriver::new()))
    .with_metrics_session(gpu::metrics_session_driver())
}
