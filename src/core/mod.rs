// Core telemetry logic and configuration

pub mod config;
pub mod telemetry;

// Re-export commonly used items
pub use config::{Config, GpuBackend};
pub use telemetry::TelemetryContext;
