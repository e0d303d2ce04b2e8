// Hardmon Library - Public API

// Re-export error types
pub mod error;
pub use error::{HardmonError, Result};

// Module declarations
pub mod commands;
pub mod core;
pub mod ui;
pub mod platform;

// Re-export commonly used types
pub use core::config::Config;
pub use core::telemetry::TelemetryContext;

// Initialize logging; RUST_LOG overrides the default level
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
