use std::io;
use thiserror::Error;

/// Custom error type for the hardmon telemetry engine
#[derive(Error, Debug)]
pub enum HardmonError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Register access driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("No logical processors were discovered")]
    NoProcessors,

    #[error("Unsupported processor vendor: {vendor}")]
    UnsupportedVendor { vendor: String },

    #[error("GPU not available: {0}")]
    GpuNotAvailable(String),

    #[error("No GPU adapter matches '{name}'")]
    AdapterNotFound { name: String },

    #[error("Elevation required: {0}")]
    ElevationRequired(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for hardmon
pub type Result<T> = std::result::Result<T, HardmonError>;

impl HardmonError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        HardmonError::Config(msg.into())
    }

    /// Create a driver unavailable error
    pub fn driver_unavailable<S: Into<String>>(msg: S) -> Self {
        HardmonError::DriverUnavailable(msg.into())
    }

    pub fn unsupported_vendor<S: Into<String>>(vendor: S) -> Self {
        HardmonError::UnsupportedVendor {
            vendor: vendor.into(),
        }
    }

    pub fn gpu_not_available<S: Into<String>>(msg: S) -> Self {
        HardmonError::GpuNotAvailable(msg.into())
    }

    pub fn adapter_not_found<S: Into<String>>(name: S) -> Self {
        HardmonError::AdapterNotFound { name: name.into() }
    }

    /// Create an elevation required error
    pub fn elevation_required<S: Into<String>>(msg: S) -> Self {
        HardmonError::ElevationRequired(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        HardmonError::Other(msg.into())
    }

    /// Whether this error is a configuration-time condition that a reset
    /// cannot fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HardmonError::UnsupportedVendor { .. } | HardmonError::Config(_)
        )
    }
}
