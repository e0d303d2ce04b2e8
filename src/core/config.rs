use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which GPU path serves `gpu` polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuBackend {
    /// Legacy control library with tier fallback
    #[default]
    Layered,
    /// Modern per-device metrics session
    Session,
}

impl FromStr for GpuBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "layered" => Ok(GpuBackend::Layered),
            "session" => Ok(GpuBackend::Session),
            other => Err(format!("unknown GPU backend '{}' (expected layered or session)", other)),
        }
    }
}

impl fmt::Display for GpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuBackend::Layered => write!(f, "layered"),
            GpuBackend::Session => write!(f, "session"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gpu_backend: GpuBackend,
    /// Adapter-name substring for the session path
    pub adapter_name: Option<String>,
    /// Ceiling reported next to live session-path power
    pub max_power_watts: f32,
    pub bus_lock_timeout_ms: u64,
    pub history_size: usize,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gpu_backend: GpuBackend::Layered,
            adapter_name: None,
            max_power_watts: 300.0,
            bus_lock_timeout_ms: 10,
            history_size: 60,
            poll_interval_ms: 1000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Missing or empty file gives defaults; so does a corrupt one, with a
    /// warning.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let data = fs::read(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        if data.is_empty() {
            return Ok(Config::default());
        }

        Ok(serde_json::from_slice(&data).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable config {:?}: {}", config_path, e);
            Config::default()
        }))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data = serde_json::to_vec_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(config_path, data)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("hardmon").join("config.json"))
    }

    pub fn set_adapter_name(&mut self, name: Option<String>) {
        self.adapter_name = name.filter(|n| !n.trim().is_empty());
    }

    pub fn set_gpu_backend(&mut self, backend: GpuBackend) {
        self.gpu_backend = backend;
    }
}
