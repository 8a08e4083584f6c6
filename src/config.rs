// src/config.rs
//! Configuration management with file storage

use crate::{
    error::{RelayError, Result},
    pipeline::DEFAULT_MAX_READ_ERRORS,
    publish::DEFAULT_BIND,
};
use serde::{Deserialize, Serialize};
use std::{
    net::ToSocketAddrs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Candidate devices, tried in order
    pub serial_devices: Vec<String>,
    pub serial_baudrate: u32,
    pub read_timeout_ms: u64,
    pub publish_bind: String,
    /// Consecutive read errors before giving up, 0 for never
    pub max_read_errors: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            serial_devices: (0..4).map(|n| format!("/dev/ttyACM{}", n)).collect(),
            serial_baudrate: 115200,
            read_timeout_ms: 1000,
            publish_bind: DEFAULT_BIND.to_string(),
            max_read_errors: DEFAULT_MAX_READ_ERRORS,
        }
    }
}

impl RelayConfig {
    /// Load from a config file, falling back to defaults when it does not exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| RelayError::Config(format!("Failed to parse config file {}: {}", path.display(), e)))?;

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RelayError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)?;

        std::fs::write(path, contents)
            .map_err(|e| RelayError::Config(format!("Failed to write config file {}: {}", path.display(), e)))?;

        Ok(())
    }

    /// `$HOME/.config/gps-relay/config.json`
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| RelayError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home).join(".config").join("gps-relay").join("config.json"))
    }

    /// Check every setting can actually be used
    pub fn validate(&self) -> Result<()> {
        self.validate_serial()?;
        self.validate_publish()
    }

    /// Settings used when reading from a serial device
    pub fn validate_serial(&self) -> Result<()> {
        if self.serial_devices.is_empty() {
            return Err(RelayError::Config("serial_devices is empty".to_string()));
        }
        if self.serial_baudrate == 0 {
            return Err(RelayError::Config("serial_baudrate must be positive".to_string()));
        }
        Ok(())
    }

    /// Settings used by the TCP publisher; host names are resolved
    pub fn validate_publish(&self) -> Result<()> {
        let mut addrs = self
            .publish_bind
            .to_socket_addrs()
            .map_err(|e| RelayError::Config(format!("Invalid publish_bind {:?}: {}", self.publish_bind, e)))?;

        if addrs.next().is_none() {
            return Err(RelayError::Config(format!(
                "publish_bind {:?} resolves to no address",
                self.publish_bind
            )));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, devices: Vec<String>, baudrate: u32) {
        if !devices.is_empty() {
            self.serial_devices = devices;
        }
        self.serial_baudrate = baudrate;
    }

    /// Update publisher settings
    pub fn update_publish(&mut self, bind: String) {
        self.publish_bind = bind;
    }
}
