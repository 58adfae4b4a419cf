// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::bluetooth::{AdapterState, BlufiPlatform, Peripheral};
use crate::permissions::{Permission, RuntimePlatform};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Platform and permission settings.
    pub platform: PlatformConfig,

    /// Form defaults.
    pub form: FormConfig,

    /// Devices and adapter used by the simulated backend.
    pub simulation: SimulationConfig,
}

/// Which module implementation to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Simulated,
    Bluez,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Backend: "simulated" or "bluez".
    pub backend: BackendKind,

    /// Ask the platform to prompt when Bluetooth is off.
    pub show_alert: bool,

    /// Length of a scan window in seconds.
    pub scan_seconds: u64,

    /// Service filter for direct scans. Empty means all devices.
    pub service_uuids: Vec<Uuid>,

    /// Report repeated advertisements.
    pub allow_duplicates: bool,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Simulated,
            show_alert: false,
            scan_seconds: 5,
            service_uuids: Vec::new(),
            allow_duplicates: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Desktop,
    Android,
    Ios,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Platform: "desktop", "android" or "ios".
    pub kind: PlatformKind,

    /// Android API level. Ignored elsewhere.
    pub api_level: u32,

    /// Permissions the user refuses.
    pub denied_permissions: Vec<Permission>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            kind: PlatformKind::Desktop,
            api_level: 33,
            denied_permissions: Vec::new(),
        }
    }
}

impl PlatformConfig {
    pub fn runtime(&self) -> RuntimePlatform {
        match self.kind {
            PlatformKind::Desktop => RuntimePlatform::Desktop,
            PlatformKind::Android => RuntimePlatform::Android {
                api_level: self.api_level,
            },
            PlatformKind::Ios => RuntimePlatform::Ios,
        }
    }

    pub fn blufi(&self) -> BlufiPlatform {
        match self.kind {
            PlatformKind::Desktop => BlufiPlatform::Linux,
            PlatformKind::Android => BlufiPlatform::Android,
            PlatformKind::Ios => BlufiPlatform::Ios,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Initial content of the custom payload field.
    pub custom_data_seed: String,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            custom_data_seed: "12:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedDevice {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
}

impl From<&SimulatedDevice> for Peripheral {
    fn from(device: &SimulatedDevice) -> Self {
        let mut peripheral = Peripheral::new(device.id.clone(), device.name.as_deref());
        peripheral.rssi = device.rssi;
        peripheral
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub adapter_state: AdapterState,
    pub devices: Vec<SimulatedDevice>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            adapter_state: AdapterState::On,
            devices: vec![
                SimulatedDevice {
                    id: "24:0A:C4:12:34:56".to_string(),
                    name: Some("BLUFI_DEVICE".to_string()),
                    rssi: Some(-48),
                },
                SimulatedDevice {
                    id: "24:0A:C4:AB:CD:EF".to_string(),
                    name: None,
                    rssi: Some(-71),
                },
            ],
        }
    }
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blufi-console")
            .join("config.toml")
    }

    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.bluetooth.scan_seconds, 5);
        assert_eq!(config.form.custom_data_seed, "12:");
        assert_eq!(config.bluetooth.backend, BackendKind::Simulated);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[bluetooth]\nscan_seconds = 10\n\n[platform]\nkind = \"android\"\napi_level = 31\ndenied_permissions = [\"access_fine_location\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.bluetooth.scan_seconds, 10);
        assert!(config.bluetooth.allow_duplicates);
        assert_eq!(
            config.platform.runtime(),
            RuntimePlatform::Android { api_level: 31 }
        );
        assert_eq!(
            config.platform.denied_permissions,
            vec![Permission::AccessFineLocation]
        );
        assert_eq!(config.platform.blufi(), BlufiPlatform::Android);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.simulation.adapter_state = AdapterState::Off;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.simulation.adapter_state, AdapterState::Off);
        assert_eq!(loaded.simulation.devices.len(), 2);
    }
}
