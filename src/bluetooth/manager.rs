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

//! Generic BLE manager contract.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::subscription::Subscription;

/// Host Bluetooth adapter state, as reported by the BLE manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    On,
    Off,
    TurningOn,
    TurningOff,
}

impl AdapterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Resetting => "resetting",
            Self::Unsupported => "unsupported",
            Self::Unauthorized => "unauthorized",
            Self::On => "on",
            Self::Off => "off",
            Self::TurningOn => "turning_on",
            Self::TurningOff => "turning_off",
        }
    }

    /// Only a powered-on adapter may scan.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for bringing the BLE subsystem up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    /// Ask the platform to prompt the user when Bluetooth is off.
    pub show_alert: bool,
}

/// Options for a direct scan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOptions {
    /// Only report peripherals advertising one of these services. Empty means all.
    #[serde(rename = "serviceUUIDs")]
    pub service_uuids: Vec<Uuid>,
    /// Scan window in seconds.
    pub seconds: u64,
    /// Report repeated advertisements from the same peripheral.
    pub allow_duplicates: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            service_uuids: Vec::new(),
            seconds: 5,
            allow_duplicates: true,
        }
    }
}

/// Generic BLE manager module.
#[async_trait]
pub trait BleManager: Send + Sync {
    /// Get the backend name (e.g., "Simulated", "BlueZ").
    fn backend_name(&self) -> &'static str;

    /// Initialize the BLE subsystem.
    async fn initialize(&self, options: StartOptions) -> Result<()>;

    /// Query the current adapter state.
    async fn query_adapter_state(&self) -> Result<AdapterState>;

    /// Subscribe to adapter state changes.
    fn subscribe_state(&self) -> Subscription<AdapterState>;

    /// Start a direct scan. Resolves once the scan request is accepted.
    async fn scan(&self, options: ScanOptions) -> Result<()>;

    /// Stop any running direct scan.
    async fn stop_scan(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_on_is_ready() {
        assert!(AdapterState::On.is_ready());
        for state in [
            AdapterState::Unknown,
            AdapterState::Resetting,
            AdapterState::Unsupported,
            AdapterState::Unauthorized,
            AdapterState::Off,
            AdapterState::TurningOn,
            AdapterState::TurningOff,
        ] {
            assert!(!state.is_ready(), "{} should not be ready", state);
        }
    }

    #[test]
    fn test_adapter_state_wire_names() {
        let state: AdapterState = serde_json::from_str("\"turning_on\"").unwrap();
        assert_eq!(state, AdapterState::TurningOn);
        assert_eq!(serde_json::to_string(&AdapterState::On).unwrap(), "\"on\"");
    }

    #[test]
    fn test_scan_options_shape() {
        let json = serde_json::to_value(ScanOptions::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"serviceUUIDs": [], "seconds": 5, "allowDuplicates": true})
        );
    }
}
