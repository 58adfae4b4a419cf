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

//! Bluetooth module contracts and backends.
//!
//! The screen talks to two modules: a generic BLE manager and a Blufi
//! protocol client. Both are traits so the backend can be swapped.

#[cfg(feature = "bluez")]
mod bluez;
mod blufi;
mod manager;
mod simulated;
mod subscription;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{BackendKind, Config};

#[cfg(feature = "bluez")]
pub use bluez::BluezRadio;
pub use blufi::{
    BlufiClient, BlufiPlatform, ConnectionRequest, CustomDataRequest, DeviceMessage,
    DeviceMessageKind, DiscoveryRequest, InitRequest, Peripheral, WifiCredentials,
};
pub use manager::{AdapterState, BleManager, ScanOptions, StartOptions};
pub use simulated::{CallKind, RadioCall, SimulatedRadio};
pub use subscription::{Listeners, Subscription};

/// The two module handles the screen is built on.
#[derive(Clone)]
pub struct Backend {
    pub ble: Arc<dyn BleManager>,
    pub blufi: Arc<dyn BlufiClient>,
}

/// Create the backend selected in the configuration.
pub fn create_backend(config: &Config) -> Result<Backend> {
    match config.bluetooth.backend {
        BackendKind::Simulated => {
            let devices = config.simulation.devices.iter().map(Peripheral::from).collect();
            let radio = Arc::new(SimulatedRadio::new(config.simulation.adapter_state, devices));
            info!(
                "Using simulated radio with {} device(s)",
                config.simulation.devices.len()
            );
            Ok(Backend {
                ble: radio.clone(),
                blufi: radio,
            })
        }
        BackendKind::Bluez => {
            #[cfg(feature = "bluez")]
            {
                info!("Using BlueZ radio");
                let radio = Arc::new(BluezRadio::new());
                Ok(Backend {
                    ble: radio.clone(),
                    blufi: radio,
                })
            }
            #[cfg(not(feature = "bluez"))]
            {
                Err(anyhow::anyhow!("BlueZ support not compiled in"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_backend_from_config() {
        let backend = create_backend(&Config::default()).unwrap();

        assert_eq!(backend.ble.backend_name(), "Simulated");
        assert_eq!(
            backend.ble.query_adapter_state().await.unwrap(),
            AdapterState::On
        );
    }

    #[cfg(not(feature = "bluez"))]
    #[test]
    fn test_bluez_backend_needs_feature() {
        let mut config = Config::default();
        config.bluetooth.backend = BackendKind::Bluez;
        assert!(create_backend(&config).is_err());
    }
}
