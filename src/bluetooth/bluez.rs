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

//! BlueZ backend.
//!
//! Covers the generic BLE manager in full and the discovery/connection half
//! of the Blufi module. Blufi negotiation and provisioning frames are not
//! spoken here, so those requests are rejected.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::{
    Adapter, AdapterEvent, AdapterProperty, Address, Device, DeviceEvent, DeviceProperty,
    DiscoveryFilter,
};
use futures::{pin_mut, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::blufi::{
    BlufiClient, BlufiPlatform, ConnectionRequest, CustomDataRequest, DeviceMessage,
    DiscoveryRequest, InitRequest, Peripheral, WifiCredentials,
};
use super::manager::{AdapterState, BleManager, ScanOptions, StartOptions};
use super::subscription::{Listeners, Subscription};

/// Background tasks owned by the radio.
#[derive(Default)]
struct Tasks {
    adapter_watch: Option<JoinHandle<()>>,
    scan: Option<JoinHandle<()>>,
    discovery: Option<JoinHandle<()>>,
    connection: Option<JoinHandle<()>>,
}

fn replace(slot: &mut Option<JoinHandle<()>>, task: Option<JoinHandle<()>>) {
    if let Some(old) = std::mem::replace(slot, task) {
        old.abort();
    }
}

/// BlueZ-backed radio.
pub struct BluezRadio {
    adapter: OnceCell<Adapter>,
    tasks: Mutex<Tasks>,
    adapter_listeners: Listeners<AdapterState>,
    discovery_listeners: Listeners<Peripheral>,
    connection_listeners: Listeners<bool>,
    message_listeners: Listeners<DeviceMessage>,
}

impl BluezRadio {
    pub fn new() -> Self {
        Self {
            adapter: OnceCell::new(),
            tasks: Mutex::new(Tasks::default()),
            adapter_listeners: Listeners::new("adapter-state"),
            discovery_listeners: Listeners::new("discovery"),
            connection_listeners: Listeners::new("connection"),
            message_listeners: Listeners::new("device-message"),
        }
    }

    /// Get the default adapter, opening a BlueZ session on first use.
    async fn adapter(&self) -> Result<&Adapter> {
        self.adapter
            .get_or_try_init(|| async {
                let session = bluer::Session::new().await?;
                info!("BlueZ session created");
                let adapter = session.default_adapter().await?;
                info!("Using Bluetooth adapter: {}", adapter.name());
                Ok::<_, anyhow::Error>(adapter)
            })
            .await
    }

    fn device(adapter: &Adapter, device_id: &str) -> Result<Device> {
        let address: Address = device_id
            .parse()
            .map_err(|_| anyhow!("Invalid device address: {}", device_id))?;
        Ok(adapter.device(address)?)
    }
}

impl Default for BluezRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BluezRadio {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock();
        replace(&mut tasks.adapter_watch, None);
        replace(&mut tasks.scan, None);
        replace(&mut tasks.discovery, None);
        replace(&mut tasks.connection, None);
    }
}

/// Read what BlueZ knows about a device into a peripheral record.
async fn describe(device: &Device) -> Result<Peripheral> {
    let name = device.name().await?;
    let rssi = device.rssi().await?;
    let manufacturer: Map<String, Value> = device
        .manufacturer_data()
        .await?
        .unwrap_or_default()
        .into_iter()
        .map(|(id, data)| (id.to_string(), Value::from(data)))
        .collect();
    let services: Vec<String> = device
        .uuids()
        .await?
        .unwrap_or_default()
        .iter()
        .map(|uuid| uuid.to_string())
        .collect();

    Ok(Peripheral {
        id: device.address().to_string(),
        name,
        rssi,
        advertising: json!({
            "manufacturerData": manufacturer,
            "serviceUUIDs": services,
        }),
    })
}

#[async_trait]
impl BleManager for BluezRadio {
    fn backend_name(&self) -> &'static str {
        "BlueZ"
    }

    async fn initialize(&self, options: StartOptions) -> Result<()> {
        let adapter = self.adapter().await?.clone();

        if options.show_alert && !adapter.is_powered().await? {
            warn!("Bluetooth adapter {} is powered off", adapter.name());
        }

        let listeners = self.adapter_listeners.clone();
        let task = tokio::spawn(async move {
            let events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Cannot watch adapter {}: {}", adapter.name(), e);
                    return;
                }
            };
            pin_mut!(events);
            while let Some(event) = events.next().await {
                if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) = event {
                    let state = if powered { AdapterState::On } else { AdapterState::Off };
                    debug!("Adapter power changed: {}", state);
                    listeners.emit(state);
                }
            }
        });
        replace(&mut self.tasks.lock().adapter_watch, Some(task));
        Ok(())
    }

    async fn query_adapter_state(&self) -> Result<AdapterState> {
        let adapter = self.adapter().await?;
        Ok(if adapter.is_powered().await? {
            AdapterState::On
        } else {
            AdapterState::Off
        })
    }

    fn subscribe_state(&self) -> Subscription<AdapterState> {
        self.adapter_listeners.subscribe()
    }

    async fn scan(&self, options: ScanOptions) -> Result<()> {
        let adapter = self.adapter().await?.clone();

        let mut filter = DiscoveryFilter::default();
        filter.uuids = options.service_uuids.iter().copied().collect();
        filter.duplicate_data = options.allow_duplicates;
        adapter.set_discovery_filter(filter).await?;

        let window = Duration::from_secs(options.seconds);
        let task = tokio::spawn(async move {
            let events = match adapter.discover_devices().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Direct scan failed to start: {}", e);
                    return;
                }
            };
            pin_mut!(events);
            let deadline = tokio::time::sleep(window);
            pin_mut!(deadline);
            loop {
                tokio::select! {
                    Some(event) = events.next() => {
                        if let AdapterEvent::DeviceAdded(address) = event {
                            debug!("Direct scan saw {}", address);
                        }
                    }
                    _ = &mut deadline => break,
                }
            }
            debug!("Direct scan window closed");
        });
        replace(&mut self.tasks.lock().scan, Some(task));
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        replace(&mut self.tasks.lock().scan, None);
        Ok(())
    }
}

#[async_trait]
impl BlufiClient for BluezRadio {
    fn backend_name(&self) -> &'static str {
        "BlueZ"
    }

    async fn initialize(&self, platform: BlufiPlatform, _options: Value) -> Result<()> {
        self.adapter().await?;
        info!("Blufi discovery and connection over BlueZ ({:?})", platform);
        Ok(())
    }

    fn listen_discovery(&self) -> Subscription<Peripheral> {
        self.discovery_listeners.subscribe()
    }

    fn listen_connection(&self) -> Subscription<bool> {
        self.connection_listeners.subscribe()
    }

    fn listen_device_messages(&self) -> Subscription<DeviceMessage> {
        self.message_listeners.subscribe()
    }

    async fn request_discovery(&self, request: DiscoveryRequest) -> Result<()> {
        if !request.is_start {
            replace(&mut self.tasks.lock().discovery, None);
            return Ok(());
        }

        let adapter = self.adapter().await?.clone();
        let listeners = self.discovery_listeners.clone();
        let task = tokio::spawn(async move {
            let events = match adapter.discover_devices().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Blufi discovery failed to start: {}", e);
                    return;
                }
            };
            pin_mut!(events);
            while let Some(event) = events.next().await {
                let AdapterEvent::DeviceAdded(address) = event else {
                    continue;
                };
                let described = match adapter.device(address) {
                    Ok(device) => describe(&device).await,
                    Err(e) => Err(e.into()),
                };
                match described {
                    Ok(peripheral) => listeners.emit(peripheral),
                    Err(e) => debug!("Skipping {}: {}", address, e),
                }
            }
        });
        replace(&mut self.tasks.lock().discovery, Some(task));
        Ok(())
    }

    async fn request_connection(&self, request: ConnectionRequest) -> Result<()> {
        let adapter = self.adapter().await?;
        let device = Self::device(adapter, &request.device_id)?;
        let listeners = self.connection_listeners.clone();

        if !request.connect {
            replace(&mut self.tasks.lock().connection, None);
            device.disconnect().await?;
            listeners.emit(false);
            return Ok(());
        }

        let task = tokio::spawn(async move {
            if let Err(e) = device.connect().await {
                warn!("Connection to {} failed: {}", device.address(), e);
                listeners.emit(false);
                return;
            }
            listeners.emit(true);

            let events = match device.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Cannot watch {}: {}", device.address(), e);
                    return;
                }
            };
            pin_mut!(events);
            while let Some(DeviceEvent::PropertyChanged(property)) = events.next().await {
                if let DeviceProperty::Connected(false) = property {
                    info!("Connection to {} lost", device.address());
                    listeners.emit(false);
                    break;
                }
            }
        });
        replace(&mut self.tasks.lock().connection, Some(task));
        Ok(())
    }

    async fn request_esp32_init(&self, _request: InitRequest) -> Result<()> {
        Err(anyhow!("Blufi negotiation is not available on the BlueZ backend"))
    }

    async fn request_wifi_credentials(&self, _request: WifiCredentials) -> Result<()> {
        Err(anyhow!("Blufi Wi-Fi provisioning is not available on the BlueZ backend"))
    }

    async fn request_send_custom_data(&self, _request: CustomDataRequest) -> Result<()> {
        Err(anyhow!("Blufi custom data is not available on the BlueZ backend"))
    }
}
