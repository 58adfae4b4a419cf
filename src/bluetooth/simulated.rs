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

//! In-process radio with scripted ESP32 devices.
//!
//! Implements both module contracts so the screen can run without a
//! Bluetooth stack. Every call is recorded; tests read them back with
//! [`SimulatedRadio::calls`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

use super::blufi::{
    BlufiClient, BlufiPlatform, ConnectionRequest, CustomDataRequest, DeviceMessage,
    DeviceMessageKind, DiscoveryRequest, InitRequest, Peripheral, WifiCredentials,
};
use super::manager::{AdapterState, BleManager, ScanOptions, StartOptions};
use super::subscription::{Listeners, Subscription};

/// A call received by one of the two modules.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioCall {
    BleInitialize(StartOptions),
    QueryAdapterState,
    Scan(ScanOptions),
    StopScan,
    BlufiInitialize(BlufiPlatform),
    Discovery(DiscoveryRequest),
    Connection(ConnectionRequest),
    Esp32Init(InitRequest),
    WifiCredentials(WifiCredentials),
    CustomData(CustomDataRequest),
}

/// The kind of a [`RadioCall`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    BleInitialize,
    QueryAdapterState,
    Scan,
    StopScan,
    BlufiInitialize,
    Discovery,
    Connection,
    Esp32Init,
    WifiCredentials,
    CustomData,
}

impl RadioCall {
    pub fn kind(&self) -> CallKind {
        match self {
            Self::BleInitialize(_) => CallKind::BleInitialize,
            Self::QueryAdapterState => CallKind::QueryAdapterState,
            Self::Scan(_) => CallKind::Scan,
            Self::StopScan => CallKind::StopScan,
            Self::BlufiInitialize(_) => CallKind::BlufiInitialize,
            Self::Discovery(_) => CallKind::Discovery,
            Self::Connection(_) => CallKind::Connection,
            Self::Esp32Init(_) => CallKind::Esp32Init,
            Self::WifiCredentials(_) => CallKind::WifiCredentials,
            Self::CustomData(_) => CallKind::CustomData,
        }
    }
}

struct RadioState {
    adapter_state: AdapterState,
    devices: Vec<Peripheral>,
    auto_respond: bool,
    connected: Option<String>,
    failures: HashMap<CallKind, String>,
    calls: Vec<RadioCall>,
}

/// Simulated BLE manager and Blufi module sharing one radio.
pub struct SimulatedRadio {
    state: Mutex<RadioState>,
    adapter_listeners: Listeners<AdapterState>,
    discovery_listeners: Listeners<Peripheral>,
    connection_listeners: Listeners<bool>,
    message_listeners: Listeners<DeviceMessage>,
}

impl SimulatedRadio {
    /// Create a radio in the given adapter state with the given devices in range.
    ///
    /// Devices answer discovery, connection and protocol requests on their own.
    pub fn new(adapter_state: AdapterState, devices: Vec<Peripheral>) -> Self {
        Self {
            state: Mutex::new(RadioState {
                adapter_state,
                devices,
                auto_respond: true,
                connected: None,
                failures: HashMap::new(),
                calls: Vec::new(),
            }),
            adapter_listeners: Listeners::new("adapter-state"),
            discovery_listeners: Listeners::new("discovery"),
            connection_listeners: Listeners::new("connection"),
            message_listeners: Listeners::new("device-message"),
        }
    }

    /// A radio that only records calls and emits nothing unless told to.
    pub fn silent(adapter_state: AdapterState) -> Self {
        let radio = Self::new(adapter_state, Vec::new());
        radio.set_auto_respond(false);
        radio
    }

    pub fn set_auto_respond(&self, enabled: bool) {
        self.state.lock().auto_respond = enabled;
    }

    /// Make every following call of `kind` fail with `error`. `None` clears it.
    ///
    /// Failing calls are still recorded but produce no replies.
    pub fn fail(&self, kind: CallKind, error: Option<&str>) {
        let mut state = self.state.lock();
        match error {
            Some(error) => state.failures.insert(kind, error.to_string()),
            None => state.failures.remove(&kind),
        };
    }

    /// Change the adapter state and notify state listeners.
    pub fn set_adapter_state(&self, state: AdapterState) {
        self.state.lock().adapter_state = state;
        self.adapter_listeners.emit(state);
    }

    /// Push a discovery event.
    pub fn emit_discovery(&self, peripheral: Peripheral) {
        self.discovery_listeners.emit(peripheral);
    }

    /// Push a connection-status event.
    pub fn emit_connection(&self, connected: bool) {
        if !connected {
            self.state.lock().connected = None;
        }
        self.connection_listeners.emit(connected);
    }

    /// Push a device message.
    pub fn emit_device_message(&self, message: DeviceMessage) {
        self.message_listeners.emit(message);
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of registered listeners across all four streams.
    pub fn listener_count(&self) -> usize {
        self.adapter_listeners.len()
            + self.discovery_listeners.len()
            + self.connection_listeners.len()
            + self.message_listeners.len()
    }

    /// Record `call`. Returns whether to reply, or the injected failure.
    fn record(&self, call: RadioCall) -> Result<bool> {
        let mut state = self.state.lock();
        debug!("Simulated radio call: {:?}", call);
        let failure = state.failures.get(&call.kind()).cloned();
        state.calls.push(call);
        match failure {
            Some(error) => Err(anyhow!("{}", error)),
            None => Ok(state.auto_respond),
        }
    }

    fn reply(&self, message: DeviceMessage) {
        debug!("Simulated device reply: {}", message);
        self.message_listeners.emit(message);
    }
}

#[async_trait]
impl BleManager for SimulatedRadio {
    fn backend_name(&self) -> &'static str {
        "Simulated"
    }

    async fn initialize(&self, options: StartOptions) -> Result<()> {
        self.record(RadioCall::BleInitialize(options))?;
        Ok(())
    }

    async fn query_adapter_state(&self) -> Result<AdapterState> {
        self.record(RadioCall::QueryAdapterState)?;
        Ok(self.state.lock().adapter_state)
    }

    fn subscribe_state(&self) -> Subscription<AdapterState> {
        self.adapter_listeners.subscribe()
    }

    async fn scan(&self, options: ScanOptions) -> Result<()> {
        self.record(RadioCall::Scan(options))?;
        let state = self.state.lock();
        if !state.adapter_state.is_ready() {
            return Err(anyhow!("Bluetooth adapter is {}", state.adapter_state));
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record(RadioCall::StopScan)?;
        Ok(())
    }
}

#[async_trait]
impl BlufiClient for SimulatedRadio {
    fn backend_name(&self) -> &'static str {
        "Simulated"
    }

    async fn initialize(&self, platform: BlufiPlatform, _options: Value) -> Result<()> {
        self.record(RadioCall::BlufiInitialize(platform))?;
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
        let is_start = request.is_start;
        if !self.record(RadioCall::Discovery(request))? || !is_start {
            return Ok(());
        }
        let devices = self.state.lock().devices.clone();
        for device in devices {
            self.discovery_listeners.emit(device);
        }
        Ok(())
    }

    async fn request_connection(&self, request: ConnectionRequest) -> Result<()> {
        if !self.record(RadioCall::Connection(request.clone()))? {
            return Ok(());
        }

        if !request.connect {
            self.state.lock().connected = None;
            self.connection_listeners.emit(false);
            return Ok(());
        }

        let known = {
            let mut state = self.state.lock();
            let known = state.devices.iter().any(|d| d.id == request.device_id);
            if known {
                state.connected = Some(request.device_id.clone());
            }
            known
        };
        self.connection_listeners.emit(known);
        if known {
            self.reply(DeviceMessage::new(DeviceMessageKind::StatusConnected).with_result(true));
        }
        Ok(())
    }

    async fn request_esp32_init(&self, request: InitRequest) -> Result<()> {
        let device_id = request.device_id.clone();
        if !self.record(RadioCall::Esp32Init(request))? {
            return Ok(());
        }
        let ok = self.state.lock().connected.as_deref() == Some(device_id.as_str());
        self.reply(DeviceMessage::new(DeviceMessageKind::InitEsp32Result).with_result(ok));
        Ok(())
    }

    async fn request_wifi_credentials(&self, request: WifiCredentials) -> Result<()> {
        let ssid = request.ssid.clone();
        if !self.record(RadioCall::WifiCredentials(request))? {
            return Ok(());
        }
        self.reply(
            DeviceMessage::new(DeviceMessageKind::ConnectRouterResult)
                .with_result(!ssid.is_empty())
                .with_data(json!({ "ssid": ssid })),
        );
        Ok(())
    }

    async fn request_send_custom_data(&self, request: CustomDataRequest) -> Result<()> {
        let echo = request.custom_data.clone();
        if !self.record(RadioCall::CustomData(request))? {
            return Ok(());
        }
        self.reply(
            DeviceMessage::new(DeviceMessageKind::CustomDataReceived)
                .with_result(true)
                .with_data(echo),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radio() -> SimulatedRadio {
        SimulatedRadio::new(
            AdapterState::On,
            vec![Peripheral::new("AA", Some("BLUFI_AA"))],
        )
    }

    #[tokio::test]
    async fn test_discovery_emits_devices_in_range() {
        let radio = radio();
        let mut discovery = radio.listen_discovery();

        radio
            .request_discovery(DiscoveryRequest { is_start: true })
            .await
            .unwrap();

        assert_eq!(discovery.try_recv().map(|p| p.id), Some("AA".to_string()));
        assert!(discovery.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_connect_unknown_device_reports_false() {
        let radio = radio();
        let mut connection = radio.listen_connection();

        radio
            .request_connection(ConnectionRequest {
                connect: true,
                device_id: "ZZ".into(),
            })
            .await
            .unwrap();

        assert_eq!(connection.try_recv(), Some(false));
    }

    #[tokio::test]
    async fn test_custom_data_is_echoed() {
        let radio = radio();
        let mut messages = radio.listen_device_messages();

        radio
            .request_send_custom_data(CustomDataRequest {
                custom_data: "12:34".into(),
            })
            .await
            .unwrap();

        let reply = messages.try_recv().unwrap();
        assert_eq!(reply.kind, DeviceMessageKind::CustomDataReceived);
        assert_eq!(reply.data_text(), "12:34");
    }

    #[tokio::test]
    async fn test_silent_radio_only_records() {
        let radio = SimulatedRadio::silent(AdapterState::On);
        let mut messages = radio.listen_device_messages();

        radio
            .request_esp32_init(InitRequest {
                device_id: "AA".into(),
            })
            .await
            .unwrap();

        assert!(messages.try_recv().is_none());
        assert_eq!(
            radio.calls(),
            vec![RadioCall::Esp32Init(InitRequest {
                device_id: "AA".into()
            })]
        );
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded_without_reply() {
        let radio = radio();
        let mut connection = radio.listen_connection();
        radio.fail(CallKind::Connection, Some("link lost"));

        let request = ConnectionRequest {
            connect: true,
            device_id: "AA".into(),
        };
        let err = radio.request_connection(request.clone()).await.unwrap_err();

        assert_eq!(err.to_string(), "link lost");
        assert_eq!(radio.calls(), vec![RadioCall::Connection(request.clone())]);
        assert!(connection.try_recv().is_none());

        radio.fail(CallKind::Connection, None);
        radio.request_connection(request).await.unwrap();
        assert_eq!(connection.try_recv(), Some(true));
    }

    #[tokio::test]
    async fn test_scan_rejected_when_adapter_off() {
        let radio = SimulatedRadio::silent(AdapterState::Off);
        assert!(radio.scan(ScanOptions::default()).await.is_err());
    }
}
