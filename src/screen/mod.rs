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

//! The provisioning screen.
//!
//! Owns all screen state and is the only thing that mutates it. User actions
//! and module callbacks are handled one at a time on the task running
//! [`Screen::run`]; calls into the modules are forwarded as-is and their
//! outcomes arrive later as [`ScreenEvent`]s.

pub mod scan_timer;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bluetooth::{
    AdapterState, BleManager, BlufiClient, BlufiPlatform, ConnectionRequest, CustomDataRequest,
    DeviceMessage, DeviceMessageKind, DiscoveryRequest, InitRequest, Peripheral, ScanOptions,
    StartOptions, Subscription, WifiCredentials,
};
use crate::config::Config;
use crate::events::{ScreenEvent, UserAction};
use crate::permissions::{Permission, PermissionService};
use crate::state::{ConnectionState, FormField, ScreenState};

use scan_timer::ScanTimer;

/// Settings the screen is built with.
#[derive(Debug, Clone)]
pub struct ScreenSettings {
    pub start_options: StartOptions,
    pub scan_options: ScanOptions,
    pub scan_duration: Duration,
    pub blufi_platform: BlufiPlatform,
    pub custom_data_seed: String,
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            start_options: StartOptions::default(),
            scan_options: ScanOptions::default(),
            scan_duration: Duration::from_secs(5),
            blufi_platform: BlufiPlatform::Linux,
            custom_data_seed: "12:".to_string(),
        }
    }
}

impl ScreenSettings {
    pub fn from_config(config: &Config) -> Self {
        let bluetooth = &config.bluetooth;
        Self {
            start_options: StartOptions {
                show_alert: bluetooth.show_alert,
            },
            scan_options: ScanOptions {
                service_uuids: bluetooth.service_uuids.clone(),
                seconds: bluetooth.scan_seconds,
                allow_duplicates: bluetooth.allow_duplicates,
            },
            scan_duration: Duration::from_secs(bluetooth.scan_seconds),
            blufi_platform: config.platform.blufi(),
            custom_data_seed: config.form.custom_data_seed.clone(),
        }
    }
}

/// What caused a redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// The user did something.
    Action,
    /// A module or timer reported something.
    Event,
}

/// Event streams held while the screen is mounted.
struct Subscriptions {
    adapter: Subscription<AdapterState>,
    discovery: Subscription<Peripheral>,
    connection: Subscription<bool>,
    messages: Subscription<DeviceMessage>,
}

impl Subscriptions {
    async fn next(&mut self) -> Option<ScreenEvent> {
        tokio::select! {
            Some(state) = self.adapter.recv() => Some(ScreenEvent::AdapterStateChanged(state)),
            Some(peripheral) = self.discovery.recv() => Some(ScreenEvent::PeripheralDiscovered(peripheral)),
            Some(connected) = self.connection.recv() => Some(ScreenEvent::ConnectionChanged(connected)),
            Some(message) = self.messages.recv() => Some(ScreenEvent::DeviceMessage(message)),
            else => None,
        }
    }

    fn try_next(&mut self) -> Option<ScreenEvent> {
        self.adapter
            .try_recv()
            .map(ScreenEvent::AdapterStateChanged)
            .or_else(|| self.discovery.try_recv().map(ScreenEvent::PeripheralDiscovered))
            .or_else(|| self.connection.try_recv().map(ScreenEvent::ConnectionChanged))
            .or_else(|| self.messages.try_recv().map(ScreenEvent::DeviceMessage))
    }
}

/// Scan, connect and provision screen.
pub struct Screen {
    ble: Arc<dyn BleManager>,
    blufi: Arc<dyn BlufiClient>,
    permissions: Arc<dyn PermissionService>,
    settings: ScreenSettings,
    state: ScreenState,
    scan_timer: ScanTimer,
    internal_tx: mpsc::UnboundedSender<ScreenEvent>,
    internal_rx: mpsc::UnboundedReceiver<ScreenEvent>,
    subscriptions: Option<Subscriptions>,
}

impl Screen {
    pub fn new(
        ble: Arc<dyn BleManager>,
        blufi: Arc<dyn BlufiClient>,
        permissions: Arc<dyn PermissionService>,
        settings: ScreenSettings,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let state = ScreenState::new(&settings.custom_data_seed);
        Self {
            ble,
            blufi,
            permissions,
            settings,
            state,
            scan_timer: ScanTimer::new(),
            internal_tx,
            internal_rx,
            subscriptions: None,
        }
    }

    pub fn state(&self) -> &ScreenState {
        &self.state
    }

    pub fn is_mounted(&self) -> bool {
        self.subscriptions.is_some()
    }

    /// Subscribe to the module streams and bring both modules up.
    pub async fn mount(&mut self) {
        if self.is_mounted() {
            return;
        }
        info!(
            "Mounting screen (BLE: {}, Blufi: {})",
            self.ble.backend_name(),
            self.blufi.backend_name()
        );

        self.subscriptions = Some(Subscriptions {
            adapter: self.ble.subscribe_state(),
            discovery: self.blufi.listen_discovery(),
            connection: self.blufi.listen_connection(),
            messages: self.blufi.listen_device_messages(),
        });

        match self.ble.initialize(self.settings.start_options.clone()).await {
            Ok(()) => {
                self.state.log("BleManager initialized");
                match self.ble.query_adapter_state().await {
                    Ok(state) => {
                        self.state.log(format!("Initial Bluetooth state: {}", state));
                        if state.is_ready() {
                            self.state.bluetooth_ready = true;
                        }
                    }
                    Err(e) => self.state.log(format!("Bluetooth state query failed: {}", e)),
                }
            }
            Err(e) => self.state.log(format!("BleManager initialization failed: {}", e)),
        }

        if let Err(e) = self
            .blufi
            .initialize(self.settings.blufi_platform, json!({}))
            .await
        {
            self.state.log(format!("Blufi initialization failed: {}", e));
        }
    }

    /// Release every stream and stop the scan timer.
    pub fn unmount(&mut self) {
        self.scan_timer.cancel();
        if self.subscriptions.take().is_some() {
            info!("Screen unmounted, listeners released");
        }
    }

    /// Start a scan window.
    pub async fn start_scan(&mut self) {
        if !self.state.bluetooth_ready {
            self.state
                .log("Bluetooth is not ready yet. Please wait or check settings.");
            match self.ble.query_adapter_state().await {
                Ok(state) if state.is_ready() => self.state.bluetooth_ready = true,
                Ok(state) => debug!("Adapter still {}", state),
                Err(e) => debug!("Adapter state query failed: {}", e),
            }
            return;
        }

        if !self.scan_permitted().await {
            return;
        }

        self.state.peripherals.clear();
        self.state.scanning = true;
        self.state.log("Starting scan...");

        self.spawn_fallback_scan();
        if let Err(e) = self
            .blufi
            .request_discovery(DiscoveryRequest { is_start: true })
            .await
        {
            self.state.log(format!("Blufi discovery error: {}", e));
        }

        self.scan_timer
            .arm(self.settings.scan_duration, self.internal_tx.clone());
    }

    async fn scan_permitted(&mut self) -> bool {
        let platform = self.permissions.platform();

        if platform.needs_location_permission() {
            let status = self
                .permissions
                .request(Permission::AccessFineLocation)
                .await;
            if !status.is_granted() {
                self.state.log("Location permission denied");
                return false;
            }
        }

        if platform.needs_bluetooth_permissions() {
            let results = self
                .permissions
                .request_multiple(&[Permission::BluetoothScan, Permission::BluetoothConnect])
                .await;
            for (permission, status) in results {
                if !status.is_granted() {
                    debug!("{:?} not granted ({:?})", permission, status);
                }
            }
        }

        true
    }

    /// Direct scan through the generic BLE manager, alongside Blufi discovery.
    fn spawn_fallback_scan(&self) {
        let ble = self.ble.clone();
        let options = self.settings.scan_options.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = ble.scan(options).await.map_err(|e| e.to_string());
            let _ = tx.send(ScreenEvent::FallbackScanFinished(result));
        });
    }

    async fn finish_scan(&mut self, generation: u64) {
        if !self.scan_timer.expire(generation) {
            debug!("Ignoring stale scan timer {}", generation);
            return;
        }

        self.state.scanning = false;
        self.state.has_scanned = true;
        if let Err(e) = self
            .blufi
            .request_discovery(DiscoveryRequest { is_start: false })
            .await
        {
            self.state.log(format!("Blufi discovery error: {}", e));
        }
        if let Err(e) = self.ble.stop_scan().await {
            self.state.log(format!("BleManager stop scan error: {}", e));
        }
        self.state.log("Scan stopped");
    }

    /// Connect to a cached device matching the target field, then rescan.
    ///
    /// Only the cache is consulted. A matching device that shows up during
    /// the rescan is listed but not connected automatically.
    pub async fn manual_connect(&mut self) {
        let target = self.state.form.target.clone();
        if target.is_empty() {
            return;
        }

        self.state
            .log(format!("Searching for device matching: {}...", target));

        match self.state.peripherals.find_match(&target).cloned() {
            Some(peripheral) => {
                self.state
                    .log(format!("Found match in cache: {}", peripheral.id));
                self.connect(peripheral).await;
            }
            None => self.state.log("Device not in cache, scanning..."),
        }

        self.start_scan().await;
    }

    /// Connect to `peripheral`. The screen treats it as connected right away.
    pub async fn connect(&mut self, peripheral: Peripheral) {
        self.state
            .log(format!("Connecting to {}...", peripheral.id));
        let request = ConnectionRequest {
            connect: true,
            device_id: peripheral.id.clone(),
        };
        self.state.connection = ConnectionState::Pending(peripheral);

        if let Err(e) = self.blufi.request_connection(request).await {
            self.state.log(format!("Connection request failed: {}", e));
        }
    }

    /// Connect to a listed device by identifier.
    pub async fn connect_by_id(&mut self, id: &str) {
        match self.state.peripherals.get(id).cloned() {
            Some(peripheral) => self.connect(peripheral).await,
            None => self.state.log(format!("Unknown device: {}", id)),
        }
    }

    pub async fn disconnect(&mut self) {
        let Some(device) = self.state.connected_device().cloned() else {
            return;
        };

        self.state
            .log(format!("Disconnecting from {}...", device.id));
        self.state.connection = ConnectionState::Disconnected;

        let request = ConnectionRequest {
            connect: false,
            device_id: device.id,
        };
        if let Err(e) = self.blufi.request_connection(request).await {
            self.state.log(format!("Disconnect request failed: {}", e));
        }
    }

    fn require_device(&mut self) -> Option<String> {
        let id = self.state.connected_device().map(|p| p.id.clone());
        if id.is_none() {
            self.state.log("No device connected");
        }
        id
    }

    /// Start protocol negotiation with the connected device.
    pub async fn init_device(&mut self) {
        let Some(device_id) = self.require_device() else {
            return;
        };
        self.state.log("Initializing ESP32...");
        if let Err(e) = self
            .blufi
            .request_esp32_init(InitRequest { device_id })
            .await
        {
            self.state.log(format!("Init request failed: {}", e));
        }
    }

    /// Send the SSID and password fields as they are.
    pub async fn configure_wifi(&mut self) {
        if self.require_device().is_none() {
            return;
        }
        let credentials = WifiCredentials {
            ssid: self.state.form.ssid.clone(),
            password: self.state.form.password.clone(),
        };
        self.state
            .log(format!("Configuring SSID: {}", credentials.ssid));
        if let Err(e) = self.blufi.request_wifi_credentials(credentials).await {
            self.state.log(format!("Wi-Fi request failed: {}", e));
        }
    }

    /// Send the custom payload field as it is.
    pub async fn send_custom_data(&mut self) {
        if self.require_device().is_none() {
            return;
        }
        let custom_data = self.state.form.custom_data.clone();
        self.state
            .log(format!("Sending custom data: {}", custom_data));
        if let Err(e) = self
            .blufi
            .request_send_custom_data(CustomDataRequest { custom_data })
            .await
        {
            self.state.log(format!("Custom data request failed: {}", e));
        }
    }

    pub fn edit_field(&mut self, field: FormField, value: String) {
        self.state.form.set(field, value);
    }

    /// Handle one user action. Returns false when the user asked to quit.
    pub async fn handle_action(&mut self, action: UserAction) -> bool {
        debug!("User action: {:?}", action);
        match action {
            UserAction::StartScan => self.start_scan().await,
            UserAction::ManualConnect => self.manual_connect().await,
            UserAction::Connect(id) => self.connect_by_id(&id).await,
            UserAction::Disconnect => self.disconnect().await,
            UserAction::InitDevice => self.init_device().await,
            UserAction::ConfigureWifi => self.configure_wifi().await,
            UserAction::SendCustomData => self.send_custom_data().await,
            UserAction::EditField(field, value) => self.edit_field(field, value),
            UserAction::Quit => return false,
        }
        true
    }

    /// Process a single event.
    pub async fn process_event(&mut self, event: ScreenEvent) {
        match event {
            ScreenEvent::AdapterStateChanged(state) => {
                self.state.log(format!("BleManager state: {}", state));
                self.state.bluetooth_ready = state.is_ready();
            }
            ScreenEvent::PeripheralDiscovered(peripheral) => {
                let id = peripheral.id.clone();
                if self.state.peripherals.upsert(peripheral) {
                    debug!("Discovered {}", id);
                } else {
                    debug!("Ignoring discovery event without identifier");
                }
            }
            ScreenEvent::ConnectionChanged(connected) => {
                self.state
                    .log(format!("Connection status: {}", connected));
                self.state.connection.apply_status(connected);
            }
            ScreenEvent::DeviceMessage(message) => self.handle_device_message(message),
            ScreenEvent::ScanTimerFired { generation } => self.finish_scan(generation).await,
            ScreenEvent::FallbackScanFinished(Ok(())) => {
                self.state.log("BleManager direct scan started");
            }
            ScreenEvent::FallbackScanFinished(Err(e)) => {
                self.state.log(format!("BleManager scan error: {}", e));
            }
        }
    }

    fn handle_device_message(&mut self, message: DeviceMessage) {
        self.state.log(format!("Device Msg: {}", message));
        match message.kind {
            DeviceMessageKind::CustomDataReceived => {
                self.state
                    .log(format!("Received Custom Data: {}", message.data_text()));
            }
            DeviceMessageKind::StatusConnected => {
                debug!("Device reports connected status");
            }
            _ => {}
        }
    }

    /// Wait for the next module or timer event.
    pub async fn next_event(&mut self) -> Option<ScreenEvent> {
        let internal = &mut self.internal_rx;
        match self.subscriptions.as_mut() {
            Some(subscriptions) => tokio::select! {
                Some(event) = internal.recv() => Some(event),
                Some(event) = subscriptions.next() => Some(event),
                else => None,
            },
            None => internal.recv().await,
        }
    }

    fn try_next_event(&mut self) -> Option<ScreenEvent> {
        self.internal_rx.try_recv().ok().or_else(|| {
            self.subscriptions
                .as_mut()
                .and_then(Subscriptions::try_next)
        })
    }

    /// Process every event that has already been delivered.
    pub async fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Some(event) = self.try_next_event() {
            self.process_event(event).await;
            processed += 1;
        }
        processed
    }

    /// Run the screen until the user quits or the action channel closes.
    ///
    /// `on_update` is called after the screen mounts and after every action
    /// or event. Returns the final state.
    pub async fn run<F>(
        mut self,
        mut actions: mpsc::Receiver<UserAction>,
        mut on_update: F,
    ) -> ScreenState
    where
        F: FnMut(&ScreenState, Update),
    {
        self.mount().await;
        on_update(&self.state, Update::Action);

        loop {
            tokio::select! {
                action = actions.recv() => {
                    let Some(action) = action else {
                        break;
                    };
                    if !self.handle_action(action).await {
                        break;
                    }
                    on_update(&self.state, Update::Action);
                }
                Some(event) = self.next_event() => {
                    self.process_event(event).await;
                    on_update(&self.state, Update::Event);
                }
            }
        }

        self.unmount();
        self.state
    }
}
