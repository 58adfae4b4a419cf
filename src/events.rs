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

//! Events driving the screen.

use crate::bluetooth::{AdapterState, DeviceMessage, Peripheral};
use crate::state::FormField;

/// Asynchronous inputs from the modules and the screen's own tasks.
#[derive(Debug, Clone)]
pub enum ScreenEvent {
    /// Adapter state changed.
    AdapterStateChanged(AdapterState),
    /// Peripheral discovered (or re-advertised).
    PeripheralDiscovered(Peripheral),
    /// Connection status reported by the protocol module.
    ConnectionChanged(bool),
    /// Message from the connected device.
    DeviceMessage(DeviceMessage),
    /// Scan window of the given generation closed.
    ScanTimerFired { generation: u64 },
    /// Direct scan request through the BLE manager was answered.
    FallbackScanFinished(Result<(), String>),
}

/// Inputs from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Scan button.
    StartScan,
    /// "Scan & Connect" with the current target field.
    ManualConnect,
    /// Tap on a discovered device.
    Connect(String),
    Disconnect,
    /// "Init ESP32 (Negotiate)".
    InitDevice,
    ConfigureWifi,
    SendCustomData,
    EditField(FormField, String),
    Quit,
}
