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

//! Blufi protocol module contract and its message types.
//!
//! Request types serialize to the object shapes the protocol module takes,
//! e.g. `{"connect": true, "deviceId": "AA"}`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::subscription::Subscription;

/// A BLE-discoverable remote device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peripheral {
    /// Address or platform UUID. Identity of the peripheral.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
    /// Opaque advertisement payload, refreshed on every discovery event.
    #[serde(default)]
    pub advertising: Value,
}

impl Peripheral {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
            rssi: None,
            advertising: Value::Null,
        }
    }

    /// Name for display, falling back to "Unknown".
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("Unknown")
    }

    /// Exact match on identifier or name.
    pub fn matches(&self, target: &str) -> bool {
        self.id == target || self.name.as_deref() == Some(target)
    }
}

/// Kind of an asynchronous message from the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceMessageKind {
    StatusConnected,
    CloseConnected,
    Connected,
    GetDeviceLists,
    InitEsp32Result,
    ConnectRouterResult,
    ConnectNearRouterLists,
    CustomDataReceived,
    GetDeviceListsStart,
    GetDeviceListsStop,
    Unknown(String),
}

impl DeviceMessageKind {
    /// Protocol type code.
    pub fn code(&self) -> &str {
        match self {
            Self::StatusConnected => "-2",
            Self::CloseConnected => "-1",
            Self::Connected => "0",
            Self::GetDeviceLists => "1",
            Self::InitEsp32Result => "2",
            Self::ConnectRouterResult => "3",
            Self::ConnectNearRouterLists => "4",
            Self::CustomDataReceived => "5",
            Self::GetDeviceListsStart => "41",
            Self::GetDeviceListsStop => "42",
            Self::Unknown(code) => code,
        }
    }
}

impl From<String> for DeviceMessageKind {
    fn from(code: String) -> Self {
        match code.trim() {
            "-2" => Self::StatusConnected,
            "-1" => Self::CloseConnected,
            "0" => Self::Connected,
            "1" => Self::GetDeviceLists,
            "2" => Self::InitEsp32Result,
            "3" => Self::ConnectRouterResult,
            "4" => Self::ConnectNearRouterLists,
            "5" => Self::CustomDataReceived,
            "41" => Self::GetDeviceListsStart,
            "42" => Self::GetDeviceListsStop,
            _ => Self::Unknown(code),
        }
    }
}

impl From<DeviceMessageKind> for String {
    fn from(kind: DeviceMessageKind) -> Self {
        kind.code().to_string()
    }
}

/// Message delivered by the device-message stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMessage {
    #[serde(rename = "type")]
    pub kind: DeviceMessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl DeviceMessage {
    pub fn new(kind: DeviceMessageKind) -> Self {
        Self {
            kind,
            result: None,
            data: None,
        }
    }

    pub fn with_result(mut self, result: bool) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Payload as log text. Strings are shown without quotes.
    pub fn data_text(&self) -> String {
        match &self.data {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "undefined".to_string(),
        }
    }
}

impl fmt::Display for DeviceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

/// Host platform announced to the protocol module on init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlufiPlatform {
    Android,
    Ios,
    Linux,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    pub is_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub connect: bool,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDataRequest {
    pub custom_data: String,
}

/// Blufi protocol module.
///
/// All requests resolve once the module has accepted them; outcomes arrive
/// later on the listener streams.
#[async_trait]
pub trait BlufiClient: Send + Sync {
    /// Get the backend name (e.g., "Simulated", "BlueZ").
    fn backend_name(&self) -> &'static str;

    async fn initialize(&self, platform: BlufiPlatform, options: Value) -> Result<()>;

    /// Discovered peripherals. Only delivered while discovery is running.
    fn listen_discovery(&self) -> Subscription<Peripheral>;

    /// Connection status changes.
    fn listen_connection(&self) -> Subscription<bool>;

    /// Messages from the connected device.
    fn listen_device_messages(&self) -> Subscription<DeviceMessage>;

    async fn request_discovery(&self, request: DiscoveryRequest) -> Result<()>;

    async fn request_connection(&self, request: ConnectionRequest) -> Result<()>;

    /// Start protocol negotiation with the device.
    async fn request_esp32_init(&self, request: InitRequest) -> Result<()>;

    async fn request_wifi_credentials(&self, request: WifiCredentials) -> Result<()>;

    async fn request_send_custom_data(&self, request: CustomDataRequest) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_message_parse() {
        let msg: DeviceMessage =
            serde_json::from_value(json!({"type": "5", "result": true, "data": "12:ok"})).unwrap();
        assert_eq!(msg.kind, DeviceMessageKind::CustomDataReceived);
        assert_eq!(msg.result, Some(true));
        assert_eq!(msg.data_text(), "12:ok");
    }

    #[test]
    fn test_unknown_kind_keeps_code() {
        let msg: DeviceMessage = serde_json::from_value(json!({"type": "99"})).unwrap();
        assert_eq!(msg.kind, DeviceMessageKind::Unknown("99".to_string()));
        assert_eq!(msg.to_string(), r#"{"type":"99"}"#);
    }

    #[test]
    fn test_request_shapes() {
        assert_eq!(
            serde_json::to_value(ConnectionRequest {
                connect: true,
                device_id: "AA".into()
            })
            .unwrap(),
            json!({"connect": true, "deviceId": "AA"})
        );
        assert_eq!(
            serde_json::to_value(CustomDataRequest {
                custom_data: "12:34".into()
            })
            .unwrap(),
            json!({"customData": "12:34"})
        );
        assert_eq!(
            serde_json::to_value(DiscoveryRequest { is_start: false }).unwrap(),
            json!({"isStart": false})
        );
    }

    #[test]
    fn test_peripheral_matching() {
        let p = Peripheral::new("AA:BB", Some("BLUFI_DEVICE"));
        assert!(p.matches("AA:BB"));
        assert!(p.matches("BLUFI_DEVICE"));
        assert!(!p.matches("BLUFI"));
        assert_eq!(Peripheral::new("CC", None).display_name(), "Unknown");
    }

    #[test]
    fn test_peripheral_without_optional_fields() {
        let p: Peripheral = serde_json::from_value(json!({"id": "AA"})).unwrap();
        assert_eq!(p.name, None);
        assert_eq!(p.advertising, Value::Null);
    }
}
