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

//! Screen state.

use chrono::{DateTime, Local};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::info;

use crate::bluetooth::Peripheral;

/// Peripherals seen during the current scan, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryMap {
    order: Vec<String>,
    entries: HashMap<String, Peripheral>,
}

impl DiscoveryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a peripheral. Returns false for an empty identifier.
    pub fn upsert(&mut self, peripheral: Peripheral) -> bool {
        if peripheral.id.is_empty() {
            return false;
        }
        if !self.entries.contains_key(&peripheral.id) {
            self.order.push(peripheral.id.clone());
        }
        self.entries.insert(peripheral.id.clone(), peripheral);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Peripheral> {
        self.entries.get(id)
    }

    /// First entry whose identifier or name equals `target`.
    pub fn find_match(&self, target: &str) -> Option<&Peripheral> {
        self.iter().find(|p| p.matches(target))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peripheral> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

/// Connection to the one device the screen talks to.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Connect requested, no confirmation yet.
    Pending(Peripheral),
    /// Confirmed by the protocol module.
    Connected(Peripheral),
}

impl ConnectionState {
    /// The device the screen treats as connected. Includes pending connects.
    pub fn device(&self) -> Option<&Peripheral> {
        match self {
            Self::Disconnected => None,
            Self::Pending(p) | Self::Connected(p) => Some(p),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Apply a connection-status event.
    ///
    /// A negative status always disconnects. A positive one only confirms a
    /// pending connect.
    pub fn apply_status(&mut self, connected: bool) {
        if !connected {
            *self = Self::Disconnected;
            return;
        }
        if let Self::Pending(p) = self {
            *self = Self::Connected(p.clone());
        }
    }
}

/// One line in the log pane.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Newest-first log of everything the screen did or heard.
#[derive(Debug, Clone, Default)]
pub struct LogBook {
    entries: VecDeque<LogEntry>,
    total: usize,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.entries.push_front(LogEntry {
            timestamp: Local::now(),
            message,
        });
        self.total += 1;
    }

    /// Entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.entries.iter().any(|e| e.message == message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count of entries ever pushed. Front ends use it to print only new lines.
    pub fn total(&self) -> usize {
        self.total
    }
}

/// Editable text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    /// Manual-connect target (identifier or name).
    Target,
    Ssid,
    Password,
    CustomData,
}

impl FormField {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "target" | "device" => Some(Self::Target),
            "ssid" => Some(Self::Ssid),
            "password" | "pass" => Some(Self::Password),
            "data" | "custom" | "custom_data" => Some(Self::CustomData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    pub target: String,
    pub ssid: String,
    pub password: String,
    pub custom_data: String,
}

impl FormFields {
    pub fn new(custom_data_seed: &str) -> Self {
        Self {
            custom_data: custom_data_seed.to_string(),
            ..Self::default()
        }
    }

    pub fn set(&mut self, field: FormField, value: String) {
        match field {
            FormField::Target => self.target = value,
            FormField::Ssid => self.ssid = value,
            FormField::Password => self.password = value,
            FormField::CustomData => self.custom_data = value,
        }
    }
}

/// Which part of the flow the screen is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenMode {
    Idle { bluetooth_ready: bool },
    Scanning,
    DeviceList,
    Connected,
}

/// Everything the screen shows.
#[derive(Debug, Clone)]
pub struct ScreenState {
    pub bluetooth_ready: bool,
    pub scanning: bool,
    /// Set once the first scan window has closed.
    pub has_scanned: bool,
    pub peripherals: DiscoveryMap,
    pub connection: ConnectionState,
    pub logs: LogBook,
    pub form: FormFields,
}

impl ScreenState {
    pub fn new(custom_data_seed: &str) -> Self {
        Self {
            bluetooth_ready: false,
            scanning: false,
            has_scanned: false,
            peripherals: DiscoveryMap::new(),
            connection: ConnectionState::Disconnected,
            logs: LogBook::new(),
            form: FormFields::new(custom_data_seed),
        }
    }

    pub fn connected_device(&self) -> Option<&Peripheral> {
        self.connection.device()
    }

    pub fn mode(&self) -> ScreenMode {
        if self.connection.device().is_some() {
            ScreenMode::Connected
        } else if self.scanning {
            ScreenMode::Scanning
        } else if self.has_scanned {
            ScreenMode::DeviceList
        } else {
            ScreenMode::Idle {
                bluetooth_ready: self.bluetooth_ready,
            }
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(message);
    }
}
