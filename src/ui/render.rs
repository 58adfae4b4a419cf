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

//! Text rendering of the screen.

use std::fmt::Write;

use crate::state::{LogBook, ScreenMode, ScreenState};

const RULE: &str = "----------------------------------------";

/// Draw the whole screen.
///
/// Shows the device list or the control panel, never both.
pub fn render(state: &ScreenState) -> String {
    let mut out = String::new();

    let button = if state.scanning { "[Scanning...]" } else { "[Scan]" };
    let _ = writeln!(out, "Blufi Console  {}", button);
    let _ = writeln!(out, "Device name or id: {}", state.form.target);
    let _ = writeln!(out, "{}", RULE);

    match state.mode() {
        ScreenMode::Connected => render_panel(state, &mut out),
        ScreenMode::Idle {
            bluetooth_ready: false,
        } => {
            let _ = writeln!(out, "Bluetooth is not ready");
        }
        _ => render_devices(state, &mut out),
    }

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Logs:");
    for entry in state.logs.iter() {
        let _ = writeln!(out, "{}", entry);
    }
    out
}

fn render_devices(state: &ScreenState, out: &mut String) {
    if state.peripherals.is_empty() {
        let _ = writeln!(out, "No devices found");
        return;
    }
    for (index, peripheral) in state.peripherals.iter().enumerate() {
        let _ = write!(out, "{:>2}. {} ({})", index + 1, peripheral.display_name(), peripheral.id);
        if let Some(rssi) = peripheral.rssi {
            let _ = write!(out, " {} dBm", rssi);
        }
        out.push('\n');
    }
}

fn render_panel(state: &ScreenState, out: &mut String) {
    let Some(device) = state.connected_device() else {
        return;
    };
    let status = if state.connection.is_confirmed() {
        ""
    } else {
        " (pending)"
    };
    let _ = writeln!(out, "Connected to: {}{}", device.display_name(), status);
    let _ = writeln!(out, "[Disconnect]  [Init ESP32 (Negotiate)]");
    let _ = writeln!(out, "SSID: {}", state.form.ssid);
    let _ = writeln!(out, "Password: {}", mask(&state.form.password));
    let _ = writeln!(out, "[Configure WiFi]");
    let _ = writeln!(out, "Custom data: {}", state.form.custom_data);
    let _ = writeln!(out, "[Send Custom Data]");
}

fn mask(password: &str) -> String {
    "*".repeat(password.chars().count())
}

/// Tracks which log lines a front end has already printed.
#[derive(Debug, Default)]
pub struct LogCursor {
    seen: usize,
}

impl LogCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines pushed since the last call, oldest first.
    pub fn take_new(&mut self, logs: &LogBook) -> Vec<String> {
        let fresh = logs.total().saturating_sub(self.seen);
        self.seen = logs.total();
        let mut lines: Vec<String> = logs.iter().take(fresh).map(|e| e.to_string()).collect();
        lines.reverse();
        lines
    }

    /// Mark everything as printed.
    pub fn catch_up(&mut self, logs: &LogBook) {
        self.seen = logs.total();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::Peripheral;
    use crate::state::ConnectionState;

    fn listed() -> ScreenState {
        let mut state = ScreenState::new("12:");
        state.bluetooth_ready = true;
        state.has_scanned = true;
        state.peripherals.upsert(Peripheral::new("AA", Some("BLUFI_AA")));
        state.peripherals.upsert(Peripheral::new("BB", None));
        state
    }

    #[test]
    fn test_device_list() {
        let text = render(&listed());

        assert!(text.contains("[Scan]"));
        assert!(text.contains(" 1. BLUFI_AA (AA)"));
        assert!(text.contains(" 2. Unknown (BB)"));
        assert!(!text.contains("Connected to:"));
    }

    #[test]
    fn test_panel_replaces_list() {
        let mut state = listed();
        state.form.password = "secret".to_string();
        state.connection = ConnectionState::Connected(Peripheral::new("AA", Some("BLUFI_AA")));

        let text = render(&state);

        assert!(text.contains("Connected to: BLUFI_AA"));
        assert!(text.contains("Password: ******"));
        assert!(!text.contains("secret"));
        assert!(text.contains("Custom data: 12:"));
        assert!(!text.contains("(BB)"));
    }

    #[test]
    fn test_scanning_header() {
        let mut state = listed();
        state.scanning = true;
        assert!(render(&state).contains("[Scanning...]"));
    }

    #[test]
    fn test_not_ready() {
        let state = ScreenState::new("12:");
        assert!(render(&state).contains("Bluetooth is not ready"));
    }

    #[test]
    fn test_log_cursor_returns_only_new_lines() {
        let mut logs = LogBook::new();
        let mut cursor = LogCursor::new();
        logs.push("one");
        cursor.catch_up(&logs);

        logs.push("two");
        logs.push("three");
        let lines = cursor.take_new(&logs);

        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("two"));
        assert!(lines[1].ends_with("three"));
        assert!(cursor.take_new(&logs).is_empty());
    }
}
