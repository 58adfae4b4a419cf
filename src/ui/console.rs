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

//! Line-based console input.

use anyhow::{anyhow, bail, Result};

use crate::events::UserAction;
use crate::state::{FormField, ScreenState};

pub const HELP: &str = "\
Commands:
  scan                       Scan for devices
  find [target]              Scan & Connect to a device by name or id
  tap <index|id>             Connect to a listed device
  disconnect                 Disconnect from the current device
  init                       Init ESP32 (Negotiate)
  wifi                       Send the SSID and password
  send                       Send the custom data
  set <field> <value>        Edit target, ssid, password or data
  show                       Redraw the screen
  help                       Show this help
  quit                       Exit";

/// What the console needs to know about the screen to parse a line.
#[derive(Debug, Clone, Default)]
pub struct ConsoleView {
    /// Listed device ids, in display order.
    pub device_ids: Vec<String>,
    pub scanning: bool,
    /// Last full rendering.
    pub screen: String,
}

impl ConsoleView {
    pub fn update(&mut self, state: &ScreenState, screen: String) {
        self.device_ids = state.peripherals.iter().map(|p| p.id.clone()).collect();
        self.scanning = state.scanning;
        self.screen = screen;
    }
}

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Actions to send to the screen, in order.
    Actions(Vec<UserAction>),
    Show,
    Help,
}

/// Parse one line typed by the user.
///
/// Field values keep every character after the single separator that
/// follows the field name.
pub fn parse(line: &str, view: &ConsoleView) -> Result<Option<Command>> {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
    if line.trim().is_empty() {
        return Ok(None);
    }
    let (word, rest) = split_word(line);

    let actions = match word.to_lowercase().as_str() {
        "scan" => {
            if view.scanning {
                bail!("Scan already in progress");
            }
            vec![UserAction::StartScan]
        }
        "find" | "connect" => {
            let mut actions = Vec::new();
            if !rest.is_empty() {
                actions.push(UserAction::EditField(FormField::Target, rest.to_string()));
            }
            actions.push(UserAction::ManualConnect);
            actions
        }
        "tap" => vec![UserAction::Connect(resolve_device(rest.trim(), view)?)],
        "disconnect" => vec![UserAction::Disconnect],
        "init" => vec![UserAction::InitDevice],
        "wifi" => vec![UserAction::ConfigureWifi],
        "send" => vec![UserAction::SendCustomData],
        "set" => {
            let (name, value) = split_word(rest);
            let field = FormField::parse(name)
                .ok_or_else(|| anyhow!("Unknown field '{}' (target, ssid, password, data)", name))?;
            vec![UserAction::EditField(field, value.to_string())]
        }
        "show" => return Ok(Some(Command::Show)),
        "help" | "?" => return Ok(Some(Command::Help)),
        "quit" | "exit" => vec![UserAction::Quit],
        other => bail!("Unknown command '{}'. Type 'help'.", other),
    };

    Ok(Some(Command::Actions(actions)))
}

/// Split off the first word. The remainder starts right after the one
/// whitespace character that ends the word.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((end, separator)) => (&input[..end], &input[end + separator.len_utf8()..]),
        None => (input, ""),
    }
}

/// A 1-based list index or a device id.
fn resolve_device(arg: &str, view: &ConsoleView) -> Result<String> {
    if arg.is_empty() {
        bail!("Usage: tap <index|id>");
    }
    if let Ok(index) = arg.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| view.device_ids.get(i))
            .cloned()
            .ok_or_else(|| anyhow!("No device at index {}", index));
    }
    Ok(arg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ConsoleView {
        ConsoleView {
            device_ids: vec!["AA".to_string(), "BB".to_string()],
            ..ConsoleView::default()
        }
    }

    fn actions(line: &str, view: &ConsoleView) -> Vec<UserAction> {
        match parse(line, view).unwrap() {
            Some(Command::Actions(actions)) => actions,
            other => panic!("expected actions, got {:?}", other),
        }
    }

    #[test]
    fn test_tap_by_index_and_id() {
        let view = view();
        assert_eq!(actions("tap 2", &view), [UserAction::Connect("BB".into())]);
        assert_eq!(actions("tap AA", &view), [UserAction::Connect("AA".into())]);
        assert_eq!(actions("  tap  1 ", &view), [UserAction::Connect("AA".into())]);
        assert!(parse("tap 3", &view).is_err());
        assert!(parse("tap 0", &view).is_err());
        assert!(parse("tap", &view).is_err());
    }

    #[test]
    fn test_find_sets_target_first() {
        assert_eq!(
            actions("find BLUFI_DEVICE", &view()),
            [
                UserAction::EditField(FormField::Target, "BLUFI_DEVICE".into()),
                UserAction::ManualConnect,
            ]
        );
        assert_eq!(actions("find", &view()), [UserAction::ManualConnect]);
    }

    #[test]
    fn test_set_keeps_value_verbatim() {
        assert_eq!(
            actions("set password  my pass ", &view()),
            [UserAction::EditField(FormField::Password, " my pass ".into())]
        );
        assert_eq!(
            actions("set ssid Home WiFi\r\n", &view()),
            [UserAction::EditField(FormField::Ssid, "Home WiFi".into())]
        );
        assert_eq!(
            actions("set ssid", &view()),
            [UserAction::EditField(FormField::Ssid, String::new())]
        );
        assert_eq!(
            actions("set data 12:34", &view()),
            [UserAction::EditField(FormField::CustomData, "12:34".into())]
        );
        assert!(parse("set colour red", &view()).is_err());
    }

    #[test]
    fn test_scan_disabled_while_scanning() {
        let mut view = view();
        assert_eq!(actions("scan", &view), [UserAction::StartScan]);

        view.scanning = true;
        assert!(parse("scan", &view).is_err());
    }

    #[test]
    fn test_misc_commands() {
        let view = view();
        assert_eq!(parse("  ", &view).unwrap(), None);
        assert_eq!(parse("show", &view).unwrap(), Some(Command::Show));
        assert_eq!(parse("HELP", &view).unwrap(), Some(Command::Help));
        assert_eq!(actions("quit", &view), [UserAction::Quit]);
        assert!(parse("dance", &view).is_err());
    }
}
