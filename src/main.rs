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

//! Blufi Console

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blufi_console::bluetooth;
use blufi_console::config::Config;
use blufi_console::events::UserAction;
use blufi_console::permissions::StaticPermissions;
use blufi_console::screen::{Screen, ScreenSettings, Update};
use blufi_console::ui::{self, Command, ConsoleView, LogCursor};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging. Stdout belongs to the screen.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blufi_console=info".parse()?),
        )
        .init();

    info!("Starting Blufi Console v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    let backend = bluetooth::create_backend(&config)?;
    let permissions = Arc::new(StaticPermissions::new(
        config.platform.runtime(),
        config.platform.denied_permissions.clone(),
    ));
    let screen = Screen::new(
        backend.ble,
        backend.blufi,
        permissions,
        ScreenSettings::from_config(&config),
    );

    let (action_tx, action_rx) = mpsc::channel::<UserAction>(32);
    let view = Arc::new(Mutex::new(ConsoleView::default()));

    // Read commands from stdin
    let console_tx = action_tx.clone();
    let console_view = view.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            };

            let command = {
                let view = console_view.lock();
                ui::parse(&line, &view)
            };
            match command {
                Ok(Some(Command::Actions(actions))) => {
                    for action in actions {
                        if console_tx.send(action).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(Some(Command::Show)) => println!("{}", console_view.lock().screen),
                Ok(Some(Command::Help)) => println!("{}", ui::HELP),
                Ok(None) => {}
                Err(e) => println!("{}", e),
            }
        }
        let _ = console_tx.send(UserAction::Quit).await;
    });

    // Quit on Ctrl+C
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = action_tx.send(UserAction::Quit).await;
        }
    });

    println!("{}", ui::HELP);

    let mut cursor = LogCursor::new();
    let state = screen
        .run(action_rx, |state, update| {
            let rendered = ui::render(state);
            match update {
                Update::Action => {
                    println!("{}", rendered);
                    cursor.catch_up(&state.logs);
                }
                Update::Event => {
                    for line in cursor.take_new(&state.logs) {
                        println!("{}", line);
                    }
                }
            }
            view.lock().update(state, rendered);
        })
        .await;

    info!(
        "Blufi Console stopped ({} log lines, {} device(s) seen)",
        state.logs.total(),
        state.peripherals.len()
    );
    Ok(())
}
