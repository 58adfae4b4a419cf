//! Integration tests for the full provisioning flow.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use blufi_console::bluetooth::{
    AdapterState, CustomDataRequest, Peripheral, RadioCall, SimulatedRadio,
};
use blufi_console::events::UserAction;
use blufi_console::permissions::{RuntimePlatform, StaticPermissions};
use blufi_console::screen::{Screen, ScreenSettings, Update};
use blufi_console::state::{FormField, ScreenMode};
use blufi_console::ui;

fn screen_for(radio: &Arc<SimulatedRadio>) -> Screen {
    Screen::new(
        radio.clone(),
        radio.clone(),
        Arc::new(StaticPermissions::granting(RuntimePlatform::Desktop)),
        ScreenSettings::default(),
    )
}

fn esp32s() -> Vec<Peripheral> {
    vec![
        Peripheral::new("24:0A:C4:12:34:56", Some("BLUFI_DEVICE")),
        Peripheral::new("24:0A:C4:AB:CD:EF", None),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_scan_tap_disconnect() {
    let radio = Arc::new(SimulatedRadio::silent(AdapterState::On));
    let mut screen = screen_for(&radio);
    screen.mount().await;
    assert!(screen.state().bluetooth_ready);

    screen.handle_action(UserAction::StartScan).await;
    radio.emit_discovery(Peripheral::new("AA", None));
    radio.emit_discovery(Peripheral::new("BB", None));
    screen.pump().await;
    assert_eq!(screen.state().peripherals.len(), 2);

    tokio::time::sleep(Duration::from_secs(6)).await;
    screen.pump().await;
    assert_eq!(screen.state().mode(), ScreenMode::DeviceList);

    screen.handle_action(UserAction::Connect("AA".into())).await;
    assert_eq!(
        screen.state().connected_device().map(|p| p.id.as_str()),
        Some("AA")
    );
    assert!(ui::render(screen.state()).contains("Connected to: Unknown"));

    screen.handle_action(UserAction::Disconnect).await;
    assert!(screen.state().connected_device().is_none());
    assert_eq!(screen.state().mode(), ScreenMode::DeviceList);

    let text = ui::render(screen.state());
    assert!(text.contains(" 1. Unknown (AA)"));
    assert!(text.contains(" 2. Unknown (BB)"));
}

#[tokio::test]
async fn test_custom_data_is_sent_once() {
    let radio = Arc::new(SimulatedRadio::silent(AdapterState::On));
    let mut screen = screen_for(&radio);
    screen.mount().await;

    screen.handle_action(UserAction::StartScan).await;
    radio.emit_discovery(Peripheral::new("AA", Some("BLUFI_AA")));
    screen.pump().await;
    screen.handle_action(UserAction::Connect("AA".into())).await;

    screen
        .handle_action(UserAction::EditField(FormField::CustomData, "12:34".into()))
        .await;
    screen.handle_action(UserAction::SendCustomData).await;

    let sent: Vec<_> = radio
        .calls()
        .into_iter()
        .filter(|c| matches!(c, RadioCall::CustomData(_)))
        .collect();
    assert_eq!(
        sent,
        [RadioCall::CustomData(CustomDataRequest {
            custom_data: "12:34".into()
        })]
    );
}

#[tokio::test(start_paused = true)]
async fn test_find_connects_after_first_scan() {
    let radio = Arc::new(SimulatedRadio::new(AdapterState::On, esp32s()));
    let mut screen = screen_for(&radio);
    screen.mount().await;

    // Nothing cached yet: the scan fills the list but does not connect.
    screen
        .handle_action(UserAction::EditField(FormField::Target, "BLUFI_DEVICE".into()))
        .await;
    screen.handle_action(UserAction::ManualConnect).await;
    screen.pump().await;
    assert!(screen.state().connected_device().is_none());
    assert_eq!(screen.state().peripherals.len(), 2);

    tokio::time::sleep(Duration::from_secs(6)).await;
    screen.pump().await;

    screen.handle_action(UserAction::ManualConnect).await;
    screen.pump().await;

    assert_eq!(
        screen.state().connected_device().map(|p| p.id.as_str()),
        Some("24:0A:C4:12:34:56")
    );
    assert!(screen.state().connection.is_confirmed());
    assert!(screen
        .state()
        .logs
        .contains("Found match in cache: 24:0A:C4:12:34:56"));
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_provisions_device() {
    let radio = Arc::new(SimulatedRadio::new(AdapterState::On, esp32s()));
    let screen = screen_for(&radio);
    let updates = Arc::new(Mutex::new(Vec::new()));

    let (tx, rx) = mpsc::channel(8);
    let seen = updates.clone();
    let handle = tokio::spawn(screen.run(rx, move |_, update| seen.lock().push(update)));

    tx.send(UserAction::StartScan).await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    tx.send(UserAction::Connect("24:0A:C4:12:34:56".into()))
        .await
        .unwrap();
    tx.send(UserAction::EditField(FormField::Ssid, "home".into()))
        .await
        .unwrap();
    tx.send(UserAction::ConfigureWifi).await.unwrap();
    tx.send(UserAction::SendCustomData).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    tx.send(UserAction::Quit).await.unwrap();
    let state = handle.await.unwrap();

    assert!(state.has_scanned);
    assert!(!state.scanning);
    assert!(state.connection.is_confirmed());
    assert!(state.logs.contains("Scan stopped"));
    assert!(state.logs.contains("Received Custom Data: 12:"));
    assert!(state.logs.contains("Configuring SSID: home"));
    assert_eq!(radio.listener_count(), 0);

    let updates = updates.lock();
    assert!(updates.contains(&Update::Action));
    assert!(updates.contains(&Update::Event));
}
