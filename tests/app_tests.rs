mod common;

use std::fs;

use common::{FakeFactory, create_test_app, poll_app_until_done};
use customrp::command::{Command, parse_command};
use customrp::config::SettingsStore;
use customrp::connection::ConnectionState;
use customrp::instance::{HandoffRequest, InstanceIdentity, Role, claim};
use customrp::ipc::{IpcClient, IpcRequest};
use tempfile::TempDir;

fn run(app: &mut customrp::app::App, line: &str) {
    app.execute(parse_command(line));
}

#[tokio::test]
async fn connect_needs_application_id() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "connect");
    assert_eq!(
        app.last_message(),
        Some("Set an application ID first: set application_id <id>")
    );
    assert_eq!(factory.state().created, 0);
    assert_eq!(app.controller().state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn set_is_saved_immediately() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "set details Playing chess");
    assert_eq!(app.last_message(), Some("details saved"));

    let stored = SettingsStore::new(dir.path().join("settings.toml")).load();
    assert_eq!(stored.details, "Playing chess");
}

#[tokio::test]
async fn connect_ready_update_flow() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "set application_id 1234567890");
    run(&mut app, "set details Playing chess");
    run(&mut app, "connect");
    assert_eq!(app.controller().state(), ConnectionState::Connecting);
    assert_eq!(factory.state().application_ids, vec!["1234567890"]);

    factory.latest_sink().ready(Some("someone".to_string()));
    assert_eq!(app.pump_events(), 1);
    assert_eq!(app.controller().state(), ConnectionState::Connected);
    assert_eq!(app.last_message(), Some("Connected as someone"));

    run(&mut app, "update");
    assert_eq!(app.last_message(), Some("Presence updated"));
    let published = factory.state().published.clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].details.as_deref(), Some("Playing chess"));
}

#[tokio::test]
async fn update_before_connect_is_refused() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "update");
    assert_eq!(app.last_message(), Some("Connect first"));
    assert_eq!(app.controller().previous(), None);
}

#[tokio::test]
async fn connection_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "set application_id 42");
    run(&mut app, "connect");
    factory.latest_sink().connection_failed();
    app.pump_events();

    assert_eq!(
        app.last_message(),
        Some("Failed to connect to Discord. Make sure Discord is running.")
    );
    assert_eq!(app.controller().state(), ConnectionState::Disconnected);
    assert_eq!(app.controller().previous(), Some(ConnectionState::Error));
    assert_eq!(factory.state().disposed, 1);
}

#[tokio::test]
async fn rejected_handshake_ends_disconnected() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "set application_id 42");
    run(&mut app, "connect");
    factory.latest_sink().error("Invalid Client ID (4000)");
    app.pump_events();

    assert_eq!(
        app.last_message(),
        Some("Discord RPC error: Invalid Client ID (4000)")
    );
    assert_eq!(app.controller().state(), ConnectionState::Disconnected);
    assert_eq!(app.controller().previous(), Some(ConnectionState::Error));
    assert_eq!(factory.state().disposed, 1);
}

#[tokio::test]
async fn ready_after_disconnect_is_ignored() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "set application_id 42");
    run(&mut app, "connect");
    let stale = factory.latest_sink();
    run(&mut app, "disconnect");

    stale.ready(None);
    app.pump_events();
    assert_eq!(app.controller().state(), ConnectionState::Disconnected);
    assert_eq!(app.last_message(), Some("Disconnected"));
}

#[tokio::test]
async fn only_the_latest_attempt_counts() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "set application_id 42");
    run(&mut app, "connect");
    let first = factory.latest_sink();
    run(&mut app, "disconnect");
    run(&mut app, "connect");
    let second = factory.latest_sink();

    first.connection_failed();
    app.pump_events();
    assert_eq!(app.controller().state(), ConnectionState::Connecting);

    second.ready(None);
    app.pump_events();
    assert_eq!(app.controller().state(), ConnectionState::Connected);
}

#[tokio::test]
async fn application_id_is_locked_while_connected() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "set application_id 42");
    run(&mut app, "connect");
    run(&mut app, "set application_id 43");

    assert_eq!(
        app.last_message(),
        Some("Disconnect before changing the application ID")
    );
    assert_eq!(app.settings().application_id, "42");
}

#[tokio::test]
async fn import_while_connected_republishes() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "set application_id 42");
    run(&mut app, "connect");
    factory.latest_sink().ready(None);
    app.pump_events();

    let preset = dir.path().join("chess.crp");
    fs::write(&preset, r#"{"details": "Playing chess", "state": "Winning"}"#).unwrap();
    app.execute(Command::Import(preset));

    assert_eq!(app.settings().details, "Playing chess");
    assert_eq!(app.settings().application_id, "42");
    let published = factory.state().published.clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].state.as_deref(), Some("Winning"));
}

#[tokio::test]
async fn invalid_preset_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    let preset = dir.path().join("broken.crp");
    fs::write(&preset, "not json").unwrap();
    let before = app.settings().clone();
    app.execute(Command::Import(preset));

    assert!(app.last_message().unwrap().starts_with("Invalid preset file"));
    assert_eq!(app.settings(), &before);
}

#[tokio::test]
async fn preset_from_secondary_launch_is_imported() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    let preset = dir.path().join("handed.crp");
    fs::write(&preset, r#"{"large_image_key": "board"}"#).unwrap();

    let identity = InstanceIdentity::new("CustomRP test", dir.path());
    let Role::Secondary(secondary) = claim(identity).unwrap() else {
        panic!("expected secondary");
    };
    let request = HandoffRequest {
        silent: true,
        preset: Some(preset),
    };
    let task = tokio::spawn(async move { secondary.hand_off(&request).await });
    poll_app_until_done(&mut app, &task).await;

    task.await.unwrap().unwrap();
    assert_eq!(app.settings().large_image_key, "board");
}

#[tokio::test]
async fn status_over_socket_reflects_controller() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let mut app = create_test_app(dir.path(), &factory);

    run(&mut app, "set application_id 42");
    run(&mut app, "connect");

    let socket = InstanceIdentity::new("CustomRP test", dir.path()).socket_path();
    let task = tokio::spawn(async move {
        let mut client = IpcClient::connect(&socket).await.unwrap();
        client.call(&IpcRequest::new("status")).await.unwrap()
    });
    poll_app_until_done(&mut app, &task).await;

    let data = task.await.unwrap().into_result().unwrap();
    assert_eq!(data["state"], "connecting");
    assert_eq!(data["previous"], "disconnected");
    assert_eq!(data["application_id_set"], true);
}
