#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use customrp::app::App;
use customrp::config::SettingsStore;
use customrp::connection::EventSink;
use customrp::instance::{self, InstanceIdentity, PrimaryInstance, Role, SecondaryInstance};
use customrp::ipc::{IpcAction, IpcCommandHandler};
use customrp::presence::{Presence, PresenceClient, PresenceClientFactory, PresenceError};
use tokio::task::JoinHandle;

/// What the fake presence clients have seen, shared with the test
#[derive(Default)]
pub struct FakeState {
    pub created: usize,
    pub disposed: usize,
    pub application_ids: Vec<String>,
    pub published: Vec<Presence>,
    pub sinks: Vec<EventSink>,
    pub fail_initialize: bool,
    pub fail_publish: bool,
}

#[derive(Clone, Default)]
pub struct FakeFactory(Arc<Mutex<FakeState>>);

impl FakeFactory {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.0.lock().unwrap()
    }

    /// Sink handed to the most recent client
    pub fn latest_sink(&self) -> EventSink {
        self.state().sinks.last().cloned().expect("no client created")
    }
}

impl PresenceClientFactory for FakeFactory {
    fn create(&self, application_id: &str, events: EventSink) -> Box<dyn PresenceClient> {
        let mut state = self.state();
        state.created += 1;
        state.application_ids.push(application_id.to_string());
        state.sinks.push(events);
        Box::new(FakeClient {
            state: Arc::clone(&self.0),
            disposed: false,
        })
    }
}

struct FakeClient {
    state: Arc<Mutex<FakeState>>,
    disposed: bool,
}

impl PresenceClient for FakeClient {
    fn initialize(&mut self) -> bool {
        !self.state.lock().unwrap().fail_initialize
    }

    fn set_presence(&mut self, presence: &Presence) -> Result<(), PresenceError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_publish {
            return Err(PresenceError::Publish("pipe closed".to_string()));
        }
        state.published.push(presence.clone());
        Ok(())
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.state.lock().unwrap().disposed += 1;
        }
    }
}

pub fn identity(dir: &Path, name: &str) -> InstanceIdentity {
    InstanceIdentity::new(name, dir)
}

pub fn claim_primary(identity: &InstanceIdentity) -> PrimaryInstance {
    match instance::claim(identity.clone()).unwrap() {
        Role::Primary(primary) => primary,
        Role::Secondary(_) => panic!("expected to become primary"),
    }
}

pub fn claim_secondary(identity: &InstanceIdentity) -> SecondaryInstance {
    match instance::claim(identity.clone()).unwrap() {
        Role::Secondary(secondary) => secondary,
        Role::Primary(_) => panic!("expected to become secondary"),
    }
}

/// App on a fresh primary with settings stored under `dir`
pub fn create_test_app(dir: &Path, factory: &FakeFactory) -> App {
    let primary = claim_primary(&identity(dir, "CustomRP test"));
    let store = SettingsStore::new(dir.join("settings.toml"));
    App::new(primary, store, factory.clone())
}

/// Answer notifications the way the owner loop does until `task` finishes,
/// then drain once more. Returns the actions the handler produced.
pub async fn serve_until_done<T>(
    primary: &mut PrimaryInstance,
    handler: &IpcCommandHandler,
    task: &JoinHandle<T>,
) -> Vec<IpcAction> {
    let mut actions = Vec::new();
    loop {
        let done = task.is_finished();
        primary.server_mut().accept_pending().unwrap();
        for (conn_id, request) in primary.server_mut().poll_commands().unwrap() {
            let result = handler.handle(&request, None);
            let _ = primary.server_mut().send_response(conn_id, result.response).await;
            actions.extend(result.actions);
        }
        if done {
            return actions;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Run the app's socket polling until `task` finishes
pub async fn poll_app_until_done<T>(app: &mut App, task: &JoinHandle<T>) {
    loop {
        let done = task.is_finished();
        app.poll_ipc().await;
        if done {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
