use thiserror::Error;
use tokio::sync::mpsc;

use super::events::{ClientEvent, ClientEventKind, EventSink, Generation};
use super::state::{ConnectionState, StateTracker};
use crate::config::Settings;
use crate::presence::{Presence, PresenceClient, PresenceClientFactory};

/// A command the controller refused or could not complete
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("an application ID is required to connect")]
    MissingApplicationId,
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("failed to initialize the presence client")]
    InitializeFailed,
    #[error("presence update failed: {0}")]
    UpdateFailed(String),
}

/// What a client event did to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Stale attempt, or an event with no meaning in the current state
    Ignored,
    Connected { username: Option<String> },
    /// The connection was torn down; `reason` is meant for the user
    Disconnected { reason: String },
}

/// Owns the presence client and is the only place connection state changes.
///
/// Everything runs on the owner's task: client events arrive on the receiver
/// returned by [`ConnectionController::new`] and are fed back through
/// [`ConnectionController::handle_event`].
pub struct ConnectionController {
    tracker: StateTracker,
    factory: Box<dyn PresenceClientFactory>,
    client: Option<Box<dyn PresenceClient>>,
    generation: Generation,
    live: Option<Generation>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    username: Option<String>,
}

impl ConnectionController {
    pub fn new(
        factory: impl PresenceClientFactory + 'static,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller = Self {
            tracker: StateTracker::new(),
            factory: Box::new(factory),
            client: None,
            generation: Generation::first(),
            live: None,
            events_tx,
            username: None,
        };
        (controller, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.tracker.current()
    }

    pub fn previous(&self) -> Option<ConnectionState> {
        self.tracker.previous()
    }

    pub fn has_changed(&self) -> bool {
        self.tracker.has_changed()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// The attempt whose events are currently accepted
    pub fn live_attempt(&self) -> Option<Generation> {
        self.live
    }

    pub fn connect(&mut self, settings: &Settings) -> Result<(), LifecycleError> {
        match self.state() {
            ConnectionState::Connecting => return Err(LifecycleError::AlreadyConnecting),
            ConnectionState::Connected | ConnectionState::UpdatingPresence => {
                return Err(LifecycleError::AlreadyConnected);
            }
            ConnectionState::Disconnected | ConnectionState::Error => {}
        }

        let application_id = settings.application_id.trim();
        if application_id.is_empty() {
            return Err(LifecycleError::MissingApplicationId);
        }

        self.release_client();

        self.generation = self.generation.next();
        self.live = Some(self.generation);
        let sink = EventSink::new(self.generation, self.events_tx.clone());
        let mut client = self.factory.create(application_id, sink);

        self.tracker.set(ConnectionState::Connecting);
        tracing::info!(attempt = self.generation.value(), "Connecting to presence client");

        let started = client.initialize();
        self.client = Some(client);

        if !started {
            self.fail("presence client failed to initialize");
            return Err(LifecycleError::InitializeFailed);
        }
        Ok(())
    }

    pub fn update(&mut self, settings: &Settings) -> Result<(), LifecycleError> {
        if self.state() != ConnectionState::Connected {
            return Err(LifecycleError::NotConnected);
        }
        let Some(client) = self.client.as_mut() else {
            return Err(LifecycleError::NotConnected);
        };

        self.tracker.set(ConnectionState::UpdatingPresence);
        let result = client.set_presence(&Presence::from_settings(settings));

        match result {
            Ok(()) => {
                self.tracker.set(ConnectionState::Connected);
                tracing::info!("Presence updated");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.fail(&message);
                Err(LifecycleError::UpdateFailed(message))
            }
        }
    }

    /// Tear down the client and force `Disconnected`.
    ///
    /// Returns whether a client was actually released. Calling this while
    /// already disconnected still records the assignment.
    pub fn disconnect(&mut self) -> bool {
        self.live = None;
        self.username = None;
        let released = self.release_client();
        self.tracker.set(ConnectionState::Disconnected);
        if released {
            tracing::info!("Disconnected from presence client");
        }
        released
    }

    pub fn handle_event(&mut self, event: ClientEvent) -> EventOutcome {
        if self.live != Some(event.generation) {
            tracing::debug!(
                attempt = event.generation.value(),
                "Ignoring event from a cancelled connection attempt"
            );
            return EventOutcome::Ignored;
        }

        let state = self.state();
        let active = matches!(
            state,
            ConnectionState::Connecting | ConnectionState::Connected
        );

        match event.kind {
            ClientEventKind::Ready { username } if state == ConnectionState::Connecting => {
                self.username = username.clone();
                self.tracker.set(ConnectionState::Connected);
                tracing::info!("Presence client ready");
                EventOutcome::Connected { username }
            }
            ClientEventKind::Error { message } if active => {
                self.fail(&message);
                EventOutcome::Disconnected {
                    reason: format!("Discord RPC error: {}", message),
                }
            }
            ClientEventKind::ConnectionFailed if active => {
                self.fail("connection failed");
                EventOutcome::Disconnected {
                    reason: "Failed to connect to Discord. Make sure Discord is running."
                        .to_string(),
                }
            }
            kind => {
                tracing::debug!(?kind, %state, "Ignoring client event");
                EventOutcome::Ignored
            }
        }
    }

    fn fail(&mut self, reason: &str) {
        tracing::warn!("Presence connection error: {}", reason);
        self.tracker.set(ConnectionState::Error);
        self.disconnect();
    }

    fn release_client(&mut self) -> bool {
        match self.client.take() {
            Some(mut client) => {
                client.dispose();
                true
            }
            None => false,
        }
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        self.release_client();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        live: AtomicUsize,
        published: AtomicUsize,
        fail_publish: AtomicBool,
        fail_initialize: AtomicBool,
    }

    struct FakeClient {
        counters: Arc<Counters>,
        disposed: bool,
    }

    impl PresenceClient for FakeClient {
        fn initialize(&mut self) -> bool {
            !self.counters.fail_initialize.load(Ordering::SeqCst)
        }

        fn set_presence(&mut self, _presence: &Presence) -> Result<(), PresenceError> {
            if self.counters.fail_publish.load(Ordering::SeqCst) {
                return Err(PresenceError::Publish("pipe closed".to_string()));
            }
            self.counters.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn dispose(&mut self) {
            if !self.disposed {
                self.disposed = true;
                self.counters.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    struct FakeFactory(Arc<Counters>);

    impl PresenceClientFactory for FakeFactory {
        fn create(&self, _application_id: &str, _events: EventSink) -> Box<dyn PresenceClient> {
            self.0.created.fetch_add(1, Ordering::SeqCst);
            self.0.live.fetch_add(1, Ordering::SeqCst);
            Box::new(FakeClient {
                counters: Arc::clone(&self.0),
                disposed: false,
            })
        }
    }

    fn controller() -> (
        ConnectionController,
        mpsc::UnboundedReceiver<ClientEvent>,
        Arc<Counters>,
    ) {
        let counters = Arc::new(Counters::default());
        let (controller, rx) = ConnectionController::new(FakeFactory(Arc::clone(&counters)));
        (controller, rx, counters)
    }

    fn settings() -> Settings {
        Settings {
            application_id: "1234567890".to_string(),
            details: "Testing".to_string(),
            ..Settings::default()
        }
    }

    fn ready(generation: Generation) -> ClientEvent {
        ClientEvent {
            generation,
            kind: ClientEventKind::Ready {
                username: Some("alice".to_string()),
            },
        }
    }

    fn connected() -> (ConnectionController, Arc<Counters>) {
        let (mut c, _rx, counters) = controller();
        c.connect(&settings()).unwrap();
        let attempt = c.live_attempt().unwrap();
        c.handle_event(ready(attempt));
        (c, counters)
    }

    #[test]
    fn starts_disconnected() {
        let (c, _rx, _) = controller();
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(c.previous(), None);
        assert!(!c.has_client());
    }

    #[test]
    fn connect_enters_connecting() {
        let (mut c, _rx, counters) = controller();
        c.connect(&settings()).unwrap();
        assert_eq!(c.state(), ConnectionState::Connecting);
        assert_eq!(c.previous(), Some(ConnectionState::Disconnected));
        assert_eq!(counters.live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connect_requires_application_id() {
        let (mut c, _rx, counters) = controller();
        let err = c.connect(&Settings::default()).unwrap_err();
        assert_eq!(err, LifecycleError::MissingApplicationId);
        assert_eq!(counters.created.load(Ordering::SeqCst), 0);
        assert_eq!(c.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn ready_moves_to_connected() {
        let (mut c, _rx, _) = controller();
        c.connect(&settings()).unwrap();
        let outcome = c.handle_event(ready(c.live_attempt().unwrap()));
        assert_eq!(
            outcome,
            EventOutcome::Connected {
                username: Some("alice".to_string())
            }
        );
        assert_eq!(c.state(), ConnectionState::Connected);
        assert_eq!(c.previous(), Some(ConnectionState::Disconnected));
        assert_eq!(c.username(), Some("alice"));
    }

    #[test]
    fn connect_while_connecting_is_rejected() {
        let (mut c, _rx, counters) = controller();
        c.connect(&settings()).unwrap();
        assert_eq!(c.connect(&settings()), Err(LifecycleError::AlreadyConnecting));
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(counters.live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connect_while_connected_is_rejected() {
        let (mut c, counters) = connected();
        let before = (c.state(), c.previous());
        assert_eq!(c.connect(&settings()), Err(LifecycleError::AlreadyConnected));
        assert_eq!((c.state(), c.previous()), before);
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn initialize_failure_ends_disconnected() {
        let (mut c, _rx, counters) = controller();
        counters.fail_initialize.store(true, Ordering::SeqCst);
        assert_eq!(c.connect(&settings()), Err(LifecycleError::InitializeFailed));
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(c.previous(), Some(ConnectionState::Error));
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn update_requires_connected() {
        let (mut c, _rx, counters) = controller();
        c.connect(&settings()).unwrap();
        let before = (c.state(), c.previous());
        assert_eq!(c.update(&settings()), Err(LifecycleError::NotConnected));
        assert_eq!((c.state(), c.previous()), before);
        assert_eq!(counters.published.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn update_publishes_and_returns_to_connected() {
        let (mut c, counters) = connected();
        c.update(&settings()).unwrap();
        assert_eq!(c.state(), ConnectionState::Connected);
        assert_eq!(c.previous(), Some(ConnectionState::UpdatingPresence));
        assert_eq!(counters.published.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_failure_disconnects() {
        let (mut c, counters) = connected();
        counters.fail_publish.store(true, Ordering::SeqCst);
        let err = c.update(&settings()).unwrap_err();
        assert!(matches!(err, LifecycleError::UpdateFailed(ref m) if m.contains("pipe closed")));
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn error_event_while_connected_disconnects() {
        let (mut c, counters) = connected();
        let outcome = c.handle_event(ClientEvent {
            generation: c.live_attempt().unwrap(),
            kind: ClientEventKind::Error {
                message: "pipe broken".to_string(),
            },
        });
        assert!(matches!(outcome, EventOutcome::Disconnected { ref reason } if reason.contains("pipe broken")));
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(c.previous(), Some(ConnectionState::Error));
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn connection_failed_while_connecting_disconnects() {
        let (mut c, _rx, _) = controller();
        c.connect(&settings()).unwrap();
        let outcome = c.handle_event(ClientEvent {
            generation: c.live_attempt().unwrap(),
            kind: ClientEventKind::ConnectionFailed,
        });
        assert!(matches!(outcome, EventOutcome::Disconnected { .. }));
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert!(!c.has_client());
    }

    #[test]
    fn disconnect_when_disconnected_is_a_no_op() {
        let (mut c, _rx, _) = controller();
        assert!(!c.disconnect());
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert!(!c.has_changed());
    }

    #[test]
    fn disconnect_releases_client() {
        let (mut c, counters) = connected();
        assert!(c.disconnect());
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert!(c.has_changed());
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disconnect_while_connecting_keeps_previous_stable_state() {
        let (mut c, _rx, _) = controller();
        c.connect(&settings()).unwrap();
        c.disconnect();
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(c.previous(), Some(ConnectionState::Disconnected));
    }

    #[test]
    fn stale_ready_after_disconnect_is_ignored() {
        let (mut c, _rx, _) = controller();
        c.connect(&settings()).unwrap();
        let cancelled = c.live_attempt().unwrap();
        c.disconnect();

        assert_eq!(c.handle_event(ready(cancelled)), EventOutcome::Ignored);
        assert_eq!(c.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn events_from_an_older_attempt_are_ignored() {
        let (mut c, _rx, counters) = controller();
        c.connect(&settings()).unwrap();
        let first = c.live_attempt().unwrap();
        c.disconnect();
        c.connect(&settings()).unwrap();

        let outcome = c.handle_event(ClientEvent {
            generation: first,
            kind: ClientEventKind::ConnectionFailed,
        });
        assert_eq!(outcome, EventOutcome::Ignored);
        assert_eq!(c.state(), ConnectionState::Connecting);
        assert_eq!(counters.live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_ready_is_ignored() {
        let (mut c, _) = connected();
        let outcome = c.handle_event(ready(c.live_attempt().unwrap()));
        assert_eq!(outcome, EventOutcome::Ignored);
        assert_eq!(c.state(), ConnectionState::Connected);
    }

    #[test]
    fn reconnect_keeps_one_live_client() {
        let (mut c, counters) = connected();
        c.disconnect();
        c.connect(&settings()).unwrap();
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
        assert_eq!(counters.live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_controller_disposes_client() {
        let (c, counters) = connected();
        drop(c);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }
}
