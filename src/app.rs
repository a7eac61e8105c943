//! The primary's owner loop.
//!
//! One task owns the settings, the connection controller and the notification
//! socket. Console lines, client events and socket polls are all handled here,
//! one at a time, so no state is shared across threads.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::command::{CONSOLE_HELP, Command, parse_command};
use crate::config::{Preset, Settings, SettingsStore};
use crate::connection::{
    ClientEvent, ConnectionController, ConnectionState, EventOutcome, LifecycleError,
};
use crate::instance::PrimaryInstance;
use crate::ipc::{IpcAction, IpcCommandHandler, StateSnapshot};
use crate::presence::PresenceClientFactory;

const IPC_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    primary: PrimaryInstance,
    handler: IpcCommandHandler,
    controller: ConnectionController,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    store: SettingsStore,
    settings: Settings,
    last_message: Option<String>,
}

impl App {
    pub fn new(
        primary: PrimaryInstance,
        store: SettingsStore,
        factory: impl PresenceClientFactory + 'static,
    ) -> Self {
        let settings = store.load();
        let handler = IpcCommandHandler::new(env!("CARGO_PKG_VERSION"), primary.identity().clone());
        let (controller, events) = ConnectionController::new(factory);
        Self {
            primary,
            handler,
            controller,
            events,
            store,
            settings,
            last_message: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }

    /// Most recent line shown to the user
    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            instance: self.primary.identity().name().to_string(),
            state: self.controller.state(),
            previous: self.controller.previous(),
            username: self.controller.username().map(str::to_string),
            application_id_set: !self.settings.application_id.trim().is_empty(),
            minimize_to_tray: self.settings.minimize_to_tray,
        }
    }

    /// Run until `quit` or Ctrl-C, then shut down in order.
    /// Closed console input is not a reason to stop.
    pub async fn run<R>(mut self, input: R) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;
        let mut ipc_tick = tokio::time::interval(IPC_POLL_INTERVAL);
        ipc_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if !self.settings.start_minimized {
            self.show();
        }

        loop {
            tokio::select! {
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => {
                        if self.execute(parse_command(&line)) == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Console input closed");
                        input_open = false;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read console input: {}", e);
                        input_open = false;
                    }
                },
                Some(event) = self.events.recv() => self.apply_event(event),
                _ = ipc_tick.tick() => self.poll_ipc().await,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    pub fn execute(&mut self, command: Command) -> Flow {
        match command {
            Command::Connect => self.connect(),
            Command::Update => self.update(),
            Command::Disconnect => {
                self.controller.disconnect();
                self.say("Disconnected");
            }
            Command::Status => self.print_status(),
            Command::Show => self.show(),
            Command::Settings => match toml::to_string_pretty(&self.settings) {
                Ok(text) => self.say(text.trim_end().to_string()),
                Err(e) => self.say(format!("Cannot display settings: {}", e)),
            },
            Command::Import(path) => self.import_preset(&path),
            Command::Set { field, value } => self.set_field(&field, &value),
            Command::Help => self.say(CONSOLE_HELP),
            Command::Quit => return Flow::Quit,
            Command::Unknown(message) => self.say(message),
        }
        Flow::Continue
    }

    /// Feed every queued client event through the controller
    pub fn pump_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
            handled += 1;
        }
        handled
    }

    pub fn apply_event(&mut self, event: ClientEvent) {
        match self.controller.handle_event(event) {
            EventOutcome::Ignored => {}
            EventOutcome::Connected { username } => match username {
                Some(name) => self.say(format!("Connected as {}", name)),
                None => self.say("Connected"),
            },
            EventOutcome::Disconnected { reason } => self.say(reason),
        }
    }

    /// Accept, answer and act on pending notifications
    pub async fn poll_ipc(&mut self) {
        if let Err(e) = self.primary.server_mut().accept_pending() {
            tracing::warn!("Failed to accept notification connection: {}", e);
        }
        let requests = match self.primary.server_mut().poll_commands() {
            Ok(requests) => requests,
            Err(e) => {
                tracing::warn!("Failed to read notifications: {}", e);
                return;
            }
        };

        for (conn_id, request) in requests {
            let snapshot = self.snapshot();
            let result = self.handler.handle(&request, Some(&snapshot));
            if let Err(e) = self
                .primary
                .server_mut()
                .send_response(conn_id, result.response)
                .await
            {
                tracing::debug!("Failed to answer '{}': {}", request.command, e);
            }
            for action in result.actions {
                self.apply_action(action);
            }
        }
    }

    pub fn apply_action(&mut self, action: IpcAction) {
        match action {
            IpcAction::ShowWindow => self.show(),
            IpcAction::ImportHandoff => match self.primary.read_handoff() {
                Ok(path) => self.import_preset(&path),
                Err(e) => self.say(format!("Invalid preset file: {}", e)),
            },
        }
    }

    /// Merge a preset into the settings, save, and republish if connected
    pub fn import_preset(&mut self, path: &Path) {
        let preset = match Preset::from_file(path) {
            Ok(preset) => preset,
            Err(e) => {
                tracing::warn!("Preset import failed: {:#}", e);
                self.say(format!("Invalid preset file: {:#}", e));
                return;
            }
        };

        let old_id = self.settings.application_id.clone();
        preset.apply_to(&mut self.settings);
        self.save();
        tracing::info!("Imported preset {}", path.display());

        if self.controller.state() == ConnectionState::Connected {
            if self.settings.application_id != old_id {
                self.say("Imported preset; reconnect to use its application ID");
                return;
            }
            match self.controller.update(&self.settings) {
                Ok(()) => self.say(format!("Imported preset {} and updated presence", path.display())),
                Err(e) => self.say(format!("Imported preset, but {}", e)),
            }
        } else {
            self.say(format!("Imported preset {}", path.display()));
        }
    }

    fn connect(&mut self) {
        match self.controller.connect(&self.settings) {
            Ok(()) => self.say("Connecting to Discord..."),
            Err(LifecycleError::MissingApplicationId) => {
                self.say("Set an application ID first: set application_id <id>")
            }
            Err(LifecycleError::InitializeFailed) => {
                self.say("Failed to connect to Discord. Check the application ID.")
            }
            Err(e) => self.say(format!("Cannot connect: {}", e)),
        }
    }

    fn update(&mut self) {
        match self.controller.update(&self.settings) {
            Ok(()) => self.say("Presence updated"),
            Err(LifecycleError::NotConnected) => self.say("Connect first"),
            Err(e) => self.say(e.to_string()),
        }
    }

    fn set_field(&mut self, field: &str, value: &str) {
        let busy = !matches!(
            self.controller.state(),
            ConnectionState::Disconnected | ConnectionState::Error
        );
        if field == "application_id" && busy {
            self.say("Disconnect before changing the application ID");
            return;
        }
        match self.settings.set_field(field, value) {
            Ok(()) => {
                if self.save() {
                    self.say(format!("{} saved", field));
                }
            }
            Err(e) => self.say(e.to_string()),
        }
    }

    fn save(&mut self) -> bool {
        let saved = self.store.save(&self.settings);
        if !saved {
            self.say(format!(
                "Could not save settings to {}",
                self.store.path().display()
            ));
        }
        saved
    }

    fn show(&mut self) {
        let header = format!(
            "{} {}, {}. Type `help` for commands.",
            self.primary.identity().name(),
            env!("CARGO_PKG_VERSION"),
            self.describe_state()
        );
        self.say(header);
    }

    fn print_status(&mut self) {
        let previous = self
            .controller
            .previous()
            .map_or("none", ConnectionState::as_str);
        let id = match self.settings.application_id.trim() {
            "" => "not set",
            id => id,
        };
        self.say(format!(
            "State: {} (previous: {})\nApplication ID: {}",
            self.describe_state(),
            previous,
            id
        ));
    }

    fn describe_state(&self) -> String {
        match (self.controller.state(), self.controller.username()) {
            (ConnectionState::Connected, Some(name)) => format!("connected as {}", name),
            (state, _) => state.to_string(),
        }
    }

    fn say(&mut self, message: impl Into<String>) {
        let message = message.into();
        println!("{}", message);
        self.last_message = Some(message);
    }

    /// Save, drop the connection, then give up the socket and the lock
    fn shutdown(mut self) {
        self.store.save(&self.settings);
        self.controller.disconnect();
        let App { primary, .. } = self;
        drop(primary);
        tracing::info!("Shut down");
    }
}
