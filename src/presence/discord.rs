//! Discord Rich Presence over the local Discord IPC socket

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use discord_rich_presence::{activity, DiscordIpc, DiscordIpcClient};
use serde_json::{Value, json};

use super::client::{Presence, PresenceClient, PresenceClientFactory, PresenceError};
use crate::connection::events::EventSink;

type SharedIpc = Arc<Mutex<Option<DiscordIpcClient>>>;

const OP_HANDSHAKE: u8 = 0;
const OP_FRAME: u32 = 1;

/// Discord's answer to the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    Ready { username: Option<String> },
    Rejected(String),
}

/// Classify the first reply after the handshake.
///
/// Only a `READY` dispatch frame counts as accepted. Discord answers an
/// unknown application id with a close frame carrying a code and message.
pub fn read_handshake(opcode: u32, reply: &Value) -> Handshake {
    if opcode == OP_FRAME && reply["evt"] == "READY" {
        let username = reply["data"]["user"]["username"]
            .as_str()
            .map(str::to_string);
        return Handshake::Ready { username };
    }

    let body = if reply.get("message").is_some() {
        reply
    } else {
        &reply["data"]
    };
    let message = body["message"].as_str().unwrap_or("handshake rejected");
    match body["code"].as_i64() {
        Some(code) => Handshake::Rejected(format!("{} ({})", message, code)),
        None => Handshake::Rejected(message.to_string()),
    }
}

// Errors from the crate are not Send, so they are flattened to strings here
fn handshake(client: &mut DiscordIpcClient) -> Result<Handshake, String> {
    client.connect_ipc().map_err(|e| e.to_string())?;
    let hello = json!({ "v": 1, "client_id": client.client_id });
    client
        .send(hello, OP_HANDSHAKE)
        .map_err(|e| e.to_string())?;
    let (opcode, reply) = client.recv().map_err(|e| e.to_string())?;
    Ok(read_handshake(opcode, &reply))
}

/// One connection to the local Discord client.
///
/// The handshake blocks, so it runs on a short-lived thread. That thread
/// installs the connected client and reports `ready`, reports `error` when
/// Discord rejects the handshake, or reports `connection_failed`.
/// `dispose` waits for it, so no two sockets of one client overlap.
pub struct DiscordClient {
    application_id: String,
    events: EventSink,
    ipc: SharedIpc,
    disposed: Arc<AtomicBool>,
    connector: Option<JoinHandle<()>>,
}

impl DiscordClient {
    pub fn new(application_id: impl Into<String>, events: EventSink) -> Self {
        Self {
            application_id: application_id.into(),
            events,
            ipc: Arc::new(Mutex::new(None)),
            disposed: Arc::new(AtomicBool::new(false)),
            connector: None,
        }
    }
}

/// Discord application ids are numeric snowflakes
pub fn is_valid_application_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 20 && id.bytes().all(|b| b.is_ascii_digit())
}

fn lock(ipc: &SharedIpc) -> MutexGuard<'_, Option<DiscordIpcClient>> {
    ipc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PresenceClient for DiscordClient {
    fn initialize(&mut self) -> bool {
        if self.connector.is_some() || self.disposed.load(Ordering::SeqCst) {
            return false;
        }
        if !is_valid_application_id(&self.application_id) {
            tracing::warn!("Application ID must be a numeric Discord snowflake");
            return false;
        }

        let mut client = match DiscordIpcClient::new(&self.application_id) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Failed to create Discord IPC client: {}", e);
                return false;
            }
        };

        let shared = Arc::clone(&self.ipc);
        let disposed = Arc::clone(&self.disposed);
        let events = self.events.clone();
        let generation = events.generation().value();

        let spawned = thread::Builder::new()
            .name(format!("discord-connect-{}", generation))
            .spawn(move || {
                tracing::info!("Discord connecting...");
                match handshake(&mut client) {
                    Ok(Handshake::Ready { username }) => {
                        let mut slot = lock(&shared);
                        if disposed.load(Ordering::SeqCst) {
                            let _ = client.close();
                            return;
                        }
                        *slot = Some(client);
                        drop(slot);
                        tracing::info!("Discord Rich Presence connected");
                        events.ready(username);
                    }
                    Ok(Handshake::Rejected(reason)) => {
                        let _ = client.close();
                        tracing::warn!("Discord rejected the handshake: {}", reason);
                        events.error(reason);
                    }
                    Err(e) => {
                        tracing::warn!("Discord not available: {}", e);
                        events.connection_failed();
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                self.connector = Some(handle);
                true
            }
            Err(e) => {
                tracing::error!("Failed to spawn Discord connect thread: {}", e);
                false
            }
        }
    }

    fn set_presence(&mut self, presence: &Presence) -> Result<(), PresenceError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(PresenceError::Disposed);
        }
        let mut slot = lock(&self.ipc);
        let client = slot.as_mut().ok_or(PresenceError::NotReady)?;

        let mut assets = activity::Assets::new();
        if let Some(key) = presence.large_image.as_deref() {
            assets = assets.large_image(key);
        }
        if let Some(text) = presence.large_text.as_deref() {
            assets = assets.large_text(text);
        }
        if let Some(key) = presence.small_image.as_deref() {
            assets = assets.small_image(key);
        }
        if let Some(text) = presence.small_text.as_deref() {
            assets = assets.small_text(text);
        }

        let mut payload = activity::Activity::new().assets(assets);
        if let Some(details) = presence.details.as_deref() {
            payload = payload.details(details);
        }
        if let Some(state) = presence.state.as_deref() {
            payload = payload.state(state);
        }
        if !presence.buttons.is_empty() {
            let buttons = presence
                .buttons
                .iter()
                .map(|b| activity::Button::new(&b.label, &b.url))
                .collect();
            payload = payload.buttons(buttons);
        }

        client
            .set_activity(payload)
            .map_err(|e| PresenceError::Publish(e.to_string()))
    }

    fn dispose(&mut self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut client) = lock(&self.ipc).take() {
            if let Err(e) = client.clear_activity() {
                tracing::debug!("Failed to clear Discord activity: {}", e);
            }
            if let Err(e) = client.close() {
                tracing::debug!("Failed to close Discord connection: {}", e);
            }
            tracing::info!("Discord Rich Presence disconnected");
        }
        // A handshake in flight sees `disposed` and closes its own socket
        if let Some(connector) = self.connector.take() {
            if connector.join().is_err() {
                tracing::warn!("Discord connect thread panicked");
            }
        }
    }
}

impl Drop for DiscordClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Creates `DiscordClient`s for the connection controller
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscordClientFactory;

impl PresenceClientFactory for DiscordClientFactory {
    fn create(&self, application_id: &str, events: EventSink) -> Box<dyn PresenceClient> {
        Box::new(DiscordClient::new(application_id, events))
    }
}
