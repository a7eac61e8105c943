use serde_json::json;

use super::action::{IpcAction, IpcHandlerResult};
use super::protocol::{IpcRequest, IpcResponse};
use super::state::StateSnapshot;
use crate::instance::{InstanceIdentity, Notification};

/// Answers requests arriving on the primary's socket.
///
/// Notifications are matched against this primary's identity, so a message
/// tagged for another identity is refused rather than acted on.
pub struct IpcCommandHandler {
    version: String,
    identity: InstanceIdentity,
}

impl IpcCommandHandler {
    pub fn new(version: impl Into<String>, identity: InstanceIdentity) -> Self {
        Self {
            version: version.into(),
            identity,
        }
    }

    pub fn handle(&self, request: &IpcRequest, state: Option<&StateSnapshot>) -> IpcHandlerResult {
        if let Some(notification) = self.identity.parse_message(&request.command) {
            let action = match notification {
                Notification::ShowFirstInstance => IpcAction::ShowWindow,
                Notification::ImportPreset => IpcAction::ImportHandoff,
            };
            return IpcHandlerResult::with_action(IpcResponse::ok_empty(), action);
        }

        match request.command.as_str() {
            "ping" => IpcHandlerResult::response_only(IpcResponse::ok(json!({"pong": true}))),
            "status" => IpcHandlerResult::response_only(self.handle_status(state)),
            "help" => IpcHandlerResult::response_only(self.handle_help()),
            other if other.contains('|') => {
                tracing::warn!("Ignoring notification meant for another instance: {}", other);
                IpcHandlerResult::response_only(IpcResponse::err(format!(
                    "notification is not addressed to '{}'",
                    self.identity.name()
                )))
            }
            other => IpcHandlerResult::response_only(IpcResponse::err(format!(
                "unknown command: {}",
                other
            ))),
        }
    }

    fn handle_status(&self, state: Option<&StateSnapshot>) -> IpcResponse {
        match state {
            Some(snapshot) => IpcResponse::ok(json!({
                "version": self.version,
                "instance": snapshot.instance,
                "state": snapshot.state,
                "previous": snapshot.previous,
                "username": snapshot.username,
                "application_id_set": snapshot.application_id_set,
                "minimize_to_tray": snapshot.minimize_to_tray,
            })),
            None => IpcResponse::ok(json!({
                "version": self.version,
                "instance": self.identity.name(),
            })),
        }
    }

    fn handle_help(&self) -> IpcResponse {
        IpcResponse::ok(json!({
            "commands": [
                {"name": "ping", "description": "Check that the primary is alive"},
                {"name": "status", "description": "Connection state and instance details"},
                {
                    "name": self.identity.message_name(Notification::ShowFirstInstance),
                    "description": "Bring the primary to the front"
                },
                {
                    "name": self.identity.message_name(Notification::ImportPreset),
                    "description": "Import the preset named in the handoff file"
                },
            ]
        }))
    }
}
