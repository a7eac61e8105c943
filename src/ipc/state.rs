// Read-only view of the primary handed to the IPC handler for "status"

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Identity name, e.g. "CustomRP 2"
    pub instance: String,

    pub state: ConnectionState,

    /// Last stable state before `state`; absent until the first transition
    pub previous: Option<ConnectionState>,

    /// Reported by the chat client once connected
    pub username: Option<String>,

    pub application_id_set: bool,

    pub minimize_to_tray: bool,
}
