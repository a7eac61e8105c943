use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the presence connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    UpdatingPresence,
    Connected,
    Error,
}

impl ConnectionState {
    /// Transient states are never recorded as the previous state
    pub fn is_transient(self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::UpdatingPresence => "updating_presence",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current and previous connection state.
///
/// `previous` is `None` only until the first assignment. It always holds the
/// last stable state: assigning out of `Connecting` leaves it untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTracker {
    current: ConnectionState,
    previous: Option<ConnectionState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            current: ConnectionState::Disconnected,
            previous: None,
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    pub fn previous(&self) -> Option<ConnectionState> {
        self.previous
    }

    pub fn set(&mut self, state: ConnectionState) {
        if !self.current.is_transient() {
            self.previous = Some(self.current);
        }
        self.current = state;
    }

    pub fn has_changed(&self) -> bool {
        self.previous != Some(self.current)
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
