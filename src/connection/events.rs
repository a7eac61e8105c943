use tokio::sync::mpsc;

/// Identifies one connect attempt. Events from other attempts are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    pub(crate) fn first() -> Self {
        Self(0)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Signals raised by a presence client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEventKind {
    Ready { username: Option<String> },
    Error { message: String },
    ConnectionFailed,
}

/// A client signal stamped with the attempt that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ClientEvent {
    pub generation: Generation,
    pub kind: ClientEventKind,
}

/// Handed to a presence client so it can report back to the owner loop.
///
/// Sends never block and never fail loudly: once the owner loop is gone
/// nobody is listening anyway.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: Generation,
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl EventSink {
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn ready(&self, username: Option<String>) {
        self.send(ClientEventKind::Ready { username });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(ClientEventKind::Error {
            message: message.into(),
        });
    }

    pub fn connection_failed(&self) {
        self.send(ClientEventKind::ConnectionFailed);
    }

    fn send(&self, kind: ClientEventKind) {
        let event = ClientEvent {
            generation: self.generation,
            kind,
        };
        if self.tx.send(event).is_err() {
            tracing::debug!("Dropping client event, owner loop has shut down");
        }
    }
}
