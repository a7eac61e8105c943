//! Single-instance coordination.
//!
//! The first launch of an identity takes the lock and becomes the primary: it
//! binds the notification socket and owns the presence connection. Later
//! launches become secondaries, pass their request on and exit.

pub mod handoff;
pub mod identity;
pub mod lock;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::ipc::{IpcClient, IpcRequest, IpcServer};

pub use handoff::{HandoffError, read_handoff, write_handoff};
pub use identity::{InstanceIdentity, Notification};
pub use lock::{InstanceLock, LockError};

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_DELAY: Duration = Duration::from_millis(100);
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("failed to bind notification socket '{}': {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("the running '{name}' instance is not answering: {source}")]
    Unreachable {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("the running instance refused '{message}': {reason}")]
    Rejected { message: String, reason: String },
    #[error("Invalid preset file: {0}")]
    Handoff(#[from] HandoffError),
}

/// Outcome of the startup race for an identity
pub enum Role {
    Primary(PrimaryInstance),
    Secondary(SecondaryInstance),
}

/// Try to become the primary for `identity`.
///
/// Must run inside a tokio runtime since the primary binds its socket here.
pub fn claim(identity: InstanceIdentity) -> Result<Role, StartupError> {
    let Some(lock) = InstanceLock::try_acquire(&identity.lock_path())? else {
        tracing::info!("'{}' is already running", identity.name());
        return Ok(Role::Secondary(SecondaryInstance { identity }));
    };

    let socket_path = identity.socket_path();
    let server = IpcServer::new(&socket_path).map_err(|source| StartupError::Bind {
        path: socket_path,
        source,
    })?;
    tracing::info!("Running as primary '{}'", identity.name());

    Ok(Role::Primary(PrimaryInstance {
        identity,
        server,
        _lock: lock,
    }))
}

/// The process that owns the identity.
///
/// Dropping it removes the socket and then releases the lock, so a launch
/// that wins the lock afterwards never finds a live socket of ours.
pub struct PrimaryInstance {
    identity: InstanceIdentity,
    server: IpcServer,
    _lock: InstanceLock,
}

impl PrimaryInstance {
    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn server_mut(&mut self) -> &mut IpcServer {
        &mut self.server
    }

    /// Preset path left by the most recent secondary
    pub fn read_handoff(&self) -> Result<PathBuf, HandoffError> {
        read_handoff(&self.identity.handoff_path())
    }
}

/// What a secondary asks of the primary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffRequest {
    /// Skip bringing the primary to the front
    pub silent: bool,
    pub preset: Option<PathBuf>,
}

pub struct SecondaryInstance {
    identity: InstanceIdentity,
}

impl SecondaryInstance {
    /// Deliver `request` to the primary and return the notifications it accepted.
    ///
    /// The handoff file is written before the import notification goes out.
    /// If it cannot be written, no import notification is sent.
    pub async fn hand_off(&self, request: &HandoffRequest) -> Result<Vec<Notification>, NotifyError> {
        let mut client = IpcClient::connect_with_retry(
            self.identity.socket_path(),
            CONNECT_ATTEMPTS,
            CONNECT_DELAY,
        )
        .await
        .map_err(|source| self.unreachable(source))?;

        let mut delivered = Vec::new();
        if !request.silent {
            self.notify(&mut client, Notification::ShowFirstInstance)
                .await?;
            delivered.push(Notification::ShowFirstInstance);
        }

        if let Some(preset) = &request.preset {
            write_handoff(&self.identity.handoff_path(), preset)?;
            self.notify(&mut client, Notification::ImportPreset).await?;
            delivered.push(Notification::ImportPreset);
        }

        Ok(delivered)
    }

    async fn notify(
        &self,
        client: &mut IpcClient,
        notification: Notification,
    ) -> Result<(), NotifyError> {
        let request = IpcRequest::notification(&self.identity, notification);
        let response = client
            .call_with_timeout(&request, NOTIFY_TIMEOUT)
            .await
            .map_err(|source| self.unreachable(source))?;
        response
            .into_result()
            .map(|_| ())
            .map_err(|reason| NotifyError::Rejected {
                message: request.command,
                reason,
            })
    }

    fn unreachable(&self, source: io::Error) -> NotifyError {
        NotifyError::Unreachable {
            name: self.identity.name().to_string(),
            source,
        }
    }
}
