// Notification channel between launches of the same identity.
// Newline-delimited JSON over a per-identity Unix socket owned by the primary.

pub mod action;
pub mod client;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod state;

pub use action::{IpcAction, IpcHandlerResult};
pub use client::IpcClient;
pub use handler::IpcCommandHandler;
pub use protocol::{IpcRequest, IpcResponse};
pub use server::{ConnectionId, IpcServer};
pub use state::StateSnapshot;
