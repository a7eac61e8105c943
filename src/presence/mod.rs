// Presence client boundary and the Discord implementation

pub mod client;
pub mod discord;

pub use client::{Presence, PresenceButton, PresenceClient, PresenceClientFactory, PresenceError};
pub use discord::{DiscordClient, DiscordClientFactory};
