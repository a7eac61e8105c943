use thiserror::Error;

use crate::config::{LinkButton, Settings};
use crate::connection::events::EventSink;

/// Minimum length the chat client accepts for text fields and button labels
const MIN_TEXT_LEN: usize = 2;
const MAX_BUTTONS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceButton {
    pub label: String,
    pub url: String,
}

/// Payload published to the chat client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presence {
    pub details: Option<String>,
    pub state: Option<String>,
    pub large_image: Option<String>,
    pub large_text: Option<String>,
    pub small_image: Option<String>,
    pub small_text: Option<String>,
    pub buttons: Vec<PresenceButton>,
}

impl Presence {
    pub fn from_settings(settings: &Settings) -> Self {
        let buttons = [&settings.button1, &settings.button2]
            .into_iter()
            .filter_map(to_button)
            .take(MAX_BUTTONS)
            .collect();

        Self {
            details: long_enough(&settings.details),
            state: long_enough(&settings.state),
            large_image: not_blank(&settings.large_image_key),
            large_text: not_blank(&settings.large_image_text),
            small_image: not_blank(&settings.small_image_key),
            small_text: not_blank(&settings.small_image_text),
            buttons,
        }
    }
}

fn long_enough(text: &str) -> Option<String> {
    (text.chars().count() >= MIN_TEXT_LEN).then(|| text.to_string())
}

fn not_blank(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

fn to_button(button: &LinkButton) -> Option<PresenceButton> {
    let label = button.label.trim();
    let url = button.url.trim();
    if label.chars().count() < MIN_TEXT_LEN || url.is_empty() {
        return None;
    }
    Some(PresenceButton {
        label: button.label.clone(),
        url: url.to_string(),
    })
}

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("presence client is not connected yet")]
    NotReady,
    #[error("presence client has been disposed")]
    Disposed,
    #[error("failed to publish presence: {0}")]
    Publish(String),
}

/// The third-party presence connection.
///
/// `initialize` starts connecting and returns right away. The outcome arrives
/// later through the `EventSink` given at construction.
pub trait PresenceClient: Send {
    fn initialize(&mut self) -> bool;

    fn set_presence(&mut self, presence: &Presence) -> Result<(), PresenceError>;

    /// Release the connection. Must be safe to call more than once.
    fn dispose(&mut self);
}

/// Builds a fresh client for each connect attempt
pub trait PresenceClientFactory {
    fn create(&self, application_id: &str, events: EventSink) -> Box<dyn PresenceClient>;
}
