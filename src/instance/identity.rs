use std::path::PathBuf;

/// Base identity; debug builds get their own so they can run beside a release build
pub const BASE_NAME: &str = if cfg!(debug_assertions) {
    "CustomRP dev"
} else {
    "CustomRP"
};
const SECOND_INSTANCE_SUFFIX: &str = " 2";

/// Signals a new launch can send to the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notification {
    ShowFirstInstance,
    ImportPreset,
}

impl Notification {
    pub const ALL: [Notification; 2] = [Notification::ShowFirstInstance, Notification::ImportPreset];

    fn prefix(self) -> &'static str {
        match self {
            Notification::ShowFirstInstance => "WM_SHOWFIRSTINSTANCE",
            Notification::ImportPreset => "WM_IMPORTPRESET",
        }
    }
}

/// Who owns the presence connection. Every process sharing an identity
/// competes for the same lock, socket and handoff file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceIdentity {
    name: String,
    runtime_dir: PathBuf,
}

impl InstanceIdentity {
    pub fn new(name: impl Into<String>, runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            runtime_dir: runtime_dir.into(),
        }
    }

    /// Identity for this build, optionally the separate second-instance slot
    pub fn for_launch(second_instance: bool) -> Self {
        let mut name = BASE_NAME.to_string();
        if second_instance {
            name.push_str(SECOND_INSTANCE_SUFFIX);
        }
        Self::new(name, default_runtime_dir())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// "CustomRP dev 2" -> "customrp-dev-2"
    pub fn file_stem(&self) -> String {
        self.name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase()
    }

    pub fn lock_path(&self) -> PathBuf {
        self.runtime_dir.join(format!("{}.lock", self.file_stem()))
    }

    pub fn socket_path(&self) -> PathBuf {
        self.runtime_dir.join(format!("{}.sock", self.file_stem()))
    }

    pub fn handoff_path(&self) -> PathBuf {
        self.runtime_dir.join(format!("{}.pipe", self.file_stem()))
    }

    /// Registered name of a notification, tagged with this identity
    pub fn message_name(&self, notification: Notification) -> String {
        format!("{}|{}", notification.prefix(), self.name)
    }

    /// Match a received message name against this identity's notifications
    pub fn parse_message(&self, message: &str) -> Option<Notification> {
        Notification::ALL
            .into_iter()
            .find(|&n| self.message_name(n) == message)
    }
}

/// Per-user runtime directory, or the temp directory where there is none
pub fn default_runtime_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}
