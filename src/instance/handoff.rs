//! The handoff file carries a preset path from a new launch to the primary.
//!
//! Notifications have no payload, so the path is written to a well-known file
//! first and the import notification only tells the primary to go read it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("failed to write handoff file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read handoff file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("handoff file '{}' does not name a preset", .0.display())]
    Empty(PathBuf),
    #[error("preset path '{}' is not valid UTF-8", .0.display())]
    NonUtf8(PathBuf),
}

/// Overwrite the handoff file with `preset`
pub fn write_handoff(path: &Path, preset: &Path) -> Result<(), HandoffError> {
    let text = preset
        .to_str()
        .ok_or_else(|| HandoffError::NonUtf8(preset.to_path_buf()))?;
    fs::write(path, text).map_err(|source| HandoffError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Most recently written preset path. The file is left in place.
pub fn read_handoff(path: &Path) -> Result<PathBuf, HandoffError> {
    let text = fs::read_to_string(path).map_err(|source| HandoffError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(HandoffError::Empty(path.to_path_buf()));
    }
    Ok(PathBuf::from(trimmed))
}
