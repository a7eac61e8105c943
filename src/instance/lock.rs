use std::fs::{File, OpenOptions};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to open lock file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to lock '{}': {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: Errno,
    },
}

/// Exclusive advisory lock marking this process as the primary.
///
/// Held until dropped. The kernel drops it with the process, so a crash
/// never leaves the next launch locked out.
#[derive(Debug)]
pub struct InstanceLock {
    file: Flock<File>,
}

impl InstanceLock {
    /// One non-blocking attempt. `Ok(None)` means another process holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|source| LockError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => {
                let mut lock = Self { file };
                if let Err(e) = lock.record_owner() {
                    tracing::debug!("Failed to record owner pid in {}: {}", path.display(), e);
                }
                Ok(Some(lock))
            }
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => Ok(None),
            Err((_, errno)) => Err(LockError::Lock {
                path: path.to_path_buf(),
                source: errno,
            }),
        }
    }

    // Diagnostic only; nothing reads the pid back
    fn record_owner(&mut self) -> io::Result<()> {
        let file: &mut File = &mut self.file;
        file.set_len(0)?;
        file.rewind()?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()
    }
}
