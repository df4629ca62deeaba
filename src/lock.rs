//! Single instance guard for the keep-alive loop

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Holds the lock file open. The lock is released on drop.
pub struct Lock {
    _file: File,
    path: PathBuf,
}

impl Lock {
    /// Take the lock in the platform runtime directory.
    /// Fails when another update loop already holds it.
    pub fn acquire() -> io::Result<Self> {
        let path = ProjectDirs::from("", "", "zoom75-sync")
            .map(|dirs| dirs.config_dir().join("zoom75-sync.lock"))
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "could not determine lock file path")
            })?;
        Self::at(&path)
    }

    /// Take the lock at an explicit path
    pub fn at(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock().is_err() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "another zoom75-sync update loop is already running",
            ));
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        tracing::debug!(path = %path.display(), "acquired instance lock");

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_fails() {
        let path = std::env::temp_dir().join(format!("zoom75-sync-lock-{}", std::process::id()));
        let lock = Lock::at(&path).unwrap();
        let err = Lock::at(&path).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        drop(lock);
        assert!(!path.exists());
        drop(Lock::at(&path).unwrap());
    }
}
