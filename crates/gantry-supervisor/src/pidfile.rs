//! PID files: `<runtime>/app.pid` and `<runtime>/cron.pid`.
//!
//! A stopped service leaves an empty file behind rather than deleting it.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use gantry_core::{GantryError, Result};

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded PID. Missing or empty file means none.
    pub fn read(&self) -> Result<Option<i32>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GantryError::pid_file(&self.path, e)),
        };
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        match content.parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(GantryError::pid_file(
                &self.path,
                format!("not a process id: {content:?}"),
            )),
        }
    }

    pub fn write(&self, pid: u32) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&self.path)
            .map_err(|e| GantryError::pid_file(&self.path, e))?;
        file.write_all(pid.to_string().as_bytes())
            .map_err(|e| GantryError::pid_file(&self.path, e))
    }

    /// Truncate to empty. A missing file is left missing.
    pub fn clear(&self) -> Result<()> {
        match OpenOptions::new().write(true).truncate(true).open(&self.path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GantryError::pid_file(&self.path, e)),
        }
    }
}
