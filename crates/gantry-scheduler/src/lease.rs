//! File leases: single-winner coordination for distributed jobs.
//!
//! Each distributed job owns `<runtime>/distributed_<job>`. A node that takes
//! a non-blocking exclusive `flock` on that file is the winner for the next
//! `hold` window: it writes its identity into the file, keeps the descriptor
//! open, and a timer task later removes the file and drops the lock. Losers
//! read the identity and move on; they never wait.
//!
//! The lock belongs to the open file description, so the kernel releases it
//! the moment a holder dies. A crashed holder may leave its identity on disk;
//! that text is informational only and is never used to decide ownership.
//!
//! ## Environment
//! Every participating node must see the *same* runtime folder (a shared
//! mount). This is a lightweight mutual-exclusion scheme for one shared
//! filesystem, not a consensus protocol: it offers nothing under network
//! partition or across datacenters, and its guarantees are only as good as
//! the mount's `flock` support.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use gantry_core::{GantryError, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

/// Lease file name prefix inside the runtime folder.
pub const LEASE_PREFIX: &str = "distributed_";

/// Claims retried when the locked file was unlinked underneath us.
const MAX_CLAIM_ATTEMPTS: usize = 3;

/// Result of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseOutcome {
    /// Identity recorded in the lease (ours when `owner`).
    pub holder: String,
    /// Whether the caller won this window.
    pub owner: bool,
}

/// Decides which node runs a distributed job.
#[async_trait]
pub trait LeaseCoordinator: Send + Sync {
    /// Try to own `name` for `hold`. Never blocks on contention.
    async fn acquire(&self, name: &str, hold: Duration) -> Result<LeaseOutcome>;
}

/// Lease names become file names, so they may not address other paths.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', '\0']) && name != "." && name != ".."
}

/// Path of the lease file for a job.
pub fn lease_path(runtime_dir: &Path, name: &str) -> PathBuf {
    runtime_dir.join(format!("{LEASE_PREFIX}{name}"))
}

/// `flock`-backed coordinator rooted at a shared runtime folder.
#[derive(Debug, Clone)]
pub struct FileLease {
    runtime_dir: PathBuf,
    holder_id: String,
}

impl FileLease {
    pub fn new(runtime_dir: impl Into<PathBuf>, holder_id: impl Into<String>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            holder_id: holder_id.into(),
        }
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }
}

#[async_trait]
impl LeaseCoordinator for FileLease {
    async fn acquire(&self, name: &str, hold: Duration) -> Result<LeaseOutcome> {
        if !is_valid_name(name) {
            return Err(GantryError::lease(name, "lease name must be a plain file name"));
        }

        let path = lease_path(&self.runtime_dir, name);
        let holder = self.holder_id.clone();
        let claim = tokio::task::spawn_blocking(move || try_claim(&path, &holder))
            .await
            .map_err(|e| GantryError::lease(name, e))?
            .map_err(|e| GantryError::lease(name, e))?;

        match claim {
            Claim::Won(locked) => {
                tracing::debug!("🔒 Lease '{}' won by {} for {:?}", name, self.holder_id, hold);
                let name = name.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(hold).await;
                    if let Err(e) = tokio::task::spawn_blocking(move || locked.release()).await {
                        tracing::warn!("⚠️ Lease '{}' release task failed: {e}", name);
                    }
                });
                Ok(LeaseOutcome {
                    holder: self.holder_id.clone(),
                    owner: true,
                })
            }
            Claim::Lost(holder) => Ok(LeaseOutcome {
                holder: holder.trim().to_string(),
                owner: false,
            }),
        }
    }
}

/// Outcome of a raw lock attempt on a lease file.
pub enum Claim {
    /// We hold the lock; the file carries our identity.
    Won(LockedLease),
    /// Someone else holds it; their recorded identity.
    Lost(String),
}

/// An exclusively locked lease file.
///
/// Dropping it without [`LockedLease::release`] behaves like a crash: the
/// lock goes away with the descriptor but the file stays on disk.
pub struct LockedLease {
    path: PathBuf,
    lock: Flock<File>,
}

impl LockedLease {
    /// Remove the file, then unlock and close the descriptor.
    ///
    /// The file is unlinked while still locked so a racing opener can only
    /// lock the orphaned inode, which [`try_claim`] detects.
    pub fn release(self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!("⚠️ Failed to remove lease file {}: {e}", self.path.display());
        }
        match self.lock.unlock() {
            Ok(file) => drop(file),
            Err((_, errno)) => {
                tracing::warn!("⚠️ Failed to unlock {}: {errno}", self.path.display());
            }
        }
    }
}

/// Open (or create) the lease file and try to lock it without blocking.
pub fn try_claim(path: &Path, holder: &str) -> io::Result<Claim> {
    for _ in 0..MAX_CLAIM_ATTEMPTS {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((mut file, errno)) if errno == Errno::EWOULDBLOCK => {
                let mut recorded = String::new();
                file.read_to_string(&mut recorded)?;
                return Ok(Claim::Lost(recorded));
            }
            Err((_, errno)) => return Err(io::Error::from(errno)),
        };

        if !still_linked(&lock, path)? {
            continue;
        }

        lock.set_len(0)?;
        lock.seek(SeekFrom::Start(0))?;
        lock.write_all(holder.as_bytes())?;
        lock.flush()?;
        return Ok(Claim::Won(LockedLease {
            path: path.to_path_buf(),
            lock,
        }));
    }

    // The path keeps being replaced under us; another node is churning it.
    let recorded = std::fs::read_to_string(path).unwrap_or_default();
    Ok(Claim::Lost(recorded))
}

/// Whether `file` is still the inode reachable at `path`.
fn still_linked(file: &File, path: &Path) -> io::Result<bool> {
    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
