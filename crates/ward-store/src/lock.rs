//! Directory-based advisory locks with leases.
//!
//! A lock is a directory under `<data>/_locks/<lockId>/` holding a
//! `metadata` file (the holder's user name as JSON) and one or more
//! `expire-<timestamp>` marker files. The lock exists iff the directory
//! exists; the effective expiry is the maximum marker timestamp. Acquisition
//! is a staged-directory commit, so exactly one of any number of concurrent
//! acquirers wins the rename. A renewal task extends the lease while the
//! handle lives; a holder that dies stops renewing and any later acquirer
//! reclaims the stale directory.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ward_core::Timestamp;

use crate::config::StoreConfig;
use crate::events::StoreEvent;
use crate::fsx::{self, CommitError};
use crate::session::Session;
use crate::StoreError;

const METADATA_FILE: &str = "metadata";
const EXPIRE_PREFIX: &str = "expire-";

/// Identity of a lock's current holder, as stored in its `metadata` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    /// User name of the session that acquired the lock
    #[serde(rename = "userName")]
    pub user_name: String,
}

#[derive(Debug)]
struct LockState {
    next_expiry: Timestamp,
    released: bool,
}

/// Handle to a held lock. Renewal runs in the background until the handle
/// is released or the lease is allowed to lapse.
#[derive(Debug)]
pub struct Lock {
    lock_id: String,
    dir: PathBuf,
    tmp_root: PathBuf,
    state: Arc<Mutex<LockState>>,
    renew_task: Option<JoinHandle<()>>,
}

impl Lock {
    /// The id this lock was acquired under.
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// The expiry of the most recent successfully written lease marker.
    pub fn expires_at(&self) -> Timestamp {
        self.state.lock().next_expiry
    }

    /// Whether the handle has been released (explicitly or by lease lapse).
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Stops renewal and deletes the lock directory. Idempotent; releasing
    /// an expired lock succeeds silently without touching the directory,
    /// which by then may belong to a reclaiming acquirer.
    pub async fn release(&mut self) -> Result<(), StoreError> {
        if let Some(task) = self.renew_task.take() {
            task.abort();
        }
        let (already_released, next_expiry) = {
            let mut state = self.state.lock();
            (
                std::mem::replace(&mut state.released, true),
                state.next_expiry,
            )
        };
        if already_released {
            return Ok(());
        }
        if next_expiry < Timestamp::now() {
            debug!(lock_id = %self.lock_id, "lease already lapsed; nothing to release");
            return Ok(());
        }
        match fsx::delete_directory(&self.dir, &self.tmp_root).await {
            Ok(()) => {
                info!(lock_id = %self.lock_id, "released lock");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if let Some(task) = self.renew_task.take() {
            task.abort();
        }
        // without an explicit release the directory stays behind and is
        // reclaimed by the next acquirer after the lease lapses
    }
}

struct Inspection {
    holder: LockHolder,
    max_expiry: Option<Timestamp>,
}

impl Inspection {
    fn is_stale(&self, now: Timestamp) -> bool {
        self.max_expiry.map_or(true, |expiry| expiry < now)
    }
}

/// Acquires and reclaims locks for one session.
#[derive(Clone)]
pub struct LockManager {
    session: Session,
    config: StoreConfig,
}

impl LockManager {
    /// Creates a manager bound to a session and its store configuration.
    pub fn new(session: &Session, config: &StoreConfig) -> Self {
        Self {
            session: session.clone(),
            config: config.clone(),
        }
    }

    fn lock_dir(&self, lock_id: &str) -> PathBuf {
        self.config.locks_path().join(lock_id)
    }

    /// Acquires `lock_id`, reclaiming it first if its current holder's lease
    /// has lapsed. A fresh holder yields [`StoreError::LockInUse`] carrying
    /// the holder's metadata.
    pub async fn acquire(&self, lock_id: &str) -> Result<Lock, StoreError> {
        loop {
            let expiry = Timestamp::now().add(self.config.lease_time);
            if self.try_commit(lock_id, expiry).await? {
                info!(lock_id, user = %self.session.user_name(), "acquired lock");
                return Ok(self.spawn_handle(lock_id, expiry));
            }

            let Some(inspection) = self.inspect(&self.lock_dir(lock_id)).await? else {
                // holder vanished between collision and inspection
                continue;
            };
            let now = Timestamp::now();
            if inspection.is_stale(now) {
                if inspection.max_expiry.is_none() {
                    warn!(lock_id, "lock directory has no expiry markers; treating as stale");
                }
                self.reclaim(lock_id).await?;
                continue;
            }
            return Err(StoreError::LockInUse {
                lock_id: lock_id.to_string(),
                holder: inspection.holder,
            });
        }
    }

    /// Acquires `lock_id`, polling until the current holder releases or
    /// lapses. Emits [`StoreEvent::LockAcquired`] once the lock is taken.
    pub async fn acquire_when_free(&self, lock_id: &str) -> Result<Lock, StoreError> {
        loop {
            match self.acquire(lock_id).await {
                Ok(lock) => {
                    self.session.bus().emit(StoreEvent::LockAcquired {
                        lock_id: lock_id.to_string(),
                    });
                    return Ok(lock);
                }
                Err(StoreError::LockInUse { .. }) => {
                    tokio::time::sleep(self.config.lock_poll_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stages and commits a lock directory. `Ok(false)` means the commit
    /// collided with an existing holder.
    async fn try_commit(&self, lock_id: &str, expiry: Timestamp) -> Result<bool, StoreError> {
        let staged = fsx::stage_directory(&self.config.tmp_path()).await?;
        let holder = LockHolder {
            user_name: self.session.user_name().to_string(),
        };
        tokio::fs::write(
            staged.path().join(METADATA_FILE),
            serde_json::to_vec(&holder)?,
        )
        .await?;
        tokio::fs::write(staged.path().join(expire_marker(expiry)), b"").await?;

        match staged.commit(&self.lock_dir(lock_id)).await {
            Ok(()) => Ok(true),
            Err(CommitError::Collision) => Ok(false),
            Err(CommitError::Io(e)) => Err(e.into()),
        }
    }

    /// Reads a held lock's metadata and maximum expiry. `None` if the
    /// directory no longer exists.
    async fn inspect(&self, dir: &Path) -> Result<Option<Inspection>, StoreError> {
        let entries = match fsx::scan_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let holder = match tokio::fs::read(dir.join(METADATA_FILE)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(dir = %dir.display(), error = %e, "unreadable lock metadata");
                LockHolder {
                    user_name: "<unknown>".to_string(),
                }
            }),
            Err(_) => LockHolder {
                user_name: "<unknown>".to_string(),
            },
        };

        let max_expiry = entries
            .iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| e.name.strip_prefix(EXPIRE_PREFIX))
            .filter_map(|suffix| Timestamp::parse_sortable(suffix).ok())
            .max();

        Ok(Some(Inspection { holder, max_expiry }))
    }

    /// Deletes a stale lock. Reclaimers serialize on a secondary lock named
    /// `<lockId>.expiry` and re-verify staleness under it, so two racing
    /// reclaimers cannot both think they deleted the directory.
    async fn reclaim(&self, lock_id: &str) -> Result<(), StoreError> {
        let secondary_id = format!("{lock_id}.expiry");
        let secondary_dir = self.lock_dir(&secondary_id);
        let tmp = self.config.tmp_path();
        let guard_expiry = Timestamp::now().add(self.config.lease_time);

        if !self.try_commit(&secondary_id, guard_expiry).await? {
            // the guard exists; clean it up if abandoned, else we lost the race
            match self.inspect(&secondary_dir).await? {
                Some(i) if i.is_stale(Timestamp::now()) => {
                    ignore_not_found(fsx::delete_directory(&secondary_dir, &tmp).await)?;
                }
                Some(i) => {
                    return Err(StoreError::LockInUse {
                        lock_id: lock_id.to_string(),
                        holder: i.holder,
                    })
                }
                None => {}
            }
            if !self.try_commit(&secondary_id, guard_expiry).await? {
                return match self.inspect(&self.lock_dir(lock_id)).await? {
                    Some(i) => Err(StoreError::LockInUse {
                        lock_id: lock_id.to_string(),
                        holder: i.holder,
                    }),
                    // the winning reclaimer already removed the primary
                    None => Ok(()),
                };
            }
        }

        // guard held: re-verify before deleting
        match self.inspect(&self.lock_dir(lock_id)).await? {
            Some(i) if i.is_stale(Timestamp::now()) => {
                info!(lock_id, stale_holder = %i.holder.user_name, "reclaiming stale lock");
                ignore_not_found(fsx::delete_directory(&self.lock_dir(lock_id), &tmp).await)?;
            }
            _ => debug!(lock_id, "lock freshened during reclaim; leaving it"),
        }

        ignore_not_found(fsx::delete_directory(&secondary_dir, &tmp).await)?;
        Ok(())
    }

    fn spawn_handle(&self, lock_id: &str, expiry: Timestamp) -> Lock {
        let state = Arc::new(Mutex::new(LockState {
            next_expiry: expiry,
            released: false,
        }));
        let task = tokio::spawn(renewal_loop(
            lock_id.to_string(),
            self.lock_dir(lock_id),
            Arc::clone(&state),
            self.config.lease_time,
            self.config.lease_renewal_interval,
        ));
        Lock {
            lock_id: lock_id.to_string(),
            dir: self.lock_dir(lock_id),
            tmp_root: self.config.tmp_path(),
            state,
            renew_task: Some(task),
        }
    }
}

fn expire_marker(expiry: Timestamp) -> String {
    format!("{EXPIRE_PREFIX}{}", expiry.to_sortable())
}

fn ignore_not_found(result: io::Result<()>) -> Result<(), StoreError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn renewal_loop(
    lock_id: String,
    dir: PathBuf,
    state: Arc<Mutex<LockState>>,
    lease_time: Duration,
    interval: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;

        let now = Timestamp::now();
        {
            let mut s = state.lock();
            if s.released {
                return;
            }
            if s.next_expiry < now {
                // the lease already lapsed; another process may hold the
                // lock by now, so writing a marker would be unsafe
                warn!(%lock_id, "lease lapsed before renewal; releasing handle");
                s.released = true;
                return;
            }
        }

        let expiry = now.add(lease_time);
        match tokio::fs::write(dir.join(expire_marker(expiry)), b"").await {
            Ok(()) => {
                state.lock().next_expiry = expiry;
                debug!(%lock_id, expiry = %expiry, "renewed lease");
            }
            Err(e) => warn!(%lock_id, error = %e, "lease renewal write failed"),
        }
    }
}
