//! User accounts and sessions.
//!
//! An account record under `<data>/_users/<userName>/` holds a random salt
//! and the account's strong key, sealed under an Argon2id password-derived
//! key. Login unlocks the strong key into an in-memory [`Session`]; the
//! password itself is never written. Account creation also bootstraps the
//! data-directory tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;
use ward_core::crypto::{self, CryptoError, KeySchedule, StrongKey, SALT_SIZE};

use crate::config::StoreConfig;
use crate::events::EventBus;
use crate::fsx;
use crate::model::ModelDef;
use crate::StoreError;

const SALT_FILE: &str = "salt";
const KEY_FILE: &str = "key";
const DEACTIVATED_FILE: &str = "deactivated";

struct SessionInner {
    data_dir: PathBuf,
    user_name: String,
    key: StrongKey,
    bus: EventBus,
}

/// A logged-in session: the data directory, the user's name, and the
/// unlocked strong key. Cheap to clone; the key lives in memory for the
/// process lifetime.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Authenticates against the account record and unlocks the strong key.
    pub async fn login(
        config: &StoreConfig,
        user_name: &str,
        password: &str,
    ) -> Result<Session, StoreError> {
        let user_dir = config.user_path(user_name);
        if !dir_exists(&user_dir).await {
            return Err(StoreError::UnknownUserName(user_name.to_string()));
        }
        if file_exists(&user_dir.join(DEACTIVATED_FILE)).await {
            return Err(StoreError::DeactivatedAccount(user_name.to_string()));
        }

        let salt = tokio::fs::read(user_dir.join(SALT_FILE)).await?;
        let sealed_key = tokio::fs::read(user_dir.join(KEY_FILE)).await?;

        let unlock_key = KeySchedule::password_key(password, &salt)?;
        let key_bytes = match crypto::open(unlock_key.as_bytes(), &sealed_key) {
            Ok(bytes) => bytes,
            Err(CryptoError::OpenFailed) => return Err(StoreError::IncorrectPassword),
            Err(e) => return Err(e.into()),
        };
        let key = StrongKey::from_slice(&key_bytes)
            .map_err(|_| StoreError::Integrity("account key file is malformed".to_string()))?;

        info!(user = user_name, "logged in");
        Ok(Self::for_parts(
            config.data_dir.clone(),
            user_name.to_string(),
            key,
            EventBus::new(config.event_buffer),
        ))
    }

    pub(crate) fn for_parts(
        data_dir: PathBuf,
        user_name: String,
        key: StrongKey,
        bus: EventBus,
    ) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                data_dir,
                user_name,
                key,
                bus,
            }),
        }
    }

    /// Root of the data tree this session operates on.
    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    /// The logged-in user's name, stamped as `author` on every revision.
    pub fn user_name(&self) -> &str {
        &self.inner.user_name
    }

    /// The session's event bus.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub(crate) fn key(&self) -> &StrongKey {
        &self.inner.key
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("data_dir", &self.inner.data_dir)
            .field("user_name", &self.inner.user_name)
            .finish_non_exhaustive()
    }
}

/// Account management.
pub struct Account;

impl Account {
    /// Creates an account and bootstraps the data-directory tree: the
    /// reserved directories plus one directory per top-level collection.
    pub async fn create(
        config: &StoreConfig,
        user_name: &str,
        password: &str,
        models: &[ModelDef],
    ) -> Result<(), StoreError> {
        config.create_dirs()?;
        for model in models {
            tokio::fs::create_dir_all(config.data_dir.join(&model.collection_name)).await?;
        }

        let salt = {
            use rand::RngCore;
            let mut salt = [0u8; SALT_SIZE];
            rand::thread_rng().fill_bytes(&mut salt);
            salt
        };
        let key = StrongKey::random();
        let unlock_key = KeySchedule::password_key(password, &salt)?;
        let sealed_key = crypto::seal(unlock_key.as_bytes(), key.as_bytes())?;

        let staged = fsx::stage_directory(&config.tmp_path()).await?;
        tokio::fs::write(staged.path().join(SALT_FILE), salt).await?;
        tokio::fs::write(staged.path().join(KEY_FILE), sealed_key).await?;
        staged
            .commit(&config.user_path(user_name))
            .await
            .map_err(|e| match e {
                fsx::CommitError::Collision => {
                    StoreError::Validation(format!("account already exists: {user_name}"))
                }
                fsx::CommitError::Io(e) => StoreError::Io(e),
            })?;

        info!(user = user_name, "created account");
        Ok(())
    }

    /// Marks an account as deactivated; subsequent logins fail.
    pub async fn deactivate(config: &StoreConfig, user_name: &str) -> Result<(), StoreError> {
        let user_dir = config.user_path(user_name);
        if !dir_exists(&user_dir).await {
            return Err(StoreError::UnknownUserName(user_name.to_string()));
        }
        fsx::write_buffer_to_file(&user_dir.join(DEACTIVATED_FILE), &config.tmp_path(), b"")
            .await?;
        info!(user = user_name, "deactivated account");
        Ok(())
    }
}

async fn dir_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
