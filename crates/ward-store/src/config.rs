//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Reserved directory name: staging area for atomic operations. Must live on
/// the same filesystem as the data tree (commit is a rename).
pub const TMP_DIR: &str = "_tmp";
/// Reserved directory name: account records.
pub const USERS_DIR: &str = "_users";
/// Reserved directory name: lock directories.
pub const LOCKS_DIR: &str = "_locks";

/// Configuration for a store rooted at one data directory.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root of the data tree
    pub data_dir: PathBuf,
    /// How long a lock lease is valid without renewal
    pub lease_time: Duration,
    /// Interval between automatic lease renewals
    pub lease_renewal_interval: Duration,
    /// Poll interval when waiting for a held lock to free
    pub lock_poll_interval: Duration,
    /// Event bus channel capacity
    pub event_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ward"),
            lease_time: Duration::from_secs(3 * 60),
            lease_renewal_interval: Duration::from_secs(60),
            lock_poll_interval: Duration::from_secs(1),
            event_buffer: 256,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with the given data directory.
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Returns the staging directory path.
    pub fn tmp_path(&self) -> PathBuf {
        self.data_dir.join(TMP_DIR)
    }

    /// Returns the account records path.
    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(USERS_DIR)
    }

    /// Returns the path of one user's account directory.
    pub fn user_path(&self, user_name: &str) -> PathBuf {
        self.users_path().join(user_name)
    }

    /// Returns the lock directories path.
    pub fn locks_path(&self) -> PathBuf {
        self.data_dir.join(LOCKS_DIR)
    }

    /// Creates the reserved directories.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.tmp_path())?;
        std::fs::create_dir_all(self.users_path())?;
        std::fs::create_dir_all(self.locks_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let config = StoreConfig::new(PathBuf::from("/tmp/ward"));
        assert_eq!(config.tmp_path(), PathBuf::from("/tmp/ward/_tmp"));
        assert_eq!(config.users_path(), PathBuf::from("/tmp/ward/_users"));
        assert_eq!(config.locks_path(), PathBuf::from("/tmp/ward/_locks"));
        assert_eq!(
            config.user_path("admin"),
            PathBuf::from("/tmp/ward/_users/admin")
        );
    }

    #[test]
    fn test_default_lease_parameters() {
        let config = StoreConfig::default();
        assert_eq!(config.lease_time, Duration::from_secs(180));
        assert_eq!(config.lease_renewal_interval, Duration::from_secs(60));
        assert_eq!(config.lock_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_create_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = StoreConfig::new(tmp.path().join("data"));
        config.create_dirs().unwrap();
        assert!(config.tmp_path().is_dir());
        assert!(config.users_path().is_dir());
        assert!(config.locks_path().is_dir());
    }
}
