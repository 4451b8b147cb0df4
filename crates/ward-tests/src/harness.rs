//! A disposable store over a temp directory, with a created account and a
//! logged-in session.

use tempfile::TempDir;
use ward_store::{Account, Collection, LockManager, Session, Store, StoreConfig};

type Error = Box<dyn std::error::Error + Send + Sync>;

/// One fully bootstrapped store for a test: temp data directory, `admin`
/// account, logged-in session, and the clinical model tree registered.
pub struct TestStore {
    _root: TempDir,
    /// The store configuration pointing into the temp directory.
    pub config: StoreConfig,
    /// The logged-in admin session.
    pub session: Session,
    /// The opened store.
    pub store: Store,
}

impl TestStore {
    /// Bootstraps a store with default configuration.
    pub async fn new() -> Result<Self, Error> {
        Self::with_config(|_| {}).await
    }

    /// Bootstraps a store, letting the test adjust lease durations and poll
    /// intervals first.
    pub async fn with_config(tweak: impl FnOnce(&mut StoreConfig)) -> Result<Self, Error> {
        let root = TempDir::new()?;
        let mut config = StoreConfig::new(root.path().join("data"));
        tweak(&mut config);

        Account::create(&config, "admin", "pw", &ward_models::model_tree()).await?;
        let session = Session::login(&config, "admin", "pw").await?;
        let store = Store::open(session.clone(), ward_models::model_tree())?;

        Ok(TestStore {
            _root: root,
            config,
            session,
            store,
        })
    }

    /// Returns the collection handle for a registered model.
    pub fn collection(&self, model_name: &str) -> Collection {
        self.store
            .collection(model_name)
            .expect("model is registered")
    }

    /// Returns a lock manager for the admin session.
    pub fn lock_manager(&self) -> LockManager {
        LockManager::new(&self.session, &self.config)
    }

    /// Creates another account on the same data directory and logs it in.
    pub async fn add_user(&self, user_name: &str, password: &str) -> Result<Session, Error> {
        Account::create(&self.config, user_name, password, &[]).await?;
        Ok(Session::login(&self.config, user_name, password).await?)
    }

    /// Returns a lock manager for another session on the same store.
    pub fn lock_manager_for(&self, session: &Session) -> LockManager {
        LockManager::new(session, &self.config)
    }
}
