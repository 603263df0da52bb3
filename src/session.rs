use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::error::AppError;
use crate::models::session::{SESSION_KEYS, Session};
use crate::storage::KeyValueStorage;

/// The single shared session record. Components receive an
/// `Arc<SessionStore>` and read a snapshot when they need credentials; a
/// snapshot is either a complete session or nothing.
pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            current: RwLock::new(None),
        }
    }

    /// Loads the persisted session. Leftovers that do not form a complete
    /// session are wiped so the next launch starts clean.
    pub async fn restore(&self) -> Result<Option<Session>, AppError> {
        let mut values = self.storage.multi_get(&SESSION_KEYS).await?.into_iter();
        let mut next = || values.next().flatten();
        let (token, role, driver_id, user_data) = (next(), next(), next(), next());
        let any_present = token.is_some() || role.is_some() || driver_id.is_some();

        let session = Session::from_entries(token, role, driver_id, user_data);
        match &session {
            Some(session) => {
                info!(role = %session.role, driver_id = %session.driver_id, "session restored");
            }
            None if any_present => {
                warn!("discarding incomplete persisted session");
                self.storage.multi_remove(&SESSION_KEYS).await?;
            }
            None => {}
        }

        self.replace(session.clone());
        Ok(session)
    }

    /// Persists every field in one write, then publishes the session to
    /// readers. If the write fails readers keep seeing the previous state.
    pub async fn set(&self, session: Session) -> Result<(), AppError> {
        self.storage.multi_set(session.to_entries()).await?;
        self.replace(Some(session));
        Ok(())
    }

    pub fn get_all(&self) -> Option<Session> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.get_all().map(|session| session.token)
    }

    pub fn is_authenticated(&self) -> bool {
        self.get_all().is_some()
    }

    /// Readers stop seeing the session before storage is touched, so a call
    /// racing with logout goes out unauthenticated rather than half-cleared.
    pub async fn clear(&self) -> Result<(), AppError> {
        self.replace(None);
        self.storage.multi_remove(&SESSION_KEYS).await?;
        info!("session cleared");
        Ok(())
    }

    fn replace(&self, session: Option<Session>) {
        match self.current.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }
}
