use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::error::{Result, SoundEngineError};
use crate::session::{Session, SessionId};

/// Shared, non-owning view of a registered session. Every access goes through the session's
/// exclusive lock, so concurrent calls on one session are serialized.
#[derive(Debug, Clone)]
pub struct SessionRef(Arc<Mutex<Session>>);

impl SessionRef {
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock()
    }
}

/// The authoritative set of live sessions.
///
/// Lock order is always registry first, then session. Nothing here takes the registry lock while
/// a session lock is held.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: RwLock<BTreeMap<SessionId, SessionRef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of an initialized session. Fails if the session has no id yet or the id
    /// is already registered; the rejected session is dropped and releases its voice.
    pub(crate) fn insert(&self, session: Session) -> Result<SessionId> {
        let id = session
            .id()
            .ok_or_else(|| SoundEngineError::invalid_state("insert", session.state()))?;
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&id) {
            return Err(SoundEngineError::invalid_state("insert", session.state()));
        }
        sessions.insert(id, SessionRef(Arc::new(Mutex::new(session))));
        Ok(id)
    }

    pub fn get(&self, id: SessionId) -> Option<SessionRef> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    /// Detaches a session. The session itself is dropped once the last outstanding reference
    /// to it goes away.
    pub(crate) fn remove(&self, id: SessionId) -> Option<SessionRef> {
        self.sessions.write().remove(&id)
    }

    pub(crate) fn drain(&self) -> Vec<SessionRef> {
        let mut sessions = self.sessions.write();
        std::mem::take(&mut *sessions).into_values().collect()
    }

    /// Calls `f` for every session registered when the call starts, in id order.
    ///
    /// The registry stays read-locked for the whole walk, so no session is inserted or removed
    /// meanwhile, and each session is locked while `f` runs on it.
    pub(crate) fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(SessionId, &mut Session),
    {
        let sessions = self.sessions.read();
        for (id, session) in sessions.iter() {
            let mut guard = session.lock();
            f(*id, &mut guard);
        }
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
