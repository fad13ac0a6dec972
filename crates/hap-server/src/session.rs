//! Live controller sessions.
//!
//! Lets the `/pairings` handler close every connection of a controller the
//! moment its pairing is removed.

use crate::broker::SessionId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::info;

/// Close signal shared between the registry and one connection worker.
#[derive(Debug, Default)]
pub struct SessionHandle {
    closed: AtomicBool,
    notify: Notify,
}

impl SessionHandle {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once [`SessionHandle::close`] has been called.
    pub async fn closed(&self) {
        while !self.is_closed() {
            self.notify.notified().await;
        }
    }
}

struct Entry {
    controller: Option<String>,
    handle: Arc<SessionHandle>,
}

/// All open sessions, keyed by session id.
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, Entry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new, unverified session.
    pub fn open(&self) -> (SessionId, Arc<SessionHandle>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(SessionHandle::default());
        self.lock().insert(
            id,
            Entry {
                controller: None,
                handle: handle.clone(),
            },
        );
        (id, handle)
    }

    /// Record the controller a session verified as.
    pub fn set_controller(&self, id: SessionId, controller: &str) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.controller = Some(controller.to_string());
        }
    }

    pub fn controller(&self, id: SessionId) -> Option<String> {
        self.lock().get(&id).and_then(|e| e.controller.clone())
    }

    /// Close every session verified as `controller`. Returns how many.
    pub fn close_controller(&self, controller: &str) -> usize {
        let sessions = self.lock();
        let mut closed = 0;
        for (id, entry) in sessions.iter() {
            if entry.controller.as_deref() == Some(controller) {
                entry.handle.close();
                info!(session = id, controller, "Closing session of removed controller");
                closed += 1;
            }
        }
        closed
    }

    pub fn remove(&self, id: SessionId) {
        self.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Entry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
