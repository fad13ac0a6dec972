//! Event subscriptions and change fan-out.

use hap_core::Value;
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Identifier of one controller connection.
pub type SessionId = u64;

/// A committed value change, queued for one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub aid: u64,
    pub iid: u64,
    pub value: Json,
}

#[derive(Default)]
struct BrokerState {
    sessions: HashMap<SessionId, mpsc::UnboundedSender<Notification>>,
    subscriptions: HashMap<(u64, u64), HashSet<SessionId>>,
}

/// Routes characteristic changes to subscribed sessions.
///
/// `publish` is called from inside the characteristic's commit, under its
/// value lock, and only does non-blocking channel sends; that keeps the
/// per-characteristic delivery order equal to the commit order.
#[derive(Default)]
pub struct EventBroker {
    state: RwLock<BrokerState>,
}

impl EventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and get the receiving end of its event queue.
    pub fn register(&self, session: SessionId) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.write().sessions.insert(session, tx);
        rx
    }

    pub fn subscribe(&self, session: SessionId, aid: u64, iid: u64) {
        self.write()
            .subscriptions
            .entry((aid, iid))
            .or_default()
            .insert(session);
        debug!(session, aid, iid, "Subscribed");
    }

    pub fn unsubscribe(&self, session: SessionId, aid: u64, iid: u64) {
        let mut state = self.write();
        if let Some(subscribers) = state.subscriptions.get_mut(&(aid, iid)) {
            subscribers.remove(&session);
            if subscribers.is_empty() {
                state.subscriptions.remove(&(aid, iid));
            }
        }
        debug!(session, aid, iid, "Unsubscribed");
    }

    pub fn is_subscribed(&self, session: SessionId, aid: u64, iid: u64) -> bool {
        self.read()
            .subscriptions
            .get(&(aid, iid))
            .map(|s| s.contains(&session))
            .unwrap_or(false)
    }

    /// Number of sessions subscribed to a characteristic.
    pub fn subscriber_count(&self, aid: u64, iid: u64) -> usize {
        self.read()
            .subscriptions
            .get(&(aid, iid))
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Queue a change for every subscriber except `origin`.
    ///
    /// Returns the number of sessions notified.
    pub fn publish(&self, aid: u64, iid: u64, value: &Value, origin: Option<SessionId>) -> usize {
        let state = self.read();
        let Some(subscribers) = state.subscriptions.get(&(aid, iid)) else {
            return 0;
        };
        let json = value.to_json();
        let mut delivered = 0;
        for session in subscribers {
            if Some(*session) == origin {
                continue;
            }
            if let Some(tx) = state.sessions.get(session) {
                let notification = Notification {
                    aid,
                    iid,
                    value: json.clone(),
                };
                if tx.send(notification).is_ok() {
                    delivered += 1;
                }
            }
        }
        trace!(aid, iid, delivered, "Published change");
        delivered
    }

    /// Drop a session's queue and every subscription it holds.
    pub fn remove_session(&self, session: SessionId) {
        let mut state = self.write();
        state.sessions.remove(&session);
        state.subscriptions.retain(|_, subscribers| {
            subscribers.remove(&session);
            !subscribers.is_empty()
        });
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BrokerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BrokerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
