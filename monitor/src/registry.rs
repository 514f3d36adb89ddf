//! Membership bookkeeping for live feed subscribers.
//!
//! The registry never sends anything. Each feed owns delivery to its own
//! socket; this only tracks who is currently connected.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub admitted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    members: Mutex<HashMap<SubscriberId, Subscriber>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber. Membership ends when the returned guard
    /// is dropped or on an explicit [`ConnectionRegistry::remove`].
    pub fn admit(self: &Arc<Self>) -> Admission {
        let subscriber = Subscriber {
            id: SubscriberId::new(),
            admitted_at: Utc::now(),
        };
        let id = subscriber.id;
        self.members.lock().insert(id, subscriber);

        Admission {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Returns whether the subscriber was still present. Removing an absent
    /// id is a no-op.
    pub fn remove(&self, id: SubscriberId) -> bool {
        self.members.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.members.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Copy of the current membership; the lock is released before returning.
    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.members.lock().values().cloned().collect()
    }

    pub fn for_each(&self, mut visit: impl FnMut(&Subscriber)) {
        for subscriber in self.snapshot() {
            visit(&subscriber);
        }
    }
}

/// Registry membership held by one live feed.
#[derive(Debug)]
pub struct Admission {
    registry: Arc<ConnectionRegistry>,
    id: SubscriberId,
}

impl Admission {
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
