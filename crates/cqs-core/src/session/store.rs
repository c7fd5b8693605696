//! The shared session slot
//!
//! One [`SessionStore`] exists per client instance. All instances persist to
//! the same `session.json` under the shared state directory; last write
//! wins, with no cross-instance locking. That is acceptable because the slot
//! is idempotent and convergent, not incrementally additive: every write
//! carries the complete session.
//!
//! ## Failure posture
//!
//! `set` and `clear` never fail the caller. If the shared medium is not
//! writable the store logs a warning and degrades to memory-only operation
//! for this instance; a login must not be blocked by a full disk.

use crate::io::write_json_atomic;
use crate::schema::{Principal, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

/// Listener invoked with every session snapshot.
pub type SessionListener = Arc<dyn Fn(&Session) + Send + Sync>;

/// On-disk shape of the session slot.
///
/// Carries the writing instance's id so watchers can ignore their own
/// writes, and a timestamp for debugging multi-instance races.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(flatten)]
    pub session: Session,
    /// Instance id of the process that performed this write
    pub writer_instance: String,
    /// When the write happened
    pub updated_at: DateTime<Utc>,
}

/// Outcome of applying an externally observed session change.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalOutcome {
    /// Same identity (profile refresh, token rotation, or still logged out):
    /// the cache was refreshed and subscribers notified.
    Updated,
    /// A different identity now occupies the shared slot. The cache was NOT
    /// merged; the caller must force a full reload of all derived state.
    IdentityConflict {
        previous: Session,
        incoming: Session,
    },
}

struct Inner {
    cache: Option<Session>,
    memory_only: bool,
}

struct Subscriber {
    id: u64,
    listener: SessionListener,
}

/// Process-wide single source of truth for the authenticated session.
///
/// Wrap in `Arc<SessionStore>` to share between tasks; all methods take
/// `&self`.
pub struct SessionStore {
    path: PathBuf,
    instance_id: String,
    inner: Mutex<Inner>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl SessionStore {
    /// Create a store persisting to `path` (normally
    /// `{state_dir}/session.json`). Nothing is read until first access.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            instance_id: uuid::Uuid::new_v4().to_string(),
            inner: Mutex::new(Inner {
                cache: None,
                memory_only: false,
            }),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Path of the persisted session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// This process's writer instance id.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Synchronous snapshot of the last-known session.
    ///
    /// Reads the shared medium on first access, then serves the in-memory
    /// cache until an update invalidates it. An unreadable or corrupt file
    /// yields a logged-out session.
    pub fn current(&self) -> Session {
        let mut inner = self.inner.lock().expect("session store lock poisoned");
        if inner.cache.is_none() {
            inner.cache = Some(self.read_from_disk());
        }
        inner.cache.clone().unwrap_or_default()
    }

    /// Atomically install a new session: persist, update the cache, notify
    /// in-process subscribers.
    ///
    /// A write failure degrades this instance to memory-only operation and
    /// is logged; it never propagates to the caller.
    pub fn set(&self, token: Option<String>, principal: Option<Principal>) {
        let session = Session { token, principal };
        {
            let mut inner = self.inner.lock().expect("session store lock poisoned");
            if !inner.memory_only {
                let persisted = PersistedSession {
                    session: session.clone(),
                    writer_instance: self.instance_id.clone(),
                    updated_at: Utc::now(),
                };
                if let Err(e) = write_json_atomic(&self.path, &persisted) {
                    warn!(
                        "Session persist failed, continuing memory-only: {}",
                        e
                    );
                    inner.memory_only = true;
                }
            }
            inner.cache = Some(session.clone());
        }
        self.notify(&session);
    }

    /// Clear the slot: equivalent to `set(None, None)`.
    pub fn clear(&self) {
        self.set(None, None);
    }

    /// Whether persistence has been abandoned for this instance.
    pub fn is_memory_only(&self) -> bool {
        self.inner
            .lock()
            .expect("session store lock poisoned")
            .memory_only
    }

    /// Register a listener. It is invoked synchronously once with the
    /// current snapshot, then again on every subsequent change, until the
    /// returned guard is dropped.
    pub fn subscribe(&self, listener: SessionListener) -> SubscriptionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let current = self.current();
        listener(&current);
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push(Subscriber {
                id,
                listener,
            });
        SubscriptionGuard {
            subscribers: Arc::downgrade(&self.subscribers),
            id,
        }
    }

    /// Apply a session observed through the shared medium's change signal.
    ///
    /// Compares the incoming principal's identity key against the cached
    /// one. An unchanged identity (including still-logged-out) refreshes the
    /// cache and notifies subscribers. A changed identity — a different
    /// user, a login, or a logout performed by another instance — is a hard
    /// conflict: no merge is attempted and the caller must escalate.
    pub fn apply_external(&self, incoming: Session) -> ExternalOutcome {
        let previous = self.current();
        if previous.user_id() != incoming.user_id() {
            debug!(
                "External session identity change: {:?} -> {:?}",
                previous.user_id(),
                incoming.user_id()
            );
            return ExternalOutcome::IdentityConflict { previous, incoming };
        }

        {
            let mut inner = self.inner.lock().expect("session store lock poisoned");
            inner.cache = Some(incoming.clone());
        }
        self.notify(&incoming);
        ExternalOutcome::Updated
    }

    fn read_from_disk(&self) -> Session {
        match crate::io::read_json::<PersistedSession>(&self.path) {
            Ok(persisted) => persisted.session,
            Err(e) => {
                debug!("No usable persisted session: {}", e);
                Session::empty()
            }
        }
    }

    fn notify(&self, session: &Session) {
        // Snapshot listeners so handlers can subscribe/unsubscribe
        // re-entrantly without deadlocking.
        let listeners: Vec<SessionListener> = self
            .subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .iter()
            .map(|s| Arc::clone(&s.listener))
            .collect();
        for listener in listeners {
            listener(session);
        }
    }
}

/// Unsubscribes its listener when dropped.
pub struct SubscriptionGuard {
    subscribers: Weak<Mutex<Vec<Subscriber>>>,
    id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            if let Ok(mut list) = subscribers.lock() {
                list.retain(|s| s.id != self.id);
            }
        }
    }
}
