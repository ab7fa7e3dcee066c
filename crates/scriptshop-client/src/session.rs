//! Process-wide session context.
//!
//! One [`SessionContext`] is created at startup and shared by clone. It holds
//! the current [`Session`] (identity plus access token) in a
//! `tokio::sync::watch` channel so views can react to sign-in and sign-out.
//! Only [`AuthClient`](crate::auth::AuthClient) writes to it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use scriptshop_shared::Identity;

use crate::error::{ClientError, Result};

/// An authenticated session issued by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub identity: Identity,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Inner {
    sender: Mutex<Option<watch::Sender<Option<Session>>>>,
    next_subscriber: AtomicU64,
}

#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Inner>,
}

impl SessionContext {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                sender: Mutex::new(Some(sender)),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    fn sender(&self) -> MutexGuard<'_, Option<watch::Sender<Option<Session>>>> {
        // The guarded value is a plain handle; a poisoned lock is still usable.
        self.inner
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the current session, `None` when signed out or shut down.
    pub fn current(&self) -> Option<Session> {
        self.sender()
            .as_ref()
            .and_then(|tx| tx.borrow().clone())
    }

    pub fn identity(&self) -> Option<Identity> {
        self.current().map(|s| s.identity)
    }

    pub fn access_token(&self) -> Option<String> {
        self.current().map(|s| s.access_token)
    }

    pub fn is_closed(&self) -> bool {
        self.sender().is_none()
    }

    /// Register a listener. Fails once the context has been shut down.
    pub fn subscribe(&self) -> Result<SessionSubscription> {
        let guard = self.sender();
        let tx = guard.as_ref().ok_or(ClientError::SessionClosed)?;
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        debug!(subscriber = id, "Session listener subscribed");
        Ok(SessionSubscription {
            id,
            receiver: tx.subscribe(),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender().as_ref().map_or(0, |tx| tx.receiver_count())
    }

    /// Replace the current session and notify every listener.
    pub(crate) fn set(&self, session: Option<Session>) -> Result<()> {
        let guard = self.sender();
        let tx = guard.as_ref().ok_or(ClientError::SessionClosed)?;
        let signed_in = session.as_ref().map(|s| s.identity.id);
        tx.send_replace(session);
        debug!(user = ?signed_in, "Session changed");
        Ok(())
    }

    /// Tear the context down: listeners see the channel close and later
    /// `subscribe` calls fail.
    pub fn shutdown(&self) {
        if self.sender().take().is_some() {
            debug!("Session context shut down");
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A live listener on the session context. Dropping it unsubscribes.
pub struct SessionSubscription {
    id: u64,
    receiver: watch::Receiver<Option<Session>>,
}

impl SessionSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Latest value seen by this listener.
    pub fn current(&self) -> Option<Session> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the context is shut down.
    pub async fn changed(&mut self) -> Option<Option<Session>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {}
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        debug!(subscriber = self.id, "Session listener unsubscribed");
    }
}
