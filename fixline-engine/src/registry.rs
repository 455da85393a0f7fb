/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session registry.
//!
//! An explicit, shareable map from [`SessionId`] to session handle. The
//! registry is passed to the supervisors rather than living in a global,
//! so independent engines can coexist in one process. Reads vastly
//! outnumber writes, hence the `parking_lot::RwLock` around a plain map.

use fixline_core::error::{FixError, SessionError};
use fixline_core::types::SessionId;
use fixline_session::session::{Session, SessionHandle, into_handle};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Process-wide map of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under its identity and fires `on_create`.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidState`] when the identity is
    /// already registered.
    pub async fn register(&self, session: Session) -> Result<SessionHandle, FixError> {
        let id = session.session_id().clone();
        let handle = into_handle(session);
        {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(&id) {
                return Err(
                    SessionError::InvalidState(format!("session {id} already registered")).into(),
                );
            }
            sessions.insert(id.clone(), Arc::clone(&handle));
        }
        handle.lock().await.notify_created().await;
        info!(session = %id, "session registered");
        Ok(handle)
    }

    /// Looks up a session by identity.
    #[must_use]
    pub fn lookup(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().get(id).cloned()
    }

    /// Removes a session; subsequent operations on the handle still work
    /// but the registry no longer routes to it.
    pub fn remove(&self, id: &SessionId) -> Option<SessionHandle> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            info!(session = %id, "session removed");
        }
        removed
    }

    /// Snapshot of all registered handles.
    #[must_use]
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.read().values().cloned().collect()
    }

    /// Snapshot of all registered identities.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Spawns the timer task driving every registered session's tick.
pub fn spawn_ticker(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    for handle in registry.handles() {
                        let mut session = handle.lock().await;
                        if let Err(e) = session.tick().await {
                            tracing::warn!(
                                session = %session.session_id(),
                                error = %e,
                                "tick failed"
                            );
                        }
                    }
                }
            }
        }
    })
}

/// Shared supervisor shutdown: ask logged-on sessions to log out, wait up
/// to the longest configured LogoutTimeout for the peers' confirmations,
/// then force-disconnect whatever is left.
pub(crate) async fn graceful_shutdown(registry: &SessionRegistry) {
    let mut wait = Duration::from_secs(2);
    for handle in registry.handles() {
        let mut session = handle.lock().await;
        wait = wait.max(session.config().logout_timeout);
        if session.is_logged_on() && !session.state().sent_logout {
            session.request_logout("engine stopping");
            if let Err(e) = session.tick().await {
                tracing::warn!(session = %session.session_id(), error = %e, "logout send failed");
            }
        }
    }

    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let mut awaiting_peer = false;
        for handle in registry.handles() {
            let session = handle.lock().await;
            if session.has_responder() && session.state().sent_logout {
                awaiting_peer = true;
            }
        }
        if !awaiting_peer || tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    for handle in registry.handles() {
        let mut session = handle.lock().await;
        if session.has_responder() {
            if let Err(e) = session.disconnect("engine stopped").await {
                tracing::warn!(session = %session.session_id(), error = %e, "forced disconnect failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::clock::{SharedClock, SystemClock};
    use fixline_core::types::{CompId, FixVersion};
    use fixline_session::application::{Application, NoOpApplication};
    use fixline_session::config::{ConnectionType, SessionConfig};
    use fixline_store::{MemoryStore, MessageStore};

    fn make_session(sender: &str) -> Session {
        let id = SessionId::new(
            FixVersion::Fix44,
            CompId::new(sender).unwrap(),
            CompId::new("TARGET").unwrap(),
        );
        Session::new(
            SessionConfig::new(id, ConnectionType::Acceptor),
            Arc::new(MemoryStore::new()) as Arc<dyn MessageStore>,
            Arc::new(NoOpApplication) as Arc<dyn Application>,
            Arc::new(SystemClock) as SharedClock,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_lookup_remove() {
        let registry = SessionRegistry::new();
        let handle = registry.register(make_session("ALPHA")).await.unwrap();
        let id = handle.lock().await.session_id().clone();

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&id).is_some());

        assert!(registry.remove(&id).is_some());
        assert!(registry.lookup(&id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration_refused() {
        let registry = SessionRegistry::new();
        registry.register(make_session("ALPHA")).await.unwrap();
        let err = registry.register(make_session("ALPHA")).await.unwrap_err();
        assert!(matches!(
            err,
            FixError::Session(SessionError::InvalidState(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_by_reversed_id() {
        let registry = SessionRegistry::new();
        registry.register(make_session("ALPHA")).await.unwrap();

        // as an acceptor would: reverse the on-the-wire identity
        let wire_id = SessionId::new(
            FixVersion::Fix44,
            CompId::new("TARGET").unwrap(),
            CompId::new("ALPHA").unwrap(),
        );
        assert!(registry.lookup(&wire_id.reverse()).is_some());
    }
}
