/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Application callback interface.
//!
//! The session engine reports lifecycle events and routes messages to
//! user code through this trait, following the QuickFIX callback shape:
//! `on_create`/`on_logon`/`on_logout` for lifecycle, `to_admin`/`to_app`
//! for outbound interception, `from_admin`/`from_app` for inbound
//! delivery. `to_app` may veto an outbound message with [`DoNotSend`];
//! `from_admin` may refuse a Logon with [`CallbackError::RejectLogon`].

use async_trait::async_trait;
use fixline_core::Message;
use fixline_core::error::ValidationError;
use fixline_core::types::SessionId;
use thiserror::Error;

/// Veto returned by [`Application::to_app`]; the message is silently
/// dropped, the sequence number is not consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoNotSend;

/// Rejection returned by the inbound callbacks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// Refuse a Logon: the engine answers with a Logout carrying the
    /// reason, then disconnects.
    #[error("logon rejected: {reason}")]
    RejectLogon {
        /// Text for the Logout message.
        reason: String,
    },

    /// Reject the message at session level (35=3).
    #[error("message rejected: {0}")]
    Reject(#[from] ValidationError),
}

/// Callbacks from the session engine into user code.
///
/// All methods default to no-ops that accept everything, so applications
/// implement only what they care about.
#[async_trait]
pub trait Application: Send + Sync {
    /// Called once when the session is registered.
    async fn on_create(&self, _session_id: &SessionId) {}

    /// Called when both Logons have completed.
    async fn on_logon(&self, _session_id: &SessionId) {}

    /// Called when a logged-on session ends, gracefully or not.
    async fn on_logout(&self, _session_id: &SessionId) {}

    /// Called before an administrative message is sent; the message may
    /// be modified in place.
    async fn to_admin(&self, _message: &mut Message, _session_id: &SessionId) {}

    /// Called when an administrative message is received.
    ///
    /// # Errors
    /// [`CallbackError::RejectLogon`] during logon refuses the session;
    /// [`CallbackError::Reject`] produces a session-level Reject.
    async fn from_admin(
        &self,
        _message: &Message,
        _session_id: &SessionId,
    ) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Called before an application message is sent; returning
    /// [`DoNotSend`] suppresses it silently.
    ///
    /// # Errors
    /// [`DoNotSend`] aborts the send.
    async fn to_app(
        &self,
        _message: &mut Message,
        _session_id: &SessionId,
    ) -> Result<(), DoNotSend> {
        Ok(())
    }

    /// Called when an application message is delivered in sequence order.
    ///
    /// # Errors
    /// [`CallbackError::Reject`] produces a session-level Reject.
    async fn from_app(
        &self,
        _message: &Message,
        _session_id: &SessionId,
    ) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Application that accepts everything and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpApplication;

#[async_trait]
impl Application for NoOpApplication {}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::types::{CompId, FixVersion};

    #[tokio::test]
    async fn test_noop_accepts_everything() {
        let app = NoOpApplication;
        let id = SessionId::new(
            FixVersion::Fix44,
            CompId::new("S").unwrap(),
            CompId::new("T").unwrap(),
        );
        let mut msg = Message::new();

        app.on_create(&id).await;
        app.to_admin(&mut msg, &id).await;
        assert!(app.from_admin(&msg, &id).await.is_ok());
        assert!(app.to_app(&mut msg, &id).await.is_ok());
        assert!(app.from_app(&msg, &id).await.is_ok());
    }

    #[test]
    fn test_callback_error_display() {
        let err = CallbackError::RejectLogon {
            reason: "unknown counterparty".to_string(),
        };
        assert_eq!(err.to_string(), "logon rejected: unknown counterparty");
    }
}
