/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Outbound channel capability.
//!
//! The session owns a [`Responder`] while a connection is up; it is the
//! only way the engine touches the transport. Ownership is one-way: the
//! transport side holds no reference back into the session beyond
//! delivering inbound bytes, which keeps the session/transport graph
//! acyclic.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Capability to push bytes to the peer and to drop the connection.
pub trait Responder: Send + Sync {
    /// Sends raw bytes to the peer.
    ///
    /// # Returns
    /// `false` if the transport has already gone away.
    fn send_bytes(&self, bytes: Bytes) -> bool;

    /// Tears the transport down.
    fn disconnect(&self);
}

/// Responder that records everything, for driving the engine in tests
/// without sockets.
#[derive(Debug, Default)]
pub struct VecResponder {
    sent: Mutex<Vec<Bytes>>,
    disconnected: AtomicBool,
}

impl VecResponder {
    /// Creates an empty recording responder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all frames sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Returns sent frames decoded to strings with SOH shown as `|`.
    #[must_use]
    pub fn sent_printable(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|b| String::from_utf8_lossy(b).replace('\x01', "|"))
            .collect()
    }

    /// Returns true once `disconnect` has been called.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Drops recorded frames.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Responder for VecResponder {
    fn send_bytes(&self, bytes: Bytes) -> bool {
        if self.is_disconnected() {
            return false;
        }
        self.sent.lock().push(bytes);
        true
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_responder_records_and_stops() {
        let responder = VecResponder::new();
        assert!(responder.send_bytes(Bytes::from_static(b"8=FIX.4.4\x01")));
        assert_eq!(responder.sent().len(), 1);
        assert_eq!(responder.sent_printable()[0], "8=FIX.4.4|");

        responder.disconnect();
        assert!(responder.is_disconnected());
        assert!(!responder.send_bytes(Bytes::from_static(b"x")));
        assert_eq!(responder.sent().len(), 1);
    }
}
