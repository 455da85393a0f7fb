/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Mutable per-session runtime state.
//!
//! [`SessionState`] holds everything that changes while a session runs:
//! connection and logon-phase flags, timer bookkeeping, the queue of
//! out-of-order inbound messages, and the outstanding resend range.
//! Sequence numbers live in the `MessageStore`, not here, so they survive
//! the process.
//!
//! The timer predicates encode the FIX timing convention: a TestRequest
//! fires at `1.2 x (counter + 1) x HeartBtInt` of inbound silence, and the
//! connection is declared dead at `2.4 x HeartBtInt`.

use fixline_core::Message;
use fixline_core::types::UtcTimestamp;
use std::collections::BTreeMap;
use std::time::Duration;

/// Inbound-silence multiple at which the session gives up on the peer.
pub const HEARTBEAT_TIMEOUT_MULTIPLIER: f64 = 2.4;

/// Inbound-silence multiple at which a TestRequest is sent.
pub const TEST_REQUEST_MULTIPLIER: f64 = 1.2;

/// Transport-level connection state. The logon phase is tracked by the
/// `sent_logon`/`received_logon` flags, not folded in here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Transport attempting to connect.
    Pending,
    /// Byte stream established.
    Connected,
}

/// An outstanding resend request: the peer owes us `begin..=end`, and we
/// have asked for messages up to `chunk_end` so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendRange {
    /// First missing sequence number.
    pub begin: u64,
    /// Last missing sequence number.
    pub end: u64,
    /// End of the chunk requested so far (== `end` when unchunked).
    pub chunk_end: u64,
}

/// Runtime state of one session.
#[derive(Debug)]
pub struct SessionState {
    /// Transport connection state.
    pub connection: ConnectionState,
    /// Cleared to ask the engine for a graceful logout.
    pub enabled: bool,
    /// We sent a Logon this connection.
    pub sent_logon: bool,
    /// The peer's Logon arrived this connection.
    pub received_logon: bool,
    /// We sent a Logout and await the peer's confirmation.
    pub sent_logout: bool,
    /// We sent ResetSeqNumFlag=Y on our Logon.
    pub sent_reset: bool,
    /// The peer's Logon carried ResetSeqNumFlag=Y.
    pub received_reset: bool,
    /// Text for the next generated Logout.
    pub logout_reason: Option<String>,
    /// When the last message was sent.
    pub last_sent: UtcTimestamp,
    /// When the last message was received.
    pub last_received: UtcTimestamp,
    /// TestRequests sent since the last inbound message.
    pub test_request_counter: u32,
    /// Outstanding resend range, if any.
    pub resend_range: Option<ResendRange>,
    /// Inbound messages held back while a gap is outstanding.
    pub queue: BTreeMap<u64, Message>,
    /// When the current logical session began.
    pub creation_time: UtcTimestamp,
}

impl SessionState {
    /// Creates state for a freshly constructed session.
    #[must_use]
    pub fn new(now: UtcTimestamp) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            enabled: true,
            sent_logon: false,
            received_logon: false,
            sent_logout: false,
            sent_reset: false,
            received_reset: false,
            logout_reason: None,
            last_sent: now,
            last_received: now,
            test_request_counter: 0,
            resend_range: None,
            queue: BTreeMap::new(),
            creation_time: now,
        }
    }

    /// A session is logged on once both Logons have happened.
    #[must_use]
    pub fn is_logged_on(&self) -> bool {
        self.sent_logon && self.received_logon
    }

    /// Clears per-connection flags after a disconnect; sequence numbers
    /// are untouched.
    pub fn on_disconnect(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.sent_logon = false;
        self.received_logon = false;
        self.sent_logout = false;
        self.sent_reset = false;
        self.received_reset = false;
        self.test_request_counter = 0;
        self.resend_range = None;
        self.queue.clear();
    }

    /// Begins a new logical session: per-connection flags cleared and the
    /// creation time restamped.
    pub fn reset(&mut self, now: UtcTimestamp) {
        self.on_disconnect();
        self.logout_reason = None;
        self.last_sent = now;
        self.last_received = now;
        self.creation_time = now;
    }

    /// Records an inbound message; resets the TestRequest escalation.
    pub fn record_received(&mut self, now: UtcTimestamp) {
        self.last_received = now;
        self.test_request_counter = 0;
    }

    /// Records an outbound message.
    pub fn record_sent(&mut self, now: UtcTimestamp) {
        self.last_sent = now;
    }

    /// Holds back an out-of-order message under its sequence number.
    pub fn enqueue(&mut self, seq: u64, message: Message) {
        self.queue.insert(seq, message);
    }

    /// Takes the queued message for `seq`, if present.
    pub fn dequeue(&mut self, seq: u64) -> Option<Message> {
        self.queue.remove(&seq)
    }

    /// True while the logon reply has not arrived within `timeout` of the
    /// last inbound byte.
    #[must_use]
    pub fn logon_timed_out(&self, now: UtcTimestamp, timeout: Duration) -> bool {
        self.sent_logon
            && !self.received_logon
            && now.millis_since(self.last_received) >= timeout.as_millis() as i64
    }

    /// True while the logout confirmation has not arrived within `timeout`
    /// of our Logout.
    #[must_use]
    pub fn logout_timed_out(&self, now: UtcTimestamp, timeout: Duration) -> bool {
        self.sent_logout && now.millis_since(self.last_sent) >= timeout.as_millis() as i64
    }

    /// True when both directions are inside the heartbeat interval.
    #[must_use]
    pub fn within_heartbeat(&self, now: UtcTimestamp, heart_bt_int: u64) -> bool {
        let interval = (heart_bt_int * 1_000) as i64;
        now.millis_since(self.last_sent) < interval
            && now.millis_since(self.last_received) < interval
    }

    /// True when inbound silence has reached `2.4 x HeartBtInt`.
    #[must_use]
    pub fn timed_out(&self, now: UtcTimestamp, heart_bt_int: u64) -> bool {
        let threshold = (HEARTBEAT_TIMEOUT_MULTIPLIER * (heart_bt_int * 1_000) as f64) as i64;
        now.millis_since(self.last_received) >= threshold
    }

    /// True when inbound silence warrants the next TestRequest, at
    /// `1.2 x (counter + 1) x HeartBtInt`.
    #[must_use]
    pub fn needs_test_request(&self, now: UtcTimestamp, heart_bt_int: u64) -> bool {
        let threshold = (TEST_REQUEST_MULTIPLIER
            * f64::from(self.test_request_counter + 1)
            * (heart_bt_int * 1_000) as f64) as i64;
        now.millis_since(self.last_received) >= threshold
    }

    /// True when outbound silence warrants a Heartbeat and no TestRequest
    /// escalation is in progress.
    #[must_use]
    pub fn needs_heartbeat(&self, now: UtcTimestamp, heart_bt_int: u64) -> bool {
        now.millis_since(self.last_sent) >= (heart_bt_int * 1_000) as i64
            && self.test_request_counter == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> UtcTimestamp {
        UtcTimestamp::from_ymd_hms(2026, 1, 27, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_logged_on_requires_both_flags() {
        let mut state = SessionState::new(start());
        assert!(!state.is_logged_on());
        state.sent_logon = true;
        assert!(!state.is_logged_on());
        state.received_logon = true;
        assert!(state.is_logged_on());
    }

    #[test]
    fn test_heartbeat_window() {
        let state = SessionState::new(start());
        assert!(state.within_heartbeat(start().plus_millis(29_999), 30));
        assert!(!state.within_heartbeat(start().plus_millis(30_000), 30));
    }

    #[test]
    fn test_test_request_escalation_thresholds() {
        let mut state = SessionState::new(start());
        // first test request at 1.2 * 30s = 36s
        assert!(!state.needs_test_request(start().plus_millis(35_999), 30));
        assert!(state.needs_test_request(start().plus_millis(36_000), 30));

        state.test_request_counter = 1;
        // second at 1.2 * 2 * 30s = 72s
        assert!(!state.needs_test_request(start().plus_millis(71_999), 30));
        assert!(state.needs_test_request(start().plus_millis(72_000), 30));
    }

    #[test]
    fn test_timeout_threshold() {
        let state = SessionState::new(start());
        // 2.4 * 30s = 72s
        assert!(!state.timed_out(start().plus_millis(71_999), 30));
        assert!(state.timed_out(start().plus_millis(72_000), 30));
    }

    #[test]
    fn test_needs_heartbeat_suppressed_during_escalation() {
        let mut state = SessionState::new(start());
        let later = start().plus_millis(31_000);
        assert!(state.needs_heartbeat(later, 30));
        state.test_request_counter = 1;
        assert!(!state.needs_heartbeat(later, 30));
    }

    #[test]
    fn test_record_received_resets_counter() {
        let mut state = SessionState::new(start());
        state.test_request_counter = 2;
        state.record_received(start().plus_millis(40_000));
        assert_eq!(state.test_request_counter, 0);
        assert_eq!(state.last_received.millis_since(start()), 40_000);
    }

    #[test]
    fn test_disconnect_clears_connection_flags_only() {
        let mut state = SessionState::new(start());
        state.connection = ConnectionState::Connected;
        state.sent_logon = true;
        state.received_logon = true;
        state.enqueue(5, Message::new());
        state.resend_range = Some(ResendRange {
            begin: 2,
            end: 4,
            chunk_end: 4,
        });

        state.on_disconnect();

        assert_eq!(state.connection, ConnectionState::Disconnected);
        assert!(!state.is_logged_on());
        assert!(state.queue.is_empty());
        assert!(state.resend_range.is_none());
    }

    #[test]
    fn test_reset_restamps_creation_time() {
        let mut state = SessionState::new(start());
        let later = start().plus_millis(60_000);
        state.reset(later);
        assert_eq!(state.creation_time, later);
    }
}
