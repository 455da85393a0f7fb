/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The session protocol state machine.
//!
//! A [`Session`] reacts to three event sources: an inbound parsed message
//! ([`Session::on_message`]), a periodic timer tick ([`Session::tick`]),
//! and administrative operations (send, disconnect, reset, responder
//! attachment). All of them run under one per-session `tokio::sync::Mutex`
//! held by the owner of the [`SessionHandle`]; the engine itself is
//! single-threaded per session.
//!
//! Inbound flow: BeginString check, dictionary validation, then routing
//! by MsgType. Sequence gaps queue the message and emit a ResendRequest;
//! messages below the expected sequence number without PossDupFlag are
//! protocol-fatal. Outbound flow stamps the header, runs the application
//! callbacks, persists, and pushes bytes through the [`Responder`].

use crate::application::{Application, CallbackError};
use crate::config::SessionConfig;
use crate::responder::Responder;
use crate::state::{ConnectionState, ResendRange, SessionState};
use fixline_core::clock::SharedClock;
use fixline_core::error::{
    ConfigError, FixError, RejectReason, SessionError, ValidationError,
};
use fixline_core::types::{FixVersion, SessionId, TimestampPrecision};
use fixline_core::{Message, MsgType, tags};
use fixline_dictionary::{Dictionary, Validator};
use fixline_store::MessageStore;
use fixline_tagvalue::MessageParser;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared, mutex-guarded session; the per-session critical section.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// TestReqID used for engine-generated TestRequests.
const TEST_REQ_ID: &str = "TEST";

/// One FIX session: configuration, runtime state, store, application
/// callbacks and the outbound channel.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    store: Arc<dyn MessageStore>,
    app: Arc<dyn Application>,
    validator: Validator,
    parser: MessageParser,
    clock: SharedClock,
    responder: Option<Arc<dyn Responder>>,
}

impl Session {
    /// Creates a session from validated configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the configuration is inconsistent;
    /// nothing is re-checked later.
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn MessageStore>,
        app: Arc<dyn Application>,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let transport = config
            .transport_dictionary
            .clone()
            .unwrap_or_else(|| Arc::new(Dictionary::session_layer(config.begin_string())));
        let (validator, parser) = match &config.app_dictionary {
            Some(app_dict) if config.begin_string().is_fixt() => (
                Validator::fixt(Arc::clone(&transport), Arc::clone(app_dict)),
                MessageParser::fixt(Arc::clone(&transport), Arc::clone(app_dict)),
            ),
            _ => (
                Validator::new(Arc::clone(&transport)),
                MessageParser::new(Arc::clone(&transport)),
            ),
        };
        let parser =
            parser.with_length_and_checksum_validation(config.validate_length_and_checksum);

        let state = SessionState::new(clock.now());
        Ok(Self {
            config,
            state,
            store,
            app,
            validator,
            parser,
            clock,
            responder: None,
        })
    }

    /// Returns the session identity.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.config.session_id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the runtime state (test and supervision introspection).
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns true once both Logons have completed.
    #[must_use]
    pub fn is_logged_on(&self) -> bool {
        self.state.is_logged_on()
    }

    /// Returns true while a transport is attached.
    #[must_use]
    pub fn has_responder(&self) -> bool {
        self.responder.is_some()
    }

    /// Marks the transport as attempting to connect.
    pub fn set_pending(&mut self) {
        self.state.connection = ConnectionState::Pending;
    }

    /// Attaches the outbound channel; the byte stream is up.
    pub fn set_responder(&mut self, responder: Arc<dyn Responder>) {
        let now = self.clock.now();
        self.state.connection = ConnectionState::Connected;
        self.state.last_sent = now;
        self.state.last_received = now;
        self.responder = Some(responder);
        info!(session = %self.config.session_id, "transport attached");
    }

    /// Fires the application's `on_create` callback; called once by the
    /// registry when the session is registered.
    pub async fn notify_created(&self) {
        let app = Arc::clone(&self.app);
        app.on_create(&self.config.session_id).await;
    }

    /// Requests a graceful logout; the next tick sends the Logout.
    pub fn request_logout(&mut self, reason: impl Into<String>) {
        self.state.enabled = false;
        self.state.logout_reason = Some(reason.into());
    }

    /// Re-arms a session disabled by [`Session::request_logout`].
    pub fn set_enabled(&mut self) {
        self.state.enabled = true;
        self.state.logout_reason = None;
    }

    /// Drops the transport and clears per-connection state; fires
    /// `on_logout` if a logon had happened.
    ///
    /// # Errors
    /// Returns [`FixError::Store`] if `ResetOnDisconnect` fails to reset.
    pub async fn disconnect(&mut self, reason: &str) -> Result<(), FixError> {
        if let Some(responder) = self.responder.take() {
            info!(session = %self.config.session_id, reason, "disconnecting");
            responder.disconnect();
        }
        let had_logon = self.state.sent_logon || self.state.received_logon;
        self.state.on_disconnect();
        if self.config.reset_on_disconnect {
            self.store.reset().await?;
            info!(session = %self.config.session_id, "sequence numbers reset on disconnect");
        }
        if had_logon {
            let app = Arc::clone(&self.app);
            let id = self.config.session_id.clone();
            app.on_logout(&id).await;
        }
        Ok(())
    }

    /// Ends the logical session: Logout if logged on, disconnect, both
    /// sequence numbers back to 1, queue and resend range cleared.
    ///
    /// # Errors
    /// Returns [`FixError`] if the Logout cannot be sent or the store
    /// cannot be reset.
    pub async fn reset(&mut self, reason: &str, logout_text: Option<&str>) -> Result<(), FixError> {
        if self.state.is_logged_on() {
            self.generate_logout(logout_text.map(String::from)).await?;
        }
        self.disconnect(reason).await?;
        self.store.reset().await?;
        self.state.reset(self.clock.now());
        info!(session = %self.config.session_id, reason, "session reset");
        Ok(())
    }

    /// Sends an application or administrative message on this session.
    ///
    /// Any caller-supplied PossDupFlag/OrigSendingTime is stripped; the
    /// header is stamped under the session lock; `to_app` may veto with
    /// DoNotSend (the send is silently dropped).
    ///
    /// # Errors
    /// Returns [`FixError`] on encode or store failure.
    ///
    /// # Returns
    /// `false` when no transport is attached or the message was vetoed;
    /// the message is still persisted and consumes a sequence number
    /// unless vetoed.
    pub async fn send(&mut self, mut message: Message) -> Result<bool, FixError> {
        message.header.remove(tags::POSS_DUP_FLAG);
        message.header.remove(tags::ORIG_SENDING_TIME);
        self.send_message(message, false, None).await
    }

    /// Feeds one framed message into the state machine.
    ///
    /// # Errors
    /// Protocol-fatal conditions (sequence number too low without
    /// PossDupFlag) disconnect the session and surface as
    /// [`FixError::Session`]; everything else is handled internally.
    pub async fn on_message(&mut self, raw: &[u8]) -> Result<(), FixError> {
        let message = match self.parser.parse(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(session = %self.config.session_id, error = %e, "discarding garbled message");
                return Ok(());
            }
        };
        self.state.record_received(self.clock.now());
        debug!(session = %self.config.session_id, msg = %message, "received");

        let expected_begin = self.config.begin_string().begin_string();
        let received_begin = message.header.get(tags::BEGIN_STRING).unwrap_or("");
        if received_begin != expected_begin {
            error!(
                session = %self.config.session_id,
                received = received_begin,
                "unsupported BeginString"
            );
            self.generate_logout(Some("Incorrect BeginString".to_string()))
                .await?;
            self.disconnect("unsupported BeginString").await?;
            return Err(SessionError::UnsupportedVersion {
                expected: expected_begin.to_string(),
                received: received_begin.to_string(),
            }
            .into());
        }

        if self.config.use_data_dictionary {
            if let Err(verr) = self.validator.validate(&message) {
                let is_logon = message.msg_type() == Ok(MsgType::Logon);
                if is_logon && verr.reason == RejectReason::RequiredTagMissing {
                    // a Logon we cannot trust ends the connection
                    error!(session = %self.config.session_id, error = %verr, "invalid logon");
                    self.disconnect("required field missing from logon").await?;
                    return Ok(());
                }
                warn!(session = %self.config.session_id, error = %verr, "message failed validation");
                self.generate_reject(&message, verr).await?;
                return Ok(());
            }
        }

        match self.dispatch(message).await {
            Ok(()) => {}
            Err(FixError::Session(e)) if e.is_protocol_fatal() => {
                error!(session = %self.config.session_id, error = %e, "protocol violation");
                self.disconnect(&e.to_string()).await?;
                return Err(e.into());
            }
            Err(e) => return Err(e),
        }

        self.drain_queue().await
    }

    /// Timer tick: schedule enforcement, logon/logout timeouts, heartbeat
    /// and test-request generation, in the protocol's prescribed order.
    ///
    /// # Errors
    /// Returns [`FixError`] if a generated message cannot be sent.
    pub async fn tick(&mut self) -> Result<(), FixError> {
        let now = self.clock.now();
        if self.responder.is_none() || self.state.connection != ConnectionState::Connected {
            return Ok(());
        }

        if !self.config.schedule.is_session_time(now) {
            if self.config.is_initiator() {
                self.reset("out of session time", None).await?;
            } else {
                self.reset(
                    "out of session time",
                    Some("Message received outside of session time"),
                )
                .await?;
            }
            return Ok(());
        }

        if self
            .config
            .schedule
            .is_new_session(self.state.creation_time, now)
        {
            self.reset("new session", None).await?;
            return Ok(());
        }

        if !self.state.enabled {
            if self.state.is_logged_on() {
                if !self.state.sent_logout {
                    info!(session = %self.config.session_id, "initiated logout request");
                    let reason = self.state.logout_reason.clone();
                    self.generate_logout(reason).await?;
                }
            } else {
                self.disconnect("session disabled").await?;
                return Ok(());
            }
        }

        if !self.state.received_logon {
            if !self.state.sent_logon {
                if self.config.is_initiator() {
                    info!(session = %self.config.session_id, "initiated logon request");
                    self.generate_logon().await?;
                } else if now.millis_since(self.state.last_received)
                    >= self.config.logon_timeout.as_millis() as i64
                {
                    warn!(session = %self.config.session_id, "timed out waiting for logon request");
                    self.disconnect("logon timeout").await?;
                }
            } else if self
                .state
                .logon_timed_out(now, self.config.logon_timeout)
            {
                warn!(session = %self.config.session_id, "timed out waiting for logon response");
                self.disconnect("logon timeout").await?;
            }
            return Ok(());
        }

        let heart_bt_int = self.config.heart_bt_int;
        if heart_bt_int == 0 {
            return Ok(());
        }

        if self.state.sent_logout && self.state.logout_timed_out(now, self.config.logout_timeout) {
            warn!(session = %self.config.session_id, "timed out waiting for logout response");
            self.disconnect("logout timeout").await?;
            return Ok(());
        }

        if self.state.within_heartbeat(now, heart_bt_int) {
            return Ok(());
        }

        if self.state.timed_out(now, heart_bt_int) {
            if self.config.send_logout_before_disconnect_from_timeout {
                self.generate_logout(Some("Timed out waiting for heartbeat".to_string()))
                    .await?;
            }
            error!(session = %self.config.session_id, "timed out waiting for heartbeat");
            self.disconnect("Timed out waiting for heartbeat").await?;
            return Ok(());
        }

        if self.state.needs_test_request(now, heart_bt_int) {
            self.generate_test_request(TEST_REQ_ID).await?;
            self.state.test_request_counter += 1;
            info!(session = %self.config.session_id, "sent test request");
        } else if self.state.needs_heartbeat(now, heart_bt_int) {
            self.generate_heartbeat(None).await?;
        }
        Ok(())
    }

    // ---- inbound routing ---------------------------------------------------

    async fn dispatch(&mut self, message: Message) -> Result<(), FixError> {
        match message.msg_type() {
            Ok(MsgType::Logon) => self.handle_logon(message).await,
            Ok(MsgType::Heartbeat) | Ok(MsgType::Reject) => self.handle_admin(message).await,
            Ok(MsgType::TestRequest) => self.handle_test_request(message).await,
            Ok(MsgType::ResendRequest) => self.handle_resend_request(message).await,
            Ok(MsgType::SequenceReset) => self.handle_sequence_reset(message).await,
            Ok(MsgType::Logout) => self.handle_logout(message).await,
            Ok(MsgType::App(_)) => self.handle_app(message).await,
            Err(_) => {
                self.generate_reject(
                    &message,
                    ValidationError::new(RejectReason::RequiredTagMissing)
                        .with_tag(tags::MSG_TYPE),
                )
                .await
            }
        }
    }

    /// Re-delivers queued messages while the next expected sequence
    /// number is available. A queued Logon was already acted on when it
    /// arrived, so only its sequence number is consumed; everything else
    /// (including a queued ResendRequest, whose servicing waits for its
    /// turn) goes back through the normal dispatch path.
    async fn drain_queue(&mut self) -> Result<(), FixError> {
        loop {
            let expected = self.store.next_target_seq();
            let Some(queued) = self.state.dequeue(expected) else {
                return Ok(());
            };
            info!(session = %self.config.session_id, seq = expected, "processing queued message");
            match queued.msg_type() {
                Ok(MsgType::Logon) => {
                    self.store.incr_next_target_seq();
                }
                _ => self.dispatch(queued).await?,
            }
        }
    }

    async fn handle_logon(&mut self, message: Message) -> Result<(), FixError> {
        let reset_flag = message
            .body
            .get_bool(tags::RESET_SEQ_NUM_FLAG)
            .unwrap_or(false);
        self.state.received_reset = reset_flag;
        if reset_flag {
            info!(session = %self.config.session_id, "peer requested sequence number reset");
            if !self.state.sent_reset {
                self.store.reset().await?;
            }
        }

        if !self.config.is_initiator() && self.config.reset_on_logon {
            self.store.reset().await?;
            info!(session = %self.config.session_id, "sequence numbers reset on logon");
        }
        if self.config.refresh_on_logon {
            self.store.refresh().await?;
            info!(session = %self.config.session_id, "store refreshed on logon");
        }

        if self.config.check_latency && !self.sending_time_ok(&message) {
            error!(session = %self.config.session_id, "logon had bad sending time");
            self.disconnect("logon had bad sending time").await?;
            return Ok(());
        }

        if !self.verify(&message, false, true).await? {
            return Ok(());
        }
        self.state.received_logon = true;
        info!(session = %self.config.session_id, "received logon");

        let app = Arc::clone(&self.app);
        let id = self.config.session_id.clone();
        match app.from_admin(&message, &id).await {
            Ok(()) => {}
            Err(CallbackError::RejectLogon { reason }) => {
                warn!(session = %self.config.session_id, reason, "logon rejected by application");
                self.generate_logout(Some(reason.clone())).await?;
                self.disconnect("logon rejected").await?;
                return Ok(());
            }
            Err(CallbackError::Reject(verr)) => {
                self.generate_reject(&message, verr).await?;
                return Ok(());
            }
        }

        if !self.config.is_initiator() {
            if let Ok(peer_interval) = message.body.get_u64(tags::HEART_BT_INT) {
                self.config.heart_bt_int = peer_interval;
                debug!(
                    session = %self.config.session_id,
                    seconds = peer_interval,
                    "adopted peer heartbeat interval"
                );
            }
            self.generate_logon_reply().await?;
        }

        let msg_seq = message.seq_num()?;
        if msg_seq > self.store.next_target_seq() && !reset_flag {
            self.handle_target_too_high(message).await?;
        } else {
            self.store.incr_next_target_seq();
        }

        if self.state.is_logged_on() {
            info!(session = %self.config.session_id, "logon complete");
            let app = Arc::clone(&self.app);
            let id = self.config.session_id.clone();
            app.on_logon(&id).await;
        }
        Ok(())
    }

    /// Heartbeat and Reject share the plain verify/deliver path.
    async fn handle_admin(&mut self, message: Message) -> Result<(), FixError> {
        if !self.verify(&message, true, true).await? {
            return Ok(());
        }
        if self.deliver_admin(&message).await? {
            self.store.incr_next_target_seq();
        }
        Ok(())
    }

    async fn handle_test_request(&mut self, message: Message) -> Result<(), FixError> {
        if !self.verify(&message, true, true).await? {
            return Ok(());
        }
        if self.deliver_admin(&message).await? {
            self.store.incr_next_target_seq();
            let test_req_id = message.body.get(tags::TEST_REQ_ID).map(String::from);
            self.generate_heartbeat(test_req_id).await?;
        }
        Ok(())
    }

    async fn handle_resend_request(&mut self, message: Message) -> Result<(), FixError> {
        if self.config.ignore_poss_dup_resend_requests && message.poss_dup() {
            info!(session = %self.config.session_id, "ignoring resend request marked PossDup");
            if message.seq_num().ok() == Some(self.store.next_target_seq()) {
                self.store.incr_next_target_seq();
            }
            return Ok(());
        }

        if !self.verify(&message, true, true).await? {
            return Ok(());
        }
        if !self.deliver_admin(&message).await? {
            return Ok(());
        }
        self.service_resend_request(&message).await?;
        self.store.incr_next_target_seq();
        Ok(())
    }

    async fn handle_sequence_reset(&mut self, message: Message) -> Result<(), FixError> {
        let gap_fill = message
            .body
            .get_bool(tags::GAP_FILL_FLAG)
            .unwrap_or(false);
        // a gap fill obeys the sequence window like any other message; a
        // hard reset exists to overwrite the counter, so the window checks
        // must not apply to it
        if !self.verify(&message, gap_fill, gap_fill).await? {
            return Ok(());
        }
        if !self.deliver_admin(&message).await? {
            return Ok(());
        }

        let new_seq = match message.body.get_u64(tags::NEW_SEQ_NO) {
            Ok(seq) => seq,
            Err(_) => {
                return self
                    .generate_reject(
                        &message,
                        ValidationError::new(RejectReason::RequiredTagMissing)
                            .with_tag(tags::NEW_SEQ_NO),
                    )
                    .await;
            }
        };
        let expected = self.store.next_target_seq();
        if new_seq > expected {
            info!(
                session = %self.config.session_id,
                from = expected,
                to = new_seq,
                gap_fill,
                "sequence reset"
            );
            self.store.set_next_target_seq(new_seq);
        } else if new_seq < expected {
            self.generate_reject(
                &message,
                ValidationError::new(RejectReason::ValueOutOfRange).with_tag(tags::NEW_SEQ_NO),
            )
            .await?;
        }
        Ok(())
    }

    async fn handle_logout(&mut self, message: Message) -> Result<(), FixError> {
        if !self.verify(&message, true, true).await? {
            return Ok(());
        }
        if !self.deliver_admin(&message).await? {
            return Ok(());
        }
        self.store.incr_next_target_seq();

        if self.state.sent_logout {
            info!(session = %self.config.session_id, "received logout response");
        } else {
            info!(session = %self.config.session_id, "received logout request");
            self.generate_logout(None).await?;
        }

        if self.config.reset_on_logout {
            self.store.reset().await?;
            info!(session = %self.config.session_id, "sequence numbers reset on logout");
        }
        self.disconnect("logout complete").await
    }

    async fn handle_app(&mut self, message: Message) -> Result<(), FixError> {
        if !self.verify(&message, true, true).await? {
            return Ok(());
        }
        let app = Arc::clone(&self.app);
        let id = self.config.session_id.clone();
        match app.from_app(&message, &id).await {
            Ok(()) => {
                self.store.incr_next_target_seq();
                Ok(())
            }
            Err(CallbackError::Reject(verr)) => self.generate_reject(&message, verr).await,
            Err(CallbackError::RejectLogon { reason }) => {
                self.generate_reject(
                    &message,
                    ValidationError::new(RejectReason::Other).with_detail(reason),
                )
                .await
            }
        }
    }

    /// Runs `from_admin`; returns false when the callback rejected the
    /// message (the Reject has been generated).
    async fn deliver_admin(&mut self, message: &Message) -> Result<bool, FixError> {
        let app = Arc::clone(&self.app);
        let id = self.config.session_id.clone();
        match app.from_admin(message, &id).await {
            Ok(()) => Ok(true),
            Err(CallbackError::Reject(verr)) => {
                self.generate_reject(message, verr).await?;
                Ok(false)
            }
            Err(CallbackError::RejectLogon { reason }) => {
                self.generate_logout(Some(reason)).await?;
                self.disconnect("rejected by application").await?;
                Ok(false)
            }
        }
    }

    // ---- verification ------------------------------------------------------

    /// Common inbound checks: CompIDs, sequence window, resend-range
    /// maintenance, SendingTime latency.
    ///
    /// Returns `Ok(false)` when processing of this message must stop (the
    /// corrective action has been taken); `Err` only for protocol-fatal
    /// conditions.
    async fn verify(
        &mut self,
        message: &Message,
        check_too_high: bool,
        check_too_low: bool,
    ) -> Result<bool, FixError> {
        let msg_seq = match message.seq_num() {
            Ok(seq) => seq,
            Err(_) => {
                self.generate_reject(
                    message,
                    ValidationError::new(RejectReason::RequiredTagMissing)
                        .with_tag(tags::MSG_SEQ_NUM),
                )
                .await?;
                return Ok(false);
            }
        };

        if self.config.check_comp_id && !self.comp_ids_ok(message) {
            warn!(session = %self.config.session_id, "CompID problem");
            self.generate_reject(
                message,
                ValidationError::new(RejectReason::CompIdProblem),
            )
            .await?;
            self.generate_logout(Some("CompID problem".to_string()))
                .await?;
            self.disconnect("CompID problem").await?;
            return Ok(false);
        }

        let expected = self.store.next_target_seq();
        if check_too_high && msg_seq > expected {
            self.handle_target_too_high(message.clone()).await?;
            return Ok(false);
        }
        if check_too_low && msg_seq < expected {
            return self.handle_target_too_low(message, msg_seq, expected).await;
        }

        if let Some(range) = self.state.resend_range {
            if msg_seq >= range.end {
                info!(
                    session = %self.config.session_id,
                    begin = range.begin,
                    end = range.end,
                    "resend request satisfied"
                );
                self.state.resend_range = None;
            } else if msg_seq >= range.chunk_end {
                let next_chunk_end = std::cmp::min(
                    range.end,
                    range.chunk_end + self.config.max_messages_in_resend_request,
                );
                info!(
                    session = %self.config.session_id,
                    chunk = range.chunk_end,
                    "resend chunk satisfied, requesting next"
                );
                self.send_resend_request_frame(range.chunk_end + 1, next_chunk_end)
                    .await?;
                if let Some(range) = self.state.resend_range.as_mut() {
                    range.chunk_end = next_chunk_end;
                }
            }
        }

        if self.config.check_latency && !self.sending_time_ok(message) {
            warn!(session = %self.config.session_id, "SendingTime accuracy problem");
            self.generate_reject(
                message,
                ValidationError::new(RejectReason::SendingTimeAccuracyProblem)
                    .with_tag(tags::SENDING_TIME),
            )
            .await?;
            self.generate_logout(Some("SendingTime accuracy problem".to_string()))
                .await?;
            return Ok(false);
        }

        Ok(true)
    }

    /// A message below the expected sequence number: either a tolerable
    /// duplicate (PossDupFlag=Y with a sane OrigSendingTime) or fatal.
    async fn handle_target_too_low(
        &mut self,
        message: &Message,
        msg_seq: u64,
        expected: u64,
    ) -> Result<bool, FixError> {
        if message.poss_dup() {
            if message.msg_type() != Ok(MsgType::SequenceReset) {
                match message.header.get_timestamp(tags::ORIG_SENDING_TIME) {
                    Err(_) if self.config.requires_orig_sending_time => {
                        self.generate_reject(
                            message,
                            ValidationError::new(RejectReason::RequiredTagMissing)
                                .with_tag(tags::ORIG_SENDING_TIME),
                        )
                        .await?;
                        return Ok(false);
                    }
                    Ok(orig) => {
                        if let Ok(sending) = message.header.get_timestamp(tags::SENDING_TIME) {
                            if orig > sending {
                                self.generate_reject(
                                    message,
                                    ValidationError::new(
                                        RejectReason::SendingTimeAccuracyProblem,
                                    )
                                    .with_tag(tags::ORIG_SENDING_TIME),
                                )
                                .await?;
                                return Ok(false);
                            }
                        }
                    }
                    Err(_) => {}
                }
            }
            debug!(
                session = %self.config.session_id,
                seq = msg_seq,
                "ignoring duplicate message"
            );
            return Ok(false);
        }

        let text = format!("MsgSeqNum too low, expecting {expected} but received {msg_seq}");
        error!(session = %self.config.session_id, "{text}");
        self.generate_logout(Some(text)).await?;
        Err(SessionError::SeqNumTooLow {
            expected,
            received: msg_seq,
        }
        .into())
    }

    fn comp_ids_ok(&self, message: &Message) -> bool {
        let id = &self.config.session_id;
        message.header.get(tags::SENDER_COMP_ID) == Some(id.target_comp_id.as_str())
            && message.header.get(tags::TARGET_COMP_ID) == Some(id.sender_comp_id.as_str())
    }

    fn sending_time_ok(&self, message: &Message) -> bool {
        let Ok(sending_time) = message.header.get_timestamp(tags::SENDING_TIME) else {
            return false;
        };
        let skew = self.clock.now().millis_since(sending_time).abs();
        skew <= self.config.max_latency.as_millis() as i64
    }

    // ---- gap handling ------------------------------------------------------

    /// Target sequence number above expectation: queue the message and
    /// ask for the missing range.
    async fn handle_target_too_high(&mut self, message: Message) -> Result<(), FixError> {
        let msg_seq = message.seq_num()?;
        let expected = self.store.next_target_seq();
        warn!(
            session = %self.config.session_id,
            expected,
            received = msg_seq,
            "MsgSeqNum too high, queueing"
        );
        self.state.enqueue(msg_seq, message);

        if let Some(range) = self.state.resend_range {
            if !self.config.send_redundant_resend_requests {
                debug!(
                    session = %self.config.session_id,
                    begin = range.begin,
                    end = range.end,
                    "resend request already outstanding"
                );
                return Ok(());
            }
        }
        self.generate_resend_request(msg_seq).await
    }

    /// Sends a ResendRequest for everything from the next expected
    /// number up to `received_seq - 1`, chunked when configured, and
    /// records the outstanding range.
    async fn generate_resend_request(&mut self, received_seq: u64) -> Result<(), FixError> {
        let begin = self.store.next_target_seq();
        let end = received_seq - 1;
        let (chunk_end, wire_end) = if self.config.max_messages_in_resend_request > 0 {
            let chunk_end = std::cmp::min(
                end,
                begin + self.config.max_messages_in_resend_request - 1,
            );
            (chunk_end, chunk_end)
        } else {
            (end, self.config.begin_string().infinite_end_seq_no())
        };

        self.send_resend_request_frame(begin, wire_end).await?;
        info!(
            session = %self.config.session_id,
            begin,
            end,
            "sent resend request"
        );
        self.state.resend_range = Some(ResendRange {
            begin,
            end,
            chunk_end,
        });
        Ok(())
    }

    /// Emits one ResendRequest message without touching the recorded
    /// range (used for both the initial request and chunk follow-ups).
    async fn send_resend_request_frame(&mut self, begin: u64, end: u64) -> Result<(), FixError> {
        let mut request = Message::of_type(&MsgType::ResendRequest);
        request.body.set_uint(tags::BEGIN_SEQ_NO, begin);
        request.body.set_uint(tags::END_SEQ_NO, end);
        self.send_message(request, false, None).await?;
        Ok(())
    }

    // ---- resend servicing --------------------------------------------------

    /// Services a peer's ResendRequest: administrative messages collapse
    /// into gap fills, application messages are offered to `to_app` (a
    /// veto extends the gap) and re-sent with PossDupFlag=Y and
    /// OrigSendingTime.
    async fn service_resend_request(&mut self, message: &Message) -> Result<(), FixError> {
        let begin = message.body.get_u64(tags::BEGIN_SEQ_NO)?;
        let wire_end = message.body.get_u64(tags::END_SEQ_NO)?;
        let next_sender = self.store.next_sender_seq();
        let end = if wire_end == 0 || wire_end == 999_999 || wire_end >= next_sender {
            next_sender.saturating_sub(1)
        } else {
            wire_end
        };
        info!(
            session = %self.config.session_id,
            begin,
            end = wire_end,
            "received resend request"
        );
        if next_sender <= 1 || begin > end {
            warn!(session = %self.config.session_id, "nothing to resend");
            return Ok(());
        }

        if !self.config.persist_messages {
            let new_seq = std::cmp::min(end + 1, next_sender);
            return self.generate_sequence_reset_gap_fill(begin, new_seq).await;
        }

        let stored = self.store.get(begin, end).await?;
        let mut current = begin;
        let mut gap_start: Option<u64> = None;

        for (seq, raw) in stored {
            if seq > end {
                break;
            }
            let resend = self.prepare_resend(seq, &raw).await;
            match resend {
                None => {
                    // collapsed into the gap
                    if gap_start.is_none() {
                        gap_start = Some(current);
                    }
                    current = seq + 1;
                }
                Some(resend_msg) => {
                    if let Some(start) = gap_start.take() {
                        self.generate_sequence_reset_gap_fill(start, seq).await?;
                    } else if seq > current {
                        // hole in the store
                        self.generate_sequence_reset_gap_fill(current, seq).await?;
                    }
                    info!(session = %self.config.session_id, seq, "resending message");
                    self.send_message(resend_msg, true, Some(seq)).await?;
                    current = seq + 1;
                }
            }
        }

        let tail_start = gap_start.unwrap_or(current);
        if tail_start <= end {
            self.generate_sequence_reset_gap_fill(tail_start, end + 1).await?;
        }
        Ok(())
    }

    /// Decides whether a stored message is re-sent or gap-filled;
    /// prepares the retransmission copy when it is re-sent.
    async fn prepare_resend(&mut self, seq: u64, raw: &[u8]) -> Option<Message> {
        let mut stored_msg = match self.parser.parse(raw) {
            Ok(m) => m,
            Err(e) => {
                error!(
                    session = %self.config.session_id,
                    seq,
                    error = %e,
                    "stored message unreadable, gap-filling over it"
                );
                return None;
            }
        };
        let msg_type = stored_msg.msg_type().ok()?;

        if msg_type.is_admin()
            && !(msg_type == MsgType::Reject && self.config.resend_session_level_rejects)
        {
            return None;
        }

        if let Some(orig) = stored_msg.header.get(tags::SENDING_TIME).map(String::from) {
            stored_msg.header.set_field(tags::ORIG_SENDING_TIME, orig);
        }
        stored_msg.header.set_bool(tags::POSS_DUP_FLAG, true);

        if msg_type.is_app() {
            let app = Arc::clone(&self.app);
            let id = self.config.session_id.clone();
            if app.to_app(&mut stored_msg, &id).await.is_err() {
                debug!(session = %self.config.session_id, seq, "resend vetoed by application");
                return None;
            }
        }
        Some(stored_msg)
    }

    /// Emits SequenceReset-GapFill covering `[begin, new_seq)`.
    async fn generate_sequence_reset_gap_fill(
        &mut self,
        begin: u64,
        new_seq: u64,
    ) -> Result<(), FixError> {
        let mut reset = Message::of_type(&MsgType::SequenceReset);
        reset.body.set_bool(tags::GAP_FILL_FLAG, true);
        reset.body.set_uint(tags::NEW_SEQ_NO, new_seq);
        reset.header.set_bool(tags::POSS_DUP_FLAG, true);
        self.send_message(reset, true, Some(begin)).await?;
        info!(
            session = %self.config.session_id,
            begin,
            new_seq,
            "sent gap fill"
        );
        Ok(())
    }

    // ---- admin message generation ------------------------------------------

    async fn generate_logon(&mut self) -> Result<(), FixError> {
        if self.config.is_initiator() && self.config.reset_on_logon {
            self.store.reset().await?;
            info!(session = %self.config.session_id, "sequence numbers reset on logon");
        }
        let mut logon = Message::of_type(&MsgType::Logon);
        logon.body.set_uint(tags::ENCRYPT_METHOD, 0);
        logon
            .body
            .set_uint(tags::HEART_BT_INT, self.config.heart_bt_int);
        if let Some(appl_ver) = &self.config.default_appl_ver_id {
            logon
                .body
                .set_field(tags::DEFAULT_APPL_VER_ID, appl_ver.clone());
        }
        if self.should_send_reset() {
            logon.body.set_bool(tags::RESET_SEQ_NUM_FLAG, true);
        }
        self.state.sent_logon = true;
        self.send_message(logon, false, None).await?;
        Ok(())
    }

    /// Acceptor's Logon answer, echoing ResetSeqNumFlag when the peer
    /// asked for a reset.
    async fn generate_logon_reply(&mut self) -> Result<(), FixError> {
        let mut logon = Message::of_type(&MsgType::Logon);
        logon.body.set_uint(tags::ENCRYPT_METHOD, 0);
        logon
            .body
            .set_uint(tags::HEART_BT_INT, self.config.heart_bt_int);
        if let Some(appl_ver) = &self.config.default_appl_ver_id {
            logon
                .body
                .set_field(tags::DEFAULT_APPL_VER_ID, appl_ver.clone());
        }
        if self.state.received_reset {
            logon.body.set_bool(tags::RESET_SEQ_NUM_FLAG, true);
        }
        self.state.sent_logon = true;
        info!(session = %self.config.session_id, "responding to logon request");
        self.send_message(logon, false, None).await?;
        Ok(())
    }

    /// ResetSeqNumFlag=Y goes out when a reset rule is configured and
    /// both counters are at the start of a fresh session.
    fn should_send_reset(&self) -> bool {
        self.config.begin_string() >= FixVersion::Fix41
            && (self.config.reset_on_logon
                || self.config.reset_on_logout
                || self.config.reset_on_disconnect)
            && self.store.next_sender_seq() == 1
            && self.store.next_target_seq() == 1
    }

    async fn generate_logout(&mut self, text: Option<String>) -> Result<(), FixError> {
        let mut logout = Message::of_type(&MsgType::Logout);
        if let Some(text) = &text {
            logout.body.set_field(tags::TEXT, text.clone());
        }
        self.send_message(logout, false, None).await?;
        self.state.sent_logout = true;
        info!(session = %self.config.session_id, text = text.as_deref().unwrap_or(""), "sent logout");
        Ok(())
    }

    async fn generate_heartbeat(&mut self, test_req_id: Option<String>) -> Result<(), FixError> {
        let mut heartbeat = Message::of_type(&MsgType::Heartbeat);
        if let Some(id) = test_req_id {
            heartbeat.body.set_field(tags::TEST_REQ_ID, id);
        }
        self.send_message(heartbeat, false, None).await?;
        Ok(())
    }

    async fn generate_test_request(&mut self, test_req_id: &str) -> Result<(), FixError> {
        let mut request = Message::of_type(&MsgType::TestRequest);
        request.body.set_field(tags::TEST_REQ_ID, test_req_id);
        self.send_message(request, false, None).await?;
        Ok(())
    }

    /// Session-level Reject (35=3). Consumes the rejected message's
    /// sequence number when it was the expected one.
    async fn generate_reject(
        &mut self,
        message: &Message,
        verr: ValidationError,
    ) -> Result<(), FixError> {
        let ref_seq = message.seq_num().unwrap_or(0);
        warn!(
            session = %self.config.session_id,
            ref_seq,
            reason = %verr,
            "rejecting message"
        );

        let mut reject = Message::of_type(&MsgType::Reject);
        reject.body.set_uint(tags::REF_SEQ_NUM, ref_seq);
        if self.config.begin_string() >= FixVersion::Fix42 {
            if let Ok(msg_type) = message.msg_type() {
                reject
                    .body
                    .set_field(tags::REF_MSG_TYPE, msg_type.as_str());
            }
            if let Some(tag) = verr.ref_tag {
                reject.body.set_uint(tags::REF_TAG_ID, u64::from(tag));
            }
            reject
                .body
                .set_uint(tags::SESSION_REJECT_REASON, u64::from(verr.reason.code()));
        }
        reject.body.set_field(tags::TEXT, verr.to_string());

        if ref_seq != 0 && ref_seq == self.store.next_target_seq() {
            self.store.incr_next_target_seq();
        }
        self.send_message(reject, false, None).await?;
        Ok(())
    }

    // ---- outbound ----------------------------------------------------------

    /// The single outbound path: header stamping, callbacks, the
    /// ResetSeqNumFlag=Y side effect, persistence, sequence accounting
    /// and the transport push. Resends skip callbacks (the veto already
    /// happened), persistence and sequence accounting.
    async fn send_message(
        &mut self,
        mut message: Message,
        is_resend: bool,
        seq_override: Option<u64>,
    ) -> Result<bool, FixError> {
        self.initialize_header(&mut message, seq_override);
        let msg_type = message.msg_type().map_err(FixError::Parse)?;

        if msg_type.is_admin() {
            if !is_resend {
                let app = Arc::clone(&self.app);
                let id = self.config.session_id.clone();
                app.to_admin(&mut message, &id).await;
            }
            if msg_type == MsgType::Logon
                && message
                    .body
                    .get_bool(tags::RESET_SEQ_NUM_FLAG)
                    .unwrap_or(false)
            {
                if !self.state.sent_reset {
                    self.store.reset().await?;
                    info!(session = %self.config.session_id, "sequence numbers reset, sending ResetSeqNumFlag=Y");
                }
                self.state.sent_reset = true;
                message.header.set_uint(tags::MSG_SEQ_NUM, 1);
            }
        } else if !is_resend {
            let app = Arc::clone(&self.app);
            let id = self.config.session_id.clone();
            if app.to_app(&mut message, &id).await.is_err() {
                debug!(session = %self.config.session_id, "send suppressed by DoNotSend");
                return Ok(false);
            }
        }

        let seq = message.seq_num()?;
        let bytes = message.encode()?;

        if !is_resend {
            if self.config.persist_messages {
                self.store.set(seq, &bytes).await?;
            }
            if seq_override.is_none() || seq == self.store.next_sender_seq() {
                self.store.incr_next_sender_seq();
            }
        }
        self.state.record_sent(self.clock.now());
        debug!(session = %self.config.session_id, msg = %message, "sending");

        match &self.responder {
            Some(responder) => Ok(responder.send_bytes(bytes.freeze())),
            None => Ok(false),
        }
    }

    /// Stamps BeginString, CompIDs, MsgSeqNum, SendingTime and the
    /// optional LastMsgSeqNumProcessed.
    fn initialize_header(&self, message: &mut Message, seq_override: Option<u64>) {
        let id = &self.config.session_id;
        message
            .header
            .set_field(tags::BEGIN_STRING, id.begin_string.begin_string());
        message
            .header
            .set_field(tags::SENDER_COMP_ID, id.sender_comp_id.as_str());
        if let Some(sub) = &id.sender_sub_id {
            message.header.set_field(tags::SENDER_SUB_ID, sub.as_str());
        }
        if let Some(loc) = &id.sender_location_id {
            message
                .header
                .set_field(tags::SENDER_LOCATION_ID, loc.as_str());
        }
        message
            .header
            .set_field(tags::TARGET_COMP_ID, id.target_comp_id.as_str());
        if let Some(sub) = &id.target_sub_id {
            message.header.set_field(tags::TARGET_SUB_ID, sub.as_str());
        }
        if let Some(loc) = &id.target_location_id {
            message
                .header
                .set_field(tags::TARGET_LOCATION_ID, loc.as_str());
        }

        let seq = seq_override.unwrap_or_else(|| self.store.next_sender_seq());
        message.header.set_uint(tags::MSG_SEQ_NUM, seq);

        if self.config.enable_last_msg_seq_num_processed {
            message.header.set_uint(
                tags::LAST_MSG_SEQ_NUM_PROCESSED,
                self.store.next_target_seq().saturating_sub(1),
            );
        }

        let precision = if self.config.begin_string().supports_subsecond() {
            self.config.timestamp_precision
        } else {
            TimestampPrecision::Seconds
        };
        message
            .header
            .set_timestamp(tags::SENDING_TIME, self.clock.now(), precision);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.config.session_id)
            .field("connection", &self.state.connection)
            .field("logged_on", &self.state.is_logged_on())
            .finish_non_exhaustive()
    }
}

/// Builds the shared handle form used by the registry and supervisors.
#[must_use]
pub fn into_handle(session: Session) -> SessionHandle {
    Arc::new(tokio::sync::Mutex::new(session))
}
