/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session configuration.
//!
//! [`SessionConfig`] carries every setting the session engine honors,
//! with the protocol's conventional defaults. Construction is the
//! validation boundary: [`SessionConfig::validate`] fails fast on
//! inconsistent settings, and nothing is re-checked at runtime. The one
//! exception to immutability is the heartbeat interval, which an acceptor
//! adopts from the peer's Logon.

use crate::schedule::SessionSchedule;
use fixline_core::error::ConfigError;
use fixline_core::types::{FixVersion, SessionId, TimestampPrecision};
use fixline_dictionary::Dictionary;
use std::sync::Arc;
use std::time::Duration;

/// Whether the session dials out or answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// Dials the counterparty and sends the first Logon.
    Initiator,
    /// Listens and answers the counterparty's Logon.
    Acceptor,
}

/// Configuration for one FIX session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session identity; also decides BeginString.
    pub session_id: SessionId,
    /// Initiator or acceptor.
    pub connection_type: ConnectionType,
    /// Default application version, required for FIXT.1.1.
    pub default_appl_ver_id: Option<String>,
    /// Heartbeat interval in seconds; 0 disables timers (test mode).
    pub heart_bt_int: u64,
    /// Active window for the session.
    pub schedule: SessionSchedule,
    /// Delay between initiator connect attempts.
    pub reconnect_interval: Duration,
    /// Reset sequence numbers when a Logon is sent or accepted.
    pub reset_on_logon: bool,
    /// Reset sequence numbers after a completed Logout exchange.
    pub reset_on_logout: bool,
    /// Reset sequence numbers whenever the connection drops.
    pub reset_on_disconnect: bool,
    /// Refresh the store from its backing storage on Logon.
    pub refresh_on_logon: bool,
    /// How long to wait for the peer's Logon.
    pub logon_timeout: Duration,
    /// How long to wait for the peer's Logout confirmation.
    pub logout_timeout: Duration,
    /// Enforce the SendingTime latency window.
    pub check_latency: bool,
    /// Maximum |now - SendingTime| before rejection.
    pub max_latency: Duration,
    /// Persist outbound messages for resend servicing.
    pub persist_messages: bool,
    /// Re-verify BodyLength and CheckSum on inbound messages.
    pub validate_length_and_checksum: bool,
    /// Verify inbound CompIDs against the session identity.
    pub check_comp_id: bool,
    /// Send a ResendRequest even when one is already outstanding.
    pub send_redundant_resend_requests: bool,
    /// Retransmit stored Rejects instead of gap-filling them.
    pub resend_session_level_rejects: bool,
    /// Skip servicing ResendRequests that carry PossDupFlag=Y.
    pub ignore_poss_dup_resend_requests: bool,
    /// Require OrigSendingTime on possdup messages.
    pub requires_orig_sending_time: bool,
    /// Stamp LastMsgSeqNumProcessed (369) on outbound headers.
    pub enable_last_msg_seq_num_processed: bool,
    /// Send a Logout before disconnecting on heartbeat timeout.
    pub send_logout_before_disconnect_from_timeout: bool,
    /// SendingTime fractional precision.
    pub timestamp_precision: TimestampPrecision,
    /// Chunk size for ResendRequests; 0 requests the whole range.
    pub max_messages_in_resend_request: u64,
    /// Validate inbound messages against the dictionary.
    pub use_data_dictionary: bool,
    /// Override for the session-layer (transport) dictionary.
    pub transport_dictionary: Option<Arc<Dictionary>>,
    /// Application dictionary for FIXT.1.1 application messages.
    pub app_dictionary: Option<Arc<Dictionary>>,
    /// Listening port, acceptor side.
    pub socket_accept_port: Option<u16>,
    /// Ordered `(host, port)` failover list, initiator side.
    pub socket_connect: Vec<(String, u16)>,
    /// Upper bound on a single inbound frame.
    pub max_message_size: usize,
}

impl SessionConfig {
    /// Creates a configuration with protocol-conventional defaults.
    #[must_use]
    pub fn new(session_id: SessionId, connection_type: ConnectionType) -> Self {
        Self {
            session_id,
            connection_type,
            default_appl_ver_id: None,
            heart_bt_int: 30,
            schedule: SessionSchedule::non_stop(),
            reconnect_interval: Duration::from_secs(30),
            reset_on_logon: false,
            reset_on_logout: false,
            reset_on_disconnect: false,
            refresh_on_logon: false,
            logon_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(2),
            check_latency: true,
            max_latency: Duration::from_secs(120),
            persist_messages: true,
            validate_length_and_checksum: true,
            check_comp_id: true,
            send_redundant_resend_requests: false,
            resend_session_level_rejects: false,
            ignore_poss_dup_resend_requests: false,
            requires_orig_sending_time: true,
            enable_last_msg_seq_num_processed: false,
            send_logout_before_disconnect_from_timeout: false,
            timestamp_precision: TimestampPrecision::Millis,
            max_messages_in_resend_request: 0,
            use_data_dictionary: true,
            transport_dictionary: None,
            app_dictionary: None,
            socket_accept_port: None,
            socket_connect: Vec::new(),
            max_message_size: 1024 * 1024,
        }
    }

    /// Returns the configured FIX version.
    #[must_use]
    pub fn begin_string(&self) -> FixVersion {
        self.session_id.begin_string
    }

    /// Returns true for initiator sessions.
    #[must_use]
    pub fn is_initiator(&self) -> bool {
        self.connection_type == ConnectionType::Initiator
    }

    /// Sets the heartbeat interval in seconds.
    #[must_use]
    pub fn with_heart_bt_int(mut self, seconds: u64) -> Self {
        self.heart_bt_int = seconds;
        self
    }

    /// Sets the session schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: SessionSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sets the legacy MillisecondsInTimeStamp flag.
    #[must_use]
    pub fn with_milliseconds_in_timestamp(mut self, millis: bool) -> Self {
        self.timestamp_precision = if millis {
            TimestampPrecision::Millis
        } else {
            TimestampPrecision::Seconds
        };
        self
    }

    /// Sets the SendingTime precision.
    #[must_use]
    pub fn with_timestamp_precision(mut self, precision: TimestampPrecision) -> Self {
        self.timestamp_precision = precision;
        self
    }

    /// Sets the DefaultApplVerID for FIXT.1.1 sessions.
    #[must_use]
    pub fn with_default_appl_ver_id(mut self, id: impl Into<String>) -> Self {
        self.default_appl_ver_id = Some(id.into());
        self
    }

    /// Adds a connect address to the initiator failover list.
    #[must_use]
    pub fn with_connect_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.socket_connect.push((host.into(), port));
        self
    }

    /// Checks the configuration for internal consistency.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a required setting is missing or a
    /// combination is invalid; session construction fails on the first
    /// such error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_initiator() && self.heart_bt_int == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "HeartBtInt",
                reason: "initiators must use a positive heartbeat interval".to_string(),
            });
        }
        if self.begin_string().is_fixt() && self.default_appl_ver_id.is_none() {
            return Err(ConfigError::MissingSetting {
                name: "DefaultApplVerID",
            });
        }
        if !self.begin_string().supports_subsecond()
            && self.timestamp_precision != TimestampPrecision::Seconds
        {
            return Err(ConfigError::InvalidSetting {
                name: "TimeStampPrecision",
                reason: format!(
                    "{} only supports whole-second timestamps",
                    self.begin_string()
                ),
            });
        }
        if self.logout_timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "LogoutTimeout",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
