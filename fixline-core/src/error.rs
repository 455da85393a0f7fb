/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the fixline FIX session engine.
//!
//! This module provides a unified error hierarchy using `thiserror`. The
//! session layer draws a hard line between *recoverable* outcomes (garbled
//! frames, dictionary rejects, sequence gaps) and *protocol-fatal* ones
//! (sequence number too low without PossDupFlag, CompID mismatch,
//! unsupported BeginString), which terminate the connection.

use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all fixline operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error while parsing an incoming message.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error in session layer protocol handling.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in message store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Session configuration error (construction-time fatal).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error from the underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while framing or parsing FIX tag=value data.
///
/// All of these are recoverable at the connection level: the framer
/// resynchronizes on the next `8=` and the session keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer does not yet hold a complete message.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// Message does not start with a `8=` BeginString field.
    #[error("invalid begin string: message must start with 8=")]
    InvalidBeginString,

    /// BodyLength field (tag 9) missing or out of place.
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// BodyLength value is not a well-formed number.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// BodyLength does not match the actual body byte count.
    #[error("body length mismatch: declared {declared}, actual {actual}")]
    BodyLengthMismatch {
        /// Declared length from tag 9.
        declared: usize,
        /// Byte count between the end of `9=..` and `10=`.
        actual: usize,
    },

    /// MsgType field (tag 35) missing from the message body.
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// Declared checksum does not match the computed one.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes.
        calculated: u8,
        /// Checksum declared in tag 10.
        declared: u8,
    },

    /// Tag is not a well-formed positive integer.
    #[error("invalid tag: {0}")]
    InvalidTag(String),

    /// Requested field or repeating group instance is not present in the
    /// map; out-of-range 1-based group access reports the count tag.
    #[error("field not found: tag {tag}")]
    FieldNotFound {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Field value cannot be converted to the requested type.
    #[error("invalid value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Why the value is invalid.
        reason: String,
    },

    /// Declared NumInGroup count does not match the parsed instances.
    #[error("group count mismatch for tag {count_tag}: declared {declared}, found {found}")]
    GroupCountMismatch {
        /// The NumInGroup count tag.
        count_tag: u32,
        /// Declared instance count.
        declared: usize,
        /// Actual instance count found.
        found: usize,
    },

    /// Field value is not valid UTF-8.
    #[error("invalid utf-8 in field value")]
    InvalidUtf8,

    /// Message exceeds the configured maximum size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max_size: usize,
    },
}

/// Errors in FIX session layer protocol handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Incoming BeginString differs from the configured version.
    #[error("unsupported begin string: expected {expected}, received {received}")]
    UnsupportedVersion {
        /// Configured BeginString.
        expected: String,
        /// BeginString carried by the incoming message.
        received: String,
    },

    /// Incoming CompIDs do not match the session identity.
    #[error("comp id problem: expected {expected_sender}->{expected_target}, received {received_sender}->{received_target}")]
    CompIdProblem {
        /// Configured TargetCompID (the peer's sender).
        expected_sender: String,
        /// Configured SenderCompID (the peer's target).
        expected_target: String,
        /// SenderCompID on the incoming message.
        received_sender: String,
        /// TargetCompID on the incoming message.
        received_target: String,
    },

    /// Sequence number below the expected value without PossDupFlag.
    ///
    /// Protocol-fatal: the session sends Logout and disconnects.
    #[error("msg seq num too low: expected {expected}, received {received}")]
    SeqNumTooLow {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// SendingTime outside the configured latency window.
    #[error("sending time accuracy problem: skew {skew_ms} ms exceeds {max_ms} ms")]
    SendingTimeAccuracy {
        /// Observed |now - SendingTime| in milliseconds.
        skew_ms: i64,
        /// Configured maximum in milliseconds.
        max_ms: i64,
    },

    /// Logon was rejected, either by the peer or by the application.
    #[error("logon rejected: {reason}")]
    LogonRejected {
        /// Reason carried in the Logout text.
        reason: String,
    },

    /// Operation requires a state the session is not in.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// Operation attempted on a session that has been removed.
    #[error("session disposed")]
    Disposed,
}

impl SessionError {
    /// Returns true if this error must terminate the connection.
    ///
    /// Recoverable errors are reported (via Reject and the event log) while
    /// the session keeps running.
    #[must_use]
    pub const fn is_protocol_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedVersion { .. }
                | Self::CompIdProblem { .. }
                | Self::SeqNumTooLow { .. }
                | Self::LogonRejected { .. }
                | Self::Disposed
        )
    }
}

/// Errors in message store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Failed to persist a message.
    #[error("failed to store message seq={seq_num}: {reason}")]
    SetFailed {
        /// Sequence number of the message.
        seq_num: u64,
        /// Reason for the failure.
        reason: String,
    },

    /// Failed to read back a range of messages.
    #[error("failed to read messages {begin}..={end}: {reason}")]
    GetFailed {
        /// Begin of the requested range.
        begin: u64,
        /// End of the requested range.
        end: u64,
        /// Reason for the failure.
        reason: String,
    },

    /// Backing storage is corrupted.
    #[error("store corrupted: {reason}")]
    Corrupted {
        /// Description of the corruption.
        reason: String,
    },

    /// I/O error in a persistent store.
    #[error("store i/o error: {0}")]
    Io(String),
}

/// Session configuration errors, fatal at construction time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("missing setting: {name}")]
    MissingSetting {
        /// Name of the missing setting.
        name: &'static str,
    },

    /// A setting value is out of range or inconsistent.
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting {
        /// Name of the offending setting.
        name: &'static str,
        /// Why the value is invalid.
        reason: String,
    },
}

/// SessionRejectReason values for tag 373 on session-level Reject (35=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// 0 - Invalid tag number.
    InvalidTagNumber,
    /// 1 - Required tag missing.
    RequiredTagMissing,
    /// 2 - Tag not defined for this message type.
    TagNotDefinedForMessage,
    /// 3 - Undefined tag.
    UndefinedTag,
    /// 4 - Tag specified without a value.
    TagSpecifiedWithoutValue,
    /// 5 - Value is incorrect (out of range) for this tag.
    ValueOutOfRange,
    /// 6 - Incorrect data format for value.
    IncorrectDataFormat,
    /// 9 - CompID problem.
    CompIdProblem,
    /// 10 - SendingTime accuracy problem.
    SendingTimeAccuracyProblem,
    /// 11 - Invalid MsgType.
    InvalidMsgType,
    /// 13 - Tag appears more than once.
    TagAppearsMoreThanOnce,
    /// 14 - Tag specified out of required order.
    TagOutOfOrder,
    /// 16 - Incorrect NumInGroup count for repeating group.
    IncorrectGroupCount,
    /// 99 - Other.
    Other,
}

impl RejectReason {
    /// Returns the numeric code carried in tag 373.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::InvalidTagNumber => 0,
            Self::RequiredTagMissing => 1,
            Self::TagNotDefinedForMessage => 2,
            Self::UndefinedTag => 3,
            Self::TagSpecifiedWithoutValue => 4,
            Self::ValueOutOfRange => 5,
            Self::IncorrectDataFormat => 6,
            Self::CompIdProblem => 9,
            Self::SendingTimeAccuracyProblem => 10,
            Self::InvalidMsgType => 11,
            Self::TagAppearsMoreThanOnce => 13,
            Self::TagOutOfOrder => 14,
            Self::IncorrectGroupCount => 16,
            Self::Other => 99,
        }
    }

    /// Returns the default human-readable text for tag 58.
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::InvalidTagNumber => "Invalid tag number",
            Self::RequiredTagMissing => "Required tag missing",
            Self::TagNotDefinedForMessage => "Tag not defined for this message type",
            Self::UndefinedTag => "Undefined tag",
            Self::TagSpecifiedWithoutValue => "Tag specified without a value",
            Self::ValueOutOfRange => "Value is incorrect (out of range) for this tag",
            Self::IncorrectDataFormat => "Incorrect data format for value",
            Self::CompIdProblem => "CompID problem",
            Self::SendingTimeAccuracyProblem => "SendingTime accuracy problem",
            Self::InvalidMsgType => "Invalid MsgType",
            Self::TagAppearsMoreThanOnce => "Tag appears more than once",
            Self::TagOutOfOrder => "Tag specified out of required order",
            Self::IncorrectGroupCount => "Incorrect NumInGroup count for repeating group",
            Self::Other => "Other",
        }
    }
}

/// A dictionary validation failure, carrying everything a session-level
/// Reject (35=3) needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The SessionRejectReason to report in tag 373.
    pub reason: RejectReason,
    /// The offending tag, reported in tag 371 when present.
    pub ref_tag: Option<u32>,
    /// Optional additional text appended to tag 58.
    pub detail: Option<String>,
}

impl ValidationError {
    /// Creates a validation error for the given reject reason.
    #[must_use]
    pub const fn new(reason: RejectReason) -> Self {
        Self {
            reason,
            ref_tag: None,
            detail: None,
        }
    }

    /// Attaches the offending tag number.
    #[must_use]
    pub const fn with_tag(mut self, tag: u32) -> Self {
        self.ref_tag = Some(tag);
        self
    }

    /// Attaches free-form detail text.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason.text())?;
        if let Some(tag) = self.ref_tag {
            write!(f, " (tag {tag})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::ChecksumMismatch {
            calculated: 17,
            declared: 201,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: calculated 17, declared 201"
        );
    }

    #[test]
    fn test_fix_error_from_parse() {
        let err: FixError = ParseError::Incomplete.into();
        assert!(matches!(err, FixError::Parse(ParseError::Incomplete)));
    }

    #[test]
    fn test_protocol_fatal_classification() {
        let fatal = SessionError::SeqNumTooLow {
            expected: 10,
            received: 3,
        };
        assert!(fatal.is_protocol_fatal());

        let soft = SessionError::SendingTimeAccuracy {
            skew_ms: 200_000,
            max_ms: 120_000,
        };
        assert!(!soft.is_protocol_fatal());
    }

    #[test]
    fn test_reject_reason_codes() {
        assert_eq!(RejectReason::RequiredTagMissing.code(), 1);
        assert_eq!(RejectReason::CompIdProblem.code(), 9);
        assert_eq!(RejectReason::SendingTimeAccuracyProblem.code(), 10);
        assert_eq!(RejectReason::IncorrectGroupCount.code(), 16);
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new(RejectReason::RequiredTagMissing).with_tag(52);
        assert_eq!(err.to_string(), "Required tag missing (tag 52)");
    }
}
