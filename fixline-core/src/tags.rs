/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX tag numbers and the [`MsgType`] enumeration.
//!
//! Only the tags the session layer itself reads or writes are named here;
//! application-level tags pass through the engine untyped.

/// BeginSeqNo (ResendRequest range start).
pub const BEGIN_SEQ_NO: u32 = 7;
/// BeginString (FIX version).
pub const BEGIN_STRING: u32 = 8;
/// BodyLength.
pub const BODY_LENGTH: u32 = 9;
/// CheckSum, three decimal digits.
pub const CHECK_SUM: u32 = 10;
/// EndSeqNo (ResendRequest range end; 0 means infinity on FIX >= 4.2).
pub const END_SEQ_NO: u32 = 16;
/// MsgSeqNum.
pub const MSG_SEQ_NUM: u32 = 34;
/// MsgType.
pub const MSG_TYPE: u32 = 35;
/// NewSeqNo (SequenceReset target).
pub const NEW_SEQ_NO: u32 = 36;
/// PossDupFlag.
pub const POSS_DUP_FLAG: u32 = 43;
/// RefSeqNum (sequence number a Reject refers to).
pub const REF_SEQ_NUM: u32 = 45;
/// SenderCompID.
pub const SENDER_COMP_ID: u32 = 49;
/// SenderSubID.
pub const SENDER_SUB_ID: u32 = 50;
/// SendingTime, UTC.
pub const SENDING_TIME: u32 = 52;
/// TargetCompID.
pub const TARGET_COMP_ID: u32 = 56;
/// TargetSubID.
pub const TARGET_SUB_ID: u32 = 57;
/// Text (free-form reason on Logout/Reject).
pub const TEXT: u32 = 58;
/// PossResend.
pub const POSS_RESEND: u32 = 97;
/// EncryptMethod (0 = none on Logon).
pub const ENCRYPT_METHOD: u32 = 98;
/// HeartBtInt, seconds, carried on Logon.
pub const HEART_BT_INT: u32 = 108;
/// TestReqID, echoed by the answering Heartbeat.
pub const TEST_REQ_ID: u32 = 112;
/// OrigSendingTime, set on retransmissions.
pub const ORIG_SENDING_TIME: u32 = 122;
/// GapFillFlag on SequenceReset.
pub const GAP_FILL_FLAG: u32 = 123;
/// ResetSeqNumFlag on Logon.
pub const RESET_SEQ_NUM_FLAG: u32 = 141;
/// SenderLocationID.
pub const SENDER_LOCATION_ID: u32 = 142;
/// TargetLocationID.
pub const TARGET_LOCATION_ID: u32 = 143;
/// LastMsgSeqNumProcessed.
pub const LAST_MSG_SEQ_NUM_PROCESSED: u32 = 369;
/// RefTagID on Reject.
pub const REF_TAG_ID: u32 = 371;
/// RefMsgType on Reject.
pub const REF_MSG_TYPE: u32 = 372;
/// SessionRejectReason on Reject.
pub const SESSION_REJECT_REASON: u32 = 373;
/// NoMsgTypes repeating group count on Logon.
pub const NO_MSG_TYPES: u32 = 384;
/// RefMsgType inside the NoMsgTypes group.
pub const MSG_DIRECTION: u32 = 385;
/// ApplVerID (FIXT.1.1 per-message application version).
pub const APPL_VER_ID: u32 = 1128;
/// DefaultApplVerID on FIXT.1.1 Logon.
pub const DEFAULT_APPL_VER_ID: u32 = 1137;

/// FIX message type (tag 35).
///
/// The session layer cares about the seven administrative types; anything
/// else is an application message carried as [`MsgType::App`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MsgType {
    /// Heartbeat (0).
    Heartbeat,
    /// Test Request (1).
    TestRequest,
    /// Resend Request (2).
    ResendRequest,
    /// Reject (3).
    Reject,
    /// Sequence Reset (4).
    SequenceReset,
    /// Logout (5).
    Logout,
    /// Logon (A).
    Logon,
    /// Any application-level message type.
    App(String),
}

impl MsgType {
    /// Parses a MsgType from its tag 35 value.
    #[must_use]
    pub fn from_value(value: &str) -> Self {
        match value {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "A" => Self::Logon,
            other => Self::App(other.to_string()),
        }
    }

    /// Returns the tag 35 value for this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::Logon => "A",
            Self::App(s) => s.as_str(),
        }
    }

    /// Returns true for the seven session-level administrative types.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        !matches!(self, Self::App(_))
    }

    /// Returns true for application-level message types.
    #[must_use]
    pub const fn is_app(&self) -> bool {
        matches!(self, Self::App(_))
    }
}

impl std::str::FromStr for MsgType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_value(s))
    }
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
