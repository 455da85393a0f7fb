/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The FIX message: ordered header, body and trailer field maps.
//!
//! Serialization emits `8=...|9=...|` first, the remaining header fields,
//! the body in insertion order, then the trailer, and finally `10=XXX|`.
//! BodyLength and CheckSum are computed at encode time, never trusted from
//! the maps.

use crate::checksum::{SOH, checksum, format_checksum};
use crate::error::ParseError;
use crate::field_map::FieldMap;
use crate::tags;
use crate::tags::MsgType;
use bytes::{BufMut, BytesMut};
use std::fmt;

/// Header tags serialized first, in this order.
const HEADER_ORDER: [u32; 3] = [tags::BEGIN_STRING, tags::BODY_LENGTH, tags::MSG_TYPE];

/// A FIX message partitioned into header, body and trailer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Standard header (BeginString, MsgType, CompIDs, MsgSeqNum, ...).
    pub header: FieldMap,
    /// Message body.
    pub body: FieldMap,
    /// Standard trailer (CheckSum).
    pub trailer: FieldMap,
}

impl Message {
    /// Creates an empty message with the standard header order.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: FieldMap::with_order(HEADER_ORDER.to_vec()),
            body: FieldMap::new(),
            trailer: FieldMap::new(),
        }
    }

    /// Creates an empty message of the given type.
    #[must_use]
    pub fn of_type(msg_type: &MsgType) -> Self {
        let mut message = Self::new();
        message.header.set_field(tags::MSG_TYPE, msg_type.as_str());
        message
    }

    /// Returns the message type from tag 35.
    ///
    /// # Errors
    /// Returns [`ParseError::FieldNotFound`] if tag 35 is absent.
    pub fn msg_type(&self) -> Result<MsgType, ParseError> {
        self.header.get_str(tags::MSG_TYPE).map(MsgType::from_value)
    }

    /// Returns MsgSeqNum (34).
    ///
    /// # Errors
    /// [`ParseError`] if the field is absent or not a number.
    pub fn seq_num(&self) -> Result<u64, ParseError> {
        self.header.get_u64(tags::MSG_SEQ_NUM)
    }

    /// Returns true if this is one of the seven administrative types.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.msg_type().map(|t| t.is_admin()).unwrap_or(false)
    }

    /// Returns PossDupFlag (43), defaulting to false when absent.
    #[must_use]
    pub fn poss_dup(&self) -> bool {
        self.header.get_bool(tags::POSS_DUP_FLAG).unwrap_or(false)
    }

    /// Serializes the message, computing BodyLength and CheckSum.
    ///
    /// # Errors
    /// Returns [`ParseError::FieldNotFound`] if BeginString (8) is not set.
    pub fn encode(&self) -> Result<BytesMut, ParseError> {
        let begin_string = self.header.get_str(tags::BEGIN_STRING)?;

        let mut inner = BytesMut::with_capacity(256);
        self.header
            .encode_into(&mut inner, &[tags::BEGIN_STRING, tags::BODY_LENGTH]);
        self.body.encode_into(&mut inner, &[]);
        self.trailer.encode_into(&mut inner, &[tags::CHECK_SUM]);

        let mut out = BytesMut::with_capacity(inner.len() + 32);
        out.put_slice(b"8=");
        out.put_slice(begin_string.as_bytes());
        out.put_u8(SOH);
        out.put_slice(b"9=");
        let mut len_buf = itoa::Buffer::new();
        out.put_slice(len_buf.format(inner.len()).as_bytes());
        out.put_u8(SOH);
        out.put_slice(&inner);

        let digits = format_checksum(checksum(&out));
        out.put_slice(b"10=");
        out.put_slice(&digits);
        out.put_u8(SOH);

        Ok(out)
    }
}

impl fmt::Display for Message {
    /// Renders the wire form with SOH replaced by `|` for readability.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(bytes) => {
                let printable = String::from_utf8_lossy(&bytes).replace('\x01', "|");
                write!(f, "{printable}")
            }
            Err(_) => write!(f, "<unencodable message>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(msg: &Message) -> String {
        String::from_utf8(msg.encode().unwrap().to_vec())
            .unwrap()
            .replace('\x01', "|")
    }

    #[test]
    fn test_encode_heartbeat() {
        let mut msg = Message::of_type(&MsgType::Heartbeat);
        msg.header.set_field(tags::BEGIN_STRING, "FIX.4.4");
        msg.header.set_field(tags::SENDER_COMP_ID, "S");
        msg.header.set_field(tags::TARGET_COMP_ID, "T");
        msg.header.set_uint(tags::MSG_SEQ_NUM, 2);

        let encoded = wire(&msg);
        assert!(encoded.starts_with("8=FIX.4.4|9="));
        assert!(encoded.contains("|35=0|49=S|56=T|34=2|"));
        assert!(encoded.ends_with("|") && encoded.contains("|10="));
    }

    #[test]
    fn test_body_length_counts_between_markers() {
        let mut msg = Message::of_type(&MsgType::Heartbeat);
        msg.header.set_field(tags::BEGIN_STRING, "FIX.4.4");

        let bytes = msg.encode().unwrap();
        let raw = String::from_utf8(bytes.to_vec()).unwrap();

        // declared length
        let after_9 = raw.split("9=").nth(1).unwrap();
        let declared: usize = after_9.split('\x01').next().unwrap().parse().unwrap();

        // bytes between end of 9=..<SOH> and start of 10=
        let body_start = raw.find("35=").unwrap();
        let body_end = raw.find("10=").unwrap();
        assert_eq!(declared, body_end - body_start);
    }

    #[test]
    fn test_checksum_is_three_digits_mod_256() {
        let mut msg = Message::of_type(&MsgType::TestRequest);
        msg.header.set_field(tags::BEGIN_STRING, "FIX.4.2");
        msg.body.set_field(tags::TEST_REQ_ID, "TEST");

        let bytes = msg.encode().unwrap();
        let raw = bytes.as_ref();
        let tail_start = raw.len() - 7; // |10=XXX<SOH> minus leading SOH
        assert_eq!(&raw[tail_start..tail_start + 3], b"10=");
        let declared: u32 = std::str::from_utf8(&raw[tail_start + 3..tail_start + 6])
            .unwrap()
            .parse()
            .unwrap();
        let computed: u32 = raw[..tail_start].iter().map(|&b| u32::from(b)).sum();
        assert_eq!(declared, computed % 256);
    }

    #[test]
    fn test_encode_without_begin_string_fails() {
        let msg = Message::of_type(&MsgType::Heartbeat);
        assert!(matches!(
            msg.encode(),
            Err(ParseError::FieldNotFound { tag: 8 })
        ));
    }

    #[test]
    fn test_msg_type_and_seq_num() {
        let mut msg = Message::of_type(&MsgType::Logon);
        msg.header.set_uint(tags::MSG_SEQ_NUM, 7);
        assert_eq!(msg.msg_type().unwrap(), MsgType::Logon);
        assert_eq!(msg.seq_num().unwrap(), 7);
        assert!(msg.is_admin());
    }

    #[test]
    fn test_poss_dup_default() {
        let msg = Message::of_type(&MsgType::Heartbeat);
        assert!(!msg.poss_dup());

        let mut dup = Message::of_type(&MsgType::Heartbeat);
        dup.header.set_bool(tags::POSS_DUP_FLAG, true);
        assert!(dup.poss_dup());
    }
}
