/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Wire-format parsing: raw tag=value bytes into a [`Message`].
//!
//! The parser splits a complete frame into fields with `memchr`, verifies
//! the `8=`, `9=`, `35=` prologue, optionally re-checks BodyLength and
//! CheckSum, and distributes fields into header, body and trailer using
//! the dictionary. Repeating groups are structured from the dictionary's
//! group layouts; a count that disagrees with the instances found is left
//! for the validator to report (it becomes a session-level Reject, not a
//! dropped connection).

use fixline_core::checksum::{SOH, checksum, parse_checksum};
use fixline_core::error::ParseError;
use fixline_core::tags;
use fixline_core::{Group, Message};
use fixline_dictionary::schema::{Dictionary, GroupDef};
use memchr::memchr;
use smallvec::SmallVec;
use std::sync::Arc;

/// A tag and its raw value within the input buffer.
#[derive(Debug, Clone, Copy)]
struct RawField<'a> {
    tag: u32,
    value: &'a [u8],
    /// Byte offset of the tag's first digit within the frame.
    start: usize,
}

/// Parses complete FIX frames into structured messages.
#[derive(Debug, Clone)]
pub struct MessageParser {
    /// Dictionary for session-level messages (and everything on FIX 4.x).
    transport: Arc<Dictionary>,
    /// Application dictionary for FIXT.1.1 application messages.
    app: Option<Arc<Dictionary>>,
    /// Whether BodyLength and CheckSum are re-verified.
    validate_length_and_checksum: bool,
}

impl MessageParser {
    /// Creates a parser over a single dictionary.
    #[must_use]
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self {
            transport: dictionary,
            app: None,
            validate_length_and_checksum: true,
        }
    }

    /// Creates a FIXT.1.1 parser with an application dictionary for
    /// application-message group layouts.
    #[must_use]
    pub fn fixt(transport: Arc<Dictionary>, app: Arc<Dictionary>) -> Self {
        Self {
            transport,
            app: Some(app),
            validate_length_and_checksum: true,
        }
    }

    /// Sets whether BodyLength and CheckSum are re-verified during parsing.
    #[must_use]
    pub fn with_length_and_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_length_and_checksum = validate;
        self
    }

    /// Parses one complete frame.
    ///
    /// # Errors
    /// Returns a [`ParseError`] for a malformed prologue, a truncated
    /// frame, or (when enabled) a BodyLength/CheckSum mismatch.
    pub fn parse(&self, raw: &[u8]) -> Result<Message, ParseError> {
        let fields = split_fields(raw)?;
        if fields.len() < 3 {
            return Err(ParseError::Incomplete);
        }
        if fields[0].tag != tags::BEGIN_STRING {
            return Err(ParseError::InvalidBeginString);
        }
        if fields[1].tag != tags::BODY_LENGTH {
            return Err(ParseError::MissingBodyLength);
        }
        if fields[2].tag != tags::MSG_TYPE {
            return Err(ParseError::MissingMsgType);
        }

        let checksum_field = fields
            .last()
            .filter(|f| f.tag == tags::CHECK_SUM)
            .copied()
            .ok_or(ParseError::Incomplete)?;

        if self.validate_length_and_checksum {
            self.check_length(&fields, checksum_field)?;
            self.check_checksum(raw, checksum_field)?;
        }

        let msg_type = as_str(&fields[2])?;
        let dict = match (&self.app, is_admin_type(msg_type)) {
            (Some(app), false) => app.as_ref(),
            _ => self.transport.as_ref(),
        };

        let mut message = Message::new();
        message
            .header
            .set_field(tags::BEGIN_STRING, as_str(&fields[0])?);
        message.header.set_field(tags::MSG_TYPE, msg_type);

        let body_fields = &fields[3..fields.len() - 1];
        let mut i = 0;
        while i < body_fields.len() {
            let field = body_fields[i];
            let value = as_str(&field)?;

            if dict.is_trailer_tag(field.tag) {
                message.trailer.set_field(field.tag, value);
                i += 1;
            } else if dict.is_header_tag(field.tag) {
                message.header.set_field(field.tag, value);
                i += 1;
            } else if let Some(group_def) = dict.group_for(msg_type, field.tag) {
                message.body.set_field(field.tag, value);
                i += 1;
                for instance in parse_group(body_fields, &mut i, group_def)? {
                    message.body.add_group(instance);
                }
                // add_group rewrites the count; restore the wire value so a
                // mismatch survives for the validator to reject
                message.body.set_field(field.tag, value);
            } else {
                message.body.set_field(field.tag, value);
                i += 1;
            }
        }
        message
            .trailer
            .set_field(tags::CHECK_SUM, as_str(&checksum_field)?);

        Ok(message)
    }

    /// Declared BodyLength must equal the span between the end of the
    /// BodyLength field and the start of `10=`.
    fn check_length(
        &self,
        fields: &[RawField<'_>],
        checksum_field: RawField<'_>,
    ) -> Result<(), ParseError> {
        let declared: usize = as_str(&fields[1])?
            .parse()
            .map_err(|_| ParseError::InvalidBodyLength)?;
        let body_start = fields[2].start;
        let actual = checksum_field.start - body_start;
        if declared != actual {
            return Err(ParseError::BodyLengthMismatch { declared, actual });
        }
        Ok(())
    }

    /// Declared CheckSum must equal the byte sum of everything before `10=`.
    fn check_checksum(&self, raw: &[u8], checksum_field: RawField<'_>) -> Result<(), ParseError> {
        let declared =
            parse_checksum(checksum_field.value).ok_or(ParseError::InvalidFieldValue {
                tag: tags::CHECK_SUM,
                reason: "checksum must be three digits".to_string(),
            })?;
        let calculated = checksum(&raw[..checksum_field.start]);
        if calculated != declared {
            return Err(ParseError::ChecksumMismatch {
                calculated,
                declared,
            });
        }
        Ok(())
    }
}

/// Collects the instances of one repeating group starting at `*i`.
///
/// Instances open on the delimiter tag and close on the next delimiter or
/// the first tag that is neither a member nor a nested count tag.
fn parse_group(
    fields: &[RawField<'_>],
    i: &mut usize,
    def: &GroupDef,
) -> Result<Vec<Group>, ParseError> {
    let mut instances: Vec<Group> = Vec::new();
    let mut current: Option<Group> = None;

    while *i < fields.len() {
        let field = fields[*i];
        let value = as_str(&field)?;

        if field.tag == def.delimiter() {
            if let Some(done) = current.take() {
                instances.push(done);
            }
            let mut instance = Group::with_order(def.count_tag, def.member_order.clone());
            instance.set_field(field.tag, value);
            current = Some(instance);
            *i += 1;
            continue;
        }

        let Some(instance) = current.as_mut() else {
            break;
        };
        if let Some(nested_def) = def.nested.iter().find(|g| g.count_tag == field.tag) {
            instance.set_field(field.tag, value);
            *i += 1;
            let nested_instances = parse_group(fields, i, nested_def)?;
            for nested in nested_instances {
                instance.add_group(nested);
            }
            instance.set_field(field.tag, value);
        } else if def.is_member(field.tag) {
            instance.set_field(field.tag, value);
            *i += 1;
        } else {
            break;
        }
    }

    if let Some(done) = current.take() {
        instances.push(done);
    }
    Ok(instances)
}

/// Splits a frame into raw fields on `=` and SOH boundaries.
fn split_fields(raw: &[u8]) -> Result<SmallVec<[RawField<'_>; 32]>, ParseError> {
    let mut fields = SmallVec::new();
    let mut offset = 0;

    while offset < raw.len() {
        let rest = &raw[offset..];
        let eq = memchr(b'=', rest).ok_or(ParseError::Incomplete)?;
        let tag = parse_tag(&rest[..eq])?;
        let soh = memchr(SOH, &rest[eq + 1..]).ok_or(ParseError::Incomplete)?;
        fields.push(RawField {
            tag,
            value: &rest[eq + 1..eq + 1 + soh],
            start: offset,
        });
        offset += eq + 1 + soh + 1;
    }
    Ok(fields)
}

/// Parses an ASCII tag number.
fn parse_tag(bytes: &[u8]) -> Result<u32, ParseError> {
    if bytes.is_empty() || bytes.len() > 9 || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidTag(
            String::from_utf8_lossy(bytes).into_owned(),
        ));
    }
    let mut tag: u32 = 0;
    for &b in bytes {
        tag = tag * 10 + u32::from(b - b'0');
    }
    Ok(tag)
}

fn as_str<'a>(field: &RawField<'a>) -> Result<&'a str, ParseError> {
    std::str::from_utf8(field.value).map_err(|_| ParseError::InvalidUtf8)
}

/// Returns true for the seven administrative tag 35 values.
fn is_admin_type(msg_type: &str) -> bool {
    matches!(msg_type, "0" | "1" | "2" | "3" | "4" | "5" | "A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::types::FixVersion;

    fn parser() -> MessageParser {
        MessageParser::new(Arc::new(Dictionary::session_layer(FixVersion::Fix44)))
    }

    /// Builds a wire frame from `|`-separated body fields, computing
    /// BodyLength and CheckSum.
    fn frame(begin: &str, inner: &str) -> Vec<u8> {
        let inner = inner.replace('|', "\x01");
        let mut out = format!("8={begin}\x019={}\x01{inner}", inner.len()).into_bytes();
        let digits = fixline_core::checksum::format_checksum(checksum(&out));
        out.extend_from_slice(b"10=");
        out.extend_from_slice(&digits);
        out.push(SOH);
        out
    }

    #[test]
    fn test_parse_heartbeat() {
        let raw = frame(
            "FIX.4.4",
            "35=0|49=S|56=T|34=2|52=20260127-09:00:00.000|112=PING|",
        );
        let msg = parser().parse(&raw).unwrap();

        assert_eq!(msg.msg_type().unwrap().as_str(), "0");
        assert_eq!(msg.header.get_str(tags::SENDER_COMP_ID).unwrap(), "S");
        assert_eq!(msg.header.get_u64(tags::MSG_SEQ_NUM).unwrap(), 2);
        // TestReqID is a body field
        assert_eq!(msg.body.get_str(tags::TEST_REQ_ID).unwrap(), "PING");
        assert!(msg.trailer.contains(tags::CHECK_SUM));
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let mut raw = frame("FIX.4.4", "35=0|49=S|56=T|34=2|52=20260127-09:00:00|");
        let len = raw.len();
        raw[len - 2] = b'9'; // corrupt last checksum digit
        assert!(matches!(
            parser().parse(&raw),
            Err(ParseError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_skips_checksum_validation_when_disabled() {
        let mut raw = frame("FIX.4.4", "35=0|49=S|56=T|34=2|52=20260127-09:00:00|");
        let len = raw.len();
        raw[len - 2] = b'9';
        let lenient = parser().with_length_and_checksum_validation(false);
        assert!(lenient.parse(&raw).is_ok());
    }

    #[test]
    fn test_parse_rejects_body_length_mismatch() {
        let inner = "35=0\x0149=S\x0156=T\x01";
        let mut raw = format!("8=FIX.4.4\x019={}\x01{inner}", inner.len() + 4).into_bytes();
        let digits = fixline_core::checksum::format_checksum(checksum(&raw));
        raw.extend_from_slice(b"10=");
        raw.extend_from_slice(&digits);
        raw.push(SOH);

        assert!(matches!(
            parser().parse(&raw),
            Err(ParseError::BodyLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_requires_prologue_order() {
        let raw = b"9=5\x018=FIX.4.4\x0135=0\x0110=000\x01";
        assert!(matches!(
            parser().parse(raw),
            Err(ParseError::InvalidBeginString)
        ));
    }

    #[test]
    fn test_parse_logon_group() {
        let raw = frame(
            "FIX.4.4",
            "35=A|49=S|56=T|34=1|52=20260127-09:00:00|98=0|108=30|384=2|372=D|385=R|372=8|",
        );
        let msg = parser().parse(&raw).unwrap();

        assert_eq!(msg.body.group_count(tags::NO_MSG_TYPES), 2);
        let g1 = msg.body.group(1, tags::NO_MSG_TYPES).unwrap();
        assert_eq!(g1.get_str(tags::REF_MSG_TYPE).unwrap(), "D");
        assert_eq!(g1.get_char(tags::MSG_DIRECTION).unwrap(), 'R');
        let g2 = msg.body.group(2, tags::NO_MSG_TYPES).unwrap();
        assert_eq!(g2.get_str(tags::REF_MSG_TYPE).unwrap(), "8");
        // count field preserved from the wire
        assert_eq!(msg.body.get_u64(tags::NO_MSG_TYPES).unwrap(), 2);
    }

    #[test]
    fn test_parse_group_count_mismatch_left_to_validator() {
        let raw = frame(
            "FIX.4.4",
            "35=A|49=S|56=T|34=1|52=20260127-09:00:00|98=0|108=30|384=3|372=D|",
        );
        let msg = parser().parse(&raw).unwrap();
        assert_eq!(msg.body.group_count(tags::NO_MSG_TYPES), 1);
        assert_eq!(msg.body.get_u64(tags::NO_MSG_TYPES).unwrap(), 3);
        assert!(!Dictionary::group_count_matches(
            &msg.body,
            tags::NO_MSG_TYPES
        ));
    }

    #[test]
    fn test_roundtrip_parse_encode() {
        let raw = frame(
            "FIX.4.4",
            "35=1|49=S|56=T|34=5|52=20260127-09:00:00.000|112=TEST|",
        );
        let msg = parser().parse(&raw).unwrap();
        let encoded = msg.encode().unwrap();
        assert_eq!(&encoded[..], &raw[..]);
    }

    #[test]
    fn test_split_fields_positions() {
        let raw = b"8=FIX.4.4\x019=5\x0135=0\x01";
        let fields = split_fields(raw).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].tag, 8);
        assert_eq!(fields[0].start, 0);
        assert_eq!(fields[1].tag, 9);
        assert_eq!(fields[2].tag, 35);
        assert_eq!(fields[2].start, 14);
    }

    #[test]
    fn test_parse_tag_errors() {
        assert!(parse_tag(b"35").is_ok());
        assert!(parse_tag(b"").is_err());
        assert!(parse_tag(b"3a").is_err());
    }
}
