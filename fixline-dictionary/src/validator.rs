/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message validation against a dictionary.
//!
//! The validator checks a parsed [`Message`] for: known message type,
//! required fields, unknown tags (configurable), header/body/trailer
//! placement, value presence, data types, enumerated values and repeating
//! group counts. Failures carry the [`RejectReason`] a session-level
//! Reject (35=3) needs.
//!
//! For FIXT.1.1 two dictionaries compose: administrative messages are
//! checked against the transport dictionary, application messages against
//! the application dictionary selected by DefaultApplVerID.

use crate::schema::{Dictionary, FieldDef, FieldType, GroupDef, MessageDef};
use fixline_core::error::{RejectReason, ValidationError};
use fixline_core::types::UtcTimestamp;
use fixline_core::{FieldMap, Message, MsgType};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Validates messages against one dictionary, or a transport/application
/// pair for FIXT.1.1.
#[derive(Debug, Clone)]
pub struct Validator {
    /// Dictionary for session-level messages (and everything on FIX 4.x).
    transport: Arc<Dictionary>,
    /// Dictionary for application messages on FIXT.1.1.
    app: Option<Arc<Dictionary>>,
    /// Whether unknown tags fail validation.
    reject_unknown_fields: bool,
}

impl Validator {
    /// Creates a validator over a single dictionary.
    #[must_use]
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self {
            transport: dictionary,
            app: None,
            reject_unknown_fields: true,
        }
    }

    /// Creates a FIXT.1.1 validator composing a transport dictionary for
    /// session-level messages with an application dictionary.
    #[must_use]
    pub fn fixt(transport: Arc<Dictionary>, app: Arc<Dictionary>) -> Self {
        Self {
            transport,
            app: Some(app),
            reject_unknown_fields: true,
        }
    }

    /// Sets whether unknown tags fail validation.
    #[must_use]
    pub fn with_reject_unknown_fields(mut self, reject: bool) -> Self {
        self.reject_unknown_fields = reject;
        self
    }

    /// Returns the dictionary that governs the given message type.
    #[must_use]
    fn dictionary_for(&self, msg_type: &MsgType) -> &Dictionary {
        match (&self.app, msg_type.is_admin()) {
            (Some(app), false) => app,
            _ => &self.transport,
        }
    }

    /// Validates a message.
    ///
    /// # Errors
    /// Returns the first [`ValidationError`] found, in check order:
    /// message type, required fields, field placement, unknown tags,
    /// values and types, group counts.
    pub fn validate(&self, message: &Message) -> Result<(), ValidationError> {
        let msg_type = message.msg_type().map_err(|_| {
            ValidationError::new(RejectReason::RequiredTagMissing)
                .with_tag(fixline_core::tags::MSG_TYPE)
        })?;

        let dict = self.dictionary_for(&msg_type);
        let def = dict.message(msg_type.as_str()).ok_or_else(|| {
            ValidationError::new(RejectReason::InvalidMsgType)
                .with_detail(format!("'{msg_type}'"))
        })?;

        self.check_required(message, dict, def)?;
        self.check_placement(message, dict, def)?;
        self.check_values(message, dict)?;
        self.check_groups(&message.body, def.groups.as_slice(), dict)?;
        Ok(())
    }

    /// Required header, trailer and body fields must be present.
    fn check_required(
        &self,
        message: &Message,
        dict: &Dictionary,
        def: &MessageDef,
    ) -> Result<(), ValidationError> {
        for field in &dict.header {
            if field.required && !message.header.contains(field.tag) {
                return Err(missing(field.tag));
            }
        }
        for field in &dict.trailer {
            // CheckSum is synthesized at encode time; inbound messages carry it.
            if field.required
                && field.tag != fixline_core::tags::CHECK_SUM
                && !message.trailer.contains(field.tag)
            {
                return Err(missing(field.tag));
            }
        }
        for field in &def.fields {
            if field.required && !message.body.contains(field.tag) {
                return Err(missing(field.tag));
            }
        }
        Ok(())
    }

    /// Header fields stay in the header, trailer fields in the trailer,
    /// and body tags must be declared for the message type.
    fn check_placement(
        &self,
        message: &Message,
        dict: &Dictionary,
        def: &MessageDef,
    ) -> Result<(), ValidationError> {
        for (tag, _) in message.header.iter() {
            if !dict.is_header_tag(tag) {
                return Err(ValidationError::new(RejectReason::TagOutOfOrder).with_tag(tag));
            }
        }
        for (tag, _) in message.trailer.iter() {
            if !dict.is_trailer_tag(tag) {
                return Err(ValidationError::new(RejectReason::TagOutOfOrder).with_tag(tag));
            }
        }
        for (tag, _) in message.body.iter() {
            if dict.is_header_tag(tag) || dict.is_trailer_tag(tag) {
                return Err(ValidationError::new(RejectReason::TagOutOfOrder).with_tag(tag));
            }
            if dict.field(tag).is_none() {
                if self.reject_unknown_fields {
                    return Err(ValidationError::new(RejectReason::UndefinedTag).with_tag(tag));
                }
                continue;
            }
            if !def.declares(tag) && self.reject_unknown_fields {
                return Err(
                    ValidationError::new(RejectReason::TagNotDefinedForMessage).with_tag(tag)
                );
            }
        }
        Ok(())
    }

    /// Every field must carry a value of the declared type, within the
    /// enumerated set when one is declared.
    fn check_values(&self, message: &Message, dict: &Dictionary) -> Result<(), ValidationError> {
        for part in [&message.header, &message.body, &message.trailer] {
            for (tag, value) in part.iter() {
                if value.is_empty() {
                    return Err(
                        ValidationError::new(RejectReason::TagSpecifiedWithoutValue).with_tag(tag)
                    );
                }
                if let Some(def) = dict.field(tag) {
                    check_format(tag, value, def)?;
                }
            }
        }
        Ok(())
    }

    /// Declared NumInGroup counts must match the parsed instances, and
    /// each instance must carry its required members.
    fn check_groups(
        &self,
        map: &FieldMap,
        groups: &[GroupDef],
        dict: &Dictionary,
    ) -> Result<(), ValidationError> {
        for group_def in groups {
            if !Dictionary::group_count_matches(map, group_def.count_tag) {
                return Err(
                    ValidationError::new(RejectReason::IncorrectGroupCount)
                        .with_tag(group_def.count_tag),
                );
            }
            for index in 1..=map.group_count(group_def.count_tag) {
                let instance = map
                    .group(index, group_def.count_tag)
                    .expect("index bounded by group_count");
                for member in &group_def.members {
                    if member.required && !instance.contains(member.tag) {
                        return Err(missing(member.tag));
                    }
                }
                for (tag, value) in instance.iter() {
                    if value.is_empty() {
                        return Err(
                            ValidationError::new(RejectReason::TagSpecifiedWithoutValue)
                                .with_tag(tag),
                        );
                    }
                    if !group_def.is_member(tag) && self.reject_unknown_fields {
                        return Err(
                            ValidationError::new(RejectReason::TagNotDefinedForMessage)
                                .with_tag(tag),
                        );
                    }
                    if let Some(def) = dict.field(tag) {
                        check_format(tag, value, def)?;
                    }
                }
                self.check_groups(instance, &group_def.nested, dict)?;
            }
        }
        Ok(())
    }
}

/// Checks a single value against its declared type and value set.
fn check_format(tag: u32, value: &str, def: &FieldDef) -> Result<(), ValidationError> {
    let format_ok = match def.field_type {
        FieldType::Int => value.parse::<i64>().is_ok(),
        FieldType::Length | FieldType::SeqNum | FieldType::NumInGroup => {
            value.parse::<u64>().is_ok()
        }
        FieldType::Float | FieldType::Qty | FieldType::Price | FieldType::Amt => {
            value.parse::<Decimal>().is_ok()
        }
        FieldType::Char => value.len() == 1 && value.is_ascii(),
        FieldType::Boolean => matches!(value, "Y" | "N"),
        FieldType::UtcTimestamp => UtcTimestamp::parse(value).is_ok(),
        FieldType::String | FieldType::Data => true,
    };
    if !format_ok {
        return Err(
            ValidationError::new(RejectReason::IncorrectDataFormat)
                .with_tag(tag)
                .with_detail(format!("'{value}' is not a valid {:?}", def.field_type)),
        );
    }
    if !def.allowed_values.is_empty() && !def.allowed_values.contains(&value) {
        return Err(ValidationError::new(RejectReason::ValueOutOfRange).with_tag(tag));
    }
    Ok(())
}

fn missing(tag: u32) -> ValidationError {
    ValidationError::new(RejectReason::RequiredTagMissing).with_tag(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::types::{FixVersion, TimestampPrecision};
    use fixline_core::{Group, tags};

    fn validator() -> Validator {
        Validator::new(Arc::new(Dictionary::session_layer(FixVersion::Fix44)))
    }

    fn base_message(msg_type: &MsgType) -> Message {
        let mut msg = Message::of_type(msg_type);
        msg.header.set_field(tags::BEGIN_STRING, "FIX.4.4");
        msg.header.set_field(tags::SENDER_COMP_ID, "S");
        msg.header.set_field(tags::TARGET_COMP_ID, "T");
        msg.header.set_uint(tags::MSG_SEQ_NUM, 1);
        msg.header.set_timestamp(
            tags::SENDING_TIME,
            UtcTimestamp::from_ymd_hms(2026, 1, 27, 9, 0, 0).unwrap(),
            TimestampPrecision::Millis,
        );
        msg
    }

    #[test]
    fn test_valid_heartbeat() {
        let msg = base_message(&MsgType::Heartbeat);
        assert!(validator().validate(&msg).is_ok());
    }

    #[test]
    fn test_missing_required_header_field() {
        let mut msg = base_message(&MsgType::Heartbeat);
        msg.header.remove(tags::SENDING_TIME);
        let err = validator().validate(&msg).unwrap_err();
        assert_eq!(err.reason, RejectReason::RequiredTagMissing);
        assert_eq!(err.ref_tag, Some(tags::SENDING_TIME));
    }

    #[test]
    fn test_missing_required_body_field() {
        // TestRequest without TestReqID
        let msg = base_message(&MsgType::TestRequest);
        let err = validator().validate(&msg).unwrap_err();
        assert_eq!(err.reason, RejectReason::RequiredTagMissing);
        assert_eq!(err.ref_tag, Some(tags::TEST_REQ_ID));
    }

    #[test]
    fn test_unknown_msg_type() {
        let msg = base_message(&MsgType::App("ZZ".to_string()));
        let err = validator().validate(&msg).unwrap_err();
        assert_eq!(err.reason, RejectReason::InvalidMsgType);
    }

    #[test]
    fn test_undefined_tag_rejected_and_tolerated() {
        let mut msg = base_message(&MsgType::Heartbeat);
        msg.body.set_field(9999, "x");

        let err = validator().validate(&msg).unwrap_err();
        assert_eq!(err.reason, RejectReason::UndefinedTag);

        let tolerant = validator().with_reject_unknown_fields(false);
        assert!(tolerant.validate(&msg).is_ok());
    }

    #[test]
    fn test_header_tag_in_body() {
        let mut msg = base_message(&MsgType::Heartbeat);
        msg.body.set_field(tags::SENDING_TIME, "20260127-09:00:00");
        let err = validator().validate(&msg).unwrap_err();
        assert_eq!(err.reason, RejectReason::TagOutOfOrder);
    }

    #[test]
    fn test_empty_value() {
        let mut msg = base_message(&MsgType::Logout);
        msg.body.set_field(tags::TEXT, "");
        let err = validator().validate(&msg).unwrap_err();
        assert_eq!(err.reason, RejectReason::TagSpecifiedWithoutValue);
    }

    #[test]
    fn test_bad_data_format() {
        let mut msg = base_message(&MsgType::ResendRequest);
        msg.body.set_field(tags::BEGIN_SEQ_NO, "abc");
        msg.body.set_uint(tags::END_SEQ_NO, 0);
        let err = validator().validate(&msg).unwrap_err();
        assert_eq!(err.reason, RejectReason::IncorrectDataFormat);
        assert_eq!(err.ref_tag, Some(tags::BEGIN_SEQ_NO));
    }

    #[test]
    fn test_enumerated_value_out_of_range() {
        let mut msg = base_message(&MsgType::Logon);
        msg.body.set_field(tags::ENCRYPT_METHOD, "42");
        msg.body.set_uint(tags::HEART_BT_INT, 30);
        let err = validator().validate(&msg).unwrap_err();
        assert_eq!(err.reason, RejectReason::ValueOutOfRange);
        assert_eq!(err.ref_tag, Some(tags::ENCRYPT_METHOD));
    }

    #[test]
    fn test_group_count_mismatch() {
        let mut msg = base_message(&MsgType::Logon);
        msg.body.set_uint(tags::ENCRYPT_METHOD, 0);
        msg.body.set_uint(tags::HEART_BT_INT, 30);

        let mut g = Group::new(tags::NO_MSG_TYPES, tags::REF_MSG_TYPE);
        g.set_field(tags::REF_MSG_TYPE, "D");
        msg.body.add_group(g);
        // tamper with the count after the fact
        msg.body.set_uint(tags::NO_MSG_TYPES, 3);

        let err = validator().validate(&msg).unwrap_err();
        assert_eq!(err.reason, RejectReason::IncorrectGroupCount);
        assert_eq!(err.ref_tag, Some(tags::NO_MSG_TYPES));
    }

    #[test]
    fn test_group_required_member() {
        let mut msg = base_message(&MsgType::Logon);
        msg.body.set_uint(tags::ENCRYPT_METHOD, 0);
        msg.body.set_uint(tags::HEART_BT_INT, 30);

        let mut g = Group::new(tags::NO_MSG_TYPES, tags::REF_MSG_TYPE);
        g.set_char(tags::MSG_DIRECTION, 'S');
        msg.body.add_group(g);

        let err = validator().validate(&msg).unwrap_err();
        assert_eq!(err.reason, RejectReason::RequiredTagMissing);
        assert_eq!(err.ref_tag, Some(tags::REF_MSG_TYPE));
    }

    #[test]
    fn test_fixt_composition() {
        let transport = Arc::new(Dictionary::session_layer(FixVersion::Fixt11));

        // minimal application dictionary with one message
        let mut app = Dictionary::session_layer(FixVersion::Fix44);
        app.add_field(FieldDef::new(112, "TestReqID", FieldType::String));
        let v = Validator::fixt(transport, Arc::new(app));

        // admin message validated against transport dictionary
        let mut logon = base_message(&MsgType::Logon);
        logon.header.set_field(tags::BEGIN_STRING, "FIXT.1.1");
        logon.body.set_uint(tags::ENCRYPT_METHOD, 0);
        logon.body.set_uint(tags::HEART_BT_INT, 30);
        let err = v.validate(&logon).unwrap_err();
        // DefaultApplVerID required on FIXT logon
        assert_eq!(err.ref_tag, Some(tags::DEFAULT_APPL_VER_ID));

        logon.body.set_field(tags::DEFAULT_APPL_VER_ID, "9");
        assert!(v.validate(&logon).is_ok());
    }
}
