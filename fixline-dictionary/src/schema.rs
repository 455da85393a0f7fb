/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Schema definitions for FIX message dictionaries.
//!
//! A [`Dictionary`] describes one FIX version: which fields exist and
//! their types, which messages exist, which fields each message requires,
//! and the layout of repeating groups. Dictionaries for the session layer
//! are built in code by [`Dictionary::session_layer`]; application
//! dictionaries are assembled the same way by the embedding application
//! (XML loading is a concern of the caller, not of this crate).

use fixline_core::types::FixVersion;
use fixline_core::{FieldMap, tags};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// FIX field data type, as declared in the dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FieldType {
    /// Signed integer.
    Int,
    /// Byte length of an associated data field.
    Length,
    /// Message sequence number.
    SeqNum,
    /// Repeating group instance count.
    NumInGroup,
    /// Floating point number.
    Float,
    /// Quantity.
    Qty,
    /// Price.
    Price,
    /// Monetary amount.
    Amt,
    /// Single character.
    Char,
    /// `Y`/`N` flag.
    Boolean,
    /// Free-form string.
    #[default]
    String,
    /// UTC timestamp `YYYYMMDD-HH:MM:SS[.fff]`.
    UtcTimestamp,
    /// Raw data, unchecked.
    Data,
}

impl FieldType {
    /// Returns true if a value of this type must parse as a number.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Int
                | Self::Length
                | Self::SeqNum
                | Self::NumInGroup
                | Self::Float
                | Self::Qty
                | Self::Price
                | Self::Amt
        )
    }
}

/// Definition of a single field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDef {
    /// Tag number.
    pub tag: u32,
    /// Field name from the specification.
    pub name: &'static str,
    /// Declared data type.
    pub field_type: FieldType,
    /// Closed set of allowed values, empty when the field is open.
    pub allowed_values: Vec<&'static str>,
}

impl FieldDef {
    /// Creates a field definition.
    #[must_use]
    pub fn new(tag: u32, name: &'static str, field_type: FieldType) -> Self {
        Self {
            tag,
            name,
            field_type,
            allowed_values: Vec::new(),
        }
    }

    /// Restricts the field to an enumerated value set.
    #[must_use]
    pub fn with_values(mut self, values: &[&'static str]) -> Self {
        self.allowed_values = values.to_vec();
        self
    }
}

/// Reference to a field within a message, with its required flag.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldRef {
    /// Tag number.
    pub tag: u32,
    /// Whether the message is invalid without this field.
    pub required: bool,
}

impl FieldRef {
    /// A required field reference.
    #[must_use]
    pub const fn required(tag: u32) -> Self {
        Self {
            tag,
            required: true,
        }
    }

    /// An optional field reference.
    #[must_use]
    pub const fn optional(tag: u32) -> Self {
        Self {
            tag,
            required: false,
        }
    }
}

/// Declared layout of a repeating group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupDef {
    /// The NumInGroup count tag.
    pub count_tag: u32,
    /// Member tags in declared order; the first is the delimiter.
    pub member_order: Vec<u32>,
    /// Required flags for members.
    pub members: Vec<FieldRef>,
    /// Nested groups inside each instance.
    pub nested: Vec<GroupDef>,
}

impl GroupDef {
    /// Creates a group definition from its member references; the first
    /// member is the delimiter.
    #[must_use]
    pub fn new(count_tag: u32, members: Vec<FieldRef>) -> Self {
        let member_order = members.iter().map(|m| m.tag).collect();
        Self {
            count_tag,
            member_order,
            members,
            nested: Vec::new(),
        }
    }

    /// Returns the delimiter tag (first declared member).
    #[must_use]
    pub fn delimiter(&self) -> u32 {
        self.member_order.first().copied().unwrap_or_default()
    }

    /// Returns true if `tag` is a member of this group.
    #[must_use]
    pub fn is_member(&self, tag: u32) -> bool {
        self.member_order.contains(&tag)
    }
}

/// Definition of a message type.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDef {
    /// Tag 35 value.
    pub msg_type: &'static str,
    /// Message name from the specification.
    pub name: &'static str,
    /// Body fields with required flags.
    pub fields: Vec<FieldRef>,
    /// Repeating groups in the body.
    pub groups: Vec<GroupDef>,
}

impl MessageDef {
    /// Creates a message definition.
    #[must_use]
    pub fn new(msg_type: &'static str, name: &'static str, fields: Vec<FieldRef>) -> Self {
        Self {
            msg_type,
            name,
            fields,
            groups: Vec::new(),
        }
    }

    /// Adds a repeating group.
    #[must_use]
    pub fn with_group(mut self, group: GroupDef) -> Self {
        self.groups.push(group);
        self
    }

    /// Returns true if `tag` is declared for this message, either as a
    /// plain field, a group count or a group member.
    #[must_use]
    pub fn declares(&self, tag: u32) -> bool {
        self.fields.iter().any(|f| f.tag == tag)
            || self
                .groups
                .iter()
                .any(|g| g.count_tag == tag || g.is_member(tag))
    }

    /// Finds the group definition hung off `count_tag`.
    #[must_use]
    pub fn group(&self, count_tag: u32) -> Option<&GroupDef> {
        self.groups.iter().find(|g| g.count_tag == count_tag)
    }
}

/// Complete dictionary for one FIX version.
#[derive(Debug, Clone, Serialize)]
pub struct Dictionary {
    /// The FIX version this dictionary describes.
    pub version: FixVersion,
    /// Field definitions by tag.
    pub fields: HashMap<u32, FieldDef>,
    /// Message definitions by tag 35 value.
    pub messages: HashMap<&'static str, MessageDef>,
    /// Standard header fields.
    pub header: Vec<FieldRef>,
    /// Standard trailer fields.
    pub trailer: Vec<FieldRef>,
}

impl Dictionary {
    /// Creates an empty dictionary for a version.
    #[must_use]
    pub fn new(version: FixVersion) -> Self {
        Self {
            version,
            fields: HashMap::new(),
            messages: HashMap::new(),
            header: Vec::new(),
            trailer: Vec::new(),
        }
    }

    /// Adds a field definition.
    pub fn add_field(&mut self, field: FieldDef) {
        self.fields.insert(field.tag, field);
    }

    /// Adds a message definition.
    pub fn add_message(&mut self, message: MessageDef) {
        self.messages.insert(message.msg_type, message);
    }

    /// Looks up a field definition by tag.
    #[must_use]
    pub fn field(&self, tag: u32) -> Option<&FieldDef> {
        self.fields.get(&tag)
    }

    /// Looks up a message definition by tag 35 value.
    #[must_use]
    pub fn message(&self, msg_type: &str) -> Option<&MessageDef> {
        self.messages.get(msg_type)
    }

    /// Returns true if `tag` belongs to the standard header.
    #[must_use]
    pub fn is_header_tag(&self, tag: u32) -> bool {
        self.header.iter().any(|f| f.tag == tag)
    }

    /// Returns true if `tag` belongs to the standard trailer.
    #[must_use]
    pub fn is_trailer_tag(&self, tag: u32) -> bool {
        self.trailer.iter().any(|f| f.tag == tag)
    }

    /// Finds the group layout for `count_tag` within a message, searching
    /// nested groups as well.
    #[must_use]
    pub fn group_for(&self, msg_type: &str, count_tag: u32) -> Option<&GroupDef> {
        fn search<'a>(groups: &'a [GroupDef], count_tag: u32) -> Option<&'a GroupDef> {
            for g in groups {
                if g.count_tag == count_tag {
                    return Some(g);
                }
                if let Some(found) = search(&g.nested, count_tag) {
                    return Some(found);
                }
            }
            None
        }
        search(&self.message(msg_type)?.groups, count_tag)
    }

    /// Builds the session-layer dictionary for a FIX version: the seven
    /// administrative messages plus the standard header and trailer, with
    /// the per-version differences (ResetSeqNumFlag from 4.1,
    /// SessionRejectReason and the Logon NoMsgTypes group from 4.2,
    /// DefaultApplVerID on FIXT.1.1).
    #[must_use]
    pub fn session_layer(version: FixVersion) -> Self {
        let mut dict = Self::new(version);

        dict.header = vec![
            FieldRef::required(tags::BEGIN_STRING),
            FieldRef::required(tags::BODY_LENGTH),
            FieldRef::required(tags::MSG_TYPE),
            FieldRef::required(tags::SENDER_COMP_ID),
            FieldRef::required(tags::TARGET_COMP_ID),
            FieldRef::required(tags::MSG_SEQ_NUM),
            FieldRef::required(tags::SENDING_TIME),
            FieldRef::optional(tags::SENDER_SUB_ID),
            FieldRef::optional(tags::SENDER_LOCATION_ID),
            FieldRef::optional(tags::TARGET_SUB_ID),
            FieldRef::optional(tags::TARGET_LOCATION_ID),
            FieldRef::optional(tags::POSS_DUP_FLAG),
            FieldRef::optional(tags::POSS_RESEND),
            FieldRef::optional(tags::ORIG_SENDING_TIME),
            FieldRef::optional(tags::LAST_MSG_SEQ_NUM_PROCESSED),
        ];
        dict.trailer = vec![FieldRef::required(tags::CHECK_SUM)];

        dict.add_field(FieldDef::new(tags::BEGIN_STRING, "BeginString", FieldType::String));
        dict.add_field(FieldDef::new(tags::BODY_LENGTH, "BodyLength", FieldType::Length));
        dict.add_field(FieldDef::new(tags::CHECK_SUM, "CheckSum", FieldType::String));
        dict.add_field(FieldDef::new(tags::MSG_TYPE, "MsgType", FieldType::String));
        dict.add_field(FieldDef::new(tags::MSG_SEQ_NUM, "MsgSeqNum", FieldType::SeqNum));
        dict.add_field(FieldDef::new(tags::SENDER_COMP_ID, "SenderCompID", FieldType::String));
        dict.add_field(FieldDef::new(tags::SENDER_SUB_ID, "SenderSubID", FieldType::String));
        dict.add_field(FieldDef::new(
            tags::SENDER_LOCATION_ID,
            "SenderLocationID",
            FieldType::String,
        ));
        dict.add_field(FieldDef::new(tags::TARGET_COMP_ID, "TargetCompID", FieldType::String));
        dict.add_field(FieldDef::new(tags::TARGET_SUB_ID, "TargetSubID", FieldType::String));
        dict.add_field(FieldDef::new(
            tags::TARGET_LOCATION_ID,
            "TargetLocationID",
            FieldType::String,
        ));
        dict.add_field(FieldDef::new(tags::SENDING_TIME, "SendingTime", FieldType::UtcTimestamp));
        dict.add_field(FieldDef::new(
            tags::ORIG_SENDING_TIME,
            "OrigSendingTime",
            FieldType::UtcTimestamp,
        ));
        dict.add_field(FieldDef::new(tags::POSS_DUP_FLAG, "PossDupFlag", FieldType::Boolean));
        dict.add_field(FieldDef::new(tags::POSS_RESEND, "PossResend", FieldType::Boolean));
        dict.add_field(FieldDef::new(
            tags::LAST_MSG_SEQ_NUM_PROCESSED,
            "LastMsgSeqNumProcessed",
            FieldType::SeqNum,
        ));
        dict.add_field(FieldDef::new(tags::BEGIN_SEQ_NO, "BeginSeqNo", FieldType::SeqNum));
        dict.add_field(FieldDef::new(tags::END_SEQ_NO, "EndSeqNo", FieldType::SeqNum));
        dict.add_field(FieldDef::new(tags::NEW_SEQ_NO, "NewSeqNo", FieldType::SeqNum));
        dict.add_field(FieldDef::new(tags::GAP_FILL_FLAG, "GapFillFlag", FieldType::Boolean));
        dict.add_field(FieldDef::new(tags::REF_SEQ_NUM, "RefSeqNum", FieldType::SeqNum));
        dict.add_field(FieldDef::new(tags::REF_TAG_ID, "RefTagID", FieldType::Int));
        dict.add_field(FieldDef::new(tags::REF_MSG_TYPE, "RefMsgType", FieldType::String));
        dict.add_field(FieldDef::new(tags::TEXT, "Text", FieldType::String));
        dict.add_field(FieldDef::new(tags::TEST_REQ_ID, "TestReqID", FieldType::String));
        dict.add_field(FieldDef::new(tags::HEART_BT_INT, "HeartBtInt", FieldType::Int));
        dict.add_field(
            FieldDef::new(tags::ENCRYPT_METHOD, "EncryptMethod", FieldType::Int)
                .with_values(&["0", "1", "2", "3", "4", "5", "6"]),
        );

        if version >= FixVersion::Fix41 {
            dict.add_field(FieldDef::new(
                tags::RESET_SEQ_NUM_FLAG,
                "ResetSeqNumFlag",
                FieldType::Boolean,
            ));
        }
        if version >= FixVersion::Fix42 {
            dict.add_field(
                FieldDef::new(tags::SESSION_REJECT_REASON, "SessionRejectReason", FieldType::Int)
                    .with_values(&[
                        "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13",
                        "14", "15", "16", "17", "99",
                    ]),
            );
            dict.add_field(FieldDef::new(tags::NO_MSG_TYPES, "NoMsgTypes", FieldType::NumInGroup));
            dict.add_field(FieldDef::new(
                tags::MSG_DIRECTION,
                "MsgDirection",
                FieldType::Char,
            ));
        }
        if version.is_fixt() {
            dict.add_field(FieldDef::new(
                tags::DEFAULT_APPL_VER_ID,
                "DefaultApplVerID",
                FieldType::String,
            ));
            dict.add_field(FieldDef::new(tags::APPL_VER_ID, "ApplVerID", FieldType::String));
            dict.header.push(FieldRef::optional(tags::APPL_VER_ID));
        }

        dict.add_message(MessageDef::new(
            "0",
            "Heartbeat",
            vec![FieldRef::optional(tags::TEST_REQ_ID)],
        ));
        dict.add_message(MessageDef::new(
            "1",
            "TestRequest",
            vec![FieldRef::required(tags::TEST_REQ_ID)],
        ));
        dict.add_message(MessageDef::new(
            "2",
            "ResendRequest",
            vec![
                FieldRef::required(tags::BEGIN_SEQ_NO),
                FieldRef::required(tags::END_SEQ_NO),
            ],
        ));
        let mut reject_fields = vec![
            FieldRef::required(tags::REF_SEQ_NUM),
            FieldRef::optional(tags::TEXT),
        ];
        if version >= FixVersion::Fix42 {
            reject_fields.push(FieldRef::optional(tags::REF_TAG_ID));
            reject_fields.push(FieldRef::optional(tags::REF_MSG_TYPE));
            reject_fields.push(FieldRef::optional(tags::SESSION_REJECT_REASON));
        }
        dict.add_message(MessageDef::new("3", "Reject", reject_fields));
        dict.add_message(MessageDef::new(
            "4",
            "SequenceReset",
            vec![
                FieldRef::required(tags::NEW_SEQ_NO),
                FieldRef::optional(tags::GAP_FILL_FLAG),
            ],
        ));
        dict.add_message(MessageDef::new(
            "5",
            "Logout",
            vec![FieldRef::optional(tags::TEXT)],
        ));

        let mut logon_fields = vec![
            FieldRef::required(tags::ENCRYPT_METHOD),
            FieldRef::required(tags::HEART_BT_INT),
        ];
        if version >= FixVersion::Fix41 {
            logon_fields.push(FieldRef::optional(tags::RESET_SEQ_NUM_FLAG));
        }
        if version.is_fixt() {
            logon_fields.push(FieldRef::required(tags::DEFAULT_APPL_VER_ID));
        }
        let mut logon = MessageDef::new("A", "Logon", logon_fields);
        if version >= FixVersion::Fix42 {
            logon = logon.with_group(GroupDef::new(
                tags::NO_MSG_TYPES,
                vec![
                    FieldRef::required(tags::REF_MSG_TYPE),
                    FieldRef::optional(tags::MSG_DIRECTION),
                ],
            ));
        }
        dict.add_message(logon);

        dict
    }

    /// Validates a parsed repeating group count against the instances a
    /// field map actually holds.
    #[must_use]
    pub fn group_count_matches(map: &FieldMap, count_tag: u32) -> bool {
        match map.get(count_tag) {
            Some(raw) => raw
                .parse::<usize>()
                .map(|declared| declared == map.group_count(count_tag))
                .unwrap_or(false),
            None => map.group_count(count_tag) == 0,
        }
    }
}
