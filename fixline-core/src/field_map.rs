/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Ordered tag=value container with repeating groups.
//!
//! A [`FieldMap`] keeps fields in insertion order, optionally forcing a
//! fixed prefix order for serialization (the message header serializes
//! `8`, `9`, `35` first; group instances serialize their declared field
//! order, delimiter tag first). Repeating groups hang off their NumInGroup
//! count tag and serialize in place of it.

use crate::checksum::SOH;
use crate::error::ParseError;
use crate::types::{TimestampPrecision, UtcTimestamp};
use bytes::{BufMut, BytesMut};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

/// A single tag=value field.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    tag: u32,
    value: String,
}

/// Insertion-ordered collection of fields and repeating groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    /// Fields in insertion order.
    fields: Vec<Field>,
    /// Group instances keyed by their NumInGroup count tag.
    groups: BTreeMap<u32, Vec<Group>>,
    /// Tags serialized first, in this order, regardless of insertion order.
    order: Vec<u32>,
}

impl FieldMap {
    /// Creates an empty map with no forced serialization order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map whose serialization starts with `order`.
    #[must_use]
    pub fn with_order(order: Vec<u32>) -> Self {
        Self {
            fields: Vec::new(),
            groups: BTreeMap::new(),
            order,
        }
    }

    /// Sets a field, overwriting any existing value for the tag.
    pub fn set_field(&mut self, tag: u32, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.tag == tag) {
            Some(field) => field.value = value,
            None => self.fields.push(Field { tag, value }),
        }
    }

    /// Sets a field only if the tag is not already present.
    ///
    /// # Returns
    /// `true` if the value was stored.
    pub fn set_if_absent(&mut self, tag: u32, value: impl Into<String>) -> bool {
        if self.contains(tag) {
            return false;
        }
        self.fields.push(Field {
            tag,
            value: value.into(),
        });
        true
    }

    /// Sets an unsigned integer field.
    pub fn set_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.set_field(tag, buf.format(value));
    }

    /// Sets a signed integer field.
    pub fn set_int(&mut self, tag: u32, value: i64) {
        let mut buf = itoa::Buffer::new();
        self.set_field(tag, buf.format(value));
    }

    /// Sets a boolean field as `Y` or `N`.
    pub fn set_bool(&mut self, tag: u32, value: bool) {
        self.set_field(tag, if value { "Y" } else { "N" });
    }

    /// Sets a single-character field.
    pub fn set_char(&mut self, tag: u32, value: char) {
        self.set_field(tag, value.to_string());
    }

    /// Sets a UTC timestamp field at the given precision.
    pub fn set_timestamp(&mut self, tag: u32, value: UtcTimestamp, precision: TimestampPrecision) {
        self.set_field(tag, value.format(precision));
    }

    /// Returns the raw value for a tag, if present.
    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.value.as_str())
    }

    /// Returns the value for a tag.
    ///
    /// # Errors
    /// Returns [`ParseError::FieldNotFound`] if the tag is absent.
    pub fn get_str(&self, tag: u32) -> Result<&str, ParseError> {
        self.get(tag).ok_or(ParseError::FieldNotFound { tag })
    }

    /// Returns the value for a tag parsed as `u64`.
    ///
    /// # Errors
    /// [`ParseError::FieldNotFound`] if absent,
    /// [`ParseError::InvalidFieldValue`] if not a number.
    pub fn get_u64(&self, tag: u32) -> Result<u64, ParseError> {
        let raw = self.get_str(tag)?;
        raw.parse().map_err(|_| ParseError::InvalidFieldValue {
            tag,
            reason: format!("'{raw}' is not an unsigned integer"),
        })
    }

    /// Returns the value for a tag parsed as `i64`.
    ///
    /// # Errors
    /// [`ParseError::FieldNotFound`] if absent,
    /// [`ParseError::InvalidFieldValue`] if not a number.
    pub fn get_i64(&self, tag: u32) -> Result<i64, ParseError> {
        let raw = self.get_str(tag)?;
        raw.parse().map_err(|_| ParseError::InvalidFieldValue {
            tag,
            reason: format!("'{raw}' is not an integer"),
        })
    }

    /// Returns a `Y`/`N` field as a boolean.
    ///
    /// # Errors
    /// [`ParseError::FieldNotFound`] if absent,
    /// [`ParseError::InvalidFieldValue`] for anything but `Y` or `N`.
    pub fn get_bool(&self, tag: u32) -> Result<bool, ParseError> {
        match self.get_str(tag)? {
            "Y" => Ok(true),
            "N" => Ok(false),
            other => Err(ParseError::InvalidFieldValue {
                tag,
                reason: format!("'{other}' is not Y or N"),
            }),
        }
    }

    /// Returns a single-character field.
    ///
    /// # Errors
    /// [`ParseError::FieldNotFound`] if absent,
    /// [`ParseError::InvalidFieldValue`] unless exactly one ASCII char.
    pub fn get_char(&self, tag: u32) -> Result<char, ParseError> {
        let raw = self.get_str(tag)?;
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() => Ok(c),
            _ => Err(ParseError::InvalidFieldValue {
                tag,
                reason: format!("'{raw}' is not a single character"),
            }),
        }
    }

    /// Returns the value for a tag parsed as a decimal.
    ///
    /// # Errors
    /// [`ParseError::FieldNotFound`] if absent,
    /// [`ParseError::InvalidFieldValue`] if not a decimal number.
    pub fn get_decimal(&self, tag: u32) -> Result<Decimal, ParseError> {
        let raw = self.get_str(tag)?;
        raw.parse().map_err(|_| ParseError::InvalidFieldValue {
            tag,
            reason: format!("'{raw}' is not a decimal"),
        })
    }

    /// Returns a UTC timestamp field.
    ///
    /// # Errors
    /// [`ParseError::FieldNotFound`] if absent,
    /// [`ParseError::InvalidFieldValue`] if not a FIX UTC timestamp.
    pub fn get_timestamp(&self, tag: u32) -> Result<UtcTimestamp, ParseError> {
        UtcTimestamp::parse(self.get_str(tag)?).map_err(|_| ParseError::InvalidFieldValue {
            tag,
            reason: "not a UTC timestamp".to_string(),
        })
    }

    /// Returns true if the tag is present.
    #[must_use]
    pub fn contains(&self, tag: u32) -> bool {
        self.fields.iter().any(|f| f.tag == tag)
    }

    /// Removes a field, returning its value if it was present.
    pub fn remove(&mut self, tag: u32) -> Option<String> {
        let idx = self.fields.iter().position(|f| f.tag == tag)?;
        Some(self.fields.remove(idx).value)
    }

    /// Returns the number of plain fields (group instances not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the map holds no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in insertion order as `(tag, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.fields.iter().map(|f| (f.tag, f.value.as_str()))
    }

    /// Appends a group instance under its count tag.
    ///
    /// The NumInGroup count field is kept in sync and occupies the
    /// serialization slot for the whole group.
    pub fn add_group(&mut self, group: Group) {
        let count_tag = group.count_tag;
        let count = {
            let instances = self.groups.entry(count_tag).or_default();
            instances.push(group);
            instances.len() as u64
        };
        self.set_uint(count_tag, count);
    }

    /// Returns the group instance at a 1-based index.
    ///
    /// # Errors
    /// Returns [`ParseError::FieldNotFound`] for the count tag if the
    /// index is out of range.
    pub fn group(&self, index: usize, count_tag: u32) -> Result<&Group, ParseError> {
        index
            .checked_sub(1)
            .and_then(|i| self.groups.get(&count_tag)?.get(i))
            .ok_or(ParseError::FieldNotFound { tag: count_tag })
    }

    /// Returns the group instance at a 1-based index, mutably.
    ///
    /// # Errors
    /// Returns [`ParseError::FieldNotFound`] for the count tag if the
    /// index is out of range.
    pub fn group_mut(&mut self, index: usize, count_tag: u32) -> Result<&mut Group, ParseError> {
        index
            .checked_sub(1)
            .and_then(|i| self.groups.get_mut(&count_tag)?.get_mut(i))
            .ok_or(ParseError::FieldNotFound { tag: count_tag })
    }

    /// Removes and returns the group instance at a 1-based index.
    ///
    /// The count field follows the new instance count and disappears with
    /// the last instance.
    ///
    /// # Errors
    /// Returns [`ParseError::FieldNotFound`] for the count tag if the
    /// index is out of range.
    pub fn remove_group(&mut self, index: usize, count_tag: u32) -> Result<Group, ParseError> {
        let instances = self
            .groups
            .get_mut(&count_tag)
            .ok_or(ParseError::FieldNotFound { tag: count_tag })?;
        let i = index
            .checked_sub(1)
            .filter(|i| *i < instances.len())
            .ok_or(ParseError::FieldNotFound { tag: count_tag })?;
        let removed = instances.remove(i);

        if instances.is_empty() {
            self.groups.remove(&count_tag);
            self.remove(count_tag);
        } else {
            let count = instances.len() as u64;
            self.set_uint(count_tag, count);
        }
        Ok(removed)
    }

    /// Returns the number of instances of a group.
    #[must_use]
    pub fn group_count(&self, count_tag: u32) -> usize {
        self.groups.get(&count_tag).map_or(0, Vec::len)
    }

    /// Removes all fields and groups.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.groups.clear();
    }

    /// Serializes fields into `buf`: ordered tags first, then the rest in
    /// insertion order, with group instances emitted after their count
    /// field. Tags listed in `skip` are omitted.
    pub fn encode_into(&self, buf: &mut BytesMut, skip: &[u32]) {
        for &tag in &self.order {
            if skip.contains(&tag) {
                continue;
            }
            if let Some(value) = self.get(tag) {
                put_field(buf, tag, value);
                self.encode_groups(buf, tag);
            }
        }
        for field in &self.fields {
            if skip.contains(&field.tag) || self.order.contains(&field.tag) {
                continue;
            }
            put_field(buf, field.tag, &field.value);
            self.encode_groups(buf, field.tag);
        }
    }

    fn encode_groups(&self, buf: &mut BytesMut, count_tag: u32) {
        if let Some(instances) = self.groups.get(&count_tag) {
            for instance in instances {
                instance.map.encode_into(buf, &[]);
            }
        }
    }
}

/// Writes a single `tag=value<SOH>` field.
fn put_field(buf: &mut BytesMut, tag: u32, value: &str) {
    let mut tag_buf = itoa::Buffer::new();
    buf.put_slice(tag_buf.format(tag).as_bytes());
    buf.put_u8(b'=');
    buf.put_slice(value.as_bytes());
    buf.put_u8(SOH);
}

/// One instance of a repeating group.
///
/// A group is a [`FieldMap`] whose serialization order is the group's
/// declared field order, starting with the delimiter tag. Dereferences to
/// its field map for field access.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    count_tag: u32,
    delimiter: u32,
    map: FieldMap,
}

impl Group {
    /// Creates an empty group instance.
    ///
    /// # Arguments
    /// * `count_tag` - The NumInGroup tag this group hangs off
    /// * `delimiter` - The first tag of every instance
    #[must_use]
    pub fn new(count_tag: u32, delimiter: u32) -> Self {
        Self {
            count_tag,
            delimiter,
            map: FieldMap::with_order(vec![delimiter]),
        }
    }

    /// Creates a group instance with a full declared field order.
    ///
    /// The first tag of `order` is the delimiter.
    #[must_use]
    pub fn with_order(count_tag: u32, order: Vec<u32>) -> Self {
        let delimiter = order.first().copied().unwrap_or_default();
        Self {
            count_tag,
            delimiter,
            map: FieldMap::with_order(order),
        }
    }

    /// Returns the NumInGroup count tag.
    #[inline]
    #[must_use]
    pub const fn count_tag(&self) -> u32 {
        self.count_tag
    }

    /// Returns the delimiter tag.
    #[inline]
    #[must_use]
    pub const fn delimiter(&self) -> u32 {
        self.delimiter
    }
}

impl Deref for Group {
    type Target = FieldMap;

    fn deref(&self) -> &FieldMap {
        &self.map
    }
}

impl DerefMut for Group {
    fn deref_mut(&mut self) -> &mut FieldMap {
        &mut self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(map: &FieldMap) -> String {
        let mut buf = BytesMut::new();
        map.encode_into(&mut buf, &[]);
        String::from_utf8(buf.to_vec()).unwrap().replace('\x01', "|")
    }

    #[test]
    fn test_set_and_get() {
        let mut map = FieldMap::new();
        map.set_field(49, "SENDER");
        map.set_uint(34, 42);
        map.set_bool(43, true);
        map.set_char(54, '1');

        assert_eq!(map.get_str(49).unwrap(), "SENDER");
        assert_eq!(map.get_u64(34).unwrap(), 42);
        assert!(map.get_bool(43).unwrap());
        assert_eq!(map.get_char(54).unwrap(), '1');
        assert!(matches!(
            map.get_str(999),
            Err(ParseError::FieldNotFound { tag: 999 })
        ));
    }

    #[test]
    fn test_set_field_overwrites() {
        let mut map = FieldMap::new();
        map.set_field(58, "first");
        map.set_field(58, "second");
        assert_eq!(map.get_str(58).unwrap(), "second");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_set_if_absent() {
        let mut map = FieldMap::new();
        assert!(map.set_if_absent(108, "30"));
        assert!(!map.set_if_absent(108, "60"));
        assert_eq!(map.get_str(108).unwrap(), "30");
    }

    #[test]
    fn test_bad_values() {
        let mut map = FieldMap::new();
        map.set_field(34, "abc");
        map.set_field(43, "X");
        assert!(matches!(
            map.get_u64(34),
            Err(ParseError::InvalidFieldValue { tag: 34, .. })
        ));
        assert!(map.get_bool(43).is_err());
    }

    #[test]
    fn test_insertion_order_serialization() {
        let mut map = FieldMap::new();
        map.set_field(58, "text");
        map.set_field(11, "ORD1");
        assert_eq!(encode(&map), "58=text|11=ORD1|");
    }

    #[test]
    fn test_forced_order_serialization() {
        let mut map = FieldMap::with_order(vec![8, 9, 35]);
        map.set_field(49, "S");
        map.set_field(35, "A");
        map.set_field(8, "FIX.4.4");
        assert_eq!(encode(&map), "8=FIX.4.4|35=A|49=S|");
    }

    #[test]
    fn test_groups_one_based() {
        let mut map = FieldMap::new();

        let mut g1 = Group::new(384, 372);
        g1.set_field(372, "D");
        let mut g2 = Group::new(384, 372);
        g2.set_field(372, "8");
        map.add_group(g1);
        map.add_group(g2);

        assert_eq!(map.group_count(384), 2);
        assert_eq!(map.get_u64(384).unwrap(), 2);
        assert_eq!(map.group(1, 384).unwrap().get_str(372).unwrap(), "D");
        assert_eq!(map.group(2, 384).unwrap().get_str(372).unwrap(), "8");
        assert!(matches!(
            map.group(0, 384),
            Err(ParseError::FieldNotFound { tag: 384 })
        ));
        assert!(matches!(
            map.group(3, 384),
            Err(ParseError::FieldNotFound { tag: 384 })
        ));
    }

    #[test]
    fn test_remove_group_updates_count() {
        let mut map = FieldMap::new();
        for value in ["D", "8", "F"] {
            let mut g = Group::new(384, 372);
            g.set_field(372, value);
            map.add_group(g);
        }

        let removed = map.remove_group(2, 384).unwrap();
        assert_eq!(removed.get_str(372).unwrap(), "8");
        assert_eq!(map.group_count(384), 2);
        assert_eq!(map.get_u64(384).unwrap(), 2);
        // remaining instances keep their relative order
        assert_eq!(map.group(1, 384).unwrap().get_str(372).unwrap(), "D");
        assert_eq!(map.group(2, 384).unwrap().get_str(372).unwrap(), "F");

        map.remove_group(1, 384).unwrap();
        map.remove_group(1, 384).unwrap();
        assert!(!map.contains(384));
        assert!(matches!(
            map.remove_group(1, 384),
            Err(ParseError::FieldNotFound { tag: 384 })
        ));
    }

    #[test]
    fn test_group_serialization_delimiter_first() {
        let mut map = FieldMap::new();
        map.set_field(58, "before");

        let mut g = Group::with_order(453, vec![448, 447, 452]);
        g.set_field(452, "3");
        g.set_field(448, "BROKER");
        g.set_field(447, "D");
        map.add_group(g);

        assert_eq!(encode(&map), "58=before|453=1|448=BROKER|447=D|452=3|");
    }

    #[test]
    fn test_timestamp_field() {
        let ts = UtcTimestamp::from_ymd_hms(2026, 1, 27, 9, 30, 0).unwrap();
        let mut map = FieldMap::new();
        map.set_timestamp(52, ts, TimestampPrecision::Seconds);
        assert_eq!(map.get_str(52).unwrap(), "20260127-09:30:00");
        assert_eq!(map.get_timestamp(52).unwrap(), ts);
    }
}
