/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Core types for the FIX session layer.
//!
//! This module provides:
//! - [`FixVersion`]: the BeginString protocol version
//! - [`CompId`]: bounded component identifier (SenderCompID, TargetCompID)
//! - [`SessionId`]: the immutable session identity tuple and routing key
//! - [`UtcTimestamp`] / [`TimestampPrecision`]: FIX UTC timestamp handling

use crate::error::{ConfigError, ParseError};
use arrayvec::ArrayString;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length for CompID strings in bytes.
pub const COMP_ID_MAX_LEN: usize = 32;

/// FIX protocol version carried in BeginString (tag 8).
///
/// Variant order is protocol order, so `Fix42 <= version` reads as
/// "FIX 4.2 or newer".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum FixVersion {
    /// FIX 4.0
    Fix40,
    /// FIX 4.1
    Fix41,
    /// FIX 4.2
    Fix42,
    /// FIX 4.3
    Fix43,
    /// FIX 4.4
    #[default]
    Fix44,
    /// FIXT 1.1 transport (application version chosen by DefaultApplVerID)
    Fixt11,
}

impl FixVersion {
    /// Returns the BeginString value for this version.
    #[must_use]
    pub const fn begin_string(self) -> &'static str {
        match self {
            Self::Fix40 => "FIX.4.0",
            Self::Fix41 => "FIX.4.1",
            Self::Fix42 => "FIX.4.2",
            Self::Fix43 => "FIX.4.3",
            Self::Fix44 => "FIX.4.4",
            Self::Fixt11 => "FIXT.1.1",
        }
    }

    /// Returns true if this version uses the FIXT transport layer.
    #[must_use]
    pub const fn is_fixt(self) -> bool {
        matches!(self, Self::Fixt11)
    }

    /// Returns true if SendingTime may carry sub-second precision.
    ///
    /// FIX 4.0 and 4.1 are limited to whole seconds.
    #[must_use]
    pub const fn supports_subsecond(self) -> bool {
        !matches!(self, Self::Fix40 | Self::Fix41)
    }

    /// Returns the EndSeqNo value meaning "all messages after BeginSeqNo".
    ///
    /// FIX 4.2 introduced `0`; 4.0 and 4.1 use the sentinel `999999`.
    #[must_use]
    pub const fn infinite_end_seq_no(self) -> u64 {
        match self {
            Self::Fix40 | Self::Fix41 => 999_999,
            _ => 0,
        }
    }
}

impl FromStr for FixVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIX.4.0" => Ok(Self::Fix40),
            "FIX.4.1" => Ok(Self::Fix41),
            "FIX.4.2" => Ok(Self::Fix42),
            "FIX.4.3" => Ok(Self::Fix43),
            "FIX.4.4" => Ok(Self::Fix44),
            "FIXT.1.1" => Ok(Self::Fixt11),
            other => Err(ConfigError::InvalidSetting {
                name: "BeginString",
                reason: format!("unknown version '{other}'"),
            }),
        }
    }
}

impl fmt::Display for FixVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.begin_string())
    }
}

/// Component identifier for SenderCompID (49), TargetCompID (56) and the
/// sub/location variants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct CompId(ArrayString<COMP_ID_MAX_LEN>);

impl CompId {
    /// Creates a new CompId.
    ///
    /// # Returns
    /// `None` if the string is empty or longer than [`COMP_ID_MAX_LEN`].
    #[must_use]
    pub fn new(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        ArrayString::from(s).ok().map(Self)
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for CompId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CompId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CompId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or(ConfigError::InvalidSetting {
            name: "CompID",
            reason: format!("'{s}' is empty or longer than {COMP_ID_MAX_LEN} bytes"),
        })
    }
}

/// Immutable session identity tuple; the process-wide routing key.
///
/// Two counterparties agree on a session by the combination of the FIX
/// version, the sender/target CompID triples, and an optional qualifier
/// distinguishing parallel sessions between the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
    /// FIX version (BeginString).
    pub begin_string: FixVersion,
    /// SenderCompID (49).
    pub sender_comp_id: CompId,
    /// SenderSubID (50).
    pub sender_sub_id: Option<CompId>,
    /// SenderLocationID (142).
    pub sender_location_id: Option<CompId>,
    /// TargetCompID (56).
    pub target_comp_id: CompId,
    /// TargetSubID (57).
    pub target_sub_id: Option<CompId>,
    /// TargetLocationID (143).
    pub target_location_id: Option<CompId>,
    /// Free-form qualifier for parallel sessions.
    pub qualifier: Option<String>,
}

impl SessionId {
    /// Creates a session id from the three mandatory components.
    #[must_use]
    pub fn new(begin_string: FixVersion, sender_comp_id: CompId, target_comp_id: CompId) -> Self {
        Self {
            begin_string,
            sender_comp_id,
            sender_sub_id: None,
            sender_location_id: None,
            target_comp_id,
            target_sub_id: None,
            target_location_id: None,
            qualifier: None,
        }
    }

    /// Sets the sender sub id.
    #[must_use]
    pub fn with_sender_sub_id(mut self, id: CompId) -> Self {
        self.sender_sub_id = Some(id);
        self
    }

    /// Sets the target sub id.
    #[must_use]
    pub fn with_target_sub_id(mut self, id: CompId) -> Self {
        self.target_sub_id = Some(id);
        self
    }

    /// Sets the sender location id.
    #[must_use]
    pub fn with_sender_location_id(mut self, id: CompId) -> Self {
        self.sender_location_id = Some(id);
        self
    }

    /// Sets the target location id.
    #[must_use]
    pub fn with_target_location_id(mut self, id: CompId) -> Self {
        self.target_location_id = Some(id);
        self
    }

    /// Sets the qualifier.
    #[must_use]
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Returns the id with sender and target triples swapped.
    ///
    /// An acceptor derives the local session id from an incoming message by
    /// reversing the CompIDs on the wire.
    #[must_use]
    pub fn reverse(&self) -> Self {
        Self {
            begin_string: self.begin_string,
            sender_comp_id: self.target_comp_id.clone(),
            sender_sub_id: self.target_sub_id.clone(),
            sender_location_id: self.target_location_id.clone(),
            target_comp_id: self.sender_comp_id.clone(),
            target_sub_id: self.sender_sub_id.clone(),
            target_location_id: self.sender_location_id.clone(),
            qualifier: self.qualifier.clone(),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}",
            self.begin_string, self.sender_comp_id, self.target_comp_id
        )?;
        if let Some(q) = &self.qualifier {
            write!(f, "/{q}")?;
        }
        Ok(())
    }
}

/// Precision of the fractional-seconds part of SendingTime (52) and
/// OrigSendingTime (122).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimestampPrecision {
    /// `YYYYMMDD-HH:MM:SS`
    Seconds,
    /// `YYYYMMDD-HH:MM:SS.sss`
    #[default]
    Millis,
    /// `YYYYMMDD-HH:MM:SS.ssssss`
    Micros,
    /// `YYYYMMDD-HH:MM:SS.sssssssss`
    Nanos,
}

impl TimestampPrecision {
    /// Returns the chrono format string for this precision.
    #[must_use]
    const fn format_str(self) -> &'static str {
        match self {
            Self::Seconds => "%Y%m%d-%H:%M:%S",
            Self::Millis => "%Y%m%d-%H:%M:%S%.3f",
            Self::Micros => "%Y%m%d-%H:%M:%S%.6f",
            Self::Nanos => "%Y%m%d-%H:%M:%S%.9f",
        }
    }
}

/// FIX UTC timestamp (`YYYYMMDD-HH:MM:SS[.fff...]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct UtcTimestamp(DateTime<Utc>);

impl UtcTimestamp {
    /// Creates a timestamp from a chrono UTC datetime.
    #[inline]
    #[must_use]
    pub const fn new(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the current UTC time.
    #[inline]
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Builds a timestamp from a calendar date and time of day.
    ///
    /// Intended for tests; returns `None` for invalid dates.
    #[must_use]
    pub fn from_ymd_hms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(y, mo, d)?;
        let time = NaiveTime::from_hms_opt(h, mi, s)?;
        Some(Self(NaiveDateTime::new(date, time).and_utc()))
    }

    /// Returns the underlying chrono datetime.
    #[inline]
    #[must_use]
    pub const fn datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Formats the timestamp with the given precision.
    #[must_use]
    pub fn format(self, precision: TimestampPrecision) -> String {
        self.0.format(precision.format_str()).to_string()
    }

    /// Parses a FIX UTC timestamp, accepting any of the four fractional
    /// widths (none, milli, micro, nano).
    ///
    /// # Errors
    /// Returns [`ParseError::InvalidFieldValue`] if the string does not
    /// match `YYYYMMDD-HH:MM:SS[.fff[fff[fff]]]`.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let fmt = if s.len() > 17 {
            "%Y%m%d-%H:%M:%S%.f"
        } else {
            "%Y%m%d-%H:%M:%S"
        };
        NaiveDateTime::parse_from_str(s, fmt)
            .map(|dt| Self(dt.and_utc()))
            .map_err(|_| ParseError::InvalidFieldValue {
                tag: crate::tags::SENDING_TIME,
                reason: format!("'{s}' is not a UTC timestamp"),
            })
    }

    /// Returns `self - other` in whole milliseconds (negative when `self`
    /// precedes `other`).
    #[must_use]
    pub fn millis_since(self, other: Self) -> i64 {
        (self.0 - other.0).num_milliseconds()
    }

    /// Returns this timestamp shifted by a millisecond delta.
    #[must_use]
    pub fn plus_millis(self, millis: i64) -> Self {
        Self(self.0 + TimeDelta::milliseconds(millis))
    }
}

impl From<DateTime<Utc>> for UtcTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(TimestampPrecision::Millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_version_strings() {
        assert_eq!(FixVersion::Fix40.begin_string(), "FIX.4.0");
        assert_eq!(FixVersion::Fix44.begin_string(), "FIX.4.4");
        assert_eq!(FixVersion::Fixt11.begin_string(), "FIXT.1.1");
        assert_eq!("FIX.4.2".parse::<FixVersion>().unwrap(), FixVersion::Fix42);
        assert!("FIX.9.9".parse::<FixVersion>().is_err());
    }

    #[test]
    fn test_fix_version_ordering() {
        assert!(FixVersion::Fix40 < FixVersion::Fix42);
        assert!(FixVersion::Fix44 >= FixVersion::Fix42);
    }

    #[test]
    fn test_infinite_end_seq_no() {
        assert_eq!(FixVersion::Fix40.infinite_end_seq_no(), 999_999);
        assert_eq!(FixVersion::Fix41.infinite_end_seq_no(), 999_999);
        assert_eq!(FixVersion::Fix42.infinite_end_seq_no(), 0);
        assert_eq!(FixVersion::Fixt11.infinite_end_seq_no(), 0);
    }

    #[test]
    fn test_subsecond_support() {
        assert!(!FixVersion::Fix40.supports_subsecond());
        assert!(!FixVersion::Fix41.supports_subsecond());
        assert!(FixVersion::Fix42.supports_subsecond());
        assert!(FixVersion::Fixt11.supports_subsecond());
    }

    #[test]
    fn test_comp_id_bounds() {
        assert!(CompId::new("").is_none());
        assert!(CompId::new("BROKER").is_some());
        assert!(CompId::new(&"X".repeat(COMP_ID_MAX_LEN + 1)).is_none());
    }

    #[test]
    fn test_session_id_display_and_reverse() {
        let id = SessionId::new(
            FixVersion::Fix44,
            CompId::new("SENDER").unwrap(),
            CompId::new("TARGET").unwrap(),
        )
        .with_sender_sub_id(CompId::new("DESK").unwrap());

        assert_eq!(id.to_string(), "FIX.4.4:SENDER->TARGET");

        let rev = id.reverse();
        assert_eq!(rev.sender_comp_id.as_str(), "TARGET");
        assert_eq!(rev.target_comp_id.as_str(), "SENDER");
        assert_eq!(rev.target_sub_id.as_ref().unwrap().as_str(), "DESK");
        assert_eq!(rev.reverse(), id);
    }

    #[test]
    fn test_timestamp_format_precisions() {
        let ts = UtcTimestamp::from_ymd_hms(2026, 1, 27, 9, 30, 0).unwrap();
        assert_eq!(
            ts.format(TimestampPrecision::Seconds),
            "20260127-09:30:00"
        );
        assert_eq!(
            ts.format(TimestampPrecision::Millis),
            "20260127-09:30:00.000"
        );
        assert_eq!(
            ts.format(TimestampPrecision::Micros),
            "20260127-09:30:00.000000"
        );
    }

    #[test]
    fn test_timestamp_parse_all_widths() {
        for s in [
            "20260127-09:30:00",
            "20260127-09:30:00.123",
            "20260127-09:30:00.123456",
            "20260127-09:30:00.123456789",
        ] {
            let ts = UtcTimestamp::parse(s).unwrap();
            assert_eq!(ts.datetime().format("%Y%m%d").to_string(), "20260127");
        }
        assert!(UtcTimestamp::parse("not-a-time").is_err());
    }

    #[test]
    fn test_timestamp_millis_since() {
        let a = UtcTimestamp::from_ymd_hms(2026, 1, 27, 9, 30, 0).unwrap();
        let b = a.plus_millis(2_500);
        assert_eq!(b.millis_since(a), 2_500);
        assert_eq!(a.millis_since(b), -2_500);
    }
}
