/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Core
//!
//! Core types, message model and error definitions for the fixline FIX
//! session engine.
//!
//! This crate provides the building blocks shared by all fixline crates:
//! - **Error types**: unified hierarchy with `thiserror`, split into
//!   recoverable and protocol-fatal outcomes
//! - **Core types**: `FixVersion`, `CompId`, `SessionId`, `UtcTimestamp`
//! - **Message model**: insertion-ordered `FieldMap` with repeating
//!   groups, and the header/body/trailer `Message`
//! - **Clock**: injectable time source so session timers are testable

pub mod checksum;
pub mod clock;
pub mod error;
pub mod field_map;
pub mod message;
pub mod tags;
pub mod types;

pub use checksum::{SOH, checksum, format_checksum, parse_checksum};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{
    ConfigError, FixError, ParseError, RejectReason, Result, SessionError, StoreError,
    ValidationError,
};
pub use field_map::{FieldMap, Group};
pub use message::Message;
pub use tags::MsgType;
pub use types::{CompId, FixVersion, SessionId, TimestampPrecision, UtcTimestamp};
