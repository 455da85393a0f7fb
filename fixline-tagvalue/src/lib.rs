/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Tag-Value
//!
//! Wire-format parsing for the fixline FIX session engine.
//!
//! This crate turns complete tag=value frames into structured
//! [`Message`](fixline_core::Message)s: header/body/trailer distribution
//! and repeating-group structure come from the dictionary, BodyLength and
//! CheckSum are re-verified on request. Framing (finding message
//! boundaries in a byte stream) lives in `fixline-transport`.

pub mod parser;

pub use fixline_core::checksum::{SOH, checksum, format_checksum, parse_checksum};
pub use parser::MessageParser;
