/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Transport
//!
//! Network transport for the fixline FIX session engine.
//!
//! This crate provides:
//! - **Framer**: incremental codec splitting a byte stream into verified
//!   FIX frames, with resynchronization after garbled input
//! - **Connection plumbing**: reader/writer tasks binding a TCP stream to
//!   a session through its responder capability

pub mod codec;
pub mod tcp;

pub use codec::{CodecError, FramedEvent, Framer, scan_message};
pub use tcp::{ChannelResponder, run_connection, run_connection_buffered};
