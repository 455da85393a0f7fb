/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Engine
//!
//! Supervision layer for the fixline FIX session engine.
//!
//! This crate provides:
//! - **SessionRegistry**: explicit `SessionId -> Session` map shared by
//!   the supervisors (no process-global state)
//! - **Initiator**: reconnect loop dialing registered sessions
//! - **Acceptor**: listener routing inbound connections to sessions by
//!   their reversed CompIDs

pub mod acceptor;
pub mod initiator;
pub mod registry;

pub use acceptor::Acceptor;
pub use initiator::Initiator;
pub use registry::{SessionRegistry, spawn_ticker};
