/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Session
//!
//! The FIX session-layer protocol state machine.
//!
//! This crate provides:
//! - **Session engine**: logon/logout handshake, heartbeats and test
//!   requests, gap detection and resend, duplicate handling
//! - **Configuration**: every session setting with protocol defaults
//! - **Schedule**: daily/weekly session windows and new-session detection
//! - **State**: per-session flags, timers, queue and resend range
//! - **Application trait**: the callback surface into user code
//! - **Responder trait**: the outbound channel capability the transport
//!   implements

pub mod application;
pub mod config;
pub mod responder;
pub mod schedule;
pub mod session;
pub mod state;

pub use application::{Application, CallbackError, DoNotSend, NoOpApplication};
pub use config::{ConnectionType, SessionConfig};
pub use responder::{Responder, VecResponder};
pub use schedule::SessionSchedule;
pub use session::{Session, SessionHandle, into_handle};
pub use state::{ConnectionState, ResendRange, SessionState};
