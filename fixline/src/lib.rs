/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline
//!
//! A FIX session-layer protocol engine for Rust.
//!
//! Fixline implements the complete FIX session semantics for versions
//! 4.0 through 4.4 and FIXT.1.1: sequence-number management, the
//! logon/logout handshake, heartbeats and test requests, gap detection
//! and resend, duplicate handling, and session-time scheduling, together
//! with the framing and message model that drive the state machine.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixline::prelude::*;
//! use std::sync::Arc;
//!
//! let id = SessionId::new(
//!     FixVersion::Fix44,
//!     CompId::new("BUYSIDE").unwrap(),
//!     CompId::new("SELLSIDE").unwrap(),
//! );
//! let config = SessionConfig::new(id, ConnectionType::Initiator)
//!     .with_heart_bt_int(30)
//!     .with_connect_addr("fix.example.com", 9876);
//!
//! let registry = Arc::new(SessionRegistry::new());
//! let session = Session::new(
//!     config,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(NoOpApplication),
//!     Arc::new(SystemClock),
//! )?;
//! # let _ = session;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: message model, identity types, errors, clock
//! - [`dictionary`]: message dictionaries and validation
//! - [`tagvalue`]: wire parsing
//! - [`store`]: message persistence interfaces
//! - [`session`]: the session protocol state machine
//! - [`transport`]: framing codec and TCP plumbing
//! - [`engine`]: registry and initiator/acceptor supervisors

pub mod core {
    //! Message model, identity types, errors and clock.
    pub use fixline_core::*;
}

pub mod dictionary {
    //! Message dictionaries and validation.
    pub use fixline_dictionary::*;
}

pub mod tagvalue {
    //! Wire parsing.
    pub use fixline_tagvalue::*;
}

pub mod store {
    //! Message persistence interfaces.
    pub use fixline_store::*;
}

pub mod session {
    //! The session protocol state machine.
    pub use fixline_session::*;
}

pub mod transport {
    //! Framing codec and TCP plumbing.
    pub use fixline_transport::*;
}

pub mod engine {
    //! Registry and initiator/acceptor supervisors.
    pub use fixline_engine::*;
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use fixline_core::{
        Clock, CompId, ConfigError, FieldMap, FixError, FixVersion, Group, ManualClock, Message,
        MsgType, ParseError, RejectReason, Result, SessionError, SessionId, StoreError,
        SystemClock, TimestampPrecision, UtcTimestamp, ValidationError, tags,
    };

    pub use fixline_dictionary::{Dictionary, FieldDef, FieldType, MessageDef, Validator};

    pub use fixline_tagvalue::MessageParser;

    pub use fixline_store::{MemoryStore, MessageStore};

    pub use fixline_session::{
        Application, CallbackError, ConnectionType, DoNotSend, NoOpApplication, Responder,
        Session, SessionConfig, SessionHandle, SessionSchedule, VecResponder,
    };

    pub use fixline_transport::{FramedEvent, Framer, scan_message};

    pub use fixline_engine::{Acceptor, Initiator, SessionRegistry};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let id = SessionId::new(
            FixVersion::Fix44,
            CompId::new("A").unwrap(),
            CompId::new("B").unwrap(),
        );
        let config = SessionConfig::new(id, ConnectionType::Acceptor);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_version_reexport() {
        assert_eq!(FixVersion::Fix42.begin_string(), "FIX.4.2");
    }
}
