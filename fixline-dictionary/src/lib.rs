/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Dictionary
//!
//! Message dictionaries and validation for the fixline FIX session engine.
//!
//! This crate provides:
//! - **Schema definitions**: field, message and repeating-group layouts
//! - **Built-in session dictionaries**: the administrative message set for
//!   FIX 4.0 through 4.4 and FIXT.1.1, constructed in code
//! - **Validator**: dictionary validation producing `SessionRejectReason`
//!   codes, with transport/application composition for FIXT.1.1

pub mod schema;
pub mod validator;

pub use schema::{Dictionary, FieldDef, FieldRef, FieldType, GroupDef, MessageDef};
pub use validator::Validator;
