//! Shared domain types and rules for the butchery point-of-sale platform
//!
//! This crate holds everything that does not touch I/O: the unit conversion
//! graph, stock arithmetic, order status derivation, the waiter edit protocol
//! and the transfer request state machine. It is used by the backend server
//! and by the WASM module that runs on POS terminals.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
