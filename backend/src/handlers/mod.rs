//! HTTP handlers for the butchery point-of-sale API

pub mod auth;
pub mod catalog;
pub mod health;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod payment;
pub mod table;
pub mod transfer;

pub use auth::*;
pub use catalog::*;
pub use health::*;
pub use inventory::*;
pub use notification::*;
pub use order::*;
pub use payment::*;
pub use table::*;
pub use transfer::*;
