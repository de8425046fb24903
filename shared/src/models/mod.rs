//! Domain models for the butchery point-of-sale platform

mod inventory;
mod notification;
mod order;
mod order_update;
mod payment;
mod product;
mod stock;
mod table;
mod transfer;
mod unit;
mod user;
mod waiter;

pub use inventory::*;
pub use notification::*;
pub use order::*;
pub use order_update::*;
pub use payment::*;
pub use product::*;
pub use stock::*;
pub use table::*;
pub use transfer::*;
pub use unit::*;
pub use user::*;
pub use waiter::*;
