//! Ticket and customer boundary types.
//!
//! Tickets and customers are owned by the shop's CRUD surfaces. The billing
//! core only reads them (and creates tickets on estimate conversion), so this
//! crate holds plain data plus the few derivations the core relies on.

pub mod customer;
pub mod ticket;

pub use customer::{Customer, digits_only};
pub use ticket::{DeviceInfo, NewTicket, Ticket};
