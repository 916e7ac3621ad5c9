#[macro_use]
extern crate serde;

mod admin;
mod election;
mod error;
mod ledger;
mod otp;
mod registration;
mod serde_hex;
mod session;
mod store;
mod util;
mod vote;

pub use admin::*;
pub use election::*;
pub use error::*;
pub use ledger::*;
pub use otp::*;
pub use registration::*;
pub use serde_hex::*;
pub use session::*;
pub use store::*;
pub use util::*;
pub use vote::*;

#[cfg(test)]
mod tests;
