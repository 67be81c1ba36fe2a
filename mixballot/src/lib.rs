#[macro_use]
extern crate serde;

mod actor;
mod ballot;
mod ballot_box;
mod ciphertext;
mod config;
mod configuration;
mod election;
mod error;
mod handler;
mod mix;
mod network;
mod serde_hex;
mod store;
mod transaction;

pub use actor::*;
pub use ballot::*;
pub use ballot_box::*;
pub use ciphertext::*;
pub use config::*;
pub use configuration::*;
pub use election::*;
pub use error::*;
pub use handler::*;
pub use mix::*;
pub use network::*;
pub use serde_hex::*;
pub use store::*;
pub use transaction::*;
