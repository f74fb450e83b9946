#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod asynch;
pub mod command;
pub mod config;
pub mod error;
pub mod ingress;
mod module_timing;
pub mod mqtt;
pub mod registration;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use asynch::control::{Control, Pending};
pub use asynch::resources::Resources;
pub use asynch::runner::Runner;
pub use asynch::sleep::{MemoryStore, PersistOptions, SnapshotStore};
pub use asynch::new;
pub use command::{Command, CommandKind, Reply, ReplyMatcher};
pub use error::Error;

pub type ModemResult = Result<Reply, Error>;
