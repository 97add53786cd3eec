//! arpsentry - ARP host tracking engine
//!
//! Watches ARP traffic on one IPv4 segment, keeps a table of the hosts seen
//! there and reports when they come online, change address or go silent.
//! A host can also be hunted: the engine claims its address until the host
//! picks another one.

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use engine::{Engine, Entry, EntryState};
pub use error::{Error, Result};
