//! ARP host tracking engine
//!
//! Tracks the hosts on one segment, notices when they come and go, and can
//! force a host off its address by impersonating it.

mod actions;
mod handler;
mod host_table;
mod hunt;
mod ingest;
mod notify;
mod polling;
mod tasks;

pub use handler::Engine;
pub use host_table::{Entry, EntryState, HostTable};
pub use tasks::{TaskGroup, TaskHandle};
