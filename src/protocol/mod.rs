//! Link-layer types and the ARP wire format

pub mod arp;
pub mod types;

pub use arp::{ArpFrame, ArpOp, ArpPacket};
pub use types::*;
