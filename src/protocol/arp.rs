//! ARP (Address Resolution Protocol) - RFC 826, carried in Ethernet II frames

use super::{EtherType, MacAddr};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ARP payload size (for Ethernet/IPv4)
pub const ARP_PACKET_SIZE: usize = 28;

/// Ethernet II header size
pub const ETHERNET_HEADER_SIZE: usize = 14;

/// Minimum Ethernet frame size without FCS; shorter frames are zero padded.
pub const MIN_FRAME_SIZE: usize = 60;

const HTYPE_ETHERNET: u16 = 1;

/// ARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// ARP packet (Ethernet/IPv4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Parse an ARP payload (the bytes after the Ethernet header)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ARP_PACKET_SIZE {
            return Err(Error::Parse("ARP packet too short".into()));
        }

        let htype = u16::from_be_bytes([buffer[0], buffer[1]]);
        if htype != HTYPE_ETHERNET {
            return Err(Error::Parse("unsupported hardware type".into()));
        }

        let ptype = u16::from_be_bytes([buffer[2], buffer[3]]);
        if ptype != EtherType::Ipv4 as u16 {
            return Err(Error::Parse("unsupported protocol type".into()));
        }

        if buffer[4] != 6 || buffer[5] != 4 {
            return Err(Error::Parse("invalid address length".into()));
        }

        let operation = ArpOp::from_u16(u16::from_be_bytes([buffer[6], buffer[7]]))
            .ok_or_else(|| Error::Parse("invalid ARP operation".into()))?;

        Ok(Self {
            operation,
            sender_mac: mac_at(buffer, 8),
            sender_ip: ip_at(buffer, 14),
            target_mac: mac_at(buffer, 18),
            target_ip: ip_at(buffer, 24),
        })
    }

    /// Serialize the ARP payload
    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut buf = [0u8; ARP_PACKET_SIZE];

        buf[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&(EtherType::Ipv4 as u16).to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        buf[6..8].copy_from_slice(&(self.operation as u16).to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());

        buf
    }

    /// Create an ARP request ("who has `target_ip`, tell `sender_ip`")
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    /// Create an ARP reply ("`sender_ip` is at `sender_mac`")
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ArpOp::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Create a gratuitous request announcing the `mac`/`ip` binding
    pub fn gratuitous(mac: MacAddr, ip: Ipv4Addr) -> Self {
        Self::request(mac, ip, ip)
    }

    /// Address Conflict Detection probe: a request with no sender address yet
    pub fn is_probe(&self) -> bool {
        self.operation == ArpOp::Request && self.sender_ip.is_unspecified()
    }

    /// Gratuitous ARP / ACD announcement: sender and target IP are equal
    pub fn is_announcement(&self) -> bool {
        !self.sender_ip.is_unspecified() && self.sender_ip == self.target_ip
    }

    /// Either address sits in 169.254.0.0/16
    pub fn is_link_local(&self) -> bool {
        self.sender_ip.is_link_local() || self.target_ip.is_link_local()
    }
}

/// ARP packet with its Ethernet addressing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpFrame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub packet: ArpPacket,
}

impl ArpFrame {
    /// Frame sent from the packet's sender hardware address to `dst`
    pub fn new(dst: MacAddr, packet: ArpPacket) -> Self {
        Self {
            dst,
            src: packet.sender_mac,
            packet,
        }
    }

    pub fn broadcast(packet: ArpPacket) -> Self {
        Self::new(MacAddr::BROADCAST, packet)
    }

    /// Parse an Ethernet frame; fails if it does not carry ARP
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ETHERNET_HEADER_SIZE + ARP_PACKET_SIZE {
            return Err(Error::InvalidPacket("frame too short for ARP".into()));
        }

        let ethertype = u16::from_be_bytes([buffer[12], buffer[13]]);
        if ethertype != EtherType::Arp as u16 {
            return Err(Error::InvalidPacket(format!(
                "unexpected ethertype 0x{:04x}",
                ethertype
            )));
        }

        Ok(Self {
            dst: mac_at(buffer, 0),
            src: mac_at(buffer, 6),
            packet: ArpPacket::parse(&buffer[ETHERNET_HEADER_SIZE..])?,
        })
    }

    /// Serialize to a padded Ethernet frame
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MIN_FRAME_SIZE);
        buf.extend_from_slice(&self.dst.0);
        buf.extend_from_slice(&self.src.0);
        buf.extend_from_slice(&(EtherType::Arp as u16).to_be_bytes());
        buf.extend_from_slice(&self.packet.to_bytes());
        buf.resize(MIN_FRAME_SIZE, 0);
        buf
    }
}

fn mac_at(buffer: &[u8], offset: usize) -> MacAddr {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buffer[offset..offset + 6]);
    MacAddr(mac)
}

fn ip_at(buffer: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    )
}
