use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Generation of mock flow records
pub mod generator;
pub use generator::{FlowGenerator, SPIKE_RECORDS};

pub const VERSION: u16 = 5;
pub const HEADER_LEN: usize = 24;
pub const RECORD_LEN: usize = 48;
/// A v5 datagram carries at most 30 records
pub const MAX_RECORDS: usize = 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("a datagram needs at least one record")]
    Empty,
    #[error("{0} records do not fit in one datagram (max 30)")]
    TooManyRecords(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
}

/// Services whose traffic can be generated, and spiked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Ftp,
    Ssh,
    Dns,
    Http,
    Https,
    Ntp,
    Snmp,
    Imaps,
    Mysql,
    HttpsAlt,
    P2p,
    Bittorrent,
    Icmp,
}

impl Protocol {
    pub const ALL: [Protocol; 13] = [
        Protocol::Ftp,
        Protocol::Ssh,
        Protocol::Dns,
        Protocol::Http,
        Protocol::Https,
        Protocol::Ntp,
        Protocol::Snmp,
        Protocol::Imaps,
        Protocol::Mysql,
        Protocol::HttpsAlt,
        Protocol::P2p,
        Protocol::Bittorrent,
        Protocol::Icmp,
    ];

    pub fn transport(&self) -> Transport {
        match self {
            Protocol::Ftp
            | Protocol::Ssh
            | Protocol::Http
            | Protocol::Https
            | Protocol::Imaps
            | Protocol::Mysql
            | Protocol::HttpsAlt => Transport::Tcp,
            Protocol::Dns
            | Protocol::Ntp
            | Protocol::Snmp
            | Protocol::P2p
            | Protocol::Bittorrent => Transport::Udp,
            Protocol::Icmp => Transport::Icmp,
        }
    }

    /// Server port of the service (0 for ICMP)
    pub fn port(&self) -> u16 {
        match self {
            Protocol::Ftp => 21,
            Protocol::Ssh => 22,
            Protocol::Dns => 53,
            Protocol::Http => 80,
            Protocol::Https => 443,
            Protocol::Ntp => 123,
            Protocol::Snmp => 161,
            Protocol::Imaps => 993,
            Protocol::Mysql => 3306,
            Protocol::HttpsAlt => 8080,
            Protocol::P2p => 6681,
            Protocol::Bittorrent => 6682,
            Protocol::Icmp => 0,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Protocol::Ftp => "ftp",
            Protocol::Ssh => "ssh",
            Protocol::Dns => "dns",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Ntp => "ntp",
            Protocol::Snmp => "snmp",
            Protocol::Imaps => "imaps",
            Protocol::Mysql => "mysql",
            Protocol::HttpsAlt => "https_alt",
            Protocol::P2p => "p2p",
            Protocol::Bittorrent => "bittorrent",
            Protocol::Icmp => "icmp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Protocol, String> {
        let lower = s.to_lowercase().replace('-', "_");
        Protocol::ALL
            .into_iter()
            .find(|p| p.name() == lower)
            .ok_or_else(|| format!("unknown protocol \"{s}\""))
    }
}

impl<'de> serde::Deserialize<'de> for Protocol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Datagram header, in the order of the wire format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub count: u16,
    pub sys_uptime: u32,
    pub unix_secs: u32,
    pub unix_nsecs: u32,
    pub flow_sequence: u32,
    pub engine_type: u8,
    pub engine_id: u8,
    pub sampling_interval: u16,
}

impl Header {
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.count.to_be_bytes());
        buf.extend_from_slice(&self.sys_uptime.to_be_bytes());
        buf.extend_from_slice(&self.unix_secs.to_be_bytes());
        buf.extend_from_slice(&self.unix_nsecs.to_be_bytes());
        buf.extend_from_slice(&self.flow_sequence.to_be_bytes());
        buf.push(self.engine_type);
        buf.push(self.engine_id);
        buf.extend_from_slice(&self.sampling_interval.to_be_bytes());
    }

    /// Read the header at the start of a datagram
    pub fn parse(data: &[u8]) -> Option<Header> {
        if data.len() < HEADER_LEN {
            return None;
        }
        let u16_at = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
        let u32_at = |i: usize| u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Some(Header {
            version: u16_at(0),
            count: u16_at(2),
            sys_uptime: u32_at(4),
            unix_secs: u32_at(8),
            unix_nsecs: u32_at(12),
            flow_sequence: u32_at(16),
            engine_type: data[20],
            engine_id: data[21],
            sampling_interval: u16_at(22),
        })
    }
}

/// One flow record, in the order of the wire format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub input: u16,
    pub output: u16,
    pub packets: u32,
    pub octets: u32,
    /// sys_uptime at the first packet, in ms
    pub first: u32,
    /// sys_uptime at the last packet, in ms
    pub last: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub tcp_flags: u8,
    pub protocol: u8,
    pub tos: u8,
    pub src_as: u16,
    pub dst_as: u16,
    pub src_mask: u8,
    pub dst_mask: u8,
}

impl FlowRecord {
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.src_addr.octets());
        buf.extend_from_slice(&self.dst_addr.octets());
        buf.extend_from_slice(&self.next_hop.octets());
        buf.extend_from_slice(&self.input.to_be_bytes());
        buf.extend_from_slice(&self.output.to_be_bytes());
        buf.extend_from_slice(&self.packets.to_be_bytes());
        buf.extend_from_slice(&self.octets.to_be_bytes());
        buf.extend_from_slice(&self.first.to_be_bytes());
        buf.extend_from_slice(&self.last.to_be_bytes());
        buf.extend_from_slice(&self.src_port.to_be_bytes());
        buf.extend_from_slice(&self.dst_port.to_be_bytes());
        buf.push(0); // pad1
        buf.push(self.tcp_flags);
        buf.push(self.protocol);
        buf.push(self.tos);
        buf.extend_from_slice(&self.src_as.to_be_bytes());
        buf.extend_from_slice(&self.dst_as.to_be_bytes());
        buf.push(self.src_mask);
        buf.push(self.dst_mask);
        buf.extend_from_slice(&[0, 0]); // pad2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_names() {
        for p in Protocol::ALL {
            assert_eq!(p.to_string().parse::<Protocol>(), Ok(p));
        }
        assert_eq!("HTTPS-ALT".parse::<Protocol>(), Ok(Protocol::HttpsAlt));
        assert!("gopher".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_protocol_ports() {
        assert_eq!(Protocol::Dns.port(), 53);
        assert_eq!(Protocol::Dns.transport(), Transport::Udp);
        assert_eq!(Protocol::Mysql.port(), 3306);
        assert_eq!(Protocol::Mysql.transport(), Transport::Tcp);
        assert_eq!(Protocol::Bittorrent.port(), 6682);
    }

    #[test]
    fn test_record_layout() {
        let record = FlowRecord {
            src_addr: Ipv4Addr::new(10, 0, 0, 1),
            dst_addr: Ipv4Addr::new(10, 0, 0, 2),
            next_hop: Ipv4Addr::UNSPECIFIED,
            input: 1,
            output: 2,
            packets: 3,
            octets: 300,
            first: 10,
            last: 20,
            src_port: 40000,
            dst_port: 443,
            tcp_flags: 0x1b,
            protocol: Transport::Tcp as u8,
            tos: 0,
            src_as: 0,
            dst_as: 0,
            src_mask: 8,
            dst_mask: 8,
        };
        let mut buf = vec![];
        record.write_to(&mut buf);
        assert_eq!(buf.len(), RECORD_LEN);
        assert_eq!(&buf[0..4], &[10, 0, 0, 1]);
        assert_eq!(&buf[32..34], &40000u16.to_be_bytes());
        assert_eq!(&buf[34..36], &443u16.to_be_bytes());
        assert_eq!(buf[37], 0x1b);
        assert_eq!(buf[38], 6);
    }

    #[test]
    fn test_header_layout() {
        let header = Header {
            version: VERSION,
            count: 2,
            sys_uptime: 1000,
            unix_secs: 1_700_000_000,
            unix_nsecs: 42,
            flow_sequence: 7,
            engine_type: 1,
            engine_id: 2,
            sampling_interval: 0,
        };
        let mut buf = vec![];
        header.write_to(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(&buf[0..2], &[0, 5]);
        assert_eq!(Header::parse(&buf), Some(header));
        assert_eq!(Header::parse(&buf[..10]), None);
    }
}
