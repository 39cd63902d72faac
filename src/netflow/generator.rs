use super::*;

use rand_core::RngCore;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Number of records of a spike datagram
pub const SPIKE_RECORDS: usize = 16;

/// Generates mock flow records and wraps them into datagrams.
///
/// A single generator is shared by all the workers: the flow sequence number
/// it puts in the headers is global.
#[derive(Debug)]
pub struct FlowGenerator {
    start: Instant,
    flow_sequence: AtomicU32,
    false_index: bool,
}

#[derive(Debug, Clone, Copy)]
enum Volume {
    Regular,
    Spike,
}

pub(crate) fn random_in(rng: &mut impl RngCore, min: u32, max: u32) -> u32 {
    min + rng.next_u32() % (max - min)
}

impl FlowGenerator {
    /// When `false_index` is set, SNMP interface indexes are 1 or 2 depending on
    /// the addresses, otherwise they are 0.
    pub fn new(false_index: bool) -> Self {
        FlowGenerator {
            start: Instant::now(),
            flow_sequence: AtomicU32::new(0),
            false_index,
        }
    }

    /// Milliseconds since the generator was created
    pub fn sys_uptime(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    /// Total number of records put in datagrams so far
    pub fn flow_sequence(&self) -> u32 {
        self.flow_sequence.load(Ordering::Relaxed)
    }

    fn interfaces(&self, src: Ipv4Addr, dst: Ipv4Addr) -> (u16, u16) {
        if !self.false_index {
            (0, 0)
        } else if src > dst {
            (1, 2)
        } else {
            (2, 1)
        }
    }

    fn record(&self, rng: &mut impl RngCore, proto: Protocol, volume: Volume) -> FlowRecord {
        // clients in 172.16.0.0/12, servers in 192.168.0.0/16
        let client = rng.next_u32() & 0x000f_ffff;
        let src_addr = Ipv4Addr::from(0xac10_0000 | client);
        let server = rng.next_u32() & 0x0000_ffff;
        let dst_addr = Ipv4Addr::from(0xc0a8_0000 | server);
        let (input, output) = self.interfaces(src_addr, dst_addr);

        let packets = match volume {
            Volume::Regular => random_in(rng, 1, 100),
            Volume::Spike => random_in(rng, 1000, 10_000),
        };
        let mean_size = match proto.transport() {
            Transport::Icmp => 84,
            _ => random_in(rng, 64, 1500),
        };
        let last = self.sys_uptime();
        let first = last.saturating_sub(random_in(rng, 1, 10_000));
        let (src_port, dst_port, tcp_flags) = match proto.transport() {
            Transport::Tcp => (random_in(rng, 32768, 61000) as u16, proto.port(), 0x1b),
            Transport::Udp => (random_in(rng, 32768, 61000) as u16, proto.port(), 0),
            // ICMP echo request, encoded as type * 256 + code
            Transport::Icmp => (0, 8 << 8, 0),
        };

        FlowRecord {
            src_addr,
            dst_addr,
            next_hop: Ipv4Addr::UNSPECIFIED,
            input,
            output,
            packets,
            octets: packets.saturating_mul(mean_size),
            first,
            last,
            src_port,
            dst_port,
            tcp_flags,
            protocol: proto.transport() as u8,
            tos: 0,
            src_as: 0,
            dst_as: 0,
            src_mask: 12,
            dst_mask: 16,
        }
    }

    /// Generate `count` records of the regular traffic mix
    pub fn generate(&self, rng: &mut impl RngCore, count: usize) -> Vec<FlowRecord> {
        let offset = rng.next_u32() as usize;
        (0..count)
            .map(|i| {
                let proto = Protocol::ALL[offset.wrapping_add(i) % Protocol::ALL.len()];
                self.record(rng, proto, Volume::Regular)
            })
            .collect()
    }

    /// Generate a burst of heavy records of a single protocol
    pub fn generate_spike(&self, rng: &mut impl RngCore, proto: Protocol) -> Vec<FlowRecord> {
        (0..SPIKE_RECORDS)
            .map(|_| self.record(rng, proto, Volume::Spike))
            .collect()
    }

    /// Serialize a header followed by the records
    pub fn build_payload(&self, records: &[FlowRecord]) -> Result<Vec<u8>, PayloadError> {
        if records.is_empty() {
            return Err(PayloadError::Empty);
        }
        if records.len() > MAX_RECORDS {
            return Err(PayloadError::TooManyRecords(records.len()));
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let header = Header {
            version: VERSION,
            count: records.len() as u16,
            sys_uptime: self.sys_uptime(),
            unix_secs: now.as_secs() as u32,
            unix_nsecs: now.subsec_nanos(),
            flow_sequence: self
                .flow_sequence
                .fetch_add(records.len() as u32, Ordering::Relaxed),
            engine_type: 1,
            engine_id: 0,
            sampling_interval: 0,
        };
        let mut buf = Vec::with_capacity(HEADER_LEN + records.len() * RECORD_LEN);
        header.write_to(&mut buf);
        for r in records {
            r.write_to(&mut buf);
        }
        Ok(buf)
    }
}
