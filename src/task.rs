use crate::netflow::generator::random_in;
use crate::netflow::{FlowGenerator, FlowRecord, Protocol};
use crate::pool::Task;

use rand_core::SeedableRng;
use rand_pcg::Pcg32;
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Anything a datagram can be written to
pub trait DatagramSink {
    fn send_datagram(&self, buf: &[u8]) -> io::Result<usize>;
}

impl DatagramSink for UdpSocket {
    fn send_datagram(&self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }
}

/// The body of the send tasks: builds mock datagrams and writes them
#[derive(Debug)]
pub struct PacketSender {
    generator: FlowGenerator,
    spike: Option<Protocol>,
    seed: u64,
    // every execution uses its own random stream
    executions: AtomicU64,
}

impl PacketSender {
    pub fn new(generator: FlowGenerator, spike: Option<Protocol>, seed: u64) -> Self {
        PacketSender {
            generator,
            spike,
            seed,
            executions: AtomicU64::new(0),
        }
    }

    pub fn generator(&self) -> &FlowGenerator {
        &self.generator
    }

    fn write(&self, sink: &impl DatagramSink, records: &[FlowRecord]) -> io::Result<()> {
        let payload = self
            .generator
            .build_payload(records)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        sink.send_datagram(&payload)?;
        Ok(())
    }

    /// Send one datagram of regular traffic, preceded by a spike datagram if a
    /// spike protocol is set. Fails if and only if a write fails.
    pub fn send(&self, sink: &impl DatagramSink) -> io::Result<()> {
        let execution = self.executions.fetch_add(1, Ordering::Relaxed);
        let mut rng = Pcg32::seed_from_u64(self.seed.wrapping_add(execution));
        if let Some(proto) = self.spike {
            let spike = self.generator.generate_spike(&mut rng, proto);
            self.write(sink, &spike)?;
        }
        let count = if random_in(&mut rng, 50, 1000) > 900 { 8 } else { 16 };
        let records = self.generator.generate(&mut rng, count);
        self.write(sink, &records)
    }

    /// Wrap the sender into a task that can be queued in a pool
    pub fn into_task<S: DatagramSink + 'static>(self: Arc<Self>) -> Task<S> {
        Arc::new(move |sink: &S| self.send(sink))
    }
}
