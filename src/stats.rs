use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Counters shared by the workers of a pool.
///
/// Every field only ever grows while the pool is running, so a reader always
/// observes a non-decreasing sequence of values.
pub struct Stats {
    pub start_time: Instant,
    sent_packets: AtomicU64,
    failed_packets: AtomicU64,
    degraded_workers: AtomicUsize,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            start_time: Instant::now(),
            sent_packets: AtomicU64::new(0),
            failed_packets: AtomicU64::new(0),
            degraded_workers: AtomicUsize::new(0),
        }
    }
}

impl Stats {
    pub fn packet_sent(&self) {
        self.sent_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_failed(&self) {
        self.failed_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_degraded(&self) {
        self.degraded_workers.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative number of tasks that reported success
    pub fn sent(&self) -> u64 {
        self.sent_packets.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed_packets.load(Ordering::Relaxed)
    }

    /// Number of workers that could not reach the collector
    pub fn degraded(&self) -> usize {
        self.degraded_workers.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(Stats::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.packet_sent();
                    }
                })
            })
            .collect();
        let mut last = 0;
        while handles.iter().any(|h| !h.is_finished()) {
            let current = stats.sent();
            assert!(current >= last);
            last = current;
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.sent(), 4000);
        assert_eq!(stats.failed(), 0);
    }
}
