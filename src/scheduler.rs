use crate::net::Connector;
use crate::pool::{PoolError, Task, WorkerPool};

use crossbeam_channel::{after, bounded, never, select, tick, Receiver};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a generation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Successful sends over the whole run
    pub sent: u64,
    pub failed: u64,
    pub ticks: u64,
}

/// Feeds a pool with a fixed number of tasks per tick until it is told to stop
pub struct Scheduler<C: Connector> {
    pool: WorkerPool<C>,
    task: Task<C::Conn>,
    num_per_tick: usize,
    interval: Duration,
    duration: Option<Duration>,
}

impl<C: Connector> Scheduler<C> {
    pub fn new(pool: WorkerPool<C>, task: Task<C::Conn>, num_per_sec: usize) -> Self {
        Scheduler {
            pool,
            task,
            num_per_tick: num_per_sec,
            interval: Duration::from_secs(1),
            duration: None,
        }
    }

    /// Change the tick period (one second by default)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop on its own after that duration
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Start the pool and submit a batch on every tick. Returns once a message
    /// arrives on `rx_stop` (or it is disconnected) or the duration is over,
    /// after the pool has been stopped.
    pub fn run(mut self, rx_stop: Receiver<()>) -> Result<Report, PoolError> {
        self.pool.start()?;
        let ticker = tick(self.interval);
        let deadline = match self.duration {
            Some(d) => after(d),
            None => never(),
        };
        let mut count = 0;
        let mut ticks = 0;
        loop {
            select! {
                recv(rx_stop) -> _ => {
                    log::info!("Received terminating signal, stopping workers...");
                    break;
                },
                recv(deadline) -> _ => {
                    log::info!("Generation duration reached, stopping workers...");
                    break;
                },
                recv(ticker) -> _ => {
                    self.pool.add_multiple_task(Arc::clone(&self.task), self.num_per_tick)?;
                    ticks += 1;
                    let new_count = self.pool.success_count();
                    log::info!(
                        "Running {} workers, {} packets sent in the last {}",
                        self.pool.worker_count(),
                        new_count - count,
                        humantime::format_duration(self.interval)
                    );
                    count = new_count;
                },
            }
        }
        self.pool.stop();
        let stats = self.pool.stats();
        let report = Report {
            sent: stats.sent(),
            failed: stats.failed(),
            ticks,
        };
        let elapsed = stats.start_time.elapsed().as_secs_f64();
        log::info!(
            "All workers stopped, {} packets sent successfully ({:.1} packets/s)",
            report.sent,
            if elapsed > 0. { report.sent as f64 / elapsed } else { 0. }
        );
        if report.failed > 0 {
            log::warn!("{} packets could not be sent", report.failed);
        }
        Ok(report)
    }
}

/// Route SIGINT and SIGTERM to a channel. A second signal aborts the process.
pub fn termination_channel() -> Result<Receiver<()>, ctrlc::Error> {
    let (tx, rx) = bounded(1);
    let stopping = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if !stopping.swap(true, Ordering::Relaxed) {
            log::warn!("Ending the generation, please wait a few seconds");
            let _ = tx.try_send(());
        } else {
            log::warn!("Ending immediately");
            process::abort();
        }
    })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use std::io;
    use std::thread;

    #[derive(Clone)]
    struct NullConnector;

    impl Connector for NullConnector {
        type Conn = ();
        fn connect(&self) -> io::Result<()> {
            Ok(())
        }
    }

    fn pool() -> WorkerPool<NullConnector> {
        let config = PoolConfig {
            workers: 2,
            buffer_size: 20,
            connect_retries: 1,
            retry_delay: Duration::from_millis(1),
        };
        WorkerPool::new(NullConnector, config).unwrap()
    }

    #[test]
    fn test_stop_signal() {
        let task: Task<()> = Arc::new(|_| Ok(()));
        let scheduler = Scheduler::new(pool(), task, 5).with_interval(Duration::from_millis(10));
        let (tx, rx) = bounded(1);
        let handle = thread::spawn(move || scheduler.run(rx));
        thread::sleep(Duration::from_millis(100));
        tx.send(()).unwrap();
        let report = handle.join().unwrap().unwrap();
        assert!(report.ticks > 0);
        // every submitted batch is drained before the pool stops
        assert_eq!(report.sent, report.ticks * 5);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_duration_limit() {
        let task: Task<()> = Arc::new(|_| Err(io::Error::other("unreachable collector")));
        let scheduler = Scheduler::new(pool(), task, 3)
            .with_interval(Duration::from_millis(10))
            .with_duration(Some(Duration::from_millis(50)));
        let (_tx, rx) = bounded(1);
        let report = scheduler.run(rx).unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, report.ticks * 3);
    }
}
