use crate::net::Connector;
use crate::stats::Stats;

use crossbeam_channel::{bounded, Receiver, Sender};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

mod worker;
use worker::Worker;

/// A unit of work executed by a worker against its own connection.
///
/// A task must complete quickly: there is no way to interrupt a task once a
/// worker started it.
pub type Task<T> = Arc<dyn Fn(&T) -> io::Result<()> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("a pool needs at least one worker")]
    NoWorkers,
    #[error("the pool is already started")]
    AlreadyStarted,
    #[error("the pool is stopped")]
    Stopped,
    #[error("cannot spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Parameters fixed at pool construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Desired number of workers, clamped to the available parallelism
    pub workers: usize,
    /// Capacity of the task queue
    pub buffer_size: usize,
    /// Number of connection attempts of each worker
    pub connect_retries: u32,
    /// Pause between two connection attempts
    pub retry_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            workers: 5,
            buffer_size: 10,
            connect_retries: 5,
            retry_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Number of processing units of the host
pub fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A fixed set of workers sharing a bounded task queue
pub struct WorkerPool<C: Connector> {
    connector: C,
    config: PoolConfig,
    worker_count: usize,
    state: Lifecycle,

    tx_tasks: Option<Sender<Task<C::Conn>>>,
    rx_tasks: Receiver<Task<C::Conn>>,
    // dropping the sender wakes up every worker waiting for a task
    tx_shutdown: Option<Sender<()>>,
    rx_shutdown: Receiver<()>,
    shutdown: Arc<AtomicBool>,

    stats: Arc<Stats>,
    workers: Vec<JoinHandle<()>>,
}

impl<C: Connector> WorkerPool<C> {
    pub fn new(connector: C, config: PoolConfig) -> Result<Self, PoolError> {
        if config.workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        let available = available_parallelism();
        let worker_count = config.workers.min(available);
        if worker_count < config.workers {
            log::debug!(
                "{} workers requested but only {available} processing units available",
                config.workers
            );
        }
        let (tx_tasks, rx_tasks) = bounded(config.buffer_size);
        let (tx_shutdown, rx_shutdown) = bounded(0);
        Ok(WorkerPool {
            connector,
            config,
            worker_count,
            state: Lifecycle::Created,
            tx_tasks: Some(tx_tasks),
            rx_tasks,
            tx_shutdown: Some(tx_shutdown),
            rx_shutdown,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Stats::default()),
            workers: Vec::with_capacity(worker_count),
        })
    }

    /// Spawn the workers. Returns without waiting for their connections.
    pub fn start(&mut self) -> Result<(), PoolError> {
        match self.state {
            Lifecycle::Running => return Err(PoolError::AlreadyStarted),
            Lifecycle::Stopped => return Err(PoolError::Stopped),
            Lifecycle::Created => (),
        }
        self.state = Lifecycle::Running;
        for id in 0..self.worker_count {
            let worker = Worker {
                id,
                connector: self.connector.clone(),
                connect_retries: self.config.connect_retries,
                retry_delay: self.config.retry_delay,
                rx_tasks: self.rx_tasks.clone(),
                rx_shutdown: self.rx_shutdown.clone(),
                shutdown: Arc::clone(&self.shutdown),
                stats: Arc::clone(&self.stats),
            };
            let builder = thread::Builder::new().name(format!("Worker-{id}"));
            match builder.spawn(move || worker.run()) {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    // do not leave the already spawned workers behind
                    self.stop();
                    return Err(PoolError::Spawn(e));
                }
            }
        }
        log::info!("{} workers launched", self.worker_count);
        Ok(())
    }

    /// Enqueue one task, blocking while the queue is full
    pub fn add_task(&self, task: Task<C::Conn>) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::Stopped);
        }
        let tx = self.tx_tasks.as_ref().ok_or(PoolError::Stopped)?;
        tx.send(task).map_err(|_| PoolError::Stopped)
    }

    /// Enqueue the same task `n` times.
    ///
    /// The batch is not atomic: its tasks can interleave with those of other
    /// producers and workers may start consuming it before it is fully queued.
    pub fn add_multiple_task(&self, task: Task<C::Conn>, n: usize) -> Result<(), PoolError> {
        for _ in 0..n {
            self.add_task(Arc::clone(&task))?;
        }
        Ok(())
    }

    /// Cumulative number of successful tasks
    pub fn success_count(&self) -> u64 {
        self.stats.sent()
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    /// Number of tasks waiting in the queue
    pub fn pending(&self) -> usize {
        self.rx_tasks.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.state == Lifecycle::Stopped
    }

    /// Stop the pool and wait for every worker to exit.
    ///
    /// Tasks already in the queue when the workers notice the shutdown are
    /// still executed; nothing can be added afterward. The queue is closed
    /// once the last worker has returned. Calling it again does nothing.
    pub fn stop(&mut self) {
        if self.state == Lifecycle::Stopped {
            return;
        }
        self.state = Lifecycle::Stopped;
        self.shutdown.store(true, Ordering::Release);
        drop(self.tx_shutdown.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("A worker panicked");
            }
        }
        drop(self.tx_tasks.take());
        log::debug!("All workers stopped");
    }
}

impl<C: Connector> Drop for WorkerPool<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Clone)]
    struct LoopbackConnector;

    impl Connector for LoopbackConnector {
        type Conn = ();
        fn connect(&self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct CountingConnector {
        attempts: Arc<AtomicUsize>,
    }

    impl Connector for CountingConnector {
        type Conn = ();
        fn connect(&self) -> io::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "unreachable"))
        }
    }

    fn config(workers: usize, buffer_size: usize) -> PoolConfig {
        PoolConfig {
            workers,
            buffer_size,
            connect_retries: 5,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_worker_count_clamped() {
        let available = available_parallelism();
        for n in 1..=available {
            let pool = WorkerPool::new(LoopbackConnector, config(n, 1)).unwrap();
            assert_eq!(pool.worker_count(), n);
        }
        let pool = WorkerPool::new(LoopbackConnector, config(available + 3, 1)).unwrap();
        assert_eq!(pool.worker_count(), available);
    }

    #[test]
    fn test_no_worker() {
        assert!(matches!(
            WorkerPool::new(LoopbackConnector, config(0, 1)),
            Err(PoolError::NoWorkers)
        ));
    }

    #[test]
    fn test_start_twice() {
        let mut pool = WorkerPool::new(LoopbackConnector, config(1, 1)).unwrap();
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(PoolError::AlreadyStarted)));
        pool.stop();
        assert!(matches!(pool.start(), Err(PoolError::Stopped)));
    }

    #[test]
    fn test_add_after_stop() {
        let mut pool = WorkerPool::new(LoopbackConnector, config(1, 4)).unwrap();
        pool.start().unwrap();
        pool.stop();
        let task: Task<()> = Arc::new(|_| Ok(()));
        assert!(matches!(pool.add_task(task), Err(PoolError::Stopped)));
        // stopping again is harmless
        pool.stop();
        assert!(pool.is_stopped());
    }

    #[test]
    fn test_every_attempt_is_used() {
        let connector = CountingConnector::default();
        let attempts = Arc::clone(&connector.attempts);
        let mut pool = WorkerPool::new(connector, config(1, 4)).unwrap();
        pool.start().unwrap();
        let task: Task<()> = Arc::new(|_| Ok(()));
        pool.add_multiple_task(task, 3).unwrap();
        // let the worker exhaust its attempts before stopping it
        while pool.stats().degraded() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        pool.stop();
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        assert_eq!(pool.success_count(), 0);
        assert_eq!(pool.stats().failed(), 3);
        assert_eq!(pool.stats().degraded(), 1);
    }

    #[test]
    fn test_attempts_are_spaced() {
        let connector = CountingConnector::default();
        let attempts = Arc::clone(&connector.attempts);
        let config = PoolConfig {
            retry_delay: Duration::from_millis(20),
            ..config(1, 4)
        };
        let mut pool = WorkerPool::new(connector, config).unwrap();
        let started = Instant::now();
        pool.start().unwrap();
        while pool.stats().degraded() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        // 5 attempts, 4 pauses between them
        assert!(started.elapsed() >= Duration::from_millis(80));
        pool.stop();
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_stop_during_retry_pause() {
        let connector = CountingConnector::default();
        let attempts = Arc::clone(&connector.attempts);
        let config = PoolConfig {
            retry_delay: Duration::from_secs(5),
            ..config(1, 4)
        };
        let mut pool = WorkerPool::new(connector, config).unwrap();
        pool.start().unwrap();
        while attempts.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        let stopping = Instant::now();
        pool.stop();
        assert!(stopping.elapsed() < Duration::from_secs(5));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        // the worker did not use up its attempts
        assert_eq!(pool.stats().degraded(), 0);
    }

    #[test]
    fn test_worker_exits_on_closed_queue() {
        let (tx_tasks, rx_tasks) = bounded::<Task<()>>(1);
        let (_tx_shutdown, rx_shutdown) = bounded(0);
        drop(tx_tasks);
        let stats = Arc::new(Stats::default());
        let worker = Worker {
            id: 0,
            connector: LoopbackConnector,
            connect_retries: 1,
            retry_delay: Duration::from_millis(1),
            rx_tasks,
            rx_shutdown,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Arc::clone(&stats),
        };
        thread::spawn(move || worker.run()).join().unwrap();
        assert_eq!(stats.sent(), 0);
        assert_eq!(stats.failed(), 0);
    }

    #[test]
    fn test_stop_before_start() {
        let mut pool = WorkerPool::new(LoopbackConnector, config(2, 4)).unwrap();
        let task: Task<()> = Arc::new(|_| Ok(()));
        pool.add_task(task).unwrap();
        assert_eq!(pool.pending(), 1);
        pool.stop();
        assert_eq!(pool.success_count(), 0);
    }
}
