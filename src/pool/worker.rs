use super::Task;
use crate::net::Connector;
use crate::stats::Stats;

use crossbeam_channel::{select, Receiver, RecvTimeoutError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The connection of a worker, decided once at startup
pub(super) enum WorkerState<T> {
    Healthy(T),
    /// The collector could not be reached: every task fails immediately
    Degraded,
}

pub(super) struct Worker<C: Connector> {
    pub id: usize,
    pub connector: C,
    pub connect_retries: u32,
    pub retry_delay: Duration,
    pub rx_tasks: Receiver<Task<C::Conn>>,
    pub rx_shutdown: Receiver<()>,
    pub shutdown: Arc<AtomicBool>,
    pub stats: Arc<Stats>,
}

impl<C: Connector> Worker<C> {
    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Try to open the connection a bounded number of times
    fn connect(&self) -> WorkerState<C::Conn> {
        let attempts = self.connect_retries.max(1);
        for attempt in 1..=attempts {
            match self.connector.connect() {
                Ok(conn) => return WorkerState::Healthy(conn),
                Err(e) => {
                    log::warn!(
                        "Worker {}: failed to connect to the collector ({e}), attempt {attempt}/{attempts}",
                        self.id
                    );
                }
            }
            if attempt < attempts {
                // the pause ends early if the pool is stopped
                match self.rx_shutdown.recv_timeout(self.retry_delay) {
                    Err(RecvTimeoutError::Timeout) => (),
                    _ => {
                        log::debug!(
                            "Worker {}: stopped before it could connect to the collector",
                            self.id
                        );
                        return WorkerState::Degraded;
                    }
                }
            }
        }
        log::error!(
            "Worker {}: cannot connect to the collector, its packets will be dropped",
            self.id
        );
        self.stats.worker_degraded();
        WorkerState::Degraded
    }

    fn execute(&self, state: &WorkerState<C::Conn>, task: &Task<C::Conn>) {
        let result = match state {
            WorkerState::Healthy(conn) => task(conn),
            WorkerState::Degraded => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no connection to the collector",
            )),
        };
        match result {
            Ok(()) => self.stats.packet_sent(),
            Err(e) => {
                log::trace!("Worker {}: task failed: {e}", self.id);
                self.stats.packet_failed();
            }
        }
    }

    pub fn run(self) {
        let state = self.connect();
        log::info!("Worker {} launched, start to process tasks", self.id);
        loop {
            if self.is_shutting_down() {
                break;
            }
            select! {
                recv(self.rx_tasks) -> task => match task {
                    Ok(task) => self.execute(&state, &task),
                    // the queue is closed: nothing will ever come
                    Err(_) => break,
                },
                recv(self.rx_shutdown) -> _ => break,
            }
        }
        // tasks still waiting in the queue are executed, without ever blocking
        while let Ok(task) = self.rx_tasks.try_recv() {
            self.execute(&state, &task);
        }
        log::debug!("Worker {} stops", self.id);
    }
}
