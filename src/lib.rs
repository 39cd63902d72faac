//! Library for mock NetFlow v5 traffic generation toward a flow collector.
//! The datagrams are sent by a pool of workers, each owning its own UDP socket.

/// Generator settings
pub mod config;
/// Connections to the collector
pub mod net;
/// NetFlow v5 records and datagrams
pub mod netflow;
/// Worker pool executing the send tasks
pub mod pool;
/// Periodic submission of tasks and termination handling
pub mod scheduler;
/// Sending statistics
pub mod stats;
/// The send task
pub mod task;

pub use pool::{PoolConfig, PoolError, Task, WorkerPool};
pub use stats::Stats;
