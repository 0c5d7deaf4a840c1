//! Event-processing core of the reservation lifecycle worker.
//!
//! A poller long-polls the queue and feeds a bounded channel; a pool of N
//! workers drains the channel and hands each event to the dispatcher, which
//! routes to the matching handler under a bounded exponential-backoff retry
//! loop. A message is deleted from the queue only on terminal success;
//! anything else is abandoned and redelivers after its visibility window.

pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod metrics;
pub mod poller;
pub mod pool;
pub mod retry;
pub mod shutdown;

pub use config::WorkerConfig;
pub use dispatch::Dispatcher;
pub use handlers::Handlers;
pub use poller::Poller;
pub use pool::WorkerPool;
pub use retry::RetryPolicy;
pub use shutdown::Shutdown;
