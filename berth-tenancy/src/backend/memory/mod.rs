//! In-memory backend for testing and development.
//!
//! Models the same contract as the PostgreSQL backend, including a real
//! fixed-size connection pool whose connections carry an active namespace,
//! so pool-hygiene properties can be exercised without a server.

mod pool;
mod storage;

pub use pool::{MemoryConnection, MemoryPool};
pub use storage::MemoryBackend;
