use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{TenancyError, TenancyResult};

/// A pooled in-memory "connection". The only state that matters for
/// tenancy correctness is which namespace it is currently bound to.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    pub(crate) active_namespace: Option<String>,
}

/// Fixed-size connection pool: a semaphore bounds concurrency, a free
/// list hands out connection slots. Checkout may queue under load,
/// subject to the caller's request-scoped timeout.
pub struct MemoryPool {
    permits: Arc<Semaphore>,
    free: Mutex<VecDeque<usize>>,
    connections: Vec<Arc<Mutex<MemoryConnection>>>,
}

impl MemoryPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            free: Mutex::new((0..size).collect()),
            connections: (0..size)
                .map(|_| Arc::new(Mutex::new(MemoryConnection::default())))
                .collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }

    /// Check a connection out, waiting at most `timeout`.
    pub async fn checkout(&self, timeout: Duration) -> TenancyResult<PooledConn> {
        let permit = tokio::time::timeout(timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| TenancyError::AcquireTimeout)?
            .map_err(|e| TenancyError::storage(e))?;

        let index = self
            .free
            .lock()
            .pop_front()
            .ok_or_else(|| TenancyError::Storage("pool free list exhausted".to_string()))?;

        Ok(PooledConn {
            index,
            conn: self.connections[index].clone(),
            permit: Some(permit),
        })
    }

    /// Return a slot to the free list. The caller must have reset the
    /// connection's namespace first; this is asserted, not repaired.
    pub(crate) fn repool(&self, conn: &PooledConn) {
        debug_assert!(
            conn.conn.lock().active_namespace.is_none(),
            "connection returned to pool still bound to a namespace"
        );
        self.free.lock().push_back(conn.index);
    }
}

/// A checked-out connection slot. Holding it keeps the semaphore permit;
/// dropping it releases the permit, but only `MemoryPool::repool` puts
/// the slot back on the free list.
pub struct PooledConn {
    index: usize,
    pub(crate) conn: Arc<Mutex<MemoryConnection>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledConn {
    pub(crate) fn bind(&self, namespace: &str) {
        self.conn.lock().active_namespace = Some(namespace.to_string());
    }

    pub(crate) fn reset(&self) {
        self.conn.lock().active_namespace = None;
    }

    pub(crate) fn active_namespace(&self) -> Option<String> {
        self.conn.lock().active_namespace.clone()
    }

    pub(crate) fn release_permit(&mut self) {
        self.permit.take();
    }
}
