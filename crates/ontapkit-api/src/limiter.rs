// Per-endpoint concurrency limiting.
//
// One limiter exists per connection profile. Clients built for the same
// profile share it by cloning; nothing here is process-global.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::Error;

/// Bounds the number of in-flight requests against one remote endpoint.
///
/// Cheaply cloneable; clones share the same permit pool. A limit of `0`
/// means unlimited and never suspends the caller.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
    limit: usize,
}

/// RAII slot held for the duration of one request. Dropping it releases the
/// slot, so every exit path (including unwinding) gives the permit back.
#[derive(Debug)]
pub struct RequestSlot {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent_requests: usize) -> Self {
        let semaphore = (max_concurrent_requests > 0)
            .then(|| Arc::new(Semaphore::new(max_concurrent_requests)));
        Self {
            semaphore,
            limit: max_concurrent_requests,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Configured limit (`0` = unlimited).
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Free slots right now, or `None` when unlimited.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Wait for a free slot. Returns [`Error::Cancelled`] if `cancel` fires
    /// first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<RequestSlot, Error> {
        let Some(ref semaphore) = self.semaphore else {
            return Ok(RequestSlot { _permit: None });
        };

        trace!(available = semaphore.available_permits(), "acquiring request slot");

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            permit = Arc::clone(semaphore).acquire_owned() => {
                // The semaphore is never closed, so acquisition only fails
                // if that invariant is broken.
                let permit = permit.map_err(|_| Error::Cancelled)?;
                Ok(RequestSlot { _permit: Some(permit) })
            }
        }
    }
}
