//! Subscription guard for unsubscribe on drop.
//!
//! A history transfer subscribes to the history-data characteristic before it
//! writes its first command and must unsubscribe on every exit path. The
//! engine releases the guard explicitly once it reaches a terminal state; if
//! the transfer future is dropped instead, the guard schedules the
//! unsubscribe on the current runtime.
//!
//! A guard can also carry the session's [`LinkLease`]. The lease is handed
//! back by [`SubscriptionGuard::release`], and on drop it is only let go once
//! the scheduled unsubscribe has finished, so the next queued operation never
//! overlaps the cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::Transport;

/// Exclusive use of a session's link for one operation.
pub type LinkLease = OwnedMutexGuard<()>;

/// Keeps a notification subscription open until released or dropped.
pub struct SubscriptionGuard<T: Transport + 'static> {
    transport: Arc<T>,
    characteristic: Uuid,
    timeout: Duration,
    lease: Option<LinkLease>,
    armed: bool,
}

impl<T: Transport + 'static> SubscriptionGuard<T> {
    /// Guard an already established subscription.
    pub fn new(transport: Arc<T>, characteristic: Uuid, timeout: Duration) -> Self {
        Self {
            transport,
            characteristic,
            timeout,
            lease: None,
            armed: true,
        }
    }

    /// Keep `lease` until the subscription is gone.
    #[must_use]
    pub fn holding(mut self, lease: Option<LinkLease>) -> Self {
        self.lease = lease;
        self
    }

    /// Unsubscribe now and hand back the lease. Failures are logged and not
    /// returned, so a cleanup error never replaces the outcome of the
    /// transfer.
    pub async fn release(mut self) -> Option<LinkLease> {
        self.armed = false;
        unsubscribe(self.transport.as_ref(), self.characteristic, self.timeout).await;
        self.lease.take()
    }
}

async fn unsubscribe<T: Transport>(transport: &T, characteristic: Uuid, timeout: Duration) {
    match tokio::time::timeout(timeout, transport.unsubscribe(characteristic)).await {
        Ok(Ok(())) => debug!(%characteristic, "Unsubscribed"),
        Ok(Err(e)) => warn!(
            %characteristic,
            error = %e,
            "Unsubscribe failed during cleanup"
        ),
        Err(_) => warn!(
            %characteristic,
            ?timeout,
            "Unsubscribe timed out during cleanup"
        ),
    }
}

impl<T: Transport + 'static> Drop for SubscriptionGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let transport = Arc::clone(&self.transport);
        let characteristic = self.characteristic;
        let timeout = self.timeout;
        let lease = self.lease.take();
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                unsubscribe(transport.as_ref(), characteristic, timeout).await;
                drop(lease);
            });
        } else {
            warn!("No tokio runtime available for unsubscribe in guard drop");
        }
    }
}
