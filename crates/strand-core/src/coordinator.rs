//! KeyCoordinator: distributed per-key mutex + FIFO wait queue.
//!
//! All shared mutable state lives in the KvStore, never in process memory:
//! - `{ns}:occupied`   set of keys currently checked out by some consumer
//! - `{ns}:wait:{key}` FIFO list of serialized envelopes waiting on `key`
//!
//! Invariants:
//! - I1: at most one envelope per key is in flight across all consumers.
//! - I2: same-key envelopes start in the order they were enqueued.
//! - I3: occupancy is TTL-bounded; a crashed holder's key frees itself.
//!
//! acquire-or-enqueue is a two-step protocol, not one linearizable step: a
//! release can land between a failed `try_acquire` and the `enqueue`, in
//! which case the queued envelope waits for the *next* release of that key
//! instead of running immediately. Accepted latency cost; progress stays
//! eventual because normal consumer traffic re-acquires the key (see the
//! race_window test).

use std::sync::Arc;
use std::time::Duration;

use crate::domain::StrandKey;
use crate::error::StrandError;
use crate::ports::KvStore;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Prefix for every store key this coordinator touches.
    pub namespace: String,

    /// TTL re-armed on the bookkeeping records at each acquire/enqueue.
    /// Bounds how long a crashed or hung holder keeps a key occupied.
    /// Known limitation: crash, TTL expiry, then a late completion can
    /// briefly give two holders; see the ttl tests.
    pub occupancy_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            namespace: "strand".to_string(),
            occupancy_ttl: Duration::from_secs(300),
        }
    }
}

pub struct KeyCoordinator {
    store: Arc<dyn KvStore>,
    config: CoordinatorConfig,
}

impl KeyCoordinator {
    pub fn new(store: Arc<dyn KvStore>, config: CoordinatorConfig) -> Self {
        Self { store, config }
    }

    fn occupied_set(&self) -> String {
        format!("{}:occupied", self.config.namespace)
    }

    fn wait_queue(&self, key: &StrandKey) -> String {
        format!("{}:wait:{}", self.config.namespace, key)
    }

    async fn rearm_ttl(&self, record: &str) {
        if let Err(error) = self.store.expire(record, self.config.occupancy_ttl).await {
            tracing::warn!(record, error = %error, "failed to re-arm ttl");
        }
    }

    /// True iff this call took ownership of `key`.
    ///
    /// Store failures read as "not acquired": the caller enqueues (or the
    /// broker redelivers), but we never optimistically double-run a key.
    pub async fn try_acquire(&self, key: &StrandKey) -> bool {
        let set = self.occupied_set();
        match self.store.set_add(&set, key.as_str()).await {
            Ok(added) => {
                self.rearm_ttl(&set).await;
                added
            }
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "try_acquire degraded to not-acquired");
                false
            }
        }
    }

    /// Append behind the current holder of `key`. Only meaningful after a
    /// failed `try_acquire`. Refreshes the queue TTL so a long backlog does
    /// not expire mid-wait.
    pub async fn enqueue(&self, key: &StrandKey, raw: Vec<u8>) -> Result<(), StrandError> {
        let queue = self.wait_queue(key);
        self.store.list_push_back(&queue, raw).await?;
        self.store.expire(&queue, self.config.occupancy_ttl).await?;
        Ok(())
    }

    /// Pop the next waiting envelope for `key`, or free the key.
    ///
    /// `Some(raw)`: ownership transfers to whoever runs the returned
    /// envelope; the key stays occupied. `None`: the wait queue was empty
    /// and the key has been released.
    ///
    /// A store failure degrades to force-clearing occupancy so the key can
    /// never stay stuck forever, at the cost of dropping not-yet-started
    /// queued work (logged, never silently swallowed).
    pub async fn release(&self, key: &StrandKey) -> Option<Vec<u8>> {
        let queue = self.wait_queue(key);
        match self.store.list_pop_front(&queue).await {
            Ok(Some(raw)) => {
                self.rearm_ttl(&queue).await;
                self.rearm_ttl(&self.occupied_set()).await;
                Some(raw)
            }
            Ok(None) => {
                if let Err(error) = self.store.set_remove(&self.occupied_set(), key.as_str()).await
                {
                    tracing::error!(key = %key, error = %error, "release failed; force-clearing key");
                    self.force_release(key).await;
                }
                None
            }
            Err(error) => {
                tracing::error!(
                    key = %key,
                    error = %error,
                    "release failed; force-clearing key, queued work may be lost",
                );
                self.force_release(key).await;
                None
            }
        }
    }

    pub async fn is_occupied(&self, key: &StrandKey) -> bool {
        match self
            .store
            .set_contains(&self.occupied_set(), key.as_str())
            .await
        {
            Ok(occupied) => occupied,
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "is_occupied check failed");
                false
            }
        }
    }

    pub async fn queue_size(&self, key: &StrandKey) -> usize {
        match self.store.list_len(&self.wait_queue(key)).await {
            Ok(len) => len,
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "queue_size check failed");
                0
            }
        }
    }

    /// Operator escape hatch for stuck keys: clears occupancy and drops the
    /// whole wait queue. Breaks FIFO if run concurrently with a normal
    /// drain, which is why it is manual-only.
    pub async fn force_release(&self, key: &StrandKey) {
        if let Err(error) = self.store.delete(&self.wait_queue(key)).await {
            tracing::error!(key = %key, error = %error, "force_release could not drop wait queue");
        }
        if let Err(error) = self.store.set_remove(&self.occupied_set(), key.as_str()).await {
            tracing::error!(key = %key, error = %error, "force_release could not clear occupancy");
        }
        tracing::warn!(key = %key, "force-released key");
    }

    /// Diagnostic surface for operators.
    pub async fn occupied_keys(&self) -> Vec<String> {
        match self.store.set_members(&self.occupied_set()).await {
            Ok(keys) => keys,
            Err(error) => {
                tracing::warn!(error = %error, "occupied_keys listing failed");
                Vec::new()
            }
        }
    }
}
