//! In-memory Broker for development and tests.
//!
//! One shared FIFO for all partitions: with a single publisher, delivery
//! order trivially matches publish order per partition key, which satisfies
//! the upstream guarantee the coordinator relies on. This is a dev
//! transport, not a real broker.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::StrandError;
use crate::ports::Broker;

pub struct InMemoryBroker {
    queue: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    closed: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Stop delivery. Consumers drain what is already queued, then get None.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, _partition_key: Option<&str>, raw: Vec<u8>) -> Result<(), StrandError> {
        // Single shared FIFO: publish order is delivery order for every
        // partition key, so the key needs no routing here.
        self.queue.lock().unwrap().push_back(raw);
        self.notify.notify_one();
        Ok(())
    }

    async fn next(&self) -> Option<Vec<u8>> {
        loop {
            if let Some(raw) = self.queue.lock().unwrap().pop_front() {
                return Some(raw);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }
}
