//! Worker group: pulls deliveries from the broker and feeds the pipeline.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::pipeline::ConsumerPipeline;
use crate::ports::Broker;

/// Handle over a set of consumer workers.
/// - `request_shutdown()` stops taking new deliveries; in-flight work
///   (including a drain in progress) finishes on its own, nothing is
///   forcibly cancelled. Deliveries still queued in the broker are left
///   for redelivery.
/// - `join()` waits for the workers to exit without signalling them; use
///   after closing the broker to drain everything already published.
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers over one broker subscription.
    pub fn spawn(n: usize, broker: Arc<dyn Broker>, pipeline: Arc<ConsumerPipeline>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let broker = Arc::clone(&broker);
            let pipeline = Arc::clone(&pipeline);
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, broker, pipeline, &mut rx).await;
            }));
        }

        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn join(self) {
        for join in self.joins {
            let _ = join.await;
        }
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.join().await;
    }
}

async fn worker_loop(
    worker_id: usize,
    broker: Arc<dyn Broker>,
    pipeline: Arc<ConsumerPipeline>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // next() may wait, so race it against shutdown.
        let raw = tokio::select! {
            _ = shutdown_rx.changed() => continue,
            raw = broker.next() => raw,
        };

        let Some(raw) = raw else {
            break; // broker closed
        };

        let disposition = pipeline.on_message(&raw).await;
        tracing::debug!(worker_id, ?disposition, "delivery handled");
    }
}
