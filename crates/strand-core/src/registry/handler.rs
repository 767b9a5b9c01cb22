//! Handler trait and type erasure.
//!
//! A `Handler<T>` is composed with its task type at registration time; the
//! before/after/error hooks replace inheritance-based customization. Type
//! erasure chain: `TypedHandler<T, H>` -> `dyn DynHandler` (stored in the
//! registry) -> `dyn BoundTask` (one decoded, runnable task).

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use super::task::Task;
use crate::domain::TaskEnvelope;
use crate::error::StrandError;

/// Executes tasks of one concrete type.
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    /// The task body. Under at-least-once delivery this may run more than
    /// once for the same task id; make it idempotent.
    async fn process(&self, task: &T) -> Result<(), StrandError>;

    /// Runs after status moves to Processing, before the body. Default: no-op.
    async fn before_process(&self, _envelope: &TaskEnvelope) {}

    /// Runs after the body succeeds. Default: no-op.
    async fn after_process(&self, _envelope: &TaskEnvelope) {}

    /// Runs when the body fails. Default: structured log. Override for
    /// retry or dead-letter forwarding.
    async fn handle_error(&self, envelope: &TaskEnvelope, error: &StrandError) {
        tracing::error!(
            task_id = %envelope.task_id(),
            key = envelope.key().map(|k| k.as_str()),
            error = %error,
            "task failed",
        );
    }
}

/// Object-safe registry entry: decodes a payload into a runnable task.
pub trait DynHandler: Send + Sync {
    fn task_type(&self) -> &'static str;

    /// Decode `payload` into the concrete task type, bound to its handler.
    /// A payload that does not decode is a `MalformedEnvelope`.
    fn bind(&self, payload: &serde_json::Value) -> Result<Box<dyn BoundTask>, StrandError>;
}

/// A fully decoded task, ready to run, carrying its handler's hooks.
#[async_trait]
pub trait BoundTask: Send + Sync {
    async fn before(&self, envelope: &TaskEnvelope);
    async fn run(&self) -> Result<(), StrandError>;
    async fn after(&self, envelope: &TaskEnvelope);
    async fn on_error(&self, envelope: &TaskEnvelope, error: &StrandError);
}

impl std::fmt::Debug for dyn BoundTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundTask").finish_non_exhaustive()
    }
}

/// Pairs a handler with its task type for storage behind `dyn DynHandler`.
pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: Arc<H>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            _marker: PhantomData,
        }
    }
}

impl<T: Task, H: Handler<T> + 'static> DynHandler for TypedHandler<T, H> {
    fn task_type(&self) -> &'static str {
        T::TYPE
    }

    fn bind(&self, payload: &serde_json::Value) -> Result<Box<dyn BoundTask>, StrandError> {
        let task: T = serde_json::from_value(payload.clone()).map_err(|e| {
            StrandError::MalformedEnvelope(format!("payload for {}: {e}", T::TYPE))
        })?;
        Ok(Box::new(Bound {
            task,
            handler: Arc::clone(&self.handler),
        }))
    }
}

struct Bound<T: Task, H: Handler<T>> {
    task: T,
    handler: Arc<H>,
}

#[async_trait]
impl<T: Task, H: Handler<T> + 'static> BoundTask for Bound<T, H> {
    async fn before(&self, envelope: &TaskEnvelope) {
        self.handler.before_process(envelope).await;
    }

    async fn run(&self) -> Result<(), StrandError> {
        self.handler.process(&self.task).await
    }

    async fn after(&self, envelope: &TaskEnvelope) {
        self.handler.after_process(envelope).await;
    }

    async fn on_error(&self, envelope: &TaskEnvelope, error: &StrandError) {
        self.handler.handle_error(envelope, error).await;
    }
}
