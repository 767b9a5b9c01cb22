//! TaskRegistry: discriminator -> decoder/handler lookup.
//!
//! Design:
//! - An explicit object, built at start-up and injected into the pipeline.
//!   No ambient global table, so tests can build isolated registries.
//! - Open/closed extension point: new task kinds register themselves
//!   without touching dispatch or consumer code.
//! - Read-mostly after warm-up: concurrent lookups through an `RwLock`,
//!   writes are rare and take the coarse write lock.

mod handler;
mod task;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub use handler::{BoundTask, DynHandler, Handler, TypedHandler};
pub use task::Task;

use crate::domain::TaskEnvelope;
use crate::error::StrandError;

#[derive(Default)]
pub struct TaskRegistry {
    entries: RwLock<HashMap<String, Arc<dyn DynHandler>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Install the handler for `T::TYPE`. Overwrites are permitted (last
    /// wins) but logged: a silent overwrite is a classic source of bugs.
    pub fn register<T: Task, H: Handler<T> + 'static>(&self, handler: H) {
        let entry: Arc<dyn DynHandler> = Arc::new(TypedHandler::<T, H>::new(handler));
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.insert(T::TYPE.to_string(), entry).is_some() {
            tracing::warn!(task_type = T::TYPE, "handler overwritten");
        }
    }

    pub fn is_registered(&self, task_type: &str) -> bool {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .contains_key(task_type)
    }

    /// Registered discriminators, sorted for stable diagnostics.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .entries
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    /// Decode a raw message into an executable task.
    ///
    /// Parses the generic envelope far enough to read the discriminator,
    /// then delegates full payload decoding to the registered handler.
    pub fn decode(&self, raw: &[u8]) -> Result<DecodedTask, StrandError> {
        let envelope = TaskEnvelope::from_bytes(raw)?;
        let handler = self
            .entries
            .read()
            .expect("registry lock poisoned")
            .get(envelope.task_type().as_str())
            .cloned()
            .ok_or_else(|| StrandError::UnknownTaskType(envelope.task_type().to_string()))?;
        let task = handler.bind(envelope.payload())?;
        Ok(DecodedTask { envelope, task })
    }
}

/// An envelope with its payload decoded and bound to the registered handler.
pub struct DecodedTask {
    pub(crate) envelope: TaskEnvelope,
    pub(crate) task: Box<dyn BoundTask>,
}

impl std::fmt::Debug for DecodedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedTask")
            .field("envelope", &self.envelope)
            .finish_non_exhaustive()
    }
}

impl DecodedTask {
    pub fn envelope(&self) -> &TaskEnvelope {
        &self.envelope
    }
}
