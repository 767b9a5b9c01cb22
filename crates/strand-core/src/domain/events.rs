//! Task lifecycle events, observable through the EventSink port.

use std::time::Duration;

use super::{StrandKey, TaskId};

/// Emitted by the consumer pipeline at each state transition.
///
/// This is the instrumented-hook surface: tests record these to assert
/// per-key mutual exclusion and FIFO ordering; production wiring can forward
/// them to metrics or an audit log.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Task body started executing (status moved to Processing).
    Started {
        task_id: TaskId,
        key: Option<StrandKey>,
    },

    /// Task body finished successfully.
    Completed {
        task_id: TaskId,
        key: Option<StrandKey>,
        elapsed: Duration,
    },

    /// Task body returned an error.
    Failed {
        task_id: TaskId,
        key: Option<StrandKey>,
        error: String,
    },

    /// Task parked in the wait queue behind the current key holder.
    Deferred { task_id: TaskId, key: StrandKey },

    /// Message consumed without execution (undecodable, or enqueue failed).
    Rejected { error: String },
}
