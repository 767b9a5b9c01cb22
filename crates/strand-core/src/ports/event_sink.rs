//! EventSink port: observation hook for task lifecycle events.

use crate::domain::TaskEvent;

/// Receives every pipeline state transition. Implementations must be cheap
/// and non-blocking; the pipeline calls this inline.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}

/// Default sink: drop everything.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: TaskEvent) {}
}
