//! Task status machine.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task envelope.
///
/// Transitions (driven only by the consumer pipeline):
/// - Created -> Processing -> Completed
/// - Created -> Processing -> Failed
///
/// Monotonically forward; Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Constructed, not yet picked up by the pipeline.
    Created,

    /// Task body currently executing on some worker.
    Processing,

    /// Task body returned successfully.
    Completed,

    /// Task body returned an error (terminal; retry is external policy).
    Failed,
}

impl TaskStatus {
    /// No further transitions from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Created
    }
}
