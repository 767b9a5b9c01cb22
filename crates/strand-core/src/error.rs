use thiserror::Error;

/// Engine error taxonomy.
///
/// - Decode-time errors (`MalformedEnvelope`, `UnknownTaskType`) are
///   non-retryable by this core; the message is considered consumed.
/// - `CoordinationUnavailable` degrades to conservative defaults inside the
///   coordinator (prefer serializing over double-running a key) and never
///   escapes `on_message`.
/// - `ExecutionFailed` is caught at the pipeline boundary; retry and
///   dead-letter policy live in the per-handler error hook.
#[derive(Debug, Error)]
pub enum StrandError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("no handler registered for task_type={0}")]
    UnknownTaskType(String),

    #[error("coordination store unavailable: {0}")]
    CoordinationUnavailable(String),

    #[error("task execution failed: {0}")]
    ExecutionFailed(String),
}
