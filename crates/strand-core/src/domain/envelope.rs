//! Task envelope: the wire unit of work.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{StrandKey, TaskId, TaskStatus};
use crate::error::StrandError;

/// String discriminator used by the registry to resolve a decoder/handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The unit of work submitted for processing.
///
/// Design:
/// - "has a key" is a property of the value, not a subtype relation: keyless
///   envelopes run unconstrained, keyed envelopes are serialized per key.
/// - `priority` is carried but informational only; within a key the order is
///   strictly FIFO.
/// - `status` moves monotonically forward and is mutated only by the
///   consumer pipeline (the transition methods are crate-private).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    task_id: TaskId,
    task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<StrandKey>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    status: TaskStatus,
    #[serde(default)]
    retry_count: u32,
    created_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl TaskEnvelope {
    /// New keyless envelope with a fresh id. Chain [`with_key`](Self::with_key)
    /// for key-sequenced tasks.
    pub fn new(task_type: TaskType, payload: serde_json::Value) -> Self {
        Self {
            task_id: TaskId::generate(),
            task_type,
            key: None,
            priority: 0,
            status: TaskStatus::Created,
            retry_count: 0,
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn with_key(mut self, key: impl Into<StrandKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    pub fn key(&self) -> Option<&StrandKey> {
        self.key.as_ref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// For external retry policy: the core only carries the counter.
    pub fn bump_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub(crate) fn mark_processing(&mut self) {
        debug_assert_eq!(self.status, TaskStatus::Created);
        self.status = TaskStatus::Processing;
    }

    pub(crate) fn mark_completed(&mut self) {
        debug_assert_eq!(self.status, TaskStatus::Processing);
        self.status = TaskStatus::Completed;
    }

    pub(crate) fn mark_failed(&mut self) {
        debug_assert!(!self.status.is_terminal());
        self.status = TaskStatus::Failed;
    }

    /// JSON wire encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StrandError> {
        serde_json::to_vec(self).map_err(|e| StrandError::MalformedEnvelope(e.to_string()))
    }

    /// Parse the generic envelope. A missing or unreadable discriminator
    /// (or any other unreadable field) is a `MalformedEnvelope`.
    ///
    /// The consumer owns the lifecycle: whatever `status` rode the wire is
    /// discarded and the envelope starts over at `Created`.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, StrandError> {
        let mut env: Self = serde_json::from_slice(raw)
            .map_err(|e| StrandError::MalformedEnvelope(e.to_string()))?;
        env.status = TaskStatus::Created;
        Ok(env)
    }
}
