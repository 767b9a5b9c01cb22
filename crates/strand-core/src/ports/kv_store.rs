//! KvStore port: the shared-store primitives the coordinator runs on.
//!
//! Any store offering these four primitive families is a valid substrate
//! (in-memory, Redis-like, ...): atomic add-to-set reporting newness, FIFO
//! list push/pop, TTL on a key's record, and deletion. The coordinator is
//! the only component allowed to touch this state.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StrandError;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomically add `member` to `set`. Returns true iff this call caused
    /// the addition (the member was previously absent). No two concurrent
    /// callers may both observe true for the same member.
    async fn set_add(&self, set: &str, member: &str) -> Result<bool, StrandError>;

    /// Remove `member` from `set`. Returns true iff it was present.
    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StrandError>;

    async fn set_contains(&self, set: &str, member: &str) -> Result<bool, StrandError>;

    async fn set_members(&self, set: &str) -> Result<Vec<String>, StrandError>;

    /// Append to the tail of `list`.
    async fn list_push_back(&self, list: &str, value: Vec<u8>) -> Result<(), StrandError>;

    /// Pop the head of `list`, if any.
    async fn list_pop_front(&self, list: &str) -> Result<Option<Vec<u8>>, StrandError>;

    async fn list_len(&self, list: &str) -> Result<usize, StrandError>;

    /// (Re)arm a TTL on `key`'s record. Expired records behave as absent.
    /// A no-op when the record does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StrandError>;

    async fn delete(&self, key: &str) -> Result<(), StrandError>;
}
