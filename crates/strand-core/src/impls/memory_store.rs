//! In-memory KvStore for development and tests.
//!
//! TTLs are evaluated lazily against the injected Clock on every access, so
//! tests expire records by advancing a ManualClock instead of sleeping.
//! Atomicity of `set_add` comes from the single store-wide mutex; that is
//! enough for one process, which is all this substrate is for.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StrandError;
use crate::ports::{Clock, KvStore, SystemClock};

enum Value {
    Set(HashSet<String>),
    List(VecDeque<Vec<u8>>),
}

struct Record {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

pub struct InMemoryStore {
    records: Mutex<HashMap<String, Record>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Lock the table and drop `key`'s record if its TTL has elapsed.
    fn locked(&self, key: &str) -> MutexGuard<'_, HashMap<String, Record>> {
        let mut records = self.records.lock().unwrap();
        let now = self.clock.now();
        let expired = records
            .get(key)
            .and_then(|r| r.expires_at)
            .is_some_and(|deadline| deadline <= now);
        if expired {
            records.remove(key);
        }
        records
    }

    fn wrong_kind(key: &str) -> StrandError {
        StrandError::CoordinationUnavailable(format!("record {key} has the wrong kind"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn set_add(&self, set: &str, member: &str) -> Result<bool, StrandError> {
        let mut records = self.locked(set);
        let record = records.entry(set.to_string()).or_insert_with(|| Record {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut record.value {
            Value::Set(members) => Ok(members.insert(member.to_string())),
            Value::List(_) => Err(Self::wrong_kind(set)),
        }
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StrandError> {
        let mut records = self.locked(set);
        let Some(record) = records.get_mut(set) else {
            return Ok(false);
        };
        match &mut record.value {
            Value::Set(members) => {
                let removed = members.remove(member);
                if members.is_empty() {
                    records.remove(set);
                }
                Ok(removed)
            }
            Value::List(_) => Err(Self::wrong_kind(set)),
        }
    }

    async fn set_contains(&self, set: &str, member: &str) -> Result<bool, StrandError> {
        let records = self.locked(set);
        match records.get(set) {
            Some(Record {
                value: Value::Set(members),
                ..
            }) => Ok(members.contains(member)),
            Some(_) => Err(Self::wrong_kind(set)),
            None => Ok(false),
        }
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, StrandError> {
        let records = self.locked(set);
        match records.get(set) {
            Some(Record {
                value: Value::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(Self::wrong_kind(set)),
            None => Ok(Vec::new()),
        }
    }

    async fn list_push_back(&self, list: &str, value: Vec<u8>) -> Result<(), StrandError> {
        let mut records = self.locked(list);
        let record = records.entry(list.to_string()).or_insert_with(|| Record {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut record.value {
            Value::List(items) => {
                items.push_back(value);
                Ok(())
            }
            Value::Set(_) => Err(Self::wrong_kind(list)),
        }
    }

    async fn list_pop_front(&self, list: &str) -> Result<Option<Vec<u8>>, StrandError> {
        let mut records = self.locked(list);
        let Some(record) = records.get_mut(list) else {
            return Ok(None);
        };
        match &mut record.value {
            Value::List(items) => {
                let popped = items.pop_front();
                if items.is_empty() {
                    records.remove(list);
                }
                Ok(popped)
            }
            Value::Set(_) => Err(Self::wrong_kind(list)),
        }
    }

    async fn list_len(&self, list: &str) -> Result<usize, StrandError> {
        let records = self.locked(list);
        match records.get(list) {
            Some(Record {
                value: Value::List(items),
                ..
            }) => Ok(items.len()),
            Some(_) => Err(Self::wrong_kind(list)),
            None => Ok(0),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StrandError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StrandError::CoordinationUnavailable(format!("ttl out of range: {e}")))?;
        let mut records = self.locked(key);
        if let Some(record) = records.get_mut(key) {
            record.expires_at = Some(self.clock.now() + ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StrandError> {
        self.locked(key).remove(key);
        Ok(())
    }
}
