//! Task trait: binds a payload type to its task_type tag.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{TaskEnvelope, TaskType};
use crate::error::StrandError;

/// A concrete task payload.
///
/// "Has a key" is a property of the envelope, not of the type: any task can
/// be submitted keyless or chained with [`TaskEnvelope::with_key`].
///
/// Trait bounds: `Serialize`/`DeserializeOwned` for the wire, `Send + Sync +
/// 'static` so decoded tasks can cross worker boundaries.
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Discriminator stored in the envelope and used for registry lookup.
    const TYPE: &'static str;

    /// Wrap this value into a keyless envelope with a fresh id.
    fn envelope(&self) -> Result<TaskEnvelope, StrandError>
    where
        Self: Sized,
    {
        let payload = serde_json::to_value(self)
            .map_err(|e| StrandError::MalformedEnvelope(format!("encode {}: {e}", Self::TYPE)))?;
        Ok(TaskEnvelope::new(TaskType::new(Self::TYPE), payload))
    }
}
