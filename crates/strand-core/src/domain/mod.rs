//! Domain model (ids, keys, envelope, status, events).

pub mod envelope;
pub mod events;
pub mod ids;
pub mod key;
pub mod status;

pub use envelope::{TaskEnvelope, TaskType};
pub use events::TaskEvent;
pub use ids::TaskId;
pub use key::StrandKey;
pub use status::TaskStatus;
