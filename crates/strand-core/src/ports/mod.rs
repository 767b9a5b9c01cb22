//! Ports: the abstraction seams of the engine.
//!
//! Each trait hides an external collaborator (shared key-value store,
//! message broker, wall clock, observability sink) so implementations can
//! be swapped without touching the coordinator or the pipeline.

pub mod broker;
pub mod clock;
pub mod event_sink;
pub mod kv_store;

pub use self::broker::{Broker, Producer};
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::kv_store::KvStore;
