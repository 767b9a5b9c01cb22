//! strand-core
//!
//! Per-key sequential task processing engine: tasks sharing a strand key
//! never run concurrently and start in arrival order, while tasks on
//! different keys run fully in parallel. Payload shapes are open-ended,
//! decoded through a registry of typed handlers instead of a fixed schema.
//!
//! # Module layout
//! - **domain**: envelope, ids, keys, status, lifecycle events
//! - **registry**: `Task`/`Handler` traits, type-erased decoding, `TaskRegistry`
//! - **coordinator**: distributed per-key mutex + FIFO wait queue over `KvStore`
//! - **pipeline**: decode -> acquire-or-enqueue -> execute -> drain
//! - **worker**: broker consumption loop with graceful shutdown
//! - **ports**: `KvStore`, `Broker`, `Clock`, `EventSink` seams
//! - **impls**: in-memory store and broker for development and tests

pub mod coordinator;
pub mod domain;
pub mod error;
pub mod impls;
pub mod pipeline;
pub mod ports;
pub mod registry;
pub mod worker;

pub use coordinator::{CoordinatorConfig, KeyCoordinator};
pub use domain::{StrandKey, TaskEnvelope, TaskEvent, TaskId, TaskStatus, TaskType};
pub use error::StrandError;
pub use pipeline::{ConsumerPipeline, Disposition};
pub use ports::{Broker, Clock, EventSink, KvStore, Producer};
pub use registry::{Handler, Task, TaskRegistry};
pub use worker::WorkerGroup;
