//! Development/test implementations of the ports.

pub mod inmem_broker;
pub mod memory_store;

pub use inmem_broker::InMemoryBroker;
pub use memory_store::InMemoryStore;
