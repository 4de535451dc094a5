//! Infrastructure adapters for queues, document stores, hubs and brokers.

pub mod broker;
pub mod queue;
pub mod realtime;
pub mod store;

pub use broker::InMemoryBroker;
pub use queue::InMemoryQueue;
pub use realtime::InMemoryHub;
pub use store::InMemoryStore;
