//! Notification hub backends.

pub mod memory;

pub use memory::InMemoryHub;
