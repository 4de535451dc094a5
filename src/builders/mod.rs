//! Builders to construct brokers from configuration.

pub mod broker_builder;

pub use broker_builder::{build_broker, build_workers_list};
