pub mod serde;
pub mod telemetry;

pub use telemetry::*;
