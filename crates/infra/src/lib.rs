//! Infrastructure layer: order storage backends, counter lifecycle, config.

pub mod config;
pub mod orders;

pub use config::{DatabaseConfig, LifecycleConfig, RecreateMode};
pub use orders::{CreatedOrder, OrderError, OrderLifecycle};
