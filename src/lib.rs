//! Namedbus - Named Event-Bus Facade
//!
//! A named, process-local facade over publish/subscribe messaging backends.
//! Independent parts of a process (or independent processes sharing the same
//! backend) communicate by named events without knowing about each other;
//! unrelated buses are isolated through channel-name namespacing, and a
//! ping/pong liveness probe answers how many live instances are currently
//! listening on a bus.
//!
//! ```
//! use std::sync::Arc;
//!
//! use namedbus::{backend::MemoryBackend, BusOptions, Payload, Registry};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> namedbus::Result<()> {
//! let registry = Registry::new(Arc::new(MemoryBackend::new()));
//! let bus = registry.get_or_create("jobs", BusOptions::default()).await?;
//!
//! bus.on("created", |payload: Payload| async move {
//!     println!("job created: {:?}", payload.as_str());
//! })
//! .await?;
//!
//! bus.emit("created", r#"{"id":1}"#).await?;
//! # bus.destroy().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bootstrap;
pub mod bus;
pub mod channel;
pub mod config;
pub mod error;
pub mod payload;
pub mod registry;

pub use bus::{EventBus, EventHandler};
pub use config::{BusOptions, ConnectOptions, PingOptions};
pub use error::{BusError, Result};
pub use payload::Payload;
pub use registry::Registry;
