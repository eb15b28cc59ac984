//! Messaging backend collaborators.
//!
//! This module contains:
//! - `Backend` trait: opens connections to a messaging system
//! - `Connection` trait: publish/subscribe operations on one connection
//! - `Delivery`: the notifications a connection pushes to its owner
//! - Implementations: in-memory broker, Redis (feature `redis`)
//!
//! The bus core owns its connections exclusively and requires nothing from a
//! backend beyond this contract: connection establishment, wire protocol,
//! reconnection, and authentication all live behind it.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::ConnectOptions;
use crate::error::Result;
use crate::payload::Payload;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;

/// Buffer size for per-connection delivery streams.
pub(crate) const DELIVERY_BUFFER: usize = 256;

/// Notifications a connection delivers asynchronously to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The backend acknowledged that a subscribe request is active.
    SubscribeAck { channel: String },
    /// A message arrived on a subscribed channel.
    Message { channel: String, payload: Payload },
}

/// A connection paired with the stream of deliveries it produces.
///
/// The stream ends when the connection is closed; owners that never
/// subscribe simply drop the receiver.
pub type ConnectionHandle = (Box<dyn Connection>, mpsc::Receiver<Delivery>);

/// Interface for opening connections to a messaging system.
///
/// Implementations:
/// - `MemoryBackend`: in-process broker over tokio channels
/// - `RedisBackend`: Redis pub/sub (feature `redis`)
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open a new connection.
    ///
    /// # Errors
    /// Returns [`crate::BusError::Connection`] when the backend is
    /// unreachable.
    async fn connect(&self, options: &ConnectOptions) -> Result<ConnectionHandle>;
}

/// One connection to a messaging system.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Publish a payload to a channel. Fire-and-forget: succeeding says
    /// nothing about whether any subscriber exists.
    async fn publish(&self, channel: &str, payload: Payload) -> Result<()>;

    /// Ask the backend to subscribe this connection to a channel.
    ///
    /// Activation is signalled separately through
    /// [`Delivery::SubscribeAck`] on the connection's delivery stream.
    async fn subscribe(&self, channel: &str) -> Result<()>;

    /// Drop every subscription held by this connection.
    async fn unsubscribe_all(&self) -> Result<()>;

    /// Close the connection; its delivery stream ends.
    async fn close(&self) -> Result<()>;

    /// Whether the connection is currently usable.
    fn is_connected(&self) -> bool;
}
