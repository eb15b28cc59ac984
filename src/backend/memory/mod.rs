//! In-memory broker backend.
//!
//! Keeps subscription state broker-side, the way a real messaging server
//! does: a publish reaches exactly the connections whose subscription was
//! registered before the publish was processed. Ideal for tests and for
//! single-process use without external dependencies.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace, warn};

use super::{Backend, Connection, ConnectionHandle, Delivery, DELIVERY_BUFFER};
use crate::config::ConnectOptions;
use crate::error::{BusError, Result};
use crate::payload::Payload;

#[derive(Default)]
struct BrokerState {
    next_id: u64,
    connections: HashMap<u64, ConnectionEntry>,
}

struct ConnectionEntry {
    /// Backend-applied channel prefix for this connection.
    prefix: String,
    /// Absolute channel names this connection is subscribed to.
    channels: HashSet<String>,
    deliveries: mpsc::Sender<Delivery>,
}

/// In-memory messaging broker.
///
/// Every connection opened from the same broker shares one channel space;
/// connections from different brokers never see each other's traffic. Clones
/// share the broker.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<BrokerState>>,
}

impl MemoryBackend {
    /// Create a new, empty broker.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn connect(&self, options: &ConnectOptions) -> Result<ConnectionHandle> {
        let (deliveries, receiver) = mpsc::channel(DELIVERY_BUFFER);
        let prefix = options.prefix.clone().unwrap_or_default();

        let id = {
            let mut state = self.state.write().await;
            let id = state.next_id;
            state.next_id += 1;
            state.connections.insert(
                id,
                ConnectionEntry {
                    prefix: prefix.clone(),
                    channels: HashSet::new(),
                    deliveries,
                },
            );
            id
        };

        debug!(connection = id, "Memory broker connection opened");

        let connection = MemoryConnection {
            id,
            prefix,
            state: self.state.clone(),
            open: AtomicBool::new(true),
        };
        Ok((Box::new(connection), receiver))
    }
}

struct MemoryConnection {
    id: u64,
    prefix: String,
    state: Arc<RwLock<BrokerState>>,
    open: AtomicBool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BusError::Connection("Connection closed".to_string()))
        }
    }

    fn absolute(&self, channel: &str) -> String {
        format!("{}{}", self.prefix, channel)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn publish(&self, channel: &str, payload: Payload) -> Result<()> {
        self.ensure_open()?;
        let absolute = self.absolute(channel);

        let state = self.state.read().await;
        let mut receivers = 0usize;
        for entry in state.connections.values() {
            if !entry.channels.contains(&absolute) {
                continue;
            }
            let visible = absolute
                .strip_prefix(entry.prefix.as_str())
                .unwrap_or(&absolute)
                .to_string();
            match entry.deliveries.try_send(Delivery::Message {
                channel: visible,
                payload: payload.clone(),
            }) {
                Ok(()) => receivers += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(channel = %absolute, "Delivery buffer full; dropping message");
                }
                // Receiver is shutting down; its entry disappears on close.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        if receivers == 0 {
            trace!(channel = %absolute, "Published message (no receivers)");
        } else {
            trace!(channel = %absolute, receivers, "Published message");
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<()> {
        self.ensure_open()?;
        let absolute = self.absolute(channel);

        let deliveries = {
            let mut state = self.state.write().await;
            let entry = state
                .connections
                .get_mut(&self.id)
                .ok_or_else(|| BusError::Connection("Connection closed".to_string()))?;
            entry.channels.insert(absolute);
            entry.deliveries.clone()
        };

        // Subscription state is registered; confirm it to the owner.
        deliveries
            .send(Delivery::SubscribeAck {
                channel: channel.to_string(),
            })
            .await
            .map_err(|_| BusError::Subscribe("Delivery stream closed".to_string()))?;
        Ok(())
    }

    async fn unsubscribe_all(&self) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        if let Some(entry) = state.connections.get_mut(&self.id) {
            entry.channels.clear();
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            // Dropping the entry drops its delivery sender, ending the stream.
            self.state.write().await.connections.remove(&self.id);
            debug!(connection = self.id, "Memory broker connection closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
