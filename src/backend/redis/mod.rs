//! Redis pub/sub backend.
//!
//! Publishes through a `ConnectionManager` and consumes through the async
//! pub/sub connection split into a sink and a stream. The sink's awaited
//! subscribe reply is the server-side confirmation surfaced as
//! [`Delivery::SubscribeAck`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionManager, PubSubSink};
use redis::Client;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Backend, Connection, ConnectionHandle, Delivery, DELIVERY_BUFFER};
use crate::config::ConnectOptions;
use crate::error::{BusError, Result};
use crate::payload::Payload;

/// Default Redis connection URL.
const DEFAULT_URL: &str = "redis://127.0.0.1:6379";

/// Redis-backed messaging backend.
///
/// Every connection opens its own client pair: a managed connection for
/// publishing and a dedicated pub/sub connection for subscriptions, since a
/// Redis connection in subscribe mode cannot issue regular commands.
pub struct RedisBackend {
    url: String,
}

impl RedisBackend {
    /// Backend targeting the given Redis URL (e.g. `redis://localhost:6379`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for RedisBackend {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn connect(&self, options: &ConnectOptions) -> Result<ConnectionHandle> {
        let url = options.url.as_deref().unwrap_or(&self.url);
        let client = Client::open(url)
            .map_err(|e| BusError::Connection(format!("Invalid Redis URL: {e}")))?;

        let manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BusError::Connection(format!("Failed to connect to Redis: {e}")))?;

        let pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to open pub/sub connection: {e}")))?;
        let (sink, mut stream) = pubsub.split();

        let (deliveries, receiver) = mpsc::channel(DELIVERY_BUFFER);

        let pump_deliveries = deliveries.clone();
        let pump = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let delivery = Delivery::Message {
                    channel: message.get_channel_name().to_string(),
                    payload: Payload::from(message.get_payload_bytes()),
                };
                if pump_deliveries.send(delivery).await.is_err() {
                    break;
                }
            }
            debug!("Redis pub/sub stream ended");
        });

        info!(url = %url, "Connected to Redis");

        let connection = RedisConnection {
            manager,
            sink: Mutex::new(Some(sink)),
            channels: Mutex::new(HashSet::new()),
            prefix: options.prefix.clone().unwrap_or_default(),
            deliveries,
            pump: Mutex::new(Some(pump)),
            open: AtomicBool::new(true),
        };
        Ok((Box::new(connection), receiver))
    }
}

struct RedisConnection {
    manager: ConnectionManager,
    sink: Mutex<Option<PubSubSink>>,
    /// Channels subscribed on this connection, for unsubscribe_all.
    channels: Mutex<HashSet<String>>,
    prefix: String,
    deliveries: mpsc::Sender<Delivery>,
    pump: Mutex<Option<JoinHandle<()>>>,
    open: AtomicBool,
}

impl RedisConnection {
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
impl Connection for RedisConnection {
    async fn publish(&self, channel: &str, payload: Payload) -> Result<()> {
        self.ensure_open()?;
        let absolute = self.absolute(channel);
        let mut manager = self.manager.clone();
        let _receivers: i64 = redis::cmd("PUBLISH")
            .arg(&absolute)
            .arg(payload.as_bytes())
            .query_async(&mut manager)
            .await
            .map_err(|e| BusError::Publish(format!("PUBLISH {absolute} failed: {e}")))?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<()> {
        self.ensure_open()?;
        let absolute = self.absolute(channel);
        {
            let mut sink = self.sink.lock().await;
            let sink = sink
                .as_mut()
                .ok_or_else(|| BusError::Connection("Connection closed".to_string()))?;
            sink.subscribe(&absolute)
                .await
                .map_err(|e| BusError::Subscribe(format!("SUBSCRIBE {absolute} failed: {e}")))?;
        }
        self.channels.lock().await.insert(absolute);

        // The server confirmed the subscription; surface the acknowledgment.
        self.deliveries
            .send(Delivery::SubscribeAck {
                channel: channel.to_string(),
            })
            .await
            .map_err(|_| BusError::Subscribe("Delivery stream closed".to_string()))?;
        Ok(())
    }

    async fn unsubscribe_all(&self) -> Result<()> {
        self.ensure_open()?;
        let channels: Vec<String> = self.channels.lock().await.drain().collect();
        let mut sink = self.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or_else(|| BusError::Connection("Connection closed".to_string()))?;
        for channel in channels {
            sink.unsubscribe(&channel)
                .await
                .map_err(|e| BusError::Subscribe(format!("UNSUBSCRIBE {channel} failed: {e}")))?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.sink.lock().await.take();
            if let Some(pump) = self.pump.lock().await.take() {
                pump.abort();
            }
            debug!("Redis connection closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
