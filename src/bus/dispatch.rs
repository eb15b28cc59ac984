//! Inbound delivery routing for a bus instance.
//!
//! One fixed pump per subscribe connection consumes the connection's
//! delivery stream and routes it: subscribe acknowledgments complete waiting
//! `on` calls, messages are stripped of the bus prefix and fanned out to the
//! dispatch table. Handlers never attach to the backend directly, so
//! repeated `on` calls grow the table rather than the connection's listener
//! set.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, trace};

use crate::backend::Delivery;
use crate::channel::from_channel;
use crate::payload::Payload;

/// Handler for messages delivered on a subscribed event.
///
/// Implemented automatically for async closures taking a [`Payload`].
pub trait EventHandler: Send + Sync {
    /// Process one inbound payload, exactly as published.
    fn handle(&self, payload: Payload) -> BoxFuture<'static, ()>;
}

impl<F, Fut> EventHandler for F
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    fn handle(&self, payload: Payload) -> BoxFuture<'static, ()> {
        Box::pin(self(payload))
    }
}

/// Routing state shared between a bus instance and its pump task.
#[derive(Default)]
pub(crate) struct Dispatcher {
    /// Dispatch table: event name to registered handlers, in registration
    /// order.
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    /// Subscribe calls waiting for the backend's acknowledgment, keyed by
    /// channel name.
    pending_acks: RwLock<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl Dispatcher {
    /// Register a handler for an event. Fan-out: existing handlers for the
    /// same event keep running.
    pub(crate) async fn add_handler(&self, event: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .await
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    /// Park a waiter for the next acknowledgment of `channel`.
    pub(crate) async fn register_ack(&self, channel: &str) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        self.pending_acks
            .write()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(sender);
        receiver
    }

    /// Spawn the pump for one subscribe connection.
    pub(crate) fn spawn(self: Arc<Self>, prefix: String, deliveries: mpsc::Receiver<Delivery>) {
        tokio::spawn(async move {
            self.run(prefix, deliveries).await;
        });
    }

    async fn run(&self, prefix: String, mut deliveries: mpsc::Receiver<Delivery>) {
        while let Some(delivery) = deliveries.recv().await {
            match delivery {
                Delivery::SubscribeAck { channel } => {
                    let waiters = self.pending_acks.write().await.remove(&channel);
                    match waiters {
                        Some(waiters) => {
                            for waiter in waiters {
                                // A dropped receiver means the caller gave up.
                                let _ = waiter.send(());
                            }
                        }
                        // Re-subscribe confirmation; nobody is waiting.
                        None => trace!(channel = %channel, "Unsolicited subscribe acknowledgment"),
                    }
                }
                Delivery::Message { channel, payload } => {
                    let event = from_channel(&prefix, &channel);
                    let handlers = self.handlers.read().await.get(&event).cloned();
                    match handlers {
                        Some(handlers) => {
                            trace!(event = %event, count = handlers.len(), "Dispatching message");
                            for handler in &handlers {
                                handler.handle(payload.clone()).await;
                            }
                        }
                        None => trace!(event = %event, "No subscribers; dropping message"),
                    }
                }
            }
        }

        // The connection was closed; release anyone still waiting on an
        // acknowledgment so their subscribe call can fail.
        self.pending_acks.write().await.clear();
        debug!("Delivery stream closed; dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
        Arc::new(move |_payload: Payload| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test]
    async fn test_ack_completes_waiters() {
        let dispatcher = Arc::new(Dispatcher::default());
        let (sender, receiver) = mpsc::channel(8);
        Arc::clone(&dispatcher).spawn("bus:x".to_string(), receiver);

        let first = dispatcher.register_ack("bus:x:msg").await;
        let second = dispatcher.register_ack("bus:x:msg").await;

        sender
            .send(Delivery::SubscribeAck {
                channel: "bus:x:msg".to_string(),
            })
            .await
            .unwrap();

        first.await.unwrap();
        second.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_end_releases_waiters() {
        let dispatcher = Arc::new(Dispatcher::default());
        let (sender, receiver) = mpsc::channel(8);
        Arc::clone(&dispatcher).spawn("bus:x".to_string(), receiver);

        let waiter = dispatcher.register_ack("bus:x:msg").await;
        drop(sender);

        assert!(waiter.await.is_err());
    }

    #[tokio::test]
    async fn test_messages_fan_out_to_matching_handlers() {
        let dispatcher = Arc::new(Dispatcher::default());
        let (sender, receiver) = mpsc::channel(8);
        Arc::clone(&dispatcher).spawn("bus:x".to_string(), receiver);

        let hits = Arc::new(AtomicUsize::new(0));
        let misses = Arc::new(AtomicUsize::new(0));
        dispatcher.add_handler("msg", counting_handler(hits.clone())).await;
        dispatcher.add_handler("msg", counting_handler(hits.clone())).await;
        dispatcher.add_handler("other", counting_handler(misses.clone())).await;

        sender
            .send(Delivery::Message {
                channel: "bus:x:msg".to_string(),
                payload: Payload::from("Hi"),
            })
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(misses.load(Ordering::SeqCst), 0);
    }
}
