//! Bus instances.
//!
//! This module contains:
//! - `EventBus`: a named facade over one publish and one subscribe
//!   connection to a messaging backend
//! - `EventHandler` trait: for processing inbound messages
//! - The ping/pong liveness probe
//!
//! Instances are created through [`crate::Registry`]; the registry guarantees
//! at most one live instance per name.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::backend::{Backend, Connection};
use crate::channel::to_channel;
use crate::config::{BusOptions, PingOptions, NAMESPACE_ROOT, PING_EVENT, PONG_EVENT};
use crate::error::{BusError, Result};
use crate::payload::Payload;
use crate::registry::RegistryInner;

mod dispatch;
mod ping;

pub use dispatch::EventHandler;

use dispatch::Dispatcher;
use ping::ProbeBoard;

/// A named event bus over a messaging backend.
///
/// Each instance owns two connections: one used only for publishing and one
/// used only for subscriptions. Event names are namespaced with the bus
/// prefix, so buses with different names (or different caller prefixes)
/// never cross-deliver even on a shared backend.
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct ConnectionPair {
    publish: Box<dyn Connection>,
    subscribe: Box<dyn Connection>,
}

struct BusInner {
    name: String,
    prefix: String,
    connections: RwLock<Option<ConnectionPair>>,
    dispatcher: Arc<Dispatcher>,
    probes: Arc<ProbeBoard>,
    registry: Weak<RegistryInner>,
    destroyed: AtomicBool,
}

fn ensure_public_event(event: &str) -> Result<()> {
    if event == PING_EVENT || event == PONG_EVENT {
        return Err(BusError::ReservedName {
            event: event.to_string(),
        });
    }
    Ok(())
}

impl EventBus {
    /// Connect and wire a new instance. Callers go through
    /// [`crate::Registry::get_or_create`].
    pub(crate) async fn create(
        name: &str,
        options: &BusOptions,
        backend: &dyn Backend,
        registry: Weak<RegistryInner>,
    ) -> Result<Arc<Self>> {
        let caller_prefix = options.prefix.as_deref().unwrap_or_default();
        let prefix = format!("{caller_prefix}{NAMESPACE_ROOT}:{name}");

        let (publish, _publish_deliveries) = backend.connect(&options.connect).await?;
        let (subscribe, deliveries) = backend.connect(&options.connect).await?;

        let inner = Arc::new(BusInner {
            name: name.to_string(),
            prefix,
            connections: RwLock::new(Some(ConnectionPair { publish, subscribe })),
            dispatcher: Arc::new(Dispatcher::default()),
            probes: Arc::new(ProbeBoard::default()),
            registry,
            destroyed: AtomicBool::new(false),
        });

        Arc::clone(&inner.dispatcher).spawn(inner.prefix.clone(), deliveries);

        // Answer peers' probes for the lifetime of the instance. The weak
        // handle keeps the handler from pinning the instance in the
        // dispatch table after destruction.
        let responder = Arc::downgrade(&inner);
        inner
            .dispatcher
            .add_handler(
                PING_EVENT,
                Arc::new(move |_payload: Payload| {
                    let bus = responder.clone();
                    async move {
                        let Some(bus) = bus.upgrade() else {
                            return;
                        };
                        if let Err(error) = bus.emit_internal(PONG_EVENT, Payload::empty()).await {
                            warn!(error = %error, "Failed to answer liveness probe");
                        }
                    }
                }),
            )
            .await;

        // Route responses to whatever probes are in flight.
        let board = Arc::clone(&inner.probes);
        inner
            .dispatcher
            .add_handler(
                PONG_EVENT,
                Arc::new(move |_payload: Payload| {
                    let board = Arc::clone(&board);
                    async move {
                        board.record_response().await;
                    }
                }),
            )
            .await;

        // Both reserved channels must be active before the instance becomes
        // visible through the registry.
        let wired = async {
            inner.subscribe_channel(PING_EVENT).await?;
            inner.subscribe_channel(PONG_EVENT).await
        }
        .await;
        if let Err(error) = wired {
            inner.close_connections().await;
            return Err(error);
        }

        info!(name = %inner.name, prefix = %inner.prefix, "Event bus ready");
        Ok(Arc::new(Self { inner }))
    }

    /// The name this instance is registered under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register a handler for an event.
    ///
    /// Completes only after the backend has acknowledged the subscription,
    /// so callers can rely on receiving messages emitted afterwards.
    /// Handlers for the same event fan out: all of them run, in
    /// registration order, once per matching message. There is no
    /// unsubscribe; handlers live as long as the instance.
    ///
    /// # Errors
    /// Returns [`BusError::ReservedName`] for `ping`/`pong`,
    /// [`BusError::Destroyed`] after [`EventBus::destroy`], or a backend
    /// subscribe failure.
    pub async fn on<H>(&self, event: &str, handler: H) -> Result<()>
    where
        H: EventHandler + 'static,
    {
        ensure_public_event(event)?;
        self.inner.on_internal(event, Arc::new(handler)).await
    }

    /// Publish a payload for an event.
    ///
    /// Fire-and-forget: no delivery acknowledgment, no error when nobody is
    /// subscribed. Text and byte payloads are sent as-is; use
    /// [`Payload::json`] to encode structured values.
    ///
    /// # Errors
    /// Returns [`BusError::ReservedName`] for `ping`/`pong`,
    /// [`BusError::Destroyed`] after [`EventBus::destroy`], or a backend
    /// publish failure.
    pub async fn emit(&self, event: &str, payload: impl Into<Payload>) -> Result<()> {
        ensure_public_event(event)?;
        self.inner.emit_internal(event, payload.into()).await
    }

    /// Probe the bus for live instances with default options.
    ///
    /// See [`EventBus::ping_with`].
    pub async fn ping(&self) -> Result<bool> {
        self.ping_with(PingOptions::default()).await
    }

    /// Probe the bus for live instances.
    ///
    /// Publishes the reserved `ping` event; every live instance on the bus,
    /// including this one, answers with `pong`. Resolves `true` as soon as
    /// `min_responses + 1` responses arrive (the `+1` is this instance's
    /// own mandatory answer), or `false` when the timeout fires first.
    /// Resolves exactly once; reaching quorum cancels the timer.
    ///
    /// Best-effort: probes carry no correlation id, so probes overlapping
    /// on the same bus can count each other's responses.
    pub async fn ping_with(&self, options: PingOptions) -> Result<bool> {
        let required = options.min_responses + 1;

        let (id, mut responses) = self.inner.probes.register().await;
        let outcome = self.inner.run_probe(options, required, &mut responses).await;
        self.inner.probes.unregister(id).await;
        outcome
    }

    /// Whether both connections are currently usable.
    ///
    /// # Errors
    /// Returns [`BusError::Destroyed`] after [`EventBus::destroy`], or
    /// [`BusError::NoConnection`] if the connection pair was never
    /// established.
    pub async fn connected(&self) -> Result<bool> {
        let guard = self.inner.connections.read().await;
        match guard.as_ref() {
            Some(pair) => Ok(pair.publish.is_connected() && pair.subscribe.is_connected()),
            None => Err(self.inner.gone_error()),
        }
    }

    /// Tear the instance down: unsubscribe, close both connections, and
    /// remove it from the registry.
    ///
    /// Idempotent; a second call is a no-op. Afterwards every operation on
    /// this reference fails with [`BusError::Destroyed`] and a registry
    /// lookup under the same name builds a fresh instance.
    pub async fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        if !self.inner.close_connections().await {
            return;
        }
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.remove(&self.inner.name).await;
        }
        info!(name = %self.inner.name, "Event bus destroyed");
    }
}

impl BusInner {
    fn gone_error(&self) -> BusError {
        if self.destroyed.load(Ordering::SeqCst) {
            BusError::Destroyed
        } else {
            BusError::NoConnection
        }
    }

    async fn on_internal(&self, event: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        // Reject before touching the dispatch table, so a destroyed
        // instance is not left holding a handler that can never fire.
        if self.connections.read().await.is_none() {
            return Err(self.gone_error());
        }
        self.dispatcher.add_handler(event, handler).await;
        self.subscribe_channel(event).await
    }

    /// Two-phase subscribe: issue the request, then wait for the backend's
    /// acknowledgment routed back through the dispatcher.
    async fn subscribe_channel(&self, event: &str) -> Result<()> {
        let channel = to_channel(&self.prefix, event);
        let ack = {
            let guard = self.connections.read().await;
            let pair = guard.as_ref().ok_or_else(|| self.gone_error())?;
            let ack = self.dispatcher.register_ack(&channel).await;
            pair.subscribe.subscribe(&channel).await?;
            ack
        };
        ack.await.map_err(|_| {
            BusError::Subscribe(format!("Subscription to '{channel}' was never acknowledged"))
        })?;
        Ok(())
    }

    #[tracing::instrument(name = "bus.publish", skip(self, payload), fields(bus = %self.name))]
    async fn emit_internal(&self, event: &str, payload: Payload) -> Result<()> {
        let channel = to_channel(&self.prefix, event);
        let guard = self.connections.read().await;
        let pair = guard.as_ref().ok_or_else(|| self.gone_error())?;
        pair.publish.publish(&channel, payload).await
    }

    async fn run_probe(
        &self,
        options: PingOptions,
        required: usize,
        responses: &mut mpsc::UnboundedReceiver<()>,
    ) -> Result<bool> {
        self.emit_internal(PING_EVENT, Payload::empty()).await?;

        let deadline = tokio::time::sleep(options.timeout);
        tokio::pin!(deadline);
        let mut count = 0usize;

        loop {
            tokio::select! {
                () = &mut deadline => break Ok(count >= required),
                received = responses.recv() => match received {
                    Some(()) => {
                        count += 1;
                        if count >= required {
                            // Quorum reached; the timer is dropped unfired.
                            break Ok(true);
                        }
                    }
                    None => break Ok(count >= required),
                },
            }
        }
    }

    /// Take and close both connections. Returns `false` when they were
    /// already gone. Teardown keeps going past individual close failures so
    /// the registry entry is always released.
    async fn close_connections(&self) -> bool {
        let Some(pair) = self.connections.write().await.take() else {
            return false;
        };
        if let Err(error) = pair.subscribe.unsubscribe_all().await {
            warn!(name = %self.name, error = %error, "Failed to unsubscribe during teardown");
        }
        if let Err(error) = pair.subscribe.close().await {
            warn!(name = %self.name, error = %error, "Failed to close subscribe connection");
        }
        if let Err(error) = pair.publish.close().await {
            warn!(name = %self.name, error = %error, "Failed to close publish connection");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn reserved(result: Result<()>) -> bool {
        matches!(result, Err(BusError::ReservedName { .. }))
    }

    #[test]
    fn test_reserved_event_names() {
        assert!(reserved(ensure_public_event("ping")));
        assert!(reserved(ensure_public_event("pong")));
        assert!(ensure_public_event("msg").is_ok());
        assert!(ensure_public_event("pinger").is_ok());
    }

    #[tokio::test]
    async fn test_prefix_combines_caller_prefix_namespace_and_name() {
        let backend = MemoryBackend::new();
        let options = BusOptions::with_prefix("tenant1");
        let bus = EventBus::create("jobs", &options, &backend, Weak::new())
            .await
            .unwrap();

        assert_eq!(bus.inner.prefix, "tenant1namedbus:jobs");
        bus.destroy().await;
    }

    #[tokio::test]
    async fn test_connected_reports_both_connections() {
        let backend = MemoryBackend::new();
        let bus = EventBus::create("jobs", &BusOptions::default(), &backend, Weak::new())
            .await
            .unwrap();

        assert!(bus.connected().await.unwrap());

        bus.destroy().await;
        assert!(matches!(bus.connected().await, Err(BusError::Destroyed)));
    }
}
