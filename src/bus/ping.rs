//! Liveness probe bookkeeping.
//!
//! Every bus instance carries one probe board. The permanent internal pong
//! handler records each response on the board, which fans it out to the
//! probes currently in flight. Probes have no identity on the wire: when
//! probes overlap on the same bus, a response can be counted by more than
//! one of them. This fire-and-collect behavior is inherent to the protocol;
//! callers needing exact counts must not run probes concurrently.

use std::collections::HashMap;

use tokio::sync::{mpsc, Mutex};

#[derive(Default)]
struct ProbeBoardState {
    next_id: u64,
    active: HashMap<u64, mpsc::UnboundedSender<()>>,
}

/// In-flight probe registry for one bus instance.
#[derive(Default)]
pub(crate) struct ProbeBoard {
    state: Mutex<ProbeBoardState>,
}

impl ProbeBoard {
    /// Register a probe; returns its id and the stream of responses it will
    /// observe while registered.
    pub(crate) async fn register(&self) -> (u64, mpsc::UnboundedReceiver<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.active.insert(id, sender);
        (id, receiver)
    }

    /// Remove a resolved probe.
    pub(crate) async fn unregister(&self, id: u64) {
        self.state.lock().await.active.remove(&id);
    }

    /// Record one pong response, fanning it out to every in-flight probe.
    pub(crate) async fn record_response(&self) {
        let state = self.state.lock().await;
        for sender in state.active.values() {
            // A probe that just resolved may have dropped its receiver.
            let _ = sender.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_responses_reach_every_active_probe() {
        let board = ProbeBoard::default();
        let (first_id, mut first) = board.register().await;
        let (_second_id, mut second) = board.register().await;

        board.record_response().await;

        assert!(first.recv().await.is_some());
        assert!(second.recv().await.is_some());

        board.unregister(first_id).await;
        board.record_response().await;

        assert!(first.recv().await.is_none());
        assert!(second.recv().await.is_some());
    }
}
