//! Per-subscriber subscription sessions

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{BusInner, Event};

/// Lifecycle of a subscription session.
///
/// `Active → Draining → Closed` on voluntary unsubscribe; `Active → Closed`
/// directly on buffer overflow or bus shutdown, discarding anything still
/// buffered. `Closed` is terminal: a session cannot be reopened, and a
/// subscriber that comes back will not see events missed in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Draining,
    Closed,
}

/// One subscriber's lazy cursor over a topic
pub struct SubscriptionSession {
    bus: Arc<BusInner>,
    topic: String,
    id: Uuid,
    rx: mpsc::Receiver<Event>,
    kicked: Arc<AtomicBool>,
    state: SessionState,
}

impl SubscriptionSession {
    pub(crate) fn new(
        bus: Arc<BusInner>,
        topic: String,
        id: Uuid,
        rx: mpsc::Receiver<Event>,
        kicked: Arc<AtomicBool>,
    ) -> Self {
        let state = if kicked.load(Ordering::SeqCst) {
            SessionState::Closed
        } else {
            SessionState::Active
        };
        Self {
            bus,
            topic,
            id,
            rx,
            kicked,
            state,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Topic this session is registered on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Yield the next event, or `None` once the session is closed.
    ///
    /// While `Active` this suspends until an event arrives. After
    /// [`unsubscribe`](Self::unsubscribe) it delivers what was already
    /// buffered and then closes. A force-disconnect (overflow, shutdown)
    /// closes immediately, discarding the buffer.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            if self.kicked.load(Ordering::SeqCst) {
                self.close();
                return None;
            }

            match self.state {
                SessionState::Closed => return None,
                SessionState::Active => match self.rx.recv().await {
                    Some(event) => {
                        // The kick may have landed while we were suspended;
                        // buffered events are discarded in that case.
                        if self.kicked.load(Ordering::SeqCst) {
                            self.close();
                            return None;
                        }
                        return Some(event);
                    }
                    None => {
                        self.close();
                        return None;
                    }
                },
                SessionState::Draining => match self.rx.try_recv() {
                    Ok(event) => return Some(event),
                    Err(mpsc::error::TryRecvError::Empty)
                    | Err(mpsc::error::TryRecvError::Disconnected) => {
                        self.close();
                        return None;
                    }
                },
            }
        }
    }

    /// Deregister from the bus. Events already buffered are still delivered
    /// by subsequent [`next_event`](Self::next_event) calls; events
    /// published after this returns are not.
    pub fn unsubscribe(&mut self) {
        if self.state == SessionState::Active {
            self.bus.deregister(&self.topic, self.id);
            self.state = SessionState::Draining;
            debug!(topic = %self.topic, subscriber = %self.id, "session draining");
        }
    }

    fn close(&mut self) {
        if self.state != SessionState::Closed {
            self.state = SessionState::Closed;
            self.rx.close();
            debug!(topic = %self.topic, subscriber = %self.id, "session closed");
        }
    }
}

impl Drop for SubscriptionSession {
    fn drop(&mut self) {
        // Disconnecting releases the registration and, with it, the buffer.
        if self.state == SessionState::Active {
            self.bus.deregister(&self.topic, self.id);
        }
    }
}
