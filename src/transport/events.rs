//! Application-facing participant events.
//!
//! Handlers are registered per [`EventKind`] before the transport connects
//! and run on a dedicated dispatcher task, one event at a time, in the order
//! they were registered. A slow handler delays later events but never the
//! native notification thread or subscription bookkeeping.

use crate::client::ParticipantRef;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, trace};

/// The three participant lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Join,
    AudioUpdate,
    Leave,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Join => "on_join",
            EventKind::AudioUpdate => "on_audio_update",
            EventKind::Leave => "on_leave",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A participant lifecycle event, carrying the same arguments as the
/// native notification.
#[derive(Clone)]
pub enum TransportEvent {
    Joined(ParticipantRef),
    AudioUpdated {
        enabled: bool,
        participant: ParticipantRef,
    },
    Left(ParticipantRef),
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::Joined(_) => EventKind::Join,
            TransportEvent::AudioUpdated { .. } => EventKind::AudioUpdate,
            TransportEvent::Left(_) => EventKind::Leave,
        }
    }

    pub fn participant(&self) -> &ParticipantRef {
        match self {
            TransportEvent::Joined(participant)
            | TransportEvent::AudioUpdated { participant, .. }
            | TransportEvent::Left(participant) => participant,
        }
    }

    /// The new audio state, for audio-update events.
    pub fn enabled(&self) -> Option<bool> {
        match self {
            TransportEvent::AudioUpdated { enabled, .. } => Some(*enabled),
            _ => None,
        }
    }
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("TransportEvent");
        out.field("kind", &self.kind())
            .field("participant", &self.participant().id());
        if let Some(enabled) = self.enabled() {
            out.field("enabled", &enabled);
        }
        out.finish()
    }
}

pub type EventHandler = Arc<dyn Fn(TransportEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Typed table of event handlers, fixed once the transport is built.
#[derive(Clone, Default)]
pub struct EventHandlers {
    table: HashMap<EventKind, Vec<EventHandler>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for one event kind.
    pub fn add<F, Fut>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(TransportEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |event| handler(event).boxed());
        self.table.entry(kind).or_default().push(handler);
    }

    #[cfg(test)]
    fn count(&self, kind: EventKind) -> usize {
        self.table.get(&kind).map_or(0, Vec::len)
    }

    async fn dispatch(&self, event: TransportEvent) {
        let kind = event.kind();
        let Some(handlers) = self.table.get(&kind) else {
            trace!(%kind, "no handlers");
            return;
        };

        for (index, handler) in handlers.iter().enumerate() {
            let call = AssertUnwindSafe(|| handler(event.clone()));
            let completed = match std::panic::catch_unwind(call) {
                Ok(future) => AssertUnwindSafe(future).catch_unwind().await.is_ok(),
                Err(_) => false,
            };
            if !completed {
                error!(
                    %kind,
                    handler = index,
                    participant = %event.participant().id(),
                    "event handler panicked"
                );
            }
        }
    }

    /// Start the dispatcher task on `handle`.
    pub(crate) fn spawn(self, handle: &Handle) -> Dispatcher {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Dispatch::Event(event) => self.dispatch(event).await,
                    Dispatch::Flush(done) => {
                        if done.send(()).is_err() {
                            trace!("flush waiter gone");
                        }
                    }
                }
            }
            trace!("event dispatcher stopped");
        });
        Dispatcher { tx }
    }
}

enum Dispatch {
    Event(TransportEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle used by the coordinator to queue events.
pub(crate) struct Dispatcher {
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl Dispatcher {
    /// Queue an event. Never waits for handlers.
    pub(crate) fn emit(&self, event: TransportEvent) {
        if self.tx.send(Dispatch::Event(event)).is_err() {
            trace!("event dispatcher stopped, event dropped");
        }
    }

    /// Signal `done` once every event queued before this call has been handled.
    pub(crate) fn flush(&self, done: oneshot::Sender<()>) {
        if self.tx.send(Dispatch::Flush(done)).is_err() {
            trace!("event dispatcher stopped, flush dropped");
        }
    }
}
