//! Engine events in, viewport writes and UI callbacks out.
//!
//! The engine only ever posts into the bridge's mailbox; nothing runs inside
//! the engine's callback. [`EventBridge::dispatch`] drains the mailbox on the
//! control thread in posting order.

use runtime::Mailbox;

use crate::engine::{MapEngine, NativeEvent, SubscriptionId};
use crate::error::{EngineError, EventDispatchError};
use crate::event::{EngineEvent, decode};
use crate::handle::MapHandle;
use crate::metrics::SyncMetrics;
use crate::viewport::{Origin, ViewportStore};

type Callback = Box<dyn FnMut(&EngineEvent)>;

pub struct EventBridge {
    inbox: Mailbox<NativeEvent>,
    subscription: Option<SubscriptionId>,
    callbacks: Vec<Callback>,
}

impl std::fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("subscription", &self.subscription)
            .field("backlog", &self.inbox.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBridge {
    pub fn new() -> Self {
        Self {
            inbox: Mailbox::new(),
            subscription: None,
            callbacks: Vec::new(),
        }
    }

    /// Registers the bridge's listeners with the engine behind `handle`;
    /// `on_event` sees every translated event.
    pub fn subscribe<E: MapEngine>(
        &mut self,
        handle: &mut MapHandle<E>,
        on_event: impl FnMut(&EngineEvent) + 'static,
    ) -> Result<SubscriptionId, EngineError> {
        if let Some(id) = self.subscription {
            self.callbacks.push(Box::new(on_event));
            return Ok(id);
        }
        if self.inbox.is_closed() {
            self.inbox = Mailbox::new();
        }
        let id = handle.subscribe(self.inbox.sender())?;
        self.subscription = Some(id);
        self.callbacks.push(Box::new(on_event));
        Ok(id)
    }

    /// Adds a callback without touching the engine subscription.
    pub fn add_callback(&mut self, on_event: impl FnMut(&EngineEvent) + 'static) {
        self.callbacks.push(Box::new(on_event));
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Removes the engine listeners and drops anything still in the mailbox.
    /// Events the engine posts afterwards are refused at the mailbox.
    pub fn unsubscribe<E: MapEngine>(&mut self, handle: &mut MapHandle<E>) {
        if let Some(id) = self.subscription.take() {
            handle.unsubscribe(id);
        }
        let dropped = self.inbox.close();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded undelivered engine events");
        }
        self.callbacks.clear();
    }

    pub fn backlog(&self) -> usize {
        self.inbox.len()
    }

    /// Drains the mailbox: decodes each event, writes engine camera motion
    /// into `viewport` as a user write, then runs the callbacks. Returns the
    /// translated events in order.
    pub fn dispatch(
        &mut self,
        viewport: &mut ViewportStore,
        metrics: &mut SyncMetrics,
    ) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        for envelope in self.inbox.drain() {
            let event = match decode(&envelope.message) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    report_dropped(envelope.seq, &e);
                    metrics.events_dropped += 1;
                    continue;
                }
            };
            if let Some(camera) = event.camera() {
                viewport.set(*camera, Origin::User);
                metrics.camera_writes_user += 1;
            }
            for callback in &mut self.callbacks {
                callback(&event);
            }
            metrics.events_dispatched += 1;
            out.push(event);
        }
        out
    }
}

fn report_dropped(seq: u64, error: &EventDispatchError) {
    tracing::warn!(seq, error = %error, "dropped engine event");
}
