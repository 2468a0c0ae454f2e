//! Ownership of the one engine instance behind a mounted view.

use layers::DeclarativeSpec;
use runtime::PendingQueue;

use crate::command::Command;
use crate::engine::{EventSink, MapEngine, SubscriptionId, execute};
use crate::error::{CommandRejected, EngineError, EngineInitError};

/// What happened to a command handed to [`MapHandle::enqueue_or_run`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Ran,
    Queued,
}

pub struct MapHandle<E: MapEngine> {
    // `None` once destroyed.
    engine: Option<E>,
    ready: bool,
    pending: PendingQueue<Command>,
    subscriptions: Vec<SubscriptionId>,
}

impl<E: MapEngine> std::fmt::Debug for MapHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapHandle")
            .field("alive", &self.engine.is_some())
            .field("ready", &self.ready)
            .field("pending", &self.pending.len())
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl<E: MapEngine> MapHandle<E> {
    /// Starts the engine on `surface` at the initial snapshot's camera. Returns
    /// before the engine is ready.
    pub fn create(
        surface: &E::Surface,
        initial: &DeclarativeSpec,
        max_pending: Option<usize>,
    ) -> Result<Self, EngineInitError> {
        let engine = E::create(surface, initial.camera())?;
        tracing::debug!(camera = ?initial.camera(), "map engine created");
        Ok(Self::from_engine(engine, max_pending))
    }

    /// Takes ownership of an engine that was already created.
    pub fn from_engine(engine: E, max_pending: Option<usize>) -> Self {
        Self {
            engine: Some(engine),
            ready: false,
            pending: max_pending.map_or_else(PendingQueue::new, PendingQueue::with_max_len),
            subscriptions: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_destroyed(&self) -> bool {
        self.engine.is_none()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Command> {
        self.pending.iter()
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    /// Runs `command` now when the engine is ready, otherwise queues it behind
    /// everything queued before.
    pub fn enqueue_or_run(&mut self, command: Command) -> Result<Dispatch, CommandRejected> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(CommandRejected::new(&command, EngineError::Disposed));
        };
        if self.ready {
            return execute(engine, &command)
                .map(|()| Dispatch::Ran)
                .map_err(|reason| CommandRejected::new(&command, reason));
        }
        let (kind, target) = (command.kind(), command.target().to_string());
        match self.pending.try_push(command) {
            Ok(()) => Ok(Dispatch::Queued),
            Err(full) => Err(CommandRejected {
                kind,
                target,
                reason: EngineError::QueueFull(full.max_len),
            }),
        }
    }

    /// Flips to ready and runs every queued command in enqueue order. Later
    /// calls are no-ops returning nothing.
    pub fn mark_ready(&mut self) -> Vec<(Command, Result<(), CommandRejected>)> {
        let Some(engine) = self.engine.as_mut() else {
            return Vec::new();
        };
        if self.ready {
            return Vec::new();
        }
        self.ready = true;
        let queued = self.pending.drain();
        tracing::info!(queued = queued.len(), "map engine ready");
        queued
            .into_iter()
            .map(|command| {
                let result =
                    execute(engine, &command).map_err(|reason| CommandRejected::new(&command, reason));
                (command, result)
            })
            .collect()
    }

    pub fn subscribe(&mut self, sink: EventSink) -> Result<SubscriptionId, EngineError> {
        let engine = self.engine.as_mut().ok_or(EngineError::Disposed)?;
        let id = engine.subscribe(sink)?;
        self.subscriptions.push(id);
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| *s != id);
        if self.subscriptions.len() != before
            && let Some(engine) = self.engine.as_mut()
        {
            engine.unsubscribe(id);
        }
    }

    /// Discards queued commands, removes every listener and frees the engine.
    /// Returns `true` on the call that actually released it.
    pub fn destroy(&mut self) -> bool {
        let Some(mut engine) = self.engine.take() else {
            return false;
        };
        let discarded = self.pending.discard();
        for id in self.subscriptions.drain(..) {
            engine.unsubscribe(id);
        }
        engine.release();
        self.ready = false;
        tracing::info!(discarded, "map engine destroyed");
        true
    }
}

impl<E: MapEngine> Drop for MapHandle<E> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::{Dispatch, MapHandle};
    use crate::command::{Command, CommandKind};
    use crate::error::EngineError;
    use crate::memory::MemoryEngine;
    use foundation::ids::{LayerId, SourceId};
    use layers::{CameraState, DeclarativeSpec, LayerKind, LayerSpec, SourceSpec};
    use runtime::Mailbox;
    use serde_json::json;

    fn handle() -> MapHandle<MemoryEngine> {
        let spec = DeclarativeSpec::empty(CameraState::default()).unwrap();
        MapHandle::create("map", &spec, None).unwrap()
    }

    fn add_source(id: &str) -> Command {
        Command::AddSource {
            source: SourceSpec::geojson(id, json!({"type": "FeatureCollection", "features": []})),
        }
    }

    #[test]
    fn queued_commands_run_in_order_on_ready() {
        let mut h = handle();
        let cmds = vec![
            add_source("a"),
            Command::AddLayer {
                layer: LayerSpec::new("l", "a", LayerKind::Circle),
                before: None,
            },
            add_source("b"),
        ];
        for c in &cmds {
            assert_eq!(h.enqueue_or_run(c.clone()), Ok(Dispatch::Queued));
        }
        assert!(h.engine().unwrap().calls().is_empty());

        let results = h.mark_ready();
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(h.engine().unwrap().calls(), cmds.as_slice());
        assert_eq!(h.pending_len(), 0);

        assert!(h.mark_ready().is_empty());
        assert_eq!(h.enqueue_or_run(add_source("c")), Ok(Dispatch::Ran));
    }

    #[test]
    fn flush_keeps_going_past_a_rejection() {
        let mut h = handle();
        h.enqueue_or_run(Command::RemoveSource {
            id: SourceId::new("ghost"),
        })
        .unwrap();
        h.enqueue_or_run(add_source("a")).unwrap();
        let results = h.mark_ready();
        assert_eq!(results.len(), 2);
        let rejected = results[0].1.as_ref().unwrap_err();
        assert_eq!(rejected.kind, CommandKind::RemoveSource);
        assert_eq!(rejected.reason, EngineError::UnknownSource("ghost".into()));
        assert!(results[1].1.is_ok());
    }

    #[test]
    fn full_queue_rejects() {
        let spec = DeclarativeSpec::empty(CameraState::default()).unwrap();
        let mut h: MapHandle<MemoryEngine> = MapHandle::create("map", &spec, Some(1)).unwrap();
        h.enqueue_or_run(add_source("a")).unwrap();
        let err = h
            .enqueue_or_run(Command::RemoveLayer {
                id: LayerId::new("x"),
            })
            .unwrap_err();
        assert_eq!(err.reason, EngineError::QueueFull(1));
        assert_eq!(err.target, "x");
    }

    #[test]
    fn destroy_releases_once_and_discards_pending() {
        let mut h = handle();
        let inbox = Mailbox::new();
        h.subscribe(inbox.sender()).unwrap();
        h.enqueue_or_run(add_source("a")).unwrap();

        assert!(h.destroy());
        assert!(!h.destroy());
        assert!(h.is_destroyed());
        assert_eq!(h.pending_len(), 0);
        let err = h.enqueue_or_run(add_source("b")).unwrap_err();
        assert_eq!(err.reason, EngineError::Disposed);
    }

    #[test]
    fn invalid_surface_fails_creation() {
        let spec = DeclarativeSpec::empty(CameraState::default()).unwrap();
        assert!(MapHandle::<MemoryEngine>::create("", &spec, None).is_err());
    }
}
