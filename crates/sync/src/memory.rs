//! In-memory engine.
//!
//! Enforces the same acceptance rules as a real engine, keeps a log of the
//! calls it accepted, and delivers events only when told to. Used by the CLI
//! for dry runs and by tests.

use std::collections::{BTreeMap, VecDeque};

use foundation::ids::{LayerId, SourceId};
use layers::{CameraState, DeclarativeSpec, LayerSpec, SourceData, SourceSpec, SpecError};
use serde_json::{Value, json};

use crate::command::{Command, CommandKind};
use crate::engine::{EventSink, MapEngine, NativeEvent, SubscriptionId};
use crate::error::{EngineError, EngineInitError};
use crate::event::{self, camera_payload};
use crate::live::LiveState;

#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: LiveState,
    calls: Vec<Command>,
    refused: u64,
    next_subscription: u64,
    sinks: BTreeMap<SubscriptionId, EventSink>,
    faults: VecDeque<(CommandKind, EngineError)>,
    releases: u32,
}

impl MemoryEngine {
    pub fn new(camera: CameraState) -> Self {
        Self {
            state: LiveState::new(camera),
            ..Self::default()
        }
    }

    /// An engine already holding `spec`, as if it had been applied earlier.
    pub fn with_spec(spec: &DeclarativeSpec) -> Self {
        Self {
            state: LiveState::from_spec(spec),
            ..Self::default()
        }
    }

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    pub fn camera(&self) -> &CameraState {
        self.state.camera()
    }

    pub fn snapshot(&self) -> Result<DeclarativeSpec, SpecError> {
        self.state.to_spec()
    }

    /// Accepted calls, oldest first.
    pub fn calls(&self) -> &[Command] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.calls)
    }

    pub fn refused(&self) -> u64 {
        self.refused
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn release_count(&self) -> u32 {
        self.releases
    }

    pub fn is_released(&self) -> bool {
        self.releases > 0
    }

    /// Makes the next call of `kind` fail with `reason`. Faults queue up.
    pub fn fail_next(&mut self, kind: CommandKind, reason: EngineError) {
        self.faults.push_back((kind, reason));
    }

    pub fn emit(&self, event: NativeEvent) -> usize {
        self.sinks
            .values()
            .filter(|sink| sink.post(event.clone()))
            .count()
    }

    pub fn fire_ready(&self) -> usize {
        self.emit(NativeEvent::bare(event::LOAD))
    }

    /// A gesture: the camera moves on its own and the engine reports it.
    pub fn user_move(&mut self, camera: CameraState) {
        self.state.set_camera(camera);
        let payload = camera_payload(&camera);
        self.emit(NativeEvent::bare(event::MOVE_START));
        self.emit(NativeEvent::new(event::MOVE, payload.clone()));
        self.emit(NativeEvent::new(event::MOVE_END, payload));
    }

    pub fn click(&self, lng: f64, lat: f64, features: Vec<Value>) {
        self.emit(NativeEvent::new(
            event::CLICK,
            json!({"lngLat": {"lng": lng, "lat": lat}, "point": {"x": 0.0, "y": 0.0}, "features": features}),
        ));
    }

    pub fn lose_context(&self) {
        self.emit(NativeEvent::bare(event::CONTEXT_LOST));
    }

    fn run(&mut self, command: Command) -> Result<(), EngineError> {
        if self.releases > 0 {
            self.refused += 1;
            return Err(EngineError::Disposed);
        }
        let kind = command.kind();
        if let Some(at) = self.faults.iter().position(|(k, _)| *k == kind)
            && let Some((_, reason)) = self.faults.remove(at)
        {
            self.refused += 1;
            return Err(reason);
        }
        match self.state.apply(&command) {
            Ok(()) => {
                self.calls.push(command);
                Ok(())
            }
            Err(e) => {
                self.refused += 1;
                Err(e)
            }
        }
    }
}

impl MapEngine for MemoryEngine {
    /// Any non-empty name.
    type Surface = str;

    fn create(surface: &str, camera: &CameraState) -> Result<Self, EngineInitError> {
        if surface.trim().is_empty() {
            return Err(EngineInitError::InvalidSurface(
                "empty surface name".to_string(),
            ));
        }
        if !camera.is_finite() {
            return Err(EngineInitError::Library("non-finite initial camera".to_string()));
        }
        Ok(Self::new(*camera))
    }

    fn add_source(&mut self, source: &SourceSpec) -> Result<(), EngineError> {
        self.run(Command::AddSource {
            source: source.clone(),
        })
    }

    fn remove_source(&mut self, id: &SourceId) -> Result<(), EngineError> {
        self.run(Command::RemoveSource { id: id.clone() })
    }

    fn set_source_data(&mut self, id: &SourceId, data: &SourceData) -> Result<(), EngineError> {
        self.run(Command::SetSourceData {
            id: id.clone(),
            data: data.clone(),
        })
    }

    fn add_layer(&mut self, layer: &LayerSpec, before: Option<&LayerId>) -> Result<(), EngineError> {
        self.run(Command::AddLayer {
            layer: layer.clone(),
            before: before.cloned(),
        })
    }

    fn remove_layer(&mut self, id: &LayerId) -> Result<(), EngineError> {
        self.run(Command::RemoveLayer { id: id.clone() })
    }

    fn move_layer(&mut self, id: &LayerId, before: Option<&LayerId>) -> Result<(), EngineError> {
        self.run(Command::ReorderLayer {
            id: id.clone(),
            before: before.cloned(),
        })
    }

    fn set_paint_property(
        &mut self,
        layer: &LayerId,
        name: &str,
        value: Option<&Value>,
    ) -> Result<(), EngineError> {
        self.run(Command::SetPaintProperty {
            layer: layer.clone(),
            name: name.to_string(),
            value: value.cloned(),
        })
    }

    fn set_layout_property(
        &mut self,
        layer: &LayerId,
        name: &str,
        value: Option<&Value>,
    ) -> Result<(), EngineError> {
        self.run(Command::SetLayoutProperty {
            layer: layer.clone(),
            name: name.to_string(),
            value: value.cloned(),
        })
    }

    fn set_filter(&mut self, layer: &LayerId, filter: Option<&Value>) -> Result<(), EngineError> {
        self.run(Command::SetFilter {
            layer: layer.clone(),
            filter: filter.cloned(),
        })
    }

    fn set_zoom_range(
        &mut self,
        layer: &LayerId,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<(), EngineError> {
        self.run(Command::SetZoomRange {
            layer: layer.clone(),
            min,
            max,
        })
    }

    fn fly_to(&mut self, camera: &CameraState, duration_ms: u32) -> Result<(), EngineError> {
        self.run(Command::FlyTo {
            camera: *camera,
            duration_ms,
        })
    }

    fn jump_to(&mut self, camera: &CameraState) -> Result<(), EngineError> {
        self.run(Command::JumpTo { camera: *camera })
    }

    fn subscribe(&mut self, sink: EventSink) -> Result<SubscriptionId, EngineError> {
        if self.releases > 0 {
            return Err(EngineError::Disposed);
        }
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.sinks.insert(id, sink);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.sinks.remove(&id);
    }

    fn release(&mut self) {
        self.releases += 1;
        self.sinks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryEngine;
    use crate::command::CommandKind;
    use crate::engine::MapEngine;
    use crate::error::{EngineError, EngineInitError};
    use foundation::ids::SourceId;
    use layers::{CameraState, SourceSpec};
    use runtime::Mailbox;
    use serde_json::json;

    #[test]
    fn empty_surface_is_rejected() {
        assert!(matches!(
            MemoryEngine::create("  ", &CameraState::default()),
            Err(EngineInitError::InvalidSurface(_))
        ));
    }

    #[test]
    fn faults_hit_the_matching_kind_once() {
        let mut e = MemoryEngine::new(CameraState::default());
        e.fail_next(CommandKind::AddSource, EngineError::Native("boom".into()));
        let s = SourceSpec::geojson("s", json!({"type": "FeatureCollection", "features": []}));
        assert_eq!(e.add_source(&s), Err(EngineError::Native("boom".into())));
        assert_eq!(e.add_source(&s), Ok(()));
        assert_eq!(e.calls().len(), 1);
        assert_eq!(e.refused(), 1);
    }

    #[test]
    fn released_engine_refuses_calls_and_drops_sinks() {
        let mut e = MemoryEngine::new(CameraState::default());
        let inbox = Mailbox::new();
        e.subscribe(inbox.sender()).unwrap();
        e.release();
        assert_eq!(e.subscriber_count(), 0);
        assert_eq!(e.fire_ready(), 0);
        assert_eq!(
            e.remove_source(&SourceId::new("s")),
            Err(EngineError::Disposed)
        );
    }

    #[test]
    fn user_move_posts_start_move_end() {
        let mut e = MemoryEngine::new(CameraState::default());
        let inbox = Mailbox::new();
        e.subscribe(inbox.sender()).unwrap();
        e.user_move(CameraState::new(1.0, 2.0, 3.0));
        let kinds: Vec<_> = inbox.drain().into_iter().map(|m| m.message.kind).collect();
        assert_eq!(kinds, vec!["movestart", "move", "moveend"]);
        assert_eq!(e.camera(), &CameraState::new(1.0, 2.0, 3.0));
    }
}
