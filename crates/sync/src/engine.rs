//! Boundary to the external map engine.
//!
//! The engine library is only reached through [`MapEngine`]; bindings map each
//! method onto the library's `addSource`/`removeLayer`/`moveLayer`/`flyTo`/
//! `on`/`off` calls. Everything the engine reports back arrives as
//! [`NativeEvent`] messages posted to an [`EventSink`].

use foundation::ids::{LayerId, SourceId};
use layers::{CameraState, LayerSpec, SourceData, SourceSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::Command;
use crate::error::{EngineError, EngineInitError};

/// Posting half of the event inbox handed to the engine on subscribe.
pub type EventSink = runtime::Sender<NativeEvent>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// An engine event as the library delivered it: event type name plus the
/// raw payload. Translation to [`crate::EngineEvent`] happens on the control
/// thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeEvent {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl NativeEvent {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn bare(kind: impl Into<String>) -> Self {
        Self::new(kind, Value::Null)
    }
}

pub trait MapEngine {
    /// What the engine renders into (a container element, a window, ...).
    type Surface: ?Sized;

    /// Starts the engine at `camera`. Readiness is signalled later through a
    /// `load` event.
    fn create(surface: &Self::Surface, camera: &CameraState) -> Result<Self, EngineInitError>
    where
        Self: Sized;

    fn add_source(&mut self, source: &SourceSpec) -> Result<(), EngineError>;
    fn remove_source(&mut self, id: &SourceId) -> Result<(), EngineError>;
    fn set_source_data(&mut self, id: &SourceId, data: &SourceData) -> Result<(), EngineError>;

    fn add_layer(&mut self, layer: &LayerSpec, before: Option<&LayerId>)
    -> Result<(), EngineError>;
    fn remove_layer(&mut self, id: &LayerId) -> Result<(), EngineError>;
    fn move_layer(&mut self, id: &LayerId, before: Option<&LayerId>) -> Result<(), EngineError>;

    fn set_paint_property(
        &mut self,
        layer: &LayerId,
        name: &str,
        value: Option<&Value>,
    ) -> Result<(), EngineError>;
    fn set_layout_property(
        &mut self,
        layer: &LayerId,
        name: &str,
        value: Option<&Value>,
    ) -> Result<(), EngineError>;
    fn set_filter(&mut self, layer: &LayerId, filter: Option<&Value>) -> Result<(), EngineError>;
    fn set_zoom_range(
        &mut self,
        layer: &LayerId,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<(), EngineError>;

    fn fly_to(&mut self, camera: &CameraState, duration_ms: u32) -> Result<(), EngineError>;
    fn jump_to(&mut self, camera: &CameraState) -> Result<(), EngineError>;

    /// Registers listeners for every event type, posting into `sink`.
    fn subscribe(&mut self, sink: EventSink) -> Result<SubscriptionId, EngineError>;
    /// Removes the listeners of one subscription. Unknown ids are ignored.
    fn unsubscribe(&mut self, id: SubscriptionId);

    /// Frees the native instance. Called exactly once, by the owning handle.
    fn release(&mut self);
}

/// Runs one command against an engine.
pub fn execute<E: MapEngine + ?Sized>(engine: &mut E, command: &Command) -> Result<(), EngineError> {
    match command {
        Command::AddSource { source } => engine.add_source(source),
        Command::RemoveSource { id } => engine.remove_source(id),
        Command::SetSourceData { id, data } => engine.set_source_data(id, data),
        Command::AddLayer { layer, before } => engine.add_layer(layer, before.as_ref()),
        Command::RemoveLayer { id } => engine.remove_layer(id),
        Command::ReorderLayer { id, before } => engine.move_layer(id, before.as_ref()),
        Command::SetPaintProperty { layer, name, value } => {
            engine.set_paint_property(layer, name, value.as_ref())
        }
        Command::SetLayoutProperty { layer, name, value } => {
            engine.set_layout_property(layer, name, value.as_ref())
        }
        Command::SetFilter { layer, filter } => engine.set_filter(layer, filter.as_ref()),
        Command::SetZoomRange { layer, min, max } => engine.set_zoom_range(layer, *min, *max),
        Command::FlyTo {
            camera,
            duration_ms,
        } => engine.fly_to(camera, *duration_ms),
        Command::JumpTo { camera } => engine.jump_to(camera),
    }
}
