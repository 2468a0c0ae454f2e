//! Model of the engine's live object graph.
//!
//! `LiveState` applies commands with the same acceptance rules real engines
//! enforce (unique ids, layers need their source, sources in use cannot be
//! removed). The reconciler keeps one as its memory of what the engine holds,
//! and [`crate::MemoryEngine`] uses one as its entire state.

use std::collections::BTreeMap;

use foundation::ids::{LayerId, SourceId};
use layers::{CameraState, DeclarativeSpec, LayerSpec, ORDER_UNASSIGNED, SourceSpec, SpecError, VISIBILITY};
use serde_json::Value;

use crate::command::Command;
use crate::error::EngineError;

/// Read access shared by snapshots and live state, so one diff routine can
/// compare either against a desired snapshot.
pub(crate) trait Structure {
    fn source_spec(&self, id: &str) -> Option<&SourceSpec>;
    fn source_specs(&self) -> Vec<&SourceSpec>;
    fn layer_specs(&self) -> &[LayerSpec];
}

impl Structure for DeclarativeSpec {
    fn source_spec(&self, id: &str) -> Option<&SourceSpec> {
        self.source(id)
    }

    fn source_specs(&self) -> Vec<&SourceSpec> {
        self.sources().collect()
    }

    fn layer_specs(&self) -> &[LayerSpec] {
        self.layers()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveState {
    camera: CameraState,
    sources: BTreeMap<SourceId, SourceSpec>,
    // Bottom to top. Layouts are stored as the engine sees them, with
    // visibility folded in.
    layers: Vec<LayerSpec>,
}

impl Structure for LiveState {
    fn source_spec(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    fn source_specs(&self) -> Vec<&SourceSpec> {
        self.sources.values().collect()
    }

    fn layer_specs(&self) -> &[LayerSpec] {
        &self.layers
    }
}

fn normalized(layer: &LayerSpec) -> LayerSpec {
    let mut out = layer.clone();
    out.layout = layer.effective_layout();
    out.visible = !is_hidden(&out);
    out
}

fn is_hidden(layer: &LayerSpec) -> bool {
    layer.layout.get(VISIBILITY).and_then(Value::as_str) == Some("none")
}

impl LiveState {
    pub fn new(camera: CameraState) -> Self {
        Self {
            camera,
            ..Self::default()
        }
    }

    pub fn from_spec(spec: &DeclarativeSpec) -> Self {
        Self {
            camera: *spec.camera(),
            sources: spec.sources().map(|s| (s.id.clone(), s.clone())).collect(),
            layers: spec.layers().iter().map(normalized).collect(),
        }
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn set_camera(&mut self, camera: CameraState) {
        self.camera = camera;
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceSpec> {
        self.sources.values()
    }

    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id.as_str() == id)
    }

    pub fn layer_ids(&self) -> Vec<&LayerId> {
        self.layers.iter().map(|l| &l.id).collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.id.as_str() == id)
    }

    fn layer_mut(&mut self, id: &LayerId) -> Result<&mut LayerSpec, EngineError> {
        self.layers
            .iter_mut()
            .find(|l| &l.id == id)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))
    }

    fn insert_position(&self, before: Option<&LayerId>) -> Result<usize, EngineError> {
        match before {
            None => Ok(self.layers.len()),
            Some(b) => self
                .position(b.as_str())
                .ok_or_else(|| EngineError::UnknownLayer(b.to_string())),
        }
    }

    /// Applies one command, or leaves the state untouched and reports why the
    /// engine would refuse it.
    pub fn apply(&mut self, command: &Command) -> Result<(), EngineError> {
        match command {
            Command::AddSource { source } => {
                if self.sources.contains_key(&source.id) {
                    return Err(EngineError::DuplicateId(source.id.to_string()));
                }
                self.sources.insert(source.id.clone(), source.clone());
            }
            Command::RemoveSource { id } => {
                if !self.sources.contains_key(id) {
                    return Err(EngineError::UnknownSource(id.to_string()));
                }
                if let Some(user) = self.layers.iter().find(|l| &l.source == id) {
                    return Err(EngineError::SourceInUse {
                        source: id.to_string(),
                        layer: user.id.to_string(),
                    });
                }
                self.sources.remove(id);
            }
            Command::SetSourceData { id, data } => {
                let source = self
                    .sources
                    .get_mut(id)
                    .ok_or_else(|| EngineError::UnknownSource(id.to_string()))?;
                source.data = data.clone();
            }
            Command::AddLayer { layer, before } => {
                if self.position(layer.id.as_str()).is_some() {
                    return Err(EngineError::DuplicateId(layer.id.to_string()));
                }
                if !self.sources.contains_key(&layer.source) {
                    return Err(EngineError::UnknownSource(layer.source.to_string()));
                }
                let at = self.insert_position(before.as_ref())?;
                self.layers.insert(at, normalized(layer));
            }
            Command::RemoveLayer { id } => {
                let at = self
                    .position(id.as_str())
                    .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))?;
                self.layers.remove(at);
            }
            Command::ReorderLayer { id, before } => {
                let from = self
                    .position(id.as_str())
                    .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))?;
                if before.as_ref() == Some(id) {
                    return Ok(());
                }
                // Validate the anchor before touching the list.
                self.insert_position(before.as_ref())?;
                let layer = self.layers.remove(from);
                let at = self.insert_position(before.as_ref())?;
                self.layers.insert(at, layer);
            }
            Command::SetPaintProperty { layer, name, value } => {
                let l = self.layer_mut(layer)?;
                match value {
                    Some(v) => l.paint.insert(name.clone(), v.clone()),
                    None => l.paint.remove(name),
                };
            }
            Command::SetLayoutProperty { layer, name, value } => {
                let l = self.layer_mut(layer)?;
                match value {
                    Some(v) => l.layout.insert(name.clone(), v.clone()),
                    None => l.layout.remove(name),
                };
                l.visible = !is_hidden(l);
            }
            Command::SetFilter { layer, filter } => {
                self.layer_mut(layer)?.filter = filter.clone();
            }
            Command::SetZoomRange { layer, min, max } => {
                let l = self.layer_mut(layer)?;
                l.min_zoom = *min;
                l.max_zoom = *max;
            }
            Command::FlyTo { camera, .. } | Command::JumpTo { camera } => {
                self.camera = *camera;
            }
        }
        Ok(())
    }

    /// Drops a source from the model together with every layer using it.
    pub fn forget_source(&mut self, id: &str) {
        self.layers.retain(|l| l.source.as_str() != id);
        self.sources.remove(id);
    }

    pub fn forget_layer(&mut self, id: &str) {
        self.layers.retain(|l| l.id.as_str() != id);
    }

    /// Whether sources, layer order and layer styling equal `spec`'s.
    pub fn matches_structure(&self, spec: &DeclarativeSpec) -> bool {
        let sources_match = self.sources.len() == spec.sources().count()
            && spec
                .sources()
                .all(|s| self.sources.get(&s.id) == Some(s));
        sources_match
            && self.layers.len() == spec.layers().len()
            && self
                .layers
                .iter()
                .zip(spec.layers())
                .all(|(live, want)| same_layer(live, want))
    }

    /// Structure plus camera.
    pub fn matches(&self, spec: &DeclarativeSpec) -> bool {
        self.matches_structure(spec) && self.camera.same_view(spec.camera())
    }

    /// The live state as a snapshot.
    pub fn to_spec(&self) -> Result<DeclarativeSpec, SpecError> {
        let layers = self
            .layers
            .iter()
            .map(|l| {
                let mut l = l.clone();
                if !l.visible {
                    l.layout.remove(VISIBILITY);
                }
                l.order = ORDER_UNASSIGNED;
                l
            })
            .collect();
        DeclarativeSpec::new(self.camera, self.sources.values().cloned().collect(), layers)
    }
}

pub(crate) fn same_layer(a: &LayerSpec, b: &LayerSpec) -> bool {
    a.id == b.id
        && !a.needs_recreate(b)
        && a.paint == b.paint
        && a.effective_layout() == b.effective_layout()
        && a.filter == b.filter
        && a.min_zoom == b.min_zoom
        && a.max_zoom == b.max_zoom
}
