//! Immutable snapshots of what the map should show.
//!
//! A [`DeclarativeSpec`] is produced by the UI on every state change and never
//! mutated afterwards; the only way to get one is through validation, so every
//! snapshot in circulation satisfies:
//! - source ids and layer ids are unique,
//! - every layer references a source of the same snapshot,
//! - `layer.order` equals the layer's index,
//! - the camera is finite.

use std::collections::{BTreeMap, BTreeSet};

use foundation::ids::{LayerId, SourceId};
use serde::{Deserialize, Serialize};

use crate::camera::CameraState;
use crate::error::SpecError;
use crate::layer::{LayerSpec, ORDER_UNASSIGNED};
use crate::source::SourceSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotRepr", into = "SnapshotRepr")]
pub struct DeclarativeSpec {
    camera: CameraState,
    sources: BTreeMap<SourceId, SourceSpec>,
    layers: Vec<LayerSpec>,
}

/// Serialized form: sources as a list, layer order implied by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotRepr {
    camera: CameraState,
    #[serde(default)]
    sources: Vec<SourceSpec>,
    #[serde(default)]
    layers: Vec<LayerSpec>,
}

impl TryFrom<SnapshotRepr> for DeclarativeSpec {
    type Error = SpecError;

    fn try_from(repr: SnapshotRepr) -> Result<Self, Self::Error> {
        DeclarativeSpec::new(repr.camera, repr.sources, repr.layers)
    }
}

impl From<DeclarativeSpec> for SnapshotRepr {
    fn from(spec: DeclarativeSpec) -> Self {
        SnapshotRepr {
            camera: spec.camera,
            sources: spec.sources.into_values().collect(),
            layers: spec.layers,
        }
    }
}

impl DeclarativeSpec {
    /// Validates and builds a snapshot.
    ///
    /// Layers with an unassigned order take their index; an explicit order
    /// must match the index.
    pub fn new(
        camera: CameraState,
        sources: Vec<SourceSpec>,
        mut layers: Vec<LayerSpec>,
    ) -> Result<Self, SpecError> {
        if !camera.is_finite() {
            return Err(SpecError::NonFiniteCamera);
        }

        let mut by_id = BTreeMap::new();
        for source in sources {
            source
                .check()
                .map_err(|reason| SpecError::InvalidSource {
                    source: source.id.clone(),
                    reason,
                })?;
            let id = source.id.clone();
            if by_id.insert(id.clone(), source).is_some() {
                return Err(SpecError::DuplicateSource(id));
            }
        }

        let mut seen = BTreeSet::new();
        for (index, layer) in layers.iter_mut().enumerate() {
            let index = u32::try_from(index).unwrap_or(ORDER_UNASSIGNED - 1);
            if !seen.insert(layer.id.clone()) {
                return Err(SpecError::DuplicateLayer(layer.id.clone()));
            }
            if !by_id.contains_key(&layer.source) {
                return Err(SpecError::MissingSource {
                    layer: layer.id.clone(),
                    source: layer.source.clone(),
                });
            }
            if !layer.zoom_range_valid() {
                return Err(SpecError::InvalidZoomRange(layer.id.clone()));
            }
            if layer.order == ORDER_UNASSIGNED {
                layer.order = index;
            } else if layer.order != index {
                return Err(SpecError::OrderMismatch {
                    layer: layer.id.clone(),
                    expected: index,
                    found: layer.order,
                });
            }
        }

        Ok(Self {
            camera,
            sources: by_id,
            layers,
        })
    }

    /// A snapshot with no sources or layers.
    pub fn empty(camera: CameraState) -> Result<Self, SpecError> {
        Self::new(camera, Vec::new(), Vec::new())
    }

    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        serde_json::from_str(json).map_err(|e| SpecError::Json(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, SpecError> {
        serde_json::to_string(self).map_err(|e| SpecError::Json(e.to_string()))
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    /// Sources in id order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceSpec> {
        self.sources.values()
    }

    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    /// Layers bottom to top.
    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id.as_str() == id)
    }

    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|l| l.id.clone()).collect()
    }

    /// A new snapshot with the same content and a different camera.
    pub fn with_camera(&self, camera: CameraState) -> Result<Self, SpecError> {
        if !camera.is_finite() {
            return Err(SpecError::NonFiniteCamera);
        }
        Ok(Self {
            camera,
            ..self.clone()
        })
    }
}

/// Incremental construction of a [`DeclarativeSpec`]. Layer order follows the
/// order of `layer` calls.
#[derive(Debug, Clone, Default)]
pub struct SpecBuilder {
    camera: CameraState,
    sources: Vec<SourceSpec>,
    layers: Vec<LayerSpec>,
}

impl SpecBuilder {
    pub fn new(camera: CameraState) -> Self {
        Self {
            camera,
            ..Self::default()
        }
    }

    pub fn source(mut self, source: SourceSpec) -> Self {
        self.sources.push(source);
        self
    }

    pub fn layer(mut self, mut layer: LayerSpec) -> Self {
        layer.order = ORDER_UNASSIGNED;
        self.layers.push(layer);
        self
    }

    pub fn build(self) -> Result<DeclarativeSpec, SpecError> {
        DeclarativeSpec::new(self.camera, self.sources, self.layers)
    }
}
