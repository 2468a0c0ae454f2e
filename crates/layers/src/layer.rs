use foundation::ids::{LayerId, SourceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::symbology::PropertyMap;

/// Layout property engines use for layer visibility.
pub const VISIBILITY: &str = "visibility";

/// Marker for layers whose `order` was not given in serialized input; the
/// snapshot assigns the layer's index when it is validated.
pub const ORDER_UNASSIGNED: u32 = u32::MAX;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Fill,
    Line,
    Circle,
    Symbol,
    Raster,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Fill => "fill",
            LayerKind::Line => "line",
            LayerKind::Circle => "circle",
            LayerKind::Symbol => "symbol",
            LayerKind::Raster => "raster",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: LayerId,
    pub source: SourceId,
    pub kind: LayerKind,
    /// Layer name inside a vector tile source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(default)]
    pub paint: PropertyMap,
    #[serde(default)]
    pub layout: PropertyMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    /// Position in the snapshot's layer list, bottom first.
    #[serde(default = "unassigned_order")]
    pub order: u32,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn unassigned_order() -> u32 {
    ORDER_UNASSIGNED
}

fn default_visible() -> bool {
    true
}

impl LayerSpec {
    pub fn new(id: impl Into<LayerId>, source: impl Into<SourceId>, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            kind,
            source_layer: None,
            paint: PropertyMap::new(),
            layout: PropertyMap::new(),
            filter: None,
            min_zoom: None,
            max_zoom: None,
            order: ORDER_UNASSIGNED,
            visible: true,
        }
    }

    pub fn paint(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.paint.insert(name, value);
        self
    }

    pub fn layout(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.layout.insert(name, value);
        self
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn source_layer(mut self, name: impl Into<String>) -> Self {
        self.source_layer = Some(name.into());
        self
    }

    pub fn zoom_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_zoom = min;
        self.max_zoom = max;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Layout as the engine sees it: `visible` folded into `visibility`.
    pub fn effective_layout(&self) -> PropertyMap {
        let mut layout = self.layout.clone();
        if self.visible {
            // "visible" is the engine default; only spell it out when the
            // caller did.
            if layout.contains(VISIBILITY) {
                layout.insert(VISIBILITY, "visible");
            }
        } else {
            layout.insert(VISIBILITY, "none");
        }
        layout
    }

    /// Whether replacing `self` by `other` needs the layer to be recreated
    /// rather than updated property by property.
    pub fn needs_recreate(&self, other: &Self) -> bool {
        self.source != other.source
            || self.kind != other.kind
            || self.source_layer != other.source_layer
    }

    pub fn zoom_range_valid(&self) -> bool {
        let finite = |z: Option<f64>| z.is_none_or(|z| z.is_finite() && z >= 0.0);
        if !finite(self.min_zoom) || !finite(self.max_zoom) {
            return false;
        }
        match (self.min_zoom, self.max_zoom) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        }
    }
}
