use std::fmt;

use foundation::ids::{LayerId, SourceId};
use layers::{CameraState, LayerSpec, SourceData, SourceSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One imperative mutation of the engine, carrying the minimal payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    AddSource {
        source: SourceSpec,
    },
    RemoveSource {
        id: SourceId,
    },
    /// In-place GeoJSON data swap.
    SetSourceData {
        id: SourceId,
        data: SourceData,
    },
    /// Inserts below `before`, or on top when `before` is `None`.
    AddLayer {
        layer: LayerSpec,
        before: Option<LayerId>,
    },
    RemoveLayer {
        id: LayerId,
    },
    ReorderLayer {
        id: LayerId,
        before: Option<LayerId>,
    },
    /// `value: None` resets the property to its default.
    SetPaintProperty {
        layer: LayerId,
        name: String,
        value: Option<Value>,
    },
    SetLayoutProperty {
        layer: LayerId,
        name: String,
        value: Option<Value>,
    },
    SetFilter {
        layer: LayerId,
        filter: Option<Value>,
    },
    SetZoomRange {
        layer: LayerId,
        min: Option<f64>,
        max: Option<f64>,
    },
    FlyTo {
        camera: CameraState,
        duration_ms: u32,
    },
    JumpTo {
        camera: CameraState,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    AddSource,
    RemoveSource,
    SetSourceData,
    AddLayer,
    RemoveLayer,
    ReorderLayer,
    SetPaintProperty,
    SetLayoutProperty,
    SetFilter,
    SetZoomRange,
    FlyTo,
    JumpTo,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::AddSource => "add_source",
            CommandKind::RemoveSource => "remove_source",
            CommandKind::SetSourceData => "set_source_data",
            CommandKind::AddLayer => "add_layer",
            CommandKind::RemoveLayer => "remove_layer",
            CommandKind::ReorderLayer => "reorder_layer",
            CommandKind::SetPaintProperty => "set_paint_property",
            CommandKind::SetLayoutProperty => "set_layout_property",
            CommandKind::SetFilter => "set_filter",
            CommandKind::SetZoomRange => "set_zoom_range",
            CommandKind::FlyTo => "fly_to",
            CommandKind::JumpTo => "jump_to",
        }
    }

    /// Position of the kind in a reconcile batch. Batches are non-decreasing
    /// in phase: layer removal, source removal, source addition, layer
    /// addition, reordering, property updates, camera.
    pub fn phase(self) -> u8 {
        match self {
            CommandKind::RemoveLayer => 0,
            CommandKind::RemoveSource => 1,
            CommandKind::AddSource | CommandKind::SetSourceData => 2,
            CommandKind::AddLayer => 3,
            CommandKind::ReorderLayer => 4,
            CommandKind::SetPaintProperty
            | CommandKind::SetLayoutProperty
            | CommandKind::SetFilter
            | CommandKind::SetZoomRange => 5,
            CommandKind::FlyTo | CommandKind::JumpTo => 6,
        }
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::AddSource { .. } => CommandKind::AddSource,
            Command::RemoveSource { .. } => CommandKind::RemoveSource,
            Command::SetSourceData { .. } => CommandKind::SetSourceData,
            Command::AddLayer { .. } => CommandKind::AddLayer,
            Command::RemoveLayer { .. } => CommandKind::RemoveLayer,
            Command::ReorderLayer { .. } => CommandKind::ReorderLayer,
            Command::SetPaintProperty { .. } => CommandKind::SetPaintProperty,
            Command::SetLayoutProperty { .. } => CommandKind::SetLayoutProperty,
            Command::SetFilter { .. } => CommandKind::SetFilter,
            Command::SetZoomRange { .. } => CommandKind::SetZoomRange,
            Command::FlyTo { .. } => CommandKind::FlyTo,
            Command::JumpTo { .. } => CommandKind::JumpTo,
        }
    }

    /// The id the command acts on, or `"camera"`.
    pub fn target(&self) -> &str {
        match self {
            Command::AddSource { source } => source.id.as_str(),
            Command::RemoveSource { id } | Command::SetSourceData { id, .. } => id.as_str(),
            Command::AddLayer { layer, .. } => layer.id.as_str(),
            Command::RemoveLayer { id } | Command::ReorderLayer { id, .. } => id.as_str(),
            Command::SetPaintProperty { layer, .. }
            | Command::SetLayoutProperty { layer, .. }
            | Command::SetFilter { layer, .. }
            | Command::SetZoomRange { layer, .. } => layer.as_str(),
            Command::FlyTo { .. } | Command::JumpTo { .. } => "camera",
        }
    }

    pub fn is_camera(&self) -> bool {
        matches!(self, Command::FlyTo { .. } | Command::JumpTo { .. })
    }

    pub fn camera(&self) -> Option<&CameraState> {
        match self {
            Command::FlyTo { camera, .. } | Command::JumpTo { camera } => Some(camera),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetPaintProperty { layer, name, .. }
            | Command::SetLayoutProperty { layer, name, .. } => {
                write!(f, "{} {layer}.{name}", self.kind().as_str())
            }
            Command::AddLayer {
                layer,
                before: Some(before),
            } => write!(f, "add_layer {} before {before}", layer.id),
            Command::ReorderLayer {
                id,
                before: Some(before),
            } => write!(f, "reorder_layer {id} before {before}"),
            _ => write!(f, "{} {}", self.kind().as_str(), self.target()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, CommandKind};
    use foundation::ids::{LayerId, SourceId};
    use layers::CameraState;
    use serde_json::json;

    #[test]
    fn phases_follow_batch_order() {
        let kinds = [
            CommandKind::RemoveLayer,
            CommandKind::RemoveSource,
            CommandKind::AddSource,
            CommandKind::AddLayer,
            CommandKind::ReorderLayer,
            CommandKind::SetPaintProperty,
            CommandKind::JumpTo,
        ];
        let phases: Vec<_> = kinds.iter().map(|k| k.phase()).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted);
    }

    #[test]
    fn target_names_the_mutated_object() {
        let c = Command::RemoveSource {
            id: SourceId::new("s1"),
        };
        assert_eq!(c.target(), "s1");
        let c = Command::JumpTo {
            camera: CameraState::default(),
        };
        assert_eq!(c.target(), "camera");
        assert!(c.is_camera());
    }

    #[test]
    fn serializes_with_op_tag() {
        let c = Command::ReorderLayer {
            id: LayerId::new("roads"),
            before: None,
        };
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            json!({"op": "reorder_layer", "id": "roads", "before": null})
        );
    }

    #[test]
    fn display_is_compact() {
        let c = Command::SetPaintProperty {
            layer: LayerId::new("roads"),
            name: "line-width".to_string(),
            value: Some(json!(3)),
        };
        assert_eq!(c.to_string(), "set_paint_property roads.line-width");
        let c = Command::RemoveLayer {
            id: LayerId::new("roads"),
        };
        assert_eq!(c.to_string(), "remove_layer roads");
    }
}
