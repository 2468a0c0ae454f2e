//! Engine events as the control thread sees them.
//!
//! Native payloads follow the GL JS shapes: camera events carry
//! `center`/`zoom`/`bearing`/`pitch`, clicks carry `lngLat`/`point`/`features`,
//! source events carry `sourceId`/`isSourceLoaded`.

use foundation::ids::SourceId;
use layers::CameraState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::NativeEvent;
use crate::error::EventDispatchError;

pub const LOAD: &str = "load";
pub const MOVE_START: &str = "movestart";
pub const MOVE: &str = "move";
pub const MOVE_END: &str = "moveend";
pub const CLICK: &str = "click";
pub const SOURCE_DATA: &str = "sourcedata";
pub const ERROR: &str = "error";
pub const CONTEXT_LOST: &str = "webglcontextlost";

/// Every native event type the bridge listens to.
pub const NATIVE_KINDS: [&str; 8] = [
    LOAD,
    MOVE_START,
    MOVE,
    MOVE_END,
    CLICK,
    SOURCE_DATA,
    ERROR,
    CONTEXT_LOST,
];

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub lng_lat: LngLat,
    pub point: ScreenPoint,
    /// Rendered features under the cursor, as GeoJSON features.
    pub features: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Ready,
    MoveStart,
    Move { camera: CameraState },
    MoveEnd { camera: CameraState },
    Click(ClickEvent),
    SourceDataLoaded { source: SourceId },
    Error { reason: String },
    ContextLost,
}

impl EngineEvent {
    pub fn camera(&self) -> Option<&CameraState> {
        match self {
            EngineEvent::Move { camera } | EngineEvent::MoveEnd { camera } => Some(camera),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct CameraPayload {
    center: LngLat,
    zoom: f64,
    #[serde(default)]
    bearing: f64,
    #[serde(default)]
    pitch: f64,
}

#[derive(Deserialize)]
struct ClickPayload {
    #[serde(rename = "lngLat")]
    lng_lat: LngLat,
    point: ScreenPoint,
    #[serde(default)]
    features: Vec<Value>,
}

#[derive(Deserialize)]
struct SourceDataPayload {
    #[serde(rename = "sourceId")]
    source_id: Option<String>,
    #[serde(rename = "isSourceLoaded", default)]
    is_source_loaded: bool,
}

fn malformed(kind: &str, reason: impl std::fmt::Display) -> EventDispatchError {
    EventDispatchError::Malformed {
        kind: kind.to_string(),
        reason: reason.to_string(),
    }
}

fn camera_from(kind: &str, payload: &Value) -> Result<CameraState, EventDispatchError> {
    let p: CameraPayload =
        serde_json::from_value(payload.clone()).map_err(|e| malformed(kind, e))?;
    let camera = CameraState::new(p.center.lng, p.center.lat, p.zoom)
        .with_bearing(p.bearing)
        .with_pitch(p.pitch);
    if !camera.is_finite() {
        return Err(malformed(kind, "non-finite camera"));
    }
    Ok(camera)
}

fn error_reason(payload: &Value) -> String {
    let message = payload
        .pointer("/error/message")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str);
    match message {
        Some(m) => m.to_string(),
        None if payload.is_null() => "unknown engine error".to_string(),
        None => payload.to_string(),
    }
}

/// Translates a native event. `Ok(None)` for events that carry nothing worth
/// reporting (source progress before the source finished loading).
pub fn decode(native: &NativeEvent) -> Result<Option<EngineEvent>, EventDispatchError> {
    let kind = native.kind.as_str();
    let event = match kind {
        LOAD => EngineEvent::Ready,
        MOVE_START => EngineEvent::MoveStart,
        MOVE => EngineEvent::Move {
            camera: camera_from(kind, &native.payload)?,
        },
        MOVE_END => EngineEvent::MoveEnd {
            camera: camera_from(kind, &native.payload)?,
        },
        CLICK => {
            let p: ClickPayload =
                serde_json::from_value(native.payload.clone()).map_err(|e| malformed(kind, e))?;
            if !(p.lng_lat.lng.is_finite() && p.lng_lat.lat.is_finite()) {
                return Err(malformed(kind, "non-finite lngLat"));
            }
            EngineEvent::Click(ClickEvent {
                lng_lat: p.lng_lat,
                point: p.point,
                features: p.features,
            })
        }
        SOURCE_DATA => {
            let p: SourceDataPayload =
                serde_json::from_value(native.payload.clone()).map_err(|e| malformed(kind, e))?;
            match p.source_id {
                Some(id) if p.is_source_loaded => EngineEvent::SourceDataLoaded {
                    source: SourceId::new(id),
                },
                _ => return Ok(None),
            }
        }
        ERROR => EngineEvent::Error {
            reason: error_reason(&native.payload),
        },
        CONTEXT_LOST => EngineEvent::ContextLost,
        other => return Err(EventDispatchError::UnknownKind(other.to_string())),
    };
    Ok(Some(event))
}

/// Payload of a camera event, the inverse of what [`decode`] reads.
pub fn camera_payload(camera: &CameraState) -> Value {
    serde_json::json!({
        "center": {"lng": camera.lng, "lat": camera.lat},
        "zoom": camera.zoom,
        "bearing": camera.bearing,
        "pitch": camera.pitch,
    })
}
