//! [`MapEngine`] over a MapLibre GL / Mapbox GL `Map` living in the page.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use foundation::ids::{LayerId, SourceId};
use layers::style::{layer_json, source_json};
use layers::{CameraState, LayerSpec, SourceData, SourceSpec};
use serde_json::Value;
use sync::event::NATIVE_KINDS;
use sync::{EngineError, EngineInitError, EventSink, MapEngine, NativeEvent, SubscriptionId};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

#[wasm_bindgen(inline_js = "
function __mapsync_gl() {
    const gl = globalThis.maplibregl || globalThis.mapboxgl;
    if (!gl) {
        throw new Error('map library not loaded: expected a maplibregl or mapboxgl global');
    }
    return gl;
}

function __mapsync_fail(name, message, extra) {
    const err = new Error(message);
    err.name = name;
    if (extra) Object.assign(err, extra);
    throw err;
}

function __mapsync_need_layer(map, id) {
    if (!map.getLayer(id)) __mapsync_fail('UnknownLayer', `no layer ${id}`, { target: id });
}

function __mapsync_camera(map) {
    const c = map.getCenter();
    return {
        center: { lng: c.lng, lat: c.lat },
        zoom: map.getZoom(),
        bearing: map.getBearing(),
        pitch: map.getPitch(),
    };
}

function __mapsync_payload(map, kind, e) {
    switch (kind) {
        case 'move':
        case 'moveend':
            return __mapsync_camera(map);
        case 'click': {
            const features = map.queryRenderedFeatures(e.point).map((f) => ({
                type: 'Feature',
                id: f.id,
                geometry: f.geometry,
                properties: f.properties,
                layer: f.layer ? f.layer.id : null,
            }));
            return {
                lngLat: { lng: e.lngLat.lng, lat: e.lngLat.lat },
                point: { x: e.point.x, y: e.point.y },
                features,
            };
        }
        case 'sourcedata':
            return { sourceId: e.sourceId ?? null, isSourceLoaded: !!e.isSourceLoaded };
        case 'error': {
            const inner = e && e.error;
            return { error: { message: inner && inner.message ? inner.message : String(inner ?? 'unknown error') } };
        }
        default:
            return null;
    }
}

export function mapsync_create(container, camera) {
    const gl = __mapsync_gl();
    if (!document.getElementById(container)) {
        __mapsync_fail('InvalidSurface', `no element with id ${container}`);
    }
    const c = JSON.parse(camera);
    return new gl.Map({
        container,
        center: [c.lng, c.lat],
        zoom: c.zoom,
        bearing: c.bearing ?? 0,
        pitch: c.pitch ?? 0,
        style: { version: 8, sources: {}, layers: [] },
    });
}

export function mapsync_add_source(map, id, source) {
    if (map.getSource(id)) __mapsync_fail('DuplicateId', `source ${id} exists`, { target: id });
    map.addSource(id, JSON.parse(source));
}

export function mapsync_remove_source(map, id) {
    if (!map.getSource(id)) __mapsync_fail('UnknownSource', `no source ${id}`, { target: id });
    const user = map.getStyle().layers.find((l) => l.source === id);
    if (user) {
        __mapsync_fail('SourceInUse', `source ${id} used by ${user.id}`, { target: id, layer: user.id });
    }
    map.removeSource(id);
}

export function mapsync_set_source_data(map, id, data) {
    const source = map.getSource(id);
    if (!source) __mapsync_fail('UnknownSource', `no source ${id}`, { target: id });
    if (typeof source.setData !== 'function') {
        throw new Error(`source ${id} does not take data updates`);
    }
    source.setData(JSON.parse(data));
}

export function mapsync_add_layer(map, layer, before) {
    const spec = JSON.parse(layer);
    if (map.getLayer(spec.id)) __mapsync_fail('DuplicateId', `layer ${spec.id} exists`, { target: spec.id });
    if (!map.getSource(spec.source)) {
        __mapsync_fail('UnknownSource', `no source ${spec.source}`, { target: spec.source });
    }
    if (before !== undefined) __mapsync_need_layer(map, before);
    map.addLayer(spec, before);
}

export function mapsync_remove_layer(map, id) {
    __mapsync_need_layer(map, id);
    map.removeLayer(id);
}

export function mapsync_move_layer(map, id, before) {
    __mapsync_need_layer(map, id);
    if (before !== undefined) __mapsync_need_layer(map, before);
    map.moveLayer(id, before);
}

export function mapsync_set_paint(map, layer, name, value) {
    __mapsync_need_layer(map, layer);
    map.setPaintProperty(layer, name, value === undefined ? undefined : JSON.parse(value));
}

export function mapsync_set_layout(map, layer, name, value) {
    __mapsync_need_layer(map, layer);
    map.setLayoutProperty(layer, name, value === undefined ? undefined : JSON.parse(value));
}

export function mapsync_set_filter(map, layer, filter) {
    __mapsync_need_layer(map, layer);
    map.setFilter(layer, filter === undefined ? null : JSON.parse(filter));
}

export function mapsync_set_zoom_range(map, layer, min, max) {
    __mapsync_need_layer(map, layer);
    map.setLayerZoomRange(layer, min ?? 0, max ?? 24);
}

export function mapsync_fly_to(map, camera, duration) {
    const c = JSON.parse(camera);
    map.flyTo({ center: [c.lng, c.lat], zoom: c.zoom, bearing: c.bearing, pitch: c.pitch, duration });
}

export function mapsync_jump_to(map, camera) {
    const c = JSON.parse(camera);
    map.jumpTo({ center: [c.lng, c.lat], zoom: c.zoom, bearing: c.bearing, pitch: c.pitch });
}

export function mapsync_on(map, kinds, handler) {
    return JSON.parse(kinds).map((kind) => {
        const listener = (e) => {
            let payload;
            try {
                payload = __mapsync_payload(map, kind, e);
            } catch (err) {
                payload = { unreadable: String(err) };
            }
            handler(kind, JSON.stringify(payload));
        };
        map.on(kind, listener);
        return [kind, listener];
    });
}

export function mapsync_off(map, listeners) {
    for (const [kind, listener] of listeners) map.off(kind, listener);
}

export function mapsync_remove(map) {
    map.remove();
}
")]
extern "C" {
    #[wasm_bindgen(catch)]
    fn mapsync_create(container: &str, camera: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_add_source(map: &JsValue, id: &str, source: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_remove_source(map: &JsValue, id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_set_source_data(map: &JsValue, id: &str, data: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_add_layer(map: &JsValue, layer: &str, before: Option<&str>) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_remove_layer(map: &JsValue, id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_move_layer(map: &JsValue, id: &str, before: Option<&str>) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_set_paint(
        map: &JsValue,
        layer: &str,
        name: &str,
        value: Option<String>,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_set_layout(
        map: &JsValue,
        layer: &str,
        name: &str,
        value: Option<String>,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_set_filter(map: &JsValue, layer: &str, filter: Option<String>) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_set_zoom_range(
        map: &JsValue,
        layer: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_fly_to(map: &JsValue, camera: &str, duration: u32) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_jump_to(map: &JsValue, camera: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    fn mapsync_on(
        map: &JsValue,
        kinds: &str,
        handler: &Closure<dyn FnMut(String, String)>,
    ) -> Result<JsValue, JsValue>;

    fn mapsync_off(map: &JsValue, listeners: &JsValue);

    fn mapsync_remove(map: &JsValue);
}

type Waker = Rc<RefCell<Option<Box<dyn Fn()>>>>;

struct Listeners {
    token: JsValue,
    // Dropped only after `mapsync_off` detached it.
    _handler: Closure<dyn FnMut(String, String)>,
}

/// A GL JS map. The surface is the id of the container element.
pub struct GlMap {
    map: JsValue,
    listeners: BTreeMap<SubscriptionId, Listeners>,
    next_subscription: u64,
    waker: Waker,
    released: bool,
}

impl std::fmt::Debug for GlMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlMap")
            .field("listeners", &self.listeners.len())
            .field("released", &self.released)
            .finish()
    }
}

impl GlMap {
    /// Runs `wake` after each event posted by this map's listeners.
    pub fn set_waker(&mut self, wake: impl Fn() + 'static) {
        *self.waker.borrow_mut() = Some(Box::new(wake));
    }

    fn live(&self) -> Result<&JsValue, EngineError> {
        if self.released {
            return Err(EngineError::Disposed);
        }
        Ok(&self.map)
    }
}

fn js_message(value: &JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

fn js_field(value: &JsValue, name: &str) -> Option<String> {
    js_sys::Reflect::get(value, &JsValue::from_str(name))
        .ok()
        .and_then(|v| v.as_string())
}

/// Maps an exception thrown by the glue into the engine error it stands for.
fn engine_error(value: JsValue) -> EngineError {
    let name = value
        .dyn_ref::<js_sys::Error>()
        .map(|e| String::from(e.name()))
        .unwrap_or_default();
    let target = js_field(&value, "target");
    match (name.as_str(), target) {
        ("DuplicateId", Some(id)) => EngineError::DuplicateId(id),
        ("UnknownSource", Some(id)) => EngineError::UnknownSource(id),
        ("UnknownLayer", Some(id)) => EngineError::UnknownLayer(id),
        ("SourceInUse", Some(source)) => EngineError::SourceInUse {
            source,
            layer: js_field(&value, "layer").unwrap_or_default(),
        },
        _ => EngineError::Native(js_message(&value)),
    }
}

fn init_error(value: JsValue) -> EngineInitError {
    let message = js_message(&value);
    let name = value
        .dyn_ref::<js_sys::Error>()
        .map(|e| String::from(e.name()))
        .unwrap_or_default();
    if name == "InvalidSurface" {
        EngineInitError::InvalidSurface(message)
    } else if message.contains("WebGL") {
        EngineInitError::ContextUnavailable(message)
    } else {
        EngineInitError::Library(message)
    }
}

fn to_json(value: &impl serde::Serialize) -> Result<String, EngineError> {
    serde_json::to_string(value).map_err(|e| EngineError::Native(e.to_string()))
}

impl MapEngine for GlMap {
    type Surface = str;

    fn create(container: &str, camera: &CameraState) -> Result<Self, EngineInitError> {
        if container.trim().is_empty() {
            return Err(EngineInitError::InvalidSurface(
                "empty container id".to_string(),
            ));
        }
        let camera = serde_json::to_string(camera)
            .map_err(|e| EngineInitError::Library(e.to_string()))?;
        let map = mapsync_create(container, &camera).map_err(init_error)?;
        Ok(Self {
            map,
            listeners: BTreeMap::new(),
            next_subscription: 1,
            waker: Rc::new(RefCell::new(None)),
            released: false,
        })
    }

    fn add_source(&mut self, source: &SourceSpec) -> Result<(), EngineError> {
        let body = to_json(&source_json(source))?;
        mapsync_add_source(self.live()?, source.id.as_str(), &body).map_err(engine_error)
    }

    fn remove_source(&mut self, id: &SourceId) -> Result<(), EngineError> {
        mapsync_remove_source(self.live()?, id.as_str()).map_err(engine_error)
    }

    fn set_source_data(&mut self, id: &SourceId, data: &SourceData) -> Result<(), EngineError> {
        let body = match data {
            SourceData::Inline(value) => to_json(value)?,
            SourceData::Url(url) => to_json(url)?,
            SourceData::Tiles(_) => {
                return Err(EngineError::Native(format!(
                    "source {id} takes no data updates"
                )));
            }
        };
        mapsync_set_source_data(self.live()?, id.as_str(), &body).map_err(engine_error)
    }

    fn add_layer(&mut self, layer: &LayerSpec, before: Option<&LayerId>) -> Result<(), EngineError> {
        let body = to_json(&layer_json(layer))?;
        mapsync_add_layer(self.live()?, &body, before.map(LayerId::as_str)).map_err(engine_error)
    }

    fn remove_layer(&mut self, id: &LayerId) -> Result<(), EngineError> {
        mapsync_remove_layer(self.live()?, id.as_str()).map_err(engine_error)
    }

    fn move_layer(&mut self, id: &LayerId, before: Option<&LayerId>) -> Result<(), EngineError> {
        mapsync_move_layer(self.live()?, id.as_str(), before.map(LayerId::as_str))
            .map_err(engine_error)
    }

    fn set_paint_property(
        &mut self,
        layer: &LayerId,
        name: &str,
        value: Option<&Value>,
    ) -> Result<(), EngineError> {
        let value = value.map(to_json).transpose()?;
        mapsync_set_paint(self.live()?, layer.as_str(), name, value).map_err(engine_error)
    }

    fn set_layout_property(
        &mut self,
        layer: &LayerId,
        name: &str,
        value: Option<&Value>,
    ) -> Result<(), EngineError> {
        let value = value.map(to_json).transpose()?;
        mapsync_set_layout(self.live()?, layer.as_str(), name, value).map_err(engine_error)
    }

    fn set_filter(&mut self, layer: &LayerId, filter: Option<&Value>) -> Result<(), EngineError> {
        let filter = filter.map(to_json).transpose()?;
        mapsync_set_filter(self.live()?, layer.as_str(), filter).map_err(engine_error)
    }

    fn set_zoom_range(
        &mut self,
        layer: &LayerId,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<(), EngineError> {
        mapsync_set_zoom_range(self.live()?, layer.as_str(), min, max).map_err(engine_error)
    }

    fn fly_to(&mut self, camera: &CameraState, duration_ms: u32) -> Result<(), EngineError> {
        let body = to_json(camera)?;
        mapsync_fly_to(self.live()?, &body, duration_ms).map_err(engine_error)
    }

    fn jump_to(&mut self, camera: &CameraState) -> Result<(), EngineError> {
        let body = to_json(camera)?;
        mapsync_jump_to(self.live()?, &body).map_err(engine_error)
    }

    fn subscribe(&mut self, sink: EventSink) -> Result<SubscriptionId, EngineError> {
        let kinds = to_json(&NATIVE_KINDS)?;
        let waker = Rc::clone(&self.waker);
        let handler = Closure::<dyn FnMut(String, String)>::new(move |kind: String, payload: String| {
            let payload = serde_json::from_str(&payload).unwrap_or(Value::String(payload));
            if !sink.post(NativeEvent::new(kind, payload)) {
                return;
            }
            if let Some(wake) = waker.borrow().as_ref() {
                wake();
            }
        });
        let token = mapsync_on(self.live()?, &kinds, &handler).map_err(engine_error)?;
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.insert(
            id,
            Listeners {
                token,
                _handler: handler,
            },
        );
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        if let Some(listeners) = self.listeners.remove(&id)
            && !self.released
        {
            mapsync_off(&self.map, &listeners.token);
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        for (_, listeners) in std::mem::take(&mut self.listeners) {
            mapsync_off(&self.map, &listeners.token);
        }
        *self.waker.borrow_mut() = None;
        mapsync_remove(&self.map);
        self.released = true;
    }
}
