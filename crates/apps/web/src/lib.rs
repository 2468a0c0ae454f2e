use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use layers::{CameraState, DeclarativeSpec};
use serde::Serialize;
use serde_json::json;
use sync::{CameraTransition, EngineEvent, MapView, Origin, ReconcileReport, SyncConfig};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

mod glue;
pub use glue::GlMap;

// Guard to prevent double-initialization of global state (relevant during hot reload).
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK_SET: OnceLock<()> = OnceLock::new();

fn init_panic_hook() {
    PANIC_HOOK_SET.get_or_init(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = info.to_string();
            web_sys::console::error_1(&JsValue::from_str(&msg));
        }));
    });
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    init_panic_hook();
    Ok(())
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js(value: &impl Serialize) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value).map_err(js_err)?;
    js_sys::JSON::parse(&text)
}

fn from_js<T: serde::de::DeserializeOwned>(value: &JsValue) -> Result<T, JsValue> {
    let text: String = js_sys::JSON::stringify(value)?.into();
    serde_json::from_str(&text).map_err(js_err)
}

fn report_json(report: &ReconcileReport) -> serde_json::Value {
    json!({
        "planned": report.planned,
        "ran": report.ran,
        "queued": report.queued,
        "rejected": report.rejected.iter().map(|r| json!({
            "kind": r.kind.as_str(),
            "target": r.target,
            "reason": r.reason.to_string(),
        })).collect::<Vec<_>>(),
    })
}

/// UI-side callbacks plus what accumulated for them while the view was
/// borrowed. Delivery happens after the borrow ends so callbacks may call
/// back into the view.
#[derive(Default)]
struct Hooks {
    on_event: RefCell<Option<js_sys::Function>>,
    on_camera: RefCell<Option<js_sys::Function>>,
    on_error: RefCell<Option<js_sys::Function>>,
    events: RefCell<Vec<EngineEvent>>,
    cameras: RefCell<Vec<(CameraState, Origin)>>,
    scheduled: Cell<bool>,
}

impl Hooks {
    fn deliver(&self) {
        let events = std::mem::take(&mut *self.events.borrow_mut());
        let cameras = std::mem::take(&mut *self.cameras.borrow_mut());
        let on_event = self.on_event.borrow().clone();
        let on_camera = self.on_camera.borrow().clone();
        if let Some(f) = on_event {
            for event in &events {
                self.call(&f, to_js(event), JsValue::UNDEFINED);
            }
        }
        if let Some(f) = on_camera {
            for (camera, origin) in &cameras {
                self.call(&f, to_js(camera), JsValue::from_str(origin_str(*origin)));
            }
        }
    }

    fn call(&self, f: &js_sys::Function, arg: Result<JsValue, JsValue>, extra: JsValue) {
        let result = arg.and_then(|arg| f.call2(&JsValue::NULL, &arg, &extra));
        if let Err(e) = result {
            self.report(&e);
        }
    }

    fn report(&self, error: &JsValue) {
        let on_error = self.on_error.borrow().clone();
        match on_error {
            Some(f) => {
                if f.call1(&JsValue::NULL, error).is_err() {
                    web_sys::console::error_1(error);
                }
            }
            None => web_sys::console::error_1(error),
        }
    }
}

fn origin_str(origin: Origin) -> &'static str {
    match origin {
        Origin::User => "user",
        Origin::Programmatic => "programmatic",
    }
}

fn pump(view: &RefCell<MapView<GlMap>>, hooks: &Hooks) -> Result<usize, JsValue> {
    let result = view
        .try_borrow_mut()
        .map_err(|_| js_err("map view is busy"))?
        .pump_events();
    let delivered = hooks.events.borrow().len();
    hooks.deliver();
    match result {
        Ok(_) => Ok(delivered),
        Err(e) => {
            let e = js_err(e);
            hooks.report(&e);
            Err(e)
        }
    }
}

fn schedule_pump(view: Weak<RefCell<MapView<GlMap>>>, hooks: Rc<Hooks>) {
    if hooks.scheduled.replace(true) {
        return;
    }
    spawn_local(async move {
        hooks.scheduled.set(false);
        if let Some(view) = view.upgrade() {
            // Errors were already reported through the hooks.
            let _ = pump(&view, &hooks);
        }
    });
}

/// A GL JS map kept in step with declarative snapshots.
///
/// Engine events are delivered on a microtask after they fire; `pump` is
/// there for hosts that want to drive delivery themselves.
#[wasm_bindgen]
pub struct WebMapView {
    view: Rc<RefCell<MapView<GlMap>>>,
    hooks: Rc<Hooks>,
}

impl WebMapView {
    fn with_view<T>(
        &self,
        f: impl FnOnce(&mut MapView<GlMap>) -> Result<T, sync::SyncError>,
    ) -> Result<T, JsValue> {
        let result = {
            let mut view = self
                .view
                .try_borrow_mut()
                .map_err(|_| js_err("map view is busy"))?;
            f(&mut view)
        };
        self.hooks.deliver();
        result.map_err(js_err)
    }
}

#[wasm_bindgen]
impl WebMapView {
    /// Creates a map in the element with id `container`. `config` is an
    /// optional sync configuration object.
    #[wasm_bindgen(constructor)]
    pub fn new(container: &str, spec: JsValue, config: JsValue) -> Result<WebMapView, JsValue> {
        init_panic_hook();
        let initial: DeclarativeSpec = from_js(&spec)?;
        let config = if config.is_undefined() || config.is_null() {
            SyncConfig::default()
        } else {
            from_js(&config)?
        };

        let hooks = Rc::new(Hooks::default());
        let mut view = MapView::<GlMap>::mount(container, initial, config).map_err(js_err)?;
        let events = Rc::clone(&hooks);
        view.on_event(move |event| events.events.borrow_mut().push(event.clone()));
        let cameras = Rc::clone(&hooks);
        view.on_camera(move |camera, origin| cameras.cameras.borrow_mut().push((*camera, origin)));

        let view = Rc::new(RefCell::new(view));
        let weak = Rc::downgrade(&view);
        let wake_hooks = Rc::clone(&hooks);
        if let Some(engine) = view.borrow_mut().engine_mut() {
            engine.set_waker(move || schedule_pump(weak.clone(), Rc::clone(&wake_hooks)));
        }
        Ok(WebMapView { view, hooks })
    }

    /// Called with each engine event as a plain object tagged by `type`.
    pub fn set_on_event(&self, callback: Option<js_sys::Function>) {
        *self.hooks.on_event.borrow_mut() = callback;
    }

    /// Called with `(camera, origin)` for each viewport write.
    pub fn set_on_camera(&self, callback: Option<js_sys::Function>) {
        *self.hooks.on_camera.borrow_mut() = callback;
    }

    /// Called with errors raised while delivering events.
    pub fn set_on_error(&self, callback: Option<js_sys::Function>) {
        *self.hooks.on_error.borrow_mut() = callback;
    }

    /// Converges the map toward `spec`. Returns a report with the refused
    /// commands; those are retried on the next update.
    pub fn update(&self, spec: JsValue) -> Result<JsValue, JsValue> {
        let next: DeclarativeSpec = from_js(&spec)?;
        let report = self.with_view(|view| view.update(next))?;
        to_js(&report_json(&report))
    }

    /// Moves the camera from code with the configured programmatic transition.
    pub fn navigate(&self, camera: JsValue) -> Result<(), JsValue> {
        let camera: CameraState = from_js(&camera)?;
        self.with_view(|view| view.navigate(camera)).map(|_| ())
    }

    pub fn fly_to(&self, camera: JsValue, duration_ms: u32) -> Result<(), JsValue> {
        let camera: CameraState = from_js(&camera)?;
        self.with_view(|view| view.navigate_with(camera, CameraTransition::Fly { duration_ms }))
            .map(|_| ())
    }

    pub fn jump_to(&self, camera: JsValue) -> Result<(), JsValue> {
        let camera: CameraState = from_js(&camera)?;
        self.with_view(|view| view.navigate_with(camera, CameraTransition::Jump))
            .map(|_| ())
    }

    /// Delivers queued engine events now. Returns how many were delivered.
    pub fn pump(&self) -> Result<usize, JsValue> {
        pump(&self.view, &self.hooks)
    }

    pub fn viewport(&self) -> Result<JsValue, JsValue> {
        let view = self.view.try_borrow().map_err(|_| js_err("map view is busy"))?;
        let store = view.viewport();
        to_js(&json!({
            "camera": store.get(),
            "origin": origin_str(store.origin()),
            "revision": store.revision(),
        }))
    }

    pub fn metrics(&self) -> Result<JsValue, JsValue> {
        let view = self.view.try_borrow().map_err(|_| js_err("map view is busy"))?;
        to_js(view.metrics())
    }

    pub fn is_ready(&self) -> bool {
        self.view.try_borrow().map(|v| v.is_ready()).unwrap_or(false)
    }

    pub fn is_converged(&self) -> bool {
        self.view
            .try_borrow()
            .map(|v| v.is_converged())
            .unwrap_or(false)
    }

    /// Detaches listeners and removes the map. Safe to call more than once.
    pub fn destroy(&self) -> Result<bool, JsValue> {
        let released = self
            .view
            .try_borrow_mut()
            .map_err(|_| js_err("map view is busy"))?
            .unmount();
        self.hooks.events.borrow_mut().clear();
        self.hooks.cameras.borrow_mut().clear();
        Ok(released)
    }
}
