use std::cell::RefCell;
use std::rc::Rc;

use foundation::ids::{LayerId, SourceId};
use layers::{
    CameraState, DeclarativeSpec, LayerKind, LayerSpec, SourceData, SourceSpec, SpecBuilder,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use sync::{
    CameraTransition, Command, CommandKind, EngineError, EngineEvent, EngineInitError, EventSink,
    MapEngine, MapView, MemoryEngine, NativeEvent, Origin, SubscriptionId, SyncConfig, SyncError,
};

fn geo(id: &str) -> SourceSpec {
    SourceSpec::geojson(id, json!({"type": "FeatureCollection", "features": []}))
}

fn spec_a() -> DeclarativeSpec {
    SpecBuilder::new(CameraState::new(0.0, 0.0, 2.0))
        .source(geo("s1"))
        .layer(LayerSpec::new("l1", "s1", LayerKind::Fill).paint("fill-color", "#888"))
        .build()
        .unwrap()
}

fn spec_b() -> DeclarativeSpec {
    SpecBuilder::new(CameraState::new(0.0, 0.0, 2.0))
        .source(geo("s1"))
        .source(geo("s2"))
        .layer(LayerSpec::new("l1", "s1", LayerKind::Fill).paint("fill-color", "#888"))
        .layer(LayerSpec::new("l2", "s2", LayerKind::Line))
        .build()
        .unwrap()
}

fn ready_view(spec: DeclarativeSpec) -> MapView<MemoryEngine> {
    let mut view: MapView<MemoryEngine> = MapView::mount("map", spec, SyncConfig::default()).unwrap();
    view.engine().unwrap().fire_ready();
    view.pump_events().unwrap();
    view.engine_mut().unwrap().take_calls();
    view
}

fn engine_calls(view: &mut MapView<MemoryEngine>) -> Vec<Command> {
    view.engine_mut().unwrap().take_calls()
}

#[test]
fn commands_before_ready_run_in_enqueue_order() {
    let mut view = MapView::<MemoryEngine>::mount("map", spec_a(), SyncConfig::default()).unwrap();
    view.update(spec_b()).unwrap();
    assert!(!view.is_ready());
    assert_eq!(view.pending_len(), 4);
    assert!(view.engine().unwrap().calls().is_empty());

    view.engine().unwrap().fire_ready();
    let events = view.pump_events().unwrap();
    assert_eq!(events, vec![EngineEvent::Ready]);

    let kinds: Vec<_> = view
        .engine()
        .unwrap()
        .calls()
        .iter()
        .map(|c| (c.kind(), c.target().to_string()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (CommandKind::AddSource, "s1".to_string()),
            (CommandKind::AddLayer, "l1".to_string()),
            (CommandKind::AddSource, "s2".to_string()),
            (CommandKind::AddLayer, "l2".to_string()),
        ]
    );
    assert!(view.is_converged());
    assert_eq!(view.metrics().commands_flushed, 4);
}

#[test]
fn engine_motion_is_not_sent_back() {
    let mut view = ready_view(spec_a());
    let moved = CameraState::new(12.0, 48.0, 7.5).with_bearing(30.0);
    view.engine_mut().unwrap().user_move(moved);
    view.pump_events().unwrap();
    assert_eq!(view.viewport().get(), moved);
    assert_eq!(view.viewport().origin(), Origin::User);

    let next = view.current().with_camera(view.viewport().get()).unwrap();
    let report = view.update(next).unwrap();
    assert_eq!(report.planned, 0);
    assert!(engine_calls(&mut view).is_empty());
    assert_eq!(view.metrics().echoes_suppressed, 1);
}

#[test]
fn navigate_issues_one_programmatic_jump() {
    let mut view = ready_view(spec_a());
    let target = CameraState::new(10.0, 10.0, 2.0);
    let report = view.navigate(target).unwrap();
    assert_eq!(report.ran, 1);
    assert_eq!(
        engine_calls(&mut view),
        vec![Command::JumpTo { camera: target }]
    );
    assert_eq!(view.engine().unwrap().camera(), &target);

    // Rendering again from the store is a no-op.
    let next = view.current().with_camera(view.viewport().get()).unwrap();
    assert_eq!(view.update(next).unwrap().planned, 0);
}

#[test]
fn navigate_with_uses_the_requested_transition() {
    let mut view = ready_view(spec_a());
    let target = CameraState::new(5.0, 5.0, 4.0);
    view.navigate_with(target, CameraTransition::Fly { duration_ms: 250 })
        .unwrap();
    assert_eq!(
        engine_calls(&mut view),
        vec![Command::FlyTo {
            camera: target,
            duration_ms: 250
        }]
    );
}

#[test]
fn snapshot_camera_from_ui_flies_and_updates_the_store() {
    let mut view = ready_view(spec_a());
    let target = CameraState::new(-3.0, 51.0, 9.0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    view.on_camera(move |cam, origin| sink.borrow_mut().push((*cam, origin)));

    view.update(spec_a().with_camera(target).unwrap()).unwrap();
    let calls = engine_calls(&mut view);
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], Command::FlyTo { duration_ms: 1200, .. }));
    assert_eq!(view.viewport().get(), target);
    assert_eq!(*seen.borrow(), vec![(target, Origin::Programmatic)]);
}

#[test]
fn refused_command_is_retried_by_the_next_pass() {
    let mut view = ready_view(spec_a());
    view.engine_mut()
        .unwrap()
        .fail_next(CommandKind::AddLayer, EngineError::Native("busy".into()));

    let report = view.update(spec_b()).unwrap();
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].target, "l2");
    assert_eq!(report.ran, 1);
    assert!(!view.is_converged());

    let retry = view.update(spec_b()).unwrap();
    assert!(retry.is_clean());
    let calls = engine_calls(&mut view);
    assert_eq!(
        calls.last().map(|c| (c.kind(), c.target().to_string())),
        Some((CommandKind::AddLayer, "l2".to_string()))
    );
    assert!(view.is_converged());
    assert_eq!(view.metrics().commands_rejected, 1);
}

#[test]
fn refusal_while_flushing_is_retried() {
    let mut view = MapView::<MemoryEngine>::mount("map", spec_a(), SyncConfig::default()).unwrap();
    view.engine_mut()
        .unwrap()
        .fail_next(CommandKind::AddSource, EngineError::Native("style not loaded".into()));
    view.engine().unwrap().fire_ready();
    view.pump_events().unwrap();
    assert!(!view.is_converged());

    view.update(spec_a()).unwrap();
    assert!(view.is_converged());
    assert!(view.engine().unwrap().state().matches_structure(&spec_a()));
}

#[test]
fn refused_removal_while_flushing_is_retried() {
    let mut view = MapView::<MemoryEngine>::mount("map", spec_b(), SyncConfig::default()).unwrap();
    view.update(spec_a()).unwrap();
    assert_eq!(view.pending_len(), 6);
    view.engine_mut()
        .unwrap()
        .fail_next(CommandKind::RemoveLayer, EngineError::Native("context busy".into()));
    view.engine().unwrap().fire_ready();
    view.pump_events().unwrap();

    // The layer stayed, so its source could not go either.
    assert_eq!(view.metrics().commands_rejected, 2);
    assert!(view.engine().unwrap().state().layer("l2").is_some());
    assert!(!view.is_converged());
    engine_calls(&mut view);

    let retry = view.update(spec_a()).unwrap();
    assert!(retry.is_clean());
    assert_eq!(
        engine_calls(&mut view),
        vec![
            Command::RemoveLayer {
                id: LayerId::new("l2")
            },
            Command::RemoveSource {
                id: SourceId::new("s2")
            },
        ]
    );
    assert!(view.is_converged());
    assert!(view.engine().unwrap().state().matches_structure(&spec_a()));
    assert_eq!(view.update(spec_a()).unwrap().planned, 0);
}

#[test]
fn refused_removal_on_a_ready_engine_is_retried() {
    let mut view = ready_view(spec_b());
    view.engine_mut()
        .unwrap()
        .fail_next(CommandKind::RemoveSource, EngineError::Native("busy".into()));

    let report = view.update(spec_a()).unwrap();
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].target, "s2");
    assert!(view.engine().unwrap().state().source("s2").is_some());
    assert!(!view.is_converged());
    engine_calls(&mut view);

    assert!(view.update(spec_a()).unwrap().is_clean());
    assert_eq!(
        engine_calls(&mut view),
        vec![Command::RemoveSource {
            id: SourceId::new("s2")
        }]
    );
    assert!(view.is_converged());
}

#[test]
fn source_already_on_the_engine_is_replaced() {
    let mut view = ready_view(spec_a());
    let stale = SourceSpec::geojson("s2", json!({"type": "Point", "coordinates": [0, 0]}));
    view.engine_mut().unwrap().add_source(&stale).unwrap();
    engine_calls(&mut view);

    let report = view.update(spec_b()).unwrap();
    assert_eq!(report.rejected.len(), 1);
    assert!(matches!(report.rejected[0].reason, EngineError::DuplicateId(_)));
    assert!(!view.is_converged());

    assert!(view.update(spec_b()).unwrap().is_clean());
    assert!(view.is_converged());
    assert!(view.engine().unwrap().state().matches_structure(&spec_b()));
    assert_eq!(view.update(spec_b()).unwrap().planned, 0);
}

#[test]
fn adopting_a_populated_engine_converges() {
    let engine = MemoryEngine::with_spec(&spec_a());
    let mut view = MapView::from_engine(engine, spec_a(), SyncConfig::default()).unwrap();
    view.engine().unwrap().fire_ready();
    view.pump_events().unwrap();
    assert_eq!(view.metrics().commands_rejected, 2);
    assert!(!view.is_converged());

    assert!(view.update(spec_a()).unwrap().is_clean());
    assert!(view.is_converged());
    assert!(view.engine().unwrap().state().matches_structure(&spec_a()));
    assert_eq!(view.update(spec_a()).unwrap().planned, 0);
}

#[test]
fn in_place_geojson_updates_keep_layers() {
    let config = SyncConfig {
        geojson_in_place: true,
        ..SyncConfig::default()
    };
    let mut view = MapView::<MemoryEngine>::mount("map", spec_a(), config).unwrap();
    view.engine().unwrap().fire_ready();
    view.pump_events().unwrap();
    engine_calls(&mut view);

    let data = json!({"type": "FeatureCollection", "features": [{"type": "Feature", "geometry": null, "properties": {}}]});
    let next = DeclarativeSpec::new(
        *spec_a().camera(),
        vec![SourceSpec::geojson("s1", data.clone())],
        spec_a().layers().to_vec(),
    )
    .unwrap();
    view.update(next).unwrap();
    assert_eq!(
        engine_calls(&mut view),
        vec![Command::SetSourceData {
            id: SourceId::new("s1"),
            data: SourceData::Inline(data),
        }]
    );
}

#[test]
fn lost_context_is_surfaced() {
    let mut view = ready_view(spec_a());
    view.engine().unwrap().lose_context();
    assert_eq!(view.pump_events(), Err(SyncError::ContextLost));
    assert_eq!(view.update(spec_b()), Err(SyncError::ContextLost));
}

#[test]
fn bad_events_are_dropped_and_others_delivered() {
    let mut view = ready_view(spec_a());
    let clicks = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&clicks);
    view.on_event(move |ev| {
        if let EngineEvent::Click(click) = ev {
            sink.borrow_mut().push(click.features.len());
        }
    });
    let engine = view.engine().unwrap();
    engine.emit(NativeEvent::new("moveend", json!({"center": "nowhere"})));
    engine.click(1.0, 2.0, vec![json!({"type": "Feature"})]);

    let events = view.pump_events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(*clicks.borrow(), vec![1]);
    assert_eq!(view.metrics().events_dropped, 1);
}

#[test]
fn invalid_surface_fails_mount() {
    let err = MapView::<MemoryEngine>::mount("", spec_a(), SyncConfig::default()).unwrap_err();
    assert!(matches!(err, SyncError::Init(EngineInitError::InvalidSurface(_))));
}

#[test]
fn inverted_limits_fail_mount_instead_of_panicking() {
    let config = SyncConfig {
        limits: layers::CameraLimits {
            min_zoom: 10.0,
            max_zoom: 2.0,
            ..layers::CameraLimits::default()
        },
        ..SyncConfig::default()
    };
    let err = MapView::<MemoryEngine>::mount("map", spec_a(), config.clone()).unwrap_err();
    assert!(matches!(err, SyncError::InvalidConfig(_)));

    let lifecycle = Lifecycle::default();
    let engine = LoggedEngine::create(&lifecycle, spec_a().camera()).unwrap();
    assert!(MapView::from_engine(engine, spec_a(), config).is_err());
    assert_eq!(lifecycle.log.borrow().last(), Some(&"release"));
}

#[test]
fn unmounted_view_refuses_work() {
    let mut view = ready_view(spec_a());
    assert!(view.unmount());
    assert!(!view.unmount());
    assert_eq!(view.update(spec_b()), Err(SyncError::Destroyed));
    assert_eq!(view.pump_events(), Err(SyncError::Destroyed));
}

/// Records lifecycle calls of an engine into a log shared with the test.
#[derive(Debug, Default)]
struct Lifecycle {
    log: Rc<RefCell<Vec<&'static str>>>,
}

struct LoggedEngine {
    inner: MemoryEngine,
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl MapEngine for LoggedEngine {
    type Surface = Lifecycle;

    fn create(surface: &Lifecycle, camera: &CameraState) -> Result<Self, EngineInitError> {
        surface.log.borrow_mut().push("create");
        Ok(Self {
            inner: MemoryEngine::create("logged", camera)?,
            log: Rc::clone(&surface.log),
        })
    }

    fn add_source(&mut self, source: &SourceSpec) -> Result<(), EngineError> {
        self.inner.add_source(source)
    }

    fn remove_source(&mut self, id: &SourceId) -> Result<(), EngineError> {
        self.inner.remove_source(id)
    }

    fn set_source_data(&mut self, id: &SourceId, data: &SourceData) -> Result<(), EngineError> {
        self.inner.set_source_data(id, data)
    }

    fn add_layer(&mut self, layer: &LayerSpec, before: Option<&LayerId>) -> Result<(), EngineError> {
        self.inner.add_layer(layer, before)
    }

    fn remove_layer(&mut self, id: &LayerId) -> Result<(), EngineError> {
        self.inner.remove_layer(id)
    }

    fn move_layer(&mut self, id: &LayerId, before: Option<&LayerId>) -> Result<(), EngineError> {
        self.inner.move_layer(id, before)
    }

    fn set_paint_property(
        &mut self,
        layer: &LayerId,
        name: &str,
        value: Option<&Value>,
    ) -> Result<(), EngineError> {
        self.inner.set_paint_property(layer, name, value)
    }

    fn set_layout_property(
        &mut self,
        layer: &LayerId,
        name: &str,
        value: Option<&Value>,
    ) -> Result<(), EngineError> {
        self.inner.set_layout_property(layer, name, value)
    }

    fn set_filter(&mut self, layer: &LayerId, filter: Option<&Value>) -> Result<(), EngineError> {
        self.inner.set_filter(layer, filter)
    }

    fn set_zoom_range(
        &mut self,
        layer: &LayerId,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<(), EngineError> {
        self.inner.set_zoom_range(layer, min, max)
    }

    fn fly_to(&mut self, camera: &CameraState, duration_ms: u32) -> Result<(), EngineError> {
        self.inner.fly_to(camera, duration_ms)
    }

    fn jump_to(&mut self, camera: &CameraState) -> Result<(), EngineError> {
        self.inner.jump_to(camera)
    }

    fn subscribe(&mut self, sink: EventSink) -> Result<SubscriptionId, EngineError> {
        self.log.borrow_mut().push("subscribe");
        self.inner.subscribe(sink)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.log.borrow_mut().push("unsubscribe");
        self.inner.unsubscribe(id);
    }

    fn release(&mut self) {
        self.log.borrow_mut().push("release");
        self.inner.release();
    }
}

#[test]
fn unmount_unsubscribes_then_releases_once() {
    let lifecycle = Lifecycle::default();
    let mut view = MapView::<LoggedEngine>::mount(&lifecycle, spec_a(), SyncConfig::default()).unwrap();
    view.unmount();
    view.unmount();
    drop(view);
    assert_eq!(
        *lifecycle.log.borrow(),
        vec!["create", "subscribe", "unsubscribe", "release"]
    );
}

#[test]
fn dropping_a_view_releases_the_engine() {
    let lifecycle = Lifecycle::default();
    {
        let _view = MapView::<LoggedEngine>::mount(&lifecycle, spec_a(), SyncConfig::default()).unwrap();
    }
    assert_eq!(
        lifecycle.log.borrow().iter().filter(|e| **e == "release").count(),
        1
    );
}

#[test]
fn unmount_before_ready_discards_pending_work() {
    let lifecycle = Lifecycle::default();
    let mut view = MapView::<LoggedEngine>::mount(&lifecycle, spec_b(), SyncConfig::default()).unwrap();
    assert_eq!(view.pending_len(), 4);
    assert!(view.unmount());
    assert_eq!(view.pending_len(), 0);
    assert_eq!(lifecycle.log.borrow().last(), Some(&"release"));
}

#[test]
fn remount_releases_the_previous_engine_first() {
    let lifecycle = Lifecycle::default();
    let mut view = MapView::<LoggedEngine>::mount(&lifecycle, spec_a(), SyncConfig::default()).unwrap();
    view.remount(&lifecycle, spec_b()).unwrap();
    assert!(view.is_mounted());
    drop(view);
    assert_eq!(
        *lifecycle.log.borrow(),
        vec![
            "create",
            "subscribe",
            "unsubscribe",
            "release",
            "create",
            "subscribe",
            "unsubscribe",
            "release",
        ]
    );
}
