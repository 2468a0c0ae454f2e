use layers::{CameraState, DeclarativeSpec, LayerKind, LayerSpec, SourceSpec, SpecBuilder};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use proptest::sample::Index;
use serde_json::json;
use sync::{
    Command, CommandKind, EngineError, LiveState, MapView, MemoryEngine, SyncConfig, execute,
    reconcile,
};

const SOURCE_IDS: [&str; 4] = ["roads", "parcels", "poi", "imagery"];
const LAYER_IDS: [&str; 6] = ["fill", "outline", "labels", "dots", "heat", "base"];

/// Everything about a layer except its id.
#[derive(Debug, Clone)]
struct Styling {
    kind: LayerKind,
    source: Index,
    opacity: Option<u8>,
    sort_key: Option<u8>,
    hidden: bool,
    filter: Option<u8>,
}

fn arb_camera() -> impl Strategy<Value = CameraState> {
    (-20i32..20, -20i32..20, 0u8..6)
        .prop_map(|(lng, lat, zoom)| CameraState::new(lng.into(), lat.into(), zoom.into()))
}

fn arb_kind() -> impl Strategy<Value = LayerKind> {
    prop_oneof![
        Just(LayerKind::Fill),
        Just(LayerKind::Line),
        Just(LayerKind::Circle),
        Just(LayerKind::Symbol),
    ]
}

fn arb_styling() -> impl Strategy<Value = Styling> {
    (
        arb_kind(),
        any::<Index>(),
        prop::option::of(0u8..4),
        prop::option::of(0u8..3),
        prop::bool::weighted(0.25),
        prop::option::weighted(0.2, 0u8..2),
    )
        .prop_map(|(kind, source, opacity, sort_key, hidden, filter)| Styling {
            kind,
            source,
            opacity,
            sort_key,
            hidden,
            filter,
        })
}

/// Snapshots over a small id pool, so consecutive ones share sources and
/// layers and differ in data, kind, styling and order.
fn arb_spec() -> impl Strategy<Value = DeclarativeSpec> {
    (
        arb_camera(),
        prop::collection::vec(prop::option::weighted(0.67, 0u8..2), SOURCE_IDS.len()),
        Just(LAYER_IDS.to_vec()).prop_shuffle(),
        prop::collection::vec(prop::option::weighted(0.67, arb_styling()), LAYER_IDS.len()),
    )
        .prop_map(|(camera, versions, order, styles)| {
            let mut builder = SpecBuilder::new(camera);
            let mut sources = Vec::new();
            for (id, version) in SOURCE_IDS.iter().zip(versions) {
                if let Some(version) = version {
                    builder = builder.source(SourceSpec::geojson(
                        *id,
                        json!({"type": "FeatureCollection", "features": [], "version": version}),
                    ));
                    sources.push(*id);
                }
            }
            if !sources.is_empty() {
                for (id, style) in order.into_iter().zip(styles) {
                    let Some(style) = style else { continue };
                    let mut layer = LayerSpec::new(id, *style.source.get(&sources), style.kind);
                    if let Some(o) = style.opacity {
                        layer = layer.paint("opacity", f64::from(o) / 4.0);
                    }
                    if let Some(k) = style.sort_key {
                        layer = layer.layout("sort-key", k);
                    }
                    if style.hidden {
                        layer = layer.hidden();
                    }
                    if let Some(f) = style.filter {
                        layer = layer.filter(json!(["==", "kind", f]));
                    }
                    builder = builder.layer(layer);
                }
            }
            builder.build().unwrap()
        })
}

fn arb_structural_kind() -> impl Strategy<Value = CommandKind> {
    prop::sample::select(vec![
        CommandKind::AddSource,
        CommandKind::RemoveSource,
        CommandKind::AddLayer,
        CommandKind::RemoveLayer,
        CommandKind::ReorderLayer,
        CommandKind::SetPaintProperty,
        CommandKind::SetLayoutProperty,
        CommandKind::SetFilter,
    ])
}

fn ready_view(spec: DeclarativeSpec) -> MapView<MemoryEngine> {
    let mut view: MapView<MemoryEngine> = MapView::mount("map", spec, SyncConfig::default()).unwrap();
    view.engine().unwrap().fire_ready();
    view.pump_events().unwrap();
    view
}

proptest! {
    #[test]
    fn reconciling_a_snapshot_with_itself_is_empty(spec in arb_spec()) {
        prop_assert_eq!(reconcile(Some(&spec), &spec), Vec::<Command>::new());
    }

    #[test]
    fn commands_converge_an_engine_from_a_to_b(a in arb_spec(), b in arb_spec()) {
        let mut engine = MemoryEngine::with_spec(&a);
        for command in reconcile(Some(&a), &b) {
            if let Err(e) = execute(&mut engine, &command) {
                return Err(TestCaseError::fail(format!("{command} rejected: {e}")));
            }
        }
        prop_assert!(engine.state().matches(&b));
        prop_assert_eq!(engine.snapshot().unwrap(), b);
    }

    #[test]
    fn converging_from_nothing_matches(spec in arb_spec()) {
        let mut engine = MemoryEngine::new(CameraState::default());
        for command in reconcile(None, &spec) {
            prop_assert!(execute(&mut engine, &command).is_ok(), "{} rejected", command);
        }
        prop_assert!(engine.state().matches(&spec));
    }

    #[test]
    fn sources_outlive_the_layers_that_use_them(a in arb_spec(), b in arb_spec()) {
        let mut live = LiveState::from_spec(&a);
        for command in reconcile(Some(&a), &b) {
            match &command {
                Command::AddLayer { layer, .. } => {
                    prop_assert!(
                        live.source(layer.source.as_str()).is_some(),
                        "{} added before its source",
                        layer.id
                    );
                }
                Command::RemoveSource { id } => {
                    prop_assert!(
                        live.layers().iter().all(|l| &l.source != id),
                        "{} removed while in use",
                        id
                    );
                }
                _ => {}
            }
            prop_assert!(live.apply(&command).is_ok());
        }
    }

    #[test]
    fn batches_follow_phase_order(a in arb_spec(), b in arb_spec()) {
        let phases: Vec<u8> = reconcile(Some(&a), &b)
            .iter()
            .map(|c| c.kind().phase())
            .collect();
        prop_assert!(phases.windows(2).all(|w| w[0] <= w[1]), "{:?}", phases);
    }

    #[test]
    fn one_refused_command_is_repaired_by_later_passes(
        a in arb_spec(),
        b in arb_spec(),
        kind in arb_structural_kind(),
    ) {
        let mut view = ready_view(a);
        view.engine_mut()
            .unwrap()
            .fail_next(kind, EngineError::Native("refused once".into()));
        for _ in 0..3 {
            if view.is_converged() && view.current() == &b {
                break;
            }
            view.update(b.clone()).unwrap();
        }
        prop_assert!(view.is_converged());
        prop_assert!(view.engine().unwrap().state().matches_structure(&b));
        prop_assert_eq!(view.update(b.clone()).unwrap().planned, 0);
    }
}

#[test]
fn adding_a_source_and_layer_leaves_the_rest_alone() {
    let geo = |id: &str| SourceSpec::geojson(id, json!({"type": "FeatureCollection", "features": []}));
    let a = SpecBuilder::new(CameraState::new(0.0, 0.0, 2.0))
        .source(geo("s1"))
        .layer(LayerSpec::new("l1", "s1", LayerKind::Fill))
        .build()
        .unwrap();
    let b = SpecBuilder::new(CameraState::new(0.0, 0.0, 2.0))
        .source(geo("s1"))
        .source(geo("s2"))
        .layer(LayerSpec::new("l1", "s1", LayerKind::Fill))
        .layer(LayerSpec::new("l2", "s2", LayerKind::Line))
        .build()
        .unwrap();

    let cmds = reconcile(Some(&a), &b);
    assert_eq!(cmds.len(), 2);
    assert!(matches!(&cmds[0], Command::AddSource { source } if source.id.as_str() == "s2"));
    assert!(matches!(
        &cmds[1],
        Command::AddLayer { layer, before: None } if layer.id.as_str() == "l2"
    ));
    assert!(
        cmds.iter()
            .all(|c| c.target() != "s1" && c.target() != "l1")
    );
}

#[test]
fn camera_only_change_is_a_single_camera_command() {
    let a = DeclarativeSpec::empty(CameraState::new(0.0, 0.0, 2.0)).unwrap();
    let b = DeclarativeSpec::empty(CameraState::new(10.0, 10.0, 2.0)).unwrap();
    let cmds = reconcile(Some(&a), &b);
    assert_eq!(cmds.len(), 1);
    assert!(cmds[0].is_camera());
    assert_eq!(cmds[0].camera(), Some(&CameraState::new(10.0, 10.0, 2.0)));
}
