//! Style JSON in the shape GL map engines take for `addSource`, `addLayer`
//! and whole style documents.

use serde_json::{Map, Value, json};

use crate::layer::LayerSpec;
use crate::snapshot::DeclarativeSpec;
use crate::source::{SourceData, SourceKind, SourceSpec};

/// Style document version engines accept.
pub const STYLE_VERSION: u32 = 8;

/// The source object passed to `addSource`. The id is not part of it.
pub fn source_json(source: &SourceSpec) -> Value {
    let mut out = Map::new();
    out.insert("type".into(), source.kind.as_str().into());
    match (&source.kind, &source.data) {
        (SourceKind::Image, SourceData::Url(url)) => {
            out.insert("url".into(), url.clone().into());
            if let Some(b) = &source.bounds {
                out.insert("coordinates".into(), json!(b.corners()));
            }
        }
        (SourceKind::GeoJson, SourceData::Url(url)) => {
            out.insert("data".into(), url.clone().into());
        }
        (_, SourceData::Url(url)) => {
            out.insert("url".into(), url.clone().into());
        }
        (_, SourceData::Tiles(tiles)) => {
            out.insert("tiles".into(), json!(tiles));
        }
        (_, SourceData::Inline(data)) => {
            out.insert("data".into(), data.clone());
        }
    }
    if let Some(size) = source.tile_size {
        out.insert("tileSize".into(), size.into());
    }
    if let Some(attribution) = &source.attribution {
        out.insert("attribution".into(), attribution.clone().into());
    }
    if source.kind != SourceKind::Image
        && let Some(b) = &source.bounds
    {
        out.insert("bounds".into(), json!([b.west, b.south, b.east, b.north]));
    }
    Value::Object(out)
}

/// The layer object passed to `addLayer`, visibility folded into layout.
pub fn layer_json(layer: &LayerSpec) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), layer.id.as_str().into());
    out.insert("type".into(), layer.kind.as_str().into());
    out.insert("source".into(), layer.source.as_str().into());
    if let Some(name) = &layer.source_layer {
        out.insert("source-layer".into(), name.clone().into());
    }
    out.insert("paint".into(), properties(layer.paint.iter()));
    out.insert("layout".into(), properties(layer.effective_layout().iter()));
    if let Some(filter) = &layer.filter {
        out.insert("filter".into(), filter.clone());
    }
    if let Some(min) = layer.min_zoom {
        out.insert("minzoom".into(), min.into());
    }
    if let Some(max) = layer.max_zoom {
        out.insert("maxzoom".into(), max.into());
    }
    Value::Object(out)
}

fn properties<'a>(entries: impl Iterator<Item = (&'a str, &'a Value)>) -> Value {
    Value::Object(entries.map(|(k, v)| (k.to_string(), v.clone())).collect())
}

/// A complete style document for a snapshot: camera, sources by id and the
/// layer list bottom to top.
pub fn style_document(spec: &DeclarativeSpec) -> Value {
    let camera = spec.camera();
    let sources: Map<String, Value> = spec
        .sources()
        .map(|s| (s.id.as_str().to_string(), source_json(s)))
        .collect();
    json!({
        "version": STYLE_VERSION,
        "center": [camera.lng, camera.lat],
        "zoom": camera.zoom,
        "bearing": camera.bearing,
        "pitch": camera.pitch,
        "sources": sources,
        "layers": spec.layers().iter().map(layer_json).collect::<Vec<_>>(),
    })
}
