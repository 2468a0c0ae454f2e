use foundation::bounds::LngLatBounds;
use foundation::ids::SourceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Vector,
    GeoJson,
    Raster,
    Image,
}

impl SourceKind {
    /// The engine's `type` string for this source kind.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Vector => "vector",
            SourceKind::GeoJson => "geojson",
            SourceKind::Raster => "raster",
            SourceKind::Image => "image",
        }
    }
}

/// Where a source's data comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceData {
    /// TileJSON, GeoJSON or image URL.
    Url(String),
    /// Tile URL templates.
    Tiles(Vec<String>),
    /// Inline GeoJSON.
    Inline(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: SourceId,
    pub kind: SourceKind,
    pub data: SourceData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    /// Data extent; for image sources, the area the image covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<LngLatBounds>,
}

impl SourceSpec {
    pub fn new(id: impl Into<SourceId>, kind: SourceKind, data: SourceData) -> Self {
        Self {
            id: id.into(),
            kind,
            data,
            tile_size: None,
            attribution: None,
            bounds: None,
        }
    }

    pub fn geojson(id: impl Into<SourceId>, data: Value) -> Self {
        Self::new(id, SourceKind::GeoJson, SourceData::Inline(data))
    }

    pub fn vector(id: impl Into<SourceId>, url: impl Into<String>) -> Self {
        Self::new(id, SourceKind::Vector, SourceData::Url(url.into()))
    }

    pub fn raster_tiles(id: impl Into<SourceId>, tiles: Vec<String>, tile_size: u32) -> Self {
        Self {
            tile_size: Some(tile_size),
            ..Self::new(id, SourceKind::Raster, SourceData::Tiles(tiles))
        }
    }

    pub fn image(id: impl Into<SourceId>, url: impl Into<String>, bounds: LngLatBounds) -> Self {
        Self {
            bounds: Some(bounds),
            ..Self::new(id, SourceKind::Image, SourceData::Url(url.into()))
        }
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    /// Checks the combinations engines accept. Returns a reason on failure.
    pub fn check(&self) -> Result<(), String> {
        match (&self.kind, &self.data) {
            (SourceKind::GeoJson, SourceData::Tiles(_)) => {
                return Err("geojson sources take a url or inline data".to_string());
            }
            (SourceKind::Vector | SourceKind::Raster, SourceData::Inline(_)) => {
                return Err("tiled sources cannot carry inline data".to_string());
            }
            (SourceKind::Image, SourceData::Url(_)) => {}
            (SourceKind::Image, _) => {
                return Err("image sources take a single url".to_string());
            }
            _ => {}
        }
        if let SourceData::Tiles(tiles) = &self.data
            && tiles.is_empty()
        {
            return Err("tile list is empty".to_string());
        }
        if self.kind == SourceKind::Image && self.bounds.is_none() {
            return Err("image sources need bounds".to_string());
        }
        if let Some(b) = &self.bounds
            && !b.is_valid()
        {
            return Err("bounds are not a valid lng/lat box".to_string());
        }
        Ok(())
    }

    /// True when only the GeoJSON payload differs, which some engines can
    /// update in place.
    pub fn differs_only_in_geojson_data(&self, other: &Self) -> bool {
        self.kind == SourceKind::GeoJson
            && other.kind == SourceKind::GeoJson
            && self.data != other.data
            && self.tile_size == other.tile_size
            && self.attribution == other.attribution
            && self.bounds == other.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::{SourceData, SourceKind, SourceSpec};
    use foundation::bounds::LngLatBounds;
    use serde_json::json;

    #[test]
    fn check_rejects_inline_vector_tiles() {
        let s = SourceSpec::new("v", SourceKind::Vector, SourceData::Inline(json!({})));
        assert!(s.check().is_err());
    }

    #[test]
    fn image_needs_bounds() {
        let mut s = SourceSpec::image("img", "https://x/a.png", LngLatBounds::world());
        assert!(s.check().is_ok());
        s.bounds = None;
        assert!(s.check().is_err());
    }

    #[test]
    fn geojson_data_only_change_is_detected() {
        let a = SourceSpec::geojson("g", json!({"type": "FeatureCollection", "features": []}));
        let mut b = a.clone();
        b.data = SourceData::Url("https://x/pts.geojson".to_string());
        assert!(a.differs_only_in_geojson_data(&b));

        let c = SourceSpec::vector("g", "https://x/tiles.json");
        assert!(!a.differs_only_in_geojson_data(&c));
    }

    #[test]
    fn json_shape_is_stable() {
        let s = SourceSpec::raster_tiles("osm", vec!["https://t/{z}/{x}/{y}.png".into()], 256);
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(
            v,
            json!({
                "id": "osm",
                "kind": "raster",
                "data": {"tiles": ["https://t/{z}/{x}/{y}.png"]},
                "tile_size": 256
            })
        );
    }
}
