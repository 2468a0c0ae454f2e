use foundation::math::{approx_eq, clamp_latitude, wrap_bearing, wrap_longitude};
use serde::{Deserialize, Serialize};

/// Tolerance used when deciding whether two cameras show the same view.
///
/// Engines round-trip camera values through `f32` math, so exact equality is
/// too strict for values that came back from the engine.
pub const CAMERA_EPSILON: f64 = 1e-9;

/// Camera position in the engine's conventions: degrees for angles, zoom as
/// the fractional tile zoom level.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub lng: f64,
    pub lat: f64,
    pub zoom: f64,
    #[serde(default)]
    pub bearing: f64,
    #[serde(default)]
    pub pitch: f64,
}

impl Default for CameraState {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl CameraState {
    pub const fn new(lng: f64, lat: f64, zoom: f64) -> Self {
        Self {
            lng,
            lat,
            zoom,
            bearing: 0.0,
            pitch: 0.0,
        }
    }

    pub const fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = bearing;
        self
    }

    pub const fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn is_finite(&self) -> bool {
        [self.lng, self.lat, self.zoom, self.bearing, self.pitch]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Normalizes the camera into the engine's accepted ranges.
    pub fn clamped(&self, limits: &CameraLimits) -> Self {
        Self {
            lng: wrap_longitude(self.lng),
            lat: clamp_latitude(self.lat, limits.max_lat),
            zoom: self.zoom.clamp(limits.min_zoom, limits.max_zoom),
            bearing: wrap_bearing(self.bearing),
            pitch: self.pitch.clamp(0.0, limits.max_pitch),
        }
    }

    /// Whether both cameras describe the same view, modulo longitude and
    /// bearing wrapping and float noise.
    pub fn same_view(&self, other: &Self) -> bool {
        approx_eq(
            wrap_longitude(self.lng),
            wrap_longitude(other.lng),
            CAMERA_EPSILON,
        ) && approx_eq(self.lat, other.lat, CAMERA_EPSILON)
            && approx_eq(self.zoom, other.zoom, CAMERA_EPSILON)
            && approx_eq(
                wrap_bearing(self.bearing),
                wrap_bearing(other.bearing),
                CAMERA_EPSILON,
            )
            && approx_eq(self.pitch, other.pitch, CAMERA_EPSILON)
    }
}

/// Engine-defined camera bounds.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraLimits {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub max_pitch: f64,
    /// Absolute latitude limit in degrees.
    pub max_lat: f64,
}

impl Default for CameraLimits {
    fn default() -> Self {
        Self {
            min_zoom: 0.0,
            max_zoom: 22.0,
            max_pitch: 85.0,
            max_lat: 90.0,
        }
    }
}

impl CameraLimits {
    /// Rejects bounds [`CameraState::clamped`] cannot honor.
    pub fn check(&self) -> Result<(), String> {
        let values = [self.min_zoom, self.max_zoom, self.max_pitch, self.max_lat];
        if !values.iter().all(|v| v.is_finite()) {
            return Err(format!("camera limits must be finite: {self:?}"));
        }
        if self.min_zoom > self.max_zoom {
            return Err(format!(
                "min_zoom {} is above max_zoom {}",
                self.min_zoom, self.max_zoom
            ));
        }
        if self.max_pitch < 0.0 {
            return Err(format!("max_pitch {} is negative", self.max_pitch));
        }
        if !(0.0..=90.0).contains(&self.max_lat) {
            return Err(format!("max_lat {} is outside 0..=90", self.max_lat));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CameraLimits, CameraState};

    #[test]
    fn clamped_respects_limits() {
        let limits = CameraLimits {
            max_zoom: 18.0,
            ..CameraLimits::default()
        };
        let c = CameraState::new(190.0, 95.0, 30.0)
            .with_bearing(270.0)
            .with_pitch(120.0)
            .clamped(&limits);
        assert_eq!(c, CameraState::new(-170.0, 90.0, 18.0).with_bearing(-90.0).with_pitch(85.0));
    }

    #[test]
    fn check_rejects_bounds_clamping_cannot_use() {
        assert!(CameraLimits::default().check().is_ok());
        let inverted = CameraLimits {
            min_zoom: 10.0,
            max_zoom: 2.0,
            ..CameraLimits::default()
        };
        assert!(inverted.check().unwrap_err().contains("min_zoom"));
        let nan = CameraLimits {
            max_zoom: f64::NAN,
            ..CameraLimits::default()
        };
        assert!(nan.check().is_err());
        let pitch = CameraLimits {
            max_pitch: -1.0,
            ..CameraLimits::default()
        };
        assert!(pitch.check().is_err());
        let lat = CameraLimits {
            max_lat: 91.0,
            ..CameraLimits::default()
        };
        assert!(lat.check().is_err());
    }

    #[test]
    fn same_view_ignores_wrapping_and_noise() {
        let a = CameraState::new(180.0, 10.0, 3.0);
        let b = CameraState::new(-180.0, 10.0 + 1e-12, 3.0);
        assert!(a.same_view(&b));
        assert!(!a.same_view(&CameraState::new(180.0, 10.0, 3.5)));
    }

    #[test]
    fn bearing_and_pitch_default_when_missing() {
        let c: CameraState = serde_json::from_str(r#"{"lng":1,"lat":2,"zoom":3}"#).unwrap();
        assert_eq!(c, CameraState::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn non_finite_is_detected() {
        assert!(CameraState::default().is_finite());
        assert!(!CameraState::new(f64::NAN, 0.0, 0.0).is_finite());
    }
}
