use layers::{CameraLimits, CameraState};
use serde::{Deserialize, Serialize};

use crate::command::Command;

/// How the engine should get to a new camera.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CameraTransition {
    #[default]
    Jump,
    Fly { duration_ms: u32 },
}

impl CameraTransition {
    pub const DEFAULT_FLY_MS: u32 = 1200;

    pub fn fly() -> Self {
        CameraTransition::Fly {
            duration_ms: Self::DEFAULT_FLY_MS,
        }
    }

    pub fn command(self, camera: CameraState) -> Command {
        match self {
            CameraTransition::Jump => Command::JumpTo { camera },
            CameraTransition::Fly { duration_ms } => Command::FlyTo {
                camera,
                duration_ms,
            },
        }
    }
}

/// Tunables of the synchronization layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Transition for programmatic resets (`navigate`, plain `reconcile`).
    pub programmatic_transition: CameraTransition,
    /// Transition for camera changes the UI puts straight into a snapshot.
    pub user_transition: CameraTransition,
    pub limits: CameraLimits,
    /// Swap GeoJSON data in place instead of removing and re-adding the
    /// source when only the data changed.
    pub geojson_in_place: bool,
    /// Upper bound on commands held before the engine is ready. Commands
    /// beyond it are rejected and picked up again by a later pass.
    pub max_pending: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            programmatic_transition: CameraTransition::Jump,
            user_transition: CameraTransition::fly(),
            limits: CameraLimits::default(),
            geojson_in_place: false,
            max_pending: None,
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("invalid sync config: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.limits
            .check()
            .map_err(|e| format!("invalid sync config: {e}"))
    }
}
