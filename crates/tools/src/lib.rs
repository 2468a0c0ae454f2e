//! Offline helpers behind the `mapsync` command: load snapshots, plan the
//! commands between two of them, and replay a sequence against the in-memory
//! engine.

use std::env;
use std::fs;
use std::path::Path;

use layers::DeclarativeSpec;
use serde::Serialize;
use sync::{CameraTransition, Command, MapView, MemoryEngine, SyncConfig, SyncMetrics};

pub fn load_spec(path: &Path) -> Result<DeclarativeSpec, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
    DeclarativeSpec::from_json(&text).map_err(|e| format!("{path:?}: {e}"))
}

pub fn load_config(path: Option<&Path>) -> Result<SyncConfig, String> {
    match path {
        Some(p) => {
            let text = fs::read_to_string(p).map_err(|e| format!("read {p:?}: {e}"))?;
            SyncConfig::from_json(&text)
        }
        None => Ok(SyncConfig::default()),
    }
}

fn env_var_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_var_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_var_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_var_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

/// Applies `MAPSYNC_*` environment overrides on top of a loaded config and
/// checks the result.
pub fn apply_env(mut config: SyncConfig) -> Result<SyncConfig, String> {
    if let Some(v) = env_var_f64("MAPSYNC_MAX_ZOOM") {
        config.limits.max_zoom = v;
    }
    if let Some(v) = env_var_usize("MAPSYNC_MAX_PENDING") {
        config.max_pending = Some(v);
    }
    if let Some(v) = env_var_bool("MAPSYNC_GEOJSON_IN_PLACE") {
        config.geojson_in_place = v;
    }
    if let Some(ms) = env_var_u32("MAPSYNC_FLY_MS") {
        config.user_transition = CameraTransition::Fly { duration_ms: ms };
    }
    config.validate()?;
    Ok(config)
}

/// One line per command, in execution order.
pub fn plan_lines(
    from: Option<&DeclarativeSpec>,
    to: &DeclarativeSpec,
    config: &SyncConfig,
) -> Result<Vec<String>, String> {
    sync::reconcile_with(from, to, config)
        .iter()
        .map(|c| serde_json::to_string(c).map_err(|e| format!("json: {e}")))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayStep {
    pub step: usize,
    pub ready: bool,
    pub planned: usize,
    pub ran: usize,
    pub queued: usize,
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub steps: Vec<ReplayStep>,
    pub converged: bool,
    pub engine_calls: Vec<Command>,
    pub metrics: SyncMetrics,
}

/// Mounts the first snapshot on a [`MemoryEngine`] and applies the rest in
/// order. The engine turns ready once `ready_at` snapshots were handed over,
/// or at the end.
pub fn replay(
    snapshots: Vec<DeclarativeSpec>,
    config: SyncConfig,
    ready_at: usize,
) -> Result<ReplayOutcome, String> {
    let mut snapshots = snapshots.into_iter();
    let first = snapshots
        .next()
        .ok_or_else(|| "replay needs at least one snapshot".to_string())?;
    let mut view =
        MapView::<MemoryEngine>::mount("replay", first, config).map_err(|e| e.to_string())?;

    let mut steps = Vec::new();
    let mut ready = false;
    for (i, snapshot) in snapshots.enumerate() {
        let step = i + 1;
        if !ready && step >= ready_at {
            signal_ready(&mut view)?;
            ready = true;
        }
        let report = view.update(snapshot).map_err(|e| e.to_string())?;
        steps.push(ReplayStep {
            step,
            ready,
            planned: report.planned,
            ran: report.ran,
            queued: report.queued,
            rejected: report.rejected.iter().map(|r| r.to_string()).collect(),
        });
    }
    if !ready {
        signal_ready(&mut view)?;
    }

    let engine_calls = view
        .engine_mut()
        .map(MemoryEngine::take_calls)
        .unwrap_or_default();
    let outcome = ReplayOutcome {
        steps,
        converged: view.is_converged(),
        engine_calls,
        metrics: view.metrics().clone(),
    };
    view.unmount();
    Ok(outcome)
}

fn signal_ready(view: &mut MapView<MemoryEngine>) -> Result<(), String> {
    if let Some(engine) = view.engine() {
        engine.fire_ready();
    }
    view.pump_events().map(|_| ()).map_err(|e| e.to_string())
}
