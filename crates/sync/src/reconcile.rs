//! Snapshot diffing.
//!
//! [`reconcile`] is the pure form: previous snapshot in, ordered commands out.
//! [`Reconciler`] keeps the memory of what the engine accepted and plans each
//! batch against that memory, so a command the engine refused is simply
//! planned again by the next pass. A refused removal leaves the id behind as
//! a stray the next pass removes first.

use std::collections::{BTreeSet, HashMap};

use foundation::ids::{LayerId, SourceId};
use layers::{CameraState, DeclarativeSpec, LayerSpec};

use crate::command::Command;
use crate::config::SyncConfig;
use crate::error::{CommandRejected, EngineError};
use crate::live::{LiveState, Structure};

/// Commands turning `previous` into `next`. `None` means an empty engine whose
/// camera is unknown.
pub fn reconcile(previous: Option<&DeclarativeSpec>, next: &DeclarativeSpec) -> Vec<Command> {
    reconcile_with(previous, next, &SyncConfig::default())
}

pub fn reconcile_with(
    previous: Option<&DeclarativeSpec>,
    next: &DeclarativeSpec,
    config: &SyncConfig,
) -> Vec<Command> {
    let opts = PlanOptions {
        geojson_in_place: config.geojson_in_place,
        ..PlanOptions::default()
    };
    let mut out = match previous {
        Some(prev) => plan_structure(prev, next, &opts),
        None => plan_structure(&LiveState::default(), next, &opts),
    };
    let camera_changed = previous.is_none_or(|p| !p.camera().same_view(next.camera()));
    if camera_changed {
        out.push(
            config
                .programmatic_transition
                .command(next.camera().clamped(&config.limits)),
        );
    }
    out
}

#[derive(Debug, Default)]
struct PlanOptions<'a> {
    geojson_in_place: bool,
    /// Layers that must be removed and re-added even when they look equal.
    dirty_layers: Option<&'a BTreeSet<LayerId>>,
    /// Sources that must be replaced even when they look equal.
    dirty_sources: Option<&'a BTreeSet<SourceId>>,
    /// Re-issue the position of every layer.
    force_reorder: bool,
    /// Layers the engine may still hold although the previous state lacks them.
    stray_layers: Option<&'a BTreeSet<LayerId>>,
    /// Sources the engine may still hold although the previous state lacks them.
    stray_sources: Option<&'a BTreeSet<SourceId>>,
}

fn plan_structure<S: Structure>(prev: &S, next: &DeclarativeSpec, opts: &PlanOptions<'_>) -> Vec<Command> {
    let is_dirty_source = |id: &SourceId| opts.dirty_sources.is_some_and(|d| d.contains(id));
    let is_dirty_layer = |id: &LayerId| opts.dirty_layers.is_some_and(|d| d.contains(id));

    // Sources.
    let mut removed_sources = Vec::new();
    let mut replaced = BTreeSet::new();
    let mut data_swaps = Vec::new();
    for old in prev.source_specs() {
        match next.source(old.id.as_str()) {
            None => removed_sources.push(old.id.clone()),
            Some(new) if is_dirty_source(&old.id) => {
                replaced.insert(new.id.clone());
            }
            Some(new) if new == old => {}
            Some(new) if opts.geojson_in_place && old.differs_only_in_geojson_data(new) => {
                data_swaps.push(Command::SetSourceData {
                    id: new.id.clone(),
                    data: new.data.clone(),
                });
            }
            Some(new) => {
                replaced.insert(new.id.clone());
            }
        }
    }

    // Layers matched by id. A layer is recreated when its source, kind or
    // source layer changes, or when its source is being replaced.
    let prev_layers = prev.layer_specs();
    let prev_by_id: HashMap<&LayerId, &LayerSpec> = prev_layers.iter().map(|l| (&l.id, l)).collect();
    let mut recreate = BTreeSet::new();
    for want in next.layers() {
        if let Some(old) = prev_by_id.get(&want.id)
            && (old.needs_recreate(want) || replaced.contains(&old.source) || is_dirty_layer(&want.id))
        {
            recreate.insert(want.id.clone());
        }
    }

    let mut out = Vec::new();
    for id in opts.stray_layers.into_iter().flatten() {
        if !prev_by_id.contains_key(id) {
            out.push(Command::RemoveLayer { id: id.clone() });
        }
    }

    let mut kept: Vec<LayerId> = Vec::with_capacity(prev_layers.len());
    for old in prev_layers {
        if next.layer(old.id.as_str()).is_none() || recreate.contains(&old.id) {
            out.push(Command::RemoveLayer { id: old.id.clone() });
        } else {
            kept.push(old.id.clone());
        }
    }

    for id in opts.stray_sources.into_iter().flatten() {
        if prev.source_spec(id.as_str()).is_none() {
            out.push(Command::RemoveSource { id: id.clone() });
        }
    }
    for id in removed_sources.iter().chain(replaced.iter()) {
        out.push(Command::RemoveSource { id: id.clone() });
    }

    for new in next.sources() {
        if prev.source_spec(new.id.as_str()).is_none() || replaced.contains(&new.id) {
            out.push(Command::AddSource { source: new.clone() });
        }
    }
    out.extend(data_swaps);

    // Additions go below the next layer that stays live; added layers sharing
    // an anchor stack in snapshot order.
    let kept_set: BTreeSet<&LayerId> = kept.iter().collect();
    let wanted = next.layers();
    let mut live = kept.clone();
    for (index, want) in wanted.iter().enumerate() {
        if kept_set.contains(&want.id) {
            continue;
        }
        let before = wanted[index + 1..]
            .iter()
            .find(|l| kept_set.contains(&l.id))
            .map(|l| l.id.clone());
        match before.as_ref().and_then(|b| live.iter().position(|id| id == b)) {
            Some(at) => live.insert(at, want.id.clone()),
            None => live.push(want.id.clone()),
        }
        out.push(Command::AddLayer {
            layer: want.clone(),
            before,
        });
    }

    let want_ids: Vec<LayerId> = wanted.iter().map(|l| l.id.clone()).collect();
    out.extend(reorder(&live, &want_ids, opts.force_reorder));

    for want in wanted {
        if recreate.contains(&want.id) {
            continue;
        }
        if let Some(old) = prev_by_id.get(&want.id) {
            property_updates(old, want, &mut out);
        }
    }

    out
}

fn property_updates(old: &LayerSpec, new: &LayerSpec, out: &mut Vec<Command>) {
    for change in old.paint.diff(&new.paint) {
        out.push(Command::SetPaintProperty {
            layer: new.id.clone(),
            name: change.name,
            value: change.value,
        });
    }
    for change in old.effective_layout().diff(&new.effective_layout()) {
        out.push(Command::SetLayoutProperty {
            layer: new.id.clone(),
            name: change.name,
            value: change.value,
        });
    }
    if old.filter != new.filter {
        out.push(Command::SetFilter {
            layer: new.id.clone(),
            filter: new.filter.clone(),
        });
    }
    if old.min_zoom != new.min_zoom || old.max_zoom != new.max_zoom {
        out.push(Command::SetZoomRange {
            layer: new.id.clone(),
            min: new.min_zoom,
            max: new.max_zoom,
        });
    }
}

/// Moves turning `live` into `want` (both bottom to top, same ids). Layers on
/// one longest run already in the right relative order stay put; every other
/// layer is placed below its successor, walking from the top down.
fn reorder(live: &[LayerId], want: &[LayerId], force: bool) -> Vec<Command> {
    let rank: HashMap<&LayerId, usize> = want.iter().enumerate().map(|(i, id)| (id, i)).collect();
    let mut in_place = vec![false; want.len()];
    if !force {
        let seq: Vec<usize> = live.iter().filter_map(|id| rank.get(id).copied()).collect();
        for (keep, r) in longest_increasing(&seq).into_iter().zip(&seq) {
            if keep {
                in_place[*r] = true;
            }
        }
    }

    (0..want.len())
        .rev()
        .filter(|&i| !in_place[i])
        .map(|i| Command::ReorderLayer {
            id: want[i].clone(),
            before: want.get(i + 1).cloned(),
        })
        .collect()
}

/// Flags the members of one longest strictly increasing subsequence.
fn longest_increasing(seq: &[usize]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut parent: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, &v) in seq.iter().enumerate() {
        let at = tails.partition_point(|&t| seq[t] < v);
        if at > 0 {
            parent[i] = Some(tails[at - 1]);
        }
        if at == tails.len() {
            tails.push(i);
        } else {
            tails[at] = i;
        }
    }
    let mut keep = vec![false; seq.len()];
    let mut cur = tails.last().copied();
    while let Some(i) = cur {
        keep[i] = true;
        cur = parent[i];
    }
    keep
}

/// Outcome of handing one batch to the map handle.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    pub planned: usize,
    pub ran: usize,
    pub queued: usize,
    pub rejected: Vec<CommandRejected>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Stateful reconciler: remembers what the engine holds.
#[derive(Debug, Clone)]
pub struct Reconciler {
    geojson_in_place: bool,
    applied: LiveState,
    dirty_layers: BTreeSet<LayerId>,
    dirty_sources: BTreeSet<SourceId>,
    order_dirty: bool,
    // Refused removals: the engine still holds these, the memory no longer does.
    stray_layers: BTreeSet<LayerId>,
    stray_sources: BTreeSet<SourceId>,
}

impl Reconciler {
    /// Memory of a freshly created engine: no sources, no layers.
    pub fn new(camera: CameraState, config: &SyncConfig) -> Self {
        Self {
            geojson_in_place: config.geojson_in_place,
            applied: LiveState::new(camera),
            dirty_layers: BTreeSet::new(),
            dirty_sources: BTreeSet::new(),
            order_dirty: false,
            stray_layers: BTreeSet::new(),
            stray_sources: BTreeSet::new(),
        }
    }

    pub fn applied(&self) -> &LiveState {
        &self.applied
    }

    /// Structure commands converging the remembered engine state to `next`,
    /// followed by `camera` when given.
    pub fn plan(&self, next: &DeclarativeSpec, camera: Option<Command>) -> Vec<Command> {
        let opts = PlanOptions {
            geojson_in_place: self.geojson_in_place,
            dirty_layers: Some(&self.dirty_layers),
            dirty_sources: Some(&self.dirty_sources),
            force_reorder: self.order_dirty,
            stray_layers: Some(&self.stray_layers),
            stray_sources: Some(&self.stray_sources),
        };
        let mut batch = plan_structure(&self.applied, next, &opts);
        batch.extend(camera);
        tracing::debug!(
            commands = batch.len(),
            layers = next.layers().len(),
            sources = next.sources().count(),
            "planned reconcile batch"
        );
        batch
    }

    /// Records a command the engine accepted, or that is queued for it.
    pub fn record(&mut self, command: &Command) {
        match command {
            Command::AddSource { source } => {
                self.dirty_sources.remove(&source.id);
            }
            Command::AddLayer { layer, .. } => {
                self.dirty_layers.remove(&layer.id);
            }
            Command::ReorderLayer { .. } => self.order_dirty = false,
            Command::RemoveLayer { id } => {
                if self.stray_layers.remove(id) && self.applied.layer(id.as_str()).is_none() {
                    return;
                }
            }
            Command::RemoveSource { id } => {
                if self.stray_sources.remove(id) && self.applied.source(id.as_str()).is_none() {
                    return;
                }
            }
            _ => {}
        }
        if let Err(e) = self.applied.apply(command) {
            // The engine took a command the memory cannot follow. Recreate
            // what it touched next time.
            tracing::warn!(command = %command, error = %e, "reconciler memory out of step");
            match command {
                Command::RemoveSource { id } => self.applied.forget_source(id.as_str()),
                Command::RemoveLayer { .. } => {}
                _ => self.note_rejected(command, &e),
            }
        }
    }

    /// Repairs the memory after the engine refused `command`, so the next
    /// plan issues it again. Works whether or not `command` was recorded.
    pub fn note_rejected(&mut self, command: &Command, reason: &EngineError) {
        let duplicate = matches!(reason, EngineError::DuplicateId(_));
        match command {
            Command::AddSource { source } if duplicate => {
                // The engine holds a source under this id with unknown
                // content: remember one and replace it next pass.
                let _ = self.applied.apply(command);
                self.dirty_sources.insert(source.id.clone());
            }
            Command::AddSource { source } => {
                self.applied.forget_source(source.id.as_str());
            }
            Command::AddLayer { layer, .. } if duplicate => {
                let held = self.applied.layer(layer.id.as_str()).is_some();
                if held || self.applied.apply(command).is_ok() {
                    self.dirty_layers.insert(layer.id.clone());
                } else {
                    self.stray_layers.insert(layer.id.clone());
                }
            }
            Command::AddLayer { layer, .. } => {
                self.applied.forget_layer(layer.id.as_str());
            }
            // Memory still holding the id means it was never recorded as
            // removed, or a later add of the same id was; either way the
            // next plan sees it. Otherwise the engine keeps a stray.
            Command::RemoveLayer { id } => {
                if self.applied.layer(id.as_str()).is_none()
                    && !matches!(reason, EngineError::UnknownLayer(_))
                {
                    self.stray_layers.insert(id.clone());
                }
            }
            Command::RemoveSource { id } => {
                if self.applied.source(id.as_str()).is_none()
                    && !matches!(reason, EngineError::UnknownSource(_))
                {
                    self.stray_sources.insert(id.clone());
                }
            }
            Command::SetSourceData { id, .. } => {
                self.dirty_sources.insert(id.clone());
            }
            Command::ReorderLayer { .. } => self.order_dirty = true,
            Command::SetPaintProperty { layer, .. }
            | Command::SetLayoutProperty { layer, .. }
            | Command::SetFilter { layer, .. }
            | Command::SetZoomRange { layer, .. } => {
                self.dirty_layers.insert(layer.clone());
            }
            Command::FlyTo { .. } | Command::JumpTo { .. } => {}
        }
    }

    /// Whether the memory matches `spec` and nothing awaits a retry.
    pub fn is_converged(&self, spec: &DeclarativeSpec) -> bool {
        !self.order_dirty
            && self.dirty_layers.is_empty()
            && self.dirty_sources.is_empty()
            && self.stray_layers.is_empty()
            && self.stray_sources.is_empty()
            && self.applied.matches_structure(spec)
    }
}
