//! One mounted map: the handle, its reconciler, the event bridge and the
//! viewport store, wired together.

use layers::{CameraState, DeclarativeSpec};

use crate::bridge::EventBridge;
use crate::command::Command;
use crate::config::{CameraTransition, SyncConfig};
use crate::engine::MapEngine;
use crate::error::{CommandRejected, EngineInitError, SyncError};
use crate::event::EngineEvent;
use crate::handle::{Dispatch, MapHandle};
use crate::metrics::SyncMetrics;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::viewport::{ListenerId, Origin, ViewportStore};

pub struct MapView<E: MapEngine> {
    config: SyncConfig,
    handle: MapHandle<E>,
    reconciler: Reconciler,
    bridge: EventBridge,
    viewport: ViewportStore,
    metrics: SyncMetrics,
    current: DeclarativeSpec,
    context_lost: bool,
}

impl<E: MapEngine> std::fmt::Debug for MapView<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapView")
            .field("handle", &self.handle)
            .field("bridge", &self.bridge)
            .field("viewport", &self.viewport)
            .field("context_lost", &self.context_lost)
            .finish_non_exhaustive()
    }
}

impl<E: MapEngine> MapView<E> {
    /// Creates the engine on `surface` and queues `initial` for when it
    /// becomes ready.
    pub fn mount(
        surface: &E::Surface,
        initial: DeclarativeSpec,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        config.validate().map_err(SyncError::InvalidConfig)?;
        let camera = initial.camera().clamped(&config.limits);
        let initial = initial.with_camera(camera)?;
        let handle = MapHandle::create(surface, &initial, config.max_pending)?;
        Self::wire(handle, initial, config)
    }

    /// Mounts on an engine the host already created at `initial`'s camera.
    pub fn from_engine(
        engine: E,
        initial: DeclarativeSpec,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        // Dropping `handle` on an early return releases the engine.
        let handle = MapHandle::from_engine(engine, config.max_pending);
        config.validate().map_err(SyncError::InvalidConfig)?;
        let camera = initial.camera().clamped(&config.limits);
        let initial = initial.with_camera(camera)?;
        Self::wire(handle, initial, config)
    }

    fn wire(
        mut handle: MapHandle<E>,
        initial: DeclarativeSpec,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let camera = *initial.camera();
        let mut bridge = EventBridge::new();
        // A failed subscription drops `handle`, which releases the engine.
        bridge
            .subscribe(&mut handle, |_| {})
            .map_err(|e| SyncError::Init(EngineInitError::Library(e.to_string())))?;

        let mut viewport = ViewportStore::new(camera, config.limits);
        viewport.mark_applied(camera);

        let mut view = Self {
            reconciler: Reconciler::new(camera, &config),
            config,
            handle,
            bridge,
            viewport,
            metrics: SyncMetrics::new(),
            current: initial.clone(),
            context_lost: false,
        };
        view.update(initial)?;
        Ok(view)
    }

    /// Tears down the current engine and mounts a new one. On failure the view
    /// stays unmounted.
    pub fn remount(
        &mut self,
        surface: &E::Surface,
        initial: DeclarativeSpec,
    ) -> Result<(), SyncError> {
        self.unmount();
        *self = Self::mount(surface, initial, self.config.clone())?;
        Ok(())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn current(&self) -> &DeclarativeSpec {
        &self.current
    }

    pub fn viewport(&self) -> &ViewportStore {
        &self.viewport
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    pub fn is_mounted(&self) -> bool {
        !self.handle.is_destroyed()
    }

    pub fn pending_len(&self) -> usize {
        self.handle.pending_len()
    }

    /// Whether the engine holds the current snapshot's sources and layers
    /// with nothing queued or awaiting a retry.
    pub fn is_converged(&self) -> bool {
        self.handle.is_ready()
            && self.handle.pending_len() == 0
            && self.reconciler.is_converged(&self.current)
    }

    pub fn engine(&self) -> Option<&E> {
        self.handle.engine()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.handle.engine_mut()
    }

    /// Adds a callback for every translated engine event.
    pub fn on_event(&mut self, callback: impl FnMut(&EngineEvent) + 'static) {
        self.bridge.add_callback(callback);
    }

    /// Adds a callback for every viewport write.
    pub fn on_camera(&mut self, callback: impl FnMut(&CameraState, Origin) + 'static) -> ListenerId {
        self.viewport.subscribe(callback)
    }

    fn check_alive(&self) -> Result<(), SyncError> {
        if self.handle.is_destroyed() {
            return Err(SyncError::Destroyed);
        }
        if self.context_lost {
            return Err(SyncError::ContextLost);
        }
        Ok(())
    }

    /// Converges the engine toward `next`. Single refused commands are
    /// reported, not returned as errors.
    pub fn update(&mut self, next: DeclarativeSpec) -> Result<ReconcileReport, SyncError> {
        self.check_alive()?;

        let desired = *next.camera();
        let camera = self.viewport.camera_command(&desired, &self.config);
        match &camera {
            // The snapshot followed the engine's own motion.
            None if !self.current.camera().same_view(&desired) => {
                self.metrics.echoes_suppressed += 1;
            }
            Some(_) if !self.viewport.get().same_view(&desired.clamped(self.viewport.limits())) => {
                self.viewport.set(desired, Origin::Programmatic);
                self.metrics.camera_writes_programmatic += 1;
            }
            _ => {}
        }

        let batch = self.reconciler.plan(&next, camera);
        self.metrics.record_batch(batch.len());
        let mut report = ReconcileReport {
            planned: batch.len(),
            ..ReconcileReport::default()
        };
        for command in batch {
            match self.handle.enqueue_or_run(command.clone()) {
                Ok(dispatch) => {
                    match dispatch {
                        Dispatch::Ran => {
                            report.ran += 1;
                            self.metrics.commands_run += 1;
                        }
                        Dispatch::Queued => {
                            report.queued += 1;
                            self.metrics.commands_queued += 1;
                        }
                    }
                    self.accepted(&command);
                }
                Err(rejected) => {
                    self.rejected(&command, &rejected);
                    report.rejected.push(rejected);
                }
            }
        }
        self.current = next;
        Ok(report)
    }

    /// Programmatic navigation: writes the viewport store and converges the
    /// engine with the programmatic transition.
    pub fn navigate(&mut self, camera: CameraState) -> Result<ReconcileReport, SyncError> {
        self.check_alive()?;
        self.viewport.navigate(camera);
        self.metrics.camera_writes_programmatic += 1;
        let next = self.current.with_camera(self.viewport.get())?;
        self.update(next)
    }

    pub fn navigate_with(
        &mut self,
        camera: CameraState,
        transition: CameraTransition,
    ) -> Result<ReconcileReport, SyncError> {
        self.check_alive()?;
        self.viewport.navigate_with(camera, transition);
        self.metrics.camera_writes_programmatic += 1;
        let next = self.current.with_camera(self.viewport.get())?;
        self.update(next)
    }

    /// Delivers queued engine events. Readiness flushes the pending commands;
    /// a lost rendering context is returned as an error after the remaining
    /// events were delivered.
    pub fn pump_events(&mut self) -> Result<Vec<EngineEvent>, SyncError> {
        if self.handle.is_destroyed() {
            return Err(SyncError::Destroyed);
        }
        let events = self.bridge.dispatch(&mut self.viewport, &mut self.metrics);
        let mut lost = false;
        for event in &events {
            match event {
                EngineEvent::Ready => self.flush(),
                EngineEvent::Error { reason } => {
                    tracing::warn!(%reason, "map engine reported an error");
                }
                EngineEvent::ContextLost => lost = true,
                _ => {}
            }
        }
        if lost {
            self.context_lost = true;
            tracing::warn!("rendering context lost");
            return Err(SyncError::ContextLost);
        }
        Ok(events)
    }

    fn flush(&mut self) {
        for (command, result) in self.handle.mark_ready() {
            match result {
                Ok(()) => self.metrics.commands_flushed += 1,
                Err(rejected) => self.rejected(&command, &rejected),
            }
        }
    }

    fn accepted(&mut self, command: &Command) {
        if let Some(camera) = command.camera() {
            self.viewport.mark_applied(*camera);
        }
        self.reconciler.record(command);
    }

    fn rejected(&mut self, command: &Command, rejected: &CommandRejected) {
        tracing::warn!(command = %command, error = %rejected, "engine refused command");
        self.metrics.commands_rejected += 1;
        if command.is_camera() {
            self.viewport.invalidate_applied();
        }
        self.reconciler.note_rejected(command, &rejected.reason);
    }

    /// Removes the event listeners, then frees the engine. Returns `true` on
    /// the call that released it.
    pub fn unmount(&mut self) -> bool {
        self.bridge.unsubscribe(&mut self.handle);
        self.handle.destroy()
    }
}

impl<E: MapEngine> Drop for MapView<E> {
    fn drop(&mut self) {
        self.unmount();
    }
}
