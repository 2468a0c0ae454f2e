//! Single source of truth for the camera.
//!
//! Written from two directions: the event bridge reports where the engine's
//! camera went (`Origin::User`), the application navigates
//! (`Origin::Programmatic`). Last writer wins. A `User` write also records the
//! value as already shown by the engine, which is what keeps a snapshot built
//! from the store from sending the engine's own motion back to it.

use layers::{CameraLimits, CameraState};
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::config::{CameraTransition, SyncConfig};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Camera motion produced by the engine (gestures, animations).
    User,
    /// Camera set by application code.
    Programmatic,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

type Listener = Box<dyn FnMut(&CameraState, Origin)>;

pub struct ViewportStore {
    camera: CameraState,
    origin: Origin,
    revision: u64,
    limits: CameraLimits,
    /// Last camera known to be displayed by the engine.
    engine_camera: Option<CameraState>,
    /// Transition requested together with the latest programmatic write.
    requested_transition: Option<CameraTransition>,
    next_listener: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl std::fmt::Debug for ViewportStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportStore")
            .field("camera", &self.camera)
            .field("origin", &self.origin)
            .field("revision", &self.revision)
            .field("engine_camera", &self.engine_camera)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl ViewportStore {
    pub fn new(camera: CameraState, limits: CameraLimits) -> Self {
        Self {
            camera: camera.clamped(&limits),
            origin: Origin::Programmatic,
            revision: 0,
            limits,
            engine_camera: None,
            requested_transition: None,
            next_listener: 0,
            listeners: Vec::new(),
        }
    }

    pub fn get(&self) -> CameraState {
        self.camera
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Increments on every write; cheap change detection for UI bindings.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn limits(&self) -> &CameraLimits {
        &self.limits
    }

    pub fn set(&mut self, next: CameraState, origin: Origin) {
        let next = next.clamped(&self.limits);
        self.camera = next;
        self.origin = origin;
        self.revision += 1;
        match origin {
            Origin::User => {
                self.engine_camera = Some(next);
                self.requested_transition = None;
            }
            Origin::Programmatic => {}
        }
        for (_, listener) in &mut self.listeners {
            listener(&next, origin);
        }
    }

    /// Programmatic write.
    pub fn navigate(&mut self, camera: CameraState) {
        self.set(camera, Origin::Programmatic);
    }

    /// Programmatic write that asks for a specific transition instead of the
    /// configured one.
    pub fn navigate_with(&mut self, camera: CameraState, transition: CameraTransition) {
        self.set(camera, Origin::Programmatic);
        self.requested_transition = Some(transition);
    }

    /// Whether `camera` is what the engine already shows.
    pub fn is_echo(&self, camera: &CameraState) -> bool {
        self.engine_camera
            .is_some_and(|shown| shown.same_view(&camera.clamped(&self.limits)))
    }

    pub fn engine_camera(&self) -> Option<CameraState> {
        self.engine_camera
    }

    /// Records that the engine was told to show `camera`.
    pub fn mark_applied(&mut self, camera: CameraState) {
        self.engine_camera = Some(camera.clamped(&self.limits));
        self.requested_transition = None;
    }

    /// Forgets what the engine shows, so the next snapshot re-issues its
    /// camera.
    pub fn invalidate_applied(&mut self) {
        self.engine_camera = None;
    }

    /// The camera command needed to show `desired`, or `None` when the engine
    /// already shows it.
    ///
    /// A camera that matches the latest programmatic write moves with the
    /// programmatic transition (or the one passed to [`Self::navigate_with`]);
    /// anything else came straight from UI state and uses the user transition.
    pub fn camera_command(&self, desired: &CameraState, config: &SyncConfig) -> Option<Command> {
        if self.is_echo(desired) {
            return None;
        }
        let desired = desired.clamped(&self.limits);
        let transition = match self.requested_transition {
            Some(t) => t,
            None if self.origin == Origin::Programmatic && self.camera.same_view(&desired) => {
                config.programmatic_transition
            }
            None => config.user_transition,
        };
        Some(transition.command(desired))
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&CameraState, Origin) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }
}
