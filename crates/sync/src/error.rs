use layers::SpecError;

use crate::command::{Command, CommandKind};

/// The engine could not be brought up on the given surface. Fatal for the
/// mount attempt; the host decides whether to retry or show a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineInitError {
    InvalidSurface(String),
    ContextUnavailable(String),
    Library(String),
}

impl std::fmt::Display for EngineInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineInitError::InvalidSurface(msg) => write!(f, "invalid rendering surface: {msg}"),
            EngineInitError::ContextUnavailable(msg) => {
                write!(f, "rendering context unavailable: {msg}")
            }
            EngineInitError::Library(msg) => write!(f, "map engine failed to start: {msg}"),
        }
    }
}

impl std::error::Error for EngineInitError {}

/// Why the engine refused a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    DuplicateId(String),
    UnknownSource(String),
    UnknownLayer(String),
    SourceInUse { source: String, layer: String },
    QueueFull(usize),
    Disposed,
    Native(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::DuplicateId(id) => write!(f, "id `{id}` already exists"),
            EngineError::UnknownSource(id) => write!(f, "no source `{id}`"),
            EngineError::UnknownLayer(id) => write!(f, "no layer `{id}`"),
            EngineError::SourceInUse { source, layer } => {
                write!(f, "source `{source}` is still used by layer `{layer}`")
            }
            EngineError::QueueFull(n) => write!(f, "pending command queue full ({n})"),
            EngineError::Disposed => write!(f, "engine already destroyed"),
            EngineError::Native(msg) => write!(f, "engine error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// A command the engine refused. Recovered locally: logged, skipped, and
/// retried by the next reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRejected {
    pub kind: CommandKind,
    pub target: String,
    pub reason: EngineError,
}

impl CommandRejected {
    pub fn new(command: &Command, reason: EngineError) -> Self {
        Self {
            kind: command.kind(),
            target: command.target().to_string(),
            reason,
        }
    }
}

impl std::fmt::Display for CommandRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} `{}` rejected: {}",
            self.kind.as_str(),
            self.target,
            self.reason
        )
    }
}

impl std::error::Error for CommandRejected {}

/// An engine event that could not be translated. Dropped after logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDispatchError {
    UnknownKind(String),
    Malformed { kind: String, reason: String },
}

impl std::fmt::Display for EventDispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventDispatchError::UnknownKind(kind) => write!(f, "unknown engine event `{kind}`"),
            EventDispatchError::Malformed { kind, reason } => {
                write!(f, "malformed `{kind}` event: {reason}")
            }
        }
    }
}

impl std::error::Error for EventDispatchError {}

/// Errors surfaced to the host application by a mounted view.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    Init(EngineInitError),
    InvalidConfig(String),
    InvalidSpec(SpecError),
    ContextLost,
    Destroyed,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Init(e) => write!(f, "{e}"),
            SyncError::InvalidConfig(e) => write!(f, "{e}"),
            SyncError::InvalidSpec(e) => write!(f, "{e}"),
            SyncError::ContextLost => write!(f, "rendering context lost"),
            SyncError::Destroyed => write!(f, "map view already destroyed"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Init(e) => Some(e),
            SyncError::InvalidSpec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineInitError> for SyncError {
    fn from(e: EngineInitError) -> Self {
        SyncError::Init(e)
    }
}

impl From<SpecError> for SyncError {
    fn from(e: SpecError) -> Self {
        SyncError::InvalidSpec(e)
    }
}
