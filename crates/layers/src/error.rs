use foundation::ids::{LayerId, SourceId};

/// Reasons a snapshot is rejected at construction time.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecError {
    Json(String),
    NonFiniteCamera,
    DuplicateSource(SourceId),
    InvalidSource { source: SourceId, reason: String },
    DuplicateLayer(LayerId),
    MissingSource { layer: LayerId, source: SourceId },
    OrderMismatch { layer: LayerId, expected: u32, found: u32 },
    InvalidZoomRange(LayerId),
}

impl std::fmt::Display for SpecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecError::Json(msg) => write!(f, "snapshot json: {msg}"),
            SpecError::NonFiniteCamera => write!(f, "camera contains non-finite values"),
            SpecError::DuplicateSource(id) => write!(f, "duplicate source id `{id}`"),
            SpecError::InvalidSource { source, reason } => {
                write!(f, "source `{source}` is invalid: {reason}")
            }
            SpecError::DuplicateLayer(id) => write!(f, "duplicate layer id `{id}`"),
            SpecError::MissingSource { layer, source } => {
                write!(f, "layer `{layer}` references unknown source `{source}`")
            }
            SpecError::OrderMismatch {
                layer,
                expected,
                found,
            } => write!(
                f,
                "layer `{layer}` has order {found} but sits at index {expected}"
            ),
            SpecError::InvalidZoomRange(id) => write!(f, "layer `{id}` has an invalid zoom range"),
        }
    }
}

impl std::error::Error for SpecError {}
