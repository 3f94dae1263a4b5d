//! Error and result types shared by every engine component.

use crate::layers::LayerId;
use crate::shapes::ElementId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// History cursor failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("Nothing to redo")]
    NothingToRedo,
    #[error("History position {0} is out of range")]
    OutOfRange(usize),
    #[error("History entry missing at position {0}")]
    MissingEntry(usize),
    #[error("History is already being applied")]
    Reentrant,
}

/// Errors reported by engine operations.
///
/// These are values, not panics: every failure leaves the document untouched
/// and is surfaced to the host either as an [`OpResult`] or as a feedback event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Element not found: {0}")]
    ElementNotFound(ElementId),
    #[error("Layer not found: {0}")]
    LayerNotFound(LayerId),
    #[error("Operation requires at least {required} elements, got {found}")]
    NotEnoughElements { required: usize, found: usize },
    #[error("Element needs at least {required} points, got {found}")]
    NotEnoughPoints { required: usize, found: usize },
    #[error("The {0} is too small")]
    DegenerateElement(String),
    #[error("No element is being drawn")]
    NotDrawing,
    #[error("Nothing is selected")]
    NothingSelected,
    #[error("Cannot delete the last layer")]
    LastLayer,
    #[error("Layer limit of {0} reached")]
    LayerLimit(usize),
    #[error("Opacity {0} is outside [0, 1]")]
    InvalidOpacity(f64),
    #[error("Invalid resolution {width}x{height}")]
    InvalidResolution { width: f64, height: f64 },
    #[error("Layer system is disabled")]
    LayersDisabled,
    #[error("Layer {0} is locked")]
    LayerLocked(LayerId),
    #[error("No elements are grouped")]
    NothingGrouped,
    #[error("Clipboard is empty")]
    ClipboardEmpty,
    #[error("Listener limit of {0} reached")]
    TooManyListeners(usize),
    #[error("Media failed to load: {0}")]
    Media(String),
    #[error("Export failed: {0}")]
    Export(String),
    #[error("Invalid document: {0}")]
    Document(String),
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Outcome of a public engine operation as seen by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub affected_elements: Vec<ElementId>,
}

impl OpResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            affected_elements: Vec::new(),
        }
    }

    pub fn ok_with(message: impl Into<String>, affected_elements: Vec<ElementId>) -> Self {
        Self {
            success: true,
            message: message.into(),
            affected_elements,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            affected_elements: Vec::new(),
        }
    }
}

impl From<&EngineError> for OpResult {
    fn from(err: &EngineError) -> Self {
        Self::failed(err.to_string())
    }
}
