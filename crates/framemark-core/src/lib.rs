//! FrameMark Core Library
//!
//! Platform-agnostic annotation engine for drawing lines, curves, areas,
//! rectangles and circles over a media frame, with layers, undo/redo and a
//! rasterized detection-matrix export.

pub mod actions;
pub mod arrange;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod events;
pub mod export;
pub mod geometry;
pub mod history;
pub mod input;
pub mod layers;
pub mod resolution;
pub mod selection;
pub mod shapes;
pub mod snap;
pub mod tools;

pub use arrange::{Alignment, ArrangeResult, Arranger, Axis, Group, ZOrder};
pub use config::{EngineConfig, HistoryConfig, LayerConfig};
pub use document::{DocumentState, HistorySnapshot, SyncStats};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, HistoryError, OpResult};
pub use events::{EngineEvent, EventBus, FeedbackLevel, Subscription};
pub use export::{BoxFuture, ExportedFrame, FrameExporter, FrameSnapshot, MatrixPngExporter};
pub use geometry::{DetectionMatrix, generate_matrix};
pub use history::{HistoryManager, HistoryStats, Operation};
pub use input::{InputState, Modifiers, MouseButton, PointerEvent};
pub use layers::{Layer, LayerId, LayerManager, LayerState, LayerVisibility, RenderLayer};
pub use resolution::Resolution;
pub use shapes::{Element, ElementId, ElementInfo, ElementKind, SemanticType, SerializableColor, SyncState};
pub use snap::{GridSnap, SnapProvider, SnapResult};
pub use tools::{DrawingMode, ToolManager};
