//! FableInk Core Library
//!
//! Collaborative vector drawing engine for story-page illustration:
//! layered document model, drawing-tool pipeline, selection/transform
//! controller, alignment guides, bounded undo history, and the
//! synchronization layer that keeps concurrent editors converged.

pub mod collaboration;
pub mod document;
pub mod engine;
pub mod error;
pub mod guides;
pub mod items;
pub mod sync;
pub mod tools;
pub mod transform;

pub use collaboration::{CollaborationManager, Provenance};
pub use document::{CANVAS_SIZE, Document, Layer, LayerId};
pub use engine::{Engine, RasterExporter};
pub use error::EngineError;
pub use guides::{Guide, GuideKind, GuideResult, Orientation, compute_guides};
pub use items::{
    Fill, Item, ItemId, ItemKind, ItemStyle, Role, SerializableColor, ShapeKind, TextAlign,
    TextItem,
};
pub use sync::{CanvasScope, LayerAction, OperationKind, RemoteOperation, TransformKind};
pub use tools::{BrushKind, ToolKind, ToolSession, ToolSettings};
pub use transform::{Handle, HandleKind, TransformMode, TransformSession, selection_handles};
