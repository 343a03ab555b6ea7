//! Engine-wide error taxonomy.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the drawing engine.
///
/// Nothing here is fatal: callers either drop the offending operation
/// (malformed payloads) or report the rejection to the user (layer rules).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A wire payload or snapshot failed to deserialize.
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A snapshot blob was not valid base64.
    #[error("invalid snapshot encoding")]
    SnapshotEncoding,

    /// A layer id did not resolve to a layer in this document.
    #[error("layer not found: {0}")]
    LayerNotFound(Uuid),

    /// The requested layer operation is not allowed on the background layer.
    #[error("operation not permitted on the background layer")]
    BackgroundLayer,

    /// Deleting the last remaining drawing layer is rejected.
    #[error("cannot delete the last drawing layer")]
    LastDrawingLayer,

    /// An item id did not resolve to an item in this document.
    #[error("item not found: {0}")]
    ItemNotFound(Uuid),
}
