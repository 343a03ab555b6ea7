//! Wire format for collaboration messages.
//!
//! Every message is one JSON object: an operation tag plus its payload,
//! the id of the item it targets, and the canvas-scope fields that let a
//! peer discard operations meant for a different page of the story.

use crate::items::{Fill, FontWeight, Item, SerializableColor, TextAlign};
use kurbo::{Affine, Point, Rect};
use serde::{Deserialize, Serialize};

/// Identifies which page/canvas of the session an operation belongs to.
/// Peers on other pages share the channel and must ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasScope {
    pub page_id: String,
    pub page_index: usize,
    #[serde(default)]
    pub is_cover_image: bool,
}

impl CanvasScope {
    pub fn new(page_id: impl Into<String>, page_index: usize) -> Self {
        Self {
            page_id: page_id.into(),
            page_index,
            is_cover_image: false,
        }
    }

    /// Whether an inbound operation scoped to `other` targets this canvas.
    /// Clients disagree on how pages are named (some send an id, some a
    /// constructed `page_N`), so the match tries all three spellings.
    pub fn matches(&self, other: &CanvasScope) -> bool {
        if self.is_cover_image != other.is_cover_image {
            return false;
        }
        self.page_id == other.page_id
            || self.page_id == format!("page_{}", other.page_index)
            || other.page_id == format!("page_{}", self.page_index)
            || self.page_index == other.page_index
    }
}

/// One collaboration message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOperation {
    #[serde(flatten)]
    pub kind: OperationKind,
    /// Target item id as a string: peers built on other stacks send ids
    /// that are not always UUIDs.
    #[serde(rename = "itemId", skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(flatten)]
    pub scope: CanvasScope,
}

/// Operation payloads, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    /// A committed item tree: the root first, children after it.
    Draw { items: Vec<Item> },
    Transform(TransformPayload),
    Fill(FillPayload),
    Delete,
    Layer { action: LayerAction },
    Text(TextPayload),
}

/// Which gesture produced a transform update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Move,
    Resize,
    Rotate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePoint {
    pub x: f64,
    pub y: f64,
}

impl From<Point> for WirePoint {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<WirePoint> for Point {
    fn from(p: WirePoint) -> Self {
        Point::new(p.x, p.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Rect> for WireBounds {
    fn from(r: Rect) -> Self {
        Self {
            x: r.x0,
            y: r.y0,
            width: r.width(),
            height: r.height(),
        }
    }
}

impl From<WireBounds> for Rect {
    fn from(b: WireBounds) -> Self {
        Rect::new(b.x, b.y, b.x + b.width, b.y + b.height)
    }
}

/// Transform update. Moves carry the matrix and position; resizes and
/// rotations additionally carry the re-exported item tree in `path_data`
/// so peers replace geometry instead of replaying scale factors, which
/// would accumulate rounding divergence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformPayload {
    pub mode: TransformKind,
    /// Affine coefficients in kurbo order.
    pub matrix: [f64; 6],
    pub bounds: WireBounds,
    pub rotation: f64,
    pub scale: WirePoint,
    pub position: WirePoint,
    /// JSON-encoded item tree (root first) for exact reconstruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_data: Option<String>,
}

impl TransformPayload {
    /// Build a payload describing an item's current placement.
    pub fn new(mode: TransformKind, bounds: Rect, rotation: f64) -> Self {
        let center = bounds.center();
        let matrix = Affine::translate(center.to_vec2())
            * Affine::rotate(rotation)
            * Affine::translate(-center.to_vec2());
        Self {
            mode,
            matrix: matrix.as_coeffs(),
            bounds: bounds.into(),
            rotation,
            scale: WirePoint { x: 1.0, y: 1.0 },
            position: WirePoint {
                x: bounds.x0,
                y: bounds.y0,
            },
            path_data: None,
        }
    }

    pub fn with_items(mut self, items: &[Item]) -> Result<Self, serde_json::Error> {
        self.path_data = Some(serde_json::to_string(items)?);
        Ok(self)
    }

    pub fn items(&self) -> Option<Vec<Item>> {
        let data = self.path_data.as_deref()?;
        serde_json::from_str(data).ok()
    }
}

/// What a fill operation targets when it lands on a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillTarget {
    Shape,
    Text,
    Background,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillPayload {
    pub target_type: FillTarget,
    pub fill: Fill,
    /// Bounds of the filled item, used as a fallback match when the id
    /// is missing on the receiving side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<WireBounds>,
    /// Click point, the last-resort fallback match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<WirePoint>,
}

/// Layer management operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LayerAction {
    Create { layer_id: String, name: String },
    Delete { layer_id: String },
    Rename { layer_id: String, name: String },
    SetVisible { layer_id: String, visible: bool },
    SetOpacity { layer_id: String, opacity: f64 },
    SetLocked { layer_id: String, locked: bool },
    Duplicate { source_id: String, new_id: String },
    MergeDown { layer_id: String },
    Reorder { layer_id: String, index: usize },
    Clear { layer_id: String },
}

/// Text creation or edit. `position` is the laid-out top-left; `align`
/// travels as an attribute only, the receiver must not shift again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPayload {
    pub content: String,
    pub position: WirePoint,
    pub font_size: f64,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default = "SerializableColor::black")]
    pub color: SerializableColor,
    #[serde(default)]
    pub align: TextAlign,
}

fn default_font_family() -> String {
    "sans-serif".to_string()
}

impl RemoteOperation {
    pub fn draw(scope: CanvasScope, items: Vec<Item>) -> Self {
        let item_id = items.first().map(|item| item.id.to_string());
        Self {
            kind: OperationKind::Draw { items },
            item_id,
            scope,
        }
    }

    pub fn transform(scope: CanvasScope, item_id: String, payload: TransformPayload) -> Self {
        Self {
            kind: OperationKind::Transform(payload),
            item_id: Some(item_id),
            scope,
        }
    }

    pub fn fill(scope: CanvasScope, item_id: Option<String>, payload: FillPayload) -> Self {
        Self {
            kind: OperationKind::Fill(payload),
            item_id,
            scope,
        }
    }

    pub fn delete(scope: CanvasScope, item_id: String) -> Self {
        Self {
            kind: OperationKind::Delete,
            item_id: Some(item_id),
            scope,
        }
    }

    pub fn layer(scope: CanvasScope, action: LayerAction) -> Self {
        Self {
            kind: OperationKind::Layer { action },
            item_id: None,
            scope,
        }
    }

    pub fn text(scope: CanvasScope, item_id: String, payload: TextPayload) -> Self {
        Self {
            kind: OperationKind::Text(payload),
            item_id: Some(item_id),
            scope,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Base64 encoding for snapshot blobs.
pub fn base64_encode(data: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Base64 decoding for snapshot blobs.
pub fn base64_decode(input: &str) -> Option<Vec<u8>> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.decode(input).ok()
}
