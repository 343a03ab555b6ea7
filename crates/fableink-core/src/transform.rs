//! Selection handles and the move/resize/rotate state machine.
//!
//! A [`TransformSession`] freezes the item's geometry at pointer-down and
//! reapplies every frame from that frozen state, so long drags never
//! accumulate floating-point drift.

use crate::document::Document;
use crate::items::{Item, ItemId};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Handle size in screen pixels.
pub const HANDLE_SIZE: f64 = 16.0;
/// Handle hit tolerance, tuned generously for touch.
pub const HANDLE_HIT_TOLERANCE: f64 = 24.0;
/// Distance from the top edge to the rotation handle.
pub const ROTATE_HANDLE_OFFSET: f64 = 25.0;
/// Minimum item size enforced during resize.
pub const MIN_ITEM_SIZE: f64 = 10.0;
/// Pointer-downs within this fraction of the bounding-box diagonal from
/// the center prefer moving over handle grabbing, so small items stay
/// movable without fighting for a handle.
pub const MOVE_BIAS_FRACTION: f64 = 0.3;

/// Corner positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Edge positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

/// Type of selection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    /// Corner resize handle (aspect-locked).
    Corner(Corner),
    /// Edge midpoint resize handle (single axis).
    Edge(Edge),
    /// Rotation handle above the top-center.
    Rotate,
}

/// A selection handle with its position.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    pub position: Point,
    pub kind: HandleKind,
}

impl Handle {
    pub fn new(position: Point, kind: HandleKind) -> Self {
        Self { position, kind }
    }

    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let dx = point.x - self.position.x;
        let dy = point.y - self.position.y;
        dx * dx + dy * dy <= tolerance * tolerance
    }
}

/// Generate the handles for a selection: four corners, four edge
/// midpoints, and the rotation handle, all rotated with the item.
pub fn selection_handles(bounds: Rect, rotation: f64) -> Vec<Handle> {
    let center = bounds.center();
    let half_w = bounds.width() / 2.0;
    let half_h = bounds.height() / 2.0;
    let cos_r = rotation.cos();
    let sin_r = rotation.sin();

    let at = |dx: f64, dy: f64| -> Point {
        Point::new(
            center.x + dx * cos_r - dy * sin_r,
            center.y + dx * sin_r + dy * cos_r,
        )
    };

    vec![
        Handle::new(at(-half_w, -half_h), HandleKind::Corner(Corner::TopLeft)),
        Handle::new(at(half_w, -half_h), HandleKind::Corner(Corner::TopRight)),
        Handle::new(at(-half_w, half_h), HandleKind::Corner(Corner::BottomLeft)),
        Handle::new(at(half_w, half_h), HandleKind::Corner(Corner::BottomRight)),
        Handle::new(at(0.0, -half_h), HandleKind::Edge(Edge::Top)),
        Handle::new(at(half_w, 0.0), HandleKind::Edge(Edge::Right)),
        Handle::new(at(0.0, half_h), HandleKind::Edge(Edge::Bottom)),
        Handle::new(at(-half_w, 0.0), HandleKind::Edge(Edge::Left)),
        Handle::new(
            at(0.0, -half_h - ROTATE_HANDLE_OFFSET),
            HandleKind::Rotate,
        ),
    ]
}

/// Find which handle (if any) is hit at the given point.
pub fn hit_test_handles(
    bounds: Rect,
    rotation: f64,
    point: Point,
    tolerance: f64,
) -> Option<HandleKind> {
    selection_handles(bounds, rotation)
        .into_iter()
        .find(|h| h.hit_test(point, tolerance))
        .map(|h| h.kind)
}

/// The gesture a transform session is performing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformMode {
    Move,
    Resize(HandleKind),
    Rotate,
}

/// State of one move/resize/rotate gesture on a selected item.
#[derive(Debug, Clone)]
pub struct TransformSession {
    pub item_id: ItemId,
    pub mode: TransformMode,
    pub start_point: Point,
    pub current_point: Point,
    /// Bounds frozen at pointer-down; every frame reapplies from here.
    pub start_bounds: Rect,
    /// Rotation frozen at pointer-down.
    pub start_rotation: f64,
    /// The item tree frozen at pointer-down.
    original: Vec<Item>,
}

impl TransformSession {
    /// Start a transform gesture on the selected item, or None if the
    /// point grabs neither the item body nor a handle.
    pub fn begin(doc: &Document, item_id: ItemId, point: Point) -> Option<Self> {
        let item = doc.get_item(item_id)?;
        let bounds = doc.item_bounds(item_id);
        let rotation = item.rotation;
        let center = bounds.center();
        let diagonal = (bounds.width().powi(2) + bounds.height().powi(2)).sqrt();

        let mode = if (point - center).hypot() <= diagonal * MOVE_BIAS_FRACTION {
            TransformMode::Move
        } else if let Some(handle) =
            hit_test_handles(bounds, rotation, point, HANDLE_HIT_TOLERANCE)
        {
            match handle {
                HandleKind::Rotate => TransformMode::Rotate,
                // Groups resize poorly through their children; they only
                // move and rotate.
                _ if item.is_group() => TransformMode::Move,
                _ => TransformMode::Resize(handle),
            }
        } else if doc.hit_test_item(item_id, point, HANDLE_SIZE / 2.0) {
            TransformMode::Move
        } else {
            return None;
        };

        Some(Self {
            item_id,
            mode,
            start_point: point,
            current_point: point,
            start_bounds: bounds,
            start_rotation: rotation,
            original: doc.item_tree(item_id),
        })
    }

    /// The bounds the item would occupy if moved to follow the pointer.
    /// Fed to the guide calculator before the move is applied.
    pub fn proposed_move_bounds(&self, point: Point) -> Rect {
        let delta = point - self.start_point;
        Rect::new(
            self.start_bounds.x0 + delta.x,
            self.start_bounds.y0 + delta.y,
            self.start_bounds.x1 + delta.x,
            self.start_bounds.y1 + delta.y,
        )
    }

    /// Apply one frame of the gesture. For moves, `point` may have been
    /// adjusted by the guide calculator.
    pub fn apply(&mut self, doc: &mut Document, point: Point) {
        self.current_point = point;
        match self.mode {
            TransformMode::Move => self.apply_move(doc, point),
            TransformMode::Resize(handle) => self.apply_resize(doc, handle, point),
            TransformMode::Rotate => self.apply_rotate(doc, point),
        }
    }

    fn apply_move(&self, doc: &mut Document, point: Point) {
        let target = self.proposed_move_bounds(point);
        let current = doc.item_bounds(self.item_id);
        let delta = Vec2::new(target.x0 - current.x0, target.y0 - current.y0);
        doc.translate_item(self.item_id, delta);
    }

    fn apply_resize(&self, doc: &mut Document, handle: HandleKind, point: Point) {
        let new_bounds = self.resized_bounds(handle, point);
        // Reapply from the frozen original so repeated frames never
        // compound rounding error.
        let mut items = self.original.clone();
        for item in &mut items {
            item.scale_to_bounds(self.start_bounds, new_bounds);
        }
        if let Err(err) = doc.replace_tree(self.item_id, items) {
            log::warn!("resize target vanished mid-gesture: {err}");
        }
    }

    fn apply_rotate(&self, doc: &mut Document, point: Point) {
        let rotation = self.rotation_for(point);
        if let Some(item) = doc.get_item_mut(self.item_id) {
            item.rotation = rotation;
        }
    }

    /// The rotation the item takes when the pointer is at `point`:
    /// the frozen start rotation plus the swept angle around the center.
    pub fn rotation_for(&self, point: Point) -> f64 {
        let center = self.start_bounds.center();
        let start_angle =
            (self.start_point.y - center.y).atan2(self.start_point.x - center.x);
        let angle = (point.y - center.y).atan2(point.x - center.x);
        self.start_rotation + (angle - start_angle)
    }

    /// Compute the resized bounds for a handle drag from the frozen start
    /// bounds. Corner handles clamp to the start aspect ratio: whichever
    /// dimension would grow the box more wins.
    pub fn resized_bounds(&self, handle: HandleKind, point: Point) -> Rect {
        let delta = point - self.start_point;
        let bounds = self.start_bounds;
        let (new_x0, new_y0, new_x1, new_y1) = match handle {
            HandleKind::Corner(Corner::TopLeft) => {
                (bounds.x0 + delta.x, bounds.y0 + delta.y, bounds.x1, bounds.y1)
            }
            HandleKind::Corner(Corner::TopRight) => {
                (bounds.x0, bounds.y0 + delta.y, bounds.x1 + delta.x, bounds.y1)
            }
            HandleKind::Corner(Corner::BottomLeft) => {
                (bounds.x0 + delta.x, bounds.y0, bounds.x1, bounds.y1 + delta.y)
            }
            HandleKind::Corner(Corner::BottomRight) => {
                (bounds.x0, bounds.y0, bounds.x1 + delta.x, bounds.y1 + delta.y)
            }
            HandleKind::Edge(Edge::Top) => {
                (bounds.x0, bounds.y0 + delta.y, bounds.x1, bounds.y1)
            }
            HandleKind::Edge(Edge::Bottom) => {
                (bounds.x0, bounds.y0, bounds.x1, bounds.y1 + delta.y)
            }
            HandleKind::Edge(Edge::Left) => {
                (bounds.x0 + delta.x, bounds.y0, bounds.x1, bounds.y1)
            }
            HandleKind::Edge(Edge::Right) => {
                (bounds.x0, bounds.y0, bounds.x1 + delta.x, bounds.y1)
            }
            HandleKind::Rotate => return bounds,
        };

        let (x0, x1) = if new_x0 < new_x1 { (new_x0, new_x1) } else { (new_x1, new_x0) };
        let (y0, y1) = if new_y0 < new_y1 { (new_y0, new_y1) } else { (new_y1, new_y0) };

        let (width, height) = if matches!(handle, HandleKind::Corner(_)) {
            let aspect = bounds.width() / bounds.height().max(0.1);
            let new_width = (x1 - x0).max(MIN_ITEM_SIZE);
            let new_height = (y1 - y0).max(MIN_ITEM_SIZE);
            let size = new_width.max(new_height);
            (size, (size / aspect).max(MIN_ITEM_SIZE))
        } else {
            ((x1 - x0).max(MIN_ITEM_SIZE), (y1 - y0).max(MIN_ITEM_SIZE))
        };

        // Anchor the box at the corner opposite the dragged handle.
        let (origin_x, origin_y) = match handle {
            HandleKind::Corner(Corner::TopLeft) => (bounds.x1 - width, bounds.y1 - height),
            HandleKind::Corner(Corner::TopRight) => (bounds.x0, bounds.y1 - height),
            HandleKind::Corner(Corner::BottomLeft) => (bounds.x1 - width, bounds.y0),
            HandleKind::Corner(Corner::BottomRight) => (bounds.x0, bounds.y0),
            HandleKind::Edge(Edge::Top) => (bounds.x0, bounds.y1 - height),
            HandleKind::Edge(Edge::Left) => (bounds.x1 - width, bounds.y0),
            HandleKind::Edge(Edge::Bottom) | HandleKind::Edge(Edge::Right) => {
                (bounds.x0, bounds.y0)
            }
            HandleKind::Rotate => (bounds.x0, bounds.y0),
        };
        Rect::new(origin_x, origin_y, origin_x + width, origin_y + height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::ItemStyle;

    fn doc_with_rect_stroke() -> (Document, ItemId) {
        // A 100x50 item at (100, 100).
        let mut doc = Document::new();
        let item = Item::stroke(
            vec![
                Point::new(100.0, 100.0),
                Point::new(200.0, 100.0),
                Point::new(200.0, 150.0),
                Point::new(100.0, 150.0),
            ],
            ItemStyle::default(),
        );
        let id = item.id;
        doc.add_item(item);
        (doc, id)
    }

    #[test]
    fn test_handle_layout() {
        let handles = selection_handles(Rect::new(0.0, 0.0, 100.0, 100.0), 0.0);
        assert_eq!(handles.len(), 9);
        assert!(matches!(handles[0].kind, HandleKind::Corner(Corner::TopLeft)));
        assert!(matches!(handles[8].kind, HandleKind::Rotate));
        // Rotate handle sits above the top edge.
        assert!((handles[8].position.y - (-ROTATE_HANDLE_OFFSET)).abs() < 0.001);
    }

    #[test]
    fn test_handles_follow_rotation() {
        let handles =
            selection_handles(Rect::new(-50.0, -50.0, 50.0, 50.0), std::f64::consts::FRAC_PI_2);
        // Top-left corner rotates to the top-right quadrant.
        let tl = handles[0].position;
        assert!((tl.x - 50.0).abs() < 0.001);
        assert!((tl.y - (-50.0)).abs() < 0.001);
    }

    #[test]
    fn test_center_press_prefers_move_over_handles() {
        let (doc, id) = doc_with_rect_stroke();
        // Dead center: within the move-bias radius even though edge
        // handles are nearby on a small item.
        let session = TransformSession::begin(&doc, id, Point::new(150.0, 125.0)).unwrap();
        assert_eq!(session.mode, TransformMode::Move);
    }

    #[test]
    fn test_corner_grab_starts_resize() {
        let (doc, id) = doc_with_rect_stroke();
        let session = TransformSession::begin(&doc, id, Point::new(200.0, 150.0)).unwrap();
        assert_eq!(
            session.mode,
            TransformMode::Resize(HandleKind::Corner(Corner::BottomRight))
        );
    }

    #[test]
    fn test_aspect_locked_corner_resize() {
        let (mut doc, id) = doc_with_rect_stroke();
        let mut session =
            TransformSession::begin(&doc, id, Point::new(200.0, 150.0)).unwrap();
        // Drag the bottom-right corner 40 to the right: 140 wide wins the
        // aspect race, height follows to 70.
        session.apply(&mut doc, Point::new(240.0, 150.0));
        let bounds = doc.item_bounds(id);
        assert!((bounds.width() - 140.0).abs() < 0.01);
        assert!((bounds.height() - 70.0).abs() < 0.01);
    }

    #[test]
    fn test_resize_enforces_minimum_size() {
        let (mut doc, id) = doc_with_rect_stroke();
        let mut session =
            TransformSession::begin(&doc, id, Point::new(200.0, 150.0)).unwrap();
        session.apply(&mut doc, Point::new(50.0, 50.0));
        let bounds = doc.item_bounds(id);
        assert!(bounds.width() >= MIN_ITEM_SIZE - 0.01);
        assert!(bounds.height() >= MIN_ITEM_SIZE - 0.01);
    }

    #[test]
    fn test_resize_reapplies_from_frozen_bounds() {
        let (mut doc, id) = doc_with_rect_stroke();
        let mut session =
            TransformSession::begin(&doc, id, Point::new(200.0, 150.0)).unwrap();
        // Many intermediate frames, then back to a 40-pixel drag: the
        // result must match a single-frame drag exactly.
        for i in 0..50 {
            session.apply(&mut doc, Point::new(200.0 + i as f64, 150.0));
        }
        session.apply(&mut doc, Point::new(240.0, 150.0));
        let bounds = doc.item_bounds(id);
        assert!((bounds.width() - 140.0).abs() < 0.01);
        assert!((bounds.height() - 70.0).abs() < 0.01);
    }

    #[test]
    fn test_edge_resize_changes_one_axis() {
        let (mut doc, id) = doc_with_rect_stroke();
        let mut session =
            TransformSession::begin(&doc, id, Point::new(200.0, 125.0)).unwrap();
        assert_eq!(
            session.mode,
            TransformMode::Resize(HandleKind::Edge(Edge::Right))
        );
        session.apply(&mut doc, Point::new(230.0, 125.0));
        let bounds = doc.item_bounds(id);
        assert!((bounds.width() - 130.0).abs() < 0.01);
        assert!((bounds.height() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_move_follows_pointer() {
        let (mut doc, id) = doc_with_rect_stroke();
        let mut session =
            TransformSession::begin(&doc, id, Point::new(150.0, 125.0)).unwrap();
        session.apply(&mut doc, Point::new(170.0, 135.0));
        let bounds = doc.item_bounds(id);
        assert!((bounds.x0 - 120.0).abs() < 0.01);
        assert!((bounds.y0 - 110.0).abs() < 0.01);
    }

    #[test]
    fn test_rotation_is_authoritative_state() {
        let (mut doc, id) = doc_with_rect_stroke();
        let rotate_grab = Point::new(150.0, 100.0 - ROTATE_HANDLE_OFFSET);
        let mut session = TransformSession::begin(&doc, id, rotate_grab).unwrap();
        assert_eq!(session.mode, TransformMode::Rotate);

        // Sweep the pointer a quarter turn around the center.
        session.apply(&mut doc, Point::new(200.0, 125.0));
        let rotation = doc.get_item(id).unwrap().rotation;
        assert!((rotation - std::f64::consts::FRAC_PI_2).abs() < 0.01);
    }
}
