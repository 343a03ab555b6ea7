//! Item definitions for the drawing document.

mod shape;
mod text;

pub use shape::{ShapeKind, build_shape_path, hit_target_path, MIN_DRAG_DISTANCE};
pub use text::{FontWeight, TextAlign, TextItem};

use kurbo::{Affine, BezPath, PathEl, Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for items.
pub type ItemId = Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Return the same color with alpha scaled by `opacity` (0.0..=1.0).
    pub fn with_opacity(self, opacity: f64) -> Self {
        let a = (self.a as f64 * opacity.clamp(0.0, 1.0)) as u8;
        Self::new(self.r, self.g, self.b, a)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// One stop of a gradient fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    /// Position along the gradient axis (0.0..=1.0).
    pub offset: f64,
    pub color: SerializableColor,
}

/// Fill paint for an item: a solid color or a two-point gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fill {
    Solid { color: SerializableColor },
    Gradient {
        stops: Vec<GradientStop>,
        /// Radial gradient when true, linear otherwise.
        radial: bool,
        origin: Point,
        destination: Point,
    },
}

impl Fill {
    pub fn solid(color: SerializableColor) -> Self {
        Fill::Solid { color }
    }
}

/// Line cap style for strokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeCap {
    #[default]
    Round,
    Square,
    Butt,
}

/// Line join style for strokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeJoin {
    #[default]
    Round,
    Miter,
    Bevel,
}

/// Style properties shared by all items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStyle {
    /// Stroke color.
    pub stroke_color: SerializableColor,
    /// Stroke width.
    pub stroke_width: f64,
    /// Line cap.
    #[serde(default)]
    pub cap: StrokeCap,
    /// Line join.
    #[serde(default)]
    pub join: StrokeJoin,
    /// Fill paint (None = hollow).
    pub fill: Option<Fill>,
    /// Overall opacity (0.0 = fully transparent, 1.0 = fully opaque).
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_opacity() -> f64 {
    1.0
}

impl Default for ItemStyle {
    fn default() -> Self {
        Self {
            stroke_color: SerializableColor::black(),
            stroke_width: 2.0,
            cap: StrokeCap::default(),
            join: StrokeJoin::default(),
            fill: None,
            opacity: 1.0,
        }
    }
}

impl ItemStyle {
    /// Get the stroke color as a peniko Color with opacity applied.
    pub fn stroke_with_opacity(&self) -> Color {
        self.stroke_color.with_opacity(self.opacity).into()
    }
}

/// What an item is for. Content items are user artwork; the background
/// item backs the whole canvas; hit targets are near-invisible companions
/// that make hollow shapes selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Content,
    Background,
    HitTarget,
}

/// A freehand stroke: an ordered polyline of sampled pointer positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeItem {
    pub points: Vec<Point>,
}

impl StrokeItem {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn bounds(&self) -> Rect {
        bounds_of_points(&self.points)
    }
}

/// A parametric shape with its realized outline path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeItem {
    pub kind: ShapeKind,
    pub path: BezPath,
}

impl ShapeItem {
    pub fn new(kind: ShapeKind, path: BezPath) -> Self {
        Self { kind, path }
    }

    pub fn bounds(&self) -> Rect {
        use kurbo::Shape as _;
        self.path.bounding_box()
    }
}

/// A group of items; children live in the document arena and point back
/// at the group through their `parent` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupItem {
    pub children: Vec<ItemId>,
}

/// The kind-specific payload of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    Stroke(StrokeItem),
    Shape(ShapeItem),
    Text(TextItem),
    Group(GroupItem),
}

/// A drawable unit in the document arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier, assigned at commit time.
    pub id: ItemId,
    #[serde(flatten)]
    pub kind: ItemKind,
    pub style: ItemStyle,
    #[serde(default)]
    pub role: Role,
    /// Authoritative rotation in radians, applied around the bounds center.
    #[serde(default)]
    pub rotation: f64,
    /// Insertion counter, assigned by the document at commit time and
    /// carried on the wire. Top-level z-order sorts by (seq, id), which
    /// keeps concurrent inserts in the same order on every peer.
    #[serde(default)]
    pub seq: u64,
    /// Owning group, if any.
    #[serde(default)]
    pub parent: Option<ItemId>,
}

impl Item {
    pub fn stroke(points: Vec<Point>, style: ItemStyle) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ItemKind::Stroke(StrokeItem::new(points)),
            style,
            role: Role::Content,
            rotation: 0.0,
            seq: 0,
            parent: None,
        }
    }

    pub fn shape(kind: ShapeKind, path: BezPath, style: ItemStyle) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ItemKind::Shape(ShapeItem::new(kind, path)),
            style,
            role: Role::Content,
            rotation: 0.0,
            seq: 0,
            parent: None,
        }
    }

    pub fn text(text: TextItem, style: ItemStyle) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ItemKind::Text(text),
            style,
            role: Role::Content,
            rotation: 0.0,
            seq: 0,
            parent: None,
        }
    }

    pub fn group(children: Vec<ItemId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ItemKind::Group(GroupItem { children }),
            style: ItemStyle::default(),
            role: Role::Content,
            rotation: 0.0,
            seq: 0,
            parent: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, ItemKind::Group(_))
    }

    /// Geometry bounds, ignoring rotation. Group bounds are computed by the
    /// document since children live in the arena.
    pub fn local_bounds(&self) -> Rect {
        match &self.kind {
            ItemKind::Stroke(s) => s.bounds(),
            ItemKind::Shape(s) => s.bounds(),
            ItemKind::Text(t) => t.bounds(),
            ItemKind::Group(_) => Rect::ZERO,
        }
    }

    /// Translate the item's own geometry. Groups are translated through the
    /// document, which walks their children.
    pub fn translate(&mut self, delta: Vec2) {
        match &mut self.kind {
            ItemKind::Stroke(s) => {
                for p in &mut s.points {
                    p.x += delta.x;
                    p.y += delta.y;
                }
            }
            ItemKind::Shape(s) => {
                s.path.apply_affine(Affine::translate(delta));
            }
            ItemKind::Text(t) => {
                t.position.x += delta.x;
                t.position.y += delta.y;
            }
            ItemKind::Group(_) => {}
        }
    }

    /// Remap the item's geometry from one bounding rectangle to another.
    /// Used by resize, which always reapplies from the frozen start bounds.
    pub fn scale_to_bounds(&mut self, from: Rect, to: Rect) {
        let sx = to.width() / from.width().max(0.001);
        let sy = to.height() / from.height().max(0.001);
        let map = Affine::translate(Vec2::new(to.x0, to.y0))
            * Affine::scale_non_uniform(sx, sy)
            * Affine::translate(Vec2::new(-from.x0, -from.y0));
        match &mut self.kind {
            ItemKind::Stroke(s) => {
                for p in &mut s.points {
                    *p = map * *p;
                }
            }
            ItemKind::Shape(s) => {
                s.path.apply_affine(map);
            }
            ItemKind::Text(t) => {
                t.position = map * t.position;
            }
            ItemKind::Group(_) => {}
        }
    }

    /// Check if a point hits this item's own geometry.
    /// The point is un-rotated around the bounds center first, so rotated
    /// items hit-test in their rotated frame.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let point = if self.rotation.abs() > f64::EPSILON {
            rotate_about(point, self.local_bounds().center(), -self.rotation)
        } else {
            point
        };
        match &self.kind {
            ItemKind::Stroke(s) => {
                if s.points.len() == 1 {
                    return (point - s.points[0]).hypot()
                        <= tolerance + self.style.stroke_width / 2.0;
                }
                point_to_polyline_dist(point, &s.points)
                    <= tolerance + self.style.stroke_width / 2.0
            }
            ItemKind::Shape(s) => {
                use kurbo::Shape as _;
                if self.style.fill.is_some() && s.path.contains(point) {
                    return true;
                }
                let outline = flatten_path(&s.path);
                outline.iter().any(|poly| {
                    point_to_polyline_dist(point, poly)
                        <= tolerance + self.style.stroke_width / 2.0
                })
            }
            ItemKind::Text(t) => t
                .bounds()
                .inflate(tolerance, tolerance)
                .contains(point),
            ItemKind::Group(_) => false,
        }
    }
}

/// Rotate a point around a pivot.
pub fn rotate_about(point: Point, pivot: Point, angle: f64) -> Point {
    let cos_a = angle.cos();
    let sin_a = angle.sin();
    let dx = point.x - pivot.x;
    let dy = point.y - pivot.y;
    Point::new(
        pivot.x + dx * cos_a - dy * sin_a,
        pivot.y + dx * sin_a + dy * cos_a,
    )
}

/// Bounding box of a point list.
pub fn bounds_of_points(points: &[Point]) -> Rect {
    let Some(first) = points.first() else {
        return Rect::ZERO;
    };
    let mut rect = Rect::new(first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        rect.x0 = rect.x0.min(p.x);
        rect.y0 = rect.y0.min(p.y);
        rect.x1 = rect.x1.max(p.x);
        rect.y1 = rect.y1.max(p.y);
    }
    rect
}

/// Distance from a point to a line segment (a→b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = Vec2::new(b.x - a.x, b.y - a.y);
    let pv = Vec2::new(point.x - a.x, point.y - a.y);
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = Point::new(a.x + t * seg.x, a.y + t * seg.y);
    ((point.x - proj.x).powi(2) + (point.y - proj.y).powi(2)).sqrt()
}

/// Minimum distance from a point to a polyline.
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| point_to_segment_dist(point, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Flatten a bezier path into polylines, one per subpath.
pub fn flatten_path(path: &BezPath) -> Vec<Vec<Point>> {
    let mut polys: Vec<Vec<Point>> = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    kurbo::flatten(path.iter(), 0.25, |el| match el {
        PathEl::MoveTo(p) => {
            if current.len() > 1 {
                polys.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            current.push(p);
        }
        PathEl::LineTo(p) => current.push(p),
        PathEl::ClosePath => {
            if let Some(&first) = current.first() {
                current.push(first);
            }
        }
        _ => {}
    });
    if current.len() > 1 {
        polys.push(current);
    }
    polys
}
