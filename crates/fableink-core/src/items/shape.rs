//! Parametric shape path builders.
//!
//! Shapes are drawn by dragging from an anchor point. Radial shapes
//! (circle, triangle, star, heart) are centered on the anchor and sized by
//! the larger drag axis; rectangles and lines span anchor to cursor.

use kurbo::{BezPath, Circle, Point, Rect, Vec2};
use kurbo::Shape as KurboShape;
use serde::{Deserialize, Serialize};

/// Shape tool variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Triangle,
    Star,
    Heart,
    Line,
    Arrow,
}

/// Minimum drag length for a shape gesture to commit anything.
pub const MIN_DRAG_DISTANCE: f64 = 5.0;

/// Build the outline path for a shape gesture from anchor to cursor.
/// Returns None while the drag is degenerate (both axes zero).
pub fn build_shape_path(
    kind: ShapeKind,
    anchor: Point,
    cursor: Point,
    stroke_width: f64,
) -> Option<BezPath> {
    let width = (cursor.x - anchor.x).abs();
    let height = (cursor.y - anchor.y).abs();
    let size = width.max(height);
    if size < f64::EPSILON && kind != ShapeKind::Line && kind != ShapeKind::Arrow {
        return None;
    }
    let radius = size / 2.0;

    let path = match kind {
        ShapeKind::Rectangle => {
            let rect = Rect::new(
                anchor.x.min(cursor.x),
                anchor.y.min(cursor.y),
                anchor.x.max(cursor.x),
                anchor.y.max(cursor.y),
            );
            rect.to_path(0.1)
        }
        ShapeKind::Circle => {
            Circle::new(anchor, radius.max(5.0)).to_path(0.1)
        }
        ShapeKind::Triangle => regular_polygon(anchor, 3, radius.max(5.0)),
        ShapeKind::Star => star(anchor, 5, (radius * 0.6).max(3.0), radius.max(5.0)),
        ShapeKind::Heart => heart(anchor, (radius / 3.0).max(8.0)),
        ShapeKind::Line => {
            let mut path = BezPath::new();
            path.move_to(anchor);
            path.line_to(cursor);
            path
        }
        ShapeKind::Arrow => arrow(anchor, cursor, stroke_width),
    };
    Some(path)
}

/// Regular polygon with the first vertex at the top.
fn regular_polygon(center: Point, sides: usize, radius: f64) -> BezPath {
    let mut path = BezPath::new();
    for i in 0..sides {
        let angle = -std::f64::consts::FRAC_PI_2
            + i as f64 * std::f64::consts::TAU / sides as f64;
        let p = Point::new(
            center.x + radius * angle.cos(),
            center.y + radius * angle.sin(),
        );
        if i == 0 {
            path.move_to(p);
        } else {
            path.line_to(p);
        }
    }
    path.close_path();
    path
}

/// Five-pointed star, vertices alternating between the inner and outer
/// radius starting from the top.
fn star(center: Point, points: usize, inner_radius: f64, outer_radius: f64) -> BezPath {
    let mut path = BezPath::new();
    let step = std::f64::consts::PI / points as f64;
    for i in 0..(points * 2) {
        let angle = -std::f64::consts::FRAC_PI_2 + i as f64 * step;
        let r = if i % 2 == 0 { inner_radius } else { outer_radius };
        let p = Point::new(center.x + r * angle.cos(), center.y + r * angle.sin());
        if i == 0 {
            path.move_to(p);
        } else {
            path.line_to(p);
        }
    }
    path.close_path();
    path
}

/// Heart built from four cubic curves: tip at the bottom, two lobes, a
/// shallow dip at the top center.
fn heart(center: Point, size: f64) -> BezPath {
    let at = |dx: f64, dy: f64| Point::new(center.x + dx * size, center.y + dy * size);
    let mut path = BezPath::new();
    path.move_to(at(0.0, 0.9));
    path.curve_to(at(-0.3, 0.7), at(-0.8, 0.2), at(-0.95, -0.2));
    path.curve_to(at(-0.95, -0.75), at(-0.4, -0.85), at(0.0, -0.3));
    path.curve_to(at(0.4, -0.85), at(0.95, -0.75), at(0.95, -0.2));
    path.curve_to(at(0.8, 0.2), at(0.3, 0.7), at(0.0, 0.9));
    path.close_path();
    path
}

/// Arrow: a shaft trimmed short of the tip plus a closed triangular head.
/// The head is sized against both the arrow length and the stroke width so
/// short thick arrows stay readable.
fn arrow(start: Point, end: Point, stroke_width: f64) -> BezPath {
    let dir = Vec2::new(end.x - start.x, end.y - start.y);
    let len = dir.hypot();
    let angle = dir.y.atan2(dir.x);
    let head_size = (len * 0.25).min(20.0).max(stroke_width * 1.5);
    let head_angle = std::f64::consts::FRAC_PI_6;

    let shaft_end = Point::new(
        end.x - head_size * 0.7 * angle.cos(),
        end.y - head_size * 0.7 * angle.sin(),
    );
    let left = Point::new(
        end.x - head_size * (angle - head_angle).cos(),
        end.y - head_size * (angle - head_angle).sin(),
    );
    let right = Point::new(
        end.x - head_size * (angle + head_angle).cos(),
        end.y - head_size * (angle + head_angle).sin(),
    );

    let mut path = BezPath::new();
    path.move_to(start);
    path.line_to(shaft_end);
    // Head subpath, closed so it can be filled.
    path.move_to(end);
    path.line_to(left);
    path.line_to(right);
    path.close_path();
    path
}

/// Build the near-invisible clickable companion for a hollow shape.
/// Circles get a matching disc, hearts a copy of their own outline,
/// everything else a bounds rectangle.
pub fn hit_target_path(kind: ShapeKind, path: &BezPath) -> BezPath {
    let bounds = path.bounding_box();
    match kind {
        ShapeKind::Circle => {
            Circle::new(bounds.center(), bounds.width().max(bounds.height()) / 2.0)
                .to_path(0.1)
        }
        ShapeKind::Heart => path.clone(),
        _ => bounds.to_path(0.1),
    }
}
