//! Drawing tool pipeline.
//!
//! Every gesture is an explicit [`ToolSession`] value: constructed on
//! pointer-down, fed pointer-move samples, and consumed on pointer-up.
//! Nothing about an in-progress gesture leaks into shared engine state.

mod eraser;

pub use eraser::{ERASE_REMOVE_THRESHOLD, EraseResult, erase};

use crate::items::{
    Fill, Item, ItemKind, ItemStyle, Role, SerializableColor, ShapeKind, StrokeCap,
    StrokeItem, StrokeJoin, TextAlign, build_shape_path, hit_target_path, MIN_DRAG_DISTANCE,
};
use kurbo::{BezPath, Circle, Point};
use kurbo::Shape as KurboShape;
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ToolKind {
    #[default]
    Select,
    Brush,
    Eraser,
    Fill,
    Text,
    Rectangle,
    Circle,
    Triangle,
    Star,
    Heart,
    Line,
    Arrow,
}

impl ToolKind {
    /// The shape this tool draws, if it is a shape tool.
    pub fn shape_kind(self) -> Option<ShapeKind> {
        match self {
            ToolKind::Rectangle => Some(ShapeKind::Rectangle),
            ToolKind::Circle => Some(ShapeKind::Circle),
            ToolKind::Triangle => Some(ShapeKind::Triangle),
            ToolKind::Star => Some(ShapeKind::Star),
            ToolKind::Heart => Some(ShapeKind::Heart),
            ToolKind::Line => Some(ShapeKind::Line),
            ToolKind::Arrow => Some(ShapeKind::Arrow),
            _ => None,
        }
    }
}

/// Brush variants. They differ only in width multiplier, cap/join, and
/// opacity multiplier; the airbrush additionally scatters low-opacity dots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrushKind {
    Soft,
    #[default]
    Round,
    Pencil,
    Marker,
    Airbrush,
}

impl BrushKind {
    /// Effective stroke width for a base brush size.
    pub fn stroke_width(self, base: f64) -> f64 {
        match self {
            BrushKind::Soft | BrushKind::Round => base,
            BrushKind::Pencil => (base * 0.7).max(1.0),
            BrushKind::Marker => base * 1.5,
            BrushKind::Airbrush => base * 2.0,
        }
    }

    /// Effective opacity for a base opacity.
    pub fn opacity(self, base: f64) -> f64 {
        let factor = match self {
            BrushKind::Soft => 0.7,
            BrushKind::Round => 1.0,
            BrushKind::Pencil => 0.9,
            BrushKind::Marker => 0.8,
            BrushKind::Airbrush => 0.3,
        };
        (base * factor).clamp(0.0, 1.0)
    }

    pub fn cap(self) -> StrokeCap {
        match self {
            BrushKind::Marker => StrokeCap::Square,
            _ => StrokeCap::Round,
        }
    }

    pub fn join(self) -> StrokeJoin {
        match self {
            BrushKind::Marker => StrokeJoin::Miter,
            _ => StrokeJoin::Round,
        }
    }

    /// Build the stroke style this brush paints with.
    pub fn style(self, color: SerializableColor, base_size: f64, base_opacity: f64) -> ItemStyle {
        ItemStyle {
            stroke_color: color,
            stroke_width: self.stroke_width(base_size),
            cap: self.cap(),
            join: self.join(),
            fill: None,
            opacity: self.opacity(base_opacity),
        }
    }
}

/// Current style settings applied to new items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    pub brush: BrushKind,
    /// Base brush size before per-brush multipliers.
    pub brush_size: f64,
    pub color: SerializableColor,
    /// Base opacity before per-brush multipliers.
    pub opacity: f64,
    /// Fill applied to new shapes (None = hollow outline).
    pub shape_fill: Option<Fill>,
    pub font_size: f64,
    pub font_family: String,
    pub text_align: TextAlign,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            brush: BrushKind::default(),
            brush_size: 4.0,
            color: SerializableColor::black(),
            opacity: 1.0,
            shape_fill: None,
            font_size: 24.0,
            font_family: "sans-serif".to_string(),
            text_align: TextAlign::Left,
        }
    }
}

/// Eraser strokes are twice as wide as the brush they share a size with.
pub const ERASER_WIDTH_FACTOR: f64 = 2.0;

/// Scatter dots emitted per airbrush move sample.
const AIRBRUSH_DOTS_PER_MOVE: usize = 3;

/// Generate a random seed for scatter generation.
/// Counter + splitmix32-style mixing, stable on every platform.
fn generate_seed() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};

    static SEED_COUNTER: AtomicU32 = AtomicU32::new(1);
    let counter = SEED_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut x = counter.wrapping_mul(0x9E3779B9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EBCA6B);
    x ^= x >> 13;
    x = x.wrapping_mul(0xC2B2AE35);
    x ^= x >> 16;
    x
}

fn next_rand(state: &mut u32) -> f64 {
    let mut x = state.wrapping_add(0x9E3779B9);
    *state = x;
    x ^= x >> 16;
    x = x.wrapping_mul(0x21F0AAAD);
    x ^= x >> 15;
    x = x.wrapping_mul(0x735A2D97);
    x ^= x >> 15;
    x as f64 / u32::MAX as f64
}

/// A single airbrush scatter dot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatterDot {
    pub center: Point,
    pub radius: f64,
}

/// An id-less preview of what the active gesture would commit.
/// Ids are only assigned at commit time.
#[derive(Debug, Clone)]
pub struct Preview {
    pub kind: ItemKind,
    pub style: ItemStyle,
}

/// State of one in-progress drawing gesture.
#[derive(Debug, Clone)]
pub enum ToolSession {
    Brush {
        brush: BrushKind,
        points: Vec<Point>,
        style: ItemStyle,
        dots: Vec<ScatterDot>,
        rng_state: u32,
    },
    Eraser {
        points: Vec<Point>,
        width: f64,
    },
    Shape {
        kind: ShapeKind,
        anchor: Point,
        current: Point,
        style: ItemStyle,
    },
}

impl ToolSession {
    /// Start a gesture for the given tool. Select/fill/text have no
    /// drag session.
    pub fn begin(tool: ToolKind, settings: &ToolSettings, point: Point) -> Option<Self> {
        match tool {
            ToolKind::Brush => Some(ToolSession::Brush {
                brush: settings.brush,
                points: vec![point],
                style: settings
                    .brush
                    .style(settings.color, settings.brush_size, settings.opacity),
                dots: Vec::new(),
                rng_state: generate_seed(),
            }),
            ToolKind::Eraser => Some(ToolSession::Eraser {
                points: vec![point],
                width: settings.brush_size * ERASER_WIDTH_FACTOR,
            }),
            _ => tool.shape_kind().map(|kind| ToolSession::Shape {
                kind,
                anchor: point,
                // No preview yet: a zero-size shape would flash at the
                // anchor before the first move.
                current: point,
                style: ItemStyle {
                    stroke_color: settings.color,
                    stroke_width: settings.brush_size,
                    fill: settings.shape_fill.clone(),
                    ..ItemStyle::default()
                },
            }),
        }
    }

    /// Feed a pointer-move sample into the gesture.
    pub fn update(&mut self, point: Point, settings: &ToolSettings) {
        match self {
            ToolSession::Brush {
                brush,
                points,
                dots,
                rng_state,
                ..
            } => {
                points.push(point);
                if *brush == BrushKind::Airbrush {
                    let size = brush.stroke_width(settings.brush_size);
                    let spread = size * 0.5;
                    for _ in 0..AIRBRUSH_DOTS_PER_MOVE {
                        let angle = next_rand(rng_state) * std::f64::consts::TAU;
                        let dist = next_rand(rng_state) * spread;
                        let radius = next_rand(rng_state) * (size * 0.3) + 1.0;
                        dots.push(ScatterDot {
                            center: Point::new(
                                point.x + dist * angle.cos(),
                                point.y + dist * angle.sin(),
                            ),
                            radius,
                        });
                    }
                }
            }
            ToolSession::Eraser { points, .. } => points.push(point),
            ToolSession::Shape { current, .. } => *current = point,
        }
    }

    /// The preview to render for this gesture, if any.
    pub fn preview(&self) -> Option<Preview> {
        match self {
            ToolSession::Brush { points, style, .. } => Some(Preview {
                kind: ItemKind::Stroke(StrokeItem::new(points.clone())),
                style: style.clone(),
            }),
            ToolSession::Eraser { .. } => None,
            ToolSession::Shape {
                kind,
                anchor,
                current,
                style,
            } => {
                if *current == *anchor {
                    return None;
                }
                let path = build_shape_path(*kind, *anchor, *current, style.stroke_width)?;
                Some(Preview {
                    kind: ItemKind::Shape(crate::items::ShapeItem::new(*kind, path)),
                    style: style.clone(),
                })
            }
        }
    }

    /// Finish the gesture and build the item tree to commit.
    /// Degenerate gestures (single-sample strokes, sub-threshold shape
    /// drags) commit nothing. Eraser gestures are resolved by the caller
    /// against the document and return nothing here.
    pub fn finish(self, settings: &ToolSettings) -> Vec<Item> {
        match self {
            ToolSession::Brush {
                brush,
                points,
                style,
                dots,
                ..
            } => {
                if points.len() < 2 {
                    return Vec::new();
                }
                let stroke = Item::stroke(points, style.clone());
                if brush != BrushKind::Airbrush || dots.is_empty() {
                    return vec![stroke];
                }
                // Airbrush strokes group the main path with their scatter
                // dots so the whole spray moves and erases as one item.
                let dot_style = ItemStyle {
                    stroke_color: SerializableColor::transparent(),
                    stroke_width: 0.0,
                    fill: Some(Fill::solid(settings.color)),
                    opacity: (settings.opacity * 0.1).clamp(0.0, 1.0),
                    ..ItemStyle::default()
                };
                let mut children = vec![stroke];
                for dot in dots {
                    children.push(Item::shape(
                        ShapeKind::Circle,
                        Circle::new(dot.center, dot.radius).to_path(0.1),
                        dot_style.clone(),
                    ));
                }
                group_items(children)
            }
            ToolSession::Eraser { .. } => Vec::new(),
            ToolSession::Shape {
                kind,
                anchor,
                current,
                style,
            } => {
                let drag = (current - anchor).hypot();
                if drag < MIN_DRAG_DISTANCE {
                    return Vec::new();
                }
                let Some(path) = build_shape_path(kind, anchor, current, style.stroke_width)
                else {
                    return Vec::new();
                };
                let shape = Item::shape(kind, path.clone(), style.clone());
                if style.fill.is_some() || kind == ShapeKind::Line {
                    return vec![shape];
                }
                // Hollow outlines get a near-invisible filled companion
                // behind them so they stay tappable in their interior.
                let target = hit_target_item(kind, &path);
                group_items(vec![target, shape])
            }
        }
    }
}

/// Wrap items into a group tree: `[group, children...]` with parent links
/// set. Single items are returned as-is.
fn group_items(mut children: Vec<Item>) -> Vec<Item> {
    if children.len() <= 1 {
        return children;
    }
    let mut group = Item::group(children.iter().map(|c| c.id).collect());
    group.role = Role::Content;
    for child in &mut children {
        child.parent = Some(group.id);
    }
    let mut tree = vec![group];
    tree.append(&mut children);
    tree
}

/// Build the clickable companion item for a hollow shape.
fn hit_target_item(kind: ShapeKind, path: &BezPath) -> Item {
    let target_path = hit_target_path(kind, path);
    Item::shape(
        kind,
        target_path,
        ItemStyle {
            stroke_color: SerializableColor::transparent(),
            stroke_width: 0.0,
            fill: Some(Fill::solid(SerializableColor::new(255, 255, 255, 3))),
            opacity: 1.0,
            ..ItemStyle::default()
        },
    )
    .with_role(Role::HitTarget)
}
