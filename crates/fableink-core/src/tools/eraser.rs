//! Vertex-marking eraser.
//!
//! Erasing the middle of a stroke must not leave one path with holes:
//! the original is replaced by sub-paths synthesized from the surviving
//! vertex runs.

use crate::document::Document;
use crate::items::{
    Item, ItemId, ItemKind, Role, flatten_path, point_to_polyline_dist,
};
use kurbo::Point;

/// Fraction of erased vertices beyond which the whole path is removed
/// instead of split.
pub const ERASE_REMOVE_THRESHOLD: f64 = 0.7;

/// Result of one eraser pass.
#[derive(Debug, Default)]
pub struct EraseResult {
    /// Items to remove from the document.
    pub removed: Vec<ItemId>,
    /// Replacement sub-paths keyed by the item they came from.
    pub added: Vec<Item>,
}

impl EraseResult {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Run the eraser over every content item on visible, unlocked layers.
///
/// For each item's vertex list, vertices within `eraser_width / 2` of the
/// eraser polyline are marked. A path with at least
/// [`ERASE_REMOVE_THRESHOLD`] of its vertices marked is removed whole;
/// otherwise each maximal run of surviving vertices becomes a new stroke
/// carrying the original style. Runs shorter than 2 vertices are dropped.
pub fn erase(doc: &Document, eraser_points: &[Point], eraser_width: f64) -> EraseResult {
    let mut result = EraseResult::default();
    if eraser_points.is_empty() {
        return result;
    }
    let reach = eraser_width / 2.0;

    for layer in &doc.layers {
        if !layer.visible || layer.locked || layer.is_background {
            continue;
        }
        for &id in &layer.items {
            erase_item(doc, id, eraser_points, reach, &mut result);
        }
    }
    result
}

fn erase_item(
    doc: &Document,
    id: ItemId,
    eraser_points: &[Point],
    reach: f64,
    result: &mut EraseResult,
) {
    let Some(item) = doc.get_item(id) else { return };
    if item.role == Role::HitTarget {
        return;
    }
    let vertices: Vec<Point> = match &item.kind {
        ItemKind::Stroke(stroke) => stroke.points.clone(),
        ItemKind::Shape(shape) => flatten_path(&shape.path).into_iter().flatten().collect(),
        ItemKind::Group(group) => {
            // Groups erase as a unit: the marked fraction is taken over
            // all child vertices, and the group is removed whole or left
            // alone. Splitting inside a group is not attempted.
            let mut points: Vec<Point> = Vec::new();
            for &child in &group.children {
                if let Some(child_item) = doc.get_item(child) {
                    if child_item.role == Role::HitTarget {
                        continue;
                    }
                    match &child_item.kind {
                        ItemKind::Stroke(s) => points.extend(s.points.iter().copied()),
                        ItemKind::Shape(s) => {
                            points.extend(flatten_path(&s.path).into_iter().flatten())
                        }
                        _ => {}
                    }
                }
            }
            if points.len() < 2 {
                return;
            }
            let marked = points
                .iter()
                .filter(|&&v| eraser_distance(v, eraser_points) < reach)
                .count();
            if marked as f64 >= points.len() as f64 * ERASE_REMOVE_THRESHOLD {
                result.removed.push(id);
            }
            return;
        }
        ItemKind::Text(_) => return,
    };
    if vertices.len() < 2 {
        return;
    }

    let marked: Vec<bool> = vertices
        .iter()
        .map(|&v| eraser_distance(v, eraser_points) < reach)
        .collect();
    let marked_count = marked.iter().filter(|&&m| m).count();
    if marked_count == 0 {
        return;
    }

    if marked_count as f64 >= vertices.len() as f64 * ERASE_REMOVE_THRESHOLD {
        result.removed.push(id);
        return;
    }

    // Split: every maximal run of unmarked vertices survives as its own
    // sub-path with the original style.
    let mut run: Vec<Point> = Vec::new();
    let mut survivors: Vec<Vec<Point>> = Vec::new();
    for (i, &is_marked) in marked.iter().enumerate() {
        if is_marked {
            if run.len() >= 2 {
                survivors.push(std::mem::take(&mut run));
            } else {
                run.clear();
            }
        } else {
            run.push(vertices[i]);
        }
    }
    if run.len() >= 2 {
        survivors.push(run);
    }

    result.removed.push(id);
    for points in survivors {
        let mut sub = Item::stroke(points, item.style.clone());
        sub.role = item.role;
        result.added.push(sub);
    }
}

fn eraser_distance(vertex: Point, eraser_points: &[Point]) -> f64 {
    if eraser_points.len() == 1 {
        (vertex - eraser_points[0]).hypot()
    } else {
        point_to_polyline_dist(vertex, eraser_points)
    }
}
