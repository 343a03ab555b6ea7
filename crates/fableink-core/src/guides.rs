//! Smart alignment guides computed while moving an item.
//!
//! Guides are advisory overlay lines; the returned position only differs
//! from the proposed one when a candidate under the threshold wins its
//! axis. Computing the guides and the adjusted position together keeps
//! the overlay and the movement from ever disagreeing.

use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};

/// Distance threshold for ordinary alignment candidates.
pub const SNAP_THRESHOLD: f64 = 25.0;
/// Canvas-center alignment gets double the ordinary threshold: centering
/// is the alignment users reach for most.
pub const CENTER_SNAP_THRESHOLD: f64 = SNAP_THRESHOLD * 2.0;
/// Margin used for canvas-edge alignment.
pub const CANVAS_EDGE_MARGIN: f64 = 20.0;

/// Guide line orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// A vertical line at a given x.
    Vertical,
    /// A horizontal line at a given y.
    Horizontal,
}

/// What a guide aligns against, for overlay styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuideKind {
    CanvasCenter,
    CanvasEdge,
    ItemAlignment,
    EqualSpacing,
}

/// One advisory guide line, serializable for overlay surfaces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Guide {
    pub orientation: Orientation,
    /// The x (vertical) or y (horizontal) of the line.
    pub offset: f64,
    pub kind: GuideKind,
}

/// Guides for display plus the position for movement, from one pass.
#[derive(Debug, Clone)]
pub struct GuideResult {
    pub guides: Vec<Guide>,
    /// Top-left origin the moving bounds should take this frame.
    pub position: Point,
}

/// One alignment candidate on a single axis.
struct Candidate {
    distance: f64,
    /// Origin coordinate on this axis if the candidate wins.
    origin: f64,
    guide: Guide,
}

/// Compute alignment guides for an item whose proposed bounds are
/// `moving`, against the other visible items' bounds and the canvas.
/// Per axis, the single candidate with minimum distance under its
/// threshold wins and adjusts the returned position on that axis only.
pub fn compute_guides(moving: Rect, others: &[Rect], canvas: Size) -> GuideResult {
    let mut guides = Vec::new();
    let mut position = Point::new(moving.x0, moving.y0);

    if let Some(best) = best_candidate(x_candidates(moving, others, canvas)) {
        position.x = best.origin;
        guides.push(best.guide);
    }
    if let Some(best) = best_candidate(y_candidates(moving, others, canvas)) {
        position.y = best.origin;
        guides.push(best.guide);
    }

    GuideResult { guides, position }
}

fn best_candidate(candidates: Vec<Candidate>) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        match &best {
            Some(b) if candidate.distance >= b.distance => {}
            _ => best = Some(candidate),
        }
    }
    best
}

fn x_candidates(moving: Rect, others: &[Rect], canvas: Size) -> Vec<Candidate> {
    let width = moving.width();
    let center = moving.x0 + width / 2.0;
    let mut candidates = Vec::new();

    // Canvas center, wide threshold.
    let canvas_cx = canvas.width / 2.0;
    let dist = (center - canvas_cx).abs();
    if dist < CENTER_SNAP_THRESHOLD {
        candidates.push(Candidate {
            distance: dist,
            origin: canvas_cx - width / 2.0,
            guide: Guide {
                orientation: Orientation::Vertical,
                offset: canvas_cx,
                kind: GuideKind::CanvasCenter,
            },
        });
    }

    // Canvas-edge margins.
    for (edge, origin) in [
        (CANVAS_EDGE_MARGIN, CANVAS_EDGE_MARGIN),
        (canvas.width - CANVAS_EDGE_MARGIN, canvas.width - CANVAS_EDGE_MARGIN - width),
    ] {
        let anchor = if origin < center { moving.x0 } else { moving.x1 };
        let dist = (anchor - edge).abs();
        if dist < SNAP_THRESHOLD {
            candidates.push(Candidate {
                distance: dist,
                origin,
                guide: Guide {
                    orientation: Orientation::Vertical,
                    offset: edge,
                    kind: GuideKind::CanvasEdge,
                },
            });
        }
    }

    // Edge and center alignment against every other item.
    for other in others {
        let other_center = other.x0 + other.width() / 2.0;
        for target in [other.x0, other_center, other.x1] {
            // Align the moving item's left, center, or right to the target.
            for (coord, origin_for) in [
                (moving.x0, target),
                (center, target - width / 2.0),
                (moving.x1, target - width),
            ] {
                let dist = (coord - target).abs();
                if dist < SNAP_THRESHOLD {
                    candidates.push(Candidate {
                        distance: dist,
                        origin: origin_for,
                        guide: Guide {
                            orientation: Orientation::Vertical,
                            offset: target,
                            kind: GuideKind::ItemAlignment,
                        },
                    });
                }
            }
        }
    }

    // Equal spacing between two flanking items: the moving center lands
    // midway between their centers. Only true flanks count, a neighbor
    // overlapping the moving item is an alignment case, not a spacing one.
    for (i, a) in others.iter().enumerate() {
        for b in others.iter().skip(i + 1) {
            let (a, b) = if a.x0 <= b.x0 { (a, b) } else { (b, a) };
            if a.x1 >= moving.x0 || b.x0 <= moving.x1 {
                continue;
            }
            let a_cx = a.x0 + a.width() / 2.0;
            let b_cx = b.x0 + b.width() / 2.0;
            let midpoint = (a_cx + b_cx) / 2.0;
            let dist = (center - midpoint).abs();
            if dist < SNAP_THRESHOLD {
                candidates.push(Candidate {
                    distance: dist,
                    origin: midpoint - width / 2.0,
                    guide: Guide {
                        orientation: Orientation::Vertical,
                        offset: midpoint,
                        kind: GuideKind::EqualSpacing,
                    },
                });
            }
        }
    }

    candidates
}

fn y_candidates(moving: Rect, others: &[Rect], canvas: Size) -> Vec<Candidate> {
    let height = moving.height();
    let center = moving.y0 + height / 2.0;
    let mut candidates = Vec::new();

    let canvas_cy = canvas.height / 2.0;
    let dist = (center - canvas_cy).abs();
    if dist < CENTER_SNAP_THRESHOLD {
        candidates.push(Candidate {
            distance: dist,
            origin: canvas_cy - height / 2.0,
            guide: Guide {
                orientation: Orientation::Horizontal,
                offset: canvas_cy,
                kind: GuideKind::CanvasCenter,
            },
        });
    }

    for (edge, origin) in [
        (CANVAS_EDGE_MARGIN, CANVAS_EDGE_MARGIN),
        (canvas.height - CANVAS_EDGE_MARGIN, canvas.height - CANVAS_EDGE_MARGIN - height),
    ] {
        let anchor = if origin < center { moving.y0 } else { moving.y1 };
        let dist = (anchor - edge).abs();
        if dist < SNAP_THRESHOLD {
            candidates.push(Candidate {
                distance: dist,
                origin,
                guide: Guide {
                    orientation: Orientation::Horizontal,
                    offset: edge,
                    kind: GuideKind::CanvasEdge,
                },
            });
        }
    }

    for other in others {
        let other_center = other.y0 + other.height() / 2.0;
        for target in [other.y0, other_center, other.y1] {
            for (coord, origin_for) in [
                (moving.y0, target),
                (center, target - height / 2.0),
                (moving.y1, target - height),
            ] {
                let dist = (coord - target).abs();
                if dist < SNAP_THRESHOLD {
                    candidates.push(Candidate {
                        distance: dist,
                        origin: origin_for,
                        guide: Guide {
                            orientation: Orientation::Horizontal,
                            offset: target,
                            kind: GuideKind::ItemAlignment,
                        },
                    });
                }
            }
        }
    }

    for (i, a) in others.iter().enumerate() {
        for b in others.iter().skip(i + 1) {
            let (a, b) = if a.y0 <= b.y0 { (a, b) } else { (b, a) };
            if a.y1 >= moving.y0 || b.y0 <= moving.y1 {
                continue;
            }
            let a_cy = a.y0 + a.height() / 2.0;
            let b_cy = b.y0 + b.height() / 2.0;
            let midpoint = (a_cy + b_cy) / 2.0;
            let dist = (center - midpoint).abs();
            if dist < SNAP_THRESHOLD {
                candidates.push(Candidate {
                    distance: dist,
                    origin: midpoint - height / 2.0,
                    guide: Guide {
                        orientation: Orientation::Horizontal,
                        offset: midpoint,
                        kind: GuideKind::EqualSpacing,
                    },
                });
            }
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANVAS: Size = Size::new(500.0, 500.0);

    #[test]
    fn test_no_candidates_leaves_position_unchanged() {
        let moving = Rect::new(100.0, 100.0, 140.0, 140.0);
        let result = compute_guides(moving, &[], CANVAS);
        // Canvas center is 130 units away, edges are far: nothing fires.
        assert!(result.guides.is_empty());
        assert_eq!(result.position, Point::new(100.0, 100.0));
    }

    #[test]
    fn test_canvas_center_uses_wide_threshold() {
        // Item center at x=215: 35 from canvas center, past the ordinary
        // threshold but inside the widened one.
        let moving = Rect::new(195.0, 400.0, 235.0, 440.0);
        let result = compute_guides(moving, &[], CANVAS);
        let center_guides: Vec<_> = result
            .guides
            .iter()
            .filter(|g| g.kind == GuideKind::CanvasCenter)
            .collect();
        assert_eq!(center_guides.len(), 1);
        assert_eq!(center_guides[0].orientation, Orientation::Vertical);
        // Position centered on the canvas.
        assert!((result.position.x - 230.0).abs() < 0.001);
    }

    #[test]
    fn test_edge_alignment_picks_nearest_candidate() {
        let moving = Rect::new(108.0, 300.0, 148.0, 340.0);
        // Two neighbors: left edges at 100 and 112. The closer one wins.
        let others = vec![
            Rect::new(100.0, 50.0, 140.0, 90.0),
            Rect::new(112.0, 150.0, 152.0, 190.0),
        ];
        let result = compute_guides(moving, &others, CANVAS);
        let vertical: Vec<_> = result
            .guides
            .iter()
            .filter(|g| g.orientation == Orientation::Vertical)
            .collect();
        assert_eq!(vertical.len(), 1);
        assert!((vertical[0].offset - 112.0).abs() < 0.001);
        assert!((result.position.x - 112.0).abs() < 0.001);
    }

    #[test]
    fn test_axes_adjust_independently() {
        // x has a near neighbor, y has nothing nearby.
        let moving = Rect::new(105.0, 300.0, 145.0, 340.0);
        let others = vec![Rect::new(100.0, 50.0, 140.0, 90.0)];
        let result = compute_guides(moving, &others, CANVAS);
        assert!((result.position.x - 100.0).abs() < 0.001);
        assert!((result.position.y - 300.0).abs() < 0.001);
    }

    #[test]
    fn test_canvas_edge_margin() {
        let moving = Rect::new(15.0, 300.0, 55.0, 340.0);
        let result = compute_guides(moving, &[], CANVAS);
        let edge: Vec<_> = result
            .guides
            .iter()
            .filter(|g| g.kind == GuideKind::CanvasEdge)
            .collect();
        assert_eq!(edge.len(), 1);
        assert!((edge[0].offset - CANVAS_EDGE_MARGIN).abs() < 0.001);
        assert!((result.position.x - CANVAS_EDGE_MARGIN).abs() < 0.001);
    }

    #[test]
    fn test_equal_spacing_midpoint() {
        // Flanking items centered at x=100 and x=300; the moving item is
        // near the midpoint (200) but not near either item's edges.
        let moving = Rect::new(172.0, 300.0, 212.0, 340.0);
        let others = vec![
            Rect::new(80.0, 300.0, 120.0, 340.0),
            Rect::new(280.0, 300.0, 320.0, 340.0),
        ];
        let result = compute_guides(moving, &others, CANVAS);
        assert!(result
            .guides
            .iter()
            .any(|g| g.kind == GuideKind::EqualSpacing));
    }

    #[test]
    fn test_guide_serializes_for_overlay() {
        let guide = Guide {
            orientation: Orientation::Vertical,
            offset: 250.0,
            kind: GuideKind::CanvasCenter,
        };
        let json = serde_json::to_string(&guide).unwrap();
        assert!(json.contains(r#""orientation":"vertical""#));
        assert!(json.contains(r#""kind":"canvas_center""#));
    }

    #[test]
    fn test_guides_are_advisory_descriptors() {
        // A winning guide reports the line it drew, not just the position.
        let moving = Rect::new(105.0, 300.0, 145.0, 340.0);
        let others = vec![Rect::new(100.0, 50.0, 140.0, 90.0)];
        let result = compute_guides(moving, &others, CANVAS);
        assert_eq!(result.guides.len(), 1);
        assert_eq!(result.guides[0].kind, GuideKind::ItemAlignment);
        assert!((result.guides[0].offset - 100.0).abs() < 0.001);
    }
}
