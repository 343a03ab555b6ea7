//! Collaboration management for real-time multi-user editing.
//!
//! One function applies every operation to the document; whether the
//! operation also gets broadcast is decided by its [`Provenance`], so a
//! remote mutation can never echo back onto the wire.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use kurbo::{Point, Rect, Vec2};
use uuid::Uuid;

use crate::document::Document;
use crate::error::EngineError;
use crate::items::{Fill, Item, ItemId, ItemKind, ItemStyle, Role, TextItem};
use crate::sync::{
    CanvasScope, FillTarget, LayerAction, OperationKind, RemoteOperation, TransformKind,
    base64_decode, base64_encode,
};

/// Coalescing window for move and resize updates during a drag.
pub const MOVE_THROTTLE: Duration = Duration::from_millis(50);
/// Rotation changes faster under the finger, so its window is longer to
/// keep the rate comparable.
pub const ROTATE_THROTTLE: Duration = Duration::from_millis(100);
/// Text edits tolerate the most latency.
pub const TEXT_THROTTLE: Duration = Duration::from_millis(200);

/// Bounds tolerance when matching a remote operation to an item without
/// a resolvable id.
const BOUNDS_MATCH_TOLERANCE: f64 = 5.0;

/// Where a mutation originated. Local mutations are broadcast; remote
/// ones are applied silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Local,
    Remote,
}

/// A throttled operation waiting out its coalescing window.
struct Pending {
    due: Instant,
    /// The latest operation received inside the window, if any.
    op: Option<RemoteOperation>,
}

/// Manages collaboration state: outbound queue, throttling, scope
/// filtering, and remote-operation application.
pub struct CollaborationManager {
    /// The page/canvas this engine is editing.
    scope: CanvasScope,
    /// Whether operations are broadcast.
    enabled: bool,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
    /// Per-item throttle windows, keyed by item id.
    pending: HashMap<String, Pending>,
}

impl CollaborationManager {
    pub fn new(scope: CanvasScope) -> Self {
        Self {
            scope,
            enabled: false,
            outgoing: Vec::new(),
            pending: HashMap::new(),
        }
    }

    pub fn scope(&self) -> &CanvasScope {
        &self.scope
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    // --- Applying operations ---

    /// Apply an operation to the document. This is the only mutation path
    /// for synchronized changes: local callers get their operation queued
    /// for broadcast, remote ones never do.
    ///
    /// Returns true if the document changed.
    pub fn apply_operation(
        &mut self,
        doc: &mut Document,
        op: &RemoteOperation,
        provenance: Provenance,
    ) -> Result<bool, EngineError> {
        if !self.scope.matches(&op.scope) {
            log::debug!(
                "ignoring operation for page {:?} (we are {:?})",
                op.scope.page_id,
                self.scope.page_id
            );
            return Ok(false);
        }

        let changed = self.apply_mutation(doc, op)?;
        if changed && provenance == Provenance::Local {
            self.record_local(op.clone());
        }
        Ok(changed)
    }

    fn apply_mutation(
        &mut self,
        doc: &mut Document,
        op: &RemoteOperation,
    ) -> Result<bool, EngineError> {
        match &op.kind {
            OperationKind::Draw { items } => {
                if items.is_empty() {
                    return Ok(false);
                }
                // An item we already hold is a replay (or our own apply);
                // replace it rather than duplicating.
                let root_id = items[0].id;
                if doc.get_item(root_id).is_some() {
                    doc.replace_tree(root_id, items.clone())?;
                } else {
                    doc.insert_tree(items.clone());
                }
                Ok(true)
            }
            OperationKind::Transform(payload) => {
                let bounds: Rect = payload.bounds.into();
                let position: Point = payload.position.into();
                let Some(id) =
                    self.resolve_target(doc, op.item_id.as_deref(), Some(bounds), Some(position))
                else {
                    log::warn!("transform target not found, dropping operation");
                    return Ok(false);
                };
                match payload.mode {
                    TransformKind::Move => {
                        let current = doc.item_bounds(id);
                        let delta =
                            Vec2::new(position.x - current.x0, position.y - current.y0);
                        if delta.hypot() > f64::EPSILON {
                            doc.translate_item(id, delta);
                        }
                    }
                    TransformKind::Resize | TransformKind::Rotate => {
                        // Peers replace geometry wholesale: replaying scale
                        // or angle deltas would drift apart over a gesture.
                        if let Some(items) = payload.items() {
                            if items.first().map(|i| i.id) == Some(id) {
                                doc.replace_tree(id, items)?;
                            } else if !items.is_empty() {
                                doc.remove_item(id);
                                doc.insert_tree(items);
                            }
                        }
                        if let Some(item) = doc.get_item_mut(id) {
                            item.rotation = payload.rotation;
                        }
                    }
                }
                Ok(true)
            }
            OperationKind::Fill(payload) => {
                let target = match payload.target_type {
                    FillTarget::Background => doc.background_item(),
                    FillTarget::Shape | FillTarget::Text => {
                        let bounds = payload.bounds.map(Rect::from);
                        let point = payload.point.map(Point::from);
                        self.resolve_target(doc, op.item_id.as_deref(), bounds, point)
                            .map(|id| descend_to_fillable(doc, id))
                    }
                };
                let Some(id) = target else {
                    log::warn!("fill target not found, dropping operation");
                    return Ok(false);
                };
                if let Some(item) = doc.get_item_mut(id) {
                    item.style.fill = Some(payload.fill.clone());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            OperationKind::Delete => {
                let Some(id) = self.resolve_target(doc, op.item_id.as_deref(), None, None)
                else {
                    return Ok(false);
                };
                Ok(doc.remove_item(id).is_some())
            }
            OperationKind::Layer { action } => self.apply_layer_action(doc, action),
            OperationKind::Text(payload) => {
                let mut text = TextItem::new(
                    payload.content.clone(),
                    payload.position.into(),
                    payload.font_size,
                );
                text.font_family = payload.font_family.clone();
                text.font_weight = payload.font_weight;
                text.align = payload.align;
                let style = ItemStyle {
                    stroke_color: payload.color,
                    stroke_width: 0.0,
                    fill: Some(Fill::solid(payload.color)),
                    ..ItemStyle::default()
                };
                let mut item = Item::text(text, style);
                if let Some(id) = op.item_id.as_deref().and_then(|s| Uuid::parse_str(s).ok())
                {
                    item.id = id;
                }
                // Editing an existing text item replaces it in place.
                if doc.get_item(item.id).is_some() {
                    doc.replace_tree(item.id, vec![item])?;
                } else {
                    doc.add_item(item);
                }
                Ok(true)
            }
        }
    }

    fn apply_layer_action(
        &mut self,
        doc: &mut Document,
        action: &LayerAction,
    ) -> Result<bool, EngineError> {
        let parse = |s: &str| Uuid::parse_str(s).ok();
        let result = match action {
            LayerAction::Create { layer_id, name } => {
                let Some(id) = parse(layer_id) else {
                    return Ok(false);
                };
                doc.add_layer_with_id(id, name.clone());
                Ok(())
            }
            LayerAction::Delete { layer_id } => match parse(layer_id) {
                Some(id) => doc.delete_layer(id),
                None => return Ok(false),
            },
            LayerAction::Rename { layer_id, name } => match parse(layer_id) {
                Some(id) => doc.rename_layer(id, name.clone()),
                None => return Ok(false),
            },
            LayerAction::SetVisible { layer_id, visible } => match parse(layer_id) {
                Some(id) => doc.set_layer_visible(id, *visible),
                None => return Ok(false),
            },
            LayerAction::SetOpacity { layer_id, opacity } => match parse(layer_id) {
                Some(id) => doc.set_layer_opacity(id, *opacity),
                None => return Ok(false),
            },
            LayerAction::SetLocked { layer_id, locked } => match parse(layer_id) {
                Some(id) => doc.set_layer_locked(id, *locked),
                None => return Ok(false),
            },
            LayerAction::Duplicate { source_id, .. } => match parse(source_id) {
                Some(id) => doc.duplicate_layer(id).map(|_| ()),
                None => return Ok(false),
            },
            LayerAction::MergeDown { layer_id } => match parse(layer_id) {
                Some(id) => doc.merge_layer_down(id),
                None => return Ok(false),
            },
            LayerAction::Reorder { layer_id, index } => match parse(layer_id) {
                Some(id) => doc.move_layer(id, *index),
                None => return Ok(false),
            },
            LayerAction::Clear { layer_id } => match parse(layer_id) {
                Some(id) => doc.clear_layer(id),
                None => return Ok(false),
            },
        };
        // A peer's layer operation can legitimately fail against our
        // document (already deleted, protected layer); drop it rather
        // than poisoning the session.
        match result {
            Ok(()) => Ok(true),
            Err(err) => {
                log::warn!("layer operation rejected: {err}");
                Ok(false)
            }
        }
    }

    /// Locate the item an operation targets: exact id first, then bounds
    /// proximity, then point hit-test. Items created before an id was
    /// assigned, or by clients with other id schemes, still resolve.
    fn resolve_target(
        &self,
        doc: &Document,
        item_id: Option<&str>,
        bounds: Option<Rect>,
        point: Option<Point>,
    ) -> Option<ItemId> {
        if let Some(id) = item_id.and_then(|s| Uuid::parse_str(s).ok()) {
            if doc.get_item(id).is_some() {
                return Some(id);
            }
        }
        if let Some(bounds) = bounds {
            if let Some(id) = doc.find_by_bounds(bounds, BOUNDS_MATCH_TOLERANCE) {
                return Some(id);
            }
        }
        if let Some(point) = point {
            if let Some(&id) = doc.items_at_point(point, BOUNDS_MATCH_TOLERANCE).first() {
                return Some(id);
            }
        }
        None
    }

    // --- Outbound queue ---

    /// Queue a local operation for broadcast, coalescing repeated updates
    /// to the same item inside its throttle window.
    pub fn record_local(&mut self, op: RemoteOperation) {
        self.record_local_at(op, Instant::now());
    }

    /// [`record_local`](Self::record_local) with an explicit clock.
    pub fn record_local_at(&mut self, op: RemoteOperation, now: Instant) {
        if !self.enabled {
            return;
        }
        let Some(window) = throttle_window(&op.kind) else {
            self.push_op(op);
            return;
        };
        let key = op.item_id.clone().unwrap_or_default();
        if let Some(pending) = self.pending.get_mut(&key) {
            if now < pending.due {
                // Inside the window: keep only the newest update.
                pending.op = Some(op);
                return;
            }
        }
        // Leading edge: send immediately and open a window.
        self.push_op(op);
        self.pending.insert(
            key,
            Pending {
                due: now + window,
                op: None,
            },
        );
    }

    /// Release coalesced operations whose window has elapsed.
    pub fn flush_pending(&mut self) {
        self.flush_pending_at(Instant::now());
    }

    /// [`flush_pending`](Self::flush_pending) with an explicit clock.
    pub fn flush_pending_at(&mut self, now: Instant) {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| now >= p.due)
            .map(|(k, _)| k.clone())
            .collect();
        for key in due {
            if let Some(pending) = self.pending.remove(&key) {
                if let Some(op) = pending.op {
                    self.push_op(op);
                }
            }
        }
    }

    /// Send every coalesced operation immediately, window or not. Called
    /// at the end of a gesture so the final position always goes out.
    pub fn flush_all(&mut self) {
        let keys: Vec<String> = self.pending.keys().cloned().collect();
        for key in keys {
            if let Some(pending) = self.pending.remove(&key) {
                if let Some(op) = pending.op {
                    self.push_op(op);
                }
            }
        }
    }

    fn push_op(&mut self, op: RemoteOperation) {
        match op.to_json() {
            Ok(json) => self.outgoing.push(json),
            Err(err) => log::error!("failed to serialize operation: {err}"),
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    // --- Inbound messages ---

    /// Parse and apply one inbound wire message.
    pub fn handle_message(
        &mut self,
        doc: &mut Document,
        json: &str,
    ) -> Result<bool, EngineError> {
        let op = RemoteOperation::from_json(json)?;
        self.apply_operation(doc, &op, Provenance::Remote)
    }

    // --- Snapshot reconciliation ---

    /// Export the whole document as a base64 snapshot blob for a joining
    /// or reconnecting peer.
    pub fn export_snapshot(&self, doc: &Document) -> Result<String, EngineError> {
        let json = doc.to_json()?;
        Ok(base64_encode(json.as_bytes()))
    }

    /// Replace the local document with a peer's snapshot. Reconciliation
    /// is wholesale, not a merge: clear and load.
    pub fn apply_snapshot(&mut self, doc: &mut Document, data: &str) -> Result<(), EngineError> {
        let bytes = base64_decode(data).ok_or(EngineError::SnapshotEncoding)?;
        let json = String::from_utf8(bytes).map_err(|_| EngineError::SnapshotEncoding)?;
        *doc = Document::from_json(&json)?;
        log::info!(
            "applied snapshot: {} items, {} layers",
            doc.items.len(),
            doc.layers.len()
        );
        Ok(())
    }
}

/// Throttle window per operation kind. None means send immediately.
fn throttle_window(kind: &OperationKind) -> Option<Duration> {
    match kind {
        OperationKind::Transform(payload) => match payload.mode {
            TransformKind::Rotate => Some(ROTATE_THROTTLE),
            TransformKind::Move | TransformKind::Resize => Some(MOVE_THROTTLE),
        },
        OperationKind::Text(_) => Some(TEXT_THROTTLE),
        _ => None,
    }
}

/// For a group, the first child that can take a fill (not a hit target);
/// anything else fills itself.
pub fn descend_to_fillable(doc: &Document, id: ItemId) -> ItemId {
    let Some(item) = doc.get_item(id) else { return id };
    if let ItemKind::Group(group) = &item.kind {
        for &child in &group.children {
            if let Some(child_item) = doc.get_item(child) {
                if child_item.role != Role::HitTarget && !child_item.is_group() {
                    return child;
                }
                if child_item.is_group() {
                    return descend_to_fillable(doc, child);
                }
            }
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{Fill, SerializableColor};
    use crate::sync::{FillPayload, TransformPayload};

    fn scope() -> CanvasScope {
        CanvasScope::new("page_1", 1)
    }

    fn manager() -> CollaborationManager {
        let mut m = CollaborationManager::new(scope());
        m.enable();
        m
    }

    fn stroke_item(x: f64) -> Item {
        Item::stroke(
            vec![Point::new(x, 0.0), Point::new(x + 10.0, 10.0)],
            ItemStyle::default(),
        )
    }

    #[test]
    fn test_disabled_by_default() {
        let m = CollaborationManager::new(scope());
        assert!(!m.is_enabled());
    }

    #[test]
    fn test_local_draw_applies_and_broadcasts() {
        let mut m = manager();
        let mut doc = Document::new();
        let item = stroke_item(0.0);
        let op = RemoteOperation::draw(scope(), vec![item]);

        let changed = m.apply_operation(&mut doc, &op, Provenance::Local).unwrap();
        assert!(changed);
        assert_eq!(doc.content_len(), 1);
        assert_eq!(m.take_outgoing().len(), 1);
    }

    #[test]
    fn test_remote_draw_is_never_echoed() {
        let mut m = manager();
        let mut doc = Document::new();
        let op = RemoteOperation::draw(scope(), vec![stroke_item(0.0)]);

        let changed = m.apply_operation(&mut doc, &op, Provenance::Remote).unwrap();
        assert!(changed);
        assert_eq!(doc.content_len(), 1);
        assert!(!m.has_outgoing());
    }

    #[test]
    fn test_other_page_operations_ignored() {
        let mut m = manager();
        let mut doc = Document::new();
        let other = CanvasScope::new("page_2", 2);
        let op = RemoteOperation::draw(other, vec![stroke_item(0.0)]);

        let changed = m.apply_operation(&mut doc, &op, Provenance::Remote).unwrap();
        assert!(!changed);
        assert_eq!(doc.content_len(), 0);
    }

    #[test]
    fn test_two_peers_converge_on_draw() {
        let mut m1 = manager();
        let mut m2 = manager();
        let mut doc1 = Document::new();
        let mut doc2 = Document::new();

        let op = RemoteOperation::draw(scope(), vec![stroke_item(42.0)]);
        m1.apply_operation(&mut doc1, &op, Provenance::Local).unwrap();

        for msg in m1.take_outgoing() {
            m2.handle_message(&mut doc2, &msg).unwrap();
        }
        // No echo back from the second peer.
        assert!(!m2.has_outgoing());
        assert_eq!(doc1.content_len(), doc2.content_len());
        let id = doc1.content_z_order()[0];
        assert_eq!(doc1.item_bounds(id), doc2.item_bounds(id));
    }

    #[test]
    fn test_concurrent_draws_converge_in_order() {
        let mut m1 = manager();
        let mut m2 = manager();
        let mut doc1 = Document::new();
        let mut doc2 = Document::new();

        // Each peer stamps and commits before seeing the other's item.
        let mut s1 = stroke_item(0.0);
        s1.seq = doc1.next_sequence();
        let op1 = RemoteOperation::draw(scope(), vec![s1]);
        let mut s2 = stroke_item(50.0);
        s2.seq = doc2.next_sequence();
        let op2 = RemoteOperation::draw(scope(), vec![s2]);

        m1.apply_operation(&mut doc1, &op1, Provenance::Local).unwrap();
        m2.apply_operation(&mut doc2, &op2, Provenance::Local).unwrap();
        for msg in m1.take_outgoing() {
            m2.handle_message(&mut doc2, &msg).unwrap();
        }
        for msg in m2.take_outgoing() {
            m1.handle_message(&mut doc1, &msg).unwrap();
        }

        assert_eq!(doc1.content_z_order(), doc2.content_z_order());
        for id in doc1.content_z_order() {
            assert_eq!(doc1.get_item(id), doc2.get_item(id));
        }
    }

    #[test]
    fn test_remote_move_by_position() {
        let mut m = manager();
        let mut doc = Document::new();
        let item = stroke_item(0.0);
        let id = item.id;
        doc.add_item(item);

        let payload = TransformPayload::new(
            TransformKind::Move,
            Rect::new(30.0, 40.0, 40.0, 50.0),
            0.0,
        );
        let op = RemoteOperation::transform(scope(), id.to_string(), payload);
        m.apply_operation(&mut doc, &op, Provenance::Remote).unwrap();

        let bounds = doc.item_bounds(id);
        assert!((bounds.x0 - 30.0).abs() < 0.001);
        assert!((bounds.y0 - 40.0).abs() < 0.001);
    }

    #[test]
    fn test_remote_resize_replaces_geometry() {
        let mut m = manager();
        let mut doc = Document::new();
        let item = stroke_item(0.0);
        let id = item.id;
        doc.add_item(item.clone());

        // Peer sends the resized tree wholesale.
        let mut resized = item;
        resized.scale_to_bounds(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(0.0, 0.0, 40.0, 40.0),
        );
        let payload = TransformPayload::new(
            TransformKind::Resize,
            Rect::new(0.0, 0.0, 40.0, 40.0),
            0.0,
        )
        .with_items(&[resized])
        .unwrap();
        let op = RemoteOperation::transform(scope(), id.to_string(), payload);
        m.apply_operation(&mut doc, &op, Provenance::Remote).unwrap();

        let bounds = doc.item_bounds(id);
        assert!((bounds.width() - 40.0).abs() < 0.001);
    }

    #[test]
    fn test_target_resolved_by_bounds_when_id_unknown() {
        let mut m = manager();
        let mut doc = Document::new();
        let item = stroke_item(0.0);
        let id = item.id;
        doc.add_item(item);

        // Foreign id scheme: not a UUID. Bounds still match.
        let payload = TransformPayload::new(
            TransformKind::Move,
            Rect::new(0.0, 0.0, 10.0, 10.0),
            0.0,
        );
        let op = RemoteOperation::transform(scope(), "item-17".to_string(), payload);
        let changed = m.apply_operation(&mut doc, &op, Provenance::Remote).unwrap();
        assert!(changed);
        assert!(doc.get_item(id).is_some());
    }

    #[test]
    fn test_remote_delete() {
        let mut m = manager();
        let mut doc = Document::new();
        let item = stroke_item(0.0);
        let id = item.id;
        doc.add_item(item);

        let op = RemoteOperation::delete(scope(), id.to_string());
        m.apply_operation(&mut doc, &op, Provenance::Remote).unwrap();
        assert_eq!(doc.content_len(), 0);
    }

    #[test]
    fn test_fill_background_fallback() {
        let mut m = manager();
        let mut doc = Document::new();
        let red = SerializableColor { r: 255, g: 0, b: 0, a: 255 };
        let op = RemoteOperation::fill(
            scope(),
            None,
            FillPayload {
                target_type: FillTarget::Background,
                fill: Fill::solid(red),
                bounds: None,
                point: None,
            },
        );
        m.apply_operation(&mut doc, &op, Provenance::Remote).unwrap();

        let bg = doc.background_item().unwrap();
        match &doc.get_item(bg).unwrap().style.fill {
            Some(Fill::Solid { color }) => assert_eq!(color.r, 255),
            _ => panic!("Expected solid fill on background"),
        }
    }

    #[test]
    fn test_throttle_coalesces_repeated_moves() {
        let mut m = manager();
        let start = Instant::now();
        let id = Uuid::new_v4().to_string();

        let op_at = |x: f64| {
            RemoteOperation::transform(
                scope(),
                id.clone(),
                TransformPayload::new(
                    TransformKind::Move,
                    Rect::new(x, 0.0, x + 10.0, 10.0),
                    0.0,
                ),
            )
        };

        // Ten updates inside one window: the first goes out immediately,
        // the rest coalesce down to the newest.
        for i in 0..10 {
            m.record_local_at(op_at(i as f64), start + Duration::from_millis(i * 4));
        }
        assert_eq!(m.take_outgoing().len(), 1);

        m.flush_pending_at(start + MOVE_THROTTLE);
        let flushed = m.take_outgoing();
        assert_eq!(flushed.len(), 1);
        let op = RemoteOperation::from_json(&flushed[0]).unwrap();
        match op.kind {
            OperationKind::Transform(p) => assert!((p.position.x - 9.0).abs() < 0.001),
            _ => panic!("Expected transform operation"),
        }
    }

    #[test]
    fn test_throttle_is_per_item() {
        let mut m = manager();
        let start = Instant::now();
        let op_for = |id: &str| {
            RemoteOperation::transform(
                scope(),
                id.to_string(),
                TransformPayload::new(
                    TransformKind::Move,
                    Rect::new(0.0, 0.0, 10.0, 10.0),
                    0.0,
                ),
            )
        };
        let a = Uuid::new_v4().to_string();
        let b = Uuid::new_v4().to_string();
        m.record_local_at(op_for(&a), start);
        m.record_local_at(op_for(&b), start);
        // Different items never share a window.
        assert_eq!(m.take_outgoing().len(), 2);
    }

    #[test]
    fn test_draw_and_delete_bypass_throttle() {
        let mut m = manager();
        let start = Instant::now();
        for i in 0..5 {
            let item = stroke_item(i as f64);
            let id = item.id.to_string();
            m.record_local_at(RemoteOperation::draw(scope(), vec![item]), start);
            m.record_local_at(RemoteOperation::delete(scope(), id), start);
        }
        assert_eq!(m.take_outgoing().len(), 10);
    }

    #[test]
    fn test_flush_all_releases_final_position() {
        let mut m = manager();
        let start = Instant::now();
        let id = Uuid::new_v4().to_string();
        let op_at = |x: f64| {
            RemoteOperation::transform(
                scope(),
                id.clone(),
                TransformPayload::new(
                    TransformKind::Move,
                    Rect::new(x, 0.0, x + 10.0, 10.0),
                    0.0,
                ),
            )
        };
        m.record_local_at(op_at(0.0), start);
        m.record_local_at(op_at(25.0), start + Duration::from_millis(10));
        m.take_outgoing();

        // Pointer-up before the window elapsed: the final position must
        // still reach the peers.
        m.flush_all();
        let out = m.take_outgoing();
        assert_eq!(out.len(), 1);
        let op = RemoteOperation::from_json(&out[0]).unwrap();
        match op.kind {
            OperationKind::Transform(p) => assert!((p.position.x - 25.0).abs() < 0.001),
            _ => panic!("Expected transform operation"),
        }
    }

    #[test]
    fn test_snapshot_reconciliation_replaces_document() {
        let mut m1 = manager();
        let mut m2 = manager();
        let mut doc1 = Document::new();
        let mut doc2 = Document::new();

        doc1.add_item(stroke_item(0.0));
        doc1.add_item(stroke_item(50.0));
        // The late joiner drew something of its own; reconciliation is
        // clear-and-load, not a merge.
        doc2.add_item(stroke_item(999.0));

        let snapshot = m1.export_snapshot(&doc1).unwrap();
        m2.apply_snapshot(&mut doc2, &snapshot).unwrap();

        assert_eq!(doc2.content_len(), 2);
        assert_eq!(doc1.to_json().unwrap(), doc2.to_json().unwrap());
        // The restored document still has a usable active layer.
        assert!(doc2.layer(doc2.active_layer).is_some());
    }

    #[test]
    fn test_snapshot_rejects_garbage() {
        let mut m = manager();
        let mut doc = Document::new();
        assert!(m.apply_snapshot(&mut doc, "!!not-base64!!").is_err());
    }

    #[test]
    fn test_remote_layer_create_and_set_opacity() {
        let mut m = manager();
        let mut doc = Document::new();
        let layer_id = Uuid::new_v4();

        let create = RemoteOperation::layer(
            scope(),
            LayerAction::Create {
                layer_id: layer_id.to_string(),
                name: "Sky".to_string(),
            },
        );
        m.apply_operation(&mut doc, &create, Provenance::Remote).unwrap();
        assert!(doc.layer(layer_id).is_some());

        let opacity = RemoteOperation::layer(
            scope(),
            LayerAction::SetOpacity {
                layer_id: layer_id.to_string(),
                opacity: 0.4,
            },
        );
        m.apply_operation(&mut doc, &opacity, Provenance::Remote).unwrap();
        assert!((doc.layer(layer_id).unwrap().opacity - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejected_layer_operation_does_not_error() {
        let mut m = manager();
        let mut doc = Document::new();
        let bg = doc.layers[0].id;
        let op = RemoteOperation::layer(
            scope(),
            LayerAction::Delete {
                layer_id: bg.to_string(),
            },
        );
        // Protected-layer rejection is logged and swallowed.
        let changed = m.apply_operation(&mut doc, &op, Provenance::Remote).unwrap();
        assert!(!changed);
        assert!(doc.layers[0].is_background);
    }
}
