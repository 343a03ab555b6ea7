//! The drawing engine: pointer routing, tool dispatch, selection, and
//! the commit pipeline (history push + collaboration broadcast).

use kurbo::{Point, Rect, Vec2};

use crate::collaboration::{CollaborationManager, Provenance, descend_to_fillable};
use crate::document::Document;
use crate::error::EngineError;
use crate::guides::{Guide, compute_guides};
use crate::items::{Fill, Item, ItemId, ItemKind, ItemStyle, TextAlign, TextItem};
use crate::sync::{
    CanvasScope, FillPayload, FillTarget, LayerAction, RemoteOperation, TextPayload,
    TransformKind, TransformPayload,
};
use crate::tools::{ToolKind, ToolSession, ToolSettings, Preview, erase};
use crate::transform::{Handle, TransformMode, TransformSession, selection_handles};

/// Hit tolerance for picking items with the select tool.
const SELECT_HIT_TOLERANCE: f64 = 4.0;
/// Fill clicks get a generous tolerance so thin outlines are easy to hit.
const FILL_HIT_TOLERANCE: f64 = 8.0;

/// Rasterizes a document for thumbnails and page previews. The engine is
/// renderer-agnostic; the application supplies the implementation.
pub trait RasterExporter {
    fn export(&self, doc: &Document) -> Result<Vec<u8>, EngineError>;
}

/// The collaborative drawing engine for one canvas.
pub struct Engine {
    pub document: Document,
    collaboration: CollaborationManager,
    current_tool: ToolKind,
    settings: ToolSettings,
    session: Option<ToolSession>,
    transform: Option<TransformSession>,
    /// Whether the current transform gesture has mutated the document.
    /// History and broadcast wait for the first real movement, so a plain
    /// click on a selection commits nothing.
    transform_dirty: bool,
    selected: Option<ItemId>,
    guides: Vec<Guide>,
    /// Set whenever the document mutates, cleared by the render loop.
    document_changed: bool,
}

impl Engine {
    pub fn new(scope: CanvasScope) -> Self {
        Self {
            document: Document::new(),
            collaboration: CollaborationManager::new(scope),
            current_tool: ToolKind::default(),
            settings: ToolSettings::default(),
            session: None,
            transform: None,
            transform_dirty: false,
            selected: None,
            guides: Vec::new(),
            document_changed: false,
        }
    }

    // --- Tool and settings ---

    pub fn current_tool(&self) -> ToolKind {
        self.current_tool
    }

    /// Switch tools. Leaving the select tool drops the selection; any
    /// in-progress gesture is abandoned.
    pub fn set_tool(&mut self, tool: ToolKind) {
        if tool != ToolKind::Select {
            self.selected = None;
            self.transform = None;
            self.guides.clear();
        }
        self.session = None;
        self.current_tool = tool;
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ToolSettings {
        &mut self.settings
    }

    pub fn selected(&self) -> Option<ItemId> {
        self.selected
    }

    pub fn deselect(&mut self) {
        self.selected = None;
        self.transform = None;
        self.guides.clear();
    }

    /// Alignment guides for the overlay, valid while a move is in progress.
    pub fn guides(&self) -> &[Guide] {
        &self.guides
    }

    /// Handles to draw for the current selection.
    pub fn handles(&self) -> Vec<Handle> {
        let Some(id) = self.selected else {
            return Vec::new();
        };
        let bounds = self.document.item_bounds(id);
        let rotation = self
            .document
            .get_item(id)
            .map(|i| i.rotation)
            .unwrap_or(0.0);
        selection_handles(bounds, rotation)
    }

    /// Preview of the in-progress gesture for the render loop.
    pub fn preview(&self) -> Option<Preview> {
        self.session.as_ref().and_then(ToolSession::preview)
    }

    /// True once if the document changed since the last call.
    pub fn take_document_changed(&mut self) -> bool {
        std::mem::take(&mut self.document_changed)
    }

    // --- Pointer routing ---

    pub fn pointer_down(&mut self, point: Point) {
        match self.current_tool {
            ToolKind::Select => self.select_down(point),
            ToolKind::Fill => {
                if let Err(err) = self.fill_at(point) {
                    log::warn!("fill failed: {err}");
                }
            }
            // Text input comes from an external surface; see `add_text`.
            ToolKind::Text => {}
            tool => {
                self.session = ToolSession::begin(tool, &self.settings, point);
            }
        }
    }

    pub fn pointer_move(&mut self, point: Point) {
        if let Some(mut transform) = self.transform.take() {
            // Until the pointer actually travels, the gesture commits
            // nothing: no history entry, no broadcast.
            if !self.transform_dirty && point == transform.start_point {
                self.transform = Some(transform);
                return;
            }
            if !self.transform_dirty {
                self.document.push_undo();
                self.transform_dirty = true;
            }
            let point = if transform.mode == TransformMode::Move {
                self.moved_point_with_guides(&transform, point)
            } else {
                self.guides.clear();
                point
            };
            transform.apply(&mut self.document, point);
            self.broadcast_transform(&transform);
            self.transform = Some(transform);
            self.document_changed = true;
        } else if let Some(session) = &mut self.session {
            session.update(point, &self.settings);
        }
    }

    pub fn pointer_up(&mut self, point: Point) {
        if let Some(mut transform) = self.transform.take() {
            if !self.transform_dirty && point == transform.start_point {
                // A plain click on the selection.
                self.guides.clear();
                return;
            }
            if !self.transform_dirty {
                self.document.push_undo();
                self.transform_dirty = true;
            }
            let point = if transform.mode == TransformMode::Move {
                self.moved_point_with_guides(&transform, point)
            } else {
                point
            };
            transform.apply(&mut self.document, point);
            self.broadcast_transform(&transform);
            // The gesture is over: release whatever the throttle held back.
            self.collaboration.flush_all();
            self.guides.clear();
            self.document_changed = true;
            return;
        }

        let Some(mut session) = self.session.take() else {
            return;
        };
        session.update(point, &self.settings);

        if let ToolSession::Eraser { points, width } = &session {
            self.resolve_erase(points.clone(), *width);
            return;
        }

        let mut items = session.finish(&self.settings);
        if items.is_empty() {
            return;
        }
        // Stamp the root before building the operation so the same
        // sequence number reaches every peer.
        if let Some(root) = items.first_mut() {
            root.seq = self.document.next_sequence();
        }
        self.document.push_undo();
        let op = RemoteOperation::draw(self.collaboration.scope().clone(), items);
        if let Err(err) =
            self.collaboration
                .apply_operation(&mut self.document, &op, Provenance::Local)
        {
            log::error!("failed to commit drawing: {err}");
        }
        self.document_changed = true;
    }

    fn select_down(&mut self, point: Point) {
        // A press on the current selection starts a transform gesture.
        if let Some(id) = self.selected {
            if let Some(session) = TransformSession::begin(&self.document, id, point) {
                self.transform = Some(session);
                self.transform_dirty = false;
                return;
            }
        }
        // Otherwise pick a new selection; a drag that continues from this
        // press moves the freshly selected item.
        match self
            .document
            .items_at_point(point, SELECT_HIT_TOLERANCE)
            .first()
            .copied()
        {
            Some(id) => {
                self.selected = Some(id);
                if let Some(session) = TransformSession::begin(&self.document, id, point) {
                    self.transform = Some(session);
                    self.transform_dirty = false;
                }
            }
            None => self.deselect(),
        }
    }

    /// Adjust a move-gesture pointer so the item lands on the position the
    /// guide calculator chose, and refresh the overlay guides.
    fn moved_point_with_guides(&mut self, transform: &TransformSession, point: Point) -> Point {
        let proposed = transform.proposed_move_bounds(point);
        let others: Vec<Rect> = self
            .document
            .alignment_targets()
            .into_iter()
            .filter(|&id| Some(id) != self.selected)
            .map(|id| self.document.item_bounds(id))
            .collect();
        let result = compute_guides(proposed, &others, self.document.canvas_size);
        self.guides = result.guides;
        let correction = Vec2::new(
            result.position.x - proposed.x0,
            result.position.y - proposed.y0,
        );
        point + correction
    }

    fn broadcast_transform(&mut self, transform: &TransformSession) {
        let id = transform.item_id;
        let bounds = self.document.item_bounds(id);
        let rotation = self
            .document
            .get_item(id)
            .map(|i| i.rotation)
            .unwrap_or(0.0);
        let kind = match transform.mode {
            TransformMode::Move => TransformKind::Move,
            TransformMode::Resize(_) => TransformKind::Resize,
            TransformMode::Rotate => TransformKind::Rotate,
        };
        let mut payload = TransformPayload::new(kind, bounds, rotation);
        if kind != TransformKind::Move {
            // Resize and rotate ship the full geometry for exact
            // reconstruction on the other side.
            match payload.with_items(&self.document.item_tree(id)) {
                Ok(p) => payload = p,
                Err(err) => {
                    log::error!("failed to export item tree: {err}");
                    return;
                }
            }
        }
        let op = RemoteOperation::transform(
            self.collaboration.scope().clone(),
            id.to_string(),
            payload,
        );
        self.collaboration.record_local(op);
    }

    fn resolve_erase(&mut self, points: Vec<Point>, width: f64) {
        let result = erase(&self.document, &points, width);
        if result.is_empty() {
            return;
        }
        self.document.push_undo();
        let scope = self.collaboration.scope().clone();
        // Remember where the erased strokes lived so split remainders stay
        // on the same layer.
        let home_layer = result
            .removed
            .first()
            .and_then(|id| {
                self.document
                    .layers
                    .iter()
                    .find(|l| l.items.contains(id))
            })
            .map(|l| l.id)
            .unwrap_or(self.document.active_layer);

        for id in result.removed {
            self.document.remove_item(id);
            self.collaboration
                .record_local(RemoteOperation::delete(scope.clone(), id.to_string()));
        }
        for mut item in result.added {
            item.seq = self.document.next_sequence();
            let op = RemoteOperation::draw(scope.clone(), vec![item.clone()]);
            self.collaboration.record_local(op);
            self.document.add_item_to_layer(item, home_layer);
        }
        self.document_changed = true;
    }

    // --- Fill ---

    /// Apply the current fill (or stroke color) at a click point. Groups
    /// descend to their first fillable child; empty space fills the
    /// document background.
    pub fn fill_at(&mut self, point: Point) -> Result<(), EngineError> {
        let fill = self
            .settings
            .shape_fill
            .clone()
            .unwrap_or_else(|| Fill::solid(self.settings.color));

        let hit = self
            .document
            .items_at_point(point, FILL_HIT_TOLERANCE)
            .first()
            .copied()
            .map(|id| descend_to_fillable(&self.document, id));

        let (target_type, item_id, bounds) = match hit {
            Some(id) => {
                let target_type = match self.document.get_item(id).map(|i| &i.kind) {
                    Some(ItemKind::Text(_)) => FillTarget::Text,
                    _ => FillTarget::Shape,
                };
                (target_type, Some(id.to_string()), Some(self.document.item_bounds(id)))
            }
            None => (FillTarget::Background, None, None),
        };

        self.document.push_undo();
        let op = RemoteOperation::fill(
            self.collaboration.scope().clone(),
            item_id,
            FillPayload {
                target_type,
                fill,
                bounds: bounds.map(Into::into),
                point: Some(point.into()),
            },
        );
        self.collaboration
            .apply_operation(&mut self.document, &op, Provenance::Local)?;
        self.document_changed = true;
        Ok(())
    }

    // --- Text ---

    /// Commit a text item at a position. The content comes from an
    /// external input surface. Center and right alignment shift the
    /// anchor by the estimated text width.
    pub fn add_text(&mut self, content: &str, position: Point) -> ItemId {
        let mut text = TextItem::new(content, position, self.settings.font_size);
        text.font_family = self.settings.font_family.clone();
        text.align = self.settings.text_align;
        let shift = match self.settings.text_align {
            TextAlign::Left => 0.0,
            TextAlign::Center => text.estimated_width() / 2.0,
            TextAlign::Right => text.estimated_width(),
        };
        text.position.x -= shift;

        let style = ItemStyle {
            stroke_color: self.settings.color,
            stroke_width: 0.0,
            fill: Some(Fill::solid(self.settings.color)),
            ..ItemStyle::default()
        };
        let payload = TextPayload {
            content: content.to_string(),
            position: text.position.into(),
            font_size: text.font_size,
            font_family: text.font_family.clone(),
            font_weight: text.font_weight,
            color: self.settings.color,
            align: text.align,
        };
        let item = Item::text(text, style);
        let id = item.id;

        self.document.push_undo();
        self.document.add_item(item);
        self.collaboration.record_local(RemoteOperation::text(
            self.collaboration.scope().clone(),
            id.to_string(),
            payload,
        ));
        self.document_changed = true;
        id
    }

    // --- Selection commands ---

    /// Delete the selected item and notify peers.
    pub fn delete_selected(&mut self) {
        let Some(id) = self.selected.take() else {
            return;
        };
        self.transform = None;
        self.guides.clear();
        self.document.push_undo();
        let op = RemoteOperation::delete(self.collaboration.scope().clone(), id.to_string());
        if let Err(err) =
            self.collaboration
                .apply_operation(&mut self.document, &op, Provenance::Local)
        {
            log::warn!("delete failed: {err}");
        }
        self.document_changed = true;
    }

    // --- History ---

    pub fn undo(&mut self) -> bool {
        let done = self.document.undo();
        if done {
            self.deselect();
            self.document_changed = true;
        }
        done
    }

    pub fn redo(&mut self) -> bool {
        let done = self.document.redo();
        if done {
            self.deselect();
            self.document_changed = true;
        }
        done
    }

    // --- Layers ---

    pub fn add_layer(&mut self, name: &str) -> crate::document::LayerId {
        self.document.push_undo();
        let id = self.document.add_layer(name);
        self.record_layer_action(LayerAction::Create {
            layer_id: id.to_string(),
            name: name.to_string(),
        });
        self.document_changed = true;
        id
    }

    pub fn delete_layer(&mut self, id: crate::document::LayerId) -> Result<(), EngineError> {
        self.document.push_undo();
        self.document.delete_layer(id)?;
        self.record_layer_action(LayerAction::Delete {
            layer_id: id.to_string(),
        });
        self.document_changed = true;
        Ok(())
    }

    pub fn rename_layer(
        &mut self,
        id: crate::document::LayerId,
        name: &str,
    ) -> Result<(), EngineError> {
        self.document.rename_layer(id, name)?;
        self.record_layer_action(LayerAction::Rename {
            layer_id: id.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn set_layer_visible(
        &mut self,
        id: crate::document::LayerId,
        visible: bool,
    ) -> Result<(), EngineError> {
        self.document.set_layer_visible(id, visible)?;
        self.record_layer_action(LayerAction::SetVisible {
            layer_id: id.to_string(),
            visible,
        });
        self.document_changed = true;
        Ok(())
    }

    pub fn set_layer_opacity(
        &mut self,
        id: crate::document::LayerId,
        opacity: f64,
    ) -> Result<(), EngineError> {
        self.document.set_layer_opacity(id, opacity)?;
        self.record_layer_action(LayerAction::SetOpacity {
            layer_id: id.to_string(),
            opacity,
        });
        self.document_changed = true;
        Ok(())
    }

    pub fn set_layer_locked(
        &mut self,
        id: crate::document::LayerId,
        locked: bool,
    ) -> Result<(), EngineError> {
        self.document.set_layer_locked(id, locked)?;
        self.record_layer_action(LayerAction::SetLocked {
            layer_id: id.to_string(),
            locked,
        });
        Ok(())
    }

    pub fn duplicate_layer(
        &mut self,
        id: crate::document::LayerId,
    ) -> Result<crate::document::LayerId, EngineError> {
        self.document.push_undo();
        let new_id = self.document.duplicate_layer(id)?;
        self.record_layer_action(LayerAction::Duplicate {
            source_id: id.to_string(),
            new_id: new_id.to_string(),
        });
        self.document_changed = true;
        Ok(new_id)
    }

    pub fn merge_layer_down(&mut self, id: crate::document::LayerId) -> Result<(), EngineError> {
        self.document.push_undo();
        self.document.merge_layer_down(id)?;
        self.record_layer_action(LayerAction::MergeDown {
            layer_id: id.to_string(),
        });
        self.document_changed = true;
        Ok(())
    }

    pub fn move_layer(
        &mut self,
        id: crate::document::LayerId,
        index: usize,
    ) -> Result<(), EngineError> {
        self.document.push_undo();
        self.document.move_layer(id, index)?;
        self.record_layer_action(LayerAction::Reorder {
            layer_id: id.to_string(),
            index,
        });
        self.document_changed = true;
        Ok(())
    }

    pub fn clear_layer(&mut self, id: crate::document::LayerId) -> Result<(), EngineError> {
        self.document.push_undo();
        self.document.clear_layer(id)?;
        self.record_layer_action(LayerAction::Clear {
            layer_id: id.to_string(),
        });
        self.document_changed = true;
        Ok(())
    }

    pub fn set_active_layer(&mut self, id: crate::document::LayerId) -> Result<(), EngineError> {
        // Which layer takes new strokes is a local concern, not broadcast.
        self.document.set_active_layer(id)
    }

    fn record_layer_action(&mut self, action: LayerAction) {
        self.collaboration.record_local(RemoteOperation::layer(
            self.collaboration.scope().clone(),
            action,
        ));
    }

    // --- Collaboration ---

    pub fn enable_collaboration(&mut self) {
        self.collaboration.enable();
    }

    pub fn disable_collaboration(&mut self) {
        self.collaboration.disable();
    }

    /// Drain outbound wire messages (JSON strings), including any
    /// throttled updates whose window has elapsed.
    pub fn take_outgoing(&mut self) -> Vec<String> {
        self.collaboration.flush_pending();
        self.collaboration.take_outgoing()
    }

    /// Apply one inbound wire message.
    pub fn apply_remote_message(&mut self, json: &str) -> Result<(), EngineError> {
        let changed = self.collaboration.handle_message(&mut self.document, json)?;
        if changed {
            self.document_changed = true;
        }
        Ok(())
    }

    /// Export the document for a joining or reconnecting peer.
    pub fn get_snapshot(&self) -> Result<String, EngineError> {
        self.collaboration.export_snapshot(&self.document)
    }

    /// Replace the document with a peer's snapshot.
    pub fn load_snapshot(&mut self, data: &str) -> Result<(), EngineError> {
        self.deselect();
        self.collaboration.apply_snapshot(&mut self.document, data)?;
        self.document_changed = true;
        Ok(())
    }

    // --- Export ---

    /// Rasterize the document via the supplied exporter. Export failures
    /// yield an empty placeholder so page saving never blocks on a broken
    /// rasterizer.
    pub fn export_raster(&self, exporter: &dyn RasterExporter) -> Vec<u8> {
        match exporter.export(&self.document) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("raster export failed, using empty placeholder: {err}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::Role;
    use crate::sync::OperationKind;

    fn scope() -> CanvasScope {
        CanvasScope::new("page_1", 1)
    }

    fn engine() -> Engine {
        let mut e = Engine::new(scope());
        e.enable_collaboration();
        e
    }

    fn draw_stroke(e: &mut Engine, from: Point, to: Point) {
        e.set_tool(ToolKind::Brush);
        e.pointer_down(from);
        let mid = Point::new((from.x + to.x) / 2.0, (from.y + to.y) / 2.0);
        e.pointer_move(mid);
        e.pointer_up(to);
    }

    #[test]
    fn test_brush_gesture_commits_and_broadcasts() {
        let mut e = engine();
        draw_stroke(&mut e, Point::new(10.0, 10.0), Point::new(60.0, 60.0));

        assert_eq!(e.document.content_len(), 1);
        assert!(e.document.can_undo());
        let out = e.take_outgoing();
        assert_eq!(out.len(), 1);
        let op = RemoteOperation::from_json(&out[0]).unwrap();
        assert!(matches!(op.kind, OperationKind::Draw { .. }));
    }

    #[test]
    fn test_two_engines_converge_on_drawing() {
        let mut e1 = engine();
        let mut e2 = engine();

        draw_stroke(&mut e1, Point::new(10.0, 10.0), Point::new(60.0, 60.0));
        for msg in e1.take_outgoing() {
            e2.apply_remote_message(&msg).unwrap();
        }

        assert_eq!(e2.document.content_len(), 1);
        // The remote application must not echo.
        assert!(e2.take_outgoing().is_empty());
        let id = e1.document.content_z_order()[0];
        assert_eq!(e1.document.item_bounds(id), e2.document.item_bounds(id));
    }

    #[test]
    fn test_concurrent_peers_agree_on_z_order() {
        let mut a = engine();
        let mut b = engine();

        // Concurrent commits: neither peer has seen the other's item yet.
        draw_stroke(&mut a, Point::new(10.0, 10.0), Point::new(60.0, 60.0));
        b.set_tool(ToolKind::Circle);
        b.pointer_down(Point::new(200.0, 200.0));
        b.pointer_move(Point::new(240.0, 200.0));
        b.pointer_up(Point::new(240.0, 200.0));

        let from_a = a.take_outgoing();
        let from_b = b.take_outgoing();
        for msg in from_a {
            b.apply_remote_message(&msg).unwrap();
        }
        for msg in from_b {
            a.apply_remote_message(&msg).unwrap();
        }

        // Stroke plus circle group (group, hit target, outline).
        assert_eq!(a.document.content_len(), 4);
        assert_eq!(b.document.content_len(), 4);
        assert_eq!(a.document.content_z_order(), b.document.content_z_order());
        for id in a.document.content_z_order() {
            assert_eq!(a.document.get_item(id), b.document.get_item(id));
        }
    }

    #[test]
    fn test_hollow_shape_commits_group() {
        let mut e = engine();
        e.set_tool(ToolKind::Circle);
        e.pointer_down(Point::new(100.0, 100.0));
        e.pointer_move(Point::new(150.0, 100.0));
        e.pointer_up(Point::new(150.0, 100.0));

        // Group + hit target + outline.
        let roots = e.document.content_z_order();
        assert_eq!(roots.len(), 1);
        assert!(e.document.get_item(roots[0]).unwrap().is_group());
        assert_eq!(e.document.content_len(), 3);
    }

    #[test]
    fn test_select_and_move_broadcasts_position() {
        let mut e = engine();
        draw_stroke(&mut e, Point::new(100.0, 100.0), Point::new(150.0, 150.0));
        e.take_outgoing();

        e.set_tool(ToolKind::Select);
        let center = Point::new(125.0, 125.0);
        e.pointer_down(center);
        assert!(e.selected().is_some());
        e.pointer_move(Point::new(175.0, 125.0));
        e.pointer_up(Point::new(175.0, 125.0));

        let id = e.selected().unwrap();
        let bounds = e.document.item_bounds(id);
        assert!((bounds.x0 - 150.0).abs() < 0.01);

        let out = e.take_outgoing();
        assert!(!out.is_empty());
        let last = RemoteOperation::from_json(out.last().unwrap()).unwrap();
        match last.kind {
            OperationKind::Transform(p) => {
                assert_eq!(p.mode, TransformKind::Move);
                assert!((p.position.x - bounds.x0).abs() < 0.01);
            }
            _ => panic!("Expected transform operation"),
        }
    }

    #[test]
    fn test_plain_click_adds_no_history_or_traffic() {
        let mut e = engine();
        draw_stroke(&mut e, Point::new(100.0, 100.0), Point::new(150.0, 150.0));
        e.take_outgoing();

        e.set_tool(ToolKind::Select);
        e.pointer_down(Point::new(125.0, 125.0));
        e.pointer_up(Point::new(125.0, 125.0));
        assert!(e.selected().is_some());
        assert!(e.take_outgoing().is_empty());

        // The only history entry is the stroke commit itself.
        assert!(e.undo());
        assert_eq!(e.document.content_len(), 0);
        assert!(!e.document.can_undo());
    }

    #[test]
    fn test_hidden_layer_never_attracts_guides() {
        let mut e = engine();
        draw_stroke(&mut e, Point::new(100.0, 100.0), Point::new(150.0, 150.0));
        let lower = e.document.layers[1].id;
        e.add_layer("Top");
        draw_stroke(&mut e, Point::new(300.0, 100.0), Point::new(350.0, 150.0));
        e.document.set_layer_visible(lower, false).unwrap();

        e.set_tool(ToolKind::Select);
        e.pointer_down(Point::new(325.0, 125.0));
        e.pointer_move(Point::new(135.0, 125.0));

        // The hidden stroke's left edge sits 10 away, well inside the
        // threshold, but invisible artwork never attracts.
        let id = e.selected().unwrap();
        assert!(e.guides().is_empty());
        assert!((e.document.item_bounds(id).x0 - 110.0).abs() < 0.001);

        // Showing the layer again makes the same position snap.
        e.document.set_layer_visible(lower, true).unwrap();
        e.pointer_move(Point::new(135.0, 125.0));
        assert!(!e.guides().is_empty());
        assert!((e.document.item_bounds(id).x0 - 100.0).abs() < 0.001);
        e.pointer_up(Point::new(135.0, 125.0));
    }

    #[test]
    fn test_undo_reverts_committed_stroke() {
        let mut e = engine();
        draw_stroke(&mut e, Point::new(10.0, 10.0), Point::new(60.0, 60.0));
        assert_eq!(e.document.content_len(), 1);
        assert!(e.undo());
        assert_eq!(e.document.content_len(), 0);
        assert!(e.redo());
        assert_eq!(e.document.content_len(), 1);
    }

    #[test]
    fn test_eraser_splits_and_broadcasts() {
        let mut e = engine();
        e.set_tool(ToolKind::Brush);
        e.pointer_down(Point::new(0.0, 0.0));
        for i in 1..10 {
            e.pointer_move(Point::new(i as f64 * 10.0, 0.0));
        }
        e.pointer_up(Point::new(90.0, 0.0));
        e.take_outgoing();

        // Erase a contiguous middle span.
        e.set_tool(ToolKind::Eraser);
        e.pointer_down(Point::new(40.0, 0.0));
        e.pointer_up(Point::new(60.0, 0.0));

        // The original is gone; two remainders survive.
        assert_eq!(e.document.content_len(), 2);
        let out = e.take_outgoing();
        let kinds: Vec<RemoteOperation> = out
            .iter()
            .map(|m| RemoteOperation::from_json(m).unwrap())
            .collect();
        assert!(kinds.iter().any(|op| matches!(op.kind, OperationKind::Delete)));
        assert_eq!(
            kinds
                .iter()
                .filter(|op| matches!(op.kind, OperationKind::Draw { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_fill_empty_space_fills_background() {
        let mut e = engine();
        e.set_tool(ToolKind::Fill);
        e.settings_mut().color = crate::items::SerializableColor::new(0, 0, 255, 255);
        e.pointer_down(Point::new(250.0, 250.0));

        let bg = e.document.background_item().unwrap();
        match &e.document.get_item(bg).unwrap().style.fill {
            Some(Fill::Solid { color }) => assert_eq!(color.b, 255),
            _ => panic!("Expected solid fill on background"),
        }
        // Fill is a synchronized operation.
        assert_eq!(e.take_outgoing().len(), 1);
    }

    #[test]
    fn test_fill_descends_group_to_outline() {
        let mut e = engine();
        e.set_tool(ToolKind::Circle);
        e.pointer_down(Point::new(100.0, 100.0));
        e.pointer_move(Point::new(160.0, 100.0));
        e.pointer_up(Point::new(160.0, 100.0));
        e.take_outgoing();

        e.set_tool(ToolKind::Fill);
        e.pointer_down(Point::new(100.0, 100.0));

        // The fill lands on a child of the group, not the hit target.
        let filled: Vec<_> = e
            .document
            .items
            .values()
            .filter(|i| i.role != Role::Background && i.style.fill.is_some())
            .collect();
        assert!(!filled.is_empty());
        assert!(filled.iter().all(|i| !i.is_group()));
    }

    #[test]
    fn test_add_text_center_alignment_shifts_anchor() {
        let mut e = engine();
        e.settings_mut().text_align = TextAlign::Center;
        let id = e.add_text("Once upon a time", Point::new(250.0, 100.0));

        let item = e.document.get_item(id).unwrap();
        match &item.kind {
            ItemKind::Text(text) => {
                assert!(text.position.x < 250.0);
                let center = text.position.x + text.estimated_width() / 2.0;
                assert!((center - 250.0).abs() < 0.01);
            }
            _ => panic!("Expected text item"),
        }
    }

    #[test]
    fn test_remote_text_preserves_style() {
        let mut e1 = engine();
        let mut e2 = engine();
        e1.settings_mut().color = crate::items::SerializableColor::new(200, 30, 30, 255);
        e1.settings_mut().font_family = "serif".to_string();
        e1.settings_mut().text_align = TextAlign::Center;
        let id = e1.add_text("The End", Point::new(250.0, 100.0));

        for msg in e1.take_outgoing() {
            e2.apply_remote_message(&msg).unwrap();
        }

        let ours = e1.document.get_item(id).unwrap();
        let theirs = e2.document.get_item(id).unwrap();
        assert_eq!(ours.style.fill, theirs.style.fill);
        match (&ours.kind, &theirs.kind) {
            (ItemKind::Text(a), ItemKind::Text(b)) => {
                assert_eq!(a.font_family, b.font_family);
                assert_eq!(a.font_weight, b.font_weight);
                assert_eq!(a.align, b.align);
                assert_eq!(a.position, b.position);
            }
            _ => panic!("Expected text items"),
        }
    }

    #[test]
    fn test_delete_selected_notifies_peers() {
        let mut e = engine();
        draw_stroke(&mut e, Point::new(100.0, 100.0), Point::new(150.0, 150.0));
        e.take_outgoing();

        e.set_tool(ToolKind::Select);
        e.pointer_down(Point::new(125.0, 125.0));
        e.pointer_up(Point::new(125.0, 125.0));
        e.delete_selected();

        assert_eq!(e.document.content_len(), 0);
        let out = e.take_outgoing();
        let last = RemoteOperation::from_json(out.last().unwrap()).unwrap();
        assert!(matches!(last.kind, OperationKind::Delete));
    }

    #[test]
    fn test_snapshot_sync_on_join() {
        let mut e1 = engine();
        let mut e2 = engine();
        draw_stroke(&mut e1, Point::new(10.0, 10.0), Point::new(60.0, 60.0));
        draw_stroke(&mut e1, Point::new(100.0, 10.0), Point::new(160.0, 60.0));

        let snapshot = e1.get_snapshot().unwrap();
        e2.load_snapshot(&snapshot).unwrap();

        assert_eq!(
            e1.document.to_json().unwrap(),
            e2.document.to_json().unwrap()
        );
    }

    #[test]
    fn test_layer_operations_broadcast() {
        let mut e = engine();
        let id = e.add_layer("Sky");
        e.set_layer_opacity(id, 0.5).unwrap();

        let out = e.take_outgoing();
        assert_eq!(out.len(), 2);
        let create = RemoteOperation::from_json(&out[0]).unwrap();
        assert!(matches!(
            create.kind,
            OperationKind::Layer {
                action: LayerAction::Create { .. }
            }
        ));
    }

    #[test]
    fn test_clicking_empty_space_deselects() {
        let mut e = engine();
        draw_stroke(&mut e, Point::new(100.0, 100.0), Point::new(150.0, 150.0));
        e.set_tool(ToolKind::Select);
        e.pointer_down(Point::new(125.0, 125.0));
        e.pointer_up(Point::new(125.0, 125.0));
        assert!(e.selected().is_some());

        e.pointer_down(Point::new(400.0, 400.0));
        assert!(e.selected().is_none());
    }

    struct FailingExporter;

    impl RasterExporter for FailingExporter {
        fn export(&self, _doc: &Document) -> Result<Vec<u8>, EngineError> {
            Err(EngineError::SnapshotEncoding)
        }
    }

    #[test]
    fn test_raster_export_failure_yields_placeholder() {
        let e = engine();
        let bytes = e.export_raster(&FailingExporter);
        assert!(bytes.is_empty());
    }
}
