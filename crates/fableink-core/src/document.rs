//! Layered drawing document and undo history.
//!
//! The document is the authoritative model: an arena of items keyed by id
//! plus per-layer z-order lists. Any render tree built from it is a derived
//! projection.

use crate::error::EngineError;
use crate::items::{Fill, Item, ItemId, ItemKind, ItemStyle, Role, SerializableColor};
use kurbo::{BezPath, Point, Rect, Size, Vec2};
use kurbo::Shape as KurboShape;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for layers.
pub type LayerId = Uuid;

/// Fixed canvas size for story pages.
pub const CANVAS_SIZE: Size = Size::new(500.0, 500.0);

/// Maximum number of undo states to keep.
const MAX_UNDO_HISTORY: usize = 50;

/// A z-ordered bucket of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    /// Layer opacity (0.0..=1.0).
    pub opacity: f64,
    /// The background layer is pinned at index 0 and never deletable.
    pub is_background: bool,
    /// Top-level item ids in z-order (back to front).
    pub items: Vec<ItemId>,
}

impl Layer {
    fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            visible: true,
            locked: false,
            opacity: 1.0,
            is_background: false,
            items: Vec::new(),
        }
    }
}

/// A snapshot of document state for undo/redo.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentSnapshot {
    items: BTreeMap<ItemId, Item>,
    layers: Vec<Layer>,
    active_layer: LayerId,
}

/// The whole editable canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier.
    pub id: String,
    /// Fixed canvas size.
    pub canvas_size: Size,
    /// All items, keyed by id. A BTreeMap keeps serialization deterministic
    /// so identical documents produce identical snapshots.
    pub items: BTreeMap<ItemId, Item>,
    /// Layers in z-order (index 0 = background, rendered first).
    pub layers: Vec<Layer>,
    /// The layer new items are committed to.
    pub active_layer: LayerId,
    /// High-water mark of item sequence numbers seen so far. Monotonic:
    /// undo never rewinds it, so reused sequence numbers cannot occur.
    #[serde(default)]
    clock: u64,
    /// Undo history stack.
    #[serde(skip)]
    undo_stack: Vec<DocumentSnapshot>,
    /// Redo history stack.
    #[serde(skip)]
    redo_stack: Vec<DocumentSnapshot>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a new document with a background layer (holding one
    /// full-canvas background item) and one empty drawing layer.
    pub fn new() -> Self {
        let mut background_layer = Layer::new("Background");
        background_layer.is_background = true;

        let mut background_item = Item::shape(
            crate::items::ShapeKind::Rectangle,
            Rect::new(0.0, 0.0, CANVAS_SIZE.width, CANVAS_SIZE.height).to_path(0.1),
            ItemStyle {
                stroke_color: SerializableColor::transparent(),
                stroke_width: 0.0,
                fill: Some(Fill::solid(SerializableColor::white())),
                ..ItemStyle::default()
            },
        );
        background_item.role = Role::Background;
        background_layer.items.push(background_item.id);

        let drawing_layer = Layer::new("Layer 1");
        let active_layer = drawing_layer.id;

        let mut items = BTreeMap::new();
        items.insert(background_item.id, background_item);

        Self {
            id: Uuid::new_v4().to_string(),
            canvas_size: CANVAS_SIZE,
            items,
            layers: vec![background_layer, drawing_layer],
            active_layer,
            clock: 0,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    /// Next item sequence number. Callers stamp an item with this before
    /// committing it so the same number travels with the item on the wire.
    pub fn next_sequence(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    // --- History ---

    fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            items: self.items.clone(),
            layers: self.layers.clone(),
            active_layer: self.active_layer,
        }
    }

    fn restore(&mut self, snapshot: DocumentSnapshot) {
        self.items = snapshot.items;
        self.layers = snapshot.layers;
        self.active_layer = snapshot.active_layer;
        self.fix_active_layer();
    }

    /// Push current state to the undo stack (call before making changes).
    pub fn push_undo(&mut self) {
        let snapshot = self.snapshot();
        self.undo_stack.push(snapshot);

        // New changes invalidate the redo stack
        self.redo_stack.clear();

        if self.undo_stack.len() > MAX_UNDO_HISTORY {
            self.undo_stack.remove(0);
        }
    }

    /// Undo the last change. Returns false if there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        if let Some(snapshot) = self.undo_stack.pop() {
            let current = self.snapshot();
            self.redo_stack.push(current);
            self.restore(snapshot);
            true
        } else {
            false
        }
    }

    /// Redo the last undone change. Returns false if there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        if let Some(snapshot) = self.redo_stack.pop() {
            let current = self.snapshot();
            self.undo_stack.push(current);
            self.restore(snapshot);
            true
        } else {
            false
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    // --- Items ---

    /// Add a top-level item to the active layer.
    pub fn add_item(&mut self, item: Item) {
        let layer = self.active_layer;
        self.add_item_to_layer(item, layer);
    }

    /// Add a top-level item to a specific layer. Falls back to the first
    /// drawing layer if the target is gone.
    ///
    /// An item arriving without a sequence number gets the next local one;
    /// a stamped item (off the wire) keeps its stamp. The layer's z-order
    /// is kept sorted by (seq, id), so two peers that insert concurrently
    /// end up with the same order.
    pub fn add_item_to_layer(&mut self, mut item: Item, layer_id: LayerId) {
        if item.seq == 0 {
            item.seq = self.next_sequence();
        } else {
            self.clock = self.clock.max(item.seq);
        }
        let id = item.id;
        let key = (item.seq, id);
        self.items.insert(id, item);

        let Some(index) = self
            .layers
            .iter()
            .position(|l| l.id == layer_id)
            .or_else(|| self.layers.iter().position(|l| !l.is_background))
        else {
            return;
        };
        let position = self.layers[index]
            .items
            .iter()
            .position(|other| {
                self.items
                    .get(other)
                    .is_some_and(|o| (o.seq, o.id) > key)
            })
            .unwrap_or(self.layers[index].items.len());
        self.layers[index].items.insert(position, id);
    }

    /// Insert an item tree (a top-level item followed by any group
    /// descendants). Only the first item lands in the layer z-order.
    pub fn insert_tree(&mut self, items: Vec<Item>) {
        let mut iter = items.into_iter();
        let Some(root) = iter.next() else { return };
        let layer = self.active_layer;
        self.add_item_to_layer(root, layer);
        for child in iter {
            self.items.insert(child.id, child);
        }
    }

    /// Remove an item (and, for groups, all descendants) from the document.
    pub fn remove_item(&mut self, id: ItemId) -> Option<Item> {
        let item = self.items.remove(&id)?;
        if let ItemKind::Group(group) = &item.kind {
            for child in group.children.clone() {
                self.remove_item(child);
            }
        }
        for layer in &mut self.layers {
            layer.items.retain(|&item_id| item_id != id);
        }
        Some(item)
    }

    pub fn get_item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn get_item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    /// Collect an item tree: the item itself followed by group descendants.
    pub fn item_tree(&self, id: ItemId) -> Vec<Item> {
        let mut out = Vec::new();
        self.collect_tree(id, &mut out);
        out
    }

    fn collect_tree(&self, id: ItemId, out: &mut Vec<Item>) {
        if let Some(item) = self.items.get(&id) {
            out.push(item.clone());
            if let ItemKind::Group(group) = &item.kind {
                for &child in &group.children {
                    self.collect_tree(child, out);
                }
            }
        }
    }

    /// Replace an item tree in place, keeping the old z-order slot.
    /// Used when a peer sends re-exported geometry for a resized or rotated
    /// item.
    pub fn replace_tree(&mut self, old_id: ItemId, items: Vec<Item>) -> Result<(), EngineError> {
        let Some(new_root_id) = items.first().map(|i| i.id) else {
            return Err(EngineError::ItemNotFound(old_id));
        };
        let slot = self
            .layers
            .iter()
            .enumerate()
            .find_map(|(li, layer)| {
                layer
                    .items
                    .iter()
                    .position(|&i| i == old_id)
                    .map(|pos| (li, pos))
            })
            .ok_or(EngineError::ItemNotFound(old_id))?;
        self.remove_item(old_id);
        for item in items {
            self.items.insert(item.id, item);
        }
        self.layers[slot.0].items.insert(slot.1, new_root_id);
        Ok(())
    }

    /// Geometry bounds of an item, unioning group children.
    pub fn item_bounds(&self, id: ItemId) -> Rect {
        let Some(item) = self.items.get(&id) else {
            return Rect::ZERO;
        };
        match &item.kind {
            ItemKind::Group(group) => {
                let mut result: Option<Rect> = None;
                for &child in &group.children {
                    let bounds = self.item_bounds(child);
                    result = Some(match result {
                        Some(r) => r.union(bounds),
                        None => bounds,
                    });
                }
                result.unwrap_or(Rect::ZERO)
            }
            _ => item.local_bounds(),
        }
    }

    /// Translate an item, walking into groups.
    pub fn translate_item(&mut self, id: ItemId, delta: Vec2) {
        let children = match self.items.get_mut(&id) {
            Some(item) => {
                item.translate(delta);
                match &item.kind {
                    ItemKind::Group(group) => group.children.clone(),
                    _ => return,
                }
            }
            None => return,
        };
        for child in children {
            self.translate_item(child, delta);
        }
    }

    /// Hit-test an item, descending into group children.
    pub fn hit_test_item(&self, id: ItemId, point: Point, tolerance: f64) -> bool {
        let Some(item) = self.items.get(&id) else {
            return false;
        };
        match &item.kind {
            ItemKind::Group(group) => group
                .children
                .iter()
                .any(|&child| self.hit_test_item(child, point, tolerance)),
            _ => item.hit_test(point, tolerance),
        }
    }

    /// Find top-level items at a point, front to back, on visible layers.
    /// The background item is excluded; use `background_item` to reach it.
    pub fn items_at_point(&self, point: Point, tolerance: f64) -> Vec<ItemId> {
        let mut hits = Vec::new();
        for layer in self.layers.iter().rev() {
            if !layer.visible {
                continue;
            }
            for &id in layer.items.iter().rev() {
                if self
                    .items
                    .get(&id)
                    .is_some_and(|i| i.role != Role::Background)
                    && self.hit_test_item(id, point, tolerance)
                {
                    hits.push(id);
                }
            }
        }
        hits
    }

    /// Find a top-level item whose bounds roughly match, used as a fallback
    /// when a remote operation arrives without a resolvable id.
    pub fn find_by_bounds(&self, bounds: Rect, tolerance: f64) -> Option<ItemId> {
        for layer in self.layers.iter().rev() {
            for &id in layer.items.iter().rev() {
                if self
                    .items
                    .get(&id)
                    .is_some_and(|i| i.role == Role::Background)
                {
                    continue;
                }
                let b = self.item_bounds(id);
                if (b.x0 - bounds.x0).abs() <= tolerance
                    && (b.y0 - bounds.y0).abs() <= tolerance
                    && (b.width() - bounds.width()).abs() <= tolerance
                    && (b.height() - bounds.height()).abs() <= tolerance
                {
                    return Some(id);
                }
            }
        }
        None
    }

    /// The single background item, if present.
    pub fn background_item(&self) -> Option<ItemId> {
        self.layers
            .iter()
            .find(|l| l.is_background)
            .and_then(|l| l.items.first().copied())
    }

    /// Number of content items (everything except the background item).
    pub fn content_len(&self) -> usize {
        self.items
            .values()
            .filter(|i| i.role != Role::Background)
            .count()
    }

    /// Top-level content item ids across all layers, back to front.
    pub fn content_z_order(&self) -> Vec<ItemId> {
        let mut out = Vec::new();
        for layer in &self.layers {
            for &id in &layer.items {
                if self
                    .items
                    .get(&id)
                    .is_some_and(|i| i.role != Role::Background)
                {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Top-level content ids on visible, unlocked layers, back to front.
    /// Alignment guides anchor on these; hidden or locked artwork must
    /// never attract a moving item.
    pub fn alignment_targets(&self) -> Vec<ItemId> {
        let mut out = Vec::new();
        for layer in &self.layers {
            if !layer.visible || layer.locked {
                continue;
            }
            for &id in &layer.items {
                if self
                    .items
                    .get(&id)
                    .is_some_and(|i| i.role != Role::Background)
                {
                    out.push(id);
                }
            }
        }
        out
    }

    // --- Layers ---

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    fn layer_index(&self, id: LayerId) -> Result<usize, EngineError> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or(EngineError::LayerNotFound(id))
    }

    /// Create a new drawing layer above all others and make it active.
    pub fn add_layer(&mut self, name: impl Into<String>) -> LayerId {
        let layer = Layer::new(name);
        let id = layer.id;
        self.layers.push(layer);
        self.active_layer = id;
        id
    }

    /// Create a layer with a caller-supplied id (used when applying a
    /// peer's layer operation so ids line up across documents).
    pub fn add_layer_with_id(&mut self, id: LayerId, name: impl Into<String>) {
        if self.layer(id).is_some() {
            return;
        }
        let mut layer = Layer::new(name);
        layer.id = id;
        self.layers.push(layer);
    }

    /// Delete a layer and its items. The background layer and the last
    /// remaining drawing layer are protected.
    pub fn delete_layer(&mut self, id: LayerId) -> Result<(), EngineError> {
        let index = self.layer_index(id)?;
        if self.layers[index].is_background {
            return Err(EngineError::BackgroundLayer);
        }
        if self.layers.iter().filter(|l| !l.is_background).count() <= 1 {
            return Err(EngineError::LastDrawingLayer);
        }
        let layer = self.layers.remove(index);
        for item_id in layer.items {
            self.remove_item(item_id);
        }
        if self.active_layer == id {
            self.fix_active_layer();
        }
        Ok(())
    }

    pub fn rename_layer(&mut self, id: LayerId, name: impl Into<String>) -> Result<(), EngineError> {
        let layer = self.layer_mut(id).ok_or(EngineError::LayerNotFound(id))?;
        layer.name = name.into();
        Ok(())
    }

    pub fn set_layer_opacity(&mut self, id: LayerId, opacity: f64) -> Result<(), EngineError> {
        let layer = self.layer_mut(id).ok_or(EngineError::LayerNotFound(id))?;
        layer.opacity = opacity.clamp(0.0, 1.0);
        Ok(())
    }

    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> Result<(), EngineError> {
        let layer = self.layer_mut(id).ok_or(EngineError::LayerNotFound(id))?;
        layer.visible = visible;
        Ok(())
    }

    /// Lock or unlock a layer. Locking the active layer hands focus to
    /// another unlocked drawing layer when one exists.
    pub fn set_layer_locked(&mut self, id: LayerId, locked: bool) -> Result<(), EngineError> {
        let layer = self.layer_mut(id).ok_or(EngineError::LayerNotFound(id))?;
        layer.locked = locked;
        if locked && self.active_layer == id {
            if let Some(other) = self
                .layers
                .iter()
                .find(|l| !l.is_background && !l.locked)
            {
                self.active_layer = other.id;
            }
        }
        Ok(())
    }

    /// Duplicate a layer and its items (fresh item ids, groups preserved).
    /// The copy is inserted directly above the source. Returns the new
    /// layer's id.
    pub fn duplicate_layer(&mut self, id: LayerId) -> Result<LayerId, EngineError> {
        let index = self.layer_index(id)?;
        if self.layers[index].is_background {
            return Err(EngineError::BackgroundLayer);
        }
        let source = self.layers[index].clone();
        let mut copy = Layer::new(format!("{} copy", source.name));
        copy.visible = source.visible;
        copy.opacity = source.opacity;
        let copy_id = copy.id;

        for &item_id in &source.items {
            if let Some(new_root) = self.duplicate_tree(item_id) {
                copy.items.push(new_root);
            }
        }
        self.layers.insert(index + 1, copy);
        Ok(copy_id)
    }

    /// Deep-copy an item tree with fresh ids; returns the new root id.
    fn duplicate_tree(&mut self, id: ItemId) -> Option<ItemId> {
        let mut item = self.items.get(&id)?.clone();
        item.id = Uuid::new_v4();
        item.parent = None;
        if item.is_group() {
            let old_children = match &mut item.kind {
                ItemKind::Group(group) => std::mem::take(&mut group.children),
                _ => Vec::new(),
            };
            let mut new_children = Vec::with_capacity(old_children.len());
            for child in old_children {
                if let Some(new_child) = self.duplicate_tree(child) {
                    if let Some(c) = self.items.get_mut(&new_child) {
                        c.parent = Some(item.id);
                    }
                    new_children.push(new_child);
                }
            }
            if let ItemKind::Group(group) = &mut item.kind {
                group.children = new_children;
            }
        }
        let new_id = item.id;
        self.items.insert(new_id, item);
        Some(new_id)
    }

    /// Merge a layer into the one directly below it. Merging into the
    /// background layer is rejected.
    pub fn merge_layer_down(&mut self, id: LayerId) -> Result<(), EngineError> {
        let index = self.layer_index(id)?;
        if self.layers[index].is_background {
            return Err(EngineError::BackgroundLayer);
        }
        if index == 0 || self.layers[index - 1].is_background {
            return Err(EngineError::BackgroundLayer);
        }
        let layer = self.layers.remove(index);
        let below = &mut self.layers[index - 1];
        below.items.extend(layer.items);
        if self.active_layer == id {
            self.active_layer = self.layers[index - 1].id;
        }
        Ok(())
    }

    /// Reorder a drawing layer. Index 0 is reserved for the background.
    pub fn move_layer(&mut self, id: LayerId, new_index: usize) -> Result<(), EngineError> {
        let index = self.layer_index(id)?;
        if self.layers[index].is_background {
            return Err(EngineError::BackgroundLayer);
        }
        let layer = self.layers.remove(index);
        let clamped = new_index.clamp(1, self.layers.len());
        self.layers.insert(clamped, layer);
        Ok(())
    }

    /// Remove every item on a layer.
    pub fn clear_layer(&mut self, id: LayerId) -> Result<(), EngineError> {
        let layer = self.layer(id).ok_or(EngineError::LayerNotFound(id))?;
        if layer.is_background {
            return Err(EngineError::BackgroundLayer);
        }
        for item_id in layer.items.clone() {
            self.remove_item(item_id);
        }
        Ok(())
    }

    /// Make a layer active. Locked layers and the background layer cannot
    /// take focus.
    pub fn set_active_layer(&mut self, id: LayerId) -> Result<(), EngineError> {
        let layer = self.layer(id).ok_or(EngineError::LayerNotFound(id))?;
        if layer.is_background {
            return Err(EngineError::BackgroundLayer);
        }
        if !layer.locked {
            self.active_layer = id;
        }
        Ok(())
    }

    /// Ensure the active layer points at a real, unlocked drawing layer.
    /// Needed after restoring a snapshot, which can otherwise leave the
    /// engine without a valid active layer.
    pub fn fix_active_layer(&mut self) {
        let valid = self
            .layer(self.active_layer)
            .is_some_and(|l| !l.is_background);
        if !valid {
            if let Some(layer) = self.layers.iter().find(|l| !l.is_background && !l.locked) {
                self.active_layer = layer.id;
            } else if let Some(layer) = self.layers.iter().find(|l| !l.is_background) {
                self.active_layer = layer.id;
            }
        }
    }

    // --- Serialization ---

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut doc: Self = serde_json::from_str(json)?;
        doc.fix_active_layer();
        Ok(doc)
    }
}

/// Build a full-canvas background rectangle path.
pub fn background_path(size: Size) -> BezPath {
    Rect::new(0.0, 0.0, size.width, size.height).to_path(0.1)
}
