//! The document aggregate owned by the engine.

use crate::arrange::Group;
use crate::error::{EngineError, EngineResult};
use crate::layers::LayerState;
use crate::selection::DragState;
use crate::shapes::{Element, ElementId, GroupId, SyncState};
use crate::tools::DrawingMode;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The part of the document that history records and restores.
///
/// Transient interaction state (drag, in-progress element, clipboard,
/// media flag) is deliberately absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistorySnapshot {
    pub elements: Vec<Element>,
    pub selected: Vec<ElementId>,
    pub mode: DrawingMode,
    pub layers: LayerState,
}

/// Persistent representation written by [`DocumentState::to_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentFile {
    version: u32,
    elements: Vec<Element>,
    #[serde(default)]
    layers: LayerState,
}

const DOCUMENT_VERSION: u32 = 1;

/// Counts of elements per sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncStats {
    pub new: usize,
    pub edited: usize,
    pub saved: usize,
    pub deleted: usize,
    pub total: usize,
}

/// Everything the engine edits.
#[derive(Debug, Clone, Default)]
pub struct DocumentState {
    /// All elements in paint order, including soft-deleted ones.
    pub elements: Vec<Element>,
    pub selected: Vec<ElementId>,
    pub mode: DrawingMode,
    pub layers: LayerState,
    /// Derived from `Element::group_id`.
    pub groups: HashMap<GroupId, Group>,
    pub clipboard: Vec<Element>,
    /// Number of pastes since the last copy, scales the paste offset.
    pub paste_count: u32,
    pub drag: Option<DragState>,
    /// Element currently being drawn.
    pub in_progress: Option<Element>,
    /// A two-point element is being dragged out.
    pub drawing: bool,
    pub media_loaded: bool,
}

impl DocumentState {
    pub fn new(layers: LayerState) -> Self {
        Self {
            layers,
            ..Self::default()
        }
    }

    /// Copy of the persistent part for history.
    pub fn clone_for_history(&self) -> HistorySnapshot {
        HistorySnapshot {
            elements: self.elements.clone(),
            selected: self.selected.clone(),
            mode: self.mode,
            layers: self.layers.clone(),
        }
    }

    /// Replace the persistent part. Gesture state is left to the caller.
    pub fn apply_snapshot(&mut self, snapshot: HistorySnapshot) {
        self.elements = snapshot.elements;
        self.selected = snapshot.selected;
        self.mode = snapshot.mode;
        self.layers = snapshot.layers;
        self.rebuild_groups();
    }

    /// Forget drag and drawing state.
    pub fn clear_transient(&mut self) {
        self.drag = None;
        self.in_progress = None;
        self.drawing = false;
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    pub fn index_of(&self, id: ElementId) -> Option<usize> {
        self.elements.iter().position(|e| e.id == id)
    }

    pub fn require(&self, id: ElementId) -> EngineResult<&Element> {
        self.get(id).ok_or(EngineError::ElementNotFound(id))
    }

    pub fn is_selected(&self, id: ElementId) -> bool {
        self.selected.contains(&id)
    }

    /// Elements that are drawn: completed, not deleted, on a rendered layer.
    pub fn visible_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements
            .iter()
            .filter(|e| e.is_exportable() && self.layers.is_element_rendered(e))
    }

    /// Visible elements in back-to-front paint order.
    pub fn paint_order(&self) -> Vec<&Element> {
        self.layers
            .render_plan(&self.elements)
            .into_iter()
            .flat_map(|entry| entry.element_ids)
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Topmost editable element under a target-space point.
    pub fn element_at(&self, point: Point, tolerance: f64) -> Option<ElementId> {
        self.paint_order()
            .into_iter()
            .rev()
            .find(|e| self.layers.is_element_editable(e) && e.hit_test(point, tolerance))
            .map(|e| e.id)
    }

    pub fn selected_elements(&self) -> Vec<&Element> {
        self.elements.iter().filter(|e| self.is_selected(e.id)).collect()
    }

    /// Recompute groups from element group ids.
    pub fn rebuild_groups(&mut self) {
        let mut members: HashMap<GroupId, Vec<&Element>> = HashMap::new();
        for element in self.elements.iter().filter(|e| !e.is_deleted()) {
            if let Some(group_id) = element.group_id {
                members.entry(group_id).or_default().push(element);
            }
        }
        let previous = std::mem::take(&mut self.groups);
        self.groups = members
            .into_iter()
            .filter_map(|(id, elements)| {
                let mut group = Group::from_elements(id, &elements)?;
                if let Some(old) = previous.get(&id) {
                    group.created_at = old.created_at;
                    group.metadata = old.metadata.clone();
                }
                Some((id, group))
            })
            .collect();
    }

    /// All live members of the group containing `id` (or just `id`).
    pub fn group_members(&self, id: ElementId) -> Vec<ElementId> {
        match self.get(id).and_then(|e| e.group_id) {
            Some(group_id) => self
                .elements
                .iter()
                .filter(|e| e.group_id == Some(group_id) && !e.is_deleted())
                .map(|e| e.id)
                .collect(),
            None => vec![id],
        }
    }

    pub fn elements_with_state(&self, state: SyncState) -> Vec<&Element> {
        self.elements.iter().filter(|e| e.sync_state == state).collect()
    }

    pub fn sync_stats(&self) -> SyncStats {
        let mut stats = SyncStats {
            total: self.elements.len(),
            ..SyncStats::default()
        };
        for element in &self.elements {
            match element.sync_state {
                SyncState::New => stats.new += 1,
                SyncState::Edited => stats.edited += 1,
                SyncState::Saved => stats.saved += 1,
                SyncState::Deleted => stats.deleted += 1,
            }
        }
        stats
    }

    /// Serialize elements and layers.
    pub fn to_json(&self) -> EngineResult<String> {
        let file = DocumentFile {
            version: DOCUMENT_VERSION,
            elements: self.elements.clone(),
            layers: self.layers.clone(),
        };
        serde_json::to_string_pretty(&file).map_err(|e| EngineError::Document(e.to_string()))
    }

    /// Parse a document written by [`Self::to_json`].
    ///
    /// Membership is repaired from the element side so the result is
    /// always consistent.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let file: DocumentFile = serde_json::from_str(json).map_err(|e| EngineError::Document(e.to_string()))?;
        if file.version > DOCUMENT_VERSION {
            return Err(EngineError::Document(format!("unsupported document version {}", file.version)));
        }
        let mut layers = file.layers;
        for layer in &mut layers.layers {
            layer.element_ids.clear();
        }
        if layers.active_layer_id.is_none_or(|id| layers.index_of(id).is_none()) {
            layers.active_layer_id = layers.layers.first().map(|l| l.id);
        }
        let mut elements = file.elements;
        for element in elements.iter_mut() {
            if element.layer_id.is_some_and(|id| layers.index_of(id).is_none()) {
                element.layer_id = None;
            }
            if element.is_deleted() {
                element.layer_id = None;
            }
        }
        for element in &elements {
            if let Some(layer) = element.layer_id.and_then(|id| layers.get_mut(id)) {
                layer.element_ids.push(element.id);
            }
        }
        let mut doc = Self::new(layers);
        doc.elements = elements;
        doc.rebuild_groups();
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::ElementKind;
    use crate::tools::DrawingMode;
    use kurbo::Point;

    fn line(x: f64) -> Element {
        let mut e = Element::new(ElementKind::Line, vec![Point::new(x, 0.0), Point::new(x, 100.0)]);
        e.completed = true;
        e
    }

    #[test]
    fn test_clone_for_history_omits_transient_state() {
        let mut doc = DocumentState::new(LayerState::with_default_layer("Layer 1"));
        doc.elements.push(line(10.0));
        doc.in_progress = Some(line(20.0));
        doc.drawing = true;
        doc.clipboard.push(line(30.0));
        doc.mode = DrawingMode::Line;

        let snapshot = doc.clone_for_history();
        assert_eq!(snapshot.elements.len(), 1);
        assert_eq!(snapshot.mode, DrawingMode::Line);

        let mut other = doc.clone();
        other.elements.clear();
        other.apply_snapshot(snapshot);
        assert_eq!(other.elements.len(), 1);
        // A published edit does not cancel the gesture in progress.
        assert!(other.in_progress.is_some());
        other.clear_transient();
        assert!(other.in_progress.is_none());
        assert!(!other.drawing);
        // The clipboard is not part of history and survives restores.
        assert_eq!(other.clipboard.len(), 1);
    }

    #[test]
    fn test_element_at_prefers_topmost() {
        let mut doc = DocumentState::new(LayerState::with_default_layer("Layer 1"));
        let mut elements = vec![line(10.0), line(12.0)];
        doc.layers.adopt(&mut elements);
        doc.elements = elements;
        let top = doc.elements[1].id;
        assert_eq!(doc.element_at(Point::new(11.0, 50.0), 3.0), Some(top));
        assert_eq!(doc.element_at(Point::new(50.0, 50.0), 3.0), None);
    }

    #[test]
    fn test_deleted_elements_not_hit() {
        let mut doc = DocumentState::default();
        let mut e = line(10.0);
        e.sync_state = SyncState::Deleted;
        doc.elements.push(e);
        assert_eq!(doc.element_at(Point::new(10.0, 50.0), 3.0), None);
        assert_eq!(doc.visible_elements().count(), 0);
    }

    #[test]
    fn test_groups_rebuilt_from_elements() {
        let mut doc = DocumentState::default();
        let group_id = uuid::Uuid::new_v4();
        let mut a = line(0.0);
        let mut b = line(50.0);
        a.group_id = Some(group_id);
        b.group_id = Some(group_id);
        doc.elements = vec![a, b, line(200.0)];
        doc.rebuild_groups();
        let group = doc.groups.get(&group_id).unwrap();
        assert_eq!(group.element_ids.len(), 2);
        assert!((group.bounds.x1 - 50.0).abs() < 1e-9);
        assert_eq!(doc.group_members(doc.elements[0].id).len(), 2);
        assert_eq!(doc.group_members(doc.elements[2].id).len(), 1);
    }

    #[test]
    fn test_json_roundtrip_repairs_membership() {
        let mut doc = DocumentState::new(LayerState::with_default_layer("Layer 1"));
        let mut elements = vec![line(1.0), line(2.0)];
        doc.layers.adopt(&mut elements);
        doc.elements = elements;
        let json = doc.to_json().unwrap();

        let loaded = DocumentState::from_json(&json).unwrap();
        assert_eq!(loaded.elements, doc.elements);
        assert_eq!(loaded.layers.layers[0].element_ids.len(), 2);
        assert!(loaded.layers.is_consistent_with(&loaded.elements));

        assert!(matches!(DocumentState::from_json("{"), Err(EngineError::Document(_))));
    }

    #[test]
    fn test_sync_stats() {
        let mut doc = DocumentState::default();
        let mut saved = line(1.0);
        saved.sync_state = SyncState::Saved;
        doc.elements = vec![line(0.0), saved];
        let stats = doc.sync_stats();
        assert_eq!(stats.new, 1);
        assert_eq!(stats.saved, 1);
        assert_eq!(stats.total, 2);
    }
}
