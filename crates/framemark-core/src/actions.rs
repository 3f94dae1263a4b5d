//! Clipboard, deletion, selection and sync-state actions.
//!
//! Each action reads the document and returns a [`DocumentEdit`]; the
//! engine publishes it. Deletion follows the sync lifecycle: new elements
//! disappear, persisted ones become `Deleted` and leave their layer.

use crate::document::DocumentState;
use crate::error::{EngineError, EngineResult};
use crate::layers::LayerState;
use crate::shapes::{Element, ElementId, ElementInfo, GroupId, SyncState};
use kurbo::Vec2;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// New persistent state produced by an action.
#[derive(Debug, Clone)]
pub struct DocumentEdit {
    pub elements: Vec<Element>,
    pub selected: Vec<ElementId>,
    pub layers: LayerState,
    pub affected_elements: Vec<ElementId>,
    pub message: String,
}

impl DocumentEdit {
    fn from_doc(doc: &DocumentState) -> Self {
        Self {
            elements: doc.elements.clone(),
            selected: doc.selected.clone(),
            layers: doc.layers.clone(),
            affected_elements: Vec::new(),
            message: String::new(),
        }
    }
}

/// Delete elements by id, applying the sync lifecycle.
///
/// Returns the ids that were actually deleted. Membership is updated in
/// the same pass so layers never list a deleted element.
pub fn delete_elements(elements: &mut Vec<Element>, layers: &mut LayerState, ids: &[ElementId]) -> Vec<ElementId> {
    let wanted: HashSet<ElementId> = ids.iter().copied().collect();
    let mut deleted = Vec::new();
    elements.retain_mut(|element| {
        if !wanted.contains(&element.id) || element.is_deleted() {
            return true;
        }
        deleted.push(element.id);
        match element.sync_state {
            SyncState::New => false,
            _ => {
                element.sync_state = SyncState::Deleted;
                element.layer_id = None;
                element.group_id = None;
                true
            }
        }
    });
    let removed: HashSet<ElementId> = deleted.iter().copied().collect();
    layers.strip_members(&removed);
    deleted
}

/// Clone elements with fresh ids, shifted by `offset`.
///
/// Copies are `New`, keep their grouping among themselves and are not yet
/// in any layer.
pub fn clone_fresh(elements: &[Element], offset: Vec2) -> Vec<Element> {
    let mut groups: HashMap<GroupId, GroupId> = HashMap::new();
    elements
        .iter()
        .map(|source| {
            let mut copy = source.clone();
            copy.regenerate_id();
            copy.translate(offset);
            copy.sync_state = SyncState::New;
            copy.layer_id = None;
            copy.group_id = source
                .group_id
                .map(|g| *groups.entry(g).or_insert_with(Uuid::new_v4));
            copy
        })
        .collect()
}

fn selected_live(doc: &DocumentState) -> EngineResult<Vec<Element>> {
    let selected: Vec<Element> = doc
        .elements
        .iter()
        .filter(|e| doc.is_selected(e.id) && e.is_exportable())
        .cloned()
        .collect();
    if selected.is_empty() {
        return Err(EngineError::NothingSelected);
    }
    Ok(selected)
}

/// Selected elements to place on the clipboard.
pub fn copy(doc: &DocumentState) -> EngineResult<Vec<Element>> {
    selected_live(doc)
}

/// Copy the selection, then delete it.
pub fn cut(doc: &DocumentState) -> EngineResult<(Vec<Element>, DocumentEdit)> {
    let clipboard = selected_live(doc)?;
    let edit = delete_selected(doc)?;
    Ok((clipboard, edit))
}

/// Insert clipboard copies into the active layer and select them.
pub fn paste(doc: &DocumentState, clipboard: &[Element], offset: Vec2) -> EngineResult<DocumentEdit> {
    if clipboard.is_empty() {
        return Err(EngineError::ClipboardEmpty);
    }
    insert_copies(doc, clone_fresh(clipboard, offset), "Pasted")
}

/// Copy the selection in place (offset) and select the copies.
pub fn duplicate(doc: &DocumentState, offset: Vec2) -> EngineResult<DocumentEdit> {
    let selected = selected_live(doc)?;
    insert_copies(doc, clone_fresh(&selected, offset), "Duplicated")
}

fn insert_copies(doc: &DocumentState, mut copies: Vec<Element>, verb: &str) -> EngineResult<DocumentEdit> {
    let mut edit = DocumentEdit::from_doc(doc);
    edit.layers.adopt(&mut copies);
    edit.layers.ensure_unlocked(&copies)?;
    edit.selected = copies.iter().map(|e| e.id).collect();
    edit.affected_elements = edit.selected.clone();
    edit.message = format!("{verb} {} elements", copies.len());
    edit.elements.extend(copies);
    Ok(edit)
}

/// Delete the selected elements.
pub fn delete_selected(doc: &DocumentState) -> EngineResult<DocumentEdit> {
    if doc.selected.is_empty() {
        return Err(EngineError::NothingSelected);
    }
    let mut edit = DocumentEdit::from_doc(doc);
    let ids = doc.selected.clone();
    edit.affected_elements = delete_elements(&mut edit.elements, &mut edit.layers, &ids);
    if edit.affected_elements.is_empty() {
        return Err(EngineError::NothingSelected);
    }
    edit.selected.clear();
    edit.message = format!("Deleted {} elements", edit.affected_elements.len());
    Ok(edit)
}

/// Delete every live element.
pub fn clear_all(doc: &DocumentState) -> DocumentEdit {
    let mut edit = DocumentEdit::from_doc(doc);
    let ids: Vec<ElementId> = doc.elements.iter().map(|e| e.id).collect();
    edit.affected_elements = delete_elements(&mut edit.elements, &mut edit.layers, &ids);
    edit.selected.clear();
    edit.message = format!("Cleared {} elements", edit.affected_elements.len());
    edit
}

/// Every visible, unlocked, live element.
pub fn select_all(doc: &DocumentState) -> Vec<ElementId> {
    doc.visible_elements()
        .filter(|e| doc.layers.is_element_editable(e))
        .map(|e| e.id)
        .collect()
}

/// Replace an element's label info.
pub fn set_element_info(doc: &DocumentState, id: ElementId, info: ElementInfo) -> EngineResult<DocumentEdit> {
    let mut edit = DocumentEdit::from_doc(doc);
    let element = edit
        .elements
        .iter_mut()
        .find(|e| e.id == id && !e.is_deleted())
        .ok_or(EngineError::ElementNotFound(id))?;
    doc.layers.ensure_unlocked([&*element])?;
    element.info = info;
    element.mark_edited();
    edit.affected_elements = vec![id];
    edit.message = "Updated label".to_string();
    Ok(edit)
}

/// Acknowledge a host save: drop soft-deleted elements and mark all saved.
pub fn mark_all_saved(doc: &DocumentState) -> DocumentEdit {
    let mut edit = DocumentEdit::from_doc(doc);
    edit.elements.retain(|e| !e.is_deleted());
    for element in &mut edit.elements {
        element.sync_state = SyncState::Saved;
    }
    edit.layers.mark_saved();
    edit.affected_elements = edit.elements.iter().map(|e| e.id).collect();
    edit.message = format!("Saved {} elements", edit.elements.len());
    edit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::ElementKind;
    use kurbo::Point;

    fn doc(n: usize) -> DocumentState {
        let mut doc = DocumentState::new(LayerState::with_default_layer("Layer 1"));
        let mut elements: Vec<Element> = (0..n)
            .map(|i| {
                let mut e = Element::new(
                    ElementKind::Rectangle,
                    vec![Point::new(i as f64 * 20.0, 0.0), Point::new(i as f64 * 20.0 + 10.0, 10.0)],
                );
                e.completed = true;
                e
            })
            .collect();
        doc.layers.adopt(&mut elements);
        doc.elements = elements;
        doc
    }

    #[test]
    fn test_delete_new_removes_outright() {
        let mut d = doc(2);
        d.selected = vec![d.elements[0].id];
        let edit = delete_selected(&d).unwrap();
        assert_eq!(edit.elements.len(), 1);
        assert!(edit.selected.is_empty());
        assert!(edit.layers.is_consistent_with(&edit.elements));
    }

    #[test]
    fn test_delete_saved_soft_deletes() {
        let mut d = doc(2);
        d.elements[0].sync_state = SyncState::Saved;
        d.elements[1].sync_state = SyncState::Edited;
        d.selected = d.elements.iter().map(|e| e.id).collect();
        let edit = delete_selected(&d).unwrap();
        assert_eq!(edit.elements.len(), 2);
        assert!(edit.elements.iter().all(|e| e.sync_state == SyncState::Deleted));
        assert!(edit.elements.iter().all(|e| e.layer_id.is_none()));
        assert!(edit.layers.layers[0].element_ids.is_empty());
        assert!(edit.layers.is_consistent_with(&edit.elements));
    }

    #[test]
    fn test_delete_nothing_selected() {
        let d = doc(1);
        assert_eq!(delete_selected(&d).unwrap_err(), EngineError::NothingSelected);
    }

    #[test]
    fn test_paste_fresh_ids_and_offset() {
        let mut d = doc(1);
        d.selected = vec![d.elements[0].id];
        let clipboard = copy(&d).unwrap();
        let edit = paste(&d, &clipboard, Vec2::new(20.0, 20.0)).unwrap();
        assert_eq!(edit.elements.len(), 2);
        let pasted = &edit.elements[1];
        assert_ne!(pasted.id, d.elements[0].id);
        assert_eq!(pasted.points[0], Point::new(20.0, 20.0));
        assert_eq!(pasted.sync_state, SyncState::New);
        assert_eq!(edit.selected, vec![pasted.id]);
        assert_eq!(pasted.layer_id, d.layers.active_layer_id);
        assert!(edit.layers.is_consistent_with(&edit.elements));
    }

    #[test]
    fn test_paste_empty_clipboard() {
        let d = doc(0);
        assert_eq!(paste(&d, &[], Vec2::ZERO).unwrap_err(), EngineError::ClipboardEmpty);
    }

    #[test]
    fn test_clone_fresh_remaps_groups() {
        let mut d = doc(3);
        let group = Uuid::new_v4();
        d.elements[0].group_id = Some(group);
        d.elements[1].group_id = Some(group);
        let copies = clone_fresh(&d.elements, Vec2::ZERO);
        let new_group = copies[0].group_id.unwrap();
        assert_ne!(new_group, group);
        assert_eq!(copies[1].group_id, Some(new_group));
        assert_eq!(copies[2].group_id, None);
    }

    #[test]
    fn test_cut_returns_clipboard_and_deletes() {
        let mut d = doc(2);
        d.selected = vec![d.elements[1].id];
        let (clipboard, edit) = cut(&d).unwrap();
        assert_eq!(clipboard.len(), 1);
        assert_eq!(edit.elements.len(), 1);
    }

    #[test]
    fn test_mark_all_saved_drops_deleted() {
        let mut d = doc(2);
        d.elements[0].sync_state = SyncState::Deleted;
        d.elements[0].layer_id = None;
        d.layers.layers[0].element_ids.retain(|id| *id != d.elements[0].id);
        let edit = mark_all_saved(&d);
        assert_eq!(edit.elements.len(), 1);
        assert_eq!(edit.elements[0].sync_state, SyncState::Saved);
        assert_eq!(edit.layers.layers[0].sync_state, SyncState::Saved);
    }

    #[test]
    fn test_select_all_skips_deleted() {
        let mut d = doc(3);
        d.elements[2].sync_state = SyncState::Deleted;
        assert_eq!(select_all(&d).len(), 2);
    }

    #[test]
    fn test_set_element_info_marks_edited() {
        let mut d = doc(1);
        d.elements[0].sync_state = SyncState::Saved;
        let info = ElementInfo {
            name: "Gate A".to_string(),
            ..ElementInfo::default()
        };
        let edit = set_element_info(&d, d.elements[0].id, info).unwrap();
        assert_eq!(edit.elements[0].info.name, "Gate A");
        assert_eq!(edit.elements[0].sync_state, SyncState::Edited);

        let missing = Uuid::new_v4();
        assert_eq!(
            set_element_info(&d, missing, ElementInfo::default()).unwrap_err(),
            EngineError::ElementNotFound(missing)
        );
    }
}
