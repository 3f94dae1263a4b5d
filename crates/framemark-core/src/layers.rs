//! Layer composition model.
//!
//! [`LayerState`] is the snapshotted layer sub-tree of the document.
//! [`LayerManager`] enforces the layer invariants: membership and
//! `Element::layer_id` always agree, at least one layer exists, z-index
//! follows list order and exactly one layer is active.

use crate::actions::delete_elements;
use crate::config::LayerConfig;
use crate::document::DocumentState;
use crate::error::{EngineError, EngineResult};
use crate::shapes::{Element, ElementId, SerializableColor, SyncState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for layers.
pub type LayerId = Uuid;

/// Palette cycled through for new layers.
const LAYER_COLORS: [SerializableColor; 6] = [
    SerializableColor { r: 0, g: 200, b: 83, a: 255 },
    SerializableColor { r: 41, g: 121, b: 255, a: 255 },
    SerializableColor { r: 255, g: 145, b: 0, a: 255 },
    SerializableColor { r: 213, g: 0, b: 249, a: 255 },
    SerializableColor { r: 255, g: 23, b: 68, a: 255 },
    SerializableColor { r: 0, g: 229, b: 255, a: 255 },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerVisibility {
    #[default]
    Visible,
    Hidden,
    /// Rendered, but its elements cannot be picked or edited.
    Locked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visibility: LayerVisibility,
    pub opacity: f64,
    /// Position in the layer order (0 = bottom). Derived from list order.
    pub z_index: usize,
    /// Member elements in insertion order.
    pub element_ids: Vec<ElementId>,
    pub color: SerializableColor,
    #[serde(default)]
    pub sync_state: SyncState,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Append-only log of categories added since the last save.
    #[serde(default)]
    pub added_categories: Vec<String>,
    /// Append-only log of categories removed since the last save.
    #[serde(default)]
    pub removed_categories: Vec<String>,
}

impl Layer {
    pub fn new(name: impl Into<String>, color: SerializableColor) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            visibility: LayerVisibility::Visible,
            opacity: 1.0,
            z_index: 0,
            element_ids: Vec::new(),
            color,
            sync_state: SyncState::New,
            categories: Vec::new(),
            added_categories: Vec::new(),
            removed_categories: Vec::new(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.visibility == LayerVisibility::Locked
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.element_ids.contains(&id)
    }

    fn mark_edited(&mut self) {
        self.sync_state = self.sync_state.after_edit();
    }
}

/// One entry of the back-to-front render order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderLayer {
    /// `None` for elements without a layer, which always render first.
    pub layer_id: Option<LayerId>,
    pub opacity: f64,
    pub element_ids: Vec<ElementId>,
}

/// The layer sub-tree of the document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayerState {
    /// Bottom to top.
    pub layers: Vec<Layer>,
    pub active_layer_id: Option<LayerId>,
    pub isolated_layer_id: Option<LayerId>,
    /// Persisted layers deleted locally, kept until the host saves.
    #[serde(default)]
    pub deleted_layers: Vec<Layer>,
}

impl LayerState {
    /// A layer state holding one active layer.
    pub fn with_default_layer(name: &str) -> Self {
        let mut state = Self::default();
        let layer = Layer::new(name, LAYER_COLORS[0]);
        state.active_layer_id = Some(layer.id);
        state.layers.push(layer);
        state
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active_layer_id.and_then(|id| self.get(id))
    }

    fn require(&self, id: LayerId) -> EngineResult<usize> {
        self.index_of(id).ok_or(EngineError::LayerNotFound(id))
    }

    fn require_unlocked(&self, id: LayerId) -> EngineResult<usize> {
        let index = self.require(id)?;
        if self.layers[index].is_locked() {
            return Err(EngineError::LayerLocked(id));
        }
        Ok(index)
    }

    /// Fail with [`EngineError::LayerLocked`] if any element sits in a locked layer.
    pub fn ensure_unlocked<'e>(&self, elements: impl IntoIterator<Item = &'e Element>) -> EngineResult<()> {
        for element in elements {
            if let Some(id) = element.layer_id {
                if self.get(id).is_some_and(|l| l.is_locked()) {
                    return Err(EngineError::LayerLocked(id));
                }
            }
        }
        Ok(())
    }

    /// Layer currently listing `element` as a member.
    pub fn layer_of(&self, element: ElementId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.contains(element))
    }

    fn recompute_z_indices(&mut self) {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.z_index = i;
        }
    }

    /// Whether a layer is drawn, taking isolation into account.
    pub fn is_rendered(&self, id: LayerId) -> bool {
        if let Some(isolated) = self.isolated_layer_id {
            if isolated != id {
                return false;
            }
        }
        self.get(id).is_some_and(|l| l.visibility != LayerVisibility::Hidden)
    }

    /// Whether an element is drawn. Elements without a layer always are.
    pub fn is_element_rendered(&self, element: &Element) -> bool {
        match element.layer_id {
            Some(id) => self.is_rendered(id),
            None => true,
        }
    }

    /// Whether an element may be picked, dragged or erased.
    pub fn is_element_editable(&self, element: &Element) -> bool {
        match element.layer_id {
            Some(id) => self.is_rendered(id) && self.get(id).is_some_and(|l| !l.is_locked()),
            None => true,
        }
    }

    /// Remove ids from every layer's membership list.
    pub(crate) fn strip_members(&mut self, ids: &HashSet<ElementId>) {
        for layer in &mut self.layers {
            layer.element_ids.retain(|id| !ids.contains(id));
        }
    }

    /// Register incoming elements: those naming an existing layer join it,
    /// the rest go to the active layer (or stay loose without layers).
    pub(crate) fn adopt(&mut self, elements: &mut [Element]) {
        for element in elements.iter_mut().filter(|e| !e.is_deleted()) {
            let target = element
                .layer_id
                .filter(|id| self.index_of(*id).is_some())
                .or(self.active_layer_id.filter(|id| self.index_of(*id).is_some()));
            element.layer_id = target;
            if let Some(layer) = target.and_then(|id| self.get_mut(id)) {
                if !layer.element_ids.contains(&element.id) {
                    layer.element_ids.push(element.id);
                }
            }
        }
    }

    /// Check the two-sided membership relation against an element list.
    pub fn is_consistent_with(&self, elements: &[Element]) -> bool {
        let forward = elements.iter().all(|e| match e.layer_id {
            Some(id) => self.get(id).is_some_and(|l| l.contains(e.id)),
            None => self.layer_of(e.id).is_none(),
        });
        let backward = self.layers.iter().all(|layer| {
            layer
                .element_ids
                .iter()
                .all(|id| elements.iter().any(|e| e.id == *id && e.layer_id == Some(layer.id)))
        });
        forward && backward
    }

    /// Back-to-front draw order of the rendered, exportable elements.
    pub fn render_plan(&self, elements: &[Element]) -> Vec<RenderLayer> {
        let mut plan = Vec::new();
        let loose: Vec<ElementId> = elements
            .iter()
            .filter(|e| e.is_exportable() && e.layer_id.is_none())
            .map(|e| e.id)
            .collect();
        if !loose.is_empty() {
            plan.push(RenderLayer {
                layer_id: None,
                opacity: 1.0,
                element_ids: loose,
            });
        }
        for layer in self.layers.iter().filter(|l| self.is_rendered(l.id)) {
            let element_ids = elements
                .iter()
                .filter(|e| e.is_exportable() && e.layer_id == Some(layer.id))
                .map(|e| e.id)
                .collect();
            plan.push(RenderLayer {
                layer_id: Some(layer.id),
                opacity: layer.opacity,
                element_ids,
            });
        }
        plan
    }

    /// Set every layer saved and forget deleted ones.
    pub(crate) fn mark_saved(&mut self) {
        for layer in &mut self.layers {
            layer.sync_state = SyncState::Saved;
            layer.added_categories.clear();
            layer.removed_categories.clear();
        }
        self.deleted_layers.clear();
    }
}

/// Result of a layer operation, ready to be published by the engine.
#[derive(Debug, Clone)]
pub struct LayerChange {
    pub layers: LayerState,
    pub elements: Vec<Element>,
    pub selected: Vec<ElementId>,
    /// Layer the operation created or targeted.
    pub layer_id: Option<LayerId>,
    pub affected_elements: Vec<ElementId>,
    pub message: String,
}

/// Working copy handed to layer edits.
struct LayerEdit {
    layers: LayerState,
    elements: Vec<Element>,
    selected: Vec<ElementId>,
    affected: Vec<ElementId>,
}

/// Applies layer operations to a copy of the document.
#[derive(Debug, Clone, Default)]
pub struct LayerManager {
    config: LayerConfig,
}

impl LayerManager {
    pub fn new(config: LayerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn edit(
        &self,
        doc: &DocumentState,
        f: impl FnOnce(&mut LayerEdit) -> EngineResult<(Option<LayerId>, String)>,
    ) -> EngineResult<LayerChange> {
        if !self.config.enabled {
            return Err(EngineError::LayersDisabled);
        }
        let mut edit = LayerEdit {
            layers: doc.layers.clone(),
            elements: doc.elements.clone(),
            selected: doc.selected.clone(),
            affected: Vec::new(),
        };
        let (layer_id, message) = f(&mut edit)?;
        edit.layers.recompute_z_indices();
        Ok(LayerChange {
            layers: edit.layers,
            elements: edit.elements,
            selected: edit.selected,
            layer_id,
            affected_elements: edit.affected,
            message,
        })
    }

    fn next_name(layers: &LayerState) -> String {
        let mut n = layers.len() + 1;
        while layers.layers.iter().any(|l| l.name == format!("Layer {n}")) {
            n += 1;
        }
        format!("Layer {n}")
    }

    /// Create a layer on top and make it active.
    pub fn create_layer(&self, doc: &DocumentState, name: Option<&str>) -> EngineResult<LayerChange> {
        let max = self.config.max_layers;
        self.edit(doc, |edit| {
            if edit.layers.len() >= max {
                return Err(EngineError::LayerLimit(max));
            }
            let name = match name {
                Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                _ => Self::next_name(&edit.layers),
            };
            let color = LAYER_COLORS[edit.layers.len() % LAYER_COLORS.len()];
            let layer = Layer::new(name, color);
            let id = layer.id;
            let message = format!("Created layer \"{}\"", layer.name);
            edit.layers.layers.push(layer);
            edit.layers.active_layer_id = Some(id);
            Ok((Some(id), message))
        })
    }

    /// Delete a layer together with its elements.
    ///
    /// The last remaining layer is never deleted and yields
    /// [`EngineError::LastLayer`]; the engine then empties it with
    /// [`Self::clear_layer`].
    pub fn delete_layer(&self, doc: &DocumentState, id: LayerId) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            let index = edit.layers.require(id)?;
            if edit.layers.len() <= 1 {
                return Err(EngineError::LastLayer);
            }
            let members = edit.layers.layers[index].element_ids.clone();
            edit.affected = delete_elements(&mut edit.elements, &mut edit.layers, &members);
            edit.selected.retain(|s| !members.contains(s));

            let mut removed = edit.layers.layers.remove(index);
            if removed.sync_state != SyncState::New {
                removed.sync_state = SyncState::Deleted;
                removed.element_ids.clear();
                edit.layers.deleted_layers.push(removed.clone());
            }
            if edit.layers.isolated_layer_id == Some(id) {
                edit.layers.isolated_layer_id = None;
            }
            if edit.layers.active_layer_id == Some(id) {
                let fallback = index.min(edit.layers.len() - 1);
                edit.layers.active_layer_id = edit.layers.layers.get(fallback).map(|l| l.id);
            }
            Ok((Some(id), format!("Deleted layer \"{}\"", removed.name)))
        })
    }

    /// Delete every element of a layer, keeping the layer. Locked layers refuse.
    pub fn clear_layer(&self, doc: &DocumentState, id: LayerId) -> EngineResult<LayerChange> {
        doc.layers.require_unlocked(id)?;
        self.empty_layer(doc, id)
    }

    /// Delete every element of a layer regardless of its lock; used when
    /// the last layer is deleted.
    pub(crate) fn empty_layer(&self, doc: &DocumentState, id: LayerId) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            let index = edit.layers.require(id)?;
            let members = edit.layers.layers[index].element_ids.clone();
            edit.affected = delete_elements(&mut edit.elements, &mut edit.layers, &members);
            edit.selected.retain(|s| !members.contains(s));
            Ok((Some(id), format!("Cleared {} elements", edit.affected.len())))
        })
    }

    /// Copy a layer and its elements above the original; copies are new.
    pub fn duplicate_layer(&self, doc: &DocumentState, id: LayerId) -> EngineResult<LayerChange> {
        let max = self.config.max_layers;
        self.edit(doc, |edit| {
            let index = edit.layers.require(id)?;
            if edit.layers.len() >= max {
                return Err(EngineError::LayerLimit(max));
            }
            let source = &edit.layers.layers[index];
            let mut copy = source.clone();
            copy.id = Uuid::new_v4();
            copy.name = format!("{} copy", source.name);
            copy.sync_state = SyncState::New;
            copy.added_categories.clear();
            copy.removed_categories.clear();
            copy.element_ids.clear();

            let members: HashSet<ElementId> = source.element_ids.iter().copied().collect();
            let mut clones = Vec::new();
            for element in edit.elements.iter().filter(|e| members.contains(&e.id) && !e.is_deleted()) {
                let mut clone = element.clone();
                clone.regenerate_id();
                clone.layer_id = Some(copy.id);
                clone.group_id = None;
                clone.sync_state = SyncState::New;
                copy.element_ids.push(clone.id);
                clones.push(clone);
            }
            edit.affected = copy.element_ids.clone();
            let copy_id = copy.id;
            let message = format!("Duplicated layer as \"{}\"", copy.name);
            edit.elements.extend(clones);
            edit.layers.layers.insert(index + 1, copy);
            edit.layers.active_layer_id = Some(copy_id);
            Ok((Some(copy_id), message))
        })
    }

    /// Move elements into a layer, keeping both sides of membership in step.
    ///
    /// Neither the target nor the layers the elements leave may be locked.
    pub fn move_elements_to_layer(
        &self,
        doc: &DocumentState,
        ids: &[ElementId],
        target: LayerId,
    ) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            edit.layers.require_unlocked(target)?;
            let wanted: HashSet<ElementId> = ids.iter().copied().collect();
            edit.layers.ensure_unlocked(edit.elements.iter().filter(|e| wanted.contains(&e.id)))?;
            let mut moved = Vec::new();
            for element in edit.elements.iter_mut().filter(|e| wanted.contains(&e.id) && !e.is_deleted()) {
                if element.layer_id != Some(target) {
                    element.mark_edited();
                }
                element.layer_id = Some(target);
                moved.push(element.id);
            }
            if moved.is_empty() {
                return Err(EngineError::NothingSelected);
            }
            let moved_set: HashSet<ElementId> = moved.iter().copied().collect();
            edit.layers.strip_members(&moved_set);
            if let Some(layer) = edit.layers.get_mut(target) {
                layer.element_ids.extend(moved.iter().copied());
            }
            let message = format!("Moved {} elements", moved.len());
            edit.affected = moved;
            Ok((Some(target), message))
        })
    }

    pub fn set_visibility(
        &self,
        doc: &DocumentState,
        id: LayerId,
        visibility: LayerVisibility,
    ) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            let index = edit.layers.require(id)?;
            let layer = &mut edit.layers.layers[index];
            layer.visibility = visibility;
            layer.mark_edited();
            let members = layer.element_ids.clone();
            // Hidden or locked elements cannot stay selected.
            if visibility != LayerVisibility::Visible {
                edit.selected.retain(|s| !members.contains(s));
            }
            Ok((Some(id), format!("Layer {:?}", visibility).to_lowercase()))
        })
    }

    pub fn set_opacity(&self, doc: &DocumentState, id: LayerId, opacity: f64) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(EngineError::InvalidOpacity(opacity));
            }
            let index = edit.layers.require(id)?;
            let layer = &mut edit.layers.layers[index];
            layer.opacity = opacity;
            layer.mark_edited();
            Ok((Some(id), format!("Opacity {:.0}%", opacity * 100.0)))
        })
    }

    pub fn rename_layer(&self, doc: &DocumentState, id: LayerId, name: &str) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            let index = edit.layers.require(id)?;
            let layer = &mut edit.layers.layers[index];
            layer.name = name.trim().to_string();
            layer.mark_edited();
            Ok((Some(id), format!("Renamed layer to \"{}\"", layer.name)))
        })
    }

    pub fn set_description(&self, doc: &DocumentState, id: LayerId, description: &str) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            let index = edit.layers.require(id)?;
            let layer = &mut edit.layers.layers[index];
            layer.description = description.to_string();
            layer.mark_edited();
            Ok((Some(id), "Updated layer description".to_string()))
        })
    }

    pub fn set_color(&self, doc: &DocumentState, id: LayerId, color: SerializableColor) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            let index = edit.layers.require(id)?;
            let layer = &mut edit.layers.layers[index];
            layer.color = color;
            layer.mark_edited();
            Ok((Some(id), "Updated layer color".to_string()))
        })
    }

    /// Add and remove categories, appending each change to the diff logs.
    pub fn update_categories(
        &self,
        doc: &DocumentState,
        id: LayerId,
        add: &[String],
        remove: &[String],
    ) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            let index = edit.layers.require(id)?;
            let layer = &mut edit.layers.layers[index];
            let mut changed = 0;
            for category in add {
                if !layer.categories.contains(category) {
                    layer.categories.push(category.clone());
                    layer.added_categories.push(category.clone());
                    changed += 1;
                }
            }
            for category in remove {
                if let Some(pos) = layer.categories.iter().position(|c| c == category) {
                    layer.categories.remove(pos);
                    layer.removed_categories.push(category.clone());
                    changed += 1;
                }
            }
            if changed > 0 {
                layer.mark_edited();
            }
            Ok((Some(id), format!("Updated {changed} categories")))
        })
    }

    /// Toggle isolation: isolating the isolated layer clears it.
    pub fn isolate_layer(&self, doc: &DocumentState, id: LayerId) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            edit.layers.require(id)?;
            if edit.layers.isolated_layer_id == Some(id) {
                edit.layers.isolated_layer_id = None;
                return Ok((Some(id), "Isolation cleared".to_string()));
            }
            edit.layers.isolated_layer_id = Some(id);
            let hidden: HashSet<ElementId> = edit
                .layers
                .layers
                .iter()
                .filter(|l| l.id != id)
                .flat_map(|l| l.element_ids.iter().copied())
                .collect();
            edit.selected.retain(|s| !hidden.contains(s));
            Ok((Some(id), "Layer isolated".to_string()))
        })
    }

    pub fn set_active_layer(&self, doc: &DocumentState, id: LayerId) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            edit.layers.require(id)?;
            edit.layers.active_layer_id = Some(id);
            Ok((Some(id), "Active layer changed".to_string()))
        })
    }

    /// Move a layer to a new position in the order (clamped).
    pub fn move_layer(&self, doc: &DocumentState, id: LayerId, to_index: usize) -> EngineResult<LayerChange> {
        self.edit(doc, |edit| {
            let from = edit.layers.require(id)?;
            let to = to_index.min(edit.layers.len() - 1);
            let layer = edit.layers.layers.remove(from);
            edit.layers.layers.insert(to, layer);
            Ok((Some(id), format!("Moved layer to position {to}")))
        })
    }

    pub fn move_layer_up(&self, doc: &DocumentState, id: LayerId) -> EngineResult<LayerChange> {
        let index = doc.layers.require(id)?;
        self.move_layer(doc, id, index + 1)
    }

    pub fn move_layer_down(&self, doc: &DocumentState, id: LayerId) -> EngineResult<LayerChange> {
        let index = doc.layers.require(id)?;
        self.move_layer(doc, id, index.saturating_sub(1))
    }
}
