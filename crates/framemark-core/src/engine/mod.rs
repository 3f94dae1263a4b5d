//! The annotation engine: owns the document and routes every change
//! through one dispatch point where history is recorded and observers
//! are notified.

mod pointer;

use crate::actions::{self, DocumentEdit};
use crate::arrange::{Alignment, ArrangeResult, Arranger, Axis, ZOrder};
use crate::config::EngineConfig;
use crate::document::{DocumentState, HistorySnapshot, SyncStats};
use crate::error::{EngineError, EngineResult, HistoryError, OpResult};
use crate::events::{EngineEvent, EventBus, FeedbackLevel, Subscription};
use crate::export::{ExportedFrame, FrameExporter, FrameSnapshot};
use crate::geometry::{DetectionMatrix, generate_matrix};
use crate::history::{HistoryEntrySummary, HistoryManager, HistoryStats, Operation, RecordOutcome};
use crate::input::InputState;
use crate::layers::{Layer, LayerChange, LayerId, LayerManager, LayerState, LayerVisibility, RenderLayer};
use crate::resolution::Resolution;
use crate::shapes::{Element, ElementId, ElementInfo, SemanticType, SerializableColor, SyncState};
use crate::snap::SnapProvider;
use crate::tools::{DrawingMode, ToolManager};
use kurbo::{Size, Vec2};
use std::collections::HashSet;

/// Interactive annotation engine.
pub struct Engine {
    state: DocumentState,
    resolution: Resolution,
    history: HistoryManager,
    layers: LayerManager,
    tools: ToolManager,
    input: InputState,
    events: EventBus,
    config: EngineConfig,
    snap: Option<Box<dyn SnapProvider>>,
}

impl Engine {
    /// Create an engine for a surface of `display` size showing media of
    /// `native` size.
    pub fn new(config: EngineConfig, display: Size, native: Size) -> EngineResult<Self> {
        let resolution = Resolution::new(display, native, config.target_resolution)?;
        let layer_state = if config.layers.enabled {
            LayerState::with_default_layer(&config.layers.default_layer_name)
        } else {
            LayerState::default()
        };
        let mut tools = ToolManager::new();
        tools.current_color = config.default_color;
        tools.min_point_distance = config.min_point_distance;

        log::debug!(
            "Engine created: display {}x{}, target {}x{}",
            display.width,
            display.height,
            resolution.target.width,
            resolution.target.height
        );
        Ok(Self {
            state: DocumentState::new(layer_state),
            resolution,
            history: HistoryManager::new(config.history.clone()),
            layers: LayerManager::new(config.layers.clone()),
            tools,
            input: InputState::new(),
            events: EventBus::new(config.max_listeners),
            config,
            snap: None,
        })
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn elements(&self) -> &[Element] {
        &self.state.elements
    }

    pub fn selected(&self) -> &[ElementId] {
        &self.state.selected
    }

    pub fn mode(&self) -> DrawingMode {
        self.state.mode
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Install or remove the snapping hook used during point drags.
    pub fn set_snap_provider(&mut self, provider: Option<Box<dyn SnapProvider>>) {
        self.snap = provider;
    }

    pub fn set_current_color(&mut self, color: SerializableColor) {
        self.tools.current_color = color;
    }

    /// Semantic type given to newly drawn lines and curves.
    pub fn set_semantic_type(&mut self, semantic_type: SemanticType) {
        self.tools.semantic_type = semantic_type;
    }

    // --- dispatch ---------------------------------------------------------

    fn emit(&mut self, event: EngineEvent) {
        self.events.emit(&event);
    }

    fn emit_history_changed(&mut self) {
        let stats = self.history.stats();
        self.emit(EngineEvent::HistoryChanged { stats });
    }

    fn snapshot_with(&self, elements: Vec<Element>, selected: Vec<ElementId>, layers: LayerState) -> HistorySnapshot {
        HistorySnapshot {
            elements,
            selected,
            mode: self.state.mode,
            layers,
        }
    }

    /// Publish `next` as the document. Every persistent change goes
    /// through here; `operation` is recorded unless a restore is running.
    fn publish(
        &mut self,
        operation: Option<Operation>,
        description: &str,
        before: HistorySnapshot,
        next: HistorySnapshot,
    ) -> bool {
        if next == before {
            return false;
        }
        self.state.apply_snapshot(next.clone());
        log::debug!("State change: {:?} ({})", operation, description);

        let recorded = match operation {
            Some(op) if !self.history.is_applying() => {
                self.history.record_operation(op, next, description, before) != RecordOutcome::Skipped
            }
            _ => false,
        };
        self.emit(EngineEvent::StateChanged {
            operation,
            element_count: self.state.elements.len(),
            selected_count: self.state.selected.len(),
        });
        if recorded {
            self.emit_history_changed();
        }
        true
    }

    fn dispatch(&mut self, operation: Operation, description: &str, next: HistorySnapshot) -> bool {
        let before = self.state.clone_for_history();
        self.publish(Some(operation), description, before, next)
    }

    fn dispatch_edit(&mut self, operation: Operation, edit: DocumentEdit) -> OpResult {
        let next = self.snapshot_with(edit.elements, edit.selected, edit.layers);
        self.dispatch(operation, &edit.message, next);
        OpResult::ok_with(edit.message, edit.affected_elements)
    }

    /// Emit the action event and turn failures into feedback.
    fn finish(&mut self, action: &str, result: EngineResult<OpResult>) -> OpResult {
        match result {
            Ok(op) => {
                self.emit(EngineEvent::Action {
                    name: action.to_string(),
                    success: op.success,
                    affected_elements: op.affected_elements.clone(),
                });
                op
            }
            Err(err) => {
                let level = match &err {
                    EngineError::History(HistoryError::MissingEntry(_))
                    | EngineError::History(HistoryError::Reentrant)
                    | EngineError::Export(_)
                    | EngineError::Media(_) => {
                        log::error!("{} failed: {}", action, err);
                        FeedbackLevel::Error
                    }
                    _ => {
                        log::warn!("{} rejected: {}", action, err);
                        FeedbackLevel::Warning
                    }
                };
                self.emit(EngineEvent::Action {
                    name: action.to_string(),
                    success: false,
                    affected_elements: Vec::new(),
                });
                self.emit(EngineEvent::Feedback {
                    level,
                    message: err.to_string(),
                });
                OpResult::from(&err)
            }
        }
    }

    // --- mode -------------------------------------------------------------

    pub fn set_drawing_mode(&mut self, mode: DrawingMode) -> OpResult {
        let from = self.state.mode;
        if from == mode {
            return OpResult::ok("Mode unchanged");
        }
        self.discard_gesture();
        let mut next = self.state.clone_for_history();
        next.mode = mode;
        self.dispatch(Operation::ChangeMode, &format!("Mode: {:?}", mode), next);
        self.emit(EngineEvent::ModeChange { from, to: mode });
        self.finish("set_drawing_mode", Ok(OpResult::ok(format!("Mode set to {:?}", mode))))
    }

    // --- elements ---------------------------------------------------------

    /// Add elements from the host. Incomplete elements are finalized;
    /// elements without enough points are skipped.
    pub fn add_elements(&mut self, elements: Vec<Element>) -> OpResult {
        let result = self.insert_elements(elements, "Add elements");
        self.finish("add_elements", result)
    }

    fn insert_elements(&mut self, elements: Vec<Element>, description: &str) -> EngineResult<OpResult> {
        let total = elements.len();
        let gate = self.config.gate_half_length;
        let mut existing: HashSet<ElementId> = self.state.elements.iter().map(|e| e.id).collect();
        let mut accepted: Vec<Element> = elements.into_iter().filter(|e| e.has_enough_points()).collect();
        if accepted.is_empty() {
            return Err(EngineError::NotEnoughElements { required: 1, found: 0 });
        }
        if accepted.len() < total {
            log::warn!("Skipped {} elements with too few points", total - accepted.len());
        }
        for element in accepted.iter_mut() {
            if !existing.insert(element.id) {
                let id = element.regenerate_id();
                existing.insert(id);
            }
            if !element.completed {
                element.finalize(gate);
            }
        }

        let mut next = self.state.clone_for_history();
        next.layers.adopt(&mut accepted);
        next.layers.ensure_unlocked(&accepted)?;
        let ids: Vec<ElementId> = accepted.iter().map(|e| e.id).collect();
        next.elements.extend(accepted);
        self.dispatch(Operation::AddElements, description, next);
        Ok(OpResult::ok_with(format!("Added {} elements", ids.len()), ids))
    }

    pub fn delete_selected_elements(&mut self) -> OpResult {
        let result = actions::delete_selected(&self.state).map(|edit| self.dispatch_edit(Operation::DeleteElements, edit));
        self.finish("delete_selected_elements", result)
    }

    pub fn clear_all(&mut self) -> OpResult {
        self.discard_gesture();
        let edit = actions::clear_all(&self.state);
        let result = self.dispatch_edit(Operation::ClearAll, edit);
        self.finish("clear_all", Ok(result))
    }

    /// Attach or replace label info on an element.
    pub fn set_element_info(&mut self, id: ElementId, info: ElementInfo) -> OpResult {
        let result = actions::set_element_info(&self.state, id, info.clone()).map(|edit| {
            let op = self.dispatch_edit(Operation::Label, edit);
            self.emit(EngineEvent::Annotation { element_id: id, info });
            op
        });
        self.finish("set_element_info", result)
    }

    // --- clipboard --------------------------------------------------------

    pub fn copy_selected_elements(&mut self) -> OpResult {
        let result = actions::copy(&self.state).map(|clipboard| {
            let ids = clipboard.iter().map(|e| e.id).collect();
            self.state.clipboard = clipboard;
            self.state.paste_count = 0;
            OpResult::ok_with("Copied", ids)
        });
        self.finish("copy_selected_elements", result)
    }

    pub fn cut_selected_elements(&mut self) -> OpResult {
        let result = actions::cut(&self.state).map(|(clipboard, edit)| {
            self.state.clipboard = clipboard;
            self.state.paste_count = 0;
            self.dispatch_edit(Operation::Cut, edit)
        });
        self.finish("cut_selected_elements", result)
    }

    /// Paste the clipboard, each successive paste offset a little further.
    pub fn paste_elements(&mut self) -> OpResult {
        let step = self.config.paste_offset * f64::from(self.state.paste_count + 1);
        let result = actions::paste(&self.state, &self.state.clipboard, Vec2::new(step, step)).map(|edit| {
            self.state.paste_count += 1;
            self.dispatch_edit(Operation::Paste, edit)
        });
        self.finish("paste_elements", result)
    }

    pub fn duplicate_selected_elements(&mut self) -> OpResult {
        let offset = Vec2::new(self.config.paste_offset, self.config.paste_offset);
        let result = actions::duplicate(&self.state, offset).map(|edit| self.dispatch_edit(Operation::Duplicate, edit));
        self.finish("duplicate_selected_elements", result)
    }

    // --- selection --------------------------------------------------------

    /// Replace the selection. Unknown, deleted or non-editable ids are dropped.
    pub fn select_elements(&mut self, ids: &[ElementId]) -> OpResult {
        let selected: Vec<ElementId> = ids
            .iter()
            .copied()
            .filter(|id| {
                self.state
                    .get(*id)
                    .is_some_and(|e| e.is_exportable() && self.state.layers.is_element_editable(e))
            })
            .collect();
        let result = self.set_selection(selected);
        self.finish("select_elements", Ok(result))
    }

    pub fn select_all_elements(&mut self) -> OpResult {
        let ids = actions::select_all(&self.state);
        let result = self.set_selection(ids);
        self.finish("select_all_elements", Ok(result))
    }

    pub fn clear_selection(&mut self) -> OpResult {
        let result = self.set_selection(Vec::new());
        self.finish("clear_selection", Ok(result))
    }

    fn set_selection(&mut self, selected: Vec<ElementId>) -> OpResult {
        let mut next = self.state.clone_for_history();
        next.selected = selected.clone();
        self.dispatch(Operation::UpdateSelection, "Selection", next);
        OpResult::ok_with(format!("{} selected", selected.len()), selected)
    }

    // --- arrangement ------------------------------------------------------

    fn arranger(&self) -> Arranger<'_> {
        let arranger = Arranger::new(&self.state.elements);
        if self.layers.is_enabled() {
            arranger.with_layers(&self.state.layers)
        } else {
            arranger
        }
    }

    fn apply_arrangement(&mut self, action: &str, operation: Operation, result: ArrangeResult) -> OpResult {
        let outcome = if result.success {
            let next = self.snapshot_with(result.elements, self.state.selected.clone(), self.state.layers.clone());
            self.dispatch(operation, &result.message, next);
            Ok(OpResult::ok_with(result.message, result.affected_elements))
        } else {
            Err(result.error.unwrap_or(EngineError::NothingSelected))
        };
        self.finish(action, outcome)
    }

    pub fn reorder_elements(&mut self, ids: &[ElementId], order: ZOrder) -> OpResult {
        let result = self.arranger().z_order(ids, order);
        self.apply_arrangement("reorder_elements", Operation::Reorder, result)
    }

    pub fn bring_to_front(&mut self, ids: &[ElementId]) -> OpResult {
        self.reorder_elements(ids, ZOrder::BringToFront)
    }

    pub fn send_to_back(&mut self, ids: &[ElementId]) -> OpResult {
        self.reorder_elements(ids, ZOrder::SendToBack)
    }

    pub fn bring_forward(&mut self, ids: &[ElementId]) -> OpResult {
        self.reorder_elements(ids, ZOrder::BringForward)
    }

    pub fn send_backward(&mut self, ids: &[ElementId]) -> OpResult {
        self.reorder_elements(ids, ZOrder::SendBackward)
    }

    pub fn align_elements(&mut self, ids: &[ElementId], alignment: Alignment) -> OpResult {
        let result = self.arranger().align(ids, alignment);
        self.apply_arrangement("align_elements", Operation::Align, result)
    }

    pub fn distribute_elements(&mut self, ids: &[ElementId], axis: Axis, spacing: Option<f64>) -> OpResult {
        let result = self.arranger().distribute(ids, axis, spacing);
        self.apply_arrangement("distribute_elements", Operation::Distribute, result)
    }

    pub fn group_elements(&mut self, ids: &[ElementId]) -> OpResult {
        let result = self.arranger().group(ids);
        self.apply_arrangement("group_elements", Operation::Group, result)
    }

    pub fn ungroup_elements(&mut self, ids: &[ElementId]) -> OpResult {
        let result = self.arranger().ungroup(ids);
        self.apply_arrangement("ungroup_elements", Operation::Ungroup, result)
    }

    pub fn flip_elements(&mut self, ids: &[ElementId], axis: Axis) -> OpResult {
        let result = self.arranger().flip(ids, axis);
        self.apply_arrangement("flip_elements", Operation::Flip, result)
    }

    pub fn reorder_elements_in_layer(&mut self, layer: LayerId, ids: &[ElementId], order: ZOrder) -> OpResult {
        let result = self.arranger().z_order_in_layer(layer, ids, order);
        self.apply_arrangement("reorder_elements_in_layer", Operation::Reorder, result)
    }

    pub fn align_elements_in_layer(&mut self, layer: LayerId, ids: &[ElementId], alignment: Alignment) -> OpResult {
        let result = self.arranger().align_in_layer(layer, ids, alignment);
        self.apply_arrangement("align_elements_in_layer", Operation::Align, result)
    }

    pub fn distribute_elements_in_layer(
        &mut self,
        layer: LayerId,
        ids: &[ElementId],
        axis: Axis,
        spacing: Option<f64>,
    ) -> OpResult {
        let result = self.arranger().distribute_in_layer(layer, ids, axis, spacing);
        self.apply_arrangement("distribute_elements_in_layer", Operation::Distribute, result)
    }

    pub fn group_elements_in_layer(&mut self, layer: LayerId, ids: &[ElementId]) -> OpResult {
        let result = self.arranger().group_in_layer(layer, ids);
        self.apply_arrangement("group_elements_in_layer", Operation::Group, result)
    }

    pub fn flip_elements_in_layer(&mut self, layer: LayerId, ids: &[ElementId], axis: Axis) -> OpResult {
        let result = self.arranger().flip_in_layer(layer, ids, axis);
        self.apply_arrangement("flip_elements_in_layer", Operation::Flip, result)
    }

    // --- layers -----------------------------------------------------------

    fn apply_layer_change(
        &mut self,
        action: &str,
        operation: Operation,
        change: EngineResult<LayerChange>,
    ) -> OpResult {
        let result = change.map(|change| {
            let next = self.snapshot_with(change.elements, change.selected, change.layers);
            self.dispatch(operation, &change.message, next);
            self.emit(EngineEvent::LayerAction {
                action: action.to_string(),
                layer_id: change.layer_id,
            });
            OpResult::ok_with(change.message, change.affected_elements)
        });
        self.finish(action, result)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.state.layers.layers
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.state.layers.active_layer()
    }

    pub fn create_layer(&mut self, name: Option<&str>) -> OpResult {
        let change = self.layers.create_layer(&self.state, name);
        self.apply_layer_change("create_layer", Operation::CreateLayer, change)
    }

    /// Delete a layer and its elements.
    ///
    /// The last layer is kept and reported as a failure, but its elements
    /// are still deleted, recorded as one `DeleteElements` entry.
    pub fn delete_layer(&mut self, id: LayerId) -> OpResult {
        match self.layers.delete_layer(&self.state, id) {
            Err(EngineError::LastLayer) => {
                let mut affected = Vec::new();
                if let Ok(change) = self.layers.empty_layer(&self.state, id) {
                    let next = self.snapshot_with(change.elements, change.selected, change.layers);
                    self.dispatch(Operation::DeleteElements, &change.message, next);
                    affected = change.affected_elements;
                }
                let mut result = self.finish("delete_layer", Err(EngineError::LastLayer));
                result.affected_elements = affected;
                result
            }
            change => self.apply_layer_change("delete_layer", Operation::DeleteLayer, change),
        }
    }

    /// Delete the elements of a layer, keeping the layer.
    pub fn clear_layer(&mut self, id: LayerId) -> OpResult {
        let change = self.layers.clear_layer(&self.state, id);
        self.apply_layer_change("clear_layer", Operation::DeleteElements, change)
    }

    pub fn duplicate_layer(&mut self, id: LayerId) -> OpResult {
        let change = self.layers.duplicate_layer(&self.state, id);
        self.apply_layer_change("duplicate_layer", Operation::DuplicateLayer, change)
    }

    pub fn move_elements_to_layer(&mut self, ids: &[ElementId], target: LayerId) -> OpResult {
        let change = self.layers.move_elements_to_layer(&self.state, ids, target);
        self.apply_layer_change("move_elements_to_layer", Operation::MoveToLayer, change)
    }

    pub fn set_layer_visibility(&mut self, id: LayerId, visibility: LayerVisibility) -> OpResult {
        let change = self.layers.set_visibility(&self.state, id, visibility);
        self.apply_layer_change("set_layer_visibility", Operation::UpdateLayer, change)
    }

    pub fn set_layer_opacity(&mut self, id: LayerId, opacity: f64) -> OpResult {
        let change = self.layers.set_opacity(&self.state, id, opacity);
        self.apply_layer_change("set_layer_opacity", Operation::UpdateLayer, change)
    }

    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> OpResult {
        let change = self.layers.rename_layer(&self.state, id, name);
        self.apply_layer_change("rename_layer", Operation::UpdateLayer, change)
    }

    pub fn set_layer_description(&mut self, id: LayerId, description: &str) -> OpResult {
        let change = self.layers.set_description(&self.state, id, description);
        self.apply_layer_change("set_layer_description", Operation::UpdateLayer, change)
    }

    pub fn set_layer_color(&mut self, id: LayerId, color: SerializableColor) -> OpResult {
        let change = self.layers.set_color(&self.state, id, color);
        self.apply_layer_change("set_layer_color", Operation::UpdateLayer, change)
    }

    pub fn update_layer_categories(&mut self, id: LayerId, add: &[String], remove: &[String]) -> OpResult {
        let change = self.layers.update_categories(&self.state, id, add, remove);
        self.apply_layer_change("update_layer_categories", Operation::UpdateLayer, change)
    }

    /// Toggle isolation of a layer.
    pub fn isolate_layer(&mut self, id: LayerId) -> OpResult {
        let change = self.layers.isolate_layer(&self.state, id);
        self.apply_layer_change("isolate_layer", Operation::UpdateLayer, change)
    }

    pub fn set_active_layer(&mut self, id: LayerId) -> OpResult {
        let change = self.layers.set_active_layer(&self.state, id);
        self.apply_layer_change("set_active_layer", Operation::UpdateLayer, change)
    }

    pub fn move_layer(&mut self, id: LayerId, to_index: usize) -> OpResult {
        let change = self.layers.move_layer(&self.state, id, to_index);
        self.apply_layer_change("move_layer", Operation::ReorderLayers, change)
    }

    pub fn move_layer_up(&mut self, id: LayerId) -> OpResult {
        let change = self.layers.move_layer_up(&self.state, id);
        self.apply_layer_change("move_layer_up", Operation::ReorderLayers, change)
    }

    pub fn move_layer_down(&mut self, id: LayerId) -> OpResult {
        let change = self.layers.move_layer_down(&self.state, id);
        self.apply_layer_change("move_layer_down", Operation::ReorderLayers, change)
    }

    /// Persisted layers deleted since the last save.
    pub fn get_deleted_layers(&self) -> &[Layer] {
        &self.state.layers.deleted_layers
    }

    pub fn is_layer_rendered(&self, id: LayerId) -> bool {
        self.state.layers.is_rendered(id)
    }

    pub fn render_plan(&self) -> Vec<RenderLayer> {
        self.state.layers.render_plan(&self.state.elements)
    }

    // --- history ----------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn get_undo_preview(&self) -> Option<&str> {
        self.history.undo_preview()
    }

    pub fn get_redo_preview(&self) -> Option<&str> {
        self.history.redo_preview()
    }

    pub fn get_history_stats(&self) -> HistoryStats {
        self.history.stats()
    }

    pub fn get_history_entries(&self) -> Vec<HistoryEntrySummary> {
        self.history.summaries()
    }

    /// Replay a history snapshot through the normal publish path with
    /// recording suspended.
    fn restore(
        &mut self,
        label: &str,
        step: impl FnOnce(&mut HistoryManager) -> Result<HistorySnapshot, HistoryError>,
    ) -> EngineResult<OpResult> {
        self.history.begin_restore()?;
        let outcome = match step(&mut self.history) {
            Ok(snapshot) => {
                self.discard_gesture();
                let before = self.state.clone_for_history();
                self.publish(None, label, before, snapshot);
                self.state.clear_transient();
                Ok(OpResult::ok(label))
            }
            Err(err) => Err(err.into()),
        };
        self.history.end_restore();
        if outcome.is_ok() {
            self.emit_history_changed();
        }
        outcome
    }

    pub fn undo_last(&mut self) -> OpResult {
        let label = match self.history.undo_preview() {
            Some(description) => format!("Undo {}", description),
            None => "Undo".to_string(),
        };
        let result = self.restore(&label, HistoryManager::undo);
        self.finish("undo", result)
    }

    pub fn redo_last(&mut self) -> OpResult {
        let label = match self.history.redo_preview() {
            Some(description) => format!("Redo {}", description),
            None => "Redo".to_string(),
        };
        let result = self.restore(&label, HistoryManager::redo);
        self.finish("redo", result)
    }

    /// Jump to a history position; `None` is the state before the first entry.
    pub fn go_to_position(&mut self, position: Option<usize>) -> OpResult {
        let result = self.restore("Go to history position", |history| history.go_to_position(position));
        self.finish("go_to_position", result)
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.emit_history_changed();
    }

    pub fn set_recording_enabled(&mut self, enabled: bool) {
        self.history.set_enabled(enabled);
        self.emit_history_changed();
    }

    // --- sync state -------------------------------------------------------

    pub fn get_new_elements(&self) -> Vec<&Element> {
        self.state.elements_with_state(SyncState::New)
    }

    pub fn get_edited_elements(&self) -> Vec<&Element> {
        self.state.elements_with_state(SyncState::Edited)
    }

    pub fn get_deleted_elements(&self) -> Vec<&Element> {
        self.state.elements_with_state(SyncState::Deleted)
    }

    pub fn get_sync_state_stats(&self) -> SyncStats {
        self.state.sync_stats()
    }

    /// Acknowledge that the host persisted everything. Not undoable.
    pub fn mark_all_elements_as_saved(&mut self) -> OpResult {
        let edit = actions::mark_all_saved(&self.state);
        let result = self.dispatch_edit(Operation::MarkSaved, edit);
        self.finish("mark_all_elements_as_saved", Ok(result))
    }

    // --- events and media -------------------------------------------------

    pub fn subscribe(&self, listener: impl FnMut(&EngineEvent) + 'static) -> EngineResult<Subscription> {
        self.events.subscribe(listener)
    }

    /// Ask the effects subsystem to do something.
    pub fn emit_effect_action(&mut self, effect: &str, payload: serde_json::Value) {
        self.emit(EngineEvent::EffectAction {
            effect: effect.to_string(),
            payload,
        });
    }

    /// The host surface changed size.
    pub fn resize(&mut self, display: Size) -> OpResult {
        let result = self.resolution.set_display(display).map(|()| {
            log::info!("Display resized to {}x{}", display.width, display.height);
            self.emit(EngineEvent::Resize { display });
            OpResult::ok("Resized")
        });
        self.finish("resize", result)
    }

    /// The media frame is ready at its native size.
    pub fn media_ready(&mut self, native: Size) -> OpResult {
        let result = self.resolution.set_native(native).map(|()| {
            self.state.media_loaded = true;
            log::info!("Media loaded at {}x{}", native.width, native.height);
            self.emit(EngineEvent::MediaLoaded { native });
            OpResult::ok("Media loaded")
        });
        self.finish("media_ready", result)
    }

    pub fn media_failed(&mut self, message: &str) -> OpResult {
        self.state.media_loaded = false;
        self.emit(EngineEvent::MediaFailed {
            message: message.to_string(),
        });
        self.finish("media_failed", Err(EngineError::Media(message.to_string())))
    }

    // --- output -----------------------------------------------------------

    /// Rasterize the rendered elements at target resolution.
    pub fn generate_matrix(&self) -> DetectionMatrix {
        let elements: Vec<Element> = self.state.paint_order().into_iter().cloned().collect();
        generate_matrix(&elements, self.resolution.target)
    }

    fn frame_snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            elements: self.state.paint_order().into_iter().cloned().collect(),
            target: self.resolution.target,
            native: self.resolution.native,
        }
    }

    /// Export a snapshot of the rendered document.
    pub async fn export_snapshot(&mut self, exporter: &dyn FrameExporter) -> EngineResult<ExportedFrame> {
        let frame = self.frame_snapshot();
        let result = exporter.export(&frame).await;
        match &result {
            Ok(out) => {
                log::info!("Snapshot exported: {}x{} {}", out.width, out.height, out.mime_type);
                self.finish("export_snapshot", Ok(OpResult::ok("Snapshot exported")));
            }
            Err(err) => {
                self.finish("export_snapshot", Err(err.clone()));
            }
        }
        result
    }

    /// Serialize the persistent document.
    pub fn export_document(&self) -> EngineResult<String> {
        self.state.to_json()
    }

    /// Replace the document with one read from JSON.
    pub fn load_document(&mut self, json: &str) -> OpResult {
        let result = DocumentState::from_json(json).map(|loaded| {
            self.discard_gesture();
            let mut layers = loaded.layers;
            if self.layers.is_enabled() && layers.is_empty() {
                layers = LayerState::with_default_layer(&self.config.layers.default_layer_name);
            }
            let count = loaded.elements.len();
            let next = self.snapshot_with(loaded.elements, Vec::new(), layers);
            self.dispatch(Operation::LoadDocument, "Load document", next);
            OpResult::ok(format!("Loaded {} elements", count))
        });
        self.finish("load_document", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::MatrixPngExporter;
    use crate::geometry::point_in_polygon;
    use crate::resolution::DEFAULT_TARGET_SIZE;
    use crate::shapes::ElementKind;
    use kurbo::Point;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default(), DEFAULT_TARGET_SIZE, DEFAULT_TARGET_SIZE).unwrap()
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Element {
        Element::new(ElementKind::Rectangle, vec![Point::new(x0, y0), Point::new(x1, y1)])
    }

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Element {
        Element::new(ElementKind::Line, vec![Point::new(x0, y0), Point::new(x1, y1)])
    }

    fn add(engine: &mut Engine, element: Element) -> ElementId {
        let result = engine.add_elements(vec![element]);
        assert!(result.success, "{}", result.message);
        result.affected_elements[0]
    }

    fn record_events(engine: &Engine) -> Rc<RefCell<Vec<EngineEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        engine.subscribe(move |e| sink.borrow_mut().push(e.clone())).unwrap();
        events
    }

    #[test]
    fn test_new_engine_has_default_layer() {
        let engine = engine();
        assert_eq!(engine.layers().len(), 1);
        assert_eq!(engine.layers()[0].name, "Layer 1");
        assert_eq!(engine.mode(), DrawingMode::Cursor);
        assert!(!engine.can_undo());
    }

    #[test]
    fn test_layers_disabled() {
        let mut config = EngineConfig::default();
        config.layers.enabled = false;
        let mut engine = Engine::new(config, DEFAULT_TARGET_SIZE, DEFAULT_TARGET_SIZE).unwrap();
        assert!(engine.layers().is_empty());
        let id = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        assert_eq!(engine.state().get(id).unwrap().layer_id, None);
        assert!(!engine.create_layer(None).success);
    }

    #[test]
    fn test_coordinate_round_trip() {
        let mut engine = engine();
        engine.resize(Size::new(640.0, 480.0));
        let resolution = engine.resolution();
        for p in [Point::new(0.0, 0.0), Point::new(13.7, 401.2), Point::new(639.0, 479.5)] {
            let back = resolution.to_display_space(resolution.to_target_space(p));
            assert!((back - p).hypot() < 1e-9);
        }
    }

    #[test]
    fn test_history_linearity() {
        let mut engine = engine();
        for i in 0..3 {
            add(&mut engine, rect(f64::from(i) * 20.0, 0.0, f64::from(i) * 20.0 + 10.0, 10.0));
        }
        assert_eq!(engine.get_history_stats().total_entries, 3);
        for _ in 0..3 {
            assert!(engine.undo_last().success);
        }
        assert!(engine.elements().is_empty());
        assert!(!engine.can_undo());
        assert!(!engine.undo_last().success);

        engine.redo_last();
        assert!(engine.can_redo());
        add(&mut engine, rect(100.0, 100.0, 110.0, 110.0));
        assert!(!engine.can_redo());
        assert_eq!(engine.elements().len(), 2);
    }

    #[test]
    fn test_selection_changes_merge() {
        let mut engine = engine();
        let a = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        let b = add(&mut engine, rect(20.0, 0.0, 30.0, 10.0));
        engine.select_elements(&[a]);
        engine.select_elements(&[b]);
        // Two adds never merge; the two selections do.
        assert_eq!(engine.get_history_stats().total_entries, 3);
        engine.undo_last();
        assert!(engine.selected().is_empty());
    }

    #[test]
    fn test_adds_never_merge() {
        let mut engine = engine();
        add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        add(&mut engine, rect(20.0, 0.0, 30.0, 10.0));
        assert_eq!(engine.get_history_stats().total_entries, 2);
        engine.undo_last();
        assert_eq!(engine.elements().len(), 1);
    }

    #[test]
    fn test_align_left_scenario() {
        let mut engine = engine();
        let a = add(&mut engine, rect(0.0, 0.0, 50.0, 50.0));
        let b = add(&mut engine, rect(100.0, 100.0, 150.0, 150.0));
        let result = engine.align_elements(&[a, b], Alignment::Left);
        assert!(result.success);
        for id in [a, b] {
            let bounds = engine.state().get(id).unwrap().bounds().unwrap();
            assert!(bounds.x0.abs() < 1e-9);
        }
        assert_eq!(engine.history().entries().last().unwrap().operation, Operation::Align);
    }

    #[test]
    fn test_align_needs_two_elements() {
        let mut engine = engine();
        let events = record_events(&engine);
        let a = add(&mut engine, rect(0.0, 0.0, 50.0, 50.0));
        let result = engine.align_elements(&[a], Alignment::Left);
        assert!(!result.success);
        assert!(events.borrow().iter().any(|e| matches!(
            e,
            EngineEvent::Feedback {
                level: FeedbackLevel::Warning,
                ..
            }
        )));
    }

    #[test]
    fn test_last_layer_protected() {
        let mut engine = engine();
        let id = engine.layers()[0].id;
        let result = engine.delete_layer(id);
        assert!(!result.success);
        assert_eq!(engine.layers().len(), 1);
        assert_eq!(engine.get_history_stats().total_entries, 0);
    }

    #[test]
    fn test_deleting_last_layer_deletes_its_elements() {
        let mut engine = engine();
        let id = engine.layers()[0].id;
        let a = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        let b = add(&mut engine, line(0.0, 20.0, 50.0, 20.0));
        engine.select_all_elements();
        let entries = engine.get_history_stats().total_entries;

        let result = engine.delete_layer(id);
        assert!(!result.success);
        assert_eq!(result.message, EngineError::LastLayer.to_string());
        assert_eq!(result.affected_elements.len(), 2);
        assert_eq!(engine.layers().len(), 1);
        assert!(engine.elements().is_empty());
        assert!(engine.selected().is_empty());
        assert!(engine.layers()[0].element_ids.is_empty());
        assert_eq!(engine.get_history_stats().total_entries, entries + 1);

        assert!(engine.undo_last().success);
        assert!(engine.state().get(a).is_some());
        assert!(engine.state().get(b).is_some());
        assert!(engine.state().layers.is_consistent_with(engine.elements()));
    }

    #[test]
    fn test_layer_invariant_through_operations() {
        let mut engine = engine();
        let a = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        let b = add(&mut engine, rect(20.0, 0.0, 30.0, 10.0));
        engine.create_layer(Some("Vehicles"));
        let second = engine.active_layer().unwrap().id;
        let c = add(&mut engine, line(0.0, 50.0, 100.0, 50.0));
        assert_eq!(engine.state().get(c).unwrap().layer_id, Some(second));

        engine.move_elements_to_layer(&[a], second);
        engine.duplicate_layer(second);
        let first = engine.layers()[0].id;
        engine.delete_layer(first);
        assert!(engine.state().get(b).is_none());
        engine.undo_last();
        assert!(engine.state().get(b).is_some());

        let state = engine.state();
        assert!(state.layers.is_consistent_with(&state.elements));
    }

    #[test]
    fn test_locked_layer_rejects_element_edits() {
        let mut engine = engine();
        let base = engine.active_layer().unwrap().id;
        let a = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        let b = add(&mut engine, rect(20.0, 0.0, 30.0, 10.0));
        engine.create_layer(Some("Locked"));
        let locked = engine.active_layer().unwrap().id;
        let c = add(&mut engine, rect(40.0, 0.0, 50.0, 10.0));
        let d = add(&mut engine, rect(60.0, 0.0, 70.0, 10.0));
        engine.select_elements(&[a, b]);
        assert!(engine.copy_selected_elements().success);
        assert!(engine.set_layer_visibility(locked, LayerVisibility::Locked).success);
        let entries = engine.history().len();
        let before = engine.elements().to_vec();
        let message = EngineError::LayerLocked(locked).to_string();

        let added = engine.add_elements(vec![rect(80.0, 0.0, 90.0, 10.0)]);
        assert!(!added.success);
        assert_eq!(added.message, message);

        let moved = engine.move_elements_to_layer(&[a], locked);
        assert!(!moved.success);
        let moved_out = engine.move_elements_to_layer(&[c], base);
        assert!(!moved_out.success);

        assert!(!engine.clear_layer(locked).success);
        assert!(!engine.align_elements(&[a, c], Alignment::Left).success);
        assert!(!engine.bring_to_front(&[d]).success);
        assert!(!engine.flip_elements(&[c], Axis::Horizontal).success);
        assert!(!engine.set_element_info(c, ElementInfo::default()).success);

        let pasted = engine.paste_elements();
        assert!(!pasted.success);
        assert_eq!(pasted.message, message);

        assert_eq!(engine.elements(), before.as_slice());
        assert_eq!(engine.history().len(), entries);

        // Unlocking makes the layer editable again.
        engine.set_layer_visibility(locked, LayerVisibility::Visible);
        assert!(engine.move_elements_to_layer(&[a], locked).success);
        assert!(engine.state().layers.is_consistent_with(engine.elements()));
    }

    #[test]
    fn test_distribute_across_layers_then_undo() {
        let mut engine = engine();
        let a = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        let b = add(&mut engine, rect(20.0, 0.0, 30.0, 10.0));
        engine.create_layer(Some("Second"));
        let c = add(&mut engine, rect(100.0, 0.0, 110.0, 10.0));
        let before = engine.elements().to_vec();

        let result = engine.distribute_elements(&[a, b, c], Axis::Horizontal, None);
        assert!(result.success, "{}", result.message);
        let middle = engine.state().get(b).unwrap().bounds().unwrap();
        assert!((middle.center().x - 55.0).abs() < 1e-9);
        assert!(engine.state().layers.is_consistent_with(engine.elements()));

        engine.undo_last();
        assert_eq!(engine.elements(), before.as_slice());
        assert!(engine.state().layers.is_consistent_with(engine.elements()));
    }

    #[test]
    fn test_reorder_in_layer_then_undo() {
        let mut engine = engine();
        add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        engine.create_layer(Some("Second"));
        let second = engine.active_layer().unwrap().id;
        let x = add(&mut engine, rect(20.0, 0.0, 30.0, 10.0));
        let y = add(&mut engine, rect(40.0, 0.0, 50.0, 10.0));
        let layer_order = |engine: &Engine| -> Vec<ElementId> {
            engine
                .elements()
                .iter()
                .filter(|e| e.layer_id == Some(second))
                .map(|e| e.id)
                .collect()
        };
        assert_eq!(layer_order(&engine), vec![x, y]);

        let result = engine.reorder_elements_in_layer(second, &[x], ZOrder::BringToFront);
        assert!(result.success, "{}", result.message);
        assert_eq!(layer_order(&engine), vec![y, x]);
        assert!(engine.state().layers.is_consistent_with(engine.elements()));

        engine.undo_last();
        assert_eq!(layer_order(&engine), vec![x, y]);
        assert!(engine.state().layers.is_consistent_with(engine.elements()));
    }

    #[test]
    fn test_sync_state_lifecycle() {
        let mut engine = engine();
        let fresh = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        engine.select_elements(&[fresh]);
        engine.delete_selected_elements();
        assert!(engine.state().get(fresh).is_none());
        assert!(engine.get_deleted_elements().is_empty());

        let kept = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        let other = add(&mut engine, rect(50.0, 0.0, 60.0, 10.0));
        engine.mark_all_elements_as_saved();
        assert_eq!(engine.get_sync_state_stats().saved, 2);

        engine.flip_elements(&[kept, other], Axis::Horizontal);
        assert_eq!(engine.get_edited_elements().len(), 2);
        engine.select_elements(&[other]);
        engine.delete_selected_elements();
        let deleted = engine.get_deleted_elements();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, other);
        assert_eq!(engine.state().get(kept).unwrap().sync_state, SyncState::Edited);

        engine.mark_all_elements_as_saved();
        assert!(engine.get_deleted_elements().is_empty());
        assert_eq!(engine.state().get(kept).unwrap().sync_state, SyncState::Saved);
    }

    #[test]
    fn test_mark_saved_is_not_undoable() {
        let mut engine = engine();
        let id = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        let entries = engine.history().len();

        let result = engine.mark_all_elements_as_saved();
        assert!(result.success);
        assert_eq!(engine.history().len(), entries);
        assert_eq!(engine.state().get(id).unwrap().sync_state, SyncState::Saved);

        // Undo skips the acknowledgement and removes the element itself.
        engine.undo_last();
        assert!(engine.state().get(id).is_none());
        assert!(!engine.can_undo());
    }

    #[test]
    fn test_matrix_encoding_scenario() {
        let mut engine = engine();
        add(&mut engine, line(0.0, 0.0, 2.0, 0.0));
        let matrix = engine.generate_matrix();
        assert_eq!((matrix.width, matrix.height), (1280, 720));
        for x in 0..3 {
            assert_eq!(matrix.get(x, 0), Some(1));
        }
        assert_eq!(matrix.filled_cells(), 3);
    }

    #[test]
    fn test_hidden_layer_left_out_of_matrix() {
        let mut engine = engine();
        add(&mut engine, line(0.0, 0.0, 2.0, 0.0));
        let layer = engine.layers()[0].id;
        engine.set_layer_visibility(layer, LayerVisibility::Hidden);
        assert!(!engine.is_layer_rendered(layer));
        assert_eq!(engine.generate_matrix().filled_cells(), 0);
    }

    #[test]
    fn test_clipboard_paste_offsets_accumulate() {
        let mut engine = engine();
        let a = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        engine.select_elements(&[a]);
        assert!(engine.copy_selected_elements().success);
        let first = engine.paste_elements().affected_elements[0];
        let second = engine.paste_elements().affected_elements[0];
        let origin = |id| engine.state().get(id).unwrap().bounds().unwrap().origin();
        assert_eq!(origin(first), Point::new(20.0, 20.0));
        assert_eq!(origin(second), Point::new(40.0, 40.0));
        assert_eq!(engine.selected(), &[second]);
        assert_eq!(engine.get_new_elements().len(), 3);
    }

    #[test]
    fn test_cut_and_empty_paste() {
        let mut engine = engine();
        assert!(!engine.paste_elements().success);
        let a = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        engine.select_elements(&[a]);
        assert!(engine.cut_selected_elements().success);
        assert!(engine.elements().is_empty());
        assert!(engine.paste_elements().success);
        assert_eq!(engine.elements().len(), 1);
    }

    #[test]
    fn test_duplicate_and_group() {
        let mut engine = engine();
        let a = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        let b = add(&mut engine, rect(20.0, 0.0, 30.0, 10.0));
        assert!(engine.group_elements(&[a, b]).success);
        assert_eq!(engine.state().groups.len(), 1);
        engine.select_elements(&[a, b]);
        engine.duplicate_selected_elements();
        assert_eq!(engine.elements().len(), 4);
        // Copies form their own group.
        assert_eq!(engine.state().groups.len(), 2);
        assert!(engine.ungroup_elements(&[a]).success);
        assert_eq!(engine.state().groups.len(), 1);
    }

    #[test]
    fn test_events_for_layer_action_and_history() {
        let mut engine = engine();
        let events = record_events(&engine);
        engine.create_layer(None);
        let events = events.borrow();
        assert!(events.iter().any(|e| matches!(e, EngineEvent::LayerAction { action, .. } if action == "create_layer")));
        assert!(events.iter().any(|e| matches!(e, EngineEvent::HistoryChanged { stats } if stats.total_entries == 1)));
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::StateChanged {
                operation: Some(Operation::CreateLayer),
                ..
            }
        )));
    }

    #[test]
    fn test_undo_emits_state_change_without_recording() {
        let mut engine = engine();
        add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        let events = record_events(&engine);
        engine.undo_last();
        assert_eq!(engine.get_history_stats().total_entries, 1);
        assert!(events.borrow().iter().any(|e| matches!(e, EngineEvent::StateChanged { operation: None, .. })));
    }

    #[test]
    fn test_go_to_position() {
        let mut engine = engine();
        add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        add(&mut engine, rect(20.0, 0.0, 30.0, 10.0));
        add(&mut engine, rect(40.0, 0.0, 50.0, 10.0));
        assert!(engine.go_to_position(None).success);
        assert!(engine.elements().is_empty());
        assert!(engine.go_to_position(Some(1)).success);
        assert_eq!(engine.elements().len(), 2);
        assert!(!engine.go_to_position(Some(7)).success);
        assert_eq!(engine.elements().len(), 2);
        assert_eq!(engine.get_history_entries().len(), 3);
    }

    #[test]
    fn test_go_to_initial_on_empty_history_warns() {
        let mut engine = engine();
        let events = record_events(&engine);
        assert!(!engine.go_to_position(None).success);
        let levels: Vec<FeedbackLevel> = events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Feedback { level, .. } => Some(*level),
                _ => None,
            })
            .collect();
        assert_eq!(levels, vec![FeedbackLevel::Warning]);
    }

    #[test]
    fn test_recording_disabled() {
        let mut engine = engine();
        engine.set_recording_enabled(false);
        add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        assert!(!engine.can_undo());
        engine.set_recording_enabled(true);
        add(&mut engine, rect(20.0, 0.0, 30.0, 10.0));
        assert!(engine.can_undo());
        engine.clear_history();
        assert!(!engine.can_undo());
    }

    #[test]
    fn test_set_element_info_emits_annotation() {
        let mut engine = engine();
        let events = record_events(&engine);
        let a = add(&mut engine, line(0.0, 0.0, 100.0, 0.0));
        let info = ElementInfo {
            name: "Gate A".to_string(),
            ..ElementInfo::default()
        };
        assert!(engine.set_element_info(a, info).success);
        assert_eq!(engine.state().get(a).unwrap().info.name, "Gate A");
        assert!(events.borrow().iter().any(|e| matches!(e, EngineEvent::Annotation { element_id, .. } if *element_id == a)));
        assert!(!engine.set_element_info(uuid::Uuid::new_v4(), ElementInfo::default()).success);
    }

    #[test]
    fn test_media_events() {
        let mut engine = engine();
        let events = record_events(&engine);
        assert!(engine.media_ready(Size::new(1920.0, 1080.0)).success);
        assert!(engine.state().media_loaded);
        let native = engine.resolution().to_native_space(Point::new(640.0, 360.0));
        assert!((native - Point::new(960.0, 540.0)).hypot() < 1e-9);

        assert!(!engine.media_failed("decode error").success);
        assert!(!engine.state().media_loaded);
        assert!(!engine.resize(Size::new(-1.0, 10.0)).success);
        let events = events.borrow();
        assert!(events.iter().any(|e| matches!(e, EngineEvent::MediaFailed { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Feedback {
                level: FeedbackLevel::Error,
                ..
            }
        )));
    }

    #[test]
    fn test_export_snapshot() {
        let mut engine = engine();
        add(&mut engine, line(0.0, 0.0, 100.0, 0.0));
        let frame = pollster::block_on(engine.export_snapshot(&MatrixPngExporter::new())).unwrap();
        assert_eq!((frame.width, frame.height), (1280, 720));
        assert!(frame.bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn test_document_round_trip_and_load() {
        let mut engine = engine();
        let a = add(&mut engine, rect(0.0, 0.0, 10.0, 10.0));
        let json = engine.export_document().unwrap();

        let mut other = self::engine();
        assert!(other.load_document(&json).success);
        assert_eq!(other.elements().len(), 1);
        assert_eq!(other.elements()[0].id, a);
        assert!(other.state().layers.is_consistent_with(other.elements()));
        assert!(other.undo_last().success);
        assert!(other.elements().is_empty());
        assert!(!other.load_document("{ not json").success);
    }

    #[test]
    fn test_add_elements_rejects_degenerate() {
        let mut engine = engine();
        let single = Element::new(ElementKind::Area, vec![Point::new(0.0, 0.0)]);
        assert!(!engine.add_elements(vec![single]).success);
        let area = Element::new(
            ElementKind::Area,
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(5.0, 10.0)],
        );
        let id = add(&mut engine, area);
        let stored = engine.state().get(id).unwrap();
        assert!(stored.completed);
        assert!(point_in_polygon(Point::new(5.0, 3.0), &stored.points));
    }

    #[test]
    fn test_set_mode_records_and_emits() {
        let mut engine = engine();
        let events = record_events(&engine);
        engine.set_drawing_mode(DrawingMode::Rectangle);
        assert_eq!(engine.mode(), DrawingMode::Rectangle);
        assert!(events.borrow().iter().any(|e| matches!(
            e,
            EngineEvent::ModeChange {
                from: DrawingMode::Cursor,
                to: DrawingMode::Rectangle
            }
        )));
        engine.undo_last();
        assert_eq!(engine.mode(), DrawingMode::Cursor);
    }
}
