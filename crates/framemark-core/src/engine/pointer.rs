//! Pointer-driven drawing, picking and dragging.
//!
//! Drags edit element geometry in place for live feedback; the result is
//! published once, on release, against the snapshot taken at press time.

use super::Engine;
use crate::actions;
use crate::error::{EngineError, EngineResult, OpResult};
use crate::events::EngineEvent;
use crate::history::Operation;
use crate::input::{Modifiers, MouseButton, PointerEvent};
use crate::selection::{DragState, DragTarget, Handle, drag_point, hit_test_handles};
use crate::shapes::{Element, ElementId};
use crate::tools::DrawingMode;
use kurbo::Point;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

impl Engine {
    /// Feed a pointer event in display coordinates.
    pub fn handle_pointer_event(&mut self, event: PointerEvent) {
        let double = self.input.handle_pointer_event(event);
        self.route_pointer(event, double);
    }

    /// [`Self::handle_pointer_event`] with an explicit timestamp.
    pub fn handle_pointer_event_at(&mut self, event: PointerEvent, now: Instant) {
        let double = self.input.handle_pointer_event_at(event, now);
        self.route_pointer(event, double);
    }

    fn route_pointer(&mut self, event: PointerEvent, double: bool) {
        let display = event.position();
        let target = self.resolution.to_target_space(display);
        match event {
            PointerEvent::Down { button, modifiers, .. } => {
                self.emit(EngineEvent::MouseDown { display, target });
                if button != MouseButton::Left {
                    return;
                }
                if double {
                    self.emit(EngineEvent::DoubleClick { display, target });
                    if self.state.in_progress.as_ref().is_some_and(|e| e.kind.is_multi_point()) {
                        self.complete_drawing();
                        return;
                    }
                }
                self.pointer_down(target, modifiers);
            }
            PointerEvent::Move { modifiers, .. } => {
                self.emit(EngineEvent::MouseMove { display, target });
                self.pointer_move(target, modifiers);
            }
            PointerEvent::Up { button, modifiers, .. } => {
                self.emit(EngineEvent::MouseUp { display, target });
                if button == MouseButton::Left {
                    self.pointer_up(target, modifiers);
                }
            }
        }
    }

    fn pointer_down(&mut self, target: Point, modifiers: Modifiers) {
        match self.state.mode {
            DrawingMode::Erase => self.erase_at(target),
            DrawingMode::Cursor | DrawingMode::Select => self.pick(target, modifiers),
            mode => self.draw_down(mode, target),
        }
    }

    fn pointer_move(&mut self, target: Point, modifiers: Modifiers) {
        if self.state.drawing {
            if let Some(element) = self.state.in_progress.as_mut() {
                self.tools.update(element, target, modifiers.shift);
            }
        } else if self.state.in_progress.is_some() {
            self.tools.hover(target);
        } else if self.state.drag.is_some() {
            self.update_drag(target);
        }
    }

    fn pointer_up(&mut self, target: Point, modifiers: Modifiers) {
        if self.state.drawing {
            if let Some(element) = self.state.in_progress.as_mut() {
                self.tools.update(element, target, modifiers.shift);
            }
            self.complete_drawing();
            return;
        }
        if let Some(drag) = self.state.drag.take() {
            self.finish_drag(drag);
        }
    }

    // --- drawing ----------------------------------------------------------

    fn draw_down(&mut self, mode: DrawingMode, target: Point) {
        if let Some(element) = self.state.in_progress.as_mut() {
            if element.kind.is_multi_point() {
                self.tools.add_point(element, target);
            }
            return;
        }
        if let Some(element) = self.tools.begin(mode, target) {
            self.state.drawing = !element.kind.is_multi_point();
            self.state.in_progress = Some(element);
        }
    }

    /// Finish the element being drawn. Areas and curves stay open when they
    /// have too few points; degenerate two-point shapes are discarded.
    pub fn complete_drawing(&mut self) -> OpResult {
        let result = self.try_complete_drawing();
        self.finish("complete_drawing", result)
    }

    fn try_complete_drawing(&mut self) -> EngineResult<OpResult> {
        let element = self.state.in_progress.take().ok_or(EngineError::NotDrawing)?;
        self.state.drawing = false;
        let kind = element.kind;
        if kind.is_multi_point() && !element.has_enough_points() {
            let found = element.points.len();
            self.state.in_progress = Some(element);
            return Err(EngineError::NotEnoughPoints {
                required: kind.min_points(),
                found,
            });
        }
        let element = self
            .tools
            .finish(element, self.config.gate_half_length)
            .ok_or_else(|| EngineError::DegenerateElement(kind.name().to_string()))?;
        self.insert_elements(vec![element], &format!("Draw {}", kind.name()))
    }

    /// Drop the in-progress element and any drag, restoring pre-drag
    /// geometry. Returns whether anything was discarded.
    pub(super) fn discard_gesture(&mut self) -> bool {
        let mut discarded = self.state.in_progress.is_some();
        if let Some(drag) = self.state.drag.take() {
            // Live drag edits were never published.
            self.state.elements = drag.before.elements;
            self.state.selected = drag.before.selected;
            self.state.rebuild_groups();
            discarded = true;
        }
        self.state.clear_transient();
        self.tools.cancel();
        discarded
    }

    pub fn cancel_drawing(&mut self) -> OpResult {
        if !self.discard_gesture() {
            return OpResult::ok("Nothing to cancel");
        }
        self.emit(EngineEvent::StateChanged {
            operation: None,
            element_count: self.state.elements.len(),
            selected_count: self.state.selected.len(),
        });
        self.finish("cancel_drawing", Ok(OpResult::ok("Cancelled")))
    }

    // --- picking ----------------------------------------------------------

    /// Handle under the pointer, preferring selected elements. In select
    /// mode only selected elements expose handles.
    fn handle_at(&self, point: Point, tolerance: f64) -> Option<(ElementId, Handle)> {
        let candidates: Vec<&Element> = self
            .state
            .paint_order()
            .into_iter()
            .rev()
            .filter(|e| self.state.layers.is_element_editable(e))
            .collect();
        let selected = candidates.iter().filter(|e| self.state.is_selected(e.id));
        let unselected = candidates
            .iter()
            .filter(|e| self.state.mode == DrawingMode::Cursor && !self.state.is_selected(e.id));
        selected
            .chain(unselected)
            .find_map(|e| hit_test_handles(e, point, tolerance).map(|h| (e.id, h)))
    }

    fn pick(&mut self, target: Point, modifiers: Modifiers) {
        let handle_tolerance = self.resolution.display_length_to_target(self.config.handle_tolerance);
        if !modifiers.shift {
            if let Some((id, handle)) = self.handle_at(target, handle_tolerance) {
                if !self.state.is_selected(id) {
                    self.set_selection(vec![id]);
                }
                self.begin_drag(Some(id), DragTarget::Point(handle.target), target);
                return;
            }
        }

        let tolerance = self.resolution.display_length_to_target(self.config.hit_tolerance);
        let Some(hit) = self.state.element_at(target, tolerance) else {
            if !modifiers.shift && !self.state.selected.is_empty() {
                self.set_selection(Vec::new());
            }
            return;
        };

        let members = self.state.group_members(hit);
        if modifiers.shift {
            let mut selected = self.state.selected.clone();
            if self.state.is_selected(hit) {
                selected.retain(|id| !members.contains(id));
            } else {
                selected.extend(members.into_iter().filter(|id| !self.state.is_selected(*id)));
            }
            self.set_selection(selected);
            return;
        }
        if !self.state.is_selected(hit) {
            self.set_selection(members);
        }
        if self.state.mode == DrawingMode::Select {
            self.begin_drag(None, DragTarget::Selection, target);
        }
    }

    fn erase_at(&mut self, target: Point) {
        let tolerance = self.resolution.display_length_to_target(self.config.hit_tolerance);
        let Some(hit) = self.state.element_at(target, tolerance) else {
            return;
        };
        let mut next = self.state.clone_for_history();
        let deleted = actions::delete_elements(&mut next.elements, &mut next.layers, &[hit]);
        next.selected.retain(|id| !deleted.contains(id));
        self.dispatch(Operation::DeleteElements, "Erase", next);
        self.finish("erase", Ok(OpResult::ok_with("Erased", deleted)));
    }

    // --- dragging ---------------------------------------------------------

    fn begin_drag(&mut self, element_id: Option<ElementId>, target: DragTarget, start: Point) {
        let originals: Vec<Element> = match element_id {
            Some(id) => self.state.get(id).cloned().into_iter().collect(),
            None => self.state.selected_elements().into_iter().cloned().collect(),
        };
        if originals.is_empty() {
            return;
        }
        self.state.drag = Some(DragState {
            element_id,
            target,
            start,
            current: start,
            originals,
            before: self.state.clone_for_history(),
        });
    }

    fn snapped(&self, point: Point, dragged: ElementId) -> Point {
        match &self.snap {
            Some(provider) => {
                let others: Vec<&Element> = self.state.visible_elements().filter(|e| e.id != dragged).collect();
                provider.snap(point, dragged, &others).point
            }
            None => point,
        }
    }

    fn update_drag(&mut self, point: Point) {
        let Some(mut drag) = self.state.drag.take() else {
            return;
        };
        drag.current = point;
        match drag.target {
            DragTarget::Point(target) => {
                if let (Some(id), Some(original)) = (drag.element_id, drag.originals.first()) {
                    let to = self.snapped(point, id);
                    let moved = drag_point(original, target, to);
                    if let Some(slot) = self.state.get_mut(id) {
                        *slot = moved;
                    }
                }
            }
            DragTarget::Selection => {
                let offset = drag.offset();
                for original in &drag.originals {
                    let mut moved = original.clone();
                    moved.translate(offset);
                    moved.mark_edited();
                    if let Some(slot) = self.state.get_mut(moved.id) {
                        *slot = moved;
                    }
                }
            }
        }
        self.state.drag = Some(drag);
    }

    fn finish_drag(&mut self, drag: DragState) {
        if !drag.has_moved() {
            return;
        }
        let description = match drag.target {
            DragTarget::Point(_) => "Move point",
            DragTarget::Selection => "Move elements",
        };
        let affected: Vec<ElementId> = drag.originals.iter().map(|e| e.id).collect();
        let next = self.state.clone_for_history();
        self.publish(Some(Operation::UpdateElements), description, drag.before, next);
        self.finish("drag", Ok(OpResult::ok_with(description, affected)));
    }
}
