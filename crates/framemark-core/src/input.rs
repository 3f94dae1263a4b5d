//! Pointer state tracking in display space.

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const SHIFT: Self = Self {
        shift: true,
        ctrl: false,
        alt: false,
        meta: false,
    };

    /// Ctrl on most platforms, Cmd on macOS.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Pointer input delivered by the host, in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerEvent {
    Down {
        position: Point,
        button: MouseButton,
        #[serde(default)]
        modifiers: Modifiers,
    },
    Up {
        position: Point,
        button: MouseButton,
        #[serde(default)]
        modifiers: Modifiers,
    },
    Move {
        position: Point,
        #[serde(default)]
        modifiers: Modifiers,
    },
}

impl PointerEvent {
    pub fn position(&self) -> Point {
        match self {
            PointerEvent::Down { position, .. }
            | PointerEvent::Up { position, .. }
            | PointerEvent::Move { position, .. } => *position,
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        match self {
            PointerEvent::Down { modifiers, .. }
            | PointerEvent::Up { modifiers, .. }
            | PointerEvent::Move { modifiers, .. } => *modifiers,
        }
    }
}

/// Double-click detection constants.
const DOUBLE_CLICK_TIME_MS: u128 = 500;
const DOUBLE_CLICK_DISTANCE: f64 = 5.0;

/// Tracks buttons, modifiers and click timing between events.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    /// Current pointer position in display coordinates.
    pub pointer_position: Point,
    pressed_buttons: HashSet<MouseButton>,
    pub modifiers: Modifiers,
    /// Start position of the current left-button press.
    pub drag_start: Option<Point>,
    last_click_time: Option<Instant>,
    last_click_position: Option<Point>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a pointer event. Returns true when a left press completes a
    /// double-click.
    pub fn handle_pointer_event(&mut self, event: PointerEvent) -> bool {
        self.handle_pointer_event_at(event, Instant::now())
    }

    /// [`Self::handle_pointer_event`] with an explicit timestamp.
    pub fn handle_pointer_event_at(&mut self, event: PointerEvent, now: Instant) -> bool {
        self.modifiers = event.modifiers();
        self.pointer_position = event.position();
        match event {
            PointerEvent::Down { position, button, .. } => {
                self.pressed_buttons.insert(button);
                if button != MouseButton::Left {
                    return false;
                }
                self.drag_start = Some(position);
                let double = match (self.last_click_time, self.last_click_position) {
                    (Some(last_time), Some(last_pos)) => {
                        now.saturating_duration_since(last_time).as_millis() < DOUBLE_CLICK_TIME_MS
                            && position.distance(last_pos) < DOUBLE_CLICK_DISTANCE
                    }
                    _ => false,
                };
                if double {
                    // Reset so a triple-click is not a second double-click.
                    self.last_click_time = None;
                    self.last_click_position = None;
                } else {
                    self.last_click_time = Some(now);
                    self.last_click_position = Some(position);
                }
                double
            }
            PointerEvent::Up { button, .. } => {
                self.pressed_buttons.remove(&button);
                if button == MouseButton::Left {
                    self.drag_start = None;
                }
                false
            }
            PointerEvent::Move { .. } => false,
        }
    }

    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    /// Pointer movement since the left button went down.
    pub fn drag_delta(&self) -> Option<Vec2> {
        self.drag_start.map(|start| self.pointer_position - start)
    }

    /// Forget pressed buttons and click history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
