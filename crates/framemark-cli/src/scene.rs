//! Scene files: a frame size plus a script of engine operations.

use framemark_core::{
    Alignment, Axis, DrawingMode, Element, ElementKind, Engine, OpResult, PointerEvent, SemanticType,
    SerializableColor, ZOrder,
};
use kurbo::{Point, Size};
use serde::Deserialize;

/// An element given by its geometry only.
#[derive(Debug, Clone, Deserialize)]
pub struct SceneElement {
    pub kind: ElementKind,
    pub points: Vec<Point>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub name: Option<String>,
}

impl SceneElement {
    fn into_element(self) -> Element {
        let mut element = Element::new(self.kind, self.points).with_semantic_type(self.semantic_type);
        element.color = self
            .color
            .as_deref()
            .and_then(SerializableColor::from_hex)
            .unwrap_or_else(SerializableColor::annotation);
        if let Some(name) = self.name {
            element.info.name = name;
        }
        element
    }
}

/// One scripted operation. Arrangement steps act on the current selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneStep {
    SetMode { mode: DrawingMode },
    SetSemanticType { semantic_type: SemanticType },
    Pointer { event: PointerEvent },
    Complete,
    Cancel,
    Add { elements: Vec<SceneElement> },
    SelectAll,
    ClearSelection,
    DeleteSelected,
    Duplicate,
    Align { alignment: Alignment },
    Distribute {
        axis: Axis,
        #[serde(default)]
        spacing: Option<f64>,
    },
    Reorder { order: ZOrder },
    Flip { axis: Axis },
    Group,
    Ungroup,
    CreateLayer {
        #[serde(default)]
        name: Option<String>,
    },
    Undo,
    Redo,
    MarkSaved,
}

/// A replayable scene.
#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    /// Host surface size the pointer events are expressed in.
    pub display: Size,
    /// Media frame size; defaults to the display size.
    #[serde(default)]
    pub native: Option<Size>,
    #[serde(default)]
    pub steps: Vec<SceneStep>,
}

impl Scene {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Run every step. Returns the number of steps that reported failure.
    pub fn replay(self, engine: &mut Engine) -> usize {
        let mut failures = 0;
        for (index, step) in self.steps.into_iter().enumerate() {
            if let Some(result) = apply_step(engine, step) {
                if !result.success {
                    log::warn!("Step {} failed: {}", index, result.message);
                    failures += 1;
                }
            }
        }
        failures
    }
}

fn apply_step(engine: &mut Engine, step: SceneStep) -> Option<OpResult> {
    let selected = engine.selected().to_vec();
    let result = match step {
        SceneStep::SetMode { mode } => engine.set_drawing_mode(mode),
        SceneStep::SetSemanticType { semantic_type } => {
            engine.set_semantic_type(semantic_type);
            return None;
        }
        SceneStep::Pointer { event } => {
            engine.handle_pointer_event(event);
            return None;
        }
        SceneStep::Complete => engine.complete_drawing(),
        SceneStep::Cancel => engine.cancel_drawing(),
        SceneStep::Add { elements } => {
            engine.add_elements(elements.into_iter().map(SceneElement::into_element).collect())
        }
        SceneStep::SelectAll => engine.select_all_elements(),
        SceneStep::ClearSelection => engine.clear_selection(),
        SceneStep::DeleteSelected => engine.delete_selected_elements(),
        SceneStep::Duplicate => engine.duplicate_selected_elements(),
        SceneStep::Align { alignment } => engine.align_elements(&selected, alignment),
        SceneStep::Distribute { axis, spacing } => engine.distribute_elements(&selected, axis, spacing),
        SceneStep::Reorder { order } => engine.reorder_elements(&selected, order),
        SceneStep::Flip { axis } => engine.flip_elements(&selected, axis),
        SceneStep::Group => engine.group_elements(&selected),
        SceneStep::Ungroup => engine.ungroup_elements(&selected),
        SceneStep::CreateLayer { name } => engine.create_layer(name.as_deref()),
        SceneStep::Undo => engine.undo_last(),
        SceneStep::Redo => engine.redo_last(),
        SceneStep::MarkSaved => engine.mark_all_elements_as_saved(),
    };
    Some(result)
}
