//! Grouping, alignment, distribution, z-order and flipping.
//!
//! The [`Arranger`] never mutates the document: every operation returns an
//! [`ArrangeResult`] holding the complete new element list, which the
//! engine publishes through its single dispatch point.

use crate::error::{EngineError, EngineResult};
use crate::layers::{LayerId, LayerState};
use crate::shapes::{Element, ElementId, GroupId};
use kurbo::{Affine, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{SystemTime, UNIX_EPOCH};
#[cfg(target_arch = "wasm32")]
use web_time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Right,
    Top,
    Bottom,
    CenterX,
    CenterY,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZOrder {
    BringToFront,
    SendToBack,
    BringForward,
    SendBackward,
}

/// A set of elements sharing a `group_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub element_ids: Vec<ElementId>,
    pub bounds: Rect,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Group {
    /// Build a group from its members; `None` if no member has bounds.
    pub fn from_elements(id: GroupId, elements: &[&Element]) -> Option<Self> {
        let bounds = elements.iter().filter_map(|e| e.bounds()).reduce(|a, b| a.union(b))?;
        Some(Self {
            id,
            element_ids: elements.iter().map(|e| e.id).collect(),
            bounds,
            created_at: now_millis(),
            metadata: HashMap::new(),
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What happened to one element.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Moved(Vec2),
    Reordered { from: usize, to: usize },
    Grouped(GroupId),
    Ungrouped(GroupId),
    Flipped(Axis),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementChange {
    pub id: ElementId,
    pub kind: ChangeKind,
}

/// Outcome of an arrangement operation.
#[derive(Debug, Clone)]
pub struct ArrangeResult {
    pub success: bool,
    pub affected_elements: Vec<ElementId>,
    pub changes: Vec<ElementChange>,
    pub message: String,
    /// Full element list after the operation (empty on failure).
    pub elements: Vec<Element>,
    /// The group created by a group operation.
    pub group: Option<Group>,
    pub error: Option<EngineError>,
}

impl ArrangeResult {
    fn from_outcome(outcome: EngineResult<Outcome>) -> Self {
        match outcome {
            Ok(outcome) => Self {
                success: true,
                affected_elements: outcome.changes.iter().map(|c| c.id).collect::<Vec<_>>(),
                changes: outcome.changes,
                message: outcome.message,
                elements: outcome.elements,
                group: outcome.group,
                error: None,
            },
            Err(err) => Self {
                success: false,
                affected_elements: Vec::new(),
                changes: Vec::new(),
                message: err.to_string(),
                elements: Vec::new(),
                group: None,
                error: Some(err),
            },
        }
    }
}

struct Outcome {
    elements: Vec<Element>,
    changes: Vec<ElementChange>,
    message: String,
    group: Option<Group>,
}

/// Pure arrangement operations over an element list.
pub struct Arranger<'a> {
    elements: &'a [Element],
    layers: Option<&'a LayerState>,
}

impl<'a> Arranger<'a> {
    pub fn new(elements: &'a [Element]) -> Self {
        Self { elements, layers: None }
    }

    /// Enable the `*_in_layer` variants.
    pub fn with_layers(mut self, layers: &'a LayerState) -> Self {
        self.layers = Some(layers);
        self
    }

    /// Indices of the live elements named by `ids`, in list order.
    ///
    /// Elements of locked layers cannot be arranged.
    fn targets(&self, ids: &[ElementId]) -> EngineResult<Vec<usize>> {
        let wanted: HashSet<ElementId> = ids.iter().copied().collect();
        let targets: Vec<usize> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| wanted.contains(&e.id) && !e.is_deleted())
            .map(|(i, _)| i)
            .collect();
        if let Some(layers) = self.layers {
            layers.ensure_unlocked(targets.iter().map(|&i| &self.elements[i]))?;
        }
        Ok(targets)
    }

    fn require(&self, ids: &[ElementId], required: usize) -> EngineResult<Vec<usize>> {
        let targets = self.targets(ids)?;
        if targets.len() < required {
            return Err(EngineError::NotEnoughElements {
                required,
                found: targets.len(),
            });
        }
        Ok(targets)
    }

    /// `ids` restricted to live members of `layer`.
    fn scope(&self, layer: LayerId, ids: &[ElementId]) -> EngineResult<Vec<ElementId>> {
        let Some(layers) = self.layers else {
            return Ok(ids.to_vec());
        };
        let members = &layers.get(layer).ok_or(EngineError::LayerNotFound(layer))?.element_ids;
        Ok(ids.iter().copied().filter(|id| members.contains(id)).collect())
    }

    pub fn group(&self, ids: &[ElementId]) -> ArrangeResult {
        ArrangeResult::from_outcome(self.try_group(ids))
    }

    fn try_group(&self, ids: &[ElementId]) -> EngineResult<Outcome> {
        let targets = self.require(ids, 2)?;
        let group_id = Uuid::new_v4();
        let mut elements = self.elements.to_vec();
        let mut changes = Vec::with_capacity(targets.len());
        for &i in &targets {
            let element = &mut elements[i];
            element.group_id = Some(group_id);
            element.mark_edited();
            changes.push(ElementChange {
                id: element.id,
                kind: ChangeKind::Grouped(group_id),
            });
        }
        let members: Vec<&Element> = targets.iter().map(|&i| &elements[i]).collect();
        let group = Group::from_elements(group_id, &members);
        Ok(Outcome {
            message: format!("Grouped {} elements", targets.len()),
            elements,
            changes,
            group,
        })
    }

    /// Dissolve every group touched by `ids`.
    pub fn ungroup(&self, ids: &[ElementId]) -> ArrangeResult {
        ArrangeResult::from_outcome(self.try_ungroup(ids))
    }

    fn try_ungroup(&self, ids: &[ElementId]) -> EngineResult<Outcome> {
        let groups: HashSet<GroupId> = self
            .targets(ids)?
            .into_iter()
            .filter_map(|i| self.elements[i].group_id)
            .collect();
        if groups.is_empty() {
            return Err(EngineError::NothingGrouped);
        }
        let mut elements = self.elements.to_vec();
        let mut changes = Vec::new();
        for element in elements.iter_mut() {
            if let Some(group_id) = element.group_id.filter(|g| groups.contains(g)) {
                element.group_id = None;
                element.mark_edited();
                changes.push(ElementChange {
                    id: element.id,
                    kind: ChangeKind::Ungrouped(group_id),
                });
            }
        }
        Ok(Outcome {
            message: format!("Ungrouped {} groups", groups.len()),
            elements,
            changes,
            group: None,
        })
    }

    pub fn align(&self, ids: &[ElementId], alignment: Alignment) -> ArrangeResult {
        ArrangeResult::from_outcome(self.try_align(ids, alignment))
    }

    fn try_align(&self, ids: &[ElementId], alignment: Alignment) -> EngineResult<Outcome> {
        let bounded: Vec<(usize, Rect)> = self
            .targets(ids)?
            .into_iter()
            .filter_map(|i| self.elements[i].bounds().map(|b| (i, b)))
            .collect();
        if bounded.len() < 2 {
            return Err(EngineError::NotEnoughElements {
                required: 2,
                found: bounded.len(),
            });
        }
        let n = bounded.len() as f64;
        let reference = match alignment {
            Alignment::Left => bounded.iter().map(|(_, b)| b.x0).fold(f64::INFINITY, f64::min),
            Alignment::Right => bounded.iter().map(|(_, b)| b.x1).fold(f64::NEG_INFINITY, f64::max),
            Alignment::Top => bounded.iter().map(|(_, b)| b.y0).fold(f64::INFINITY, f64::min),
            Alignment::Bottom => bounded.iter().map(|(_, b)| b.y1).fold(f64::NEG_INFINITY, f64::max),
            Alignment::CenterX => bounded.iter().map(|(_, b)| b.center().x).sum::<f64>() / n,
            Alignment::CenterY => bounded.iter().map(|(_, b)| b.center().y).sum::<f64>() / n,
        };

        let mut elements = self.elements.to_vec();
        let mut changes = Vec::new();
        for (i, b) in bounded {
            let delta = match alignment {
                Alignment::Left => Vec2::new(reference - b.x0, 0.0),
                Alignment::Right => Vec2::new(reference - b.x1, 0.0),
                Alignment::Top => Vec2::new(0.0, reference - b.y0),
                Alignment::Bottom => Vec2::new(0.0, reference - b.y1),
                Alignment::CenterX => Vec2::new(reference - b.center().x, 0.0),
                Alignment::CenterY => Vec2::new(0.0, reference - b.center().y),
            };
            if let Some(change) = shift(&mut elements[i], delta) {
                changes.push(change);
            }
        }
        Ok(Outcome {
            message: format!("Aligned {:?}", alignment).to_lowercase(),
            elements,
            changes,
            group: None,
        })
    }

    /// Spread elements along an axis between the two outermost ones.
    ///
    /// Without `spacing` the centers are evenly spaced. With it, each
    /// interior element starts `spacing` after the previous one ends.
    pub fn distribute(&self, ids: &[ElementId], axis: Axis, spacing: Option<f64>) -> ArrangeResult {
        ArrangeResult::from_outcome(self.try_distribute(ids, axis, spacing))
    }

    fn try_distribute(&self, ids: &[ElementId], axis: Axis, spacing: Option<f64>) -> EngineResult<Outcome> {
        let mut bounded: Vec<(usize, Rect)> = self
            .targets(ids)?
            .into_iter()
            .filter_map(|i| self.elements[i].bounds().map(|b| (i, b)))
            .collect();
        if bounded.len() < 3 {
            return Err(EngineError::NotEnoughElements {
                required: 3,
                found: bounded.len(),
            });
        }
        let center = |r: &Rect| match axis {
            Axis::Horizontal => r.center().x,
            Axis::Vertical => r.center().y,
        };
        let extent = |r: &Rect| match axis {
            Axis::Horizontal => (r.x0, r.x1),
            Axis::Vertical => (r.y0, r.y1),
        };
        bounded.sort_by(|a, b| center(&a.1).total_cmp(&center(&b.1)));

        let last = bounded.len() - 1;
        let first_center = center(&bounded[0].1);
        let step = (center(&bounded[last].1) - first_center) / last as f64;
        let mut cursor = extent(&bounded[0].1).1;

        let mut elements = self.elements.to_vec();
        let mut changes = Vec::new();
        for (rank, (i, b)) in bounded.iter().enumerate().take(last).skip(1) {
            let offset = match spacing {
                Some(gap) => {
                    let (start, end) = extent(b);
                    let offset = cursor + gap - start;
                    cursor += gap + (end - start);
                    offset
                }
                None => first_center + step * rank as f64 - center(b),
            };
            let delta = match axis {
                Axis::Horizontal => Vec2::new(offset, 0.0),
                Axis::Vertical => Vec2::new(0.0, offset),
            };
            if let Some(change) = shift(&mut elements[*i], delta) {
                changes.push(change);
            }
        }
        Ok(Outcome {
            message: format!("Distributed {} elements", bounded.len()),
            elements,
            changes,
            group: None,
        })
    }

    pub fn z_order(&self, ids: &[ElementId], order: ZOrder) -> ArrangeResult {
        ArrangeResult::from_outcome(self.try_z_order(ids, order, None))
    }

    fn try_z_order(&self, ids: &[ElementId], order: ZOrder, layer: Option<LayerId>) -> EngineResult<Outcome> {
        let selected: HashSet<ElementId> = self.targets(ids)?.into_iter().map(|i| self.elements[i].id).collect();
        if selected.is_empty() {
            return Err(EngineError::NothingSelected);
        }
        // Slots taking part in the reorder: the whole list, or one layer's members.
        let slots: Vec<usize> = match layer {
            Some(layer) => self
                .elements
                .iter()
                .enumerate()
                .filter(|(_, e)| e.layer_id == Some(layer))
                .map(|(i, _)| i)
                .collect(),
            None => (0..self.elements.len()).collect(),
        };
        let mut sequence: Vec<&Element> = slots.iter().map(|&i| &self.elements[i]).collect();
        reorder(&mut sequence, &selected, order);

        let mut elements = self.elements.to_vec();
        let mut changes = Vec::new();
        for (&slot, element) in slots.iter().zip(sequence) {
            if self.elements[slot].id != element.id && selected.contains(&element.id) {
                let from = slots
                    .iter()
                    .copied()
                    .find(|&s| self.elements[s].id == element.id)
                    .unwrap_or(slot);
                changes.push(ElementChange {
                    id: element.id,
                    kind: ChangeKind::Reordered { from, to: slot },
                });
            }
            elements[slot] = element.clone();
        }
        Ok(Outcome {
            message: format!("{:?}", order),
            elements,
            changes,
            group: None,
        })
    }

    /// Mirror each element about its own bounding-box center line.
    pub fn flip(&self, ids: &[ElementId], axis: Axis) -> ArrangeResult {
        ArrangeResult::from_outcome(self.try_flip(ids, axis))
    }

    fn try_flip(&self, ids: &[ElementId], axis: Axis) -> EngineResult<Outcome> {
        let targets = self.require(ids, 1)?;
        let mut elements = self.elements.to_vec();
        let mut changes = Vec::new();
        for i in targets {
            let element = &mut elements[i];
            let Some(center) = element.center() else {
                continue;
            };
            let (sx, sy) = match axis {
                Axis::Horizontal => (-1.0, 1.0),
                Axis::Vertical => (1.0, -1.0),
            };
            let flip = Affine::translate(center.to_vec2())
                * Affine::scale_non_uniform(sx, sy)
                * Affine::translate(-center.to_vec2());
            element.map_points(|p| flip * p);
            element.refresh_direction();
            element.mark_edited();
            changes.push(ElementChange {
                id: element.id,
                kind: ChangeKind::Flipped(axis),
            });
        }
        Ok(Outcome {
            message: format!("Flipped {} elements", changes.len()),
            elements,
            changes,
            group: None,
        })
    }

    pub fn group_in_layer(&self, layer: LayerId, ids: &[ElementId]) -> ArrangeResult {
        ArrangeResult::from_outcome(self.scope(layer, ids).and_then(|ids| self.try_group(&ids)))
    }

    pub fn align_in_layer(&self, layer: LayerId, ids: &[ElementId], alignment: Alignment) -> ArrangeResult {
        ArrangeResult::from_outcome(self.scope(layer, ids).and_then(|ids| self.try_align(&ids, alignment)))
    }

    pub fn distribute_in_layer(
        &self,
        layer: LayerId,
        ids: &[ElementId],
        axis: Axis,
        spacing: Option<f64>,
    ) -> ArrangeResult {
        ArrangeResult::from_outcome(
            self.scope(layer, ids)
                .and_then(|ids| self.try_distribute(&ids, axis, spacing)),
        )
    }

    /// Reorder within one layer: only that layer's slots in the element
    /// list are permuted, everything else keeps its position.
    pub fn z_order_in_layer(&self, layer: LayerId, ids: &[ElementId], order: ZOrder) -> ArrangeResult {
        let scoped = self.scope(layer, ids).and_then(|ids| {
            let layer = self.layers.map(|_| layer);
            self.try_z_order(&ids, order, layer)
        });
        ArrangeResult::from_outcome(scoped)
    }

    pub fn flip_in_layer(&self, layer: LayerId, ids: &[ElementId], axis: Axis) -> ArrangeResult {
        ArrangeResult::from_outcome(self.scope(layer, ids).and_then(|ids| self.try_flip(&ids, axis)))
    }
}

fn shift(element: &mut Element, delta: Vec2) -> Option<ElementChange> {
    if delta.hypot2() < f64::EPSILON {
        return None;
    }
    element.translate(delta);
    element.mark_edited();
    Some(ElementChange {
        id: element.id,
        kind: ChangeKind::Moved(delta),
    })
}

/// Apply a z-order move to a back-to-front sequence.
fn reorder(sequence: &mut Vec<&Element>, selected: &HashSet<ElementId>, order: ZOrder) {
    let is_selected = |e: &Element| selected.contains(&e.id);
    match order {
        ZOrder::BringToFront => {
            let (chosen, rest): (Vec<&Element>, Vec<&Element>) = sequence.iter().copied().partition(|e| is_selected(*e));
            *sequence = rest.into_iter().chain(chosen).collect();
        }
        ZOrder::SendToBack => {
            let (chosen, rest): (Vec<&Element>, Vec<&Element>) = sequence.iter().copied().partition(|e| is_selected(*e));
            *sequence = chosen.into_iter().chain(rest).collect();
        }
        // Scan from the front so an element never hops over another selected one.
        ZOrder::BringForward => {
            for i in (0..sequence.len().saturating_sub(1)).rev() {
                if is_selected(sequence[i]) && !is_selected(sequence[i + 1]) {
                    sequence.swap(i, i + 1);
                }
            }
        }
        ZOrder::SendBackward => {
            for i in 1..sequence.len() {
                if is_selected(sequence[i]) && !is_selected(sequence[i - 1]) {
                    sequence.swap(i, i - 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerState;
    use crate::shapes::{ElementKind, SemanticType, SyncState};
    use kurbo::Point;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Element {
        let mut e = Element::new(ElementKind::Rectangle, vec![Point::new(x0, y0), Point::new(x1, y1)]);
        e.completed = true;
        e
    }

    fn ids(elements: &[Element]) -> Vec<ElementId> {
        elements.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_align_left() {
        let elements = vec![rect(0.0, 0.0, 50.0, 50.0), rect(100.0, 100.0, 150.0, 150.0)];
        let result = Arranger::new(&elements).align(&ids(&elements), Alignment::Left);
        assert!(result.success);
        for e in &result.elements {
            assert!((e.bounds().unwrap().x0).abs() < 1e-9);
        }
        // Only the second element moved, and only along x.
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.elements[1].points[0], Point::new(0.0, 100.0));
    }

    #[test]
    fn test_align_center_uses_mean() {
        let elements = vec![rect(0.0, 0.0, 10.0, 10.0), rect(90.0, 0.0, 110.0, 10.0)];
        let result = Arranger::new(&elements).align(&ids(&elements), Alignment::CenterX);
        for e in &result.elements {
            assert!((e.center().unwrap().x - 52.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_align_moves_gates() {
        let mut line = Element::new(ElementKind::Line, vec![Point::new(20.0, 0.0), Point::new(20.0, 40.0)])
            .with_semantic_type(SemanticType::Detection);
        line.finalize(5.0);
        let elements = vec![rect(0.0, 0.0, 10.0, 10.0), line];
        let result = Arranger::new(&elements).align(&ids(&elements), Alignment::Left);
        let moved = &result.elements[1];
        let gates = moved.detection.as_ref().unwrap();
        assert!((gates.entry[0].x - (-5.0)).abs() < 1e-9 || (gates.entry[1].x - (-5.0)).abs() < 1e-9);
    }

    #[test]
    fn test_align_requires_two() {
        let elements = vec![rect(0.0, 0.0, 10.0, 10.0)];
        let result = Arranger::new(&elements).align(&ids(&elements), Alignment::Top);
        assert!(!result.success);
        assert_eq!(
            result.error,
            Some(EngineError::NotEnoughElements { required: 2, found: 1 })
        );
        assert!(result.elements.is_empty());
    }

    #[test]
    fn test_distribute_even_centers() {
        let elements = vec![
            rect(0.0, 0.0, 10.0, 10.0),
            rect(80.0, 0.0, 90.0, 10.0),
            rect(20.0, 0.0, 30.0, 10.0),
            rect(300.0, 0.0, 310.0, 10.0),
        ];
        let result = Arranger::new(&elements).distribute(&ids(&elements), Axis::Horizontal, None);
        assert!(result.success);
        let centers: Vec<f64> = result.elements.iter().map(|e| e.center().unwrap().x).collect();
        // Ends stay, the interior is spread at 100px steps.
        assert!((centers[0] - 5.0).abs() < 1e-9);
        assert!((centers[3] - 305.0).abs() < 1e-9);
        assert!((centers[2] - 105.0).abs() < 1e-9);
        assert!((centers[1] - 205.0).abs() < 1e-9);
    }

    #[test]
    fn test_distribute_fixed_spacing() {
        let elements = vec![
            rect(0.0, 0.0, 10.0, 10.0),
            rect(0.0, 50.0, 10.0, 70.0),
            rect(0.0, 200.0, 10.0, 210.0),
        ];
        let result = Arranger::new(&elements).distribute(&ids(&elements), Axis::Vertical, Some(5.0));
        let middle = result.elements[1].bounds().unwrap();
        assert!((middle.y0 - 15.0).abs() < 1e-9);
        assert!((middle.y1 - 35.0).abs() < 1e-9);
        assert!((result.elements[2].bounds().unwrap().y0 - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_distribute_requires_three() {
        let elements = vec![rect(0.0, 0.0, 1.0, 1.0), rect(5.0, 0.0, 6.0, 1.0)];
        let result = Arranger::new(&elements).distribute(&ids(&elements), Axis::Horizontal, None);
        assert!(!result.success);
    }

    #[test]
    fn test_z_order_front_and_back() {
        let elements: Vec<Element> = (0..4).map(|i| rect(i as f64, 0.0, i as f64 + 1.0, 1.0)).collect();
        let all = ids(&elements);
        let arranger = Arranger::new(&elements);

        let front = arranger.z_order(&[all[0], all[2]], ZOrder::BringToFront);
        assert_eq!(ids(&front.elements), vec![all[1], all[3], all[0], all[2]]);

        let back = arranger.z_order(&[all[3]], ZOrder::SendToBack);
        assert_eq!(ids(&back.elements), vec![all[3], all[0], all[1], all[2]]);
    }

    #[test]
    fn test_bring_forward_does_not_double_move() {
        let elements: Vec<Element> = (0..4).map(|i| rect(i as f64, 0.0, i as f64 + 1.0, 1.0)).collect();
        let all = ids(&elements);
        let result = Arranger::new(&elements).z_order(&[all[0], all[1]], ZOrder::BringForward);
        assert_eq!(ids(&result.elements), vec![all[2], all[0], all[1], all[3]]);

        let result = Arranger::new(&elements).z_order(&[all[2], all[3]], ZOrder::SendBackward);
        assert_eq!(ids(&result.elements), vec![all[0], all[2], all[3], all[1]]);
    }

    #[test]
    fn test_z_order_in_layer_keeps_other_slots() {
        let mut layers = LayerState::with_default_layer("A");
        let other = crate::layers::Layer::new("B", crate::shapes::SerializableColor::black());
        let other_id = other.id;
        layers.layers.push(other);
        let a = layers.layers[0].id;

        let mut elements: Vec<Element> = (0..4).map(|i| rect(i as f64, 0.0, i as f64 + 1.0, 1.0)).collect();
        // Slots 0 and 2 belong to A, 1 and 3 to B.
        for (i, e) in elements.iter_mut().enumerate() {
            e.layer_id = Some(if i % 2 == 0 { a } else { other_id });
        }
        let all = ids(&elements);
        layers.adopt(&mut elements);

        let result = Arranger::new(&elements)
            .with_layers(&layers)
            .z_order_in_layer(a, &[all[0]], ZOrder::BringToFront);
        assert!(result.success);
        assert_eq!(ids(&result.elements), vec![all[2], all[1], all[0], all[3]]);

        // Ids outside the layer are ignored.
        let result = Arranger::new(&elements)
            .with_layers(&layers)
            .z_order_in_layer(a, &[all[1]], ZOrder::BringToFront);
        assert!(!result.success);
    }

    #[test]
    fn test_in_layer_unknown_layer_fails() {
        let layers = LayerState::with_default_layer("A");
        let elements = vec![rect(0.0, 0.0, 1.0, 1.0), rect(5.0, 0.0, 6.0, 1.0)];
        let missing = Uuid::new_v4();
        let result = Arranger::new(&elements)
            .with_layers(&layers)
            .align_in_layer(missing, &ids(&elements), Alignment::Left);
        assert_eq!(result.error, Some(EngineError::LayerNotFound(missing)));
    }

    #[test]
    fn test_in_layer_without_layers_falls_back() {
        let elements = vec![rect(0.0, 0.0, 10.0, 10.0), rect(20.0, 20.0, 30.0, 30.0)];
        let result = Arranger::new(&elements).align_in_layer(Uuid::new_v4(), &ids(&elements), Alignment::Top);
        assert!(result.success);
        assert!((result.elements[1].bounds().unwrap().y0).abs() < 1e-9);
    }

    #[test]
    fn test_group_and_ungroup() {
        let mut elements = vec![rect(0.0, 0.0, 10.0, 10.0), rect(20.0, 20.0, 30.0, 30.0), rect(50.0, 0.0, 60.0, 5.0)];
        elements[0].sync_state = SyncState::Saved;
        let all = ids(&elements);
        let result = Arranger::new(&elements).group(&all[..2]);
        assert!(result.success);
        let group = result.group.clone().unwrap();
        assert_eq!(group.bounds, Rect::new(0.0, 0.0, 30.0, 30.0));
        assert_eq!(result.elements[0].group_id, Some(group.id));
        assert_eq!(result.elements[0].sync_state, SyncState::Edited);
        assert_eq!(result.elements[2].group_id, None);

        // Ungrouping via one member dissolves the whole group.
        let ungrouped = Arranger::new(&result.elements).ungroup(&all[..1]);
        assert!(ungrouped.success);
        assert!(ungrouped.elements.iter().all(|e| e.group_id.is_none()));
        assert_eq!(ungrouped.changes.len(), 2);

        let none = Arranger::new(&elements).ungroup(&all);
        assert_eq!(none.error, Some(EngineError::NothingGrouped));
    }

    #[test]
    fn test_group_requires_two() {
        let elements = vec![rect(0.0, 0.0, 10.0, 10.0)];
        let result = Arranger::new(&elements).group(&ids(&elements));
        assert!(!result.success);
    }

    #[test]
    fn test_flip_about_own_center() {
        let line = {
            let mut e = Element::new(ElementKind::Line, vec![Point::new(0.0, 0.0), Point::new(10.0, 20.0)]);
            e.finalize(5.0);
            e
        };
        let elements = vec![line];
        let result = Arranger::new(&elements).flip(&ids(&elements), Axis::Horizontal);
        let flipped = &result.elements[0];
        assert!(flipped.points[0].distance(Point::new(10.0, 0.0)) < 1e-9);
        assert!(flipped.points[1].distance(Point::new(0.0, 20.0)) < 1e-9);
        assert_eq!(flipped.bounds(), elements[0].bounds());
        assert_eq!(flipped.direction.unwrap().end, flipped.points[1]);

        let result = Arranger::new(&elements).flip(&ids(&elements), Axis::Vertical);
        assert!(result.elements[0].points[0].distance(Point::new(0.0, 20.0)) < 1e-9);
    }
}
