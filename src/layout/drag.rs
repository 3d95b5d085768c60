//! Drag containment: elements with endpoints nested inside a draggable
//! element are redrawn along with it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::trace;

use crate::geometry::Point;
use crate::host::ElementGeometry;

/// Nested element with its offset from the draggable's origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependentElement {
    pub id: String,
    pub offset: Point,
}

#[derive(Debug, Default)]
pub struct DragManager {
    draggables: BTreeSet<String>,
    dependents: HashMap<String, BTreeMap<String, Point>>,
    endpoint_counts: HashMap<String, usize>,
}

fn relative_offset<G>(host: &G, child: &str, parent: &str) -> Option<Point>
where
    G: ElementGeometry + ?Sized,
{
    let c = host.element_rect(child)?;
    let p = host.element_rect(parent)?;
    Some((c.x - p.x, c.y - p.y))
}

impl DragManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `element` as draggable and picks up its direct children
    /// that already carry endpoints.
    pub fn register_draggable<G>(&mut self, host: &G, element: &str)
    where
        G: ElementGeometry + ?Sized,
    {
        self.draggables.insert(element.to_string());
        let entry = self.dependents.entry(element.to_string()).or_default();
        let mut children: Vec<&String> = self
            .endpoint_counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(id, _)| id)
            .filter(|id| host.parent_of(id).as_deref() == Some(element))
            .collect();
        children.sort();
        for child in children {
            if let Some(offset) = relative_offset(host, child, element) {
                entry.insert(child.clone(), offset);
            }
        }
    }

    /// Counts the endpoint and attaches `element` to its nearest draggable
    /// ancestor.
    pub fn endpoint_added<G>(&mut self, host: &G, element: &str)
    where
        G: ElementGeometry + ?Sized,
    {
        *self.endpoint_counts.entry(element.to_string()).or_insert(0) += 1;

        let mut visited = BTreeSet::new();
        let mut parent = host.parent_of(element);
        while let Some(pid) = parent {
            if !visited.insert(pid.clone()) {
                break;
            }
            if self.draggables.contains(&pid) {
                let entry = self.dependents.entry(pid.clone()).or_default();
                if !entry.contains_key(element)
                    && let Some(offset) = relative_offset(host, element, &pid)
                {
                    trace!(%element, draggable = %pid, "dependent element registered");
                    entry.insert(element.to_string(), offset);
                }
                break;
            }
            parent = host.parent_of(&pid);
        }
    }

    /// Drops `element` from every draggable once its last endpoint is gone.
    pub fn endpoint_deleted(&mut self, element: &str) {
        let Some(count) = self.endpoint_counts.get_mut(element) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.endpoint_counts.remove(element);
            for children in self.dependents.values_mut() {
                children.remove(element);
            }
        }
    }

    pub fn elements_for_draggable(&self, element: &str) -> Vec<DependentElement> {
        self.dependents
            .get(element)
            .map(|children| {
                children
                    .iter()
                    .map(|(id, offset)| DependentElement {
                        id: id.clone(),
                        offset: *offset,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn rename(&mut self, old_id: &str, new_id: &str) {
        if self.draggables.remove(old_id) {
            self.draggables.insert(new_id.to_string());
        }
        if let Some(children) = self.dependents.remove(old_id) {
            self.dependents.insert(new_id.to_string(), children);
        }
        for children in self.dependents.values_mut() {
            if let Some(offset) = children.remove(old_id) {
                children.insert(new_id.to_string(), offset);
            }
        }
        if let Some(count) = self.endpoint_counts.remove(old_id) {
            self.endpoint_counts.insert(new_id.to_string(), count);
        }
    }

    pub fn reset(&mut self) {
        self.draggables.clear();
        self.dependents.clear();
        self.endpoint_counts.clear();
    }
}
