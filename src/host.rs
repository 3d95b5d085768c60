//! Collaborator seams. The engine asks the host where elements are and hands
//! it finished anchor points to draw; it never draws anything itself.

use std::collections::HashMap;

use serde::Serialize;

use crate::anchor::Orientation;
use crate::geometry::{Point, Rect, Timestamp};
use crate::layout::{ConnectionId, EndpointId};

pub trait ElementGeometry {
    /// Current box of the element, or `None` if the host does not know it.
    fn element_rect(&self, element_id: &str) -> Option<Rect>;

    /// Maps a page point into the coordinate space of the element's
    /// containing context (offset parent position and scroll).
    fn adjust_for_ancestors(&self, _element_id: &str, point: Point) -> Point {
        point
    }

    /// Containing element, used to find draggable ancestors.
    fn parent_of(&self, _element_id: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointPaint {
    pub endpoint: EndpointId,
    pub element: String,
    pub point: Point,
    pub orientation: Orientation,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionPaint {
    pub connection: ConnectionId,
    pub source_element: String,
    pub target_element: String,
    pub source: Point,
    pub source_orientation: Orientation,
    pub target: Point,
    pub target_orientation: Orientation,
    pub timestamp: Timestamp,
}

pub trait Painter {
    fn paint_endpoint(&mut self, paint: &EndpointPaint);
    fn paint_connection(&mut self, paint: &ConnectionPaint);
}

pub trait Host: ElementGeometry + Painter {}

impl<T: ElementGeometry + Painter + ?Sized> Host for T {}

/// Offset parent position and scroll applied to points computed for an
/// element.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContainerContext {
    pub offset: Point,
    pub scroll: Point,
}

/// In-memory host: boxes and containment set explicitly, paints recorded.
#[derive(Debug, Default)]
pub struct SceneHost {
    rects: HashMap<String, Rect>,
    parents: HashMap<String, String>,
    containers: HashMap<String, ContainerContext>,
    pub endpoint_paints: Vec<EndpointPaint>,
    pub connection_paints: Vec<ConnectionPaint>,
}

impl SceneHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rect(&mut self, element_id: &str, rect: Rect) {
        self.rects.insert(element_id.to_string(), rect);
    }

    pub fn move_to(&mut self, element_id: &str, x: f32, y: f32) -> bool {
        match self.rects.get_mut(element_id) {
            Some(rect) => {
                rect.x = x;
                rect.y = y;
                true
            }
            None => false,
        }
    }

    pub fn rename(&mut self, old_id: &str, new_id: &str) {
        if let Some(rect) = self.rects.remove(old_id) {
            self.rects.insert(new_id.to_string(), rect);
        }
        if let Some(parent) = self.parents.remove(old_id) {
            self.parents.insert(new_id.to_string(), parent);
        }
        for parent in self.parents.values_mut() {
            if parent == old_id {
                *parent = new_id.to_string();
            }
        }
        if let Some(ctx) = self.containers.remove(old_id) {
            self.containers.insert(new_id.to_string(), ctx);
        }
    }

    pub fn set_parent(&mut self, element_id: &str, parent_id: &str) {
        self.parents
            .insert(element_id.to_string(), parent_id.to_string());
    }

    pub fn set_container(&mut self, element_id: &str, ctx: ContainerContext) {
        self.containers.insert(element_id.to_string(), ctx);
    }

    pub fn element_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rects.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn clear_paints(&mut self) {
        self.endpoint_paints.clear();
        self.connection_paints.clear();
    }

    pub fn last_endpoint_paint(&self, endpoint: EndpointId) -> Option<&EndpointPaint> {
        self.endpoint_paints
            .iter()
            .rev()
            .find(|paint| paint.endpoint == endpoint)
    }

    pub fn last_connection_paint(&self, connection: ConnectionId) -> Option<&ConnectionPaint> {
        self.connection_paints
            .iter()
            .rev()
            .find(|paint| paint.connection == connection)
    }
}

impl ElementGeometry for SceneHost {
    fn element_rect(&self, element_id: &str) -> Option<Rect> {
        self.rects.get(element_id).copied()
    }

    fn adjust_for_ancestors(&self, element_id: &str, point: Point) -> Point {
        match self.containers.get(element_id) {
            Some(ctx) => (
                point.0 - ctx.offset.0 + ctx.scroll.0,
                point.1 - ctx.offset.1 + ctx.scroll.1,
            ),
            None => point,
        }
    }

    fn parent_of(&self, element_id: &str) -> Option<String> {
        self.parents.get(element_id).cloned()
    }
}

impl Painter for SceneHost {
    fn paint_endpoint(&mut self, paint: &EndpointPaint) {
        self.endpoint_paints.push(paint.clone());
    }

    fn paint_connection(&mut self, paint: &ConnectionPaint) {
        self.connection_paints.push(paint.clone());
    }
}
