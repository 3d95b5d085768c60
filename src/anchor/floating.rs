use crate::geometry::Point;

use super::{ComputeParams, Orientation};

/// Anchor that follows a drag proxy while a connection end is being moved.
#[derive(Debug, Clone)]
pub struct FloatingAnchor {
    reference_orientation: Orientation,
    reference_location: Option<Point>,
    direction: (f32, f32),
    hover: Option<Orientation>,
    last: Option<Point>,
}

fn sign(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl FloatingAnchor {
    /// `reference_orientation` and `reference_location` describe the anchor
    /// the floating end was dragged away from.
    pub fn new(reference_orientation: Orientation, reference_location: Option<Point>) -> Self {
        Self {
            reference_orientation,
            reference_location,
            direction: (0.0, 0.0),
            hover: None,
            last: None,
        }
    }

    /// Center of the proxy element.
    pub fn compute(&mut self, params: &ComputeParams<'_>) -> Point {
        let point = (params.adjust)(params.element.center());
        if let Some((rx, ry)) = self.reference_location {
            self.direction = (sign(point.0 - rx), sign(point.1 - ry));
        }
        self.last = Some(point);
        point
    }

    pub fn orientation(&self) -> Orientation {
        if let Some(orientation) = self.hover {
            return orientation;
        }
        let (ox, oy) = self.reference_orientation;
        (
            ox.abs() * self.direction.0 * -1.0,
            oy.abs() * self.direction.1 * -1.0,
        )
    }

    /// Hovering a candidate drop anchor: borrow its orientation.
    pub fn over(&mut self, orientation: Orientation) {
        self.hover = Some(orientation);
    }

    pub fn out(&mut self) {
        self.hover = None;
    }

    pub fn is_hovering(&self) -> bool {
        self.hover.is_some()
    }

    pub fn current_location(&self) -> Option<Point> {
        self.last
    }
}
