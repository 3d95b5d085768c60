//! Anchors map an element's box to an absolute attachment point plus the
//! direction a connector should leave that point in.

pub mod dynamic;
pub mod floating;
pub mod spec;

use serde::Serialize;

use crate::geometry::{ElementBox, Point, Timestamp};
use crate::layout::continuous::ContinuousLocation;

pub use dynamic::{AnchorSelector, DynamicAnchor, NearestCenter};
pub use floating::FloatingAnchor;
pub use spec::{AnchorSpec, PositionFinder, builtin_anchor};

/// Unit-ish direction vector, components usually in {-1, 0, 1}.
pub type Orientation = (f32, f32);

/// Everything an anchor may look at when it resolves its point.
#[derive(Clone, Copy)]
pub struct ComputeParams<'a> {
    /// Box of the element the anchor sits on.
    pub element: &'a ElementBox,
    /// Box of the element at the other end, when the anchor may reselect.
    pub target: Option<&'a ElementBox>,
    pub timestamp: Option<Timestamp>,
    /// Placement resolved for this endpoint by the continuous layout pass.
    pub continuous: Option<ContinuousLocation>,
    /// Maps a page point into the element's containing context.
    pub adjust: &'a dyn Fn(Point) -> Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnchorKind {
    Fixed,
    Floating,
    Dynamic,
    Continuous,
}

/// Position expressed as fractions of the element box plus a pixel offset.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedAnchor {
    pub name: Option<String>,
    pub x: f32,
    pub y: f32,
    pub offset: (f32, f32),
    pub orientation: Orientation,
    last_location: Option<Point>,
    last_timestamp: Option<Timestamp>,
}

impl FixedAnchor {
    pub fn new(x: f32, y: f32, orientation: Orientation) -> Self {
        Self {
            name: None,
            x,
            y,
            offset: (0.0, 0.0),
            orientation,
            last_location: None,
            last_timestamp: None,
        }
    }

    pub fn with_offset(mut self, offset: (f32, f32)) -> Self {
        self.offset = offset;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Point on `element` before any containing-context adjustment.
    pub fn raw_position(&self, element: &ElementBox) -> Point {
        (
            element.left + self.x * element.width + self.offset.0,
            element.top + self.y * element.height + self.offset.1,
        )
    }

    pub fn compute(&mut self, params: &ComputeParams<'_>) -> Point {
        if let Some(ts) = params.timestamp
            && self.last_timestamp == Some(ts)
            && let Some(point) = self.last_location
        {
            return point;
        }
        let point = (params.adjust)(self.raw_position(params.element));
        self.last_location = Some(point);
        self.last_timestamp = params.timestamp;
        point
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn current_location(&self) -> Option<Point> {
        self.last_location
    }

    /// Structural equality over position, offset and orientation.
    pub fn equals(&self, other: &FixedAnchor) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.offset == other.offset
            && self.orientation == other.orientation
    }
}

/// Placeholder whose point is owned by the continuous placement pass.
#[derive(Debug, Clone, Default)]
pub struct ContinuousAnchor {
    last: Option<ContinuousLocation>,
    fallback: Option<Point>,
}

impl ContinuousAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&mut self, params: &ComputeParams<'_>) -> Point {
        self.last = params.continuous;
        match params.continuous {
            Some(location) => location.point,
            None => {
                // Not placed yet: sit on the element center.
                let point = (params.adjust)(params.element.center());
                self.fallback = Some(point);
                point
            }
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.last.map(|loc| loc.orientation).unwrap_or((0.0, 0.0))
    }

    pub fn current_location(&self) -> Option<Point> {
        self.last.map(|loc| loc.point).or(self.fallback)
    }
}

#[derive(Debug)]
pub enum Anchor {
    Fixed(FixedAnchor),
    Floating(FloatingAnchor),
    Dynamic(DynamicAnchor),
    Continuous(ContinuousAnchor),
}

impl Anchor {
    pub fn kind(&self) -> AnchorKind {
        match self {
            Anchor::Fixed(_) => AnchorKind::Fixed,
            Anchor::Floating(_) => AnchorKind::Floating,
            Anchor::Dynamic(_) => AnchorKind::Dynamic,
            Anchor::Continuous(_) => AnchorKind::Continuous,
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self, Anchor::Continuous(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Anchor::Dynamic(_))
    }

    pub fn compute(&mut self, params: &ComputeParams<'_>) -> Point {
        match self {
            Anchor::Fixed(anchor) => anchor.compute(params),
            Anchor::Floating(anchor) => anchor.compute(params),
            Anchor::Dynamic(anchor) => anchor.compute(params),
            Anchor::Continuous(anchor) => anchor.compute(params),
        }
    }

    pub fn orientation(&self) -> Orientation {
        match self {
            Anchor::Fixed(anchor) => anchor.orientation(),
            Anchor::Floating(anchor) => anchor.orientation(),
            Anchor::Dynamic(anchor) => anchor.orientation(),
            Anchor::Continuous(anchor) => anchor.orientation(),
        }
    }

    pub fn current_location(&self) -> Option<Point> {
        match self {
            Anchor::Fixed(anchor) => anchor.current_location(),
            Anchor::Floating(anchor) => anchor.current_location(),
            Anchor::Dynamic(anchor) => anchor.current_location(),
            Anchor::Continuous(anchor) => anchor.current_location(),
        }
    }

    /// Returns false for anchors that have no lock (everything but dynamic).
    pub fn set_locked(&mut self, locked: bool) -> bool {
        match self {
            Anchor::Dynamic(anchor) => {
                anchor.locked = locked;
                true
            }
            _ => false,
        }
    }

    pub fn equals(&self, other: &Anchor) -> bool {
        match (self, other) {
            (Anchor::Fixed(a), Anchor::Fixed(b)) => a.equals(b),
            (Anchor::Dynamic(a), Anchor::Dynamic(b)) => {
                a.candidates().len() == b.candidates().len()
                    && a
                        .candidates()
                        .iter()
                        .zip(b.candidates())
                        .all(|(x, y)| x.equals(y))
            }
            (Anchor::Continuous(_), Anchor::Continuous(_)) => true,
            _ => false,
        }
    }
}
