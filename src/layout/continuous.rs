//! Continuous anchor placement: which face of an element each continuous
//! endpoint sits on, and where along that face.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::f32::consts::{FRAC_PI_2, PI};

use serde::Serialize;
use tracing::trace;

use crate::anchor::Orientation;
use crate::geometry::{ElementBox, Point};

use super::types::{ConnectionId, EndpointId};

/// Faces in the order their lists are laid out.
const PLACEMENT_ORDER: [Face; 4] = [Face::Bottom, Face::Top, Face::Left, Face::Right];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    Top,
    Right,
    Bottom,
    Left,
}

impl Face {
    pub fn slot(self) -> usize {
        match self {
            Face::Top => 0,
            Face::Right => 1,
            Face::Bottom => 2,
            Face::Left => 3,
        }
    }

    pub fn orientation(self) -> Orientation {
        match self {
            Face::Top => (0.0, -1.0),
            Face::Right => (1.0, 0.0),
            Face::Bottom => (0.0, 1.0),
            Face::Left => (-1.0, 0.0),
        }
    }

    /// Top and bottom faces run along the x axis.
    pub fn runs_horizontally(self) -> bool {
        matches!(self, Face::Top | Face::Bottom)
    }

    /// Slots on top and right faces are counted from the far end.
    fn reversed(self) -> bool {
        matches!(self, Face::Top | Face::Right)
    }

    /// Perpendicular position of the face as a multiple of the element's
    /// thickness.
    fn other_multiplier(self) -> f32 {
        match self {
            Face::Bottom | Face::Right => 1.0,
            Face::Top | Face::Left => 0.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Face::Top => "top",
            Face::Right => "right",
            Face::Bottom => "bottom",
            Face::Left => "left",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationKind {
    /// Vertical extents overlap; faces right/left.
    Horizontal,
    /// Horizontal extents overlap; faces bottom/top.
    Vertical,
    Diagonal,
    /// Source and target are the same element.
    Identity,
}

/// How a source element and a target element face each other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairOrientation {
    pub kind: OrientationKind,
    /// (face on source, face on target)
    pub faces: (Face, Face),
    /// Direction from source center to target center.
    pub theta: f32,
    /// Direction from target center to source center.
    pub theta2: f32,
}

impl PairOrientation {
    /// The same orientation seen from the target side.
    pub fn reversed(&self) -> Self {
        Self {
            kind: self.kind,
            faces: (self.faces.1, self.faces.0),
            theta: self.theta2,
            theta2: self.theta,
        }
    }
}

fn extents_overlap(a_start: f32, a_end: f32, b_start: f32, b_end: f32) -> bool {
    a_start <= b_end && b_start <= a_end
}

pub fn calculate_orientation(source: &ElementBox, target: &ElementBox) -> PairOrientation {
    if source.id == target.id {
        return PairOrientation {
            kind: OrientationKind::Identity,
            faces: (Face::Top, Face::Top),
            theta: -FRAC_PI_2,
            theta2: -FRAC_PI_2,
        };
    }

    let theta = (target.center_y - source.center_y).atan2(target.center_x - source.center_x);
    let theta2 = (source.center_y - target.center_y).atan2(source.center_x - target.center_x);

    let (kind, faces) = if extents_overlap(source.left, source.right, target.left, target.right) {
        let faces = if source.top < target.top {
            (Face::Bottom, Face::Top)
        } else {
            (Face::Top, Face::Bottom)
        };
        (OrientationKind::Vertical, faces)
    } else if extents_overlap(source.top, source.bottom, target.top, target.bottom) {
        let faces = if source.left < target.left {
            (Face::Right, Face::Left)
        } else {
            (Face::Left, Face::Right)
        };
        (OrientationKind::Horizontal, faces)
    } else {
        let faces = if target.left > source.left {
            if target.top > source.top {
                (Face::Right, Face::Top)
            } else {
                (Face::Top, Face::Left)
            }
        } else if target.top < source.top {
            (Face::Top, Face::Right)
        } else {
            (Face::Left, Face::Top)
        };
        (OrientationKind::Diagonal, faces)
    };

    trace!(
        source = %source.id,
        target = %target.id,
        ?kind,
        source_face = faces.0.name(),
        target_face = faces.1.name(),
        "classified element pair"
    );
    PairOrientation {
        kind,
        faces,
        theta,
        theta2,
    }
}

/// Orientations computed during one redraw, keyed by unordered element pair.
#[derive(Debug, Default)]
pub struct OrientationCache {
    entries: HashMap<(String, String), PairOrientation>,
}

impl OrientationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&mut self, source: &ElementBox, target: &ElementBox) -> PairOrientation {
        let forward = (source.id.clone(), target.id.clone());
        if let Some(found) = self.entries.get(&forward) {
            return *found;
        }
        let backward = (target.id.clone(), source.id.clone());
        if let Some(found) = self.entries.get(&backward) {
            return found.reversed();
        }
        let computed = calculate_orientation(source, target);
        self.entries.insert(forward, computed);
        computed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceEntry {
    pub angle: f32,
    /// Tie-break: 0 for source ends, -1 for target ends.
    pub order: i8,
    pub connection: ConnectionId,
    pub is_target: bool,
    pub other_element: String,
    pub endpoint: EndpointId,
}

fn left_face_key(angle: f32) -> f32 {
    if angle < 0.0 { -PI - angle } else { PI - angle }
}

pub fn compare_entries(face: Face, a: &FaceEntry, b: &FaceEntry) -> Ordering {
    match face {
        Face::Left => left_face_key(a.angle)
            .total_cmp(&left_face_key(b.angle))
            .then(a.order.cmp(&b.order)),
        Face::Top | Face::Right | Face::Bottom => {
            b.angle.total_cmp(&a.angle).then(a.order.cmp(&b.order))
        }
    }
}

/// Resolved placement of one continuous endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContinuousLocation {
    /// Absolute point, adjusted for the element's containing context.
    pub point: Point,
    /// Position as fractions of the element box.
    pub fraction: (f32, f32),
    pub orientation: Orientation,
    pub face: Face,
}

fn fraction(delta: f32, extent: f32) -> f32 {
    if extent > 0.0 { delta / extent } else { 0.5 }
}

/// Spreads `entries` evenly along `face`. Entries must already be sorted.
pub fn place_anchors_on_line(
    element: &ElementBox,
    face: Face,
    entries: &[FaceEntry],
    adjust: &dyn Fn(Point) -> Point,
) -> Vec<(EndpointId, ContinuousLocation)> {
    let (span, thickness) = if face.runs_horizontally() {
        (element.width, element.height)
    } else {
        (element.height, element.width)
    };
    let len = span.max(0.0);
    let thickness = thickness.max(0.0);
    let step = len / (entries.len() as f32 + 1.0);
    let other = face.other_multiplier() * thickness;

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            // a collapsed face puts every anchor on the element's center line
            let val = if len > 0.0 {
                let along = (idx as f32 + 1.0) * step;
                if face.reversed() { len - along } else { along }
            } else {
                span / 2.0
            };
            let (dx, dy) = if face.runs_horizontally() {
                (val, other)
            } else {
                (other, val)
            };
            let location = ContinuousLocation {
                point: adjust((element.left + dx, element.top + dy)),
                fraction: (fraction(dx, element.width), fraction(dy, element.height)),
                orientation: face.orientation(),
                face,
            };
            (entry.endpoint, location)
        })
        .collect()
}

/// Connections and endpoints to repaint, in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct RepaintSet {
    connections: Vec<ConnectionId>,
    endpoints: Vec<EndpointId>,
    seen_connections: HashSet<ConnectionId>,
    seen_endpoints: HashSet<EndpointId>,
}

impl RepaintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection(&mut self, id: ConnectionId) {
        if self.seen_connections.insert(id) {
            self.connections.push(id);
        }
    }

    pub fn add_endpoint(&mut self, id: EndpointId) {
        if self.seen_endpoints.insert(id) {
            self.endpoints.push(id);
        }
    }

    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }

    pub fn endpoints(&self) -> &[EndpointId] {
        &self.endpoints
    }

    pub fn contains_endpoint(&self, id: EndpointId) -> bool {
        self.seen_endpoints.contains(&id)
    }

    fn add_tenants(&mut self, entries: &[FaceEntry]) {
        for entry in entries {
            self.add_connection(entry.connection);
            self.add_endpoint(entry.endpoint);
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct FaceLists([Vec<FaceEntry>; 4]);

impl FaceLists {
    pub fn get(&self, face: Face) -> &[FaceEntry] {
        &self.0[face.slot()]
    }

    fn get_mut(&mut self, face: Face) -> &mut Vec<FaceEntry> {
        &mut self.0[face.slot()]
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Vec::is_empty)
    }
}

/// Face lists for every element carrying continuous endpoints, plus the
/// resolved locations the continuous anchors read back.
#[derive(Debug, Default)]
pub struct ContinuousPlacement {
    lists: HashMap<String, FaceLists>,
    last_face: HashMap<EndpointId, (String, Face)>,
    locations: HashMap<EndpointId, ContinuousLocation>,
}

impl ContinuousPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `entry` on `face` of `element`, first removing the endpoint's
    /// entry from the face it occupied before. Every tenant of a list that
    /// changed lands in `repaint`.
    pub fn update_anchor_list(
        &mut self,
        element: &str,
        face: Face,
        entry: FaceEntry,
        repaint: &mut RepaintSet,
    ) {
        let endpoint = entry.endpoint;
        if let Some((old_element, old_face)) = self.last_face.get(&endpoint).cloned()
            && (old_element != element || old_face != face)
        {
            self.remove_entry(&old_element, old_face, endpoint, repaint);
        }

        let list = self
            .lists
            .entry(element.to_string())
            .or_default()
            .get_mut(face);
        match list.iter_mut().find(|existing| existing.endpoint == endpoint) {
            Some(existing) => *existing = entry,
            None => {
                trace!(%element, face = face.name(), %endpoint, "face entry added");
                list.push(entry);
            }
        }
        repaint.add_tenants(list);
        self.last_face.insert(endpoint, (element.to_string(), face));
    }

    fn remove_entry(
        &mut self,
        element: &str,
        face: Face,
        endpoint: EndpointId,
        repaint: &mut RepaintSet,
    ) {
        let Some(lists) = self.lists.get_mut(element) else {
            return;
        };
        let list = lists.get_mut(face);
        let before = list.len();
        list.retain(|existing| existing.endpoint != endpoint);
        if list.len() != before {
            trace!(%element, face = face.name(), %endpoint, "face entry removed");
            repaint.add_tenants(list);
        }
        if lists.is_empty() {
            self.lists.remove(element);
        }
    }

    /// Sorts every face list of `element` and stores the resulting
    /// locations.
    pub fn place_anchors(&mut self, element: &ElementBox, adjust: &dyn Fn(Point) -> Point) {
        let Some(lists) = self.lists.get_mut(&element.id) else {
            return;
        };
        for face in PLACEMENT_ORDER {
            let list = lists.get_mut(face);
            list.sort_by(|a, b| compare_entries(face, a, b));
            for (endpoint, location) in place_anchors_on_line(element, face, list, adjust) {
                self.locations.insert(endpoint, location);
            }
        }
    }

    /// Drops the endpoint's entry and location. Returns the element whose
    /// face was vacated.
    pub fn purge_endpoint(&mut self, endpoint: EndpointId, repaint: &mut RepaintSet) -> Option<String> {
        self.locations.remove(&endpoint);
        let (element, face) = self.last_face.remove(&endpoint)?;
        self.remove_entry(&element, face, endpoint, repaint);
        Some(element)
    }

    pub fn location(&self, endpoint: EndpointId) -> Option<ContinuousLocation> {
        self.locations.get(&endpoint).copied()
    }

    pub fn face_of(&self, endpoint: EndpointId) -> Option<Face> {
        self.last_face.get(&endpoint).map(|(_, face)| *face)
    }

    pub fn entries(&self, element: &str, face: Face) -> &[FaceEntry] {
        self.lists
            .get(element)
            .map(|lists| lists.get(face))
            .unwrap_or(&[])
    }

    pub fn lists_for(&self, element: &str) -> Option<&FaceLists> {
        self.lists.get(element)
    }

    pub fn rename_element(&mut self, old_id: &str, new_id: &str) {
        if let Some(lists) = self.lists.remove(old_id) {
            self.lists.insert(new_id.to_string(), lists);
        }
        for lists in self.lists.values_mut() {
            for list in lists.0.iter_mut() {
                for entry in list.iter_mut().filter(|entry| entry.other_element == old_id) {
                    entry.other_element = new_id.to_string();
                }
            }
        }
        for (element, _) in self.last_face.values_mut() {
            if element == old_id {
                *element = new_id.to_string();
            }
        }
    }

    pub fn clear(&mut self) {
        self.lists.clear();
        self.last_face.clear();
        self.locations.clear();
    }
}
