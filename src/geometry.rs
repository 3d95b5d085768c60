use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::host::ElementGeometry;

pub type Point = (f32, f32);

/// Paint cycle token. Two paints with the same value are the same logical
/// paint; geometry and anchor results are reused between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Raw box reported by the host for an element.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Snapshot of an element's geometry for one paint cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementBox {
    pub id: String,
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub width: f32,
    pub height: f32,
    pub center_x: f32,
    pub center_y: f32,
}

impl ElementBox {
    pub fn new(id: &str, origin: Point, size: (f32, f32)) -> Self {
        let (left, top) = origin;
        let (width, height) = size;
        Self {
            id: id.to_string(),
            left,
            top,
            right: left + width,
            bottom: top + height,
            width,
            height,
            center_x: left + width / 2.0,
            center_y: top + height / 2.0,
        }
    }

    pub fn from_rect(id: &str, rect: Rect) -> Self {
        Self::new(id, (rect.x, rect.y), (rect.width, rect.height))
    }

    pub fn origin(&self) -> Point {
        (self.left, self.top)
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn center(&self) -> Point {
        (self.center_x, self.center_y)
    }
}

#[derive(Debug, Clone)]
struct CachedGeometry {
    origin: Point,
    size: (f32, f32),
    timestamp: Option<Timestamp>,
}

/// Per-element box cache. Entries are valid for the timestamp they were
/// refreshed with.
#[derive(Debug, Default)]
pub struct GeometryCache {
    entries: HashMap<String, CachedGeometry>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the element's box for `timestamp`, asking the host only when
    /// the cached entry belongs to another paint, when `recalc` is set, or
    /// when nothing is cached yet. An explicit `offset` (a drag position)
    /// replaces the origin; the size comes from the cache unless `recalc`
    /// forces a fresh read.
    pub fn refresh<G>(
        &mut self,
        host: &G,
        element_id: &str,
        timestamp: Option<Timestamp>,
        offset: Option<Point>,
        recalc: bool,
    ) -> Result<ElementBox>
    where
        G: ElementGeometry + ?Sized,
    {
        if !recalc
            && offset.is_none()
            && let Some(ts) = timestamp
            && let Some(cached) = self.entries.get(element_id)
            && cached.timestamp == Some(ts)
        {
            return Ok(ElementBox::new(element_id, cached.origin, cached.size));
        }

        let cached_size = if recalc {
            None
        } else {
            self.entries.get(element_id).map(|cached| cached.size)
        };
        let entry = match (offset, cached_size) {
            (Some(origin), Some(size)) => CachedGeometry {
                origin,
                size,
                timestamp,
            },
            _ => {
                let rect = host
                    .element_rect(element_id)
                    .ok_or_else(|| EngineError::ElementNotFound(element_id.to_string()))?;
                CachedGeometry {
                    origin: offset.unwrap_or((rect.x, rect.y)),
                    size: (rect.width, rect.height),
                    timestamp,
                }
            }
        };
        let snapshot = ElementBox::new(element_id, entry.origin, entry.size);
        self.entries.insert(element_id.to_string(), entry);
        Ok(snapshot)
    }

    pub fn rename(&mut self, old_id: &str, new_id: &str) {
        if let Some(entry) = self.entries.remove(old_id) {
            self.entries.insert(new_id.to_string(), entry);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SceneHost;

    #[test]
    fn element_box_derives_edges_and_center() {
        let b = ElementBox::new("A", (10.0, 20.0), (100.0, 50.0));
        assert_eq!(b.right, 110.0);
        assert_eq!(b.bottom, 70.0);
        assert_eq!(b.center(), (60.0, 45.0));
    }

    #[test]
    fn refresh_reuses_entry_for_same_timestamp() {
        let mut host = SceneHost::new();
        host.set_rect("A", Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut cache = GeometryCache::new();
        let first = cache
            .refresh(&host, "A", Some(Timestamp(1)), None, false)
            .unwrap();
        host.set_rect("A", Rect::new(50.0, 50.0, 100.0, 100.0));
        let same = cache
            .refresh(&host, "A", Some(Timestamp(1)), None, false)
            .unwrap();
        assert_eq!(first, same);
        let next = cache
            .refresh(&host, "A", Some(Timestamp(2)), None, false)
            .unwrap();
        assert_eq!(next.left, 50.0);
    }

    #[test]
    fn drag_offset_keeps_cached_size() {
        let mut host = SceneHost::new();
        host.set_rect("A", Rect::new(0.0, 0.0, 80.0, 40.0));
        let mut cache = GeometryCache::new();
        cache.refresh(&host, "A", Some(Timestamp(1)), None, false).unwrap();
        let moved = cache
            .refresh(&host, "A", Some(Timestamp(2)), Some((200.0, 10.0)), false)
            .unwrap();
        assert_eq!(moved.origin(), (200.0, 10.0));
        assert_eq!(moved.size(), (80.0, 40.0));
    }

    #[test]
    fn recalc_rereads_size_under_drag_offset() {
        let mut host = SceneHost::new();
        host.set_rect("A", Rect::new(0.0, 0.0, 80.0, 40.0));
        let mut cache = GeometryCache::new();
        cache.refresh(&host, "A", Some(Timestamp(1)), None, false).unwrap();
        host.set_rect("A", Rect::new(0.0, 0.0, 160.0, 40.0));
        let stale = cache
            .refresh(&host, "A", Some(Timestamp(1)), Some((5.0, 5.0)), false)
            .unwrap();
        assert_eq!(stale.size(), (80.0, 40.0));
        let fresh = cache
            .refresh(&host, "A", Some(Timestamp(1)), Some((5.0, 5.0)), true)
            .unwrap();
        assert_eq!(fresh.origin(), (5.0, 5.0));
        assert_eq!(fresh.size(), (160.0, 40.0));
    }

    #[test]
    fn missing_element_is_reported() {
        let host = SceneHost::new();
        let mut cache = GeometryCache::new();
        let err = cache.refresh(&host, "ghost", None, None, false).unwrap_err();
        assert_eq!(err, EngineError::ElementNotFound("ghost".to_string()));
    }
}
