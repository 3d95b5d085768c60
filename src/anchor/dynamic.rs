use std::fmt;

use crate::error::AnchorError;
use crate::geometry::{ElementBox, Point};

use super::{ComputeParams, FixedAnchor, Orientation};

/// Picks one candidate for a dynamic anchor given both element boxes.
pub trait AnchorSelector: fmt::Debug {
    fn select(
        &self,
        element: &ElementBox,
        target: &ElementBox,
        candidates: &[FixedAnchor],
    ) -> Option<usize>;
}

/// Candidate closest to the center of the opposite element. Ties keep the
/// earliest candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestCenter;

impl AnchorSelector for NearestCenter {
    fn select(
        &self,
        element: &ElementBox,
        target: &ElementBox,
        candidates: &[FixedAnchor],
    ) -> Option<usize> {
        let (cx, cy) = target.center();
        let mut best: Option<(usize, f32)> = None;
        for (idx, candidate) in candidates.iter().enumerate() {
            let (ax, ay) = candidate.raw_position(element);
            let dist = ((cx - ax).powi(2) + (cy - ay).powi(2)).sqrt();
            match best {
                Some((_, min)) if dist >= min => {}
                _ => best = Some((idx, dist)),
            }
        }
        best.map(|(idx, _)| idx)
    }
}

/// Chooses among fixed candidates on every compute unless locked.
#[derive(Debug)]
pub struct DynamicAnchor {
    candidates: Vec<FixedAnchor>,
    selector: Box<dyn AnchorSelector>,
    current: usize,
    pub locked: bool,
}

impl DynamicAnchor {
    pub fn new(candidates: Vec<FixedAnchor>) -> Result<Self, AnchorError> {
        Self::with_selector(candidates, Box::new(NearestCenter))
    }

    pub fn with_selector(
        candidates: Vec<FixedAnchor>,
        selector: Box<dyn AnchorSelector>,
    ) -> Result<Self, AnchorError> {
        if candidates.is_empty() {
            return Err(AnchorError::EmptyDynamic);
        }
        Ok(Self {
            candidates,
            selector,
            current: 0,
            locked: false,
        })
    }

    pub fn candidates(&self) -> &[FixedAnchor] {
        &self.candidates
    }

    pub fn selected_index(&self) -> usize {
        self.current
    }

    pub fn selected(&self) -> &FixedAnchor {
        &self.candidates[self.current]
    }

    pub fn compute(&mut self, params: &ComputeParams<'_>) -> Point {
        let target = match params.target {
            Some(target) if !self.locked => target,
            _ => return self.candidates[self.current].compute(params),
        };
        if let Some(idx) = self
            .selector
            .select(params.element, target, &self.candidates)
            .filter(|idx| *idx < self.candidates.len())
        {
            self.current = idx;
        }
        // bypass the candidate's per-timestamp cache after reselection
        let fresh = ComputeParams {
            timestamp: None,
            ..*params
        };
        self.candidates[self.current].compute(&fresh)
    }

    pub fn orientation(&self) -> Orientation {
        self.candidates[self.current].orientation()
    }

    pub fn current_location(&self) -> Option<Point> {
        self.candidates[self.current].current_location()
    }
}
