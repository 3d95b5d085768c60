//! The anchor mini-language: a built-in name, a numeric array
//! `[x, y, ox, oy, offset_x?, offset_y?]`, a list of those (dynamic), or the
//! token `"Continuous"`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::AnchorError;
use crate::geometry::{ElementBox, Point};

use super::{Anchor, ContinuousAnchor, DynamicAnchor, FixedAnchor};

pub const CONTINUOUS: &str = "Continuous";
pub const AUTO_DEFAULT: &str = "AutoDefault";

/// name -> (x, y, ox, oy)
static BUILTIN_ANCHORS: Lazy<HashMap<&'static str, [f32; 4]>> = Lazy::new(|| {
    HashMap::from([
        ("TopCenter", [0.5, 0.0, 0.0, -1.0]),
        ("BottomCenter", [0.5, 1.0, 0.0, 1.0]),
        ("LeftMiddle", [0.0, 0.5, -1.0, 0.0]),
        ("RightMiddle", [1.0, 0.5, 1.0, 0.0]),
        ("Center", [0.5, 0.5, 0.0, 0.0]),
        ("TopRight", [1.0, 0.0, 0.0, -1.0]),
        ("BottomRight", [1.0, 1.0, 0.0, 1.0]),
        ("TopLeft", [0.0, 0.0, 0.0, -1.0]),
        ("BottomLeft", [0.0, 1.0, 0.0, 1.0]),
    ])
});

pub fn builtin_anchor(name: &str) -> Option<FixedAnchor> {
    BUILTIN_ANCHORS
        .get(name)
        .map(|[x, y, ox, oy]| FixedAnchor::new(*x, *y, (*ox, *oy)).named(name))
}

pub fn builtin_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BUILTIN_ANCHORS.keys().copied().collect();
    names.sort_unstable();
    names
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnchorSpec {
    Named(String),
    Coords(Vec<f32>),
    Dynamic(Vec<AnchorSpec>),
}

impl AnchorSpec {
    pub fn named(name: &str) -> Self {
        AnchorSpec::Named(name.to_string())
    }

    pub fn continuous() -> Self {
        AnchorSpec::Named(CONTINUOUS.to_string())
    }

    /// Builds the anchor. `auto_default` supplies the candidates behind the
    /// `"AutoDefault"` name.
    pub fn build(&self, auto_default: &[AnchorSpec]) -> Result<Anchor, AnchorError> {
        match self {
            AnchorSpec::Named(name) if name == CONTINUOUS => {
                Ok(Anchor::Continuous(ContinuousAnchor::new()))
            }
            AnchorSpec::Named(name) if name == AUTO_DEFAULT => {
                let candidates = auto_default
                    .iter()
                    .map(AnchorSpec::build_candidate)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Anchor::Dynamic(DynamicAnchor::new(candidates)?))
            }
            AnchorSpec::Named(_) | AnchorSpec::Coords(_) => {
                Ok(Anchor::Fixed(self.build_candidate()?))
            }
            AnchorSpec::Dynamic(specs) => {
                let candidates = specs
                    .iter()
                    .map(AnchorSpec::build_candidate)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Anchor::Dynamic(DynamicAnchor::new(candidates)?))
            }
        }
    }

    fn build_candidate(&self) -> Result<FixedAnchor, AnchorError> {
        match self {
            AnchorSpec::Named(name) if name == CONTINUOUS || name == AUTO_DEFAULT => {
                Err(AnchorError::NestedNotAllowed(name.clone()))
            }
            AnchorSpec::Named(name) => {
                builtin_anchor(name).ok_or_else(|| AnchorError::UnknownName(name.clone()))
            }
            AnchorSpec::Coords(values) => fixed_from_coords(values),
            AnchorSpec::Dynamic(_) => Err(AnchorError::NestedNotAllowed(self.to_string())),
        }
    }
}

fn fixed_from_coords(values: &[f32]) -> Result<FixedAnchor, AnchorError> {
    if values.len() != 4 && values.len() != 6 {
        return Err(AnchorError::Malformed(format!(
            "expected 4 or 6 numbers, got {}",
            values.len()
        )));
    }
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(AnchorError::Malformed(format!("non-finite value {bad}")));
    }
    let anchor = FixedAnchor::new(values[0], values[1], (values[2], values[3]));
    Ok(if values.len() == 6 {
        anchor.with_offset((values[4], values[5]))
    } else {
        anchor
    })
}

impl fmt::Display for AnchorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorSpec::Named(name) => write!(f, "{name}"),
            AnchorSpec::Coords(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            AnchorSpec::Dynamic(specs) => {
                let parts: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl FromStr for AnchorSpec {
    type Err = AnchorError;

    /// Accepts a bare name (`TopCenter`) or a JSON5 array
    /// (`[0.5, 0, 0, -1]`, `["TopCenter", [1, 0.5, 1, 0]]`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.starts_with('[') {
            return json5::from_str::<AnchorSpec>(trimmed)
                .map_err(|err| AnchorError::Malformed(err.to_string()));
        }
        let name = trimmed.trim_matches('"');
        if name.is_empty() {
            return Err(AnchorError::Malformed("empty anchor".to_string()));
        }
        Ok(AnchorSpec::Named(name.to_string()))
    }
}

/// Maps a drop location on an element to fractional anchor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionFinder {
    #[default]
    Fixed,
    /// Snap to the center of a `columns` x `rows` cell grid.
    Grid { columns: u32, rows: u32 },
}

impl PositionFinder {
    pub fn locate(&self, drop: Point, element: &ElementBox) -> (f32, f32) {
        let dx = drop.0 - element.left;
        let dy = drop.1 - element.top;
        match *self {
            PositionFinder::Fixed => (fraction(dx, element.width), fraction(dy, element.height)),
            PositionFinder::Grid { columns, rows } => {
                let gx = element.width / columns.max(1) as f32;
                let gy = element.height / rows.max(1) as f32;
                if gx <= 0.0 || gy <= 0.0 {
                    return (0.5, 0.5);
                }
                let mx = (dx / gx).floor();
                let my = (dy / gy).floor();
                (
                    fraction(mx * gx + gx / 2.0, element.width),
                    fraction(my * gy + gy / 2.0, element.height),
                )
            }
        }
    }
}

fn fraction(delta: f32, extent: f32) -> f32 {
    if extent > 0.0 { delta / extent } else { 0.5 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorKind;

    fn defaults() -> Vec<AnchorSpec> {
        ["TopCenter", "RightMiddle", "BottomCenter", "LeftMiddle"]
            .iter()
            .map(|name| AnchorSpec::named(name))
            .collect()
    }

    #[test]
    fn nine_builtins() {
        assert_eq!(builtin_names().len(), 9);
        let anchor = builtin_anchor("BottomLeft").unwrap();
        assert_eq!((anchor.x, anchor.y), (0.0, 1.0));
        assert_eq!(anchor.orientation, (0.0, 1.0));
    }

    #[test]
    fn parses_each_form_from_json() {
        let named: AnchorSpec = serde_json::from_str("\"TopCenter\"").unwrap();
        assert_eq!(named, AnchorSpec::named("TopCenter"));
        let coords: AnchorSpec = serde_json::from_str("[0.2, 1, 0, 1, 5, -5]").unwrap();
        assert_eq!(coords, AnchorSpec::Coords(vec![0.2, 1.0, 0.0, 1.0, 5.0, -5.0]));
        let dynamic: AnchorSpec = serde_json::from_str("[\"TopCenter\", [1, 0.5, 1, 0]]").unwrap();
        assert!(matches!(dynamic, AnchorSpec::Dynamic(ref list) if list.len() == 2));
    }

    #[test]
    fn builds_kinds() {
        let d = defaults();
        assert_eq!(AnchorSpec::named("Center").build(&d).unwrap().kind(), AnchorKind::Fixed);
        assert_eq!(AnchorSpec::continuous().build(&d).unwrap().kind(), AnchorKind::Continuous);
        assert_eq!(AnchorSpec::named("AutoDefault").build(&d).unwrap().kind(), AnchorKind::Dynamic);
        let coords = AnchorSpec::Coords(vec![0.0, 0.5, -1.0, 0.0, 2.0, 3.0]);
        match coords.build(&d).unwrap() {
            Anchor::Fixed(anchor) => assert_eq!(anchor.offset, (2.0, 3.0)),
            other => panic!("expected fixed anchor, got {other:?}"),
        }
    }

    #[test]
    fn configuration_errors_fail_fast() {
        let d = defaults();
        assert_eq!(
            AnchorSpec::named("Middle").build(&d).unwrap_err(),
            AnchorError::UnknownName("Middle".to_string())
        );
        assert!(matches!(
            AnchorSpec::Coords(vec![0.5, 0.5, 0.0]).build(&d).unwrap_err(),
            AnchorError::Malformed(_)
        ));
        assert_eq!(
            AnchorSpec::Dynamic(vec![AnchorSpec::continuous()]).build(&d).unwrap_err(),
            AnchorError::NestedNotAllowed("Continuous".to_string())
        );
        assert_eq!(
            AnchorSpec::Dynamic(Vec::new()).build(&d).unwrap_err(),
            AnchorError::EmptyDynamic
        );
    }

    #[test]
    fn from_str_accepts_names_and_arrays() {
        assert_eq!("TopLeft".parse::<AnchorSpec>().unwrap(), AnchorSpec::named("TopLeft"));
        assert_eq!(
            "[0.5, 0, 0, -1]".parse::<AnchorSpec>().unwrap(),
            AnchorSpec::Coords(vec![0.5, 0.0, 0.0, -1.0])
        );
        assert!("[0.5, ".parse::<AnchorSpec>().is_err());
        assert!("   ".parse::<AnchorSpec>().is_err());
    }

    #[test]
    fn position_finders() {
        let element = ElementBox::new("A", (100.0, 100.0), (200.0, 100.0));
        assert_eq!(PositionFinder::Fixed.locate((150.0, 125.0), &element), (0.25, 0.25));
        let grid = PositionFinder::Grid { columns: 2, rows: 2 };
        assert_eq!(grid.locate((110.0, 190.0), &element), (0.25, 0.75));
        let flat = ElementBox::new("B", (0.0, 0.0), (0.0, 0.0));
        assert_eq!(PositionFinder::Fixed.locate((5.0, 5.0), &flat), (0.5, 0.5));
    }
}
