use std::fmt;

use serde::{Deserialize, Serialize};

use crate::anchor::{Anchor, AnchorSpec};
use crate::geometry::{Point, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn{}", self.0)
    }
}

/// Maximum number of connections an endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionCap {
    Limited(usize),
    Unlimited,
}

impl ConnectionCap {
    pub fn allows(self, current: usize) -> bool {
        match self {
            ConnectionCap::Limited(max) => current < max,
            ConnectionCap::Unlimited => true,
        }
    }
}

impl From<Option<usize>> for ConnectionCap {
    fn from(value: Option<usize>) -> Self {
        value.map_or(ConnectionCap::Unlimited, ConnectionCap::Limited)
    }
}

/// Values below one mean unlimited.
impl From<i64> for ConnectionCap {
    fn from(value: i64) -> Self {
        if value < 1 {
            ConnectionCap::Unlimited
        } else {
            ConnectionCap::Limited(value as usize)
        }
    }
}

#[derive(Debug)]
pub struct Endpoint {
    pub id: EndpointId,
    pub element_id: String,
    pub anchor: Anchor,
    pub connections: Vec<ConnectionId>,
    pub max_connections: ConnectionCap,
    pub enabled: bool,
    pub visible: bool,
    pub scope: String,
    /// Timestamp of the last paint handed to the host.
    pub painted_at: Option<Timestamp>,
    /// Point computed by the last paint.
    pub point: Option<Point>,
    /// Transient endpoints sit on a drag proxy while a connection floats.
    pub floating: bool,
}

impl Endpoint {
    pub fn is_full(&self) -> bool {
        !self.floating && !self.max_connections.allows(self.connections.len())
    }

    pub fn is_continuous(&self) -> bool {
        self.anchor.is_continuous()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionEnd {
    Source,
    Target,
}

impl ConnectionEnd {
    pub fn other(self) -> Self {
        match self {
            ConnectionEnd::Source => ConnectionEnd::Target,
            ConnectionEnd::Target => ConnectionEnd::Source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: EndpointId,
    pub target: EndpointId,
    pub source_element: String,
    pub target_element: String,
    pub scope: String,
    pub detachable: bool,
    pub cost: f32,
    pub bidirectional: bool,
    pub painted_at: Option<Timestamp>,
    /// (source point, target point) handed to the host by the last paint.
    pub last_points: Option<(Point, Point)>,
}

impl Connection {
    pub fn is_self_loop(&self) -> bool {
        self.source_element == self.target_element
    }

    pub fn endpoint(&self, end: ConnectionEnd) -> EndpointId {
        match end {
            ConnectionEnd::Source => self.source,
            ConnectionEnd::Target => self.target,
        }
    }

    pub fn element(&self, end: ConnectionEnd) -> &str {
        match end {
            ConnectionEnd::Source => &self.source_element,
            ConnectionEnd::Target => &self.target_element,
        }
    }

    /// Which end `endpoint` is, if it belongs to this connection.
    pub fn end_of(&self, endpoint: EndpointId) -> Option<ConnectionEnd> {
        if self.source == endpoint {
            Some(ConnectionEnd::Source)
        } else if self.target == endpoint {
            Some(ConnectionEnd::Target)
        } else {
            None
        }
    }

    pub(super) fn set_end(&mut self, end: ConnectionEnd, endpoint: EndpointId, element: &str) {
        match end {
            ConnectionEnd::Source => {
                self.source = endpoint;
                self.source_element = element.to_string();
            }
            ConnectionEnd::Target => {
                self.target = endpoint;
                self.target_element = element.to_string();
            }
        }
    }
}

/// Registered against an element: a connection to repaint when the element
/// moves, and the endpoint at its far end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionRef {
    pub connection: ConnectionId,
    pub other_endpoint: EndpointId,
    pub other_is_dynamic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOptions {
    /// `None` takes the configured default anchor.
    pub anchor: Option<AnchorSpec>,
    /// `None` takes the configured default; values below one are unlimited.
    pub max_connections: Option<i64>,
    pub enabled: bool,
    pub visible: bool,
    pub scope: Option<String>,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            anchor: None,
            max_connections: None,
            enabled: true,
            visible: true,
            scope: None,
        }
    }
}

impl EndpointOptions {
    pub fn with_anchor(anchor: AnchorSpec) -> Self {
        Self {
            anchor: Some(anchor),
            ..Self::default()
        }
    }

    pub fn unlimited(mut self) -> Self {
        self.max_connections = Some(-1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub scope: Option<String>,
    pub detachable: Option<bool>,
    pub cost: Option<f32>,
    pub bidirectional: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RedrawReport {
    pub element: String,
    pub timestamp: Option<Timestamp>,
    pub endpoints_painted: Vec<EndpointId>,
    pub connections_painted: Vec<ConnectionId>,
    /// Elements redrawn in this pass, the requested one first.
    pub elements: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_from_signed_integer() {
        assert_eq!(ConnectionCap::from(-1), ConnectionCap::Unlimited);
        assert_eq!(ConnectionCap::from(0), ConnectionCap::Unlimited);
        assert_eq!(ConnectionCap::from(3), ConnectionCap::Limited(3));
        assert!(ConnectionCap::Limited(1).allows(0));
        assert!(!ConnectionCap::Limited(1).allows(1));
        assert!(ConnectionCap::Unlimited.allows(10_000));
    }

    #[test]
    fn ids_display_with_prefix() {
        assert_eq!(EndpointId(4).to_string(), "ep4");
        assert_eq!(ConnectionId(2).to_string(), "conn2");
    }

    #[test]
    fn endpoint_options_parse_with_defaults() {
        let opts: EndpointOptions =
            serde_json::from_str(r#"{"anchor": "Continuous", "max_connections": -1}"#).unwrap();
        assert_eq!(opts.anchor, Some(AnchorSpec::continuous()));
        assert!(opts.enabled && opts.visible);
        assert_eq!(ConnectionCap::from(opts.max_connections.unwrap_or(1)), ConnectionCap::Unlimited);
    }
}
