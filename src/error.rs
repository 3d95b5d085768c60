use thiserror::Error;

use crate::layout::{ConnectionId, EndpointId};

/// Problems with an anchor description. Raised when the anchor is built,
/// never later during a paint.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnchorError {
    #[error("unknown anchor name `{0}`")]
    UnknownName(String),
    #[error("malformed anchor: {0}")]
    Malformed(String),
    #[error("dynamic anchor needs at least one candidate")]
    EmptyDynamic,
    #[error("`{0}` cannot be used as a dynamic anchor candidate")]
    NestedNotAllowed(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Anchor(#[from] AnchorError),
    #[error("element `{0}` not found")]
    ElementNotFound(String),
    #[error("endpoint {0} not found")]
    EndpointNotFound(EndpointId),
    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionId),
    #[error("endpoint {endpoint} is full (max {max} connections)")]
    EndpointFull { endpoint: EndpointId, max: usize },
    #[error("endpoint {0} is disabled")]
    EndpointDisabled(EndpointId),
    #[error("element id `{0}` is already in use")]
    ElementIdInUse(String),
    #[error("connection {0} is not floating")]
    NotFloating(ConnectionId),
    #[error("connection {0} is already floating")]
    AlreadyFloating(ConnectionId),
}

pub type Result<T> = std::result::Result<T, EngineError>;
