pub mod anchor;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod host;
pub mod layout;
pub mod layout_dump;
pub mod scene;

pub use anchor::{Anchor, AnchorKind, AnchorSpec, Orientation, PositionFinder};
#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, EngineConfig, load_config};
pub use error::{AnchorError, EngineError};
pub use geometry::{ElementBox, Point, Rect, Timestamp};
pub use host::{ElementGeometry, Host, Painter, SceneHost};
pub use layout::{
    ConnectionEnd, ConnectionId, ConnectionOptions, EndpointId, EndpointOptions, FloatOutcome,
    RedrawReport, TopologyManager,
};
pub use scene::{SceneDoc, SceneRun, parse_scene, run_scene};
