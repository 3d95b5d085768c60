use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::anchor::AnchorSpec;

const DEFAULT_ANCHOR: &str = "BottomCenter";
const DEFAULT_SCOPE: &str = "default";
const AUTO_DEFAULT_CANDIDATES: [&str; 4] = ["TopCenter", "RightMiddle", "BottomCenter", "LeftMiddle"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Anchor for endpoints created without one.
    pub default_anchor: AnchorSpec,
    /// Cap for endpoints created without one; `None` is unlimited.
    pub default_max_connections: Option<usize>,
    pub default_scope: String,
    pub connections_detachable: bool,
    /// Candidates behind the `AutoDefault` anchor name.
    pub auto_default_anchors: Vec<AnchorSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_anchor: AnchorSpec::named(DEFAULT_ANCHOR),
            default_max_connections: Some(1),
            default_scope: DEFAULT_SCOPE.to_string(),
            connections_detachable: true,
            auto_default_anchors: AUTO_DEFAULT_CANDIDATES
                .iter()
                .map(|name| AnchorSpec::named(name))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct EngineConfigFile {
    anchor: Option<AnchorSpec>,
    /// Values below one mean unlimited.
    max_connections: Option<i64>,
    scope: Option<String>,
    connections_detachable: Option<bool>,
    auto_default_anchors: Option<Vec<AnchorSpec>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    engine: Option<EngineConfigFile>,
}

fn parse_config_file(contents: &str, json5_first: bool) -> anyhow::Result<ConfigFile> {
    if json5_first {
        return Ok(json5::from_str(contents)?);
    }
    match serde_json::from_str(contents) {
        Ok(parsed) => Ok(parsed),
        Err(json_err) => json5::from_str(contents)
            .map_err(|_| anyhow::Error::new(json_err).context("config is neither JSON nor JSON5")),
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    let json5_first = path.extension().is_some_and(|ext| ext == "json5");
    let parsed = parse_config_file(&contents, json5_first)?;

    if let Some(engine) = parsed.engine {
        if let Some(v) = engine.anchor {
            config.engine.default_anchor = v;
        }
        if let Some(v) = engine.max_connections {
            config.engine.default_max_connections = if v < 1 { None } else { Some(v as usize) };
        }
        if let Some(v) = engine.scope {
            config.engine.default_scope = v;
        }
        if let Some(v) = engine.connections_detachable {
            config.engine.connections_detachable = v;
        }
        if let Some(v) = engine.auto_default_anchors {
            config.engine.auto_default_anchors = v;
        }
    }

    Ok(config)
}
