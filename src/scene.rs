//! Scene documents: element boxes, endpoints and connections declared in
//! JSON or JSON5, followed by a script of line-oriented steps.
//!
//! ```text
//! move A 0 400          set A's box origin, then redraw A
//! drag A 10 20          redraw A as if dragged to (10, 20)
//! redraw [A]            redraw A, or every element
//! detach c1             detach a connection
//! delete a1             delete an endpoint
//! rename A Z            change an element id
//! lock a1 / unlock a1   freeze a dynamic anchor
//! float c1 target on P  lift a connection end onto proxy element P
//! hover c1 over b2      floating end hovers endpoint b2
//! leave c1
//! drop c1 [on b2]       land the floating end
//! suspend / resume      toggle drawing; resume redraws dirty elements
//! ```

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::anchor::AnchorSpec;
use crate::config::EngineConfig;
use crate::geometry::{Point, Rect};
use crate::host::{ContainerContext, SceneHost};
use crate::layout::{
    ConnectionEnd, ConnectionId, ConnectionOptions, EndpointId, EndpointOptions, FloatOutcome,
    RedrawReport, TopologyManager,
};

static MOVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<verb>move|drag)\s+(?P<el>\S+)\s+(?P<x>-?[\d.]+)\s+(?P<y>-?[\d.]+)$").unwrap()
});
static REDRAW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^redraw(?:\s+(?P<el>\S+))?$").unwrap());
static UNARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<verb>detach|delete|lock|unlock|leave)\s+(?P<name>\S+)$").unwrap()
});
static RENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^rename\s+(?P<old>\S+)\s+(?P<new>\S+)$").unwrap());
static FLOAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^float\s+(?P<conn>\S+)\s+(?P<end>source|target)\s+on\s+(?P<proxy>\S+)$").unwrap()
});
static HOVER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^hover\s+(?P<conn>\S+)\s+over\s+(?P<ep>\S+)$").unwrap());
static DROP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^drop\s+(?P<conn>\S+)(?:\s+on\s+(?P<ep>\S+))?$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDecl {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub offset: Option<Point>,
    #[serde(default)]
    pub scroll: Option<Point>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDecl {
    pub name: String,
    pub element: String,
    #[serde(default)]
    pub anchor: Option<AnchorSpec>,
    /// Values below one mean unlimited.
    #[serde(default)]
    pub max_connections: Option<i64>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDecl {
    pub name: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub detachable: Option<bool>,
    #[serde(default)]
    pub cost: Option<f32>,
    #[serde(default)]
    pub bidirectional: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneDoc {
    pub elements: Vec<ElementDecl>,
    pub draggables: Vec<String>,
    pub endpoints: Vec<EndpointDecl>,
    pub connections: Vec<ConnectionDecl>,
    pub steps: Vec<String>,
}

pub fn parse_scene(input: &str) -> Result<SceneDoc> {
    match serde_json::from_str(input) {
        Ok(doc) => Ok(doc),
        Err(json_err) => json5::from_str(input)
            .map_err(|json5_err| anyhow!("invalid scene: {json_err}; as JSON5: {json5_err}")),
    }
}

/// A scene after its steps ran.
#[derive(Debug)]
pub struct SceneRun {
    pub manager: TopologyManager,
    pub host: SceneHost,
    pub endpoint_names: BTreeMap<String, EndpointId>,
    pub connection_names: BTreeMap<String, ConnectionId>,
    pub reports: Vec<RedrawReport>,
}

impl SceneRun {
    pub fn endpoint(&self, name: &str) -> Result<EndpointId> {
        self.endpoint_names
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("unknown endpoint '{name}'"))
    }

    pub fn connection(&self, name: &str) -> Result<ConnectionId> {
        self.connection_names
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("unknown connection '{name}'"))
    }

    pub fn endpoint_name(&self, id: EndpointId) -> String {
        self.endpoint_names
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn connection_name(&self, id: ConnectionId) -> String {
        self.connection_names
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Executes one script line.
    pub fn step(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        if let Some(caps) = MOVE_RE.captures(line) {
            let el = &caps["el"];
            let x: f32 = caps["x"].parse().with_context(|| format!("bad x in '{line}'"))?;
            let y: f32 = caps["y"].parse().with_context(|| format!("bad y in '{line}'"))?;
            let ui = if &caps["verb"] == "move" {
                if !self.host.move_to(el, x, y) {
                    bail!("unknown element '{el}'");
                }
                None
            } else {
                Some((x, y))
            };
            let report = self.manager.redraw(&mut self.host, el, ui, None)?;
            self.reports.push(report);
            return Ok(());
        }
        if let Some(caps) = REDRAW_RE.captures(line) {
            match caps.name("el") {
                Some(el) => {
                    let report = self.manager.redraw(&mut self.host, el.as_str(), None, None)?;
                    self.reports.push(report);
                }
                None => {
                    let reports = self.manager.redraw_all(&mut self.host)?;
                    self.reports.extend(reports);
                }
            }
            return Ok(());
        }
        if let Some(caps) = UNARY_RE.captures(line) {
            let name = &caps["name"];
            match &caps["verb"] {
                "detach" => {
                    let id = self.connection(name)?;
                    self.manager.connection_detached(&mut self.host, id)?;
                    self.connection_names.remove(name);
                }
                "delete" => {
                    let id = self.endpoint(name)?;
                    let attached = self.manager.endpoint(id)?.connections.clone();
                    self.manager.delete_endpoint(&mut self.host, id)?;
                    self.endpoint_names.remove(name);
                    self.connection_names.retain(|_, c| !attached.contains(c));
                }
                "lock" | "unlock" => {
                    let id = self.endpoint(name)?;
                    self.manager.set_anchor_locked(id, &caps["verb"] == "lock")?;
                }
                _ => {
                    let id = self.connection(name)?;
                    self.manager.leave_float(id)?;
                }
            }
            return Ok(());
        }
        if let Some(caps) = RENAME_RE.captures(line) {
            self.manager.change_id(&caps["old"], &caps["new"])?;
            self.host.rename(&caps["old"], &caps["new"]);
            return Ok(());
        }
        if let Some(caps) = FLOAT_RE.captures(line) {
            let id = self.connection(&caps["conn"])?;
            let end = if &caps["end"] == "source" {
                ConnectionEnd::Source
            } else {
                ConnectionEnd::Target
            };
            self.manager
                .begin_float(&mut self.host, id, end, &caps["proxy"])?;
            return Ok(());
        }
        if let Some(caps) = HOVER_RE.captures(line) {
            let id = self.connection(&caps["conn"])?;
            let ep = self.endpoint(&caps["ep"])?;
            self.manager.hover_float(id, ep)?;
            return Ok(());
        }
        if let Some(caps) = DROP_RE.captures(line) {
            let id = self.connection(&caps["conn"])?;
            let drop_on = match caps.name("ep") {
                Some(ep) => Some(self.endpoint(ep.as_str())?),
                None => None,
            };
            let outcome = self.manager.end_float(&mut self.host, id, drop_on)?;
            let name = &caps["conn"];
            info!(connection = %name, ?outcome, "drop");
            if outcome == FloatOutcome::Detached {
                self.connection_names.remove(name);
            }
            return Ok(());
        }
        match line {
            "suspend" => {
                self.manager.set_suspend_drawing(true);
                Ok(())
            }
            "resume" => {
                self.manager.set_suspend_drawing(false);
                let reports = self.manager.redraw_dirty(&mut self.host)?;
                self.reports.extend(reports);
                Ok(())
            }
            _ => bail!("unrecognized step '{line}'"),
        }
    }
}

/// Builds the scene, paints it once, then runs its steps.
pub fn run_scene(doc: &SceneDoc, config: EngineConfig) -> Result<SceneRun> {
    let mut host = SceneHost::new();
    for el in &doc.elements {
        host.set_rect(&el.id, Rect::new(el.x, el.y, el.width, el.height));
        if let Some(parent) = &el.parent {
            host.set_parent(&el.id, parent);
        }
        if el.offset.is_some() || el.scroll.is_some() {
            host.set_container(
                &el.id,
                ContainerContext {
                    offset: el.offset.unwrap_or((0.0, 0.0)),
                    scroll: el.scroll.unwrap_or((0.0, 0.0)),
                },
            );
        }
    }

    let mut manager = TopologyManager::new(config);
    for draggable in &doc.draggables {
        manager.register_draggable(&host, draggable);
    }

    let mut endpoint_names = BTreeMap::new();
    for decl in &doc.endpoints {
        let defaults = EndpointOptions::default();
        let options = EndpointOptions {
            anchor: decl.anchor.clone(),
            max_connections: decl.max_connections,
            enabled: decl.enabled.unwrap_or(defaults.enabled),
            visible: decl.visible.unwrap_or(defaults.visible),
            scope: decl.scope.clone(),
        };
        let id = manager
            .add_endpoint(&host, &decl.element, options)
            .with_context(|| format!("endpoint '{}'", decl.name))?;
        if endpoint_names.insert(decl.name.clone(), id).is_some() {
            bail!("duplicate endpoint name '{}'", decl.name);
        }
    }

    let mut run = SceneRun {
        manager,
        host,
        endpoint_names,
        connection_names: BTreeMap::new(),
        reports: Vec::new(),
    };

    for decl in &doc.connections {
        let source = run.endpoint(&decl.source)?;
        let target = run.endpoint(&decl.target)?;
        let id = run
            .manager
            .connect(
                source,
                target,
                ConnectionOptions {
                    scope: decl.scope.clone(),
                    detachable: decl.detachable,
                    cost: decl.cost,
                    bidirectional: decl.bidirectional,
                },
            )
            .with_context(|| format!("connection '{}'", decl.name))?;
        if run.connection_names.insert(decl.name.clone(), id).is_some() {
            bail!("duplicate connection name '{}'", decl.name);
        }
    }

    let reports = run.manager.redraw_all(&mut run.host)?;
    run.reports.extend(reports);

    for (idx, line) in doc.steps.iter().enumerate() {
        run.step(line)
            .with_context(|| format!("step {}: {}", idx + 1, line.trim()))?;
    }
    Ok(run)
}
