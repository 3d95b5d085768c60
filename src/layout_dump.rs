use crate::anchor::{AnchorKind, Orientation};
use crate::geometry::{Point, Timestamp};
use crate::host::ElementGeometry;
use crate::layout::continuous::Face;
use crate::scene::SceneRun;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const FACES: [Face; 4] = [Face::Top, Face::Right, Face::Bottom, Face::Left];

#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub elements: Vec<ElementDump>,
    pub endpoints: Vec<EndpointDump>,
    pub connections: Vec<ConnectionDump>,
    pub faces: Vec<FaceDump>,
    pub endpoint_paints: usize,
    pub connection_paints: usize,
}

#[derive(Debug, Serialize)]
pub struct ElementDump {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Serialize)]
pub struct EndpointDump {
    pub name: String,
    pub element: String,
    pub anchor: AnchorKind,
    pub point: Option<[f32; 2]>,
    pub orientation: [f32; 2],
    pub face: Option<Face>,
    pub visible: bool,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct ConnectionDump {
    pub name: String,
    pub source: String,
    pub target: String,
    pub source_element: String,
    pub target_element: String,
    pub scope: String,
    pub points: Option<[[f32; 2]; 2]>,
    pub painted_at: Option<Timestamp>,
}

#[derive(Debug, Serialize)]
pub struct FaceDump {
    pub element: String,
    pub face: Face,
    /// Endpoint names in placement order.
    pub endpoints: Vec<String>,
}

fn pair(point: Point) -> [f32; 2] {
    [point.0, point.1]
}

fn orientation_pair(orientation: Orientation) -> [f32; 2] {
    [orientation.0, orientation.1]
}

impl LayoutDump {
    pub fn from_run(run: &SceneRun) -> Self {
        let elements = run
            .host
            .element_ids()
            .into_iter()
            .filter_map(|id| {
                run.host.element_rect(&id).map(|rect| ElementDump {
                    id,
                    x: rect.x,
                    y: rect.y,
                    width: rect.width,
                    height: rect.height,
                })
            })
            .collect();

        let mut endpoints = Vec::new();
        let mut faces = Vec::new();
        for element in run.manager.elements() {
            let ids = run.manager.endpoints_for(&element).unwrap_or(&[]);
            for id in ids {
                let Ok(endpoint) = run.manager.endpoint(*id) else {
                    continue;
                };
                endpoints.push(EndpointDump {
                    name: run.endpoint_name(*id),
                    element: endpoint.element_id.clone(),
                    anchor: endpoint.anchor.kind(),
                    point: endpoint.point.map(pair),
                    orientation: orientation_pair(endpoint.anchor.orientation()),
                    face: run.manager.continuous_location(*id).map(|loc| loc.face),
                    visible: endpoint.visible,
                    connections: endpoint.connections.len(),
                });
            }
            for face in FACES {
                let entries = run.manager.face_entries(&element, face);
                if entries.is_empty() {
                    continue;
                }
                faces.push(FaceDump {
                    element: element.clone(),
                    face,
                    endpoints: entries.iter().map(|e| run.endpoint_name(e.endpoint)).collect(),
                });
            }
        }

        let connections = run
            .manager
            .connections()
            .map(|conn| ConnectionDump {
                name: run.connection_name(conn.id),
                source: run.endpoint_name(conn.source),
                target: run.endpoint_name(conn.target),
                source_element: conn.source_element.clone(),
                target_element: conn.target_element.clone(),
                scope: conn.scope.clone(),
                points: conn.last_points.map(|(s, t)| [pair(s), pair(t)]),
                painted_at: conn.painted_at,
            })
            .collect();

        LayoutDump {
            elements,
            endpoints,
            connections,
            faces,
            endpoint_paints: run.host.endpoint_paints.len(),
            connection_paints: run.host.connection_paints.len(),
        }
    }
}

/// Writes the dump as pretty JSON to `path`, or stdout when absent.
pub fn write_layout_dump(path: Option<&Path>, run: &SceneRun) -> anyhow::Result<()> {
    let dump = LayoutDump::from_run(run);
    match path {
        Some(path) => {
            let file = File::create(path)?;
            let writer = BufWriter::new(file);
            serde_json::to_writer_pretty(writer, &dump)?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, &dump)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}
