//! Topology manager: per-element endpoint and connection registries and the
//! redraw pass that keeps anchor points consistent as elements move.

pub mod continuous;
pub mod drag;
pub(crate) mod types;
pub use types::*;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::anchor::{
    Anchor, AnchorSpec, ComputeParams, FloatingAnchor, Orientation, PositionFinder,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::geometry::{ElementBox, GeometryCache, Point, Timestamp};
use crate::host::{ConnectionPaint, ElementGeometry, EndpointPaint, Host};

use continuous::{
    ContinuousLocation, ContinuousPlacement, Face, FaceEntry, OrientationCache, RepaintSet,
};
use drag::DragManager;

/// Tie-break order of face entries for source and target ends.
const SOURCE_ORDER: i8 = 0;
const TARGET_ORDER: i8 = -1;

#[derive(Debug, Clone)]
struct FloatState {
    end: ConnectionEnd,
    parked: EndpointId,
    transient: EndpointId,
    proxy: String,
    fixed_element: String,
}

/// How a floating connection end came to rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FloatOutcome {
    /// Moved onto the drop endpoint.
    Attached(EndpointId),
    /// Returned to the endpoint it was dragged away from.
    Restored(EndpointId),
    /// Nowhere to go back to; the connection was detached.
    Detached,
}

#[derive(Debug)]
pub struct TopologyManager {
    config: EngineConfig,
    endpoints: HashMap<EndpointId, Endpoint>,
    connections: BTreeMap<ConnectionId, Connection>,
    endpoints_by_element: HashMap<String, Vec<EndpointId>>,
    connections_by_element: HashMap<String, Vec<ConnectionRef>>,
    placement: ContinuousPlacement,
    geometry: GeometryCache,
    drag: DragManager,
    floating: BTreeMap<ConnectionId, FloatState>,
    dirty: BTreeSet<String>,
    stale: BTreeSet<String>,
    next_endpoint: u64,
    next_connection: u64,
    clock: u64,
    suspended: bool,
}

impl Default for TopologyManager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TopologyManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            endpoints: HashMap::new(),
            connections: BTreeMap::new(),
            endpoints_by_element: HashMap::new(),
            connections_by_element: HashMap::new(),
            placement: ContinuousPlacement::new(),
            geometry: GeometryCache::new(),
            drag: DragManager::new(),
            floating: BTreeMap::new(),
            dirty: BTreeSet::new(),
            stale: BTreeSet::new(),
            next_endpoint: 1,
            next_connection: 1,
            clock: 1,
            suspended: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fresh paint token, larger than any seen so far.
    pub fn next_timestamp(&mut self) -> Timestamp {
        let ts = Timestamp(self.clock);
        self.clock += 1;
        ts
    }

    fn observe_timestamp(&mut self, ts: Timestamp) {
        if ts.0 >= self.clock {
            self.clock = ts.0 + 1;
        }
    }

    fn is_known(&self, element: &str) -> bool {
        self.endpoints_by_element.contains_key(element)
            || self.connections_by_element.contains_key(element)
    }

    fn ensure_known(&self, element: &str) -> Result<()> {
        if self.is_known(element) {
            Ok(())
        } else {
            Err(EngineError::ElementNotFound(element.to_string()))
        }
    }

    /// Every element with registered endpoints or connections, sorted.
    pub fn elements(&self) -> Vec<String> {
        let mut ids: BTreeSet<&String> = self.endpoints_by_element.keys().collect();
        ids.extend(self.connections_by_element.keys());
        ids.into_iter().cloned().collect()
    }

    pub fn endpoint(&self, id: EndpointId) -> Result<&Endpoint> {
        self.endpoints.get(&id).ok_or(EngineError::EndpointNotFound(id))
    }

    pub fn connection(&self, id: ConnectionId) -> Result<&Connection> {
        self.connections
            .get(&id)
            .ok_or(EngineError::ConnectionNotFound(id))
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn endpoints_for(&self, element: &str) -> Result<&[EndpointId]> {
        self.ensure_known(element)?;
        Ok(self
            .endpoints_by_element
            .get(element)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    pub fn connections_for(&self, element: &str) -> Result<&[ConnectionRef]> {
        self.ensure_known(element)?;
        Ok(self
            .connections_by_element
            .get(element)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    pub fn is_dirty(&self, element: &str) -> bool {
        self.dirty.contains(element)
    }

    pub fn face_entries(&self, element: &str, face: Face) -> &[FaceEntry] {
        self.placement.entries(element, face)
    }

    pub fn continuous_location(&self, endpoint: EndpointId) -> Option<ContinuousLocation> {
        self.placement.location(endpoint)
    }

    pub fn is_floating(&self, connection: ConnectionId) -> bool {
        self.floating.contains_key(&connection)
    }

    // ── Registration ────────────────────────────────────────────────

    /// Creates an endpoint on `element` and registers it.
    pub fn add_endpoint<G>(
        &mut self,
        host: &G,
        element: &str,
        options: EndpointOptions,
    ) -> Result<EndpointId>
    where
        G: ElementGeometry + ?Sized,
    {
        if host.element_rect(element).is_none() {
            return Err(EngineError::ElementNotFound(element.to_string()));
        }
        let spec = options
            .anchor
            .unwrap_or_else(|| self.config.default_anchor.clone());
        let anchor = spec.build(&self.config.auto_default_anchors)?;
        let max_connections = match options.max_connections {
            Some(value) => ConnectionCap::from(value),
            None => ConnectionCap::from(self.config.default_max_connections),
        };
        let id = EndpointId(self.next_endpoint);
        self.next_endpoint += 1;
        self.add(Endpoint {
            id,
            element_id: element.to_string(),
            anchor,
            connections: Vec::new(),
            max_connections,
            enabled: options.enabled,
            visible: options.visible,
            scope: options
                .scope
                .unwrap_or_else(|| self.config.default_scope.clone()),
            painted_at: None,
            point: None,
            floating: false,
        });
        self.drag.endpoint_added(host, element);
        debug!(%id, %element, anchor = %spec, "endpoint added");
        Ok(id)
    }

    /// Registers an already-built endpoint under its element.
    pub fn add(&mut self, endpoint: Endpoint) {
        let element = endpoint.element_id.clone();
        self.endpoints_by_element
            .entry(element.clone())
            .or_default()
            .push(endpoint.id);
        self.endpoints.insert(endpoint.id, endpoint);
        self.dirty.insert(element);
    }

    /// Connects two endpoints after checking they exist, are enabled and
    /// have room.
    pub fn connect(
        &mut self,
        source: EndpointId,
        target: EndpointId,
        options: ConnectionOptions,
    ) -> Result<ConnectionId> {
        for id in [source, target] {
            let endpoint = self.endpoint(id)?;
            if !endpoint.enabled {
                return Err(EngineError::EndpointDisabled(id));
            }
            if endpoint.is_full() {
                let max = match endpoint.max_connections {
                    ConnectionCap::Limited(max) => max,
                    ConnectionCap::Unlimited => usize::MAX,
                };
                return Err(EngineError::EndpointFull { endpoint: id, max });
            }
        }
        let (source_element, source_scope) = {
            let ep = self.endpoint(source)?;
            (ep.element_id.clone(), ep.scope.clone())
        };
        let target_element = self.endpoint(target)?.element_id.clone();
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        let connection = Connection {
            id,
            source,
            target,
            source_element,
            target_element,
            scope: options.scope.unwrap_or(source_scope),
            detachable: options
                .detachable
                .unwrap_or(self.config.connections_detachable),
            cost: options.cost.unwrap_or(1.0),
            bidirectional: options.bidirectional,
            painted_at: None,
            last_points: None,
        };
        self.new_connection(connection)
    }

    /// Registers a connection with both of its endpoints and against the
    /// element each end would need repainting for. A self-loop is
    /// registered once, and its target endpoint is hidden when the source
    /// is continuous.
    pub fn new_connection(&mut self, connection: Connection) -> Result<ConnectionId> {
        self.endpoint(connection.source)?;
        self.endpoint(connection.target)?;
        let id = connection.id;
        for endpoint in [connection.source, connection.target] {
            if let Some(ep) = self.endpoints.get_mut(&endpoint)
                && !ep.connections.contains(&id)
            {
                ep.connections.push(id);
            }
        }
        self.register_refs(&connection);
        if connection.is_self_loop()
            && connection.source != connection.target
            && self
                .endpoints
                .get(&connection.source)
                .is_some_and(Endpoint::is_continuous)
            && let Some(target) = self.endpoints.get_mut(&connection.target)
        {
            target.visible = false;
        }
        self.dirty.insert(connection.source_element.clone());
        debug!(
            %id,
            source = %connection.source_element,
            target = %connection.target_element,
            "connection registered"
        );
        self.next_connection = self.next_connection.max(id.0 + 1);
        self.connections.insert(id, connection);
        Ok(id)
    }

    fn register_refs(&mut self, connection: &Connection) {
        let is_dynamic = |id: EndpointId| {
            self.endpoints
                .get(&id)
                .is_some_and(|ep| ep.anchor.is_dynamic())
        };
        let source_ref = ConnectionRef {
            connection: connection.id,
            other_endpoint: connection.source,
            other_is_dynamic: is_dynamic(connection.source),
        };
        let target_ref = ConnectionRef {
            connection: connection.id,
            other_endpoint: connection.target,
            other_is_dynamic: is_dynamic(connection.target),
        };
        self.connections_by_element
            .entry(connection.target_element.clone())
            .or_default()
            .push(source_ref);
        if !connection.is_self_loop() {
            self.connections_by_element
                .entry(connection.source_element.clone())
                .or_default()
                .push(target_ref);
        }
    }

    fn unregister_refs(&mut self, id: ConnectionId) {
        for refs in self.connections_by_element.values_mut() {
            refs.retain(|r| r.connection != id);
        }
        self.connections_by_element
            .retain(|element, refs| !refs.is_empty() || self.endpoints_by_element.contains_key(element));
    }

    /// Removes a connection: unregisters it, drops the face entries of both
    /// ends and redraws both elements so their remaining tenants re-spread.
    pub fn connection_detached<H>(&mut self, host: &mut H, id: ConnectionId) -> Result<Connection>
    where
        H: Host + ?Sized,
    {
        let connection = self
            .connections
            .remove(&id)
            .ok_or(EngineError::ConnectionNotFound(id))?;
        self.unregister_refs(id);
        if let Some(state) = self.floating.remove(&id) {
            self.drop_transient(&state);
        }
        for endpoint in [connection.source, connection.target] {
            if let Some(ep) = self.endpoints.get_mut(&endpoint) {
                ep.connections.retain(|c| *c != id);
            }
            self.placement.purge_endpoint(endpoint, &mut RepaintSet::new());
        }
        self.dirty.insert(connection.source_element.clone());
        debug!(%id, "connection detached");

        for (idx, element) in [&connection.source_element, &connection.target_element]
            .into_iter()
            .enumerate()
        {
            if idx == 1 && connection.is_self_loop() {
                break;
            }
            if self.is_known(element) {
                self.redraw(host, element, None, None)?;
            }
        }
        Ok(connection)
    }

    /// Detaches every connection of the endpoint, then unregisters it. A
    /// transient drag endpoint goes away with its connection.
    pub fn delete_endpoint<H>(&mut self, host: &mut H, id: EndpointId) -> Result<()>
    where
        H: Host + ?Sized,
    {
        let endpoint = self.endpoint(id)?;
        let transient = endpoint.floating;
        let connections = endpoint.connections.clone();
        for connection in connections {
            if self.connections.contains_key(&connection) {
                self.connection_detached(host, connection)?;
            }
        }
        let Some(endpoint) = self.endpoints.remove(&id) else {
            if transient {
                debug!(%id, "transient endpoint dropped with its connection");
                return Ok(());
            }
            return Err(EngineError::EndpointNotFound(id));
        };
        if let Some(list) = self.endpoints_by_element.get_mut(&endpoint.element_id) {
            list.retain(|e| *e != id);
        }
        self.placement.purge_endpoint(id, &mut RepaintSet::new());
        self.drag.endpoint_deleted(&endpoint.element_id);
        debug!(%id, element = %endpoint.element_id, "endpoint deleted");
        Ok(())
    }

    /// Deletes every endpoint on `element`. Returns how many were removed.
    pub fn remove_all_endpoints<H>(&mut self, host: &mut H, element: &str) -> Result<usize>
    where
        H: Host + ?Sized,
    {
        let ids = self.endpoints_for(element)?.to_vec();
        for id in &ids {
            self.delete_endpoint(host, *id)?;
        }
        Ok(ids.len())
    }

    pub fn delete_every_endpoint<H>(&mut self, host: &mut H) -> Result<()>
    where
        H: Host + ?Sized,
    {
        let mut ids: Vec<EndpointId> = self
            .endpoints
            .values()
            .filter(|ep| !ep.floating)
            .map(|ep| ep.id)
            .collect();
        ids.sort();
        for id in ids {
            if self.endpoints.contains_key(&id) {
                self.delete_endpoint(host, id)?;
            }
        }
        Ok(())
    }

    /// Moves an endpoint, and the ends of its connections, to another element.
    pub fn set_element<G>(&mut self, host: &G, id: EndpointId, element: &str) -> Result<()>
    where
        G: ElementGeometry + ?Sized,
    {
        if host.element_rect(element).is_none() {
            return Err(EngineError::ElementNotFound(element.to_string()));
        }
        let old_element = self.endpoint(id)?.element_id.clone();
        if old_element == element {
            return Ok(());
        }
        if let Some(list) = self.endpoints_by_element.get_mut(&old_element) {
            list.retain(|e| *e != id);
        }
        self.endpoints_by_element
            .entry(element.to_string())
            .or_default()
            .push(id);
        let connections = match self.endpoints.get_mut(&id) {
            Some(ep) => {
                ep.element_id = element.to_string();
                ep.connections.clone()
            }
            None => return Err(EngineError::EndpointNotFound(id)),
        };
        self.placement.purge_endpoint(id, &mut RepaintSet::new());
        for conn_id in connections {
            self.unregister_refs(conn_id);
            let Some(connection) = self.connections.get_mut(&conn_id) else {
                continue;
            };
            if let Some(end) = connection.end_of(id) {
                connection.set_end(end, id, element);
            }
            if connection.source == id && connection.target == id {
                connection.set_end(ConnectionEnd::Target, id, element);
            }
            let snapshot = connection.clone();
            self.register_refs(&snapshot);
        }
        self.drag.endpoint_deleted(&old_element);
        self.drag.endpoint_added(host, element);
        self.dirty.insert(old_element);
        self.dirty.insert(element.to_string());
        Ok(())
    }

    /// Rehomes all bookkeeping from `old_id` to `new_id`.
    pub fn change_id(&mut self, old_id: &str, new_id: &str) -> Result<()> {
        self.ensure_known(old_id)?;
        if old_id == new_id {
            return Ok(());
        }
        if self.is_known(new_id) {
            return Err(EngineError::ElementIdInUse(new_id.to_string()));
        }
        if let Some(list) = self.endpoints_by_element.remove(old_id) {
            for id in &list {
                if let Some(ep) = self.endpoints.get_mut(id) {
                    ep.element_id = new_id.to_string();
                }
            }
            self.endpoints_by_element.insert(new_id.to_string(), list);
        }
        if let Some(refs) = self.connections_by_element.remove(old_id) {
            self.connections_by_element.insert(new_id.to_string(), refs);
        }
        for connection in self.connections.values_mut() {
            if connection.source_element == old_id {
                connection.source_element = new_id.to_string();
            }
            if connection.target_element == old_id {
                connection.target_element = new_id.to_string();
            }
        }
        for state in self.floating.values_mut() {
            if state.proxy == old_id {
                state.proxy = new_id.to_string();
            }
            if state.fixed_element == old_id {
                state.fixed_element = new_id.to_string();
            }
        }
        self.placement.rename_element(old_id, new_id);
        self.geometry.rename(old_id, new_id);
        self.drag.rename(old_id, new_id);
        if self.dirty.remove(old_id) {
            self.dirty.insert(new_id.to_string());
        }
        if self.stale.remove(old_id) {
            self.stale.insert(new_id.to_string());
        }
        debug!(old = %old_id, new = %new_id, "element id changed");
        Ok(())
    }

    /// Drops all state. Configuration and issued ids are kept.
    pub fn reset(&mut self) {
        self.endpoints.clear();
        self.connections.clear();
        self.endpoints_by_element.clear();
        self.connections_by_element.clear();
        self.placement.clear();
        self.geometry.clear();
        self.drag.reset();
        self.floating.clear();
        self.dirty.clear();
        self.stale.clear();
        self.suspended = false;
    }

    /// Forgets the cached size of `element`; its next redraw reads the box
    /// from the host even under a drag origin or a repeated timestamp.
    pub fn invalidate(&mut self, element: &str) -> Result<()> {
        self.ensure_known(element)?;
        self.stale.insert(element.to_string());
        self.dirty.insert(element.to_string());
        Ok(())
    }

    /// While set, `redraw` only marks elements dirty. Returns the previous
    /// value.
    pub fn set_suspend_drawing(&mut self, suspend: bool) -> bool {
        std::mem::replace(&mut self.suspended, suspend)
    }

    /// Freezes or releases a dynamic anchor's selection. Returns false for
    /// anchors that cannot be locked.
    pub fn set_anchor_locked(&mut self, id: EndpointId, locked: bool) -> Result<bool> {
        let endpoint = self
            .endpoints
            .get_mut(&id)
            .ok_or(EngineError::EndpointNotFound(id))?;
        Ok(endpoint.anchor.set_locked(locked))
    }

    pub fn register_draggable<G>(&mut self, host: &G, element: &str)
    where
        G: ElementGeometry + ?Sized,
    {
        self.drag.register_draggable(host, element);
    }

    /// Anchor spec for a drop at `drop` on `element`. Points on an edge
    /// take that edge's orientation.
    pub fn anchor_from_drop<G>(
        &self,
        host: &G,
        element: &str,
        drop: Point,
        finder: PositionFinder,
    ) -> Result<AnchorSpec>
    where
        G: ElementGeometry + ?Sized,
    {
        let rect = host
            .element_rect(element)
            .ok_or_else(|| EngineError::ElementNotFound(element.to_string()))?;
        let (x, y) = finder.locate(drop, &ElementBox::from_rect(element, rect));
        let (ox, oy) = if x <= 0.0 {
            (-1.0, 0.0)
        } else if x >= 1.0 {
            (1.0, 0.0)
        } else if y <= 0.0 {
            (0.0, -1.0)
        } else if y >= 1.0 {
            (0.0, 1.0)
        } else {
            (0.0, 0.0)
        };
        Ok(AnchorSpec::Coords(vec![x, y, ox, oy]))
    }

    // ── Floating connections ────────────────────────────────────────

    /// Lifts one end of a connection onto a drag proxy element. Returns the
    /// transient endpoint that carries it.
    pub fn begin_float<H>(
        &mut self,
        host: &mut H,
        id: ConnectionId,
        end: ConnectionEnd,
        proxy: &str,
    ) -> Result<EndpointId>
    where
        H: Host + ?Sized,
    {
        if self.floating.contains_key(&id) {
            return Err(EngineError::AlreadyFloating(id));
        }
        if host.element_rect(proxy).is_none() {
            return Err(EngineError::ElementNotFound(proxy.to_string()));
        }
        let connection = self.connection(id)?;
        let parked = connection.endpoint(end);
        let fixed_endpoint = connection.endpoint(end.other());
        let fixed_element = connection.element(end.other()).to_string();
        let (reference_orientation, reference_location, scope) = {
            let ep = self.endpoint(parked)?;
            (ep.anchor.orientation(), ep.anchor.current_location(), ep.scope.clone())
        };

        self.unregister_refs(id);
        if let Some(ep) = self.endpoints.get_mut(&parked) {
            ep.connections.retain(|c| *c != id);
        }
        self.placement.purge_endpoint(parked, &mut RepaintSet::new());

        let transient = EndpointId(self.next_endpoint);
        self.next_endpoint += 1;
        self.add(Endpoint {
            id: transient,
            element_id: proxy.to_string(),
            anchor: Anchor::Floating(FloatingAnchor::new(
                reference_orientation,
                reference_location,
            )),
            connections: vec![id],
            max_connections: ConnectionCap::Unlimited,
            enabled: true,
            visible: true,
            scope,
            painted_at: None,
            point: None,
            floating: true,
        });
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.set_end(end, transient, proxy);
        }
        let fixed_is_dynamic = self
            .endpoints
            .get(&fixed_endpoint)
            .is_some_and(|ep| ep.anchor.is_dynamic());
        self.connections_by_element
            .entry(proxy.to_string())
            .or_default()
            .push(ConnectionRef {
                connection: id,
                other_endpoint: fixed_endpoint,
                other_is_dynamic: fixed_is_dynamic,
            });
        self.floating.insert(
            id,
            FloatState {
                end,
                parked,
                transient,
                proxy: proxy.to_string(),
                fixed_element,
            },
        );
        trace!(%id, %proxy, "connection floating");
        self.redraw(host, proxy, None, None)?;
        Ok(transient)
    }

    /// The floating end hovers `candidate`: borrow its orientation.
    pub fn hover_float(&mut self, id: ConnectionId, candidate: EndpointId) -> Result<()> {
        let transient = self
            .floating
            .get(&id)
            .ok_or(EngineError::NotFloating(id))?
            .transient;
        let orientation: Orientation = self.endpoint(candidate)?.anchor.orientation();
        if let Some(Endpoint {
            anchor: Anchor::Floating(anchor),
            ..
        }) = self.endpoints.get_mut(&transient)
        {
            anchor.over(orientation);
        }
        Ok(())
    }

    pub fn leave_float(&mut self, id: ConnectionId) -> Result<()> {
        let transient = self
            .floating
            .get(&id)
            .ok_or(EngineError::NotFloating(id))?
            .transient;
        if let Some(Endpoint {
            anchor: Anchor::Floating(anchor),
            ..
        }) = self.endpoints.get_mut(&transient)
        {
            anchor.out();
        }
        Ok(())
    }

    /// Lands a floating end on `drop_on` when it exists, is enabled and has
    /// room; otherwise puts it back where it came from.
    pub fn end_float<H>(
        &mut self,
        host: &mut H,
        id: ConnectionId,
        drop_on: Option<EndpointId>,
    ) -> Result<FloatOutcome>
    where
        H: Host + ?Sized,
    {
        let state = self
            .floating
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFloating(id))?;
        let accepted = match drop_on {
            Some(candidate) => {
                let ep = self.endpoint(candidate)?;
                if ep.enabled && !ep.is_full() {
                    Some(candidate)
                } else {
                    warn!(%id, endpoint = %candidate, "drop target refused the connection");
                    None
                }
            }
            None => None,
        };
        let (landing, outcome) = match accepted {
            Some(candidate) => (candidate, FloatOutcome::Attached(candidate)),
            None if self.endpoints.contains_key(&state.parked) => {
                (state.parked, FloatOutcome::Restored(state.parked))
            }
            None => {
                self.connection_detached(host, id)?;
                return Ok(FloatOutcome::Detached);
            }
        };

        self.floating.remove(&id);
        self.unregister_refs(id);
        self.drop_transient(&state);
        let element = self.endpoint(landing)?.element_id.clone();
        if let Some(ep) = self.endpoints.get_mut(&landing) {
            ep.connections.push(id);
        }
        let snapshot = match self.connections.get_mut(&id) {
            Some(connection) => {
                connection.set_end(state.end, landing, &element);
                connection.clone()
            }
            None => return Err(EngineError::ConnectionNotFound(id)),
        };
        self.register_refs(&snapshot);
        self.dirty.insert(state.fixed_element.clone());
        self.dirty.insert(element.clone());
        debug!(%id, ?outcome, "floating connection landed");

        self.redraw(host, &state.fixed_element, None, None)?;
        if element != state.fixed_element {
            self.redraw(host, &element, None, None)?;
        }
        Ok(outcome)
    }

    fn drop_transient(&mut self, state: &FloatState) {
        self.endpoints.remove(&state.transient);
        let now_empty = match self.endpoints_by_element.get_mut(&state.proxy) {
            Some(list) => {
                list.retain(|e| *e != state.transient);
                list.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.endpoints_by_element.remove(&state.proxy);
        }
        if self
            .connections_by_element
            .get(&state.proxy)
            .is_some_and(Vec::is_empty)
        {
            self.connections_by_element.remove(&state.proxy);
        }
        self.dirty.remove(&state.proxy);
    }

    // ── Redraw ──────────────────────────────────────────────────────

    /// Repaints everything affected by `element` having moved. `ui` is an
    /// explicit origin for the element (a drag position) that overrides the
    /// host's box; `timestamp` identifies the paint cycle and a fresh one
    /// is issued when absent.
    pub fn redraw<H>(
        &mut self,
        host: &mut H,
        element: &str,
        ui: Option<Point>,
        timestamp: Option<Timestamp>,
    ) -> Result<RedrawReport>
    where
        H: Host + ?Sized,
    {
        self.ensure_known(element)?;
        if self.suspended {
            warn!(%element, "redraw requested while drawing is suspended");
            self.dirty.insert(element.to_string());
            return Ok(RedrawReport {
                element: element.to_string(),
                ..RedrawReport::default()
            });
        }
        let ts = match timestamp {
            Some(ts) => {
                self.observe_timestamp(ts);
                ts
            }
            None => self.next_timestamp(),
        };
        let mut report = RedrawReport {
            element: element.to_string(),
            timestamp: Some(ts),
            ..RedrawReport::default()
        };
        if let Some(origin) = ui {
            let mut seen = BTreeSet::from([element.to_string()]);
            self.move_dependents(&*host, element, origin, ts, &mut seen)?;
        }
        let mut visited = BTreeSet::new();
        self.redraw_element(host, element, ui, ts, &mut visited, &mut report)?;
        debug!(
            %element,
            %ts,
            endpoints = report.endpoints_painted.len(),
            connections = report.connections_painted.len(),
            elements = report.elements.len(),
            "redraw"
        );
        Ok(report)
    }

    /// Redraws every registered element in one paint cycle.
    pub fn redraw_all<H>(&mut self, host: &mut H) -> Result<Vec<RedrawReport>>
    where
        H: Host + ?Sized,
    {
        let ts = self.next_timestamp();
        let mut reports = Vec::new();
        for element in self.elements() {
            reports.push(self.redraw(host, &element, None, Some(ts))?);
        }
        Ok(reports)
    }

    /// Redraws only elements flagged dirty since their last redraw.
    pub fn redraw_dirty<H>(&mut self, host: &mut H) -> Result<Vec<RedrawReport>>
    where
        H: Host + ?Sized,
    {
        let ts = self.next_timestamp();
        let pending: Vec<String> = self.dirty.iter().cloned().collect();
        let mut reports = Vec::new();
        for element in pending {
            if self.is_known(&element) {
                reports.push(self.redraw(host, &element, None, Some(ts))?);
            } else {
                self.dirty.remove(&element);
            }
        }
        Ok(reports)
    }

    /// Moves the cached boxes of everything dragged along with `element` to
    /// their offsets from `origin`, so connections painted before the
    /// dependents' own pass already see them at the dragged position.
    fn move_dependents<G>(
        &mut self,
        host: &G,
        element: &str,
        origin: Point,
        ts: Timestamp,
        seen: &mut BTreeSet<String>,
    ) -> Result<()>
    where
        G: ElementGeometry + ?Sized,
    {
        for dependent in self.drag.elements_for_draggable(element) {
            if !self.is_known(&dependent.id) || !seen.insert(dependent.id.clone()) {
                continue;
            }
            let moved = (origin.0 + dependent.offset.0, origin.1 + dependent.offset.1);
            let recalc = self.stale.remove(&dependent.id);
            self.geometry
                .refresh(host, &dependent.id, Some(ts), Some(moved), recalc)?;
            self.move_dependents(host, &dependent.id, moved, ts, seen)?;
        }
        Ok(())
    }

    fn redraw_element<H>(
        &mut self,
        host: &mut H,
        element: &str,
        ui: Option<Point>,
        ts: Timestamp,
        visited: &mut BTreeSet<String>,
        report: &mut RedrawReport,
    ) -> Result<()>
    where
        H: Host + ?Sized,
    {
        visited.insert(element.to_string());
        report.elements.push(element.to_string());

        let recalc = self.stale.remove(element);
        self.geometry.refresh(&*host, element, Some(ts), ui, recalc)?;

        let refs = self
            .connections_by_element
            .get(element)
            .cloned()
            .unwrap_or_default();
        let mut repaint = RepaintSet::new();
        let mut orientations = OrientationCache::new();
        let mut anchors_to_update: Vec<String> = Vec::new();

        for r in &refs {
            let Some(connection) = self.connections.get(&r.connection).cloned() else {
                continue;
            };
            let source_continuous = self.endpoint_is_continuous(connection.source);
            let target_continuous = self.endpoint_is_continuous(connection.target);
            if !source_continuous && !target_continuous {
                continue;
            }
            self.update_continuous_lists(
                &*host,
                &connection,
                (source_continuous, target_continuous),
                ts,
                &mut orientations,
                &mut repaint,
            )?;
            for (continuous, owner) in [
                (source_continuous, &connection.source_element),
                (target_continuous, &connection.target_element),
            ] {
                if continuous && !anchors_to_update.contains(owner) {
                    anchors_to_update.push(owner.clone());
                }
            }
            repaint.add_connection(connection.id);
            let far_end = if connection.source_element == element {
                ConnectionEnd::Target
            } else {
                ConnectionEnd::Source
            };
            let far_continuous = match far_end {
                ConnectionEnd::Source => source_continuous,
                ConnectionEnd::Target => target_continuous,
            };
            if far_continuous {
                repaint.add_endpoint(connection.endpoint(far_end));
            }
        }

        for owner in &anchors_to_update {
            let owner_box = self.geometry.refresh(&*host, owner, Some(ts), None, false)?;
            let geometry_host = &*host;
            let adjust = |p: Point| geometry_host.adjust_for_ancestors(owner, p);
            self.placement.place_anchors(&owner_box, &adjust);
        }

        // (a) endpoints owned by the element
        let own = self
            .endpoints_by_element
            .get(element)
            .cloned()
            .unwrap_or_default();
        for id in own {
            self.paint_endpoint(host, id, ts, None, false, report)?;
        }
        // (b) endpoints pulled in by continuous placement
        for id in repaint.endpoints().to_vec() {
            if self.endpoints.contains_key(&id) {
                self.paint_endpoint(host, id, ts, None, false, report)?;
            }
        }
        // (c) dynamic anchors on the far side reselect against this element
        for r in &refs {
            let Some(other) = self.endpoints.get(&r.other_endpoint) else {
                continue;
            };
            if r.other_is_dynamic {
                let siblings = other.connections.clone();
                self.paint_endpoint(host, r.other_endpoint, ts, Some(element), true, report)?;
                repaint.add_connection(r.connection);
                for sibling in siblings {
                    repaint.add_connection(sibling);
                }
            } else if !other.is_continuous() {
                repaint.add_connection(r.connection);
            }
        }
        // (d) floating connections whose fixed end sits here
        let floating: Vec<ConnectionId> = self
            .floating
            .iter()
            .filter(|(_, state)| state.fixed_element == element)
            .map(|(id, _)| *id)
            .collect();
        for id in floating {
            repaint.add_connection(id);
        }
        // (e)
        for id in repaint.connections().to_vec() {
            if self.connections.contains_key(&id) {
                self.paint_connection(host, id, ts, report)?;
            }
        }

        for dependent in self.drag.elements_for_draggable(element) {
            if visited.contains(&dependent.id) {
                warn!(%element, dependent = %dependent.id, "dependent cycle cut");
                continue;
            }
            if !self.is_known(&dependent.id) {
                continue;
            }
            let child_ui =
                ui.map(|(x, y)| (x + dependent.offset.0, y + dependent.offset.1));
            self.redraw_element(host, &dependent.id, child_ui, ts, visited, report)?;
        }

        self.dirty.remove(element);
        Ok(())
    }

    fn endpoint_is_continuous(&self, id: EndpointId) -> bool {
        self.endpoints.get(&id).is_some_and(Endpoint::is_continuous)
    }

    fn update_continuous_lists<G>(
        &mut self,
        host: &G,
        connection: &Connection,
        (source_continuous, target_continuous): (bool, bool),
        ts: Timestamp,
        orientations: &mut OrientationCache,
        repaint: &mut RepaintSet,
    ) -> Result<()>
    where
        G: ElementGeometry + ?Sized,
    {
        let source_box =
            self.geometry
                .refresh(host, &connection.source_element, Some(ts), None, false)?;
        let target_box =
            self.geometry
                .refresh(host, &connection.target_element, Some(ts), None, false)?;

        let (faces, theta, theta2) = if connection.is_self_loop() {
            let up = -std::f32::consts::FRAC_PI_2;
            ((Face::Top, Face::Top), up, up)
        } else {
            let o = orientations.get_or_compute(&source_box, &target_box);
            (o.faces, o.theta, o.theta2)
        };

        if source_continuous {
            self.placement.update_anchor_list(
                &connection.source_element,
                faces.0,
                FaceEntry {
                    angle: theta,
                    order: SOURCE_ORDER,
                    connection: connection.id,
                    is_target: false,
                    other_element: connection.target_element.clone(),
                    endpoint: connection.source,
                },
                repaint,
            );
        }
        if target_continuous && connection.target != connection.source {
            self.placement.update_anchor_list(
                &connection.target_element,
                faces.1,
                FaceEntry {
                    angle: theta2,
                    order: TARGET_ORDER,
                    connection: connection.id,
                    is_target: true,
                    other_element: connection.source_element.clone(),
                    endpoint: connection.target,
                },
                repaint,
            );
        }
        Ok(())
    }

    /// Computes an endpoint's anchor for `ts`. Dynamic anchors select
    /// against `toward`, or the far element of their first connection.
    fn resolve_anchor<G>(
        &mut self,
        host: &G,
        id: EndpointId,
        ts: Timestamp,
        toward: Option<&str>,
    ) -> Result<(Point, Orientation)>
    where
        G: ElementGeometry + ?Sized,
    {
        let endpoint = self.endpoint(id)?;
        let element_id = endpoint.element_id.clone();
        let target_id = if endpoint.anchor.is_dynamic() {
            match toward {
                Some(target) => Some(target.to_string()),
                None => endpoint
                    .connections
                    .first()
                    .and_then(|c| self.connections.get(c))
                    .and_then(|c| c.end_of(id).map(|end| c.element(end.other()).to_string())),
            }
        } else {
            None
        };
        let element_box = self
            .geometry
            .refresh(host, &element_id, Some(ts), None, false)?;
        let target_box = match target_id {
            Some(target) => Some(self.geometry.refresh(host, &target, Some(ts), None, false)?),
            None => None,
        };
        let continuous = self.placement.location(id);
        let adjust = |p: Point| host.adjust_for_ancestors(&element_id, p);
        let endpoint = self
            .endpoints
            .get_mut(&id)
            .ok_or(EngineError::EndpointNotFound(id))?;
        let point = endpoint.anchor.compute(&ComputeParams {
            element: &element_box,
            target: target_box.as_ref(),
            timestamp: Some(ts),
            continuous,
            adjust: &adjust,
        });
        Ok((point, endpoint.anchor.orientation()))
    }

    /// Paints an endpoint at most once per timestamp, unless `force` is set
    /// or its continuous placement moved since.
    fn paint_endpoint<H>(
        &mut self,
        host: &mut H,
        id: EndpointId,
        ts: Timestamp,
        toward: Option<&str>,
        force: bool,
        report: &mut RedrawReport,
    ) -> Result<()>
    where
        H: Host + ?Sized,
    {
        let endpoint = self.endpoint(id)?;
        if !force && endpoint.painted_at == Some(ts) {
            let moved = self
                .placement
                .location(id)
                .is_some_and(|loc| Some(loc.point) != endpoint.point);
            if !moved {
                return Ok(());
            }
        }
        let (point, orientation) = self.resolve_anchor(&*host, id, ts, toward)?;
        let endpoint = self
            .endpoints
            .get_mut(&id)
            .ok_or(EngineError::EndpointNotFound(id))?;
        endpoint.painted_at = Some(ts);
        endpoint.point = Some(point);
        if endpoint.visible {
            host.paint_endpoint(&EndpointPaint {
                endpoint: id,
                element: endpoint.element_id.clone(),
                point,
                orientation,
                timestamp: ts,
            });
            if !report.endpoints_painted.contains(&id) {
                report.endpoints_painted.push(id);
            }
        }
        Ok(())
    }

    /// Paints a connection at most once per timestamp, unless its points
    /// changed since.
    fn paint_connection<H>(
        &mut self,
        host: &mut H,
        id: ConnectionId,
        ts: Timestamp,
        report: &mut RedrawReport,
    ) -> Result<()>
    where
        H: Host + ?Sized,
    {
        let connection = self.connection(id)?;
        let (source, target) = (connection.source, connection.target);
        let source_element = connection.source_element.clone();
        let target_element = connection.target_element.clone();

        let (source_point, source_orientation) =
            self.resolve_anchor(&*host, source, ts, Some(&target_element))?;
        let (target_point, target_orientation) =
            self.resolve_anchor(&*host, target, ts, Some(&source_element))?;

        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(EngineError::ConnectionNotFound(id))?;
        let points = (source_point, target_point);
        if connection.painted_at == Some(ts) && connection.last_points == Some(points) {
            return Ok(());
        }
        connection.painted_at = Some(ts);
        connection.last_points = Some(points);
        host.paint_connection(&ConnectionPaint {
            connection: id,
            source_element,
            target_element,
            source: source_point,
            source_orientation,
            target: target_point,
            target_orientation,
            timestamp: ts,
        });
        if !report.connections_painted.contains(&id) {
            report.connections_painted.push(id);
        }
        Ok(())
    }
}
