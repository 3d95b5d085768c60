use std::path::Path;

use plumbline::anchor::{Anchor, ComputeParams};
use plumbline::layout::continuous::Face;
use plumbline::layout_dump::LayoutDump;
use plumbline::{
    AnchorSpec, ConnectionEnd, ConnectionOptions, ElementBox, EndpointId, EndpointOptions,
    EngineConfig, EngineError, FloatOutcome, Rect, SceneHost, Timestamp, TopologyManager,
    parse_scene, run_scene,
};
use tracing::Level;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::TRACE)
        .try_init();
}

fn anchored(name: &str) -> EndpointOptions {
    EndpointOptions::with_anchor(AnchorSpec::named(name))
}

fn continuous() -> EndpointOptions {
    EndpointOptions::with_anchor(AnchorSpec::continuous())
}

fn identity(point: (f32, f32)) -> (f32, f32) {
    point
}

/// Hub across the top, three boxes below it from left to right.
fn fan_out_host() -> SceneHost {
    let mut host = SceneHost::new();
    host.set_rect("hub", Rect::new(0.0, 0.0, 600.0, 100.0));
    host.set_rect("L", Rect::new(0.0, 400.0, 100.0, 100.0));
    host.set_rect("M", Rect::new(250.0, 400.0, 100.0, 100.0));
    host.set_rect("R", Rect::new(500.0, 400.0, 100.0, 100.0));
    host
}

#[test]
fn run_all_fixtures() {
    init_tracing();
    let root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures");
    // Keep this list explicit so new scenes must be added intentionally.
    let fixtures = [
        "stacked.json5",
        "fan_out.json5",
        "floating.json5",
        "nested_drag.json5",
    ];
    for fixture in fixtures {
        let input = std::fs::read_to_string(root.join(fixture)).expect("fixture read failed");
        let doc = parse_scene(&input).unwrap_or_else(|err| panic!("{fixture}: {err}"));
        let run = run_scene(&doc, EngineConfig::default())
            .unwrap_or_else(|err| panic!("{fixture}: {err:#}"));
        let dump = LayoutDump::from_run(&run);
        assert!(!dump.endpoints.is_empty(), "{fixture}: no endpoints");
        assert!(dump.connection_paints > 0, "{fixture}: nothing painted");
        serde_json::to_string(&dump).expect("dump serializes");
    }
}

#[test]
fn compute_is_idempotent_within_a_timestamp() {
    let mut anchor = AnchorSpec::named("BottomCenter").build(&[]).unwrap();
    let element = ElementBox::new("A", (10.0, 20.0), (100.0, 50.0));
    let ts = Some(Timestamp(7));
    let params = ComputeParams {
        element: &element,
        target: None,
        timestamp: ts,
        continuous: None,
        adjust: &identity,
    };
    let first = anchor.compute(&params);
    let moved = ElementBox::new("A", (500.0, 500.0), (100.0, 50.0));
    let second = anchor.compute(&ComputeParams {
        element: &moved,
        ..params
    });
    assert_eq!(first.0.to_bits(), second.0.to_bits());
    assert_eq!(first.1.to_bits(), second.1.to_bits());
    assert_eq!(first, (60.0, 70.0));
}

#[test]
fn redraw_with_same_timestamp_paints_nothing_new() {
    let mut host = fan_out_host();
    let mut manager = TopologyManager::default();
    let h = manager.add_endpoint(&host, "hub", continuous()).unwrap();
    let l = manager.add_endpoint(&host, "L", anchored("TopCenter")).unwrap();
    manager.connect(h, l, ConnectionOptions::default()).unwrap();
    let ts = Timestamp(10);
    manager.redraw(&mut host, "hub", None, Some(ts)).unwrap();
    let endpoint_paints = host.endpoint_paints.len();
    let connection_paints = host.connection_paints.len();
    manager.redraw(&mut host, "hub", None, Some(ts)).unwrap();
    assert_eq!(host.endpoint_paints.len(), endpoint_paints);
    assert_eq!(host.connection_paints.len(), connection_paints);
}

#[test]
fn dynamic_anchor_selects_side_nearest_the_other_element() {
    let candidates = ["TopCenter", "RightMiddle", "BottomCenter", "LeftMiddle"]
        .into_iter()
        .map(AnchorSpec::named)
        .collect();
    let mut anchor = AnchorSpec::Dynamic(candidates).build(&[]).unwrap();
    let element = ElementBox::new("A", (0.0, 300.0), (100.0, 100.0));
    let above = ElementBox::new("B", (0.0, 0.0), (100.0, 100.0));
    let point = anchor.compute(&ComputeParams {
        element: &element,
        target: Some(&above),
        timestamp: Some(Timestamp(1)),
        continuous: None,
        adjust: &identity,
    });
    assert_eq!(point, (50.0, 300.0));
    assert_eq!(anchor.orientation(), (0.0, -1.0));
    let Anchor::Dynamic(dynamic) = &anchor else {
        panic!("expected a dynamic anchor");
    };
    assert_eq!(dynamic.selected().name.as_deref(), Some("TopCenter"));
}

#[test]
fn dynamic_endpoint_reselects_when_other_element_moves() {
    let mut host = SceneHost::new();
    host.set_rect("A", Rect::new(0.0, 300.0, 100.0, 100.0));
    host.set_rect("B", Rect::new(0.0, 0.0, 100.0, 100.0));
    let mut manager = TopologyManager::default();
    let a = manager.add_endpoint(&host, "A", anchored("AutoDefault")).unwrap();
    let b = manager.add_endpoint(&host, "B", anchored("Center")).unwrap();
    manager.connect(a, b, ConnectionOptions::default()).unwrap();
    manager.redraw_all(&mut host).unwrap();
    assert_eq!(host.last_endpoint_paint(a).unwrap().point, (50.0, 300.0));

    host.move_to("B", 400.0, 300.0);
    manager.redraw(&mut host, "B", None, None).unwrap();
    let paint = host.last_endpoint_paint(a).unwrap();
    assert_eq!(paint.point, (100.0, 350.0));
    assert_eq!(paint.orientation, (1.0, 0.0));
}

#[test]
fn three_connections_from_below_spread_left_to_right() {
    init_tracing();
    let mut host = fan_out_host();
    let mut manager = TopologyManager::default();
    // connect in an order that differs from the on-screen order
    let mut hub_ends = Vec::new();
    for target in ["R", "L", "M"] {
        let h = manager.add_endpoint(&host, "hub", continuous()).unwrap();
        let t = manager.add_endpoint(&host, target, anchored("TopCenter")).unwrap();
        manager.connect(h, t, ConnectionOptions::default()).unwrap();
        hub_ends.push((target, h));
    }
    manager.redraw(&mut host, "hub", None, None).unwrap();

    let bottom = manager.face_entries("hub", Face::Bottom);
    assert_eq!(bottom.len(), 3);
    let order: Vec<&str> = bottom.iter().map(|e| e.other_element.as_str()).collect();
    assert_eq!(order, vec!["L", "M", "R"]);

    let point_of = |target: &str| {
        let (_, id) = hub_ends.iter().find(|(t, _)| *t == target).unwrap();
        manager.continuous_location(*id).unwrap().point
    };
    assert_eq!(point_of("L"), (150.0, 100.0));
    assert_eq!(point_of("M"), (300.0, 100.0));
    assert_eq!(point_of("R"), (450.0, 100.0));
}

#[test]
fn self_loop_places_both_ends_on_top() {
    let mut host = SceneHost::new();
    host.set_rect("A", Rect::new(0.0, 0.0, 300.0, 100.0));
    let mut manager = TopologyManager::default();
    let s = manager.add_endpoint(&host, "A", continuous()).unwrap();
    let t = manager.add_endpoint(&host, "A", continuous()).unwrap();
    let c = manager.connect(s, t, ConnectionOptions::default()).unwrap();
    manager.redraw(&mut host, "A", None, None).unwrap();

    assert_eq!(manager.face_entries("A", Face::Top).len(), 2);
    for id in [s, t] {
        let location = manager.continuous_location(id).unwrap();
        assert_eq!(location.face, Face::Top);
        assert_eq!(location.point.1, 0.0);
    }
    // target sorts first on a tie and slots on top count from the right
    assert_eq!(manager.continuous_location(t).unwrap().point, (200.0, 0.0));
    assert_eq!(manager.continuous_location(s).unwrap().point, (100.0, 0.0));
    assert!(host.last_connection_paint(c).is_some());
}

#[test]
fn detach_removes_face_entry_and_respreads_co_tenants() {
    let mut host = fan_out_host();
    let mut manager = TopologyManager::default();
    let h1 = manager.add_endpoint(&host, "hub", continuous()).unwrap();
    let h2 = manager.add_endpoint(&host, "hub", continuous()).unwrap();
    let l = manager.add_endpoint(&host, "L", anchored("TopCenter")).unwrap();
    let r = manager.add_endpoint(&host, "R", anchored("TopCenter")).unwrap();
    let cl = manager.connect(h1, l, ConnectionOptions::default()).unwrap();
    let cr = manager.connect(h2, r, ConnectionOptions::default()).unwrap();
    manager.redraw_all(&mut host).unwrap();
    assert_eq!(manager.continuous_location(h1).unwrap().point, (200.0, 100.0));
    assert_eq!(manager.continuous_location(h2).unwrap().point, (400.0, 100.0));

    manager.connection_detached(&mut host, cl).unwrap();
    let bottom = manager.face_entries("hub", Face::Bottom);
    assert_eq!(bottom.len(), 1);
    assert_eq!(bottom[0].connection, cr);
    assert!(manager.continuous_location(h1).is_none());
    assert_eq!(manager.continuous_location(h2).unwrap().point, (300.0, 100.0));
    assert_eq!(
        manager.connection(cl).unwrap_err(),
        EngineError::ConnectionNotFound(cl)
    );

    let report = manager.redraw(&mut host, "hub", None, None).unwrap();
    assert!(!report.connections_painted.contains(&cl));
    assert!(
        manager
            .connections_for("hub")
            .unwrap()
            .iter()
            .all(|r| r.connection != cl)
    );
}

#[test]
fn change_id_moves_every_registration() {
    let mut host = fan_out_host();
    let mut manager = TopologyManager::default();
    let h = manager.add_endpoint(&host, "hub", continuous()).unwrap();
    let extra = manager.add_endpoint(&host, "hub", anchored("Center")).unwrap();
    let l = manager.add_endpoint(&host, "L", anchored("TopCenter")).unwrap();
    let c = manager.connect(h, l, ConnectionOptions::default()).unwrap();
    manager.redraw_all(&mut host).unwrap();
    let before: Vec<EndpointId> = manager.endpoints_for("hub").unwrap().to_vec();

    manager.change_id("hub", "core").unwrap();
    host.rename("hub", "core");

    assert_eq!(
        manager.endpoints_for("hub").unwrap_err(),
        EngineError::ElementNotFound("hub".to_string())
    );
    assert!(manager.redraw(&mut host, "hub", None, None).is_err());
    assert_eq!(manager.endpoints_for("core").unwrap(), before.as_slice());
    assert!(before.contains(&extra));
    assert_eq!(manager.connection(c).unwrap().source_element, "core");
    assert_eq!(manager.face_entries("core", Face::Bottom).len(), 1);

    let report = manager.redraw(&mut host, "core", None, None).unwrap();
    assert_eq!(report.connections_painted, vec![c]);
    assert_eq!(
        manager.change_id("core", "L").unwrap_err(),
        EngineError::ElementIdInUse("L".to_string())
    );
}

#[test]
fn stacked_boxes_meet_at_their_midpoints() {
    let mut host = SceneHost::new();
    host.set_rect("A", Rect::new(0.0, 0.0, 200.0, 100.0));
    host.set_rect("B", Rect::new(0.0, 400.0, 200.0, 100.0));
    let mut manager = TopologyManager::default();
    let a = manager.add_endpoint(&host, "A", continuous()).unwrap();
    let b = manager.add_endpoint(&host, "B", continuous()).unwrap();
    let c = manager.connect(a, b, ConnectionOptions::default()).unwrap();
    manager.redraw(&mut host, "A", None, None).unwrap();

    let on_a = manager.continuous_location(a).unwrap();
    let on_b = manager.continuous_location(b).unwrap();
    assert_eq!(on_a.face, Face::Bottom);
    assert_eq!(on_b.face, Face::Top);
    assert_eq!(on_a.point, (100.0, 100.0));
    assert_eq!(on_b.point, (100.0, 400.0));
    assert_eq!(on_a.orientation, (0.0, 1.0));
    assert_eq!(on_b.orientation, (0.0, -1.0));

    let paint = host.last_connection_paint(c).unwrap();
    assert_eq!(paint.source, (100.0, 100.0));
    assert_eq!(paint.target, (100.0, 400.0));
}

#[test]
fn zero_width_element_places_anchor_without_dividing_by_zero() {
    let mut host = SceneHost::new();
    host.set_rect("A", Rect::new(0.0, 0.0, 0.0, 100.0));
    host.set_rect("B", Rect::new(0.0, 400.0, 0.0, 100.0));
    let mut manager = TopologyManager::default();
    let a = manager.add_endpoint(&host, "A", continuous()).unwrap();
    let b = manager.add_endpoint(&host, "B", continuous()).unwrap();
    manager.connect(a, b, ConnectionOptions::default()).unwrap();
    manager.redraw(&mut host, "A", None, None).unwrap();
    let location = manager.continuous_location(a).unwrap();
    assert!(location.point.0.is_finite() && location.point.1.is_finite());
    assert_eq!(location.fraction.0, 0.5);
}

#[test]
fn floating_end_lands_on_drop_endpoint() {
    let mut host = SceneHost::new();
    host.set_rect("A", Rect::new(0.0, 0.0, 100.0, 100.0));
    host.set_rect("B", Rect::new(300.0, 0.0, 100.0, 100.0));
    host.set_rect("C", Rect::new(300.0, 300.0, 100.0, 100.0));
    host.set_rect("proxy", Rect::new(600.0, 0.0, 20.0, 20.0));
    let mut manager = TopologyManager::default();
    let a = manager.add_endpoint(&host, "A", anchored("RightMiddle")).unwrap();
    let b = manager.add_endpoint(&host, "B", anchored("LeftMiddle")).unwrap();
    let c_ep = manager.add_endpoint(&host, "C", anchored("LeftMiddle")).unwrap();
    let conn = manager.connect(a, b, ConnectionOptions::default()).unwrap();
    manager.redraw_all(&mut host).unwrap();

    let transient = manager
        .begin_float(&mut host, conn, ConnectionEnd::Target, "proxy")
        .unwrap();
    assert!(manager.is_floating(conn));
    assert_eq!(
        manager
            .begin_float(&mut host, conn, ConnectionEnd::Target, "proxy")
            .unwrap_err(),
        EngineError::AlreadyFloating(conn)
    );
    assert_eq!(host.last_connection_paint(conn).unwrap().target, (610.0, 10.0));

    host.move_to("proxy", 700.0, 100.0);
    manager.redraw(&mut host, "proxy", None, None).unwrap();
    assert_eq!(host.last_connection_paint(conn).unwrap().target, (710.0, 110.0));
    host.clear_paints();
    manager.redraw(&mut host, "A", None, None).unwrap();
    assert!(host.last_connection_paint(conn).is_some());

    manager.hover_float(conn, c_ep).unwrap();
    manager.leave_float(conn).unwrap();
    let outcome = manager.end_float(&mut host, conn, Some(c_ep)).unwrap();
    assert_eq!(outcome, FloatOutcome::Attached(c_ep));
    assert!(!manager.is_floating(conn));
    assert!(manager.endpoint(transient).is_err());
    assert!(manager.endpoint(b).unwrap().connections.is_empty());

    let connection = manager.connection(conn).unwrap();
    assert_eq!(connection.target, c_ep);
    assert_eq!(connection.target_element, "C");
    assert_eq!(host.last_connection_paint(conn).unwrap().target, (300.0, 350.0));
    assert_eq!(
        manager.end_float(&mut host, conn, None).unwrap_err(),
        EngineError::NotFloating(conn)
    );
}

#[test]
fn floating_end_returns_home_when_drop_is_refused() {
    let mut host = SceneHost::new();
    host.set_rect("A", Rect::new(0.0, 0.0, 100.0, 100.0));
    host.set_rect("B", Rect::new(300.0, 0.0, 100.0, 100.0));
    host.set_rect("proxy", Rect::new(600.0, 0.0, 20.0, 20.0));
    let mut manager = TopologyManager::default();
    let a = manager.add_endpoint(&host, "A", anchored("RightMiddle")).unwrap();
    let b = manager.add_endpoint(&host, "B", anchored("LeftMiddle")).unwrap();
    let full = manager.add_endpoint(&host, "A", anchored("TopCenter")).unwrap();
    let spare = manager.add_endpoint(&host, "B", anchored("TopCenter")).unwrap();
    let conn = manager.connect(a, b, ConnectionOptions::default()).unwrap();
    manager.connect(full, spare, ConnectionOptions::default()).unwrap();

    manager
        .begin_float(&mut host, conn, ConnectionEnd::Target, "proxy")
        .unwrap();
    let outcome = manager.end_float(&mut host, conn, Some(full)).unwrap();
    assert_eq!(outcome, FloatOutcome::Restored(b));
    assert_eq!(manager.connection(conn).unwrap().target, b);
    assert_eq!(host.last_connection_paint(conn).unwrap().target, (300.0, 50.0));
}

#[test]
fn dragging_a_group_repaints_nested_endpoints() {
    let mut host = SceneHost::new();
    host.set_rect("group", Rect::new(100.0, 100.0, 400.0, 300.0));
    host.set_rect("inner", Rect::new(120.0, 150.0, 50.0, 50.0));
    host.set_parent("inner", "group");
    let mut manager = TopologyManager::default();
    manager.register_draggable(&host, "group");
    manager.add_endpoint(&host, "group", anchored("TopLeft")).unwrap();
    let inner = manager.add_endpoint(&host, "inner", anchored("Center")).unwrap();

    let report = manager
        .redraw(&mut host, "group", Some((200.0, 200.0)), None)
        .unwrap();
    assert_eq!(report.elements, vec!["group".to_string(), "inner".to_string()]);
    assert_eq!(host.last_endpoint_paint(inner).unwrap().point, (245.0, 275.0));
}

#[test]
fn dragging_a_group_moves_connection_to_nested_element() {
    let mut host = SceneHost::new();
    host.set_rect("group", Rect::new(100.0, 100.0, 400.0, 300.0));
    host.set_rect("inner", Rect::new(120.0, 150.0, 50.0, 50.0));
    host.set_parent("inner", "group");
    let mut manager = TopologyManager::default();
    manager.register_draggable(&host, "group");
    let outer = manager.add_endpoint(&host, "group", anchored("TopLeft")).unwrap();
    let inner = manager.add_endpoint(&host, "inner", anchored("Center")).unwrap();
    let conn = manager.connect(outer, inner, ConnectionOptions::default()).unwrap();

    manager
        .redraw(&mut host, "group", Some((200.0, 200.0)), None)
        .unwrap();
    assert_eq!(host.last_endpoint_paint(inner).unwrap().point, (245.0, 275.0));
    let paint = host.last_connection_paint(conn).unwrap();
    assert_eq!(paint.source, (200.0, 200.0));
    assert_eq!(paint.target, (245.0, 275.0));
}

#[test]
fn mutually_parented_draggables_redraw_each_once() {
    init_tracing();
    let mut host = SceneHost::new();
    host.set_rect("A", Rect::new(0.0, 0.0, 100.0, 100.0));
    host.set_rect("B", Rect::new(200.0, 0.0, 100.0, 100.0));
    host.set_parent("A", "B");
    host.set_parent("B", "A");
    let mut manager = TopologyManager::default();
    manager.register_draggable(&host, "A");
    manager.register_draggable(&host, "B");
    manager.add_endpoint(&host, "A", anchored("Center")).unwrap();
    let b = manager.add_endpoint(&host, "B", anchored("Center")).unwrap();

    let report = manager
        .redraw(&mut host, "A", Some((10.0, 10.0)), None)
        .unwrap();
    assert_eq!(report.elements, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(host.last_endpoint_paint(b).unwrap().point, (260.0, 60.0));
}

#[test]
fn deleting_endpoints_detaches_their_connections() {
    let mut host = fan_out_host();
    let mut manager = TopologyManager::default();
    let h = manager
        .add_endpoint(&host, "hub", continuous().unlimited())
        .unwrap();
    let l = manager.add_endpoint(&host, "L", anchored("TopCenter")).unwrap();
    let r = manager.add_endpoint(&host, "R", anchored("TopCenter")).unwrap();
    manager.connect(h, l, ConnectionOptions::default()).unwrap();
    manager.connect(h, r, ConnectionOptions::default()).unwrap();
    manager.redraw_all(&mut host).unwrap();

    assert_eq!(manager.remove_all_endpoints(&mut host, "hub").unwrap(), 1);
    assert_eq!(manager.connections().count(), 0);
    assert!(manager.endpoint(l).unwrap().connections.is_empty());
    assert!(manager.face_entries("hub", Face::Bottom).is_empty());

    manager.delete_every_endpoint(&mut host).unwrap();
    assert!(manager.endpoint(r).is_err());
}
