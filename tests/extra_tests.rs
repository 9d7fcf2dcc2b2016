use geqsplot::command::Command;
use geqsplot::config::PlotConfig;
use geqsplot::document::{Document, ItemStatus};
use geqsplot::events::{PointerEvent, ZoomEvent};
use geqsplot::render::{GraphPoint, ScreenPoint};
use geqsplot::scale::{Scale, ViewportSnapshot, ZoomDirection};
use geqsplot::session::GraphSession;
use geqsplot::ItemId;

use proptest::prelude::*;

fn session_with(lines: &[&str]) -> (GraphSession, Vec<ItemId>)
{
    let mut session = GraphSession::default();
    let ids = lines.iter()
        .map(|line| {
            let id = session.insert();
            let _ = session.set_text(id, line);
            id
        })
        .collect();
    (session, ids)
}

fn click(session: &mut GraphSession, at: GraphPoint)
{
    let p = session.canvas().scale().to_screen(at);
    session.on_pointer_down(PointerEvent::new(0, p.x, p.y));
    session.on_pointer_up(PointerEvent::new(0, p.x, p.y));
}

#[test]
fn every_transitive_dependent_sees_the_new_value()
{
    let (mut session, ids) = session_with(&[
        "a = 1",
        "b = a + 1",
        "c = b + a",
        "d = c * b",
        "f(x) = d x",
        "e = f(2) + a",
    ]);
    assert_eq!(session.document().value_of("e"), Some(13.0));

    session.set_text(ids[0], "a = 2").unwrap();
    let doc = session.document();
    assert_eq!(doc.value_of("b"), Some(3.0));
    assert_eq!(doc.value_of("c"), Some(5.0));
    assert_eq!(doc.value_of("d"), Some(15.0));
    assert_eq!(doc.value_of("e"), Some(32.0));
}

#[test]
fn cyclic_definition_leaves_scope_unchanged()
{
    let (mut session, ids) = session_with(&["a = 1", "b = a", "c = b"]);
    let before = session.document().scope().clone();

    let err = session.set_text(ids[0], "a = c + 1").unwrap_err();
    assert!(err.message.contains("'a'"));
    assert_eq!(session.document().scope(), &before);
}

#[test]
fn snapshot_restores_the_same_viewport()
{
    let mut session = GraphSession::default();
    session.on_pointer_down(PointerEvent::new(0, 10.0, 10.0));
    session.on_pointer_move(PointerEvent::new(0, 37.5, -12.25));
    session.on_pointer_up(PointerEvent::new(0, 37.5, -12.25));
    for _ in 0..13
    {
        session.on_zoom(ZoomEvent { center: ScreenPoint::new(123.0, 456.0), direction: ZoomDirection::Out });
    }
    let snapshot = session.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();

    let mut other = GraphSession::default();
    other.restore(&serde_json::from_str::<ViewportSnapshot>(&json).unwrap());
    assert_eq!(other.snapshot(), snapshot);
    assert_eq!(other.canvas().scale(), session.canvas().scale());
}

#[test]
fn cascading_delete_does_not_relink()
{
    let (mut session, ids) = session_with(&["s = 1", "t = s + 1"]);
    assert!(session.delete(ids[0]));
    assert_eq!(session.document().value_of("s"), None);
    assert_eq!(session.document().value_of("t"), None);
    assert_eq!(session.document().item(ids[1]).unwrap().status(), &ItemStatus::Detached);

    let s = session.insert();
    session.set_text(s, "s = 5").unwrap();
    assert_eq!(session.document().value_of("t"), None);
    assert!(session.document().context().graph.dependents("s").is_empty());
}

#[test]
fn parabola_has_vertex_at_origin()
{
    let (mut session, ids) = session_with(&["f(x) = x^2"]);
    click(&mut session, GraphPoint::new(1.0, 1.0));
    assert!(session.document().item(ids[0]).unwrap().focused());
    session.frame();

    match session.canvas().command(ids[0])
    {
        Some(Command::Function(c)) => {
            let state = c.state();
            assert_eq!(state.f.input_intercept, Some(0.0));
            assert_eq!(state.f.output_intercepts, vec![0.0]);
            assert_eq!(state.df.critical_points(), &[(0.0, 0.0)]);
        },
        other => panic!("expected a function command, got {:?}", other),
    }
}

#[test]
fn cubic_root_is_accurate()
{
    let (mut session, ids) = session_with(&["y = x^3 - 2x - 5"]);
    click(&mut session, GraphPoint::new(2.0, -1.0));
    session.frame();

    match session.canvas().command(ids[0])
    {
        Some(Command::Function(c)) => {
            let roots = &c.state().f.output_intercepts;
            assert_eq!(roots.len(), 1);
            assert!((roots[0] - 2.0945514815423265).abs() < 1e-6);
        },
        other => panic!("expected a function command, got {:?}", other),
    }
}

#[test]
fn pending_expression_resolves_once_defined()
{
    let (mut session, ids) = session_with(&["a = b"]);
    let status = session.document().item(ids[0]).unwrap().status().clone();
    assert!(status.is_pending());
    assert_eq!(status.error().unwrap().unresolved.as_deref(), Some("b"));

    let b = session.insert();
    session.set_text(b, "b = 5").unwrap();
    assert_eq!(session.document().value_of("a"), Some(5.0));
}

#[test]
fn zooming_past_the_table_ends_stays_in_bounds()
{
    let cfg = PlotConfig::default();
    let anchor = ScreenPoint::new(400.0, 300.0);

    for direction in [ZoomDirection::In, ZoomDirection::Out]
    {
        let mut scale = Scale::new(&cfg);
        for _ in 0..400
        {
            scale.zoom(anchor, direction);
        }
        let end = scale.scale_index();
        assert!(end == 0 || end == scale.table().len() - 1);

        for _ in 0..50
        {
            scale.zoom(anchor, direction);
            assert_eq!(scale.scale_index(), end);
            assert!(scale.zoom_factor() >= cfg.zoom_min && scale.zoom_factor() <= cfg.zoom_max);
        }
    }
}

#[test]
fn errors_point_at_the_offending_column()
{
    let (session, ids) = session_with(&["y = 2 * * x"]);
    let status = session.document().item(ids[0]).unwrap().status();
    match status
    {
        ItemStatus::Failed(err) => {
            assert_eq!(err.position, Some(8));
            assert!(err.message.ends_with("at column 9"));
        },
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

fn chain_lines(len: usize, start: i32) -> Vec<String>
{
    let mut lines = vec![format!("v0 = {}", start)];
    lines.extend((1..len).map(|i| format!("v{} = v{} + 1", i, i - 1)));
    lines
}

proptest! {
    #[test]
    fn chain_resolves_in_any_insertion_order(
        order in Just((0..8).collect::<Vec<usize>>()).prop_shuffle(),
        start in -50i32..50,
    ) {
        let lines = chain_lines(8, start);
        let mut doc = Document::new();
        for &i in &order
        {
            let id = doc.insert();
            let _ = doc.set_text(id, &lines[i]);
        }
        prop_assert!(doc.items().iter().all(|item| item.status().is_ready()));
        prop_assert_eq!(doc.value_of("v7"), Some(start as f64 + 7.0));
    }

    #[test]
    fn edits_propagate_down_the_chain(edits in prop::collection::vec(-100i32..100, 1..20)) {
        let lines = chain_lines(6, 0);
        let mut doc = Document::new();
        let ids: Vec<ItemId> = lines.iter()
            .map(|line| {
                let id = doc.insert();
                let _ = doc.set_text(id, line);
                id
            })
            .collect();

        for value in edits
        {
            doc.set_text(ids[0], &format!("v0 = {}", value)).unwrap();
            for i in 0..6
            {
                prop_assert_eq!(doc.value_of(&format!("v{}", i)), Some(value as f64 + i as f64));
            }
        }
    }

    #[test]
    fn zoom_keeps_scale_in_bounds(
        steps in prop::collection::vec((any::<bool>(), 0.0f64..800.0, 0.0f64..600.0), 0..300),
    ) {
        let cfg = PlotConfig::default();
        let mut scale = Scale::new(&cfg);
        for (zoom_in, x, y) in steps
        {
            let direction = if zoom_in { ZoomDirection::In } else { ZoomDirection::Out };
            scale.zoom(ScreenPoint::new(x, y), direction);
            prop_assert!(scale.scale_index() < scale.table().len());
            prop_assert!(scale.zoom_factor() >= cfg.zoom_min && scale.zoom_factor() <= cfg.zoom_max);
        }

        let snapshot = scale.snapshot();
        let mut restored = Scale::new(&cfg);
        restored.restore(&snapshot);
        prop_assert_eq!(restored, scale);
    }
}
