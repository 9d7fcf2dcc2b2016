use crate::canvas::Canvas;
use crate::config::PlotConfig;
use crate::document::{Document, ItemId};
use crate::errors::ApplicationError;
use crate::events::{FocusChange, PointerEvent, ZoomEvent};
use crate::render::{Color, DrawOp, LineStyle, PointGlyph};
use crate::scale::ViewportSnapshot;
use crate::scope::Scope;
use crate::settings::ItemSettings;
use crate::transform::{self, ParsedContent};

/// Everything a host needs: the expression list and the canvas showing it.
///
/// Every call leaves the document settled and the canvas in sync with it.
///
/// # Example
/// ```
/// use geqsplot::session::GraphSession;
/// use geqsplot::render::DrawOp;
///
/// let mut session = GraphSession::default();
/// let k = session.insert();
/// let f = session.insert();
/// session.set_text(k, "k = 3").unwrap();
/// session.set_text(f, "f(x) = k sin(x)").unwrap();
///
/// let frame = session.frame();
/// assert!(matches!(frame[0], DrawOp::Clear { .. }));
/// assert!(frame.iter().any(|op| matches!(op, DrawOp::Polyline { .. })));
/// ```
#[derive(Debug)]
pub struct GraphSession
{
    document: Document,
    canvas: Canvas,
}

impl Default for GraphSession
{
    fn default() -> GraphSession
    {
        GraphSession::new(PlotConfig::default())
    }
}

impl GraphSession
{
    pub fn new(config: PlotConfig) -> GraphSession
    {
        GraphSession { document: Document::new(), canvas: Canvas::new(config) }
    }

    pub fn document(&self) -> &Document
    {
        &self.document
    }

    pub fn canvas(&self) -> &Canvas
    {
        &self.canvas
    }

    /// Classifies `text` against `scope` without touching the document.
    pub fn parse(&self, text: &str, scope: &Scope) -> Result<ParsedContent, ApplicationError>
    {
        transform::parse(text, scope)
    }

    pub fn insert(&mut self) -> ItemId
    {
        self.document.insert()
    }

    pub fn set_text(&mut self, id: ItemId, text: &str) -> Result<(), ApplicationError>
    {
        let result = self.document.set_text(id, text);
        self.sync();
        result
    }

    pub fn commit(&mut self, id: ItemId, parsed: ParsedContent) -> Result<(), ApplicationError>
    {
        let result = self.document.commit(id, parsed);
        self.sync();
        result
    }

    pub fn delete(&mut self, id: ItemId) -> bool
    {
        let deleted = self.document.delete(id);
        self.sync();
        deleted
    }

    pub fn reevaluate(&mut self, id: ItemId) -> Result<(), ApplicationError>
    {
        let result = self.document.reevaluate(id);
        self.sync();
        result
    }

    pub fn set_focus(&mut self, id: ItemId, focused: bool) -> bool
    {
        if !self.document.set_focus(id, focused)
        {
            return false;
        }
        self.canvas.set_external_focus(id, focused);
        true
    }

    fn update_settings(&mut self, id: ItemId, update: impl FnOnce(&mut ItemSettings)) -> bool
    {
        match self.document.settings_mut(id)
        {
            Some(settings) => update(settings),
            None => return false,
        }
        self.sync();
        true
    }

    pub fn set_color(&mut self, id: ItemId, color: Color) -> bool
    {
        self.update_settings(id, |s| s.color = color)
    }

    pub fn set_hidden(&mut self, id: ItemId, hidden: bool) -> bool
    {
        self.update_settings(id, |s| s.hidden = hidden)
    }

    pub fn set_opacity(&mut self, id: ItemId, opacity: f64) -> bool
    {
        self.update_settings(id, |s| s.opacity.set(opacity))
    }

    pub fn set_stroke(&mut self, id: ItemId, stroke: f64) -> bool
    {
        self.update_settings(id, |s| s.stroke.set(stroke))
    }

    pub fn set_line_style(&mut self, id: ItemId, style: LineStyle) -> bool
    {
        self.update_settings(id, |s| s.line_style = style)
    }

    pub fn set_glyph(&mut self, id: ItemId, glyph: PointGlyph) -> bool
    {
        self.update_settings(id, |s| s.glyph = glyph)
    }

    pub fn on_pointer_down(&mut self, event: PointerEvent)
    {
        let changes = self.canvas.on_pointer_down(event);
        self.apply_focus(&changes);
    }

    pub fn on_pointer_move(&mut self, event: PointerEvent)
    {
        self.canvas.on_pointer_move(event);
    }

    pub fn on_pointer_up(&mut self, event: PointerEvent)
    {
        self.canvas.on_pointer_up(event);
    }

    pub fn on_zoom(&mut self, event: ZoomEvent)
    {
        self.canvas.on_zoom(event);
    }

    pub fn on_resize(&mut self, width: f64, height: f64)
    {
        self.canvas.on_resize(width, height);
    }

    pub fn frame(&mut self) -> Vec<DrawOp>
    {
        self.canvas.draw_frame()
    }

    pub fn snapshot(&self) -> ViewportSnapshot
    {
        self.canvas.scale().snapshot()
    }

    pub fn restore(&mut self, snapshot: &ViewportSnapshot)
    {
        self.canvas.scale_mut().restore(snapshot);
    }

    fn sync(&mut self)
    {
        let changes = self.canvas.sync(self.document.items());
        self.apply_focus(&changes);
    }

    fn apply_focus(&mut self, changes: &[FocusChange])
    {
        for change in changes
        {
            match *change
            {
                FocusChange::Gained(id) => self.document.set_focus(id, true),
                FocusChange::Lost(id) => self.document.set_focus(id, false),
            };
        }
    }
}

#[test]
fn test_clicks_update_document_focus()
{
    use crate::render::GraphPoint;

    let mut session = GraphSession::default();
    let f = session.insert();
    session.set_text(f, "y = x").unwrap();

    let origin = session.canvas().scale().to_screen(GraphPoint::new(0.0, 0.0));
    session.on_pointer_down(PointerEvent::new(0, origin.x, origin.y));
    assert!(session.document().item(f).unwrap().focused());

    session.on_pointer_down(PointerEvent::new(0, 5.0, 5.0));
    session.on_pointer_up(PointerEvent::new(0, 5.0, 5.0));
    assert!(!session.document().item(f).unwrap().focused());
}

#[test]
fn test_settings_setters()
{
    let mut session = GraphSession::default();
    let f = session.insert();
    let a = session.insert();
    session.set_text(f, "y = x^2").unwrap();
    session.set_text(a, "a = 1").unwrap();

    assert!(session.set_opacity(f, 3.0));
    assert!(session.set_line_style(f, LineStyle::Dashed));
    let settings = session.document().item(f).unwrap().settings().unwrap();
    assert_eq!(settings.opacity.get(), 1.0);
    assert_eq!(settings.line_style, LineStyle::Dashed);

    // variables have nothing to style
    assert!(!session.set_stroke(a, 4.0));

    session.set_hidden(f, true);
    assert!(!session.frame().iter().any(|op| matches!(op, DrawOp::Polyline { .. })));
}

#[test]
fn test_tiny_canvas_still_renders()
{
    let mut session = GraphSession::default();
    let f = session.insert();
    session.set_text(f, "y = x").unwrap();

    for (w, h) in [(0.0, 0.0), (10.0, 10.0), (25.0, 400.0)]
    {
        session.on_resize(w, h);
        assert_eq!(session.frame()[0], DrawOp::Clear { color: Color::WHITE });
    }
}
