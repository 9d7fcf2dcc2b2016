use std::rc::Rc;

use crate::config::PlotConfig;
use crate::document::ItemId;
use crate::events::{EventBus, EventKind, FocusChange, Subscription};
use crate::features::{detect, SampleDomain};
use crate::model::{FnModel, FnState, InputAxis};
use crate::render::{
    format_coord, format_point, Color, DrawList, DrawOp, GraphPoint, ScreenPoint, Stroke, TextAnchor,
};
use crate::scale::Scale;
use crate::settings::ItemSettings;

const MINOR_GRID: Color = Color::new(0.92, 0.92, 0.92, 1.0);
const MAJOR_GRID: Color = Color::new(0.78, 0.78, 0.78, 1.0);
const LABEL_SIZE: f64 = 12.0;
const FEATURE_RADIUS: f64 = 4.0;
const TOOLTIP_OFFSET: f64 = 8.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandStatus
{
    Idle,
    Focused,
    Dragged,
}

/// What a command made of a pointer-down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerOutcome
{
    /// Not on this command. Carries `Lost` if the command was focused.
    Missed(Option<FocusChange>),
    /// On this command. `capture` asks the canvas to route the pointer here until it is released.
    Claimed
    {
        focus: Option<FocusChange>,
        capture: bool,
    },
}

fn tooltip(list: &mut DrawList, at: ScreenPoint, text: String)
{
    list.push(DrawOp::Text {
        position: ScreenPoint::new(at.x + TOOLTIP_OFFSET, at.y - TOOLTIP_OFFSET),
        text,
        size: LABEL_SIZE,
        color: Color::BLACK,
        anchor: TextAnchor::Start,
    });
}

/// A curve with its intercepts and critical points.
#[derive(Debug)]
pub struct FunctionCommand
{
    item: ItemId,
    revision: u64,
    model: Rc<FnModel>,
    state: FnState,
    settings: ItemSettings,
    status: CommandStatus,
    /// Where a drag currently sits on the curve.
    tracked: Option<GraphPoint>,
    highlighted: Vec<GraphPoint>,
    _subscription: Subscription,
}

impl FunctionCommand
{
    pub fn new(item: ItemId, revision: u64, model: Rc<FnModel>, settings: ItemSettings, bus: &EventBus) -> FunctionCommand
    {
        FunctionCommand {
            item,
            revision,
            state: model.state().clone(),
            model,
            settings,
            status: CommandStatus::Idle,
            tracked: None,
            highlighted: Vec::new(),
            _subscription: bus.subscribe(EventKind::PointerDown, item),
        }
    }

    pub fn revision(&self) -> u64
    {
        self.revision
    }

    /// Function state including the features found on the last focused redraw.
    pub fn state(&self) -> &FnState
    {
        &self.state
    }

    pub fn tracked(&self) -> Option<GraphPoint>
    {
        self.tracked
    }

    pub fn highlighted(&self) -> &[GraphPoint]
    {
        &self.highlighted
    }

    /// Swaps in a rebuilt model. Highlights refer to the old curve and are dropped.
    pub fn set_model(&mut self, revision: u64, model: Rc<FnModel>)
    {
        self.revision = revision;
        self.state = model.state().clone();
        self.model = model;
        self.highlighted.clear();
        self.tracked = None;
    }

    /// Input value `t` and output `v` as a graph point.
    fn point(&self, t: f64, v: f64) -> GraphPoint
    {
        match self.model.axis()
        {
            InputAxis::X => GraphPoint::new(t, v),
            InputAxis::Y => GraphPoint::new(v, t),
        }
    }

    fn input_of(&self, p: GraphPoint) -> f64
    {
        match self.model.axis()
        {
            InputAxis::X => p.x,
            InputAxis::Y => p.y,
        }
    }

    /// Whether `p` lies within `tol` graph units of the curve.
    pub fn hit_test(&self, p: GraphPoint, tol: f64) -> bool
    {
        if self.settings.hidden
        {
            return false;
        }
        let t = self.input_of(p);
        let samples: Vec<GraphPoint> = [t - tol, t, t + tol].iter()
            .map(|&s| self.point(s, self.model.eval(s)))
            .collect();
        samples.windows(2).any(|pair| {
            pair[0].is_finite() && pair[1].is_finite() && p.distance_to_segment(pair[0], pair[1]) <= tol
        })
    }

    /// Intercepts and critical points currently known, in graph coordinates.
    pub fn feature_points(&self) -> Vec<GraphPoint>
    {
        let mut points: Vec<GraphPoint> = self.state.f.output_intercepts.iter()
            .map(|&t| self.point(t, 0.0))
            .collect();
        if let Some(v) = self.state.f.input_intercept
        {
            points.push(self.point(0.0, v));
        }
        points.extend(self.state.df.critical_points().iter().map(|&(t, v)| self.point(t, v)));
        points
    }

    fn feature_at(&self, p: GraphPoint, radius: f64) -> Option<GraphPoint>
    {
        self.feature_points()
            .into_iter()
            .map(|f| (f.distance(p), f))
            .filter(|(d, _)| *d <= radius)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, f)| f)
    }

    /// Re-runs feature detection over the visible stretch of the input axis.
    pub fn refresh_features(&mut self, scale: &Scale, cfg: &PlotConfig)
    {
        let (lo, hi) = match self.model.axis()
        {
            InputAxis::X => (scale.client_left(), scale.client_right()),
            InputAxis::Y => (scale.client_bottom(), scale.client_top()),
        };
        let step = cfg.feature_sample_pixels * scale.units_per_pixel();
        let domain = SampleDomain::new(lo, hi, step, cfg.max_feature_samples);
        let mut state = self.model.state().clone();
        detect(&self.model, &domain, &cfg.tolerance()).apply_to(&mut state);
        self.state = state;
    }

    pub fn pointer_down(&mut self, p: GraphPoint, scale: &Scale, cfg: &PlotConfig) -> PointerOutcome
    {
        let tol = scale.hit_tolerance();
        match self.status
        {
            CommandStatus::Idle => {
                if self.hit_test(p, tol)
                {
                    self.status = CommandStatus::Focused;
                    return PointerOutcome::Claimed { focus: Some(FocusChange::Gained(self.item)), capture: false };
                }
                PointerOutcome::Missed(None)
            },
            CommandStatus::Focused | CommandStatus::Dragged => {
                self.refresh_features(scale, cfg);
                let radius = cfg.feature_pick_pixels * scale.units_per_pixel();
                if let Some(feature) = self.feature_at(p, radius)
                {
                    match self.highlighted.iter().position(|h| *h == feature)
                    {
                        Some(i) => {
                            self.highlighted.remove(i);
                        },
                        None => self.highlighted.push(feature),
                    }
                    return PointerOutcome::Claimed { focus: None, capture: false };
                }
                if self.hit_test(p, tol)
                {
                    self.status = CommandStatus::Dragged;
                    self.pointer_move(p);
                    return PointerOutcome::Claimed { focus: None, capture: true };
                }
                PointerOutcome::Missed(self.blur())
            },
        }
    }

    pub fn pointer_move(&mut self, p: GraphPoint)
    {
        if self.status != CommandStatus::Dragged
        {
            return;
        }
        let t = self.input_of(p);
        let tracked = self.point(t, self.model.eval(t));
        if tracked.is_finite()
        {
            self.tracked = Some(tracked);
        }
    }

    pub fn pointer_up(&mut self)
    {
        if self.status == CommandStatus::Dragged
        {
            self.status = CommandStatus::Focused;
            self.tracked = None;
        }
    }

    pub fn blur(&mut self) -> Option<FocusChange>
    {
        if self.status == CommandStatus::Idle
        {
            return None;
        }
        self.status = CommandStatus::Idle;
        self.tracked = None;
        Some(FocusChange::Lost(self.item))
    }

    /// Screen polylines of the curve, split where it is undefined or jumps across the canvas.
    fn curve(&self, scale: &Scale, cfg: &PlotConfig) -> Vec<Vec<ScreenPoint>>
    {
        let (extent, across) = match self.model.axis()
        {
            InputAxis::X => (scale.width(), scale.height()),
            InputAxis::Y => (scale.height(), scale.width()),
        };
        let step = cfg.curve_sample_pixels.max(0.25);
        let mut segments: Vec<Vec<ScreenPoint>> = Vec::new();
        let mut current: Vec<ScreenPoint> = Vec::new();
        let mut last_out: Option<f64> = None;

        let mut s = 0.0;
        while s <= extent
        {
            let t = match self.model.axis()
            {
                InputAxis::X => scale.to_graph_x(s),
                InputAxis::Y => scale.to_graph_y(s),
            };
            let v = self.model.eval(t);
            let out = match self.model.axis()
            {
                _ if !v.is_finite() => f64::NAN,
                InputAxis::X => scale.to_screen_y(v),
                InputAxis::Y => scale.to_screen_x(v),
            };

            let jumped = last_out.map_or(false, |prev| (out - prev).abs() > across);
            if !out.is_finite() || jumped
            {
                if current.len() > 1
                {
                    segments.push(std::mem::take(&mut current));
                }
                current.clear();
            }
            if out.is_finite()
            {
                let out = out.clamp(-across, 2.0 * across);
                current.push(match self.model.axis()
                {
                    InputAxis::X => ScreenPoint::new(s, out),
                    InputAxis::Y => ScreenPoint::new(out, s),
                });
                last_out = Some(out);
            }
            else
            {
                last_out = None;
            }
            s += step;
        }
        if current.len() > 1
        {
            segments.push(current);
        }
        segments
    }

    pub fn draw(&mut self, scale: &Scale, cfg: &PlotConfig, list: &mut DrawList)
    {
        if self.settings.hidden
        {
            return;
        }
        let paint = self.settings.paint();
        let width = self.settings.stroke.get();
        if width > 0.0
        {
            let stroke = Stroke { color: paint, width, style: self.settings.line_style };
            for points in self.curve(scale, cfg)
            {
                list.push(DrawOp::Polyline { points, stroke });
            }
        }

        if self.status == CommandStatus::Idle
        {
            return;
        }
        self.refresh_features(scale, cfg);
        for feature in self.feature_points()
        {
            let filled = self.highlighted.contains(&feature);
            list.push(DrawOp::Marker {
                center: scale.to_screen(feature),
                radius: FEATURE_RADIUS,
                glyph: self.settings.glyph,
                color: paint,
                filled,
            });
        }
        for point in &self.highlighted
        {
            tooltip(list, scale.to_screen(*point), format_point(point.x, point.y));
        }
        if let Some(point) = self.tracked
        {
            let center = scale.to_screen(point);
            list.push(DrawOp::Marker { center, radius: FEATURE_RADIUS, glyph: self.settings.glyph, color: paint, filled: true });
            tooltip(list, center, format_point(point.x, point.y));
        }
    }
}

/// A fixed point literal such as `(1, a)`.
#[derive(Debug)]
pub struct PointCommand
{
    item: ItemId,
    revision: u64,
    position: GraphPoint,
    settings: ItemSettings,
    status: CommandStatus,
    _subscription: Subscription,
}

impl PointCommand
{
    pub fn new(item: ItemId, revision: u64, position: GraphPoint, settings: ItemSettings, bus: &EventBus) -> PointCommand
    {
        PointCommand {
            item,
            revision,
            position,
            settings,
            status: CommandStatus::Idle,
            _subscription: bus.subscribe(EventKind::PointerDown, item),
        }
    }

    pub fn revision(&self) -> u64
    {
        self.revision
    }

    pub fn position(&self) -> GraphPoint
    {
        self.position
    }

    pub fn set_position(&mut self, revision: u64, position: GraphPoint)
    {
        self.revision = revision;
        self.position = position;
    }

    fn radius(&self) -> f64
    {
        self.settings.stroke.get() + 2.0
    }

    pub fn hit_test(&self, p: GraphPoint, tol: f64) -> bool
    {
        !self.settings.hidden && self.position.is_finite() && p.distance(self.position) <= tol
    }

    pub fn pointer_down(&mut self, p: GraphPoint, scale: &Scale) -> PointerOutcome
    {
        if !self.hit_test(p, scale.hit_tolerance())
        {
            return PointerOutcome::Missed(self.blur());
        }
        match self.status
        {
            CommandStatus::Idle => {
                self.status = CommandStatus::Focused;
                PointerOutcome::Claimed { focus: Some(FocusChange::Gained(self.item)), capture: false }
            },
            CommandStatus::Focused | CommandStatus::Dragged => {
                self.status = CommandStatus::Dragged;
                PointerOutcome::Claimed { focus: None, capture: true }
            },
        }
    }

    pub fn pointer_up(&mut self)
    {
        if self.status == CommandStatus::Dragged
        {
            self.status = CommandStatus::Focused;
        }
    }

    pub fn blur(&mut self) -> Option<FocusChange>
    {
        if self.status == CommandStatus::Idle
        {
            return None;
        }
        self.status = CommandStatus::Idle;
        Some(FocusChange::Lost(self.item))
    }

    pub fn draw(&self, scale: &Scale, list: &mut DrawList)
    {
        if self.settings.hidden || !self.position.is_finite()
        {
            return;
        }
        let center = scale.to_screen(self.position);
        list.push(DrawOp::Marker {
            center,
            radius: self.radius(),
            glyph: self.settings.glyph,
            color: self.settings.paint(),
            filled: true,
        });
        if self.status != CommandStatus::Idle
        {
            tooltip(list, center, format_point(self.position.x, self.position.y));
        }
    }
}

fn draw_grid(scale: &Scale, list: &mut DrawList)
{
    let (w, h) = (scale.width(), scale.height());
    let style = |major: bool| Stroke::solid(if major { MAJOR_GRID } else { MINOR_GRID }, 1.0);

    for (gx, major) in scale.grid_lines(scale.client_left(), scale.client_right())
    {
        let sx = scale.to_screen_x(gx);
        list.push(DrawOp::Line { from: ScreenPoint::new(sx, 0.0), to: ScreenPoint::new(sx, h), stroke: style(major) });
    }
    for (gy, major) in scale.grid_lines(scale.client_bottom(), scale.client_top())
    {
        let sy = scale.to_screen_y(gy);
        list.push(DrawOp::Line { from: ScreenPoint::new(0.0, sy), to: ScreenPoint::new(w, sy), stroke: style(major) });
    }
}

fn label(list: &mut DrawList, position: ScreenPoint, value: f64, anchor: TextAnchor)
{
    list.push(DrawOp::Text { position, text: format_coord(value), size: LABEL_SIZE, color: Color::BLACK, anchor });
}

/// Axis lines plus a label on every major grid line. Labels stick to the
/// canvas edge when the axis itself is scrolled out of view.
fn draw_axis(scale: &Scale, list: &mut DrawList)
{
    let (w, h) = (scale.width(), scale.height());
    let stroke = Stroke::solid(Color::BLACK, 1.5);
    let origin = scale.to_screen(GraphPoint::new(0.0, 0.0));

    if (0.0..=h).contains(&origin.y)
    {
        list.push(DrawOp::Line { from: ScreenPoint::new(0.0, origin.y), to: ScreenPoint::new(w, origin.y), stroke });
    }
    if (0.0..=w).contains(&origin.x)
    {
        list.push(DrawOp::Line { from: ScreenPoint::new(origin.x, 0.0), to: ScreenPoint::new(origin.x, h), stroke });
    }

    let label_y = (origin.y + LABEL_SIZE + 2.0).min(h - 2.0).max(LABEL_SIZE);
    for (gx, major) in scale.grid_lines(scale.client_left(), scale.client_right())
    {
        if major && gx != 0.0
        {
            label(list, ScreenPoint::new(scale.to_screen_x(gx), label_y), gx, TextAnchor::Middle);
        }
    }
    let label_x = (origin.x - 4.0).min(w - 2.0).max(LABEL_SIZE * 2.0);
    for (gy, major) in scale.grid_lines(scale.client_bottom(), scale.client_top())
    {
        if major && gy != 0.0
        {
            label(list, ScreenPoint::new(label_x, scale.to_screen_y(gy) + LABEL_SIZE / 3.0), gy, TextAnchor::End);
        }
    }
    if (0.0..=w).contains(&origin.x) && (0.0..=h).contains(&origin.y)
    {
        label(list, ScreenPoint::new(origin.x - 4.0, origin.y + LABEL_SIZE + 2.0), 0.0, TextAnchor::End);
    }
}

/// One drawable unit of the canvas, painted in list order.
#[derive(Debug)]
pub enum Command
{
    Grid,
    Axis,
    Function(FunctionCommand),
    Point(PointCommand),
}

impl Command
{
    pub fn item_id(&self) -> Option<ItemId>
    {
        match self
        {
            Command::Function(c) => Some(c.item),
            Command::Point(c) => Some(c.item),
            Command::Grid | Command::Axis => None,
        }
    }

    pub fn status(&self) -> CommandStatus
    {
        match self
        {
            Command::Function(c) => c.status,
            Command::Point(c) => c.status,
            Command::Grid | Command::Axis => CommandStatus::Idle,
        }
    }

    pub fn set_settings(&mut self, settings: &ItemSettings)
    {
        match self
        {
            Command::Function(c) => c.settings = settings.clone(),
            Command::Point(c) => c.settings = settings.clone(),
            Command::Grid | Command::Axis => (),
        }
    }

    pub fn draw(&mut self, scale: &Scale, cfg: &PlotConfig, list: &mut DrawList)
    {
        match self
        {
            Command::Grid => draw_grid(scale, list),
            Command::Axis => draw_axis(scale, list),
            Command::Function(c) => c.draw(scale, cfg, list),
            Command::Point(c) => c.draw(scale, list),
        }
    }

    pub fn pointer_down(&mut self, p: GraphPoint, scale: &Scale, cfg: &PlotConfig) -> PointerOutcome
    {
        match self
        {
            Command::Function(c) => c.pointer_down(p, scale, cfg),
            Command::Point(c) => c.pointer_down(p, scale),
            Command::Grid | Command::Axis => PointerOutcome::Missed(None),
        }
    }

    pub fn pointer_move(&mut self, p: GraphPoint)
    {
        if let Command::Function(c) = self
        {
            c.pointer_move(p);
        }
    }

    pub fn pointer_up(&mut self)
    {
        match self
        {
            Command::Function(c) => c.pointer_up(),
            Command::Point(c) => c.pointer_up(),
            Command::Grid | Command::Axis => (),
        }
    }

    pub fn blur(&mut self) -> Option<FocusChange>
    {
        match self
        {
            Command::Function(c) => c.blur(),
            Command::Point(c) => c.blur(),
            Command::Grid | Command::Axis => None,
        }
    }

    /// Focus coming from outside the canvas, e.g. the expression list.
    pub fn focus(&mut self)
    {
        match self
        {
            Command::Function(c) if c.status == CommandStatus::Idle => c.status = CommandStatus::Focused,
            Command::Point(c) if c.status == CommandStatus::Idle => c.status = CommandStatus::Focused,
            _ => (),
        }
    }
}

#[cfg(test)]
fn parabola(bus: &EventBus) -> FunctionCommand
{
    let scope = crate::scope::Scope::new();
    let def = match crate::transform::parse("f(x) = x^2", &scope).unwrap()
    {
        crate::transform::ParsedContent::Function(def) => def,
        other => panic!("expected a function, got {:?}", other),
    };
    let model = FnModel::build(&def, &scope).unwrap();
    FunctionCommand::new(ItemId(1), 1, Rc::new(model), ItemSettings::default(), bus)
}

#[test]
fn test_function_state_machine()
{
    let bus = EventBus::new();
    let cfg = PlotConfig::default();
    let scale = Scale::new(&cfg);
    let mut cmd = parabola(&bus);
    assert_eq!(bus.listeners(EventKind::PointerDown), vec![ItemId(1)]);

    let on_curve = GraphPoint::new(1.0, 1.0);
    let off_curve = GraphPoint::new(3.0, -4.0);

    assert_eq!(cmd.pointer_down(off_curve, &scale, &cfg), PointerOutcome::Missed(None));
    assert_eq!(
        cmd.pointer_down(on_curve, &scale, &cfg),
        PointerOutcome::Claimed { focus: Some(FocusChange::Gained(ItemId(1))), capture: false }
    );
    assert_eq!(cmd.pointer_down(on_curve, &scale, &cfg), PointerOutcome::Claimed { focus: None, capture: true });
    assert_eq!(cmd.status, CommandStatus::Dragged);

    cmd.pointer_move(GraphPoint::new(2.0, 0.0));
    assert_eq!(cmd.tracked(), Some(GraphPoint::new(2.0, 4.0)));

    cmd.pointer_up();
    assert_eq!(cmd.status, CommandStatus::Focused);
    assert_eq!(cmd.pointer_down(off_curve, &scale, &cfg), PointerOutcome::Missed(Some(FocusChange::Lost(ItemId(1)))));
    assert_eq!(cmd.status, CommandStatus::Idle);
}

#[test]
fn test_clicking_a_feature_toggles_highlight()
{
    let bus = EventBus::new();
    let cfg = PlotConfig::default();
    let scale = Scale::new(&cfg);
    let mut cmd = parabola(&bus);

    cmd.pointer_down(GraphPoint::new(1.0, 1.0), &scale, &cfg);
    let vertex = GraphPoint::new(0.0, 0.0);
    assert_eq!(cmd.pointer_down(vertex, &scale, &cfg), PointerOutcome::Claimed { focus: None, capture: false });
    assert_eq!(cmd.highlighted(), &[vertex]);
    assert_eq!(cmd.status, CommandStatus::Focused);

    let mut list = DrawList::new();
    cmd.draw(&scale, &cfg, &mut list);
    assert!(list.ops().iter().any(|op| matches!(op, DrawOp::Text { text, .. } if text == "(0, 0)")));

    cmd.pointer_down(vertex, &scale, &cfg);
    assert!(cmd.highlighted().is_empty());
}

#[test]
fn test_curve_splits_at_poles()
{
    let bus = EventBus::new();
    let cfg = PlotConfig::default();
    let scale = Scale::new(&cfg);
    let scope = crate::scope::Scope::new();
    let def = match crate::transform::parse("y = 1 / x", &scope).unwrap()
    {
        crate::transform::ParsedContent::Function(def) => def,
        other => panic!("expected a function, got {:?}", other),
    };
    let cmd = FunctionCommand::new(ItemId(2), 1, Rc::new(FnModel::build(&def, &scope).unwrap()), ItemSettings::default(), &bus);

    let segments = cmd.curve(&scale, &cfg);
    assert_eq!(segments.len(), 2);
    for points in &segments
    {
        assert!(points.iter().all(|p| p.y >= -scale.height() && p.y <= 2.0 * scale.height()));
    }
}

#[test]
fn test_hidden_commands_draw_nothing()
{
    let bus = EventBus::new();
    let cfg = PlotConfig::default();
    let scale = Scale::new(&cfg);
    let mut settings = ItemSettings::default();
    settings.hidden = true;

    let mut point = Command::Point(PointCommand::new(ItemId(4), 1, GraphPoint::new(1.0, 2.0), settings, &bus));
    let mut list = DrawList::new();
    point.draw(&scale, &cfg, &mut list);
    assert!(list.is_empty());
    assert_eq!(point.pointer_down(GraphPoint::new(1.0, 2.0), &scale, &cfg), PointerOutcome::Missed(None));
}

#[test]
fn test_grid_and_axis_draw()
{
    let cfg = PlotConfig::default();
    let scale = Scale::new(&cfg);
    let mut list = DrawList::new();
    Command::Grid.draw(&scale, &cfg, &mut list);
    // 800x600 canvas at 20 px per unit: 41 vertical and 31 horizontal lines
    assert_eq!(list.len(), 72);

    let mut list = DrawList::new();
    Command::Axis.draw(&scale, &cfg, &mut list);
    assert!(list.ops().iter().any(|op| matches!(op, DrawOp::Text { text, .. } if text == "10")));
    assert!(list.ops().iter().any(|op| matches!(op, DrawOp::Text { text, .. } if text == "-15")));
}
