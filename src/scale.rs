use serde::{Deserialize, Serialize};

use crate::config::PlotConfig;
use crate::render::{GraphPoint, ScreenPoint};

/// One entry of the scale table: `coefficient * 10^exponent` graph units per minor grid step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NiceStep
{
    pub coefficient: u8,
    pub exponent: i32,
}

impl NiceStep
{
    pub fn value(&self) -> f64
    {
        self.coefficient as f64 * 10f64.powi(self.exponent)
    }
}

/// The 1, 2, 5 sequence for every power of ten in `min_exponent..=max_exponent`.
///
/// # Example
/// ```
/// use geqsplot::scale::scale_table;
///
/// let table = scale_table(-6, 6);
///
/// assert_eq!(table.len(), 39);
/// assert_eq!(table[0].value(), 1e-6);
/// assert_eq!(table[38].value(), 5e6);
/// ```
pub fn scale_table(min_exponent: i32, max_exponent: i32) -> Vec<NiceStep>
{
    (min_exponent..=max_exponent)
        .flat_map(|exponent| [1, 2, 5].into_iter().map(move |coefficient| NiceStep { coefficient, exponent }))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoomDirection
{
    In,
    Out,
}

/// Everything needed to put the viewport back where it was.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewportSnapshot
{
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale_index: usize,
    pub zoom: f64,
}

/// Maps between canvas pixels and graph units.
///
/// Graph coordinates follow `graph = (screen - center - offset) / step_pixels * scaler`
/// with the y axis flipped, where `step_pixels` is the on-screen size of a
/// minor grid step and `scaler` its size in graph units.
#[derive(Clone, Debug, PartialEq)]
pub struct Scale
{
    table: Vec<NiceStep>,
    scale_index: usize,
    zoom_factor: f64,
    base_step_pixels: f64,
    zoom_ratio: f64,
    zoom_min: f64,
    zoom_max: f64,
    offset_x: f64,
    offset_y: f64,
    width: f64,
    height: f64,
}

impl Scale
{
    pub fn new(cfg: &PlotConfig) -> Scale
    {
        let table = scale_table(cfg.min_exponent, cfg.max_exponent);
        let scale_index = table.iter()
            .position(|s| s.coefficient == 1 && s.exponent == cfg.initial_exponent)
            .unwrap_or(table.len() / 2);
        Scale {
            table,
            scale_index,
            zoom_factor: 1.0,
            base_step_pixels: cfg.base_step_pixels,
            zoom_ratio: cfg.zoom_ratio,
            zoom_min: cfg.zoom_min,
            zoom_max: cfg.zoom_max,
            offset_x: 0.0,
            offset_y: 0.0,
            width: cfg.width,
            height: cfg.height,
        }
    }

    pub fn table(&self) -> &[NiceStep]
    {
        &self.table
    }

    pub fn scale_index(&self) -> usize
    {
        self.scale_index
    }

    pub fn zoom_factor(&self) -> f64
    {
        self.zoom_factor
    }

    pub fn offset(&self) -> (f64, f64)
    {
        (self.offset_x, self.offset_y)
    }

    pub fn width(&self) -> f64
    {
        self.width
    }

    pub fn height(&self) -> f64
    {
        self.height
    }

    pub fn step(&self) -> NiceStep
    {
        self.table[self.scale_index]
    }

    /// Graph units per minor grid step.
    pub fn scaler(&self) -> f64
    {
        self.step().value()
    }

    /// Pixels per minor grid step.
    pub fn step_pixels(&self) -> f64
    {
        self.base_step_pixels * self.zoom_factor
    }

    pub fn units_per_pixel(&self) -> f64
    {
        self.scaler() / self.step_pixels()
    }

    /// Minor grid steps between major grid lines.
    pub fn major_grid_line(&self) -> usize
    {
        if self.step().coefficient == 5 { 4 } else { 5 }
    }

    /// Half a minor grid step, in graph units.
    pub fn hit_tolerance(&self) -> f64
    {
        self.scaler() / 2.0
    }

    pub fn to_graph_x(&self, sx: f64) -> f64
    {
        (sx - self.width / 2.0 - self.offset_x) / self.step_pixels() * self.scaler()
    }

    pub fn to_graph_y(&self, sy: f64) -> f64
    {
        -(sy - self.height / 2.0 - self.offset_y) / self.step_pixels() * self.scaler()
    }

    pub fn to_screen_x(&self, gx: f64) -> f64
    {
        gx / self.scaler() * self.step_pixels() + self.width / 2.0 + self.offset_x
    }

    pub fn to_screen_y(&self, gy: f64) -> f64
    {
        -gy / self.scaler() * self.step_pixels() + self.height / 2.0 + self.offset_y
    }

    pub fn to_graph(&self, p: ScreenPoint) -> GraphPoint
    {
        GraphPoint::new(self.to_graph_x(p.x), self.to_graph_y(p.y))
    }

    pub fn to_screen(&self, p: GraphPoint) -> ScreenPoint
    {
        ScreenPoint::new(self.to_screen_x(p.x), self.to_screen_y(p.y))
    }

    pub fn client_left(&self) -> f64
    {
        self.to_graph_x(0.0)
    }

    pub fn client_right(&self) -> f64
    {
        self.to_graph_x(self.width)
    }

    pub fn client_top(&self) -> f64
    {
        self.to_graph_y(0.0)
    }

    pub fn client_bottom(&self) -> f64
    {
        self.to_graph_y(self.height)
    }

    pub fn resize(&mut self, width: f64, height: f64)
    {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    /// Moves the viewport by a pixel delta.
    pub fn pan(&mut self, dx: f64, dy: f64)
    {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// Zooms one step, keeping the graph point under `anchor` where it is on screen.
    ///
    /// # Example
    /// ```
    /// use geqsplot::config::PlotConfig;
    /// use geqsplot::render::ScreenPoint;
    /// use geqsplot::scale::{Scale, ZoomDirection};
    ///
    /// let mut scale = Scale::new(&PlotConfig::default());
    /// let cursor = ScreenPoint::new(100.0, 50.0);
    /// let before = scale.to_graph(cursor);
    ///
    /// scale.zoom(cursor, ZoomDirection::In);
    /// let after = scale.to_graph(cursor);
    ///
    /// assert!((before.x - after.x).abs() < 1e-9);
    /// assert!((before.y - after.y).abs() < 1e-9);
    /// ```
    pub fn zoom(&mut self, anchor: ScreenPoint, direction: ZoomDirection)
    {
        let fixed = self.to_graph(anchor);
        match direction
        {
            ZoomDirection::In => self.zoom_factor *= self.zoom_ratio,
            ZoomDirection::Out => self.zoom_factor /= self.zoom_ratio,
        }
        self.normalize();

        let ppu = self.step_pixels() / self.scaler();
        self.offset_x = anchor.x - self.width / 2.0 - fixed.x * ppu;
        self.offset_y = anchor.y - self.height / 2.0 + fixed.y * ppu;
    }

    /// Brings `zoom_factor` back into its band by stepping through the table.
    fn normalize(&mut self)
    {
        if self.zoom_factor > self.zoom_max
        {
            if self.scale_index > 0
            {
                let old = self.scaler();
                self.scale_index -= 1;
                self.zoom_factor *= self.scaler() / old;
            }
            else
            {
                self.zoom_factor = self.zoom_max;
            }
        }
        else if self.zoom_factor < self.zoom_min
        {
            if self.scale_index + 1 < self.table.len()
            {
                let old = self.scaler();
                self.scale_index += 1;
                self.zoom_factor *= self.scaler() / old;
            }
            else
            {
                self.zoom_factor = self.zoom_min;
            }
        }
    }

    /// Grid lines between `lo` and `hi` (graph units) as `(position, is_major)`.
    pub fn grid_lines(&self, lo: f64, hi: f64) -> Vec<(f64, bool)>
    {
        let scaler = self.scaler();
        let major = self.major_grid_line() as i64;
        let (first, last) = ((lo.min(hi) / scaler).ceil() as i64, (lo.max(hi) / scaler).floor() as i64);
        (first..=last).map(|k| (k as f64 * scaler, k % major == 0)).collect()
    }

    pub fn snapshot(&self) -> ViewportSnapshot
    {
        ViewportSnapshot {
            offset_x: self.offset_x,
            offset_y: self.offset_y,
            scale_index: self.scale_index,
            zoom: self.zoom_factor,
        }
    }

    /// Applies a snapshot, clamping anything out of range.
    pub fn restore(&mut self, snapshot: &ViewportSnapshot)
    {
        self.scale_index = snapshot.scale_index.min(self.table.len() - 1);
        self.zoom_factor = if snapshot.zoom.is_finite()
        {
            snapshot.zoom.min(self.zoom_max).max(self.zoom_min)
        }
        else
        {
            1.0
        };
        self.offset_x = if snapshot.offset_x.is_finite() { snapshot.offset_x } else { 0.0 };
        self.offset_y = if snapshot.offset_y.is_finite() { snapshot.offset_y } else { 0.0 };
    }
}

#[test]
fn test_origin_is_centered()
{
    let scale = Scale::new(&PlotConfig::default());
    assert_eq!(scale.to_graph(ScreenPoint::new(400.0, 300.0)), GraphPoint::new(0.0, 0.0));
    assert_eq!(scale.scaler(), 1.0);
    // y grows upwards
    assert!(scale.client_top() > 0.0);
    assert!(scale.client_bottom() < 0.0);
    assert_eq!(scale.client_left(), -scale.client_right());
}

#[test]
fn test_screen_graph_round_trip()
{
    let mut scale = Scale::new(&PlotConfig::default());
    scale.pan(37.0, -12.5);
    let p = GraphPoint::new(3.25, -7.5);
    let back = scale.to_graph(scale.to_screen(p));
    assert!((back.x - p.x).abs() < 1e-12);
    assert!((back.y - p.y).abs() < 1e-12);
}

#[test]
fn test_zoom_steps_the_table_continuously()
{
    let mut scale = Scale::new(&PlotConfig::default());
    let center = ScreenPoint::new(400.0, 300.0);
    let mut last_ppu = scale.step_pixels() / scale.scaler();
    for _ in 0..30
    {
        scale.zoom(center, ZoomDirection::In);
        let ppu = scale.step_pixels() / scale.scaler();
        assert!((ppu / last_ppu - 1.1).abs() < 1e-9);
        last_ppu = ppu;
        assert!(scale.zoom_factor() >= 0.8 && scale.zoom_factor() <= 2.2);
    }
    assert!(scale.scaler() < 1.0);
}

#[test]
fn test_zoom_clamps_at_table_ends()
{
    let mut scale = Scale::new(&PlotConfig::default());
    let center = ScreenPoint::new(400.0, 300.0);
    for _ in 0..400
    {
        scale.zoom(center, ZoomDirection::Out);
    }
    assert_eq!(scale.scale_index(), scale.table().len() - 1);
    assert_eq!(scale.zoom_factor(), 0.8);

    for _ in 0..800
    {
        scale.zoom(center, ZoomDirection::In);
    }
    assert_eq!(scale.scale_index(), 0);
    assert_eq!(scale.zoom_factor(), 2.2);
}

#[test]
fn test_major_grid_line()
{
    let mut scale = Scale::new(&PlotConfig::default());
    assert_eq!(scale.major_grid_line(), 5);
    let lines = scale.grid_lines(-1.0, 10.5);
    assert_eq!(lines.first(), Some(&(-1.0, false)));
    assert_eq!(lines.iter().filter(|(_, major)| *major).count(), 3);

    scale.restore(&ViewportSnapshot { offset_x: 0.0, offset_y: 0.0, scale_index: 20, zoom: 1.0 });
    assert_eq!(scale.step().coefficient, 5);
    assert_eq!(scale.major_grid_line(), 4);
}

#[test]
fn test_snapshot_round_trip()
{
    let mut scale = Scale::new(&PlotConfig::default());
    scale.pan(13.0, 7.0);
    scale.zoom(ScreenPoint::new(10.0, 20.0), ZoomDirection::In);
    let snap = scale.snapshot();

    let mut other = Scale::new(&PlotConfig::default());
    other.restore(&snap);
    assert_eq!(other, scale);
    assert_eq!(other.snapshot(), snap);
}
