use serde::{Deserialize, Serialize};

/// A position in canvas pixels, origin at the top left, y growing downwards.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint
{
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint
{
    pub fn new(x: f64, y: f64) -> ScreenPoint
    {
        ScreenPoint { x, y }
    }
}

/// A position in graph units, y growing upwards.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphPoint
{
    pub x: f64,
    pub y: f64,
}

impl GraphPoint
{
    pub fn new(x: f64, y: f64) -> GraphPoint
    {
        GraphPoint { x, y }
    }

    pub fn distance(&self, other: GraphPoint) -> f64
    {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool
    {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Distance from `self` to the segment `a`-`b`.
    pub fn distance_to_segment(&self, a: GraphPoint, b: GraphPoint) -> f64
    {
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let len2 = dx * dx + dy * dy;
        if len2 == 0.0
        {
            return self.distance(a);
        }
        let t = (((self.x - a.x) * dx + (self.y - a.y) * dy) / len2).clamp(0.0, 1.0);
        self.distance(GraphPoint::new(a.x + t * dx, a.y + t * dy))
    }
}

/// RGBA color, every channel in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color
{
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color
{
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Color
    {
        Color { r, g, b, a }
    }

    /// Opaque color from a `0xRRGGBB` literal.
    pub fn from_rgb(hex: u32) -> Color
    {
        Color {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
            a: 1.0,
        }
    }

    pub fn with_alpha(self, a: f32) -> Color
    {
        Color { a: a.clamp(0.0, 1.0), ..self }
    }

    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineStyle
{
    #[default]
    Solid,
    Dashed,
    Dotted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PointGlyph
{
    #[default]
    Circle,
    Cross,
    Square,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stroke
{
    pub color: Color,
    /// Width in pixels.
    pub width: f64,
    pub style: LineStyle,
}

impl Stroke
{
    pub fn solid(color: Color, width: f64) -> Stroke
    {
        Stroke { color, width, style: LineStyle::Solid }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextAnchor
{
    /// Text starts at the position.
    Start,
    Middle,
    /// Text ends at the position.
    End,
}

/// One draw instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp
{
    /// Fills the whole canvas.
    Clear
    {
        color: Color,
    },
    Line
    {
        from: ScreenPoint,
        to: ScreenPoint,
        stroke: Stroke,
    },
    Polyline
    {
        points: Vec<ScreenPoint>,
        stroke: Stroke,
    },
    Marker
    {
        center: ScreenPoint,
        /// Radius in pixels.
        radius: f64,
        glyph: PointGlyph,
        color: Color,
        filled: bool,
    },
    Text
    {
        position: ScreenPoint,
        text: String,
        size: f64,
        color: Color,
        anchor: TextAnchor,
    },
}

/// Draw instructions of one frame, in painting order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList
{
    ops: Vec<DrawOp>,
}

impl DrawList
{
    pub fn new() -> DrawList
    {
        DrawList::default()
    }

    pub fn push(&mut self, op: DrawOp)
    {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[DrawOp]
    {
        &self.ops
    }

    pub fn len(&self) -> usize
    {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<DrawOp>
    {
        self.ops
    }
}

/// Formats a coordinate for labels and tooltips: at most four decimals, no trailing zeros.
///
/// # Example
/// ```
/// use geqsplot::render::format_coord;
///
/// assert_eq!(format_coord(1.50000), "1.5");
/// assert_eq!(format_coord(-0.00001), "0");
/// assert_eq!(format_coord(2.0), "2");
/// ```
pub fn format_coord(value: f64) -> String
{
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text
    {
        "-0" | "" => "0".to_owned(),
        other => other.to_owned(),
    }
}

/// Tooltip label for a point, as in `(1.5, -2)`.
pub fn format_point(x: f64, y: f64) -> String
{
    format!("({}, {})", format_coord(x), format_coord(y))
}

#[test]
fn test_color_from_rgb()
{
    let c = Color::from_rgb(0xff0000);
    assert_eq!(c, Color::new(1.0, 0.0, 0.0, 1.0));
    assert_eq!(c.with_alpha(2.0).a, 1.0);
}

#[test]
fn test_distance_to_segment()
{
    let p = GraphPoint::new(1.0, 1.0);
    let d = p.distance_to_segment(GraphPoint::new(0.0, 0.0), GraphPoint::new(2.0, 0.0));
    assert_eq!(d, 1.0);

    // beyond the end, the distance is to the endpoint
    let d = GraphPoint::new(5.0, 0.0).distance_to_segment(GraphPoint::new(0.0, 0.0), GraphPoint::new(2.0, 0.0));
    assert_eq!(d, 3.0);
}

#[test]
fn test_format_point()
{
    assert_eq!(format_point(0.0, -1.25), "(0, -1.25)");
    assert_eq!(format_coord(1234.56789), "1234.5679");
}
