use std::ops::{AddAssign, SubAssign};

use serde::{Deserialize, Serialize};

use crate::render::{Color, LineStyle, PointGlyph};

/// Colors handed out to new graphs, in order.
pub const PALETTE: [u32; 6] = [0xc74440, 0x2d70b3, 0x388c46, 0x6042a6, 0xfa7e19, 0x000000];

/// A number that always stays within `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "RawBounded")]
pub struct Bounded
{
    value: f64,
    pub min: f64,
    pub max: f64,
}

impl Bounded
{
    pub fn new<T>(value: T, min: T, max: T) -> Bounded
    where T: Into<f64> + Copy
    {
        let mut bounded = Bounded { value: min.into(), min: min.into(), max: max.into() };
        bounded.set(value);
        bounded
    }

    pub fn get(&self) -> f64
    {
        self.value
    }

    /// Sets the value, clamping it to `self.min` or `self.max` if it falls
    /// outside the range. NaN is ignored.
    ///
    /// # Example
    /// ```
    /// use geqsplot::settings::Bounded;
    ///
    /// let mut opacity = Bounded::new(1.0, 0.0, 1.0);
    ///
    /// opacity.set(1.7);
    /// assert_eq!(opacity.get(), 1.0);
    ///
    /// opacity.set(0.25);
    /// assert_eq!(opacity.get(), 0.25);
    /// ```
    pub fn set<T>(&mut self, new_value: T)
    where T: Into<f64> + Copy
    {
        let new_value = new_value.into();
        if new_value.is_nan()
        {
            return;
        }
        if new_value > self.max
        {
            self.value = self.max;
        }
        else if new_value < self.min
        {
            self.value = self.min;
        }
        else
        {
            self.value = new_value;
        }
    }
}

/// Serialized form of `Bounded`, clamped on the way in.
#[derive(Deserialize)]
struct RawBounded
{
    value: f64,
    min: f64,
    max: f64,
}

impl TryFrom<RawBounded> for Bounded
{
    type Error = String;

    fn try_from(raw: RawBounded) -> Result<Bounded, String>
    {
        if !(raw.min <= raw.max)
        {
            return Err(format!("empty range [{}, {}]", raw.min, raw.max));
        }
        Ok(Bounded::new(raw.value, raw.min, raw.max))
    }
}

impl From<Bounded> for f64
{
    fn from(value: Bounded) -> Self
    {
        value.value
    }
}

impl<T> AddAssign<T> for Bounded
where T: Into<f64>
{
    fn add_assign(&mut self, rhs: T)
    {
        self.set(self.value + rhs.into());
    }
}

impl<T> SubAssign<T> for Bounded
where T: Into<f64>
{
    fn sub_assign(&mut self, rhs: T)
    {
        self.set(self.value - rhs.into());
    }
}

/// Display settings of a function or point item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemSettings
{
    pub color: Color,
    pub hidden: bool,
    /// In `[0, 1]`.
    pub opacity: Bounded,
    /// Curve width or point size in pixels, in `[0, 10]`.
    pub stroke: Bounded,
    pub line_style: LineStyle,
    pub glyph: PointGlyph,
}

impl ItemSettings
{
    pub fn new(color: Color) -> ItemSettings
    {
        ItemSettings {
            color,
            hidden: false,
            opacity: Bounded::new(1.0, 0.0, 1.0),
            stroke: Bounded::new(2.5, 0.0, 10.0),
            line_style: LineStyle::Solid,
            glyph: PointGlyph::Circle,
        }
    }

    /// Settings for the `n`th drawable item, cycling through `PALETTE`.
    pub fn for_index(n: usize) -> ItemSettings
    {
        ItemSettings::new(Color::from_rgb(PALETTE[n % PALETTE.len()]))
    }

    /// The configured color with the opacity applied.
    pub fn paint(&self) -> Color
    {
        self.color.with_alpha(self.color.a * self.opacity.get() as f32)
    }
}

impl Default for ItemSettings
{
    fn default() -> ItemSettings
    {
        ItemSettings::for_index(0)
    }
}

#[test]
fn test_bounded_clamps()
{
    let mut stroke = Bounded::new(12, 0, 10);
    assert_eq!(f64::from(stroke), 10.0);

    stroke -= 15;
    assert_eq!(stroke.get(), 0.0);

    stroke += 2.5;
    assert_eq!(stroke.get(), 2.5);

    stroke.set(f64::NAN);
    assert_eq!(stroke.get(), 2.5);
}

#[test]
fn test_paint_applies_opacity()
{
    let mut settings = ItemSettings::for_index(7);
    assert_eq!(settings.color, Color::from_rgb(PALETTE[1]));

    settings.opacity.set(0.5);
    assert_eq!(settings.paint().a, 0.5);
}

#[test]
fn test_deserialized_values_are_clamped()
{
    let opacity: Bounded = serde_json::from_str(r#"{"value": 3.0, "min": 0.0, "max": 1.0}"#).unwrap();
    assert_eq!(opacity.get(), 1.0);

    let stroke: Bounded = serde_json::from_str(r#"{"value": -4, "min": 0.5, "max": 10}"#).unwrap();
    assert_eq!(stroke.get(), 0.5);

    assert!(serde_json::from_str::<Bounded>(r#"{"value": 1, "min": 2, "max": 1}"#).is_err());
}
