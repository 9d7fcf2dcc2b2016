use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};

use crate::newton::Tolerance;

/// Tunables of the plotting core.
///
/// Every field has a default, so a host only needs to spell out the ones it
/// wants to change:
///
/// # Example
/// ```
/// use geqsplot::config::PlotConfig;
///
/// let cfg = PlotConfig::from_json(r#"{ "zoom_ratio": 1.25 }"#).unwrap();
///
/// assert_eq!(cfg.zoom_ratio, 1.25);
/// assert_eq!(cfg.min_exponent, PlotConfig::default().min_exponent);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig
{
    /// Pixels between minor grid lines when `zoom_factor` is 1.
    pub base_step_pixels: f64,
    /// Smallest power of ten in the scale table.
    pub min_exponent: i32,
    /// Largest power of ten in the scale table.
    pub max_exponent: i32,
    /// Power of ten the viewport starts at, with coefficient 1.
    pub initial_exponent: i32,
    pub zoom_ratio: f64,
    pub zoom_min: f64,
    pub zoom_max: f64,
    pub width: f64,
    pub height: f64,
    /// Pixel spacing between curve samples.
    pub curve_sample_pixels: f64,
    /// Pixel spacing between samples scanned for sign changes.
    pub feature_sample_pixels: f64,
    /// Upper bound on samples per feature scan, whatever the viewport size.
    pub max_feature_samples: usize,
    /// Radius in pixels within which a click picks an intercept or critical point.
    pub feature_pick_pixels: f64,
    pub root_margin: f64,
    pub root_iteration_limit: usize,
    /// Largest |f(root)| accepted from a refinement.
    pub root_residual: f64,
}

impl Default for PlotConfig
{
    fn default() -> PlotConfig
    {
        PlotConfig {
            base_step_pixels: 20.0,
            min_exponent: -6,
            max_exponent: 6,
            initial_exponent: 0,
            zoom_ratio: 1.1,
            zoom_min: 0.8,
            zoom_max: 2.2,
            width: 800.0,
            height: 600.0,
            curve_sample_pixels: 1.0,
            feature_sample_pixels: 4.0,
            max_feature_samples: 20_000,
            feature_pick_pixels: 8.0,
            root_margin: 1e-12,
            root_iteration_limit: 100,
            root_residual: 1e-6,
        }
    }
}

impl PlotConfig
{
    pub fn from_json(text: &str) -> anyhow::Result<PlotConfig>
    {
        let cfg: PlotConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn tolerance(&self) -> Tolerance
    {
        Tolerance {
            margin: self.root_margin,
            limit: self.root_iteration_limit,
            residual: self.root_residual,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()>
    {
        ensure!(self.min_exponent <= self.max_exponent, "min_exponent must not exceed max_exponent");
        ensure!(
            (self.min_exponent..=self.max_exponent).contains(&self.initial_exponent),
            "initial_exponent must lie within the scale table"
        );
        ensure!(self.zoom_ratio > 1.0, "zoom_ratio must be greater than 1");
        ensure!(
            self.zoom_min > 0.0 && self.zoom_min * self.zoom_ratio <= self.zoom_max,
            "zoom band must be positive and wider than one zoom step"
        );
        // stepping the scale index multiplies pixels-per-unit by at most 2.5
        ensure!(self.zoom_max / self.zoom_min >= 2.5, "zoom band must span at least a factor of 2.5");
        for (name, value) in [
            ("base_step_pixels", self.base_step_pixels),
            ("curve_sample_pixels", self.curve_sample_pixels),
            ("feature_sample_pixels", self.feature_sample_pixels),
            ("root_margin", self.root_margin),
            ("root_residual", self.root_residual),
        ]
        {
            if !(value.is_finite() && value > 0.0)
            {
                bail!("{} must be a positive number, got {}", name, value);
            }
        }
        ensure!(self.width >= 0.0 && self.height >= 0.0, "canvas size must not be negative");
        ensure!(self.root_iteration_limit > 0, "root_iteration_limit must be at least 1");
        ensure!(self.max_feature_samples > 1, "max_feature_samples must be at least 2");
        Ok(())
    }
}

#[test]
fn test_default_config_is_valid()
{
    let cfg = PlotConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.max_exponent - cfg.min_exponent, 12);
    assert_eq!(cfg.tolerance(), Tolerance::default());
}

#[test]
fn test_from_json_rejects_bad_values()
{
    assert!(PlotConfig::from_json(r#"{ "zoom_ratio": 0.9 }"#).is_err());
    assert!(PlotConfig::from_json(r#"{ "min_exponent": 3, "max_exponent": 1 }"#).is_err());
    assert!(PlotConfig::from_json(r#"{ "root_margin": -1.0 }"#).is_err());
    assert!(PlotConfig::from_json("not json").is_err());

    let cfg = PlotConfig::from_json("{}").unwrap();
    assert_eq!(cfg, PlotConfig::default());
}
