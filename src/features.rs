use crate::model::{DerivativeState, FnModel, FnState};
use crate::newton::{refine_root, Strategy, Tolerance};
use crate::shunting::CompiledFn;

/// A stretch of a function's input axis to scan, sampled on multiples of `step`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleDomain
{
    pub start: f64,
    pub end: f64,
    pub step: f64,
    pub max_samples: usize,
}

impl SampleDomain
{
    pub fn new(start: f64, end: f64, step: f64, max_samples: usize) -> SampleDomain
    {
        SampleDomain { start: start.min(end), end: start.max(end), step, max_samples }
    }

    /// Sample inputs `k * step` covering the domain. The step is widened if
    /// the domain would need more than `max_samples` samples, so 0 is still
    /// sampled exactly whenever it lies inside.
    ///
    /// # Example
    /// ```
    /// use geqsplot::features::SampleDomain;
    ///
    /// let xs = SampleDomain::new(-0.35, 0.25, 0.1, 100).samples();
    ///
    /// assert_eq!(xs.len(), 6);
    /// assert!(xs.contains(&0.0));
    /// ```
    pub fn samples(&self) -> Vec<f64>
    {
        if !(self.step > 0.0 && self.start.is_finite() && self.end.is_finite())
        {
            return Vec::new();
        }
        let mut step = self.step;
        let needed = (self.end - self.start) / step;
        if needed > self.max_samples as f64
        {
            step *= needed / self.max_samples as f64;
        }
        let first = (self.start / step).ceil() as i64;
        let last = (self.end / step).floor() as i64;
        (first..=last).map(|k| k as f64 * step).collect()
    }
}

/// Points of interest found on the visible part of a function.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Features
{
    /// Inputs where `f` is zero.
    pub intercepts: Vec<f64>,
    /// `(t, f(t))` where `f'` is zero.
    pub critical_points: Vec<(f64, f64)>,
    /// `(t, f(t))` where `f''` is zero.
    pub inflection_points: Vec<(f64, f64)>,
}

impl Features
{
    pub fn apply_to(self, state: &mut FnState)
    {
        state.f.output_intercepts = self.intercepts;
        state.df.set_critical_points(self.critical_points);
        state.ddf.set_critical_points(self.inflection_points);
    }
}

/// Zeros of `f` on `domain`.
///
/// Exact zeros at sample points count directly. Between consecutive finite
/// samples of opposite sign the root is refined with `strategies`; poles
/// show up as sign changes too, but they fail the residual check.
pub fn find_zeros(
    f: &CompiledFn,
    df: Option<&CompiledFn>,
    domain: &SampleDomain,
    strategies: &[Strategy],
    tol: &Tolerance,
) -> Vec<f64>
{
    let xs = domain.samples();
    let ys: Vec<f64> = xs.iter().map(|&x| f.sample(x)).collect();

    let mut roots: Vec<f64> = Vec::new();
    for i in 0..xs.len()
    {
        if ys[i] == 0.0
        {
            roots.push(xs[i]);
            continue;
        }
        if i + 1 < xs.len() && ys[i] * ys[i + 1] < 0.0
        {
            if let Some(root) = refine_root(f, df, xs[i], xs[i + 1], strategies, tol)
            {
                roots.push(root);
            }
        }
    }

    // a refined root may land on a neighbouring exact zero
    let min_gap = domain.step * 1e-3;
    roots.sort_by(|a, b| a.total_cmp(b));
    roots.dedup_by(|a, b| (*a - *b).abs() <= min_gap);
    roots
}

fn varies(state: &DerivativeState) -> bool
{
    match state
    {
        DerivativeState::Present { formula, param_name, .. } => formula.contains(param_name),
        DerivativeState::Absent => false,
    }
}

pub fn find_intercepts(model: &FnModel, domain: &SampleDomain, tol: &Tolerance) -> Vec<f64>
{
    if model.is_constant()
    {
        return Vec::new();
    }
    find_zeros(model.compiled(), model.compiled_df(), domain, &[Strategy::Newton, Strategy::Bisection], tol)
}

pub fn find_critical_points(model: &FnModel, domain: &SampleDomain, tol: &Tolerance) -> Vec<(f64, f64)>
{
    let df = match model.compiled_df()
    {
        Some(df) if !model.is_constant() => df,
        _ => return Vec::new(),
    };
    let strategies: &[Strategy] = if model.derivative_is_constant()
    {
        &[Strategy::Bisection]
    }
    else
    {
        &[Strategy::Newton, Strategy::Bisection]
    };
    on_curve(model, find_zeros(df, model.compiled_ddf(), domain, strategies, tol))
}

pub fn find_inflection_points(model: &FnModel, domain: &SampleDomain, tol: &Tolerance) -> Vec<(f64, f64)>
{
    let ddf = match model.compiled_ddf()
    {
        Some(ddf) if varies(&model.state().ddf) => ddf,
        _ => return Vec::new(),
    };
    on_curve(model, find_zeros(ddf, None, domain, &[Strategy::Bisection], tol))
}

fn on_curve(model: &FnModel, inputs: Vec<f64>) -> Vec<(f64, f64)>
{
    inputs.into_iter()
        .map(|t| (t, model.eval(t)))
        .filter(|(_, value)| value.is_finite())
        .collect()
}

/// Runs every detector over `domain`.
pub fn detect(model: &FnModel, domain: &SampleDomain, tol: &Tolerance) -> Features
{
    if model.is_constant()
    {
        return Features::default();
    }
    Features {
        intercepts: find_intercepts(model, domain, tol),
        critical_points: find_critical_points(model, domain, tol),
        inflection_points: find_inflection_points(model, domain, tol),
    }
}

#[cfg(test)]
fn model_of(text: &str) -> FnModel
{
    let scope = crate::scope::Scope::new();
    match crate::transform::parse(text, &scope).unwrap()
    {
        crate::transform::ParsedContent::Function(def) => FnModel::build(&def, &scope).unwrap(),
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn test_parabola_features()
{
    let model = model_of("f(x) = x^2");
    let domain = SampleDomain::new(-10.0, 10.0, 0.2, 10_000);
    let features = detect(&model, &domain, &Tolerance::default());

    assert_eq!(features.intercepts, vec![0.0]);
    assert_eq!(features.critical_points, vec![(0.0, 0.0)]);
    assert!(features.inflection_points.is_empty());
}

#[test]
fn test_roots_are_accurate()
{
    let model = model_of("y = x^3 - 2x - 5");
    let domain = SampleDomain::new(-5.0, 5.0, 0.25, 10_000);
    let roots = find_intercepts(&model, &domain, &Tolerance::default());

    assert_eq!(roots.len(), 1);
    assert!((roots[0] - 2.0945514815423265).abs() < 1e-6);
}

#[test]
fn test_sine_features()
{
    use std::f64::consts::PI;

    let model = model_of("y = sin(x)");
    let domain = SampleDomain::new(-1.0, 7.0, 0.1, 10_000);
    let features = detect(&model, &domain, &Tolerance::default());

    assert_eq!(features.intercepts.len(), 3);
    for (found, expected) in features.intercepts.iter().zip([0.0, PI, 2.0 * PI])
    {
        assert!((found - expected).abs() < 1e-6);
    }
    assert_eq!(features.critical_points.len(), 2);
    assert!((features.critical_points[0].0 - PI / 2.0).abs() < 1e-6);
    assert!((features.critical_points[0].1 - 1.0).abs() < 1e-6);
}

#[test]
fn test_constant_and_linear_short_circuit()
{
    let domain = SampleDomain::new(-10.0, 10.0, 0.5, 10_000);
    let tol = Tolerance::default();

    let flat = detect(&model_of("y = 0"), &domain, &tol);
    assert_eq!(flat, Features::default());

    let line = detect(&model_of("y = 2x - 3"), &domain, &tol);
    assert_eq!(line.intercepts.len(), 1);
    assert!((line.intercepts[0] - 1.5).abs() < 1e-6);
    assert!(line.critical_points.is_empty());
    assert!(line.inflection_points.is_empty());
}

#[test]
fn test_poles_are_not_roots()
{
    let model = model_of("y = 1 / x");
    let domain = SampleDomain::new(-3.0, 3.0, 0.1, 10_000);
    assert!(find_intercepts(&model, &domain, &Tolerance::default()).is_empty());
}

#[test]
fn test_sample_cap_keeps_zero()
{
    let xs = SampleDomain::new(-1000.0, 1000.0, 0.001, 100).samples();
    assert!(xs.len() <= 101);
    assert!(xs.contains(&0.0));
}
