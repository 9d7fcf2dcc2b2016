use crate::errors::RootFindingError;
use crate::shunting::CompiledFn;

/// A basic implementation of the 1-D newton-raphson method using an exact
/// derivative. This function allows the caller to choose an initial guess
/// value, a margin on the step size, and a maximum number of iterations
/// prior to returning a value.
///
/// # Example
/// ```
/// use geqsplot::newton::newton_raphson;
///
/// let root = newton_raphson(|x| Ok(x * x - 2.0), |x| Ok(2.0 * x), 1.0, 1e-12, 50).unwrap();
///
/// assert!((root - 2f64.sqrt()).abs() < 1e-9);
/// ```
pub fn newton_raphson(
    f: impl Fn(f64) -> anyhow::Result<f64>,
    df: impl Fn(f64) -> anyhow::Result<f64>,
    guess: f64,
    margin: f64,
    limit: usize,
) -> anyhow::Result<f64>
{
    // Catch illegal margin of error
    if margin <= 0.0
    {
        return Err(RootFindingError::NegativeMargin.into());
    }

    // Allow user to manually prevent stack overflow
    if limit == 0
    {
        return Err(RootFindingError::ReachedIterationLimit.into());
    }

    let y = f(guess)?;
    if y == 0.0
    {
        return Ok(guess); // exact hit, exit early
    }

    let y_prime = df(guess)?;
    if y_prime == 0.0 || !y_prime.is_finite()
    {
        return Err(RootFindingError::FlatDerivative.into());
    }

    let next_guess = guess - y / y_prime;
    if !next_guess.is_finite()
    {
        return Err(RootFindingError::NonFiniteResult.into());
    }

    // Check if the step is small enough relative to the guess
    if (next_guess - guess).abs() <= margin * next_guess.abs().max(1.0)
    {
        return Ok(next_guess);
    }

    newton_raphson(f, df, next_guess, margin, limit - 1)
}

/// Bisection on a bracket whose endpoints have opposite signs.
///
/// Stops once the bracket is narrower than `margin` (relative to its
/// magnitude) or can no longer be split in floating point.
///
/// # Example
/// ```
/// use geqsplot::newton::bisection;
///
/// let root = bisection(|x| Ok(x.cos()), 1.0, 2.0, 1e-12, 200).unwrap();
///
/// assert!((root - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
/// ```
pub fn bisection(
    f: impl Fn(f64) -> anyhow::Result<f64>,
    a: f64,
    b: f64,
    margin: f64,
    limit: usize,
) -> anyhow::Result<f64>
{
    if margin <= 0.0
    {
        return Err(RootFindingError::NegativeMargin.into());
    }

    let (mut lo, mut hi) = (a.min(b), a.max(b));
    let (mut f_lo, f_hi) = (f(lo)?, f(hi)?);
    if f_lo == 0.0
    {
        return Ok(lo);
    }
    if f_hi == 0.0
    {
        return Ok(hi);
    }
    if f_lo.signum() == f_hi.signum() || f_lo.is_nan() || f_hi.is_nan()
    {
        return Err(RootFindingError::NoSignChange.into());
    }

    for _ in 0..limit
    {
        let mid = lo + (hi - lo) / 2.0;
        // the bracket cannot shrink any further
        if mid <= lo || mid >= hi || hi - lo <= margin * mid.abs().max(1.0)
        {
            return Ok(mid);
        }
        let f_mid = f(mid)?;
        if f_mid == 0.0
        {
            return Ok(mid);
        }
        if f_mid.is_nan()
        {
            return Err(RootFindingError::NonFiniteResult.into());
        }
        if f_mid.signum() == f_lo.signum()
        {
            lo = mid;
            f_lo = f_mid;
        }
        else
        {
            hi = mid;
        }
    }
    Err(RootFindingError::ReachedIterationLimit.into())
}

/// Tolerances shared by every root refinement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerance
{
    pub margin: f64,
    pub limit: usize,
    pub residual: f64,
}

impl Default for Tolerance
{
    fn default() -> Tolerance
    {
        Tolerance { margin: 1e-12, limit: 100, residual: 1e-6 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy
{
    /// Needs a derivative; skipped otherwise.
    Newton,
    Bisection,
}

/// Refines a root of `f` known to lie in the bracket `(a, b)`.
///
/// Strategies are tried in order. A result is accepted only if it is
/// finite, lies within the bracket and `|f(root)|` is within the residual
/// tolerance; otherwise the next strategy gets a turn.
pub fn refine_root(
    f: &CompiledFn,
    df: Option<&CompiledFn>,
    a: f64,
    b: f64,
    strategies: &[Strategy],
    tol: &Tolerance,
) -> Option<f64>
{
    let (lo, hi) = (a.min(b), a.max(b));
    for strategy in strategies
    {
        let attempt = match (strategy, df)
        {
            (Strategy::Newton, Some(df)) => newton_raphson(
                |x| f.eval(x),
                |x| df.eval(x),
                lo + (hi - lo) / 2.0,
                tol.margin,
                tol.limit,
            ),
            (Strategy::Newton, None) => continue,
            (Strategy::Bisection, _) => bisection(|x| f.eval(x), lo, hi, tol.margin, tol.limit * 2),
        };
        match attempt
        {
            Ok(root) if root.is_finite() && root >= lo && root <= hi && f.sample(root).abs() <= tol.residual => {
                return Some(root);
            },
            Ok(root) => log::trace!("{:?} left the bracket [{}, {}] at {}", strategy, lo, hi, root),
            Err(e) => log::trace!("{:?} failed on [{}, {}]: {}", strategy, lo, hi, e),
        }
    }
    None
}

#[test]
fn test_newton_raphson_rejects_bad_margin()
{
    let err = newton_raphson(|x| Ok(x), |_| Ok(1.0), 1.0, 0.0, 10).unwrap_err();
    assert_eq!(err.downcast_ref::<RootFindingError>(), Some(&RootFindingError::NegativeMargin));
}

#[test]
fn test_newton_raphson_flat_derivative()
{
    let err = newton_raphson(|x| Ok(x * x + 1.0), |x| Ok(2.0 * x), 0.0, 1e-12, 10).unwrap_err();
    assert_eq!(err.downcast_ref::<RootFindingError>(), Some(&RootFindingError::FlatDerivative));
}

#[test]
fn test_bisection_needs_sign_change()
{
    let err = bisection(|x| Ok(x * x + 1.0), -1.0, 1.0, 1e-12, 100).unwrap_err();
    assert_eq!(err.downcast_ref::<RootFindingError>(), Some(&RootFindingError::NoSignChange));
}

#[test]
fn test_refine_root_falls_back_to_bisection()
{
    use crate::shunting::{compile_to_fn, parse_expression};

    // newton diverges on atan once the guess is further than ~1.39 from the root
    let f = compile_to_fn(&parse_expression("atan(x)", 0).unwrap(), "x").unwrap();
    let df = compile_to_fn(&parse_expression("1 / (1 + x^2)", 0).unwrap(), "x").unwrap();

    let root = refine_root(&f, Some(&df), -1.0, 20.0, &[Strategy::Newton, Strategy::Bisection], &Tolerance::default());
    let root = root.unwrap();
    assert!(root.abs() < 1e-6, "root was {}", root);
}

#[test]
fn test_refine_root_with_newton()
{
    use crate::shunting::{compile_to_fn, parse_expression};

    let f = compile_to_fn(&parse_expression("x^2 - 2", 0).unwrap(), "x").unwrap();
    let df = compile_to_fn(&parse_expression("2x", 0).unwrap(), "x").unwrap();

    let root = refine_root(&f, Some(&df), 1.0, 2.0, &[Strategy::Newton], &Tolerance::default()).unwrap();
    assert!((root - 2f64.sqrt()).abs() < 1e-6);
}
