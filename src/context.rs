use std::collections::HashMap;

use lazy_static::lazy_static;

/// Signature shared by every built-in math function. All built-ins take exactly one argument.
pub type MathFn = fn(f64) -> f64;

/// Names that are always "defined" for plotting but never stored in a scope.
///
/// `x` and `y` are the implicit plot variables, and they also name the
/// unnamed graphs `y = ...` and `x = ...`.
pub const RESERVED_NAMES: [&str; 2] = ["x", "y"];

/// The parameter used by bare expressions such as `x^2 + 1`.
pub const DEFAULT_PARAM: &str = "x";

/// The function name an unnamed graph of `x` is stored under.
pub const ANONYMOUS_FN: &str = "y";

fn sin(x: f64) -> f64 {
    x.sin()
}
fn cos(x: f64) -> f64 {
    x.cos()
}
fn tan(x: f64) -> f64 {
    x.tan()
}
fn arcsin(x: f64) -> f64 {
    x.asin()
}
fn arccos(x: f64) -> f64 {
    x.acos()
}
fn arctan(x: f64) -> f64 {
    x.atan()
}
fn sinh(x: f64) -> f64 {
    x.sinh()
}
fn cosh(x: f64) -> f64 {
    x.cosh()
}
fn tanh(x: f64) -> f64 {
    x.tanh()
}
fn sqrt(x: f64) -> f64 {
    x.sqrt()
}
fn ln(x: f64) -> f64 {
    x.ln()
}
fn log10(x: f64) -> f64 {
    x.log10()
}
fn exp(x: f64) -> f64 {
    x.exp()
}
fn abs(x: f64) -> f64 {
    x.abs()
}
fn floor(x: f64) -> f64 {
    x.floor()
}
fn ceil(x: f64) -> f64 {
    x.ceil()
}
fn round(x: f64) -> f64 {
    x.round()
}
// f64::signum maps 0 to 1
fn sign(x: f64) -> f64 {
    if x == 0.0 || x.is_nan() {
        x
    } else {
        x.signum()
    }
}

lazy_static! {
    static ref FUNCTIONS: HashMap<&'static str, MathFn> = {
        let mut table: HashMap<&'static str, MathFn> = HashMap::new();
        table.insert("sin",   sin);
        table.insert("cos",   cos);
        table.insert("tan",   tan);
        table.insert("asin",  arcsin);
        table.insert("acos",  arccos);
        table.insert("atan",  arctan);
        table.insert("sinh",  sinh);
        table.insert("cosh",  cosh);
        table.insert("tanh",  tanh);
        table.insert("sqrt",  sqrt);
        table.insert("ln",    ln);
        table.insert("log",   log10);
        table.insert("exp",   exp);
        table.insert("abs",   abs);
        table.insert("floor", floor);
        table.insert("ceil",  ceil);
        table.insert("round", round);
        table.insert("sign",  sign);
        table
    };

    static ref CONSTANTS: HashMap<&'static str, f64> = {
        let mut table = HashMap::new();
        table.insert("pi",  std::f64::consts::PI);
        table.insert("e",   std::f64::consts::E);
        table.insert("tau", std::f64::consts::TAU);
        table
    };
}

/// Looks up a function on the global allow-list.
pub fn builtin_function(name: &str) -> Option<MathFn> {
    FUNCTIONS.get(name).copied()
}

/// Looks up a constant on the global allow-list.
pub fn builtin_constant(name: &str) -> Option<f64> {
    CONSTANTS.get(name).copied()
}

pub fn is_builtin(name: &str) -> bool {
    FUNCTIONS.contains_key(name) || CONSTANTS.contains_key(name)
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Every name on the allow-list, functions first. Used for "did you mean" hints.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    FUNCTIONS.keys().chain(CONSTANTS.keys()).copied()
}

#[test]
fn test_builtin_lookup()
{
    let f = builtin_function("sqrt").unwrap();
    assert_eq!(f(9.0), 3.0);
    assert_eq!(builtin_constant("pi"), Some(std::f64::consts::PI));
    assert!(builtin_function("pi").is_none());
    assert!(is_builtin("log"));
    assert!(!is_builtin("f"));
}

#[test]
fn test_reserved_names_are_not_builtins()
{
    for name in RESERVED_NAMES {
        assert!(is_reserved(name));
        assert!(!is_builtin(name));
    }
    assert_eq!(builtin_function("sign").unwrap()(0.0), 0.0);
    assert_eq!(builtin_function("sign").unwrap()(-3.0), -1.0);
}
