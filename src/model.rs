use crate::expr::Node;
use crate::scope::Scope;
use crate::shunting::{compile_to_fn, CompiledFn};
use crate::transform::FunctionDef;

/// Which screen axis a function takes its input from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputAxis
{
    /// `y = f(x)`, the usual case.
    X,
    /// `x = f(y)`, plotted sideways.
    Y,
}

impl InputAxis
{
    pub fn for_param(param: &str) -> InputAxis
    {
        if param == "y" { InputAxis::Y } else { InputAxis::X }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FnPart
{
    pub formula: Node,
    pub param_name: String,
    /// `f(0)`, if finite.
    pub input_intercept: Option<f64>,
    /// Zeros of `f` found in the last scan.
    pub output_intercepts: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DerivativeState
{
    Absent,
    Present
    {
        formula: Node,
        param_name: String,
        /// Zeros of this derivative as `(input, f(input))` pairs.
        critical_points: Vec<(f64, f64)>,
    },
}

impl DerivativeState
{
    pub fn is_present(&self) -> bool
    {
        matches!(self, DerivativeState::Present { .. })
    }

    pub fn critical_points(&self) -> &[(f64, f64)]
    {
        match self
        {
            DerivativeState::Present { critical_points, .. } => critical_points,
            DerivativeState::Absent => &[],
        }
    }

    pub fn set_critical_points(&mut self, points: Vec<(f64, f64)>)
    {
        if let DerivativeState::Present { critical_points, .. } = self
        {
            *critical_points = points;
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FnState
{
    pub f: FnPart,
    pub df: DerivativeState,
    /// Zeros of `f''` are kept as inflection candidates.
    pub ddf: DerivativeState,
}

/// A function with every scope reference resolved, compiled for fast sampling.
#[derive(Clone, Debug)]
pub struct FnModel
{
    name: String,
    axis: InputAxis,
    state: FnState,
    f: CompiledFn,
    df: Option<CompiledFn>,
    ddf: Option<CompiledFn>,
    constant: bool,
    derivative_constant: bool,
}

impl FnModel
{
    /// Resolves `def` against `scope`, compiles it and differentiates it twice.
    ///
    /// Differentiation failures only drop the derivative; an error is
    /// returned only when `f` itself cannot be resolved or compiled.
    ///
    /// # Example
    /// ```
    /// use geqsplot::model::FnModel;
    /// use geqsplot::scope::Scope;
    /// use geqsplot::transform::{parse, ParsedContent};
    ///
    /// let scope = Scope::new();
    /// let def = match parse("f(x) = x^2 - 1", &scope).unwrap() {
    ///     ParsedContent::Function(def) => def,
    ///     _ => unreachable!(),
    /// };
    /// let model = FnModel::build(&def, &scope).unwrap();
    ///
    /// assert_eq!(model.eval(3.0), 8.0);
    /// assert_eq!(model.eval_df(3.0), Some(6.0));
    /// assert_eq!(model.state().f.input_intercept, Some(-1.0));
    /// ```
    pub fn build(def: &FunctionDef, scope: &Scope) -> anyhow::Result<FnModel>
    {
        let param = def.param.as_str();
        let formula = scope.inline(&def.body, Some(param))?.simplify();
        let f = compile_to_fn(&formula, param)?;

        let (df_state, df) = derive(&formula, param, &def.name);
        let (ddf_state, ddf) = match &df_state
        {
            DerivativeState::Present { formula: df_formula, .. } => derive(df_formula, param, &def.name),
            DerivativeState::Absent => (DerivativeState::Absent, None),
        };

        let constant = !formula.contains(param);
        let derivative_constant = match &df_state
        {
            DerivativeState::Present { formula, .. } => !formula.contains(param),
            DerivativeState::Absent => false,
        };

        let input_intercept = Some(f.sample(0.0)).filter(|y| y.is_finite());

        Ok(FnModel {
            name: def.name.clone(),
            axis: InputAxis::for_param(param),
            state: FnState {
                f: FnPart {
                    formula,
                    param_name: param.to_owned(),
                    input_intercept,
                    output_intercepts: Vec::new(),
                },
                df: df_state,
                ddf: ddf_state,
            },
            f,
            df,
            ddf,
            constant,
            derivative_constant,
        })
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn axis(&self) -> InputAxis
    {
        self.axis
    }

    pub fn param(&self) -> &str
    {
        &self.state.f.param_name
    }

    pub fn state(&self) -> &FnState
    {
        &self.state
    }

    /// `f` at `t`, NaN where undefined.
    pub fn eval(&self, t: f64) -> f64
    {
        self.f.sample(t)
    }

    pub fn eval_df(&self, t: f64) -> Option<f64>
    {
        self.df.as_ref().map(|df| df.sample(t))
    }

    pub fn eval_ddf(&self, t: f64) -> Option<f64>
    {
        self.ddf.as_ref().map(|ddf| ddf.sample(t))
    }

    pub fn compiled(&self) -> &CompiledFn
    {
        &self.f
    }

    pub fn compiled_df(&self) -> Option<&CompiledFn>
    {
        self.df.as_ref()
    }

    pub fn compiled_ddf(&self) -> Option<&CompiledFn>
    {
        self.ddf.as_ref()
    }

    /// Whether `f` does not depend on its parameter at all.
    pub fn is_constant(&self) -> bool
    {
        self.constant
    }

    pub fn derivative_is_constant(&self) -> bool
    {
        self.derivative_constant
    }
}

fn derive(formula: &Node, param: &str, name: &str) -> (DerivativeState, Option<CompiledFn>)
{
    let derived = match formula.derivative(param)
    {
        Ok(d) => d,
        Err(e) => {
            log::debug!("no derivative for '{}': {}", name, e);
            return (DerivativeState::Absent, None);
        },
    };
    match compile_to_fn(&derived, param)
    {
        Ok(compiled) => (
            DerivativeState::Present {
                formula: derived,
                param_name: param.to_owned(),
                critical_points: Vec::new(),
            },
            Some(compiled),
        ),
        Err(e) => {
            log::debug!("derivative of '{}' did not compile: {}", name, e);
            (DerivativeState::Absent, None)
        },
    }
}

#[cfg(test)]
fn model_of(text: &str, scope: &Scope) -> FnModel
{
    match crate::transform::parse(text, scope).unwrap()
    {
        crate::transform::ParsedContent::Function(def) => FnModel::build(&def, scope).unwrap(),
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn test_abs_has_no_derivative()
{
    let model = model_of("abs(x) - 1", &Scope::new());
    assert_eq!(model.state().df, DerivativeState::Absent);
    assert_eq!(model.state().ddf, DerivativeState::Absent);
    assert_eq!(model.eval(-3.0), 2.0);
    assert_eq!(model.eval_df(1.0), None);
}

#[test]
fn test_sideways_function()
{
    let model = model_of("x = y^2", &Scope::new());
    assert_eq!(model.axis(), InputAxis::Y);
    assert_eq!(model.param(), "y");
    assert_eq!(model.eval(2.0), 4.0);
}

#[test]
fn test_constant_detection()
{
    let model = model_of("y = 3", &Scope::new());
    assert!(model.is_constant());

    let model = model_of("y = 2x + 1", &Scope::new());
    assert!(!model.is_constant());
    assert!(model.derivative_is_constant());
    assert!(model.state().ddf.is_present());
}

#[test]
fn test_input_intercept_dropped_when_undefined()
{
    let model = model_of("y = 1 / x", &Scope::new());
    assert_eq!(model.state().f.input_intercept, None);
    assert_eq!(model.eval(0.5), 2.0);
}

#[test]
fn test_inlines_scope()
{
    let mut scope = Scope::new();
    for text in ["a = 2", "g(t) = t + a"]
    {
        let parsed = crate::transform::parse(text, &scope).unwrap();
        let name = parsed.defined_name().unwrap().to_owned();
        scope.insert(&name, parsed.to_scope_value(text).unwrap());
    }
    let model = model_of("h(x) = g(x)^2", &scope);
    assert_eq!(model.eval(1.0), 9.0);
    assert_eq!(model.eval_df(1.0), Some(6.0));
}
