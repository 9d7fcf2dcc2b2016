use std::fmt;

use crate::context::{builtin_constant, builtin_function, builtin_names, is_builtin, is_reserved, ANONYMOUS_FN, DEFAULT_PARAM};
use crate::errors::ApplicationError;
use crate::expr::{BinOp, Node, Span};
use crate::scope::{Scope, ScopeValue};
use crate::shunting::parse_expression;

/// Similarity above which an undefined name gets a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef
{
    pub name: String,
    pub param: String,
    pub body: Node,
    /// `y = ...`, `x = ...` and bare expressions: plotted, but never stored in scope.
    pub anonymous: bool,
    pub dependencies: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDef
{
    pub name: String,
    pub body: Node,
    pub value: f64,
    pub dependencies: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointDef
{
    pub x: Node,
    pub y: Node,
    pub value: (f64, f64),
    pub dependencies: Vec<String>,
}

/// Result of classifying one expression.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedContent
{
    /// The text was empty.
    Cleared,
    Function(FunctionDef),
    Variable(VariableDef),
    Point(PointDef),
}

impl ParsedContent
{
    /// The name this content defines in scope, if any.
    pub fn defined_name(&self) -> Option<&str>
    {
        match self
        {
            ParsedContent::Function(def) if !def.anonymous => Some(&def.name),
            ParsedContent::Variable(def) => Some(&def.name),
            _ => None,
        }
    }

    /// Scope names referenced by this content, in first-use order.
    pub fn dependencies(&self) -> &[String]
    {
        match self
        {
            ParsedContent::Cleared => &[],
            ParsedContent::Function(def) => &def.dependencies,
            ParsedContent::Variable(def) => &def.dependencies,
            ParsedContent::Point(def) => &def.dependencies,
        }
    }

    /// The scope entry this content should be stored as, if it defines a name.
    pub fn to_scope_value(&self, formula_text: &str) -> Option<ScopeValue>
    {
        match self
        {
            ParsedContent::Function(def) if !def.anonymous => Some(ScopeValue::Function {
                formula_text: formula_text.to_owned(),
                param: def.param.clone(),
                body: def.body.clone(),
                dependencies: def.dependencies.clone(),
            }),
            ParsedContent::Variable(def) => Some(ScopeValue::Variable {
                formula_text: formula_text.to_owned(),
                value: def.value,
                dependencies: def.dependencies.clone(),
            }),
            _ => None,
        }
    }
}

/// Writes the content back as expression text that parses to the same definition.
impl fmt::Display for ParsedContent
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self
        {
            ParsedContent::Cleared => Ok(()),
            ParsedContent::Function(def) => match (def.name.as_str(), def.param.as_str())
            {
                ("y", "x") | ("x", "y") if def.anonymous => write!(f, "{} = {}", def.name, def.body),
                _ => write!(f, "{}({}) = {}", def.name, def.param, def.body),
            },
            ParsedContent::Variable(def) => write!(f, "{} = {}", def.name, def.body),
            ParsedContent::Point(def) => write!(f, "({}, {})", def.x, def.y),
        }
    }
}

/// Walks a syntax tree, checking every symbol and call against the scope.
///
/// Calls whose callee is a value (`a(x + 1)`) are rewritten into products,
/// and every scope name used is collected as a dependency.
struct Checker<'a>
{
    scope: &'a Scope,
    param: Option<&'a str>,
    defining: Option<&'a str>,
    dependencies: Vec<String>,
}

impl<'a> Checker<'a>
{
    fn new(scope: &'a Scope, param: Option<&'a str>, defining: Option<&'a str>) -> Checker<'a>
    {
        Checker { scope, param, defining, dependencies: Vec::new() }
    }

    fn depend_on(&mut self, name: &str)
    {
        if !self.dependencies.iter().any(|d| d == name)
        {
            self.dependencies.push(name.to_owned());
        }
    }

    fn check(&mut self, node: &Node) -> Result<Node, ApplicationError>
    {
        match node
        {
            Node::Num(_) => Ok(node.clone()),
            Node::Sym(name, span) => {
                self.check_symbol(name, *span)?;
                Ok(node.clone())
            },
            Node::Neg(a) => Ok(Node::neg(self.check(a)?)),
            Node::Bin(op, a, b) => Ok(Node::bin(*op, self.check(a)?, self.check(b)?)),
            Node::Call(name, args, span) => self.check_call(name, args, *span),
            Node::Tuple(_, span) => Err(ApplicationError::syntax(
                "a point cannot be used inside an expression",
                span.start,
            )),
        }
    }

    fn is_value(&self, name: &str) -> bool
    {
        Some(name) == self.param
            || builtin_constant(name).is_some()
            || matches!(self.scope.get(name), Some(ScopeValue::Variable { .. }))
    }

    fn check_symbol(&mut self, name: &str, span: Span) -> Result<(), ApplicationError>
    {
        if Some(name) == self.param || builtin_constant(name).is_some()
        {
            return Ok(());
        }
        if Some(name) == self.defining
        {
            return Err(ApplicationError::semantic(format!("'{}' cannot be defined in terms of itself", name)).at(span.start));
        }
        if builtin_function(name).is_some()
        {
            return Err(ApplicationError::semantic(format!("'{}' is a function and needs an argument, as in {}(x)", name, name)).at(span.start));
        }
        match self.scope.get(name)
        {
            Some(ScopeValue::Variable { .. }) => {
                self.depend_on(name);
                Ok(())
            },
            Some(ScopeValue::Function { param, .. }) => Err(ApplicationError::semantic(
                format!("'{}' is a function; call it as {}({})", name, name, param)
            ).at(span.start)),
            None if is_reserved(name) => Err(ApplicationError::semantic(
                format!("'{}' cannot be used here", name)
            ).at(span.start)),
            None => Err(self.undefined(name, span)),
        }
    }

    fn check_call(&mut self, name: &str, args: &[Node], span: Span) -> Result<Node, ApplicationError>
    {
        if Some(name) == self.defining
        {
            return Err(ApplicationError::semantic(format!("'{}' cannot refer to itself", name)).at(span.start));
        }

        // a(x + 1) with `a` a value reads as a product
        if self.is_value(name)
        {
            return match args
            {
                [arg] => {
                    self.check_symbol(name, span)?;
                    let arg = self.check(arg)?;
                    Ok(Node::bin(BinOp::Mul, Node::Sym(name.to_owned(), span), arg))
                },
                _ => Err(ApplicationError::semantic(format!("'{}' is not a function", name)).at(span.start)),
            };
        }

        if builtin_function(name).is_some()
        {
            return match args
            {
                [arg] => Ok(Node::Call(name.to_owned(), vec![self.check(arg)?], span)),
                [] => Err(ApplicationError::semantic(format!("'{}' needs one argument", name)).at(span.start)),
                _ => Err(ApplicationError::semantic(
                    format!("'{}' takes exactly one argument, but was given {}", name, args.len())
                ).at(span.start)),
            };
        }

        match self.scope.get(name)
        {
            Some(ScopeValue::Function { param, .. }) => match args
            {
                [arg] => {
                    self.depend_on(name);
                    Ok(Node::Call(name.to_owned(), vec![self.check(arg)?], span))
                },
                [] => Err(ApplicationError::semantic(
                    format!("'{}' is not defined: {} expects one argument, as in {}({})", param, name, name, param)
                ).at(span.start)),
                _ => Err(ApplicationError::semantic(
                    format!("functions take exactly one argument, but '{}' was given {}", name, args.len())
                ).at(span.start)),
            },
            _ => Err(self.undefined(name, span)),
        }
    }

    fn undefined(&self, name: &str, span: Span) -> ApplicationError
    {
        let message = match suggest(name, self.scope)
        {
            Some(close) => format!("'{}' is not defined; did you mean '{}'?", name, close),
            None => format!("'{}' is not defined", name),
        };
        ApplicationError::unresolved(name, message, Some(span.start))
    }
}

/// Finds the known name closest to `name`, if any is close enough.
fn suggest(name: &str, scope: &Scope) -> Option<String>
{
    if name.chars().count() < 2
    {
        return None;
    }
    let builtins: Vec<&'static str> = builtin_names().collect();
    scope.names()
        .chain(builtins)
        .map(|candidate| (candidate, strsim::normalized_damerau_levenshtein(name, candidate)))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(candidate, _)| candidate.to_owned())
}

/// Classifies and validates one expression against `scope`.
///
/// Empty text is `Cleared`. `f(t) = ...` defines a function, `a = ...` a
/// variable and `(e1, e2)` a point. `y = ...` and bare expressions are
/// unnamed graphs of `x`, while `x = ...` is an unnamed graph of `y`.
///
/// # Example
/// ```
/// use geqsplot::scope::Scope;
/// use geqsplot::transform::{parse, ParsedContent};
///
/// let scope = Scope::new();
///
/// match parse("f(t) = 2t + 1", &scope).unwrap() {
///     ParsedContent::Function(def) => {
///         assert_eq!(def.name, "f");
///         assert_eq!(def.param, "t");
///         assert!(!def.anonymous);
///     },
///     other => panic!("expected a function, got {:?}", other),
/// }
///
/// assert!(parse("a = b", &scope).unwrap_err().is_unresolved());
/// ```
pub fn parse(text: &str, scope: &Scope) -> Result<ParsedContent, ApplicationError>
{
    let source = text.trim();
    if source.is_empty()
    {
        return Ok(ParsedContent::Cleared);
    }

    let equals: Vec<usize> = source.match_indices('=').map(|(i, _)| i).collect();
    match equals.as_slice()
    {
        [] => parse_bare(source, scope),
        [eq] => parse_assignment(source, *eq, scope),
        [_, second, ..] => Err(ApplicationError::syntax(
            format!("only one '=' is allowed, found another at column {}", second + 1),
            *second,
        )),
    }
}

fn parse_bare(source: &str, scope: &Scope) -> Result<ParsedContent, ApplicationError>
{
    match parse_expression(source, 0)?
    {
        Node::Tuple(items, span) => match items.as_slice()
        {
            [x, y] => parse_point(x, y, scope),
            _ => Err(ApplicationError::semantic(
                format!("a point needs exactly two coordinates, found {}", items.len())
            ).at(span.start)),
        },
        body => anonymous_function(ANONYMOUS_FN, DEFAULT_PARAM, &body, scope),
    }
}

fn parse_point(x: &Node, y: &Node, scope: &Scope) -> Result<ParsedContent, ApplicationError>
{
    let mut checker = Checker::new(scope, None, None);
    let x = checker.check(x)?;
    let y = checker.check(y)?;
    let value = (evaluate_checked(&x, scope, "the x coordinate")?, evaluate_checked(&y, scope, "the y coordinate")?);
    Ok(ParsedContent::Point(PointDef { x, y, value, dependencies: checker.dependencies }))
}

fn anonymous_function(name: &str, param: &str, body: &Node, scope: &Scope) -> Result<ParsedContent, ApplicationError>
{
    let mut checker = Checker::new(scope, Some(param), None);
    let body = checker.check(body)?;
    Ok(ParsedContent::Function(FunctionDef {
        name: name.to_owned(),
        param: param.to_owned(),
        body,
        anonymous: true,
        dependencies: checker.dependencies,
    }))
}

fn parse_assignment(source: &str, eq: usize, scope: &Scope) -> Result<ParsedContent, ApplicationError>
{
    let lhs = &source[..eq];
    let rhs = &source[eq + 1..];
    if lhs.trim().is_empty()
    {
        return Err(ApplicationError::syntax("missing a name before '='", eq));
    }
    if rhs.trim().is_empty()
    {
        return Err(ApplicationError::syntax(format!("missing an expression after '=' at column {}", eq + 1), eq));
    }

    let target = parse_expression(lhs, 0)?;
    let body = parse_expression(rhs, eq + 1)?;

    match target
    {
        // y = ... is a graph of x, x = ... a graph of y
        Node::Sym(name, _) if name == "y" => anonymous_function(&name, "x", &body, scope),
        Node::Sym(name, _) if name == "x" => anonymous_function(&name, "y", &body, scope),
        Node::Sym(name, span) => {
            if is_builtin(&name)
            {
                return Err(ApplicationError::semantic(format!("'{}' is built in and cannot be redefined", name)).at(span.start));
            }
            parse_variable(&name, &body, scope)
        },
        Node::Call(name, params, span) => {
            if is_builtin(&name)
            {
                return Err(ApplicationError::semantic(format!("'{}' is built in and cannot be redefined", name)).at(span.start));
            }
            parse_function(&name, &params, span, &body, scope)
        },
        _ => Err(ApplicationError::syntax(
            "the left side of '=' must be a name like a or a function like f(x)",
            0,
        )),
    }
}

fn parse_variable(name: &str, body: &Node, scope: &Scope) -> Result<ParsedContent, ApplicationError>
{
    if let Node::Tuple(_, span) = body
    {
        return Err(ApplicationError::semantic("points cannot be assigned to a name").at(span.start));
    }
    let mut checker = Checker::new(scope, None, Some(name));
    let body = checker.check(body)?;
    let value = evaluate_checked(&body, scope, &format!("'{}'", name))?;
    Ok(ParsedContent::Variable(VariableDef {
        name: name.to_owned(),
        body,
        value,
        dependencies: checker.dependencies,
    }))
}

fn parse_function(name: &str, params: &[Node], span: Span, body: &Node, scope: &Scope) -> Result<ParsedContent, ApplicationError>
{
    let param = match params
    {
        [Node::Sym(param, param_span)] => {
            if is_builtin(param) || param == name
            {
                return Err(ApplicationError::semantic(format!("'{}' cannot be used as a parameter", param)).at(param_span.start));
            }
            param.clone()
        },
        [] => return Err(missing_parameter(name, body, scope).at(span.start)),
        [_] => return Err(ApplicationError::syntax("function parameters must be plain names", span.start)),
        _ => return Err(ApplicationError::semantic(
            format!("functions must take exactly one argument, but '{}' declares {}", name, params.len())
        ).at(span.start)),
    };

    // y(x) = ... is still an unnamed graph
    let anonymous = is_reserved(name);
    let defining = if anonymous { None } else { Some(name) };
    let mut checker = Checker::new(scope, Some(&param), defining);
    let body = checker.check(body)?;
    let dependencies = checker.dependencies;
    Ok(ParsedContent::Function(FunctionDef {
        name: name.to_owned(),
        param,
        body,
        anonymous,
        dependencies,
    }))
}

/// Error for `f() = ...`, naming the symbol that should have been the parameter.
fn missing_parameter(name: &str, body: &Node, scope: &Scope) -> ApplicationError
{
    let free = body.free_symbols().into_iter().find(|s| {
        builtin_constant(s).is_none() && !matches!(scope.get(s), Some(ScopeValue::Variable { .. }))
    });
    match free
    {
        Some(symbol) => ApplicationError::semantic(
            format!("'{}' is not defined: add it as the parameter, as in {}({})", symbol, name, symbol)
        ),
        None => ApplicationError::semantic(format!("'{}' must take exactly one argument", name)),
    }
}

fn evaluate_checked(node: &Node, scope: &Scope, what: &str) -> Result<f64, ApplicationError>
{
    match scope.evaluate(node)
    {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Err(ApplicationError::semantic(format!("{} does not evaluate to a real number", what))),
        Err(e) => Err(ApplicationError::semantic(format!("{} cannot be evaluated: {}", what, e))),
    }
}

#[cfg(test)]
fn scope_with(defs: &[&str]) -> Scope
{
    let mut scope = Scope::new();
    for text in defs
    {
        let parsed = parse(text, &scope).unwrap();
        let name = parsed.defined_name().unwrap().to_owned();
        scope.insert(&name, parsed.to_scope_value(text).unwrap());
    }
    scope
}

#[test]
fn test_classification()
{
    let scope = Scope::new();
    assert_eq!(parse("   ", &scope).unwrap(), ParsedContent::Cleared);

    match parse("y = x^2", &scope).unwrap()
    {
        ParsedContent::Function(def) => {
            assert!(def.anonymous);
            assert_eq!(def.param, "x");
        },
        other => panic!("unexpected {:?}", other),
    }
    match parse("x = y^2", &scope).unwrap()
    {
        ParsedContent::Function(def) => {
            assert!(def.anonymous);
            assert_eq!(def.param, "y");
        },
        other => panic!("unexpected {:?}", other),
    }
    match parse("sin(x) + 1", &scope).unwrap()
    {
        ParsedContent::Function(def) => assert_eq!((def.name.as_str(), def.anonymous), ("y", true)),
        other => panic!("unexpected {:?}", other),
    }
    match parse("a = 2 * pi", &scope).unwrap()
    {
        ParsedContent::Variable(def) => assert_eq!(def.value, 2.0 * std::f64::consts::PI),
        other => panic!("unexpected {:?}", other),
    }
    match parse("(1, -2)", &scope).unwrap()
    {
        ParsedContent::Point(def) => assert_eq!(def.value, (1.0, -2.0)),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_dependencies_are_collected()
{
    let scope = scope_with(&["a = 2", "f(t) = a t"]);
    let parsed = parse("g(x) = f(x) + a", &scope).unwrap();
    assert_eq!(parsed.dependencies(), ["f".to_owned(), "a".to_owned()]);
    assert_eq!(parsed.defined_name(), Some("g"));

    // a(x + 1) multiplies
    match parse("a(x + 1)", &scope).unwrap()
    {
        ParsedContent::Function(def) => assert_eq!(def.body.to_string(), "a * (x + 1)"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_arity_errors()
{
    let scope = scope_with(&["f(t) = t + 1"]);

    let err = parse("g(x) = f(x, 2)", &scope).unwrap_err();
    assert!(err.message.contains("exactly one argument"));

    let err = parse("g(x) = f()", &scope).unwrap_err();
    assert!(err.message.starts_with("'t' is not defined"));

    let err = parse("g() = x^2", &scope).unwrap_err();
    assert!(err.message.starts_with("'x' is not defined"));

    let err = parse("g(x) = sin(x, 1)", &scope).unwrap_err();
    assert!(err.message.contains("exactly one argument"));
}

#[test]
fn test_self_reference_is_rejected()
{
    let scope = Scope::new();
    let err = parse("a = a + 1", &scope).unwrap_err();
    assert!(err.message.contains("itself"));
    assert!(!err.is_unresolved());

    let err = parse("f(x) = f(x - 1)", &scope).unwrap_err();
    assert!(err.message.contains("itself"));
}

#[test]
fn test_unresolved_names()
{
    let scope = scope_with(&["alpha = 1"]);
    let err = parse("b = 2 * alpah", &scope).unwrap_err();
    assert!(err.is_unresolved());
    assert_eq!(err.unresolved.as_deref(), Some("alpah"));
    assert!(err.message.ends_with("did you mean 'alpha'?"));
    assert_eq!(err.position, Some(8));

    let err = parse("(1, x)", &scope).unwrap_err();
    assert!(!err.is_unresolved());
}

#[test]
fn test_builtins_cannot_be_redefined()
{
    let scope = Scope::new();
    assert!(parse("pi = 3", &scope).is_err());
    assert!(parse("sin(x) = x", &scope).is_err());
    assert!(parse("a = b = 1", &scope).is_err());
}

#[test]
fn test_content_writes_back_as_text()
{
    let scope = scope_with(&["a = 2", "f(t) = a t"]);
    assert_eq!(parse("g(u) = a u", &scope).unwrap().to_string(), "g(u) = a * u");
    assert_eq!(parse("x^2", &scope).unwrap().to_string(), "y = x^2");
    assert_eq!(parse("", &scope).unwrap().to_string(), "");

    for text in ["h(u) = f(u + 1)^2 - a", "y = -x / 3", "x = sin(y)", "(a, -1)", "b = 2a + 1"]
    {
        let parsed = parse(text, &scope).unwrap();
        let again = parse(&parsed.to_string(), &scope).unwrap();
        assert_eq!(again.to_string(), parsed.to_string());
        assert_eq!(again.dependencies(), parsed.dependencies());
    }
}
