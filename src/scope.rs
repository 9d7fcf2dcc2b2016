use std::collections::{HashMap, HashSet};

use crate::context::{builtin_constant, builtin_function, is_reserved};
use crate::errors::ResolveError;
use crate::expr::Node;
use crate::graph::DependencyGraph;
use crate::shunting::compile_to_fn;

/// User functions may reference each other this many levels deep before inlining gives up.
pub const MAX_INLINE_DEPTH: usize = 64;

/// A named definition visible to other expressions.
#[derive(Clone, Debug, PartialEq)]
pub enum ScopeValue
{
    Function
    {
        formula_text: String,
        param: String,
        body: Node,
        dependencies: Vec<String>,
    },
    Variable
    {
        formula_text: String,
        value: f64,
        dependencies: Vec<String>,
    },
}

impl ScopeValue
{
    pub fn dependencies(&self) -> &[String]
    {
        match self
        {
            ScopeValue::Function { dependencies, .. } | ScopeValue::Variable { dependencies, .. } => dependencies,
        }
    }
}

/// Symbol table of one document. Reserved names are never stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scope
{
    entries: HashMap<String, ScopeValue>,
}

impl Scope
{
    pub fn new() -> Scope
    {
        Scope::default()
    }

    pub fn get(&self, name: &str) -> Option<&ScopeValue>
    {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool
    {
        self.entries.contains_key(name)
    }

    /// Stores `value` under `name`, returning whether it was stored.
    pub fn insert(&mut self, name: &str, value: ScopeValue) -> bool
    {
        if is_reserved(name)
        {
            log::debug!("refusing to store reserved name '{}' in scope", name);
            return false;
        }
        self.entries.insert(name.to_owned(), value);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<ScopeValue>
    {
        self.entries.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Value of a variable, if `name` is one.
    pub fn value_of(&self, name: &str) -> Option<f64>
    {
        match self.entries.get(name)
        {
            Some(ScopeValue::Variable { value, .. }) => Some(*value),
            _ => None,
        }
    }

    /// Rewrites `node` so that it only references `param`, numbers and built-ins.
    ///
    /// Variables become their values, built-in constants become numbers and
    /// calls to user functions are replaced with their inlined bodies.
    ///
    /// # Example
    /// ```
    /// use geqsplot::expr::{BinOp, Node};
    /// use geqsplot::scope::{Scope, ScopeValue};
    ///
    /// let mut scope = Scope::new();
    /// scope.insert("a", ScopeValue::Variable {
    ///     formula_text: "a = 3".to_owned(),
    ///     value: 3.0,
    ///     dependencies: vec![],
    /// });
    ///
    /// let node = Node::bin(BinOp::Mul, Node::sym("a"), Node::sym("x"));
    /// let inlined = scope.inline(&node, Some("x")).unwrap();
    ///
    /// assert_eq!(inlined.to_string(), "3 * x");
    /// ```
    pub fn inline(&self, node: &Node, param: Option<&str>) -> Result<Node, ResolveError>
    {
        self.inline_depth(node, param, 0)
    }

    fn inline_depth(&self, node: &Node, param: Option<&str>, depth: usize) -> Result<Node, ResolveError>
    {
        Ok(match node
        {
            Node::Num(_) => node.clone(),
            Node::Sym(name, _) => {
                if Some(name.as_str()) == param
                {
                    node.clone()
                }
                else if let Some(c) = builtin_constant(name)
                {
                    Node::Num(c)
                }
                else if let Some(v) = self.value_of(name)
                {
                    Node::Num(v)
                }
                else
                {
                    return Err(ResolveError::UnknownSymbol);
                }
            },
            Node::Neg(a) => Node::neg(self.inline_depth(a, param, depth)?),
            Node::Bin(op, a, b) => Node::bin(
                *op,
                self.inline_depth(a, param, depth)?,
                self.inline_depth(b, param, depth)?,
            ),
            Node::Call(name, args, span) => {
                let args = args.iter()
                    .map(|a| self.inline_depth(a, param, depth))
                    .collect::<Result<Vec<Node>, ResolveError>>()?;

                if builtin_function(name).is_some()
                {
                    return Ok(Node::Call(name.clone(), args, *span));
                }
                match (self.entries.get(name), args.as_slice())
                {
                    (Some(ScopeValue::Function { param: inner, body, .. }), [arg]) => {
                        if depth >= MAX_INLINE_DEPTH
                        {
                            return Err(ResolveError::InliningTooDeep);
                        }
                        self.inline_depth(body, Some(inner), depth + 1)?.substitute(inner, arg)
                    },
                    (Some(_), _) => return Err(ResolveError::NotAFunction),
                    (None, _) => return Err(ResolveError::UnknownSymbol),
                }
            },
            Node::Tuple(items, span) => Node::Tuple(
                items.iter()
                    .map(|a| self.inline_depth(a, param, depth))
                    .collect::<Result<Vec<Node>, ResolveError>>()?,
                *span,
            ),
        })
    }

    /// Evaluates an expression with no free parameter to a single number.
    pub fn evaluate(&self, node: &Node) -> anyhow::Result<f64>
    {
        let resolved = self.inline(node, None)?.simplify();
        compile_to_fn(&resolved, "")?.eval(0.0)
    }
}

/// The scope of a document together with the dependency graph between its names.
#[derive(Clone, Debug, Default)]
pub struct ScopeContext
{
    pub scope: Scope,
    pub graph: DependencyGraph,
}

impl ScopeContext
{
    pub fn new() -> ScopeContext
    {
        ScopeContext::default()
    }

    pub fn add_dependencies(&mut self, name: &str, deps: &[String])
    {
        self.graph.add_dependencies(name, deps);
    }

    pub fn remove_dependencies(&mut self, name: &str, deps: &[String])
    {
        self.graph.remove_dependencies(name, deps);
    }

    /// Whether `a` is reachable from `b` by following scope dependencies,
    /// i.e. whether making `a` depend on `b` would close a cycle.
    ///
    /// # Example
    /// ```
    /// use geqsplot::scope::{ScopeContext, ScopeValue};
    ///
    /// let mut ctx = ScopeContext::new();
    /// ctx.scope.insert("b", ScopeValue::Variable {
    ///     formula_text: "b = 2a".to_owned(),
    ///     value: 2.0,
    ///     dependencies: vec!["a".to_owned()],
    /// });
    ///
    /// assert!(ctx.is_circular_reference("a", "b"));
    /// assert!(!ctx.is_circular_reference("c", "b"));
    /// ```
    pub fn is_circular_reference(&self, a: &str, b: &str) -> bool
    {
        let mut visited = HashSet::new();
        self.reaches(a, b, &mut visited)
    }

    fn reaches<'a>(&'a self, a: &str, b: &'a str, visited: &mut HashSet<&'a str>) -> bool
    {
        if a == b
        {
            return true;
        }
        if !visited.insert(b)
        {
            return false;
        }
        match self.scope.get(b)
        {
            Some(value) => value.dependencies().iter().any(|dep| self.reaches(a, dep, visited)),
            None => false,
        }
    }

    /// Removes `name` and every transitive dependent of it from scope.
    ///
    /// Returns the removed dependents in breadth-first order (not including
    /// `name`). Edges between removed names are unwound so that redefining
    /// `name` later does not re-link the old dependents.
    pub fn cascade_remove(&mut self, name: &str) -> Vec<String>
    {
        let dependents = self.graph.reachable_from(name);
        for removed in std::iter::once(name).chain(dependents.iter().map(String::as_str))
        {
            if let Some(value) = self.scope.remove(removed)
            {
                let deps = value.dependencies().to_vec();
                self.graph.remove_dependencies(removed, &deps);
            }
        }
        // dependents that were never in scope (anonymous graphs) still hold edges
        for dependent in &dependents
        {
            self.graph.remove_dependencies(dependent, &[name.to_owned()]);
        }
        dependents
    }
}

#[cfg(test)]
fn variable(value: f64, deps: &[&str]) -> ScopeValue
{
    ScopeValue::Variable {
        formula_text: String::new(),
        value,
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
    }
}

#[test]
fn test_reserved_names_never_enter_scope()
{
    let mut scope = Scope::new();
    assert!(!scope.insert("x", variable(1.0, &[])));
    assert!(!scope.insert("y", variable(1.0, &[])));
    assert!(scope.insert("a", variable(1.0, &[])));
    assert_eq!(scope.len(), 1);
}

#[test]
fn test_inline_user_function()
{
    use crate::expr::BinOp;

    let mut scope = Scope::new();
    scope.insert("f", ScopeValue::Function {
        formula_text: "f(t) = t^2".to_owned(),
        param: "t".to_owned(),
        body: Node::bin(BinOp::Pow, Node::sym("t"), Node::Num(2.0)),
        dependencies: vec![],
    });
    scope.insert("a", variable(3.0, &[]));

    // f(x + a)
    let node = Node::call("f", Node::bin(BinOp::Add, Node::sym("x"), Node::sym("a")));
    let inlined = scope.inline(&node, Some("x")).unwrap();
    assert_eq!(inlined.to_string(), "(x + 3)^2");

    assert_eq!(scope.evaluate(&Node::call("f", Node::sym("a"))).unwrap(), 9.0);
    assert_eq!(scope.inline(&Node::sym("b"), None), Err(ResolveError::UnknownSymbol));
}

#[test]
fn test_circular_reference_through_chain()
{
    let mut ctx = ScopeContext::new();
    ctx.scope.insert("b", variable(1.0, &["a"]));
    ctx.scope.insert("c", variable(1.0, &["b"]));

    // a = c would close a -> b -> c -> a
    assert!(ctx.is_circular_reference("a", "c"));
    assert!(ctx.is_circular_reference("a", "a"));
    assert!(!ctx.is_circular_reference("d", "c"));
}

#[test]
fn test_cascade_remove()
{
    let mut ctx = ScopeContext::new();
    ctx.scope.insert("s", variable(1.0, &[]));
    ctx.scope.insert("t", variable(2.0, &["s"]));
    ctx.scope.insert("u", variable(3.0, &["t"]));
    ctx.add_dependencies("s", &[]);
    ctx.add_dependencies("t", &["s".to_owned()]);
    ctx.add_dependencies("u", &["t".to_owned()]);

    let removed = ctx.cascade_remove("s");
    assert_eq!(removed, vec!["t", "u"]);
    assert!(ctx.scope.is_empty());
    assert!(ctx.graph.is_empty());
}
