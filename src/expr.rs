use std::fmt;

use crate::context::builtin_function;
use crate::errors::DerivativeError;

/// Location of a token in the trimmed source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Span
{
    pub start: usize,
    pub len: usize,
}

impl Span
{
    pub fn new(start: usize, len: usize) -> Span
    {
        Span { start, len }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp
{
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinOp
{
    pub fn symbol(self) -> char
    {
        match self
        {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
            BinOp::Pow => '^',
        }
    }

    pub fn precedence(self) -> i32
    {
        match self
        {
            BinOp::Pow => 4,
            BinOp::Mul | BinOp::Div => 3,
            BinOp::Add | BinOp::Sub => 2,
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64
    {
        match self
        {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Pow => a.powf(b),
        }
    }
}

/// Syntax tree of a single expression.
///
/// Symbols and calls keep the span of their name so that validation errors
/// can point back into the source text.
#[derive(Clone, Debug, PartialEq)]
pub enum Node
{
    Num(f64),
    Sym(String, Span),
    Neg(Box<Node>),
    Bin(BinOp, Box<Node>, Box<Node>),
    Call(String, Vec<Node>, Span),
    Tuple(Vec<Node>, Span),
}

/// Precedence used when printing a unary minus.
const NEG_PRECEDENCE: i32 = 3;

impl Node
{
    pub fn sym(name: &str) -> Node
    {
        Node::Sym(name.to_owned(), Span::default())
    }

    pub fn call(name: &str, arg: Node) -> Node
    {
        Node::Call(name.to_owned(), vec![arg], Span::default())
    }

    pub fn bin(op: BinOp, a: Node, b: Node) -> Node
    {
        Node::Bin(op, Box::new(a), Box::new(b))
    }

    pub fn neg(a: Node) -> Node
    {
        Node::Neg(Box::new(a))
    }

    /// Whether `name` appears anywhere in the tree, either as a symbol or a callee.
    pub fn contains(&self, name: &str) -> bool
    {
        match self
        {
            Node::Num(_) => false,
            Node::Sym(s, _) => s == name,
            Node::Neg(a) => a.contains(name),
            Node::Bin(_, a, b) => a.contains(name) || b.contains(name),
            Node::Call(f, args, _) => f == name || args.iter().any(|a| a.contains(name)),
            Node::Tuple(items, _) => items.iter().any(|a| a.contains(name)),
        }
    }

    /// Symbols referenced by the tree, in first-occurrence order.
    pub fn free_symbols(&self) -> Vec<String>
    {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut Vec<String>)
    {
        match self
        {
            Node::Num(_) => {},
            Node::Sym(s, _) => {
                if !out.contains(s)
                {
                    out.push(s.clone());
                }
            },
            Node::Neg(a) => a.collect_symbols(out),
            Node::Bin(_, a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            },
            Node::Call(_, args, _) | Node::Tuple(args, _) => {
                for a in args
                {
                    a.collect_symbols(out);
                }
            },
        }
    }

    /// Replaces every occurrence of the symbol `name` with `value`.
    pub fn substitute(&self, name: &str, value: &Node) -> Node
    {
        match self
        {
            Node::Sym(s, _) if s == name => value.clone(),
            Node::Num(_) | Node::Sym(_, _) => self.clone(),
            Node::Neg(a) => Node::neg(a.substitute(name, value)),
            Node::Bin(op, a, b) => Node::bin(*op, a.substitute(name, value), b.substitute(name, value)),
            Node::Call(f, args, span) => Node::Call(
                f.clone(),
                args.iter().map(|a| a.substitute(name, value)).collect(),
                *span,
            ),
            Node::Tuple(items, span) => Node::Tuple(
                items.iter().map(|a| a.substitute(name, value)).collect(),
                *span,
            ),
        }
    }

    pub fn as_num(&self) -> Option<f64>
    {
        match self
        {
            Node::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Symbolic derivative with respect to `var`.
    ///
    /// The tree is expected to be resolved already: any symbol other than
    /// `var` is treated as a constant.
    pub fn derivative(&self, var: &str) -> Result<Node, DerivativeError>
    {
        if let Node::Tuple(_, _) = self
        {
            return Err(DerivativeError::PointLiteral);
        }
        if !self.contains(var)
        {
            return Ok(Node::Num(0.0));
        }

        let d = match self
        {
            Node::Num(_) => Node::Num(0.0),
            Node::Sym(s, _) => Node::Num(if s == var { 1.0 } else { 0.0 }),
            Node::Neg(a) => Node::neg(a.derivative(var)?),
            Node::Bin(op, a, b) => {
                let (a, b) = (a.as_ref(), b.as_ref());
                match op
                {
                    BinOp::Add => Node::bin(BinOp::Add, a.derivative(var)?, b.derivative(var)?),
                    BinOp::Sub => Node::bin(BinOp::Sub, a.derivative(var)?, b.derivative(var)?),
                    BinOp::Mul => Node::bin(
                        BinOp::Add,
                        Node::bin(BinOp::Mul, a.derivative(var)?, b.clone()),
                        Node::bin(BinOp::Mul, a.clone(), b.derivative(var)?),
                    ),
                    BinOp::Div => Node::bin(
                        BinOp::Div,
                        Node::bin(
                            BinOp::Sub,
                            Node::bin(BinOp::Mul, a.derivative(var)?, b.clone()),
                            Node::bin(BinOp::Mul, a.clone(), b.derivative(var)?),
                        ),
                        Node::bin(BinOp::Pow, b.clone(), Node::Num(2.0)),
                    ),
                    BinOp::Pow => power_rule(a, b, var)?,
                }
            },
            Node::Call(f, args, _) => {
                // arity was checked by the transformer
                let u = match args.as_slice()
                {
                    [u] => u,
                    _ => return Err(DerivativeError::UnknownFunction),
                };
                Node::bin(BinOp::Mul, outer_derivative(f, u)?, u.derivative(var)?)
            },
            Node::Tuple(_, _) => return Err(DerivativeError::PointLiteral),
        };
        Ok(d.simplify())
    }

    /// Folds constants and removes identity operations.
    pub fn simplify(&self) -> Node
    {
        match self
        {
            Node::Num(_) | Node::Sym(_, _) => self.clone(),
            Node::Neg(a) => match a.simplify()
            {
                Node::Num(n) => Node::Num(-n),
                Node::Neg(inner) => *inner,
                other => Node::neg(other),
            },
            Node::Bin(op, a, b) => simplify_bin(*op, a.simplify(), b.simplify()),
            Node::Call(f, args, span) => {
                let args: Vec<Node> = args.iter().map(Node::simplify).collect();
                if let ([Node::Num(n)], Some(func)) = (args.as_slice(), builtin_function(f))
                {
                    let folded = func(*n);
                    if folded.is_finite()
                    {
                        return Node::Num(folded);
                    }
                }
                Node::Call(f.clone(), args, *span)
            },
            Node::Tuple(items, span) => Node::Tuple(items.iter().map(Node::simplify).collect(), *span),
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter, parent: i32) -> fmt::Result
    {
        match self
        {
            Node::Num(n) => {
                if *n < 0.0 && parent > 0
                {
                    write!(f, "({})", n)
                }
                else
                {
                    write!(f, "{}", n)
                }
            },
            Node::Sym(s, _) => write!(f, "{}", s),
            Node::Neg(a) => {
                if parent > NEG_PRECEDENCE
                {
                    write!(f, "(")?;
                }
                write!(f, "-")?;
                a.fmt_prec(f, NEG_PRECEDENCE + 1)?;
                if parent > NEG_PRECEDENCE
                {
                    write!(f, ")")?;
                }
                Ok(())
            },
            Node::Bin(op, a, b) => {
                let prec = op.precedence();
                let paren = prec < parent;
                if paren
                {
                    write!(f, "(")?;
                }
                // `^` is right associative, the others are left associative
                let (lp, rp) = match op
                {
                    BinOp::Pow => (prec + 1, prec),
                    _ => (prec, prec + 1),
                };
                a.fmt_prec(f, lp)?;
                match op
                {
                    BinOp::Pow => write!(f, "^")?,
                    other => write!(f, " {} ", other.symbol())?,
                }
                b.fmt_prec(f, rp)?;
                if paren
                {
                    write!(f, ")")?;
                }
                Ok(())
            },
            Node::Call(name, args, _) => {
                write!(f, "{}(", name)?;
                fmt_list(f, args)?;
                write!(f, ")")
            },
            Node::Tuple(items, _) => {
                write!(f, "(")?;
                fmt_list(f, items)?;
                write!(f, ")")
            },
        }
    }
}

fn fmt_list(f: &mut fmt::Formatter, items: &[Node]) -> fmt::Result
{
    for (i, a) in items.iter().enumerate()
    {
        if i > 0
        {
            write!(f, ", ")?;
        }
        a.fmt_prec(f, 0)?;
    }
    Ok(())
}

impl fmt::Display for Node
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        self.fmt_prec(f, 0)
    }
}

fn power_rule(a: &Node, b: &Node, var: &str) -> Result<Node, DerivativeError>
{
    if !b.contains(var)
    {
        // d/dx u^c = c * u^(c - 1) * u'
        let exponent = Node::bin(BinOp::Sub, b.clone(), Node::Num(1.0));
        return Ok(Node::bin(
            BinOp::Mul,
            Node::bin(BinOp::Mul, b.clone(), Node::bin(BinOp::Pow, a.clone(), exponent)),
            a.derivative(var)?,
        ));
    }
    if !a.contains(var)
    {
        // d/dx c^v = c^v * ln(c) * v'
        return Ok(Node::bin(
            BinOp::Mul,
            Node::bin(BinOp::Mul, Node::bin(BinOp::Pow, a.clone(), b.clone()), Node::call("ln", a.clone())),
            b.derivative(var)?,
        ));
    }
    // d/dx u^v = u^v * (v' ln(u) + v u' / u)
    Ok(Node::bin(
        BinOp::Mul,
        Node::bin(BinOp::Pow, a.clone(), b.clone()),
        Node::bin(
            BinOp::Add,
            Node::bin(BinOp::Mul, b.derivative(var)?, Node::call("ln", a.clone())),
            Node::bin(
                BinOp::Div,
                Node::bin(BinOp::Mul, b.clone(), a.derivative(var)?),
                a.clone(),
            ),
        ),
    ))
}

/// Derivative of a built-in evaluated at `u`, without the chain-rule factor.
fn outer_derivative(name: &str, u: &Node) -> Result<Node, DerivativeError>
{
    let u = u.clone();
    let square = |n: Node| Node::bin(BinOp::Pow, n, Node::Num(2.0));
    let d = match name
    {
        "sin" => Node::call("cos", u),
        "cos" => Node::neg(Node::call("sin", u)),
        "tan" => Node::bin(BinOp::Div, Node::Num(1.0), square(Node::call("cos", u))),
        "asin" => Node::bin(
            BinOp::Div,
            Node::Num(1.0),
            Node::call("sqrt", Node::bin(BinOp::Sub, Node::Num(1.0), square(u))),
        ),
        "acos" => Node::neg(Node::bin(
            BinOp::Div,
            Node::Num(1.0),
            Node::call("sqrt", Node::bin(BinOp::Sub, Node::Num(1.0), square(u))),
        )),
        "atan" => Node::bin(
            BinOp::Div,
            Node::Num(1.0),
            Node::bin(BinOp::Add, Node::Num(1.0), square(u)),
        ),
        "sinh" => Node::call("cosh", u),
        "cosh" => Node::call("sinh", u),
        "tanh" => Node::bin(BinOp::Div, Node::Num(1.0), square(Node::call("cosh", u))),
        "sqrt" => Node::bin(
            BinOp::Div,
            Node::Num(1.0),
            Node::bin(BinOp::Mul, Node::Num(2.0), Node::call("sqrt", u)),
        ),
        "ln" => Node::bin(BinOp::Div, Node::Num(1.0), u),
        "log" => Node::bin(
            BinOp::Div,
            Node::Num(1.0),
            Node::bin(BinOp::Mul, u, Node::Num(std::f64::consts::LN_10)),
        ),
        "exp" => Node::call("exp", u),
        "abs" | "floor" | "ceil" | "round" | "sign" => return Err(DerivativeError::NotDifferentiable),
        _ => return Err(DerivativeError::UnknownFunction),
    };
    Ok(d)
}

fn simplify_bin(op: BinOp, a: Node, b: Node) -> Node
{
    match (op, a.as_num(), b.as_num())
    {
        // leave x/0 alone so that evaluation reports it
        (BinOp::Div, _, Some(d)) if d == 0.0 => Node::bin(op, a, b),
        (_, Some(x), Some(y)) => {
            let folded = op.apply(x, y);
            if folded.is_finite()
            {
                Node::Num(folded)
            }
            else
            {
                Node::bin(op, a, b)
            }
        },
        (BinOp::Add, Some(z), _) if z == 0.0 => b,
        (BinOp::Add | BinOp::Sub, _, Some(z)) if z == 0.0 => a,
        (BinOp::Sub, Some(z), _) if z == 0.0 => Node::neg(b).simplify(),
        (BinOp::Mul, Some(z), _) | (BinOp::Mul, _, Some(z)) if z == 0.0 => Node::Num(0.0),
        (BinOp::Mul, Some(o), _) if o == 1.0 => b,
        // keep numeric factors in front so that chained products fold
        (BinOp::Mul, None, Some(_)) => simplify_bin(BinOp::Mul, b, a),
        (BinOp::Mul, Some(x), None) => match b
        {
            Node::Bin(BinOp::Mul, inner, rest) if inner.as_num().is_some() => {
                let y = inner.as_num().unwrap_or(1.0);
                simplify_bin(BinOp::Mul, Node::Num(x * y), *rest)
            },
            other => Node::bin(BinOp::Mul, Node::Num(x), other),
        },
        (BinOp::Mul | BinOp::Div, _, Some(o)) if o == 1.0 => a,
        (BinOp::Div, Some(z), _) if z == 0.0 => Node::Num(0.0),
        (BinOp::Pow, _, Some(o)) if o == 1.0 => a,
        (BinOp::Pow, _, Some(z)) if z == 0.0 => Node::Num(1.0),
        _ => Node::bin(op, a, b),
    }
}

#[test]
fn test_derivative_of_polynomial()
{
    // 3x^2 + 2x
    let f = Node::bin(
        BinOp::Add,
        Node::bin(BinOp::Mul, Node::Num(3.0), Node::bin(BinOp::Pow, Node::sym("x"), Node::Num(2.0))),
        Node::bin(BinOp::Mul, Node::Num(2.0), Node::sym("x")),
    );
    let df = f.derivative("x").unwrap();
    assert_eq!(df.to_string(), "6 * x + 2");

    let ddf = df.derivative("x").unwrap();
    assert_eq!(ddf, Node::Num(6.0));
}

#[test]
fn test_derivative_rejects_abs()
{
    let f = Node::call("abs", Node::sym("x"));
    assert_eq!(f.derivative("x"), Err(DerivativeError::NotDifferentiable));

    // abs of a constant is fine
    let g = Node::bin(BinOp::Add, Node::sym("x"), Node::call("abs", Node::Num(-2.0)));
    assert_eq!(g.derivative("x").unwrap(), Node::Num(1.0));
}

#[test]
fn test_display_keeps_needed_parens()
{
    let f = Node::bin(
        BinOp::Mul,
        Node::bin(BinOp::Add, Node::sym("x"), Node::Num(1.0)),
        Node::neg(Node::sym("x")),
    );
    assert_eq!(f.to_string(), "(x + 1) * (-x)");

    let g = Node::bin(BinOp::Pow, Node::sym("x"), Node::bin(BinOp::Pow, Node::Num(2.0), Node::Num(3.0)));
    assert_eq!(g.to_string(), "x^2^3");
}

#[test]
fn test_free_symbols_in_order()
{
    let f = Node::bin(
        BinOp::Add,
        Node::call("sin", Node::sym("b")),
        Node::bin(BinOp::Mul, Node::sym("a"), Node::sym("b")),
    );
    assert_eq!(f.free_symbols(), vec!["b".to_owned(), "a".to_owned()]);
}
