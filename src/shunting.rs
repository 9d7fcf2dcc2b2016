use lazy_static::lazy_static;
use regex::Regex;

use crate::context::{builtin_constant, builtin_function, MathFn};
use crate::errors::{ApplicationError, ShuntingYardError};
use crate::expr::{BinOp, Node, Span};

/// A lexical unit of expression text.
#[derive(Clone, Debug, PartialEq)]
pub enum Lexeme
{
    Num(f64),
    Ident(String),
    Op(BinOp),
    Comma,
    Open,
    Close,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tok
{
    pub lexeme: Lexeme,
    pub span: Span,
}

impl Tok
{
    fn text(&self) -> String
    {
        match &self.lexeme
        {
            Lexeme::Num(n) => n.to_string(),
            Lexeme::Ident(s) => s.clone(),
            Lexeme::Op(op) => op.symbol().to_string(),
            Lexeme::Comma => ",".to_owned(),
            Lexeme::Open => "(".to_owned(),
            Lexeme::Close => ")".to_owned(),
        }
    }
}

/// Human-readable location used in error messages.
fn column(pos: usize) -> String
{
    format!("column {}", pos + 1)
}

/// Splits `text` into tokens. `offset` is added to every span so that
/// positions refer to the full trimmed source even when `text` is only one
/// side of an assignment.
pub fn tokenize(text: &str, offset: usize) -> Result<Vec<Tok>, ApplicationError>
{
    lazy_static!
    {
        static ref RE: Regex = Regex::new(
            r"(?P<num>[0-9]+\.?[0-9]*|\.[0-9]+)|(?P<ident>[A-Za-z][A-Za-z0-9_]*)|(?P<punct>[-+*/^(),])|(?P<ws>\s+)"
        ).unwrap();
    }

    let invalid = |at: usize| {
        let c = text[at..].chars().next().unwrap_or(' ');
        ApplicationError::syntax(
            format!("unexpected character '{}' at {}", c, column(offset + at)),
            offset + at,
        )
    };

    let mut toks = Vec::new();
    let mut cursor = 0;
    for caps in RE.captures_iter(text)
    {
        let whole = match caps.get(0)
        {
            Some(m) => m,
            None => continue,
        };
        if whole.start() > cursor
        {
            return Err(invalid(cursor));
        }
        cursor = whole.end();

        let span = Span::new(offset + whole.start(), whole.len());
        let lexeme = if let Some(num) = caps.name("num")
        {
            match num.as_str().parse::<f64>()
            {
                Ok(n) => Lexeme::Num(n),
                Err(_) => return Err(ApplicationError::syntax(
                    format!("could not read number '{}' at {}", num.as_str(), column(span.start)),
                    span.start,
                )),
            }
        }
        else if let Some(ident) = caps.name("ident")
        {
            Lexeme::Ident(ident.as_str().to_owned())
        }
        else if let Some(punct) = caps.name("punct")
        {
            match punct.as_str()
            {
                "+" => Lexeme::Op(BinOp::Add),
                "-" => Lexeme::Op(BinOp::Sub),
                "*" => Lexeme::Op(BinOp::Mul),
                "/" => Lexeme::Op(BinOp::Div),
                "^" => Lexeme::Op(BinOp::Pow),
                "," => Lexeme::Comma,
                "(" => Lexeme::Open,
                _ => Lexeme::Close,
            }
        }
        else
        {
            continue; // whitespace
        };
        toks.push(Tok { lexeme, span });
    }
    if cursor < text.len()
    {
        return Err(invalid(cursor));
    }
    Ok(toks)
}

/// Operator stack entries of the shunting yard.
enum Pending
{
    Op(BinOp, Span),
    Neg(Span),
    Open
    {
        span: Span,
        callee: Option<(String, Span)>,
        base: usize,
    },
}

/// Binding strength on the operator stack. Unary minus sits between `*` and `^`
/// so that `-x^2` reads as `-(x^2)` and `2^-x` as `2^(-x)`.
fn binding(p: &Pending) -> i32
{
    match p
    {
        Pending::Op(op, _) => op.precedence() * 2,
        Pending::Neg(_) => 7,
        Pending::Open { .. } => 0,
    }
}

fn prec_check(o1: BinOp, o2: &Pending) -> bool
{
    let (b1, b2) = (o1.precedence() * 2, binding(o2));
    match o2
    {
        Pending::Open { .. } => false,
        _ => b2 > b1 || (b2 == b1 && o1 != BinOp::Pow),
    }
}

fn floor_of(stack: &[Pending]) -> usize
{
    stack.iter()
        .rev()
        .find_map(|p| match p
        {
            Pending::Open { base, .. } => Some(*base),
            _ => None,
        })
        .unwrap_or(0)
}

fn apply(pending: Pending, output: &mut Vec<Node>, floor: usize) -> Result<(), ApplicationError>
{
    match pending
    {
        Pending::Op(op, span) => {
            if output.len() < floor + 2
            {
                return Err(ApplicationError::syntax(
                    format!("missing operand for '{}' at {}", op.symbol(), column(span.start)),
                    span.start,
                ));
            }
            let b = output.pop();
            let a = output.pop();
            if let (Some(a), Some(b)) = (a, b)
            {
                output.push(Node::bin(op, a, b));
            }
        },
        Pending::Neg(span) => {
            match output.pop()
            {
                Some(a) if output.len() >= floor => output.push(Node::neg(a)),
                _ => return Err(ApplicationError::syntax(
                    format!("missing operand after '-' at {}", column(span.start)),
                    span.start,
                )),
            }
        },
        Pending::Open { span, .. } => {
            return Err(ApplicationError::syntax(
                format!("unclosed parenthesis at {}", column(span.start)),
                span.start,
            ));
        },
    }
    Ok(())
}

fn push_binary(op: BinOp, span: Span, stack: &mut Vec<Pending>, output: &mut Vec<Node>) -> Result<(), ApplicationError>
{
    while let Some(o2) = stack.pop()
    {
        if prec_check(op, &o2)
        {
            let floor = floor_of(stack);
            apply(o2, output, floor)?;
        }
        else
        {
            stack.push(o2); // put the prec-check-denied element back on the stack
            break;
        }
    }
    stack.push(Pending::Op(op, span));
    Ok(())
}

/// Reads one side of an expression into a syntax tree with a shunting yard.
///
/// See shunting yard implementation details at:
/// https://en.wikipedia.org/wiki/Shunting_yard_algorithm
///
/// Beyond the textbook algorithm this handles unary minus, function calls,
/// parenthesised comma lists (which become `Node::Tuple`) and implicit
/// multiplication such as `2x` or `(x + 1)(x - 1)`.
///
/// # Example
/// ```
/// use geqsplot::shunting::parse_expression;
///
/// let node = parse_expression("2x^2 - sin(x)", 0).unwrap();
/// assert_eq!(node.to_string(), "2 * x^2 - sin(x)");
/// ```
pub fn parse_expression(text: &str, offset: usize) -> Result<Node, ApplicationError>
{
    let toks = tokenize(text, offset)?;
    if toks.is_empty()
    {
        return Err(ApplicationError::syntax(
            format!("expected an expression at {}", column(offset)),
            offset,
        ));
    }

    let mut output: Vec<Node> = Vec::new();
    let mut stack: Vec<Pending> = Vec::new();
    let mut expect_operand = true; // Indicator for whether the next token must start a value
    let mut prev: Option<&Tok> = None;

    let mut i = 0;
    while i < toks.len()
    {
        let tok = &toks[i];
        match &tok.lexeme
        {
            Lexeme::Num(n) => {
                if !expect_operand
                {
                    push_binary(BinOp::Mul, tok.span, &mut stack, &mut output)?;
                }
                output.push(Node::Num(*n));
                expect_operand = false;
            },

            Lexeme::Ident(name) => {
                if !expect_operand
                {
                    push_binary(BinOp::Mul, tok.span, &mut stack, &mut output)?;
                }
                match toks.get(i + 1)
                {
                    Some(next) if next.lexeme == Lexeme::Open => {
                        stack.push(Pending::Open {
                            span: next.span,
                            callee: Some((name.clone(), tok.span)),
                            base: output.len(),
                        });
                        i += 1;
                        prev = Some(next);
                        expect_operand = true;
                        i += 1;
                        continue;
                    },
                    _ => {
                        output.push(Node::Sym(name.clone(), tok.span));
                        expect_operand = false;
                    },
                }
            },

            Lexeme::Open => {
                if !expect_operand
                {
                    push_binary(BinOp::Mul, tok.span, &mut stack, &mut output)?;
                }
                stack.push(Pending::Open { span: tok.span, callee: None, base: output.len() });
                expect_operand = true;
            },

            Lexeme::Comma => {
                if expect_operand
                {
                    return Err(ApplicationError::syntax(
                        format!("missing operand before ',' at {}", column(tok.span.start)),
                        tok.span.start,
                    ));
                }
                loop
                {
                    match stack.pop()
                    {
                        Some(open @ Pending::Open { .. }) => {
                            stack.push(open);
                            break;
                        },
                        Some(op) => {
                            let floor = floor_of(&stack);
                            apply(op, &mut output, floor)?;
                        },
                        None => return Err(ApplicationError::syntax(
                            format!("unexpected ',' at {}", column(tok.span.start)),
                            tok.span.start,
                        )),
                    }
                }
                expect_operand = true;
            },

            Lexeme::Close => {
                let after_open = matches!(prev.map(|p| &p.lexeme), Some(Lexeme::Open));
                if expect_operand && !after_open
                {
                    return Err(ApplicationError::syntax(
                        format!("missing operand before ')' at {}", column(tok.span.start)),
                        tok.span.start,
                    ));
                }
                let (open_span, callee, base) = loop
                {
                    match stack.pop()
                    {
                        Some(Pending::Open { span, callee, base }) => break (span, callee, base),
                        Some(op) => {
                            let floor = floor_of(&stack);
                            apply(op, &mut output, floor)?;
                        },
                        None => return Err(ApplicationError::syntax(
                            format!("unmatched ')' at {}", column(tok.span.start)),
                            tok.span.start,
                        )),
                    }
                };
                let args = output.split_off(base.min(output.len()));
                let node = match callee
                {
                    Some((name, name_span)) => Node::Call(name, args, name_span),
                    None => {
                        let whole = Span::new(open_span.start, tok.span.start + 1 - open_span.start);
                        match args.len()
                        {
                            0 => return Err(ApplicationError::syntax(
                                format!("empty parentheses at {}", column(open_span.start)),
                                open_span.start,
                            )),
                            1 => args.into_iter().next().unwrap_or(Node::Num(f64::NAN)),
                            _ => Node::Tuple(args, whole),
                        }
                    },
                };
                output.push(node);
                expect_operand = false;
            },

            Lexeme::Op(op) => {
                if expect_operand
                {
                    match op
                    {
                        BinOp::Sub => stack.push(Pending::Neg(tok.span)),
                        BinOp::Add => {}, // unary plus
                        _ => {
                            let message = match prev
                            {
                                Some(p) => format!(
                                    "missing operand between '{}' and '{}' at {}",
                                    p.text(), op.symbol(), column(tok.span.start)
                                ),
                                None => format!("missing operand before '{}' at {}", op.symbol(), column(tok.span.start)),
                            };
                            return Err(ApplicationError::syntax(message, tok.span.start));
                        },
                    }
                }
                else
                {
                    push_binary(*op, tok.span, &mut stack, &mut output)?;
                    expect_operand = true;
                }
            },
        }
        prev = Some(tok);
        i += 1;
    }

    if expect_operand
    {
        // toks is non-empty, so prev is set
        if let Some(last) = prev
        {
            let message = match last.lexeme
            {
                Lexeme::Open => format!("unclosed parenthesis at {}", column(last.span.start)),
                _ => format!("missing operand after '{}' at {}", last.text(), column(last.span.start)),
            };
            return Err(ApplicationError::syntax(message, last.span.start));
        }
    }

    while let Some(pending) = stack.pop()
    {
        let floor = floor_of(&stack);
        apply(pending, &mut output, floor)?;
    }

    match output.len()
    {
        1 => Ok(output.pop().unwrap_or(Node::Num(f64::NAN))),
        _ => Err(ApplicationError::syntax(
            format!("could not read expression at {}", column(offset)),
            offset,
        )),
    }
}

/// Instructions of a compiled postfix program.
#[derive(Clone, Debug)]
pub enum Token
{
    Num(f64),
    Var,
    Func(MathFn),
    Exp,
    Mul,
    Div,
    Plus,
    Minus,
    Neg,
}

/// A single-variable function compiled **once** to a postfix token stack.
#[derive(Clone, Debug)]
pub struct CompiledFn
{
    rpn: Vec<Token>,
}

impl CompiledFn
{
    pub fn eval(&self, x: f64) -> anyhow::Result<f64>
    {
        eval_rpn_expression(&self.rpn, x)
    }

    /// Evaluates at `x`, mapping every failure and non-finite result to NaN.
    pub fn sample(&self, x: f64) -> f64
    {
        match self.eval(x)
        {
            Ok(y) if y.is_finite() => y,
            _ => f64::NAN,
        }
    }
}

fn rpnify(node: &Node, param: &str, queue: &mut Vec<Token>) -> anyhow::Result<()>
{
    match node
    {
        Node::Num(n) => queue.push(Token::Num(*n)),
        Node::Sym(name, _) => {
            if name == param
            {
                queue.push(Token::Var);
            }
            else if let Some(val) = builtin_constant(name)
            {
                queue.push(Token::Num(val));
            }
            else
            {
                return Err(ShuntingYardError::UnknownToken.into());
            }
        },
        Node::Neg(a) => {
            rpnify(a, param, queue)?;
            queue.push(Token::Neg);
        },
        Node::Bin(op, a, b) => {
            rpnify(a, param, queue)?;
            rpnify(b, param, queue)?;
            queue.push(match op
            {
                BinOp::Add => Token::Plus,
                BinOp::Sub => Token::Minus,
                BinOp::Mul => Token::Mul,
                BinOp::Div => Token::Div,
                BinOp::Pow => Token::Exp,
            });
        },
        Node::Call(name, args, _) => {
            let func = builtin_function(name).ok_or(ShuntingYardError::UnknownToken)?;
            match args.as_slice()
            {
                [arg] => rpnify(arg, param, queue)?,
                _ => return Err(ShuntingYardError::ExpectedArg.into()),
            }
            queue.push(Token::Func(func));
        },
        Node::Tuple(_, _) => return Err(ShuntingYardError::LeftoverToken.into()),
    }
    Ok(())
}

/// 'Compiles' a resolved syntax tree to a function of `param`.
///
/// The tree may only reference `param`, numbers, built-in constants and
/// built-in functions; scope references must be inlined beforehand.
///
/// # Example
/// ```
/// use geqsplot::shunting::{compile_to_fn, parse_expression};
///
/// let node = parse_expression("t^2 + 4", 0).unwrap();
/// let f = compile_to_fn(&node, "t").unwrap();
///
/// assert_eq!(f.eval(2.0).unwrap(), 8.0);
/// ```
pub fn compile_to_fn(node: &Node, param: &str) -> anyhow::Result<CompiledFn>
{
    let mut rpn = Vec::new();
    rpnify(node, param, &mut rpn)?;
    Ok(CompiledFn { rpn })
}

fn eval_rpn_expression(expr: &[Token], x: f64) -> anyhow::Result<f64>
{
    let mut stack: Vec<f64> = Vec::new();

    for token in expr
    {
        match token
        {
            Token::Num(num) => stack.push(*num),

            Token::Var => stack.push(x),

            Token::Func(func) => {
                if let Some(arg) = stack.pop()
                {
                    stack.push(func(arg));
                }
                else
                {
                    return Err(ShuntingYardError::ExpectedArg.into());
                }
            },

            Token::Neg => {
                if let Some(arg) = stack.pop()
                {
                    stack.push(-arg);
                }
                else
                {
                    return Err(ShuntingYardError::ExpectedArg.into());
                }
            },

            Token::Div => {
                if let (Some(arg2), Some(arg1)) = (stack.pop(), stack.pop())
                {
                    if arg2 == 0.0
                    {
                        return Err(ShuntingYardError::DivisionByZero.into())
                    }
                    stack.push(arg1 / arg2);
                }
                else
                {
                    return Err(ShuntingYardError::ExpectedArg.into());
                }
            },

            binary => {
                if let (Some(arg2), Some(arg1)) = (stack.pop(), stack.pop())
                {
                    stack.push(match binary
                    {
                        Token::Exp => arg1.powf(arg2),
                        Token::Mul => arg1 * arg2,
                        Token::Minus => arg1 - arg2,
                        _ => arg1 + arg2,
                    });
                }
                else
                {
                    return Err(ShuntingYardError::ExpectedArg.into());
                }
            },
        }
    }

    match stack.len()
    {
        1 => Ok(stack[0]),
        0 => Err(ShuntingYardError::NoTokens.into()),
        _ => Err(ShuntingYardError::LeftoverToken.into()),
    }
}

#[test]
fn test_tokenize()
{
    let toks = tokenize("3+x1", 0).unwrap();
    let lexemes: Vec<Lexeme> = toks.into_iter().map(|t| t.lexeme).collect();
    assert_eq!(
        lexemes,
        vec![Lexeme::Num(3.0), Lexeme::Op(BinOp::Add), Lexeme::Ident("x1".to_owned())]
    );
}

#[test]
fn test_tokenize_reports_position()
{
    let err = tokenize("x + $", 4).unwrap_err();
    assert_eq!(err.position, Some(8));
    assert_eq!(err.message, "unexpected character '$' at column 9");
}

#[test]
fn test_unary_minus()
{
    assert_eq!(parse_expression("-x^2", 0).unwrap().to_string(), "-x^2");
    let node = parse_expression("2^-x", 0).unwrap();
    assert_eq!(node, Node::bin(BinOp::Pow, Node::Num(2.0), Node::neg(Node::Sym("x".to_owned(), Span::new(3, 1)))));
}

#[test]
fn test_implicit_multiplication()
{
    assert_eq!(parse_expression("2x", 0).unwrap().to_string(), "2 * x");
    assert_eq!(parse_expression("(x+1)(x-1)", 0).unwrap().to_string(), "(x + 1) * (x - 1)");
    assert_eq!(parse_expression("3 sin(x)", 0).unwrap().to_string(), "3 * sin(x)");
}

#[test]
fn test_parse_point_tuple()
{
    match parse_expression("(1, 2 + a)", 0).unwrap()
    {
        Node::Tuple(items, _) => assert_eq!(items.len(), 2),
        other => panic!("expected a tuple, found {other:?}"),
    }
}

#[test]
fn test_missing_operand_message()
{
    let err = parse_expression("1 +", 0).unwrap_err();
    assert_eq!(err.message, "missing operand after '+' at column 3");

    let err = parse_expression("1 + * 2", 0).unwrap_err();
    assert_eq!(err.message, "missing operand between '+' and '*' at column 5");
    assert_eq!(err.position, Some(4));
}

#[test]
fn test_paren_errors()
{
    assert_eq!(parse_expression("(x + 1", 0).unwrap_err().message, "unclosed parenthesis at column 1");
    assert_eq!(parse_expression("x)", 0).unwrap_err().message, "unmatched ')' at column 2");
    assert_eq!(parse_expression("2 * ()", 0).unwrap_err().message, "empty parentheses at column 5");
}

#[test]
fn test_compiled_fn_eval()
{
    let node = parse_expression("sin(-1 + 2 + 2 + 0.14) + x", 0).unwrap();
    let f = compile_to_fn(&node, "x").unwrap();
    let about_zero = f.eval(0.0).unwrap().abs();
    assert!(about_zero < 0.01);

    let g = compile_to_fn(&parse_expression("1/x", 0).unwrap(), "x").unwrap();
    assert!(g.eval(0.0).is_err());
    assert!(g.sample(0.0).is_nan());
}
