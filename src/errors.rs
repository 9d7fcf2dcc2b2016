use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// More concise syntax for implementing `Error` and `Display` for both structs and enums
macro_rules! impl_err {
    ($s:ty, $e:expr) => {
        impl Error for $s {}
        impl Display for $s {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, $e)
            }
        }
    };
    ($s:ty, $($p:path, $e:expr),*) => {
        impl Error for $s {}
        impl Display for $s {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                match self {
                    $($p => write!(f, $e),)*
                }
            }
        }
    };
}

/// Errors raised while evaluating a compiled postfix program.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShuntingYardError {
    UnknownToken,
    ExpectedArg,
    DivisionByZero,
    LeftoverToken,
    NoTokens,
}
impl_err! {
    ShuntingYardError,
    ShuntingYardError::UnknownToken, "found a symbol that was not resolved before compilation",
    ShuntingYardError::ExpectedArg, "expected to find an operand, but none was present on the stack",
    ShuntingYardError::DivisionByZero, "tried to divide by zero during postfix evaluation",
    ShuntingYardError::LeftoverToken, "found a token when none were expected",
    ShuntingYardError::NoTokens, "expected to find one value in postfix evaluation stack but found none"
}

/// Errors raised while resolving scope references before compilation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResolveError {
    UnknownSymbol,
    NotAFunction,
    InliningTooDeep,
}
impl_err! {
    ResolveError,
    ResolveError::UnknownSymbol, "found a symbol that is neither in scope nor a built-in",
    ResolveError::NotAFunction, "tried to call a symbol that is not a function",
    ResolveError::InliningTooDeep, "user function references nest too deeply to inline"
}

/// Reasons symbolic differentiation gives up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DerivativeError {
    NotDifferentiable,
    UnknownFunction,
    PointLiteral,
}
impl_err! {
    DerivativeError,
    DerivativeError::NotDifferentiable, "expression contains a function that is not smooth",
    DerivativeError::UnknownFunction, "expression calls a function with no known derivative",
    DerivativeError::PointLiteral, "point literals cannot be differentiated"
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RootFindingError {
    NegativeMargin,
    ReachedIterationLimit,
    NoSignChange,
    FlatDerivative,
    NonFiniteResult,
}
impl_err! {
    RootFindingError,
    RootFindingError::NegativeMargin, "given margin value must be greater than 0",
    RootFindingError::ReachedIterationLimit, "reached the maximum number of iterations without finding a solution",
    RootFindingError::NoSignChange, "the bracketing interval does not contain a sign change",
    RootFindingError::FlatDerivative, "the derivative vanished during newton iteration",
    RootFindingError::NonFiniteResult, "the iteration produced a non-finite value"
}

/// Category of an error reported back to the expression editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// The text could not be read as an expression.
    SyntaxError,
    /// The text is well formed but cannot be given a meaning in the current scope.
    SemanticError,
}

impl Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorType::SyntaxError => write!(f, "syntax error"),
            ErrorType::SemanticError => write!(f, "semantic error"),
        }
    }
}

/// A per-expression error meant to be shown next to the expression that caused it.
///
/// `position` is a byte offset into the trimmed source text, when the error
/// can be tied to a token. `unresolved` names the missing symbol for errors
/// that may disappear once another expression defines it.
#[derive(Clone, Debug, PartialEq)]
pub struct ApplicationError {
    pub typ: ErrorType,
    pub message: String,
    pub position: Option<usize>,
    pub unresolved: Option<String>,
}

impl ApplicationError {
    pub fn syntax(message: impl Into<String>, position: usize) -> ApplicationError
    {
        ApplicationError {
            typ: ErrorType::SyntaxError,
            message: message.into(),
            position: Some(position),
            unresolved: None,
        }
    }

    pub fn semantic(message: impl Into<String>) -> ApplicationError
    {
        ApplicationError {
            typ: ErrorType::SemanticError,
            message: message.into(),
            position: None,
            unresolved: None,
        }
    }

    /// An error caused by `name` not being defined (yet).
    pub fn unresolved(name: &str, message: impl Into<String>, position: Option<usize>) -> ApplicationError
    {
        ApplicationError {
            typ: ErrorType::SemanticError,
            message: message.into(),
            position,
            unresolved: Some(name.to_owned()),
        }
    }

    pub fn at(mut self, position: usize) -> ApplicationError
    {
        self.position = Some(position);
        self
    }

    /// Whether defining some other symbol could make this error go away.
    pub fn is_unresolved(&self) -> bool
    {
        self.unresolved.is_some()
    }
}

impl Error for ApplicationError {}
impl Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.typ, self.message)
    }
}

#[test]
fn test_application_error_display()
{
    let err = ApplicationError::syntax("missing operand after '+' at position 2", 2);
    assert_eq!(err.to_string(), "syntax error: missing operand after '+' at position 2");
    assert!(!err.is_unresolved());

    let err = ApplicationError::unresolved("b", "'b' is not defined", Some(4));
    assert_eq!(err.typ, ErrorType::SemanticError);
    assert!(err.is_unresolved());
}
