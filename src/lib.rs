/// Contains the canvas that owns the viewport, its commands and the pointer routing between them.
pub mod canvas;
/// Contains the drawable commands (grid, axis, functions, points) and their interaction states.
pub mod command;
/// Contains plotting tunables and their JSON loading.
pub mod config;
/// Contains the built-in functions and constants, and the names reserved for plot variables.
pub mod context;
/// Contains the expression list and the reactive update of its scope.
pub mod document;
/// Contains error types for different errors that this crate may throw.
pub mod errors;
/// Contains pointer and zoom events and the bus commands subscribe to.
pub mod events;
/// Contains the syntax tree, symbolic differentiation and simplification.
pub mod expr;
/// Contains intercept, critical point and inflection point detection over a sampled domain.
pub mod features;
/// Contains the dependency graph between named definitions.
pub mod graph;
/// Contains compiled evaluators for a function and its first two derivatives.
pub mod model;
/// Contains root-finding algorithms used to refine sign changes.
pub mod newton;
/// Contains backend-agnostic draw instructions and coordinate formatting.
pub mod render;
/// Contains the zoom table and the mapping between screen pixels and graph units.
pub mod scale;
/// Contains the symbol table of a document and the inlining of its definitions.
pub mod scope;
/// Contains the narrow surface a host application drives.
pub mod session;
/// Contains per-item display settings and the `Bounded` number type.
pub mod settings;
/// Contains a shunting yard reader for expressions and an RPN evaluator for compiled functions.
pub mod shunting;
/// Contains the classification of raw expression text into functions, variables and points.
pub mod transform;

pub use document::{Document, ItemId};
pub use session::GraphSession;
pub use transform::{parse, ParsedContent};
