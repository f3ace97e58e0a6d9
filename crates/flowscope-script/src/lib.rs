//! Expression and unit compilation for workflow definitions.
//!
//! Two compilation modes share one front end:
//!
//! - **Deferred**: [`ScriptDeferredCompiler`] checks a single expression
//!   against the locations visible at its site and returns a
//!   [`CompiledExpression`] the host evaluates on demand through a
//!   [`LocationLookup`].
//! - **Ahead-of-time**: [`ScriptAotCompiler`] compiles whole `unit` sources
//!   to a versioned image, loads it into the process-wide registry, and
//!   extracts a [`LoadedType`] whose members can be invoked directly.
//!
//! Both dialects ([`Dialect::CLike`], [`Dialect::BasicLike`]) parse to the
//! same AST; compile problems come back as ordered [`Diagnostic`] lists, and
//! a failed compile is a normal result, not an error.

mod analyze;
mod ast;
mod emit;
mod parser;

pub mod aot;
pub mod diagnostics;
pub mod eval;
pub mod frontend;
pub mod image;
pub mod jit;
pub mod resolver;

pub use aot::{AheadOfTimeCompiler, ClassToCompile, ScriptAotCompiler};
pub use diagnostics::{codes, has_errors, CompileResult, Diagnostic};
pub use eval::{EvalError, LocationLookup, Value};
pub use frontend::{
    AnalyzeOptions, AnalyzedExpression, BasicLikeFrontEnd, CLikeFrontEnd, Dialect, ScriptFrontEnd,
};
pub use image::{load_image, LoadError, LoadedImage, LoadedType};
pub use jit::{
    CompiledExpression, DeferredCompiler, ExpressionCompileResult, ExpressionToCompile,
    ScriptDeferredCompiler,
};
pub use resolver::{
    builtin_metadata, BuiltinResolver, FnSig, FunctionTable, UnitMetadata, UnitResolver,
    BUILTINS_UNIT,
};
