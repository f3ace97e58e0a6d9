//! Deferred expression compilation.
//!
//! A deferred compile checks one expression against the locations visible at
//! its site and produces a [`CompiledExpression`] handle. Nothing evaluates
//! at compile time; the host evaluates the handle whenever it likes, against
//! whatever [`LocationLookup`] reflects current state.

use std::fmt;
use tracing::debug;

use flowscope_core::DataType;

use crate::diagnostics::{has_errors, Diagnostic};
use crate::emit::{lower, Op};
use crate::eval::{run_ops, EvalError, LocationLookup, Value};
use crate::frontend::{front_end_for, AnalyzeOptions, Dialect, ScriptFrontEnd};
use crate::resolver::{FunctionTable, UnitResolver};

/// Everything a deferred compile needs to know about its site.
pub struct ExpressionToCompile {
    /// Source text in the compiler's dialect.
    pub expression: String,
    /// Units whose functions the expression may call.
    pub referenced_units: Vec<String>,
    /// Namespaces searched for unqualified calls, in order.
    pub imported_namespaces: Vec<String>,
    /// Resolves identifiers to the types of visible locations.
    pub variable_type_getter: Option<Box<dyn Fn(&str) -> Option<DataType> + Send + Sync>>,
    /// Required result type, if the site declares one.
    pub result_type: Option<DataType>,
}

impl ExpressionToCompile {
    pub fn new(expression: impl Into<String>) -> Self {
        ExpressionToCompile {
            expression: expression.into(),
            referenced_units: Vec::new(),
            imported_namespaces: Vec::new(),
            variable_type_getter: None,
            result_type: None,
        }
    }

    pub fn with_references(mut self, units: impl IntoIterator<Item = String>) -> Self {
        self.referenced_units.extend(units);
        self
    }

    pub fn with_imports(mut self, namespaces: impl IntoIterator<Item = String>) -> Self {
        self.imported_namespaces.extend(namespaces);
        self
    }

    pub fn with_variable_type_getter(
        mut self,
        getter: impl Fn(&str) -> Option<DataType> + Send + Sync + 'static,
    ) -> Self {
        self.variable_type_getter = Some(Box::new(getter));
        self
    }

    pub fn with_result_type(mut self, result_type: DataType) -> Self {
        self.result_type = Some(result_type);
        self
    }
}

impl fmt::Debug for ExpressionToCompile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionToCompile")
            .field("expression", &self.expression)
            .field("referenced_units", &self.referenced_units)
            .field("imported_namespaces", &self.imported_namespaces)
            .field(
                "variable_type_getter",
                &self.variable_type_getter.as_ref().map(|_| "<getter>"),
            )
            .field("result_type", &self.result_type)
            .finish()
    }
}

/// Outcome of a deferred compile.
///
/// Invariant: `expression` is present exactly when no diagnostic is an
/// error.
#[derive(Debug)]
pub struct ExpressionCompileResult {
    pub expression: Option<CompiledExpression>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExpressionCompileResult {
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

/// A compiled expression handle, evaluated on demand.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    ops: Vec<Op>,
    return_type: DataType,
}

impl CompiledExpression {
    /// The proven result type.
    pub fn return_type(&self) -> &DataType {
        &self.return_type
    }

    /// Evaluate against the current location values.
    pub fn evaluate(&self, lookup: &dyn LocationLookup) -> Result<Value, EvalError> {
        run_ops(&self.ops, &[], lookup)
    }
}

/// Compiles site-bound expressions into evaluable handles.
pub trait DeferredCompiler {
    fn compile_expression(&self, request: &ExpressionToCompile) -> ExpressionCompileResult;
}

/// The script implementation of [`DeferredCompiler`].
pub struct ScriptDeferredCompiler<R> {
    front_end: Box<dyn ScriptFrontEnd + Send + Sync>,
    resolver: R,
}

impl<R: UnitResolver> ScriptDeferredCompiler<R> {
    pub fn new(dialect: Dialect, resolver: R) -> Self {
        ScriptDeferredCompiler {
            front_end: front_end_for(dialect),
            resolver,
        }
    }
}

impl<R: UnitResolver> DeferredCompiler for ScriptDeferredCompiler<R> {
    fn compile_expression(&self, request: &ExpressionToCompile) -> ExpressionCompileResult {
        debug!(
            dialect = ?self.front_end.dialect(),
            expression = %request.expression,
            "deferred compile"
        );
        let (table, mut diagnostics) =
            FunctionTable::from_references(&self.resolver, &request.referenced_units);
        diagnostics.extend(table.check_imports(&request.imported_namespaces));

        let options = AnalyzeOptions {
            function_table: &table,
            imported_namespaces: &request.imported_namespaces,
            variable_type_getter: request
                .variable_type_getter
                .as_deref()
                .map(|getter| getter as &dyn Fn(&str) -> Option<DataType>),
            expected_return: request.result_type.clone(),
        };
        let (analyzed, mut analysis_diags) = self
            .front_end
            .parse_and_analyze_expression(&request.expression, &options);
        diagnostics.append(&mut analysis_diags);

        let expression = match analyzed {
            Some(analyzed) if !has_errors(&diagnostics) => Some(CompiledExpression {
                ops: lower(&analyzed.body),
                return_type: analyzed.return_type,
            }),
            _ => None,
        };
        ExpressionCompileResult {
            expression,
            diagnostics,
        }
    }
}
