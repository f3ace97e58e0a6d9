//! Ahead-of-time unit compilation.
//!
//! The pipeline runs reference resolution, parse-and-analyze, emission, and
//! load as strict phases; each phase appends its diagnostics and an error
//! stops the pipeline at the next boundary. The product is a [`LoadedType`]
//! extracted from the loaded image by the requested name.

use tracing::debug;

use crate::diagnostics::{codes, CompileResult, Diagnostic};
use crate::emit::build_image;
use crate::frontend::{front_end_for, AnalyzeOptions, Dialect, ScriptFrontEnd};
use crate::image::load_image;
use crate::resolver::{FunctionTable, UnitResolver};

/// A request to compile unit source and extract one unit.
#[derive(Debug, Clone)]
pub struct ClassToCompile {
    /// Name of the unit to extract from the compiled image.
    pub class_name: String,
    /// Unit source text in the compiler's dialect.
    pub code: String,
    /// Units whose functions the source may call.
    pub referenced_units: Vec<String>,
    /// Namespaces searched for unqualified calls, in order.
    pub imported_namespaces: Vec<String>,
}

impl ClassToCompile {
    pub fn new(class_name: impl Into<String>, code: impl Into<String>) -> Self {
        ClassToCompile {
            class_name: class_name.into(),
            code: code.into(),
            referenced_units: Vec::new(),
            imported_namespaces: Vec::new(),
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
}

/// Compiles unit source into loaded, invokable types.
pub trait AheadOfTimeCompiler {
    fn compile(&self, request: &ClassToCompile) -> CompileResult;
}

/// The script implementation of [`AheadOfTimeCompiler`].
pub struct ScriptAotCompiler<R> {
    front_end: Box<dyn ScriptFrontEnd + Send + Sync>,
    resolver: R,
}

impl<R: UnitResolver> ScriptAotCompiler<R> {
    pub fn new(dialect: Dialect, resolver: R) -> Self {
        ScriptAotCompiler {
            front_end: front_end_for(dialect),
            resolver,
        }
    }
}

impl<R: UnitResolver> AheadOfTimeCompiler for ScriptAotCompiler<R> {
    fn compile(&self, request: &ClassToCompile) -> CompileResult {
        debug!(
            dialect = ?self.front_end.dialect(),
            class = %request.class_name,
            "ahead-of-time compile"
        );
        let (table, mut diagnostics) =
            FunctionTable::from_references(&self.resolver, &request.referenced_units);
        diagnostics.extend(table.check_imports(&request.imported_namespaces));

        let options = AnalyzeOptions {
            function_table: &table,
            imported_namespaces: &request.imported_namespaces,
            variable_type_getter: None,
            expected_return: None,
        };
        let (unit, mut analysis_diags) = self
            .front_end
            .parse_and_analyze_unit_source(&request.code, &options);
        diagnostics.append(&mut analysis_diags);
        let Some(unit) = unit else {
            return CompileResult::failed(diagnostics);
        };

        let (bytes, mut emit_diags) = build_image(&unit);
        diagnostics.append(&mut emit_diags);
        let Some(bytes) = bytes else {
            return CompileResult::failed(diagnostics);
        };

        let loaded = match load_image(&bytes) {
            Ok(loaded) => loaded,
            Err(err) => {
                diagnostics.push(Diagnostic::error(
                    codes::INTERNAL,
                    format!("emitted image failed to load: {err}"),
                ));
                return CompileResult::failed(diagnostics);
            }
        };
        debug!(hash = %loaded.content_hash(), "image registered");

        match loaded.nested_type(&request.class_name) {
            Some(result_type) => CompileResult {
                result_type: Some(result_type),
                diagnostics,
            },
            None => {
                diagnostics.push(Diagnostic::error(
                    codes::MISSING_TYPE,
                    format!(
                        "compiled image does not contain a unit named '{}'",
                        request.class_name
                    ),
                ));
                CompileResult::failed(diagnostics)
            }
        }
    }
}
