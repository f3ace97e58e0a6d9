//! Dialect front ends: parse plus analyze behind one trait.
//!
//! Both surface dialects share the grammar shape, the AST, and the analyzer;
//! a [`Dialect`] value selects the operator spellings and the handful of
//! semantic differences (what `+` means on strings). The compilers hold a
//! `Box<dyn ScriptFrontEnd>` and never look at the dialect again.

use flowscope_core::DataType;

use crate::analyze;
use crate::ast::TypedExpr;
use crate::diagnostics::Diagnostic;
use crate::parser;
use crate::resolver::FunctionTable;

// ============================================================================
// Dialect
// ============================================================================

/// Surface syntax family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `&&`, `||`, `!`, `==`, `!=`, `%`; `+` concatenates strings.
    CLike,
    /// `And`, `Or`, `Not`, `=`, `<>`, `Mod`; `&` concatenates strings.
    BasicLike,
}

impl Dialect {
    /// Whether `+` over two strings means concatenation in this dialect.
    pub(crate) fn plus_concatenates(self) -> bool {
        matches!(self, Dialect::CLike)
    }
}

// ============================================================================
// Analysis inputs and outputs
// ============================================================================

/// Context the analyzer resolves names against.
pub struct AnalyzeOptions<'a> {
    /// Functions contributed by the referenced units.
    pub function_table: &'a FunctionTable,
    /// Namespaces searched, in order, for unqualified calls.
    pub imported_namespaces: &'a [String],
    /// Resolves a free identifier to the type of a visible location. `None`
    /// when no locations are in scope (unit-source compiles).
    pub variable_type_getter: Option<&'a dyn Fn(&str) -> Option<DataType>>,
    /// Required result type, if the caller declares one.
    pub expected_return: Option<DataType>,
}

/// A checked deferred expression.
#[derive(Debug, Clone)]
pub struct AnalyzedExpression {
    pub(crate) body: TypedExpr,
    pub(crate) return_type: DataType,
}

impl AnalyzedExpression {
    /// The computed result type.
    pub fn return_type(&self) -> &DataType {
        &self.return_type
    }
}

/// A checked batch of unit declarations, ready for emission.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub(crate) units: Vec<AnalyzedUnit>,
}

#[derive(Debug, Clone)]
pub(crate) struct AnalyzedUnit {
    pub name: String,
    pub line: u32,
    pub members: Vec<AnalyzedMember>,
}

#[derive(Debug, Clone)]
pub(crate) struct AnalyzedMember {
    pub name: String,
    pub line: u32,
    pub params: Vec<(String, DataType)>,
    pub return_type: DataType,
    pub body: TypedExpr,
}

// ============================================================================
// Front end trait
// ============================================================================

/// Parse-and-check service for one dialect.
///
/// Both methods return diagnostics alongside the product; the product is
/// `None` exactly when an error diagnostic is present.
pub trait ScriptFrontEnd {
    fn dialect(&self) -> Dialect;

    /// Check a single expression against in-scope locations.
    fn parse_and_analyze_expression(
        &self,
        source: &str,
        options: &AnalyzeOptions<'_>,
    ) -> (Option<AnalyzedExpression>, Vec<Diagnostic>);

    /// Check a full unit source.
    fn parse_and_analyze_unit_source(
        &self,
        source: &str,
        options: &AnalyzeOptions<'_>,
    ) -> (Option<CompilationUnit>, Vec<Diagnostic>);
}

/// Front end for the c-like dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct CLikeFrontEnd;

/// Front end for the basic-like dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicLikeFrontEnd;

impl ScriptFrontEnd for CLikeFrontEnd {
    fn dialect(&self) -> Dialect {
        Dialect::CLike
    }

    fn parse_and_analyze_expression(
        &self,
        source: &str,
        options: &AnalyzeOptions<'_>,
    ) -> (Option<AnalyzedExpression>, Vec<Diagnostic>) {
        expression_pipeline(Dialect::CLike, source, options)
    }

    fn parse_and_analyze_unit_source(
        &self,
        source: &str,
        options: &AnalyzeOptions<'_>,
    ) -> (Option<CompilationUnit>, Vec<Diagnostic>) {
        unit_pipeline(Dialect::CLike, source, options)
    }
}

impl ScriptFrontEnd for BasicLikeFrontEnd {
    fn dialect(&self) -> Dialect {
        Dialect::BasicLike
    }

    fn parse_and_analyze_expression(
        &self,
        source: &str,
        options: &AnalyzeOptions<'_>,
    ) -> (Option<AnalyzedExpression>, Vec<Diagnostic>) {
        expression_pipeline(Dialect::BasicLike, source, options)
    }

    fn parse_and_analyze_unit_source(
        &self,
        source: &str,
        options: &AnalyzeOptions<'_>,
    ) -> (Option<CompilationUnit>, Vec<Diagnostic>) {
        unit_pipeline(Dialect::BasicLike, source, options)
    }
}

/// Construct the front end for a dialect.
pub fn front_end_for(dialect: Dialect) -> Box<dyn ScriptFrontEnd + Send + Sync> {
    match dialect {
        Dialect::CLike => Box::new(CLikeFrontEnd),
        Dialect::BasicLike => Box::new(BasicLikeFrontEnd),
    }
}

fn expression_pipeline(
    dialect: Dialect,
    source: &str,
    options: &AnalyzeOptions<'_>,
) -> (Option<AnalyzedExpression>, Vec<Diagnostic>) {
    match parser::parse_expression_source(source, dialect) {
        Ok(expr) => analyze::analyze_expression(&expr, options, dialect),
        Err(diag) => (None, vec![diag]),
    }
}

fn unit_pipeline(
    dialect: Dialect,
    source: &str,
    options: &AnalyzeOptions<'_>,
) -> (Option<CompilationUnit>, Vec<Diagnostic>) {
    match parser::parse_unit_source(source, dialect) {
        Ok(units) => analyze::analyze_units(&units, options, dialect),
        Err(diag) => (None, vec![diag]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{BuiltinResolver, FunctionTable, BUILTINS_UNIT};

    fn empty_options(table: &FunctionTable) -> AnalyzeOptions<'_> {
        AnalyzeOptions {
            function_table: table,
            imported_namespaces: &[],
            variable_type_getter: None,
            expected_return: None,
        }
    }

    #[test]
    fn dialects_agree_on_shared_semantics() {
        let (table, _) =
            FunctionTable::from_references(&BuiltinResolver, &[BUILTINS_UNIT.to_string()]);
        let options = empty_options(&table);

        let (clike, diags) =
            CLikeFrontEnd.parse_and_analyze_expression("1 + 2 * 3 == 7", &options);
        assert!(diags.is_empty());
        let (basic, diags) =
            BasicLikeFrontEnd.parse_and_analyze_expression("1 + 2 * 3 = 7", &options);
        assert!(diags.is_empty());
        assert_eq!(clike.unwrap().body, basic.unwrap().body);
    }

    #[test]
    fn parse_failure_surfaces_a_single_syntax_diagnostic() {
        let table = FunctionTable::default();
        let options = empty_options(&table);
        let (analyzed, diags) =
            CLikeFrontEnd.parse_and_analyze_expression("1 +", &options);
        assert!(analyzed.is_none());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, crate::diagnostics::codes::SYNTAX);
    }
}
