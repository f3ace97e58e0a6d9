//! Semantic analysis: name resolution and type checking.
//!
//! The analyzer turns surface expressions into [`TypedExpr`] trees with every
//! implicit `i64` to `f64` widening made explicit, collecting diagnostics as
//! it goes. It keeps checking after an error wherever it can so one compile
//! reports as much as possible; error recovery poisons only the failing
//! subtree.
//!
//! Identifier resolution depends on the compilation mode: unit members
//! resolve identifiers against their parameter list, deferred expressions
//! against the caller's variable-type getter.

use flowscope_core::DataType;

use crate::ast::{BinaryOp, Expr, MemberDecl, TypedExpr, TypedExprKind, UnaryOp, UnitDecl};
use crate::diagnostics::{codes, has_errors, Diagnostic};
use crate::frontend::{
    AnalyzeOptions, AnalyzedExpression, AnalyzedMember, AnalyzedUnit, CompilationUnit, Dialect,
};

// ============================================================================
// Entry Points
// ============================================================================

/// Analyze a single deferred expression.
pub(crate) fn analyze_expression(
    expr: &Expr,
    options: &AnalyzeOptions<'_>,
    dialect: Dialect,
) -> (Option<AnalyzedExpression>, Vec<Diagnostic>) {
    let mut analyzer = Analyzer {
        options,
        params: None,
        plus_concatenates: dialect.plus_concatenates(),
        line: 1,
        diagnostics: Vec::new(),
    };
    let body = analyzer.check(expr).and_then(|body| match &options.expected_return {
        Some(want) => match coerce(body, want) {
            Some(coerced) => Some(coerced),
            None => {
                analyzer.diagnostics.push(
                    Diagnostic::error(
                        codes::RETURN_TYPE,
                        format!("expression must produce {want}"),
                    )
                    .with_line(1),
                );
                None
            }
        },
        None => Some(body),
    });
    let diagnostics = analyzer.diagnostics;
    match body {
        Some(body) if !has_errors(&diagnostics) => {
            let return_type = body.ty.clone();
            (Some(AnalyzedExpression { body, return_type }), diagnostics)
        }
        _ => (None, diagnostics),
    }
}

/// Analyze parsed unit declarations into a compilation unit.
pub(crate) fn analyze_units(
    units: &[UnitDecl],
    options: &AnalyzeOptions<'_>,
    dialect: Dialect,
) -> (Option<CompilationUnit>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut analyzed_units = Vec::new();
    for unit in units {
        let mut members = Vec::new();
        for member in &unit.members {
            let (analyzed, mut member_diags) = analyze_member(member, options, dialect);
            diagnostics.append(&mut member_diags);
            if let Some(analyzed) = analyzed {
                members.push(analyzed);
            }
        }
        analyzed_units.push(AnalyzedUnit {
            name: unit.name.clone(),
            line: unit.line,
            members,
        });
    }
    if has_errors(&diagnostics) {
        (None, diagnostics)
    } else {
        (
            Some(CompilationUnit {
                units: analyzed_units,
            }),
            diagnostics,
        )
    }
}

fn analyze_member(
    member: &MemberDecl,
    options: &AnalyzeOptions<'_>,
    dialect: Dialect,
) -> (Option<AnalyzedMember>, Vec<Diagnostic>) {
    let mut analyzer = Analyzer {
        options,
        params: Some(&member.params),
        plus_concatenates: dialect.plus_concatenates(),
        line: member.line,
        diagnostics: Vec::new(),
    };
    let body = analyzer.check(&member.body).and_then(|body| {
        match coerce(body, &member.return_type) {
            Some(coerced) => Some(coerced),
            None => {
                analyzer.diagnostics.push(
                    Diagnostic::error(
                        codes::RETURN_TYPE,
                        format!(
                            "member '{}' must produce {}",
                            member.name, member.return_type
                        ),
                    )
                    .with_line(member.line),
                );
                None
            }
        }
    });
    let analyzed = body.map(|body| AnalyzedMember {
        name: member.name.clone(),
        line: member.line,
        params: member.params.clone(),
        return_type: member.return_type.clone(),
        body,
    });
    (analyzed, analyzer.diagnostics)
}

// ============================================================================
// Analyzer
// ============================================================================

struct Analyzer<'a> {
    options: &'a AnalyzeOptions<'a>,
    /// Parameter environment for unit members; deferred expressions resolve
    /// through the variable-type getter instead.
    params: Option<&'a [(String, DataType)]>,
    plus_concatenates: bool,
    line: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Analyzer<'_> {
    fn error(&mut self, code: &str, message: String) {
        self.diagnostics
            .push(Diagnostic::error(code, message).with_line(self.line));
    }

    fn check(&mut self, expr: &Expr) -> Option<TypedExpr> {
        match expr {
            Expr::Literal(literal) => Some(TypedExpr::new(
                TypedExprKind::Literal(literal.clone()),
                literal.data_type(),
            )),
            Expr::Identifier(name) => self.check_identifier(name),
            Expr::Unary { op, operand } => self.check_unary(*op, operand),
            Expr::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs),
            Expr::Call {
                namespace,
                name,
                args,
            } => self.check_call(namespace.as_deref(), name, args),
        }
    }

    fn check_identifier(&mut self, name: &str) -> Option<TypedExpr> {
        if let Some(params) = self.params {
            return match params.iter().position(|(param, _)| param == name) {
                Some(index) => {
                    let ty = params[index].1.clone();
                    Some(TypedExpr::new(TypedExprKind::Param(index as u16), ty))
                }
                None => {
                    self.error(
                        codes::UNKNOWN_IDENTIFIER,
                        format!("'{name}' is not a parameter of this member"),
                    );
                    None
                }
            };
        }
        let Some(getter) = self.options.variable_type_getter else {
            self.error(
                codes::UNKNOWN_IDENTIFIER,
                format!("'{name}' cannot resolve: no locations are in scope"),
            );
            return None;
        };
        match getter(name) {
            Some(DataType::Object(type_name)) => {
                self.error(
                    codes::UNSUPPORTED_TYPE,
                    format!("location '{name}' has type {type_name}, which expressions cannot compute with"),
                );
                None
            }
            Some(ty) => Some(TypedExpr::new(
                TypedExprKind::Location(name.to_string()),
                ty,
            )),
            None => {
                self.error(
                    codes::UNKNOWN_IDENTIFIER,
                    format!("'{name}' does not resolve to a visible location"),
                );
                None
            }
        }
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expr) -> Option<TypedExpr> {
        let operand = self.check(operand)?;
        match op {
            UnaryOp::Not => {
                if operand.ty != DataType::Bool {
                    self.error(
                        codes::TYPE_MISMATCH,
                        format!("logical negation needs bool, got {}", operand.ty),
                    );
                    return None;
                }
            }
            UnaryOp::Neg => {
                if !is_numeric(&operand.ty) {
                    self.error(
                        codes::TYPE_MISMATCH,
                        format!("negation needs a numeric operand, got {}", operand.ty),
                    );
                    return None;
                }
            }
        }
        let ty = operand.ty.clone();
        Some(TypedExpr::new(
            TypedExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        ))
    }

    fn check_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Option<TypedExpr> {
        // Check both sides before bailing so each reports its own faults.
        let lhs = self.check(lhs);
        let rhs = self.check(rhs);
        let (lhs, rhs) = (lhs?, rhs?);

        match op {
            BinaryOp::And | BinaryOp::Or => {
                if lhs.ty != DataType::Bool || rhs.ty != DataType::Bool {
                    self.error(
                        codes::TYPE_MISMATCH,
                        format!("logical operator needs bool operands, got {} and {}", lhs.ty, rhs.ty),
                    );
                    return None;
                }
                Some(typed_binary(op, lhs, rhs, DataType::Bool))
            }
            BinaryOp::Add => {
                if lhs.ty == DataType::String && rhs.ty == DataType::String {
                    if self.plus_concatenates {
                        return Some(typed_binary(
                            BinaryOp::Concat,
                            lhs,
                            rhs,
                            DataType::String,
                        ));
                    }
                    self.error(
                        codes::TYPE_MISMATCH,
                        "'+' does not concatenate in this dialect; use '&'".to_string(),
                    );
                    return None;
                }
                self.check_arithmetic(op, lhs, rhs)
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                self.check_arithmetic(op, lhs, rhs)
            }
            BinaryOp::Concat => {
                if lhs.ty != DataType::String || rhs.ty != DataType::String {
                    self.error(
                        codes::TYPE_MISMATCH,
                        format!("concatenation needs strings, got {} and {}", lhs.ty, rhs.ty),
                    );
                    return None;
                }
                Some(typed_binary(op, lhs, rhs, DataType::String))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if is_numeric(&lhs.ty) && is_numeric(&rhs.ty) {
                    let (lhs, rhs, _) = widen_pair(lhs, rhs);
                    return Some(typed_binary(op, lhs, rhs, DataType::Bool));
                }
                if lhs.ty != rhs.ty {
                    self.error(
                        codes::TYPE_MISMATCH,
                        format!("cannot compare {} with {}", lhs.ty, rhs.ty),
                    );
                    return None;
                }
                Some(typed_binary(op, lhs, rhs, DataType::Bool))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                if is_numeric(&lhs.ty) && is_numeric(&rhs.ty) {
                    let (lhs, rhs, _) = widen_pair(lhs, rhs);
                    return Some(typed_binary(op, lhs, rhs, DataType::Bool));
                }
                if lhs.ty == DataType::String && rhs.ty == DataType::String {
                    return Some(typed_binary(op, lhs, rhs, DataType::Bool));
                }
                self.error(
                    codes::TYPE_MISMATCH,
                    format!("cannot order {} against {}", lhs.ty, rhs.ty),
                );
                None
            }
        }
    }

    fn check_arithmetic(
        &mut self,
        op: BinaryOp,
        lhs: TypedExpr,
        rhs: TypedExpr,
    ) -> Option<TypedExpr> {
        if !is_numeric(&lhs.ty) || !is_numeric(&rhs.ty) {
            self.error(
                codes::TYPE_MISMATCH,
                format!("arithmetic needs numeric operands, got {} and {}", lhs.ty, rhs.ty),
            );
            return None;
        }
        let (lhs, rhs, ty) = widen_pair(lhs, rhs);
        Some(typed_binary(op, lhs, rhs, ty))
    }

    fn check_call(
        &mut self,
        namespace: Option<&str>,
        name: &str,
        args: &[Expr],
    ) -> Option<TypedExpr> {
        // Arguments are checked regardless of whether the call resolves.
        let checked: Vec<Option<TypedExpr>> = args.iter().map(|arg| self.check(arg)).collect();

        let resolved = match namespace {
            Some(namespace) => self
                .options
                .function_table
                .lookup_qualified(namespace, name)
                .map(|sig| (namespace.to_string(), sig)),
            None => self
                .options
                .function_table
                .lookup_imported(self.options.imported_namespaces, name)
                .map(|(namespace, sig)| (namespace.to_string(), sig)),
        };
        let Some((namespace, signature)) = resolved else {
            let shown = match namespace {
                Some(namespace) => format!("{namespace}.{name}"),
                None => name.to_string(),
            };
            self.error(
                codes::UNKNOWN_FUNCTION,
                format!("function '{shown}' is not provided by any referenced unit"),
            );
            return None;
        };

        if checked.len() != signature.params.len() {
            self.error(
                codes::ARITY,
                format!(
                    "'{namespace}.{name}' takes {} arguments, got {}",
                    signature.params.len(),
                    checked.len()
                ),
            );
            return None;
        }
        let mut coerced = Vec::with_capacity(checked.len());
        for (index, (arg, want)) in checked.into_iter().zip(&signature.params).enumerate() {
            let arg = arg?;
            match coerce(arg, want) {
                Some(arg) => coerced.push(arg),
                None => {
                    self.error(
                        codes::TYPE_MISMATCH,
                        format!("argument {} of '{namespace}.{name}' must be {want}", index + 1),
                    );
                    return None;
                }
            }
        }
        let ty = signature.ret.clone();
        Some(TypedExpr::new(
            TypedExprKind::Call {
                namespace,
                name: name.to_string(),
                args: coerced,
            },
            ty,
        ))
    }
}

// ============================================================================
// Type utilities
// ============================================================================

fn is_numeric(ty: &DataType) -> bool {
    matches!(ty, DataType::I64 | DataType::F64)
}

/// Widen a numeric pair to a common type.
fn widen_pair(lhs: TypedExpr, rhs: TypedExpr) -> (TypedExpr, TypedExpr, DataType) {
    match (&lhs.ty, &rhs.ty) {
        (DataType::I64, DataType::F64) => (lhs.widened(), rhs, DataType::F64),
        (DataType::F64, DataType::I64) => (lhs, rhs.widened(), DataType::F64),
        (DataType::F64, DataType::F64) => (lhs, rhs, DataType::F64),
        _ => (lhs, rhs, DataType::I64),
    }
}

/// Coerce an expression to a wanted type, inserting a widening if legal.
pub(crate) fn coerce(expr: TypedExpr, want: &DataType) -> Option<TypedExpr> {
    if expr.ty == *want {
        Some(expr)
    } else if expr.ty == DataType::I64 && *want == DataType::F64 {
        Some(expr.widened())
    } else {
        None
    }
}

fn typed_binary(op: BinaryOp, lhs: TypedExpr, rhs: TypedExpr, ty: DataType) -> TypedExpr {
    TypedExpr::new(
        TypedExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression_source;
    use crate::resolver::{BuiltinResolver, FunctionTable, UnitResolver, BUILTINS_UNIT};

    fn table() -> FunctionTable {
        let (table, diags) =
            FunctionTable::from_references(&BuiltinResolver, &[BUILTINS_UNIT.to_string()]);
        assert!(diags.is_empty());
        table
    }

    fn getter(name: &str) -> Option<DataType> {
        match name {
            "name" => Some(DataType::String),
            "count" => Some(DataType::I64),
            "rate" => Some(DataType::F64),
            "done" => Some(DataType::Bool),
            "session" => Some(DataType::Object("MailSession".to_string())),
            _ => None,
        }
    }

    fn analyze(source: &str) -> (Option<AnalyzedExpression>, Vec<Diagnostic>) {
        let table = table();
        let imports = vec!["Text".to_string()];
        let options = AnalyzeOptions {
            function_table: &table,
            imported_namespaces: &imports,
            variable_type_getter: Some(&getter),
            expected_return: None,
        };
        let expr = parse_expression_source(source, Dialect::CLike).unwrap();
        analyze_expression(&expr, &options, Dialect::CLike)
    }

    #[test]
    fn widening_is_made_explicit() {
        let (analyzed, diags) = analyze("count + rate");
        assert!(diags.is_empty());
        let analyzed = analyzed.unwrap();
        assert_eq!(analyzed.return_type, DataType::F64);
        let TypedExprKind::Binary { lhs, .. } = &analyzed.body.kind else {
            panic!("expected a binary node");
        };
        assert!(matches!(lhs.kind, TypedExprKind::Widen(_)));
    }

    #[test]
    fn clike_plus_concatenates_strings() {
        let (analyzed, _) = analyze(r#"name + "!""#);
        let analyzed = analyzed.unwrap();
        assert_eq!(analyzed.return_type, DataType::String);
        assert!(matches!(
            analyzed.body.kind,
            TypedExprKind::Binary {
                op: BinaryOp::Concat,
                ..
            }
        ));
    }

    #[test]
    fn unknown_identifier_is_reported_with_code() {
        let (analyzed, diags) = analyze("missing + 1");
        assert!(analyzed.is_none());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, codes::UNKNOWN_IDENTIFIER);
    }

    #[test]
    fn object_typed_location_is_unsupported() {
        let (analyzed, diags) = analyze("session");
        assert!(analyzed.is_none());
        assert_eq!(diags[0].code, codes::UNSUPPORTED_TYPE);
    }

    #[test]
    fn both_operands_report_independently() {
        let (analyzed, diags) = analyze("missing1 + missing2");
        assert!(analyzed.is_none());
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn qualified_and_imported_calls_resolve() {
        let (analyzed, diags) = analyze("Text.Len(name) + Len(name)");
        assert!(diags.is_empty());
        assert_eq!(analyzed.unwrap().return_type, DataType::I64);
    }

    #[test]
    fn arity_and_argument_types_are_checked() {
        let (_, diags) = analyze("Text.Len(name, name)");
        assert_eq!(diags[0].code, codes::ARITY);

        let (_, diags) = analyze("Text.Len(count)");
        assert_eq!(diags[0].code, codes::TYPE_MISMATCH);
    }

    #[test]
    fn call_arguments_widen_like_assignments() {
        // Math is not imported, so qualify it; i64 widens into the f64 slot.
        let (analyzed, diags) = analyze("Math.Abs(count)");
        assert!(diags.is_empty());
        assert_eq!(analyzed.unwrap().return_type, DataType::F64);
    }

    #[test]
    fn expected_return_type_is_enforced() {
        let table = table();
        let options = AnalyzeOptions {
            function_table: &table,
            imported_namespaces: &[],
            variable_type_getter: Some(&getter),
            expected_return: Some(DataType::Bool),
        };
        let expr = parse_expression_source("count + 1", Dialect::CLike).unwrap();
        let (analyzed, diags) = analyze_expression(&expr, &options, Dialect::CLike);
        assert!(analyzed.is_none());
        assert_eq!(diags[0].code, codes::RETURN_TYPE);
    }

    #[test]
    fn basic_dialect_rejects_plus_on_strings() {
        let table = table();
        let options = AnalyzeOptions {
            function_table: &table,
            imported_namespaces: &[],
            variable_type_getter: Some(&getter),
            expected_return: None,
        };
        let expr =
            parse_expression_source(r#"name + "!""#, Dialect::BasicLike).unwrap();
        let (analyzed, diags) = analyze_expression(&expr, &options, Dialect::BasicLike);
        assert!(analyzed.is_none());
        assert_eq!(diags[0].code, codes::TYPE_MISMATCH);
        assert!(diags[0].message.contains("'&'"));
    }

    #[test]
    fn resolver_is_pluggable() {
        struct EmptyResolver;
        impl UnitResolver for EmptyResolver {
            fn resolve(&self, _unit_name: &str) -> Option<crate::resolver::UnitMetadata> {
                None
            }
        }
        let (table, diags) =
            FunctionTable::from_references(&EmptyResolver, &["anything".to_string()]);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_warning);
        assert_eq!(diags[0].code, codes::UNKNOWN_UNIT);
        assert!(table.lookup_qualified("Text", "Len").is_none());
    }
}
