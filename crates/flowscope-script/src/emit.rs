//! Lowering to stack bytecode and image emission.
//!
//! A checked member body lowers to a flat postorder instruction list for the
//! evaluator in [`crate::eval`]; a checked compilation unit emits as a
//! versioned, self-describing JSON image that [`crate::image`] can load in
//! any process. Duplicate unit and member names are emission-stage errors:
//! the analyzer checks declarations one at a time and only emission sees the
//! whole batch.

use serde::{Deserialize, Serialize};

use flowscope_core::DataType;

use crate::ast::{BinaryOp, Literal, TypedExpr, TypedExprKind, UnaryOp};
use crate::diagnostics::{codes, Diagnostic};
use crate::frontend::CompilationUnit;

/// Current image format version. Bumped on any incompatible layout change.
pub(crate) const IMAGE_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Instructions
// ============================================================================

/// One stack-machine instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Op {
    PushStr(String),
    PushI64(i64),
    PushF64(f64),
    PushBool(bool),
    /// Push a member parameter by position.
    LoadParam(u16),
    /// Push a workflow location's value, resolved by name at run time.
    LoadName(String),
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Neg,
    /// Widen the i64 on top of the stack to f64.
    I64ToF64,
    /// Call a namespaced function with `argc` arguments off the stack.
    Call {
        namespace: String,
        name: String,
        argc: u8,
    },
}

/// Lower a typed expression to a postorder instruction list.
pub(crate) fn lower(expr: &TypedExpr) -> Vec<Op> {
    let mut ops = Vec::new();
    lower_into(expr, &mut ops);
    ops
}

fn lower_into(expr: &TypedExpr, ops: &mut Vec<Op>) {
    match &expr.kind {
        TypedExprKind::Literal(literal) => ops.push(match literal {
            Literal::Str(value) => Op::PushStr(value.clone()),
            Literal::I64(value) => Op::PushI64(*value),
            Literal::F64(value) => Op::PushF64(*value),
            Literal::Bool(value) => Op::PushBool(*value),
        }),
        TypedExprKind::Param(index) => ops.push(Op::LoadParam(*index)),
        TypedExprKind::Location(name) => ops.push(Op::LoadName(name.clone())),
        TypedExprKind::Unary { op, operand } => {
            lower_into(operand, ops);
            ops.push(match op {
                UnaryOp::Not => Op::Not,
                UnaryOp::Neg => Op::Neg,
            });
        }
        TypedExprKind::Binary { op, lhs, rhs } => {
            lower_into(lhs, ops);
            lower_into(rhs, ops);
            ops.push(match op {
                BinaryOp::Add => Op::Add,
                BinaryOp::Sub => Op::Sub,
                BinaryOp::Mul => Op::Mul,
                BinaryOp::Div => Op::Div,
                BinaryOp::Rem => Op::Rem,
                BinaryOp::Concat => Op::Concat,
                BinaryOp::Eq => Op::Eq,
                BinaryOp::Ne => Op::Ne,
                BinaryOp::Lt => Op::Lt,
                BinaryOp::Le => Op::Le,
                BinaryOp::Gt => Op::Gt,
                BinaryOp::Ge => Op::Ge,
                BinaryOp::And => Op::And,
                BinaryOp::Or => Op::Or,
            });
        }
        TypedExprKind::Widen(operand) => {
            lower_into(operand, ops);
            ops.push(Op::I64ToF64);
        }
        TypedExprKind::Call {
            namespace,
            name,
            args,
        } => {
            for arg in args {
                lower_into(arg, ops);
            }
            ops.push(Op::Call {
                namespace: namespace.clone(),
                name: name.clone(),
                argc: args.len() as u8,
            });
        }
    }
}

// ============================================================================
// Image layout
// ============================================================================

/// Serialized compilation output. Self-describing: carries the format
/// version, every unit, and every member signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct UnitImage {
    pub format: u32,
    pub units: Vec<ImageUnit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ImageUnit {
    pub name: String,
    pub members: Vec<ImageMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ImageMember {
    pub name: String,
    pub params: Vec<(String, DataType)>,
    pub return_type: DataType,
    pub ops: Vec<Op>,
}

/// Emit a checked compilation unit as image bytes.
///
/// Duplicate names surface as error diagnostics and suppress the image.
pub(crate) fn build_image(unit: &CompilationUnit) -> (Option<Vec<u8>>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut image_units = Vec::with_capacity(unit.units.len());

    for analyzed in &unit.units {
        if image_units
            .iter()
            .any(|existing: &ImageUnit| existing.name == analyzed.name)
        {
            diagnostics.push(
                Diagnostic::error(
                    codes::DUPLICATE_UNIT,
                    format!("unit '{}' is declared more than once", analyzed.name),
                )
                .with_line(analyzed.line),
            );
            continue;
        }
        let mut members = Vec::with_capacity(analyzed.members.len());
        for member in &analyzed.members {
            if members
                .iter()
                .any(|existing: &ImageMember| existing.name == member.name)
            {
                diagnostics.push(
                    Diagnostic::error(
                        codes::DUPLICATE_MEMBER,
                        format!(
                            "member '{}' is declared more than once in unit '{}'",
                            member.name, analyzed.name
                        ),
                    )
                    .with_line(member.line),
                );
                continue;
            }
            members.push(ImageMember {
                name: member.name.clone(),
                params: member.params.clone(),
                return_type: member.return_type.clone(),
                ops: lower(&member.body),
            });
        }
        image_units.push(ImageUnit {
            name: analyzed.name.clone(),
            members,
        });
    }

    if !diagnostics.is_empty() {
        return (None, diagnostics);
    }
    let image = UnitImage {
        format: IMAGE_FORMAT_VERSION,
        units: image_units,
    };
    match serde_json::to_vec(&image) {
        Ok(bytes) => (Some(bytes), diagnostics),
        Err(err) => {
            diagnostics.push(Diagnostic::error(
                codes::INTERNAL,
                format!("image serialization failed: {err}"),
            ));
            (None, diagnostics)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{AnalyzedMember, AnalyzedUnit};

    fn constant_member(name: &str, line: u32, value: i64) -> AnalyzedMember {
        AnalyzedMember {
            name: name.to_string(),
            line,
            params: Vec::new(),
            return_type: DataType::I64,
            body: TypedExpr::new(
                TypedExprKind::Literal(Literal::I64(value)),
                DataType::I64,
            ),
        }
    }

    fn unit_named(name: &str, line: u32, members: Vec<AnalyzedMember>) -> AnalyzedUnit {
        AnalyzedUnit {
            name: name.to_string(),
            line,
            members,
        }
    }

    #[test]
    fn lowering_is_postorder() {
        let expr = TypedExpr::new(
            TypedExprKind::Binary {
                op: BinaryOp::Mul,
                lhs: Box::new(TypedExpr::new(
                    TypedExprKind::Binary {
                        op: BinaryOp::Add,
                        lhs: Box::new(TypedExpr::new(
                            TypedExprKind::Literal(Literal::I64(1)),
                            DataType::I64,
                        )),
                        rhs: Box::new(TypedExpr::new(
                            TypedExprKind::Param(0),
                            DataType::I64,
                        )),
                    },
                    DataType::I64,
                )),
                rhs: Box::new(TypedExpr::new(
                    TypedExprKind::Literal(Literal::I64(3)),
                    DataType::I64,
                )),
            },
            DataType::I64,
        );
        assert_eq!(
            lower(&expr),
            vec![
                Op::PushI64(1),
                Op::LoadParam(0),
                Op::Add,
                Op::PushI64(3),
                Op::Mul,
            ]
        );
    }

    #[test]
    fn image_round_trips_through_json() {
        let unit = CompilationUnit {
            units: vec![unit_named("PAYROLL", 1, vec![constant_member("Base", 2, 40)])],
        };
        let (bytes, diags) = build_image(&unit);
        assert!(diags.is_empty());
        let decoded: UnitImage = serde_json::from_slice(&bytes.unwrap()).unwrap();
        assert_eq!(decoded.format, IMAGE_FORMAT_VERSION);
        assert_eq!(decoded.units[0].name, "PAYROLL");
        assert_eq!(decoded.units[0].members[0].ops, vec![Op::PushI64(40)]);
    }

    #[test]
    fn duplicate_unit_names_fail_emission() {
        let unit = CompilationUnit {
            units: vec![
                unit_named("A", 1, Vec::new()),
                unit_named("A", 5, Vec::new()),
            ],
        };
        let (bytes, diags) = build_image(&unit);
        assert!(bytes.is_none());
        assert_eq!(diags[0].code, codes::DUPLICATE_UNIT);
        assert_eq!(diags[0].source_line, Some(5));
    }

    #[test]
    fn duplicate_member_names_fail_emission() {
        let unit = CompilationUnit {
            units: vec![unit_named(
                "A",
                1,
                vec![constant_member("M", 2, 1), constant_member("M", 3, 2)],
            )],
        };
        let (bytes, diags) = build_image(&unit);
        assert!(bytes.is_none());
        assert_eq!(diags[0].code, codes::DUPLICATE_MEMBER);
    }
}
