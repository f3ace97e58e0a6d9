//! Runtime values and the bytecode evaluator.
//!
//! Evaluation walks a flat instruction list against an operand stack. The
//! analyzer has already proven the types line up, so a type confusion here
//! means a corrupted or hand-built image; it surfaces as
//! [`EvalError::TypeConfusion`] rather than a panic.

use std::collections::HashMap;
use thiserror::Error;

use flowscope_core::DataType;

use crate::emit::Op;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::String(_) => DataType::String,
            Value::I64(_) => DataType::I64,
            Value::F64(_) => DataType::F64,
            Value::Bool(_) => DataType::Bool,
        }
    }
}

/// Supplies current values for workflow locations, by name.
///
/// Deferred expressions capture location names at compile time and read the
/// values through this at every evaluation.
pub trait LocationLookup {
    fn value_of(&self, name: &str) -> Option<Value>;
}

impl LocationLookup for HashMap<String, Value> {
    fn value_of(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Evaluation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("location '{name}' has no value")]
    MissingLocation { name: String },
    #[error("member '{name}' does not exist")]
    MissingMember { name: String },
    #[error("'{name}' takes {expected} arguments, got {actual}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("argument {index} of '{name}' must be {expected}, got {actual}")]
    ArgumentType {
        name: String,
        index: usize,
        expected: DataType,
        actual: DataType,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("'{text}' is not a number")]
    InvalidNumber { text: String },
    #[error("evaluation stack corrupted: {detail}")]
    TypeConfusion { detail: String },
}

// ============================================================================
// Evaluator
// ============================================================================

/// Run an instruction list to a single result value.
pub(crate) fn run_ops(
    ops: &[Op],
    params: &[Value],
    lookup: &dyn LocationLookup,
) -> Result<Value, EvalError> {
    let mut stack: Vec<Value> = Vec::with_capacity(8);
    for op in ops {
        match op {
            Op::PushStr(value) => stack.push(Value::String(value.clone())),
            Op::PushI64(value) => stack.push(Value::I64(*value)),
            Op::PushF64(value) => stack.push(Value::F64(*value)),
            Op::PushBool(value) => stack.push(Value::Bool(*value)),
            Op::LoadParam(index) => {
                let value = params.get(*index as usize).cloned().ok_or_else(|| {
                    EvalError::TypeConfusion {
                        detail: format!("parameter {index} out of range"),
                    }
                })?;
                stack.push(value);
            }
            Op::LoadName(name) => {
                let value = lookup
                    .value_of(name)
                    .ok_or_else(|| EvalError::MissingLocation { name: name.clone() })?;
                stack.push(value);
            }
            Op::Add => arith(&mut stack, "+", |a, b| a.checked_add(b), |a, b| a + b)?,
            Op::Sub => arith(&mut stack, "-", |a, b| a.checked_sub(b), |a, b| a - b)?,
            Op::Mul => arith(&mut stack, "*", |a, b| a.checked_mul(b), |a, b| a * b)?,
            Op::Div => {
                let (lhs, rhs) = pop_pair(&mut stack, "/")?;
                stack.push(match (lhs, rhs) {
                    (Value::I64(_), Value::I64(0)) => return Err(EvalError::DivisionByZero),
                    (Value::I64(a), Value::I64(b)) => Value::I64(a.wrapping_div(b)),
                    (Value::F64(a), Value::F64(b)) => Value::F64(a / b),
                    (lhs, rhs) => return Err(confused("/", &lhs, &rhs)),
                });
            }
            Op::Rem => {
                let (lhs, rhs) = pop_pair(&mut stack, "%")?;
                stack.push(match (lhs, rhs) {
                    (Value::I64(_), Value::I64(0)) => return Err(EvalError::DivisionByZero),
                    (Value::I64(a), Value::I64(b)) => Value::I64(a.wrapping_rem(b)),
                    (Value::F64(a), Value::F64(b)) => Value::F64(a % b),
                    (lhs, rhs) => return Err(confused("%", &lhs, &rhs)),
                });
            }
            Op::Concat => {
                let (lhs, rhs) = pop_pair(&mut stack, "concat")?;
                match (lhs, rhs) {
                    (Value::String(mut a), Value::String(b)) => {
                        a.push_str(&b);
                        stack.push(Value::String(a));
                    }
                    (lhs, rhs) => return Err(confused("concat", &lhs, &rhs)),
                }
            }
            Op::Eq => {
                let (lhs, rhs) = pop_pair(&mut stack, "==")?;
                stack.push(Value::Bool(values_equal(&lhs, &rhs)?));
            }
            Op::Ne => {
                let (lhs, rhs) = pop_pair(&mut stack, "!=")?;
                stack.push(Value::Bool(!values_equal(&lhs, &rhs)?));
            }
            Op::Lt => compare(&mut stack, "<", |ord| ord.is_lt())?,
            Op::Le => compare(&mut stack, "<=", |ord| ord.is_le())?,
            Op::Gt => compare(&mut stack, ">", |ord| ord.is_gt())?,
            Op::Ge => compare(&mut stack, ">=", |ord| ord.is_ge())?,
            // Both operands are already on the stack, so logical operators
            // evaluate eagerly.
            Op::And => logical(&mut stack, "and", |a, b| a && b)?,
            Op::Or => logical(&mut stack, "or", |a, b| a || b)?,
            Op::Not => {
                let operand = pop_one(&mut stack, "not")?;
                match operand {
                    Value::Bool(value) => stack.push(Value::Bool(!value)),
                    operand => {
                        return Err(EvalError::TypeConfusion {
                            detail: format!("not over {}", operand.data_type()),
                        })
                    }
                }
            }
            Op::Neg => {
                let operand = pop_one(&mut stack, "neg")?;
                match operand {
                    Value::I64(value) => stack.push(Value::I64(value.wrapping_neg())),
                    Value::F64(value) => stack.push(Value::F64(-value)),
                    operand => {
                        return Err(EvalError::TypeConfusion {
                            detail: format!("neg over {}", operand.data_type()),
                        })
                    }
                }
            }
            Op::I64ToF64 => {
                let operand = pop_one(&mut stack, "widen")?;
                match operand {
                    Value::I64(value) => stack.push(Value::F64(value as f64)),
                    operand => {
                        return Err(EvalError::TypeConfusion {
                            detail: format!("widen over {}", operand.data_type()),
                        })
                    }
                }
            }
            Op::Call {
                namespace,
                name,
                argc,
            } => {
                let argc = *argc as usize;
                if stack.len() < argc {
                    return Err(EvalError::TypeConfusion {
                        detail: format!("call '{namespace}.{name}' underflows the stack"),
                    });
                }
                let args = stack.split_off(stack.len() - argc);
                stack.push(call_builtin(namespace, name, &args)?);
            }
        }
    }
    match (stack.pop(), stack.is_empty()) {
        (Some(result), true) => Ok(result),
        _ => Err(EvalError::TypeConfusion {
            detail: "program did not leave exactly one result".to_string(),
        }),
    }
}

fn pop_one(stack: &mut Vec<Value>, op: &str) -> Result<Value, EvalError> {
    stack.pop().ok_or_else(|| EvalError::TypeConfusion {
        detail: format!("'{op}' underflows the stack"),
    })
}

fn pop_pair(stack: &mut Vec<Value>, op: &str) -> Result<(Value, Value), EvalError> {
    let rhs = pop_one(stack, op)?;
    let lhs = pop_one(stack, op)?;
    Ok((lhs, rhs))
}

fn confused(op: &str, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::TypeConfusion {
        detail: format!("'{op}' over {} and {}", lhs.data_type(), rhs.data_type()),
    }
}

fn arith(
    stack: &mut Vec<Value>,
    op: &str,
    int: impl Fn(i64, i64) -> Option<i64>,
    float: impl Fn(f64, f64) -> f64,
) -> Result<(), EvalError> {
    let (lhs, rhs) = pop_pair(stack, op)?;
    let result = match (lhs, rhs) {
        (Value::I64(a), Value::I64(b)) => {
            Value::I64(int(a, b).ok_or_else(|| EvalError::TypeConfusion {
                detail: format!("'{op}' overflows i64"),
            })?)
        }
        (Value::F64(a), Value::F64(b)) => Value::F64(float(a, b)),
        (lhs, rhs) => return Err(confused(op, &lhs, &rhs)),
    };
    stack.push(result);
    Ok(())
}

fn values_equal(lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Ok(a == b),
        (Value::I64(a), Value::I64(b)) => Ok(a == b),
        (Value::F64(a), Value::F64(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        _ => Err(confused("==", lhs, rhs)),
    }
}

fn compare(
    stack: &mut Vec<Value>,
    op: &str,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<(), EvalError> {
    let (lhs, rhs) = pop_pair(stack, op)?;
    let ordering = match (&lhs, &rhs) {
        (Value::I64(a), Value::I64(b)) => a.cmp(b),
        (Value::F64(a), Value::F64(b)) => {
            a.partial_cmp(b).ok_or_else(|| EvalError::TypeConfusion {
                detail: format!("'{op}' over NaN"),
            })?
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => return Err(confused(op, &lhs, &rhs)),
    };
    stack.push(Value::Bool(accept(ordering)));
    Ok(())
}

fn logical(
    stack: &mut Vec<Value>,
    op: &str,
    combine: impl Fn(bool, bool) -> bool,
) -> Result<(), EvalError> {
    let (lhs, rhs) = pop_pair(stack, op)?;
    match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => {
            stack.push(Value::Bool(combine(a, b)));
            Ok(())
        }
        (lhs, rhs) => Err(confused(op, &lhs, &rhs)),
    }
}

// ============================================================================
// Built-in functions
// ============================================================================

fn call_builtin(namespace: &str, name: &str, args: &[Value]) -> Result<Value, EvalError> {
    let shown = format!("{namespace}.{name}");
    match (namespace, name) {
        ("Text", "Len") => {
            let [Value::String(text)] = args else {
                return Err(builtin_args(&shown, args));
            };
            Ok(Value::I64(text.chars().count() as i64))
        }
        ("Text", "Upper") => {
            let [Value::String(text)] = args else {
                return Err(builtin_args(&shown, args));
            };
            Ok(Value::String(text.to_uppercase()))
        }
        ("Text", "Lower") => {
            let [Value::String(text)] = args else {
                return Err(builtin_args(&shown, args));
            };
            Ok(Value::String(text.to_lowercase()))
        }
        ("Text", "Trim") => {
            let [Value::String(text)] = args else {
                return Err(builtin_args(&shown, args));
            };
            Ok(Value::String(text.trim().to_string()))
        }
        ("Text", "Contains") => {
            let [Value::String(haystack), Value::String(needle)] = args else {
                return Err(builtin_args(&shown, args));
            };
            Ok(Value::Bool(haystack.contains(needle.as_str())))
        }
        ("Math", "Abs") => {
            let [Value::F64(value)] = args else {
                return Err(builtin_args(&shown, args));
            };
            Ok(Value::F64(value.abs()))
        }
        ("Math", "Min") => {
            let [Value::F64(a), Value::F64(b)] = args else {
                return Err(builtin_args(&shown, args));
            };
            Ok(Value::F64(a.min(*b)))
        }
        ("Math", "Max") => {
            let [Value::F64(a), Value::F64(b)] = args else {
                return Err(builtin_args(&shown, args));
            };
            Ok(Value::F64(a.max(*b)))
        }
        ("Math", "Floor") => {
            let [Value::F64(value)] = args else {
                return Err(builtin_args(&shown, args));
            };
            Ok(Value::F64(value.floor()))
        }
        ("Convert", "ToText") => {
            let [Value::F64(value)] = args else {
                return Err(builtin_args(&shown, args));
            };
            Ok(Value::String(value.to_string()))
        }
        ("Convert", "ToNumber") => {
            let [Value::String(text)] = args else {
                return Err(builtin_args(&shown, args));
            };
            text.trim()
                .parse::<f64>()
                .map(Value::F64)
                .map_err(|_| EvalError::InvalidNumber { text: text.clone() })
        }
        _ => Err(EvalError::MissingMember { name: shown }),
    }
}

fn builtin_args(name: &str, args: &[Value]) -> EvalError {
    EvalError::TypeConfusion {
        detail: format!(
            "'{name}' called with ({})",
            args.iter()
                .map(|arg| arg.data_type().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoLocations;
    impl LocationLookup for NoLocations {
        fn value_of(&self, _name: &str) -> Option<Value> {
            None
        }
    }

    #[test]
    fn arithmetic_with_widening() {
        let ops = vec![
            Op::PushI64(3),
            Op::I64ToF64,
            Op::PushF64(0.5),
            Op::Add,
        ];
        assert_eq!(
            run_ops(&ops, &[], &NoLocations),
            Ok(Value::F64(3.5))
        );
    }

    #[test]
    fn locations_resolve_through_lookup() {
        let mut env = HashMap::new();
        env.insert("count".to_string(), Value::I64(4));
        let ops = vec![Op::LoadName("count".to_string()), Op::PushI64(1), Op::Add];
        assert_eq!(run_ops(&ops, &[], &env), Ok(Value::I64(5)));

        let ops = vec![Op::LoadName("missing".to_string())];
        assert_eq!(
            run_ops(&ops, &[], &env),
            Err(EvalError::MissingLocation {
                name: "missing".to_string()
            })
        );
    }

    #[test]
    fn integer_division_by_zero_is_an_error() {
        let ops = vec![Op::PushI64(1), Op::PushI64(0), Op::Div];
        assert_eq!(run_ops(&ops, &[], &NoLocations), Err(EvalError::DivisionByZero));

        let ops = vec![Op::PushI64(1), Op::PushI64(0), Op::Rem];
        assert_eq!(run_ops(&ops, &[], &NoLocations), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn string_comparison_is_lexicographic() {
        let ops = vec![
            Op::PushStr("apple".to_string()),
            Op::PushStr("banana".to_string()),
            Op::Lt,
        ];
        assert_eq!(run_ops(&ops, &[], &NoLocations), Ok(Value::Bool(true)));
    }

    #[test]
    fn builtins_dispatch_by_namespace_and_name() {
        let ops = vec![
            Op::PushStr("  hi  ".to_string()),
            Op::Call {
                namespace: "Text".to_string(),
                name: "Trim".to_string(),
                argc: 1,
            },
        ];
        assert_eq!(
            run_ops(&ops, &[], &NoLocations),
            Ok(Value::String("hi".to_string()))
        );

        let ops = vec![
            Op::PushStr("12.5".to_string()),
            Op::Call {
                namespace: "Convert".to_string(),
                name: "ToNumber".to_string(),
                argc: 1,
            },
        ];
        assert_eq!(run_ops(&ops, &[], &NoLocations), Ok(Value::F64(12.5)));

        let ops = vec![Op::Call {
            namespace: "Mail".to_string(),
            name: "Send".to_string(),
            argc: 0,
        }];
        assert_eq!(
            run_ops(&ops, &[], &NoLocations),
            Err(EvalError::MissingMember {
                name: "Mail.Send".to_string()
            })
        );
    }

    #[test]
    fn invalid_number_text_reports_the_text() {
        let ops = vec![
            Op::PushStr("pears".to_string()),
            Op::Call {
                namespace: "Convert".to_string(),
                name: "ToNumber".to_string(),
                argc: 1,
            },
        ];
        assert_eq!(
            run_ops(&ops, &[], &NoLocations),
            Err(EvalError::InvalidNumber {
                text: "pears".to_string()
            })
        );
    }

    #[test]
    fn parameters_load_by_position() {
        let ops = vec![Op::LoadParam(1), Op::LoadParam(0), Op::Sub];
        let params = vec![Value::I64(2), Value::I64(10)];
        assert_eq!(run_ops(&ops, &params, &NoLocations), Ok(Value::I64(8)));
    }
}
