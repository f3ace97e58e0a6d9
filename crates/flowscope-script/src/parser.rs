//! Dialect-aware expression and unit-source parsers.
//!
//! Both surface dialects share one grammar shape and one AST; only the
//! operator spellings and keyword casing differ:
//!
//! ```text
//! <expr>    := <and> (or-op <and>)*
//! <and>     := <eq> (and-op <eq>)*
//! <eq>      := <cmp> (eq-op <cmp>)*
//! <cmp>     := <add> (cmp-op <add>)*
//! <add>     := <mul> (add-op <mul>)*
//! <mul>     := <unary> (mul-op <unary>)*
//! <unary>   := not-op <unary> | "-" <unary> | <primary>
//! <primary> := literal | "(" <expr> ")" | name ["." name] ["(" args ")"]
//! ```
//!
//! Unit source for ahead-of-time compilation wraps expressions in
//! declarations:
//!
//! ```text
//! unit <Name> { member <name>(<param>: <type>, ...): <type> = <expr>; ... }
//! ```
//!
//! Parse failures surface as a single syntax diagnostic with a best-effort
//! line computed from how far the parser got.

use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, not, opt, preceded};
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};
use winnow::ModalResult;

use flowscope_core::DataType;

use crate::ast::{BinaryOp, Expr, Literal, MemberDecl, UnaryOp, UnitDecl};
use crate::diagnostics::{codes, Diagnostic};
use crate::frontend::Dialect;

// ============================================================================
// Entry Points
// ============================================================================

/// Parse a single expression, requiring the whole input to be consumed.
pub(crate) fn parse_expression_source(source: &str, dialect: Dialect) -> Result<Expr, Diagnostic> {
    let mut input = source;
    match parse_complete_expr(&mut input, dialect) {
        Ok(expr) => Ok(expr),
        Err(_) => Err(syntax_diagnostic(source, input)),
    }
}

/// Parse ahead-of-time unit source into unit declarations.
pub(crate) fn parse_unit_source(
    source: &str,
    dialect: Dialect,
) -> Result<Vec<UnitDecl>, Diagnostic> {
    let mut input = source;
    match parse_units(&mut input, source, dialect) {
        Ok(units) => Ok(units),
        Err(_) => Err(syntax_diagnostic(source, input)),
    }
}

fn parse_complete_expr(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    let expr = parse_expr(input, dialect)?;
    ws(input)?;
    if !input.is_empty() {
        return Err(ErrMode::from_input(input));
    }
    Ok(expr)
}

fn syntax_diagnostic(source: &str, rest: &str) -> Diagnostic {
    let snippet: String = rest.chars().take(24).collect();
    let message = if snippet.trim().is_empty() {
        "unexpected end of input".to_string()
    } else {
        format!("unexpected input near '{}'", snippet.trim())
    };
    Diagnostic::error(codes::SYNTAX, message).with_line(line_of(source, rest))
}

/// 1-indexed line of the position where `rest` begins inside `source`.
fn line_of(source: &str, rest: &str) -> u32 {
    let consumed = source.len().saturating_sub(rest.len());
    source[..consumed].matches('\n').count() as u32 + 1
}

// ============================================================================
// Expression levels
// ============================================================================

fn parse_expr(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    let mut lhs = parse_and_level(input, dialect)?;
    while opt(preceded(ws, |i: &mut &str| or_op(i, dialect)))
        .parse_next(input)?
        .is_some()
    {
        let rhs = parse_and_level(input, dialect)?;
        lhs = binary(BinaryOp::Or, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_and_level(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    let mut lhs = parse_equality_level(input, dialect)?;
    while opt(preceded(ws, |i: &mut &str| and_op(i, dialect)))
        .parse_next(input)?
        .is_some()
    {
        let rhs = parse_equality_level(input, dialect)?;
        lhs = binary(BinaryOp::And, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_equality_level(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    let mut lhs = parse_comparison_level(input, dialect)?;
    while let Some(op) = opt(preceded(ws, |i: &mut &str| equality_op(i, dialect)))
        .parse_next(input)?
    {
        let rhs = parse_comparison_level(input, dialect)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_comparison_level(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    let mut lhs = parse_additive_level(input, dialect)?;
    while let Some(op) = opt(preceded(ws, comparison_op)).parse_next(input)? {
        let rhs = parse_additive_level(input, dialect)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_additive_level(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    let mut lhs = parse_multiplicative_level(input, dialect)?;
    while let Some(op) = opt(preceded(ws, |i: &mut &str| additive_op(i, dialect)))
        .parse_next(input)?
    {
        let rhs = parse_multiplicative_level(input, dialect)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_multiplicative_level(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    let mut lhs = parse_unary_level(input, dialect)?;
    while let Some(op) = opt(preceded(ws, |i: &mut &str| multiplicative_op(i, dialect)))
        .parse_next(input)?
    {
        let rhs = parse_unary_level(input, dialect)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_unary_level(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    ws(input)?;
    if opt(|i: &mut &str| not_op(i, dialect)).parse_next(input)?.is_some() {
        let operand = parse_unary_level(input, dialect)?;
        return Ok(Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        });
    }
    if opt("-").parse_next(input)?.is_some() {
        let operand = parse_unary_level(input, dialect)?;
        return Ok(Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        });
    }
    parse_primary(input, dialect)
}

fn parse_primary(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    ws(input)?;
    alt((
        |i: &mut &str| parse_paren(i, dialect),
        string_literal.map(|s| Expr::Literal(Literal::Str(s))),
        number_literal.map(Expr::Literal),
        |i: &mut &str| bool_literal(i, dialect),
        |i: &mut &str| call_or_identifier(i, dialect),
    ))
    .parse_next(input)
}

fn parse_paren(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    let _ = '('.parse_next(input)?;
    let expr = parse_expr(input, dialect)?;
    ws(input)?;
    let _ = ')'.parse_next(input)?;
    Ok(expr)
}

fn call_or_identifier(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    let first = identifier.parse_next(input)?.to_string();
    // Operator keywords never stand as identifiers in the basic dialect.
    if dialect == Dialect::BasicLike && matches!(first.as_str(), "And" | "Or" | "Not" | "Mod") {
        return Err(ErrMode::from_input(input));
    }
    let member: Option<&str> = opt(preceded('.', identifier)).parse_next(input)?;
    match member {
        Some(name) => {
            let name = name.to_string();
            let args = parse_call_args(input, dialect)?;
            Ok(Expr::Call {
                namespace: Some(first),
                name,
                args,
            })
        }
        None => match opt(|i: &mut &str| parse_call_args(i, dialect)).parse_next(input)? {
            Some(args) => Ok(Expr::Call {
                namespace: None,
                name: first,
                args,
            }),
            None => Ok(Expr::Identifier(first)),
        },
    }
}

fn parse_call_args(input: &mut &str, dialect: Dialect) -> ModalResult<Vec<Expr>> {
    let _ = '('.parse_next(input)?;
    ws(input)?;
    if opt(')').parse_next(input)?.is_some() {
        return Ok(Vec::new());
    }
    let mut args = vec![parse_expr(input, dialect)?];
    loop {
        ws(input)?;
        if opt(',').parse_next(input)?.is_some() {
            args.push(parse_expr(input, dialect)?);
            continue;
        }
        let _ = ')'.parse_next(input)?;
        return Ok(args);
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

// ============================================================================
// Operators and tokens
// ============================================================================

fn or_op(input: &mut &str, dialect: Dialect) -> ModalResult<()> {
    match dialect {
        Dialect::CLike => "||".void().parse_next(input),
        Dialect::BasicLike => word(input, "Or"),
    }
}

fn and_op(input: &mut &str, dialect: Dialect) -> ModalResult<()> {
    match dialect {
        Dialect::CLike => "&&".void().parse_next(input),
        Dialect::BasicLike => word(input, "And"),
    }
}

fn not_op(input: &mut &str, dialect: Dialect) -> ModalResult<()> {
    match dialect {
        // `!` alone; `!=` belongs to the equality level.
        Dialect::CLike => ("!", not("=")).void().parse_next(input),
        Dialect::BasicLike => word(input, "Not"),
    }
}

fn equality_op(input: &mut &str, dialect: Dialect) -> ModalResult<BinaryOp> {
    match dialect {
        Dialect::CLike => alt(("==".value(BinaryOp::Eq), "!=".value(BinaryOp::Ne)))
            .parse_next(input),
        Dialect::BasicLike => alt(("<>".value(BinaryOp::Ne), "=".value(BinaryOp::Eq)))
            .parse_next(input),
    }
}

fn comparison_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt((
        "<=".value(BinaryOp::Le),
        ">=".value(BinaryOp::Ge),
        ("<", not(">")).value(BinaryOp::Lt),
        ">".value(BinaryOp::Gt),
    ))
    .parse_next(input)
}

fn additive_op(input: &mut &str, dialect: Dialect) -> ModalResult<BinaryOp> {
    match dialect {
        Dialect::CLike => {
            alt(("+".value(BinaryOp::Add), "-".value(BinaryOp::Sub))).parse_next(input)
        }
        Dialect::BasicLike => alt((
            "+".value(BinaryOp::Add),
            "-".value(BinaryOp::Sub),
            "&".value(BinaryOp::Concat),
        ))
        .parse_next(input),
    }
}

fn multiplicative_op(input: &mut &str, dialect: Dialect) -> ModalResult<BinaryOp> {
    match dialect {
        Dialect::CLike => alt((
            "*".value(BinaryOp::Mul),
            "/".value(BinaryOp::Div),
            "%".value(BinaryOp::Rem),
        ))
        .parse_next(input),
        Dialect::BasicLike => alt((
            "*".value(BinaryOp::Mul),
            "/".value(BinaryOp::Div),
            |i: &mut &str| word(i, "Mod").map(|()| BinaryOp::Rem),
        ))
        .parse_next(input),
    }
}

fn bool_literal(input: &mut &str, dialect: Dialect) -> ModalResult<Expr> {
    let (true_kw, false_kw) = match dialect {
        Dialect::CLike => ("true", "false"),
        Dialect::BasicLike => ("True", "False"),
    };
    alt((
        |i: &mut &str| word(i, true_kw).map(|()| Expr::Literal(Literal::Bool(true))),
        |i: &mut &str| word(i, false_kw).map(|()| Expr::Literal(Literal::Bool(false))),
    ))
    .parse_next(input)
}

/// Match a keyword followed by a word boundary.
fn word(input: &mut &str, mut keyword: &'static str) -> ModalResult<()> {
    let _ = keyword.parse_next(input)?;
    not(one_of(|c: char| c.is_ascii_alphanumeric() || c == '_')).parse_next(input)?;
    Ok(())
}

fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn string_literal(input: &mut &str) -> ModalResult<String> {
    let _ = '"'.parse_next(input)?;
    let mut out = String::new();
    loop {
        let c = any.parse_next(input)?;
        match c {
            '"' => return Ok(out),
            '\\' => {
                let escaped = any.parse_next(input)?;
                match escaped {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    _ => return Err(ErrMode::from_input(input)),
                }
            }
            other => out.push(other),
        }
    }
}

fn number_literal(input: &mut &str) -> ModalResult<Literal> {
    let whole: &str = digit1.parse_next(input)?;
    let fraction: Option<(char, &str)> = opt(('.', digit1)).parse_next(input)?;
    match fraction {
        Some((_, fraction_digits)) => {
            let text = format!("{whole}.{fraction_digits}");
            let value = text.parse::<f64>().map_err(|_| ErrMode::from_input(input))?;
            Ok(Literal::F64(value))
        }
        None => {
            let value = whole.parse::<i64>().map_err(|_| ErrMode::from_input(input))?;
            Ok(Literal::I64(value))
        }
    }
}

fn ws(input: &mut &str) -> ModalResult<()> {
    multispace0.void().parse_next(input)
}

// ============================================================================
// Unit source
// ============================================================================

fn parse_units(input: &mut &str, source: &str, dialect: Dialect) -> ModalResult<Vec<UnitDecl>> {
    let mut units = Vec::new();
    loop {
        ws(input)?;
        if input.is_empty() {
            break;
        }
        units.push(parse_unit_decl(input, source, dialect)?);
    }
    if units.is_empty() {
        return Err(ErrMode::from_input(input));
    }
    Ok(units)
}

fn parse_unit_decl(input: &mut &str, source: &str, dialect: Dialect) -> ModalResult<UnitDecl> {
    let line = line_of(source, input);
    word(input, "unit")?;
    ws(input)?;
    let name = identifier.parse_next(input)?.to_string();
    ws(input)?;
    let _ = '{'.parse_next(input)?;
    let mut members = Vec::new();
    loop {
        ws(input)?;
        if opt('}').parse_next(input)?.is_some() {
            break;
        }
        members.push(parse_member_decl(input, source, dialect)?);
    }
    Ok(UnitDecl {
        name,
        line,
        members,
    })
}

fn parse_member_decl(input: &mut &str, source: &str, dialect: Dialect) -> ModalResult<MemberDecl> {
    let line = line_of(source, input);
    word(input, "member")?;
    ws(input)?;
    let name = identifier.parse_next(input)?.to_string();
    ws(input)?;
    let _ = '('.parse_next(input)?;
    let mut params = Vec::new();
    ws(input)?;
    if opt(')').parse_next(input)?.is_none() {
        loop {
            params.push(parse_param(input)?);
            ws(input)?;
            if opt(',').parse_next(input)?.is_some() {
                continue;
            }
            let _ = ')'.parse_next(input)?;
            break;
        }
    }
    ws(input)?;
    let _ = ':'.parse_next(input)?;
    ws(input)?;
    let return_type = type_name(input)?;
    ws(input)?;
    let _ = '='.parse_next(input)?;
    let body = parse_expr(input, dialect)?;
    ws(input)?;
    let _ = ';'.parse_next(input)?;
    Ok(MemberDecl {
        name,
        line,
        params,
        return_type,
        body,
    })
}

fn parse_param(input: &mut &str) -> ModalResult<(String, DataType)> {
    ws(input)?;
    let name = identifier.parse_next(input)?.to_string();
    ws(input)?;
    let _ = ':'.parse_next(input)?;
    ws(input)?;
    let ty = type_name(input)?;
    Ok((name, ty))
}

fn type_name(input: &mut &str) -> ModalResult<DataType> {
    let name = identifier.parse_next(input)?;
    match name {
        "string" => Ok(DataType::String),
        "i64" => Ok(DataType::I64),
        "f64" => Ok(DataType::F64),
        "bool" => Ok(DataType::Bool),
        _ => Err(ErrMode::from_input(input)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn clike(source: &str) -> Expr {
        parse_expression_source(source, Dialect::CLike).unwrap()
    }

    fn basic(source: &str) -> Expr {
        parse_expression_source(source, Dialect::BasicLike).unwrap()
    }

    mod literals {
        use super::*;

        #[test]
        fn numbers_split_into_int_and_float() {
            assert_eq!(clike("42"), Expr::Literal(Literal::I64(42)));
            assert_eq!(clike("4.5"), Expr::Literal(Literal::F64(4.5)));
        }

        #[test]
        fn strings_handle_escapes() {
            assert_eq!(
                clike(r#""a\"b\n""#),
                Expr::Literal(Literal::Str("a\"b\n".to_string()))
            );
        }

        #[test]
        fn booleans_follow_dialect_casing() {
            assert_eq!(clike("true"), Expr::Literal(Literal::Bool(true)));
            assert_eq!(basic("True"), Expr::Literal(Literal::Bool(true)));
            // Lowercase `true` is just an identifier in the basic dialect.
            assert_eq!(basic("true"), Expr::Identifier("true".to_string()));
        }
    }

    mod precedence {
        use super::*;

        #[test]
        fn multiplication_binds_tighter_than_addition() {
            let expr = clike("1 + 2 * 3");
            let Expr::Binary { op: BinaryOp::Add, rhs, .. } = expr else {
                panic!("expected addition at the root");
            };
            assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
        }

        #[test]
        fn parentheses_override_precedence() {
            let expr = clike("(1 + 2) * 3");
            assert!(matches!(expr, Expr::Binary { op: BinaryOp::Mul, .. }));
        }

        #[test]
        fn comparison_feeds_logical_operators() {
            let expr = clike("a < 3 && b >= 4 || !done");
            assert!(matches!(expr, Expr::Binary { op: BinaryOp::Or, .. }));

            let expr = basic("a < 3 And b >= 4 Or Not done");
            assert!(matches!(expr, Expr::Binary { op: BinaryOp::Or, .. }));
        }

        #[test]
        fn basic_dialect_operators_map_to_shared_ast() {
            assert_eq!(basic("a <> b"), clike("a != b"));
            assert_eq!(basic("a = b"), clike("a == b"));
            assert_eq!(basic("7 Mod 2"), clike("7 % 2"));
            assert_eq!(basic(r#"x & "!""#), {
                Expr::Binary {
                    op: BinaryOp::Concat,
                    lhs: Box::new(Expr::Identifier("x".to_string())),
                    rhs: Box::new(Expr::Literal(Literal::Str("!".to_string()))),
                }
            });
        }

        #[test]
        fn keywords_require_word_boundaries() {
            // `Nothing` starts with `Not` but is a plain identifier.
            assert_eq!(basic("Nothing"), Expr::Identifier("Nothing".to_string()));
            let expr = basic("Andrew And Orwell");
            assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
        }
    }

    mod calls {
        use super::*;

        #[test]
        fn qualified_and_unqualified_calls() {
            assert_eq!(
                clike("Text.Len(name)"),
                Expr::Call {
                    namespace: Some("Text".to_string()),
                    name: "Len".to_string(),
                    args: vec![Expr::Identifier("name".to_string())],
                }
            );
            assert_eq!(
                clike("Len(name)"),
                Expr::Call {
                    namespace: None,
                    name: "Len".to_string(),
                    args: vec![Expr::Identifier("name".to_string())],
                }
            );
        }

        #[test]
        fn call_arguments_are_full_expressions() {
            let expr = clike("Math.Max(a + 1, Math.Abs(b))");
            let Expr::Call { args, .. } = expr else {
                panic!("expected a call");
            };
            assert_eq!(args.len(), 2);
            assert!(matches!(args[0], Expr::Binary { op: BinaryOp::Add, .. }));
            assert!(matches!(args[1], Expr::Call { .. }));
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn trailing_input_is_a_syntax_error() {
            let err = parse_expression_source("1 + 2 extra", Dialect::CLike).unwrap_err();
            assert_eq!(err.code, codes::SYNTAX);
            assert!(!err.is_warning);
        }

        #[test]
        fn dangling_operator_is_a_syntax_error() {
            let err = parse_expression_source("1 +", Dialect::CLike).unwrap_err();
            assert_eq!(err.code, codes::SYNTAX);
        }

        #[test]
        fn clike_operators_fail_in_basic_dialect() {
            assert!(parse_expression_source("a && b", Dialect::BasicLike).is_err());
            assert!(parse_expression_source("a And b", Dialect::CLike).is_err());
        }
    }

    mod unit_source {
        use super::*;

        const PAYROLL: &str = "unit Payroll {\n    member total(rate: f64, hours: f64): f64 = rate * hours;\n    member caption(name: string): string = \"pay for \" + name;\n}\n";

        #[test]
        fn unit_members_carry_lines_and_signatures() {
            let units = parse_unit_source(PAYROLL, Dialect::CLike).unwrap();
            assert_eq!(units.len(), 1);
            assert_eq!(units[0].name, "Payroll");
            assert_eq!(units[0].line, 1);

            let total = &units[0].members[0];
            assert_eq!(total.name, "total");
            assert_eq!(total.line, 2);
            assert_eq!(
                total.params,
                vec![
                    ("rate".to_string(), DataType::F64),
                    ("hours".to_string(), DataType::F64),
                ]
            );
            assert_eq!(total.return_type, DataType::F64);

            assert_eq!(units[0].members[1].line, 3);
        }

        #[test]
        fn missing_semicolon_reports_the_offending_line() {
            let source = "unit Broken {\n    member a(): i64 = 1\n}\n";
            let err = parse_unit_source(source, Dialect::CLike).unwrap_err();
            assert_eq!(err.code, codes::SYNTAX);
            assert!(err.source_line.is_some());
        }

        #[test]
        fn empty_source_is_rejected() {
            assert!(parse_unit_source("   \n", Dialect::CLike).is_err());
        }
    }
}
