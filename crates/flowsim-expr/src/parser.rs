//! Expression parser
//!
//! Recursive-descent parser built from nom combinators. One function per
//! grammar rule; precedence climbs from comparison down to primary.
//!
//! ```text
//! expr       := comparison
//! comparison := additive (("<=" | ">=" | "==" | "!=" | "<" | ">") additive)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := "-" unary | primary
//! primary    := number | array | call | ident | "(" expr ")"
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit0, digit1, multispace0, one_of},
    combinator::{all_consuming, cut, map, map_res, opt, recognize, value},
    error::{context, convert_error, VerboseError},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::{BinaryOp, Expr};
use crate::error::ExprError;

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

// ============================================================================
// Public API
// ============================================================================

/// Parse the formula of node `node_id`
pub fn parse_expression(node_id: &str, input: &str) -> Result<Expr, ExprError> {
    if input.trim().is_empty() {
        return Err(ExprError::Empty {
            node: node_id.to_string(),
        });
    }

    match all_consuming(ws(expression))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ExprError::Syntax {
            node: node_id.to_string(),
            message: convert_error(input, e).trim_end().to_string(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ExprError::Incomplete {
            node: node_id.to_string(),
        }),
    }
}

// ============================================================================
// Grammar rules
// ============================================================================

fn expression(input: &str) -> Res<'_, Expr> {
    comparison(input)
}

fn comparison(input: &str) -> Res<'_, Expr> {
    let (input, left) = additive(input)?;
    let (input, tail) = opt(pair(ws(comparison_op), cut(additive)))(input)?;
    let expr = match tail {
        Some((op, right)) => Expr::binary(op, left, right),
        None => left,
    };
    Ok((input, expr))
}

fn comparison_op(input: &str) -> Res<'_, BinaryOp> {
    alt((
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Lt, char('<')),
        value(BinaryOp::Gt, char('>')),
    ))(input)
}

fn additive(input: &str) -> Res<'_, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        ))),
        cut(term),
    ))(input)?;
    Ok((input, fold_left(first, rest)))
}

fn term(input: &str) -> Res<'_, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
        ))),
        cut(unary),
    ))(input)?;
    Ok((input, fold_left(first, rest)))
}

fn unary(input: &str) -> Res<'_, Expr> {
    alt((
        map(preceded(ws(char('-')), cut(unary)), negate),
        ws(primary),
    ))(input)
}

fn primary(input: &str) -> Res<'_, Expr> {
    alt((number, array_literal, call_or_ref, parenthesized))(input)
}

fn parenthesized(input: &str) -> Res<'_, Expr> {
    preceded(
        char('('),
        cut(terminated(
            ws(expression),
            context("closing parenthesis", char(')')),
        )),
    )(input)
}

fn array_literal(input: &str) -> Res<'_, Expr> {
    map(
        preceded(
            char('['),
            cut(terminated(
                separated_list0(char(','), ws(expression)),
                preceded(multispace0, context("closing bracket", char(']'))),
            )),
        ),
        Expr::ArrayLiteral,
    )(input)
}

/// Identifier followed by `(` is a call, otherwise a node reference
fn call_or_ref(input: &str) -> Res<'_, Expr> {
    let (after_name, name) = identifier(input)?;
    let (after_open, open) = opt(preceded(multispace0, char('(')))(after_name)?;
    if open.is_none() {
        return Ok((after_name, Expr::node_ref(name)));
    }

    let (rest, args) = cut(terminated(
        separated_list0(char(','), ws(expression)),
        preceded(multispace0, context("closing parenthesis", char(')'))),
    ))(after_open)?;
    Ok((rest, Expr::call(name, args)))
}

fn identifier(input: &str) -> Res<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn number(input: &str) -> Res<'_, Expr> {
    context(
        "number",
        map_res(
            recognize(tuple((
                alt((
                    recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                    recognize(pair(char('.'), digit1)),
                )),
                opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
            ))),
            |s: &str| s.parse::<f64>().map(Expr::Literal),
        ),
    )(input)
}

// ============================================================================
// Helpers
// ============================================================================

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> Res<'a, O>
where
    F: FnMut(&'a str) -> Res<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn fold_left(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |left, (op, right)| Expr::binary(op, left, right))
}

fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Literal(v) => Expr::Literal(-v),
        other => Expr::binary(BinaryOp::Mul, Expr::Literal(-1.0), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Expr {
        parse_expression("test", input).unwrap()
    }

    #[test]
    fn test_node_reference() {
        assert_eq!(parse("arrivals"), Expr::node_ref("arrivals"));
        assert_eq!(parse("  served_count  "), Expr::node_ref("served_count"));
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(parse("42"), Expr::Literal(42.0));
        assert_eq!(parse("0.9"), Expr::Literal(0.9));
        assert_eq!(parse(".5"), Expr::Literal(0.5));
        assert_eq!(parse("1e3"), Expr::Literal(1000.0));
        assert_eq!(parse("-2.5"), Expr::Literal(-2.5));
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a + b * 2");
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Add,
                Expr::node_ref("a"),
                Expr::binary(BinaryOp::Mul, Expr::node_ref("b"), Expr::Literal(2.0)),
            )
        );
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(parse("a - b - c").to_expr_string(), "a - b - c");
        assert_eq!(
            parse("a - b - c"),
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Sub, Expr::node_ref("a"), Expr::node_ref("b")),
                Expr::node_ref("c"),
            )
        );
    }

    #[test]
    fn test_parentheses_override_precedence() {
        assert_eq!(parse("(a + b) * c").to_expr_string(), "(a + b) * c");
    }

    #[test]
    fn test_function_call_with_nested_args() {
        let expr = parse("MIN(arrivals, capacity * 0.9)");
        assert_eq!(
            expr,
            Expr::call(
                "MIN",
                vec![
                    Expr::node_ref("arrivals"),
                    Expr::binary(BinaryOp::Mul, Expr::node_ref("capacity"), Expr::Literal(0.9)),
                ],
            )
        );
    }

    #[test]
    fn test_right_nested_calls() {
        let expr = parse("MAX(0, MIN(a, SHIFT(b, 1)))");
        assert_eq!(expr.to_expr_string(), "MAX(0, MIN(a, SHIFT(b, 1)))");
    }

    #[test]
    fn test_array_literal() {
        assert_eq!(
            parse("[1, 2, 3]"),
            Expr::ArrayLiteral(vec![
                Expr::Literal(1.0),
                Expr::Literal(2.0),
                Expr::Literal(3.0)
            ])
        );
        assert_eq!(parse("[ ]"), Expr::ArrayLiteral(vec![]));
    }

    #[test]
    fn test_comparison() {
        let expr = parse("queue >= 10");
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Ge, Expr::node_ref("queue"), Expr::Literal(10.0))
        );
        assert!(matches!(parse("a != b"), Expr::BinaryOp { op: BinaryOp::Ne, .. }));
    }

    #[test]
    fn test_unary_minus_on_reference() {
        assert_eq!(
            parse("-a"),
            Expr::binary(BinaryOp::Mul, Expr::Literal(-1.0), Expr::node_ref("a"))
        );
    }

    #[test]
    fn test_empty_expression() {
        let err = parse_expression("served", "   ").unwrap_err();
        assert_eq!(
            err,
            ExprError::Empty {
                node: "served".to_string()
            }
        );
    }

    #[test]
    fn test_syntax_errors_name_the_node() {
        for bad in ["MIN(a, b", "a +", "a b", "(a + b", "[1, 2", "3 $ 4"] {
            let err = parse_expression("served", bad).unwrap_err();
            assert_eq!(err.node(), "served", "input: {bad}");
            assert!(matches!(err, ExprError::Syntax { .. }), "input: {bad}");
        }
    }
}
