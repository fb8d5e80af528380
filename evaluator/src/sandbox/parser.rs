// Parser for sandbox snippets.
//
// Parses a token stream (from the lexer) into a `Snippet` using chumsky
// combinators. Binary operators are left associative; precedence from
// loosest to tightest: `||`, `&&`, `== !=`, `< <= > >=`, `+ -`, `* / %`,
// unary `- !`, field access.
//
// Preconditions: none.
// Postconditions: returns a snippet (if parsing succeeded) plus lex and parse
//                 errors.
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use super::ast::*;
use super::lexer::Token;
use crate::source::Span;

/// Result of parsing: snippet plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub snippet: Option<Snippet>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse snippet text. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = super::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = snippet_parser(source);
    let (snippet, parse_errors) = parser.parse(stream).into_output_errors();

    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        snippet,
        errors: all_errors,
    }
}

pub(crate) fn to_span(span: SimpleSpan) -> Span {
    Span::new(span.start, span.end)
}

fn binary(lhs: Expr, (op, rhs): (BinOp, Expr)) -> Expr {
    let span = lhs.span.merge(rhs.span);
    Expr::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), span)
}

// ── Parser builder ──

fn snippet_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Snippet, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start..span.end].to_string(),
            span: to_span(span),
        }
    });

    let expr = recursive(|expr| {
        let literal = select! {
            Token::Int(n) => Literal::Int(n),
            Token::Float(x) => Literal::Float(x),
            Token::StringLit(s) => Literal::Str(s),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
        }
        .map_with(|lit, e| Expr::new(ExprKind::Literal(lit), to_span(e.span())));

        let this = just(Token::This).map_with(|_, e| Expr::new(ExprKind::This, to_span(e.span())));

        let name = ident.clone().map(|id: Ident| {
            let span = id.span;
            Expr::new(ExprKind::Name(id), span)
        });

        let parens = expr.delimited_by(just(Token::LParen), just(Token::RParen));

        let atom = choice((literal, this, name, parens));

        // ── Field access ──

        let access = atom.foldl(
            just(Token::Dot).ignore_then(ident.clone()).repeated(),
            |object: Expr, field: Ident| {
                let span = object.span.merge(field.span);
                Expr::new(ExprKind::Field(Box::new(object), field), span)
            },
        );

        // ── Unary ──

        let unary = choice((
            just(Token::Minus).to(UnOp::Neg),
            just(Token::Bang).to(UnOp::Not),
        ))
        .map_with(|op, e| (op, to_span(e.span())))
        .repeated()
        .foldr(access, |(op, span): (UnOp, Span), operand: Expr| {
            let span = span.merge(operand.span);
            Expr::new(ExprKind::Unary(op, Box::new(operand)), span)
        });

        // ── Binary levels ──

        let product = unary.clone().foldl(
            choice((
                just(Token::Star).to(BinOp::Mul),
                just(Token::Slash).to(BinOp::Div),
                just(Token::Percent).to(BinOp::Rem),
            ))
            .then(unary)
            .repeated(),
            binary,
        );

        let sum = product.clone().foldl(
            choice((
                just(Token::Plus).to(BinOp::Add),
                just(Token::Minus).to(BinOp::Sub),
            ))
            .then(product)
            .repeated(),
            binary,
        );

        let comparison = sum.clone().foldl(
            choice((
                just(Token::Le).to(BinOp::Le),
                just(Token::Lt).to(BinOp::Lt),
                just(Token::Ge).to(BinOp::Ge),
                just(Token::Gt).to(BinOp::Gt),
            ))
            .then(sum)
            .repeated(),
            binary,
        );

        let equality = comparison.clone().foldl(
            choice((
                just(Token::EqEq).to(BinOp::Eq),
                just(Token::NotEq).to(BinOp::Ne),
            ))
            .then(comparison)
            .repeated(),
            binary,
        );

        let conjunction = equality.clone().foldl(
            just(Token::AndAnd).to(BinOp::And).then(equality).repeated(),
            binary,
        );

        conjunction.clone().foldl(
            just(Token::OrOr).to(BinOp::Or).then(conjunction).repeated(),
            binary,
        )
    });

    // ── Let bindings ──

    let let_binding = just(Token::Let)
        .ignore_then(ident)
        .then_ignore(just(Token::Assign))
        .then(expr.clone())
        .then_ignore(just(Token::Semi))
        .map_with(|(name, value), e| LetBinding {
            name,
            value,
            span: to_span(e.span()),
        });

    // ── Snippet ──

    let_binding
        .repeated()
        .collect::<Vec<_>>()
        .then(expr.or_not())
        .map_with(|(lets, result), e| Snippet {
            lets,
            result,
            span: to_span(e.span()),
        })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Snippet {
        let result = parse(source);
        assert!(
            result.errors.is_empty(),
            "unexpected errors: {:#?}",
            result.errors
        );
        result.snippet.expect("expected snippet")
    }

    fn result_expr(source: &str) -> Expr {
        parse_ok(source).result.expect("expected trailing expression")
    }

    fn int(expr: &Expr) -> i64 {
        match &expr.kind {
            ExprKind::Literal(Literal::Int(n)) => *n,
            other => panic!("expected int literal, got {other:?}"),
        }
    }

    #[test]
    fn empty_snippet() {
        let snippet = parse_ok("");
        assert!(snippet.lets.is_empty());
        assert!(snippet.result.is_none());
    }

    #[test]
    fn literals() {
        assert_eq!(
            result_expr("null").kind,
            ExprKind::Literal(Literal::Null)
        );
        assert_eq!(
            result_expr("true").kind,
            ExprKind::Literal(Literal::Bool(true))
        );
        assert_eq!(
            result_expr("2.5").kind,
            ExprKind::Literal(Literal::Float(2.5))
        );
        assert_eq!(
            result_expr(r#""hi""#).kind,
            ExprKind::Literal(Literal::Str("hi".into()))
        );
    }

    #[test]
    fn product_binds_tighter_than_sum() {
        let expr = result_expr("1 + 2 * 3");
        match expr.kind {
            ExprKind::Binary(BinOp::Add, lhs, rhs) => {
                assert_eq!(int(&lhs), 1);
                assert!(matches!(rhs.kind, ExprKind::Binary(BinOp::Mul, _, _)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn subtraction_is_left_associative() {
        let expr = result_expr("10 - 4 - 3");
        match expr.kind {
            ExprKind::Binary(BinOp::Sub, lhs, rhs) => {
                assert!(matches!(lhs.kind, ExprKind::Binary(BinOp::Sub, _, _)));
                assert_eq!(int(&rhs), 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn logical_precedence() {
        let expr = result_expr("a || b && c == d");
        match expr.kind {
            ExprKind::Binary(BinOp::Or, _, rhs) => match rhs.kind {
                ExprKind::Binary(BinOp::And, _, inner) => {
                    assert!(matches!(inner.kind, ExprKind::Binary(BinOp::Eq, _, _)))
                }
                other => panic!("unexpected: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = result_expr("(1 + 2) * 3");
        assert!(matches!(expr.kind, ExprKind::Binary(BinOp::Mul, _, _)));
    }

    #[test]
    fn unary_nests() {
        let expr = result_expr("!-x");
        match expr.kind {
            ExprKind::Unary(UnOp::Not, inner) => {
                assert!(matches!(inner.kind, ExprKind::Unary(UnOp::Neg, _)))
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(result_expr("!-x").span, Span::new(0, 3));
    }

    #[test]
    fn field_chain() {
        let expr = result_expr("this.owner.name");
        assert_eq!(expr.span, Span::new(0, 15));
        match expr.kind {
            ExprKind::Field(object, field) => {
                assert_eq!(field.name, "name");
                match object.kind {
                    ExprKind::Field(inner, owner) => {
                        assert_eq!(owner.name, "owner");
                        assert_eq!(inner.kind, ExprKind::This);
                    }
                    other => panic!("unexpected: {other:?}"),
                }
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn let_bindings_then_result() {
        let snippet = parse_ok("let a = 1; let b = a + 1; a * b");
        assert_eq!(snippet.lets.len(), 2);
        assert_eq!(snippet.lets[1].name.name, "b");
        assert_eq!(snippet.lets[0].span, Span::new(0, 10));
        assert!(snippet.result.is_some());
    }

    #[test]
    fn lets_without_result() {
        let snippet = parse_ok("let a = 1;");
        assert_eq!(snippet.lets.len(), 1);
        assert!(snippet.result.is_none());
    }

    #[test]
    fn identifier_spans_slice_source() {
        let expr = result_expr("  count");
        match expr.kind {
            ExprKind::Name(id) => {
                assert_eq!(id.name, "count");
                assert_eq!(id.span, Span::new(2, 7));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn dangling_operator_is_an_error() {
        let result = parse("1 +");
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn missing_semicolon_is_an_error() {
        assert!(!parse("let a = 1 a").errors.is_empty());
    }

    #[test]
    fn lex_errors_are_reported() {
        let result = parse("1 # 2");
        assert!(!result.errors.is_empty());
        assert_eq!(result.errors[0].span().start, 2);
    }
}
