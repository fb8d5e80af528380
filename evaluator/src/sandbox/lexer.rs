// Lexer for sandbox snippets.
//
// Uses the `logos` crate for DFA-based lexing. Whitespace (including
// newlines) and `//` line comments are insignificant.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters, out-of-range integers and bad string
//                escapes produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::source::Span;

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Snippet tokens. Identifiers carry no value; slice the source with the span.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|//[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("let")]
    Let,
    #[token("this")]
    This,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // ── Symbols ──
    #[token(";")]
    Semi,
    #[token("=")]
    Assign,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    // ── Literals ──
    //
    // Sign is not part of a literal: `-1` is unary minus applied to `1`.
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", parse_float)]
    Float(f64),

    #[regex(r"[0-9]+", parse_int)]
    Int(i64),

    /// String literal with `\"`, `\\`, `\n` and `\t` escapes.
    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    StringLit(String),

    // ── Identifier ──
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Let => write!(f, "let"),
            Token::This => write!(f, "this"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Semi => write!(f, ";"),
            Token::Assign => write!(f, "="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Bang => write!(f, "!"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Dot => write!(f, "."),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Float(v) => write!(f, "{v:?}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1]; // strip quotes
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                '"' => result.push('"'),
                '\\' => result.push('\\'),
                'n' => result.push('\n'),
                't' => result.push('\t'),
                _ => return None,
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

// ── Public API ──

/// Lex snippet text into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// the offending input.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span::new(range.start, range.end);
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected input: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords_vs_idents() {
        assert_eq!(
            lex_ok("let letter this thisx null"),
            vec![
                Token::Let,
                Token::Ident,
                Token::This,
                Token::Ident,
                Token::Null
            ]
        );
    }

    #[test]
    fn two_char_operators_win() {
        assert_eq!(
            lex_ok("a <= b == c != d >= e && f || !g = h"),
            vec![
                Token::Ident,
                Token::Le,
                Token::Ident,
                Token::EqEq,
                Token::Ident,
                Token::NotEq,
                Token::Ident,
                Token::Ge,
                Token::Ident,
                Token::AndAnd,
                Token::Ident,
                Token::OrOr,
                Token::Bang,
                Token::Ident,
                Token::Assign,
                Token::Ident,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            lex_ok("1 2.5 3.0e2 -4"),
            vec![
                Token::Int(1),
                Token::Float(2.5),
                Token::Float(300.0),
                Token::Minus,
                Token::Int(4)
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            lex_ok(r#""a\"b\\c\n""#),
            vec![Token::StringLit("a\"b\\c\n".into())]
        );
    }

    #[test]
    fn comments_and_newlines_skipped() {
        assert_eq!(
            lex_ok("let x = 1; // the answer\nx"),
            vec![
                Token::Let,
                Token::Ident,
                Token::Assign,
                Token::Int(1),
                Token::Semi,
                Token::Ident
            ]
        );
    }

    #[test]
    fn spans_are_byte_offsets() {
        let result = lex("ab + 12");
        let spans: Vec<Span> = result.tokens.iter().map(|(_, s)| *s).collect();
        assert_eq!(spans, vec![Span::new(0, 2), Span::new(3, 4), Span::new(5, 7)]);
    }

    #[test]
    fn errors_do_not_stop_lexing() {
        let result = lex("1 # 2");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span::new(2, 3));
        assert_eq!(result.tokens.len(), 2);
    }

    #[test]
    fn integer_overflow_is_a_lex_error() {
        let result = lex("99999999999999999999");
        assert_eq!(result.errors.len(), 1);
        assert!(result.tokens.is_empty());
    }

    #[test]
    fn unknown_escape_is_a_lex_error() {
        let result = lex(r#""\q""#);
        assert_eq!(result.errors.len(), 1);
    }
}
