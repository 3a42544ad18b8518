//! The lexer: source text to a stream of [`Token`]s.
//!
//! Tokenization rules:
//! - Whitespace separates tokens and is discarded.
//! - `(` `)` `{` `}` `'` are single-character tokens.
//! - A double-quoted run yields a string token whose literal is the interior
//!   text, taken verbatim (no escape processing).
//! - A run starting with a digit and containing digits and `.` yields a
//!   number token. Malformed runs like `1.2.3` are still lexed as numbers;
//!   the parser rejects them when converting to `f64`.
//! - Any other non-delimiter run is an identifier. Operator characters
//!   (`+`, `-`, `*`, `/`, `<`, `>`, `=`, `!`) are ordinary identifier
//!   characters.
//! - An unclosed string yields an Illegal token carrying a diagnostic.
//!
//! The returned stream always ends with a single Eof token.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0, one_of},
    combinator::recognize,
    sequence::preceded,
};

use crate::token::{Token, TokenKind};

/// Characters that terminate an identifier or number run.
const DELIMITERS: &str = "(){}'\"";

fn lex_delimiter(input: &str) -> IResult<&str, Token> {
    let (rest, c) = one_of("(){}'").parse(input)?;
    let kind = match c {
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '{' => TokenKind::LBrace,
        '}' => TokenKind::RBrace,
        _ => TokenKind::Quote,
    };
    Ok((rest, Token::new(kind, c.to_string())))
}

fn lex_string(input: &str) -> IResult<&str, Token> {
    let (rest, _) = char('"').parse(input)?;
    let (rest, body) = take_while(|c: char| c != '"').parse(rest)?;

    match char::<_, nom::error::Error<&str>>('"').parse(rest) {
        Ok((rest, _)) => Ok((rest, Token::new(TokenKind::Str, body))),
        // Reached end of input before the closing quote. Consume the rest of
        // the source so lexing terminates, and report the dangling text.
        Err(_) => Ok((
            "",
            Token::new(TokenKind::Illegal, format!("unterminated string: \"{body}")),
        )),
    }
}

fn lex_number(input: &str) -> IResult<&str, Token> {
    let (rest, literal) = recognize((
        take_while1(|c: char| c.is_ascii_digit()),
        take_while(|c: char| c.is_ascii_digit() || c == '.'),
    ))
    .parse(input)?;

    Ok((rest, Token::new(TokenKind::Num, literal)))
}

fn lex_ident(input: &str) -> IResult<&str, Token> {
    let (rest, literal) =
        take_while1(|c: char| !c.is_whitespace() && !DELIMITERS.contains(c)).parse(input)?;

    Ok((rest, Token::new(TokenKind::Ident, literal)))
}

fn next_token(input: &str) -> IResult<&str, Token> {
    preceded(
        multispace0,
        alt((lex_delimiter, lex_string, lex_number, lex_ident)),
    )
    .parse(input)
}

/// Tokenize the entire source. Never fails: unlexable regions become
/// Illegal tokens and the stream always ends with Eof.
pub fn lex(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut input = source;

    while !input.trim_start().is_empty() {
        match next_token(input) {
            Ok((rest, token)) => {
                tokens.push(token);
                input = rest;
            }
            Err(_) => {
                // Every non-whitespace character starts one of the token
                // parsers, so this arm only guards against future rule edits.
                let trimmed = input.trim_start();
                let offending = trimmed.chars().next().unwrap_or('?');
                tokens.push(Token::new(
                    TokenKind::Illegal,
                    format!("unexpected character: {offending}"),
                ));
                input = &trimmed[offending.len_utf8()..];
            }
        }
    }

    tokens.push(Token::new(TokenKind::Eof, ""));
    tokens
}
