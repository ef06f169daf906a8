use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, none_of, satisfy},
    combinator::{map, map_opt, recognize, value},
    multi::fold_many0,
    sequence::{pair, preceded},
    IResult,
};
use std::net::IpAddr;

use super::error::{FilterError, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Dotted identifier path, e.g. `http.request.method`
    Ident(String),
    Str(String),
    Number(f64),
    Ip(IpAddr),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,
    Ne,
    Tilde,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Split an expression into tokens, ending with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut rest = source;

    loop {
        let skipped: IResult<&str, &str> = multispace0(rest);
        if let Ok((after, _)) = skipped {
            rest = after;
        }
        let start = source.len() - rest.len();
        if rest.is_empty() {
            break;
        }

        let (after, kind) = lex_token(source, rest, start)?;
        tokens.push(Token {
            kind,
            span: Span::new(start, source.len() - after.len()),
        });
        rest = after;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(source.len(), source.len()),
    });

    Ok(tokens)
}

fn lex_token<'a>(
    source: &str,
    input: &'a str,
    start: usize,
) -> Result<(&'a str, TokenKind), FilterError> {
    if let Ok(lexed) = alt((ipv6, punct, ident))(input) {
        return Ok(lexed);
    }
    if input.starts_with('"') {
        return lex_string(source, input, start);
    }
    if let Ok((rest, text)) = numeric(input) {
        let span = Span::new(start, start + text.len());
        return classify_numeric(text)
            .map(|kind| (rest, kind))
            .ok_or_else(|| FilterError::new("invalid number or IP address", source, span));
    }

    let width = input.chars().next().map(char::len_utf8).unwrap_or(1);
    Err(FilterError::new(
        "unexpected character",
        source,
        Span::new(start, start + width),
    ))
}

/// Operators and brackets. Two-character operators are tried first.
fn punct(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::Eq, tag("==")),
        value(TokenKind::Ne, tag("!=")),
        value(TokenKind::Le, tag("<=")),
        value(TokenKind::Ge, tag(">=")),
        value(TokenKind::AndAnd, tag("&&")),
        value(TokenKind::OrOr, tag("||")),
        value(TokenKind::Bang, char('!')),
        value(TokenKind::Lt, char('<')),
        value(TokenKind::Gt, char('>')),
        value(TokenKind::Tilde, char('~')),
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::LBracket, char('[')),
        value(TokenKind::RBracket, char(']')),
    ))(input)
}

fn ident(input: &str) -> IResult<&str, TokenKind> {
    map(
        recognize(pair(
            satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
        )),
        |name: &str| TokenKind::Ident(name.to_string()),
    )(input)
}

/// An IPv6 literal such as `::1` or `fe80::1`. Runs without a colon are
/// left to the identifier and number lexers.
fn ipv6(input: &str) -> IResult<&str, TokenKind> {
    map_opt(
        take_while1(|c: char| c.is_ascii_hexdigit() || c == ':' || c == '.'),
        |text: &str| {
            if !text.contains(':') {
                return None;
            }
            text.parse::<IpAddr>().ok().map(TokenKind::Ip)
        },
    )(input)
}

/// Digits, hex digits, dots and colons: a number or an IPv4/IPv6 literal.
fn numeric(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_digit() || c == '-'),
        take_while(|c: char| c.is_ascii_hexdigit() || c == '.' || c == ':'),
    ))(input)
}

fn classify_numeric(text: &str) -> Option<TokenKind> {
    if let Ok(n) = text.parse::<f64>() {
        return Some(TokenKind::Number(n));
    }
    text.parse::<IpAddr>().ok().map(TokenKind::Ip)
}

fn escape(input: &str) -> IResult<&str, char> {
    alt((
        value('"', char('"')),
        value('\\', char('\\')),
        value('\n', char('n')),
        value('\t', char('t')),
    ))(input)
}

/// Characters up to the closing quote, stopping early at a bad escape.
fn string_body(input: &str) -> IResult<&str, String> {
    fold_many0(
        alt((none_of("\\\""), preceded(char('\\'), escape))),
        String::new,
        |mut acc, c| {
            acc.push(c);
            acc
        },
    )(input)
}

fn lex_string<'a>(
    source: &str,
    input: &'a str,
    start: usize,
) -> Result<(&'a str, TokenKind), FilterError> {
    let unterminated =
        || FilterError::new("unterminated string", source, Span::new(start, source.len()));

    let (rest, text) = preceded(char('"'), string_body)(input).map_err(|_| unterminated())?;

    if let Some(after) = rest.strip_prefix('"') {
        return Ok((after, TokenKind::Str(text)));
    }
    match rest.strip_prefix('\\').and_then(|r| r.chars().next()) {
        Some(other) => {
            let at = source.len() - rest.len();
            Err(FilterError::new(
                format!("unknown escape sequence `\\{}`", other),
                source,
                Span::new(at, at + 1 + other.len_utf8()),
            ))
        }
        None => Err(unterminated()),
    }
}
