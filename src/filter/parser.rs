use regex::Regex;
use std::fmt;
use std::net::IpAddr;

use super::error::{FilterError, Span};
use super::lexer::{tokenize, Token, TokenKind};

/// Value type of a field, function result or literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Str,
    Num,
    Ip,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Bool => "boolean",
            Kind::Str => "string",
            Kind::Num => "number",
            Kind::Ip => "IP address",
        })
    }
}

/// Every field the filter language knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    IpSrc,
    Host,
    Method,
    Protocol,
    Path,
    Query,
    Args,
    Headers,
    Cookie,
    Local,
    Vpn,
    Proxy,
    Tor,
    Hosting,
    Relay,
    Country,
    Region,
    City,
    Continent,
    Asnum,
    AsnumName,
    AsnumType,
    AsnumDomain,
    AsnumCountry,
}

impl Field {
    pub fn lookup(name: &str) -> Option<Self> {
        let field = match name {
            "ip.src" => Field::IpSrc,
            "http.host" => Field::Host,
            "http.request.method" => Field::Method,
            "http.request.protocol" => Field::Protocol,
            "http.request.uri.path" => Field::Path,
            "http.request.uri.query" => Field::Query,
            "http.request.uri.args" => Field::Args,
            "http.request.headers" => Field::Headers,
            "http.request.cookie" => Field::Cookie,
            "local" => Field::Local,
            "ip.src.vpn" => Field::Vpn,
            "ip.src.proxy" => Field::Proxy,
            "ip.src.tor" => Field::Tor,
            "ip.src.hosting" => Field::Hosting,
            "ip.src.relay" => Field::Relay,
            "ip.src.country" => Field::Country,
            "ip.src.region" => Field::Region,
            "ip.src.city" => Field::City,
            "ip.src.continent" => Field::Continent,
            "ip.src.asnum" => Field::Asnum,
            "ip.src.asnum.name" => Field::AsnumName,
            "ip.src.asnum.type" => Field::AsnumType,
            "ip.src.asnum.domain" => Field::AsnumDomain,
            "ip.src.asnum.country" => Field::AsnumCountry,
            _ => return None,
        };
        Some(field)
    }

    pub fn kind(&self) -> Kind {
        match self {
            Field::IpSrc => Kind::Ip,
            Field::Vpn | Field::Proxy | Field::Tor | Field::Hosting | Field::Relay => Kind::Bool,
            Field::Asnum => Kind::Num,
            _ => Kind::Str,
        }
    }

    /// Map fields must be indexed with a string key.
    pub fn is_map(&self) -> bool {
        matches!(self, Field::Args | Field::Headers | Field::Cookie | Field::Local)
    }
}

/// A field reference, with its key for map fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub field: Field,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Len,
    Lower,
    Upper,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "len" => Some(Func::Len),
            "lower" => Some(Func::Lower),
            "upper" => Some(Func::Upper),
            _ => None,
        }
    }

    fn result_kind(&self) -> Kind {
        match self {
            Func::Len => Kind::Num,
            Func::Lower | Func::Upper => Kind::Str,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(FieldRef),
    Call(Func, FieldRef),
}

impl Operand {
    fn kind(&self) -> Kind {
        match self {
            Operand::Field(r) => r.field.kind(),
            Operand::Call(func, _) => func.result_kind(),
        }
    }

    pub fn field_ref(&self) -> &FieldRef {
        match self {
            Operand::Field(r) | Operand::Call(_, r) => r,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Ip(IpAddr),
}

impl Literal {
    fn kind(&self) -> Kind {
        match self {
            Literal::Str(_) => Kind::Str,
            Literal::Num(_) => Kind::Num,
            Literal::Bool(_) => Kind::Bool,
            Literal::Ip(_) => Kind::Ip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Bare boolean field
    Truthy(Operand),
    Compare(Operand, CmpOp, Literal),
    Matches(Operand, Regex),
}

/// Parse and type check one expression.
pub fn parse(source: &str) -> Result<Expr, FilterError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };

    let expr = parser.parse_or()?;
    let next = parser.peek();
    if next.kind != TokenKind::Eof {
        return Err(parser.error("unexpected token", next.span));
    }

    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Token {
        self.tokens[self.pos].clone()
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>, span: Span) -> FilterError {
        FilterError::new(message, self.source, span)
    }

    fn is_keyword(token: &Token, keyword: &str) -> bool {
        matches!(&token.kind, TokenKind::Ident(name) if name == keyword)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, FilterError> {
        let token = self.peek();
        if token.kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {}", what), token.span))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.parse_and()?;
        loop {
            let token = self.peek();
            if token.kind == TokenKind::OrOr || Self::is_keyword(&token, "or") {
                self.advance();
                let rhs = self.parse_and()?;
                lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.parse_not()?;
        loop {
            let token = self.peek();
            if token.kind == TokenKind::AndAnd || Self::is_keyword(&token, "and") {
                self.advance();
                let rhs = self.parse_not()?;
                lhs = Expr::And(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_not(&mut self) -> Result<Expr, FilterError> {
        let token = self.peek();
        if token.kind == TokenKind::Bang || Self::is_keyword(&token, "not") {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        if self.peek().kind == TokenKind::LParen {
            self.advance();
            let expr = self.parse_or()?;
            self.expect(TokenKind::RParen, "`)`")?;
            return Ok(expr);
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, FilterError> {
        let (operand, operand_span) = self.parse_operand()?;

        let op = match self.peek().kind {
            TokenKind::Tilde => None,
            TokenKind::Eq => Some(CmpOp::Eq),
            TokenKind::Ne => Some(CmpOp::Ne),
            TokenKind::Lt => Some(CmpOp::Lt),
            TokenKind::Le => Some(CmpOp::Le),
            TokenKind::Gt => Some(CmpOp::Gt),
            TokenKind::Ge => Some(CmpOp::Ge),
            _ => {
                if operand.kind() != Kind::Bool {
                    return Err(self.error(
                        format!("expected a comparison, `{}` is not a boolean", &self.source[operand_span.start..operand_span.end]),
                        operand_span,
                    ));
                }
                return Ok(Expr::Truthy(operand));
            }
        };
        self.advance();

        let (literal, literal_span) = self.parse_literal()?;

        let Some(op) = op else {
            if operand.kind() != Kind::Str {
                return Err(self.error(
                    format!("`~` requires a string operand, found {}", operand.kind()),
                    operand_span,
                ));
            }
            let Literal::Str(pattern) = literal else {
                return Err(self.error("`~` requires a string pattern", literal_span));
            };
            let regex = Regex::new(&pattern)
                .map_err(|_| self.error("invalid regular expression", literal_span))?;
            return Ok(Expr::Matches(operand, regex));
        };

        let expected = operand.kind();
        if literal.kind() != expected {
            return Err(self.error(
                format!("type mismatch: expected {}, found {}", expected, literal.kind()),
                literal_span,
            ));
        }
        if !matches!(op, CmpOp::Eq | CmpOp::Ne) && expected != Kind::Num {
            return Err(self.error(
                format!("ordering comparison requires a number, found {}", expected),
                operand_span,
            ));
        }

        Ok(Expr::Compare(operand, op, literal))
    }

    fn parse_operand(&mut self) -> Result<(Operand, Span), FilterError> {
        let token = self.advance();
        let TokenKind::Ident(name) = &token.kind else {
            return Err(self.error("expected a field or function", token.span));
        };

        if self.peek().kind != TokenKind::LParen {
            let (field_ref, span) = self.finish_field(name, token.span)?;
            return Ok((Operand::Field(field_ref), span));
        }

        let func = Func::lookup(name).ok_or_else(|| self.error("unknown identifier", token.span))?;
        self.advance();

        let arg = self.advance();
        let TokenKind::Ident(arg_name) = &arg.kind else {
            return Err(self.error("expected a field", arg.span));
        };
        if self.peek().kind == TokenKind::LParen {
            return Err(self.error("function calls cannot be nested", arg.span));
        }

        let (field_ref, arg_span) = self.finish_field(arg_name, arg.span)?;
        if field_ref.field.kind() != Kind::Str {
            return Err(self.error(
                format!("`{}` expects a string field, found {}", name, field_ref.field.kind()),
                arg_span,
            ));
        }

        let close = self.expect(TokenKind::RParen, "`)`")?;
        Ok((Operand::Call(func, field_ref), token.span.to(close.span)))
    }

    fn finish_field(&mut self, name: &str, span: Span) -> Result<(FieldRef, Span), FilterError> {
        let field = Field::lookup(name).ok_or_else(|| self.error("unknown identifier", span))?;

        if self.peek().kind != TokenKind::LBracket {
            if field.is_map() {
                return Err(self.error(format!("`{}` must be indexed with a key", name), span));
            }
            return Ok((FieldRef { field, key: None }, span));
        }

        let open = self.advance();
        if !field.is_map() {
            return Err(self.error(format!("`{}` cannot be indexed", name), open.span));
        }

        let key_token = self.advance();
        let TokenKind::Str(key) = key_token.kind else {
            return Err(self.error("expected a string key", key_token.span));
        };
        let close = self.expect(TokenKind::RBracket, "`]`")?;

        Ok((
            FieldRef {
                field,
                key: Some(key),
            },
            span.to(close.span),
        ))
    }

    fn parse_literal(&mut self) -> Result<(Literal, Span), FilterError> {
        let token = self.advance();
        let literal = match token.kind {
            TokenKind::Str(s) => Literal::Str(s),
            TokenKind::Number(n) => Literal::Num(n),
            TokenKind::Ip(ip) => Literal::Ip(ip),
            TokenKind::Ident(ref word) if word == "true" => Literal::Bool(true),
            TokenKind::Ident(ref word) if word == "false" => Literal::Bool(false),
            _ => return Err(self.error("expected a literal value", token.span)),
        };
        Ok((literal, token.span))
    }
}
