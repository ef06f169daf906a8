//! Closed boolean expression language used by filter rules.
//!
//! ```text
//! http.request.method == "POST" and not ip.src.vpn
//! lower(http.request.headers["user-agent"]) ~ "curl"
//! len(http.request.uri.path) > 100 or local["plan"] == "free"
//! ```
//!
//! Expressions are parsed and type checked once. Each evaluation is
//! independent and resolves to matched, unmatched, or undetermined when an
//! optional field (IP reputation or geolocation) has no data.

pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use error::{FilterError, Span};
pub use eval::{Evaluation, FilterInput};

use crate::domain::RequestDetails;

/// `extra` key carrying the JSON blob behind `local["..."]` fields.
pub const FILTER_LOCAL_KEY: &str = "filterLocal";

/// A parsed expression together with its source text.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    expr: parser::Expr,
}

impl Expression {
    pub fn parse(source: impl Into<String>) -> Result<Self, FilterError> {
        let source = source.into();
        let expr = parser::parse(&source)?;
        Ok(Expression { source, expr })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, input: &FilterInput<'_>) -> Evaluation {
        input.evaluate(&self.expr)
    }
}

/// Matched and undetermined expressions for one request, as source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub matched: Vec<String>,
    pub undetermined: Vec<String>,
}

/// Evaluate every expression against the request.
pub fn evaluate_all(expressions: &[Expression], details: &RequestDetails) -> FilterOutcome {
    let input = FilterInput::new(details);
    let mut outcome = FilterOutcome::default();

    for expression in expressions {
        match expression.evaluate(&input) {
            Evaluation::Matched => outcome.matched.push(expression.source().to_string()),
            Evaluation::Undetermined => outcome.undetermined.push(expression.source().to_string()),
            Evaluation::Unmatched => {}
        }
    }

    outcome
}
