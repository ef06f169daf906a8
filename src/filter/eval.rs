use std::collections::HashMap;
use std::net::IpAddr;

use crate::domain::{coerce_extra_value, RequestDetails};

use super::parser::{CmpOp, Expr, Field, FieldRef, Func, Literal, Operand};
use super::FILTER_LOCAL_KEY;

/// Outcome of evaluating one expression against one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Matched,
    Unmatched,
    /// An optional field had no data, so the expression cannot be decided
    Undetermined,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    Ip(Option<IpAddr>),
}

/// Request view the evaluator resolves fields against.
#[derive(Debug)]
pub struct FilterInput<'a> {
    details: &'a RequestDetails,
    local: HashMap<String, String>,
}

impl<'a> FilterInput<'a> {
    /// Build the view, decoding the `local` map from its JSON blob in `extra`.
    ///
    /// A missing or malformed blob yields an empty map.
    pub fn new(details: &'a RequestDetails) -> Self {
        let local = details
            .extra
            .get(FILTER_LOCAL_KEY)
            .and_then(|blob| serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(blob).ok())
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), coerce_extra_value(v)))
                    .collect()
            })
            .unwrap_or_default();

        FilterInput { details, local }
    }

    /// Resolve a field; `None` means the backing data is unavailable.
    fn resolve(&self, r: &FieldRef) -> Option<Value> {
        let d = self.details;
        let key = r.key.as_deref().unwrap_or_default();
        let ip = d.ip_details.as_ref();

        let value = match r.field {
            Field::IpSrc => Value::Ip(d.ip.parse().ok()),
            Field::Host => Value::Str(d.host.clone()),
            Field::Method => Value::Str(d.method.clone()),
            Field::Protocol => Value::Str(d.protocol.clone()),
            Field::Path => Value::Str(d.path.clone()),
            Field::Query => Value::Str(d.query.clone()),
            Field::Args => Value::Str(d.query_arg(key).unwrap_or_default()),
            Field::Headers => Value::Str(d.headers.get(key).unwrap_or_default()),
            Field::Cookie => Value::Str(d.cookie(key).unwrap_or_default().to_string()),
            Field::Local => Value::Str(self.local.get(key).cloned().unwrap_or_default()),
            Field::Vpn => Value::Bool(ip?.vpn?),
            Field::Proxy => Value::Bool(ip?.proxy?),
            Field::Tor => Value::Bool(ip?.tor?),
            Field::Hosting => Value::Bool(ip?.hosting?),
            Field::Relay => Value::Bool(ip?.relay?),
            Field::Country => Value::Str(ip?.country.clone()?),
            Field::Region => Value::Str(ip?.region.clone()?),
            Field::City => Value::Str(ip?.city.clone()?),
            Field::Continent => Value::Str(ip?.continent.clone()?),
            Field::Asnum => Value::Num(f64::from(ip?.asn?)),
            Field::AsnumName => Value::Str(ip?.asn_name.clone()?),
            Field::AsnumType => Value::Str(ip?.asn_type.clone()?),
            Field::AsnumDomain => Value::Str(ip?.asn_domain.clone()?),
            Field::AsnumCountry => Value::Str(ip?.asn_country.clone()?),
        };

        Some(value)
    }

    fn operand(&self, operand: &Operand) -> Option<Value> {
        match operand {
            Operand::Field(r) => self.resolve(r),
            Operand::Call(func, r) => {
                let Value::Str(s) = self.resolve(r)? else {
                    // The parser only admits string arguments
                    return Some(Value::Str(String::new()));
                };
                Some(match func {
                    Func::Len => Value::Num(s.chars().count() as f64),
                    Func::Lower => Value::Str(s.to_lowercase()),
                    Func::Upper => Value::Str(s.to_uppercase()),
                })
            }
        }
    }

    /// Evaluate without short-circuiting: any undetermined field anywhere
    /// in the expression makes the whole expression undetermined.
    fn eval(&self, expr: &Expr) -> Option<bool> {
        match expr {
            Expr::Or(lhs, rhs) => {
                let (l, r) = (self.eval(lhs), self.eval(rhs));
                Some(l? || r?)
            }
            Expr::And(lhs, rhs) => {
                let (l, r) = (self.eval(lhs), self.eval(rhs));
                Some(l? && r?)
            }
            Expr::Not(inner) => self.eval(inner).map(|b| !b),
            Expr::Truthy(operand) => match self.operand(operand)? {
                Value::Bool(b) => Some(b),
                _ => Some(false),
            },
            Expr::Matches(operand, regex) => match self.operand(operand)? {
                Value::Str(s) => Some(regex.is_match(&s)),
                _ => Some(false),
            },
            Expr::Compare(operand, op, literal) => {
                let value = self.operand(operand)?;
                Some(compare(&value, *op, literal))
            }
        }
    }

    pub fn evaluate(&self, expr: &Expr) -> Evaluation {
        match self.eval(expr) {
            Some(true) => Evaluation::Matched,
            Some(false) => Evaluation::Unmatched,
            None => Evaluation::Undetermined,
        }
    }
}

fn compare(value: &Value, op: CmpOp, literal: &Literal) -> bool {
    match (value, literal) {
        (Value::Str(a), Literal::Str(b)) => equality(op, a == b),
        (Value::Bool(a), Literal::Bool(b)) => equality(op, a == b),
        (Value::Ip(a), Literal::Ip(b)) => equality(op, a.as_ref() == Some(b)),
        (Value::Num(a), Literal::Num(b)) => match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        },
        _ => false,
    }
}

#[inline]
fn equality(op: CmpOp, equal: bool) -> bool {
    match op {
        CmpOp::Ne => !equal,
        _ => equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Headers, IpDetails};
    use crate::filter::parser::parse;

    fn request() -> RequestDetails {
        RequestDetails {
            ip: "203.0.113.7".to_string(),
            method: "GET".to_string(),
            protocol: "https:".to_string(),
            host: "example.com".to_string(),
            path: "/api/items".to_string(),
            headers: Headers::from_iter([("User-Agent", "Mozilla/5.0 Googlebot")]),
            cookies: "session=abc".to_string(),
            query: "?page=2".to_string(),
            ..Default::default()
        }
    }

    fn eval(source: &str, details: &RequestDetails) -> Evaluation {
        FilterInput::new(details).evaluate(&parse(source).unwrap())
    }

    #[test]
    fn test_request_fields() {
        let d = request();

        assert_eq!(eval(r#"http.request.method == "GET""#, &d), Evaluation::Matched);
        assert_eq!(eval(r#"http.request.method != "GET""#, &d), Evaluation::Unmatched);
        assert_eq!(eval(r#"http.host == "example.com""#, &d), Evaluation::Matched);
        assert_eq!(eval(r#"http.request.uri.path ~ "^/api/""#, &d), Evaluation::Matched);
        assert_eq!(eval(r#"http.request.uri.args["page"] == "2""#, &d), Evaluation::Matched);
        assert_eq!(eval(r#"http.request.cookie["session"] == "abc""#, &d), Evaluation::Matched);
        assert_eq!(eval("ip.src == 203.0.113.7", &d), Evaluation::Matched);
    }

    #[test]
    fn test_functions() {
        let d = request();

        assert_eq!(
            eval(r#"lower(http.request.headers["user-agent"]) ~ "googlebot""#, &d),
            Evaluation::Matched
        );
        assert_eq!(eval(r#"upper(http.host) == "EXAMPLE.COM""#, &d), Evaluation::Matched);
        assert_eq!(eval("len(http.request.uri.path) == 10", &d), Evaluation::Matched);
        assert_eq!(eval("len(http.request.uri.path) > 20", &d), Evaluation::Unmatched);
    }

    #[test]
    fn test_missing_map_key_is_empty_string() {
        let d = request();
        assert_eq!(eval(r#"http.request.headers["x-missing"] == """#, &d), Evaluation::Matched);
    }

    #[test]
    fn test_optional_field_undetermined() {
        let d = request();

        assert_eq!(eval("ip.src.vpn", &d), Evaluation::Undetermined);
        assert_eq!(eval(r#"ip.src.country == "US""#, &d), Evaluation::Undetermined);
        // Undetermined anywhere wins, even next to a decided operand
        assert_eq!(
            eval(r#"ip.src.vpn or http.request.method == "GET""#, &d),
            Evaluation::Undetermined
        );
        assert_eq!(eval("not ip.src.tor", &d), Evaluation::Undetermined);
    }

    #[test]
    fn test_optional_field_present() {
        let mut d = request();
        d.ip_details = Some(IpDetails {
            vpn: Some(true),
            country: Some("US".to_string()),
            asn: Some(15169),
            ..Default::default()
        });

        assert_eq!(eval("ip.src.vpn", &d), Evaluation::Matched);
        assert_eq!(eval(r#"ip.src.country == "US""#, &d), Evaluation::Matched);
        assert_eq!(eval("ip.src.asnum == 15169", &d), Evaluation::Matched);
        assert_eq!(eval("ip.src.tor", &d), Evaluation::Undetermined);
    }

    #[test]
    fn test_local_fields() {
        let mut d = request();
        d.extra.insert(
            FILTER_LOCAL_KEY.to_string(),
            r#"{"plan":"free","age":3,"beta":true}"#.to_string(),
        );

        assert_eq!(eval(r#"local["plan"] == "free""#, &d), Evaluation::Matched);
        assert_eq!(eval(r#"local["age"] == "3""#, &d), Evaluation::Matched);
        assert_eq!(eval(r#"local["beta"] == "true""#, &d), Evaluation::Matched);
        assert_eq!(eval(r#"local["missing"] == """#, &d), Evaluation::Matched);
    }

    #[test]
    fn test_malformed_local_blob() {
        let mut d = request();
        d.extra.insert(FILTER_LOCAL_KEY.to_string(), "not json".to_string());

        assert_eq!(eval(r#"local["plan"] == """#, &d), Evaluation::Matched);
    }

    #[test]
    fn test_ipv6_client_ip() {
        let mut d = request();
        d.ip = "fe80::1".to_string();

        assert_eq!(eval("ip.src == fe80::1", &d), Evaluation::Matched);
        assert_eq!(eval("ip.src == ::1", &d), Evaluation::Unmatched);

        d.ip = "::1".to_string();
        assert_eq!(eval("ip.src == ::1", &d), Evaluation::Matched);
    }

    #[test]
    fn test_unparseable_client_ip() {
        let mut d = request();
        d.ip = String::new();

        assert_eq!(eval("ip.src == 127.0.0.1", &d), Evaluation::Unmatched);
        assert_eq!(eval("ip.src != 127.0.0.1", &d), Evaluation::Matched);
    }
}
