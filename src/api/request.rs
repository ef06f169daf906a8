use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{coerce_extra_value, Headers, IpDetails, RequestDetails};

/// A header sent as a single value or a list of values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    One(String),
    Many(Vec<String>),
}

/// Request snapshot submitted to `POST /v1/protect`.
///
/// Fields the snapshot does not know are kept and merged into `extra`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProtectRequest {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, HeaderValue>,
    #[serde(default)]
    pub cookies: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub ip_details: Option<IpDetails>,
    /// Raw body, needed by sensitive info rules
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl ProtectRequest {
    /// Normalize into request details and the optional body.
    ///
    /// Header names are lowercased. `extra` values (and unknown fields) are
    /// coerced to strings; an explicit `extra` entry wins over an unknown
    /// field of the same name.
    pub fn into_parts(self) -> (RequestDetails, Option<Arc<str>>) {
        let mut headers = Headers::new();
        for (name, value) in self.headers {
            match value {
                HeaderValue::One(v) => headers.append(&name, v),
                HeaderValue::Many(values) => {
                    for v in values {
                        headers.append(&name, v);
                    }
                }
            }
        }

        let mut extra: BTreeMap<String, String> = self
            .unknown
            .iter()
            .map(|(k, v)| (k.clone(), coerce_extra_value(v)))
            .collect();
        for (key, value) in &self.extra {
            extra.insert(key.clone(), coerce_extra_value(value));
        }

        let details = RequestDetails {
            ip: self.ip,
            method: self.method,
            protocol: self.protocol,
            host: self.host,
            path: self.path,
            headers,
            cookies: self.cookies,
            query: self.query,
            extra,
            email: self.email,
            ip_details: self.ip_details,
        };

        (details, self.body.map(Arc::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UNSUPPORTED_EXTRA_VALUE;

    #[test]
    fn test_request_deserialization() {
        let json = r#"{
            "ip": "203.0.113.5",
            "method": "POST",
            "protocol": "HTTP/2",
            "host": "shop.example.com",
            "path": "/checkout",
            "headers": {
                "User-Agent": "Mozilla/5.0",
                "Accept": ["text/html", "application/json"]
            },
            "email": "buyer@example.com",
            "body": "card 4242 4242 4242 4242",
            "extra": {"plan": "pro", "seats": 5, "trial": false, "tags": ["a"]},
            "userId": "u_1"
        }"#;

        let req: ProtectRequest = serde_json::from_str(json).unwrap();
        let (details, body) = req.into_parts();

        assert_eq!(details.method, "POST");
        assert_eq!(details.headers.get("user-agent").as_deref(), Some("Mozilla/5.0"));
        assert_eq!(
            details.headers.get("accept").as_deref(),
            Some("text/html, application/json")
        );
        assert_eq!(details.extra["plan"], "pro");
        assert_eq!(details.extra["seats"], "5");
        assert_eq!(details.extra["trial"], "false");
        assert_eq!(details.extra["tags"], UNSUPPORTED_EXTRA_VALUE);
        assert_eq!(details.extra["userId"], "u_1");
        assert_eq!(details.email.as_deref(), Some("buyer@example.com"));
        assert_eq!(body.as_deref(), Some("card 4242 4242 4242 4242"));
    }

    #[test]
    fn test_minimal_request() {
        let req: ProtectRequest = serde_json::from_str(r#"{"ip": "198.51.100.1"}"#).unwrap();
        let (details, body) = req.into_parts();

        assert_eq!(details.ip, "198.51.100.1");
        assert!(details.headers.is_empty());
        assert!(details.extra.is_empty());
        assert!(body.is_none());
    }
}
