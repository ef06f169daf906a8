use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use url::form_urlencoded;

/// Value stored in `extra` when a field cannot be represented as text.
pub const UNSUPPORTED_EXTRA_VALUE: &str = "<unsupported value>";

/// Case-insensitive multi-map of request headers.
///
/// Names are stored lowercased; most headers carry a single value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, SmallVec<[String; 1]>>);

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    /// Append a value, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .entry(name.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// All values for a header joined with `", "`.
    pub fn get(&self, name: &str) -> Option<String> {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(|values| values.join(", "))
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(|values| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    /// Flatten to one value per name for the wire.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(name, values)| (name.clone(), values.join(", ")))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// Reputation and location data for the client IP.
///
/// Supplied by the hosting platform when available. Every field is optional;
/// the filter engine treats a missing field as undetermined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpDetails {
    pub vpn: Option<bool>,
    pub proxy: Option<bool>,
    pub tor: Option<bool>,
    pub hosting: Option<bool>,
    pub relay: Option<bool>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub continent: Option<String>,
    pub asn: Option<u32>,
    pub asn_name: Option<String>,
    pub asn_type: Option<String>,
    pub asn_domain: Option<String>,
    pub asn_country: Option<String>,
}

/// Normalized snapshot of an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDetails {
    pub ip: String,
    pub method: String,
    pub protocol: String,
    pub host: String,
    pub path: String,
    #[serde(default)]
    pub headers: Headers,
    /// Raw `Cookie` header value
    #[serde(default)]
    pub cookies: String,
    /// Raw query string, including the leading `?` when present
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_details: Option<IpDetails>,
}

impl RequestDetails {
    /// Look up a cookie by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.split(';').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name).then(|| value.trim())
        })
    }

    /// Look up a decoded query argument by name. The first occurrence wins.
    pub fn query_arg(&self, name: &str) -> Option<String> {
        form_urlencoded::parse(self.query.trim_start_matches('?').as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Coerce an arbitrary JSON value into an `extra` string.
///
/// Strings pass through, numbers become decimal text, booleans become
/// "true"/"false". Anything else maps to [`UNSUPPORTED_EXTRA_VALUE`].
pub fn coerce_extra_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => UNSUPPORTED_EXTRA_VALUE.to_string(),
    }
}
