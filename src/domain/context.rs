use std::fmt;
use std::sync::Arc;

use crate::analyze::Analyzer;
use crate::cache::OutcomeCache;

/// Per-call state shared by the pipeline, the rules and the client.
///
/// Created fresh for every `protect` call and never persisted. Cloning is
/// cheap so the background report task can own a snapshot.
#[derive(Clone)]
pub struct Context {
    /// Site key, sent as the bearer token
    pub key: String,
    pub fingerprint: String,
    /// Runtime identifier reported to the remote service
    pub runtime: String,
    pub characteristics: Arc<[String]>,
    pub cache: Arc<OutcomeCache>,
    pub analyzer: Arc<dyn Analyzer>,
    body: Option<Arc<str>>,
}

impl Context {
    pub fn new(
        key: impl Into<String>,
        fingerprint: impl Into<String>,
        characteristics: Arc<[String]>,
        cache: Arc<OutcomeCache>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Context {
            key: key.into(),
            fingerprint: fingerprint.into(),
            runtime: format!("rust/{}", env!("CARGO_PKG_VERSION")),
            characteristics,
            cache,
            analyzer,
            body: None,
        }
    }

    pub fn with_body(mut self, body: Option<Arc<str>>) -> Self {
        self.body = body;
        self
    }

    /// Raw request body, when the caller supplied one.
    pub fn get_body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("fingerprint", &self.fingerprint)
            .field("runtime", &self.runtime)
            .field("characteristics", &self.characteristics)
            .field("has_body", &self.body.is_some())
            .finish_non_exhaustive()
    }
}
