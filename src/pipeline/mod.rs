//! The decision pipeline.
//!
//! For each request: fingerprint, serve a cached denial if one is live, run
//! local rules in priority order, and otherwise ask the remote service.
//! Locally made decisions are reported in the background.

pub mod protect;
pub mod redact;

pub use protect::Protector;
pub use redact::{redact, REDACTED};
