pub mod analyze;
pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod domain;
pub mod filter;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod rules;

pub use config::Config;
pub use domain::{Conclusion, Decision, Mode, Reason, RequestDetails, RuleResult};
pub use pipeline::Protector;
pub use rules::{LocalRule, RemoteRule, Rule};
