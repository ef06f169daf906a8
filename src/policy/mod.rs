//! Rule file loading.

pub mod loader;

pub use loader::{load_rule_file, load_rules, PolicyError, RuleDef, RuleFile};
