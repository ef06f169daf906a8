use std::collections::BTreeSet;

use super::Rule;

/// Most rules a single protect call may run.
pub const MAX_RULES: usize = 10;

/// Error message for an oversize rule list.
pub const OVERLOAD_MESSAGE: &str = "Only 10 rules may be specified";

/// Flattened rules in execution order.
#[derive(Debug, Clone, Default)]
pub struct ComposedRules {
    rules: Vec<Rule>,
}

impl ComposedRules {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// More than `MAX_RULES` were configured.
    #[inline]
    pub fn is_overloaded(&self) -> bool {
        self.rules.len() > MAX_RULES
    }

    /// `extra` keys any local rule declares local-only.
    pub fn local_only_fields(&self) -> BTreeSet<&'static str> {
        self.rules
            .iter()
            .filter_map(Rule::as_local)
            .flat_map(|rule| rule.local_only_fields().iter().copied())
            .collect()
    }
}

/// Flatten one level of grouping and stably sort by ascending priority.
pub fn compose(groups: &[Vec<Rule>]) -> ComposedRules {
    let mut rules: Vec<Rule> = groups.iter().flatten().cloned().collect();
    rules.sort_by_key(Rule::priority);
    ComposedRules { rules }
}
