//! The rule list for the current screen.

use std::sync::Arc;

use crate::rule::{Rule, RuleKey, ScreenContext};

/// Applicable rules for one context, in ascending `order`.
///
/// Never mutated after construction; a change of context or rule set builds
/// a new value and swaps the `Arc`.
#[derive(Debug, Default)]
pub struct ActiveRules {
    pub context: ScreenContext,
    pub rules: Vec<Arc<Rule>>,
}

impl ActiveRules {
    pub fn build<'a>(context: ScreenContext, all: impl IntoIterator<Item = &'a Arc<Rule>>) -> Self {
        let mut rules: Vec<Arc<Rule>> = all
            .into_iter()
            .filter(|rule| rule.spec().scope.applies_to(&context))
            .cloned()
            .collect();
        rules.sort_by_key(|rule| rule.spec().order);
        Self { context, rules }
    }

    pub fn contains(&self, key: &RuleKey) -> bool {
        self.rules.iter().any(|rule| rule.key() == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RuleKey> {
        self.rules.iter().map(|rule| rule.key())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleScope, RuleSpec};
    use crate::selector::SelectorCache;

    #[test]
    fn filters_by_scope_and_sorts_by_order() {
        let mut cache = SelectorCache::new();
        let mut specs = vec![
            RuleSpec::new("late", "app", "A"),
            RuleSpec::new("other-app", "other", "A"),
            RuleSpec::new("early", "app", "A"),
            RuleSpec::new("global", "ignored", "A"),
        ];
        specs[0].order = 5;
        specs[2].order = -1;
        specs[3].scope = RuleScope::Global {
            exclude_app_ids: Vec::new(),
            exclude_activity_ids: Vec::new(),
        };
        let rules: Vec<Arc<Rule>> = specs
            .into_iter()
            .map(|s| Arc::new(Rule::compile(s, &mut cache).unwrap()))
            .collect();

        let active = ActiveRules::build(ScreenContext::new("app", None), &rules);
        let keys: Vec<&str> = active.keys().map(|k| k.0.as_str()).collect();
        assert_eq!(keys, vec!["early", "global", "late"]);
        assert!(!active.contains(&RuleKey::from("other-app")));
    }
}
