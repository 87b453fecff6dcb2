//! Rules: selectors plus the policy deciding when their action may fire.
//!
//! A [`RuleSpec`] is the serialized definition. Compiling it parses every
//! selector once; a spec with any malformed selector never becomes a
//! [`Rule`] and is reported as permanently invalid instead.
//!
//! Mutable per-rule bookkeeping lives in [`RuleState`], owned by the
//! scheduler and keyed by [`RuleKey`], so rule definitions can be shared
//! across rule-set replacements without carrying state around.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{ActionKind, Point};
use crate::error::ParseError;
use crate::node::Node;
use crate::selector::{MatchOption, Selector, SelectorCache};

/// Stable identity of a rule across rule-set replacements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleKey(pub String);

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuleKey {
    fn from(key: &str) -> Self {
        RuleKey(key.to_string())
    }
}

/// The foreground app and activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenContext {
    pub app_id: String,
    #[serde(default)]
    pub activity_id: Option<String>,
}

impl ScreenContext {
    pub fn new(app_id: impl Into<String>, activity_id: Option<&str>) -> Self {
        Self {
            app_id: app_id.into(),
            activity_id: activity_id.map(str::to_string),
        }
    }
}

impl fmt::Display for ScreenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.activity_id {
            Some(activity) => write!(f, "{}/{}", self.app_id, activity),
            None => write!(f, "{}", self.app_id),
        }
    }
}

/// Activity ids are matched by prefix.
fn activity_listed(list: &[String], activity: &str) -> bool {
    list.iter().any(|prefix| activity.starts_with(prefix.as_str()))
}

/// Where a rule applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleScope {
    /// One app, optionally narrowed to some activities.
    App {
        app_id: String,
        #[serde(default)]
        activity_ids: Vec<String>,
        #[serde(default)]
        exclude_activity_ids: Vec<String>,
    },
    /// Every app except the excluded ones.
    Global {
        #[serde(default)]
        exclude_app_ids: Vec<String>,
        #[serde(default)]
        exclude_activity_ids: Vec<String>,
    },
}

impl RuleScope {
    pub fn applies_to(&self, context: &ScreenContext) -> bool {
        match self {
            RuleScope::App {
                app_id,
                activity_ids,
                exclude_activity_ids,
            } => {
                if *app_id != context.app_id {
                    return false;
                }
                let Some(activity) = context.activity_id.as_deref() else {
                    return true;
                };
                !activity_listed(exclude_activity_ids, activity)
                    && (activity_ids.is_empty() || activity_listed(activity_ids, activity))
            }
            RuleScope::Global {
                exclude_app_ids,
                exclude_activity_ids,
            } => {
                if exclude_app_ids.iter().any(|a| *a == context.app_id) {
                    return false;
                }
                context
                    .activity_id
                    .as_deref()
                    .map_or(true, |activity| !activity_listed(exclude_activity_ids, activity))
            }
        }
    }

    /// Whether this is an app rule for `app_id`.
    pub fn is_local_to(&self, app_id: &str) -> bool {
        matches!(self, RuleScope::App { app_id: own, .. } if own == app_id)
    }

    pub fn is_global(&self) -> bool {
        matches!(self, RuleScope::Global { .. })
    }
}

/// What resets a rule's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetMatch {
    /// Only switching apps.
    #[default]
    App,
    /// Switching activities too.
    Activity,
}

/// Serialized rule definition. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub key: RuleKey,
    #[serde(default)]
    pub order: i32,
    pub scope: RuleScope,
    /// All must match; the last one yields the action target.
    pub matches: Vec<String>,
    /// Any match vetoes the rule.
    #[serde(default)]
    pub exclude_matches: Vec<String>,
    #[serde(default)]
    pub action: ActionKind,
    #[serde(default)]
    pub position: Option<Point>,
    #[serde(default)]
    pub match_delay_ms: u64,
    /// Matching window after `match_delay_ms`; unbounded when absent.
    #[serde(default)]
    pub match_time_ms: Option<u64>,
    #[serde(default)]
    pub action_delay_ms: u64,
    /// Cooldown between triggers; the scheduler default when absent.
    #[serde(default)]
    pub action_cd_ms: Option<u64>,
    #[serde(default)]
    pub action_maximum: Option<u32>,
    #[serde(default)]
    pub forced_time_ms: u64,
    #[serde(default)]
    pub reset_match: ResetMatch,
    /// The most recently triggered rule must be one of these.
    #[serde(default)]
    pub pre_keys: Vec<RuleKey>,
    #[serde(default)]
    pub quick_find: bool,
    #[serde(default)]
    pub fast_query: bool,
    /// Query from the window root even when an event names a subtree.
    #[serde(default)]
    pub match_root: bool,
}

impl RuleSpec {
    /// A click rule for one app with default policy.
    pub fn new(key: &str, app_id: &str, selector: &str) -> Self {
        Self {
            key: RuleKey::from(key),
            order: 0,
            scope: RuleScope::App {
                app_id: app_id.to_string(),
                activity_ids: Vec::new(),
                exclude_activity_ids: Vec::new(),
            },
            matches: vec![selector.to_string()],
            exclude_matches: Vec::new(),
            action: ActionKind::Click,
            position: None,
            match_delay_ms: 0,
            match_time_ms: None,
            action_delay_ms: 0,
            action_cd_ms: None,
            action_maximum: None,
            forced_time_ms: 0,
            reset_match: ResetMatch::App,
            pre_keys: Vec::new(),
            quick_find: false,
            fast_query: false,
            match_root: false,
        }
    }
}

/// A rule set replaces the previous one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl RuleSet {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A rule spec with a selector that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rule {key}: selector {selector:?} is invalid: {source}")]
pub struct RuleError {
    pub key: RuleKey,
    pub selector: String,
    #[source]
    pub source: ParseError,
}

/// Per-rule bookkeeping. Timestamps are clock milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleState {
    /// When the rule last became applicable or was reset.
    pub match_changed_at: u64,
    pub last_trigger_at: Option<u64>,
    pub action_delay_started_at: Option<u64>,
    pub action_count: u32,
}

impl RuleState {
    pub fn fresh(now: u64) -> Self {
        Self {
            match_changed_at: now,
            ..Self::default()
        }
    }

    /// Forget delay and count, restart the match window.
    pub fn reset(&mut self, now: u64) {
        self.action_delay_started_at = None;
        self.action_count = 0;
        self.match_changed_at = now;
    }
}

/// Why a rule may or may not run right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Ok,
    Exhausted,
    AwaitingPreRule,
    MatchDelay,
    MatchExpired,
    Cooldown,
    ActionDelay,
    Invalid,
}

/// A compiled rule.
#[derive(Debug)]
pub struct Rule {
    spec: RuleSpec,
    matches: Vec<Arc<Selector>>,
    exclude_matches: Vec<Arc<Selector>>,
}

impl Rule {
    pub fn compile(spec: RuleSpec, cache: &mut SelectorCache) -> Result<Self, RuleError> {
        let mut compile_all = |sources: &[String]| -> Result<Vec<Arc<Selector>>, RuleError> {
            sources
                .iter()
                .map(|source| {
                    cache.get_or_parse(source).map_err(|e| RuleError {
                        key: spec.key.clone(),
                        selector: source.clone(),
                        source: e,
                    })
                })
                .collect()
        };
        let matches = compile_all(&spec.matches)?;
        let exclude_matches = compile_all(&spec.exclude_matches)?;
        Ok(Self {
            spec,
            matches,
            exclude_matches,
        })
    }

    pub fn key(&self) -> &RuleKey {
        &self.spec.key
    }

    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    pub fn selectors(&self) -> impl Iterator<Item = &Selector> {
        self.matches.iter().chain(&self.exclude_matches).map(|s| &**s)
    }

    fn match_option(&self) -> MatchOption {
        MatchOption {
            quick_find: self.spec.quick_find,
            fast_query: self.spec.fast_query,
        }
    }

    /// Run the rule's selectors from `node`.
    ///
    /// Every positive selector must match and no exclusion may; the last
    /// positive match is the target. With `match_root` the query starts at
    /// the top of the tree regardless of `node`.
    pub fn query<N: Node>(&self, node: &N, is_root_node: bool) -> Option<N> {
        let (root, is_root_node) = if self.spec.match_root {
            (node.root(), true)
        } else {
            (node.clone(), is_root_node)
        };
        let option = self.match_option();
        let mut target = None;
        for selector in &self.matches {
            target = Some(selector.query(&root, option, is_root_node)?);
        }
        if self
            .exclude_matches
            .iter()
            .any(|selector| selector.query(&root, option, is_root_node).is_some())
        {
            return None;
        }
        target
    }

    /// Status at `now`, checked in a fixed order so the most permanent
    /// reason wins.
    pub fn status(&self, state: &RuleState, last_triggered: Option<&RuleKey>, now: u64, default_cd_ms: u64) -> RuleStatus {
        let spec = &self.spec;
        if spec.action_maximum.is_some_and(|max| state.action_count >= max) {
            return RuleStatus::Exhausted;
        }
        if !spec.pre_keys.is_empty() && !last_triggered.is_some_and(|k| spec.pre_keys.contains(k)) {
            return RuleStatus::AwaitingPreRule;
        }
        let since_change = now.saturating_sub(state.match_changed_at);
        if spec.match_delay_ms > 0 && since_change < spec.match_delay_ms {
            return RuleStatus::MatchDelay;
        }
        if spec
            .match_time_ms
            .is_some_and(|window| since_change > spec.match_delay_ms + window)
        {
            return RuleStatus::MatchExpired;
        }
        let cooldown = spec.action_cd_ms.unwrap_or(default_cd_ms);
        if state.last_trigger_at.is_some_and(|at| at + cooldown > now) {
            return RuleStatus::Cooldown;
        }
        if state
            .action_delay_started_at
            .is_some_and(|at| at + spec.action_delay_ms > now)
        {
            return RuleStatus::ActionDelay;
        }
        RuleStatus::Ok
    }

    /// Time at which a pending match delay elapses.
    pub fn match_delay_due(&self, state: &RuleState) -> u64 {
        state.match_changed_at + self.spec.match_delay_ms
    }

    /// Whether forced sweeps may still evaluate this rule.
    pub fn is_forced_at(&self, state: &RuleState, now: u64) -> bool {
        self.spec.forced_time_ms > 0
            && now < state.match_changed_at + self.spec.match_delay_ms + self.spec.forced_time_ms
    }
}
