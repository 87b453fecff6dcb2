//! Rule evaluation scheduler.
//!
//! The scheduler is synchronous and single-owner: every method takes
//! `&mut self`, so rule state is only ever touched by whoever drives it
//! (the engine's worker task in the binary, the test directly here). Time
//! comes from a [`ClockSource`]; deadlines are reported through
//! [`Scheduler::next_deadline`] and honoured by calling
//! [`Scheduler::run_due`].
//!
//! One evaluation pass:
//!
//! 1. takes the coalesced content events (a delayed single-rule pass does not),
//! 2. walks the active rules in order, skipping any that are not `Ok`,
//! 3. queries each from the event node, or from the window root when the
//!    event node is stale or the burst was coalesced,
//! 4. starts the action delay or performs the action,
//! 5. schedules the trailing re-check.

mod active;
mod coalesce;
mod delay;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use active::ActiveRules;
pub use coalesce::{Batch, EventCoalescer, Push};
pub use delay::DelayQueue;

use crate::action::{ActionKind, ActionSink};
use crate::clock::{ClockSource, SystemClock};
use crate::error::ParseError;
use crate::node::Node;
use crate::rule::{ResetMatch, Rule, RuleError, RuleKey, RuleSet, RuleState, RuleStatus, ScreenContext};
use crate::selector::SelectorCache;

/// Scheduler timing. All durations are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Content events closer together than this are throttled.
    pub content_debounce_ms: u64,
    /// Delay of the trailing re-check after a pass.
    pub recheck_delay_ms: u64,
    /// After a trigger, keep re-checking and stop throttling for this long.
    pub trigger_window_ms: u64,
    /// Same as `trigger_window_ms`, after an app switch.
    pub app_change_window_ms: u64,
    /// Cooldown for rules that do not set `action_cd_ms`.
    pub default_action_cd_ms: u64,
    pub enable_match: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            content_debounce_ms: 100,
            recheck_delay_ms: 300,
            trigger_window_ms: 3000,
            app_change_window_ms: 5000,
            default_action_cd_ms: 1000,
            enable_match: true,
        }
    }
}

/// What prompted an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeHint<N> {
    /// The foreground screen changed.
    Context(ScreenContext),
    /// Tree content changed, optionally below a known node.
    Content(Option<N>),
    /// Evaluate whatever content events are already queued.
    Pending,
    /// Trailing re-check.
    Recheck,
    /// Sweep restricted to forced rules.
    Forced,
    /// A delay of one rule elapsed.
    Delayed(RuleKey),
}

/// Supplies the active window root.
pub trait TreeSource<N> {
    fn active_root(&mut self) -> Option<N>;
}

impl<N, F: FnMut() -> Option<N>> TreeSource<N> for F {
    fn active_root(&mut self) -> Option<N> {
        self()
    }
}

/// A performed action.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent<N> {
    pub rule: RuleKey,
    pub action: ActionKind,
    pub at_ms: u64,
    pub context: ScreenContext,
    /// Triggers of this rule since its last reset, including this one.
    pub count: u32,
    pub target: N,
    pub detail: Option<String>,
}

/// Recoverable outcomes worth reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The rule has a malformed selector and will never run.
    InvalidRule {
        rule: RuleKey,
        selector: String,
        error: ParseError,
    },
    /// The event node could not be refreshed; the window root was used.
    StaleNode,
    ActionFailure {
        rule: RuleKey,
        detail: Option<String>,
    },
    /// Content events folded into a single pass.
    EventDropped { count: usize },
}

impl From<&RuleError> for Diagnostic {
    fn from(e: &RuleError) -> Self {
        Diagnostic::InvalidRule {
            rule: e.key.clone(),
            selector: e.selector.clone(),
            error: e.source.clone(),
        }
    }
}

/// Result of one or more passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<N> {
    pub triggers: Vec<TriggerEvent<N>>,
    pub diagnostics: Vec<Diagnostic>,
    /// Whether any pass actually ran.
    pub ran: bool,
}

impl<N> Default for Evaluation<N> {
    fn default() -> Self {
        Self {
            triggers: Vec::new(),
            diagnostics: Vec::new(),
            ran: false,
        }
    }
}

impl<N> Evaluation<N> {
    pub fn merge(&mut self, other: Evaluation<N>) {
        self.triggers.extend(other.triggers);
        self.diagnostics.extend(other.diagnostics);
        self.ran |= other.ran;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JobKey {
    /// Match or action delay of one rule.
    Rule(RuleKey),
    Recheck,
    Forced,
    /// A throttled content event.
    Flush,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PassMode {
    /// Driven by content events; skipped when none are queued.
    Event,
    Sweep,
    Forced,
    Delayed(RuleKey),
}

pub struct Scheduler<N, C = SystemClock> {
    config: SchedulerConfig,
    clock: C,
    cache: SelectorCache,
    rules: Vec<Arc<Rule>>,
    invalid: HashMap<RuleKey, RuleError>,
    states: HashMap<RuleKey, RuleState>,
    active: Arc<ActiveRules>,
    /// Latest context that carried an activity id.
    last_with_activity: Option<ScreenContext>,
    coalescer: EventCoalescer<N>,
    jobs: DelayQueue<JobKey>,
    last_trigger: Option<(RuleKey, u64)>,
    app_changed_at: Option<u64>,
    passes: u64,
}

impl<N: Node, C: ClockSource> Scheduler<N, C> {
    pub fn new(config: SchedulerConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            cache: SelectorCache::new(),
            rules: Vec::new(),
            invalid: HashMap::new(),
            states: HashMap::new(),
            active: Arc::new(ActiveRules::default()),
            last_with_activity: None,
            coalescer: EventCoalescer::new(),
            jobs: DelayQueue::new(),
            last_trigger: None,
            app_changed_at: None,
            passes: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn context(&self) -> &ScreenContext {
        &self.active.context
    }

    /// The current rule list; later changes never affect a returned value.
    pub fn active_rules(&self) -> Arc<ActiveRules> {
        Arc::clone(&self.active)
    }

    /// Number of passes that ran.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Earliest time [`run_due`](Self::run_due) has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        self.jobs.next_deadline()
    }

    pub fn rule_state(&self, key: &RuleKey) -> Option<RuleState> {
        self.states.get(key).copied()
    }

    pub fn rule_status(&self, key: &RuleKey) -> Option<RuleStatus> {
        if self.invalid.contains_key(key) {
            return Some(RuleStatus::Invalid);
        }
        let rule = self.rules.iter().find(|r| r.key() == key)?;
        Some(self.status_of(rule, self.now()))
    }

    pub fn invalid_rules(&self) -> impl Iterator<Item = &RuleError> {
        self.invalid.values()
    }

    /// Replace the whole rule set.
    ///
    /// State survives for keys present in both sets. Rules with a malformed
    /// selector are returned as diagnostics and never evaluated.
    pub fn replace_rules(&mut self, set: RuleSet) -> Vec<Diagnostic> {
        let now = self.now();
        let mut rules = Vec::new();
        let mut invalid = HashMap::new();
        let mut diagnostics = Vec::new();
        let mut seen = HashSet::new();
        for spec in set.rules {
            if !seen.insert(spec.key.clone()) {
                warn!("Duplicate rule key {}, keeping the first", spec.key);
                continue;
            }
            match Rule::compile(spec, &mut self.cache) {
                Ok(rule) => rules.push(Arc::new(rule)),
                Err(e) => {
                    warn!("{}", e);
                    diagnostics.push(Diagnostic::from(&e));
                    invalid.insert(e.key.clone(), e);
                }
            }
        }

        let sources: Vec<String> = rules
            .iter()
            .flat_map(|r: &Arc<Rule>| r.selectors().map(|s| s.source().to_string()).collect::<Vec<_>>())
            .collect();
        self.cache.retain(sources.iter().map(String::as_str));

        let keys: HashSet<RuleKey> = rules.iter().map(|r| r.key().clone()).collect();
        self.states.retain(|key, _| keys.contains(key));
        for key in &keys {
            self.states.entry(key.clone()).or_insert_with(|| RuleState::fresh(now));
        }
        self.jobs.retain(|job| match job {
            JobKey::Rule(key) => keys.contains(key),
            _ => true,
        });

        info!("Loaded {} rules, {} invalid", rules.len(), invalid.len());
        self.rules = rules;
        self.invalid = invalid;
        let context = self.active.context.clone();
        self.switch_to(context, now);
        diagnostics
    }

    /// Record a new foreground screen. Returns whether anything changed.
    ///
    /// A context without activity id for the app last seen with one reuses
    /// that activity id.
    pub fn update_context(&mut self, mut context: ScreenContext) -> bool {
        if context.activity_id.is_none() {
            if let Some(last) = &self.last_with_activity {
                if last.app_id == context.app_id {
                    context.activity_id = last.activity_id.clone();
                }
            }
        } else {
            self.last_with_activity = Some(context.clone());
        }
        if context == self.active.context {
            return false;
        }
        debug!("Context {} -> {}", self.active.context, context);
        let now = self.now();
        self.switch_to(context, now);
        true
    }

    /// Queue a content-change event for the next pass.
    pub fn notify_content(&mut self, node: Option<N>) -> Push {
        let now = self.now();
        let bypass = self.in_busy_window(now);
        let debounce = self.config.content_debounce_ms;
        let push = self.coalescer.push(node, now, debounce, bypass);
        if push == Push::Throttled && !self.jobs.contains(&JobKey::Flush) {
            if let Some(at) = self.coalescer.flush_at(debounce) {
                debug!("Content event throttled, flushing at {}ms", at);
                self.jobs.insert(JobKey::Flush, at);
            }
        }
        push
    }

    /// Entry point for every notification.
    pub fn evaluate(
        &mut self,
        hint: ChangeHint<N>,
        tree: &mut impl TreeSource<N>,
        sink: &mut impl ActionSink<N>,
    ) -> Evaluation<N> {
        match hint {
            ChangeHint::Context(context) => {
                self.update_context(context);
                self.pass(PassMode::Sweep, tree, sink)
            }
            ChangeHint::Content(node) => {
                if self.notify_content(node) == Push::Throttled {
                    return Evaluation::default();
                }
                self.pass(PassMode::Event, tree, sink)
            }
            ChangeHint::Pending => self.pass(PassMode::Event, tree, sink),
            ChangeHint::Recheck => self.pass(PassMode::Sweep, tree, sink),
            ChangeHint::Forced => self.pass(PassMode::Forced, tree, sink),
            ChangeHint::Delayed(key) => self.pass(PassMode::Delayed(key), tree, sink),
        }
    }

    /// Run every job due by now, in deadline order.
    pub fn run_due(&mut self, tree: &mut impl TreeSource<N>, sink: &mut impl ActionSink<N>) -> Evaluation<N> {
        let now = self.now();
        let mut out = Evaluation::default();
        while let Some(job) = self.jobs.pop_due(now) {
            let mode = match job {
                JobKey::Rule(key) => PassMode::Delayed(key),
                JobKey::Recheck => PassMode::Sweep,
                JobKey::Forced => PassMode::Forced,
                JobKey::Flush => PassMode::Event,
            };
            out.merge(self.pass(mode, tree, sink));
        }
        out
    }

    fn pass(
        &mut self,
        mode: PassMode,
        tree: &mut impl TreeSource<N>,
        sink: &mut impl ActionSink<N>,
    ) -> Evaluation<N> {
        let mut out = Evaluation::default();
        if !self.config.enable_match {
            return out;
        }
        let now = self.now();

        let mut event = None;
        if !matches!(mode, PassMode::Delayed(_)) {
            match self.coalescer.take() {
                Some(batch) => {
                    self.jobs.remove(&JobKey::Flush);
                    if batch.coalesced > 0 {
                        debug!("Coalesced {} content events", batch.coalesced);
                        out.diagnostics.push(Diagnostic::EventDropped {
                            count: batch.coalesced,
                        });
                    }
                    event = batch.node;
                }
                None if mode == PassMode::Event => return out,
                None => {}
            }
        }

        out.ran = true;
        self.passes += 1;
        let active = Arc::clone(&self.active);
        if active.is_empty() {
            return out;
        }

        let mut window: Option<Option<N>> = None;
        for rule in &active.rules {
            let key = rule.key();
            if let PassMode::Delayed(only) = &mode {
                if only != key {
                    continue;
                }
            }
            let status = self.status_of(rule, now);
            if status == RuleStatus::MatchDelay {
                let job = JobKey::Rule(key.clone());
                if !self.jobs.contains(&job) {
                    let due = rule.match_delay_due(&self.state_of(key, now));
                    debug!("Rule {} waits for match delay until {}ms", key, due);
                    self.jobs.insert(job, due);
                }
            }
            if status != RuleStatus::Ok {
                continue;
            }
            if mode == PassMode::Forced && !rule.is_forced_at(&self.state_of(key, now), now) {
                continue;
            }

            if event.as_ref().is_some_and(|node: &N| !node.refresh()) {
                debug!("Event node is stale, reading the window root");
                out.diagnostics.push(Diagnostic::StaleNode);
                event = None;
            }
            let (node, is_root_node) = match &event {
                Some(node) => (node.clone(), false),
                None => match window.get_or_insert_with(|| tree.active_root()) {
                    Some(root) => (root.clone(), true),
                    None => continue,
                },
            };
            let Some(target) = rule.query(&node, is_root_node) else {
                continue;
            };

            let spec = rule.spec();
            let state = self.states.entry(key.clone()).or_insert_with(|| RuleState::fresh(now));
            if spec.action_delay_ms > 0 && state.action_delay_started_at.is_none() {
                state.action_delay_started_at = Some(now);
                let due = now + spec.action_delay_ms;
                debug!("Rule {} matched, acting at {}ms", key, due);
                self.jobs.insert(JobKey::Rule(key.clone()), due);
                continue;
            }
            if self.status_of(rule, now) != RuleStatus::Ok {
                continue;
            }

            let result = sink.perform(&target, spec.action, spec.position);
            if !result.success {
                warn!(
                    "Rule {} failed to {}: {}",
                    key,
                    spec.action,
                    result.detail.as_deref().unwrap_or("no detail")
                );
                out.diagnostics.push(Diagnostic::ActionFailure {
                    rule: key.clone(),
                    detail: result.detail,
                });
                continue;
            }

            let state = self.states.entry(key.clone()).or_insert_with(|| RuleState::fresh(now));
            state.action_count += 1;
            state.last_trigger_at = Some(now);
            state.action_delay_started_at = None;
            let count = state.action_count;
            self.last_trigger = Some((key.clone(), now));
            info!("Rule {} performed {} on {}", key, spec.action, active.context);
            out.triggers.push(TriggerEvent {
                rule: key.clone(),
                action: spec.action,
                at_ms: now,
                context: active.context.clone(),
                count,
                target,
                detail: result.detail,
            });
            self.schedule_sweep(JobKey::Recheck, now);
        }

        if self.in_busy_window(now) {
            self.schedule_sweep(JobKey::Recheck, now);
        } else if active.rules.iter().any(|rule| {
            let forced = rule.is_forced_at(&self.state_of(rule.key(), now), now);
            forced && matches!(self.status_of(rule, now), RuleStatus::Ok | RuleStatus::Cooldown)
        }) {
            self.schedule_sweep(JobKey::Forced, now);
        }
        out
    }

    /// At most one pending sweep at a time.
    fn schedule_sweep(&mut self, job: JobKey, now: u64) {
        if self.jobs.contains(&JobKey::Recheck) || self.jobs.contains(&JobKey::Forced) {
            return;
        }
        self.jobs.insert(job, now + self.config.recheck_delay_ms);
    }

    fn in_busy_window(&self, now: u64) -> bool {
        let recent = |at: Option<u64>, window: u64| at.is_some_and(|at| now.saturating_sub(at) < window);
        recent(self.last_trigger.as_ref().map(|(_, at)| *at), self.config.trigger_window_ms)
            || recent(self.app_changed_at, self.config.app_change_window_ms)
    }

    fn state_of(&self, key: &RuleKey, now: u64) -> RuleState {
        self.states.get(key).copied().unwrap_or_else(|| RuleState::fresh(now))
    }

    fn status_of(&self, rule: &Rule, now: u64) -> RuleStatus {
        let state = self.state_of(rule.key(), now);
        let last = self.last_trigger.as_ref().map(|(key, _)| key);
        rule.status(&state, last, now, self.config.default_action_cd_ms)
    }

    /// Install the rule list for `context` and apply resets.
    ///
    /// An app switch resets every global rule and every rule of the old and
    /// new app. Otherwise rules that reset on activity changes are reset and
    /// newly applicable rules restart their match window.
    fn switch_to(&mut self, context: ScreenContext, now: u64) {
        let previous = Arc::clone(&self.active);
        let next = ActiveRules::build(context, &self.rules);
        if previous.context.app_id != next.context.app_id {
            self.app_changed_at = Some(now);
            let old_app = previous.context.app_id.as_str();
            let reset: Vec<RuleKey> = self
                .rules
                .iter()
                .filter(|rule| {
                    let scope = &rule.spec().scope;
                    scope.is_global() || scope.is_local_to(old_app) || next.contains(rule.key())
                })
                .map(|rule| rule.key().clone())
                .collect();
            for key in &reset {
                if let Some(state) = self.states.get_mut(key) {
                    state.reset(now);
                }
                self.jobs.remove(&JobKey::Rule(key.clone()));
            }
            debug!("App switch reset {} rules", reset.len());
        } else {
            let activity_changed = previous.context != next.context;
            for rule in &next.rules {
                let key = rule.key();
                let Some(state) = self.states.get_mut(key) else {
                    continue;
                };
                if activity_changed && rule.spec().reset_match == ResetMatch::Activity {
                    state.action_delay_started_at = None;
                    state.action_count = 0;
                    self.jobs.remove(&JobKey::Rule(key.clone()));
                }
                if !previous.contains(key) {
                    state.match_changed_at = now;
                }
            }
        }
        self.active = Arc::new(next);
    }
}
