//! Actions dispatched against matched nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What to do with the node a rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Accessibility click, falling back to a center tap.
    #[default]
    Click,
    /// Accessibility click only.
    ClickNode,
    /// Tap at the node's center (or the rule's position).
    ClickCenter,
    LongClick,
    LongClickNode,
    LongClickCenter,
    /// Global back navigation.
    Back,
    /// Match only; nothing is performed.
    None,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Click => "click",
            ActionKind::ClickNode => "clickNode",
            ActionKind::ClickCenter => "clickCenter",
            ActionKind::LongClick => "longClick",
            ActionKind::LongClickNode => "longClickNode",
            ActionKind::LongClickCenter => "longClickCenter",
            ActionKind::Back => "back",
            ActionKind::None => "none",
        };
        write!(f, "{}", name)
    }
}

/// A screen position relative to the node's bounds, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Outcome of one dispatched action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: ActionKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ActionResult {
    pub fn ok(action: ActionKind) -> Self {
        Self {
            action,
            success: true,
            detail: None,
        }
    }

    pub fn failed(action: ActionKind, detail: impl Into<String>) -> Self {
        Self {
            action,
            success: false,
            detail: Some(detail.into()),
        }
    }
}

/// Performs actions on behalf of the scheduler.
///
/// Only a successful result counts as a trigger; failures are reported and
/// leave the rule's counters untouched.
pub trait ActionSink<N> {
    fn perform(&mut self, node: &N, action: ActionKind, position: Option<Point>) -> ActionResult;
}

/// A sink that records every request and always reports the same outcome.
///
/// Used for dry runs and replays where no real device is attached.
#[derive(Debug, Clone)]
pub struct RecordingSink<N> {
    pub performed: Vec<(N, ActionKind)>,
    succeed: bool,
}

impl<N> Default for RecordingSink<N> {
    fn default() -> Self {
        Self::succeeding()
    }
}

impl<N> RecordingSink<N> {
    pub fn succeeding() -> Self {
        Self {
            performed: Vec::new(),
            succeed: true,
        }
    }

    pub fn failing() -> Self {
        Self {
            performed: Vec::new(),
            succeed: false,
        }
    }
}

impl<N: Clone> ActionSink<N> for RecordingSink<N> {
    fn perform(&mut self, node: &N, action: ActionKind, _position: Option<Point>) -> ActionResult {
        self.performed.push((node.clone(), action));
        if self.succeed {
            ActionResult::ok(action)
        } else {
            ActionResult::failed(action, "action rejected by sink")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_serde_names() {
        let kind: ActionKind = serde_json::from_str("\"long_click_center\"").unwrap();
        assert_eq!(kind, ActionKind::LongClickCenter);
        assert_eq!(serde_json::to_string(&ActionKind::ClickNode).unwrap(), "\"click_node\"");
        assert_eq!(ActionKind::default(), ActionKind::Click);
    }

    #[test]
    fn recording_sink_outcomes() {
        let mut ok = RecordingSink::succeeding();
        assert!(ok.perform(&1u32, ActionKind::Back, None).success);
        assert_eq!(ok.performed, vec![(1, ActionKind::Back)]);

        let mut bad = RecordingSink::failing();
        let result = bad.perform(&2u32, ActionKind::Click, None);
        assert!(!result.success);
        assert!(result.detail.is_some());
        assert_eq!(bad.performed.len(), 1);
    }
}
