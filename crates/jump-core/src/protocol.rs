//! Replay script and report types.
//!
//! A replay script is JSON lines, one timed [`ScriptLine`] each. Reports are
//! JSON lines too, one [`ReportLine`] per trigger or diagnostic.

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::rule::RuleKey;
use crate::scheduler::{Diagnostic, TriggerEvent};
use crate::snapshot::SnapshotNode;

/// One scripted event at a time offset from the start of the replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLine {
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: ScriptEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// The foreground screen changed.
    Context {
        app_id: String,
        #[serde(default)]
        activity_id: Option<String>,
    },
    /// Replace the window with a snapshot file, relative to the script.
    Snapshot { file: String },
    /// Content changed below a snapshot node, or anywhere when absent.
    Content {
        #[serde(default)]
        node: Option<i64>,
    },
    /// A snapshot node can no longer be refreshed.
    Stale { node: i64 },
}

impl ScriptLine {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Compact description of a snapshot node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    pub depth: usize,
    /// `[left, top, right, bottom]`
    pub bounds: [i32; 4],
}

impl From<&SnapshotNode> for NodeSummary {
    fn from(node: &SnapshotNode) -> Self {
        let attr = node.attr();
        Self {
            node_id: node.info().id,
            name: attr.name.clone(),
            id: attr.id.clone(),
            text: attr.text.clone(),
            desc: attr.desc.clone(),
            depth: node.depth(),
            bounds: [attr.left, attr.top, attr.right, attr.bottom],
        }
    }
}

/// A trigger as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub rule: RuleKey,
    pub action: ActionKind,
    pub at_ms: u64,
    pub app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    pub count: u32,
    pub target: NodeSummary,
}

impl From<&TriggerEvent<SnapshotNode>> for TriggerRecord {
    fn from(event: &TriggerEvent<SnapshotNode>) -> Self {
        Self {
            rule: event.rule.clone(),
            action: event.action,
            at_ms: event.at_ms,
            app_id: event.context.app_id.clone(),
            activity_id: event.context.activity_id.clone(),
            count: event.count,
            target: NodeSummary::from(&event.target),
        }
    }
}

/// One line of replay output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportLine {
    Trigger(TriggerRecord),
    Diagnostic {
        at_ms: u64,
        #[serde(flatten)]
        diagnostic: Diagnostic,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_lines_parse() {
        let line = ScriptLine::parse(r#"{"at_ms": 120, "event": "context", "app_id": "com.example"}"#).unwrap();
        assert_eq!(line.at_ms, 120);
        assert_eq!(
            line.event,
            ScriptEvent::Context {
                app_id: "com.example".into(),
                activity_id: None
            }
        );

        let line = ScriptLine::parse(r#"{"at_ms": 0, "event": "content"}"#).unwrap();
        assert_eq!(line.event, ScriptEvent::Content { node: None });

        let line = ScriptLine::parse(r#"{"at_ms": 5, "event": "stale", "node": 3}"#).unwrap();
        assert_eq!(line.event, ScriptEvent::Stale { node: 3 });

        assert!(ScriptLine::parse(r#"{"at_ms": 5, "event": "tap"}"#).is_err());
    }

    #[test]
    fn diagnostic_report_is_flat() {
        let line = ReportLine::Diagnostic {
            at_ms: 40,
            diagnostic: Diagnostic::EventDropped { count: 2 },
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "diagnostic", "at_ms": 40, "kind": "event_dropped", "count": 2})
        );
    }
}
