//! Replays a timed event script through the engine.
//!
//! Script lines are applied at their `at_ms` offsets in real time (or paused
//! tokio time under test). Actions go to a [`RecordingSink`], so nothing is
//! clicked; the output is the stream of triggers and diagnostics.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use jump_core::protocol::{ReportLine, ScriptEvent, ScriptLine, TriggerRecord};
use jump_core::{RecordingSink, RuleSet, SchedulerConfig, ScreenContext, Snapshot, SnapshotNode};

use super::{Engine, EngineMessage, EngineOutput};

/// Inputs of one replay.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub rules: PathBuf,
    pub script: PathBuf,
    pub config: SchedulerConfig,
    /// Make every action fail.
    pub fail_actions: bool,
    /// Time to keep running after the last script line.
    pub settle: Duration,
}

/// A report line with the wall-clock time it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct StampedLine {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub line: ReportLine,
}

impl From<EngineOutput<SnapshotNode>> for StampedLine {
    fn from(output: EngineOutput<SnapshotNode>) -> Self {
        match output {
            EngineOutput::Trigger { at, event } => Self {
                timestamp: at,
                line: ReportLine::Trigger(TriggerRecord::from(&event)),
            },
            EngineOutput::Diagnostic {
                at,
                at_ms,
                diagnostic,
            } => Self {
                timestamp: at,
                line: ReportLine::Diagnostic { at_ms, diagnostic },
            },
        }
    }
}

pub fn load_rules(path: &Path) -> Result<RuleSet> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read rules {:?}", path))?;
    RuleSet::from_json(&text).with_context(|| format!("Failed to parse rules {:?}", path))
}

pub fn load_config(path: &Path) -> Result<SchedulerConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse config {:?}", path))
}

pub fn load_snapshot(path: &Path) -> Result<SnapshotNode> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read snapshot {:?}", path))?;
    let snapshot = Snapshot::from_json(&text).with_context(|| format!("Failed to parse snapshot {:?}", path))?;
    snapshot
        .tree()
        .with_context(|| format!("Invalid snapshot tree {:?}", path))
}

/// Parse a JSON-lines script. Blank lines are skipped; offsets must not
/// decrease.
pub fn load_script(path: &Path) -> Result<Vec<ScriptLine>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read script {:?}", path))?;
    let mut lines: Vec<ScriptLine> = Vec::new();
    for (number, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let line = ScriptLine::parse(raw).with_context(|| format!("{:?} line {}", path, number + 1))?;
        if let Some(previous) = lines.last() {
            if line.at_ms < previous.at_ms {
                bail!(
                    "{:?} line {}: at_ms {} is before the previous line ({})",
                    path,
                    number + 1,
                    line.at_ms,
                    previous.at_ms
                );
            }
        }
        lines.push(line);
    }
    Ok(lines)
}

fn find(window: &Option<SnapshotNode>, id: i64) -> Result<SnapshotNode> {
    let Some(root) = window else {
        bail!("Node {} referenced before any snapshot was loaded", id);
    };
    root.by_id(id)
        .with_context(|| format!("Node {} is not in the current snapshot", id))
}

/// Run a replay to completion and collect its output.
pub async fn replay(options: &ReplayOptions) -> Result<Vec<StampedLine>> {
    let rules = load_rules(&options.rules)?;
    let script = load_script(&options.script)?;
    let base = options.script.parent().map(Path::to_path_buf).unwrap_or_default();
    let sink = if options.fail_actions {
        RecordingSink::failing()
    } else {
        RecordingSink::succeeding()
    };

    info!("Replaying {} events against {} rules", script.len(), rules.rules.len());
    let (engine, mut output) = Engine::spawn(options.config, sink);
    let start = Instant::now();
    engine.send(EngineMessage::Rules(rules)).await?;

    let mut window: Option<SnapshotNode> = None;
    for line in script {
        tokio::time::sleep_until(start + Duration::from_millis(line.at_ms)).await;
        debug!("Script event at {}ms: {:?}", line.at_ms, line.event);
        match line.event {
            ScriptEvent::Context { app_id, activity_id } => {
                engine
                    .send(EngineMessage::Context(ScreenContext { app_id, activity_id }))
                    .await?;
            }
            ScriptEvent::Snapshot { file } => {
                let root = load_snapshot(&base.join(&file))?;
                window = Some(root.clone());
                engine.send(EngineMessage::Window(Some(root))).await?;
                engine.send(EngineMessage::Content(None)).await?;
            }
            ScriptEvent::Content { node } => {
                let node = node.map(|id| find(&window, id)).transpose()?;
                engine.send(EngineMessage::Content(node)).await?;
            }
            ScriptEvent::Stale { node } => find(&window, node)?.mark_stale(),
        }
    }

    tokio::time::sleep(options.settle).await;
    engine.shutdown().await?;

    let mut lines = Vec::new();
    while let Some(out) = output.recv().await {
        lines.push(StampedLine::from(out));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"{"rules": [
        {"key": "skip", "scope": {"type": "app", "app_id": "com.example"},
         "matches": ["[text^='Skip']"], "action_delay_ms": 200}
    ]}"#;

    const SPLASH: &str = r#"{"app_id": "com.example", "nodes": [
        {"id": 0, "pid": -1, "attr": {"name": "FrameLayout"}},
        {"id": 1, "pid": 0, "attr": {"name": "TextView", "text": "Skip"}}
    ]}"#;

    struct Fixture {
        dir: PathBuf,
    }

    impl Fixture {
        fn new(name: &str, script: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("jump-replay-{}-{}", name, std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("rules.json"), RULES).unwrap();
            std::fs::write(dir.join("splash.json"), SPLASH).unwrap();
            std::fs::write(dir.join("script.jsonl"), script).unwrap();
            Self { dir }
        }

        fn options(&self, fail_actions: bool) -> ReplayOptions {
            ReplayOptions {
                rules: self.dir.join("rules.json"),
                script: self.dir.join("script.jsonl"),
                config: SchedulerConfig::default(),
                fail_actions,
                settle: Duration::from_millis(1000),
            }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    const SCRIPT: &str = r#"{"at_ms": 0, "event": "context", "app_id": "com.example", "activity_id": "com.example.Splash"}

{"at_ms": 100, "event": "snapshot", "file": "splash.json"}
"#;

    #[tokio::test(start_paused = true)]
    async fn replay_reports_delayed_trigger() {
        let fixture = Fixture::new("trigger", SCRIPT);
        let lines = replay(&fixture.options(false)).await.unwrap();
        let triggers: Vec<&TriggerRecord> = lines
            .iter()
            .filter_map(|l| match &l.line {
                ReportLine::Trigger(t) => Some(t),
                ReportLine::Diagnostic { .. } => None,
            })
            .collect();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].at_ms, 300);
        assert_eq!(triggers[0].target.node_id, 1);
        assert_eq!(triggers[0].activity_id.as_deref(), Some("com.example.Splash"));

        let json = serde_json::to_value(&lines[0]).unwrap();
        assert_eq!(json["type"], "trigger");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_actions_are_reported() {
        let fixture = Fixture::new("fail", SCRIPT);
        let lines = replay(&fixture.options(true)).await.unwrap();
        assert!(lines.iter().all(|l| !matches!(l.line, ReportLine::Trigger(_))));
        assert!(lines.iter().any(|l| serde_json::to_value(l).unwrap()["kind"] == "action_failure"));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_node_is_an_error() {
        let script = format!("{}{}", SCRIPT, r#"{"at_ms": 150, "event": "content", "node": 42}"#);
        let fixture = Fixture::new("unknown", &script);
        let err = replay(&fixture.options(false)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Node 42"));
    }

    #[test]
    fn script_offsets_must_not_decrease() {
        let fixture = Fixture::new(
            "order",
            "{\"at_ms\": 50, \"event\": \"content\"}\n{\"at_ms\": 10, \"event\": \"content\"}\n",
        );
        let err = load_script(&fixture.dir.join("script.jsonl")).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
