//! Core types and logic for jump.
//!
//! This crate holds the selector language and the rule evaluation scheduler.
//! It performs no I/O and needs no async runtime; the `jump` binary hosts
//! the scheduler on tokio.
//!
//! # Modules
//!
//! - [`selector`]: selector parsing, printing and tree matching
//! - [`node`]: the tree capability selectors run against
//! - [`rule`]: rule definitions, scopes and status computation
//! - [`scheduler`]: event coalescing, delays and action dispatch
//! - [`snapshot`]: captured UI trees implementing [`node::Node`]
//! - [`protocol`]: replay script and report lines
//! - [`action`], [`clock`]: capabilities injected into the scheduler
//! - [`error`]: parse and snapshot errors
//!
//! # Selectors
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `A B` | `B` with any ancestor `A` |
//! | `A > B` | `B` whose parent is `A` |
//! | `A < B` | `B` whose first child is `A` |
//! | `A <<n B` | `B` with descendant `A` |
//! | `A + B` / `A - B` | `B` directly after / before `A` |
//! | `A >(1,3) B` | `A` is the 1st or 3rd ancestor of `B` |
//! | `@A > B` | as `A > B`, but return `A` |
//!
//! ```
//! use jump_core::selector::Selector;
//!
//! let selector = Selector::parse("@LinearLayout > TextView[text^='Skip']").unwrap();
//! assert_eq!(selector.tracked_index(), Some(0));
//! assert_eq!(selector.to_string(), "@LinearLayout > TextView[text^=\"Skip\"]");
//! ```

pub mod action;
pub mod clock;
pub mod error;
pub mod node;
pub mod protocol;
pub mod rule;
pub mod scheduler;
pub mod selector;
pub mod snapshot;

pub use action::{ActionKind, ActionResult, ActionSink, Point, RecordingSink};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{ParseError, ParseErrorKind, SnapshotError};
pub use node::{Node, Value};
pub use rule::{Rule, RuleKey, RuleSet, RuleSpec, RuleStatus, ScreenContext};
pub use scheduler::{ChangeHint, Diagnostic, Evaluation, Scheduler, SchedulerConfig, TreeSource, TriggerEvent};
pub use selector::{MatchOption, Selector};
pub use snapshot::{Snapshot, SnapshotNode};
