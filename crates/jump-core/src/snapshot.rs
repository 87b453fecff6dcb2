//! Captured UI trees.
//!
//! A [`Snapshot`] is the serialized form of one window: screen metadata plus
//! a flat node list where each entry names its parent. [`Snapshot::tree`]
//! links the list into a shared [`SnapshotNode`] tree that implements
//! [`Node`], so selectors and the scheduler can run against captures exactly
//! as they would against a live window.
//!
//! # Attributes
//!
//! | Attribute | Type | Source |
//! |-----------|------|--------|
//! | `id`, `vid`, `name`, `text`, `desc` | string or null | captured |
//! | `clickable`, `focusable`, `checkable`, `checked`, `editable`, `longClickable`, `visibleToUser` | boolean | captured |
//! | `left`, `top`, `right`, `bottom` | int | captured |
//! | `width`, `height` | int | derived from bounds |
//! | `childCount`, `index`, `depth` | int | derived from the tree |
//! | `textLen`, `descLen` | int or null | derived from `text` / `desc` |
//! | `parent` | node or null | derived from the tree |
//! | `_id`, `_pid` | int | snapshot node ids |

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::node::{Node, Value};

/// One captured window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub id: i64,
    #[serde(default, alias = "appId")]
    pub app_id: Option<String>,
    #[serde(default, alias = "activityId")]
    pub activity_id: Option<String>,
    #[serde(default, alias = "screenWidth")]
    pub screen_width: i32,
    #[serde(default, alias = "screenHeight")]
    pub screen_height: i32,
    pub nodes: Vec<NodeInfo>,
}

/// A node entry; `pid` is `-1` for the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: i64,
    pub pid: i64,
    #[serde(default)]
    pub attr: AttrInfo,
}

/// Captured node attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttrInfo {
    pub id: Option<String>,
    pub vid: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub desc: Option<String>,
    pub clickable: bool,
    pub focusable: bool,
    pub checkable: bool,
    pub checked: bool,
    pub editable: bool,
    pub long_clickable: bool,
    pub visible_to_user: bool,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Snapshot {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Link the node list into a tree and return its root.
    ///
    /// Children keep the order in which they appear in the list.
    pub fn tree(&self) -> Result<SnapshotNode, SnapshotError> {
        let mut positions: HashMap<i64, usize> = HashMap::with_capacity(self.nodes.len());
        for (position, node) in self.nodes.iter().enumerate() {
            if positions.insert(node.id, position).is_some() {
                return Err(SnapshotError::DuplicateId { id: node.id });
            }
        }

        let mut root: Option<usize> = None;
        let mut parents = vec![None; self.nodes.len()];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (position, node) in self.nodes.iter().enumerate() {
            if node.pid == -1 {
                if let Some(first) = root {
                    return Err(SnapshotError::MultipleRoots {
                        first: self.nodes[first].id,
                        second: node.id,
                    });
                }
                root = Some(position);
                continue;
            }
            let parent = *positions.get(&node.pid).ok_or(SnapshotError::DanglingParent {
                id: node.id,
                pid: node.pid,
            })?;
            parents[position] = Some(parent);
            children[parent].push(position);
        }
        let root = root.ok_or(SnapshotError::MissingRoot)?;

        let mut index = vec![0; self.nodes.len()];
        let mut depth = vec![0; self.nodes.len()];
        let mut reached = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        reached[root] = true;
        while let Some(position) = stack.pop() {
            for (i, child) in children[position].iter().enumerate() {
                index[*child] = i;
                depth[*child] = depth[position] + 1;
                reached[*child] = true;
                stack.push(*child);
            }
        }
        if let Some(lost) = reached.iter().position(|r| !r) {
            return Err(SnapshotError::Unreachable {
                id: self.nodes[lost].id,
            });
        }

        let data = TreeData {
            nodes: self.nodes.clone(),
            parents,
            children,
            index,
            depth,
            stale: (0..self.nodes.len()).map(|_| AtomicBool::new(false)).collect(),
        };
        Ok(SnapshotNode {
            tree: Arc::new(data),
            position: root,
        })
    }
}

#[derive(Debug)]
struct TreeData {
    nodes: Vec<NodeInfo>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    index: Vec<usize>,
    depth: Vec<usize>,
    stale: Vec<AtomicBool>,
}

/// A handle to one node of a linked snapshot. Cheap to clone; equal when
/// both handles point at the same node of the same tree.
#[derive(Clone)]
pub struct SnapshotNode {
    tree: Arc<TreeData>,
    position: usize,
}

impl PartialEq for SnapshotNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.position == other.position
    }
}

impl fmt::Debug for SnapshotNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info();
        f.debug_struct("SnapshotNode")
            .field("id", &info.id)
            .field("name", &info.attr.name)
            .finish()
    }
}

impl SnapshotNode {
    fn at(&self, position: usize) -> SnapshotNode {
        SnapshotNode {
            tree: Arc::clone(&self.tree),
            position,
        }
    }

    pub fn info(&self) -> &NodeInfo {
        &self.tree.nodes[self.position]
    }

    pub fn attr(&self) -> &AttrInfo {
        &self.info().attr
    }

    /// Node with the given snapshot id anywhere in this tree.
    pub fn by_id(&self, id: i64) -> Option<SnapshotNode> {
        self.tree
            .nodes
            .iter()
            .position(|n| n.id == id)
            .map(|position| self.at(position))
    }

    /// Make every later [`Node::refresh`] on this node fail, as if the
    /// element had left the screen.
    pub fn mark_stale(&self) {
        self.tree.stale[self.position].store(true, Ordering::SeqCst);
    }

    pub fn depth(&self) -> usize {
        self.tree.depth[self.position]
    }

    fn descendants_and_self(&self) -> Vec<SnapshotNode> {
        let mut out = Vec::new();
        let mut stack = vec![self.position];
        while let Some(position) = stack.pop() {
            out.push(self.at(position));
            stack.extend(self.tree.children[position].iter().rev());
        }
        out
    }
}

fn int(value: impl TryInto<i64>) -> Value<SnapshotNode> {
    value.try_into().map(Value::Int).unwrap_or(Value::Null)
}

impl Node for SnapshotNode {
    fn attribute(&self, name: &str) -> Value<Self> {
        let attr = self.attr();
        match name {
            "id" => attr.id.clone().into(),
            "vid" => attr.vid.clone().into(),
            "name" => attr.name.clone().into(),
            "text" => attr.text.clone().into(),
            "desc" => attr.desc.clone().into(),
            "textLen" => attr.text.as_ref().map_or(Value::Null, |t| int(t.chars().count())),
            "descLen" => attr.desc.as_ref().map_or(Value::Null, |d| int(d.chars().count())),
            "clickable" => Value::Bool(attr.clickable),
            "focusable" => Value::Bool(attr.focusable),
            "checkable" => Value::Bool(attr.checkable),
            "checked" => Value::Bool(attr.checked),
            "editable" => Value::Bool(attr.editable),
            "longClickable" => Value::Bool(attr.long_clickable),
            "visibleToUser" => Value::Bool(attr.visible_to_user),
            "left" => int(attr.left),
            "top" => int(attr.top),
            "right" => int(attr.right),
            "bottom" => int(attr.bottom),
            "width" => int(i64::from(attr.right) - i64::from(attr.left)),
            "height" => int(i64::from(attr.bottom) - i64::from(attr.top)),
            "childCount" => int(self.tree.children[self.position].len()),
            "index" => int(self.tree.index[self.position]),
            "depth" => int(self.tree.depth[self.position]),
            "parent" => self.parent().map_or(Value::Null, Value::Node),
            "_id" => int(self.info().id),
            "_pid" => int(self.info().pid),
            _ => Value::Null,
        }
    }

    fn children(&self) -> Vec<Self> {
        self.tree.children[self.position]
            .iter()
            .map(|c| self.at(*c))
            .collect()
    }

    fn parent(&self) -> Option<Self> {
        self.tree.parents[self.position].map(|p| self.at(p))
    }

    fn index_among_siblings(&self) -> usize {
        self.tree.index[self.position]
    }

    fn refresh(&self) -> bool {
        !self.tree.stale[self.position].load(Ordering::SeqCst)
    }

    /// `id` and `vid` compare exactly; `text` is a containment lookup, the
    /// way platform text search behaves.
    fn find_by_attribute(&self, name: &str, value: &str) -> Option<Vec<Self>> {
        if !matches!(name, "id" | "vid" | "text") {
            return None;
        }
        let contains = name == "text";
        let found = self
            .descendants_and_self()
            .into_iter()
            .filter(|n| {
                let attr = n.attr();
                let actual = match name {
                    "id" => attr.id.as_deref(),
                    "vid" => attr.vid.as_deref(),
                    _ => attr.text.as_deref(),
                };
                actual.is_some_and(|v| if contains { v.contains(value) } else { v == value })
            })
            .collect();
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{MatchOption, Selector};

    const CAPTURE: &str = r#"{
        "id": 1700000000000,
        "appId": "com.example.app",
        "activityId": "com.example.app.MainActivity",
        "screenWidth": 1080,
        "screenHeight": 2400,
        "nodes": [
            {"id": 0, "pid": -1, "attr": {"name": "android.widget.FrameLayout", "right": 1080, "bottom": 2400}},
            {"id": 1, "pid": 0, "attr": {"name": "android.widget.TextView", "text": "Advertisement", "id": "com.example.app:id/title"}},
            {"id": 2, "pid": 0, "attr": {"name": "android.widget.Button", "text": "Skip 5s", "clickable": true,
                                         "left": 900, "top": 40, "right": 1040, "bottom": 120, "vid": "skip"}},
            {"id": 3, "pid": 2, "attr": {"name": "android.view.View"}}
        ]
    }"#;

    fn root() -> SnapshotNode {
        Snapshot::from_json(CAPTURE).unwrap().tree().unwrap()
    }

    #[test]
    fn decodes_camel_case_capture() {
        let snapshot = Snapshot::from_json(CAPTURE).unwrap();
        assert_eq!(snapshot.app_id.as_deref(), Some("com.example.app"));
        assert_eq!(snapshot.screen_width, 1080);
        assert_eq!(snapshot.nodes.len(), 4);
    }

    #[test]
    fn derived_attributes() {
        let skip = root().by_id(2).unwrap();
        assert_eq!(skip.attribute("width"), Value::Int(140));
        assert_eq!(skip.attribute("height"), Value::Int(80));
        assert_eq!(skip.attribute("index"), Value::Int(1));
        assert_eq!(skip.attribute("depth"), Value::Int(1));
        assert_eq!(skip.attribute("childCount"), Value::Int(1));
        assert_eq!(skip.attribute("textLen"), Value::Int(7));
        assert_eq!(skip.attribute("desc"), Value::Null);
        let Value::Node(parent) = skip.attribute("parent") else {
            panic!("parent should be a node");
        };
        assert_eq!(parent.info().id, 0);
        assert_eq!(Some(parent), skip.parent());
    }

    #[test]
    fn extreme_bounds_do_not_overflow() {
        let snapshot = Snapshot::from_json(
            r#"{"nodes": [{"id": 0, "pid": -1, "attr": {"name": "View",
                "left": -1, "right": 2147483647, "top": 2147483647, "bottom": -2147483648}}]}"#,
        )
        .unwrap();
        let node = snapshot.tree().unwrap();
        assert_eq!(node.attribute("width"), Value::Int(2_147_483_648));
        assert_eq!(node.attribute("height"), Value::Int(-4_294_967_295));
    }

    #[test]
    fn selectors_run_against_snapshot() {
        let root = root();
        let selector = Selector::parse("FrameLayout > Button[text^='Skip'][clickable=true]").unwrap();
        let found = selector.query(&root, MatchOption::default(), false).unwrap();
        assert_eq!(found.info().id, 2);

        let tracked = Selector::parse("@TextView + Button").unwrap();
        assert_eq!(tracked.query(&root, MatchOption::default(), false).unwrap().info().id, 1);
    }

    #[test]
    fn quick_find_uses_index() {
        let root = root();
        assert_eq!(root.find_by_attribute("vid", "skip").unwrap().len(), 1);
        assert_eq!(root.find_by_attribute("text", "Skip").unwrap().len(), 1);
        assert!(root.find_by_attribute("desc", "x").is_none());

        let selector = Selector::parse("[vid='skip']").unwrap();
        let option = MatchOption {
            quick_find: true,
            fast_query: false,
        };
        assert_eq!(selector.query(&root, option, false).unwrap().info().id, 2);
        let partial = Selector::parse("[text='Skip']").unwrap();
        assert!(partial.query(&root, option, false).is_none());
    }

    #[test]
    fn stale_marking() {
        let root = root();
        let skip = root.by_id(2).unwrap();
        assert!(skip.refresh());
        skip.mark_stale();
        assert!(!skip.refresh());
        assert!(root.refresh());
        assert!(!root.by_id(2).unwrap().refresh());
    }

    fn with_nodes(nodes: &[(i64, i64)]) -> Snapshot {
        Snapshot {
            id: 0,
            app_id: None,
            activity_id: None,
            screen_width: 0,
            screen_height: 0,
            nodes: nodes
                .iter()
                .map(|(id, pid)| NodeInfo {
                    id: *id,
                    pid: *pid,
                    attr: AttrInfo::default(),
                })
                .collect(),
        }
    }

    #[test]
    fn malformed_trees_rejected() {
        assert_eq!(with_nodes(&[(0, 5)]).tree().unwrap_err(), SnapshotError::DanglingParent { id: 0, pid: 5 });
        assert_eq!(with_nodes(&[(1, 2), (2, 1)]).tree().unwrap_err(), SnapshotError::MissingRoot);
        assert_eq!(
            with_nodes(&[(0, -1), (1, -1)]).tree().unwrap_err(),
            SnapshotError::MultipleRoots { first: 0, second: 1 }
        );
        assert_eq!(with_nodes(&[(0, -1), (0, 0)]).tree().unwrap_err(), SnapshotError::DuplicateId { id: 0 });
        assert_eq!(
            with_nodes(&[(0, -1), (1, 2), (2, 1)]).tree().unwrap_err(),
            SnapshotError::Unreachable { id: 1 }
        );
    }
}
