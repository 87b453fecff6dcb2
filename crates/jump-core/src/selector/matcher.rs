//! Tree matching.
//!
//! Candidates for the last segment are visited in document order. From each
//! candidate the chain is checked right to left: the combinator between two
//! segments enumerates nodes related to the current one, filtered by
//! position, and every qualifying node is tried before backtracking.

use std::collections::VecDeque;

use super::ast::{
    CompareOperator, ConnectOperator, ConnectSegment, Expression, PropertySegment, ValueExpression,
};
use super::Selector;
use crate::node::{Node, Value};

/// Attributes quick-find may hand to [`Node::find_by_attribute`].
const QUICK_FIND_ATTRIBUTES: [&str; 3] = ["id", "vid", "text"];

/// Matching strategy switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOption {
    /// Seed candidates from an indexed lookup on a literal `id`, `vid` or
    /// `text` equality of the last segment.
    pub quick_find: bool,
    /// Visit candidates breadth first so the shallowest match wins.
    pub fast_query: bool,
}

impl PropertySegment {
    /// Name and every predicate hold for `node`.
    pub fn matches<N: Node>(&self, node: &N) -> bool {
        self.name_matches(node) && self.expressions.iter().all(|e| e.evaluate(node))
    }

    fn name_matches<N: Node>(&self, node: &N) -> bool {
        if self.name.is_empty() || self.name == "*" {
            return true;
        }
        let Value::Str(actual) = node.attribute("name") else {
            return false;
        };
        if actual == self.name {
            return true;
        }
        // Short names match the last component of a qualified class name.
        !self.name.contains('.')
            && actual
                .strip_suffix(self.name.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// A top-level literal equality usable for an indexed lookup.
    fn quick_find_key(&self) -> Option<(&'static str, &str)> {
        self.expressions.iter().find_map(|expression| {
            let Expression::Binary(binary) = expression else {
                return None;
            };
            if binary.operator != CompareOperator::Equal {
                return None;
            }
            let (ValueExpression::Identifier { name, .. }, ValueExpression::String(literal)) =
                (&binary.left, &binary.right)
            else {
                return None;
            };
            let attribute = QUICK_FIND_ATTRIBUTES.iter().find(|a| **a == name.as_str())?;
            Some((*attribute, literal.value.as_str()))
        })
    }
}

impl ConnectSegment {
    /// Nodes related to `node` whose position passes the filter, in
    /// traversal order.
    pub fn traverse<N: Node>(&self, node: &N) -> Vec<N> {
        let limit = self.expression.max_index();
        let within = |position: usize| limit.map_or(true, |l| position <= l);
        let mut out = Vec::new();
        let mut keep = |position: usize, candidate: N| {
            if self.expression.accepts(position) {
                out.push(candidate);
            }
        };
        match self.operator {
            ConnectOperator::Ancestor => {
                let mut current = node.parent();
                let mut position = 1;
                while let Some(parent) = current {
                    if !within(position) {
                        break;
                    }
                    current = parent.parent();
                    keep(position, parent);
                    position += 1;
                }
            }
            ConnectOperator::Child => {
                for (i, child) in node.children().into_iter().enumerate() {
                    if !within(i + 1) {
                        break;
                    }
                    keep(i + 1, child);
                }
            }
            ConnectOperator::Descendant => {
                let mut stack: Vec<N> = node.children().into_iter().rev().collect();
                let mut position = 1;
                while let Some(current) = stack.pop() {
                    if !within(position) {
                        break;
                    }
                    stack.extend(current.children().into_iter().rev());
                    keep(position, current);
                    position += 1;
                }
            }
            ConnectOperator::BeforeBrother | ConnectOperator::AfterBrother => {
                let Some(parent) = node.parent() else {
                    return Vec::new();
                };
                let siblings = parent.children();
                let index = node.index_among_siblings();
                let ordered: Vec<N> = if self.operator == ConnectOperator::BeforeBrother {
                    siblings.into_iter().take(index).rev().collect()
                } else {
                    siblings.into_iter().skip(index + 1).collect()
                };
                for (i, sibling) in ordered.into_iter().enumerate() {
                    if !within(i + 1) {
                        break;
                    }
                    keep(i + 1, sibling);
                }
            }
        }
        out
    }
}

impl Selector {
    /// Match the chain with its last segment anchored at `node`.
    ///
    /// Returns the tracked segment's node, or `node` itself when nothing is
    /// tracked.
    pub fn match_node<N: Node>(&self, node: &N) -> Option<N> {
        let last = self.segments.len().checked_sub(1)?;
        let mut trail = Vec::with_capacity(self.segments.len());
        if !self.match_from(last, node, &mut trail) {
            return None;
        }
        let tracked = self.tracked_index().unwrap_or(last);
        trail.get(last - tracked).cloned()
    }

    fn match_from<N: Node>(&self, index: usize, node: &N, trail: &mut Vec<N>) -> bool {
        if !self.segments[index].matches(node) {
            return false;
        }
        trail.push(node.clone());
        if index == 0 {
            return true;
        }
        for candidate in self.connects[index - 1].traverse(node) {
            if self.match_from(index - 1, &candidate, trail) {
                return true;
            }
        }
        trail.pop();
        false
    }

    /// First match under `root`.
    ///
    /// `root` itself is a candidate only when `is_root_node` is set.
    pub fn query<N: Node>(&self, root: &N, option: MatchOption, is_root_node: bool) -> Option<N> {
        if option.quick_find {
            if let Some(candidates) = self.quick_candidates(root, is_root_node) {
                return candidates.iter().find_map(|c| self.match_node(c));
            }
        }
        let mut found = None;
        walk(root, is_root_node, option.fast_query, |candidate| {
            found = self.match_node(candidate);
            found.is_some()
        });
        found
    }

    /// Every match under `root`, in visiting order, without duplicates.
    pub fn query_all<N: Node>(&self, root: &N, option: MatchOption, is_root_node: bool) -> Vec<N> {
        let mut out: Vec<N> = Vec::new();
        if option.quick_find {
            if let Some(candidates) = self.quick_candidates(root, is_root_node) {
                for found in candidates.iter().filter_map(|c| self.match_node(c)) {
                    push_unique(&mut out, found);
                }
                return out;
            }
        }
        walk(root, is_root_node, option.fast_query, |candidate| {
            if let Some(found) = self.match_node(candidate) {
                push_unique(&mut out, found);
            }
            false
        });
        out
    }

    fn quick_candidates<N: Node>(&self, root: &N, is_root_node: bool) -> Option<Vec<N>> {
        let (attribute, value) = self.segments.last()?.quick_find_key()?;
        let mut candidates = root.find_by_attribute(attribute, value)?;
        if !is_root_node {
            candidates.retain(|c| c != root);
        }
        Some(candidates)
    }
}

fn push_unique<N: PartialEq>(out: &mut Vec<N>, node: N) {
    if !out.contains(&node) {
        out.push(node);
    }
}

/// Visit `root`'s subtree until `visit` returns `true`.
fn walk<N: Node>(root: &N, include_root: bool, breadth_first: bool, mut visit: impl FnMut(&N) -> bool) {
    let mut queue: VecDeque<N> = VecDeque::new();
    if include_root {
        queue.push_back(root.clone());
    } else {
        queue.extend(root.children());
    }
    while let Some(node) = queue.pop_front() {
        if visit(&node) {
            return;
        }
        let children = node.children();
        if breadth_first {
            queue.extend(children);
        } else {
            for child in children.into_iter().rev() {
                queue.push_front(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{tree, TestNode};

    fn query(selector: &str, root: &TestNode) -> Option<String> {
        Selector::parse(selector)
            .unwrap()
            .query(root, MatchOption::default(), false)
            .map(|n| n.label())
    }

    fn query_all(selector: &str, root: &TestNode) -> Vec<String> {
        Selector::parse(selector)
            .unwrap()
            .query_all(root, MatchOption::default(), false)
            .iter()
            .map(|n| n.label())
            .collect()
    }

    const SCREEN: &str = "
FrameLayout label=root
  LinearLayout label=bar
    TextView label=title text=Ad
    ImageView label=close desc=close clickable=true
  android.widget.LinearLayout label=list
    Item label=i1 text=one
    Item label=i2 text=two
    Item label=i3 text=three
    Item label=i4 text=four
    Item label=i5 text=five
  Window label=window
    android.widget.Button label=ok text=OK
";

    #[test]
    fn descendant_match_by_default() {
        let root = tree("Root label=root\n  Window label=window\n    Button label=ok text=OK\n");
        assert_eq!(query("Button[text=\"OK\"]", &root), Some("ok".to_string()));
        assert_eq!(query("Root Button", &root), Some("ok".to_string()));
        assert_eq!(query("Window Root", &root), None);
    }

    #[test]
    fn root_is_candidate_only_when_flagged() {
        let root = tree("Root label=root\n  Window label=window\n");
        let selector = Selector::parse("Root").unwrap();
        assert!(selector.query(&root, MatchOption::default(), false).is_none());
        let found = selector.query(&root, MatchOption::default(), true);
        assert_eq!(found.map(|n| n.label()), Some("root".to_string()));
    }

    #[test]
    fn short_name_matches_qualified_class() {
        let root = tree(SCREEN);
        assert_eq!(query("Button", &root), Some("ok".to_string()));
        assert_eq!(query("widget.Button", &root), None);
        assert_eq!(query("android.widget.Button", &root), Some("ok".to_string()));
        assert_eq!(query("utton", &root), None);
    }

    #[test]
    fn sibling_combinators() {
        let root = tree(SCREEN);
        assert_eq!(query("TextView + ImageView", &root), Some("close".to_string()));
        assert_eq!(query("ImageView - TextView", &root), Some("title".to_string()));
        assert_eq!(query("ImageView + TextView", &root), None);
        assert_eq!(query("[text='one'] +3 Item", &root), Some("i4".to_string()));
        assert_eq!(query("[text='five'] -(1,4) Item", &root), Some("i1".to_string()));
    }

    #[test]
    fn parent_and_child_combinators() {
        let root = tree(SCREEN);
        assert_eq!(query("LinearLayout > [text='Ad']", &root), Some("title".to_string()));
        assert_eq!(query("FrameLayout >2 [text='Ad']", &root), Some("title".to_string()));
        assert_eq!(query("FrameLayout > [text='Ad']", &root), None);
        assert_eq!(query("[text='Ad'] < LinearLayout", &root), Some("bar".to_string()));
        assert_eq!(query("Item <5 LinearLayout", &root), Some("list".to_string()));
        assert_eq!(query("Item <6 LinearLayout", &root), None);
    }

    #[test]
    fn descendant_operator_counts_preorder() {
        let root = tree(SCREEN);
        // Pre-order below root: bar, title, close, list, ...
        assert_eq!(query("ImageView <<3 FrameLayout", &root), None);
        let found = Selector::parse("ImageView <<3 FrameLayout")
            .unwrap()
            .query(&root, MatchOption::default(), true);
        assert_eq!(found.map(|n| n.label()), Some("root".to_string()));
        let none = Selector::parse("ImageView <<2 FrameLayout")
            .unwrap()
            .query(&root, MatchOption::default(), true);
        assert!(none.is_none());
    }

    #[test]
    fn position_filters() {
        let root = tree(SCREEN);
        let items = query_all("[label='list'] > Item", &root);
        assert_eq!(items, vec!["i1", "i2", "i3", "i4", "i5"]);
        let even_index = query_all("[label='list'] > Item[index.rem(2)=0]", &root);
        assert_eq!(even_index, vec!["i1", "i3", "i5"]);

        assert_eq!(query("@Item[text='three'] <(2n+1) [label='list']", &root), Some("i3".to_string()));
        assert_eq!(query("@Item[text='four'] <(2n+1) [label='list']", &root), None);
        assert_eq!(query("@Item[text='two'] <(1,2,5) [label='list']", &root), Some("i2".to_string()));
        assert_eq!(query("@Item[text='three'] <(1,2,5) [label='list']", &root), None);
        assert_eq!(query("@Item[text='three'] <(-n+3) [label='list']", &root), Some("i3".to_string()));
        assert_eq!(query("@Item[text='four'] <(-n+3) [label='list']", &root), None);
    }

    #[test]
    fn tracked_segment_is_result() {
        let root = tree(SCREEN);
        assert_eq!(query("@LinearLayout > [text='Ad']", &root), Some("bar".to_string()));
        assert_eq!(query("LinearLayout > [text='Ad']", &root), Some("title".to_string()));
    }

    #[test]
    fn backtracking_tries_every_candidate() {
        let root = tree(
            "
Root label=root
  A label=a
    B label=b1
      B label=b2
        C label=c
",
        );
        // The nearest B ancestor has the wrong parent; the next one fits.
        assert_eq!(query("@A > B C", &root), Some("a".to_string()));
        assert_eq!(query("Root > B C", &root), None);
    }

    #[test]
    fn fast_query_prefers_shallow() {
        let root = tree(
            "
Root label=root
  A label=a
    Leaf label=deep
  Leaf label=shallow
",
        );
        let selector = Selector::parse("Leaf").unwrap();
        let dfs = selector.query(&root, MatchOption::default(), false);
        assert_eq!(dfs.map(|n| n.label()), Some("deep".to_string()));
        let bfs = selector.query(
            &root,
            MatchOption {
                fast_query: true,
                ..Default::default()
            },
            false,
        );
        assert_eq!(bfs.map(|n| n.label()), Some("shallow".to_string()));
    }

    #[test]
    fn quick_find_without_index_falls_back_to_walk() {
        let root = tree(SCREEN);
        let selector = Selector::parse("[text=\"OK\"]").unwrap();
        let option = MatchOption {
            quick_find: true,
            fast_query: false,
        };
        assert_eq!(selector.query(&root, option, false).map(|n| n.label()), Some("ok".to_string()));
    }

    #[test]
    fn query_all_collects_every_match() {
        let root = tree(SCREEN);
        assert_eq!(query_all("Item[text$='e']", &root), vec!["i1", "i3", "i5"]);
    }
}
