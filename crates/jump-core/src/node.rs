//! The node capability selectors are evaluated against.
//!
//! The engine never sees a concrete UI framework. Anything that can report
//! attributes, children, a parent and its position among siblings can be
//! matched: the snapshot tree in [`crate::snapshot`], an accessibility
//! bridge, or a hand-built test tree.

/// A value produced by attribute lookup or expression evaluation.
///
/// Missing attributes, unknown members and failed calls all evaluate to
/// [`Value::Null`]; only `Null` equals `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<N> {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Node(N),
}

impl<N> Value<N> {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Name of the value's type, for logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Node(_) => "node",
        }
    }
}

impl<N> From<bool> for Value<N> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<N> From<i64> for Value<N> {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl<N> From<&str> for Value<N> {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl<N> From<String> for Value<N> {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<N> From<Option<String>> for Value<N> {
    fn from(s: Option<String>) -> Self {
        s.map(Value::Str).unwrap_or(Value::Null)
    }
}

/// A node in a UI tree.
///
/// Equality must be identity: two handles are equal when they refer to the
/// same on-screen element. Implementations are cheap to clone.
pub trait Node: Clone + PartialEq + Sized {
    /// Look up a named attribute (`text`, `id`, `clickable`, ...).
    fn attribute(&self, name: &str) -> Value<Self>;

    /// Children in sibling order.
    fn children(&self) -> Vec<Self>;

    fn parent(&self) -> Option<Self>;

    /// Zero-based position among the parent's children.
    fn index_among_siblings(&self) -> usize;

    /// Re-sync with the live UI. Returns `false` when the node is stale.
    fn refresh(&self) -> bool {
        true
    }

    /// Invoke a node method from a selector expression. `None` means the
    /// method is unknown, which evaluates to null.
    fn call(&self, method: &str, args: &[Value<Self>]) -> Option<Value<Self>> {
        match (method, args) {
            ("getChild", [Value::Int(index)]) => usize::try_from(*index)
                .ok()
                .and_then(|i| self.children().into_iter().nth(i))
                .map(Value::Node),
            _ => None,
        }
    }

    /// Candidates in this subtree whose attribute plausibly equals `value`.
    ///
    /// Used by quick-find. Candidates are re-checked against the full
    /// selector, so an implementation may over-approximate. `None` means the
    /// lookup is unsupported and the caller must walk the tree.
    fn find_by_attribute(&self, _name: &str, _value: &str) -> Option<Vec<Self>> {
        None
    }

    /// Topmost ancestor (or the node itself).
    fn root(&self) -> Self {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }
}


#[cfg(test)]
mod tests {
    use super::testing::tree;
    use super::*;

    #[test]
    fn value_null_only_equals_null() {
        let null: Value<()> = Value::Null;
        assert_eq!(null, Value::Null);
        assert_ne!(null, Value::Str(String::new()));
        assert_ne!(Value::<()>::Int(0), Value::Bool(false));
    }

    #[test]
    fn default_get_child_call() {
        let root = tree("Root\n  A label=a\n  B label=b\n");
        let got = root.call("getChild", &[Value::Int(1)]);
        assert_eq!(got, Some(Value::Node(root.find("b"))));
        assert_eq!(root.call("getChild", &[Value::Int(5)]), None);
        assert_eq!(root.call("getChild", &[Value::Int(-1)]), None);
        assert_eq!(root.call("nope", &[]), None);
    }

    #[test]
    fn root_walks_parents() {
        let root = tree("Root\n  A\n    B label=b\n");
        assert_eq!(root.find("b").root(), root);
    }
}
