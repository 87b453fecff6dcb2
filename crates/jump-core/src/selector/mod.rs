//! Selector language: parsing, printing and matching.
//!
//! A selector is a chain of segments joined by combinators:
//!
//! ```text
//! @LinearLayout > TextView[text^='Skip' && clickable=true] + ImageView
//! ```
//!
//! Matching anchors the last segment and walks the chain right to left, so
//! the example above finds an `ImageView` whose previous sibling is a
//! clickable `TextView` starting with "Skip" whose parent is a
//! `LinearLayout`, and returns the `LinearLayout` because it is tracked
//! with `@`.

mod ast;
mod eval;
mod expression;
mod matcher;
mod parser;
mod scanner;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use ast::{
    BinaryExpression, CompareOperator, ConnectExpression, ConnectOperator, ConnectSegment,
    Expression, LogicalExpression, LogicalOperator, NotExpression, Pattern, PolynomialExpression,
    PropertySegment, Span, StringLiteral, TupleExpression, ValueExpression,
};
pub use matcher::MatchOption;

use crate::error::ParseError;

/// A parsed selector.
///
/// `connects[i]` joins `segments[i]` and `segments[i + 1]`. Two selectors
/// are equal when they were parsed from the same text.
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    segments: Vec<PropertySegment>,
    connects: Vec<ConnectSegment>,
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Selector {}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        parser::selector(source)
    }

    /// The text this selector was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[PropertySegment] {
        &self.segments
    }

    pub fn connects(&self) -> &[ConnectSegment] {
        &self.connects
    }

    /// Canonical text; parses back to an equivalent tree.
    pub fn stringify(&self) -> String {
        self.to_string()
    }

    /// Index of the `@` segment.
    pub fn tracked_index(&self) -> Option<usize> {
        self.segments.iter().position(|s| s.tracked)
    }

    /// Attribute names read by the predicates, in first-use order.
    pub fn properties(&self) -> Vec<String> {
        self.names().0
    }

    /// Method and function names called by the predicates.
    pub fn methods(&self) -> Vec<String> {
        self.names().1
    }

    fn names(&self) -> (Vec<String>, Vec<String>) {
        let mut properties = Vec::new();
        let mut methods = Vec::new();
        for expression in self.segments.iter().flat_map(|s| &s.expressions) {
            expression.collect_names(&mut properties, &mut methods);
        }
        (properties, methods)
    }

    /// Whether both selectors have the same structure, ignoring source
    /// formatting.
    pub fn same_structure(&self, other: &Selector) -> bool {
        self.segments == other.segments && self.connects == other.connects
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                let connect = self.connects[i - 1].to_string();
                if connect.is_empty() {
                    write!(f, " ")?;
                } else {
                    write!(f, " {} ", connect)?;
                }
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Parse a standalone combinator position filter such as `(2n+1)` or
/// `(1,2,5)`.
pub fn parse_connect_expression(source: &str) -> Result<ConnectExpression, ParseError> {
    let mut s = scanner::Scanner::new(source);
    let expression = parser::connect_expression(&mut s)?;
    if !s.is_eof() {
        return Err(s.error(&["end of input"]));
    }
    Ok(expression)
}

/// Parsed selectors keyed by source text.
///
/// Rule sets are replaced wholesale but mostly repeat the previous text, so
/// successful and failed parses are both remembered.
#[derive(Debug, Default)]
pub struct SelectorCache {
    entries: HashMap<String, Result<Arc<Selector>, ParseError>>,
}

impl SelectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_parse(&mut self, source: &str) -> Result<Arc<Selector>, ParseError> {
        if let Some(entry) = self.entries.get(source) {
            return entry.clone();
        }
        let parsed = Selector::parse(source).map(Arc::new);
        self.entries.insert(source.to_string(), parsed.clone());
        parsed
    }

    /// Drop entries not in `keep`.
    pub fn retain<'a>(&mut self, keep: impl IntoIterator<Item = &'a str>) {
        let keep: std::collections::HashSet<&str> = keep.into_iter().collect();
        self.entries.retain(|source, _| keep.contains(source.as_str()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
