//! Error types with caret diagnostics and suggestions.
//!
//! Only malformed selector text is fatal: a [`ParseError`] marks the owning
//! rule as permanently invalid. Everything that can go wrong while a rule is
//! being evaluated (stale nodes, failed actions, misses) is reported as a
//! scheduler diagnostic instead of an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Class of selector parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseErrorKind {
    /// The text does not follow the selector grammar.
    Syntax,
    /// The text is well formed but semantically invalid (a descending tuple or
    /// a regex that does not compile).
    InvalidGrammar,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::Syntax => write!(f, "SYNTAX"),
            ParseErrorKind::InvalidGrammar => write!(f, "INVALID_GRAMMAR"),
        }
    }
}

/// A selector parse failure.
///
/// `offset` is a byte offset into the selector source; `expected` names the
/// character classes or constructs the parser would have accepted there.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
    pub expected: Vec<String>,
    /// The character found at `offset`, `None` at end of input.
    pub found: Option<char>,
    /// Extra detail, e.g. the regex compiler's message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] at offset {}: expected {}",
            self.kind,
            self.offset,
            self.expected_list()
        )?;
        match self.found {
            Some(c) => write!(f, ", found {:?}", c)?,
            None => write!(f, ", found end of input")?,
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

impl ParseError {
    pub fn syntax(offset: usize, expected: &[&str], found: Option<char>) -> Self {
        Self {
            kind: ParseErrorKind::Syntax,
            offset,
            expected: expected.iter().map(|s| s.to_string()).collect(),
            found,
            detail: None,
        }
    }

    pub fn invalid_grammar(offset: usize, expected: impl Into<String>, found: Option<char>) -> Self {
        Self {
            kind: ParseErrorKind::InvalidGrammar,
            offset,
            expected: vec![expected.into()],
            found,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn expected_list(&self) -> String {
        match self.expected.as_slice() {
            [] => "nothing".to_string(),
            [one] => format!("`{}`", one),
            many => {
                let quoted: Vec<String> = many.iter().map(|e| format!("`{}`", e)).collect();
                format!("one of {}", quoted.join(", "))
            }
        }
    }

    /// Hint shown to rule authors under the caret diagnostic.
    pub fn suggestion(&self) -> &'static str {
        match self.kind {
            ParseErrorKind::InvalidGrammar => {
                "The selector is well formed but a value is out of range: check regexes, index tuples and polynomial terms"
            }
            ParseErrorKind::Syntax if self.found.is_none() => {
                "The selector ended early: check for unclosed brackets, parentheses or quotes"
            }
            ParseErrorKind::Syntax => {
                "Check the selector syntax near the marked position"
            }
        }
    }

    /// Render the error under the offending source line with a caret.
    pub fn render(&self, source: &str) -> String {
        let column = source
            .get(..self.offset.min(source.len()))
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0);
        format!(
            "{}\n{}^\n{}\nhint: {}",
            source,
            " ".repeat(column),
            self,
            self.suggestion()
        )
    }
}

/// A snapshot document that cannot be turned into a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot has no root node (a node with pid -1)")]
    MissingRoot,
    #[error("snapshot has more than one root node: {first} and {second}")]
    MultipleRoots { first: i64, second: i64 },
    #[error("node {id} appears more than once")]
    DuplicateId { id: i64 },
    #[error("node {id} references unknown parent {pid}")]
    DanglingParent { id: i64, pid: i64 },
    #[error("node {id} is not reachable from the root")]
    Unreachable { id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_expected_set() {
        let err = ParseError::syntax(4, &["]", "&&", "||"], Some('x'));
        let text = err.to_string();
        assert!(text.contains("offset 4"));
        assert!(text.contains("one of `]`, `&&`, `||`"));
        assert!(text.contains("'x'"));
    }

    #[test]
    fn display_reports_end_of_input() {
        let err = ParseError::syntax(3, &["]"], None);
        assert!(err.to_string().contains("found end of input"));
        assert!(err.suggestion().contains("ended early"));
    }

    #[test]
    fn render_places_caret_under_offset() {
        let err = ParseError::syntax(7, &["value"], Some(']'));
        let rendered = err.render("Button[]");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Button[]");
        assert_eq!(lines[1], "       ^");
    }

    #[test]
    fn render_counts_chars_not_bytes() {
        let source = "[text='確定' x]";
        let offset = source.find('x').unwrap();
        let err = ParseError::syntax(offset, &["]"], Some('x'));
        let rendered = err.render(source);
        let caret_line = rendered.lines().nth(1).unwrap();
        assert_eq!(caret_line.len() - 1, source[..offset].chars().count());
    }

    #[test]
    fn invalid_grammar_carries_detail() {
        let err = ParseError::invalid_grammar(2, "valid regex", Some('\'')).with_detail("unclosed class");
        assert_eq!(err.kind, ParseErrorKind::InvalidGrammar);
        assert!(err.to_string().contains("unclosed class"));
        assert!(err.suggestion().contains("out of range"));
    }
}
