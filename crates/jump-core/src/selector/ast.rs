//! Selector syntax tree.
//!
//! Every node implements [`fmt::Display`], which prints the canonical form
//! of the selector. Parsing the printed form yields an equal tree.
//!
//! | Operator | Relation of the left segment to the right one     |
//! |----------|----------------------------------------------------|
//! | `+`      | previous sibling, nearest first                    |
//! | `-`      | following sibling, nearest first                   |
//! | `>`      | ancestor, parent first                             |
//! | `<`      | child, in sibling order                            |
//! | `<<`     | descendant, depth-first pre-order                  |
//! | (space)  | `>n`: ancestor at any depth                        |

use std::fmt;

use regex::Regex;

/// Byte range in the selector source.
///
/// Spans are informational and never take part in equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl PartialEq for Span {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for Span {}

/// One node-shape test: optional tracking marker, a class name and a list of
/// bracketed predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySegment {
    pub span: Span,
    /// Marked with `@`: this segment's node is the match result.
    pub tracked: bool,
    /// Class name, `*`, or empty when only predicates are given.
    pub name: String,
    pub expressions: Vec<Expression>,
}

impl fmt::Display for PropertySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tracked {
            write!(f, "@")?;
        }
        write!(f, "{}", self.name)?;
        for expression in &self.expressions {
            write!(f, "[{}]", expression)?;
        }
        Ok(())
    }
}

/// Structural relations between consecutive segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectOperator {
    BeforeBrother,
    AfterBrother,
    Ancestor,
    Child,
    Descendant,
}

impl ConnectOperator {
    /// All operators, longest key first so prefix matching is unambiguous.
    pub const ALL: [ConnectOperator; 5] = [
        ConnectOperator::Descendant,
        ConnectOperator::BeforeBrother,
        ConnectOperator::AfterBrother,
        ConnectOperator::Ancestor,
        ConnectOperator::Child,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ConnectOperator::BeforeBrother => "+",
            ConnectOperator::AfterBrother => "-",
            ConnectOperator::Ancestor => ">",
            ConnectOperator::Child => "<",
            ConnectOperator::Descendant => "<<",
        }
    }
}

/// `a*n + b`, where `n` ranges over 0, 1, 2, ...
///
/// Positions are 1-based. Construction rejects forms that can never select
/// a positive position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolynomialExpression {
    a: i64,
    b: i64,
}

impl PolynomialExpression {
    /// The implicit constraint of an explicit operator: nearest node only.
    pub const NEAREST: PolynomialExpression = PolynomialExpression { a: 0, b: 1 };
    /// Any position.
    pub const ANY: PolynomialExpression = PolynomialExpression { a: 1, b: 0 };

    pub fn new(a: i64, b: i64) -> Option<Self> {
        if a <= 0 && b <= 0 {
            return None;
        }
        Some(Self { a, b })
    }

    pub fn a(&self) -> i64 {
        self.a
    }

    pub fn b(&self) -> i64 {
        self.b
    }

    pub fn accepts(&self, index: usize) -> bool {
        let Ok(index) = i64::try_from(index) else {
            return false;
        };
        if index < 1 {
            return false;
        }
        if self.a == 0 {
            return index == self.b;
        }
        let Some(diff) = index.checked_sub(self.b) else {
            return false;
        };
        match (diff.checked_rem(self.a), diff.checked_div(self.a)) {
            (Some(rem), Some(n)) => rem == 0 && n >= 0,
            _ => false,
        }
    }

    /// Largest acceptable position, `None` when unbounded.
    pub fn max_index(&self) -> Option<usize> {
        if self.a > 0 {
            None
        } else {
            usize::try_from(self.b).ok()
        }
    }
}

impl fmt::Display for PolynomialExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let term = match self.a {
            1 => "n".to_string(),
            -1 => "-n".to_string(),
            a => format!("{}n", a),
        };
        match (self.a, self.b) {
            (0, b) => write!(f, "{}", b),
            (_, 0) => write!(f, "{}", term),
            (_, b) if b > 0 => write!(f, "({}+{})", term, b),
            (_, b) => write!(f, "({}{})", term, b),
        }
    }
}

/// An explicit, strictly ascending list of positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleExpression {
    indices: Vec<usize>,
}

impl TupleExpression {
    /// `None` unless the list is non-empty, positive and strictly ascending.
    pub fn new(indices: Vec<usize>) -> Option<Self> {
        let valid = indices.first().is_some_and(|first| *first > 0)
            && indices.windows(2).all(|w| w[0] < w[1]);
        valid.then_some(Self { indices })
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn accepts(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    pub fn max_index(&self) -> Option<usize> {
        self.indices.last().copied()
    }
}

impl fmt::Display for TupleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.indices.iter().map(|i| i.to_string()).collect();
        write!(f, "({})", parts.join(","))
    }
}

/// Position filter of a combinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectExpression {
    Polynomial(PolynomialExpression),
    Tuple(TupleExpression),
}

impl ConnectExpression {
    pub fn accepts(&self, index: usize) -> bool {
        match self {
            ConnectExpression::Polynomial(p) => p.accepts(index),
            ConnectExpression::Tuple(t) => t.accepts(index),
        }
    }

    pub fn max_index(&self) -> Option<usize> {
        match self {
            ConnectExpression::Polynomial(p) => p.max_index(),
            ConnectExpression::Tuple(t) => t.max_index(),
        }
    }
}

impl fmt::Display for ConnectExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectExpression::Polynomial(p) => write!(f, "{}", p),
            ConnectExpression::Tuple(t) => write!(f, "{}", t),
        }
    }
}

/// The combinator between two segments.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectSegment {
    pub span: Span,
    pub operator: ConnectOperator,
    pub expression: ConnectExpression,
}

impl ConnectSegment {
    /// The bare-whitespace combinator.
    pub fn whitespace(span: Span) -> Self {
        Self {
            span,
            operator: ConnectOperator::Ancestor,
            expression: ConnectExpression::Polynomial(PolynomialExpression::ANY),
        }
    }

    pub fn is_whitespace(&self) -> bool {
        self.operator == ConnectOperator::Ancestor
            && self.expression == ConnectExpression::Polynomial(PolynomialExpression::ANY)
    }
}

impl fmt::Display for ConnectSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whitespace() {
            return Ok(());
        }
        write!(f, "{}", self.operator.key())?;
        if self.expression != ConnectExpression::Polynomial(PolynomialExpression::NEAREST) {
            write!(f, "{}", self.expression)?;
        }
        Ok(())
    }
}

/// Comparison operators, table-driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOperator {
    Equal,
    NotEqual,
    Start,
    NotStart,
    Include,
    NotInclude,
    End,
    NotEnd,
    Matches,
    NotMatches,
    LessEqual,
    Less,
    GreaterEqual,
    Greater,
}

impl CompareOperator {
    /// All operators, longest key first.
    pub const ALL: [CompareOperator; 14] = [
        CompareOperator::NotStart,
        CompareOperator::NotInclude,
        CompareOperator::NotEnd,
        CompareOperator::NotMatches,
        CompareOperator::NotEqual,
        CompareOperator::Start,
        CompareOperator::Include,
        CompareOperator::End,
        CompareOperator::Matches,
        CompareOperator::GreaterEqual,
        CompareOperator::LessEqual,
        CompareOperator::Equal,
        CompareOperator::Greater,
        CompareOperator::Less,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CompareOperator::Equal => "=",
            CompareOperator::NotEqual => "!=",
            CompareOperator::Start => "^=",
            CompareOperator::NotStart => "!^=",
            CompareOperator::Include => "*=",
            CompareOperator::NotInclude => "!*=",
            CompareOperator::End => "$=",
            CompareOperator::NotEnd => "!$=",
            CompareOperator::Matches => "~=",
            CompareOperator::NotMatches => "!~=",
            CompareOperator::LessEqual => "<=",
            CompareOperator::Less => "<",
            CompareOperator::GreaterEqual => ">=",
            CompareOperator::Greater => ">",
        }
    }

    /// Operators whose right-hand side is a regex.
    pub fn is_regex(self) -> bool {
        matches!(self, CompareOperator::Matches | CompareOperator::NotMatches)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    pub const ALL: [LogicalOperator; 2] = [LogicalOperator::And, LogicalOperator::Or];

    pub fn key(self) -> &'static str {
        match self {
            LogicalOperator::And => "&&",
            LogicalOperator::Or => "||",
        }
    }
}

/// A compiled full-match pattern, compared by its source.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Compile `source` so that it must match the whole input.
    pub fn full_match(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", source))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str()
    }
}

/// A string literal; `pattern` is set when it is the operand of a regex
/// operator.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub span: Span,
    pub value: String,
    pub pattern: Option<Pattern>,
}

impl fmt::Display for StringLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for c in self.value.chars() {
            match c {
                '\\' => write!(f, "\\\\")?,
                '"' => write!(f, "\\\"")?,
                '\n' => write!(f, "\\n")?,
                '\r' => write!(f, "\\r")?,
                '\t' => write!(f, "\\t")?,
                '\u{8}' => write!(f, "\\b")?,
                c if u32::from(c) < 0x20 => write!(f, "\\x{:02x}", u32::from(c))?,
                c => write!(f, "{}", c)?,
            }
        }
        write!(f, "\"")
    }
}

/// Operand of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpression {
    Boolean {
        span: Span,
        value: bool,
    },
    Int {
        span: Span,
        value: i64,
    },
    String(StringLiteral),
    Null {
        span: Span,
    },
    /// Attribute lookup on the candidate node.
    Identifier {
        span: Span,
        name: String,
    },
    Member {
        span: Span,
        object: Box<ValueExpression>,
        property: String,
    },
    Call {
        span: Span,
        callee: Box<ValueExpression>,
        arguments: Vec<ValueExpression>,
    },
}

impl ValueExpression {
    pub fn span(&self) -> Span {
        match self {
            ValueExpression::Boolean { span, .. }
            | ValueExpression::Int { span, .. }
            | ValueExpression::Null { span }
            | ValueExpression::Identifier { span, .. }
            | ValueExpression::Member { span, .. }
            | ValueExpression::Call { span, .. } => *span,
            ValueExpression::String(literal) => literal.span,
        }
    }

    pub(crate) fn pattern(&self) -> Option<&Pattern> {
        match self {
            ValueExpression::String(literal) => literal.pattern.as_ref(),
            _ => None,
        }
    }

    fn collect_names(&self, properties: &mut Vec<String>, methods: &mut Vec<String>) {
        match self {
            ValueExpression::Identifier { name, .. } => push_unique(properties, name),
            ValueExpression::Member {
                object, property, ..
            } => {
                object.collect_names(properties, methods);
                push_unique(properties, property);
            }
            ValueExpression::Call {
                callee, arguments, ..
            } => {
                match callee.as_ref() {
                    ValueExpression::Identifier { name, .. } => push_unique(methods, name),
                    ValueExpression::Member {
                        object, property, ..
                    } => {
                        object.collect_names(properties, methods);
                        push_unique(methods, property);
                    }
                    other => other.collect_names(properties, methods),
                }
                for argument in arguments {
                    argument.collect_names(properties, methods);
                }
            }
            _ => {}
        }
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

impl fmt::Display for ValueExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpression::Boolean { value, .. } => write!(f, "{}", value),
            ValueExpression::Int { value, .. } => write!(f, "{}", value),
            ValueExpression::String(literal) => write!(f, "{}", literal),
            ValueExpression::Null { .. } => write!(f, "null"),
            ValueExpression::Identifier { name, .. } => write!(f, "{}", name),
            ValueExpression::Member {
                object, property, ..
            } => write!(f, "{}.{}", object, property),
            ValueExpression::Call {
                callee, arguments, ..
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", callee, args.join(","))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    pub span: Span,
    pub left: ValueExpression,
    pub operator: CompareOperator,
    pub right: ValueExpression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalExpression {
    pub span: Span,
    pub left: Box<Expression>,
    pub operator: LogicalOperator,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotExpression {
    pub span: Span,
    pub operand: Box<Expression>,
}

/// A boolean predicate inside `[...]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Binary(BinaryExpression),
    Logical(LogicalExpression),
    Not(NotExpression),
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Binary(e) => e.span,
            Expression::Logical(e) => e.span,
            Expression::Not(e) => e.span,
        }
    }

    pub(crate) fn set_span(&mut self, span: Span) {
        match self {
            Expression::Binary(e) => e.span = span,
            Expression::Logical(e) => e.span = span,
            Expression::Not(e) => e.span = span,
        }
    }

    /// Every comparison in the predicate, left to right.
    pub fn binary_expressions(&self) -> Vec<&BinaryExpression> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expression) = stack.pop() {
            match expression {
                Expression::Binary(binary) => out.push(binary),
                Expression::Logical(logical) => {
                    stack.push(&logical.right);
                    stack.push(&logical.left);
                }
                Expression::Not(not) => stack.push(&not.operand),
            }
        }
        out
    }

    pub(crate) fn collect_names(&self, properties: &mut Vec<String>, methods: &mut Vec<String>) {
        for binary in self.binary_expressions() {
            binary.left.collect_names(properties, methods);
            binary.right.collect_names(properties, methods);
        }
    }

    fn logical_operator(&self) -> Option<LogicalOperator> {
        match self {
            Expression::Logical(logical) => Some(logical.operator),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Binary(binary) => write!(
                f,
                "{}{}{}",
                binary.left,
                binary.operator.key(),
                binary.right
            ),
            Expression::Not(not) => write!(f, "!({})", not.operand),
            Expression::Logical(logical) => {
                let op = logical.operator;
                // `||` binds looser than `&&`; logical chains associate left.
                let wrap_left = op == LogicalOperator::And
                    && logical.left.logical_operator() == Some(LogicalOperator::Or);
                let wrap_right = match logical.right.logical_operator() {
                    Some(inner) => inner == op || op == LogicalOperator::And,
                    None => false,
                };
                write_grouped(f, &logical.left, wrap_left)?;
                write!(f, " {} ", op.key())?;
                write_grouped(f, &logical.right, wrap_right)
            }
        }
    }
}

fn write_grouped(f: &mut fmt::Formatter<'_>, expression: &Expression, wrap: bool) -> fmt::Result {
    if wrap {
        write!(f, "({})", expression)
    } else {
        write!(f, "{}", expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polynomial_odd_positions() {
        let p = PolynomialExpression::new(2, 1).unwrap();
        for i in [1, 3, 5, 7] {
            assert!(p.accepts(i), "{i} should match");
        }
        for i in [0, 2, 4, 6] {
            assert!(!p.accepts(i), "{i} should not match");
        }
        assert_eq!(p.max_index(), None);
    }

    #[test]
    fn polynomial_constant_term() {
        let p = PolynomialExpression::new(0, 3).unwrap();
        assert!((0..10).filter(|i| p.accepts(*i)).eq([3]));
        assert_eq!(p.max_index(), Some(3));
    }

    #[test]
    fn polynomial_negative_coefficient_is_bounded() {
        let p = PolynomialExpression::new(-1, 3).unwrap();
        assert!((0..10).filter(|i| p.accepts(*i)).eq([1, 2, 3]));
        assert_eq!(p.max_index(), Some(3));
    }

    #[test]
    fn polynomial_extreme_offset_matches_nothing_far() {
        let p = PolynomialExpression::new(1, -(i64::MAX - 1)).unwrap();
        assert!(p.accepts(1));
        assert!(!p.accepts(2));
        assert!(!p.accepts(usize::MAX));
    }

    #[test]
    fn polynomial_rejects_never_positive() {
        assert!(PolynomialExpression::new(0, 0).is_none());
        assert!(PolynomialExpression::new(-2, -1).is_none());
    }

    #[test]
    fn polynomial_display() {
        let show = |a, b| PolynomialExpression::new(a, b).unwrap().to_string();
        assert_eq!(show(0, 4), "4");
        assert_eq!(show(1, 0), "n");
        assert_eq!(show(-1, 3), "(-n+3)");
        assert_eq!(show(2, 1), "(2n+1)");
        assert_eq!(show(3, -1), "(3n-1)");
    }

    #[test]
    fn tuple_requires_strictly_ascending_positive() {
        assert!(TupleExpression::new(vec![3, 1, 2]).is_none());
        assert!(TupleExpression::new(vec![1, 2, 2]).is_none());
        assert!(TupleExpression::new(vec![0, 1]).is_none());
        assert!(TupleExpression::new(vec![]).is_none());
        let t = TupleExpression::new(vec![1, 2, 5]).unwrap();
        assert!(t.accepts(5));
        assert!(!t.accepts(3));
        assert_eq!(t.to_string(), "(1,2,5)");
    }

    #[test]
    fn connect_segment_display_omits_defaults() {
        let whitespace = ConnectSegment::whitespace(Span::default());
        assert_eq!(whitespace.to_string(), "");
        let nearest = ConnectSegment {
            span: Span::default(),
            operator: ConnectOperator::Child,
            expression: ConnectExpression::Polynomial(PolynomialExpression::NEAREST),
        };
        assert_eq!(nearest.to_string(), "<");
        let any_descendant = ConnectSegment {
            span: Span::default(),
            operator: ConnectOperator::Descendant,
            expression: ConnectExpression::Polynomial(PolynomialExpression::ANY),
        };
        assert_eq!(any_descendant.to_string(), "<<n");
    }

    #[test]
    fn string_literal_escapes() {
        let literal = StringLiteral {
            span: Span::default(),
            value: "a\"b\\c\nd\u{1}".to_string(),
            pattern: None,
        };
        assert_eq!(literal.to_string(), r#""a\"b\\c\nd\x01""#);
    }

    #[test]
    fn pattern_is_full_match() {
        let p = Pattern::full_match("ab+").unwrap();
        assert!(p.is_match("abbb"));
        assert!(!p.is_match("xabb"));
        assert!(Pattern::full_match("[").is_err());
    }

    #[test]
    fn compare_table_is_longest_first() {
        let keys: Vec<usize> = CompareOperator::ALL.iter().map(|op| op.key().len()).collect();
        assert!(keys.windows(2).all(|w| w[0] >= w[1]));
    }
}
