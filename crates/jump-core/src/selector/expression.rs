//! Predicate parsing: the contents of `[...]`.
//!
//! Precedence from tightest to loosest is `!(...)`, comparison, `&&`, `||`.
//! Operands are read left to right into a flat chain which is then folded in
//! two passes: first every `&&` with its neighbours, then the remaining `||`
//! left to right.

use super::ast::{
    BinaryExpression, CompareOperator, Expression, LogicalExpression, LogicalOperator,
    NotExpression, Pattern, Span, StringLiteral, ValueExpression,
};
use super::scanner::{is_identifier_start, Scanner};
use crate::error::ParseError;

fn at_expression_end(s: &Scanner<'_>) -> bool {
    matches!(s.peek(), None | Some(']') | Some(')'))
}

pub(crate) fn expression(s: &mut Scanner<'_>) -> Result<Expression, ParseError> {
    s.skip_whitespace();
    if at_expression_end(s) {
        return Err(s.error(&["expression"]));
    }
    let first = operand(s)?;
    let mut rest: Vec<(LogicalOperator, Expression)> = Vec::new();
    loop {
        s.skip_whitespace();
        if at_expression_end(s) {
            break;
        }
        let Some(op) = s.operator(&LogicalOperator::ALL, LogicalOperator::key) else {
            return Err(s.error(&["&&", "||"]));
        };
        s.skip_whitespace();
        rest.push((op, operand(s)?));
    }
    Ok(fold(first, rest))
}

fn logical(left: Expression, operator: LogicalOperator, right: Expression) -> Expression {
    let span = Span::new(left.span().start, right.span().end);
    Expression::Logical(LogicalExpression {
        span,
        left: Box::new(left),
        operator,
        right: Box::new(right),
    })
}

fn fold(first: Expression, rest: Vec<(LogicalOperator, Expression)>) -> Expression {
    let mut current = first;
    let mut alternatives: Option<Expression> = None;
    for (op, right) in rest {
        match op {
            LogicalOperator::And => current = logical(current, LogicalOperator::And, right),
            LogicalOperator::Or => {
                let finished = std::mem::replace(&mut current, right);
                alternatives = Some(match alternatives {
                    Some(left) => logical(left, LogicalOperator::Or, finished),
                    None => finished,
                });
            }
        }
    }
    match alternatives {
        Some(left) => logical(left, LogicalOperator::Or, current),
        None => current,
    }
}

fn operand(s: &mut Scanner<'_>) -> Result<Expression, ParseError> {
    let start = s.pos();
    match s.peek() {
        Some('(') => {
            s.bump();
            let mut inner = expression(s)?;
            s.expect(')')?;
            inner.set_span(Span::new(start, s.pos()));
            Ok(inner)
        }
        Some('!') => {
            s.bump();
            if s.peek() != Some('(') {
                return Err(s.error(&["("]));
            }
            s.bump();
            let inner = expression(s)?;
            s.expect(')')?;
            Ok(Expression::Not(NotExpression {
                span: Span::new(start, s.pos()),
                operand: Box::new(inner),
            }))
        }
        _ => binary(s),
    }
}

fn binary(s: &mut Scanner<'_>) -> Result<Expression, ParseError> {
    let start = s.pos();
    let left = value(s)?;
    s.skip_whitespace();
    let Some(operator) = s.operator(&CompareOperator::ALL, CompareOperator::key) else {
        let keys: Vec<&str> = CompareOperator::ALL.iter().map(|op| op.key()).collect();
        return Err(s.error(&keys));
    };
    s.skip_whitespace();
    let right_start = s.pos();
    let mut right = value(s)?;
    if operator.is_regex() {
        let ValueExpression::String(literal) = &mut right else {
            return Err(s.invalid_at(right_start, "string literal"));
        };
        let pattern = Pattern::full_match(&literal.value).map_err(|e| {
            s.invalid_at(literal.span.start, "valid regex")
                .with_detail(e.to_string())
        })?;
        literal.pattern = Some(pattern);
    }
    Ok(Expression::Binary(BinaryExpression {
        span: Span::new(start, s.pos()),
        left,
        operator,
        right,
    }))
}

/// A literal or a variable chain (`a`, `a.b`, `a.b(1).c`).
pub(crate) fn value(s: &mut Scanner<'_>) -> Result<ValueExpression, ParseError> {
    let start = s.pos();
    let literal_span = |s: &Scanner<'_>| Span::new(start, s.pos());
    if s.keyword("true") {
        return Ok(ValueExpression::Boolean {
            span: literal_span(s),
            value: true,
        });
    }
    if s.keyword("false") {
        return Ok(ValueExpression::Boolean {
            span: literal_span(s),
            value: false,
        });
    }
    if s.keyword("null") {
        return Ok(ValueExpression::Null {
            span: literal_span(s),
        });
    }
    match s.peek() {
        Some('\'' | '"' | '`') => {
            let value = s.string()?;
            return Ok(ValueExpression::String(StringLiteral {
                span: literal_span(s),
                value,
                pattern: None,
            }));
        }
        Some('-') => {
            s.bump();
            let value = s.integer()?;
            return Ok(ValueExpression::Int {
                span: literal_span(s),
                value: -value,
            });
        }
        Some(c) if c.is_ascii_digit() => {
            let value = s.integer()?;
            return Ok(ValueExpression::Int {
                span: literal_span(s),
                value,
            });
        }
        Some(c) if is_identifier_start(c) => {}
        _ => return Err(s.error(&["value"])),
    }
    variable(s, start)
}

fn variable(s: &mut Scanner<'_>, start: usize) -> Result<ValueExpression, ParseError> {
    let name = s.identifier()?;
    let mut current = ValueExpression::Identifier {
        span: Span::new(start, s.pos()),
        name,
    };
    loop {
        match s.peek() {
            Some('.') => {
                s.bump();
                let property = s.identifier()?;
                current = ValueExpression::Member {
                    span: Span::new(start, s.pos()),
                    object: Box::new(current),
                    property,
                };
            }
            Some('(') => {
                if matches!(current, ValueExpression::Call { .. }) {
                    return Err(s.error(&[".", "operator"]));
                }
                s.bump();
                let arguments = arguments(s)?;
                current = ValueExpression::Call {
                    span: Span::new(start, s.pos()),
                    callee: Box::new(current),
                    arguments,
                };
            }
            _ => break,
        }
    }
    Ok(current)
}

/// Call arguments after the opening parenthesis, through the closing one.
fn arguments(s: &mut Scanner<'_>) -> Result<Vec<ValueExpression>, ParseError> {
    let mut arguments = Vec::new();
    s.skip_whitespace();
    if s.eat(")") {
        return Ok(arguments);
    }
    loop {
        arguments.push(value(s)?);
        s.skip_whitespace();
        if s.eat(")") {
            return Ok(arguments);
        }
        if !s.eat(",") {
            return Err(s.error(&[",", ")"]));
        }
        s.skip_whitespace();
    }
}
