//! Selector-level grammar: segments, combinators and position filters.

use super::ast::{
    ConnectExpression, ConnectOperator, ConnectSegment, PolynomialExpression, PropertySegment,
    Span, TupleExpression,
};
use super::expression::expression;
use super::scanner::{Scanner, WHITESPACE};
use super::Selector;
use crate::error::ParseError;

pub(crate) fn selector(source: &str) -> Result<Selector, ParseError> {
    let mut s = Scanner::new(source);
    s.skip_whitespace();
    let mut segments = vec![segment(&mut s)?];
    let mut connects = Vec::new();
    while s.peek_is(|c| WHITESPACE.contains(&c)) {
        let gap = s.pos();
        s.skip_whitespace();
        if s.is_eof() {
            break;
        }
        let connect = if s.peek_is(|c| "+-<>".contains(c)) {
            let connect = combinator(&mut s)?;
            s.expect_whitespace()?;
            connect
        } else {
            ConnectSegment::whitespace(Span::new(gap, s.pos()))
        };
        segments.push(segment(&mut s)?);
        connects.push(connect);
    }
    if !s.is_eof() {
        return Err(s.error(&["[", "whitespace", "end of input"]));
    }

    let mut tracked = segments.iter().filter(|seg| seg.tracked);
    if let (Some(_), Some(second)) = (tracked.next(), tracked.next()) {
        return Err(s.invalid_at(second.span.start, "at most one @ segment"));
    }

    Ok(Selector {
        source: source.to_string(),
        segments,
        connects,
    })
}

fn segment(s: &mut Scanner<'_>) -> Result<PropertySegment, ParseError> {
    let start = s.pos();
    let tracked = s.eat("@");
    let name = s.name()?;
    let mut expressions = Vec::new();
    while s.eat("[") {
        expressions.push(expression(s)?);
        s.skip_whitespace();
        s.expect(']')?;
    }
    if name.is_empty() && expressions.is_empty() {
        return Err(s.error(&["[", "*", "[0-9a-zA-Z_]"]));
    }
    Ok(PropertySegment {
        span: Span::new(start, s.pos()),
        tracked,
        name,
        expressions,
    })
}

fn combinator(s: &mut Scanner<'_>) -> Result<ConnectSegment, ParseError> {
    let start = s.pos();
    let Some(operator) = s.operator(&ConnectOperator::ALL, ConnectOperator::key) else {
        return Err(s.error(&["+", "-", ">", "<", "<<"]));
    };
    let expression = if s.peek_is(|c| c == '(' || c == 'n' || c.is_ascii_digit()) {
        connect_expression(s)?
    } else {
        ConnectExpression::Polynomial(PolynomialExpression::NEAREST)
    };
    Ok(ConnectSegment {
        span: Span::new(start, s.pos()),
        operator,
        expression,
    })
}

/// `(` followed by an integer and a comma starts a tuple.
fn is_tuple_ahead(s: &Scanner<'_>) -> bool {
    let Some(rest) = s.rest().strip_prefix('(') else {
        return false;
    };
    let rest = rest.trim_start_matches(WHITESPACE);
    let after_digits = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    after_digits.len() < rest.len() && after_digits.trim_start_matches(WHITESPACE).starts_with(',')
}

pub(crate) fn connect_expression(s: &mut Scanner<'_>) -> Result<ConnectExpression, ParseError> {
    if is_tuple_ahead(s) {
        tuple(s).map(ConnectExpression::Tuple)
    } else {
        polynomial(s).map(ConnectExpression::Polynomial)
    }
}

fn tuple(s: &mut Scanner<'_>) -> Result<TupleExpression, ParseError> {
    let start = s.pos();
    s.expect('(')?;
    let mut indices: Vec<usize> = Vec::new();
    loop {
        s.skip_whitespace();
        if s.peek() == Some(')') && !indices.is_empty() {
            break;
        }
        let at = s.pos();
        let value = s.integer()?;
        let index = usize::try_from(value).map_err(|_| s.invalid_at(at, "integer in range"))?;
        match indices.last() {
            None if index == 0 => return Err(s.invalid_at(at, "positive integer")),
            Some(last) if index <= *last => {
                return Err(s.invalid_at(at, format!("integer greater than {}", last)))
            }
            _ => indices.push(index),
        }
        s.skip_whitespace();
        if !s.eat(",") {
            break;
        }
    }
    s.skip_whitespace();
    s.expect(')')?;
    TupleExpression::new(indices).ok_or_else(|| s.invalid_at(start, "ascending positive indices"))
}

fn polynomial(s: &mut Scanner<'_>) -> Result<PolynomialExpression, ParseError> {
    let start = s.pos();
    let (mut a, mut b) = (0i64, 0i64);
    if s.eat("(") {
        s.skip_whitespace();
        let mut first = true;
        loop {
            if !first && s.eat(")") {
                break;
            }
            if !first && !s.peek_is(|c| c == '+' || c == '-') {
                return Err(s.error(&["+", "-", ")"]));
            }
            let at = s.pos();
            let (linear, coefficient) = monomial(s)?;
            let sum = if linear { &mut a } else { &mut b };
            *sum = sum
                .checked_add(coefficient)
                .ok_or_else(|| s.invalid_at(at, "integer in range"))?;
            first = false;
            s.skip_whitespace();
        }
    } else {
        let (linear, coefficient) = monomial(s)?;
        if linear {
            a = coefficient;
        } else {
            b = coefficient;
        }
    }
    PolynomialExpression::new(a, b).ok_or_else(|| s.invalid_at(start, "polynomial selecting a positive position"))
}

/// `[+-]? Integer? "n"?` as `(has_n, coefficient)`.
fn monomial(s: &mut Scanner<'_>) -> Result<(bool, i64), ParseError> {
    let sign = if s.eat("-") {
        -1
    } else {
        s.eat("+");
        1
    };
    s.skip_whitespace();
    if !s.peek_is(|c| c == 'n' || c.is_ascii_digit()) {
        return Err(s.error(&["0-9", "n"]));
    }
    let coefficient = if s.peek_is(|c| c.is_ascii_digit()) {
        s.integer()?
    } else {
        1
    };
    Ok((s.eat("n"), sign * coefficient))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    fn connect(text: &str) -> Result<ConnectExpression, ParseError> {
        let mut s = Scanner::new(text);
        let e = connect_expression(&mut s)?;
        assert!(s.is_eof(), "trailing input in {text:?}");
        Ok(e)
    }

    #[test]
    fn polynomial_forms() {
        let p = |t| match connect(t).unwrap() {
            ConnectExpression::Polynomial(p) => (p.a(), p.b()),
            other => panic!("not a polynomial: {other:?}"),
        };
        assert_eq!(p("3"), (0, 3));
        assert_eq!(p("n"), (1, 0));
        assert_eq!(p("2n"), (2, 0));
        assert_eq!(p("(2n+1)"), (2, 1));
        assert_eq!(p("( -n + 3 )"), (-1, 3));
        assert_eq!(p("(n+n-1)"), (2, -1));
    }

    #[test]
    fn polynomial_has_no_powers() {
        let err = connect("(n^2+1)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn polynomial_sum_overflow_is_invalid_grammar() {
        let err = connect("(n-9223372036854775807-9)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidGrammar);
        assert_eq!(err.offset, 22);

        let err = connect("(9223372036854775807+1+n)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidGrammar);
        assert_eq!(err.offset, 20);
    }

    #[test]
    fn polynomial_never_positive_rejected() {
        let err = connect("(-n-1)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidGrammar);
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn polynomial_missing_sign_between_terms() {
        let err = connect("(n 2)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn tuple_lookahead() {
        assert!(matches!(connect("(1,2,5)").unwrap(), ConnectExpression::Tuple(_)));
        assert!(matches!(connect("( 1 , 2 )").unwrap(), ConnectExpression::Tuple(_)));
        assert!(matches!(connect("(1)").unwrap(), ConnectExpression::Polynomial(_)));
    }

    #[test]
    fn tuple_must_ascend() {
        let err = connect("(3,1,2)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidGrammar);
        assert_eq!(err.offset, 3);

        let err = connect("(1,2,2)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidGrammar);
        assert_eq!(err.offset, 5);

        let err = connect("(0,1)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidGrammar);
    }

    #[test]
    fn tuple_unterminated() {
        let err = connect("(1,2").unwrap_err();
        assert_eq!(err.found, None);
    }
}
