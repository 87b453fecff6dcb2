//! Predicate evaluation against a candidate node.
//!
//! Evaluation never fails: type mismatches make a comparison false and
//! unknown members, methods or out-of-range arguments produce null.

use super::ast::{BinaryExpression, CompareOperator, Expression, LogicalOperator, Pattern, ValueExpression};
use crate::node::{Node, Value};

impl Expression {
    pub fn evaluate<N: Node>(&self, node: &N) -> bool {
        match self {
            Expression::Binary(binary) => binary.evaluate(node),
            Expression::Logical(logical) => match logical.operator {
                LogicalOperator::And => logical.left.evaluate(node) && logical.right.evaluate(node),
                LogicalOperator::Or => logical.left.evaluate(node) || logical.right.evaluate(node),
            },
            Expression::Not(not) => !not.operand.evaluate(node),
        }
    }
}

impl BinaryExpression {
    pub fn evaluate<N: Node>(&self, node: &N) -> bool {
        let left = self.left.resolve(node);
        let right = self.right.resolve(node);
        self.operator.compare(&left, &right, self.right.pattern())
    }
}

impl CompareOperator {
    /// Apply the operator. `pattern` is the compiled right operand of a
    /// regex operator.
    pub fn compare<N: PartialEq>(self, left: &Value<N>, right: &Value<N>, pattern: Option<&Pattern>) -> bool {
        use CompareOperator::*;
        match self {
            Equal => left == right,
            NotEqual => left != right,
            Start | NotStart | Include | NotInclude | End | NotEnd => {
                let (Value::Str(l), Value::Str(r)) = (left, right) else {
                    return false;
                };
                match self {
                    Start => l.starts_with(r.as_str()),
                    NotStart => !l.starts_with(r.as_str()),
                    Include => l.contains(r.as_str()),
                    NotInclude => !l.contains(r.as_str()),
                    End => l.ends_with(r.as_str()),
                    _ => !l.ends_with(r.as_str()),
                }
            }
            Matches | NotMatches => {
                let (Value::Str(l), Some(pattern)) = (left, pattern) else {
                    return false;
                };
                pattern.is_match(l) == (self == Matches)
            }
            Less | LessEqual | Greater | GreaterEqual => {
                let (Value::Int(l), Value::Int(r)) = (left, right) else {
                    return false;
                };
                match self {
                    Less => l < r,
                    LessEqual => l <= r,
                    Greater => l > r,
                    _ => l >= r,
                }
            }
        }
    }
}

impl ValueExpression {
    pub fn resolve<N: Node>(&self, node: &N) -> Value<N> {
        match self {
            ValueExpression::Boolean { value, .. } => Value::Bool(*value),
            ValueExpression::Int { value, .. } => Value::Int(*value),
            ValueExpression::String(literal) => Value::Str(literal.value.clone()),
            ValueExpression::Null { .. } => Value::Null,
            ValueExpression::Identifier { name, .. } => node.attribute(name),
            ValueExpression::Member {
                object, property, ..
            } => member(object.resolve(node), property),
            ValueExpression::Call {
                callee, arguments, ..
            } => {
                let args: Vec<Value<N>> = arguments.iter().map(|a| a.resolve(node)).collect();
                match callee.as_ref() {
                    ValueExpression::Identifier { name, .. } => global_call(node, name, &args),
                    ValueExpression::Member {
                        object, property, ..
                    } => method_call(object.resolve(node), property, &args),
                    _ => Value::Null,
                }
            }
        }
    }
}

fn member<N: Node>(object: Value<N>, property: &str) -> Value<N> {
    match (object, property) {
        (Value::Node(node), _) => node.attribute(property),
        (Value::Str(s), "length") => Value::Int(s.chars().count() as i64),
        _ => Value::Null,
    }
}

fn global_call<N: Node>(node: &N, name: &str, args: &[Value<N>]) -> Value<N> {
    match (name, args) {
        ("equal", [a, b]) => Value::Bool(a == b),
        ("notEqual", [a, b]) => Value::Bool(a != b),
        ("not", [Value::Bool(b)]) => Value::Bool(!b),
        _ => node.call(name, args).unwrap_or(Value::Null),
    }
}

fn method_call<N: Node>(object: Value<N>, method: &str, args: &[Value<N>]) -> Value<N> {
    match object {
        Value::Str(s) => string_method(&s, method, args).unwrap_or(Value::Null),
        Value::Int(i) => int_method(i, method, args).unwrap_or(Value::Null),
        Value::Node(node) => node.call(method, args).unwrap_or(Value::Null),
        Value::Null | Value::Bool(_) => Value::Null,
    }
}

fn char_index(chars: &[char], index: i64) -> Option<usize> {
    let len = i64::try_from(chars.len()).ok()?;
    let index = if index < 0 { len + index } else { index };
    usize::try_from(index).ok().filter(|i| *i < chars.len())
}

fn string_method<N>(s: &str, method: &str, args: &[Value<N>]) -> Option<Value<N>> {
    let chars: Vec<char> = s.chars().collect();
    let value = match (method, args) {
        ("get", [Value::Int(i)]) => {
            let i = usize::try_from(*i).ok().filter(|i| *i < chars.len())?;
            Value::Str(chars[i].to_string())
        }
        ("at", [Value::Int(i)]) => Value::Str(chars[char_index(&chars, *i)?].to_string()),
        ("substring", [Value::Int(start)]) => {
            let start = usize::try_from(*start).ok().filter(|s| *s <= chars.len())?;
            Value::Str(chars[start..].iter().collect())
        }
        ("substring", [Value::Int(start), Value::Int(end)]) => {
            let start = usize::try_from(*start).ok()?;
            let end = usize::try_from(*end).ok().filter(|e| *e <= chars.len())?;
            if start > end {
                return None;
            }
            Value::Str(chars[start..end].iter().collect())
        }
        ("toUpperCase", []) => Value::Str(s.to_uppercase()),
        ("toLowerCase", []) => Value::Str(s.to_lowercase()),
        ("indexOf", [Value::Str(needle)]) => Value::Int(index_of(&chars, needle, 0)),
        ("indexOf", [Value::Str(needle), Value::Int(from)]) => {
            let from = usize::try_from(*from).ok()?;
            Value::Int(index_of(&chars, needle, from))
        }
        _ => return None,
    };
    Some(value)
}

/// Character index of `needle` at or after `from`, or -1.
fn index_of(chars: &[char], needle: &str, from: usize) -> i64 {
    let needle: Vec<char> = needle.chars().collect();
    if from > chars.len() {
        return -1;
    }
    if needle.is_empty() {
        return from as i64;
    }
    chars[from..]
        .windows(needle.len())
        .position(|w| w == needle.as_slice())
        .map(|p| (p + from) as i64)
        .unwrap_or(-1)
}

fn int_method<N>(i: i64, method: &str, args: &[Value<N>]) -> Option<Value<N>> {
    let [Value::Int(other)] = args else {
        return None;
    };
    let other = *other;
    let value = match method {
        "plus" => Value::Int(i.checked_add(other)?),
        "minus" => Value::Int(i.checked_sub(other)?),
        "times" => Value::Int(i.checked_mul(other)?),
        "div" => Value::Int(i.checked_div(other)?),
        "rem" => Value::Int(i.checked_rem(other)?),
        "more" => Value::Bool(i > other),
        "less" => Value::Bool(i < other),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use crate::node::testing::tree;
    use crate::selector::Selector;

    fn holds(predicate: &str, outline: &str) -> bool {
        let root = tree(outline);
        let selector = Selector::parse(&format!("[{predicate}]")).unwrap();
        selector.segments()[0].expressions[0].evaluate(&root)
    }

    const NODE: &str = "View text=Confirm_order id=btn_ok clickable=true childCount=2\n  A label=a text=first\n  B label=b\n";

    #[test]
    fn string_operators() {
        assert!(holds("text^='Conf'", NODE));
        assert!(holds("text!^='order'", NODE));
        assert!(holds("text*='_or'", NODE));
        assert!(holds("text!*='xyz'", NODE));
        assert!(holds("text$='order'", NODE));
        assert!(holds("text!$='Conf'", NODE));
    }

    #[test]
    fn regex_is_full_match() {
        assert!(holds("text~='Conf.*'", NODE));
        assert!(!holds("text~='Conf'", NODE));
        assert!(holds("text!~='Conf'", NODE));
        assert!(!holds("missing~='.*'", NODE));
    }

    #[test]
    fn type_mismatch_is_false() {
        assert!(!holds("text>1", NODE));
        assert!(!holds("text^=1", NODE));
        assert!(!holds("clickable='true'", NODE));
        assert!(holds("clickable=true", NODE));
    }

    #[test]
    fn null_semantics() {
        assert!(holds("desc=null", NODE));
        assert!(!holds("text=null", NODE));
        assert!(holds("text!=null", NODE));
        assert!(holds("desc.length=null", NODE));
    }

    #[test]
    fn string_methods() {
        assert!(holds("text.length=13", NODE));
        assert!(holds("text.get(0)='C'", NODE));
        assert!(holds("text.at(-1)='r'", NODE));
        assert!(holds("text.substring(0,4)='Conf'", NODE));
        assert!(holds("text.substring(8)='order'", NODE));
        assert!(holds("text.toUpperCase()='CONFIRM_ORDER'", NODE));
        assert!(holds("text.indexOf('_')=7", NODE));
        assert!(holds("text.indexOf('x')=-1", NODE));
        assert!(holds("text.get(99)=null", NODE));
    }

    #[test]
    fn int_methods() {
        assert!(holds("childCount.plus(1)=3", NODE));
        assert!(holds("childCount.times(3).minus(1)=5", NODE));
        assert!(holds("childCount.div(0)=null", NODE));
        assert!(holds("childCount.more(1)=true", NODE));
        assert!(holds("childCount.rem(2)=0", NODE));
    }

    #[test]
    fn node_members_and_calls() {
        assert!(holds("getChild(0).text='first'", NODE));
        assert!(holds("getChild(1).text=null", NODE));
        assert!(holds("getChild(0).parent.id='btn_ok'", NODE));
        assert!(holds("unknown(1)=null", NODE));
    }

    #[test]
    fn global_functions() {
        assert!(holds("equal(id, 'btn_ok')=true", NODE));
        assert!(holds("notEqual(text, id)=true", NODE));
        assert!(holds("not(clickable)=false", NODE));
    }

    #[test]
    fn logical_short_circuit() {
        assert!(holds("id='x' || text^='Conf' && clickable=true", NODE));
        assert!(!holds("(id='x' || text^='Conf') && clickable=false", NODE));
        assert!(holds("!(id='x')", NODE));
    }
}
