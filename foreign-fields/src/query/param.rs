//! Parser for multi-value query parameters.
//!
//! Turns a declarative filter value into a `Condition` on one column:
//!
//! - scalars compare with `=`; `null` becomes `IS NULL`
//! - strings may start with an operator (`=`, `!=`, `<>`, `<`, `<=`, `>`,
//!   `>=`) and/or `not `; `*` is a wildcard (`\*` a literal star)
//! - `:empty:` / `:notempty:` test for `NULL`
//! - comma separated strings (`\,` escapes a comma) and arrays are lists;
//!   a leading `and`, `or` or `not` item picks how the items combine
//!   (default `or`, `not` meaning none of the items)
//! - objects are rejected

use serde_json::{Number, Value};
use thiserror::Error;

use super::condition::{CompareOp, Condition};

/// A filter value the parser cannot express as a condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidParam(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Glue {
    And,
    Or,
    Not,
}

const OPERATORS: &[(&str, CompareOp)] = &[
    ("<=", CompareOp::Lte),
    (">=", CompareOp::Gte),
    ("<>", CompareOp::NotEq),
    ("!=", CompareOp::NotEq),
    ("<", CompareOp::Lt),
    (">", CompareOp::Gt),
    ("=", CompareOp::Eq),
];

/// Parses `value` into a condition on `column`.
///
/// Returns `Ok(None)` when the value does not restrict anything (an empty
/// string or an empty list).
pub fn parse_param(column: &str, value: &Value) -> Result<Option<Condition>, InvalidParam> {
    match value {
        Value::String(s) => {
            let mut items = split_list(s);
            match items.pop() {
                Some(last) if items.is_empty() => Ok(parse_string(column, &last, false)),
                Some(last) => {
                    items.push(last);
                    parse_list(column, items.into_iter().map(Value::String).collect())
                }
                None => Ok(None),
            }
        }
        Value::Array(items) => parse_list(column, items.clone()),
        _ => parse_token(column, value, false),
    }
}

fn parse_list(column: &str, items: Vec<Value>) -> Result<Option<Condition>, InvalidParam> {
    let mut items = items.into_iter().peekable();

    let mut glue = Glue::Or;
    if let Some(Value::String(first)) = items.peek() {
        let picked = match first.trim().to_lowercase().as_str() {
            "and" => Some(Glue::And),
            "or" => Some(Glue::Or),
            "not" => Some(Glue::Not),
            _ => None,
        };
        if let Some(picked) = picked {
            glue = picked;
            items.next();
        }
    }

    let negate = glue == Glue::Not;
    let mut conditions = Vec::new();
    for item in items {
        if let Some(condition) = parse_token(column, &item, negate)? {
            conditions.push(condition);
        }
    }

    if conditions.len() <= 1 {
        return Ok(conditions.pop());
    }

    if glue != Glue::And {
        if let Some(values) = equality_values(&conditions, negate) {
            return Ok(Some(Condition::In {
                column: column.to_string(),
                values,
                negated: negate,
            }));
        }
    }

    Ok(Some(match glue {
        Glue::Or => Condition::Or(conditions),
        Glue::And | Glue::Not => Condition::And(conditions),
    }))
}

/// The compared values when every condition is `=` (or `<>` when negated).
fn equality_values(conditions: &[Condition], negated: bool) -> Option<Vec<Value>> {
    let expected = if negated { CompareOp::NotEq } else { CompareOp::Eq };
    conditions
        .iter()
        .map(|condition| match condition {
            Condition::Compare { op, value, .. } if *op == expected => Some(value.clone()),
            _ => None,
        })
        .collect()
}

fn parse_token(column: &str, value: &Value, negate: bool) -> Result<Option<Condition>, InvalidParam> {
    match value {
        Value::Null => Ok(Some(Condition::Null {
            column: column.to_string(),
            negated: negate,
        })),
        Value::Bool(_) | Value::Number(_) => {
            let op = if negate { CompareOp::NotEq } else { CompareOp::Eq };
            Ok(Some(Condition::compare(column, op, value.clone())))
        }
        Value::String(s) => Ok(parse_string(column, s, negate)),
        Value::Array(_) => {
            let condition = parse_param(column, value)?;
            Ok(if negate {
                condition.map(|c| Condition::Not(Box::new(c)))
            } else {
                condition
            })
        }
        Value::Object(_) => Err(InvalidParam(format!(
            "cannot filter '{column}' by an object"
        ))),
    }
}

fn parse_string(column: &str, token: &str, mut negate: bool) -> Option<Condition> {
    let mut token = token.trim();
    if token.is_empty() {
        return None;
    }

    if token.eq_ignore_ascii_case(":empty:") {
        return Some(Condition::Null {
            column: column.to_string(),
            negated: negate,
        });
    }
    if token.eq_ignore_ascii_case(":notempty:") {
        return Some(Condition::Null {
            column: column.to_string(),
            negated: !negate,
        });
    }

    if let Some(rest) = token
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("not "))
        .and_then(|_| token.get(4..))
    {
        negate = !negate;
        token = rest.trim_start();
    }

    let mut op = CompareOp::Eq;
    for (prefix, prefix_op) in OPERATORS {
        if let Some(rest) = token.strip_prefix(prefix) {
            op = *prefix_op;
            token = rest.trim_start();
            break;
        }
    }
    if negate {
        op = negated(op);
    }

    if matches!(op, CompareOp::Eq | CompareOp::NotEq) && has_wildcard(token) {
        return Some(Condition::Like {
            column: column.to_string(),
            pattern: like_pattern(token),
            negated: op == CompareOp::NotEq,
        });
    }

    Some(Condition::compare(column, op, scalar(token)))
}

fn negated(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Eq => CompareOp::NotEq,
        CompareOp::NotEq => CompareOp::Eq,
        CompareOp::Lt => CompareOp::Gte,
        CompareOp::Lte => CompareOp::Gt,
        CompareOp::Gt => CompareOp::Lte,
        CompareOp::Gte => CompareOp::Lt,
    }
}

/// Splits on commas not preceded by a backslash.
fn split_list(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);

    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .collect()
}

fn has_wildcard(token: &str) -> bool {
    let mut escaped = false;
    for c in token.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '*' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}

fn like_pattern(token: &str) -> String {
    let mut pattern = String::with_capacity(token.len());
    let mut chars = token.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'*') => {
                pattern.push('*');
                chars.next();
            }
            '*' => pattern.push('%'),
            '%' | '_' => {
                pattern.push('\\');
                pattern.push(c);
            }
            _ => pattern.push(c),
        }
    }
    pattern
}

/// Numeric tokens are bound as numbers so they compare against numeric columns.
fn scalar(token: &str) -> Value {
    let literal = token.replace("\\*", "*");
    if let Ok(integer) = literal.parse::<i64>() {
        return Value::Number(integer.into());
    }
    if let Some(number) = literal.parse::<f64>().ok().and_then(Number::from_f64) {
        if literal.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')) {
            return Value::Number(number);
        }
    }
    Value::String(literal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Option<Condition> {
        parse_param("rating.score", &value).unwrap()
    }

    #[test]
    fn test_scalar_equality() {
        assert_eq!(parse(json!(5)), Some(Condition::eq("rating.score", 5)));
        assert_eq!(parse(json!(true)), Some(Condition::eq("rating.score", true)));
    }

    #[test]
    fn test_operator_prefix() {
        assert_eq!(
            parse(json!(">= 4")),
            Some(Condition::compare("rating.score", CompareOp::Gte, 4))
        );
        assert_eq!(
            parse(json!("!=2.5")),
            Some(Condition::compare("rating.score", CompareOp::NotEq, 2.5))
        );
    }

    #[test]
    fn test_not_prefix_flips_operator() {
        assert_eq!(
            parse(json!("not < 3")),
            Some(Condition::compare("rating.score", CompareOp::Gte, 3))
        );
        assert_eq!(
            parse(json!("not foo")),
            Some(Condition::compare("rating.score", CompareOp::NotEq, "foo"))
        );
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(
            parse(json!("*great*")),
            Some(Condition::Like {
                column: "rating.score".to_string(),
                pattern: "%great%".to_string(),
                negated: false,
            })
        );
        assert_eq!(
            parse(json!("5\\*")),
            Some(Condition::eq("rating.score", "5*"))
        );
    }

    #[test]
    fn test_empty_markers() {
        assert_eq!(
            parse(json!(":empty:")),
            Some(Condition::Null {
                column: "rating.score".to_string(),
                negated: false
            })
        );
        assert_eq!(
            parse(json!(":notempty:")),
            Some(Condition::Null {
                column: "rating.score".to_string(),
                negated: true
            })
        );
        assert_eq!(
            parse(Value::Null),
            Some(Condition::Null {
                column: "rating.score".to_string(),
                negated: false
            })
        );
    }

    #[test]
    fn test_lists_become_in() {
        assert_eq!(
            parse(json!([1, 2, 3])),
            Some(Condition::In {
                column: "rating.score".to_string(),
                values: vec![json!(1), json!(2), json!(3)],
                negated: false,
            })
        );
        assert_eq!(
            parse(json!("4, 5")),
            Some(Condition::In {
                column: "rating.score".to_string(),
                values: vec![json!(4), json!(5)],
                negated: false,
            })
        );
    }

    #[test]
    fn test_not_list() {
        assert_eq!(
            parse(json!(["not", 1, 2])),
            Some(Condition::In {
                column: "rating.score".to_string(),
                values: vec![json!(1), json!(2)],
                negated: true,
            })
        );
    }

    #[test]
    fn test_and_list() {
        assert_eq!(
            parse(json!(["and", ">= 2", "< 5"])),
            Some(Condition::And(vec![
                Condition::compare("rating.score", CompareOp::Gte, 2),
                Condition::compare("rating.score", CompareOp::Lt, 5),
            ]))
        );
    }

    #[test]
    fn test_escaped_comma_is_not_a_list() {
        assert_eq!(
            parse_param("rating.comment", &json!("good\\, really")).unwrap(),
            Some(Condition::eq("rating.comment", "good, really"))
        );
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(parse(json!("")), None);
        assert_eq!(parse(json!([])), None);
        assert_eq!(parse(json!(["or"])), None);
    }

    #[test]
    fn test_object_is_rejected() {
        let err = parse_param("rating.score", &json!({"gte": 4})).unwrap_err();
        assert!(err.to_string().contains("rating.score"));
    }
}
