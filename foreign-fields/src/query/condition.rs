//! Structured `WHERE` conditions.

use std::collections::BTreeMap;

use foreign_fields_shared::ColumnType;
use serde_json::Value;

use super::dialect::Dialect;

/// Comparison operator of a `Condition::Compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

/// A condition tree.
///
/// Raw fragments are written by callers and may use `[[column]]` and
/// `{{table}}` markers; every other variant binds its values as parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Raw(String),
    /// `column = value` for every entry; arrays become `IN`, null `IS NULL`.
    Hash(BTreeMap<String, Value>),
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    Like {
        column: String,
        pattern: String,
        negated: bool,
    },
    Null {
        column: String,
        negated: bool,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// Values of `condition` belong to a column of `column_type`.
    Typed {
        column_type: ColumnType,
        condition: Box<Condition>,
    },
}

impl Condition {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn hash<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Hash(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Restrict the values of this condition to `column_type`.
    ///
    /// On PostgreSQL the values are bound as text and cast to the column type,
    /// so a numeric-looking token compares against a text column as text.
    pub fn typed(self, column_type: ColumnType) -> Self {
        Self::Typed {
            column_type,
            condition: Box::new(self),
        }
    }

    /// Renders the condition, appending bound values to `params`.
    pub fn to_sql(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        self.render(dialect, params, None)
    }

    fn render(&self, dialect: Dialect, params: &mut Vec<Value>, cast: Option<ColumnType>) -> String {
        match self {
            Self::Raw(sql) => dialect.quote_sql(sql),
            Self::Hash(entries) => {
                if entries.is_empty() {
                    return "1=1".to_string();
                }
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(column, value)| match value {
                        Value::Null => Self::Null {
                            column: column.clone(),
                            negated: false,
                        }
                        .render(dialect, params, cast),
                        Value::Array(values) => Self::In {
                            column: column.clone(),
                            values: values.clone(),
                            negated: false,
                        }
                        .render(dialect, params, cast),
                        _ => Self::eq(column.clone(), value.clone()).render(dialect, params, cast),
                    })
                    .collect();
                join_parts(parts, " AND ")
            }
            Self::Compare { column, op, value } => {
                let placeholder = bind(dialect, params, value.clone(), cast);
                format!("{} {} {}", dialect.quote_column(column), op.as_sql(), placeholder)
            }
            Self::In {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return if *negated { "1=1" } else { "1=0" }.to_string();
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|value| bind(dialect, params, value.clone(), cast))
                    .collect();
                format!(
                    "{} {}IN ({})",
                    dialect.quote_column(column),
                    if *negated { "NOT " } else { "" },
                    placeholders.join(", ")
                )
            }
            Self::Like {
                column,
                pattern,
                negated,
            } => {
                let placeholder = bind(dialect, params, Value::String(pattern.clone()), None);
                format!(
                    "{} {} {}",
                    dialect.quote_column(column),
                    dialect.like_operator(*negated),
                    placeholder
                )
            }
            Self::Null { column, negated } => format!(
                "{} IS {}NULL",
                dialect.quote_column(column),
                if *negated { "NOT " } else { "" }
            ),
            Self::And(conditions) => {
                if conditions.is_empty() {
                    return "1=1".to_string();
                }
                let parts = conditions
                    .iter()
                    .map(|condition| condition.render(dialect, params, cast))
                    .collect();
                join_parts(parts, " AND ")
            }
            Self::Or(conditions) => {
                if conditions.is_empty() {
                    return "1=0".to_string();
                }
                let parts = conditions
                    .iter()
                    .map(|condition| condition.render(dialect, params, cast))
                    .collect();
                join_parts(parts, " OR ")
            }
            Self::Not(condition) => format!("NOT ({})", condition.render(dialect, params, cast)),
            Self::Typed {
                column_type,
                condition,
            } => condition.render(dialect, params, Some(*column_type)),
        }
    }

    /// Every string in the tree: raw fragments, column names and string values.
    pub fn collect_strings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Raw(sql) => out.push(sql),
            Self::Hash(entries) => {
                for (column, value) in entries {
                    out.push(column);
                    collect_value_strings(value, out);
                }
            }
            Self::Compare { column, value, .. } => {
                out.push(column);
                collect_value_strings(value, out);
            }
            Self::In { column, values, .. } => {
                out.push(column);
                for value in values {
                    collect_value_strings(value, out);
                }
            }
            Self::Like {
                column, pattern, ..
            } => {
                out.push(column);
                out.push(pattern);
            }
            Self::Null { column, .. } => out.push(column),
            Self::And(conditions) | Self::Or(conditions) => {
                for condition in conditions {
                    condition.collect_strings(out);
                }
            }
            Self::Not(condition) => condition.collect_strings(out),
            Self::Typed { condition, .. } => condition.collect_strings(out),
        }
    }
}

fn collect_value_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(values) => {
            for value in values {
                collect_value_strings(value, out);
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                out.push(key);
                collect_value_strings(value, out);
            }
        }
        _ => {}
    }
}

fn bind(dialect: Dialect, params: &mut Vec<Value>, value: Value, cast: Option<ColumnType>) -> String {
    match (dialect, cast) {
        (Dialect::Postgres, Some(column_type)) => {
            params.push(Value::String(text_value(value, column_type)));
            format!("{}::{}", dialect.placeholder(params.len()), column_type.sql())
        }
        _ => {
            params.push(value);
            dialect.placeholder(params.len())
        }
    }
}

/// The text form PostgreSQL parses into `column_type`.
fn text_value(value: Value, column_type: ColumnType) -> String {
    if column_type.is_json() {
        return value.to_string();
    }
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn join_parts(parts: Vec<String>, glue: &str) -> String {
    if parts.len() == 1 {
        return parts.into_iter().collect();
    }
    format!("({})", parts.join(glue))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compare_binds_value() {
        let mut params = Vec::new();
        let sql = Condition::compare("rating.score", CompareOp::Gte, 4)
            .to_sql(Dialect::Postgres, &mut params);

        assert_eq!(sql, "\"rating\".\"score\" >= $1");
        assert_eq!(params, vec![json!(4)]);
    }

    #[test]
    fn test_typed_condition_casts_text_params() {
        let mut params = Vec::new();
        let sql = Condition::eq("rating.comment", 5)
            .typed(ColumnType::Text)
            .to_sql(Dialect::Postgres, &mut params);

        assert_eq!(sql, "\"rating\".\"comment\" = $1::text");
        assert_eq!(params, vec![json!("5")]);
    }

    #[test]
    fn test_typed_condition_casts_every_list_value() {
        let mut params = Vec::new();
        let condition = Condition::In {
            column: "rating.score".to_string(),
            values: vec![json!(1), json!("2")],
            negated: false,
        };
        let sql = condition
            .typed(ColumnType::Integer)
            .to_sql(Dialect::Postgres, &mut params);

        assert_eq!(sql, "\"rating\".\"score\" IN ($1::integer, $2::integer)");
        assert_eq!(params, vec![json!("1"), json!("2")]);
    }

    #[test]
    fn test_typed_like_binds_plain_text() {
        let mut params = Vec::new();
        let condition = Condition::Like {
            column: "rating.comment".to_string(),
            pattern: "%5%".to_string(),
            negated: false,
        };
        let sql = condition
            .typed(ColumnType::Text)
            .to_sql(Dialect::Postgres, &mut params);

        assert_eq!(sql, "\"rating\".\"comment\" ILIKE $1");
        assert_eq!(params, vec![json!("%5%")]);
    }

    #[test]
    fn test_typed_json_values_are_json_text() {
        let mut params = Vec::new();
        Condition::eq("link.meta", "x")
            .typed(ColumnType::Json)
            .to_sql(Dialect::Postgres, &mut params);

        assert_eq!(params, vec![json!("\"x\"")]);
    }

    #[test]
    fn test_typed_condition_on_mysql_keeps_values() {
        let mut params = Vec::new();
        let sql = Condition::eq("rating.comment", 5)
            .typed(ColumnType::Text)
            .to_sql(Dialect::MySql, &mut params);

        assert_eq!(sql, "`rating`.`comment` = ?");
        assert_eq!(params, vec![json!(5)]);
    }

    #[test]
    fn test_hash_condition() {
        let mut params = vec![json!("earlier")];
        let sql = Condition::hash([
            ("elements.type", json!("entry")),
            ("elements.id", json!([1, 2])),
            ("elements.dateDeleted", Value::Null),
        ])
        .to_sql(Dialect::Postgres, &mut params);

        assert_eq!(
            sql,
            "(\"elements\".\"dateDeleted\" IS NULL AND \"elements\".\"id\" IN ($2, $3) AND \"elements\".\"type\" = $4)"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_nested_groups() {
        let mut params = Vec::new();
        let condition = Condition::Or(vec![
            Condition::raw("[[a]] > 1"),
            Condition::Not(Box::new(Condition::Null {
                column: "b".to_string(),
                negated: false,
            })),
        ]);

        assert_eq!(
            condition.to_sql(Dialect::MySql, &mut params),
            "(`a` > 1 OR NOT (`b` IS NULL))"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_empty_in_list() {
        let mut params = Vec::new();
        let condition = Condition::In {
            column: "id".to_string(),
            values: vec![],
            negated: false,
        };
        assert_eq!(condition.to_sql(Dialect::Postgres, &mut params), "1=0");
    }

    #[test]
    fn test_collect_strings_is_recursive() {
        let condition = Condition::And(vec![
            Condition::raw("rating.score > 3"),
            Condition::hash([("title", json!(["a", {"nested": "rating"}]))]),
        ]);
        let mut strings = Vec::new();
        condition.collect_strings(&mut strings);

        assert_eq!(strings, vec!["rating.score > 3", "title", "a", "nested", "rating"]);
    }
}
