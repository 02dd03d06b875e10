//! SQL dialects understood by the query builder.

use std::fmt;
use std::str::FromStr;

/// SQL dialect used when rendering a prepared query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    MySql,
}

impl Dialect {
    /// Quote a single identifier.
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            Self::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Quote a possibly qualified column name (`alias.column`).
    ///
    /// `*` is left as is.
    pub fn quote_column(&self, name: &str) -> String {
        name.split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    self.quote_ident(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn quote_table(&self, name: &str) -> String {
        self.quote_column(name)
    }

    /// Replace `[[column]]` and `{{table}}` markers in a raw fragment.
    pub fn quote_sql(&self, sql: &str) -> String {
        let mut out = String::with_capacity(sql.len());
        let mut rest = sql;

        loop {
            let column = rest.find("[[");
            let table = rest.find("{{");
            let (start, open_len, close, is_column) = match (column, table) {
                (Some(c), Some(t)) if t < c => (t, 2, "}}", false),
                (Some(c), _) => (c, 2, "]]", true),
                (None, Some(t)) => (t, 2, "}}", false),
                (None, None) => break,
            };

            let inner_start = start + open_len;
            let Some(length) = rest[inner_start..].find(close) else {
                break;
            };

            out.push_str(&rest[..start]);
            let name = &rest[inner_start..inner_start + length];
            if is_column {
                out.push_str(&self.quote_column(name));
            } else {
                out.push_str(&self.quote_table(name));
            }
            rest = &rest[inner_start + length + close.len()..];
        }

        out.push_str(rest);
        out
    }

    /// Function building a JSON object from key/value pairs.
    pub fn json_object_fn(&self) -> &'static str {
        match self {
            Self::Postgres => "json_build_object",
            Self::MySql => "json_object",
        }
    }

    /// Placeholder for the bind parameter at 1-based position `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::MySql => "?".to_string(),
        }
    }

    /// The `LIKE` operator, case-insensitive on both dialects.
    pub fn like_operator(&self, negated: bool) -> &'static str {
        match (self, negated) {
            (Self::Postgres, false) => "ILIKE",
            (Self::Postgres, true) => "NOT ILIKE",
            (Self::MySql, false) => "LIKE",
            (Self::MySql, true) => "NOT LIKE",
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            other => Err(format!("unsupported SQL dialect '{other}'")),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => f.write_str("postgres"),
            Self::MySql => f.write_str("mysql"),
        }
    }
}
