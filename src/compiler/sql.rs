//! SQL compiler for single-table selects.
//!
//! Key grammar: `Table`, `Table[]`, optionally followed by `:alias`.
//! `Table` fetches one row, `Table[]` fetches every matching row.
//!
//! Field specification entries:
//!
//! | Entry | Meaning |
//! |-------|---------|
//! | `"@column": "id,name"` | projection (default `*`) |
//! | `"@order": "date-,id+"` | `ORDER BY date DESC, id ASC` |
//! | `"@limit": 10`, `"@offset": 20` | paging |
//! | `"col": 1` | `col = ?` (`null` is `IS NULL`, an array is `IN`) |
//! | `"col>=": 1` | comparison; also `>`, `<`, `<=`, `!` (not equal), `~` (LIKE) |
//! | `"col@": "/User/id"` | operand taken from a resolved reference |

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::{CompileError, CompiledQuery, FetchMode, QueryCompiler, ReferenceLoader};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

const LIST_SUFFIX: &str = "[]";
const ALIAS_SEPARATOR: char = ':';
const DIRECTIVE_PREFIX: char = '@';
const REFERENCE_SUFFIX: char = '@';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

impl Operator {
    /// Suffixes in match order; two-character operators first.
    const SUFFIXES: [(&'static str, Operator); 6] = [
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        (">", Operator::Gt),
        ("<", Operator::Lt),
        ("!", Operator::Ne),
        ("~", Operator::Like),
    ];

    fn sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Like => "LIKE",
        }
    }
}

/// Builds `SELECT` statements from field specifications.
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler;

impl SqlCompiler {
    pub fn new() -> Self {
        SqlCompiler
    }
}

/// Accumulates the parts of one statement while walking a specification.
#[derive(Default)]
struct SelectBuilder {
    columns: Option<Vec<String>>,
    conditions: Vec<String>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    params: Vec<Value>,
}

impl QueryCompiler for SqlCompiler {
    fn compile(
        &self,
        key: &str,
        spec: &Map<String, Value>,
        loader: &mut dyn ReferenceLoader,
    ) -> Result<CompiledQuery, CompileError> {
        let (table, fetch) = parse_key(key)?;
        let mut select = SelectBuilder::default();

        for (field, value) in spec {
            if let Some(directive) = field.strip_prefix(DIRECTIVE_PREFIX) {
                select.directive(directive, value)?;
                continue;
            }

            let (column, op, is_reference) = split_condition(field);
            let column = quote_identifier(column)?;
            if is_reference {
                let reference = value.as_str().ok_or_else(|| CompileError::InvalidValue {
                    field: field.clone(),
                    reason: "reference must be a string".to_string(),
                })?;
                let resolved = loader.load(reference)?;
                select.condition(field, &column, op, resolved)?;
            } else {
                select.condition(field, &column, op, value.clone())?;
            }
        }

        Ok(select.finish(table, fetch))
    }
}

/// Split a request key into its table name and fetch mode.
fn parse_key(key: &str) -> Result<(&str, FetchMode), CompileError> {
    let name = match key.split_once(ALIAS_SEPARATOR) {
        Some((_, "")) => {
            return Err(CompileError::InvalidKey {
                key: key.to_string(),
                reason: "empty alias".to_string(),
            })
        }
        Some((name, _)) => name,
        None => key,
    };

    let (table, fetch) = match name.strip_suffix(LIST_SUFFIX) {
        Some(table) => (table, FetchMode::All),
        None => (name, FetchMode::One),
    };

    if !IDENTIFIER.is_match(table) {
        return Err(CompileError::InvalidKey {
            key: key.to_string(),
            reason: format!("'{table}' is not a table name"),
        });
    }
    Ok((table, fetch))
}

/// `"age>=@"` -> (`"age"`, `Ge`, true)
fn split_condition(field: &str) -> (&str, Operator, bool) {
    let (field, is_reference) = match field.strip_suffix(REFERENCE_SUFFIX) {
        Some(rest) => (rest, true),
        None => (field, false),
    };
    for (suffix, op) in Operator::SUFFIXES {
        if let Some(column) = field.strip_suffix(suffix) {
            return (column, op, is_reference);
        }
    }
    (field, Operator::Eq, is_reference)
}

fn quote_identifier(name: &str) -> Result<String, CompileError> {
    if IDENTIFIER.is_match(name) {
        Ok(format!("\"{name}\""))
    } else {
        Err(CompileError::InvalidIdentifier(name.to_string()))
    }
}

fn invalid(field: &str, reason: &str) -> CompileError {
    CompileError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

impl SelectBuilder {
    fn directive(&mut self, name: &str, value: &Value) -> Result<(), CompileError> {
        let field = format!("{DIRECTIVE_PREFIX}{name}");
        match name {
            "column" => {
                let list = value
                    .as_str()
                    .ok_or_else(|| invalid(&field, "expected a comma-separated string"))?;
                let columns = list
                    .split(',')
                    .map(|c| quote_identifier(c.trim()))
                    .collect::<Result<Vec<_>, _>>()?;
                self.columns = Some(columns);
            }
            "order" => {
                let list = value
                    .as_str()
                    .ok_or_else(|| invalid(&field, "expected a comma-separated string"))?;
                for item in list.split(',').map(str::trim) {
                    let (column, direction) = if let Some(c) = item.strip_suffix('-') {
                        (c, "DESC")
                    } else if let Some(c) = item.strip_suffix('+') {
                        (c, "ASC")
                    } else {
                        (item, "ASC")
                    };
                    self.order
                        .push(format!("{} {direction}", quote_identifier(column)?));
                }
            }
            "limit" => {
                self.limit = Some(
                    value
                        .as_u64()
                        .ok_or_else(|| invalid(&field, "expected a non-negative integer"))?,
                );
            }
            "offset" => {
                self.offset = Some(
                    value
                        .as_u64()
                        .ok_or_else(|| invalid(&field, "expected a non-negative integer"))?,
                );
            }
            _ => return Err(CompileError::UnknownDirective(field)),
        }
        Ok(())
    }

    fn condition(
        &mut self,
        field: &str,
        column: &str,
        op: Operator,
        value: Value,
    ) -> Result<(), CompileError> {
        match value {
            Value::Null => {
                let clause = match op {
                    Operator::Eq => "IS NULL",
                    Operator::Ne => "IS NOT NULL",
                    _ => return Err(invalid(field, "null only supports equality")),
                };
                self.conditions.push(format!("{column} {clause}"));
            }
            Value::Array(items) => {
                let keyword = match op {
                    Operator::Eq => "IN",
                    Operator::Ne => "NOT IN",
                    _ => return Err(invalid(field, "a list only supports equality")),
                };
                if items.is_empty() {
                    return Err(invalid(field, "empty list"));
                }
                if !items.iter().all(is_scalar) {
                    return Err(invalid(field, "list items must be scalars"));
                }
                let placeholders = vec!["?"; items.len()].join(", ");
                self.conditions
                    .push(format!("{column} {keyword} ({placeholders})"));
                self.params.extend(items);
            }
            Value::Object(_) => return Err(invalid(field, "objects cannot be compared")),
            scalar => {
                self.conditions.push(format!("{column} {} ?", op.sql()));
                self.params.push(scalar);
            }
        }
        Ok(())
    }

    fn finish(self, table: &str, fetch: FetchMode) -> CompiledQuery {
        let columns = self.columns.map_or_else(|| "*".to_string(), |c| c.join(", "));
        let mut statement = format!("SELECT {columns} FROM \"{table}\"");

        if !self.conditions.is_empty() {
            statement.push_str(" WHERE ");
            statement.push_str(&self.conditions.join(" AND "));
        }
        if !self.order.is_empty() {
            statement.push_str(" ORDER BY ");
            statement.push_str(&self.order.join(", "));
        }

        let limit = match fetch {
            FetchMode::One => Some(1),
            FetchMode::All => self.limit,
        };
        match (limit, self.offset) {
            (Some(limit), Some(offset)) => {
                statement.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
            }
            (Some(limit), None) => statement.push_str(&format!(" LIMIT {limit}")),
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
            (None, Some(offset)) => statement.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        CompiledQuery {
            statement,
            params: self.params,
            fetch,
        }
    }
}
