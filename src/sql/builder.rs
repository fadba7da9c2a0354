//! Builds parameterized SELECT, INSERT, UPDATE, DELETE and COUNT statements
//! from entity definitions.

use crate::definition::EntityDefinition;
use crate::entity::ID_FIELD;
use serde_json::Value;

/// Comparator for count conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
}

impl Comparator {
    fn sql(self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
        }
    }
}

/// Quote identifier for PostgreSQL (identifiers only ever come from the
/// definition file, quoting is belt and braces).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// Column list: id plus every defined field, in definition order.
fn column_list(definition: &EntityDefinition) -> String {
    let mut cols = vec![quoted(ID_FIELD)];
    cols.extend(definition.fields.iter().map(|f| quoted(&f.name)));
    cols.join(", ")
}

/// Placeholder for a column, with the field type's SQL cast when it has one.
fn placeholder(definition: &EntityDefinition, column: &str, n: usize) -> String {
    definition
        .field(column)
        .and_then(|f| f.field_type.bind_cast())
        .map(|cast| format!("${}::{}", n, cast))
        .unwrap_or_else(|| format!("${}", n))
}

/// SELECT one row by primary key.
pub fn select_by_id(definition: &EntityDefinition, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone());
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = ${}::bigint",
        column_list(definition),
        quoted(&definition.table),
        quoted(ID_FIELD),
        n
    );
    q
}

/// SELECT list with exact-match filters, ORDER BY id ASC unless a sort is
/// given, and LIMIT/OFFSET. Filter columns not in the definition are dropped.
pub fn select_list(
    definition: &EntityDefinition,
    filters: &[(String, Value)],
    sort: Option<(&str, bool)>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> QueryBuf {
    let mut q = QueryBuf::new();

    let mut where_parts = Vec::new();
    for (col, val) in filters {
        if definition.field(col).is_none() && col != ID_FIELD {
            continue;
        }
        if val.is_null() {
            where_parts.push(format!("{} IS NULL", quoted(col)));
        } else {
            let n = q.push_param(val.clone());
            where_parts.push(format!("{} = {}", quoted(col), placeholder(definition, col, n)));
        }
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };

    let order_clause = match sort {
        Some((col, ascending)) if definition.field(col).is_some() || col == ID_FIELD => format!(
            " ORDER BY {} {}",
            quoted(col),
            if ascending { "ASC" } else { "DESC" }
        ),
        _ => format!(" ORDER BY {} ASC", quoted(ID_FIELD)),
    };
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();

    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        column_list(definition),
        quoted(&definition.table),
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// INSERT with RETURNING id. Values come pre-normalized from the data layer,
/// one pair per column to write.
pub fn insert(definition: &EntityDefinition, values: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (col, val) in values {
        let n = q.push_param(val.clone());
        cols.push(quoted(col));
        placeholders.push(placeholder(definition, col, n));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(&definition.table),
        cols.join(", "),
        placeholders.join(", "),
        quoted(ID_FIELD)
    );
    q
}

/// UPDATE by id: SET every given column, bump updated_at.
pub fn update(definition: &EntityDefinition, id: &Value, values: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(values.len() + 1);
    for (col, val) in values {
        let n = q.push_param(val.clone());
        sets.push(format!("{} = {}", quoted(col), placeholder(definition, col, n)));
    }
    sets.push(format!("{} = NOW()", quoted("updated_at")));
    let id_param = q.push_param(id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}::bigint",
        quoted(&definition.table),
        sets.join(", "),
        quoted(ID_FIELD),
        id_param
    );
    q
}

/// DELETE by id.
pub fn delete(definition: &EntityDefinition, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone());
    q.sql = format!(
        "DELETE FROM {} WHERE {} = ${}::bigint",
        quoted(&definition.table),
        quoted(ID_FIELD),
        n
    );
    q
}

/// SELECT COUNT(*) over an arbitrary table with per-condition comparators.
/// `exclude_id` additionally skips the row with that primary key, for
/// "does any other row ..." checks.
pub fn count(
    table: &str,
    conditions: &[(String, Value, Comparator)],
    exclude_id: Option<&Value>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut where_parts = Vec::new();
    for (col, val, cmp) in conditions {
        if val.is_null() {
            where_parts.push(match cmp {
                Comparator::Eq => format!("{} IS NULL", quoted(col)),
                Comparator::Ne => format!("{} IS NOT NULL", quoted(col)),
            });
        } else {
            let n = q.push_param(val.clone());
            where_parts.push(format!("{} {} ${}", quoted(col), cmp.sql(), n));
        }
    }
    if let Some(id) = exclude_id {
        let n = q.push_param(id.clone());
        where_parts.push(format!("{} != ${}", quoted(ID_FIELD), n));
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    q.sql = format!("SELECT COUNT(*) FROM {}{}", quoted(table), where_clause);
    q
}

/// All id/display-name pairs of a referenced table, ordered by display name.
pub fn select_references(table: &str, name_field: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {}, {} FROM {} ORDER BY {}",
        quoted(ID_FIELD),
        quoted(name_field),
        quoted(table),
        quoted(name_field)
    );
    q
}

/// Display names for a batch of ids: SELECT id, name WHERE id IN (...).
pub fn select_names_by_ids(table: &str, name_field: &str, ids: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    if ids.is_empty() {
        q.sql = format!(
            "SELECT {}, {} FROM {} WHERE 1 = 0",
            quoted(ID_FIELD),
            quoted(name_field),
            quoted(table)
        );
        return q;
    }
    let placeholders: Vec<String> = ids
        .iter()
        .map(|v| format!("${}::bigint", q.push_param(v.clone())))
        .collect();
    q.sql = format!(
        "SELECT {}, {} FROM {} WHERE {} IN ({})",
        quoted(ID_FIELD),
        quoted(name_field),
        quoted(table),
        quoted(ID_FIELD),
        placeholders.join(", ")
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::load_str;
    use serde_json::json;
    use std::sync::Arc;

    fn book() -> Arc<EntityDefinition> {
        load_str(
            r#"
library:
  table: library
  fields:
    name:
      type: text
book:
  table: book
  fields:
    title:
      type: text
    pages:
      type: int
    release:
      type: date
    library:
      type: reference
      reference:
        entity: library
        nameField: name
"#,
        )
        .unwrap()["book"]
            .clone()
    }

    #[test]
    fn select_by_id_binds_one_param() {
        let q = select_by_id(&book(), &json!(7));
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"title\", \"pages\", \"release\", \"library\" FROM \"book\" WHERE \"id\" = $1::bigint"
        );
        assert_eq!(q.params, vec![json!(7)]);
    }

    #[test]
    fn select_list_defaults_to_id_ascending() {
        let q = select_list(&book(), &[], None, Some(10), Some(20));
        assert!(q.sql.ends_with("ORDER BY \"id\" ASC LIMIT 10 OFFSET 20"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn select_list_drops_unknown_filter_columns() {
        let filters = vec![
            ("title".to_string(), json!("t")),
            ("nope".to_string(), json!("x")),
        ];
        let q = select_list(&book(), &filters, None, None, None);
        assert!(q.sql.contains("WHERE \"title\" = $1"));
        assert!(!q.sql.contains("nope"));
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn select_list_honors_sort() {
        let q = select_list(&book(), &[], Some(("title", false)), None, None);
        assert!(q.sql.contains("ORDER BY \"title\" DESC"));
    }

    #[test]
    fn insert_casts_typed_columns() {
        let values = vec![
            ("title".to_string(), json!("t")),
            ("release".to_string(), json!("2020-01-02")),
            ("library".to_string(), json!(1)),
        ];
        let q = insert(&book(), &values);
        assert_eq!(
            q.sql,
            "INSERT INTO \"book\" (\"title\", \"release\", \"library\") \
             VALUES ($1, $2::date, $3::bigint) RETURNING \"id\""
        );
        assert_eq!(q.params.len(), 3);
    }

    #[test]
    fn update_bumps_updated_at_and_binds_id_last() {
        let values = vec![("title".to_string(), json!("t2"))];
        let q = update(&book(), &json!(5), &values);
        assert_eq!(
            q.sql,
            "UPDATE \"book\" SET \"title\" = $1, \"updated_at\" = NOW() WHERE \"id\" = $2::bigint"
        );
        assert_eq!(q.params, vec![json!("t2"), json!(5)]);
    }

    #[test]
    fn count_supports_comparators_and_exclusion() {
        let conditions = vec![
            ("library".to_string(), json!(3), Comparator::Eq),
            ("title".to_string(), json!("t"), Comparator::Ne),
        ];
        let q = count("book", &conditions, Some(&json!(9)));
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"book\" WHERE \"library\" = $1 AND \"title\" != $2 AND \"id\" != $3"
        );
        assert_eq!(q.params, vec![json!(3), json!("t"), json!(9)]);
    }

    #[test]
    fn count_turns_null_into_is_null() {
        let conditions = vec![("library".to_string(), Value::Null, Comparator::Eq)];
        let q = count("book", &conditions, None);
        assert_eq!(q.sql, "SELECT COUNT(*) FROM \"book\" WHERE \"library\" IS NULL");
        assert!(q.params.is_empty());
    }

    #[test]
    fn names_by_ids_handles_empty_input() {
        let q = select_names_by_ids("library", "name", &[]);
        assert!(q.sql.contains("WHERE 1 = 0"));
        assert!(q.params.is_empty());
    }
}
