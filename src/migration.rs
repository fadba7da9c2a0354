//! Bootstrap DDL: CREATE TABLE per entity definition, so hosts and tests can
//! stand up a database from the definition file alone.

use crate::definition::EntityDefinition;
use crate::error::CrudError;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Apply `CREATE TABLE IF NOT EXISTS` for every definition. Idempotent;
/// existing tables are left untouched.
pub async fn apply_schema(
    pool: &PgPool,
    definitions: &BTreeMap<String, Arc<EntityDefinition>>,
) -> Result<(), CrudError> {
    for definition in definitions.values() {
        let sql = create_table_sql(definition);
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(&sql).execute(pool).await?;
    }
    Ok(())
}

/// DDL for one entity: BIGSERIAL primary key, one column per field, managed
/// timestamp columns. Required-ness is enforced by validation rather than
/// NOT NULL, and delete protection lives in the data layer rather than
/// FOREIGN KEY constraints, so blocked deletes surface as `false` instead of
/// database errors.
pub fn create_table_sql(definition: &EntityDefinition) -> String {
    let mut col_defs = vec![format!("{} BIGSERIAL PRIMARY KEY", quote("id"))];
    for field in &definition.fields {
        let mut def = format!("{} {}", quote(&field.name), field.field_type.column_type());
        if field.unique {
            def.push_str(" UNIQUE");
        }
        col_defs.push(def);
    }
    col_defs.push(format!(
        "{} TIMESTAMPTZ NOT NULL DEFAULT NOW()",
        quote("created_at")
    ));
    col_defs.push(format!(
        "{} TIMESTAMPTZ NOT NULL DEFAULT NOW()",
        quote("updated_at")
    ));
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote(&definition.table),
        col_defs.join(",\n  ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::load_str;

    #[test]
    fn generates_columns_per_field_type() {
        let defs = load_str(
            r#"
library:
  table: library
  fields:
    name:
      type: text
      unique: true
book:
  table: book
  fields:
    title:
      type: text
    pages:
      type: int
    price:
      type: float
    inStock:
      type: bool
    release:
      type: date
    addedAt:
      type: datetime
    library:
      type: reference
      reference:
        entity: library
        nameField: name
    cover:
      type: file
      path: uploads
"#,
        )
        .unwrap();

        let sql = create_table_sql(&defs["book"]);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"book\""));
        assert!(sql.contains("\"id\" BIGSERIAL PRIMARY KEY"));
        assert!(sql.contains("\"title\" TEXT"));
        assert!(sql.contains("\"pages\" BIGINT"));
        assert!(sql.contains("\"price\" DOUBLE PRECISION"));
        assert!(sql.contains("\"inStock\" BOOLEAN"));
        assert!(sql.contains("\"release\" DATE"));
        assert!(sql.contains("\"addedAt\" TIMESTAMPTZ"));
        assert!(sql.contains("\"library\" BIGINT"));
        assert!(sql.contains("\"cover\" TEXT"));
        assert!(sql.contains("\"updated_at\" TIMESTAMPTZ NOT NULL DEFAULT NOW()"));

        let library_sql = create_table_sql(&defs["library"]);
        assert!(library_sql.contains("\"name\" TEXT UNIQUE"));
    }
}
