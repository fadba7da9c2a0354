//! Per-entity data access: parameterized CRUD with relationship-aware delete
//! protection, reference dereferencing, and attached-file lifecycle.

use crate::definition::{truthy, EntityDefinition, FieldDefinition, FieldType};
use crate::entity::{Entity, ID_FIELD};
use crate::error::CrudError;
use crate::files::{FileDownload, FileProcessor, FileUpload};
use crate::sql::{self, Comparator, PgBindValue, QueryBuf};
use serde_json::{json, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;

/// Another entity's field pointing at this entity's rows. Rows with live
/// dependents cannot be deleted.
#[derive(Clone, Debug)]
pub struct Dependent {
    pub entity: String,
    pub table: String,
    pub field: String,
}

/// One id/display-name pair for populating reference selectors.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceEntry {
    pub id: Value,
    pub name: String,
}

/// Incoming file payload of a create/edit request: field name -> upload.
pub type Uploads = HashMap<String, FileUpload>;

/// Stateless facade over the connection pool for one entity type.
pub struct Data {
    definition: Arc<EntityDefinition>,
    pool: PgPool,
    files: Arc<dyn FileProcessor>,
    dependents: Vec<Dependent>,
}

impl Data {
    pub(crate) fn new(
        definition: Arc<EntityDefinition>,
        pool: PgPool,
        files: Arc<dyn FileProcessor>,
        dependents: Vec<Dependent>,
    ) -> Self {
        Data {
            definition,
            pool,
            files,
            dependents,
        }
    }

    pub fn definition(&self) -> &Arc<EntityDefinition> {
        &self.definition
    }

    /// Entities whose rows can block deletes of this entity's rows.
    pub fn dependents(&self) -> &[Dependent] {
        &self.dependents
    }

    /// New entity bound to this definition, all fields unset, id absent.
    pub fn create_empty(&self) -> Entity {
        Entity::new(self.definition.clone())
    }

    /// Insert a row and write the generated id back onto the entity.
    /// Unique-constraint violations surface as `CrudError::Db`.
    pub async fn create(&self, entity: &mut Entity) -> Result<(), CrudError> {
        let values = self.write_values(entity);
        let q = sql::insert(&self.definition, &values);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind(&q).fetch_one(&self.pool).await?;
        let id: i64 = row.try_get(ID_FIELD)?;
        entity.set(ID_FIELD, id);
        Ok(())
    }

    /// Fetch by primary key; a missing row is `Ok(None)`, not an error.
    pub async fn get(&self, id: &Value) -> Result<Option<Entity>, CrudError> {
        let q = sql::select_by_id(&self.definition, id);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind(&q).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| self.entity_from_row(&r)))
    }

    /// Update the row matching the entity's id. Booleans are normalized and
    /// unset booleans cleared to false before writing.
    pub async fn update(&self, entity: &Entity) -> Result<(), CrudError> {
        let id = entity.id().cloned().ok_or(CrudError::MissingId)?;
        let values = self.write_values(entity);
        let q = sql::update(&self.definition, &id, &values);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        bind(&q).execute(&self.pool).await?;
        Ok(())
    }

    /// Delete by id. Returns `false` without touching storage while any
    /// dependent entity still holds a row referencing the id. The dependency
    /// check and the DELETE share one transaction. String ids parse to their
    /// numeric key before binding.
    pub async fn delete(&self, id: &Value) -> Result<bool, CrudError> {
        let id = reference_key(id);
        let mut tx = self.pool.begin().await?;
        for dep in &self.dependents {
            // self-references: the row being deleted must not block itself
            let exclude = (dep.table == self.definition.table).then_some(&id);
            let conditions = vec![(dep.field.clone(), id.clone(), Comparator::Eq)];
            let q = sql::count(&dep.table, &conditions, exclude);
            tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
            let mut query = sqlx::query_scalar(&q.sql);
            for p in &q.params {
                query = query.bind(PgBindValue::from_json(p));
            }
            let n: i64 = query.fetch_one(&mut *tx).await?;
            if n > 0 {
                tx.rollback().await?;
                return Ok(false);
            }
        }
        let q = sql::delete(&self.definition, &id);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        bind(&q).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// List rows matching the exact-match filters, ordered by primary key
    /// ascending unless a sort is given. The limit defaults to the
    /// definition's page size.
    pub async fn list_entries(
        &self,
        filters: &[(String, Value)],
        sort: Option<(&str, bool)>,
        offset: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Entity>, CrudError> {
        let limit = limit.unwrap_or(i64::from(self.definition.page_size));
        let q = sql::select_list(&self.definition, filters, sort, Some(limit), offset);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind(&q).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|r| self.entity_from_row(r)).collect())
    }

    /// Total rows matching the filters, for pagination.
    pub async fn count(&self, filters: &[(String, Value)]) -> Result<i64, CrudError> {
        let conditions: Vec<(String, Value, Comparator)> = filters
            .iter()
            .map(|(c, v)| (c.clone(), v.clone(), Comparator::Eq))
            .collect();
        self.count_by(&self.definition.table, &conditions, None).await
    }

    /// Count rows of `table` where each condition's field matches its value
    /// under the paired comparator. `exclude_id` additionally skips the row
    /// with that primary key ("does any *other* row reference this id").
    pub async fn count_by(
        &self,
        table: &str,
        conditions: &[(String, Value, Comparator)],
        exclude_id: Option<&Value>,
    ) -> Result<i64, CrudError> {
        let exclude_id = exclude_id.map(reference_key);
        let q = sql::count(table, conditions, exclude_id.as_ref());
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    /// All rows of a referenced table as id/display-name pairs, ordered by
    /// display name. Populates reference selectors.
    pub async fn get_references(
        &self,
        table: &str,
        name_field: &str,
    ) -> Result<Vec<ReferenceEntry>, CrudError> {
        let q = sql::select_references(table, name_field);
        tracing::debug!(sql = %q.sql, "query");
        let rows = bind(&q).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| ReferenceEntry {
                id: row
                    .try_get::<i64, _>(ID_FIELD)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                name: display_name(row, name_field),
            })
            .collect())
    }

    /// Replace each raw reference value on the entity with `{id, name}`.
    /// Passing `None` is a safe no-op.
    pub async fn fetch_references(&self, entity: Option<&mut Entity>) -> Result<(), CrudError> {
        let Some(entity) = entity else {
            return Ok(());
        };
        for field in self.definition.reference_fields() {
            let FieldType::Reference {
                table, name_field, ..
            } = &field.field_type
            else {
                continue;
            };
            let raw = entity.raw(&field.name).cloned().unwrap_or(Value::Null);
            if raw.is_null() || raw.is_object() {
                continue;
            }
            let key = reference_key(&raw);
            let q = sql::select_names_by_ids(table, name_field, std::slice::from_ref(&key));
            tracing::debug!(sql = %q.sql, params = ?q.params, "query");
            if let Some(row) = bind(&q).fetch_optional(&self.pool).await? {
                let name = display_name(&row, name_field);
                entity.set(&field.name, json!({ "id": key, "name": name }));
            }
        }
        Ok(())
    }

    /// Batch variant for listings: one IN-query per reference field.
    pub async fn fetch_references_all(&self, entities: &mut [Entity]) -> Result<(), CrudError> {
        for field in self.definition.reference_fields() {
            let FieldType::Reference {
                table, name_field, ..
            } = &field.field_type
            else {
                continue;
            };
            let mut ids: Vec<Value> = Vec::new();
            for entity in entities.iter() {
                let raw = entity.raw(&field.name).cloned().unwrap_or(Value::Null);
                if raw.is_null() || raw.is_object() {
                    continue;
                }
                if let Some(n) = reference_key(&raw).as_i64() {
                    let v = Value::from(n);
                    if !ids.contains(&v) {
                        ids.push(v);
                    }
                }
            }
            if ids.is_empty() {
                continue;
            }
            let q = sql::select_names_by_ids(table, name_field, &ids);
            tracing::debug!(sql = %q.sql, params = ?q.params, "query");
            let rows = bind(&q).fetch_all(&self.pool).await?;
            let names: HashMap<i64, String> = rows
                .iter()
                .filter_map(|row| {
                    row.try_get::<i64, _>(ID_FIELD)
                        .ok()
                        .map(|id| (id, display_name(row, name_field)))
                })
                .collect();
            for entity in entities.iter_mut() {
                let raw = entity.raw(&field.name).cloned().unwrap_or(Value::Null);
                if raw.is_null() || raw.is_object() {
                    continue;
                }
                if let Some(id) = reference_key(&raw).as_i64() {
                    if let Some(name) = names.get(&id) {
                        entity.set(&field.name, json!({ "id": id, "name": name }));
                    }
                }
            }
        }
        Ok(())
    }

    /// Store uploads for every file field present in the payload.
    pub async fn create_files(&self, uploads: &Uploads, entity: &Entity) -> Result<(), CrudError> {
        for field in self.definition.file_fields() {
            if let Some(upload) = uploads.get(&field.name) {
                self.files.create_file(upload, entity, &field.name).await?;
            }
        }
        Ok(())
    }

    /// Replace stored files for every file field present in the payload;
    /// fields without a previously stored file are created instead.
    pub async fn update_files(&self, uploads: &Uploads, entity: &Entity) -> Result<(), CrudError> {
        for field in self.definition.file_fields() {
            if let Some(upload) = uploads.get(&field.name) {
                if entity.is_set(&field.name) {
                    self.files.update_file(upload, entity, &field.name).await?;
                } else {
                    self.files.create_file(upload, entity, &field.name).await?;
                }
            }
        }
        Ok(())
    }

    /// Remove the stored file of one field.
    pub async fn delete_file(&self, entity: &Entity, field: &str) -> Result<(), CrudError> {
        self.files.delete_file(entity, field).await
    }

    /// Remove the stored files of all file fields, e.g. before deleting the row.
    pub async fn delete_files(&self, entity: &Entity) -> Result<(), CrudError> {
        for field in self.definition.file_fields() {
            self.files.delete_file(entity, &field.name).await?;
        }
        Ok(())
    }

    /// Load one field's stored file for download.
    pub async fn render_file(&self, entity: &Entity, field: &str) -> Result<FileDownload, CrudError> {
        self.files.render_file(entity, field).await
    }

    /// Column values to persist, one per defined field: booleans normalized
    /// to strict true/false (unset clears to false), reference objects
    /// collapsed to their key, numeric strings parsed.
    fn write_values(&self, entity: &Entity) -> Vec<(String, Value)> {
        self.definition
            .fields
            .iter()
            .map(|field| {
                let raw = entity.raw(&field.name).cloned().unwrap_or(Value::Null);
                let value = match &field.field_type {
                    FieldType::Bool => Value::Bool(truthy(&raw)),
                    FieldType::Reference { .. } => reference_key(&raw),
                    _ => field.field_type.coerce(&raw),
                };
                (field.name.clone(), value)
            })
            .collect()
    }

    fn entity_from_row(&self, row: &PgRow) -> Entity {
        let mut entity = Entity::new(self.definition.clone());
        if let Ok(id) = row.try_get::<i64, _>(ID_FIELD) {
            entity.set(ID_FIELD, id);
        }
        for field in &self.definition.fields {
            let value = cell_value(row, field);
            if !value.is_null() {
                entity.set(&field.name, value);
            }
        }
        entity
    }
}

fn bind<'a>(q: &'a QueryBuf) -> sqlx::query::Query<'a, sqlx::Postgres, PgArguments> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

/// Foreign-key scalar behind a reference value, whether raw or dereferenced.
pub(crate) fn reference_key(value: &Value) -> Value {
    match value {
        Value::Object(obj) => obj.get(ID_FIELD).cloned().unwrap_or(Value::Null),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        _ => value.clone(),
    }
}

/// Decode one column per the field's declared type.
fn cell_value(row: &PgRow, field: &FieldDefinition) -> Value {
    let name = field.name.as_str();
    match &field.field_type {
        FieldType::Int | FieldType::Reference { .. } => row
            .try_get::<Option<i64>, _>(name)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        FieldType::Float => row
            .try_get::<Option<f64>, _>(name)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldType::Bool => row
            .try_get::<Option<bool>, _>(name)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        FieldType::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)
            .ok()
            .flatten()
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        FieldType::DateTime => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_rfc3339()))
            .unwrap_or(Value::Null),
        FieldType::Text | FieldType::Set { .. } | FieldType::File { .. } => row
            .try_get::<Option<String>, _>(name)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Display value of a reference target's name field, whatever its type.
fn display_name(row: &PgRow, name_field: &str) -> String {
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name_field) {
        return s;
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name_field) {
        return n.to_string();
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name_field) {
        return n.to_string();
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name_field) {
        return b.to_string();
    }
    String::new()
}
