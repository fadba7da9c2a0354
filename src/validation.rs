//! Pre-persist validation of an entity against its definition.

use crate::data::{reference_key, Data};
use crate::definition::{FieldDefinition, FieldType};
use crate::entity::{Entity, ID_FIELD};
use crate::error::{CrudError, FieldError};
use crate::sql::Comparator;
use serde_json::Value;

pub struct EntityValidator;

impl EntityValidator {
    /// Run all checks: structural ones first, then the database-backed ones
    /// (reference existence, uniqueness). Collects every failure instead of
    /// stopping at the first.
    pub async fn validate(entity: &Entity, data: &Data) -> Result<(), CrudError> {
        let mut errors = check_structure(entity);

        for field in &data.definition().fields {
            let value = entity.get(&field.name);
            if value.is_null() {
                continue;
            }
            if let FieldType::Reference { table, .. } = &field.field_type {
                let key = reference_key(&value);
                let conditions = vec![(ID_FIELD.to_string(), key, Comparator::Eq)];
                if data.count_by(table, &conditions, None).await? == 0 {
                    errors.push(FieldError {
                        field: field.name.clone(),
                        message: "references a missing row".into(),
                    });
                }
            }
            if field.unique {
                let conditions = vec![(field.name.clone(), value.clone(), Comparator::Eq)];
                let table = data.definition().table.clone();
                if data.count_by(&table, &conditions, entity.id()).await? > 0 {
                    errors.push(FieldError {
                        field: field.name.clone(),
                        message: "must be unique".into(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CrudError::Invalid(errors))
        }
    }
}

/// Checks that need no database: required-ness, value shape per type,
/// pattern match, set membership.
pub fn check_structure(entity: &Entity) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for field in &entity.definition().fields {
        let value = entity.get(&field.name);

        // booleans always coerce to a value, a checkbox cannot be "missing"
        if field.required && !matches!(field.field_type, FieldType::Bool) {
            let missing = match &value {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                _ => false,
            };
            if missing {
                errors.push(FieldError {
                    field: field.name.clone(),
                    message: "is required".into(),
                });
                continue;
            }
        }
        if value.is_null() {
            continue;
        }

        if let Some(message) = check_shape(field, &value) {
            errors.push(FieldError {
                field: field.name.clone(),
                message,
            });
        }
    }
    errors
}

fn check_shape(field: &FieldDefinition, value: &Value) -> Option<String> {
    match &field.field_type {
        FieldType::Int => {
            if !matches!(value, Value::Number(n) if n.is_i64()) {
                return Some("must be an integer".into());
            }
        }
        FieldType::Float => {
            if !value.is_number() {
                return Some("must be a number".into());
            }
        }
        FieldType::Date => {
            let ok = value
                .as_str()
                .map_or(false, |s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok());
            if !ok {
                return Some("must be a date (YYYY-MM-DD)".into());
            }
        }
        FieldType::DateTime => {
            let ok = value.as_str().map_or(false, |s| {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
                    || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
            });
            if !ok {
                return Some("must be a datetime".into());
            }
        }
        FieldType::Set { items } => {
            let ok = value.as_str().map_or(false, |s| items.iter().any(|i| i == s));
            if !ok {
                return Some(format!("must be one of: {}", items.join(", ")));
            }
        }
        FieldType::Text => {
            if let (Some(pattern), Some(s)) = (&field.pattern, value.as_str()) {
                if !pattern.is_match(s) {
                    return Some("does not match required pattern".into());
                }
            }
        }
        FieldType::Bool | FieldType::Reference { .. } | FieldType::File { .. } => {}
    }
    None
}
