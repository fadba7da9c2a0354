//! Resolved entity model: definitions validated and flattened for runtime use.

use regex::Regex;
use serde_json::Value;

/// Closed set of field types. Coercion and SQL behavior hang off the variant,
/// resolved once at definition-load time.
#[derive(Clone, Debug)]
pub enum FieldType {
    Text,
    Int,
    Float,
    Bool,
    Date,
    DateTime,
    Set {
        items: Vec<String>,
    },
    Reference {
        entity: String,
        table: String,
        name_field: String,
    },
    File {
        path: String,
    },
}

impl FieldType {
    /// Postgres column type used when generating DDL.
    pub fn column_type(&self) -> &'static str {
        match self {
            FieldType::Text | FieldType::Set { .. } | FieldType::File { .. } => "TEXT",
            FieldType::Int | FieldType::Reference { .. } => "BIGINT",
            FieldType::Float => "DOUBLE PRECISION",
            FieldType::Bool => "BOOLEAN",
            FieldType::Date => "DATE",
            FieldType::DateTime => "TIMESTAMPTZ",
        }
    }

    /// SQL cast appended to bind placeholders so string params coerce server-side.
    pub fn bind_cast(&self) -> Option<&'static str> {
        match self {
            FieldType::Int | FieldType::Reference { .. } => Some("bigint"),
            FieldType::Float => Some("double precision"),
            FieldType::Bool => Some("boolean"),
            FieldType::Date => Some("date"),
            FieldType::DateTime => Some("timestamptz"),
            FieldType::Text | FieldType::Set { .. } | FieldType::File { .. } => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Reference { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FieldType::File { .. })
    }

    /// Normalize a stored value on read. Booleans collapse to strict
    /// true/false; numeric strings parse for int/float fields; everything
    /// else passes through (reference values may already be `{id, name}`).
    pub fn coerce(&self, value: &Value) -> Value {
        match self {
            FieldType::Bool => Value::Bool(truthy(value)),
            FieldType::Int => match value {
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| value.clone()),
                _ => value.clone(),
            },
            FieldType::Float => match value {
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| value.clone()),
                _ => value.clone(),
            },
            _ => value.clone(),
        }
    }
}

/// Loose truthiness over JSON values: `true`, `'1'`, `'true'` and non-zero
/// numbers are true; null, `''`, `'0'`, `'false'` and `false` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => {
            !(s.is_empty()
                || s == "0"
                || s.eq_ignore_ascii_case("false")
                || s.eq_ignore_ascii_case("null"))
        }
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Clone, Debug)]
pub struct FieldDefinition {
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    pub unique: bool,
    pub pattern: Option<Regex>,
}

/// Schema of one entity type: table, ordered fields, listing page size.
/// Shared between all `Entity` instances of the type via `Arc`.
#[derive(Clone, Debug)]
pub struct EntityDefinition {
    pub name: String,
    pub table: String,
    pub label: String,
    pub page_size: u32,
    pub fields: Vec<FieldDefinition>,
}

impl EntityDefinition {
    pub const DEFAULT_PAGE_SIZE: u32 = 25;

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.field_type.is_reference())
    }

    pub fn file_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.field_type.is_file())
    }

    /// Table and display field a reference field points at.
    pub fn reference_target(&self, field: &str) -> Option<(&str, &str)> {
        match self.field(field).map(|f| &f.field_type) {
            Some(FieldType::Reference {
                table, name_field, ..
            }) => Some((table.as_str(), name_field.as_str())),
            _ => None,
        }
    }
}
