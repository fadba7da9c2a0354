//! Typed errors for definition loading and data access.

use thiserror::Error;

/// Structural problem in the entity-definition file. Fatal at startup.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("entity '{entity}' has no table name")]
    MissingTable { entity: String },
    #[error("field '{field}' of entity '{entity}' has no type")]
    MissingType { entity: String, field: String },
    #[error("field '{field}' of entity '{entity}' has unknown type '{type_name}'")]
    UnknownType {
        entity: String,
        field: String,
        type_name: String,
    },
    #[error("reference field '{field}' of entity '{entity}' has no reference block")]
    MissingReference { entity: String, field: String },
    #[error("reference field '{field}' of entity '{entity}' points at undefined entity '{target}'")]
    UnknownReferenceTarget {
        entity: String,
        field: String,
        target: String,
    },
    #[error("reference field '{field}' of entity '{entity}' has no nameField")]
    MissingReferenceNameField { entity: String, field: String },
    #[error("reference field '{field}' of entity '{entity}' names display field '{name_field}' not defined on entity '{target}'")]
    UnknownReferenceNameField {
        entity: String,
        field: String,
        target: String,
        name_field: String,
    },
    #[error("file field '{field}' of entity '{entity}' has no storage path")]
    MissingFilePath { entity: String, field: String },
    #[error("set field '{field}' of entity '{entity}' has no items")]
    MissingSetItems { entity: String, field: String },
    #[error("field '{field}' of entity '{entity}' has invalid pattern: {message}")]
    InvalidPattern {
        entity: String,
        field: String,
        message: String,
    },
    #[error("definition parse: {0}")]
    Parse(String),
}

/// One failed check on one field of an entity about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Error, Debug)]
pub enum CrudError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("invalid entity: {}", format_field_errors(.0))]
    Invalid(Vec<FieldError>),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("entity has no id")]
    MissingId,
    #[error("file: {0}")]
    File(#[from] std::io::Error),
    #[error("no file stored for field '{0}'")]
    NoFile(String),
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
