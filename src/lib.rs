//! crudkit: declarative CRUD scaffolding driven by YAML entity definitions.
//!
//! A definition file describing entities, fields, relationships and file
//! attachments is validated and resolved at startup; the [`Service`] registry
//! then hands out one [`Data`] per entity for relationship-aware CRUD over
//! PostgreSQL, with delete protection, reference dereferencing, boolean
//! normalization and [`FileProcessor`]-delegated attachments.

pub mod data;
pub mod definition;
pub mod entity;
pub mod error;
pub mod files;
pub mod migration;
pub mod service;
pub mod sql;
pub mod validation;

pub use data::{Data, Dependent, ReferenceEntry, Uploads};
pub use definition::{
    load_file, load_str, EntityDefinition, FieldDefinition, FieldType, RawDefinitions,
};
pub use entity::Entity;
pub use error::{CrudError, DefinitionError, FieldError};
pub use files::{FileDownload, FileProcessor, FileUpload, LocalFileProcessor, NoopFileProcessor};
pub use migration::apply_schema;
pub use service::Service;
pub use sql::Comparator;
pub use validation::EntityValidator;
