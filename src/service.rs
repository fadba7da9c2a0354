//! Startup-constructed registry: entity name -> definition + data access.
//! Built once at bootstrap and passed by reference, no ambient global state.

use crate::data::{Data, Dependent};
use crate::definition::{load_file, load_str, EntityDefinition, FieldType};
use crate::error::CrudError;
use crate::files::FileProcessor;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub struct Service {
    entries: BTreeMap<String, ServiceEntry>,
}

struct ServiceEntry {
    definition: Arc<EntityDefinition>,
    data: Data,
}

impl Service {
    /// Parse, validate and resolve a definition file from a YAML string and
    /// wire one `Data` per entity.
    pub fn from_yaml_str(
        yaml: &str,
        pool: PgPool,
        files: Arc<dyn FileProcessor>,
    ) -> Result<Self, CrudError> {
        let definitions = load_str(yaml)?;
        Ok(Self::from_definitions(definitions, pool, files))
    }

    /// Same, reading the file from disk.
    pub fn from_file(
        path: impl AsRef<Path>,
        pool: PgPool,
        files: Arc<dyn FileProcessor>,
    ) -> Result<Self, CrudError> {
        let definitions = load_file(path)?;
        Ok(Self::from_definitions(definitions, pool, files))
    }

    pub fn from_definitions(
        definitions: BTreeMap<String, Arc<EntityDefinition>>,
        pool: PgPool,
        files: Arc<dyn FileProcessor>,
    ) -> Self {
        let mut entries = BTreeMap::new();
        for (name, definition) in &definitions {
            let dependents = dependents_of(&definition.table, &definitions);
            let data = Data::new(
                definition.clone(),
                pool.clone(),
                files.clone(),
                dependents,
            );
            entries.insert(
                name.clone(),
                ServiceEntry {
                    definition: definition.clone(),
                    data,
                },
            );
        }
        Service { entries }
    }

    pub fn data(&self, entity: &str) -> Option<&Data> {
        self.entries.get(entity).map(|e| &e.data)
    }

    pub fn definition(&self, entity: &str) -> Option<&Arc<EntityDefinition>> {
        self.entries.get(entity).map(|e| &e.definition)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<EntityDefinition>> {
        self.entries.values().map(|e| &e.definition)
    }
}

/// Every (entity, table, field) whose reference fields point at `table`.
fn dependents_of(
    table: &str,
    definitions: &BTreeMap<String, Arc<EntityDefinition>>,
) -> Vec<Dependent> {
    let mut out = Vec::new();
    for (name, definition) in definitions {
        for field in definition.reference_fields() {
            if let FieldType::Reference { table: target, .. } = &field.field_type {
                if target == table {
                    out.push(Dependent {
                        entity: name.clone(),
                        table: definition.table.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }
    }
    out
}
