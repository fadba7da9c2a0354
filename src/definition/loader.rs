//! Parse the YAML definition file and resolve it into `EntityDefinition`s.

use crate::definition::resolved::{EntityDefinition, FieldDefinition, FieldType};
use crate::definition::types::{RawDefinitions, RawField};
use crate::definition::validator::validate;
use crate::error::DefinitionError;
use regex::Regex;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Parse and resolve a definition file from a YAML string.
pub fn load_str(yaml: &str) -> Result<BTreeMap<String, Arc<EntityDefinition>>, DefinitionError> {
    let raw: RawDefinitions =
        serde_yaml::from_str(yaml).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    resolve(&raw)
}

/// Parse and resolve a definition file from disk. Meant for startup only.
pub fn load_file(
    path: impl AsRef<Path>,
) -> Result<BTreeMap<String, Arc<EntityDefinition>>, DefinitionError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    load_str(&content)
}

/// Validate the raw map, then flatten it: reference fields get their target
/// table and display field baked in, patterns compile once.
pub fn resolve(
    raw: &RawDefinitions,
) -> Result<BTreeMap<String, Arc<EntityDefinition>>, DefinitionError> {
    validate(raw)?;

    let table_by_entity: HashMap<&str, &str> = raw
        .iter()
        .filter_map(|(name, e)| e.table.as_deref().map(|t| (name.as_str(), t)))
        .collect();

    let mut out = BTreeMap::new();
    for (name, entity) in raw {
        let mut fields = Vec::with_capacity(entity.fields.len());
        for (field_name, raw_field) in &entity.fields {
            fields.push(resolve_field(name, field_name, raw_field, &table_by_entity)?);
        }
        let definition = EntityDefinition {
            name: name.clone(),
            table: entity.table.clone().unwrap_or_default(),
            label: entity.label.clone().unwrap_or_else(|| name.clone()),
            page_size: entity
                .page_size
                .unwrap_or(EntityDefinition::DEFAULT_PAGE_SIZE),
            fields,
        };
        out.insert(name.clone(), Arc::new(definition));
    }
    Ok(out)
}

fn resolve_field(
    entity: &str,
    field: &str,
    raw: &RawField,
    table_by_entity: &HashMap<&str, &str>,
) -> Result<FieldDefinition, DefinitionError> {
    let type_name = raw.type_.as_deref().unwrap_or_default();
    let field_type = match type_name {
        "text" => FieldType::Text,
        "int" => FieldType::Int,
        "float" => FieldType::Float,
        "bool" => FieldType::Bool,
        "date" => FieldType::Date,
        "datetime" => FieldType::DateTime,
        "set" => FieldType::Set {
            items: raw.items.clone().unwrap_or_default(),
        },
        "reference" => {
            let reference =
                raw.reference
                    .as_ref()
                    .ok_or_else(|| DefinitionError::MissingReference {
                        entity: entity.into(),
                        field: field.into(),
                    })?;
            let table = table_by_entity
                .get(reference.entity.as_str())
                .copied()
                .ok_or_else(|| DefinitionError::UnknownReferenceTarget {
                    entity: entity.into(),
                    field: field.into(),
                    target: reference.entity.clone(),
                })?;
            FieldType::Reference {
                entity: reference.entity.clone(),
                table: table.to_string(),
                name_field: reference.name_field.clone().unwrap_or_default(),
            }
        }
        "file" => FieldType::File {
            path: raw.path.clone().unwrap_or_default(),
        },
        other => {
            return Err(DefinitionError::UnknownType {
                entity: entity.into(),
                field: field.into(),
                type_name: other.into(),
            })
        }
    };

    let pattern = match &raw.pattern {
        Some(p) => Some(
            Regex::new(p).map_err(|e| DefinitionError::InvalidPattern {
                entity: entity.into(),
                field: field.into(),
                message: e.to_string(),
            })?,
        ),
        None => None,
    };

    Ok(FieldDefinition {
        name: field.to_string(),
        label: raw.label.clone().unwrap_or_else(|| field.to_string()),
        field_type,
        required: raw.required,
        unique: raw.unique,
        pattern,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
library:
  table: library
  label: Library
  pageSize: 10
  fields:
    name:
      type: text
      required: true
      unique: true
    isOpenOnSundays:
      type: bool
book:
  table: book
  fields:
    title:
      type: text
      required: true
    author:
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
    cover:
      type: file
      path: uploads
"#;

    #[test]
    fn resolves_sample_file() {
        let defs = load_str(SAMPLE).unwrap();
        assert_eq!(defs.len(), 2);

        let library = &defs["library"];
        assert_eq!(library.table, "library");
        assert_eq!(library.label, "Library");
        assert_eq!(library.page_size, 10);
        assert!(library.field("name").unwrap().required);
        assert!(library.field("name").unwrap().unique);

        let book = &defs["book"];
        assert_eq!(book.page_size, EntityDefinition::DEFAULT_PAGE_SIZE);
        assert_eq!(
            book.reference_target("library"),
            Some(("library", "name"))
        );
        assert!(book.field("cover").unwrap().field_type.is_file());
    }

    #[test]
    fn preserves_field_order() {
        let defs = load_str(SAMPLE).unwrap();
        let names: Vec<&str> = defs["book"].field_names().collect();
        assert_eq!(
            names,
            vec!["title", "author", "pages", "release", "library", "cover"]
        );
    }

    #[test]
    fn fails_on_invalid_yaml() {
        assert!(matches!(
            load_str(": not yaml : ["),
            Err(DefinitionError::Parse(_))
        ));
    }

    #[test]
    fn fails_validation_before_resolving() {
        assert!(load_str("library:\n  fields: {}\n").is_err());
    }

    #[test]
    fn rejects_display_field_missing_on_target() {
        let yaml = SAMPLE.replace("nameField: name", "nameField: doesNotExist");
        assert!(matches!(
            load_str(&yaml),
            Err(DefinitionError::UnknownReferenceNameField { .. })
        ));
    }
}
