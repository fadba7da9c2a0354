//! Structural validation of the raw definition file, before resolution.

use crate::definition::types::{RawDefinitions, RawField};
use crate::entity::ID_FIELD;
use crate::error::DefinitionError;

pub(crate) const KNOWN_TYPES: &[&str] = &[
    "text", "int", "float", "bool", "date", "datetime", "set", "reference", "file",
];

/// Check the parsed file for structural problems. Side-effect free; resolution
/// assumes a map that passed this.
pub fn validate(raw: &RawDefinitions) -> Result<(), DefinitionError> {
    for (entity, def) in raw {
        if def.table.as_deref().map_or(true, str::is_empty) {
            return Err(DefinitionError::MissingTable {
                entity: entity.clone(),
            });
        }
        for (field, raw_field) in &def.fields {
            validate_field(entity, field, raw_field, raw)?;
        }
    }
    Ok(())
}

fn validate_field(
    entity: &str,
    field: &str,
    raw: &RawField,
    definitions: &RawDefinitions,
) -> Result<(), DefinitionError> {
    let err = |e: DefinitionError| Err(e);
    let type_name = match raw.type_.as_deref() {
        Some(t) if !t.is_empty() => t,
        _ => {
            return err(DefinitionError::MissingType {
                entity: entity.into(),
                field: field.into(),
            })
        }
    };
    if !KNOWN_TYPES.contains(&type_name) {
        return err(DefinitionError::UnknownType {
            entity: entity.into(),
            field: field.into(),
            type_name: type_name.into(),
        });
    }

    match type_name {
        "reference" => {
            let reference = raw.reference.as_ref().ok_or_else(|| DefinitionError::MissingReference {
                entity: entity.into(),
                field: field.into(),
            })?;
            let target = match definitions.get(reference.entity.as_str()) {
                Some(target) => target,
                None => {
                    return err(DefinitionError::UnknownReferenceTarget {
                        entity: entity.into(),
                        field: field.into(),
                        target: reference.entity.clone(),
                    })
                }
            };
            let name_field = match reference.name_field.as_deref() {
                Some(n) if !n.is_empty() => n,
                _ => {
                    return err(DefinitionError::MissingReferenceNameField {
                        entity: entity.into(),
                        field: field.into(),
                    })
                }
            };
            // the display field must be a real column on the target
            if name_field != ID_FIELD && !target.fields.contains_key(name_field) {
                return err(DefinitionError::UnknownReferenceNameField {
                    entity: entity.into(),
                    field: field.into(),
                    target: reference.entity.clone(),
                    name_field: name_field.into(),
                });
            }
        }
        "file" => {
            if raw.path.as_deref().map_or(true, str::is_empty) {
                return err(DefinitionError::MissingFilePath {
                    entity: entity.into(),
                    field: field.into(),
                });
            }
        }
        "set" => {
            if raw.items.as_ref().map_or(true, Vec::is_empty) {
                return err(DefinitionError::MissingSetItems {
                    entity: entity.into(),
                    field: field.into(),
                });
            }
        }
        _ => {}
    }

    if let Some(pattern) = &raw.pattern {
        if let Err(e) = regex::Regex::new(pattern) {
            return err(DefinitionError::InvalidPattern {
                entity: entity.into(),
                field: field.into(),
                message: e.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DefinitionError;

    fn parse(yaml: &str) -> RawDefinitions {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn accepts_valid_definitions() {
        let raw = parse(
            r#"
library:
  table: library
  fields:
    name:
      type: text
      required: true
    isOpenOnSundays:
      type: bool
book:
  table: book
  fields:
    title:
      type: text
    pages:
      type: int
    library:
      type: reference
      reference:
        entity: library
        nameField: name
    cover:
      type: file
      path: uploads
"#,
        );
        validate(&raw).unwrap();
    }

    #[test]
    fn rejects_missing_table() {
        let raw = parse("library:\n  fields:\n    name:\n      type: text\n");
        assert!(matches!(
            validate(&raw),
            Err(DefinitionError::MissingTable { .. })
        ));
    }

    #[test]
    fn rejects_missing_type() {
        let raw = parse("library:\n  table: library\n  fields:\n    name:\n      required: true\n");
        assert!(matches!(
            validate(&raw),
            Err(DefinitionError::MissingType { .. })
        ));
    }

    #[test]
    fn rejects_unknown_type() {
        let raw = parse("library:\n  table: library\n  fields:\n    name:\n      type: blob\n");
        assert!(matches!(
            validate(&raw),
            Err(DefinitionError::UnknownType { .. })
        ));
    }

    #[test]
    fn rejects_reference_to_undefined_entity() {
        let raw = parse(
            r#"
book:
  table: book
  fields:
    library:
      type: reference
      reference:
        entity: library
        nameField: name
"#,
        );
        assert!(matches!(
            validate(&raw),
            Err(DefinitionError::UnknownReferenceTarget { .. })
        ));
    }

    #[test]
    fn rejects_reference_without_name_field() {
        let raw = parse(
            r#"
library:
  table: library
  fields:
    name:
      type: text
book:
  table: book
  fields:
    library:
      type: reference
      reference:
        entity: library
"#,
        );
        assert!(matches!(
            validate(&raw),
            Err(DefinitionError::MissingReferenceNameField { .. })
        ));
    }

    #[test]
    fn rejects_name_field_not_on_target() {
        let raw = parse(
            r#"
library:
  table: library
  fields:
    name:
      type: text
book:
  table: book
  fields:
    library:
      type: reference
      reference:
        entity: library
        nameField: doesNotExist
"#,
        );
        assert!(matches!(
            validate(&raw),
            Err(DefinitionError::UnknownReferenceNameField { .. })
        ));
    }

    #[test]
    fn accepts_id_as_name_field() {
        let raw = parse(
            r#"
library:
  table: library
  fields:
    name:
      type: text
book:
  table: book
  fields:
    library:
      type: reference
      reference:
        entity: library
        nameField: id
"#,
        );
        validate(&raw).unwrap();
    }

    #[test]
    fn rejects_file_without_path() {
        let raw = parse("book:\n  table: book\n  fields:\n    cover:\n      type: file\n");
        assert!(matches!(
            validate(&raw),
            Err(DefinitionError::MissingFilePath { .. })
        ));
    }

    #[test]
    fn rejects_set_without_items() {
        let raw = parse("book:\n  table: book\n  fields:\n    genre:\n      type: set\n");
        assert!(matches!(
            validate(&raw),
            Err(DefinitionError::MissingSetItems { .. })
        ));
    }

    #[test]
    fn rejects_invalid_pattern() {
        let raw =
            parse("book:\n  table: book\n  fields:\n    isbn:\n      type: text\n      pattern: '['\n");
        assert!(matches!(
            validate(&raw),
            Err(DefinitionError::InvalidPattern { .. })
        ));
    }
}
