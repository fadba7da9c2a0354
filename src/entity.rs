//! A single record instance bound to a shared entity definition.

use crate::definition::EntityDefinition;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const ID_FIELD: &str = "id";

/// One record of a defined entity type. Values live as JSON values; reads go
/// through the field type's coercion, so boolean fields always come back as
/// strict booleans and reference fields as either the raw foreign key or the
/// dereferenced `{id, name}` pair.
#[derive(Clone, Debug)]
pub struct Entity {
    definition: Arc<EntityDefinition>,
    values: HashMap<String, Value>,
}

impl Entity {
    /// Empty instance: all fields unset, id absent.
    pub fn new(definition: Arc<EntityDefinition>) -> Self {
        Entity {
            definition,
            values: HashMap::new(),
        }
    }

    pub fn definition(&self) -> &Arc<EntityDefinition> {
        &self.definition
    }

    /// Primary key, once persisted.
    pub fn id(&self) -> Option<&Value> {
        self.values.get(ID_FIELD).filter(|v| !v.is_null())
    }

    /// Coerced read. Unset boolean fields read as `false`; other unset
    /// fields read as null.
    pub fn get(&self, field: &str) -> Value {
        let raw = self.values.get(field).cloned().unwrap_or(Value::Null);
        match self.definition.field(field) {
            Some(f) => f.field_type.coerce(&raw),
            None => raw,
        }
    }

    /// Stored value without coercion, if set.
    pub fn raw(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.values.insert(field.to_string(), value.into());
    }

    pub fn clear(&mut self, field: &str) {
        self.values.remove(field);
    }

    pub fn is_set(&self, field: &str) -> bool {
        self.values.get(field).map_or(false, |v| !v.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::load_str;
    use serde_json::json;

    fn library_definition() -> Arc<EntityDefinition> {
        let defs = load_str(
            r#"
library:
  table: library
  fields:
    name:
      type: text
    isOpenOnSundays:
      type: bool
    pages:
      type: int
"#,
        )
        .unwrap();
        defs["library"].clone()
    }

    #[test]
    fn starts_empty() {
        let entity = Entity::new(library_definition());
        assert!(entity.id().is_none());
        assert_eq!(entity.get("name"), Value::Null);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut entity = Entity::new(library_definition());
        entity.set("name", "lib");
        assert_eq!(entity.get("name"), json!("lib"));
    }

    #[test]
    fn booleans_normalize_on_read() {
        let mut entity = Entity::new(library_definition());
        assert_eq!(entity.get("isOpenOnSundays"), json!(false));

        entity.set("isOpenOnSundays", "1");
        assert_eq!(entity.get("isOpenOnSundays"), json!(true));

        entity.set("isOpenOnSundays", true);
        assert_eq!(entity.get("isOpenOnSundays"), json!(true));

        entity.set("isOpenOnSundays", Value::Null);
        assert_eq!(entity.get("isOpenOnSundays"), json!(false));
    }

    #[test]
    fn int_fields_parse_string_input() {
        let mut entity = Entity::new(library_definition());
        entity.set("pages", "111");
        assert_eq!(entity.get("pages"), json!(111));
    }
}
