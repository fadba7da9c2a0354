//! Raw definition-file types matching the YAML schema (one entity per top-level key).

use indexmap::IndexMap;
use serde::Deserialize;

/// Whole definition file, entity name -> raw entity, in file order.
pub type RawDefinitions = IndexMap<String, RawEntity>;

#[derive(Clone, Debug, Deserialize)]
pub struct RawEntity {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "pageSize")]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub fields: IndexMap<String, RawField>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawField {
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    /// Regex a text value must match, checked before persisting.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Allowed values for `set` fields.
    #[serde(default)]
    pub items: Option<Vec<String>>,
    /// Target of `reference` fields.
    #[serde(default)]
    pub reference: Option<RawReference>,
    /// Storage path for `file` fields, relative to the file processor's base.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawReference {
    /// Entity name defined elsewhere in the same file.
    pub entity: String,
    #[serde(default, rename = "nameField")]
    pub name_field: Option<String>,
}
