pub mod loader;
pub mod resolved;
pub mod types;
pub mod validator;

pub use loader::{load_file, load_str, resolve};
pub use resolved::{truthy, EntityDefinition, FieldDefinition, FieldType};
pub use types::{RawDefinitions, RawEntity, RawField, RawReference};
pub use validator::validate;
