//! Event Schema Resolution and Validation
//!
//! Provides schema handling for events:
//! - Prefixed schema loaders (`array://`, `custom://`, ...)
//! - `$ref` dereferencing across loaders with cycle detection
//! - JSON Schema (draft-04 compatible) validation of event attributes

mod dereferencer;
mod loader;
mod uri;
mod validator;

pub use dereferencer::Dereferencer;
pub use loader::{ArrayLoader, SchemaLoader};
pub use uri::{SchemaUri, SchemaUriTemplate};
pub use validator::{
    EventValidator, JsonSchemaEventValidator, ValidationError, ValidationResult, ROOT_PATH, validate_value,
};
