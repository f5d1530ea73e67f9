//! Event layer configuration.
//!
//! ```toml
//! translator = "schema"
//! validator = "json_schema"
//! throw_validation_exceptions_on_dispatch = true
//! attribute_injectors = ["date", "uuid"]
//!
//! [validators.json_schema]
//! schema_template = "array://events/{topic}/{name}/{version}.json"
//!
//! [validators.json_schema.loaders.array.schemas]
//! "events/user/created/1.0.json" = '{"type": "object", "required": ["id"]}'
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{EventError, EventResult};
use crate::manager::EventManagerBuilder;
use crate::schema::{ArrayLoader, Dereferencer, EventValidator, JsonSchemaEventValidator, SchemaUriTemplate};
use crate::translator::{
    MessageTranslator, SchemaEventMessageTranslator, SimpleEventMessageTranslator, TopicEventMessageTranslator,
};

/// Which message translator the manager uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslatorKind {
    #[default]
    Simple,
    Topic,
    Schema,
}

/// Which validator the manager uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    JsonSchema,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Message translator.
    pub translator: TranslatorKind,
    /// Validator, none disables validation.
    pub validator: Option<ValidatorKind>,
    /// Return validation failures from dispatch.
    pub throw_validation_exceptions_on_dispatch: bool,
    /// Stock attribute injectors by name, in run order.
    pub attribute_injectors: Vec<String>,
    /// Per-validator settings.
    pub validators: ValidatorsConfig,
}

/// Per-validator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorsConfig {
    pub json_schema: JsonSchemaConfig,
}

/// JSON schema validator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonSchemaConfig {
    /// Naming convention, e.g. `array://events/{topic}/{name}/{version}.json`.
    pub schema_template: Option<String>,
    /// In-memory loaders by name.
    pub loaders: BTreeMap<String, LoaderConfig>,
}

/// An in-memory schema loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// URI prefix, defaults to the loader name.
    pub prefix: Option<String>,
    /// Schema text by key.
    pub schemas: BTreeMap<String, String>,
}

impl EventsConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> EventResult<Self> {
        toml::from_str(content).map_err(|e| EventError::Config(e.to_string()))
    }

    /// The naming convention for schema identifiers.
    pub fn schema_template(&self) -> EventResult<SchemaUriTemplate> {
        match &self.validators.json_schema.schema_template {
            Some(template) => SchemaUriTemplate::parse(template)
                .map_err(|e| EventError::Config(format!("schema_template: {}", e))),
            None => Ok(SchemaUriTemplate::default()),
        }
    }

    /// Builds the configured translator.
    pub fn build_translator(&self) -> EventResult<Arc<dyn MessageTranslator>> {
        Ok(match self.translator {
            TranslatorKind::Simple => Arc::new(SimpleEventMessageTranslator::new()),
            TranslatorKind::Topic => Arc::new(TopicEventMessageTranslator::new()),
            TranslatorKind::Schema => Arc::new(SchemaEventMessageTranslator::with_naming(self.schema_template()?)),
        })
    }

    /// Builds a dereferencer holding every configured loader.
    pub fn build_dereferencer(&self) -> EventResult<Dereferencer> {
        let mut dereferencer = Dereferencer::new();
        for (name, loader) in &self.validators.json_schema.loaders {
            let prefix = loader.prefix.clone().unwrap_or_else(|| name.clone());
            let array = ArrayLoader::from_json_strings(loader.schemas.iter())?;
            dereferencer = dereferencer.with_loader(array, prefix);
        }
        Ok(dereferencer)
    }

    /// Builds the configured validator, if any.
    pub fn build_validator(&self) -> EventResult<Option<Arc<dyn EventValidator>>> {
        match self.validator {
            Some(ValidatorKind::JsonSchema) => {
                let validator = JsonSchemaEventValidator::new(Arc::new(self.build_dereferencer()?))
                    .with_naming(self.schema_template()?);
                Ok(Some(Arc::new(validator)))
            }
            None => Ok(None),
        }
    }
}

/// Loads configuration from a TOML file.
pub fn load_config(path: impl AsRef<Path>) -> EventResult<EventsConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| EventError::Config(format!("{}: {}", path.display(), e)))?;
    EventsConfig::from_toml_str(&content)
}

impl EventManagerBuilder {
    /// Applies translator, validator and dispatch toggle from configuration.
    ///
    /// `attribute_injectors` name stock injectors, which live in the SDK and
    /// are not applied here.
    pub fn with_config(self, config: &EventsConfig) -> EventResult<Self> {
        let builder = self
            .shared_translator(config.build_translator()?)
            .throw_validation_exceptions_on_dispatch(config.throw_validation_exceptions_on_dispatch);

        Ok(match config.build_validator()? {
            Some(validator) => builder.shared_validator(validator),
            None => builder.without_validator(),
        })
    }
}
