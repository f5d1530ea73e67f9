//! Schema loaders resolving a key under one URI prefix to a schema document.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{EventError, EventResult};

/// Trait for schema storage backends.
///
/// A loader is registered on a [`Dereferencer`](super::Dereferencer) under a
/// prefix; it receives the part of the identifier after `prefix://`.
#[async_trait]
pub trait SchemaLoader: Send + Sync {
    /// Loads the schema stored under `path`.
    async fn load(&self, path: &str) -> EventResult<Value>;
}

/// In-memory loader backed by a key → schema mapping.
///
/// Keys look like `events/user/created/1.0.json`. The mapping may be changed
/// at runtime while other tasks are loading from it.
pub struct ArrayLoader {
    schemas: RwLock<HashMap<String, Value>>,
}

impl ArrayLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a loader from already parsed schemas.
    pub fn from_schemas(schemas: HashMap<String, Value>) -> Self {
        Self {
            schemas: RwLock::new(schemas),
        }
    }

    /// Creates a loader from raw schema text, parsing each entry.
    pub fn from_json_strings<I, K, S>(schemas: I) -> EventResult<Self>
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: AsRef<str>,
    {
        let mut parsed = HashMap::new();
        for (key, raw) in schemas {
            let key = key.into();
            let value = Self::parse(&key, raw.as_ref())?;
            parsed.insert(key, value);
        }
        Ok(Self::from_schemas(parsed))
    }

    /// Adds a schema given as a JSON value at construction time.
    pub fn with_schema(mut self, key: impl Into<String>, schema: Value) -> Self {
        self.schemas.get_mut().insert(key.into(), schema);
        self
    }

    fn parse(key: &str, raw: &str) -> EventResult<Value> {
        serde_json::from_str(raw).map_err(|e| EventError::SchemaParse {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Adds or replaces a schema.
    pub async fn insert(&self, key: impl Into<String>, schema: Value) -> Option<Value> {
        self.schemas.write().await.insert(key.into(), schema)
    }

    /// Parses and adds or replaces a schema given as raw text.
    pub async fn insert_json(&self, key: impl Into<String>, raw: &str) -> EventResult<()> {
        let key = key.into();
        let value = Self::parse(&key, raw)?;
        self.schemas.write().await.insert(key, value);
        Ok(())
    }

    /// Removes a schema.
    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.schemas.write().await.remove(key)
    }

    /// Lists all keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let schemas = self.schemas.read().await;
        let mut keys: Vec<String> = schemas.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of schemas held.
    pub async fn len(&self) -> usize {
        self.schemas.read().await.len()
    }

    /// Checks if the loader holds no schemas.
    pub async fn is_empty(&self) -> bool {
        self.schemas.read().await.is_empty()
    }
}

impl Default for ArrayLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaLoader for ArrayLoader {
    async fn load(&self, path: &str) -> EventResult<Value> {
        let schemas = self.schemas.read().await;
        schemas
            .get(path)
            .cloned()
            .ok_or_else(|| EventError::SchemaNotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_existing_schema() {
        let loader = ArrayLoader::new().with_schema("events/user/created/1.0.json", json!({"type": "object"}));

        let schema = loader.load("events/user/created/1.0.json").await.unwrap();
        assert_eq!(schema, json!({"type": "object"}));
    }

    #[tokio::test]
    async fn test_missing_schema() {
        let loader = ArrayLoader::new();

        let result = loader.load("events/nope.json").await;
        assert!(matches!(result, Err(EventError::SchemaNotFound(key)) if key == "events/nope.json"));
    }

    #[tokio::test]
    async fn test_from_json_strings() {
        let loader = ArrayLoader::from_json_strings([
            ("a.json", r#"{"type": "string"}"#),
            ("b.json", r#"{"type": "integer"}"#),
        ])
        .unwrap();

        assert_eq!(loader.len().await, 2);
        assert_eq!(loader.keys().await, vec!["a.json", "b.json"]);
        assert_eq!(loader.load("b.json").await.unwrap()["type"], "integer");
    }

    #[tokio::test]
    async fn test_invalid_json_is_rejected() {
        let result = ArrayLoader::from_json_strings([("broken.json", "{not json")]);
        assert!(matches!(result, Err(EventError::SchemaParse { key, .. }) if key == "broken.json"));

        let loader = ArrayLoader::new();
        assert!(loader.insert_json("broken.json", "[").await.is_err());
        assert!(loader.is_empty().await);
    }

    #[tokio::test]
    async fn test_runtime_mutation() {
        let loader = ArrayLoader::new();
        assert!(loader.insert("x.json", json!({"type": "null"})).await.is_none());
        assert!(loader.insert("x.json", json!({"type": "boolean"})).await.is_some());
        assert_eq!(loader.load("x.json").await.unwrap()["type"], "boolean");

        loader.remove("x.json").await;
        assert!(loader.load("x.json").await.is_err());
    }
}
