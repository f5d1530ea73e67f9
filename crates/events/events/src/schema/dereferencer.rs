//! Resolution of `$ref` pointers across prefixed schema loaders.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::loader::SchemaLoader;
use super::uri::SchemaUri;
use crate::error::{EventError, EventResult};

/// Keywords whose values are instance data, never schemas.
const DATA_KEYWORDS: &[&str] = &["const", "enum", "default", "examples"];

/// Keywords whose values map names to schemas.
const SCHEMA_MAP_KEYWORDS: &[&str] = &["properties", "patternProperties", "definitions", "$defs", "dependencies"];

type ResolveFuture<'a> = Pin<Box<dyn Future<Output = EventResult<Value>> + Send + 'a>>;

/// State of one top-level `dereference` call.
///
/// Never shared between calls, so concurrent resolutions cannot observe
/// each other's in-flight identifiers.
#[derive(Default)]
struct Resolution {
    /// Identifiers currently being expanded, outermost first.
    in_flight: Vec<String>,
    /// Documents already loaded during this call, by document identifier.
    documents: HashMap<String, Value>,
}

/// Registry of schema loaders keyed by URI prefix, and `$ref` resolver.
///
/// Registering a loader under a prefix that is already taken replaces the
/// previous loader. Lookups are by exact prefix, so registration order has
/// no effect on resolution.
pub struct Dereferencer {
    loaders: RwLock<HashMap<String, Arc<dyn SchemaLoader>>>,
}

impl Dereferencer {
    /// Creates a dereferencer with no loaders.
    pub fn new() -> Self {
        Self {
            loaders: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a loader at construction time.
    pub fn with_loader(mut self, loader: impl SchemaLoader + 'static, prefix: impl Into<String>) -> Self {
        self.loaders.get_mut().insert(prefix.into(), Arc::new(loader));
        self
    }

    /// Registers a loader under `prefix`, returning the loader it replaced.
    pub async fn register_loader(
        &self,
        loader: impl SchemaLoader + 'static,
        prefix: impl Into<String>,
    ) -> Option<Arc<dyn SchemaLoader>> {
        self.register_shared_loader(Arc::new(loader), prefix).await
    }

    /// Registers a shared loader under `prefix`, returning the loader it replaced.
    pub async fn register_shared_loader(
        &self,
        loader: Arc<dyn SchemaLoader>,
        prefix: impl Into<String>,
    ) -> Option<Arc<dyn SchemaLoader>> {
        let prefix = prefix.into();
        let mut loaders = self.loaders.write().await;
        let replaced = loaders.insert(prefix.clone(), loader);

        if replaced.is_some() {
            tracing::warn!(prefix = %prefix, "Replaced existing schema loader");
        } else {
            tracing::debug!(prefix = %prefix, "Registered schema loader");
        }

        replaced
    }

    /// Returns the loader registered for `prefix`.
    pub async fn loader(&self, prefix: &str) -> Option<Arc<dyn SchemaLoader>> {
        self.loaders.read().await.get(prefix).cloned()
    }

    /// Lists registered prefixes, sorted.
    pub async fn prefixes(&self) -> Vec<String> {
        let loaders = self.loaders.read().await;
        let mut prefixes: Vec<String> = loaders.keys().cloned().collect();
        prefixes.sort();
        prefixes
    }

    /// Loads the schema identified by `uri` and inlines every `$ref` in it.
    pub async fn dereference(&self, uri: &str) -> EventResult<Value> {
        let uri = SchemaUri::parse(uri)?;
        let mut resolution = Resolution::default();
        self.resolve_uri(uri, &mut resolution).await
    }

    fn resolve_uri<'a>(&'a self, uri: SchemaUri, state: &'a mut Resolution) -> ResolveFuture<'a> {
        Box::pin(async move {
            let key = uri.to_string();
            if state.in_flight.contains(&key) {
                let mut chain = state.in_flight.clone();
                chain.push(key);
                return Err(EventError::CyclicReference(chain.join(" -> ")));
            }

            let document = self.load_document(&uri, state).await?;
            let target = match uri.fragment() {
                Some(pointer) => document
                    .pointer(pointer)
                    .cloned()
                    .ok_or_else(|| EventError::SchemaNotFound(key.clone()))?,
                None => document,
            };

            state.in_flight.push(key);
            let resolved = self.resolve_value(target, &uri, state).await;
            state.in_flight.pop();
            resolved
        })
    }

    async fn load_document(&self, uri: &SchemaUri, state: &mut Resolution) -> EventResult<Value> {
        let document_id = uri.document();
        if let Some(document) = state.documents.get(&document_id) {
            return Ok(document.clone());
        }

        let loader = self
            .loader(uri.prefix())
            .await
            .ok_or_else(|| EventError::UnknownScheme(uri.prefix().to_string()))?;

        tracing::debug!(uri = %document_id, "Loading schema document");
        let document = loader.load(uri.path()).await?;
        state.documents.insert(document_id, document.clone());
        Ok(document)
    }

    fn resolve_value<'a>(
        &'a self,
        value: Value,
        base: &'a SchemaUri,
        state: &'a mut Resolution,
    ) -> ResolveFuture<'a> {
        Box::pin(async move {
            match value {
                Value::Object(map) => {
                    if let Some(Value::String(reference)) = map.get("$ref") {
                        let target = base.resolve(reference)?;
                        return self.resolve_uri(target, state).await;
                    }

                    let mut resolved = Map::with_capacity(map.len());
                    for (key, child) in map {
                        let child = match child {
                            child if DATA_KEYWORDS.contains(&key.as_str()) => child,
                            Value::Object(entries) if SCHEMA_MAP_KEYWORDS.contains(&key.as_str()) => {
                                let mut schemas = Map::with_capacity(entries.len());
                                for (name, schema) in entries {
                                    schemas.insert(name, self.resolve_value(schema, base, state).await?);
                                }
                                Value::Object(schemas)
                            }
                            child => self.resolve_value(child, base, state).await?,
                        };
                        resolved.insert(key, child);
                    }
                    Ok(Value::Object(resolved))
                }
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(self.resolve_value(item, base, state).await?);
                    }
                    Ok(Value::Array(resolved))
                }
                other => Ok(other),
            }
        })
    }
}

impl Default for Dereferencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ArrayLoader;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticLoader(Value);

    #[async_trait]
    impl SchemaLoader for StaticLoader {
        async fn load(&self, _path: &str) -> EventResult<Value> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_resolves_document_without_refs_unchanged() {
        let schema = json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "integer"}, "tags": {"type": "array", "items": {"type": "string"}}}
        });
        let deref = Dereferencer::new().with_loader(ArrayLoader::new().with_schema("a.json", schema.clone()), "array");

        let resolved = deref.dereference("array://a.json").await.unwrap();
        assert_eq!(resolved, schema);
    }

    #[tokio::test]
    async fn test_dereference_is_idempotent() {
        let loader = ArrayLoader::new()
            .with_schema("a.json", json!({"properties": {"id": {"$ref": "b.json"}}}))
            .with_schema("b.json", json!({"type": "integer"}));
        let deref = Dereferencer::new().with_loader(loader, "array");

        let once = deref.dereference("array://a.json").await.unwrap();

        let again = Dereferencer::new()
            .with_loader(ArrayLoader::new().with_schema("resolved.json", once.clone()), "array")
            .dereference("array://resolved.json")
            .await
            .unwrap();
        assert_eq!(once, again);
        assert_eq!(once, json!({"properties": {"id": {"type": "integer"}}}));
    }

    #[tokio::test]
    async fn test_refs_inside_instance_data_are_kept() {
        let schema = json!({
            "properties": {
                "x": {"const": {"$ref": "b.json"}},
                "y": {"enum": [{"$ref": "b.json"}], "default": {"$ref": "b.json"}},
                "default": {"$ref": "b.json"}
            }
        });
        let loader = ArrayLoader::new()
            .with_schema("a.json", schema)
            .with_schema("b.json", json!({"type": "integer"}));
        let deref = Dereferencer::new().with_loader(loader, "array");

        let resolved = deref.dereference("array://a.json").await.unwrap();

        assert_eq!(resolved["properties"]["x"]["const"], json!({"$ref": "b.json"}));
        assert_eq!(resolved["properties"]["y"]["enum"], json!([{"$ref": "b.json"}]));
        assert_eq!(resolved["properties"]["y"]["default"], json!({"$ref": "b.json"}));
        // a property named like a data keyword is still a schema
        assert_eq!(resolved["properties"]["default"], json!({"type": "integer"}));

        let again = Dereferencer::new()
            .with_loader(ArrayLoader::new().with_schema("resolved.json", resolved.clone()), "array")
            .dereference("array://resolved.json")
            .await
            .unwrap();
        assert_eq!(again, resolved);
    }

    #[tokio::test]
    async fn test_internal_and_relative_refs() {
        let loader = ArrayLoader::new()
            .with_schema(
                "events/user/created/1.0.json",
                json!({
                    "type": "object",
                    "properties": {
                        "name": {"$ref": "#/definitions/name"},
                        "address": {"$ref": "../../common.json#/address"}
                    },
                    "definitions": {"name": {"type": "string", "minLength": 1}}
                }),
            )
            .with_schema(
                "events/common.json",
                json!({"address": {"type": "object", "required": ["city"]}}),
            );
        let deref = Dereferencer::new().with_loader(loader, "array");

        let resolved = deref
            .dereference("array://events/user/created/1.0.json")
            .await
            .unwrap();

        assert_eq!(resolved["properties"]["name"], json!({"type": "string", "minLength": 1}));
        assert_eq!(
            resolved["properties"]["address"],
            json!({"type": "object", "required": ["city"]})
        );
    }

    #[tokio::test]
    async fn test_cross_loader_resolution_uses_ref_prefix() {
        let array = ArrayLoader::new()
            .with_schema("a.json", json!({"properties": {"y": {"$ref": "custom://y"}}}))
            .with_schema("y", json!({"type": "boolean", "from": "array"}));
        let custom = ArrayLoader::new().with_schema("y", json!({"type": "string", "from": "custom"}));

        let deref = Dereferencer::new();
        deref.register_loader(array, "array").await;
        deref.register_loader(custom, "custom").await;

        let resolved = deref.dereference("array://a.json").await.unwrap();
        assert_eq!(resolved["properties"]["y"]["from"], "custom");
    }

    #[tokio::test]
    async fn test_cyclic_reference_fails() {
        let loader = ArrayLoader::new()
            .with_schema("a.json", json!({"properties": {"b": {"$ref": "b.json"}}}))
            .with_schema("b.json", json!({"properties": {"a": {"$ref": "a.json"}}}));
        let deref = Dereferencer::new().with_loader(loader, "array");

        let result = deref.dereference("array://a.json").await;
        match result {
            Err(EventError::CyclicReference(chain)) => {
                assert_eq!(chain, "array://a.json -> array://b.json -> array://a.json");
            }
            other => panic!("expected cyclic reference, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_self_reference_fails() {
        let loader = ArrayLoader::new().with_schema(
            "node.json",
            json!({"properties": {"next": {"$ref": "#"}}}),
        );
        let deref = Dereferencer::new().with_loader(loader, "array");

        assert!(matches!(
            deref.dereference("array://node.json").await,
            Err(EventError::CyclicReference(_))
        ));
    }

    #[tokio::test]
    async fn test_repeated_non_cyclic_refs_are_allowed() {
        let loader = ArrayLoader::new()
            .with_schema(
                "a.json",
                json!({"properties": {"x": {"$ref": "id.json"}, "y": {"$ref": "id.json"}}}),
            )
            .with_schema("id.json", json!({"type": "integer"}));
        let deref = Dereferencer::new().with_loader(loader, "array");

        let resolved = deref.dereference("array://a.json").await.unwrap();
        assert_eq!(resolved["properties"]["x"], resolved["properties"]["y"]);
    }

    #[tokio::test]
    async fn test_unknown_scheme() {
        let loader = ArrayLoader::new().with_schema("a.json", json!({"$ref": "unknown://x"}));
        let deref = Dereferencer::new().with_loader(loader, "array");

        assert!(matches!(
            deref.dereference("array://a.json").await,
            Err(EventError::UnknownScheme(prefix)) if prefix == "unknown"
        ));
        assert!(matches!(
            deref.dereference("other://a.json").await,
            Err(EventError::UnknownScheme(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_schema_and_pointer() {
        let loader = ArrayLoader::new().with_schema("a.json", json!({"definitions": {}}));
        let deref = Dereferencer::new().with_loader(loader, "array");

        assert!(matches!(
            deref.dereference("array://missing.json").await,
            Err(EventError::SchemaNotFound(_))
        ));
        assert!(matches!(
            deref.dereference("array://a.json#/definitions/nope").await,
            Err(EventError::SchemaNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let deref = Dereferencer::new();
        assert!(deref.register_loader(StaticLoader(json!({"v": 1})), "array").await.is_none());
        assert!(deref.register_loader(StaticLoader(json!({"v": 2})), "array").await.is_some());

        assert_eq!(deref.prefixes().await, vec!["array"]);
        assert_eq!(deref.dereference("array://anything").await.unwrap(), json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_concurrent_dereference_calls_are_independent() {
        let loader = ArrayLoader::new()
            .with_schema("a.json", json!({"properties": {"id": {"$ref": "id.json"}}}))
            .with_schema("id.json", json!({"type": "integer"}));
        let deref = Arc::new(Dereferencer::new().with_loader(loader, "array"));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let deref = deref.clone();
            tasks.push(tokio::spawn(async move { deref.dereference("array://a.json").await }));
        }

        for task in tasks {
            let resolved = task.await.unwrap().unwrap();
            assert_eq!(resolved["properties"]["id"]["type"], "integer");
        }
    }
}
