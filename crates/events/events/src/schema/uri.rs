//! Schema identifiers and the naming convention mapping events to them.

use crate::error::{EventError, EventResult};
use crate::event::Event;

const SCHEME_SEPARATOR: &str = "://";

/// A parsed schema identifier of the form `prefix://path[#fragment]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaUri {
    prefix: String,
    path: String,
    fragment: Option<String>,
}

impl SchemaUri {
    /// Parses a schema identifier.
    pub fn parse(uri: &str) -> EventResult<Self> {
        let (prefix, rest) = uri
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| EventError::InvalidSchemaUri(format!("'{}' has no scheme prefix", uri)))?;

        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_'))
        {
            return Err(EventError::InvalidSchemaUri(format!(
                "'{}' has an invalid scheme prefix",
                uri
            )));
        }

        let (path, fragment) = match rest.split_once('#') {
            Some((path, fragment)) => (path, Self::normalize_fragment(fragment)),
            None => (rest, None),
        };

        if path.is_empty() {
            return Err(EventError::InvalidSchemaUri(format!("'{}' has an empty path", uri)));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            path: path.to_string(),
            fragment,
        })
    }

    fn normalize_fragment(fragment: &str) -> Option<String> {
        if fragment.is_empty() {
            None
        } else {
            Some(fragment.to_string())
        }
    }

    /// Loader prefix (URI scheme).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Loader key.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// JSON pointer fragment, without the leading `#`.
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// The identifier of the whole document, without fragment.
    pub fn document(&self) -> String {
        format!("{}{}{}", self.prefix, SCHEME_SEPARATOR, self.path)
    }

    /// Resolves a `$ref` value relative to this identifier.
    ///
    /// - `other://key#/ptr` is absolute
    /// - `#/definitions/x` points into this document
    /// - `common.json#/x` and `../shared/x.json` are joined onto this
    ///   document's directory under the same prefix
    pub fn resolve(&self, reference: &str) -> EventResult<SchemaUri> {
        if reference.contains(SCHEME_SEPARATOR) {
            return Self::parse(reference);
        }

        if let Some(fragment) = reference.strip_prefix('#') {
            return Ok(Self {
                prefix: self.prefix.clone(),
                path: self.path.clone(),
                fragment: Self::normalize_fragment(fragment),
            });
        }

        let (relative, fragment) = match reference.split_once('#') {
            Some((relative, fragment)) => (relative, Self::normalize_fragment(fragment)),
            None => (reference, None),
        };

        let joined = if relative.starts_with('/') {
            relative.trim_start_matches('/').to_string()
        } else {
            match self.path.rfind('/') {
                Some(idx) => format!("{}/{}", &self.path[..idx], relative),
                None => relative.to_string(),
            }
        };

        let mut segments: Vec<&str> = Vec::new();
        for segment in joined.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(EventError::InvalidSchemaUri(format!(
                            "'{}' escapes the root of '{}'",
                            reference, self
                        )));
                    }
                }
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(EventError::InvalidSchemaUri(format!(
                "'{}' resolves to an empty path",
                reference
            )));
        }

        Ok(Self {
            prefix: self.prefix.clone(),
            path: segments.join("/"),
            fragment,
        })
    }
}

impl std::fmt::Display for SchemaUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.prefix, SCHEME_SEPARATOR, self.path)?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

/// Naming convention deriving a schema identifier from an event.
///
/// The pattern may use the `{topic}`, `{name}` and `{version}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaUriTemplate {
    prefix: String,
    pattern: String,
}

impl SchemaUriTemplate {
    /// Default loader prefix.
    pub const DEFAULT_PREFIX: &'static str = "array";
    /// Default path pattern.
    pub const DEFAULT_PATTERN: &'static str = "events/{topic}/{name}/{version}.json";

    /// Creates a template.
    pub fn new(prefix: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pattern: pattern.into(),
        }
    }

    /// Parses a full template such as `array://events/{topic}/{name}/{version}.json`.
    pub fn parse(template: &str) -> EventResult<Self> {
        let (prefix, pattern) = template.split_once(SCHEME_SEPARATOR).ok_or_else(|| {
            EventError::InvalidSchemaUri(format!("template '{}' has no scheme prefix", template))
        })?;
        if prefix.is_empty() || pattern.is_empty() {
            return Err(EventError::InvalidSchemaUri(format!(
                "template '{}' needs both a prefix and a path",
                template
            )));
        }
        Ok(Self::new(prefix, pattern))
    }

    /// Returns a copy using a different loader prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Loader prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Path pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Renders the identifier for the given components.
    pub fn render_parts(&self, topic: &str, name: &str, version: &str) -> String {
        let path = self
            .pattern
            .replace("{topic}", topic)
            .replace("{name}", name)
            .replace("{version}", version);
        format!("{}{}{}", self.prefix, SCHEME_SEPARATOR, path)
    }

    /// Renders the identifier for an event.
    pub fn render(&self, event: &Event) -> String {
        self.render_parts(&event.topic, &event.name, &event.version)
    }
}

impl Default for SchemaUriTemplate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX, Self::DEFAULT_PATTERN)
    }
}

impl std::fmt::Display for SchemaUriTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.prefix, SCHEME_SEPARATOR, self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri_with_fragment() {
        let uri = SchemaUri::parse("array://events/user/created/1.0.json#/definitions/id").unwrap();
        assert_eq!(uri.prefix(), "array");
        assert_eq!(uri.path(), "events/user/created/1.0.json");
        assert_eq!(uri.fragment(), Some("/definitions/id"));
        assert_eq!(uri.document(), "array://events/user/created/1.0.json");
        assert_eq!(uri.to_string(), "array://events/user/created/1.0.json#/definitions/id");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(SchemaUri::parse("events/x.json"), Err(EventError::InvalidSchemaUri(_))));
        assert!(matches!(SchemaUri::parse("://x"), Err(EventError::InvalidSchemaUri(_))));
        assert!(matches!(SchemaUri::parse("array://"), Err(EventError::InvalidSchemaUri(_))));
        assert!(matches!(SchemaUri::parse("bad scheme://x"), Err(EventError::InvalidSchemaUri(_))));
    }

    #[test]
    fn test_resolve_references() {
        let base = SchemaUri::parse("array://events/user/created/1.0.json").unwrap();

        let absolute = base.resolve("custom://types/id.json").unwrap();
        assert_eq!(absolute.to_string(), "custom://types/id.json");

        let internal = base.resolve("#/definitions/name").unwrap();
        assert_eq!(internal.to_string(), "array://events/user/created/1.0.json#/definitions/name");

        let sibling = base.resolve("common.json#/address").unwrap();
        assert_eq!(sibling.to_string(), "array://events/user/created/common.json#/address");

        let parent = base.resolve("../../shared/types.json").unwrap();
        assert_eq!(parent.to_string(), "array://events/shared/types.json");

        let rooted = base.resolve("/shared/types.json").unwrap();
        assert_eq!(rooted.to_string(), "array://shared/types.json");
    }

    #[test]
    fn test_resolve_rejects_escaping_root() {
        let base = SchemaUri::parse("array://schema.json").unwrap();
        assert!(base.resolve("../../x.json").is_err());
    }

    #[test]
    fn test_template_render() {
        let template = SchemaUriTemplate::default();
        let event = Event::versioned("user", "created", "2.0");
        assert_eq!(template.render(&event), "array://events/user/created/2.0.json");

        let custom = SchemaUriTemplate::parse("custom://schemas/{topic}.{name}.v{version}").unwrap();
        assert_eq!(custom.render(&event), "custom://schemas/user.created.v2.0");
        assert_eq!(custom.clone().with_prefix("array").prefix(), "array");
    }
}
