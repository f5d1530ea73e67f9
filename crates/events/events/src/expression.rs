//! Listener expressions matched against inbound events.
//!
//! Expressions have the form `topic[/name[/version]]`:
//! - `*` matches every event
//! - `user` or `user/*` matches every event on the `user` topic
//! - `user/created` matches every version of `user/created`
//! - `user/created/1.0` matches one exact version
//! - `user/created/1.*` matches every `1.x` version
//! - `*/created` matches `created` on any topic

use std::str::FromStr;

use crate::error::{EventError, EventResult};
use crate::event::Event;

const WILDCARD: &str = "*";

/// Version part of a listen expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionMatcher {
    /// Any version.
    Any,
    /// Exactly this version.
    Exact(String),
    /// Any version whose leading component equals this one (`1.*`).
    Major(String),
}

impl VersionMatcher {
    /// Checks a version string against this matcher.
    pub fn matches(&self, version: &str) -> bool {
        match self {
            VersionMatcher::Any => true,
            VersionMatcher::Exact(v) => v == version,
            VersionMatcher::Major(major) => {
                version == major
                    || version
                        .strip_prefix(major.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            }
        }
    }
}

/// A parsed listener expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenExpression {
    raw: String,
    topic: Option<String>,
    name: Option<String>,
    version: VersionMatcher,
}

impl ListenExpression {
    /// Parses an expression string.
    pub fn parse(expr: &str) -> EventResult<Self> {
        let raw = expr.trim();
        if raw.is_empty() {
            return Err(EventError::InvalidExpression("expression is empty".to_string()));
        }

        if raw == WILDCARD {
            return Ok(Self::any());
        }

        let parts: Vec<&str> = raw.split('/').collect();
        if parts.len() > 3 {
            return Err(EventError::InvalidExpression(format!(
                "'{}' has {} segments, expected at most 3 (topic/name/version)",
                raw,
                parts.len()
            )));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(EventError::InvalidExpression(format!(
                "'{}' contains an empty segment",
                raw
            )));
        }

        let topic = Self::parse_segment(raw, parts[0])?;
        let name = match parts.get(1) {
            Some(part) => Self::parse_segment(raw, part)?,
            None => None,
        };
        let version = match parts.get(2) {
            Some(part) => Self::parse_version(raw, part)?,
            None => VersionMatcher::Any,
        };

        Ok(Self {
            raw: raw.to_string(),
            topic,
            name,
            version,
        })
    }

    /// Expression matching every event.
    pub fn any() -> Self {
        Self {
            raw: WILDCARD.to_string(),
            topic: None,
            name: None,
            version: VersionMatcher::Any,
        }
    }

    fn parse_segment(raw: &str, part: &str) -> EventResult<Option<String>> {
        if part == WILDCARD {
            return Ok(None);
        }
        if part.contains('*') {
            return Err(EventError::InvalidExpression(format!(
                "'{}': wildcard must stand for a whole segment, got '{}'",
                raw, part
            )));
        }
        Ok(Some(part.to_string()))
    }

    fn parse_version(raw: &str, part: &str) -> EventResult<VersionMatcher> {
        if part == WILDCARD {
            return Ok(VersionMatcher::Any);
        }
        if let Some(major) = part.strip_suffix(".*") {
            if !major.is_empty() && !major.contains('*') {
                return Ok(VersionMatcher::Major(major.to_string()));
            }
        }
        if part.contains('*') {
            return Err(EventError::InvalidExpression(format!(
                "'{}': unsupported version pattern '{}'",
                raw, part
            )));
        }
        Ok(VersionMatcher::Exact(part.to_string()))
    }

    /// Checks if an event matches this expression.
    pub fn matches(&self, event: &Event) -> bool {
        self.topic.as_deref().is_none_or(|t| t == event.topic)
            && self.name.as_deref().is_none_or(|n| n == event.name)
            && self.version.matches(&event.version)
    }

    /// Topic segment, `None` when wildcard.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Name segment, `None` when wildcard.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Version matcher.
    pub fn version(&self) -> &VersionMatcher {
        &self.version
    }

    /// Returns `true` if every segment is a literal.
    pub fn is_exact(&self) -> bool {
        self.topic.is_some() && self.name.is_some() && matches!(self.version, VersionMatcher::Exact(_))
    }

    /// The expression as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ListenExpression {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ListenExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
