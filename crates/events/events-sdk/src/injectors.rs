//! Stock attribute injectors.

use chrono::{SecondsFormat, Utc};
use pubsub_events::{AttributeInjector, Event, EventError, EventManagerBuilder, EventResult, EventsConfig};
use serde_json::Value;
use uuid::Uuid;

/// Sets the dispatch time as an RFC 3339 UTC timestamp.
#[derive(Debug, Clone)]
pub struct DateAttributeInjector {
    key: String,
}

impl DateAttributeInjector {
    pub const DEFAULT_KEY: &'static str = "date";

    pub fn new() -> Self {
        Self {
            key: Self::DEFAULT_KEY.to_string(),
        }
    }

    /// Writes the timestamp under `key` instead.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

impl Default for DateAttributeInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeInjector for DateAttributeInjector {
    fn name(&self) -> &str {
        "date"
    }

    fn inject(&self, event: Event) -> EventResult<Event> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Ok(event.with_attribute(self.key.clone(), now))
    }
}

/// Sets a random v4 UUID, one per dispatch.
#[derive(Debug, Clone)]
pub struct UuidAttributeInjector {
    key: String,
}

impl UuidAttributeInjector {
    pub const DEFAULT_KEY: &'static str = "uuid";

    pub fn new() -> Self {
        Self {
            key: Self::DEFAULT_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

impl Default for UuidAttributeInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeInjector for UuidAttributeInjector {
    fn name(&self) -> &str {
        "uuid"
    }

    fn inject(&self, event: Event) -> EventResult<Event> {
        Ok(event.with_attribute(self.key.clone(), Uuid::new_v4().to_string()))
    }
}

/// Sets the name of the host the event was dispatched from.
#[derive(Debug, Clone)]
pub struct HostnameAttributeInjector {
    key: String,
}

impl HostnameAttributeInjector {
    pub const DEFAULT_KEY: &'static str = "hostname";

    pub fn new() -> Self {
        Self {
            key: Self::DEFAULT_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

impl Default for HostnameAttributeInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeInjector for HostnameAttributeInjector {
    fn name(&self) -> &str {
        "hostname"
    }

    fn inject(&self, event: Event) -> EventResult<Event> {
        let hostname = hostname::get()
            .map_err(|e| EventError::injector(self.name(), e.to_string()))?
            .into_string()
            .map_err(|raw| EventError::injector(self.name(), format!("hostname {:?} is not valid UTF-8", raw)))?;
        Ok(event.with_attribute(self.key.clone(), hostname))
    }
}

/// Sets a fixed value, such as the service name or environment.
#[derive(Debug, Clone)]
pub struct GenericAttributeInjector {
    key: String,
    value: Value,
}

impl GenericAttributeInjector {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl AttributeInjector for GenericAttributeInjector {
    fn name(&self) -> &str {
        &self.key
    }

    fn inject(&self, event: Event) -> EventResult<Event> {
        Ok(event.with_attribute(self.key.clone(), self.value.clone()))
    }
}

/// Sets a value computed from the event by a closure.
pub struct FnAttributeInjector<F> {
    key: String,
    compute: F,
}

impl<F> FnAttributeInjector<F>
where
    F: Fn(&Event) -> EventResult<Value> + Send + Sync,
{
    pub fn new(key: impl Into<String>, compute: F) -> Self {
        Self {
            key: key.into(),
            compute,
        }
    }
}

impl<F> AttributeInjector for FnAttributeInjector<F>
where
    F: Fn(&Event) -> EventResult<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.key
    }

    fn inject(&self, event: Event) -> EventResult<Event> {
        let value = (self.compute)(&event)?;
        Ok(event.with_attribute(self.key.clone(), value))
    }
}

/// Creates the stock injector registered under `name`.
///
/// Known names are `date`, `uuid` and `hostname`.
pub fn stock_injector(name: &str) -> EventResult<Box<dyn AttributeInjector>> {
    match name {
        "date" => Ok(Box::new(DateAttributeInjector::new())),
        "uuid" => Ok(Box::new(UuidAttributeInjector::new())),
        "hostname" => Ok(Box::new(HostnameAttributeInjector::new())),
        other => Err(EventError::Config(format!("unknown attribute injector '{}'", other))),
    }
}

/// Applies `config` to `builder`, including its stock attribute injectors.
pub fn configure_manager(builder: EventManagerBuilder, config: &EventsConfig) -> EventResult<EventManagerBuilder> {
    let mut builder = builder.with_config(config)?;
    for name in &config.attribute_injectors {
        builder = builder.boxed_injector(stock_injector(name)?);
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date_injector() {
        let event = DateAttributeInjector::new().inject(Event::new("user", "created")).unwrap();
        let date = event.attribute("date").and_then(Value::as_str).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(date).is_ok());
        assert!(date.ends_with('Z'));
    }

    #[test]
    fn test_uuid_injector_is_unique_per_event() {
        let injector = UuidAttributeInjector::new().with_key("event_id");
        let first = injector.inject(Event::new("user", "created")).unwrap();
        let second = injector.inject(Event::new("user", "created")).unwrap();

        let first = first.attribute("event_id").and_then(Value::as_str).unwrap().to_string();
        let second = second.attribute("event_id").and_then(Value::as_str).unwrap().to_string();
        assert!(Uuid::parse_str(&first).is_ok());
        assert_ne!(first, second);
    }

    #[test]
    fn test_hostname_injector() {
        let event = HostnameAttributeInjector::new().inject(Event::new("user", "created")).unwrap();
        assert!(event.attribute("hostname").and_then(Value::as_str).is_some());
    }

    #[test]
    fn test_generic_injector_overwrites() {
        let event = Event::new("user", "created").with_attribute("env", "dev");
        let event = GenericAttributeInjector::new("env", "production").inject(event).unwrap();
        assert_eq!(event.attribute("env"), Some(&json!("production")));
    }

    #[test]
    fn test_fn_injector() {
        let injector = FnAttributeInjector::new("qualified", |event: &Event| Ok(json!(event.qualified_name())));
        let event = injector.inject(Event::versioned("order", "placed", "2.0")).unwrap();
        assert_eq!(event.attribute("qualified"), Some(&json!("order/placed/2.0")));

        let failing = FnAttributeInjector::new("never", |_: &Event| Err(EventError::injector("never", "refused")));
        assert!(matches!(
            failing.inject(Event::new("a", "b")),
            Err(EventError::Injector { .. })
        ));
    }

    #[test]
    fn test_stock_injectors_by_name() {
        for name in ["date", "uuid", "hostname"] {
            assert_eq!(stock_injector(name).unwrap().name(), name);
        }
        assert!(matches!(stock_injector("clock"), Err(EventError::Config(_))));
    }

    #[tokio::test]
    async fn test_configured_injectors_run_in_order() {
        use pubsub_events::{EventManager, MemoryAdapter};
        use std::sync::Arc;

        let config = EventsConfig::from_toml_str("translator = \"topic\"\nattribute_injectors = [\"uuid\", \"date\"]\n")
            .unwrap();
        let adapter = Arc::new(MemoryAdapter::new());
        let manager = configure_manager(EventManager::builder(adapter.clone()), &config)
            .unwrap()
            .build();

        manager.dispatch(Event::new("user", "created")).await.unwrap();

        let body = adapter.published().await[0].body_json().unwrap();
        let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["uuid", "date"]);

        let unknown = EventsConfig::from_toml_str("attribute_injectors = [\"clock\"]").unwrap();
        assert!(configure_manager(EventManager::builder(adapter), &unknown).is_err());
    }
}
