use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::dereferencer::Dereferencer;
use super::uri::SchemaUriTemplate;
use crate::error::{EventError, EventResult};
use crate::event::Event;

/// Path of the attribute root in validation errors.
pub const ROOT_PATH: &str = "$";

/// Upper bound on cached `pattern`/`patternProperties` regexes.
const PATTERN_CACHE_CAPACITY: usize = 1024;

static PATTERN_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

/// Compiles a schema pattern, reusing earlier compilations.
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let cache = PATTERN_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Some(re) = cache.read().unwrap_or_else(PoisonError::into_inner).get(pattern) {
        return Ok(re.clone());
    }

    let re = Regex::new(pattern)?;
    let mut patterns = cache.write().unwrap_or_else(PoisonError::into_inner);
    if patterns.len() < PATTERN_CACHE_CAPACITY {
        patterns.insert(pattern.to_string(), re.clone());
    }
    Ok(re)
}

/// Trait for validating events against schemas
#[async_trait]
pub trait EventValidator: Send + Sync {
    /// Schema identifier the naming convention assigns to the event
    fn schema_uri(&self, event: &Event) -> String;

    /// Validate the event against the schema behind `uri`
    async fn validate_against(&self, event: &Event, uri: &str) -> ValidationResult;

    /// Validate the event against the schema its naming convention selects
    async fn validate(&self, event: &Event) -> ValidationResult {
        let uri = self.schema_uri(event);
        self.validate_against(event, &uri).await
    }
}

/// Result of schema validation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Schema identifier the event was checked against
    pub schema: String,
    /// Every violation found, empty when valid
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn valid(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            errors: vec![],
        }
    }

    pub fn invalid(schema: impl Into<String>, errors: Vec<ValidationError>) -> Self {
        Self {
            schema: schema.into(),
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Converts into an `EventResult`, naming the offending event on failure
    pub fn to_event_result(&self, event: &Event) -> EventResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(EventError::ValidationFailed {
                event: event.to_string(),
                errors: self.errors.clone(),
            })
        }
    }
}

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Dotted attribute path (`id`, `address.city`, `tags[1]`), `$` for the root
    pub path: String,
    /// Schema keyword that failed (`type`, `required`, ..., `$ref` for resolution failures)
    pub keyword: String,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    /// Underlying schema resolution failure, if any
    pub cause: Option<Box<EventError>>,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, keyword: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            keyword: keyword.into(),
            message: message.into(),
            expected: None,
            actual: None,
            cause: None,
        }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    /// Wraps a schema resolution failure as a violation at the root
    pub fn schema_unresolved(err: EventError) -> Self {
        Self {
            path: ROOT_PATH.to_string(),
            keyword: "$ref".to_string(),
            message: format!("Schema could not be resolved: {}", err),
            expected: None,
            actual: None,
            cause: Some(Box::new(err)),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// JSON Schema validator for events
///
/// Resolves the event's schema through a [`Dereferencer`] and evaluates the
/// event attributes against it.
pub struct JsonSchemaEventValidator {
    dereferencer: Arc<Dereferencer>,
    naming: SchemaUriTemplate,
}

impl JsonSchemaEventValidator {
    pub fn new(dereferencer: Arc<Dereferencer>) -> Self {
        Self {
            dereferencer,
            naming: SchemaUriTemplate::default(),
        }
    }

    pub fn with_naming(mut self, naming: SchemaUriTemplate) -> Self {
        self.naming = naming;
        self
    }

    pub fn dereferencer(&self) -> &Arc<Dereferencer> {
        &self.dereferencer
    }

    pub fn naming(&self) -> &SchemaUriTemplate {
        &self.naming
    }
}

#[async_trait]
impl EventValidator for JsonSchemaEventValidator {
    fn schema_uri(&self, event: &Event) -> String {
        self.naming.render(event)
    }

    async fn validate_against(&self, event: &Event, uri: &str) -> ValidationResult {
        let schema = match self.dereferencer.dereference(uri).await {
            Ok(schema) => schema,
            Err(err) => {
                tracing::debug!(schema = %uri, event = %event, error = %err, "Schema resolution failed");
                return ValidationResult::invalid(uri, vec![ValidationError::schema_unresolved(err)]);
            }
        };

        let errors = validate_value(&schema, &event.attributes_value());
        if errors.is_empty() {
            ValidationResult::valid(uri)
        } else {
            ValidationResult::invalid(uri, errors)
        }
    }
}

/// Evaluates `instance` against an already resolved schema, collecting every violation
pub fn validate_value(schema: &Value, instance: &Value) -> Vec<ValidationError> {
    let mut errors = vec![];
    evaluate(schema, instance, ROOT_PATH, &mut errors);
    errors
}

fn child_path(path: &str, key: &str) -> String {
    if path == ROOT_PATH {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn index_path(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}

fn is_valid(schema: &Value, instance: &Value, path: &str) -> bool {
    let mut errors = vec![];
    evaluate(schema, instance, path, &mut errors);
    errors.is_empty()
}

fn evaluate(schema: &Value, instance: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    let schema = match schema {
        Value::Object(schema) => schema,
        Value::Bool(false) => {
            errors.push(ValidationError::new(path, "false", "Schema rejects every value"));
            return;
        }
        _ => return,
    };

    validate_generic(schema, instance, path, errors);
    validate_combinators(schema, instance, path, errors);

    match instance {
        Value::Object(obj) => validate_object(schema, obj, path, errors),
        Value::Array(items) => validate_array(schema, items, path, errors),
        Value::String(s) => validate_string(schema, s, path, errors),
        Value::Number(_) => validate_number(schema, instance, path, errors),
        _ => {}
    }
}

fn validate_generic(
    schema: &Map<String, Value>,
    instance: &Value,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(expected) = schema.get("type") {
        let types: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => vec![],
        };
        if !types.is_empty() && !types.iter().any(|t| matches_type(instance, t)) {
            errors.push(
                ValidationError::new(path, "type", "Type mismatch")
                    .with_expected(types.join(" or "))
                    .with_actual(json_type(instance)),
            );
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.iter().any(|candidate| json_equal(candidate, instance)) {
            errors.push(
                ValidationError::new(path, "enum", "Value is not one of the allowed values")
                    .with_expected(Value::Array(allowed.clone()).to_string())
                    .with_actual(instance.to_string()),
            );
        }
    }

    if let Some(constant) = schema.get("const") {
        if !json_equal(constant, instance) {
            errors.push(
                ValidationError::new(path, "const", "Value does not equal the constant")
                    .with_expected(constant.to_string())
                    .with_actual(instance.to_string()),
            );
        }
    }
}

fn validate_combinators(
    schema: &Map<String, Value>,
    instance: &Value,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(Value::Array(all)) = schema.get("allOf") {
        for sub in all {
            evaluate(sub, instance, path, errors);
        }
    }

    if let Some(Value::Array(any)) = schema.get("anyOf") {
        if !any.iter().any(|sub| is_valid(sub, instance, path)) {
            errors.push(ValidationError::new(
                path,
                "anyOf",
                "Value does not match any of the allowed schemas",
            ));
        }
    }

    if let Some(Value::Array(one)) = schema.get("oneOf") {
        let matched = one.iter().filter(|sub| is_valid(sub, instance, path)).count();
        if matched != 1 {
            errors.push(
                ValidationError::new(path, "oneOf", "Value must match exactly one schema")
                    .with_expected("1")
                    .with_actual(matched.to_string()),
            );
        }
    }

    if let Some(not) = schema.get("not") {
        if is_valid(not, instance, path) {
            errors.push(ValidationError::new(
                path,
                "not",
                "Value matches a schema it must not match",
            ));
        }
    }
}

fn validate_object(
    schema: &Map<String, Value>,
    obj: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for field in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(field) {
                errors.push(ValidationError::new(
                    child_path(path, field),
                    "required",
                    format!("Required field '{}' is missing", field),
                ));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    if let Some(properties) = properties {
        for (field, field_schema) in properties {
            if let Some(value) = obj.get(field) {
                evaluate(field_schema, value, &child_path(path, field), errors);
            }
        }
    }

    let mut pattern_properties = vec![];
    if let Some(Value::Object(patterns)) = schema.get("patternProperties") {
        for (pattern, pattern_schema) in patterns {
            match compile_pattern(pattern) {
                Ok(re) => pattern_properties.push((re, pattern_schema)),
                Err(_) => errors.push(ValidationError::new(
                    path,
                    "patternProperties",
                    format!("Schema contains an invalid pattern '{}'", pattern),
                )),
            }
        }
        for (field, value) in obj {
            for (re, pattern_schema) in &pattern_properties {
                if re.is_match(field) {
                    evaluate(pattern_schema, value, &child_path(path, field), errors);
                }
            }
        }
    }

    if let Some(additional) = schema.get("additionalProperties") {
        let extra = obj.iter().filter(|(field, _)| {
            !properties.is_some_and(|p| p.contains_key(field.as_str()))
                && !pattern_properties.iter().any(|(re, _)| re.is_match(field.as_str()))
        });
        for (field, value) in extra {
            match additional {
                Value::Bool(false) => errors.push(ValidationError::new(
                    child_path(path, field),
                    "additionalProperties",
                    format!("Additional property '{}' is not allowed", field),
                )),
                Value::Object(_) => evaluate(additional, value, &child_path(path, field), errors),
                _ => {}
            }
        }
    }

    if let Some(min) = schema.get("minProperties").and_then(Value::as_u64) {
        if (obj.len() as u64) < min {
            errors.push(
                ValidationError::new(path, "minProperties", format!("Object has fewer than {} properties", min))
                    .with_expected(min.to_string())
                    .with_actual(obj.len().to_string()),
            );
        }
    }

    if let Some(max) = schema.get("maxProperties").and_then(Value::as_u64) {
        if (obj.len() as u64) > max {
            errors.push(
                ValidationError::new(path, "maxProperties", format!("Object has more than {} properties", max))
                    .with_expected(max.to_string())
                    .with_actual(obj.len().to_string()),
            );
        }
    }

    if let Some(Value::Object(dependencies)) = schema.get("dependencies") {
        for (field, dependency) in dependencies {
            if !obj.contains_key(field) {
                continue;
            }
            match dependency {
                Value::Array(needed) => {
                    for other in needed.iter().filter_map(Value::as_str) {
                        if !obj.contains_key(other) {
                            errors.push(ValidationError::new(
                                child_path(path, other),
                                "dependencies",
                                format!("Field '{}' is required when '{}' is present", other, field),
                            ));
                        }
                    }
                }
                Value::Object(_) => evaluate(dependency, &Value::Object(obj.clone()), path, errors),
                _ => {}
            }
        }
    }
}

fn validate_array(
    schema: &Map<String, Value>,
    items: &[Value],
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    match schema.get("items") {
        Some(Value::Array(tuple)) => {
            for (i, (item, item_schema)) in items.iter().zip(tuple).enumerate() {
                evaluate(item_schema, item, &index_path(path, i), errors);
            }
            if items.len() > tuple.len() {
                match schema.get("additionalItems") {
                    Some(Value::Bool(false)) => errors.push(
                        ValidationError::new(path, "additionalItems", "Array has more items than allowed")
                            .with_expected(tuple.len().to_string())
                            .with_actual(items.len().to_string()),
                    ),
                    Some(extra) if extra.is_object() => {
                        for (i, item) in items.iter().enumerate().skip(tuple.len()) {
                            evaluate(extra, item, &index_path(path, i), errors);
                        }
                    }
                    _ => {}
                }
            }
        }
        Some(item_schema) => {
            for (i, item) in items.iter().enumerate() {
                evaluate(item_schema, item, &index_path(path, i), errors);
            }
        }
        None => {}
    }

    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if (items.len() as u64) < min {
            errors.push(
                ValidationError::new(path, "minItems", format!("Array has fewer than {} items", min))
                    .with_expected(min.to_string())
                    .with_actual(items.len().to_string()),
            );
        }
    }

    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
        if (items.len() as u64) > max {
            errors.push(
                ValidationError::new(path, "maxItems", format!("Array has more than {} items", max))
                    .with_expected(max.to_string())
                    .with_actual(items.len().to_string()),
            );
        }
    }

    if schema.get("uniqueItems").and_then(Value::as_bool) == Some(true) {
        let duplicate = items
            .iter()
            .enumerate()
            .any(|(i, a)| items[i + 1..].iter().any(|b| json_equal(a, b)));
        if duplicate {
            errors.push(ValidationError::new(path, "uniqueItems", "Array items are not unique"));
        }
    }
}

fn validate_string(schema: &Map<String, Value>, value: &str, path: &str, errors: &mut Vec<ValidationError>) {
    let length = value.chars().count() as u64;

    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if length < min {
            errors.push(
                ValidationError::new(path, "minLength", format!("String is shorter than {} characters", min))
                    .with_expected(min.to_string())
                    .with_actual(length.to_string()),
            );
        }
    }

    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if length > max {
            errors.push(
                ValidationError::new(path, "maxLength", format!("String is longer than {} characters", max))
                    .with_expected(max.to_string())
                    .with_actual(length.to_string()),
            );
        }
    }

    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        match compile_pattern(pattern) {
            Ok(re) if re.is_match(value) => {}
            Ok(_) => errors.push(
                ValidationError::new(path, "pattern", format!("String does not match pattern '{}'", pattern))
                    .with_expected(pattern)
                    .with_actual(value),
            ),
            Err(_) => errors.push(ValidationError::new(
                path,
                "pattern",
                format!("Schema contains an invalid pattern '{}'", pattern),
            )),
        }
    }

    if let Some(format) = schema.get("format").and_then(Value::as_str) {
        if !validate_format(value, format) {
            errors.push(
                ValidationError::new(path, "format", format!("Invalid format: expected {}", format))
                    .with_expected(format)
                    .with_actual(value),
            );
        }
    }
}

fn validate_number(schema: &Map<String, Value>, instance: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    let Some(num) = instance.as_f64() else {
        return;
    };

    if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
        let exclusive = schema.get("exclusiveMinimum").and_then(Value::as_bool) == Some(true);
        if num < minimum || (exclusive && num == minimum) {
            errors.push(
                ValidationError::new(path, "minimum", format!("Value {} is less than minimum {}", num, minimum))
                    .with_expected(minimum.to_string())
                    .with_actual(num.to_string()),
            );
        }
    }

    if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
        let exclusive = schema.get("exclusiveMaximum").and_then(Value::as_bool) == Some(true);
        if num > maximum || (exclusive && num == maximum) {
            errors.push(
                ValidationError::new(path, "maximum", format!("Value {} is greater than maximum {}", num, maximum))
                    .with_expected(maximum.to_string())
                    .with_actual(num.to_string()),
            );
        }
    }

    // Numeric exclusive bounds (draft-06 onwards)
    if let Some(bound) = schema.get("exclusiveMinimum").and_then(Value::as_f64) {
        if num <= bound {
            errors.push(
                ValidationError::new(path, "exclusiveMinimum", format!("Value {} is not greater than {}", num, bound))
                    .with_expected(bound.to_string())
                    .with_actual(num.to_string()),
            );
        }
    }

    if let Some(bound) = schema.get("exclusiveMaximum").and_then(Value::as_f64) {
        if num >= bound {
            errors.push(
                ValidationError::new(path, "exclusiveMaximum", format!("Value {} is not less than {}", num, bound))
                    .with_expected(bound.to_string())
                    .with_actual(num.to_string()),
            );
        }
    }

    if let Some(divisor) = schema.get("multipleOf").and_then(Value::as_f64) {
        if divisor > 0.0 {
            let quotient = num / divisor;
            if (quotient - quotient.round()).abs() > 1e-9 {
                errors.push(
                    ValidationError::new(path, "multipleOf", format!("Value {} is not a multiple of {}", num, divisor))
                        .with_expected(divisor.to_string())
                        .with_actual(num.to_string()),
                );
            }
        }
    }
}

fn matches_type(value: &Value, expected_type: &str) -> bool {
    match expected_type {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true, // Unknown type
    }
}

fn json_type(value: &Value) -> String {
    match value {
        Value::String(_) => "string",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "null",
    }
    .to_string()
}

/// JSON equality where `1` and `1.0` are the same number
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

fn validate_format(value: &str, format: &str) -> bool {
    match format {
        "email" => value
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty()),
        "uri" | "url" => value.split_once(':').is_some_and(|(scheme, rest)| {
            !rest.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }),
        "uuid" => uuid::Uuid::parse_str(value).is_ok(),
        "date-time" => chrono::DateTime::parse_from_rfc3339(value).is_ok(),
        "ipv4" => value.parse::<std::net::Ipv4Addr>().is_ok(),
        "ipv6" => value.parse::<std::net::Ipv6Addr>().is_ok(),
        _ => true, // Unknown format, skip validation
    }
}
