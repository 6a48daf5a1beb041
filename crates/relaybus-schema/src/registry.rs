use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use jsonschema::Validator;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::validator::validate_value;

/// Event-keyed registry of compiled JSON Schema validators.
///
/// Every registered event key has exactly one validator. Validating a key that
/// was never registered is always `SchemaError::UnknownEvent`, never a silent
/// pass-through: the registry is the authority on which events exist at all.
pub struct SchemaRegistry {
    validators: HashMap<String, Validator>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            validators: HashMap::new(),
            config,
        }
    }

    /// Register a schema for an event key from a JSON string.
    ///
    /// Re-registering an existing key replaces its validator.
    pub fn register(&mut self, event: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.register_value(event, &schema)
    }

    /// Register a schema for an event key from a JSON value.
    pub fn register_value(&mut self, event: &str, schema: &Value) -> Result<()> {
        let mut schema_to_compile = schema.clone();
        if self.config.strict_mode {
            apply_strict_mode(&mut schema_to_compile);
        }

        let compiled = jsonschema::validator_for(&schema_to_compile)
            .map_err(|err| SchemaError::CompileFailed(err.to_string()))?;

        self.validators.insert(event.to_string(), compiled);
        Ok(())
    }

    /// Load schemas from a directory.
    ///
    /// Every `<event>.schema.json` file registers a schema for `<event>`;
    /// other files are ignored.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load schemas from a directory with explicit config.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        let mut loaded_schema_count = 0usize;

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let is_schema_file = file_name.ends_with(".schema.json");
            let entry_path = entry.path();
            let path_metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_type = path_metadata.file_type();

            if file_type.is_symlink() {
                if is_schema_file {
                    return Err(SchemaError::LoadFailed(format!(
                        "refusing to load schema symlink: {file_name}"
                    )));
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let event = match event_key_from_file_name(&file_name) {
                Some(event) => event.to_string(),
                None => {
                    if is_schema_file {
                        return Err(SchemaError::LoadFailed(format!(
                            "schema filename has an empty event key: {file_name}"
                        )));
                    }
                    continue;
                }
            };

            loaded_schema_count = loaded_schema_count.saturating_add(1);
            if loaded_schema_count > registry.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({}): {}",
                    registry.config.max_schemas_from_directory, loaded_schema_count
                )));
            }

            let file = std::fs::File::open(&entry_path).map_err(|err| {
                SchemaError::LoadFailed(format!(
                    "failed opening schema {}: {err}",
                    entry_path.display()
                ))
            })?;
            let opened_metadata = file
                .metadata()
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;

            #[cfg(unix)]
            {
                if !same_file_identity(&path_metadata, &opened_metadata) {
                    return Err(SchemaError::LoadFailed(format!(
                        "schema file changed during load: {file_name}"
                    )));
                }
            }

            if opened_metadata.len() > registry.config.max_schema_file_size as u64 {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file too large ({} bytes): {file_name}",
                    opened_metadata.len()
                )));
            }

            let max_bytes = registry.config.max_schema_file_size;
            let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
            let mut content = String::new();
            file.take(read_limit)
                .read_to_string(&mut content)
                .map_err(|err| {
                    SchemaError::LoadFailed(format!(
                        "failed reading schema {}: {err}",
                        entry_path.display()
                    ))
                })?;
            if content.len() > max_bytes {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file too large while reading: {file_name}"
                )));
            }

            registry.register(&event, &content)?;
        }

        debug!(
            schemas = registry.len(),
            path = %path.display(),
            "loaded schema directory"
        );
        Ok(registry)
    }

    /// Load from embedded (event key, schema JSON) pairs.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::new();
        for (event, schema) in schemas {
            registry.register(event, schema)?;
        }
        Ok(registry)
    }

    /// Validate a payload against its event schema.
    pub fn validate(&self, event: &str, payload: &Value) -> Result<()> {
        match self.validators.get(event) {
            Some(validator) => validate_value(event, payload, validator),
            None => Err(SchemaError::UnknownEvent(event.to_string())),
        }
    }

    /// Parse a raw payload as JSON, then validate it.
    ///
    /// Returns the parsed value on success; this is the normalized payload
    /// handed to subscribers.
    pub fn validate_slice(&self, event: &str, payload: &[u8]) -> Result<Value> {
        let value: Value = serde_json::from_slice(payload)?;
        self.validate(event, &value)?;
        Ok(value)
    }

    /// Check if an event key has a registered schema.
    pub fn has_schema(&self, event: &str) -> bool {
        self.validators.contains_key(event)
    }

    /// Get event keys that have registered schemas, sorted.
    pub fn events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.validators.keys().cloned().collect();
        events.sort_unstable();
        events
    }

    /// Number of registered event keys.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn event_key_from_file_name(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(".schema.json")?;
    if stem.is_empty() {
        return None;
    }
    Some(stem)
}

const MAP_KEYWORDS: [&str; 5] = [
    "properties",
    "patternProperties",
    "dependentSchemas",
    "$defs",
    "definitions",
];

const SINGLE_KEYWORDS: [&str; 11] = [
    "propertyNames",
    "additionalProperties",
    "unevaluatedProperties",
    "items",
    "contains",
    "additionalItems",
    "unevaluatedItems",
    "not",
    "if",
    "then",
    "else",
];

const ARRAY_KEYWORDS: [&str; 4] = ["prefixItems", "allOf", "anyOf", "oneOf"];

fn apply_strict_mode(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if is_object_schema(map) && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }

            for key in MAP_KEYWORDS {
                if let Some(Value::Object(children)) = map.get_mut(key) {
                    for child in children.values_mut() {
                        apply_strict_mode(child);
                    }
                }
            }
            for key in SINGLE_KEYWORDS {
                if let Some(child) = map.get_mut(key) {
                    apply_strict_mode(child);
                }
            }
            for key in ARRAY_KEYWORDS {
                if let Some(Value::Array(children)) = map.get_mut(key) {
                    for child in children {
                        apply_strict_mode(child);
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                apply_strict_mode(item);
            }
        }
        _ => {}
    }
}

fn is_object_schema(map: &Map<String, Value>) -> bool {
    const OBJECT_KEYWORDS: [&str; 8] = [
        "properties",
        "patternProperties",
        "additionalProperties",
        "unevaluatedProperties",
        "required",
        "dependentRequired",
        "dependentSchemas",
        "propertyNames",
    ];

    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Value::String(kind) if kind == "object")),
        _ => OBJECT_KEYWORDS
            .iter()
            .any(|keyword| map.contains_key(*keyword)),
    }
}

#[cfg(unix)]
fn same_file_identity(
    path_metadata: &std::fs::Metadata,
    opened_metadata: &std::fs::Metadata,
) -> bool {
    use std::os::unix::fs::MetadataExt;
    path_metadata.dev() == opened_metadata.dev() && path_metadata.ino() == opened_metadata.ino()
}
