//! `${VAR}` / `${VAR:default}` expansion over a parsed configuration tree.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::env;
use thiserror::Error;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").expect("placeholder pattern")
});

#[derive(Debug, Error)]
pub enum EnvResolverError {
    #[error("Environment variable '{0}' not found and no default provided")]
    VarNotFound(String),
    #[error("Environment variable '{0}' is not allowed. Allowed prefixes: {1:?}")]
    VarNotWhitelisted(String, Vec<String>),
    #[error("Placeholder expansion did not settle in '{0}'")]
    RecursiveReference(String),
}

/// Expands environment placeholders in string leaves. Variables must start
/// with one of the allowed prefixes unless the list is empty.
#[derive(Debug, Clone)]
pub struct EnvResolver {
    allowed_prefixes: Vec<String>,
    max_passes: usize,
}

impl Default for EnvResolver {
    fn default() -> Self {
        Self::new(
            ["TETHER_", "PG", "REDIS_", "HTTP_"]
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
        )
    }
}

impl EnvResolver {
    pub fn new(allowed_prefixes: Vec<String>) -> Self {
        Self {
            allowed_prefixes,
            max_passes: 8,
        }
    }

    pub fn unrestricted() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes;
        self
    }

    pub fn resolve(&self, value: &JsonValue) -> Result<JsonValue, EnvResolverError> {
        match value {
            JsonValue::String(s) => self.resolve_string(s),
            JsonValue::Object(map) => map
                .iter()
                .map(|(key, val)| Ok((key.clone(), self.resolve(val)?)))
                .collect::<Result<serde_json::Map<_, _>, _>>()
                .map(JsonValue::Object),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(JsonValue::Array),
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&self, input: &str) -> Result<JsonValue, EnvResolverError> {
        if !input.contains("${") {
            return Ok(JsonValue::String(input.to_string()));
        }

        let mut current = input.to_string();
        for _ in 0..self.max_passes {
            if !PLACEHOLDER.is_match(&current) {
                return Ok(coerce(current));
            }
            let mut expanded = String::with_capacity(current.len());
            let mut last = 0;
            for caps in PLACEHOLDER.captures_iter(&current) {
                let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
                let name = &caps[1];
                self.check_allowed(name)?;
                let value = match env::var(name) {
                    Ok(value) => value,
                    Err(_) => caps
                        .get(2)
                        .map(|default| default.as_str().to_string())
                        .ok_or_else(|| EnvResolverError::VarNotFound(name.to_string()))?,
                };
                expanded.push_str(&current[last..whole.start]);
                expanded.push_str(&value);
                last = whole.end;
            }
            expanded.push_str(&current[last..]);
            current = expanded;
        }

        if PLACEHOLDER.is_match(&current) {
            return Err(EnvResolverError::RecursiveReference(input.to_string()));
        }
        Ok(coerce(current))
    }

    fn check_allowed(&self, name: &str) -> Result<(), EnvResolverError> {
        if self.allowed_prefixes.is_empty()
            || self
                .allowed_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
        {
            return Ok(());
        }
        Err(EnvResolverError::VarNotWhitelisted(
            name.to_string(),
            self.allowed_prefixes.clone(),
        ))
    }
}

/// Expanded scalars keep their natural type so `"${TETHER_PORT}"` can feed a number field.
fn coerce(value: String) -> JsonValue {
    if let Ok(flag) = value.parse::<bool>() {
        return JsonValue::Bool(flag);
    }
    if let Ok(int) = value.parse::<u64>() {
        return JsonValue::from(int);
    }
    if let Ok(int) = value.parse::<i64>() {
        return JsonValue::from(int);
    }
    JsonValue::String(value)
}
