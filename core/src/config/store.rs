//! config/store.rs
//! Thread-safe string key/value store fed from command-line style pairs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use crate::config::ConfigError;

/// Explicit configuration store. One instance is built at start-up and
/// passed to whatever needs it.
#[derive(Debug, Default)]
pub struct Configuration {
    values: RwLock<BTreeMap<String, String>>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the one it replaced.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.clone(),
                    expected: "an integer",
                })
            })
            .transpose()
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.get(key)
            .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.clone(),
                    expected: "a boolean",
                }),
            })
            .transpose()
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.is_empty()).map(PathBuf::from)
    }

    /// Parse one `-key=value`, `--key:value` or bare `-flag` argument.
    ///
    /// Leading dashes are skipped; the first `=` or `:` splits key from
    /// value; a bare key stores `"true"`.
    pub fn put_command_line(&self, arg: &str) -> Result<(), ConfigError> {
        let body = arg.trim_start_matches('-');
        let (key, value) = match body.find(['=', ':']) {
            Some(at) => (&body[..at], &body[at + 1..]),
            None => (body, "true"),
        };
        if key.is_empty() {
            return Err(ConfigError::EmptyKey(arg.to_string()));
        }
        self.put(key, value);
        Ok(())
    }
}
