//! Per-run context window.
//!
//! A key to JSON value store created empty at run start and owned by the
//! single worker executing that run. Inserts are last-write-wins and bounded
//! by [`ContextLimits`]; an insert that would exceed a bound is rejected.

use crate::{Error, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Size bounds for a context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    /// Maximum number of keys.
    pub max_entries: usize,
    /// Maximum sum of serialized value sizes in bytes.
    pub max_bytes: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            max_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ContextWindow {
    entries: BTreeMap<String, Entry>,
    total_bytes: usize,
    limits: ContextLimits,
}

impl ContextWindow {
    pub fn new(limits: ContextLimits) -> Self {
        Self {
            entries: BTreeMap::new(),
            total_bytes: 0,
            limits,
        }
    }

    pub fn limits(&self) -> ContextLimits {
        self.limits
    }

    /// Store a value under `key`, replacing any previous value.
    ///
    /// Returns the replaced value. The window is left untouched on error.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<Option<Value>> {
        let key = key.into();
        let size = serde_json::to_string(&value)?.len();
        let replaced_size = self.entries.get(&key).map(|e| e.size);

        if replaced_size.is_none() && self.entries.len() >= self.limits.max_entries {
            return Err(Error::ContextLimitExceeded(format!(
                "cannot add key '{}': window already holds {} entries",
                key, self.limits.max_entries
            )));
        }

        let projected = self.total_bytes - replaced_size.unwrap_or(0) + size;
        if projected > self.limits.max_bytes {
            return Err(Error::ContextLimitExceeded(format!(
                "key '{}' would grow the window to {} bytes (limit {})",
                key, projected, self.limits.max_bytes
            )));
        }

        self.total_bytes = projected;
        Ok(self
            .entries
            .insert(key, Entry { value, size })
            .map(|e| e.value))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), &e.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// The whole window as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect(),
        )
    }
}

impl Serialize for ContextWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, e) in &self.entries {
            map.serialize_entry(k, &e.value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_write_wins() {
        let mut ctx = ContextWindow::new(ContextLimits::default());
        assert!(ctx.insert("a", json!(1)).unwrap().is_none());
        assert_eq!(ctx.insert("a", json!(2)).unwrap(), Some(json!(1)));
        assert_eq!(ctx.get("a"), Some(&json!(2)));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_entry_limit_rejects_new_keys_only() {
        let mut ctx = ContextWindow::new(ContextLimits {
            max_entries: 1,
            max_bytes: 1024,
        });
        ctx.insert("a", json!("x")).unwrap();
        assert!(matches!(
            ctx.insert("b", json!("y")),
            Err(Error::ContextLimitExceeded(_))
        ));
        // Overwriting an existing key stays within the entry bound.
        ctx.insert("a", json!("z")).unwrap();
        assert!(!ctx.contains_key("b"));
    }

    #[test]
    fn test_byte_limit_is_net_of_replaced_value() {
        let mut ctx = ContextWindow::new(ContextLimits {
            max_entries: 10,
            max_bytes: 10,
        });
        ctx.insert("a", json!("12345678")).unwrap(); // 10 bytes with quotes
        assert_eq!(ctx.total_bytes(), 10);
        assert!(ctx.insert("b", json!(1)).is_err());
        ctx.insert("a", json!(1)).unwrap();
        assert_eq!(ctx.total_bytes(), 1);
        assert_eq!(ctx.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut ctx = ContextWindow::default();
        ctx.insert("k", json!({"n": 1})).unwrap();
        let out = serde_json::to_value(&ctx).unwrap();
        assert_eq!(out, json!({"k": {"n": 1}}));
        assert_eq!(out, ctx.to_json());
    }
}
