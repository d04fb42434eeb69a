// Persisted breakpoint attributes
//
// The store is owned by whoever persists breakpoints (a marker database in an
// IDE); the core only reads and writes keys through this trait.

use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// Attribute keys
pub mod keys {
    pub const ENABLED: &str = "enabled";
    pub const EXPIRED: &str = "expired";
    pub const INSTALL_COUNT: &str = "installCount";
    pub const HIT_COUNT: &str = "hitCount";
    pub const TYPE_NAME: &str = "typeName";
    pub const METHOD_NAME: &str = "methodName";
    pub const METHOD_SIGNATURE: &str = "methodSignature";
    pub const ENTRY: &str = "entry";
    pub const EXIT: &str = "exit";
    pub const NATIVE: &str = "native";
    pub const LINE_NUMBER: &str = "lineNumber";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::Int(v as i64)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Str(v)
    }
}

pub trait AttributeStore: Send + Sync {
    /// Read one attribute, `Ok(None)` when it was never set
    fn get_attribute(&self, key: &str) -> Result<Option<AttributeValue>, PersistenceError>;

    fn set_attribute(&self, key: &str, value: AttributeValue) -> Result<(), PersistenceError>;

    /// Write several attributes as one change
    fn set_attributes(&self, entries: &[(&str, AttributeValue)]) -> Result<(), PersistenceError>;
}

/// In-memory attribute store with failure injection
#[derive(Debug, Default)]
pub struct MemoryAttributeStore {
    values: Mutex<BTreeMap<String, AttributeValue>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut map) = store.values.lock() {
            map.extend(values.into_iter().map(|(k, v)| (k.into(), v)));
        }
        store
    }

    /// Make every subsequent read fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> BTreeMap<String, AttributeValue> {
        self.values.lock().map(|m| m.clone()).unwrap_or_default()
    }

    fn poisoned(key: &str) -> PersistenceError {
        PersistenceError::new(key, "attribute map poisoned")
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn get_attribute(&self, key: &str) -> Result<Option<AttributeValue>, PersistenceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistenceError::new(key, "read failed"));
        }
        let values = self.values.lock().map_err(|_| Self::poisoned(key))?;
        Ok(values.get(key).cloned())
    }

    fn set_attribute(&self, key: &str, value: AttributeValue) -> Result<(), PersistenceError> {
        self.set_attributes(&[(key, value)])
    }

    fn set_attributes(&self, entries: &[(&str, AttributeValue)]) -> Result<(), PersistenceError> {
        let first = entries.first().map(|(k, _)| *k).unwrap_or_default();
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::new(first, "write failed"));
        }
        let mut values = self.values.lock().map_err(|_| Self::poisoned(first))?;
        for (key, value) in entries {
            values.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_attribute_is_none() {
        let store = MemoryAttributeStore::new();
        assert_eq!(store.get_attribute(keys::ENABLED).unwrap(), None);
    }

    #[test]
    fn test_set_attributes_applies_all() {
        let store = MemoryAttributeStore::new();
        store
            .set_attributes(&[(keys::EXPIRED, false.into()), (keys::ENABLED, true.into())])
            .unwrap();

        assert_eq!(store.get_attribute(keys::EXPIRED).unwrap(), Some(AttributeValue::Bool(false)));
        assert_eq!(store.get_attribute(keys::ENABLED).unwrap(), Some(AttributeValue::Bool(true)));
    }

    #[test]
    fn test_failure_injection() {
        let store = MemoryAttributeStore::with_values([(keys::HIT_COUNT, AttributeValue::Int(3))]);

        store.fail_reads(true);
        let err = store.get_attribute(keys::HIT_COUNT).unwrap_err();
        assert_eq!(err.key, keys::HIT_COUNT);

        store.fail_reads(false);
        store.fail_writes(true);
        assert!(store.set_attribute(keys::HIT_COUNT, 4u32.into()).is_err());
        assert_eq!(store.get_attribute(keys::HIT_COUNT).unwrap(), Some(AttributeValue::Int(3)));
    }

    #[test]
    fn test_values_serialize_untagged() {
        let store = MemoryAttributeStore::with_values([
            (keys::TYPE_NAME, AttributeValue::from("com.foo.*")),
            (keys::ENTRY, AttributeValue::from(true)),
        ]);

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        assert_eq!(json, r#"{"entry":true,"typeName":"com.foo.*"}"#);
    }
}
