//! Structured documents for schemaless Kubernetes objects
//!
//! Custom resources and the workloads generated for them are read as untyped
//! JSON. [`Document`] wraps such an object and exposes dotted-path lookups
//! (`"status.conditions"`, `"spec.redis.replicas"`) that return optional typed
//! values, so status resolution never has to cast `serde_json::Value` by hand.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Typed path lookups over a JSON value.
///
/// Paths are dot-separated object keys. A missing key, or a value of the wrong
/// type, yields `None`.
pub trait PathLookup {
    /// Value at `path`, if present
    fn lookup(&self, path: &str) -> Option<&Value>;

    /// String at `path`
    fn str_at(&self, path: &str) -> Option<&str> {
        self.lookup(path).and_then(Value::as_str)
    }

    /// String at `path`, treating `""` as absent
    fn non_empty_str_at(&self, path: &str) -> Option<&str> {
        self.str_at(path).filter(|s| !s.is_empty())
    }

    /// Integer at `path`. Integral floats are accepted since some encoders
    /// emit `3.0` for counts.
    fn i64_at(&self, path: &str) -> Option<i64> {
        let value = self.lookup(path)?;
        value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        })
    }

    /// Array at `path`
    fn list_at(&self, path: &str) -> Option<&[Value]> {
        self.lookup(path)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    /// Object at `path`
    fn map_at(&self, path: &str) -> Option<&Map<String, Value>> {
        self.lookup(path).and_then(Value::as_object)
    }
}

impl PathLookup for Value {
    fn lookup(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.')
            .try_fold(self, |current, key| current.as_object()?.get(key))
    }
}

/// A schemaless Kubernetes object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

impl Document {
    /// Wrap a JSON value
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Convert any serializable object (e.g. a `DynamicObject`) into a document
    pub fn from_object<T: Serialize>(object: &T) -> Result<Self> {
        serde_json::to_value(object)
            .map(Self)
            .map_err(|e| Error::malformed("object", e.to_string()))
    }

    /// Deserialize the document into a typed object
    pub fn to_object<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| Error::malformed(self.kind().unwrap_or("object"), e.to_string()))
    }

    /// `metadata.name`
    pub fn name(&self) -> Option<&str> {
        self.non_empty_str_at("metadata.name")
    }

    /// `metadata.namespace`
    pub fn namespace(&self) -> Option<&str> {
        self.non_empty_str_at("metadata.namespace")
    }

    /// `metadata.creationTimestamp` as an RFC 3339 string
    pub fn creation_timestamp(&self) -> Option<&str> {
        self.non_empty_str_at("metadata.creationTimestamp")
    }

    /// `kind`
    pub fn kind(&self) -> Option<&str> {
        self.non_empty_str_at("kind")
    }

    /// Store `value` at `path`, creating intermediate objects as needed.
    ///
    /// Fails if an intermediate segment exists but is not an object.
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        let mut segments = path.split('.').peekable();
        let mut current = &mut self.0;
        while let Some(key) = segments.next() {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            let map = current.as_object_mut().ok_or_else(|| {
                Error::malformed("document", format!("cannot set {path}: {key} has a parent that is not an object"))
            })?;
            if segments.peek().is_none() {
                map.insert(key.to_string(), value);
                return Ok(());
            }
            current = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        Err(Error::malformed("document", "empty path"))
    }
}

impl PathLookup for Document {
    fn lookup(&self, path: &str) -> Option<&Value> {
        self.0.lookup(path)
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A list of documents plus the collection's resource version
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentList {
    /// Resource version of the list, if the server returned one
    pub resource_version: Option<String>,
    /// Listed objects
    pub items: Vec<Document>,
}

impl DocumentList {
    /// Create a list from items and an optional resource version
    pub fn new(items: Vec<Document>, resource_version: Option<String>) -> Self {
        Self {
            resource_version,
            items,
        }
    }

    /// Resource version to start a watch from; `"0"` when the server gave none
    pub fn watch_version(&self) -> &str {
        match self.resource_version.as_deref() {
            Some(rv) if !rv.is_empty() => rv,
            _ => "0",
        }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
