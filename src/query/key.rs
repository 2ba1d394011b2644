//! Query Key Module
//!
//! Deterministic cache keys for structured queries.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Namespace tag on every query cache key
pub const QUERY_KEY_PREFIX: &str = "query:";

// == Query ==
/// A query whose result can be cached.
///
/// Only these two read-only accessors are required.
pub trait Query {
    /// SQL text of the query.
    fn sql(&self) -> &str;

    /// Parameter bindings by name.
    fn bindings(&self) -> HashMap<String, Value>;
}

// == Sql Query ==
/// Plain SQL text with named bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlQuery {
    sql: String,
    bindings: HashMap<String, Value>,
}

impl SqlQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: HashMap::new(),
        }
    }

    /// Adds (or replaces) a named binding.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }
}

impl Query for SqlQuery {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bindings(&self) -> HashMap<String, Value> {
        self.bindings.clone()
    }
}

// == Key Derivation ==
/// Derives the cache key for `query`.
///
/// `query:` followed by the hex SHA-256 of the SQL (length-prefixed) and the
/// bindings serialized as a JSON object in name order. Binding order never
/// affects the key; any change to the SQL or to a bound value does.
pub fn query_key<Q: Query + ?Sized>(query: &Q) -> String {
    let sql = query.sql();
    let bindings = canonical(Value::Object(query.bindings().into_iter().collect()));

    let mut hasher = Sha256::new();
    hasher.update((sql.len() as u64).to_be_bytes());
    hasher.update(sql.as_bytes());
    hasher.update(bindings.to_string().as_bytes());

    format!("{}{}", QUERY_KEY_PREFIX, hex::encode(hasher.finalize()))
}

/// Rebuilds every object, at any depth, with its keys in sorted order.
fn canonical(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, canonical(v))).collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical).collect()),
        other => other,
    }
}
