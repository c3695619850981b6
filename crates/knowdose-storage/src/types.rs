//! Storage types for the document storage abstraction layer.
//!
//! This module defines the paths, queries and documents used by the storage traits.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageError;

/// Path of a collection: `name` or `parent/{id}/name`, alternating
/// collection and document segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl CollectionPath {
    /// A top-level collection.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Parses a slash separated path with an odd number of non-empty segments.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPath` for empty segments or an even segment count.
    pub fn parse(path: &str) -> Result<Self, StorageError> {
        let segments: Vec<String> = path.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) || segments.len() % 2 == 0 {
            return Err(StorageError::invalid_path(path));
        }
        Ok(Self { segments })
    }

    /// A sub-collection of the document `id` in this collection.
    #[must_use]
    pub fn child(&self, id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id.into());
        segments.push(name.into());
        Self { segments }
    }

    /// The document `id` in this collection.
    #[must_use]
    pub fn doc(&self, id: impl Into<String>) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    /// The last segment, i.e. the collection id.
    #[must_use]
    pub fn collection_id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The path of the document owning this collection, if nested.
    #[must_use]
    pub fn parent_path(&self) -> Option<String> {
        let n = self.segments.len();
        (n > 1).then(|| self.segments[..n - 1].join("/"))
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Path of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document as returned by a storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// The document id (last path segment).
    pub id: String,
    /// The document fields.
    pub data: Map<String, Value>,
}

impl StoredDocument {
    #[must_use]
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Reads a field of the document.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Flattens into the API shape `{ "id": ..., ...fields }`.
    #[must_use]
    pub fn into_json(self) -> Value {
        let mut out = Map::with_capacity(self.data.len() + 1);
        out.insert("id".to_string(), Value::String(self.id));
        out.extend(self.data);
        Value::Object(out)
    }
}

/// Sort direction for [`OrderBy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Sort clause of a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Equality filter of a [`Query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

/// A collection query: conjunction of equality filters plus an optional sort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// Creates an unfiltered query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Returns true when `data` satisfies every filter.
    #[must_use]
    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        self.filters
            .iter()
            .all(|f| data.get(&f.field) == Some(&f.value))
    }
}
