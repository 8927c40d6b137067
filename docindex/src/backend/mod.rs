//! Storage backends
//!
//! A backend stores documents under a derived [`Schema`] and answers
//! [`CompiledQuery`]s. Everything a backend can and cannot do is static
//! data reachable through its [`BackendKind`]: supported column kinds,
//! vector metrics and algorithms, fragment composability and accepted
//! query shapes.

pub mod redis;

use serde::{Deserialize, Serialize};

use crate::columnar::ColumnStore;
use crate::error::Result;
use crate::executor::{CompiledQuery, RawResult};
use crate::introspect::{
    BackendCapabilities, ColumnDefaults, ColumnKind, KindClass, Schema, PRECEDENCE,
};
use crate::query::{ComposabilityMatrix, FragmentKind};
use crate::schema::FieldKind;

/// Known backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Redis,
}

impl BackendKind {
    pub fn capabilities(self) -> &'static BackendCapabilities {
        match self {
            Self::Redis => &redis::REDIS_CAPABILITIES,
        }
    }

    pub fn composability(self) -> &'static ComposabilityMatrix {
        match self {
            Self::Redis => &redis::REDIS_COMPOSABILITY,
        }
    }

    /// Fragment kind multisets (sorted) the backend can execute
    pub fn query_shapes(self) -> &'static [&'static [FragmentKind]] {
        match self {
            Self::Redis => redis::REDIS_QUERY_SHAPES,
        }
    }
}

/// Operations every backend adapter provides
pub trait IndexBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Column defaults from the backend's static configuration
    fn default_column_config(&self) -> ColumnDefaults;

    /// Create the backend index for `schema`; returns `false` if it already
    /// existed and was left untouched
    fn create_index(&self, schema: &Schema) -> Result<bool>;

    fn exists(&self) -> Result<bool>;

    /// Write every row of `store`; returns the ids written, in row order
    fn insert(&self, schema: &Schema, store: &ColumnStore) -> Result<Vec<String>>;

    /// Delete the documents that exist; returns how many were removed
    fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Stored bodies of the documents that exist
    fn get(&self, ids: &[String]) -> Result<Vec<serde_json::Value>>;

    fn num_docs(&self) -> Result<usize>;

    fn execute(&self, schema: &Schema, query: &CompiledQuery) -> Result<RawResult>;

    /// Backend column kind that stores a field of `kind`, if any
    fn column_kind_for(&self, kind: &FieldKind) -> Option<ColumnKind> {
        let caps = self.kind().capabilities();
        PRECEDENCE
            .iter()
            .find(|class: &&KindClass| class.matches(kind))
            .and_then(|class| caps.column_for(*class))
    }
}
