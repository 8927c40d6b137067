//! Typed document index over a storage backend
//!
//! [`DocIndex`] ties a document type to an [`IndexBackend`]: it derives the
//! storage schema (failing fast on unsupported fields or invalid vector
//! settings), creates the backend index, stacks batches into columns for
//! insertion and decodes backend rows back into owned documents.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::IndexBackend;
use crate::columnar::ColumnStore;
use crate::document::Document;
use crate::error::{Result, SchemaError};
use crate::executor::{self, CompiledQuery, SearchResult, DEFAULT_LIMIT};
use crate::introspect::{derive, ColumnDefaults, ColumnDescriptor, ColumnKind, Schema};
use crate::query::{QueryBuilder, QueryFragment};
use crate::schema::DocumentType;

/// Settings that may change after the index is created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Column defaults layered over the backend's static defaults
    pub default_column_config: ColumnDefaults,
}

/// Document index for one document type
pub struct DocIndex<B: IndexBackend> {
    ty: Arc<DocumentType>,
    backend: B,
    schema: Schema,
    defaults: ColumnDefaults,
}

impl<B: IndexBackend> DocIndex<B> {
    /// Derive the schema of `ty` and create (or connect to) the backend index
    pub fn new(ty: &Arc<DocumentType>, backend: B) -> Result<Self> {
        let defaults = backend.default_column_config();
        let schema = derive(ty, backend.kind().capabilities(), &defaults)?;
        backend.create_index(&schema)?;
        log::info!(
            "{} index for {} has been initialized with {} columns",
            backend.kind().capabilities().name,
            ty.name(),
            schema.columns().len()
        );
        Ok(Self {
            ty: ty.clone(),
            backend,
            schema,
            defaults,
        })
    }

    pub fn doc_type(&self) -> &Arc<DocumentType> {
        &self.ty
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Apply runtime settings. The schema is re-derived and validated; an
    /// existing backend index keeps its columns.
    pub fn configure(&mut self, runtime: RuntimeConfig) -> Result<()> {
        let mut defaults = self.defaults.clone();
        for (kind, options) in runtime.default_column_config {
            let merged = match defaults.get(&kind) {
                Some(current) => options.merged_over(current),
                None => options,
            };
            defaults.insert(kind, merged);
        }
        self.schema = derive(&self.ty, self.backend.kind().capabilities(), &defaults)?;
        self.defaults = defaults;
        log::debug!("Runtime configuration applied to {} index", self.ty.name());
        Ok(())
    }

    pub fn exists(&self) -> Result<bool> {
        self.backend.exists()
    }

    /// Index a batch of owned documents
    pub fn index(&self, docs: &[Document]) -> Result<Vec<String>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let store = ColumnStore::from_documents(&self.ty, docs.to_vec())?;
        self.index_stacked(&store)
    }

    /// Index every row of a column store
    pub fn index_stacked(&self, store: &ColumnStore) -> Result<Vec<String>> {
        if store.doc_type().as_ref() != self.ty.as_ref() {
            return Err(SchemaError::InvalidValue {
                field: self.ty.name().to_string(),
                expected: format!("document<{}>", self.ty.name()),
                got: format!("document<{}>", store.doc_type().name()),
            }
            .into());
        }
        self.backend.insert(&self.schema, store)
    }

    pub fn num_docs(&self) -> Result<usize> {
        self.backend.num_docs()
    }

    /// Documents with the given ids; missing ids are skipped, and it is an
    /// error if none exist
    pub fn get<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Document>> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
        self.backend
            .get(&ids)?
            .iter()
            .map(|row| crate::codec::decode_document(&self.ty, &self.schema, row))
            .collect()
    }

    /// Delete the documents that exist; returns how many were removed
    pub fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<usize> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
        self.backend.delete(&ids)
    }

    fn column_of(&self, field: &str, kind: ColumnKind) -> Result<&ColumnDescriptor> {
        let column = self
            .schema
            .resolve(field)
            .ok_or_else(|| SchemaError::UnknownField {
                doc_type: self.ty.name().to_string(),
                field: field.to_string(),
            })?;
        if column.backend_type != kind {
            return Err(SchemaError::InvalidValue {
                field: field.to_string(),
                expected: format!("{} column", kind),
                got: format!("{} column", column.backend_type),
            }
            .into());
        }
        Ok(column)
    }

    fn check_vector(&self, field: &str, query: &[f32]) -> Result<String> {
        let column = self.column_of(field, ColumnKind::Vector)?;
        if let Some(dim) = column.dim {
            if query.len() != dim {
                return Err(SchemaError::InvalidValue {
                    field: field.to_string(),
                    expected: format!("vector[{}]", dim),
                    got: format!("vector[{}]", query.len()),
                }
                .into());
            }
        }
        Ok(column.name.clone())
    }

    fn run(&self, query: &CompiledQuery) -> Result<SearchResult> {
        let raw = self.backend.execute(&self.schema, query)?;
        executor::decode(&self.ty, &self.schema, raw)
    }

    /// Nearest neighbours of `query` in the vector column `field`
    pub fn find(
        &self,
        query: &[f32],
        field: &str,
        limit: impl Into<Option<usize>>,
    ) -> Result<SearchResult> {
        let field = self.check_vector(field, query)?;
        self.run(&CompiledQuery::Hybrid {
            vector: query.to_vec(),
            field,
            filter: None,
            limit: limit.into().unwrap_or(DEFAULT_LIMIT),
        })
    }

    /// Documents matching a backend-native predicate
    pub fn filter(&self, predicate: &str, limit: impl Into<Option<usize>>) -> Result<SearchResult> {
        self.run(&CompiledQuery::Filter {
            predicate: predicate.to_string(),
            limit: limit.into().unwrap_or(DEFAULT_LIMIT),
        })
    }

    /// Full-text search in the text column `field`
    pub fn text_search(
        &self,
        query: &str,
        field: &str,
        limit: impl Into<Option<usize>>,
    ) -> Result<SearchResult> {
        let field = self.column_of(field, ColumnKind::Text)?.name.clone();
        self.run(&CompiledQuery::Text {
            query: query.to_string(),
            field,
            limit: limit.into().unwrap_or(DEFAULT_LIMIT),
        })
    }

    pub fn find_batched(
        &self,
        queries: &[Vec<f32>],
        field: &str,
        limit: impl Into<Option<usize>>,
    ) -> Result<Vec<SearchResult>> {
        let limit = limit.into();
        queries
            .iter()
            .map(|query| self.find(query, field, limit))
            .collect()
    }

    pub fn filter_batched<S: AsRef<str>>(
        &self,
        predicates: &[S],
        limit: impl Into<Option<usize>>,
    ) -> Result<Vec<SearchResult>> {
        let limit = limit.into();
        predicates
            .iter()
            .map(|predicate| self.filter(predicate.as_ref(), limit))
            .collect()
    }

    pub fn text_search_batched<S: AsRef<str>>(
        &self,
        queries: &[S],
        field: &str,
        limit: impl Into<Option<usize>>,
    ) -> Result<Vec<SearchResult>> {
        let limit = limit.into();
        queries
            .iter()
            .map(|query| self.text_search(query.as_ref(), field, limit))
            .collect()
    }

    /// Builder checked against this backend's composability rules
    pub fn build_query(&self) -> QueryBuilder {
        QueryBuilder::new(self.backend.kind().composability())
    }

    /// Compile built fragments into one backend request and run it
    pub fn execute_query(&self, fragments: &[QueryFragment]) -> Result<SearchResult> {
        let kind = self.backend.kind();
        let compiled = executor::compile(fragments, kind.query_shapes())?;
        let compiled = match compiled {
            CompiledQuery::Hybrid {
                vector,
                field,
                filter,
                limit,
            } => CompiledQuery::Hybrid {
                field: self.check_vector(&field, &vector)?,
                vector,
                filter,
                limit,
            },
            CompiledQuery::Text {
                query,
                field,
                limit,
            } => CompiledQuery::Text {
                field: self.column_of(&field, ColumnKind::Text)?.name.clone(),
                query,
                limit,
            },
            other => other,
        };
        self.run(&compiled)
    }
}
