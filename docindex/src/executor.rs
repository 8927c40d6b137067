//! Query compilation and result decoding
//!
//! Built fragments are grouped by kind and checked against the backend's
//! accepted query shapes. The effective limit is the first explicit limit
//! found in precedence order (find, then filter, then text search) and
//! falls back to [`DEFAULT_LIMIT`]. The result is a single
//! [`CompiledQuery`] that a backend turns into one native request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::document::Document;
use crate::error::{ComposabilityError, Result};
use crate::introspect::Schema;
use crate::query::{FragmentKind, QueryFragment};
use crate::schema::DocumentType;

/// Limit used when no fragment sets one
pub const DEFAULT_LIMIT: usize = 10;

/// One executable backend request
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledQuery {
    /// KNN search, optionally pre-filtered by a native predicate
    Hybrid {
        vector: Vec<f32>,
        field: String,
        filter: Option<String>,
        limit: usize,
    },
    Filter {
        predicate: String,
        limit: usize,
    },
    Text {
        query: String,
        field: String,
        limit: usize,
    },
}

impl CompiledQuery {
    pub fn limit(&self) -> usize {
        match self {
            Self::Hybrid { limit, .. } | Self::Filter { limit, .. } | Self::Text { limit, .. } => {
                *limit
            }
        }
    }
}

/// How scores in a [`SearchResult`] are to be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOrder {
    /// Scores are distances: lower is a better match. This holds for every
    /// metric: L2 is the squared distance, COSINE is `1 - cos` and IP is
    /// `1 - dot`, so an inner product must be recovered as `1 - score`.
    Ascending,
    /// Scores are relevance: higher is a better match
    Descending,
    /// Results carry no ranking; every score is `0.0`
    Unranked,
}

/// Ranked documents and their scores, index-aligned.
///
/// Scores are reported as the backend computes them; see [`ScoreOrder`]
/// for how to read them.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub documents: Vec<Document>,
    pub scores: Vec<f64>,
    pub order: ScoreOrder,
}

impl SearchResult {
    pub fn new(documents: Vec<Document>, scores: Vec<f64>, order: ScoreOrder) -> Self {
        debug_assert_eq!(documents.len(), scores.len());
        Self {
            documents,
            scores,
            order,
        }
    }

    pub fn empty(order: ScoreOrder) -> Self {
        Self::new(Vec::new(), Vec::new(), order)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Ids of the matched documents, best match first
    pub fn ids(&self) -> Vec<&str> {
        self.documents.iter().map(Document::id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Document, f64)> {
        self.documents.iter().zip(self.scores.iter().copied())
    }
}

/// Undecoded rows returned by a backend
#[derive(Debug, Clone)]
pub struct RawResult {
    pub rows: Vec<serde_json::Value>,
    pub scores: Vec<f64>,
    pub order: ScoreOrder,
}

/// First explicit limit in precedence order, or [`DEFAULT_LIMIT`].
///
/// Only `None` counts as unset: an explicit `Some(0)` wins like any other
/// limit and yields an empty result.
pub fn resolve_limit(fragments: &[QueryFragment]) -> usize {
    let mut ordered: Vec<&QueryFragment> = fragments.iter().collect();
    // stable sort keeps call order within one kind
    ordered.sort_by_key(|f| f.kind());
    ordered
        .iter()
        .find_map(|f| f.limit())
        .unwrap_or(DEFAULT_LIMIT)
}

fn describe_shape(kinds: &[FragmentKind]) -> String {
    let names: Vec<String> = kinds.iter().map(ToString::to_string).collect();
    format!("[{}]", names.join(", "))
}

/// Check `fragments` against the accepted shapes and compile them
pub fn compile(
    fragments: &[QueryFragment],
    accepted: &[&[FragmentKind]],
) -> std::result::Result<CompiledQuery, ComposabilityError> {
    let mut observed: Vec<FragmentKind> = fragments.iter().map(QueryFragment::kind).collect();
    observed.sort();

    let unsupported = || ComposabilityError::UnsupportedQueryShape {
        expected: accepted
            .iter()
            .map(|shape| describe_shape(shape))
            .collect::<Vec<_>>()
            .join(" or "),
        observed: describe_shape(&observed),
    };

    if !accepted.iter().any(|shape| *shape == observed.as_slice()) {
        return Err(unsupported());
    }

    let limit = resolve_limit(fragments);
    let find = fragments.iter().find(|f| f.kind() == FragmentKind::Find);
    let filter = fragments.iter().find(|f| f.kind() == FragmentKind::Filter);
    let text = fragments.iter().find(|f| f.kind() == FragmentKind::TextSearch);

    let compiled = match (find, filter, text) {
        (Some(QueryFragment::Find { query, field, .. }), filter, None) => CompiledQuery::Hybrid {
            vector: query.clone(),
            field: field.clone(),
            filter: match filter {
                Some(QueryFragment::Filter { predicate, .. }) => Some(predicate.clone()),
                _ => None,
            },
            limit,
        },
        (None, Some(QueryFragment::Filter { predicate, .. }), None) => CompiledQuery::Filter {
            predicate: predicate.clone(),
            limit,
        },
        (None, None, Some(QueryFragment::TextSearch { query, field, .. })) => CompiledQuery::Text {
            query: query.clone(),
            field: field.clone(),
            limit,
        },
        _ => return Err(unsupported()),
    };
    log::debug!("Compiled {} fragments into {:?}", fragments.len(), compiled);
    Ok(compiled)
}

/// Turn raw backend rows into owned documents
pub fn decode(ty: &Arc<DocumentType>, schema: &Schema, raw: RawResult) -> Result<SearchResult> {
    let documents = raw
        .rows
        .iter()
        .map(|row| codec::decode_document(ty, schema, row))
        .collect::<Result<Vec<_>>>()?;
    Ok(SearchResult::new(documents, raw.scores, raw.order))
}
