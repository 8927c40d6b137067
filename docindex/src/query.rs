//! Backend-agnostic query fragments and the query builder
//!
//! A builder accumulates [`QueryFragment`]s in call order. Whether a
//! fragment kind may be repeated, used once or not at all is a property of
//! the backend and lives in a static [`ComposabilityMatrix`]; violations are
//! recorded while building and reported by [`QueryBuilder::build`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ComposabilityError;

/// Kinds of query fragment, declared in limit precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Find,
    Filter,
    TextSearch,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Find => write!(f, "find"),
            Self::Filter => write!(f, "filter"),
            Self::TextSearch => write!(f, "text_search"),
        }
    }
}

/// One typed step of a composite query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryFragment {
    /// Vector similarity search against a vector column
    Find {
        query: Vec<f32>,
        field: String,
        limit: Option<usize>,
    },
    /// Backend-native filter predicate
    Filter {
        predicate: String,
        limit: Option<usize>,
    },
    /// Full-text search against a text column
    TextSearch {
        query: String,
        field: String,
        limit: Option<usize>,
    },
}

impl QueryFragment {
    pub fn kind(&self) -> FragmentKind {
        match self {
            Self::Find { .. } => FragmentKind::Find,
            Self::Filter { .. } => FragmentKind::Filter,
            Self::TextSearch { .. } => FragmentKind::TextSearch,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::Find { limit, .. } | Self::Filter { limit, .. } | Self::TextSearch { limit, .. } => {
                *limit
            }
        }
    }
}

/// How often a fragment kind may appear in one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composability {
    Repeatable,
    Once,
    Never,
}

/// Per-backend composability rules, as static data
#[derive(Debug)]
pub struct ComposabilityMatrix {
    pub backend: &'static str,
    pub find: Composability,
    pub filter: Composability,
    pub text_search: Composability,
}

impl ComposabilityMatrix {
    pub fn rule(&self, kind: FragmentKind) -> Composability {
        match kind {
            FragmentKind::Find => self.find,
            FragmentKind::Filter => self.filter,
            FragmentKind::TextSearch => self.text_search,
        }
    }
}

/// Append-only builder for composite queries
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    matrix: &'static ComposabilityMatrix,
    fragments: Vec<QueryFragment>,
    error: Option<ComposabilityError>,
}

impl QueryBuilder {
    pub fn new(matrix: &'static ComposabilityMatrix) -> Self {
        Self {
            matrix,
            fragments: Vec::new(),
            error: None,
        }
    }

    /// Add a vector similarity step
    pub fn find(
        self,
        query: impl Into<Vec<f32>>,
        field: impl Into<String>,
        limit: impl Into<Option<usize>>,
    ) -> Self {
        self.push(QueryFragment::Find {
            query: query.into(),
            field: field.into(),
            limit: limit.into(),
        })
    }

    /// Add a filter step
    pub fn filter(self, predicate: impl Into<String>, limit: impl Into<Option<usize>>) -> Self {
        self.push(QueryFragment::Filter {
            predicate: predicate.into(),
            limit: limit.into(),
        })
    }

    /// Add a full-text step
    pub fn text_search(
        self,
        query: impl Into<String>,
        field: impl Into<String>,
        limit: impl Into<Option<usize>>,
    ) -> Self {
        self.push(QueryFragment::TextSearch {
            query: query.into(),
            field: field.into(),
            limit: limit.into(),
        })
    }

    fn push(mut self, fragment: QueryFragment) -> Self {
        if self.error.is_none() {
            let kind = fragment.kind();
            let allowed = match self.matrix.rule(kind) {
                Composability::Repeatable => true,
                Composability::Once => !self.fragments.iter().any(|f| f.kind() == kind),
                Composability::Never => false,
            };
            if !allowed {
                log::debug!(
                    "Rejecting {} fragment on the {} backend",
                    kind,
                    self.matrix.backend
                );
                self.error = Some(ComposabilityError::NotComposable {
                    kind: kind.to_string(),
                    backend: self.matrix.backend.to_string(),
                });
            }
        }
        self.fragments.push(fragment);
        self
    }

    /// Fragments appended so far, in call order
    pub fn fragments(&self) -> &[QueryFragment] {
        &self.fragments
    }

    /// Finish the query, reporting the first composability violation
    pub fn build(self) -> Result<Vec<QueryFragment>, ComposabilityError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.fragments),
        }
    }
}
