//! The command surface the Redis adapter needs
//!
//! [`SearchTransport`] mirrors the RediSearch and RedisJSON commands used by
//! the adapter (`FT.INFO`, `FT.CREATE`, `FT.SEARCH`, `JSON.SET`, `JSON.GET`,
//! `EXISTS`, `DEL`). Errors are reported as [`TransportError`] and surfaced
//! by the adapter unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Field type of an `FT.CREATE` schema entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum FieldType {
    Text,
    Numeric,
    Vector {
        algorithm: String,
        /// Attribute pairs in command order, e.g. `("DIM", "4")`
        attributes: Vec<(String, String)>,
    },
}

/// One `FT.CREATE` schema entry: `<path> AS <alias> <type> ...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// JSON path, e.g. `$.address.city`
    pub path: String,
    pub alias: String,
    pub field_type: FieldType,
}

impl FieldSpec {
    /// Value of a vector attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match &self.field_type {
            FieldType::Vector { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// JSON path split into object keys
    pub fn path_segments(&self) -> Vec<String> {
        self.path
            .trim_start_matches('$')
            .split('.')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

/// `FT.INFO` reply, reduced to what the adapter reads
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub prefix: String,
    pub num_docs: usize,
    pub fields: Vec<FieldSpec>,
}

/// An `FT.SEARCH` request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchQuery {
    pub query: String,
    pub sort_by: Option<String>,
    /// `LIMIT offset num`
    pub offset: usize,
    pub num: usize,
    pub dialect: u32,
    pub scorer: Option<String>,
    pub with_scores: bool,
    /// `PARAMS` blobs, e.g. the packed query vector
    pub params: HashMap<String, Vec<u8>>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            num: 10,
            dialect: 1,
            ..Self::default()
        }
    }

    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort_by = Some(field.into());
        self
    }

    pub fn paging(mut self, offset: usize, num: usize) -> Self {
        self.offset = offset;
        self.num = num;
        self
    }

    pub fn dialect(mut self, dialect: u32) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn scorer(mut self, scorer: impl Into<String>) -> Self {
        self.scorer = Some(scorer.into());
        self
    }

    pub fn with_scores(mut self) -> Self {
        self.with_scores = true;
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: Vec<u8>) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}

/// One document of an `FT.SEARCH` reply
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Full key, including the index prefix
    pub key: String,
    /// Stored JSON body
    pub json: serde_json::Value,
    /// Relevance score, present when the query asked `WITHSCORES`
    pub score: Option<f64>,
    /// Extra returned fields as the server reports them (strings), e.g.
    /// the KNN `vector_score`
    pub fields: HashMap<String, String>,
}

/// `FT.SEARCH` reply
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchReply {
    pub total: usize,
    pub docs: Vec<SearchHit>,
}

/// RediSearch/RedisJSON commands used by the adapter
pub trait SearchTransport: Send + Sync {
    /// `FT.INFO`; an unknown index is [`TransportError::UnknownIndex`]
    fn ft_info(&self, index: &str) -> Result<IndexInfo, TransportError>;

    /// `FT.CREATE <index> ON JSON PREFIX 1 <prefix> SCHEMA ...`
    fn ft_create(&self, index: &str, prefix: &str, fields: &[FieldSpec])
        -> Result<(), TransportError>;

    /// `FT.SEARCH`
    fn ft_search(&self, index: &str, query: &SearchQuery) -> Result<SearchReply, TransportError>;

    /// `JSON.SET <key> <path> <value>`
    fn json_set(&self, key: &str, path: &str, value: &serde_json::Value)
        -> Result<(), TransportError>;

    /// `JSON.GET <key>`; `None` if the key does not exist
    fn json_get(&self, key: &str) -> Result<Option<serde_json::Value>, TransportError>;

    /// `EXISTS <key>`
    fn exists(&self, key: &str) -> Result<bool, TransportError>;

    /// `DEL <key> ...`; returns how many keys were removed
    fn delete(&self, keys: &[String]) -> Result<usize, TransportError>;
}

impl<T: SearchTransport + ?Sized> SearchTransport for std::sync::Arc<T> {
    fn ft_info(&self, index: &str) -> Result<IndexInfo, TransportError> {
        (**self).ft_info(index)
    }

    fn ft_create(
        &self,
        index: &str,
        prefix: &str,
        fields: &[FieldSpec],
    ) -> Result<(), TransportError> {
        (**self).ft_create(index, prefix, fields)
    }

    fn ft_search(&self, index: &str, query: &SearchQuery) -> Result<SearchReply, TransportError> {
        (**self).ft_search(index, query)
    }

    fn json_set(
        &self,
        key: &str,
        path: &str,
        value: &serde_json::Value,
    ) -> Result<(), TransportError> {
        (**self).json_set(key, path, value)
    }

    fn json_get(&self, key: &str) -> Result<Option<serde_json::Value>, TransportError> {
        (**self).json_get(key)
    }

    fn exists(&self, key: &str) -> Result<bool, TransportError> {
        (**self).exists(key)
    }

    fn delete(&self, keys: &[String]) -> Result<usize, TransportError> {
        (**self).delete(keys)
    }
}
