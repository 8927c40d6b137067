//! In-process implementation of [`SearchTransport`]
//!
//! Keeps JSON documents in a [`DashMap`] keyspace and evaluates the subset
//! of the RediSearch query language the adapter emits:
//!
//! - `*` matches every document of the index
//! - `@num:[lo hi]` numeric ranges, `(` marks an exclusive bound and
//!   `-inf`/`+inf` are accepted
//! - `@text:a|b` or `@text:(a|b)` term alternatives, `hel*` prefix terms
//! - bare terms match any text field
//! - `-clause` negates, whitespace between clauses is AND
//! - `<filter>=>[KNN k @vec $param AS alias]` KNN over the filtered set
//!
//! FLAT vector fields are searched exhaustively, HNSW fields through an
//! `instant-distance` graph built over the filtered candidates. Text
//! queries with `WITHSCORES` are ranked by the requested scorer.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

use dashmap::DashMap;
use instant_distance::{Builder, HnswMap, Point, Search};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value as Json;

use crate::error::TransportError;

use super::native::vector_from_bytes;
use super::transport::{
    FieldSpec, FieldType, IndexInfo, SearchHit, SearchQuery, SearchReply, SearchTransport,
};

const KNN_PATTERN: &str = r"^(?s)(?P<filter>.*?)\s*=>\s*\[KNN\s+(?P<k>\d+)\s+@(?P<field>\w+)\s+\$(?P<param>\w+)(?:\s+AS\s+(?P<alias>\w+))?\s*\]\s*$";

const DEFAULT_EF_CONSTRUCTION: usize = 200;
const DEFAULT_EF_RUNTIME: usize = 10;

#[derive(Debug, Clone)]
struct IndexState {
    prefix: String,
    fields: Vec<FieldSpec>,
}

impl IndexState {
    fn field(&self, alias: &str) -> Result<&FieldSpec, TransportError> {
        self.fields
            .iter()
            .find(|f| f.alias == alias)
            .ok_or_else(|| TransportError::Syntax(format!("Unknown field '{}'", alias)))
    }

    fn text_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields
            .iter()
            .filter(|f| f.field_type == FieldType::Text)
    }
}

#[derive(Debug)]
struct StoredDoc {
    seq: u64,
    body: Json,
}

/// Vector distance as reported in `vector_score`
#[derive(Debug, Clone, Copy, PartialEq)]
enum Metric {
    /// Squared euclidean distance
    L2,
    /// `1 - dot(a, b)`
    Ip,
    /// `1 - cos(a, b)`
    Cosine,
}

impl Metric {
    fn parse(raw: &str) -> Result<Self, TransportError> {
        match raw {
            "L2" => Ok(Self::L2),
            "IP" => Ok(Self::Ip),
            "COSINE" => Ok(Self::Cosine),
            other => Err(TransportError::Command(format!(
                "Bad arguments for vector similarity: unknown distance metric '{}'",
                other
            ))),
        }
    }

    fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Ip => 1.0 - dot(a, b),
            Self::Cosine => {
                let norm_a = dot(a, a).sqrt();
                let norm_b = dot(b, b).sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot(a, b) / (norm_a * norm_b)
                }
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Clone)]
struct MetricPoint {
    vector: Vec<f32>,
    metric: Metric,
}

impl Point for MetricPoint {
    fn distance(&self, other: &Self) -> f32 {
        self.metric.distance(&self.vector, &other.vector)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bound {
    value: f64,
    exclusive: bool,
}

impl Bound {
    fn parse(raw: &str) -> Result<Self, TransportError> {
        let (exclusive, raw) = match raw.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let value = match raw.to_ascii_lowercase().as_str() {
            "-inf" => f64::NEG_INFINITY,
            "inf" | "+inf" => f64::INFINITY,
            other => other
                .parse()
                .map_err(|_| TransportError::Syntax(format!("Bad numeric bound '{}'", raw)))?,
        };
        Ok(Self { value, exclusive })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    All,
    Range { field: String, lo: Bound, hi: Bound },
    Terms { field: Option<String>, terms: Vec<String> },
    Not(Box<Clause>),
}

/// Split on whitespace outside brackets, braces and parentheses
fn split_clauses(query: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut depth = 0i32;
    let mut start = None;
    for (i, c) in query.char_indices() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth -= 1,
            _ => {}
        }
        if c.is_whitespace() && depth <= 0 {
            if let Some(s) = start.take() {
                clauses.push(&query[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        clauses.push(&query[s..]);
    }
    clauses
}

fn parse_terms(raw: &str) -> Vec<String> {
    raw.trim_start_matches(['(', '{'])
        .trim_end_matches([')', '}'])
        .split('|')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

impl Clause {
    fn parse(raw: &str, state: &IndexState) -> Result<Self, TransportError> {
        if raw == "*" {
            return Ok(Self::All);
        }
        if let Some(rest) = raw.strip_prefix('-') {
            return Ok(Self::Not(Box::new(Self::parse(rest, state)?)));
        }
        let Some(rest) = raw.strip_prefix('@') else {
            return Ok(Self::Terms {
                field: None,
                terms: parse_terms(raw),
            });
        };

        let (field, body) = rest
            .split_once(':')
            .ok_or_else(|| TransportError::Syntax(format!("Syntax error near '{}'", raw)))?;
        let spec = state.field(field)?;

        if let Some(range) = body.strip_prefix('[') {
            if spec.field_type != FieldType::Numeric {
                return Err(TransportError::Syntax(format!(
                    "Field '{}' is not numeric",
                    field
                )));
            }
            let bounds: Vec<&str> = range.trim_end_matches(']').split_whitespace().collect();
            let [lo, hi] = bounds.as_slice() else {
                return Err(TransportError::Syntax(format!(
                    "Bad numeric range '{}'",
                    body
                )));
            };
            return Ok(Self::Range {
                field: field.to_string(),
                lo: Bound::parse(lo)?,
                hi: Bound::parse(hi)?,
            });
        }

        if spec.field_type != FieldType::Text {
            return Err(TransportError::Syntax(format!(
                "Field '{}' is not a text field",
                field
            )));
        }
        Ok(Self::Terms {
            field: Some(field.to_string()),
            terms: parse_terms(body),
        })
    }

    fn matches(&self, state: &IndexState, body: &Json) -> bool {
        match self {
            Self::All => true,
            Self::Not(inner) => !inner.matches(state, body),
            Self::Range { field, lo, hi } => {
                let Ok(spec) = state.field(field) else {
                    return false;
                };
                let Some(value) = numeric_at(body, spec) else {
                    return false;
                };
                let above = if lo.exclusive { value > lo.value } else { value >= lo.value };
                let below = if hi.exclusive { value < hi.value } else { value <= hi.value };
                above && below
            }
            Self::Terms { field, terms } => {
                let tokens = match field {
                    Some(field) => match state.field(field) {
                        Ok(spec) => text_at(body, spec).map(tokenize).unwrap_or_default(),
                        Err(_) => Vec::new(),
                    },
                    None => state
                        .text_fields()
                        .filter_map(|spec| text_at(body, spec))
                        .flat_map(tokenize)
                        .collect(),
                };
                terms.iter().any(|term| tokens.iter().any(|t| term_matches(term, t)))
            }
        }
    }

    /// Terms of the clause that contribute to text scores
    fn scoring_terms(&self) -> Vec<(Option<&str>, &str)> {
        match self {
            Self::Terms { field, terms } => terms
                .iter()
                .map(|t| (field.as_deref(), t.as_str()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn term_matches(term: &str, token: &str) -> bool {
    match term.strip_suffix('*') {
        Some(prefix) => token.starts_with(prefix),
        None => term == token,
    }
}

fn value_at<'a>(body: &'a Json, spec: &FieldSpec) -> Option<&'a Json> {
    spec.path_segments()
        .iter()
        .try_fold(body, |node, part| node.get(part))
}

fn numeric_at(body: &Json, spec: &FieldSpec) -> Option<f64> {
    let value = value_at(body, spec)?;
    value.as_f64().or_else(|| value.as_bool().map(|b| b as i64 as f64))
}

fn text_at<'a>(body: &'a Json, spec: &FieldSpec) -> Option<&'a str> {
    value_at(body, spec)?.as_str()
}

fn vector_at(body: &Json, spec: &FieldSpec) -> Option<Vec<f32>> {
    value_at(body, spec)?
        .as_array()?
        .iter()
        .map(|x| x.as_f64().map(|f| f as f32))
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

struct KnnRequest {
    k: usize,
    field: String,
    param: String,
    alias: String,
}

/// Corpus statistics over the text fields a query scores against
struct TextStats {
    num_docs: usize,
    avg_len: f64,
    doc_freq: HashMap<String, usize>,
}

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

impl TextStats {
    fn build<'a>(docs: impl Iterator<Item = &'a Vec<String>>, terms: &[&str]) -> Self {
        let mut num_docs = 0;
        let mut total_len = 0usize;
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in docs {
            num_docs += 1;
            total_len += tokens.len();
            for term in terms {
                if tokens.iter().any(|t| term_matches(term, t)) {
                    *doc_freq.entry(term.to_string()).or_insert(0) += 1;
                }
            }
        }
        let avg_len = if num_docs > 0 {
            total_len as f64 / num_docs as f64
        } else {
            0.0
        };
        Self {
            num_docs,
            avg_len,
            doc_freq,
        }
    }

    fn bm25_idf(&self, term: &str) -> f64 {
        let n = self.num_docs as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn tfidf_idf(&self, term: &str) -> f64 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0).max(1) as f64;
        (1.0 + self.num_docs as f64 / df).ln()
    }

    fn score(&self, scorer: &str, terms: &[&str], tokens: &[String]) -> Result<f64, TransportError> {
        let tf = |term: &str| tokens.iter().filter(|t| term_matches(term, t)).count() as f64;
        let doc_len = tokens.len() as f64;
        let score = match scorer {
            "BM25" => {
                let norm = if self.avg_len > 0.0 { doc_len / self.avg_len } else { 1.0 };
                terms
                    .iter()
                    .map(|&term| {
                        let freq = tf(term);
                        self.bm25_idf(term) * freq * (BM25_K1 + 1.0)
                            / (freq + BM25_K1 * (1.0 - BM25_B + BM25_B * norm))
                    })
                    .sum()
            }
            "TFIDF" => terms.iter().map(|&term| tf(term) * self.tfidf_idf(term)).sum(),
            "TFIDF.DOCNORM" => {
                let raw: f64 = terms.iter().map(|&term| tf(term) * self.tfidf_idf(term)).sum();
                if doc_len > 0.0 {
                    raw / doc_len
                } else {
                    0.0
                }
            }
            "DISMAX" => terms.iter().map(|&term| tf(term)).sum(),
            "DOCSCORE" => 1.0,
            // documents carry no binary payloads to compare
            "HAMMING" => 0.0,
            other => {
                return Err(TransportError::Command(format!(
                    "Could not find the requested scorer '{}'",
                    other
                )))
            }
        };
        Ok(score)
    }
}

/// In-memory keyspace with RediSearch-style indexes
pub struct MemoryTransport {
    indexes: RwLock<HashMap<String, IndexState>>,
    keys: DashMap<String, StoredDoc>,
    sequence: AtomicU64,
    available: AtomicBool,
    calls: AtomicUsize,
    knn_pattern: Regex,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
            keys: DashMap::new(),
            sequence: AtomicU64::new(0),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            knn_pattern: Regex::new(KNN_PATTERN).expect("KNN pattern is valid"),
        }
    }

    /// Simulate the server going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    /// Number of commands received so far
    pub fn call_count(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Number of keys in the keyspace
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn enter(&self, command: &str) -> Result<(), TransportError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        if !self.available.load(AtomicOrdering::SeqCst) {
            return Err(TransportError::Connection(format!(
                "{}: connection refused",
                command
            )));
        }
        Ok(())
    }

    fn index_state(&self, index: &str) -> Result<IndexState, TransportError> {
        self.indexes
            .read()
            .get(index)
            .cloned()
            .ok_or_else(|| TransportError::UnknownIndex(index.to_string()))
    }

    fn validate_fields(fields: &[FieldSpec]) -> Result<(), TransportError> {
        for field in fields {
            if let FieldType::Vector { algorithm, .. } = &field.field_type {
                if algorithm != "FLAT" && algorithm != "HNSW" {
                    return Err(TransportError::Command(format!(
                        "Bad arguments for vector similarity: unknown algorithm '{}'",
                        algorithm
                    )));
                }
                let dim_ok = field
                    .attribute("DIM")
                    .and_then(|d| d.parse::<usize>().ok())
                    .is_some_and(|d| d > 0);
                if !dim_ok {
                    return Err(TransportError::Command(format!(
                        "Bad arguments for vector similarity: missing DIM for '{}'",
                        field.alias
                    )));
                }
                Metric::parse(field.attribute("DISTANCE_METRIC").unwrap_or_default())?;
                if field.attribute("TYPE") != Some("FLOAT32") {
                    return Err(TransportError::Command(format!(
                        "Bad arguments for vector similarity: unsupported TYPE for '{}'",
                        field.alias
                    )));
                }
            }
        }
        Ok(())
    }

    fn knn(
        &self,
        state: &IndexState,
        request: &KnnRequest,
        query: &SearchQuery,
        candidates: Vec<(String, Json)>,
    ) -> Result<Vec<SearchHit>, TransportError> {
        let spec = state.field(&request.field)?;
        let FieldType::Vector { algorithm, .. } = &spec.field_type else {
            return Err(TransportError::Syntax(format!(
                "Field '{}' is not a vector field",
                request.field
            )));
        };
        let blob = query.params.get(&request.param).ok_or_else(|| {
            TransportError::Syntax(format!("No such parameter '{}'", request.param))
        })?;
        let vector = vector_from_bytes(blob).ok_or_else(|| {
            TransportError::Syntax("query vector blob is not float32 data".to_string())
        })?;
        let dim: usize = spec
            .attribute("DIM")
            .and_then(|d| d.parse().ok())
            .unwrap_or(vector.len());
        if vector.len() != dim {
            return Err(TransportError::Syntax(format!(
                "Error parsing vector similarity query: query vector blob size ({}) does not match index's expected size ({})",
                vector.len() * 4,
                dim * 4
            )));
        }
        let metric = Metric::parse(spec.attribute("DISTANCE_METRIC").unwrap_or_default())?;

        let points: Vec<(String, Json, Vec<f32>)> = candidates
            .into_iter()
            .filter_map(|(key, body)| {
                let v = vector_at(&body, spec)?;
                (v.len() == dim).then_some((key, body, v))
            })
            .collect();
        if points.is_empty() || request.k == 0 {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<(usize, f32)> = if algorithm == "HNSW" {
            let ef_construction = spec
                .attribute("EF_CONSTRUCTION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_EF_CONSTRUCTION);
            let ef_runtime = spec
                .attribute("EF_RUNTIME")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_EF_RUNTIME)
                .max(request.k);
            let graph_points: Vec<MetricPoint> = points
                .iter()
                .map(|(_, _, v)| MetricPoint {
                    vector: v.clone(),
                    metric,
                })
                .collect();
            let positions: Vec<usize> = (0..points.len()).collect();
            let hnsw: HnswMap<MetricPoint, usize> = Builder::default()
                .ef_construction(ef_construction)
                .ef_search(ef_runtime)
                .build(graph_points, positions);

            let query_point = MetricPoint {
                vector: vector.clone(),
                metric,
            };
            let mut search = Search::default();
            hnsw.search(&query_point, &mut search)
                .take(request.k)
                .map(|item| (*item.value, metric.distance(&vector, &points[*item.value].2)))
                .collect()
        } else {
            points
                .iter()
                .enumerate()
                .map(|(i, (_, _, v))| (i, metric.distance(&vector, v)))
                .collect()
        };

        // stable: ties keep insertion order
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        ranked.truncate(request.k);

        Ok(ranked
            .into_iter()
            .map(|(i, distance)| {
                let (key, body, _) = &points[i];
                SearchHit {
                    key: key.clone(),
                    json: body.clone(),
                    score: None,
                    fields: HashMap::from([(request.alias.clone(), distance.to_string())]),
                }
            })
            .collect())
    }

    fn score_text(
        &self,
        state: &IndexState,
        clauses: &[Clause],
        scorer: &str,
        candidates: Vec<(String, Json)>,
    ) -> Result<Vec<SearchHit>, TransportError> {
        let scoring: Vec<(Option<&str>, &str)> =
            clauses.iter().flat_map(Clause::scoring_terms).collect();
        let terms: Vec<&str> = scoring.iter().map(|(_, t)| *t).collect();
        let field = scoring.iter().find_map(|(f, _)| *f);

        let tokens_of = |body: &Json| -> Vec<String> {
            match field.and_then(|f| state.field(f).ok()) {
                Some(spec) => text_at(body, spec).map(tokenize).unwrap_or_default(),
                None => state
                    .text_fields()
                    .filter_map(|spec| text_at(body, spec))
                    .flat_map(tokenize)
                    .collect(),
            }
        };

        let corpus: Vec<Vec<String>> = self
            .keys
            .iter()
            .filter(|e| e.key().starts_with(&state.prefix))
            .map(|e| tokens_of(&e.value().body))
            .collect();
        let stats = TextStats::build(corpus.iter(), &terms);

        let mut hits = candidates
            .into_iter()
            .map(|(key, body)| {
                let score = stats.score(scorer, &terms, &tokens_of(&body))?;
                Ok(SearchHit {
                    key,
                    json: body,
                    score: Some(score),
                    fields: HashMap::new(),
                })
            })
            .collect::<Result<Vec<_>, TransportError>>()?;
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
        });
        Ok(hits)
    }

    fn sort_hits(state: &IndexState, hits: &mut [SearchHit], sort_by: &str) {
        let key = |hit: &SearchHit| -> f64 {
            hit.fields
                .get(sort_by)
                .and_then(|v| v.parse().ok())
                .or_else(|| {
                    state
                        .field(sort_by)
                        .ok()
                        .and_then(|spec| numeric_at(&hit.json, spec))
                })
                .unwrap_or(f64::INFINITY)
        };
        hits.sort_by(|a, b| key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal));
    }
}

impl SearchTransport for MemoryTransport {
    fn ft_info(&self, index: &str) -> Result<IndexInfo, TransportError> {
        self.enter("FT.INFO")?;
        let state = self.index_state(index)?;
        let num_docs = self
            .keys
            .iter()
            .filter(|e| e.key().starts_with(&state.prefix))
            .count();
        Ok(IndexInfo {
            name: index.to_string(),
            prefix: state.prefix,
            num_docs,
            fields: state.fields,
        })
    }

    fn ft_create(
        &self,
        index: &str,
        prefix: &str,
        fields: &[FieldSpec],
    ) -> Result<(), TransportError> {
        self.enter("FT.CREATE")?;
        Self::validate_fields(fields)?;
        let mut indexes = self.indexes.write();
        if indexes.contains_key(index) {
            return Err(TransportError::IndexExists(index.to_string()));
        }
        indexes.insert(
            index.to_string(),
            IndexState {
                prefix: prefix.to_string(),
                fields: fields.to_vec(),
            },
        );
        log::debug!("FT.CREATE {} with {} fields", index, fields.len());
        Ok(())
    }

    fn ft_search(&self, index: &str, query: &SearchQuery) -> Result<SearchReply, TransportError> {
        self.enter("FT.SEARCH")?;
        let state = self.index_state(index)?;

        let (filter, knn) = match self.knn_pattern.captures(&query.query) {
            Some(caps) => {
                if query.dialect < 2 {
                    return Err(TransportError::Syntax(
                        "KNN queries require DIALECT 2".to_string(),
                    ));
                }
                let k = caps["k"]
                    .parse()
                    .map_err(|_| TransportError::Syntax(format!("Bad KNN count '{}'", &caps["k"])))?;
                let field = caps["field"].to_string();
                let request = KnnRequest {
                    k,
                    alias: caps
                        .name("alias")
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_else(|| format!("__{}_score", field)),
                    field,
                    param: caps["param"].to_string(),
                };
                (caps["filter"].trim().to_string(), Some(request))
            }
            None => (query.query.trim().to_string(), None),
        };

        let parts = split_clauses(&filter);
        if parts.is_empty() {
            return Err(TransportError::Syntax("Syntax error: empty query".to_string()));
        }
        let clauses = parts
            .iter()
            .map(|raw| Clause::parse(raw, &state))
            .collect::<Result<Vec<_>, _>>()?;

        let mut matched: Vec<(u64, String, Json)> = self
            .keys
            .iter()
            .filter(|e| e.key().starts_with(&state.prefix))
            .filter(|e| clauses.iter().all(|c| c.matches(&state, &e.value().body)))
            .map(|e| (e.value().seq, e.key().clone(), e.value().body.clone()))
            .collect();
        matched.sort_by_key(|(seq, _, _)| *seq);
        let candidates: Vec<(String, Json)> =
            matched.into_iter().map(|(_, key, body)| (key, body)).collect();

        let mut hits = match &knn {
            Some(request) => self.knn(&state, request, query, candidates)?,
            None if query.with_scores => {
                let scorer = query.scorer.as_deref().unwrap_or("TFIDF");
                self.score_text(&state, &clauses, scorer, candidates)?
            }
            None => candidates
                .into_iter()
                .map(|(key, json)| SearchHit {
                    key,
                    json,
                    score: None,
                    fields: HashMap::new(),
                })
                .collect(),
        };

        if let Some(sort_by) = &query.sort_by {
            Self::sort_hits(&state, &mut hits, sort_by);
        }

        let total = hits.len();
        let docs = hits
            .into_iter()
            .skip(query.offset)
            .take(query.num)
            .collect();
        Ok(SearchReply { total, docs })
    }

    fn json_set(&self, key: &str, path: &str, value: &Json) -> Result<(), TransportError> {
        self.enter("JSON.SET")?;
        if path != "$" {
            return Err(TransportError::Command(format!(
                "JSON.SET supports only the root path, got '{}'",
                path
            )));
        }
        let seq = self.sequence.fetch_add(1, AtomicOrdering::SeqCst);
        self.keys
            .entry(key.to_string())
            .and_modify(|doc| doc.body = value.clone())
            .or_insert_with(|| StoredDoc {
                seq,
                body: value.clone(),
            });
        Ok(())
    }

    fn json_get(&self, key: &str) -> Result<Option<Json>, TransportError> {
        self.enter("JSON.GET")?;
        Ok(self.keys.get(key).map(|doc| doc.body.clone()))
    }

    fn exists(&self, key: &str) -> Result<bool, TransportError> {
        self.enter("EXISTS")?;
        Ok(self.keys.contains_key(key))
    }

    fn delete(&self, keys: &[String]) -> Result<usize, TransportError> {
        self.enter("DEL")?;
        Ok(keys.iter().filter(|k| self.keys.remove(*k).is_some()).count())
    }
}
