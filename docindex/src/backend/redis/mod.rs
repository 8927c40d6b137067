//! Redis (RediSearch + RedisJSON) backend
//!
//! Documents are stored as JSON under `<index_name>:<id>` keys and indexed
//! by an `FT.CREATE ... ON JSON` index whose schema comes from the derived
//! column descriptors. The adapter talks to the server through a
//! [`SearchTransport`]; [`MemoryTransport`] is an in-process implementation.

pub mod config;
pub mod memory;
pub mod native;
pub mod transport;

pub use config::{RedisConfig, VALID_TEXT_SCORERS};
pub use memory::MemoryTransport;
pub use transport::{
    FieldSpec, FieldType, IndexInfo, SearchHit, SearchQuery, SearchReply, SearchTransport,
};

use serde_json::{Map, Value as Json};

use crate::codec;
use crate::columnar::ColumnStore;
use crate::error::{IndexError, Result, StorageError, TransportError};
use crate::executor::{CompiledQuery, RawResult, ScoreOrder};
use crate::id::{IdGenerator, UuidHex};
use crate::introspect::{
    BackendCapabilities, ColumnDefaults, ColumnDescriptor, ColumnKind, DistanceMetric, KindClass,
    Schema, VectorAlgorithm,
};
use crate::query::{Composability, ComposabilityMatrix, FragmentKind};
use crate::schema::ID_FIELD;
use crate::value::Value;

use super::{BackendKind, IndexBackend};

pub static REDIS_CAPABILITIES: BackendCapabilities = BackendCapabilities {
    name: "redis",
    columns: &[
        (KindClass::VectorLike, ColumnKind::Vector),
        (KindClass::Numeric, ColumnKind::Numeric),
        (KindClass::Text, ColumnKind::Text),
        (KindClass::Bytes, ColumnKind::Text),
    ],
    metrics: &[DistanceMetric::L2, DistanceMetric::Ip, DistanceMetric::Cosine],
    algorithms: &[VectorAlgorithm::Flat, VectorAlgorithm::Hnsw],
    default_metric: DistanceMetric::Cosine,
    default_algorithm: VectorAlgorithm::Flat,
    nested_documents: true,
};

pub static REDIS_COMPOSABILITY: ComposabilityMatrix = ComposabilityMatrix {
    backend: "redis",
    find: Composability::Once,
    filter: Composability::Once,
    text_search: Composability::Never,
};

/// A KNN search, optionally pre-filtered
pub static REDIS_QUERY_SHAPES: &[&[FragmentKind]] = &[
    &[FragmentKind::Find, FragmentKind::Filter],
    &[FragmentKind::Find],
];

/// Prefix of generated index names
pub const RANDOM_NAME_PREFIX: &str = "index_name__";

/// Redis adapter over a [`SearchTransport`]
pub struct RedisIndex<T: SearchTransport> {
    transport: T,
    config: RedisConfig,
    index_name: String,
    prefix: String,
}

impl<T: SearchTransport> RedisIndex<T> {
    /// Adapter for `config`; a random index name is generated if none is set
    pub fn new(transport: T, config: RedisConfig) -> Result<Self> {
        Self::with_id_generator(transport, config, &UuidHex)
    }

    pub fn with_id_generator(
        transport: T,
        config: RedisConfig,
        ids: &dyn IdGenerator,
    ) -> Result<Self> {
        let mut config = config.validate()?;
        let index_name = config
            .index_name
            .clone()
            .unwrap_or_else(|| format!("{}{}", RANDOM_NAME_PREFIX, ids.generate()));
        config.index_name = Some(index_name.clone());
        let prefix = format!("{}:", index_name);
        log::debug!("Redis index {} at {}", index_name, config.connection_url());

        Ok(Self {
            transport,
            config,
            index_name,
            prefix,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Storage key of a document id
    pub fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    fn doc_exists(&self, id: &str) -> Result<bool> {
        Ok(self.transport.exists(&self.key(id))?)
    }

    /// Values of one column, read column-major from the store
    fn column_data(store: &ColumnStore, column: &ColumnDescriptor) -> Result<Vec<Value>> {
        let Some((head, rest)) = column.path.split_first() else {
            return Ok(Vec::new());
        };
        let values = store.column_values(head)?;
        if rest.is_empty() {
            return Ok(values);
        }
        let nested = rest.join(".");
        Ok(values
            .into_iter()
            .map(|value| match value {
                Value::Doc(doc) => doc.get_path(&nested).cloned().unwrap_or_default(),
                _ => Value::Null,
            })
            .collect())
    }

    /// Assemble row bodies from column data; stops at the first row
    /// without an id and reports its position
    fn generate_items(
        schema: &Schema,
        columns: &[Vec<Value>],
        len: usize,
    ) -> (Vec<(String, Json)>, Option<usize>) {
        let mut items = Vec::with_capacity(len);
        for row in 0..len {
            let mut body = Map::new();
            let mut id = None;
            for (column, data) in schema.columns().iter().zip(columns) {
                let item = data.get(row).unwrap_or(&Value::Null);
                if column.path.len() == 1 && column.path[0] == ID_FIELD {
                    match item.as_str() {
                        Some(value) if !value.is_empty() => id = Some(value.to_string()),
                        _ => return (items, Some(row)),
                    }
                }
                if let Some(json) = codec::encode_value(item) {
                    codec::insert_at_path(&mut body, &column.path, json);
                }
            }
            match id {
                Some(id) => items.push((id, Json::Object(body))),
                None => return (items, Some(row)),
            }
        }
        (items, None)
    }

    fn hits_to_raw(
        hits: Vec<SearchHit>,
        order: ScoreOrder,
        score_of: impl Fn(&SearchHit) -> Result<f64>,
    ) -> Result<RawResult> {
        let scores = hits.iter().map(score_of).collect::<Result<Vec<_>>>()?;
        let rows = hits.into_iter().map(|hit| hit.json).collect();
        Ok(RawResult {
            rows,
            scores,
            order,
        })
    }
}

impl<T: SearchTransport> IndexBackend for RedisIndex<T> {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    fn default_column_config(&self) -> ColumnDefaults {
        self.config.default_column_config.clone()
    }

    fn create_index(&self, schema: &Schema) -> Result<bool> {
        if self.exists()? {
            log::info!("connected to existing {} index", self.index_name);
            return Ok(false);
        }

        let fields = schema
            .columns()
            .iter()
            .map(|column| native::field_spec(column, &REDIS_CAPABILITIES))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.transport
            .ft_create(&self.index_name, &self.prefix, &fields)?;
        log::info!("index {} has been created", self.index_name);
        Ok(true)
    }

    fn exists(&self) -> Result<bool> {
        match self.transport.ft_info(&self.index_name) {
            Ok(_) => {
                log::debug!("Index {} already exists", self.index_name);
                Ok(true)
            }
            Err(TransportError::UnknownIndex(_)) => {
                log::debug!("Index {} does not exist", self.index_name);
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn insert(&self, schema: &Schema, store: &ColumnStore) -> Result<Vec<String>> {
        let columns = schema
            .columns()
            .iter()
            .map(|column| Self::column_data(store, column))
            .collect::<Result<Vec<_>>>()?;

        let (items, malformed) = Self::generate_items(schema, &columns, store.len());
        let mut ids = Vec::with_capacity(items.len());
        for (id, body) in items {
            self.transport.json_set(&self.key(&id), "$", &body)?;
            ids.push(id);
        }

        if let Some(position) = malformed {
            log::warn!(
                "Row {} of the batch has no id; indexed {} documents into {}",
                position,
                ids.len(),
                self.index_name
            );
            return Err(StorageError::MalformedRow {
                position,
                written: ids.len(),
            }
            .into());
        }
        log::debug!("Indexed {} documents into {}", ids.len(), self.index_name);
        Ok(ids)
    }

    fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut keys = Vec::new();
        for id in ids {
            if self.doc_exists(id)? {
                keys.push(self.key(id));
            } else {
                log::debug!("Skipping delete of missing document {}", id);
            }
        }
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.transport.delete(&keys)?)
    }

    fn get(&self, ids: &[String]) -> Result<Vec<Json>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut docs = Vec::new();
        for id in ids {
            if let Some(doc) = self.transport.json_get(&self.key(id))? {
                docs.push(doc);
            }
        }
        if docs.is_empty() {
            return Err(StorageError::NotFound { ids: ids.to_vec() }.into());
        }
        Ok(docs)
    }

    fn num_docs(&self) -> Result<usize> {
        Ok(self.transport.ft_info(&self.index_name)?.num_docs)
    }

    fn execute(&self, _schema: &Schema, query: &CompiledQuery) -> Result<RawResult> {
        match query {
            CompiledQuery::Hybrid {
                vector,
                field,
                filter,
                limit,
            } => {
                let filter = filter.as_deref().unwrap_or("*");
                let request = native::hybrid_query(filter, field, vector, *limit);
                let reply = self.transport.ft_search(&self.index_name, &request)?;
                Self::hits_to_raw(reply.docs, ScoreOrder::Ascending, |hit| {
                    hit.fields
                        .get(native::VECTOR_SCORE)
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| {
                            IndexError::decode(format!("missing vector score for {}", hit.key))
                        })
                })
            }
            CompiledQuery::Filter { predicate, limit } => {
                let request = native::filter_query(predicate, *limit);
                let reply = self.transport.ft_search(&self.index_name, &request)?;
                Self::hits_to_raw(reply.docs, ScoreOrder::Unranked, |_| Ok(0.0))
            }
            CompiledQuery::Text {
                query,
                field,
                limit,
            } => {
                let request = native::text_query(field, query, &self.config.text_scorer, *limit);
                let reply = self.transport.ft_search(&self.index_name, &request)?;
                Self::hits_to_raw(reply.docs, ScoreOrder::Descending, |hit| {
                    hit.score
                        .ok_or_else(|| IndexError::decode(format!("missing score for {}", hit.key)))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::id::SequentialIds;
    use crate::introspect::derive;
    use crate::schema::{DocumentType, TensorSpec};
    use std::sync::Arc;

    fn doc_type() -> Arc<DocumentType> {
        DocumentType::builder("Item")
            .text("title")
            .int("price")
            .tensor("embedding", TensorSpec::vector(2))
            .build()
            .unwrap()
    }

    fn adapter() -> (RedisIndex<MemoryTransport>, Schema) {
        let config = RedisConfig::default().with_index_name("items");
        let index = RedisIndex::new(MemoryTransport::new(), config).unwrap();
        let schema = derive(&doc_type(), &REDIS_CAPABILITIES, &index.default_column_config()).unwrap();
        (index, schema)
    }

    fn store(docs: &[(&str, &str, i64, [f32; 2])]) -> ColumnStore {
        let ty = doc_type();
        let docs = docs
            .iter()
            .map(|(id, title, price, v)| {
                Document::new(&ty, *id)
                    .with("title", *title)
                    .unwrap()
                    .with("price", *price)
                    .unwrap()
                    .with("embedding", v.to_vec())
                    .unwrap()
            })
            .collect();
        ColumnStore::from_documents(&ty, docs).unwrap()
    }

    #[test]
    fn test_generated_index_name() {
        let index = RedisIndex::with_id_generator(
            MemoryTransport::new(),
            RedisConfig::default(),
            &SequentialIds::new("n"),
        )
        .unwrap();
        assert_eq!(index.index_name(), "index_name__n0");
        assert_eq!(index.key("a"), "index_name__n0:a");
    }

    #[test]
    fn test_random_index_name_is_hex() {
        let index = RedisIndex::new(MemoryTransport::new(), RedisConfig::default()).unwrap();
        let suffix = index.index_name().strip_prefix(RANDOM_NAME_PREFIX).unwrap();
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_create_is_idempotent() {
        let (index, schema) = adapter();
        assert!(!index.exists().unwrap());
        assert!(index.create_index(&schema).unwrap());
        assert!(index.exists().unwrap());
        assert!(!index.create_index(&schema).unwrap());
    }

    #[test]
    fn test_create_emits_vector_attributes() {
        let (index, schema) = adapter();
        index.create_index(&schema).unwrap();
        let info = index.transport().ft_info("items").unwrap();
        let vector = info.fields.iter().find(|f| f.alias == "embedding").unwrap();
        assert_eq!(vector.attribute("TYPE"), Some("FLOAT32"));
        assert_eq!(vector.attribute("DIM"), Some("2"));
        assert_eq!(vector.attribute("DISTANCE_METRIC"), Some("COSINE"));
        assert_eq!(vector.attribute("M"), None);
        assert_eq!(info.prefix, "items:");
    }

    #[test]
    fn test_exists_propagates_connection_errors() {
        let (index, _) = adapter();
        index.transport().set_available(false);
        let err = index.exists().unwrap_err();
        assert!(matches!(
            err,
            IndexError::Storage(StorageError::BackendUnavailable(TransportError::Connection(_)))
        ));
    }

    #[test]
    fn test_insert_and_get() {
        let (index, schema) = adapter();
        index.create_index(&schema).unwrap();
        let ids = index
            .insert(&schema, &store(&[("1", "a", 3, [1.0, 0.0]), ("2", "b", 4, [0.0, 1.0])]))
            .unwrap();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(index.num_docs().unwrap(), 2);

        let rows = index.get(&["2".to_string(), "9".to_string()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], "b");
        assert_eq!(rows[0]["embedding"], serde_json::json!([0.0, 1.0]));
    }

    #[test]
    fn test_get_all_missing_is_not_found() {
        let (index, schema) = adapter();
        index.create_index(&schema).unwrap();
        let err = index.get(&["x".to_string()]).unwrap_err();
        assert!(err.is_not_found());
        assert!(index.get(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_delete_skips_missing_ids() {
        let (index, schema) = adapter();
        index.create_index(&schema).unwrap();
        index
            .insert(&schema, &store(&[("1", "a", 3, [1.0, 0.0])]))
            .unwrap();
        let before = index.transport().call_count();
        assert_eq!(index.delete(&["1".to_string(), "2".to_string()]).unwrap(), 1);
        // two EXISTS and one DEL
        assert_eq!(index.transport().call_count() - before, 3);
        assert_eq!(index.delete(&["2".to_string()]).unwrap(), 0);
        assert_eq!(index.num_docs().unwrap(), 0);
    }

    #[test]
    fn test_insert_stops_at_empty_id() {
        let (index, schema) = adapter();
        index.create_index(&schema).unwrap();
        let err = index
            .insert(
                &schema,
                &store(&[("1", "a", 1, [1.0, 0.0]), ("", "b", 2, [0.0, 1.0]), ("3", "c", 3, [1.0, 1.0])]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::Storage(StorageError::MalformedRow { position: 1, written: 1 })
        ));
        assert_eq!(index.num_docs().unwrap(), 1);
    }

    #[test]
    fn test_execute_filter_scores_are_zero() {
        let (index, schema) = adapter();
        index.create_index(&schema).unwrap();
        index
            .insert(&schema, &store(&[("1", "a", 3, [1.0, 0.0]), ("2", "b", 8, [0.0, 1.0])]))
            .unwrap();
        let raw = index
            .execute(
                &schema,
                &CompiledQuery::Filter {
                    predicate: "@price:[5 10]".to_string(),
                    limit: 10,
                },
            )
            .unwrap();
        assert_eq!(raw.rows.len(), 1);
        assert_eq!(raw.scores, vec![0.0]);
        assert_eq!(raw.order, ScoreOrder::Unranked);
    }

    #[test]
    fn test_transport_errors_surface_verbatim() {
        let (index, schema) = adapter();
        index.create_index(&schema).unwrap();
        let err = index
            .execute(
                &schema,
                &CompiledQuery::Filter {
                    predicate: "@missing:[0 1]".to_string(),
                    limit: 10,
                },
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Storage error: Backend unavailable: Syntax error in query: Unknown field 'missing'"
        );
    }
}
