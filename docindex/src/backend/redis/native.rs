//! Native RediSearch query and schema construction

use crate::error::SchemaError;
use crate::introspect::{BackendCapabilities, ColumnDescriptor, ColumnKind};

use super::transport::{FieldSpec, FieldType, SearchQuery};

/// Alias under which KNN distances are returned
pub const VECTOR_SCORE: &str = "vector_score";

/// Dialect required for KNN queries with parameters
pub const KNN_DIALECT: u32 = 2;

/// Pack a query vector as little-endian float32 bytes
pub fn vector_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Inverse of [`vector_bytes`]; `None` if the length is not a multiple of 4
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// `<filter>=>[KNN <limit> @<field> $vec AS vector_score]`, sorted by
/// distance
pub fn hybrid_query(filter: &str, field: &str, vector: &[f32], limit: usize) -> SearchQuery {
    SearchQuery::new(format!(
        "{}=>[KNN {} @{} $vec AS {}]",
        filter, limit, field, VECTOR_SCORE
    ))
    .sort_by(VECTOR_SCORE)
    .paging(0, limit)
    .dialect(KNN_DIALECT)
    .param("vec", vector_bytes(vector))
}

pub fn filter_query(predicate: &str, limit: usize) -> SearchQuery {
    SearchQuery::new(predicate).paging(0, limit)
}

/// `@<field>:t1|t2|...`: any whitespace-separated term may match
pub fn text_query(field: &str, query: &str, scorer: &str, limit: usize) -> SearchQuery {
    let terms: Vec<&str> = query.split_whitespace().collect();
    SearchQuery::new(format!("@{}:{}", field, terms.join("|")))
        .scorer(scorer)
        .with_scores()
        .paging(0, limit)
}

/// `FT.CREATE` schema entry for one column, re-validating vector settings
pub fn field_spec(
    column: &ColumnDescriptor,
    caps: &BackendCapabilities,
) -> Result<FieldSpec, SchemaError> {
    let field_type = match column.backend_type {
        ColumnKind::Text => FieldType::Text,
        ColumnKind::Numeric => FieldType::Numeric,
        ColumnKind::Vector => {
            let (Some(dim), Some(config)) = (column.dim, column.config.as_ref()) else {
                return Err(SchemaError::MissingDimension {
                    field: column.name.clone(),
                });
            };
            caps.check_vector_config(config)?;

            let optional = [
                ("EF_CONSTRUCTION", config.ef_construction),
                ("EF_RUNTIME", config.ef_runtime),
                ("M", config.m),
                ("INITIAL_CAP", config.initial_cap),
            ];
            let mut attributes = vec![
                ("TYPE".to_string(), "FLOAT32".to_string()),
                ("DIM".to_string(), dim.to_string()),
                (
                    "DISTANCE_METRIC".to_string(),
                    config.metric.as_str().to_string(),
                ),
            ];
            attributes.extend(
                optional
                    .iter()
                    .filter_map(|(name, value)| value.map(|v| (name.to_string(), v.to_string()))),
            );

            FieldType::Vector {
                algorithm: config.algorithm.as_str().to_string(),
                attributes,
            }
        }
    };

    Ok(FieldSpec {
        path: column.json_path(),
        alias: column.name.clone(),
        field_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::redis::REDIS_CAPABILITIES;
    use crate::introspect::{derive, ColumnDefaults, ColumnOptions};
    use crate::schema::{DocumentType, TensorSpec};

    #[test]
    fn test_hybrid_query_string() {
        let q = hybrid_query("@price:[0 10]", "embedding", &[1.0, 0.5], 3);
        assert_eq!(
            q.query,
            "@price:[0 10]=>[KNN 3 @embedding $vec AS vector_score]"
        );
        assert_eq!(q.sort_by.as_deref(), Some("vector_score"));
        assert_eq!((q.offset, q.num), (0, 3));
        assert_eq!(q.dialect, 2);
        assert_eq!(q.params["vec"].len(), 8);
    }

    #[test]
    fn test_text_query_string() {
        let q = text_query("title", "hello  big world", "BM25", 5);
        assert_eq!(q.query, "@title:hello|big|world");
        assert_eq!(q.scorer.as_deref(), Some("BM25"));
        assert!(q.with_scores);
    }

    #[test]
    fn test_vector_bytes_round_trip() {
        let v = vec![1.5f32, -2.0, 0.0];
        assert_eq!(vector_from_bytes(&vector_bytes(&v)).unwrap(), v);
        assert!(vector_from_bytes(&[0, 1, 2]).is_none());
    }

    #[test]
    fn test_vector_field_spec_omits_unset_attributes() {
        let ty = DocumentType::builder("Doc")
            .tensor_with(
                "embedding",
                TensorSpec::vector(4),
                ColumnOptions::default()
                    .with_algorithm("hnsw")
                    .with_distance("l2")
                    .with_m(16),
            )
            .build()
            .unwrap();
        let schema = derive(&ty, &REDIS_CAPABILITIES, &ColumnDefaults::new()).unwrap();
        let column = schema.column("embedding").unwrap();
        let spec = field_spec(column, &REDIS_CAPABILITIES).unwrap();

        assert_eq!(spec.path, "$.embedding");
        assert_eq!(spec.alias, "embedding");
        match &spec.field_type {
            FieldType::Vector {
                algorithm,
                attributes,
            } => {
                assert_eq!(algorithm, "HNSW");
                let names: Vec<&str> = attributes.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(names, vec!["TYPE", "DIM", "DISTANCE_METRIC", "M"]);
            }
            other => panic!("expected vector field, got {other:?}"),
        }
        assert_eq!(spec.attribute("DIM"), Some("4"));
        assert_eq!(spec.attribute("DISTANCE_METRIC"), Some("L2"));
    }

    #[test]
    fn test_nested_field_spec_path() {
        let inner = DocumentType::builder("Inner").text("city").build().unwrap();
        let ty = DocumentType::builder("Outer")
            .document("address", inner)
            .build()
            .unwrap();
        let schema = derive(&ty, &REDIS_CAPABILITIES, &ColumnDefaults::new()).unwrap();
        let spec = field_spec(schema.column("address__city").unwrap(), &REDIS_CAPABILITIES).unwrap();
        assert_eq!(spec.path, "$.address.city");
        assert_eq!(spec.field_type, FieldType::Text);
        assert_eq!(spec.path_segments(), vec!["address", "city"]);
    }
}
