//! Schema introspection
//!
//! Derives the ordered list of [`ColumnDescriptor`]s a backend stores for a
//! document type. The mapping from semantic field kinds to backend column
//! kinds is plain data: [`PRECEDENCE`] lists the kind classes in the order
//! they are tried and each backend's [`BackendCapabilities`] says which
//! column kind (if any) serves each class. The first class that matches a
//! field and is served by the backend wins.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::{DocumentType, FieldDef, FieldKind};

/// Backend column kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Vector,
    Numeric,
    Text,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector => write!(f, "VECTOR"),
            Self::Numeric => write!(f, "NUMERIC"),
            Self::Text => write!(f, "TEXT"),
        }
    }
}

/// Classes of semantic kinds, tried in [`PRECEDENCE`] order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindClass {
    VectorLike,
    Numeric,
    Text,
    Bytes,
}

impl KindClass {
    pub fn matches(self, kind: &FieldKind) -> bool {
        match self {
            Self::VectorLike => matches!(kind, FieldKind::Tensor(_)),
            Self::Numeric => matches!(kind, FieldKind::Int | FieldKind::Float | FieldKind::Bool),
            Self::Text => matches!(kind, FieldKind::Text),
            Self::Bytes => matches!(kind, FieldKind::Bytes),
        }
    }
}

/// Order in which kind classes are tried
pub const PRECEDENCE: [KindClass; 4] = [
    KindClass::VectorLike,
    KindClass::Numeric,
    KindClass::Text,
    KindClass::Bytes,
];

/// Vector distance metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceMetric {
    L2,
    Ip,
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L2 => "L2",
            Self::Ip => "IP",
            Self::Cosine => "COSINE",
        }
    }
}

/// Vector index algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorAlgorithm {
    Flat,
    Hnsw,
}

impl VectorAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "FLAT",
            Self::Hnsw => "HNSW",
        }
    }
}

/// Column options as configured, before validation.
///
/// Used both for per-field overrides and for per-column-kind defaults;
/// field values win over defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnOptions {
    pub dim: Option<usize>,
    pub algorithm: Option<String>,
    pub distance: Option<String>,
    pub ef_construction: Option<u32>,
    pub ef_runtime: Option<u32>,
    pub m: Option<u32>,
    pub initial_cap: Option<u32>,
}

impl ColumnOptions {
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn with_distance(mut self, distance: impl Into<String>) -> Self {
        self.distance = Some(distance.into());
        self
    }

    pub fn with_ef_construction(mut self, ef: u32) -> Self {
        self.ef_construction = Some(ef);
        self
    }

    pub fn with_ef_runtime(mut self, ef: u32) -> Self {
        self.ef_runtime = Some(ef);
        self
    }

    pub fn with_m(mut self, m: u32) -> Self {
        self.m = Some(m);
        self
    }

    pub fn with_initial_cap(mut self, cap: u32) -> Self {
        self.initial_cap = Some(cap);
        self
    }

    /// `self` with unset entries taken from `defaults`
    pub fn merged_over(&self, defaults: &ColumnOptions) -> ColumnOptions {
        ColumnOptions {
            dim: self.dim.or(defaults.dim),
            algorithm: self.algorithm.clone().or_else(|| defaults.algorithm.clone()),
            distance: self.distance.clone().or_else(|| defaults.distance.clone()),
            ef_construction: self.ef_construction.or(defaults.ef_construction),
            ef_runtime: self.ef_runtime.or(defaults.ef_runtime),
            m: self.m.or(defaults.m),
            initial_cap: self.initial_cap.or(defaults.initial_cap),
        }
    }
}

/// Validated configuration of a vector column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorConfig {
    pub metric: DistanceMetric,
    pub algorithm: VectorAlgorithm,
    pub ef_construction: Option<u32>,
    pub ef_runtime: Option<u32>,
    pub m: Option<u32>,
    pub initial_cap: Option<u32>,
}

/// What a backend can store, as static data
#[derive(Debug)]
pub struct BackendCapabilities {
    pub name: &'static str,
    /// Column kind serving each kind class; classes not listed are unsupported
    pub columns: &'static [(KindClass, ColumnKind)],
    pub metrics: &'static [DistanceMetric],
    pub algorithms: &'static [VectorAlgorithm],
    pub default_metric: DistanceMetric,
    pub default_algorithm: VectorAlgorithm,
    /// Nested documents can be flattened into `$.a.b` paths
    pub nested_documents: bool,
}

impl BackendCapabilities {
    pub fn column_for(&self, class: KindClass) -> Option<ColumnKind> {
        self.columns
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, kind)| *kind)
    }

    /// Normalise a metric name and check it against the allow-list
    pub fn validate_metric(&self, raw: &str) -> Result<DistanceMetric, SchemaError> {
        let upper = raw.trim().to_uppercase();
        self.metrics
            .iter()
            .copied()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| {
                let allowed: Vec<&str> = self.metrics.iter().map(|m| m.as_str()).collect();
                SchemaError::invalid_config("distance metric", upper, &allowed)
            })
    }

    /// Normalise an algorithm name and check it against the allow-list
    pub fn validate_algorithm(&self, raw: &str) -> Result<VectorAlgorithm, SchemaError> {
        let upper = raw.trim().to_uppercase();
        self.algorithms
            .iter()
            .copied()
            .find(|a| a.as_str() == upper)
            .ok_or_else(|| {
                let allowed: Vec<&str> = self.algorithms.iter().map(|a| a.as_str()).collect();
                SchemaError::invalid_config("algorithm", upper, &allowed)
            })
    }

    /// Re-check an already validated config against this backend
    pub fn check_vector_config(&self, config: &VectorConfig) -> Result<(), SchemaError> {
        self.validate_metric(config.metric.as_str())?;
        self.validate_algorithm(config.algorithm.as_str())?;
        Ok(())
    }
}

/// Per-column-kind default options
pub type ColumnDefaults = HashMap<ColumnKind, ColumnOptions>;

/// How one (possibly nested) field is stored by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Column name as the backend knows it (`address__city`)
    pub name: String,
    /// Field names from the root document down to this field
    pub path: Vec<String>,
    pub semantic_kind: FieldKind,
    pub backend_type: ColumnKind,
    pub dim: Option<usize>,
    /// Present for vector columns only
    pub config: Option<VectorConfig>,
}

impl ColumnDescriptor {
    /// JSON path of the field inside a stored document body
    pub fn json_path(&self) -> String {
        format!("$.{}", self.path.join("."))
    }
}

/// Separator between path segments in flattened column names
pub const PATH_SEPARATOR: &str = "__";

/// Descriptors of one document type plus the reverse lookup
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<ColumnDescriptor>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Reverse mapping: backend column name to descriptor
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    /// Descriptor addressed by a dotted field path (`address.city`) or a
    /// column name (`address__city`)
    pub fn resolve(&self, field: &str) -> Option<&ColumnDescriptor> {
        self.column(field)
            .or_else(|| self.column(&field.replace('.', PATH_SEPARATOR)))
    }

    pub fn vector_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns
            .iter()
            .filter(|c| c.backend_type == ColumnKind::Vector)
    }
}

/// Derive the storage schema of `ty` for a backend
pub fn derive(
    ty: &DocumentType,
    caps: &BackendCapabilities,
    defaults: &ColumnDefaults,
) -> Result<Schema, SchemaError> {
    let mut columns = Vec::new();
    derive_into(ty, caps, defaults, &[], &mut columns)?;

    let by_name = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.clone(), i))
        .collect();
    Ok(Schema { columns, by_name })
}

fn derive_into(
    ty: &DocumentType,
    caps: &BackendCapabilities,
    defaults: &ColumnDefaults,
    prefix: &[String],
    out: &mut Vec<ColumnDescriptor>,
) -> Result<(), SchemaError> {
    for field in ty.fields() {
        let mut path = prefix.to_vec();
        path.push(field.name.clone());

        if let FieldKind::Document(nested) = &field.kind {
            if !caps.nested_documents {
                return Err(unsupported(&path, field));
            }
            derive_into(nested, caps, defaults, &path, out)?;
            continue;
        }

        let backend_type = PRECEDENCE
            .iter()
            .find(|class| class.matches(&field.kind))
            .and_then(|class| caps.column_for(*class))
            .ok_or_else(|| unsupported(&path, field))?;

        let name = path.join(PATH_SEPARATOR);
        let (dim, config) = if backend_type == ColumnKind::Vector {
            let options = defaults
                .get(&ColumnKind::Vector)
                .map(|d| field.options.merged_over(d))
                .unwrap_or_else(|| field.options.clone());
            let (dim, config) = vector_column(&name, field, &options, caps)?;
            (Some(dim), Some(config))
        } else {
            (None, None)
        };

        out.push(ColumnDescriptor {
            name,
            path,
            semantic_kind: field.kind.clone(),
            backend_type,
            dim,
            config,
        });
    }
    Ok(())
}

fn unsupported(path: &[String], field: &FieldDef) -> SchemaError {
    SchemaError::Unsupported {
        field: path.join("."),
        kind: field.kind.to_string(),
    }
}

fn vector_column(
    name: &str,
    field: &FieldDef,
    options: &ColumnOptions,
    caps: &BackendCapabilities,
) -> Result<(usize, VectorConfig), SchemaError> {
    let static_dim = match &field.kind {
        FieldKind::Tensor(spec) => spec.dim(),
        _ => None,
    };
    let dim = static_dim
        .or(options.dim)
        .filter(|&d| d > 0)
        .ok_or_else(|| SchemaError::MissingDimension {
            field: name.to_string(),
        })?;

    let metric = match &options.distance {
        Some(raw) => caps.validate_metric(raw)?,
        None => caps.default_metric,
    };
    let algorithm = match &options.algorithm {
        Some(raw) => caps.validate_algorithm(raw)?,
        None => caps.default_algorithm,
    };

    Ok((
        dim,
        VectorConfig {
            metric,
            algorithm,
            ef_construction: options.ef_construction,
            ef_runtime: options.ef_runtime,
            m: options.m,
            initial_cap: options.initial_cap,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TensorSpec;

    static TEST_CAPS: BackendCapabilities = BackendCapabilities {
        name: "test",
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

    static FLAT_ONLY: BackendCapabilities = BackendCapabilities {
        name: "flat",
        columns: &[(KindClass::Numeric, ColumnKind::Numeric)],
        metrics: &[DistanceMetric::L2],
        algorithms: &[VectorAlgorithm::Flat],
        default_metric: DistanceMetric::L2,
        default_algorithm: VectorAlgorithm::Flat,
        nested_documents: false,
    };

    #[test]
    fn test_precedence_order() {
        assert_eq!(PRECEDENCE[0], KindClass::VectorLike);
        assert!(KindClass::Numeric.matches(&FieldKind::Bool));
        assert!(!KindClass::VectorLike.matches(&FieldKind::TensorSequence(TensorSpec::new())));
    }

    #[test]
    fn test_derive_maps_kinds() {
        let ty = DocumentType::builder("Doc")
            .int("n")
            .text("title")
            .bytes("blob")
            .tensor("embedding", TensorSpec::vector(4))
            .build()
            .unwrap();
        let schema = derive(&ty, &TEST_CAPS, &ColumnDefaults::new()).unwrap();
        let kinds: Vec<_> = schema.columns().iter().map(|c| c.backend_type).collect();
        assert_eq!(
            kinds,
            vec![
                ColumnKind::Text,
                ColumnKind::Numeric,
                ColumnKind::Text,
                ColumnKind::Text,
                ColumnKind::Vector
            ]
        );
        let embedding = schema.column("embedding").unwrap();
        assert_eq!(embedding.dim, Some(4));
        assert_eq!(embedding.json_path(), "$.embedding");
        assert_eq!(
            embedding.config.as_ref().unwrap().metric,
            DistanceMetric::Cosine
        );
    }

    #[test]
    fn test_unsupported_kind() {
        let ty = DocumentType::builder("Doc")
            .tensor_sequence("chunks", TensorSpec::vector(2))
            .build()
            .unwrap();
        let err = derive(&ty, &TEST_CAPS, &ColumnDefaults::new()).unwrap_err();
        assert!(matches!(err, SchemaError::Unsupported { .. }));

        let ty = DocumentType::builder("Doc").text("title").build().unwrap();
        assert!(derive(&ty, &FLAT_ONLY, &ColumnDefaults::new()).is_err());
    }

    #[test]
    fn test_dim_from_defaults() {
        let ty = DocumentType::builder("Doc")
            .tensor("v", TensorSpec::new())
            .build()
            .unwrap();
        let err = derive(&ty, &TEST_CAPS, &ColumnDefaults::new()).unwrap_err();
        assert!(matches!(err, SchemaError::MissingDimension { .. }));

        let mut defaults = ColumnDefaults::new();
        defaults.insert(ColumnKind::Vector, ColumnOptions::default().with_dim(8));
        let schema = derive(&ty, &TEST_CAPS, &defaults).unwrap();
        assert_eq!(schema.column("v").unwrap().dim, Some(8));
    }

    #[test]
    fn test_static_shape_wins_over_default_dim() {
        let ty = DocumentType::builder("Doc")
            .tensor("v", TensorSpec::with_shape([2, 3]))
            .build()
            .unwrap();
        let mut defaults = ColumnDefaults::new();
        defaults.insert(ColumnKind::Vector, ColumnOptions::default().with_dim(8));
        let schema = derive(&ty, &TEST_CAPS, &defaults).unwrap();
        assert_eq!(schema.column("v").unwrap().dim, Some(6));
    }

    #[test]
    fn test_metric_normalised_and_validated() {
        let ty = DocumentType::builder("Doc")
            .tensor_with(
                "v",
                TensorSpec::vector(4),
                ColumnOptions::default().with_distance("cosine").with_algorithm("hnsw"),
            )
            .build()
            .unwrap();
        let schema = derive(&ty, &TEST_CAPS, &ColumnDefaults::new()).unwrap();
        let config = schema.column("v").unwrap().config.clone().unwrap();
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert_eq!(config.algorithm, VectorAlgorithm::Hnsw);

        let ty = DocumentType::builder("Doc")
            .tensor_with(
                "v",
                TensorSpec::vector(4),
                ColumnOptions::default().with_distance("MANHATTAN"),
            )
            .build()
            .unwrap();
        let err = derive(&ty, &TEST_CAPS, &ColumnDefaults::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid distance metric 'MANHATTAN' provided. Must be one of: L2, IP, COSINE"
        );
    }

    #[test]
    fn test_invalid_algorithm() {
        let ty = DocumentType::builder("Doc")
            .tensor_with(
                "v",
                TensorSpec::vector(4),
                ColumnOptions::default().with_algorithm("IVF"),
            )
            .build()
            .unwrap();
        let err = derive(&ty, &TEST_CAPS, &ColumnDefaults::new()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidConfig { .. }));
    }

    #[test]
    fn test_nested_documents_flatten() {
        let address = DocumentType::builder("Address")
            .text("city")
            .tensor("location", TensorSpec::vector(2))
            .build()
            .unwrap();
        let ty = DocumentType::builder("Person")
            .text("name")
            .document("address", address)
            .build()
            .unwrap();
        let schema = derive(&ty, &TEST_CAPS, &ColumnDefaults::new()).unwrap();
        let names: Vec<_> = schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["id", "name", "address__id", "address__city", "address__location"]
        );
        let city = schema.resolve("address.city").unwrap();
        assert_eq!(city.json_path(), "$.address.city");
        assert_eq!(schema.vector_columns().count(), 1);
    }

    #[test]
    fn test_nested_refused_without_capability() {
        let inner = DocumentType::builder("Inner").build().unwrap();
        let ty = DocumentType::builder("Outer")
            .document("inner", inner)
            .build()
            .unwrap();
        let caps = BackendCapabilities {
            nested_documents: false,
            ..TEST_CAPS
        };
        assert!(matches!(
            derive(&ty, &caps, &ColumnDefaults::new()),
            Err(SchemaError::Unsupported { .. })
        ));
    }
}
