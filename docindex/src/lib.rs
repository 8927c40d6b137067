//! DocIndex
//!
//! Typed documents stored column-wise and projected into vector search
//! backends.
//!
//! ## Features
//!
//! - **Column stores** - Batches of documents stacked into per-field columns, with bound views that write through in place
//! - **Schema introspection** - Document fields mapped onto backend column kinds from static capability tables
//! - **Composable queries** - Find, filter and text-search fragments checked against each backend's rules
//! - **Redis backend** - RediSearch/RedisJSON adapter with an in-process transport
//!
//! ## Example
//!
//! ```ignore
//! use docindex::{DocIndex, Document, DocumentType, MemoryTransport, RedisConfig, RedisIndex, TensorSpec};
//!
//! let ty = DocumentType::builder("Product")
//!     .text("title")
//!     .tensor("embedding", TensorSpec::vector(4))
//!     .build()?;
//!
//! let backend = RedisIndex::new(MemoryTransport::new(), RedisConfig::default())?;
//! let index = DocIndex::new(&ty, backend)?;
//!
//! index.index(&[Document::new(&ty, "1")
//!     .with("title", "red shoes")?
//!     .with("embedding", vec![1.0f32, 0.0, 0.0, 0.0])?])?;
//!
//! let result = index.find(&[1.0, 0.0, 0.0, 0.0], "embedding", 5)?;
//! ```

pub mod backend;
pub mod codec;
pub mod columnar;
pub mod document;
pub mod error;
pub mod executor;
pub mod id;
pub mod index;
pub mod introspect;
pub mod query;
pub mod schema;
pub mod value;

// Re-exports for convenience
pub use backend::redis::{MemoryTransport, RedisConfig, RedisIndex, SearchTransport};
pub use backend::{BackendKind, IndexBackend};
pub use columnar::ColumnStore;
pub use document::{BoundDoc, Document, DocumentView};
pub use error::{
    ComposabilityError, IndexError, MutationError, Result, SchemaError, StorageError,
    TransportError,
};
pub use executor::{CompiledQuery, ScoreOrder, SearchResult, DEFAULT_LIMIT};
pub use id::{IdGenerator, SequentialIds, UuidHex};
pub use index::{DocIndex, RuntimeConfig};
pub use introspect::{
    BackendCapabilities, ColumnDefaults, ColumnDescriptor, ColumnKind, ColumnOptions,
    DistanceMetric, Schema, VectorAlgorithm, VectorConfig,
};
pub use query::{Composability, FragmentKind, QueryBuilder, QueryFragment};
pub use schema::{
    DocumentType, DocumentTypeBuilder, FieldDef, FieldKind, TensorMutability, TensorSpec,
};
pub use value::{Tensor, Value};
