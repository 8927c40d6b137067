//! Document type definitions
//!
//! A [`DocumentType`] is a named, ordered set of fields. Every type starts
//! with an implicit `id` text field. Types are immutable once built and are
//! shared as `Arc<DocumentType>` between documents, column stores and
//! indexes.

use std::fmt;
use std::sync::Arc;

use crate::error::SchemaError;
use crate::introspect::ColumnOptions;

/// Name of the implicit identifier field
pub const ID_FIELD: &str = "id";

/// Whether a tensor can be written in place once stacked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorMutability {
    /// Plain float buffer, writable in place
    #[default]
    Mutable,
    /// Externally owned tensor type that never changes in place
    Immutable,
}

/// Static metadata of a tensor-valued field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TensorSpec {
    /// Declared shape, if the field fixes one
    pub shape: Option<Vec<usize>>,
    pub mutability: TensorMutability,
}

impl TensorSpec {
    /// Tensor with no declared shape
    pub fn new() -> Self {
        Self::default()
    }

    /// Tensor with a fixed shape
    pub fn with_shape(shape: impl Into<Vec<usize>>) -> Self {
        Self {
            shape: Some(shape.into()),
            mutability: TensorMutability::Mutable,
        }
    }

    /// Fixed-dimension vector
    pub fn vector(dim: usize) -> Self {
        Self::with_shape(vec![dim])
    }

    /// Mark the tensor as immutable
    pub fn immutable(mut self) -> Self {
        self.mutability = TensorMutability::Immutable;
        self
    }

    /// Number of elements implied by the declared shape
    pub fn dim(&self) -> Option<usize> {
        self.shape.as_ref().map(|s| s.iter().product())
    }

    pub fn is_immutable(&self) -> bool {
        self.mutability == TensorMutability::Immutable
    }
}

/// Semantic kind of a document field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    Text,
    Bytes,
    Tensor(TensorSpec),
    TensorSequence(TensorSpec),
    Document(Arc<DocumentType>),
}

impl FieldKind {
    pub fn is_tensor(&self) -> bool {
        matches!(self, Self::Tensor(_))
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Bool => write!(f, "bool"),
            Self::Text => write!(f, "text"),
            Self::Bytes => write!(f, "bytes"),
            Self::Tensor(spec) => match &spec.shape {
                Some(shape) => write!(f, "tensor{:?}", shape),
                None => write!(f, "tensor"),
            },
            Self::TensorSequence(_) => write!(f, "sequence<tensor>"),
            Self::Document(ty) => write!(f, "document<{}>", ty.name()),
        }
    }
}

/// One field of a document type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Per-field column options, layered over the backend defaults
    pub options: ColumnOptions,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            options: ColumnOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ColumnOptions) -> Self {
        self.options = options;
        self
    }
}

/// A named, ordered set of fields
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentType {
    name: String,
    fields: Vec<FieldDef>,
}

impl DocumentType {
    /// Start defining a new document type
    pub fn builder(name: impl Into<String>) -> DocumentTypeBuilder {
        DocumentTypeBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All fields, `id` first
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Look up a field or fail with `UnknownField`
    pub fn require(&self, name: &str) -> Result<(usize, &FieldDef), SchemaError> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .ok_or_else(|| SchemaError::UnknownField {
                doc_type: self.name.clone(),
                field: name.to_string(),
            })
    }
}

/// Builder for DocumentType with fluent API
#[derive(Debug)]
pub struct DocumentTypeBuilder {
    name: String,
    fields: Vec<FieldDef>,
}

impl DocumentTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![FieldDef::new(ID_FIELD, FieldKind::Text)],
        }
    }

    /// Add a field with an explicit definition
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn int(self, name: impl Into<String>) -> Self {
        self.field(FieldDef::new(name, FieldKind::Int))
    }

    pub fn float(self, name: impl Into<String>) -> Self {
        self.field(FieldDef::new(name, FieldKind::Float))
    }

    pub fn bool(self, name: impl Into<String>) -> Self {
        self.field(FieldDef::new(name, FieldKind::Bool))
    }

    pub fn text(self, name: impl Into<String>) -> Self {
        self.field(FieldDef::new(name, FieldKind::Text))
    }

    pub fn bytes(self, name: impl Into<String>) -> Self {
        self.field(FieldDef::new(name, FieldKind::Bytes))
    }

    pub fn tensor(self, name: impl Into<String>, spec: TensorSpec) -> Self {
        self.field(FieldDef::new(name, FieldKind::Tensor(spec)))
    }

    /// Tensor field with per-field column options (distance, algorithm, ...)
    pub fn tensor_with(
        self,
        name: impl Into<String>,
        spec: TensorSpec,
        options: ColumnOptions,
    ) -> Self {
        self.field(FieldDef::new(name, FieldKind::Tensor(spec)).with_options(options))
    }

    pub fn tensor_sequence(self, name: impl Into<String>, spec: TensorSpec) -> Self {
        self.field(FieldDef::new(name, FieldKind::TensorSequence(spec)))
    }

    pub fn document(self, name: impl Into<String>, ty: Arc<DocumentType>) -> Self {
        self.field(FieldDef::new(name, FieldKind::Document(ty)))
    }

    /// Build the DocumentType
    pub fn build(self) -> Result<Arc<DocumentType>, SchemaError> {
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    doc_type: self.name,
                    field: field.name.clone(),
                });
            }
        }

        Ok(Arc::new(DocumentType {
            name: self.name,
            fields: self.fields,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_adds_implicit_id() {
        let ty = DocumentType::builder("Simple").text("title").build().unwrap();
        assert_eq!(ty.fields()[0].name, ID_FIELD);
        assert_eq!(ty.fields()[0].kind, FieldKind::Text);
        assert_eq!(ty.field_index("title"), Some(1));
        assert_eq!(ty.len(), 2);
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let result = DocumentType::builder("Dup").int("n").float("n").build();
        assert!(matches!(result, Err(SchemaError::DuplicateField { .. })));

        let result = DocumentType::builder("Dup").text("id").build();
        assert!(matches!(result, Err(SchemaError::DuplicateField { .. })));
    }

    #[test]
    fn test_tensor_spec_dim() {
        assert_eq!(TensorSpec::vector(4).dim(), Some(4));
        assert_eq!(TensorSpec::with_shape([2, 3]).dim(), Some(6));
        assert_eq!(TensorSpec::new().dim(), None);
        assert!(TensorSpec::vector(2).immutable().is_immutable());
    }

    #[test]
    fn test_require_unknown_field() {
        let ty = DocumentType::builder("Simple").build().unwrap();
        let err = ty.require("missing").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField { .. }));
    }

    #[test]
    fn test_field_kind_display() {
        assert_eq!(FieldKind::Tensor(TensorSpec::vector(3)).to_string(), "tensor[3]");
        let inner = DocumentType::builder("Inner").build().unwrap();
        assert_eq!(FieldKind::Document(inner).to_string(), "document<Inner>");
    }
}
