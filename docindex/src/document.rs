//! Documents and document views
//!
//! A [`Document`] owns its values. A [`DocumentView`] is either an owned
//! document or a [`BoundDoc`]: a `(store, row)` reference into a
//! [`ColumnStore`](crate::columnar::ColumnStore). Bound views are only ever
//! created by the store; they hold a weak handle plus the store generation
//! they were created under, so using one after the store is dropped or
//! unstacked fails with `StaleView` instead of reading freed or reused rows.

use std::sync::{Arc, Weak};

use crate::columnar::StoreInner;
use crate::error::{IndexError, Result, SchemaError, StorageError};
use crate::id::IdGenerator;
use crate::schema::{DocumentType, FieldKind, ID_FIELD};
use crate::value::{coerce, Value};

/// A document holding its own values
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    ty: Arc<DocumentType>,
    values: Vec<Value>,
}

impl Document {
    /// Empty document of type `ty`; every field but `id` starts as `Null`
    pub fn new(ty: &Arc<DocumentType>, id: impl Into<String>) -> Self {
        let mut values = vec![Value::Null; ty.len()];
        values[0] = Value::Text(id.into());
        Self {
            ty: ty.clone(),
            values,
        }
    }

    /// Empty document with an id drawn from `ids`
    pub fn with_generated_id(ty: &Arc<DocumentType>, ids: &dyn IdGenerator) -> Self {
        Self::new(ty, ids.generate())
    }

    pub(crate) fn from_values(ty: Arc<DocumentType>, values: Vec<Value>) -> Self {
        debug_assert_eq!(ty.len(), values.len());
        Self { ty, values }
    }

    pub fn doc_type(&self) -> &Arc<DocumentType> {
        &self.ty
    }

    pub fn id(&self) -> &str {
        self.values[0].as_str().unwrap_or_default()
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }

    pub(crate) fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, field: &str) -> Result<&Value> {
        let (idx, _) = self.ty.require(field)?;
        Ok(&self.values[idx])
    }

    /// Read a nested value through a dotted path such as `address.city`
    pub fn get_path(&self, path: &str) -> Result<&Value> {
        let mut parts = path.split('.');
        let head = parts.next().unwrap_or_default();
        let mut value = self.get(head)?;
        for part in parts {
            value = match value {
                Value::Doc(doc) => doc.get(part)?,
                other => {
                    return Err(SchemaError::InvalidValue {
                        field: path.to_string(),
                        expected: "document".to_string(),
                        got: other.type_name().to_string(),
                    }
                    .into())
                }
            };
        }
        Ok(value)
    }

    /// Validate and assign a field
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let (idx, def) = self.ty.require(field)?;
        self.values[idx] = coerce(def, value.into())?;
        Ok(())
    }

    /// Fluent form of [`Document::set`]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    pub fn into_view(self) -> DocumentView {
        DocumentView::Owned(self)
    }
}

/// Reference to one row of a column store
#[derive(Debug, Clone)]
pub struct BoundDoc {
    store: Weak<StoreInner>,
    generation: u64,
    ty: Arc<DocumentType>,
    index: usize,
}

impl BoundDoc {
    pub(crate) fn new(
        store: Weak<StoreInner>,
        generation: u64,
        ty: Arc<DocumentType>,
        index: usize,
    ) -> Self {
        Self {
            store,
            generation,
            ty,
            index,
        }
    }

    /// Row of the store this view points at
    pub fn index(&self) -> usize {
        self.index
    }

    fn store(&self) -> Result<Arc<StoreInner>> {
        let store = self.store.upgrade().ok_or(StorageError::StaleView)?;
        if store.generation() != self.generation {
            return Err(StorageError::StaleView.into());
        }
        Ok(store)
    }
}

/// A document that either owns its values or is bound to a column store
#[derive(Debug, Clone)]
pub enum DocumentView {
    Owned(Document),
    Bound(BoundDoc),
}

impl DocumentView {
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }

    pub fn doc_type(&self) -> &Arc<DocumentType> {
        match self {
            Self::Owned(doc) => doc.doc_type(),
            Self::Bound(bound) => &bound.ty,
        }
    }

    pub fn id(&self) -> Result<String> {
        match self.get(ID_FIELD)? {
            Value::Text(id) => Ok(id),
            other => Err(IndexError::decode(format!(
                "document id is {}",
                other.type_name()
            ))),
        }
    }

    /// Copy of a field's current value. Bound views read straight from the
    /// column buffer.
    pub fn get(&self, field: &str) -> Result<Value> {
        match self {
            Self::Owned(doc) => doc.get(field).cloned(),
            Self::Bound(bound) => {
                let (idx, _) = bound.ty.require(field)?;
                let store = bound.store()?;
                Ok(store.read(idx, bound.index))
            }
        }
    }

    /// View of a nested document field; bound views yield a view bound to
    /// the nested column
    pub fn get_doc(&self, field: &str) -> Result<DocumentView> {
        let (idx, def) = self.doc_type().require(field)?;
        let not_nested = || SchemaError::InvalidValue {
            field: field.to_string(),
            expected: "document".to_string(),
            got: def.kind.to_string(),
        };
        match self {
            Self::Owned(doc) => match &doc.values[idx] {
                Value::Doc(nested) => Ok(Self::Owned(nested.clone())),
                _ => Err(not_nested().into()),
            },
            Self::Bound(bound) => {
                let store = bound.store()?;
                store
                    .child_view(idx, bound.index)
                    .ok_or_else(|| not_nested().into())
            }
        }
    }

    /// Validate and assign a field.
    ///
    /// For bound views the write lands in the column store: immutable
    /// tensors are refused, mutable tensors are overwritten in place and
    /// nested documents replace the row of the nested column. A failed write
    /// leaves the stored value unchanged.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        match self {
            Self::Owned(doc) => doc.set(field, value),
            Self::Bound(bound) => {
                let (idx, def) = bound.ty.require(field)?;
                let value = coerce(def, value.into())?;
                if let FieldKind::Tensor(spec) = &def.kind {
                    if spec.is_immutable() {
                        return Err(StorageError::ImmutableField {
                            field: field.to_string(),
                        }
                        .into());
                    }
                }
                let store = bound.store()?;
                debug_assert!(Arc::ptr_eq(store.doc_type(), &bound.ty));
                store.write(idx, bound.index, value)
            }
        }
    }

    /// Owned copy of the current values
    pub fn to_document(&self) -> Result<Document> {
        match self {
            Self::Owned(doc) => Ok(doc.clone()),
            Self::Bound(bound) => Ok(bound.store()?.row_document(bound.index)),
        }
    }

    pub fn into_document(self) -> Result<Document> {
        match self {
            Self::Owned(doc) => Ok(doc),
            Self::Bound(bound) => Ok(bound.store()?.row_document(bound.index)),
        }
    }

    /// Detach from the column store by copying the current values; later
    /// writes no longer reach the store
    pub fn unbind(&mut self) -> Result<()> {
        if let Self::Bound(_) = self {
            *self = Self::Owned(self.to_document()?);
        }
        Ok(())
    }
}

impl From<Document> for DocumentView {
    fn from(doc: Document) -> Self {
        Self::Owned(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columnar::ColumnStore;
    use crate::error::MutationError;
    use crate::id::SequentialIds;
    use crate::schema::TensorSpec;
    use crate::value::Tensor;

    fn doc_type() -> Arc<DocumentType> {
        DocumentType::builder("Doc")
            .text("title")
            .int("count")
            .tensor("embedding", TensorSpec::vector(4))
            .tensor("frozen", TensorSpec::vector(2).immutable())
            .build()
            .unwrap()
    }

    fn stacked(ty: &Arc<DocumentType>, n: usize) -> ColumnStore {
        let docs: Vec<DocumentView> = (0..n)
            .map(|i| {
                Document::new(ty, format!("d{}", i))
                    .with("title", format!("title {}", i))
                    .unwrap()
                    .with("count", i as i64)
                    .unwrap()
                    .with("embedding", vec![i as f32; 4])
                    .unwrap()
                    .with("frozen", vec![0.5f32, 0.5])
                    .unwrap()
                    .into_view()
            })
            .collect();
        ColumnStore::from_batch(ty, &docs).unwrap()
    }

    #[test]
    fn test_owned_document_get_set() {
        let ty = doc_type();
        let mut doc = Document::new(&ty, "abc");
        assert_eq!(doc.id(), "abc");
        assert_eq!(doc.get("title").unwrap(), &Value::Null);

        doc.set("title", "hello").unwrap();
        assert_eq!(doc.get("title").unwrap(), &Value::Text("hello".to_string()));
        assert!(doc.set("nope", 1).is_err());
        assert!(doc.set("count", "text").is_err());
    }

    #[test]
    fn test_generated_id() {
        let ty = doc_type();
        let ids = SequentialIds::new("doc-");
        assert_eq!(Document::with_generated_id(&ty, &ids).id(), "doc-0");
        assert_eq!(Document::with_generated_id(&ty, &ids).id(), "doc-1");
    }

    #[test]
    fn test_bound_read_delegates_to_store() {
        let ty = doc_type();
        let store = stacked(&ty, 3);
        let view = store.bind(1).unwrap();
        assert!(view.is_bound());
        assert_eq!(view.id().unwrap(), "d1");
        assert_eq!(view.get("count").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_bound_write_reaches_store() {
        let ty = doc_type();
        let store = stacked(&ty, 3);
        let mut view = store.bind(2).unwrap();

        view.set("title", "changed").unwrap();
        assert_eq!(
            store.value_at("title", 2).unwrap(),
            Value::Text("changed".to_string())
        );
        assert_eq!(
            store.bind(2).unwrap().get("title").unwrap(),
            Value::Text("changed".to_string())
        );
    }

    #[test]
    fn test_bound_tensor_write_is_in_place() {
        let ty = doc_type();
        let store = stacked(&ty, 3);
        let before = store.tensor_buffer_ptr("embedding").unwrap();

        let mut view = store.bind(0).unwrap();
        view.set("embedding", vec![9.0f32, 8.0, 7.0, 6.0]).unwrap();

        assert_eq!(store.tensor_buffer_ptr("embedding").unwrap(), before);
        assert_eq!(
            store.tensor_row("embedding", 0).unwrap(),
            vec![9.0, 8.0, 7.0, 6.0]
        );
        // another alias of the same row observes the write
        let alias = store.bind(0).unwrap();
        assert_eq!(
            alias.get("embedding").unwrap(),
            Value::Tensor(Tensor::from_vec(vec![9.0, 8.0, 7.0, 6.0]))
        );
        // neighbours untouched
        assert_eq!(store.tensor_row("embedding", 1).unwrap(), vec![1.0; 4]);
    }

    #[test]
    fn test_bound_tensor_shape_mismatch_rolls_back() {
        let ty = DocumentType::builder("Loose")
            .tensor("t", TensorSpec::new())
            .build()
            .unwrap();
        let docs = vec![Document::new(&ty, "a")
            .with("t", vec![1.0f32, 2.0, 3.0])
            .unwrap()
            .into_view()];
        let store = ColumnStore::from_batch(&ty, &docs).unwrap();
        let mut view = store.bind(0).unwrap();

        let err = view.set("t", vec![1.0f32, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Mutation(MutationError::ShapeMismatch { .. })
        ));
        assert_eq!(store.tensor_row("t", 0).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(
            view.get("t").unwrap(),
            Value::Tensor(Tensor::from_vec(vec![1.0, 2.0, 3.0]))
        );
    }

    #[test]
    fn test_bound_immutable_tensor_refused() {
        let ty = doc_type();
        let store = stacked(&ty, 1);
        let mut view = store.bind(0).unwrap();

        let err = view.set("frozen", vec![1.0f32, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Storage(StorageError::ImmutableField { .. })
        ));
        assert_eq!(store.tensor_row("frozen", 0).unwrap(), vec![0.5, 0.5]);

        // after unbinding the document may change freely
        view.unbind().unwrap();
        view.set("frozen", vec![1.0f32, 1.0]).unwrap();
        assert_eq!(store.tensor_row("frozen", 0).unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_unbind_detaches_from_store() {
        let ty = doc_type();
        let store = stacked(&ty, 2);
        let mut view = store.bind(0).unwrap();
        view.unbind().unwrap();
        assert!(!view.is_bound());

        view.set("count", 100).unwrap();
        assert_eq!(store.value_at("count", 0).unwrap(), Value::Int(0));
        assert_eq!(view.get("count").unwrap(), Value::Int(100));
    }

    #[test]
    fn test_view_after_drop_is_stale() {
        let ty = doc_type();
        let store = stacked(&ty, 2);
        let view = store.bind(0).unwrap();
        drop(store);

        let err = view.get("title").unwrap_err();
        assert!(matches!(err, IndexError::Storage(StorageError::StaleView)));
    }

    #[test]
    fn test_view_after_unstack_is_stale() {
        let ty = doc_type();
        let store = stacked(&ty, 2);
        let mut view = store.bind(1).unwrap();
        let docs = store.unstack();
        assert_eq!(docs.len(), 2);

        assert!(matches!(
            view.set("count", 5).unwrap_err(),
            IndexError::Storage(StorageError::StaleView)
        ));
    }

    fn nested_types() -> (Arc<DocumentType>, Arc<DocumentType>) {
        let inner = DocumentType::builder("Inner")
            .text("label")
            .tensor("vec", TensorSpec::vector(2))
            .build()
            .unwrap();
        let outer = DocumentType::builder("Outer")
            .document("inner", inner.clone())
            .build()
            .unwrap();
        (inner, outer)
    }

    fn inner_doc(ty: &Arc<DocumentType>, id: &str, label: &str, v: f32) -> Document {
        Document::new(ty, id)
            .with("label", label)
            .unwrap()
            .with("vec", vec![v, v])
            .unwrap()
    }

    #[test]
    fn test_bound_nested_write() {
        let (inner, outer) = nested_types();
        let docs: Vec<DocumentView> = (0..2)
            .map(|i| {
                Document::new(&outer, format!("o{}", i))
                    .with("inner", inner_doc(&inner, &format!("i{}", i), "old", i as f32))
                    .unwrap()
                    .into_view()
            })
            .collect();
        let store = ColumnStore::from_batch(&outer, &docs).unwrap();

        let mut view = store.bind(1).unwrap();
        view.set("inner", inner_doc(&inner, "new", "fresh", 7.0)).unwrap();

        let stored = store.value_at("inner", 1).unwrap();
        let stored = stored.as_doc().unwrap();
        assert_eq!(stored.get("label").unwrap(), &Value::Text("fresh".to_string()));
        assert_eq!(stored.id(), "new");

        let nested_view = store.bind(1).unwrap().get_doc("inner").unwrap();
        assert!(nested_view.is_bound());
        assert_eq!(
            nested_view.get("vec").unwrap(),
            Value::Tensor(Tensor::from_vec(vec![7.0, 7.0]))
        );
    }

    #[test]
    fn test_bound_nested_write_rolls_back() {
        let (inner, outer) = nested_types();
        let docs = vec![Document::new(&outer, "o0")
            .with("inner", inner_doc(&inner, "i0", "kept", 1.0))
            .unwrap()
            .into_view()];
        let store = ColumnStore::from_batch(&outer, &docs).unwrap();

        // the nested tensor is missing, so the row write fails after the
        // id and label were already written
        let broken = Document::new(&inner, "bad").with("label", "lost").unwrap();
        let mut view = store.bind(0).unwrap();
        assert!(view.set("inner", broken).is_err());

        let stored = store.value_at("inner", 0).unwrap();
        let stored = stored.as_doc().unwrap();
        assert_eq!(stored.id(), "i0");
        assert_eq!(stored.get("label").unwrap(), &Value::Text("kept".to_string()));
    }

    #[test]
    fn test_get_path() {
        let (inner, outer) = nested_types();
        let doc = Document::new(&outer, "o")
            .with("inner", inner_doc(&inner, "i", "deep", 0.0))
            .unwrap();
        assert_eq!(
            doc.get_path("inner.label").unwrap(),
            &Value::Text("deep".to_string())
        );
        assert!(doc.get_path("inner.label.more").is_err());
    }
}
