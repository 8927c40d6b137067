//! Column-wise storage for a batch of documents
//!
//! A [`ColumnStore`] keeps one buffer per field:
//!
//! - tensor fields live in one contiguous `f32` buffer of fixed-width rows
//! - nested document fields are stacked into a child `ColumnStore`
//! - every other field keeps one [`Value`] per row
//!
//! Documents handed out by [`ColumnStore::bind`] are views into these
//! buffers. Each column sits behind its own lock, so reads of distinct rows
//! never block each other; writers must still be serialized by the caller
//! per row.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::document::{BoundDoc, Document, DocumentView};
use crate::error::{MutationError, Result, SchemaError, StorageError};
use crate::schema::{DocumentType, FieldDef, FieldKind};
use crate::value::{Tensor, Value};

/// Physical buffer of one field.
///
/// Tensor and nested-document columns keep a presence flag per row so that
/// `Null` fields stack like any other value: absent tensor rows are
/// zero-filled and absent nested rows hold an all-`Null` placeholder.
pub(crate) enum Column {
    Values(Vec<Value>),
    Tensor {
        /// `None` until a row holds a tensor when the field declares no shape
        shape: Option<Vec<usize>>,
        data: Vec<f32>,
        present: Vec<bool>,
    },
    Docs {
        store: ColumnStore,
        present: Vec<bool>,
    },
}

impl Column {
    fn stack(field: &FieldDef, values: Vec<Value>) -> Result<Self> {
        match &field.kind {
            FieldKind::Tensor(spec) => {
                let shape = values
                    .iter()
                    .find_map(|value| match value {
                        Value::Tensor(t) => Some(t.shape().to_vec()),
                        _ => None,
                    })
                    .or_else(|| spec.shape.clone());
                let width: usize = shape.as_deref().map_or(0, |s| s.iter().product());
                let mut data = Vec::with_capacity(width * values.len());
                let mut present = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Value::Null => {
                            data.resize(data.len() + width, 0.0);
                            present.push(false);
                        }
                        Value::Tensor(t) if Some(t.shape()) == shape.as_deref() => {
                            data.extend_from_slice(t.data());
                            present.push(true);
                        }
                        Value::Tensor(t) => {
                            return Err(MutationError::ShapeMismatch {
                                field: field.name.clone(),
                                expected: shape.unwrap_or_default(),
                                got: t.shape().to_vec(),
                            }
                            .into())
                        }
                        other => return Err(invalid_value(field, &other)),
                    }
                }
                Ok(Column::Tensor {
                    shape,
                    data,
                    present,
                })
            }
            FieldKind::Document(ty) => {
                let mut docs = Vec::with_capacity(values.len());
                let mut present = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Value::Doc(doc) => {
                            docs.push(doc);
                            present.push(true);
                        }
                        Value::Null => {
                            docs.push(Document::from_values(ty.clone(), vec![Value::Null; ty.len()]));
                            present.push(false);
                        }
                        other => return Err(invalid_value(field, &other)),
                    }
                }
                Ok(Column::Docs {
                    store: ColumnStore::from_documents(ty, docs)?,
                    present,
                })
            }
            _ => Ok(Column::Values(values)),
        }
    }
}

fn invalid_value(field: &FieldDef, value: &Value) -> crate::error::IndexError {
    SchemaError::InvalidValue {
        field: field.name.clone(),
        expected: field.kind.to_string(),
        got: value.type_name().to_string(),
    }
    .into()
}

fn tensor_slot(shape: &[usize], data: &[f32], index: usize) -> Vec<f32> {
    let width: usize = shape.iter().product();
    data[index * width..(index + 1) * width].to_vec()
}

/// Shared state behind a ColumnStore and its bound views
pub(crate) struct StoreInner {
    ty: Arc<DocumentType>,
    len: usize,
    columns: Vec<RwLock<Column>>,
    generation: AtomicU64,
}

impl StoreInner {
    pub(crate) fn doc_type(&self) -> &Arc<DocumentType> {
        &self.ty
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        for column in &self.columns {
            if let Column::Docs { store, .. } = &*column.read() {
                store.inner.invalidate();
            }
        }
    }

    pub(crate) fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len {
            return Err(StorageError::IndexOutOfBounds {
                index,
                len: self.len,
            }
            .into());
        }
        Ok(())
    }

    /// Copy of one slot; absent tensors and nested documents read as `Null`
    pub(crate) fn read(&self, field: usize, index: usize) -> Value {
        match &*self.columns[field].read() {
            Column::Values(values) => values[index].clone(),
            Column::Tensor {
                shape: Some(shape),
                data,
                present,
            } if present[index] => Tensor::new(shape.clone(), tensor_slot(shape, data, index))
                .map(Value::Tensor)
                .unwrap_or_default(),
            Column::Tensor { .. } => Value::Null,
            Column::Docs { store, present } if present[index] => {
                Value::Doc(store.inner.row_document(index))
            }
            Column::Docs { .. } => Value::Null,
        }
    }

    /// Bound view into the child store of a nested document column; `None`
    /// for other columns and for rows without a nested document
    pub(crate) fn child_view(&self, field: usize, index: usize) -> Option<DocumentView> {
        match &*self.columns[field].read() {
            Column::Docs { store, present } if present[index] => Some(store.view(index)),
            _ => None,
        }
    }

    pub(crate) fn row_document(&self, index: usize) -> Document {
        let values = (0..self.columns.len())
            .map(|field| self.read(field, index))
            .collect();
        Document::from_values(self.ty.clone(), values)
    }

    /// Write an already validated value into one slot.
    ///
    /// Tensor slots are overwritten in place, keeping the column buffer;
    /// nested documents go through the child store's row write.
    pub(crate) fn write(&self, field: usize, index: usize, value: Value) -> Result<()> {
        let def = &self.ty.fields()[field];

        let mut column = self.columns[field].write();
        match &mut *column {
            Column::Docs { store, present } => match value {
                Value::Null => present[index] = false,
                Value::Doc(doc) => {
                    store.inner.write_row(index, &doc)?;
                    present[index] = true;
                }
                other => return Err(invalid_value(def, &other)),
            },
            Column::Tensor {
                shape,
                data,
                present,
            } => match value {
                Value::Null => {
                    present[index] = false;
                }
                Value::Tensor(tensor) => {
                    if shape.is_none() {
                        // first tensor of an undeclared column fixes the row width
                        data.resize(tensor.len() * present.len(), 0.0);
                        *shape = Some(tensor.shape().to_vec());
                    }
                    let expected = shape.as_deref().unwrap_or_default();
                    // shape is checked before the slot is touched
                    if tensor.shape() != expected {
                        return Err(MutationError::ShapeMismatch {
                            field: def.name.clone(),
                            expected: expected.to_vec(),
                            got: tensor.shape().to_vec(),
                        }
                        .into());
                    }
                    let width = tensor.len();
                    data[index * width..(index + 1) * width].copy_from_slice(tensor.data());
                    present[index] = true;
                }
                other => return Err(invalid_value(def, &other)),
            },
            Column::Values(values) => values[index] = value,
        }
        Ok(())
    }

    /// Replace a whole row; on failure every field already written is
    /// restored before the error is returned.
    pub(crate) fn write_row(&self, index: usize, doc: &Document) -> Result<()> {
        self.check_index(index)?;
        if doc.doc_type().as_ref() != self.ty.as_ref() {
            return Err(SchemaError::InvalidValue {
                field: self.ty.name().to_string(),
                expected: format!("document<{}>", self.ty.name()),
                got: format!("document<{}>", doc.doc_type().name()),
            }
            .into());
        }

        let snapshot: Vec<Value> = (0..self.columns.len())
            .map(|field| self.read(field, index))
            .collect();

        for (field, value) in doc.values().iter().enumerate() {
            let Err(err) = self.write(field, index, value.clone()) else {
                continue;
            };
            for (restored, old) in snapshot.into_iter().enumerate().take(field) {
                if let Err(restore_err) = self.write(restored, index, old) {
                    return Err(MutationError::RollbackFailed {
                        field: self.ty.fields()[restored].name.clone(),
                        cause: err.to_string(),
                        reason: restore_err.to_string(),
                    }
                    .into());
                }
            }
            return Err(err);
        }
        Ok(())
    }
}

/// Column-wise storage for a batch of documents of one type
pub struct ColumnStore {
    inner: Arc<StoreInner>,
}

impl ColumnStore {
    /// Stack a batch of documents into column buffers
    pub fn from_batch(ty: &Arc<DocumentType>, docs: &[DocumentView]) -> Result<Self> {
        let docs = docs
            .iter()
            .map(DocumentView::to_document)
            .collect::<Result<Vec<_>>>()?;
        let store = Self::from_documents(ty, docs)?;
        log::debug!(
            "Stacked {} documents of type {} into columns",
            store.len(),
            ty.name()
        );
        Ok(store)
    }

    pub(crate) fn from_documents(ty: &Arc<DocumentType>, docs: Vec<Document>) -> Result<Self> {
        let len = docs.len();
        let mut per_field: Vec<Vec<Value>> = ty
            .fields()
            .iter()
            .map(|_| Vec::with_capacity(len))
            .collect();

        for doc in docs {
            if doc.doc_type().as_ref() != ty.as_ref() {
                return Err(SchemaError::InvalidValue {
                    field: ty.name().to_string(),
                    expected: format!("document<{}>", ty.name()),
                    got: format!("document<{}>", doc.doc_type().name()),
                }
                .into());
            }
            for (field, value) in doc.into_values().into_iter().enumerate() {
                per_field[field].push(value);
            }
        }

        let columns = ty
            .fields()
            .iter()
            .zip(per_field)
            .map(|(def, values)| Column::stack(def, values).map(RwLock::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                ty: ty.clone(),
                len,
                columns,
                generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn doc_type(&self) -> &Arc<DocumentType> {
        &self.inner.ty
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    fn view(&self, index: usize) -> DocumentView {
        DocumentView::Bound(BoundDoc::new(
            Arc::downgrade(&self.inner),
            self.inner.generation(),
            self.inner.ty.clone(),
            index,
        ))
    }

    /// Bound view of row `index`; no data is copied
    pub fn bind(&self, index: usize) -> Result<DocumentView> {
        self.inner.check_index(index)?;
        Ok(self.view(index))
    }

    /// Bound views of every row, in order
    pub fn iter(&self) -> impl Iterator<Item = DocumentView> + '_ {
        (0..self.len()).map(move |index| self.view(index))
    }

    /// Owned copies of every row
    pub fn to_batch(&self) -> Vec<Document> {
        (0..self.len())
            .map(|index| self.inner.row_document(index))
            .collect()
    }

    /// Tear the store down into owned documents; views bound to it go stale
    pub fn unstack(self) -> Vec<Document> {
        let docs = self.to_batch();
        self.inner.invalidate();
        log::debug!("Unstacked {} documents of type {}", docs.len(), self.inner.ty.name());
        docs
    }

    /// Copy of the value stored at `field`, row `index`
    pub fn value_at(&self, field: &str, index: usize) -> Result<Value> {
        let (field, _) = self.inner.ty.require(field)?;
        self.inner.check_index(index)?;
        Ok(self.inner.read(field, index))
    }

    /// Copies of every value in one column
    pub fn column_values(&self, field: &str) -> Result<Vec<Value>> {
        let (field, _) = self.inner.ty.require(field)?;
        Ok((0..self.len())
            .map(|index| self.inner.read(field, index))
            .collect())
    }

    /// Flat row of a tensor column; a row without a tensor is an error
    pub fn tensor_row(&self, field: &str, index: usize) -> Result<Vec<f32>> {
        let (field_idx, def) = self.inner.ty.require(field)?;
        self.inner.check_index(index)?;
        match &*self.inner.columns[field_idx].read() {
            Column::Tensor {
                shape: Some(shape),
                data,
                present,
            } if present[index] => Ok(tensor_slot(shape, data, index)),
            Column::Tensor { .. } => Err(invalid_value(def, &Value::Null)),
            _ => Err(not_a_tensor(def)),
        }
    }

    /// Start of a tensor column's buffer; stable for the life of the store
    /// once the column holds a tensor
    pub fn tensor_buffer_ptr(&self, field: &str) -> Result<*const f32> {
        let (field_idx, def) = self.inner.ty.require(field)?;
        match &*self.inner.columns[field_idx].read() {
            Column::Tensor { data, .. } => Ok(data.as_ptr()),
            _ => Err(not_a_tensor(def)),
        }
    }

    /// Column-level write. Unlike writes through a bound view this also
    /// accepts immutable tensor fields.
    pub fn set_value(&self, field: &str, index: usize, value: impl Into<Value>) -> Result<()> {
        let (field_idx, def) = self.inner.ty.require(field)?;
        self.inner.check_index(index)?;
        let value = crate::value::coerce(def, value.into())?;
        self.inner.write(field_idx, index, value)
    }
}

fn not_a_tensor(def: &FieldDef) -> crate::error::IndexError {
    SchemaError::InvalidValue {
        field: def.name.clone(),
        expected: "tensor".to_string(),
        got: def.kind.to_string(),
    }
    .into()
}

impl fmt::Debug for ColumnStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnStore")
            .field("doc_type", &self.inner.ty.name())
            .field("len", &self.inner.len)
            .field("generation", &self.inner.generation())
            .finish()
    }
}
