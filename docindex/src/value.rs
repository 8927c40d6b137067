//! Runtime field values
//!
//! [`Value`] is what a document field holds at runtime. [`coerce`] applies
//! the validation rules of a field's semantic kind; owned documents and
//! bound views run every assignment through it.

use crate::document::Document;
use crate::error::{MutationError, Result, SchemaError};
use crate::schema::{FieldDef, FieldKind, TensorSpec, ID_FIELD};

/// Dense float32 tensor stored row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Tensor with an explicit shape; `None` if the element count disagrees
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<f32>) -> Option<Self> {
        let shape = shape.into();
        if shape.iter().product::<usize>() != data.len() {
            return None;
        }
        Some(Self { shape, data })
    }

    /// One-dimensional tensor
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Same elements under another shape
    pub fn reshape(self, shape: &[usize]) -> Option<Self> {
        Self::new(shape.to_vec(), self.data)
    }
}

impl From<Vec<f32>> for Tensor {
    fn from(data: Vec<f32>) -> Self {
        Self::from_vec(data)
    }
}

/// Value held by one document field
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Tensor(Tensor),
    TensorSeq(Vec<Tensor>),
    Doc(Document),
}

impl Value {
    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Tensor(_) => "tensor",
            Self::TensorSeq(_) => "sequence<tensor>",
            Self::Doc(_) => "document",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_doc(&self) -> Option<&Document> {
        match self {
            Self::Doc(d) => Some(d),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Self::Tensor(Tensor::from_vec(v))
    }
}

impl From<Tensor> for Value {
    fn from(v: Tensor) -> Self {
        Self::Tensor(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Self::Doc(v)
    }
}

fn invalid(field: &FieldDef, got: &Value) -> SchemaError {
    SchemaError::InvalidValue {
        field: field.name.clone(),
        expected: field.kind.to_string(),
        got: got.type_name().to_string(),
    }
}

fn coerce_tensor(field: &FieldDef, spec: &TensorSpec, tensor: Tensor) -> Result<Tensor> {
    let Some(shape) = &spec.shape else {
        return Ok(tensor);
    };
    if tensor.shape() == shape.as_slice() {
        return Ok(tensor);
    }

    let got = tensor.shape().to_vec();
    tensor.reshape(shape).ok_or_else(|| {
        MutationError::ShapeMismatch {
            field: field.name.clone(),
            expected: shape.clone(),
            got,
        }
        .into()
    })
}

/// Validate `value` against `field`, widening or reshaping where allowed
pub(crate) fn coerce(field: &FieldDef, value: Value) -> Result<Value> {
    if value.is_null() {
        if field.name == ID_FIELD {
            return Err(invalid(field, &value).into());
        }
        return Ok(value);
    }

    let coerced = match (&field.kind, value) {
        (FieldKind::Int, Value::Int(v)) => Value::Int(v),
        (FieldKind::Int, Value::Bool(v)) => Value::Int(v as i64),
        (FieldKind::Float, Value::Float(v)) => Value::Float(v),
        (FieldKind::Float, Value::Int(v)) => Value::Float(v as f64),
        (FieldKind::Bool, Value::Bool(v)) => Value::Bool(v),
        (FieldKind::Text, Value::Text(v)) => Value::Text(v),
        (FieldKind::Bytes, Value::Bytes(v)) => Value::Bytes(v),
        (FieldKind::Tensor(spec), Value::Tensor(t)) => {
            Value::Tensor(coerce_tensor(field, spec, t)?)
        }
        (FieldKind::TensorSequence(spec), Value::TensorSeq(seq)) => Value::TensorSeq(
            seq.into_iter()
                .map(|t| coerce_tensor(field, spec, t))
                .collect::<Result<Vec<_>>>()?,
        ),
        (FieldKind::Document(ty), Value::Doc(doc)) => {
            if doc.doc_type().as_ref() != ty.as_ref() {
                return Err(SchemaError::InvalidValue {
                    field: field.name.clone(),
                    expected: field.kind.to_string(),
                    got: format!("document<{}>", doc.doc_type().name()),
                }
                .into());
            }
            Value::Doc(doc)
        }
        (_, other) => return Err(invalid(field, &other).into()),
    };

    Ok(coerced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;

    #[test]
    fn test_tensor_new_checks_element_count() {
        assert!(Tensor::new([2, 2], vec![1.0; 4]).is_some());
        assert!(Tensor::new([2, 2], vec![1.0; 3]).is_none());
    }

    #[test]
    fn test_coerce_widens_int_to_float() {
        let field = FieldDef::new("price", FieldKind::Float);
        assert_eq!(coerce(&field, Value::Int(3)).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_coerce_bool_to_int() {
        let field = FieldDef::new("count", FieldKind::Int);
        assert_eq!(coerce(&field, Value::Bool(true)).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_coerce_rejects_wrong_kind() {
        let field = FieldDef::new("title", FieldKind::Text);
        let err = coerce(&field, Value::Int(1)).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Schema(SchemaError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_coerce_reshapes_tensor() {
        let field = FieldDef::new("t", FieldKind::Tensor(TensorSpec::with_shape([2, 2])));
        let value = coerce(&field, Value::from(vec![1.0f32, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(value.as_tensor().unwrap().shape(), &[2, 2]);
    }

    #[test]
    fn test_coerce_tensor_shape_mismatch() {
        let field = FieldDef::new("t", FieldKind::Tensor(TensorSpec::vector(4)));
        let err = coerce(&field, Value::from(vec![1.0f32, 2.0])).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Mutation(MutationError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_coerce_null() {
        let field = FieldDef::new("title", FieldKind::Text);
        assert_eq!(coerce(&field, Value::Null).unwrap(), Value::Null);

        let id = FieldDef::new(ID_FIELD, FieldKind::Text);
        assert!(coerce(&id, Value::Null).is_err());
    }
}
