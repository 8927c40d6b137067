//! Document bodies for backend storage
//!
//! Documents are stored as JSON trees: nested documents become nested
//! objects, tensors become flat `float32` arrays, booleans are stored as
//! `0`/`1` so numeric indexes can see them and bytes are base64 encoded.
//! Decoding walks the schema's column descriptors (backend column to
//! semantic field) and reshapes tensors to the field's declared shape.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Number, Value as Json};

use crate::document::Document;
use crate::error::{IndexError, Result};
use crate::introspect::{ColumnDescriptor, Schema, PATH_SEPARATOR};
use crate::schema::{DocumentType, FieldKind, ID_FIELD};
use crate::value::{Tensor, Value};

/// JSON form of a single value; `None` for values that are not stored
pub fn encode_value(value: &Value) -> Option<Json> {
    match value {
        Value::Null => None,
        Value::Int(v) => Some(Json::from(*v)),
        Value::Float(v) => Number::from_f64(*v).map(Json::Number),
        Value::Bool(v) => Some(Json::from(*v as i64)),
        Value::Text(v) => Some(Json::String(v.clone())),
        Value::Bytes(v) => Some(Json::String(BASE64.encode(v))),
        Value::Tensor(t) => Some(encode_tensor(t)),
        Value::TensorSeq(seq) => Some(Json::Array(seq.iter().map(encode_tensor).collect())),
        Value::Doc(doc) => Some(encode_document(doc)),
    }
}

fn encode_tensor(tensor: &Tensor) -> Json {
    Json::Array(
        tensor
            .data()
            .iter()
            .map(|&x| Number::from_f64(f64::from(x)).map_or(Json::Null, Json::Number))
            .collect(),
    )
}

/// Whole document as a JSON object
pub fn encode_document(doc: &Document) -> Json {
    let mut body = Map::new();
    for (field, value) in doc.doc_type().fields().iter().zip(doc.values()) {
        if let Some(json) = encode_value(value) {
            body.insert(field.name.clone(), json);
        }
    }
    Json::Object(body)
}

/// Place `value` at `path` inside `body`, creating intermediate objects
pub fn insert_at_path(body: &mut Map<String, Json>, path: &[String], value: Json) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = body;
    for part in parents {
        let entry = node
            .entry(part.clone())
            .or_insert_with(|| Json::Object(Map::new()));
        if !entry.is_object() {
            *entry = Json::Object(Map::new());
        }
        node = match entry {
            Json::Object(map) => map,
            _ => return,
        };
    }
    node.insert(last.clone(), value);
}

/// Value at `path` inside a JSON body
pub fn lookup_path<'a>(body: &'a Json, path: &[String]) -> Option<&'a Json> {
    path.iter().try_fold(body, |node, part| node.get(part))
}

fn decode_error(column: &ColumnDescriptor, json: &Json) -> IndexError {
    IndexError::decode(format!(
        "column '{}' expected {}, found {}",
        column.name, column.semantic_kind, json
    ))
}

/// Decode one stored leaf according to its column's semantic kind
pub fn decode_value(column: &ColumnDescriptor, json: &Json) -> Result<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    let value = match &column.semantic_kind {
        FieldKind::Int => json
            .as_i64()
            .or_else(|| json.as_f64().map(|f| f as i64))
            .map(Value::Int),
        FieldKind::Float => json.as_f64().map(Value::Float),
        FieldKind::Bool => json
            .as_bool()
            .or_else(|| json.as_f64().map(|f| f != 0.0))
            .map(Value::Bool),
        FieldKind::Text => json.as_str().map(|s| Value::Text(s.to_string())),
        FieldKind::Bytes => json
            .as_str()
            .and_then(|s| BASE64.decode(s).ok())
            .map(Value::Bytes),
        FieldKind::Tensor(spec) => decode_floats(json).and_then(|data| {
            let tensor = Tensor::from_vec(data);
            match &spec.shape {
                Some(shape) => tensor.reshape(shape),
                None => Some(tensor),
            }
            .map(Value::Tensor)
        }),
        FieldKind::TensorSequence(_) => json.as_array().and_then(|rows| {
            rows.iter()
                .map(|row| decode_floats(row).map(Tensor::from_vec))
                .collect::<Option<Vec<_>>>()
                .map(Value::TensorSeq)
        }),
        FieldKind::Document(_) => None,
    };
    value.ok_or_else(|| decode_error(column, json))
}

fn decode_floats(json: &Json) -> Option<Vec<f32>> {
    json.as_array()?
        .iter()
        .map(|x| x.as_f64().map(|f| f as f32))
        .collect()
}

/// Rebuild a document of type `ty` from a stored JSON body
pub fn decode_document(ty: &Arc<DocumentType>, schema: &Schema, body: &Json) -> Result<Document> {
    decode_at(ty, schema, body, &[])
}

fn decode_at(
    ty: &Arc<DocumentType>,
    schema: &Schema,
    body: &Json,
    prefix: &[String],
) -> Result<Document> {
    let mut values = Vec::with_capacity(ty.len());
    for field in ty.fields() {
        let mut path = prefix.to_vec();
        path.push(field.name.clone());

        let value = match &field.kind {
            FieldKind::Document(nested) => match lookup_path(body, &path) {
                Some(json) if json.is_object() => {
                    Value::Doc(decode_at(nested, schema, body, &path)?)
                }
                _ => Value::Null,
            },
            _ => {
                let column = schema.column(&path.join(PATH_SEPARATOR)).ok_or_else(|| {
                    IndexError::decode(format!("no column for field '{}'", path.join(".")))
                })?;
                match lookup_path(body, &path) {
                    Some(json) => decode_value(column, json)?,
                    None => Value::Null,
                }
            }
        };
        values.push(value);
    }

    if !matches!(values.first(), Some(Value::Text(_))) {
        return Err(IndexError::decode(format!(
            "stored document has no '{}' at {}",
            ID_FIELD,
            if prefix.is_empty() { "$".to_string() } else { format!("$.{}", prefix.join(".")) }
        )));
    }
    Ok(Document::from_values(ty.clone(), values))
}
