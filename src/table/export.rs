//! Arrow export for renderers
//!
//! Column types are inferred from the values present: all integers give
//! `Int64`, any mix of numbers gives `Float64`, all booleans give
//! `Boolean`, anything else is rendered to `Utf8`. `Null` cells become
//! Arrow nulls.

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use super::Table;
use crate::value::Value;
use crate::Result;

fn infer(values: &[Option<&Value>]) -> DataType {
    let present: Vec<&Value> = values.iter().flatten().copied().filter(|v| !v.is_null()).collect();
    if present.is_empty() {
        DataType::Utf8
    } else if present.iter().all(|v| matches!(v, Value::Int(_))) {
        DataType::Int64
    } else if present.iter().all(|v| v.is_number()) {
        DataType::Float64
    } else if present.iter().all(|v| matches!(v, Value::Bool(_))) {
        DataType::Boolean
    } else {
        DataType::Utf8
    }
}

/// A cell that holds a non-null value.
fn present(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| !v.is_null())
}

fn column_array(values: &[Option<&Value>], data_type: &DataType) -> ArrayRef {
    match data_type {
        DataType::Int64 => Arc::new(Int64Array::from(
            values.iter().map(|v| present(*v).and_then(Value::as_i64)).collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            values.iter().map(|v| present(*v).and_then(Value::as_f64)).collect::<Vec<_>>(),
        )),
        DataType::Boolean => Arc::new(BooleanArray::from(
            values.iter().map(|v| present(*v).and_then(Value::as_bool)).collect::<Vec<_>>(),
        )),
        _ => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| {
                    present(*v).map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                })
                .collect::<Vec<_>>(),
        )),
    }
}

impl Table {
    /// Convert to an Arrow record batch, one field per column.
    ///
    /// # Errors
    ///
    /// [`Error::Arrow`](crate::Error::Arrow) if Arrow rejects the batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.columns().len());
        let mut arrays = Vec::with_capacity(self.columns().len());
        for column in self.columns() {
            let values: Vec<Option<&Value>> = self.rows().iter().map(|r| r.get(column)).collect();
            let data_type = infer(&values);
            arrays.push(column_array(&values, &data_type));
            fields.push(Field::new(column.as_str(), data_type, true));
        }
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
        Ok(batch)
    }
}
