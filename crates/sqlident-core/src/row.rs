//! Result rows from prefetch, returning and post-read queries, and from
//! catalog reflection.

use std::sync::Arc;

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;

/// A single row returned from the session.
///
/// Values are addressed by position (returning clauses list key columns in
/// a known order) or by name (catalog queries). Rows of one result set can
/// share their column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    names: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_names(names.into(), values)
    }

    /// Build a row that shares `names` with its siblings.
    pub fn with_names(names: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { names, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Look a value up by column label.
    ///
    /// `testtable.id` also matches a column labelled `id`; drivers drop the
    /// table qualifier from returning columns.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let position = |label: &str| self.names.iter().position(|n| n == label);
        let index = position(name).or_else(|| {
            name.rsplit_once('.')
                .and_then(|(_, bare)| position(bare))
        })?;
        self.values.get(index)
    }

    /// Decode the named column.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let Some(value) = self.get_by_name(name) else {
            return Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: "no such column".to_string(),
                column: Some(name.to_string()),
                rust_type: None,
            }));
        };
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Decoding of a single column value.
pub trait FromValue: Sized {
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
        rust_type: None,
    })
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            // information_schema spells flags as YES/NO
            Value::Text(s) => Ok(s.eq_ignore_ascii_case("yes") || s == "1"),
            other => other
                .as_i64()
                .map(|v| v != 0)
                .ok_or_else(|| mismatch("bool", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
