//! XML-RPC value model
//!
//! `Value` mirrors the data types an XML-RPC document can carry. Handlers
//! receive their parameters as a slice of `Value` and use the `expect_*`
//! helpers to pull typed arguments out, turning shape mismatches into
//! `InvalidArgument` faults.

use crate::fault::{RpcResult, ServiceError};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Wire format of `dateTime.iso8601` values. The protocol carries no zone.
pub const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%S";

/// Extended form accepted on input only.
pub const DATETIME_FORMAT_DASHED: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `i4`, `int` and `i8`
    Int(i64),
    Boolean(bool),
    String(String),
    Double(f64),
    DateTime(NaiveDateTime),
    Base64(Vec<u8>),
    Struct(BTreeMap<String, Value>),
    Array(Vec<Value>),
    Nil,
}

impl Value {
    /// Name of the XML-RPC type, as used in method signatures.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(i) if i32::try_from(*i).is_ok() => "int",
            Value::Int(_) => "i8",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Double(_) => "double",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            Value::Nil => "nil",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Build a struct value from `(name, value)` pairs.
    pub fn structure<I, K>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Struct(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

/// A numeric argument, kept integral when both operands are integers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Double(f64),
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Value::Int(i),
            Number::Double(d) => Value::Double(d),
        }
    }
}

fn argument<'a>(params: &'a [Value], index: usize, method: &str) -> RpcResult<&'a Value> {
    params.get(index).ok_or_else(|| {
        ServiceError::invalid_argument(method, format!("missing argument {}", index + 1))
    })
}

/// Fetch a string argument at `index`.
pub fn expect_str<'a>(params: &'a [Value], index: usize, method: &str) -> RpcResult<&'a str> {
    let value = argument(params, index, method)?;
    value.as_str().ok_or_else(|| {
        ServiceError::invalid_argument(
            method,
            format!("argument {} must be a string, got {}", index + 1, value.type_name()),
        )
    })
}

/// Fetch a numeric (`int`, `i8` or `double`) argument at `index`.
pub fn expect_number(params: &[Value], index: usize, method: &str) -> RpcResult<Number> {
    match argument(params, index, method)? {
        Value::Int(i) => Ok(Number::Int(*i)),
        Value::Double(d) => Ok(Number::Double(*d)),
        other => Err(ServiceError::invalid_argument(
            method,
            format!("argument {} must be a number, got {}", index + 1, other.type_name()),
        )),
    }
}
