// src/value.rs - Typed tag values and quality scores
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ScadaError};

/// A single observed tag value
///
/// Serialized untagged so the wire shape is the bare JSON scalar
/// (`120.5`, `42`, `true`, `"OPEN"`).
///
/// # Examples
///
/// ```rust
/// use pipeline_scada::Value;
///
/// let pressure = Value::Float(5.4);
/// let running = Value::Boolean(true);
///
/// assert_eq!(pressure.as_float(), Some(5.4));
/// assert_eq!(running.as_float(), Some(1.0));
/// assert_eq!(Value::String("OPEN".into()).as_float(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value
    Boolean(bool),
    /// Integer value (64-bit)
    Integer(i64),
    /// Floating-point value (64-bit)
    Float(f64),
    /// Free-form string value
    String(String),
}

/// Declared data type of a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float,
    Integer,
    Boolean,
    String,
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Float
    }
}

impl DataType {
    /// Whether values of this type can be compared against numeric thresholds
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Float | DataType::Integer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Float => "float",
            DataType::Integer => "integer",
            DataType::Boolean => "boolean",
            DataType::String => "string",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Convert to float if the value is numeric or boolean
    ///
    /// Booleans map to `0.0`/`1.0`; strings have no numeric reading.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(_) => None,
        }
    }

    /// Convert to boolean if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0 && !f.is_nan()),
            Value::String(_) => None,
        }
    }

    /// Runtime data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Float(_) => DataType::Float,
            Value::Integer(_) => DataType::Integer,
            Value::Boolean(_) => DataType::Boolean,
            Value::String(_) => DataType::String,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        self.data_type().as_str()
    }

    /// Check this value against a tag's declared type
    ///
    /// Integers are widened for float tags; every other mismatch is rejected,
    /// as are non-finite floats.
    pub fn normalize_for(self, declared: DataType) -> Result<Value> {
        let value = match (declared, self) {
            (DataType::Float, Value::Integer(i)) => Value::Float(i as f64),
            (declared, value) if value.data_type() == declared => value,
            (declared, value) => {
                return Err(ScadaError::InvalidValue(format!(
                    "expected {}, got {}",
                    declared,
                    value.type_name()
                )))
            }
        };

        if let Value::Float(f) = value {
            if !f.is_finite() {
                return Err(ScadaError::InvalidValue(format!(
                    "non-finite float {}",
                    f
                )));
            }
        }

        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Confidence score (0-100) attached to every tag value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
    /// Highest confidence; the default for values without an explicit score
    pub const GOOD: Quality = Quality(100);

    pub fn new(score: u8) -> Result<Self> {
        if score > 100 {
            return Err(ScadaError::InvalidValue(format!(
                "quality {} outside 0..=100",
                score
            )));
        }
        Ok(Quality(score))
    }

    pub fn score(&self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::GOOD
    }
}

impl TryFrom<u8> for Quality {
    type Error = ScadaError;

    fn try_from(score: u8) -> Result<Self> {
        Quality::new(score)
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> u8 {
        q.0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
