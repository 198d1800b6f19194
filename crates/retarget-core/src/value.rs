//! Runtime values exchanged with proxied objects

use crate::object::Object;
use retarget_bytecode::FieldType;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a runtime object
pub type ObjectRef = Arc<dyn Object>;

/// A runtime value
#[derive(Clone)]
pub enum Value {
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Double(f64),
    /// String
    Str(Arc<str>),
    /// Object reference
    Object(ObjectRef),
}

impl Value {
    /// Zero value for a field of the given descriptor
    pub fn default_for(descriptor: &str) -> Value {
        match FieldType::parse(descriptor) {
            Ok(FieldType::Boolean) => Value::Bool(false),
            Ok(FieldType::Double | FieldType::Float) => Value::Double(0.0),
            Ok(
                FieldType::Byte
                | FieldType::Char
                | FieldType::Int
                | FieldType::Long
                | FieldType::Short,
            ) => Value::Int(0),
            _ => Value::Null,
        }
    }

    /// Check if this is a null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Object payload
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}

impl PartialEq for Value {
    /// Objects compare by identity
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value:?}"),
            Value::Str(value) => write!(f, "{value:?}"),
            Value::Object(object) => write!(f, "<{}>", object.class_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(Value::default_for("I"), Value::Int(0));
        assert_eq!(Value::default_for("Z"), Value::Bool(false));
        assert_eq!(Value::default_for("D"), Value::Double(0.0));
        assert_eq!(Value::default_for("Lpkg/R;"), Value::Null);
        assert_eq!(Value::default_for("[I"), Value::Null);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from(3).as_int(), Some(3));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert!(Value::Null.is_null());
        assert_eq!(format!("{:?}", Value::from(1.5)), "1.5");
    }
}
