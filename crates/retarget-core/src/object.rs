//! Runtime object model
//!
//! Objects expose their public fields and dispatch calls by name and
//! descriptor. Plain instances get their behavior from a [`Behavior`] table
//! of native handlers installed when the instance is created.

use crate::pool::LoadedUnit;
use crate::proxy::{Proxy, ProxyError};
use crate::value::{ObjectRef, Value};
use parking_lot::RwLock;
use retarget_bytecode::access;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while dispatching calls on runtime objects
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The receiver has no such method
    #[error("No method {name}{descriptor} on {class}")]
    NoSuchMethod {
        /// Receiver class
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// The receiver has no such field
    #[error("No field {field} on {class}")]
    NoSuchField {
        /// Receiver class
        class: String,
        /// Field name
        field: String,
    },

    /// A proxy was invoked before a handler was installed
    #[error("Proxy of {0} has no call handler")]
    Unhandled(String),

    /// A method body reported failure
    #[error("{class}.{name} failed: {message}")]
    Failed {
        /// Receiver class
        class: String,
        /// Method name
        name: String,
        /// Failure description
        message: String,
    },

    /// Proxying a forwarded result failed
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// A runtime object
pub trait Object: Send + Sync {
    /// Name of the object's class in slash form
    fn class_name(&self) -> &str;

    /// Read a field
    fn get_field(&self, name: &str) -> Option<Value>;

    /// Write a field
    fn set_field(&self, name: &str, value: Value) -> Result<(), RuntimeError>;

    /// Call a method
    fn invoke(&self, name: &str, descriptor: &str, args: &[Value]) -> Result<Value, RuntimeError>;

    /// Downcast to a proxy
    fn as_proxy(&self) -> Option<&Proxy> {
        None
    }
}

/// Native method body
pub type NativeMethod =
    Arc<dyn Fn(&Instance, &[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Dispatch table of native method bodies keyed by name and descriptor
#[derive(Clone, Default)]
pub struct Behavior {
    methods: FxHashMap<(String, String), NativeMethod>,
}

impl Behavior {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method body
    pub fn with<F>(mut self, name: &str, descriptor: &str, body: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.methods
            .insert((name.to_string(), descriptor.to_string()), Arc::new(body));
        self
    }

    /// Look up a method body
    pub fn get(&self, name: &str, descriptor: &str) -> Option<&NativeMethod> {
        self.methods
            .get(&(name.to_string(), descriptor.to_string()))
    }

    /// Number of methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Plain object with named fields and a dispatch table
pub struct Instance {
    class_name: String,
    fields: RwLock<FxHashMap<String, Value>>,
    behavior: Arc<Behavior>,
}

impl Instance {
    /// Create an instance with no fields
    pub fn new(class_name: impl Into<String>, behavior: Arc<Behavior>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: RwLock::new(FxHashMap::default()),
            behavior,
        }
    }

    /// Create an instance of a loaded unit with its instance fields zeroed
    pub fn of_unit(unit: &LoadedUnit, behavior: Arc<Behavior>) -> Self {
        let fields = unit
            .unit()
            .fields
            .iter()
            .filter(|field| field.access & access::STATIC == 0)
            .map(|field| (field.name.clone(), Value::default_for(&field.descriptor)))
            .collect();
        Self {
            class_name: unit.name().to_string(),
            fields: RwLock::new(fields),
            behavior,
        }
    }

    /// Set a field while building the instance
    pub fn with_field(self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.write().insert(name.to_string(), value.into());
        self
    }

    /// Wrap in a shared handle
    pub fn into_ref(self) -> ObjectRef {
        Arc::new(self)
    }
}

impl Object for Instance {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    fn set_field(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.fields.write().insert(name.to_string(), value);
        Ok(())
    }

    fn invoke(&self, name: &str, descriptor: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let body = self
            .behavior
            .get(name, descriptor)
            .ok_or_else(|| RuntimeError::NoSuchMethod {
                class: self.class_name.clone(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })?;
        body(self, args)
    }
}
