//! Proxy fabric
//!
//! Lets an object of one unit masquerade as an instance of a related unit.
//! For every proxied supertype the pool synthesizes a final subtype whose
//! overridable methods are native stubs; instances of that subtype route
//! every call through a [`CallHandler`]. [`make_proxy`] installs a
//! forwarding handler that keeps public fields in sync with the wrapped
//! object and re-wraps results that belong to the wrapped object's nested
//! units.

use crate::object::{Object, RuntimeError};
use crate::pool::{LoadedUnit, PoolError, UnitPool};
use crate::value::{ObjectRef, Value};
use parking_lot::RwLock;
use retarget_bytecode::{
    access, nested_path, outermost_name, remap_descriptor, ConstantError, UnitBuilder,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use thiserror::Error;

/// Method never intercepted by proxies
const FINALIZE: &str = "finalize";

/// Proxy synthesis errors
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Final units cannot be subtyped
    #[error("Cannot proxy final unit {0}")]
    FinalSupertype(String),

    /// Resolving or defining a unit failed
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A symbol-table index did not name the expected entry
    #[error("Bad constant reference: {0}")]
    Constant(#[from] ConstantError),
}

// ===== Call handlers =====

/// Receives every intercepted call made on a proxy
pub trait CallHandler: Send + Sync {
    /// Handle a call to `name` with `descriptor`
    fn handle(
        &self,
        proxy: &Proxy,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError>;

    /// Object the handler forwards to, if any
    fn forwardee(&self) -> Option<&ObjectRef> {
        None
    }
}

// ===== Instantiator =====

/// Factory for bare proxies of one supertype
#[derive(Debug)]
pub struct ProxyInstantiator {
    supertype: String,
    proxy_unit: Arc<LoadedUnit>,
    intercepted: FxHashSet<(String, String)>,
    fields: Vec<(String, String)>,
}

impl ProxyInstantiator {
    /// Synthesize the proxy subtype of `supertype` in `pool`
    pub(crate) fn new(pool: &UnitPool, supertype: &str) -> Result<Self, ProxyError> {
        let loaded = pool.resolve(supertype)?;
        if loaded.unit().is_final() {
            return Err(ProxyError::FinalSupertype(supertype.to_string()));
        }

        // Most-derived declaration decides whether a signature is overridable
        let mut declared = FxHashSet::default();
        let mut intercepted = FxHashSet::default();
        let mut methods = Vec::new();
        let mut fields = Vec::new();
        for unit in pool.superclass_chain(supertype)? {
            for method in &unit.unit().methods {
                if method.is_static() || method.is_constructor() || method.name.starts_with('<') {
                    continue;
                }
                let key = (method.name.clone(), method.descriptor.clone());
                if !declared.insert(key.clone()) {
                    continue;
                }
                if method.is_private() || method.is_final() || method.name == FINALIZE {
                    continue;
                }
                intercepted.insert(key);
                methods.push((method.name.clone(), method.descriptor.clone()));
            }
            for field in &unit.unit().fields {
                if field.is_public()
                    && !field.is_static()
                    && !fields.iter().any(|(name, _): &(String, String)| *name == field.name)
                {
                    fields.push((field.name.clone(), field.descriptor.clone()));
                }
            }
        }

        let config = pool.config();
        let name = config.synthesized_name(&config.proxy_prefix, &[supertype]);
        let mut builder = UnitBuilder::new(&name)
            .access(access::PUBLIC | access::FINAL | access::SYNTHETIC)
            .extends(supertype);
        for (method, descriptor) in &methods {
            builder = builder.bodiless_method(method, descriptor, access::PUBLIC | access::NATIVE);
        }
        let proxy_unit = pool.define_unit(&builder.build()?, supertype)?;
        tracing::debug!(
            supertype,
            proxy = proxy_unit.name(),
            methods = methods.len(),
            "synthesized proxy unit"
        );

        Ok(Self {
            supertype: supertype.to_string(),
            proxy_unit,
            intercepted,
            fields,
        })
    }

    /// Proxied supertype
    pub fn supertype(&self) -> &str {
        &self.supertype
    }

    /// Synthesized proxy subtype
    pub fn proxy_unit(&self) -> &Arc<LoadedUnit> {
        &self.proxy_unit
    }

    /// Whether calls to `name` with `descriptor` reach the handler
    pub fn intercepts(&self, name: &str, descriptor: &str) -> bool {
        self.intercepted
            .contains(&(name.to_string(), descriptor.to_string()))
    }

    /// Public instance fields visible on the supertype, with descriptors
    pub fn public_fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Allocate a proxy with zeroed fields and no handler
    pub fn instantiate(self: &Arc<Self>) -> Proxy {
        let fields = self
            .fields
            .iter()
            .map(|(name, descriptor)| (name.clone(), Value::default_for(descriptor)))
            .collect();
        Proxy {
            instantiator: Arc::clone(self),
            fields: RwLock::new(fields),
            handler: RwLock::new(None),
        }
    }
}

// ===== Proxy objects =====

/// Instance of a synthesized proxy subtype
pub struct Proxy {
    instantiator: Arc<ProxyInstantiator>,
    fields: RwLock<FxHashMap<String, Value>>,
    handler: RwLock<Option<Arc<dyn CallHandler>>>,
}

impl Proxy {
    /// Install the call handler
    pub fn set_handler(&self, handler: Arc<dyn CallHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Installed call handler
    pub fn handler(&self) -> Option<Arc<dyn CallHandler>> {
        self.handler.read().clone()
    }

    /// Instantiator this proxy came from
    pub fn instantiator(&self) -> &Arc<ProxyInstantiator> {
        &self.instantiator
    }

    /// Whether the proxy declares the field `name`
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.read().contains_key(name)
    }
}

impl Object for Proxy {
    fn class_name(&self) -> &str {
        self.instantiator.proxy_unit.name()
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    fn set_field(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut fields = self.fields.write();
        match fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::NoSuchField {
                class: self.class_name().to_string(),
                field: name.to_string(),
            }),
        }
    }

    fn invoke(&self, name: &str, descriptor: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        if name == FINALIZE {
            return Ok(Value::Null);
        }
        if !self.instantiator.intercepts(name, descriptor) {
            return Err(RuntimeError::NoSuchMethod {
                class: self.class_name().to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            });
        }
        let handler = self
            .handler()
            .ok_or_else(|| RuntimeError::Unhandled(self.instantiator.supertype.clone()))?;
        handler.handle(self, name, descriptor, args)
    }

    fn as_proxy(&self) -> Option<&Proxy> {
        Some(self)
    }
}

// ===== Forwarding =====

struct ForwardingHandler {
    forwardee: ObjectRef,
    sub_fields: Vec<String>,
    outermost_super: String,
    outermost_sub: String,
    pool: Arc<UnitPool>,
}

impl ForwardingHandler {
    /// Descriptor with the proxied outer unit's family renamed to the forwardee's
    fn forwarded_descriptor(&self, descriptor: &str) -> String {
        remap_descriptor(descriptor, |name| {
            if outermost_name(name) != self.outermost_super {
                return None;
            }
            Some(match nested_path(name) {
                Some(path) => format!("{}${}", self.outermost_sub, path),
                None => self.outermost_sub.clone(),
            })
        })
        .unwrap_or_else(|_| descriptor.to_string())
    }

    /// Most-derived ancestor of `unit` with a counterpart nested in the
    /// proxied outer unit, returned as that counterpart's name
    ///
    /// Anonymous and other unmatched nested units have none.
    fn counterpart_of(&self, unit: &str) -> Result<Option<String>, PoolError> {
        for ancestor in self.pool.superclass_chain(unit)? {
            if outermost_name(ancestor.name()) != self.outermost_sub {
                continue;
            }
            let Some(path) = nested_path(ancestor.name()) else {
                continue;
            };
            let candidate = format!("{}${}", self.outermost_super, path);
            if self.pool.find(&candidate)?.is_some() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

impl CallHandler for ForwardingHandler {
    fn handle(
        &self,
        proxy: &Proxy,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        for field in &self.sub_fields {
            if let Some(value) = proxy.get_field(field) {
                self.forwardee.set_field(field, value)?;
            }
        }

        let result = self
            .forwardee
            .invoke(name, &self.forwarded_descriptor(descriptor), args)?;

        for field in &self.sub_fields {
            if proxy.has_field(field) {
                if let Some(value) = self.forwardee.get_field(field) {
                    proxy.set_field(field, value)?;
                }
            }
        }

        let Value::Object(object) = &result else {
            return Ok(result);
        };
        let nested_prefix = format!("{}$", self.outermost_sub);
        if !object.class_name().starts_with(&nested_prefix) {
            return Ok(result);
        }
        let sub = object.class_name().to_string();
        let Some(counterpart) = self.counterpart_of(&sub).map_err(ProxyError::from)? else {
            tracing::trace!(unit = %sub, "nested result has no counterpart, passing through");
            return Ok(result);
        };
        tracing::trace!(unit = %sub, counterpart = %counterpart, "proxying nested result");
        let inner = proxy_with(
            &counterpart,
            &sub,
            object.clone(),
            &self.outermost_super,
            &self.outermost_sub,
            &self.pool,
        )?;
        Ok(Value::Object(inner))
    }

    fn forwardee(&self) -> Option<&ObjectRef> {
        Some(&self.forwardee)
    }
}

/// Names of the public instance fields declared along `name`'s super chain
fn public_fields_of(pool: &UnitPool, name: &str) -> Result<Vec<String>, PoolError> {
    let mut fields: Vec<String> = Vec::new();
    for unit in pool.superclass_chain(name)? {
        for field in &unit.unit().fields {
            if field.is_public() && !field.is_static() && !fields.contains(&field.name) {
                fields.push(field.name.clone());
            }
        }
    }
    Ok(fields)
}

/// Make `forwardee`, an instance of `sub`, usable where `super_name` is expected
///
/// Returns `forwardee` itself when the two units are the same. Otherwise a
/// proxy of `super_name` is created whose calls are forwarded to
/// `forwardee`, with public fields copied across before and after each
/// call. Results that are instances of units nested in `sub`'s outer unit
/// are wrapped in proxies of the matching nested unit of `super_name`'s
/// outer unit; results with no such counterpart are returned unwrapped.
pub fn make_proxy(
    super_name: &str,
    sub: &str,
    forwardee: ObjectRef,
    pool: &Arc<UnitPool>,
) -> Result<ObjectRef, ProxyError> {
    proxy_with(
        super_name,
        sub,
        forwardee,
        outermost_name(super_name),
        outermost_name(sub),
        pool,
    )
}

fn proxy_with(
    super_name: &str,
    sub: &str,
    forwardee: ObjectRef,
    outermost_super: &str,
    outermost_sub: &str,
    pool: &Arc<UnitPool>,
) -> Result<ObjectRef, ProxyError> {
    if super_name == sub {
        return Ok(forwardee);
    }

    let instantiator = pool.proxy_instantiator(super_name)?;
    let proxy = instantiator.instantiate();

    // Seed the proxy with the forwardee's current state
    let sub_fields = public_fields_of(pool, sub)?;
    for field in &sub_fields {
        if proxy.has_field(field) {
            if let Some(value) = forwardee.get_field(field) {
                proxy.fields.write().insert(field.clone(), value);
            }
        }
    }

    proxy.set_handler(Arc::new(ForwardingHandler {
        forwardee,
        sub_fields,
        outermost_super: outermost_super.to_string(),
        outermost_sub: outermost_sub.to_string(),
        pool: Arc::clone(pool),
    }));
    tracing::trace!(super_name, sub, "created forwarding proxy");
    Ok(Arc::new(proxy))
}

/// Object a forwarding proxy wraps, if `object` is one
pub fn proxy_forwardee(object: &ObjectRef) -> Option<ObjectRef> {
    object.as_proxy()?.handler()?.forwardee().cloned()
}
