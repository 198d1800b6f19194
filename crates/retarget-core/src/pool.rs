//! Unit pool
//!
//! A pool resolves units by name, caches them, defines synthesized units and
//! remembers which original unit every synthesized unit was derived from.
//!
//! Pools are layered. Resolution asks every parent first (in registration
//! order, first match wins), then the pool's own cache, then its provider.
//! All caches are insert-if-absent, so children of a shared parent racing to
//! define the same artifact converge on a single unit.

use crate::config::PoolConfig;
use crate::provider::{unit_path, UnitProvider};
use crate::proxy::{ProxyError, ProxyInstantiator};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use retarget_bytecode::{ConstantError, Unit, UnitError};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Unit pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// Neither the pool, its parents nor its provider know the unit
    #[error("Binary not found: {0}")]
    BinaryNotFound(String),

    /// Bytes were found but are not a valid unit
    #[error("Failed to decode unit {name}: {source}")]
    Decode {
        /// Requested unit
        name: String,
        /// Underlying format error
        #[source]
        source: UnitError,
    },

    /// Bytes declare a different unit than requested
    #[error("Unit bytes for {requested} declare {declared}")]
    NameMismatch {
        /// Requested unit
        requested: String,
        /// Name found in the bytes
        declared: String,
    },

    /// Structural symbol lookup failed
    #[error("Bad constant reference: {0}")]
    Constant(#[from] ConstantError),

    /// Writing a dumped unit failed
    #[error("Failed to dump unit: {0}")]
    Io(#[from] std::io::Error),
}

/// Unique identifier of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(u64);

impl PoolId {
    /// Create a new unique pool ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        PoolId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded unit owned by one pool
#[derive(Debug)]
pub struct LoadedUnit {
    name: String,
    unit: Unit,
    bytes: Vec<u8>,
    pool: PoolId,
    provenance: Option<String>,
}

impl LoadedUnit {
    /// Qualified name in slash form
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decoded unit
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Encoded bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Pool that loaded or defined this unit
    pub fn pool_id(&self) -> PoolId {
        self.pool
    }

    /// Unit this one was synthesized from, if synthesized
    pub fn provenance(&self) -> Option<&str> {
        self.provenance.as_deref()
    }

    /// Whether the unit was defined by a pool rather than provided
    pub fn is_synthesized(&self) -> bool {
        self.provenance.is_some()
    }
}

enum Pending {
    Loaded(Arc<LoadedUnit>),
    Prepared(LoadedUnit),
}

/// Registry and loader of units
pub struct UnitPool {
    id: PoolId,
    config: PoolConfig,
    provider: Option<Arc<dyn UnitProvider>>,
    parents: Vec<Arc<UnitPool>>,
    units: DashMap<String, Arc<LoadedUnit>>,
    adopted_provenance: DashMap<String, String>,
    instantiators: DashMap<String, Arc<ProxyInstantiator>>,
}

impl UnitPool {
    /// Create a root pool without a provider
    pub fn new(config: PoolConfig) -> Self {
        Self {
            id: PoolId::new(),
            config,
            provider: None,
            parents: Vec::new(),
            units: DashMap::new(),
            adopted_provenance: DashMap::new(),
            instantiators: DashMap::new(),
        }
    }

    /// Create a root pool backed by `provider`
    pub fn with_provider(config: PoolConfig, provider: Arc<dyn UnitProvider>) -> Self {
        Self::new(config).provided_by(provider)
    }

    /// Create a pool layered over `parent`, sharing its configuration
    pub fn child_of(parent: Arc<UnitPool>) -> Self {
        let config = parent.config.clone();
        Self::with_parents(config, vec![parent])
    }

    /// Create a pool layered over several parents (first match wins)
    pub fn with_parents(config: PoolConfig, parents: Vec<Arc<UnitPool>>) -> Self {
        Self {
            parents,
            ..Self::new(config)
        }
    }

    /// Attach a provider consulted after the cache and the parents
    pub fn provided_by(mut self, provider: Arc<dyn UnitProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Pool identifier
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Naming configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Parent pools in resolution order
    pub fn parents(&self) -> &[Arc<UnitPool>] {
        &self.parents
    }

    // ===== Resolution =====

    /// Resolve a unit by slash name
    pub fn resolve(&self, name: &str) -> Result<Arc<LoadedUnit>, PoolError> {
        self.find(name)?
            .ok_or_else(|| PoolError::BinaryNotFound(name.to_string()))
    }

    /// Resolve a unit given in either dot or slash form
    pub fn resolve_name(&self, name: &str) -> Result<Arc<LoadedUnit>, PoolError> {
        self.resolve(&name.replace('.', "/"))
    }

    /// Resolve a unit, returning `None` instead of [`PoolError::BinaryNotFound`]
    pub fn find(&self, name: &str) -> Result<Option<Arc<LoadedUnit>>, PoolError> {
        for parent in &self.parents {
            if let Some(unit) = parent.find(name)? {
                return Ok(Some(unit));
            }
        }

        if let Some(unit) = self.units.get(name) {
            return Ok(Some(unit.value().clone()));
        }

        let Some(provider) = &self.provider else {
            return Ok(None);
        };
        let Some(bytes) = provider.get_bytes(name) else {
            return Ok(None);
        };
        tracing::debug!(pool = self.id.0, unit = name, "resolved unit from provider");
        self.install(name, bytes, None).map(Some)
    }

    /// Whether a unit is already loaded here or in a parent
    ///
    /// Providers are not consulted.
    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name) || self.parents.iter().any(|parent| parent.contains(name))
    }

    fn loaded(&self, name: &str) -> Option<Arc<LoadedUnit>> {
        if let Some(unit) = self.units.get(name) {
            return Some(unit.value().clone());
        }
        self.parents.iter().find_map(|parent| parent.loaded(name))
    }

    // ===== Definition =====

    /// Define a synthesized unit from its encoded bytes
    ///
    /// `provenance` names the unit it was derived from. Defining a name that is
    /// already loaded returns the existing unit.
    pub fn define(
        &self,
        name: &str,
        bytes: Vec<u8>,
        provenance: &str,
    ) -> Result<Arc<LoadedUnit>, PoolError> {
        if let Some(existing) = self.loaded(name) {
            return Ok(existing);
        }
        self.install(name, bytes, Some(provenance.to_string()))
    }

    /// Encode and define a synthesized unit
    pub fn define_unit(&self, unit: &Unit, provenance: &str) -> Result<Arc<LoadedUnit>, PoolError> {
        let name = unit.name()?.to_string();
        self.define(&name, unit.encode(), provenance)
    }

    /// Define a family of synthesized units together
    ///
    /// Every unit is decoded, checked and dumped before any is installed, so
    /// a failure leaves none of them defined. Units already loaded are
    /// returned as they are.
    pub fn define_all<I>(&self, units: I) -> Result<Vec<Arc<LoadedUnit>>, PoolError>
    where
        I: IntoIterator<Item = (String, Vec<u8>, String)>,
    {
        let mut pending = Vec::new();
        for (name, bytes, provenance) in units {
            pending.push(match self.loaded(&name) {
                Some(existing) => Pending::Loaded(existing),
                None => Pending::Prepared(self.prepare(&name, bytes, Some(provenance))?),
            });
        }
        Ok(pending
            .into_iter()
            .map(|unit| match unit {
                Pending::Loaded(existing) => existing,
                Pending::Prepared(prepared) => self.register(prepared),
            })
            .collect())
    }

    fn install(
        &self,
        name: &str,
        bytes: Vec<u8>,
        provenance: Option<String>,
    ) -> Result<Arc<LoadedUnit>, PoolError> {
        let prepared = self.prepare(name, bytes, provenance)?;
        Ok(self.register(prepared))
    }

    /// Decode and check a unit without making it visible
    fn prepare(
        &self,
        name: &str,
        bytes: Vec<u8>,
        provenance: Option<String>,
    ) -> Result<LoadedUnit, PoolError> {
        let unit = Unit::decode(&bytes).map_err(|source| PoolError::Decode {
            name: name.to_string(),
            source,
        })?;
        let declared = unit.name()?;
        if declared != name {
            return Err(PoolError::NameMismatch {
                requested: name.to_string(),
                declared: declared.to_string(),
            });
        }

        if provenance.is_some() {
            self.dump(name, &bytes)?;
        }

        Ok(LoadedUnit {
            name: name.to_string(),
            unit,
            bytes,
            pool: self.id,
            provenance,
        })
    }

    fn register(&self, loaded: LoadedUnit) -> Arc<LoadedUnit> {
        match self.units.entry(loaded.name.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let loaded = Arc::new(loaded);
                entry.insert(loaded.clone());
                if let Some(original) = loaded.provenance() {
                    tracing::debug!(
                        pool = self.id.0,
                        unit = %loaded.name,
                        from = original,
                        size = loaded.bytes.len(),
                        "defined synthesized unit"
                    );
                }
                loaded
            }
        }
    }

    fn dump(&self, name: &str, bytes: &[u8]) -> Result<(), PoolError> {
        let Some(dir) = &self.config.dump_dir else {
            return Ok(());
        };
        let Some(path) = unit_path(dir, name) else {
            tracing::warn!(unit = name, "unit name cannot be dumped");
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        tracing::trace!(unit = name, path = %path.display(), "dumped unit");
        Ok(())
    }

    // ===== Provenance =====

    fn provenance_of(&self, name: &str) -> Option<String> {
        if let Some(unit) = self.units.get(name) {
            if let Some(original) = unit.provenance() {
                return Some(original.to_string());
            }
        }
        if let Some(original) = self.adopted_provenance.get(name) {
            return Some(original.value().clone());
        }
        self.parents
            .iter()
            .find_map(|parent| parent.provenance_of(name))
    }

    /// Oldest ancestor a unit was derived from, or the name itself
    pub fn original_of(&self, name: &str) -> String {
        let mut current = name.to_string();
        let mut seen = FxHashSet::default();
        while let Some(original) = self.provenance_of(&current) {
            if !seen.insert(current.clone()) {
                break;
            }
            current = original;
        }
        current
    }

    /// Copy another pool's provenance records into this one
    ///
    /// Used when units synthesized in `other` are re-hosted elsewhere and
    /// diagnostics about them must still name the original declaration.
    pub fn adopt_provenance(&self, other: &UnitPool) {
        for entry in other.units.iter() {
            if let Some(original) = entry.value().provenance() {
                self.adopted_provenance
                    .entry(entry.key().clone())
                    .or_insert_with(|| original.to_string());
            }
        }
    }

    /// Every unit this pool defined, name to encoded bytes
    pub fn synthesized_bytes(&self) -> FxHashMap<String, Vec<u8>> {
        self.units
            .iter()
            .filter(|entry| entry.value().is_synthesized())
            .map(|entry| (entry.key().clone(), entry.value().bytes.clone()))
            .collect()
    }

    /// Number of units cached by this pool (parents excluded)
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check if this pool caches no unit
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    // ===== Hierarchy =====

    /// Whether `name` is `ancestor` or inherits from it
    ///
    /// Walks super units and interfaces that this pool can resolve; an
    /// unresolvable link ends that branch of the walk.
    pub fn is_subtype(&self, name: &str, ancestor: &str) -> Result<bool, PoolError> {
        let mut pending = vec![name.to_string()];
        let mut seen = FxHashSet::default();
        while let Some(current) = pending.pop() {
            if current == ancestor {
                return Ok(true);
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(loaded) = self.find(&current)? else {
                continue;
            };
            let unit = loaded.unit();
            if let Some(parent) = unit.super_name()? {
                pending.push(parent.to_string());
            }
            for interface in unit.interface_names()? {
                pending.push(interface.to_string());
            }
        }
        Ok(false)
    }

    /// Super-unit chain starting at `name` itself, up to the first unresolvable unit
    pub fn superclass_chain(&self, name: &str) -> Result<Vec<Arc<LoadedUnit>>, PoolError> {
        let mut chain = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(next) = current.take() {
            if chain.iter().any(|unit: &Arc<LoadedUnit>| unit.name() == next) {
                break;
            }
            let Some(loaded) = self.find(&next)? else {
                break;
            };
            current = loaded.unit().super_name()?.map(str::to_string);
            chain.push(loaded);
        }
        Ok(chain)
    }

    // ===== Proxies =====

    /// Create or reuse the proxy instantiator for `supertype`
    pub fn proxy_instantiator(&self, supertype: &str) -> Result<Arc<ProxyInstantiator>, ProxyError> {
        if let Some(existing) = self.instantiators.get(supertype) {
            return Ok(existing.value().clone());
        }
        let created = Arc::new(ProxyInstantiator::new(self, supertype)?);
        Ok(self
            .instantiators
            .entry(supertype.to_string())
            .or_insert(created)
            .value()
            .clone())
    }
}

impl fmt::Debug for UnitPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitPool")
            .field("id", &self.id)
            .field("units", &self.units.len())
            .field("parents", &self.parents.len())
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

impl Default for UnitPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
