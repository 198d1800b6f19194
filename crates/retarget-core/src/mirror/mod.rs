//! Mirror builders
//!
//! A mirror is a renamed copy of a unit and its nested units with symbol
//! references rewritten. Units are staged while a mirror is built and only
//! defined into the pool once the whole family has been synthesized, so a
//! failed build leaves no partial mirror behind.

mod generator;
mod open;

pub use generator::{build_generator_mirror, build_generator_mirror_with_prefix};
pub use open::{build_open_mirror, build_open_mirror_with_prefix, RenameTable};

use crate::pool::{LoadedUnit, PoolError, UnitPool};
use retarget_bytecode::{
    remap_class_name, ConstantError, ConstantPool, DecodeError, DescriptorError, Unit,
};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;

/// Mirror synthesis errors
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Mirrors are built from outermost units only
    #[error("{0} is a nested unit; mirror its outermost unit instead")]
    NotOutermost(String),

    /// Resolving or defining a unit failed
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A symbol-table index did not name the expected entry
    #[error("Bad constant reference: {0}")]
    Constant(#[from] ConstantError),

    /// A descriptor could not be parsed
    #[error("Malformed descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    /// A method body could not be decoded
    #[error("Malformed code: {0}")]
    Code(#[from] DecodeError),
}

/// Units synthesized by one mirroring operation, pending definition
#[derive(Default)]
struct Staging {
    visited: FxHashSet<String>,
    units: Vec<(String, Unit, String)>,
}

impl Staging {
    /// Claim `name`; false when it is already staged or being built
    fn begin(&mut self, name: &str) -> bool {
        self.visited.insert(name.to_string())
    }

    fn stage(&mut self, name: String, unit: Unit, provenance: String) {
        self.units.push((name, unit, provenance));
    }

    /// Define every staged unit and return the one named `top`
    fn commit(self, pool: &UnitPool, top: &str) -> Result<Arc<LoadedUnit>, MirrorError> {
        let staged = self
            .units
            .into_iter()
            .map(|(name, unit, provenance)| (name, unit.encode(), provenance));
        let defined = pool.define_all(staged)?;
        match defined.into_iter().find(|loaded| loaded.name() == top) {
            Some(loaded) => Ok(loaded),
            None => Ok(pool.resolve(top)?),
        }
    }
}

/// New Class entry index for `index` under `rename`, if the name changes
fn class_replacement<F>(
    constants: &mut ConstantPool,
    index: u16,
    rename: F,
) -> Result<Option<u16>, MirrorError>
where
    F: FnMut(&str) -> Option<String>,
{
    let name = constants.class_name(index)?.to_string();
    let fixed = remap_class_name(&name, rename)?;
    if fixed == name {
        return Ok(None);
    }
    Ok(Some(constants.add_class(&fixed)?))
}
