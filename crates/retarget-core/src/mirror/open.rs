//! Open mirrors
//!
//! Renamed copies with every `FINAL` marker removed, so proxy subtypes can
//! be synthesized even for sealed implementations.

use super::{MirrorError, Staging};
use crate::pool::{LoadedUnit, UnitPool};
use retarget_bytecode::{
    access, nested_path, outermost_name, remap_class_name, remap_descriptor, Constant,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outer unit name to replacement name, both in slash form
pub type RenameTable = BTreeMap<String, String>;

/// Build (or reuse) the open mirror of the outermost unit `unit`
///
/// `renames` may carry unrelated renames so that several opened units refer
/// to each other's mirrors. The unit's own rename is added automatically.
pub fn build_open_mirror(
    unit: &LoadedUnit,
    renames: &RenameTable,
    pool: &UnitPool,
) -> Result<Arc<LoadedUnit>, MirrorError> {
    let prefix = pool.config().open_prefix.clone();
    build_open_mirror_with_prefix(unit, renames, pool, &prefix)
}

/// Same as [`build_open_mirror`] with an explicit name prefix
pub fn build_open_mirror_with_prefix(
    unit: &LoadedUnit,
    renames: &RenameTable,
    pool: &UnitPool,
    prefix: &str,
) -> Result<Arc<LoadedUnit>, MirrorError> {
    if unit.name().contains('$') {
        return Err(MirrorError::NotOutermost(unit.name().to_string()));
    }

    let mut parts = vec![unit.name()];
    for (from, to) in renames {
        parts.push(from.as_str());
        parts.push(to.as_str());
    }
    let new_name = pool.config().synthesized_name(prefix, &parts);
    if let Some(existing) = pool.find(&new_name)? {
        tracing::trace!(mirror = %new_name, "open mirror already defined");
        return Ok(existing);
    }

    let mut all_renames = renames.clone();
    all_renames.insert(unit.name().to_string(), new_name.clone());

    let mut builder = OpenMirror {
        pool,
        base_name: unit.name(),
        renames: &all_renames,
        staging: Staging::default(),
    };
    builder.open(unit.name(), &new_name)?;

    let staged = builder.staging.units.len();
    let loaded = builder.staging.commit(pool, &new_name)?;
    tracing::debug!(unit = unit.name(), mirror = %new_name, units = staged, "built open mirror");
    Ok(loaded)
}

struct OpenMirror<'a> {
    pool: &'a UnitPool,
    base_name: &'a str,
    renames: &'a RenameTable,
    staging: Staging,
}

impl OpenMirror<'_> {
    /// Rename an object name whose outermost part is in the table
    fn rename(&self, name: &str) -> Option<String> {
        if let Some(renamed) = self.renames.get(name) {
            return Some(renamed.clone());
        }
        let outer = outermost_name(name);
        let renamed = self.renames.get(outer)?;
        Some(match nested_path(name) {
            Some(path) => format!("{renamed}${path}"),
            None => renamed.clone(),
        })
    }

    fn fix_descriptor(&self, descriptor: &str) -> Result<String, MirrorError> {
        Ok(remap_descriptor(descriptor, |name| self.rename(name))?)
    }

    fn open(&mut self, class_name: &str, new_name: &str) -> Result<(), MirrorError> {
        if !self.staging.begin(new_name) {
            return Ok(());
        }

        let loaded = self.pool.resolve(class_name)?;
        let original = loaded.unit();
        let mut unit = original.clone();

        // Strip finality
        unit.access &= !access::FINAL;
        for method in &mut unit.methods {
            method.access &= !access::FINAL;
        }

        // Nested units of the same outer unit are opened too
        let new_base = outermost_name(new_name).to_string();
        let nested_prefix = format!("{}$", self.base_name);
        let mut nested = Vec::new();
        for entry in &mut unit.inner_classes {
            let inner_name = original.constants.class_name(entry.inner)?;
            if let Some(path) = inner_name.strip_prefix(&nested_prefix) {
                entry.access &= !access::FINAL;
                nested.push((inner_name.to_string(), format!("{new_base}${path}")));
            }
        }
        for (inner_name, inner_new_name) in &nested {
            self.open(inner_name, inner_new_name)?;
        }

        // Symbol table
        for (index, constant) in original.constants.iter() {
            match constant {
                Constant::Class { .. } => {
                    let name = original.constants.class_name(index)?;
                    let renamed = remap_class_name(name, |object| self.rename(object))?;
                    if renamed != name {
                        unit.constants.rename_class(index, &renamed)?;
                    }
                }
                Constant::NameAndType { name, .. } => {
                    let (_, descriptor) = original.constants.name_and_type(index)?;
                    let fixed = self.fix_descriptor(descriptor)?;
                    if fixed != descriptor {
                        let descriptor = unit.constants.add_utf8(&fixed)?;
                        unit.constants.set(
                            index,
                            Constant::NameAndType {
                                name: *name,
                                descriptor,
                            },
                        )?;
                    }
                }
                _ => {}
            }
        }

        // Declarations
        for method in &mut unit.methods {
            method.descriptor = self.fix_descriptor(&method.descriptor)?;
            if let Some(code) = method.code.as_mut() {
                for local in &mut code.local_variables {
                    local.descriptor = self.fix_descriptor(&local.descriptor)?;
                }
            }
        }
        for field in &mut unit.fields {
            field.descriptor = self.fix_descriptor(&field.descriptor)?;
        }
        if let Some((_, descriptor)) = unit
            .enclosing_method
            .as_mut()
            .and_then(|enclosing| enclosing.method.as_mut())
        {
            *descriptor = self.fix_descriptor(descriptor)?;
        }

        tracing::trace!(unit = class_name, mirror = new_name, "opened unit");
        self.staging
            .stage(new_name.to_string(), unit, class_name.to_string());
        Ok(())
    }
}
