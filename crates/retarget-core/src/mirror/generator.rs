//! Generator mirrors
//!
//! Copies a reference unit's generation logic so it operates on a target
//! unit. Self-references are redirected to the target, nested reference units
//! are mirrored alongside, and references to generation-support members stay
//! bound to the reference unless their signature names the reference family,
//! in which case they bind to the mirror's own retargeted copy.

use super::{class_replacement, MirrorError, Staging};
use crate::pool::{LoadedUnit, UnitPool};
use retarget_bytecode::{
    decode_instructions, nested_path, remap_descriptor, rewrite_symbols, Code, Constant,
    ConstantPool, MemberKind, Opcode, Roles, Unit, VerificationType,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Build (or reuse) the generator mirror of `reference` retargeted at `target`
pub fn build_generator_mirror(
    reference: &LoadedUnit,
    target: &LoadedUnit,
    pool: &UnitPool,
) -> Result<Arc<LoadedUnit>, MirrorError> {
    let prefix = pool.config().generator_prefix.clone();
    build_generator_mirror_with_prefix(reference, target, pool, &prefix)
}

/// Same as [`build_generator_mirror`] with an explicit name prefix
///
/// The mirror name is derived from `(reference, target, prefix)`, so repeated
/// calls return the unit already defined in `pool`.
pub fn build_generator_mirror_with_prefix(
    reference: &LoadedUnit,
    target: &LoadedUnit,
    pool: &UnitPool,
    prefix: &str,
) -> Result<Arc<LoadedUnit>, MirrorError> {
    for unit in [reference, target] {
        if unit.name().contains('$') {
            return Err(MirrorError::NotOutermost(unit.name().to_string()));
        }
    }

    let mirror_name = pool
        .config()
        .synthesized_name(prefix, &[reference.name(), target.name()]);
    if let Some(existing) = pool.find(&mirror_name)? {
        tracing::trace!(mirror = %mirror_name, "generator mirror already defined");
        return Ok(existing);
    }

    let mut builder = GeneratorMirror {
        pool,
        reference: reference.unit(),
        reference_name: reference.name(),
        target_name: target.name(),
        mirror_top: &mirror_name,
        staging: Staging::default(),
    };
    builder.mirror(reference.name(), &mirror_name)?;

    let staged = builder.staging.units.len();
    let loaded = builder.staging.commit(pool, &mirror_name)?;
    tracing::debug!(
        reference = reference.name(),
        target = target.name(),
        mirror = %mirror_name,
        units = staged,
        "built generator mirror"
    );
    Ok(loaded)
}

struct GeneratorMirror<'a> {
    pool: &'a UnitPool,
    reference: &'a Unit,
    reference_name: &'a str,
    target_name: &'a str,
    mirror_top: &'a str,
    staging: Staging,
}

impl GeneratorMirror<'_> {
    fn is_nested_reference(&self, name: &str) -> bool {
        name.strip_prefix(self.reference_name)
            .is_some_and(|rest| rest.starts_with('$'))
    }

    /// `R$A$B` -> `<mirror>$A$B`
    fn nested_mirror_name(&self, name: &str) -> String {
        match nested_path(name) {
            Some(path) => format!("{}${}", self.mirror_top, path),
            None => self.mirror_top.to_string(),
        }
    }

    /// Scalar type fix: the reference becomes the target, nested reference
    /// units become their mirrors
    fn fix_name(&self, name: &str) -> Option<String> {
        if name == self.reference_name {
            Some(self.target_name.to_string())
        } else if self.is_nested_reference(name) {
            Some(self.nested_mirror_name(name))
        } else {
            None
        }
    }

    fn fix_descriptor(&self, descriptor: &str) -> Result<String, MirrorError> {
        Ok(remap_descriptor(descriptor, |name| self.fix_name(name))?)
    }

    /// Whether a reference-owned member keeps pointing at the reference
    fn stays_bound(&self, kind: MemberKind, name: &str) -> bool {
        match kind {
            MemberKind::Field => self.reference.fields.iter().any(|field| {
                field.name == name && field.is_static() && field.roles.intersects(Roles::GENERATION)
            }),
            MemberKind::Method | MemberKind::InterfaceMethod => {
                // `$` marks compiler-generated accessors
                name.contains('$')
                    || self.reference.methods.iter().any(|method| {
                        method.name == name
                            && method.is_static()
                            && method.roles.intersects(Roles::GENERATION)
                    })
            }
        }
    }

    /// Whether the outer mirror keeps its own copy of a reference member
    fn kept_by_mirror(&self, kind: MemberKind, name: &str, descriptor: &str) -> bool {
        match kind {
            MemberKind::Field => self
                .reference
                .fields
                .iter()
                .any(|field| field.name == name && field.descriptor == descriptor),
            MemberKind::Method | MemberKind::InterfaceMethod => {
                self.reference.methods.iter().any(|method| {
                    method.name == name
                        && method.descriptor == descriptor
                        && (method.is_static() || method.roles.contains(Roles::VERIFY))
                })
            }
        }
    }

    fn mirror(&mut self, base_name: &str, mirror_name: &str) -> Result<(), MirrorError> {
        if !self.staging.begin(mirror_name) {
            return Ok(());
        }

        let base = self.pool.resolve(base_name)?;
        let original = base.unit();
        let mut unit = original.clone();
        let is_outer = base_name == self.reference_name;

        let target_index = unit.constants.add_class(self.target_name)?;
        let mirror_index = unit.constants.add_class(mirror_name)?;
        let mirror_top_index = unit.constants.add_class(self.mirror_top)?;
        unit.this_class = mirror_index;

        // Symbol table
        let mut nested = Vec::new();
        for (index, constant) in original.constants.iter() {
            match constant {
                Constant::FieldRef { .. }
                | Constant::MethodRef { .. }
                | Constant::InterfaceMethodRef { .. } => {
                    let member = original.constants.member_ref(index)?;
                    let fixed = self.fix_descriptor(member.descriptor)?;
                    let class = if member.owner == self.reference_name {
                        if !self.stays_bound(member.kind, member.name) {
                            target_index
                        } else if fixed != member.descriptor
                            && self.kept_by_mirror(member.kind, member.name, member.descriptor)
                        {
                            // Signatures naming the reference family are served
                            // by the mirror's retargeted copy
                            mirror_top_index
                        } else {
                            continue;
                        }
                    } else if self.is_nested_reference(member.owner) {
                        unit.constants
                            .add_class(&self.nested_mirror_name(member.owner))?
                    } else if fixed != member.descriptor {
                        member.class_index
                    } else {
                        continue;
                    };
                    let name_and_type = unit.constants.add_name_and_type(member.name, &fixed)?;
                    if let Some(updated) = constant.with_member_parts(class, name_and_type) {
                        unit.constants.set(index, updated)?;
                    }
                }
                Constant::Class { .. } => {
                    let name = original.constants.class_name(index)?;
                    if self.is_nested_reference(name) {
                        let renamed = self.nested_mirror_name(name);
                        unit.constants.rename_class(index, &renamed)?;
                        nested.push((name.to_string(), renamed));
                    }
                }
                _ => {}
            }
        }

        // Methods
        for mut method in std::mem::take(&mut unit.methods) {
            if is_outer && !method.is_static() && !method.roles.contains(Roles::VERIFY) {
                continue;
            }
            method.descriptor = self.fix_descriptor(&method.descriptor)?;
            if let Some(code) = method.code.as_mut() {
                self.fix_code(&mut unit.constants, code)?;
            }
            unit.methods.push(method);
        }

        // Fields
        for field in &mut unit.fields {
            field.descriptor = self.fix_descriptor(&field.descriptor)?;
        }

        // Nesting metadata
        for entry in &mut unit.inner_classes {
            if entry.outer != 0 && original.constants.class_name(entry.outer)? == self.reference_name {
                entry.outer = mirror_top_index;
            }
        }
        if unit.nest_host.is_some() {
            unit.nest_host = Some(mirror_top_index);
        }
        let mut members = Vec::with_capacity(original.nest_members.len());
        for &member in &original.nest_members {
            let name = original.constants.class_name(member)?;
            members.push(unit.constants.add_class(&self.nested_mirror_name(name))?);
        }
        unit.nest_members = members;
        if let Some(enclosing) = unit.enclosing_method.as_mut() {
            if original.constants.class_name(enclosing.class)? == self.reference_name {
                enclosing.class = mirror_top_index;
            }
            if let Some((_, descriptor)) = enclosing.method.as_mut() {
                *descriptor = self.fix_descriptor(descriptor)?;
            }
        }

        tracing::trace!(unit = base_name, mirror = mirror_name, "mirrored unit");
        self.staging
            .stage(mirror_name.to_string(), unit, base_name.to_string());

        for (name, renamed) in nested {
            self.mirror(&name, &renamed)?;
        }
        Ok(())
    }

    fn fix_code(&self, constants: &mut ConstantPool, code: &mut Code) -> Result<(), MirrorError> {
        let mut replacements: FxHashMap<u16, u16> = FxHashMap::default();
        for instruction in decode_instructions(&code.bytecode)? {
            let Some(index) = instruction.symbol() else {
                continue;
            };
            if replacements.contains_key(&index) {
                continue;
            }
            let replacement = if instruction.opcode == Opcode::InvokeDynamic {
                let (name, descriptor) = constants.name_and_type(index)?;
                let fixed = self.fix_descriptor(descriptor)?;
                if fixed == descriptor {
                    None
                } else {
                    let name = name.to_string();
                    Some(constants.add_name_and_type(&name, &fixed)?)
                }
            } else if matches!(constants.get(index), Some(Constant::Class { .. })) {
                class_replacement(constants, index, |name| self.fix_name(name))?
            } else {
                None
            };
            if let Some(replacement) = replacement {
                replacements.insert(index, replacement);
            }
        }
        rewrite_symbols(&mut code.bytecode, |instruction| {
            instruction
                .symbol()
                .and_then(|index| replacements.get(&index).copied())
        })?;

        for frame in &mut code.stack_map {
            for slot in frame.slots_mut() {
                if let VerificationType::Object(index) = slot {
                    if let Some(replacement) =
                        class_replacement(constants, *index, |name| self.fix_name(name))?
                    {
                        *index = replacement;
                    }
                }
            }
        }

        for local in &mut code.local_variables {
            local.descriptor = self.fix_descriptor(&local.descriptor)?;
        }
        Ok(())
    }
}
