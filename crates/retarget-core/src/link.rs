//! Link checking of synthesized units
//!
//! A synthesized unit links when every class it names inside the mirror
//! namespace resolves, and every member reference whose owner resolves names
//! a member declared on that owner or one of its ancestors. Owners outside
//! the namespace that the pool cannot resolve belong to the host platform and
//! are assumed to declare the member, except that the hierarchy root declares
//! no fields.

use crate::pool::{LoadedUnit, PoolError, UnitPool};
use retarget_bytecode::{Constant, ConstantError, FieldType, MemberKind, OBJECT};
use rustc_hash::FxHashSet;
use thiserror::Error;

/// Link check failures
#[derive(Debug, Error)]
pub enum LinkError {
    /// A class in the synthesized namespace does not resolve
    #[error("{unit}: class {class} cannot be resolved")]
    UnresolvedClass {
        /// Unit being linked
        unit: String,
        /// Missing class
        class: String,
    },

    /// A member reference names nothing declared on its owner's hierarchy
    #[error("{unit}: {owner}.{name}{descriptor} not found")]
    MissingMember {
        /// Unit being linked
        unit: String,
        /// Owner named by the reference
        owner: String,
        /// Member name
        name: String,
        /// Member descriptor
        descriptor: String,
    },

    /// Resolution failed
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The unit's own symbol table is inconsistent
    #[error("Bad constant reference: {0}")]
    Constant(#[from] ConstantError),
}

/// Outcome of looking a member up along a hierarchy
enum Lookup {
    Found,
    Missing,
    /// Some ancestor could not be resolved
    Unknown,
}

impl UnitPool {
    /// Check that `loaded` links against this pool
    pub fn link(&self, loaded: &LoadedUnit) -> Result<(), LinkError> {
        let unit = loaded.unit();
        let constants = &unit.constants;

        for (index, constant) in constants.iter() {
            match constant {
                Constant::Class { .. } => {
                    let name = constants.class_name(index)?;
                    let Some(scalar) = class_scalar(name) else {
                        continue;
                    };
                    if self.config().is_synthesized(&scalar) && self.find(&scalar)?.is_none() {
                        return Err(LinkError::UnresolvedClass {
                            unit: loaded.name().to_string(),
                            class: scalar,
                        });
                    }
                }
                Constant::FieldRef { .. }
                | Constant::MethodRef { .. }
                | Constant::InterfaceMethodRef { .. } => {
                    let member = constants.member_ref(index)?;
                    if member.owner.starts_with('[') {
                        continue;
                    }
                    if self.find(member.owner)?.is_none() {
                        if self.config().is_synthesized(member.owner) {
                            return Err(LinkError::UnresolvedClass {
                                unit: loaded.name().to_string(),
                                class: member.owner.to_string(),
                            });
                        }
                        continue;
                    }
                    let lookup =
                        self.lookup_member(member.owner, member.kind, member.name, member.descriptor)?;
                    if let Lookup::Missing = lookup {
                        return Err(LinkError::MissingMember {
                            unit: loaded.name().to_string(),
                            owner: member.owner.to_string(),
                            name: member.name.to_string(),
                            descriptor: member.descriptor.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }

        tracing::trace!(unit = loaded.name(), "unit links");
        Ok(())
    }

    fn lookup_member(
        &self,
        owner: &str,
        kind: MemberKind,
        name: &str,
        descriptor: &str,
    ) -> Result<Lookup, LinkError> {
        let mut pending = vec![owner.to_string()];
        let mut seen = FxHashSet::default();
        let mut unknown = false;

        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(loaded) = self.find(&current)? else {
                // The hierarchy root declares no fields
                if !(current == OBJECT && kind == MemberKind::Field) {
                    unknown = true;
                }
                continue;
            };
            let unit = loaded.unit();
            let declared = match kind {
                MemberKind::Field => unit
                    .fields
                    .iter()
                    .any(|field| field.name == name && field.descriptor == descriptor),
                MemberKind::Method | MemberKind::InterfaceMethod => {
                    unit.method(name, descriptor).is_some()
                }
            };
            if declared {
                return Ok(Lookup::Found);
            }
            if let Some(parent) = unit.super_name()? {
                pending.push(parent.to_string());
            }
            for interface in unit.interface_names()? {
                pending.push(interface.to_string());
            }
        }

        Ok(if unknown {
            Lookup::Unknown
        } else {
            Lookup::Missing
        })
    }
}

/// Object name inside a Class entry, `None` for primitive arrays
fn class_scalar(name: &str) -> Option<String> {
    match FieldType::from_class_name(name) {
        Ok(ty) => ty.object_name().map(str::to_string),
        Err(_) => Some(name.to_string()),
    }
}
