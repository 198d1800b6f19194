//! Member access verification
//!
//! Proves that generation code of a reference unit never touches non-public
//! members of the reference unit, since after retargeting those accesses
//! would land on the submission's private implementation details.
//!
//! Compiler-generated accessors on the outer unit are checked first. An
//! accessor that violates the rule is remembered rather than reported, and
//! only a call to it from generation code fails. Nested units are verified
//! the first time generation code mentions them.

use crate::pool::{LoadedUnit, PoolError, UnitPool};
use retarget_bytecode::{
    decode_instructions, human_class_name, ConstantError, DecodeError, MethodDescriptor,
    MethodInfo, Opcode, Roles, Unit, CONSTRUCTOR,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

// ===== Violations =====

/// Member reached by an unsafe access
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Member {
    /// A method
    Method {
        /// Declaring unit, slash form
        owner: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },
    /// A field
    Field {
        /// Declaring unit, slash form
        owner: String,
        /// Field name
        name: String,
    },
    /// A constructor
    Constructor {
        /// Declaring unit, slash form
        owner: String,
        /// Constructor descriptor
        descriptor: String,
    },
}

impl Member {
    /// Member name; constructors are named after their unit
    pub fn name(&self) -> &str {
        match self {
            Member::Method { name, .. } | Member::Field { name, .. } => name,
            Member::Constructor { owner, .. } => owner,
        }
    }

    /// Fully-qualified rendering, e.g. `pkg.R.tweak(int)`
    pub fn signature(&self) -> String {
        match self {
            Member::Method {
                owner,
                name,
                descriptor,
            } => format!("{}.{}({})", human_class_name(owner), name, human_params(descriptor)),
            Member::Field { owner, name } => format!("{}.{}", human_class_name(owner), name),
            Member::Constructor { owner, descriptor } => {
                format!("{}({})", human_class_name(owner), human_params(descriptor))
            }
        }
    }

    fn usage(&self) -> String {
        match self {
            Member::Method { .. } => {
                format!("calls non-public submission method: {}", self.signature())
            }
            Member::Field { name, .. } => format!("uses non-public submission field: {name}"),
            Member::Constructor { .. } => {
                format!("uses non-public submission constructor: {}", self.signature())
            }
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

fn human_params(descriptor: &str) -> String {
    MethodDescriptor::parse(descriptor)
        .map(|parsed| parsed.human_params())
        .unwrap_or_else(|_| descriptor.to_string())
}

/// Generation code reaches a non-public member of the reference unit
#[derive(Debug, Clone, Error)]
#[error("Mirrorable method `{blame_method}' in {blame_unit} {}", .member.usage())]
pub struct BytecodeAccessViolation {
    blame_method: String,
    blame_unit: String,
    unit: String,
    member: Member,
    #[source]
    source: Option<Box<BytecodeAccessViolation>>,
}

impl BytecodeAccessViolation {
    fn new(blame_method: &str, blame_unit: String, unit: &str, member: Member) -> Self {
        Self {
            blame_method: blame_method.to_string(),
            blame_unit,
            unit: unit.to_string(),
            member,
            source: None,
        }
    }

    /// Violation found through a call to an accessor that itself violates
    fn through(inner: &BytecodeAccessViolation, blame_method: &str, blame_unit: String, unit: &str) -> Self {
        Self {
            blame_method: blame_method.to_string(),
            blame_unit,
            unit: unit.to_string(),
            member: inner.member.clone(),
            source: Some(Box::new(inner.clone())),
        }
    }

    /// Method whose code performs the access
    pub fn blame_method(&self) -> &str {
        &self.blame_method
    }

    /// Human description of the unit containing the method, including the
    /// chain of enclosing methods for local and anonymous units
    pub fn blame_unit(&self) -> &str {
        &self.blame_unit
    }

    /// Slash-form name of the unit containing the method
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Member accessed
    pub fn member(&self) -> &Member {
        &self.member
    }

    /// Violation inside the accessor this one was reached through
    pub fn cause(&self) -> Option<&BytecodeAccessViolation> {
        self.source.as_deref()
    }

    /// Serializable summary for the grading driver
    pub fn report(&self) -> ViolationReport {
        ViolationReport {
            message: self.to_string(),
            blame_method: self.blame_method.clone(),
            blame_unit: self.blame_unit.clone(),
            unit: self.unit.clone(),
            member: self.member.clone(),
            signature: self.member.signature(),
            cause: self.source.as_ref().map(|inner| Box::new(inner.report())),
        }
    }
}

/// Serializable form of a [`BytecodeAccessViolation`]
#[derive(Debug, Clone, Serialize)]
pub struct ViolationReport {
    /// Rendered message
    pub message: String,
    /// Method whose code performs the access
    pub blame_method: String,
    /// Human description of the containing unit
    pub blame_unit: String,
    /// Slash-form name of the containing unit
    pub unit: String,
    /// Member accessed
    pub member: Member,
    /// Fully-qualified member rendering
    pub signature: String,
    /// Underlying violation reached through an accessor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ViolationReport>>,
}

impl ViolationReport {
    /// JSON rendering
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Verification failures
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Unsafe member access
    #[error(transparent)]
    Violation(#[from] BytecodeAccessViolation),

    /// A nested unit could not be resolved
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A symbol-table index did not name the expected entry
    #[error("Bad constant reference: {0}")]
    Constant(#[from] ConstantError),

    /// A method body could not be decoded
    #[error("Malformed code: {0}")]
    Code(#[from] DecodeError),
}

// ===== Verifier =====

type Dangers = FxHashMap<String, BytecodeAccessViolation>;

/// Verify that generation code of `reference` only accesses public or
/// exempt members of `reference`
///
/// Nested units are resolved through `pool`.
pub fn verify(reference: &LoadedUnit, pool: &UnitPool) -> Result<(), VerifyError> {
    let mut verifier = Verifier {
        pool,
        reference: reference.unit(),
        reference_name: reference.name(),
        checked: FxHashSet::default(),
    };
    let result = verifier.verify_unit(reference.unit(), reference.name(), &Dangers::default());
    match &result {
        Ok(()) => tracing::debug!(
            reference = reference.name(),
            units = verifier.checked.len(),
            "member access verified"
        ),
        Err(VerifyError::Violation(violation)) => tracing::debug!(
            reference = reference.name(),
            method = violation.blame_method(),
            member = %violation.member(),
            "member access violation"
        ),
        Err(_) => {}
    }
    result
}

struct Verifier<'a> {
    pool: &'a UnitPool,
    reference: &'a Unit,
    reference_name: &'a str,
    checked: FxHashSet<String>,
}

impl Verifier<'_> {
    fn verify_unit(&mut self, unit: &Unit, name: &str, dangerous: &Dangers) -> Result<(), VerifyError> {
        if !self.checked.insert(name.to_string()) {
            return Ok(());
        }
        let is_outer = name == self.reference_name;

        let nested_prefix = format!("{name}$");
        let mut nested = FxHashSet::default();
        for entry in &unit.inner_classes {
            if unit.constants.class_name(entry.inner)?.starts_with(&nested_prefix) {
                nested.insert(entry.inner);
            }
        }

        let mut dangers = dangerous.clone();
        if is_outer {
            for method in unit.methods.iter().filter(|method| method.is_synthetic()) {
                match self.check_method(unit, name, method, false, &nested, &dangers) {
                    Ok(()) => {}
                    Err(VerifyError::Violation(violation)) => {
                        tracing::trace!(
                            accessor = %method.name,
                            member = %violation.member(),
                            "dangerous accessor"
                        );
                        dangers.insert(method.name.clone(), violation);
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        for method in &unit.methods {
            if is_outer && !method.roles.intersects(Roles::GENERATION) {
                continue;
            }
            self.check_method(unit, name, method, true, &nested, &dangers)?;
        }
        tracing::trace!(unit = name, methods = unit.methods.len(), "verified unit");
        Ok(())
    }

    fn check_method(
        &mut self,
        unit: &Unit,
        name: &str,
        method: &MethodInfo,
        check_nested: bool,
        nested: &FxHashSet<u16>,
        dangers: &Dangers,
    ) -> Result<(), VerifyError> {
        let Some(code) = &method.code else {
            return Ok(());
        };
        for instruction in decode_instructions(&code.bytecode)? {
            let Some(index) = instruction.symbol() else {
                continue;
            };
            let opcode = instruction.opcode;
            if opcode == Opcode::InvokeDynamic {
                continue;
            }
            if opcode.is_field_access() || opcode.is_invoke() {
                let Ok(member) = unit.constants.member_ref(index) else {
                    continue;
                };
                if member.owner != self.reference_name {
                    continue;
                }
                let found = if opcode.is_field_access() {
                    self.check_field(member.name)
                } else {
                    self.check_call(member.name, member.descriptor, dangers)
                };
                match found {
                    Some(Found::Member(member)) => {
                        let blame_unit = self.describe(name)?;
                        return Err(BytecodeAccessViolation::new(&method.name, blame_unit, name, member).into());
                    }
                    Some(Found::Accessor(inner)) => {
                        let blame_unit = self.describe(name)?;
                        return Err(
                            BytecodeAccessViolation::through(inner, &method.name, blame_unit, name).into(),
                        );
                    }
                    None => {}
                }
            } else if check_nested && nested.contains(&index) {
                let nested_name = unit.constants.class_name(index)?.to_string();
                let loaded = self.pool.resolve(&nested_name)?;
                self.verify_unit(loaded.unit(), &nested_name, dangers)?;
            }
        }
        Ok(())
    }

    fn check_field(&self, field_name: &str) -> Option<Found<'_>> {
        // Missing fields fail at link time instead
        let field = self.reference.field(field_name)?;
        if field.is_static() && field.roles.contains(Roles::HELPER) {
            return None;
        }
        if field.is_public() {
            return None;
        }
        Some(Found::Member(Member::Field {
            owner: self.reference_name.to_string(),
            name: field.name.clone(),
        }))
    }

    fn check_call<'d>(&self, method_name: &str, descriptor: &str, dangers: &'d Dangers) -> Option<Found<'d>> {
        if method_name == CONSTRUCTOR {
            let constructor = self.reference.methods.iter().find(|candidate| {
                candidate.is_constructor() && !candidate.is_public() && candidate.descriptor == descriptor
            })?;
            return Some(Found::Member(Member::Constructor {
                owner: self.reference_name.to_string(),
                descriptor: constructor.descriptor.clone(),
            }));
        }

        let candidate = self.reference.methods.iter().find(|candidate| {
            candidate.name == method_name
                && !candidate.is_public()
                && candidate.descriptor == descriptor
                && (!candidate.roles.intersects(Roles::GENERATION) || !candidate.is_static())
        })?;
        if let Some(inner) = dangers.get(&candidate.name) {
            return Some(Found::Accessor(inner));
        }
        // Compiler-generated methods are presumed safe
        if candidate.is_synthetic() {
            return None;
        }
        Some(Found::Member(Member::Method {
            owner: self.reference_name.to_string(),
            name: candidate.name.clone(),
            descriptor: candidate.descriptor.clone(),
        }))
    }

    /// `` `Inner' (inside `f' method of `Outer') ``
    fn describe(&self, name: &str) -> Result<String, VerifyError> {
        let mut text = String::new();
        let mut open = 0;
        let mut seen = FxHashSet::default();
        let mut current = name.to_string();
        loop {
            let loaded;
            let unit = if current == self.reference_name {
                self.reference
            } else {
                loaded = self.pool.resolve(&current)?;
                loaded.unit()
            };
            text.push_str(&format!("`{}'", simple_name(unit, &current)?));

            let Some(enclosing) = &unit.enclosing_method else {
                break;
            };
            let Some((method, _)) = &enclosing.method else {
                break;
            };
            let outer = unit.constants.class_name(enclosing.class)?.to_string();
            seen.insert(current);
            if seen.contains(&outer) {
                break;
            }
            text.push_str(&format!(" (inside `{method}' method of "));
            open += 1;
            current = outer;
        }
        text.push_str(&")".repeat(open));
        Ok(text)
    }
}

enum Found<'a> {
    Member(Member),
    Accessor(&'a BytecodeAccessViolation),
}

/// Source-level simple name; anonymous units have an empty name
fn simple_name(unit: &Unit, name: &str) -> Result<String, ConstantError> {
    for entry in &unit.inner_classes {
        if entry.inner == unit.this_class || unit.constants.class_name(entry.inner)? == name {
            return Ok(entry.simple_name.clone().unwrap_or_default());
        }
    }
    let base = name.rsplit('/').next().unwrap_or(name);
    Ok(base.rsplit('$').next().unwrap_or(base).to_string())
}
