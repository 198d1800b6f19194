//! Binary Unit Format
//!
//! This crate provides the instruction set, symbol table, descriptors and
//! the self-describing binary encoding of compiled units consumed by the
//! retargeting engine.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod code;
pub mod constants;
pub mod descriptor;
pub mod encoder;
pub mod opcode;
pub mod roles;
pub mod unit;

pub use builder::{CodeBuilder, UnitBuilder, OBJECT};
pub use code::{decode_instructions, rewrite_symbols, Instruction, Operand};
pub use constants::{Constant, ConstantError, ConstantPool, MemberKind, MemberRef, MAX_ENTRIES};
pub use descriptor::{
    human_class_name, nested_path, outermost_name, remap_class_name, remap_descriptor,
    DescriptorError, FieldType, MethodDescriptor,
};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use opcode::Opcode;
pub use roles::{access, Role, Roles};
pub use unit::{
    Code, EnclosingMethod, FieldInfo, InnerClass, LocalVariable, MethodInfo, StackMapFrame, Unit,
    UnitError, VerificationType, CONSTRUCTOR, STATIC_INITIALIZER,
};
