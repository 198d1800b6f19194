//! Binary unit format
//!
//! One unit is one declared type. Nested types are separate units named
//! `Outer$Inner` and linked through the nested-unit table.

use crate::constants::{ConstantError, ConstantPool};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::roles::{access, Roles};
use thiserror::Error;

/// Magic number for unit files
pub const MAGIC: [u8; 4] = *b"UNIT";

/// Current unit format version
pub const VERSION: u32 = 1;

/// Magic + version + checksum
const HEADER_LEN: usize = 12;

/// Name of instance constructors
pub const CONSTRUCTOR: &str = "<init>";

/// Name of static initializers
pub const STATIC_INITIALIZER: &str = "<clinit>";

/// Unit encoding/decoding errors
#[derive(Debug, Error)]
pub enum UnitError {
    /// Decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected UNIT, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum of the payload
        actual: u32,
    },

    /// A structural index does not name the right kind of symbol
    #[error("Bad constant reference: {0}")]
    BadConstant(#[from] ConstantError),
}

fn emit_optional_string(writer: &mut BytecodeWriter, value: Option<&str>) {
    match value {
        Some(text) => {
            writer.emit_u8(1);
            writer.emit_string(text);
        }
        None => writer.emit_u8(0),
    }
}

fn read_optional_string(reader: &mut BytecodeReader<'_>) -> Result<Option<String>, DecodeError> {
    match reader.read_u8()? {
        0 => Ok(None),
        _ => Ok(Some(reader.read_string()?)),
    }
}

/// Field declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    /// Access flags
    pub access: u16,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Generation roles
    pub roles: Roles,
}

impl FieldInfo {
    /// Public field
    pub fn is_public(&self) -> bool {
        self.access & access::PUBLIC != 0
    }

    /// Static field
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.access);
        writer.emit_string(&self.name);
        writer.emit_string(&self.descriptor);
        writer.emit_u8(self.roles.bits());
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            access: reader.read_u16()?,
            name: reader.read_string()?,
            descriptor: reader.read_string()?,
            roles: Roles::from_bits_truncate(reader.read_u8()?),
        })
    }
}

/// Debug entry naming a local slot over a bytecode range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// First bytecode offset where the slot is live
    pub start: u32,
    /// Length of the live range
    pub length: u32,
    /// Variable name
    pub name: String,
    /// Field descriptor of the variable
    pub descriptor: String,
    /// Local slot
    pub slot: u16,
}

/// Type of one stack-map slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    /// Unusable slot
    Top,
    /// Integer
    Int,
    /// Double
    Double,
    /// Null reference
    Null,
    /// `this` before the super constructor ran
    UninitializedThis,
    /// Reference to an instance of the Class entry at this index
    Object(u16),
    /// Object created by the `New` at this offset, not yet constructed
    Uninitialized(u32),
}

impl VerificationType {
    fn encode(&self, writer: &mut BytecodeWriter) {
        match *self {
            Self::Top => writer.emit_u8(0),
            Self::Int => writer.emit_u8(1),
            Self::Double => writer.emit_u8(2),
            Self::Null => writer.emit_u8(3),
            Self::UninitializedThis => writer.emit_u8(4),
            Self::Object(class) => {
                writer.emit_u8(5);
                writer.emit_u16(class);
            }
            Self::Uninitialized(offset) => {
                writer.emit_u8(6);
                writer.emit_u32(offset);
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let at = reader.position();
        Ok(match reader.read_u8()? {
            0 => Self::Top,
            1 => Self::Int,
            2 => Self::Double,
            3 => Self::Null,
            4 => Self::UninitializedThis,
            5 => Self::Object(reader.read_u16()?),
            6 => Self::Uninitialized(reader.read_u32()?),
            other => return Err(DecodeError::InvalidVerificationType(other, at)),
        })
    }
}

/// Full frame describing locals and operand stack at a branch target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapFrame {
    /// Bytecode offset
    pub offset: u32,
    /// Local slots
    pub locals: Vec<VerificationType>,
    /// Operand stack, bottom first
    pub stack: Vec<VerificationType>,
}

impl StackMapFrame {
    /// Mutable access to every slot in the frame
    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut VerificationType> {
        self.locals.iter_mut().chain(self.stack.iter_mut())
    }
}

/// Method body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Code {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local slots
    pub max_locals: u16,
    /// Instruction stream
    pub bytecode: Vec<u8>,
    /// Local-variable debug table
    pub local_variables: Vec<LocalVariable>,
    /// Stack-map frames
    pub stack_map: Vec<StackMapFrame>,
}

impl Code {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.max_stack);
        writer.emit_u16(self.max_locals);
        writer.emit_blob(&self.bytecode);

        writer.emit_u16(self.local_variables.len() as u16);
        for local in &self.local_variables {
            writer.emit_u32(local.start);
            writer.emit_u32(local.length);
            writer.emit_string(&local.name);
            writer.emit_string(&local.descriptor);
            writer.emit_u16(local.slot);
        }

        writer.emit_u16(self.stack_map.len() as u16);
        for frame in &self.stack_map {
            writer.emit_u32(frame.offset);
            writer.emit_u16(frame.locals.len() as u16);
            for slot in &frame.locals {
                slot.encode(writer);
            }
            writer.emit_u16(frame.stack.len() as u16);
            for slot in &frame.stack {
                slot.encode(writer);
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let max_stack = reader.read_u16()?;
        let max_locals = reader.read_u16()?;
        let bytecode = reader.read_blob()?;

        let local_count = reader.read_u16()? as usize;
        let mut local_variables = Vec::with_capacity(local_count);
        for _ in 0..local_count {
            local_variables.push(LocalVariable {
                start: reader.read_u32()?,
                length: reader.read_u32()?,
                name: reader.read_string()?,
                descriptor: reader.read_string()?,
                slot: reader.read_u16()?,
            });
        }

        let frame_count = reader.read_u16()? as usize;
        let mut stack_map = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            let offset = reader.read_u32()?;
            let locals = (0..reader.read_u16()?)
                .map(|_| VerificationType::decode(reader))
                .collect::<Result<Vec<_>, _>>()?;
            let stack = (0..reader.read_u16()?)
                .map(|_| VerificationType::decode(reader))
                .collect::<Result<Vec<_>, _>>()?;
            stack_map.push(StackMapFrame {
                offset,
                locals,
                stack,
            });
        }

        Ok(Self {
            max_stack,
            max_locals,
            bytecode,
            local_variables,
            stack_map,
        })
    }
}

/// Method declaration
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    /// Access flags
    pub access: u16,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Generation roles
    pub roles: Roles,
    /// Body, absent for abstract and native methods
    pub code: Option<Code>,
}

impl MethodInfo {
    /// Public method
    pub fn is_public(&self) -> bool {
        self.access & access::PUBLIC != 0
    }

    /// Private method
    pub fn is_private(&self) -> bool {
        self.access & access::PRIVATE != 0
    }

    /// Static method
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    /// Final method
    pub fn is_final(&self) -> bool {
        self.access & access::FINAL != 0
    }

    /// Compiler-generated method
    pub fn is_synthetic(&self) -> bool {
        self.access & access::SYNTHETIC != 0
    }

    /// Instance constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.access);
        writer.emit_string(&self.name);
        writer.emit_string(&self.descriptor);
        writer.emit_u8(self.roles.bits());
        match &self.code {
            Some(code) => {
                writer.emit_u8(1);
                code.encode(writer);
            }
            None => writer.emit_u8(0),
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let access = reader.read_u16()?;
        let name = reader.read_string()?;
        let descriptor = reader.read_string()?;
        let roles = Roles::from_bits_truncate(reader.read_u8()?);
        let code = match reader.read_u8()? {
            0 => None,
            _ => Some(Code::decode(reader)?),
        };
        Ok(Self {
            access,
            name,
            descriptor,
            roles,
            code,
        })
    }
}

/// Nested-unit table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClass {
    /// Class index of the nested unit
    pub inner: u16,
    /// Class index of the directly enclosing unit, 0 for local and anonymous units
    pub outer: u16,
    /// Simple name, absent for anonymous units
    pub simple_name: Option<String>,
    /// Access flags of the nested declaration
    pub access: u16,
}

/// Method a local or anonymous unit is declared in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingMethod {
    /// Class index of the enclosing unit
    pub class: u16,
    /// Name and descriptor of the enclosing method, absent in initializers
    pub method: Option<(String, String)>,
}

/// One declared type
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    /// Access flags
    pub access: u16,
    /// Class index naming this unit
    pub this_class: u16,
    /// Class index of the super unit, 0 for none
    pub super_class: u16,
    /// Class indices of implemented interfaces
    pub interfaces: Vec<u16>,
    /// Symbol table
    pub constants: ConstantPool,
    /// Field table
    pub fields: Vec<FieldInfo>,
    /// Method table
    pub methods: Vec<MethodInfo>,
    /// Nested-unit table
    pub inner_classes: Vec<InnerClass>,
    /// Enclosing method record
    pub enclosing_method: Option<EnclosingMethod>,
    /// Class index of the nest host
    pub nest_host: Option<u16>,
    /// Class indices of nest members
    pub nest_members: Vec<u16>,
    /// Source file name
    pub source_file: Option<String>,
}

impl Unit {
    /// Qualified name in slash form
    pub fn name(&self) -> Result<&str, ConstantError> {
        self.constants.class_name(self.this_class)
    }

    /// Qualified name of the super unit
    pub fn super_name(&self) -> Result<Option<&str>, ConstantError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constants.class_name(self.super_class).map(Some)
    }

    /// Qualified names of implemented interfaces
    pub fn interface_names(&self) -> Result<Vec<&str>, ConstantError> {
        self.interfaces
            .iter()
            .map(|&index| self.constants.class_name(index))
            .collect()
    }

    /// Final unit
    pub fn is_final(&self) -> bool {
        self.access & access::FINAL != 0
    }

    /// Interface unit
    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Look up a method by name and descriptor
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    /// All overloads with the given name
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodInfo> {
        self.methods.iter().filter(move |method| method.name == name)
    }

    /// Names of units listed in the nested-unit table
    pub fn inner_class_names(&self) -> Result<Vec<&str>, ConstantError> {
        self.inner_classes
            .iter()
            .map(|entry| self.constants.class_name(entry.inner))
            .collect()
    }

    /// Check that every structural index names a Class entry
    pub fn validate(&self) -> Result<(), ConstantError> {
        self.name()?;
        self.super_name()?;
        self.interface_names()?;
        for entry in &self.inner_classes {
            self.constants.class_name(entry.inner)?;
            if entry.outer != 0 {
                self.constants.class_name(entry.outer)?;
            }
        }
        if let Some(enclosing) = &self.enclosing_method {
            self.constants.class_name(enclosing.class)?;
        }
        if let Some(host) = self.nest_host {
            self.constants.class_name(host)?;
        }
        for &member in &self.nest_members {
            self.constants.class_name(member)?;
        }
        Ok(())
    }

    /// Encode to binary format
    ///
    /// - Header: magic (4 bytes) + version (u32) + checksum (u32)
    /// - Unit header: access, this, super, interfaces
    /// - Symbol table
    /// - Field and method tables
    /// - Nesting metadata and source file
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.buffer.extend_from_slice(&MAGIC);
        writer.emit_u32(VERSION);
        let checksum_offset = writer.offset();
        writer.emit_u32(0);

        writer.emit_u16(self.access);
        writer.emit_u16(self.this_class);
        writer.emit_u16(self.super_class);
        writer.emit_u16(self.interfaces.len() as u16);
        for &interface in &self.interfaces {
            writer.emit_u16(interface);
        }

        self.constants.encode(&mut writer);

        writer.emit_u16(self.fields.len() as u16);
        for field in &self.fields {
            field.encode(&mut writer);
        }

        writer.emit_u16(self.methods.len() as u16);
        for method in &self.methods {
            method.encode(&mut writer);
        }

        writer.emit_u16(self.inner_classes.len() as u16);
        for entry in &self.inner_classes {
            writer.emit_u16(entry.inner);
            writer.emit_u16(entry.outer);
            emit_optional_string(&mut writer, entry.simple_name.as_deref());
            writer.emit_u16(entry.access);
        }

        match &self.enclosing_method {
            Some(enclosing) => {
                writer.emit_u8(1);
                writer.emit_u16(enclosing.class);
                match &enclosing.method {
                    Some((name, descriptor)) => {
                        writer.emit_u8(1);
                        writer.emit_string(name);
                        writer.emit_string(descriptor);
                    }
                    None => writer.emit_u8(0),
                }
            }
            None => writer.emit_u8(0),
        }

        writer.emit_u16(self.nest_host.unwrap_or(0));
        writer.emit_u16(self.nest_members.len() as u16);
        for &member in &self.nest_members {
            writer.emit_u16(member);
        }

        emit_optional_string(&mut writer, self.source_file.as_deref());

        let checksum = crc32fast::hash(&writer.buffer[HEADER_LEN..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode from binary format
    pub fn decode(data: &[u8]) -> Result<Self, UnitError> {
        let mut reader = BytecodeReader::new(data);

        let magic_bytes = reader.read_bytes(4)?;
        let magic = [magic_bytes[0], magic_bytes[1], magic_bytes[2], magic_bytes[3]];
        if magic != MAGIC {
            return Err(UnitError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(UnitError::UnsupportedVersion(version));
        }

        let stored_checksum = reader.read_u32()?;
        let calculated_checksum = crc32fast::hash(&data[HEADER_LEN..]);
        if stored_checksum != calculated_checksum {
            return Err(UnitError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let access = reader.read_u16()?;
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;
        let interfaces = (0..reader.read_u16()?)
            .map(|_| reader.read_u16())
            .collect::<Result<Vec<_>, _>>()?;

        let constants = ConstantPool::decode(&mut reader)?;

        let fields = (0..reader.read_u16()?)
            .map(|_| FieldInfo::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;
        let methods = (0..reader.read_u16()?)
            .map(|_| MethodInfo::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;

        let inner_count = reader.read_u16()? as usize;
        let mut inner_classes = Vec::with_capacity(inner_count);
        for _ in 0..inner_count {
            inner_classes.push(InnerClass {
                inner: reader.read_u16()?,
                outer: reader.read_u16()?,
                simple_name: read_optional_string(&mut reader)?,
                access: reader.read_u16()?,
            });
        }

        let enclosing_method = match reader.read_u8()? {
            0 => None,
            _ => {
                let class = reader.read_u16()?;
                let method = match reader.read_u8()? {
                    0 => None,
                    _ => Some((reader.read_string()?, reader.read_string()?)),
                };
                Some(EnclosingMethod { class, method })
            }
        };

        let nest_host = Some(reader.read_u16()?).filter(|&index| index != 0);
        let nest_members = (0..reader.read_u16()?)
            .map(|_| reader.read_u16())
            .collect::<Result<Vec<_>, _>>()?;

        let source_file = read_optional_string(&mut reader)?;

        let unit = Self {
            access,
            this_class,
            super_class,
            interfaces,
            constants,
            fields,
            methods,
            inner_classes,
            enclosing_method,
            nest_host,
            nest_members,
            source_file,
        };
        unit.validate()?;
        Ok(unit)
    }
}
