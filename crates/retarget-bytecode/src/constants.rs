//! Symbol table (constant pool)
//!
//! Indices are 1-based; index 0 never names an entry and is used as "none" by
//! the unit format (e.g. a unit without a super class).

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use thiserror::Error;

/// Errors from typed symbol-table lookups
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstantError {
    /// No entry at this index
    #[error("No constant at index {0}")]
    Missing(u16),

    /// Entry exists but has a different kind
    #[error("Constant {index} is not a {expected}")]
    WrongKind {
        /// Offending index
        index: u16,
        /// Kind the caller asked for
        expected: &'static str,
    },

    /// Every 16-bit index is taken
    #[error("Symbol table is full ({MAX_ENTRIES} entries)")]
    Overflow,
}

/// Largest number of entries a symbol table can hold
pub const MAX_ENTRIES: usize = u16::MAX as usize;

mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
}

/// One symbol-table entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Raw UTF-8 text (names, descriptors)
    Utf8(String),
    /// 32-bit integer literal
    Integer(i32),
    /// 64-bit integer literal
    Long(i64),
    /// 64-bit float literal
    Double(f64),
    /// String literal
    String {
        /// Utf8 index of the text
        utf8: u16,
    },
    /// Class reference; the name is slash form or an array descriptor
    Class {
        /// Utf8 index of the name
        name: u16,
    },
    /// Member name and descriptor pair
    NameAndType {
        /// Utf8 index of the member name
        name: u16,
        /// Utf8 index of the descriptor
        descriptor: u16,
    },
    /// Field reference
    FieldRef {
        /// Class index of the owner
        class: u16,
        /// NameAndType index
        name_and_type: u16,
    },
    /// Class method reference
    MethodRef {
        /// Class index of the owner
        class: u16,
        /// NameAndType index
        name_and_type: u16,
    },
    /// Interface method reference
    InterfaceMethodRef {
        /// Class index of the owner
        class: u16,
        /// NameAndType index
        name_and_type: u16,
    },
}

impl Constant {
    /// Owner class and name-and-type indices of a member reference
    pub fn member_parts(&self) -> Option<(u16, u16)> {
        match *self {
            Self::FieldRef {
                class,
                name_and_type,
            }
            | Self::MethodRef {
                class,
                name_and_type,
            }
            | Self::InterfaceMethodRef {
                class,
                name_and_type,
            } => Some((class, name_and_type)),
            _ => None,
        }
    }

    /// Same kind of member reference, pointing elsewhere
    pub fn with_member_parts(&self, class: u16, name_and_type: u16) -> Option<Self> {
        match self {
            Self::FieldRef { .. } => Some(Self::FieldRef {
                class,
                name_and_type,
            }),
            Self::MethodRef { .. } => Some(Self::MethodRef {
                class,
                name_and_type,
            }),
            Self::InterfaceMethodRef { .. } => Some(Self::InterfaceMethodRef {
                class,
                name_and_type,
            }),
            _ => None,
        }
    }
}

/// Kind of a member reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Field
    Field,
    /// Class method
    Method,
    /// Interface method
    InterfaceMethod,
}

/// A fully resolved member reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Kind of reference
    pub kind: MemberKind,
    /// Class index of the owner
    pub class_index: u16,
    /// NameAndType index
    pub name_and_type_index: u16,
    /// Owner class name
    pub owner: &'a str,
    /// Member name
    pub name: &'a str,
    /// Member descriptor
    pub descriptor: &'a str,
}

/// Symbol table of one unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Create a new empty symbol table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an entry by 1-based index
    pub fn get(&self, index: u16) -> Option<&Constant> {
        (index as usize)
            .checked_sub(1)
            .and_then(|slot| self.entries.get(slot))
    }

    /// Iterate `(index, entry)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(slot, constant)| ((slot + 1) as u16, constant))
    }

    /// Append an entry without looking for an equal one
    pub fn push(&mut self, constant: Constant) -> Result<u16, ConstantError> {
        if self.entries.len() >= MAX_ENTRIES {
            return Err(ConstantError::Overflow);
        }
        self.entries.push(constant);
        Ok(self.entries.len() as u16)
    }

    /// Return the index of an equal entry, appending one if absent
    pub fn add(&mut self, constant: Constant) -> Result<u16, ConstantError> {
        match self.entries.iter().position(|existing| *existing == constant) {
            Some(slot) => Ok((slot + 1) as u16),
            None => self.push(constant),
        }
    }

    /// Replace the entry at `index`
    pub fn set(&mut self, index: u16, constant: Constant) -> Result<(), ConstantError> {
        let slot = (index as usize)
            .checked_sub(1)
            .filter(|slot| *slot < self.entries.len())
            .ok_or(ConstantError::Missing(index))?;
        self.entries[slot] = constant;
        Ok(())
    }

    // ===== Insert-if-absent helpers =====

    /// Add a Utf8 entry
    pub fn add_utf8(&mut self, text: &str) -> Result<u16, ConstantError> {
        match self
            .entries
            .iter()
            .position(|c| matches!(c, Constant::Utf8(existing) if existing == text))
        {
            Some(slot) => Ok((slot + 1) as u16),
            None => self.push(Constant::Utf8(text.to_string())),
        }
    }

    /// Add a string literal
    pub fn add_string(&mut self, text: &str) -> Result<u16, ConstantError> {
        let utf8 = self.add_utf8(text)?;
        self.add(Constant::String { utf8 })
    }

    /// Add an integer literal
    pub fn add_integer(&mut self, value: i32) -> Result<u16, ConstantError> {
        self.add(Constant::Integer(value))
    }

    /// Add a class reference
    pub fn add_class(&mut self, name: &str) -> Result<u16, ConstantError> {
        let name = self.add_utf8(name)?;
        self.add(Constant::Class { name })
    }

    /// Add a name-and-type pair
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ConstantError> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType { name, descriptor })
    }

    /// Add a field reference
    pub fn add_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ConstantError> {
        let class = self.add_class(owner)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Add a class method reference
    pub fn add_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ConstantError> {
        let class = self.add_class(owner)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::MethodRef {
            class,
            name_and_type,
        })
    }

    /// Add an interface method reference
    pub fn add_interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ConstantError> {
        let class = self.add_class(owner)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::InterfaceMethodRef {
            class,
            name_and_type,
        })
    }

    /// Point an existing Class entry at a new name
    pub fn rename_class(&mut self, index: u16, new_name: &str) -> Result<(), ConstantError> {
        self.class_name(index)?;
        let name = self.add_utf8(new_name)?;
        self.set(index, Constant::Class { name })
    }

    // ===== Typed lookups =====

    /// Text of a Utf8 entry
    pub fn utf8(&self, index: u16) -> Result<&str, ConstantError> {
        match self.get(index) {
            Some(Constant::Utf8(text)) => Ok(text),
            Some(_) => Err(ConstantError::WrongKind {
                index,
                expected: "Utf8",
            }),
            None => Err(ConstantError::Missing(index)),
        }
    }

    /// Name of a Class entry
    pub fn class_name(&self, index: u16) -> Result<&str, ConstantError> {
        match self.get(index) {
            Some(Constant::Class { name }) => self.utf8(*name),
            Some(_) => Err(ConstantError::WrongKind {
                index,
                expected: "Class",
            }),
            None => Err(ConstantError::Missing(index)),
        }
    }

    /// Name and descriptor of a NameAndType entry
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ConstantError> {
        match self.get(index) {
            Some(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            Some(_) => Err(ConstantError::WrongKind {
                index,
                expected: "NameAndType",
            }),
            None => Err(ConstantError::Missing(index)),
        }
    }

    /// Resolve a field/method/interface-method reference
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>, ConstantError> {
        let constant = self.get(index).ok_or(ConstantError::Missing(index))?;
        let kind = match constant {
            Constant::FieldRef { .. } => MemberKind::Field,
            Constant::MethodRef { .. } => MemberKind::Method,
            Constant::InterfaceMethodRef { .. } => MemberKind::InterfaceMethod,
            _ => {
                return Err(ConstantError::WrongKind {
                    index,
                    expected: "member reference",
                })
            }
        };
        let (class_index, name_and_type_index) = constant
            .member_parts()
            .ok_or(ConstantError::Missing(index))?;
        let owner = self.class_name(class_index)?;
        let (name, descriptor) = self.name_and_type(name_and_type_index)?;
        Ok(MemberRef {
            kind,
            class_index,
            name_and_type_index,
            owner,
            name,
            descriptor,
        })
    }

    // ===== Encoding =====

    /// Encode the table
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        // Bounded by MAX_ENTRIES
        writer.emit_u16(self.entries.len() as u16);
        for constant in &self.entries {
            match constant {
                Constant::Utf8(text) => {
                    writer.emit_u8(tag::UTF8);
                    writer.emit_string(text);
                }
                Constant::Integer(value) => {
                    writer.emit_u8(tag::INTEGER);
                    writer.emit_i32(*value);
                }
                Constant::Long(value) => {
                    writer.emit_u8(tag::LONG);
                    writer.emit_i64(*value);
                }
                Constant::Double(value) => {
                    writer.emit_u8(tag::DOUBLE);
                    writer.emit_f64(*value);
                }
                Constant::String { utf8 } => {
                    writer.emit_u8(tag::STRING);
                    writer.emit_u16(*utf8);
                }
                Constant::Class { name } => {
                    writer.emit_u8(tag::CLASS);
                    writer.emit_u16(*name);
                }
                Constant::NameAndType { name, descriptor } => {
                    writer.emit_u8(tag::NAME_AND_TYPE);
                    writer.emit_u16(*name);
                    writer.emit_u16(*descriptor);
                }
                Constant::FieldRef {
                    class,
                    name_and_type,
                } => {
                    writer.emit_u8(tag::FIELD_REF);
                    writer.emit_u16(*class);
                    writer.emit_u16(*name_and_type);
                }
                Constant::MethodRef {
                    class,
                    name_and_type,
                } => {
                    writer.emit_u8(tag::METHOD_REF);
                    writer.emit_u16(*class);
                    writer.emit_u16(*name_and_type);
                }
                Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    writer.emit_u8(tag::INTERFACE_METHOD_REF);
                    writer.emit_u16(*class);
                    writer.emit_u16(*name_and_type);
                }
            }
        }
    }

    /// Decode the table
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u16()? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = reader.position();
            let constant = match reader.read_u8()? {
                tag::UTF8 => Constant::Utf8(reader.read_string()?),
                tag::INTEGER => Constant::Integer(reader.read_i32()?),
                tag::LONG => Constant::Long(reader.read_i64()?),
                tag::DOUBLE => Constant::Double(reader.read_f64()?),
                tag::STRING => Constant::String {
                    utf8: reader.read_u16()?,
                },
                tag::CLASS => Constant::Class {
                    name: reader.read_u16()?,
                },
                tag::NAME_AND_TYPE => Constant::NameAndType {
                    name: reader.read_u16()?,
                    descriptor: reader.read_u16()?,
                },
                tag::FIELD_REF => Constant::FieldRef {
                    class: reader.read_u16()?,
                    name_and_type: reader.read_u16()?,
                },
                tag::METHOD_REF => Constant::MethodRef {
                    class: reader.read_u16()?,
                    name_and_type: reader.read_u16()?,
                },
                tag::INTERFACE_METHOD_REF => Constant::InterfaceMethodRef {
                    class: reader.read_u16()?,
                    name_and_type: reader.read_u16()?,
                },
                other => return Err(DecodeError::InvalidConstantTag(other, offset)),
            };
            entries.push(constant);
        }
        Ok(Self { entries })
    }
}
