//! Instruction set for compiled units
//!
//! Every instruction is a single opcode byte followed by fixed-width operands.
//! Symbol-table operands are always `u16`, so rewriting an operand in place never
//! moves another instruction and branch offsets stay valid.

/// Bytecode opcode enumeration
///
/// Opcodes are organized into categories:
/// - 0x00-0x0F: Stack manipulation & constants
/// - 0x10-0x1F: Local variables
/// - 0x20-0x2F: Integer arithmetic
/// - 0x30-0x3F: Double arithmetic
/// - 0x90-0x9F: Control flow
/// - 0xA0-0xAF: Invocation & returns
/// - 0xB0-0xBF: Object operations
/// - 0xC0-0xCF: Array operations
/// - 0xE0-0xEF: Error handling
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,
    /// Swap top two stack values
    Swap = 0x03,
    /// Push null reference
    AconstNull = 0x04,
    /// Push 32-bit integer constant (operand: i32)
    Iconst = 0x05,
    /// Push 64-bit float constant (operand: f64)
    Dconst = 0x06,
    /// Push a literal from the symbol table (operand: u16 index)
    Ldc = 0x07,

    // ===== Local Variables (0x10-0x1F) =====
    /// Load int local (operand: u16 slot)
    Iload = 0x10,
    /// Store int local (operand: u16 slot)
    Istore = 0x11,
    /// Load reference local (operand: u16 slot)
    Aload = 0x12,
    /// Store reference local (operand: u16 slot)
    Astore = 0x13,
    /// Load double local (operand: u16 slot)
    Dload = 0x14,
    /// Store double local (operand: u16 slot)
    Dstore = 0x15,

    // ===== Integer Arithmetic (0x20-0x2F) =====
    /// Integer addition
    Iadd = 0x20,
    /// Integer subtraction
    Isub = 0x21,
    /// Integer multiplication
    Imul = 0x22,
    /// Integer division
    Idiv = 0x23,
    /// Integer remainder
    Irem = 0x24,
    /// Integer negation
    Ineg = 0x25,

    // ===== Double Arithmetic (0x30-0x3F) =====
    /// Double addition
    Dadd = 0x30,
    /// Double subtraction
    Dsub = 0x31,
    /// Double multiplication
    Dmul = 0x32,
    /// Double division
    Ddiv = 0x33,
    /// Double negation
    Dneg = 0x34,

    // ===== Control Flow (0x90-0x9F) =====
    /// Unconditional branch (operand: i32 relative offset)
    Goto = 0x90,
    /// Branch if int is zero
    Ifeq = 0x91,
    /// Branch if int is non-zero
    Ifne = 0x92,
    /// Branch if int is negative
    Iflt = 0x93,
    /// Branch if int is non-negative
    Ifge = 0x94,
    /// Branch if two ints are equal
    IfIcmpeq = 0x95,
    /// Branch if two ints differ
    IfIcmpne = 0x96,
    /// Branch if first int is less than second
    IfIcmplt = 0x97,
    /// Branch if first int is not less than second
    IfIcmpge = 0x98,
    /// Branch if reference is null
    IfNull = 0x99,
    /// Branch if reference is not null
    IfNonNull = 0x9A,

    // ===== Invocation & Returns (0xA0-0xAF) =====
    /// Invoke instance method with virtual dispatch (operand: u16 method ref)
    InvokeVirtual = 0xA0,
    /// Invoke constructor, private or super method (operand: u16 method ref)
    InvokeSpecial = 0xA1,
    /// Invoke static method (operand: u16 method ref)
    InvokeStatic = 0xA2,
    /// Invoke interface method (operand: u16 interface method ref)
    InvokeInterface = 0xA3,
    /// Invoke through a call site (operand: u16 name-and-type)
    InvokeDynamic = 0xA4,
    /// Return void
    Return = 0xA8,
    /// Return int
    Ireturn = 0xA9,
    /// Return double
    Dreturn = 0xAA,
    /// Return reference
    Areturn = 0xAB,

    // ===== Object Operations (0xB0-0xBF) =====
    /// Allocate an object (operand: u16 class)
    New = 0xB0,
    /// Read instance field (operand: u16 field ref)
    GetField = 0xB1,
    /// Write instance field (operand: u16 field ref)
    PutField = 0xB2,
    /// Read static field (operand: u16 field ref)
    GetStatic = 0xB3,
    /// Write static field (operand: u16 field ref)
    PutStatic = 0xB4,
    /// Checked reference cast (operand: u16 class)
    CheckCast = 0xB5,
    /// Instance test (operand: u16 class)
    InstanceOf = 0xB6,

    // ===== Array Operations (0xC0-0xCF) =====
    /// Allocate a primitive array (operand: u8 element tag)
    NewArray = 0xC0,
    /// Allocate a reference array (operand: u16 class)
    ANewArray = 0xC1,
    /// Allocate a multi-dimensional array (operands: u16 class, u8 dimensions)
    MultiANewArray = 0xC2,
    /// Array length
    ArrayLength = 0xC3,
    /// Load reference element
    Aaload = 0xC4,
    /// Store reference element
    Aastore = 0xC5,
    /// Load int element
    Iaload = 0xC6,
    /// Store int element
    Iastore = 0xC7,

    // ===== Error Handling (0xE0-0xEF) =====
    /// Throw the reference on top of the stack
    Athrow = 0xE0,
}

/// Shape of the operands that follow an opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operands
    None,
    /// 32-bit signed integer literal
    Int,
    /// 64-bit float literal
    Double,
    /// u16 local slot
    Local,
    /// i32 branch offset relative to the opcode
    Branch,
    /// u16 symbol-table index
    Symbol,
    /// u16 symbol-table index followed by a u8 dimension count
    SymbolDims,
    /// u8 primitive array element tag
    ArrayType,
}

impl OperandKind {
    /// Size of the operands in bytes
    pub fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::ArrayType => 1,
            Self::Local | Self::Symbol => 2,
            Self::SymbolDims => 3,
            Self::Int | Self::Branch => 4,
            Self::Double => 8,
        }
    }
}

impl Opcode {
    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Pop),
            0x02 => Some(Self::Dup),
            0x03 => Some(Self::Swap),
            0x04 => Some(Self::AconstNull),
            0x05 => Some(Self::Iconst),
            0x06 => Some(Self::Dconst),
            0x07 => Some(Self::Ldc),

            0x10 => Some(Self::Iload),
            0x11 => Some(Self::Istore),
            0x12 => Some(Self::Aload),
            0x13 => Some(Self::Astore),
            0x14 => Some(Self::Dload),
            0x15 => Some(Self::Dstore),

            0x20 => Some(Self::Iadd),
            0x21 => Some(Self::Isub),
            0x22 => Some(Self::Imul),
            0x23 => Some(Self::Idiv),
            0x24 => Some(Self::Irem),
            0x25 => Some(Self::Ineg),

            0x30 => Some(Self::Dadd),
            0x31 => Some(Self::Dsub),
            0x32 => Some(Self::Dmul),
            0x33 => Some(Self::Ddiv),
            0x34 => Some(Self::Dneg),

            0x90 => Some(Self::Goto),
            0x91 => Some(Self::Ifeq),
            0x92 => Some(Self::Ifne),
            0x93 => Some(Self::Iflt),
            0x94 => Some(Self::Ifge),
            0x95 => Some(Self::IfIcmpeq),
            0x96 => Some(Self::IfIcmpne),
            0x97 => Some(Self::IfIcmplt),
            0x98 => Some(Self::IfIcmpge),
            0x99 => Some(Self::IfNull),
            0x9A => Some(Self::IfNonNull),

            0xA0 => Some(Self::InvokeVirtual),
            0xA1 => Some(Self::InvokeSpecial),
            0xA2 => Some(Self::InvokeStatic),
            0xA3 => Some(Self::InvokeInterface),
            0xA4 => Some(Self::InvokeDynamic),
            0xA8 => Some(Self::Return),
            0xA9 => Some(Self::Ireturn),
            0xAA => Some(Self::Dreturn),
            0xAB => Some(Self::Areturn),

            0xB0 => Some(Self::New),
            0xB1 => Some(Self::GetField),
            0xB2 => Some(Self::PutField),
            0xB3 => Some(Self::GetStatic),
            0xB4 => Some(Self::PutStatic),
            0xB5 => Some(Self::CheckCast),
            0xB6 => Some(Self::InstanceOf),

            0xC0 => Some(Self::NewArray),
            0xC1 => Some(Self::ANewArray),
            0xC2 => Some(Self::MultiANewArray),
            0xC3 => Some(Self::ArrayLength),
            0xC4 => Some(Self::Aaload),
            0xC5 => Some(Self::Aastore),
            0xC6 => Some(Self::Iaload),
            0xC7 => Some(Self::Iastore),

            0xE0 => Some(Self::Athrow),

            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the human-readable name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::Swap => "SWAP",
            Self::AconstNull => "ACONST_NULL",
            Self::Iconst => "ICONST",
            Self::Dconst => "DCONST",
            Self::Ldc => "LDC",
            Self::Iload => "ILOAD",
            Self::Istore => "ISTORE",
            Self::Aload => "ALOAD",
            Self::Astore => "ASTORE",
            Self::Dload => "DLOAD",
            Self::Dstore => "DSTORE",
            Self::Iadd => "IADD",
            Self::Isub => "ISUB",
            Self::Imul => "IMUL",
            Self::Idiv => "IDIV",
            Self::Irem => "IREM",
            Self::Ineg => "INEG",
            Self::Dadd => "DADD",
            Self::Dsub => "DSUB",
            Self::Dmul => "DMUL",
            Self::Ddiv => "DDIV",
            Self::Dneg => "DNEG",
            Self::Goto => "GOTO",
            Self::Ifeq => "IFEQ",
            Self::Ifne => "IFNE",
            Self::Iflt => "IFLT",
            Self::Ifge => "IFGE",
            Self::IfIcmpeq => "IF_ICMPEQ",
            Self::IfIcmpne => "IF_ICMPNE",
            Self::IfIcmplt => "IF_ICMPLT",
            Self::IfIcmpge => "IF_ICMPGE",
            Self::IfNull => "IFNULL",
            Self::IfNonNull => "IFNONNULL",
            Self::InvokeVirtual => "INVOKEVIRTUAL",
            Self::InvokeSpecial => "INVOKESPECIAL",
            Self::InvokeStatic => "INVOKESTATIC",
            Self::InvokeInterface => "INVOKEINTERFACE",
            Self::InvokeDynamic => "INVOKEDYNAMIC",
            Self::Return => "RETURN",
            Self::Ireturn => "IRETURN",
            Self::Dreturn => "DRETURN",
            Self::Areturn => "ARETURN",
            Self::New => "NEW",
            Self::GetField => "GETFIELD",
            Self::PutField => "PUTFIELD",
            Self::GetStatic => "GETSTATIC",
            Self::PutStatic => "PUTSTATIC",
            Self::CheckCast => "CHECKCAST",
            Self::InstanceOf => "INSTANCEOF",
            Self::NewArray => "NEWARRAY",
            Self::ANewArray => "ANEWARRAY",
            Self::MultiANewArray => "MULTIANEWARRAY",
            Self::ArrayLength => "ARRAYLENGTH",
            Self::Aaload => "AALOAD",
            Self::Aastore => "AASTORE",
            Self::Iaload => "IALOAD",
            Self::Iastore => "IASTORE",
            Self::Athrow => "ATHROW",
        }
    }

    /// Operand layout following this opcode
    pub fn operand_kind(self) -> OperandKind {
        match self {
            Self::Iconst => OperandKind::Int,
            Self::Dconst => OperandKind::Double,
            Self::Iload
            | Self::Istore
            | Self::Aload
            | Self::Astore
            | Self::Dload
            | Self::Dstore => OperandKind::Local,
            Self::Goto
            | Self::Ifeq
            | Self::Ifne
            | Self::Iflt
            | Self::Ifge
            | Self::IfIcmpeq
            | Self::IfIcmpne
            | Self::IfIcmplt
            | Self::IfIcmpge
            | Self::IfNull
            | Self::IfNonNull => OperandKind::Branch,
            Self::Ldc
            | Self::InvokeVirtual
            | Self::InvokeSpecial
            | Self::InvokeStatic
            | Self::InvokeInterface
            | Self::InvokeDynamic
            | Self::New
            | Self::GetField
            | Self::PutField
            | Self::GetStatic
            | Self::PutStatic
            | Self::CheckCast
            | Self::InstanceOf
            | Self::ANewArray => OperandKind::Symbol,
            Self::MultiANewArray => OperandKind::SymbolDims,
            Self::NewArray => OperandKind::ArrayType,
            _ => OperandKind::None,
        }
    }

    /// Check if this opcode carries a symbol-table operand
    pub fn references_symbol(self) -> bool {
        matches!(
            self.operand_kind(),
            OperandKind::Symbol | OperandKind::SymbolDims
        )
    }

    /// Check if this opcode reads or writes a field
    pub fn is_field_access(self) -> bool {
        matches!(
            self,
            Self::GetField | Self::PutField | Self::GetStatic | Self::PutStatic
        )
    }

    /// Check if this opcode invokes a member through a method reference
    ///
    /// `InvokeDynamic` is excluded: its operand names a call site, not a member.
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Self::InvokeVirtual | Self::InvokeSpecial | Self::InvokeStatic | Self::InvokeInterface
        )
    }

    /// Check if this opcode is a branch instruction
    pub fn is_branch(self) -> bool {
        self.operand_kind() == OperandKind::Branch
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Self::Return | Self::Ireturn | Self::Dreturn | Self::Areturn
        )
    }

    /// Check if this opcode terminates a basic block
    pub fn is_terminator(self) -> bool {
        self.is_branch() || self.is_return() || self == Self::Athrow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_byte_mapping() {
        for byte in 0u8..=255 {
            if let Some(opcode) = Opcode::from_u8(byte) {
                assert_eq!(opcode.to_u8(), byte, "{}", opcode.name());
            }
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0x0F), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_symbol_operands() {
        assert!(Opcode::New.references_symbol());
        assert!(Opcode::MultiANewArray.references_symbol());
        assert!(Opcode::InvokeDynamic.references_symbol());
        assert!(!Opcode::InvokeDynamic.is_invoke());
        assert!(!Opcode::Iload.references_symbol());
        assert_eq!(Opcode::MultiANewArray.operand_kind().size(), 3);
    }

    #[test]
    fn test_terminator_detection() {
        assert!(Opcode::Areturn.is_terminator());
        assert!(Opcode::Goto.is_terminator());
        assert!(Opcode::Athrow.is_terminator());
        assert!(!Opcode::Iadd.is_terminator());
    }
}
