//! Instruction stream parsing and in-place symbol rewriting

use crate::encoder::{BytecodeReader, DecodeError};
use crate::opcode::{Opcode, OperandKind};

/// Decoded operand of one instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Integer literal
    Int(i32),
    /// Double literal
    Double(f64),
    /// Local slot
    Local(u16),
    /// Relative branch offset
    Branch(i32),
    /// Symbol-table index
    Symbol(u16),
    /// Symbol-table index plus dimension count
    SymbolDims(u16, u8),
    /// Primitive array element tag
    ArrayType(u8),
}

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    /// Byte offset of the opcode
    pub offset: usize,
    /// The opcode
    pub opcode: Opcode,
    /// Decoded operand
    pub operand: Operand,
}

impl Instruction {
    /// Symbol-table index referenced by this instruction, if any
    pub fn symbol(&self) -> Option<u16> {
        match self.operand {
            Operand::Symbol(index) | Operand::SymbolDims(index, _) => Some(index),
            _ => None,
        }
    }

    /// Total encoded length
    pub fn len(&self) -> usize {
        1 + self.opcode.operand_kind().size()
    }

    /// Instructions always encode at least their opcode byte
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Parse all instructions from bytecode
pub fn decode_instructions(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut instructions = Vec::new();
    let mut reader = BytecodeReader::new(code);

    while reader.has_more() {
        let offset = reader.position();
        let byte = reader.read_u8()?;
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))?;

        let operand = match opcode.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::Int => Operand::Int(reader.read_i32()?),
            OperandKind::Double => Operand::Double(reader.read_f64()?),
            OperandKind::Local => Operand::Local(reader.read_u16()?),
            OperandKind::Branch => Operand::Branch(reader.read_i32()?),
            OperandKind::Symbol => Operand::Symbol(reader.read_u16()?),
            OperandKind::SymbolDims => {
                let index = reader.read_u16()?;
                Operand::SymbolDims(index, reader.read_u8()?)
            }
            OperandKind::ArrayType => Operand::ArrayType(reader.read_u8()?),
        };

        instructions.push(Instruction {
            offset,
            opcode,
            operand,
        });
    }

    Ok(instructions)
}

/// Rewrite symbol-table operands in place
///
/// `remap` receives each instruction carrying a symbol operand and returns the
/// replacement index, or `None` to leave it alone. Returns the number of
/// operands changed. Instruction offsets never move.
pub fn rewrite_symbols<F>(code: &mut [u8], mut remap: F) -> Result<usize, DecodeError>
where
    F: FnMut(&Instruction) -> Option<u16>,
{
    let instructions = decode_instructions(code)?;
    let mut changed = 0;
    for instruction in &instructions {
        let Some(current) = instruction.symbol() else {
            continue;
        };
        if let Some(replacement) = remap(instruction) {
            if replacement != current {
                let at = instruction.offset + 1;
                code[at..at + 2].copy_from_slice(&replacement.to_le_bytes());
                changed += 1;
            }
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::BytecodeWriter;

    fn sample() -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        writer.emit_symbol(Opcode::New, 3);
        writer.emit_opcode(Opcode::Dup);
        writer.emit_branch(Opcode::Goto, 4);
        writer.emit_symbol(Opcode::InvokeSpecial, 5);
        writer.emit_multi_new_array(3, 2);
        writer.emit_opcode(Opcode::Areturn);
        writer.into_bytes()
    }

    #[test]
    fn test_decode_offsets() {
        let instructions = decode_instructions(&sample()).unwrap();
        let offsets: Vec<usize> = instructions.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 3, 4, 9, 12, 16]);
        assert_eq!(instructions[4].operand, Operand::SymbolDims(3, 2));
    }

    #[test]
    fn test_rewrite_keeps_layout() {
        let mut code = sample();
        let before = decode_instructions(&code).unwrap();
        let changed = rewrite_symbols(&mut code, |i| (i.symbol() == Some(3)).then_some(9)).unwrap();
        assert_eq!(changed, 2);

        let after = decode_instructions(&code).unwrap();
        assert_eq!(before.len(), after.len());
        assert_eq!(after[0].symbol(), Some(9));
        assert_eq!(after[2].operand, Operand::Branch(4));
        assert_eq!(after[3].symbol(), Some(5));
        assert_eq!(after[4].operand, Operand::SymbolDims(9, 2));
    }

    #[test]
    fn test_truncated_operand() {
        let code = vec![Opcode::New.to_u8(), 1];
        assert!(matches!(
            decode_instructions(&code),
            Err(DecodeError::UnexpectedEnd(1))
        ));
    }
}
