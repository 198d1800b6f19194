//! Bytecode encoding and decoding utilities
//!
//! Low-level little-endian reader/writer shared by the unit format and the
//! instruction stream.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur during decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of input
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#x} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// Unknown symbol-table entry tag
    #[error("Invalid constant tag {0} at offset {1}")]
    InvalidConstantTag(u8, usize),

    /// Unknown stack-map verification type tag
    #[error("Invalid verification type tag {0} at offset {1}")]
    InvalidVerificationType(u8, usize),
}

/// Bytecode writer for encoding instructions and unit sections
pub struct BytecodeWriter {
    pub(crate) buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer (little-endian)
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float (little-endian)
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a length-prefixed UTF-8 string
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Emit a length-prefixed byte blob
    pub fn emit_blob(&mut self, value: &[u8]) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value);
    }

    // ===== Instruction Emission =====

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit ICONST with value
    pub fn emit_iconst(&mut self, value: i32) {
        self.emit_opcode(Opcode::Iconst);
        self.emit_i32(value);
    }

    /// Emit an instruction addressing a local slot
    pub fn emit_local(&mut self, opcode: Opcode, slot: u16) {
        self.emit_opcode(opcode);
        self.emit_u16(slot);
    }

    /// Emit an instruction with a symbol-table operand
    pub fn emit_symbol(&mut self, opcode: Opcode, index: u16) {
        self.emit_opcode(opcode);
        self.emit_u16(index);
    }

    /// Emit MULTIANEWARRAY
    pub fn emit_multi_new_array(&mut self, class_index: u16, dimensions: u8) {
        self.emit_opcode(Opcode::MultiANewArray);
        self.emit_u16(class_index);
        self.emit_u8(dimensions);
    }

    /// Emit a branch; returns the operand offset
    pub fn emit_branch(&mut self, opcode: Opcode, offset: i32) -> usize {
        self.emit_opcode(opcode);
        let at = self.offset();
        self.emit_i32(offset);
        at
    }

    // ===== Patching =====

    /// Patch a previously emitted u32 value at the given offset
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytecode reader for decoding instructions and unit sections
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new bytecode reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.position + N;
        let bytes = self
            .buffer
            .get(self.position..end)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.position = end;
        Ok(out)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    /// Read a 64-bit float (little-endian)
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    /// Read a fixed number of bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        let end = self.position + len;
        let bytes = self
            .buffer
            .get(self.position..end)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        self.position = end;
        Ok(bytes.to_vec())
    }

    /// Read a length-prefixed byte blob
    pub fn read_blob(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// Read a length-prefixed string (u32 length + UTF-8 bytes)
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let start = self.position;
        let bytes = self.read_blob()?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))
    }
}
