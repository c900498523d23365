//! Instruction buffers: emitting and backpatching while compiling, and
//! bounds-checked operand reads while executing.

use crate::error::RuntimeError;

use super::opcode::Opcode;

/// A growable instruction stream for one function body.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
}

impl Chunk {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Current offset (where the next instruction starts).
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Emit an opcode without operands and return its offset.
    pub fn emit(&mut self, op: Opcode) -> usize {
        let offset = self.code.len();
        self.code.push(op as u8);
        offset
    }

    /// Emit an opcode with one u32 operand. Returns the operand's offset
    /// so it can be patched later.
    pub fn emit_u32(&mut self, op: Opcode, operand: u32) -> usize {
        self.emit(op);
        let at = self.code.len();
        self.code.extend_from_slice(&operand.to_le_bytes());
        at
    }

    pub fn emit_u32_pair(&mut self, op: Opcode, first: u32, second: u32) {
        self.emit(op);
        self.code.extend_from_slice(&first.to_le_bytes());
        self.code.extend_from_slice(&second.to_le_bytes());
    }

    pub fn emit_call(&mut self, want: u8, argc: u8) {
        self.emit(Opcode::Call);
        self.code.push(want);
        self.code.push(argc);
    }

    /// Emit a relative jump with a placeholder displacement and return the
    /// placeholder's offset.
    pub fn emit_jump(&mut self, op: Opcode) -> usize {
        self.emit_u32(op, 0)
    }

    /// Emit a relative jump to an already-known target.
    pub fn emit_jump_to(&mut self, op: Opcode, target: usize) {
        let at = self.emit_jump(op);
        self.patch_jump_to(at, target);
    }

    /// Point the jump placeholder at `at` to the current end of the stream.
    pub fn patch_jump(&mut self, at: usize) {
        self.patch_jump_to(at, self.code.len());
    }

    /// Point the jump placeholder at `at` to `target`. The displacement is
    /// measured from the end of the operand, wrapping in 32 bits.
    pub fn patch_jump_to(&mut self, at: usize, target: usize) {
        let displacement = (target as i64 - (at as i64 + 4)) as i32 as u32;
        self.patch_u32(at, displacement);
    }

    /// Overwrite a u32 operand in place.
    pub fn patch_u32(&mut self, at: usize, value: u32) {
        self.code[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Read one byte at `*pc` and advance.
pub fn read_u8(code: &[u8], pc: &mut usize) -> Result<u8, RuntimeError> {
    let byte = *code
        .get(*pc)
        .ok_or_else(|| RuntimeError::invalid_bytecode(format!("truncated at {}", *pc)))?;
    *pc += 1;
    Ok(byte)
}

/// Read a little-endian u32 at `*pc` and advance.
pub fn read_u32(code: &[u8], pc: &mut usize) -> Result<u32, RuntimeError> {
    let bytes: [u8; 4] = code
        .get(*pc..*pc + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| RuntimeError::invalid_bytecode(format!("truncated operand at {}", *pc)))?;
    *pc += 4;
    Ok(u32::from_le_bytes(bytes))
}

/// Apply a relative displacement read from an operand that ended at `pc`.
pub fn jump_target(pc: usize, displacement: u32) -> usize {
    (pc as i64 + displacement as i32 as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_jump_patch() {
        let mut chunk = Chunk::new();
        let at = chunk.emit_jump(Opcode::JumpRel);
        chunk.emit(Opcode::PopTop);
        chunk.patch_jump(at);

        let mut pc = 1;
        let disp = read_u32(&chunk.code, &mut pc).unwrap();
        assert_eq!(jump_target(pc, disp), chunk.len());
    }

    #[test]
    fn test_backward_jump() {
        let mut chunk = Chunk::new();
        chunk.emit(Opcode::LoadNil);
        chunk.emit_jump_to(Opcode::JumpRel, 0);

        let mut pc = 2;
        let disp = read_u32(&chunk.code, &mut pc).unwrap();
        assert_eq!(jump_target(pc, disp), 0);
    }

    #[test]
    fn test_truncated_read_is_error() {
        let code = [Opcode::LoadName as u8, 1, 0];
        let mut pc = 1;
        assert!(read_u32(&code, &mut pc).is_err());
    }
}
