//! Bytecode instruction set.
//!
//! An instruction is one opcode byte followed by its operands. Operand
//! layouts are described by [`OperandKind`]; every multi-byte operand is a
//! little-endian `u32`.

/// Operand layout following an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    /// One u32: slot, count, constant index or jump displacement.
    U32,
    /// Two u32s: (module, index).
    U32Pair,
    /// Two raw bytes: (want_returns, arg_count).
    BytePair,
}

impl OperandKind {
    /// Number of operand bytes after the opcode.
    pub fn width(self) -> usize {
        match self {
            OperandKind::None => 0,
            OperandKind::U32 => 4,
            OperandKind::U32Pair => 8,
            OperandKind::BytePair => 2,
        }
    }
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $byte:literal, $text:literal, $kind:ident; )*) => {
        /// Opcodes, numbered by their byte value.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $byte, )*
        }

        impl Opcode {
            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $( $byte => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Mnemonic used by the disassembler and debugger.
            pub fn name(self) -> &'static str {
                match self {
                    $( Opcode::$name => $text, )*
                }
            }

            pub fn operands(self) -> OperandKind {
                match self {
                    $( Opcode::$name => OperandKind::$kind, )*
                }
            }
        }
    };
}

opcodes! {
    /// `~a`
    UnaryNot = 0, "UNARY_NOT", None;
    /// `-a`
    UnaryNeg = 1, "UNARY_NEG", None;
    /// `!a`
    UnaryLnot = 2, "UNARY_LNOT", None;
    BinaryAdd = 3, "BINARY_ADD", None;
    BinarySub = 4, "BINARY_SUB", None;
    BinaryMul = 5, "BINARY_MUL", None;
    BinaryDiv = 6, "BINARY_DIV", None;
    BinaryMod = 7, "BINARY_MOD", None;
    BinaryAnd = 8, "BINARY_AND", None;
    BinaryXor = 9, "BINARY_XOR", None;
    BinaryOr = 10, "BINARY_OR", None;
    BinaryIdiv = 11, "BINARY_IDIV", None;
    BinaryShr = 12, "BINARY_SHR", None;
    BinaryShl = 13, "BINARY_SHL", None;
    BinaryLe = 14, "BINARY_LE", None;
    BinaryGe = 15, "BINARY_GE", None;
    BinaryLt = 16, "BINARY_LT", None;
    BinaryGt = 17, "BINARY_GT", None;
    BinaryEq = 18, "BINARY_EQ", None;
    BinaryNe = 19, "BINARY_NE", None;
    BinaryLand = 20, "BINARY_LAND", None;
    BinaryLor = 21, "BINARY_LOR", None;
    /// Pop key, pop object, push `object[key]`.
    BinaryAttr = 22, "BINARY_ATTR", None;
    LoadNil = 23, "LOAD_NIL", None;
    LoadConst = 24, "LOAD_CONST", U32Pair;
    LoadStdConst = 25, "LOAD_STD_CONST", U32Pair;
    LoadName = 26, "LOAD_NAME", U32;
    /// Closure over a named function, upvalues from its module's top frame.
    LoadFunc = 27, "LOAD_FUNC", U32Pair;
    LoadStdFunc = 28, "LOAD_STD_FUNC", U32Pair;
    LoadBuiltin = 29, "LOAD_BUILTIN", U32;
    /// Closure over an anonymous function, upvalues from the current frame.
    LoadAnonymous = 30, "LOAD_ANONYMOUS", U32Pair;
    LoadStdAnonymous = 31, "LOAD_STD_ANONYMOUS", U32Pair;
    LoadUpvalue = 32, "LOAD_UPVALUE", U32;
    /// Enter an imported user module.
    LoadProto = 33, "LOAD_PROTO", U32;
    /// Enter a standard-library module.
    LoadStdlib = 34, "LOAD_STDLIB", U32;
    StoreName = 35, "STORE_NAME", U32;
    StoreUpvalue = 36, "STORE_UPVALUE", U32;
    /// Pop value, pop key, store into the object held by the last symbol.
    StoreKv = 37, "STORE_KV", None;
    PushNameNil = 38, "PUSH_NAME_NIL", None;
    /// Pop into a new symbol slot.
    PushName = 39, "PUSH_NAME", None;
    /// Copy the top into a new symbol slot without popping.
    CopyName = 40, "COPY_NAME", None;
    ResizeNametable = 41, "RESIZE_NAMETABLE", U32;
    PopTop = 42, "POP_TOP", None;
    Dup = 43, "DUP", None;
    Stop = 44, "STOP", None;
    SliceNew = 45, "SLICE_NEW", U32;
    NewMap = 46, "NEW_MAP", U32;
    NewEmptyMap = 47, "NEW_EMPTY_MAP", None;
    /// Pop object, pop key, pop value; `object[key] = value`.
    AttrAssign = 48, "ATTR_ASSIGN", None;
    AttrAssignAddeq = 49, "ATTR_ASSIGN_ADDEQ", None;
    AttrAssignSubeq = 50, "ATTR_ASSIGN_SUBEQ", None;
    AttrAssignMuleq = 51, "ATTR_ASSIGN_MULEQ", None;
    AttrAssignDiveq = 52, "ATTR_ASSIGN_DIVEQ", None;
    AttrAssignModeq = 53, "ATTR_ASSIGN_MODEQ", None;
    AttrAssignAndeq = 54, "ATTR_ASSIGN_ANDEQ", None;
    AttrAssignXoreq = 55, "ATTR_ASSIGN_XOREQ", None;
    AttrAssignOreq = 56, "ATTR_ASSIGN_OREQ", None;
    /// Pop object, replace the key below it with `object[key]`.
    AttrAccess = 57, "ATTR_ACCESS", None;
    JumpRel = 58, "JUMP_REL", U32;
    JumpAbs = 59, "JUMP_ABS", U32;
    /// Pop; jump when truthy.
    JumpIf = 60, "JUMP_IF", U32;
    /// Falsy top: keep it and jump. Otherwise pop.
    JumpLand = 61, "JUMP_LAND", U32;
    /// Truthy top: keep it and jump. Otherwise pop.
    JumpLor = 62, "JUMP_LOR", U32;
    /// Pop the case value; jump if it equals the switch value below.
    JumpCase = 63, "JUMP_CASE", U32;
    Call = 64, "CALL", BytePair;
    Return = 65, "RETURN", U32;
    RotTwo = 66, "ROT_TWO", None;
    Export = 67, "EXPORT", None;
    Try = 68, "TRY", U32;
    EndTry = 69, "END_TRY", None;
}

impl Opcode {
    /// Whether the single u32 operand is a relative jump displacement.
    pub fn is_relative_jump(self) -> bool {
        matches!(
            self,
            Opcode::JumpRel
                | Opcode::JumpIf
                | Opcode::JumpLand
                | Opcode::JumpLor
                | Opcode::JumpCase
                | Opcode::Try
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_byte_round_trips() {
        let mut count = 0;
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_byte(byte) {
                assert_eq!(op as u8, byte);
                count += 1;
            }
        }
        assert_eq!(count, 70);
    }

    #[test]
    fn test_operand_widths() {
        assert_eq!(Opcode::Call.operands().width(), 2);
        assert_eq!(Opcode::LoadConst.operands().width(), 8);
        assert_eq!(Opcode::JumpIf.operands().width(), 4);
        assert_eq!(Opcode::PopTop.operands().width(), 0);
    }
}
