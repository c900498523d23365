//! Bytecode disassembler for `gsc build -a` and the debugger.

use std::fmt::Write;

use crate::error::RuntimeError;
use crate::stdlib;

use super::builtins;
use super::chunk::{jump_target, read_u32, read_u8};
use super::compiler::UnitId;
use super::opcode::{OperandKind, Opcode};
use super::proto::{FunctionInfo, Proto};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    None,
    One(u32),
    Pair(u32, u32),
    Bytes(u8, u8),
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub op: Opcode,
    pub operands: Operands,
    /// Offset of the following instruction.
    pub next: usize,
}

pub fn decode(text: &[u8], offset: usize) -> Result<Instruction, RuntimeError> {
    let mut pc = offset;
    let byte = read_u8(text, &mut pc)?;
    let op = Opcode::from_byte(byte)
        .ok_or_else(|| RuntimeError::invalid_bytecode(format!("unknown opcode {}", byte)))?;
    let operands = match op.operands() {
        OperandKind::None => Operands::None,
        OperandKind::U32 => Operands::One(read_u32(text, &mut pc)?),
        OperandKind::U32Pair => {
            let first = read_u32(text, &mut pc)?;
            Operands::Pair(first, read_u32(text, &mut pc)?)
        }
        OperandKind::BytePair => {
            let want = read_u8(text, &mut pc)?;
            Operands::Bytes(want, read_u8(text, &mut pc)?)
        }
    };
    Ok(Instruction {
        offset,
        op,
        operands,
        next: pc,
    })
}

/// Looks up the display form of constant `idx` of a unit.
pub type ConstLookup<'a> = dyn Fn(UnitId, u32) -> Option<String> + 'a;

/// `0012 LOAD_CONST           0 3      ("hello")`
pub fn render(ins: &Instruction, consts: &ConstLookup) -> String {
    let mut line = format!("{:04} {:<20}", ins.offset, ins.op.name());
    match ins.operands {
        Operands::None => {}
        Operands::One(n) => {
            let _ = write!(line, " {:<10}", n);
        }
        Operands::Pair(a, b) => {
            let _ = write!(line, " {:<10}", format!("{} {}", a, b));
        }
        Operands::Bytes(want, argc) => {
            let _ = write!(line, " {:<10}", format!("{} {}", want, argc));
        }
    }
    if let Some(note) = annotation(ins, consts) {
        let _ = write!(line, " ({})", note);
    }
    line.trim_end().to_string()
}

fn annotation(ins: &Instruction, consts: &ConstLookup) -> Option<String> {
    match (ins.op, ins.operands) {
        (op, Operands::One(disp)) if op.is_relative_jump() => {
            Some(format!("to {}", jump_target(ins.next, disp)))
        }
        (Opcode::JumpAbs, Operands::One(addr)) => Some(format!("to {}", addr)),
        (Opcode::LoadConst, Operands::Pair(unit, idx)) => consts(UnitId::User(unit), idx),
        (Opcode::LoadStdConst, Operands::Pair(unit, idx)) => consts(UnitId::Stdlib(unit), idx),
        (Opcode::LoadBuiltin, Operands::One(idx)) => Some(builtins::name(idx).to_string()),
        (Opcode::LoadStdlib, Operands::One(idx)) => stdlib::name(idx).map(str::to_string),
        (Opcode::Call, Operands::Bytes(want, argc)) => {
            Some(format!("want {}, args {}", want, argc))
        }
        _ => None,
    }
}

/// Decode `text` from `start`, at most `count` instructions.
pub fn listing(text: &[u8], start: usize, count: usize, consts: &ConstLookup) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pc = start;
    while pc < text.len() && lines.len() < count {
        match decode(text, pc) {
            Ok(ins) => {
                lines.push(render(&ins, consts));
                pc = ins.next;
            }
            Err(err) => {
                lines.push(format!("{:04} <{}>", pc, err));
                break;
            }
        }
    }
    lines
}

fn function_header(info: &FunctionInfo) -> String {
    let params: Vec<String> = info
        .params
        .iter()
        .map(|p| format!("{}={}", p.name, p.default))
        .collect();
    format!(
        "params=[{}]{}",
        params.join(", "),
        if info.variadic { " variadic" } else { "" }
    )
}

/// Full listing of every module: main text, then named functions, then
/// anonymous functions.
pub fn disassemble(protos: &[Proto]) -> String {
    let consts = |unit: UnitId, idx: u32| match unit {
        UnitId::User(n) => protos
            .get(n as usize)
            .and_then(|p| p.consts.get(idx as usize))
            .map(ToString::to_string),
        UnitId::Stdlib(_) => None,
    };

    let mut out = String::new();
    for (i, proto) in protos.iter().enumerate() {
        let _ = writeln!(out, "== module {}: {} ==", i, proto.file_path);
        if !proto.consts.is_empty() {
            let _ = writeln!(out, "-- constants --");
            for (idx, constant) in proto.consts.iter().enumerate() {
                let _ = writeln!(out, "{:4} {}", idx, constant);
            }
        }
        let _ = writeln!(out, "-- main --");
        for line in listing(&proto.text, 0, usize::MAX, &consts) {
            let _ = writeln!(out, "{}", line);
        }
        for (idx, func) in proto.funcs.iter().enumerate() {
            let _ = writeln!(
                out,
                "-- func {} {} ({}, upvalues={:?}) --",
                idx,
                func.name,
                function_header(&func.info),
                func.upvalues
            );
            for line in listing(&func.info.text, 0, usize::MAX, &consts) {
                let _ = writeln!(out, "{}", line);
            }
        }
        for (idx, func) in proto.anonymous_funcs.iter().enumerate() {
            let upvalues: Vec<String> = func
                .upvalues
                .iter()
                .map(|uv| format!("{}{}", if uv.direct { "d" } else { "u" }, uv.index))
                .collect();
            let _ = writeln!(
                out,
                "-- anonymous {} ({}, upvalues=[{}]) --",
                idx,
                function_header(&func.info),
                upvalues.join(", ")
            );
            for line in listing(&func.info.text, 0, usize::MAX, &consts) {
                let _ = writeln!(out, "{}", line);
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::module::compile_source;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_each_operand_kind() {
        let mut text = vec![Opcode::LoadConst as u8];
        text.extend(0u32.to_le_bytes());
        text.extend(2u32.to_le_bytes());
        text.extend([Opcode::Call as u8, 1, 3, Opcode::PopTop as u8]);

        let first = decode(&text, 0).unwrap();
        assert_eq!(first.operands, Operands::Pair(0, 2));
        assert_eq!(first.next, 9);
        let call = decode(&text, first.next).unwrap();
        assert_eq!(call.operands, Operands::Bytes(1, 3));
        assert_eq!(decode(&text, call.next).unwrap().op, Opcode::PopTop);
    }

    #[test]
    fn test_truncated_text_is_reported() {
        let text = [Opcode::LoadName as u8, 0];
        let lines = listing(&text, 0, 10, &|_, _| None);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("0000 <"));
    }

    #[test]
    fn test_listing_resolves_constants_and_jumps() {
        let source = "let x = \"hi\"\nif (x) { print(x) }\nfunc f(a, b = 2) { return a + b }\n";
        let protos = compile_source(source, "main.gs", &Config::default()).unwrap();
        let text = disassemble(&protos);

        assert!(text.contains("== module 0: main.gs =="));
        assert!(text.contains("(\"hi\")"));
        assert!(text.contains("JUMP_IF"));
        assert!(text.contains("(to "));
        assert!(text.contains("(print)"));
        assert!(text.contains("-- func 0 f (params=[a=nil, b=2], upvalues=[]) --"));
    }
}
