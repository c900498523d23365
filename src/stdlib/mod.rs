//! The standard-library modules, written in gscript and embedded in the
//! binary. They compile as stdlib units, so their code uses the
//! `LOAD_STD_*` opcodes and never collides with user proto numbers.

use crate::ast::ImportSource;
use crate::error::CompileError;
use crate::lexer::Scanner;
use crate::parser::Parser;
use crate::span::Span;
use crate::vm::compiler::{Compiler, ImportBinding, UnitId};
use crate::vm::proto::Proto;

/// Library name and source, in unit order.
const LIBRARIES: [(&str, &str); 3] = [
    ("Buffer", include_str!("Buffer.gs")),
    ("fs", include_str!("fs.gs")),
    ("os", include_str!("os.gs")),
];

/// Unit number of the library imported as `import name`.
pub fn index_of(name: &str) -> Option<u32> {
    LIBRARIES
        .iter()
        .position(|(lib, _)| *lib == name)
        .map(|i| i as u32)
}

pub fn name(idx: u32) -> Option<&'static str> {
    LIBRARIES.get(idx as usize).map(|(lib, _)| *lib)
}

/// Path recorded in a library's proto and in its error messages.
fn file_name(lib: &str) -> String {
    format!("<std>/{}.gs", lib)
}

/// Compile every library, indexed by unit number.
pub fn compile_all() -> Result<Vec<Proto>, CompileError> {
    LIBRARIES
        .iter()
        .enumerate()
        .map(|(i, (lib, source))| compile_library(i as u32, lib, source))
        .collect()
}

fn compile_library(idx: u32, lib: &str, source: &str) -> Result<Proto, CompileError> {
    let file = file_name(lib);
    let tokens = Scanner::new(source)
        .scan_tokens()
        .map_err(|err| CompileError::syntax(&file, err))?;
    let program = Parser::new(tokens)
        .parse()
        .map_err(|err| CompileError::syntax(&file, err))?;

    let imports = program
        .imports
        .iter()
        .map(|import| match &import.source {
            ImportSource::Stdlib(name) => index_of(name)
                .map(|n| ImportBinding {
                    unit: UnitId::Stdlib(n),
                    alias: import.alias.clone(),
                    span: import.span,
                })
                .ok_or_else(|| unknown(name, &file, import.span)),
            ImportSource::File(path) => Err(CompileError::new(
                format!("std library can not import file '{}'", path),
                &file,
                import.span,
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Compiler::compile(&program, &imports, UnitId::Stdlib(idx), &file)
}

/// The error for `import name` when no library is called `name`.
pub fn unknown(name: &str, file: &str, span: Span) -> CompileError {
    CompileError::new(format!("invalid std library: {}", name), file, span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_library_numbers_are_fixed() {
        assert_eq!(index_of("Buffer"), Some(0));
        assert_eq!(index_of("fs"), Some(1));
        assert_eq!(index_of("os"), Some(2));
        assert_eq!(index_of("net"), None);
        assert_eq!(name(1), Some("fs"));
    }

    #[test]
    fn test_every_library_compiles() {
        let protos = compile_all().unwrap();
        assert_eq!(protos.len(), 3);
        assert_eq!(protos[1].file_path, "<std>/fs.gs");
        assert!(protos.iter().all(|p| !p.funcs.is_empty()));
    }
}
