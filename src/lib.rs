//! gscript: a small dynamically typed scripting language compiled to bytecode
//! and executed on a stack-based VM.
//!
//! Source goes through the lexer and parser, then `vm::compiler` turns every
//! module reachable from the entry file into a proto (the `module` graph
//! numbers them and rejects import cycles). `vm::Vm` runs the protos with the
//! embedded standard library. Compiled programs can be saved in the binary
//! proto format, disassembled, or stepped through in the debugger.

// Allow some clippy lints that are stylistic and not critical
#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]

pub mod ast;
pub mod config;
pub mod error;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod span;
pub mod stdlib;
pub mod value;
pub mod vm;

use std::path::Path;

use config::Config;
use error::GscriptError;
use vm::{Proto, Vm};

/// Compile a source file and everything it imports.
pub fn compile_file(path: &Path, config: &Config) -> Result<Vec<Proto>, GscriptError> {
    Ok(module::compile_file(path, config)?)
}

/// Protos for `path`: decoded when it is a saved proto file, compiled from
/// source otherwise.
pub fn load(path: &Path, config: &Config) -> Result<Vec<Proto>, GscriptError> {
    if vm::format::is_proto_file(path) {
        tracing::debug!(path = %path.display(), "loading compiled protos");
        return Ok(vm::format::load(path)?);
    }
    compile_file(path, config)
}

/// A VM over `protos` with the standard library loaded.
pub fn new_vm(protos: Vec<Proto>, config: &Config) -> Result<Vm, GscriptError> {
    let stdlibs = stdlib::compile_all()?;
    Ok(Vm::new(protos, stdlibs, config))
}

/// Run a script or proto file. Returns the code passed to `__exit`, or 0.
pub fn run_file(path: &Path, config: &Config) -> Result<i32, GscriptError> {
    let protos = load(path, config)?;
    let mut vm = new_vm(protos, config)?;
    vm.run()?;
    Ok(vm.exit_code().unwrap_or(0))
}

/// Run in-memory source and return the lines it printed.
pub fn run_source(source: &str, config: &Config) -> Result<Vec<String>, GscriptError> {
    let protos = module::compile_source(source, "<source>", config)?;
    let mut vm = new_vm(protos, config)?;
    vm.capture_output();
    vm.run()?;
    Ok(vm.take_output())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_run_source_collects_output() {
        let lines = run_source("let a, b = 1, 2\nprint(a + b)\n", &Config::default()).unwrap();
        assert_eq!(lines, vec!["3"]);
    }

    #[test]
    fn test_saved_protos_run_like_source() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("main.gs");
        fs::write(&script, "import \"./lib\"\n__exit(lib.code)\n").unwrap();
        fs::write(dir.path().join("lib.gs"), "export {code: 7}\n").unwrap();

        let config = Config::default();
        assert_eq!(run_file(&script, &config).unwrap(), 7);

        let saved = dir.path().join("main.gsproto");
        vm::format::save(&saved, &compile_file(&script, &config).unwrap()).unwrap();
        assert!(vm::format::is_proto_file(&saved));
        assert!(!vm::format::is_proto_file(&script));
        assert_eq!(run_file(&saved, &config).unwrap(), 7);
    }

    fn printed(protos: Vec<Proto>) -> Vec<String> {
        let mut vm = new_vm(protos, &Config::default()).unwrap();
        vm.capture_output();
        vm.run().unwrap();
        vm.take_output()
    }

    #[test]
    fn test_reloaded_protos_print_the_same() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("main.gs");
        fs::write(
            &script,
            "\
import \"./lib\"
func make(step) {
  let total = 0
  return func() {
    total += step
    return total
  }
}
let next = make(lib.step)
next()
switch (next()) {
case 4:
  print(\"four\")
  fallthrough
default:
  print(\"any\")
}
try {
  throw({code: 2})
}
catch (e) {
  print(\"caught\", e.code)
}
",
        )
        .unwrap();
        fs::write(dir.path().join("lib.gs"), "export {step: 2}\n").unwrap();

        let config = Config::default();
        let protos = compile_file(&script, &config).unwrap();
        let saved = dir.path().join("main.gsproto");
        vm::format::save(&saved, &protos).unwrap();

        let fresh = printed(protos);
        assert_eq!(fresh, vec!["four", "any", "caught 2"]);
        assert_eq!(printed(load(&saved, &config).unwrap()), fresh);
    }

    #[test]
    fn test_errors_keep_their_phase() {
        let config = Config::default();
        let err = run_source("let = 1", &config).unwrap_err();
        assert!(matches!(err, GscriptError::Compile(_)));
        let err = run_source("print(1 // 0)", &config).unwrap_err();
        assert!(matches!(err, GscriptError::Runtime(_)));
    }
}
