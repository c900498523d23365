//! Interactive instruction stepper behind `gsc debug`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use colored::Colorize;

use super::compiler::UnitId;
use super::disassembler::{decode, listing, render};
use super::vm::{CallFrame, ModuleContext, Vm};

const HISTORY_FILE: &str = ".gsc_debug_history";
const HISTORY_LIMIT: usize = 500;
const DEFAULT_CODE_COUNT: usize = 10;

const HELP: &str = "\
commands:
  help                 show this message
  n, next              execute one instruction
  r                    run to completion
  v, var               symbol table of the current frame
  s, stack             value stack of the current module
  upvalue              upvalues of the current frame
  c, code [start] [n]  disassemble the current frame
  const <module>       constant pool of a user module
  f [idx]              named functions of the current module
  ff <idx>             anonymous function of the current module
  q, quit              leave the debugger";

/// Whether the command loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Debugger {
    vm: Vm,
    history: Vec<String>,
    history_file: PathBuf,
    /// Set once a fatal error ends the program.
    failure: Option<String>,
}

impl Debugger {
    pub fn new(vm: Vm) -> Self {
        Self::with_history_file(vm, history_path())
    }

    pub fn with_history_file(vm: Vm, history_file: PathBuf) -> Self {
        let mut debugger = Self {
            vm,
            history: Vec::new(),
            history_file,
            failure: None,
        };
        debugger.load_history();
        debugger
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    fn load_history(&mut self) {
        if let Ok(content) = std::fs::read_to_string(&self.history_file) {
            self.history = content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    fn save_history(&self) {
        let skip = self.history.len().saturating_sub(HISTORY_LIMIT);
        let mut content = self.history[skip..].join("\n");
        content.push('\n');
        if let Err(err) = std::fs::write(&self.history_file, content) {
            tracing::debug!(path = %self.history_file.display(), %err, "history not saved");
        }
    }

    /// Read commands from stdin until `quit` or end of input.
    pub fn run(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        writeln!(stdout, "gscript debugger, type 'help' for commands")?;

        let mut lines = stdin.lock().lines();
        loop {
            write!(stdout, "{} ", "(gsc)".cyan())?;
            stdout.flush()?;
            let Some(line) = lines.next().transpose()? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.history.push(line.to_string());
            if self.execute(line, &mut stdout)? == Flow::Quit {
                break;
            }
        }
        self.save_history();
        Ok(())
    }

    pub fn execute(&mut self, line: &str, out: &mut impl Write) -> io::Result<Flow> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Flow::Continue);
        };
        let args: Vec<&str> = words.collect();

        match command {
            "help" | "h" => writeln!(out, "{}", HELP)?,
            "n" | "next" => self.next(out)?,
            "r" | "run" => self.run_to_end(out)?,
            "v" | "var" => self.show_symbols(out)?,
            "s" | "stack" => self.show_stack(out)?,
            "upvalue" => self.show_upvalues(out)?,
            "c" | "code" => self.show_code(&args, out)?,
            "const" => self.show_constants(&args, out)?,
            "f" => self.show_functions(&args, out)?,
            "ff" => self.show_anonymous(&args, out)?,
            "q" | "quit" => return Ok(Flow::Quit),
            other => writeln!(
                out,
                "{}",
                format!("unknown command '{}', try 'help'", other).red()
            )?,
        }
        Ok(Flow::Continue)
    }

    fn finished(&self, out: &mut impl Write) -> io::Result<bool> {
        if let Some(failure) = &self.failure {
            writeln!(out, "{}", failure.red())?;
            return Ok(true);
        }
        if self.vm.is_stopped() {
            writeln!(out, "{}", "program finished".yellow())?;
            return Ok(true);
        }
        Ok(false)
    }

    fn next(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.finished(out)? {
            return Ok(());
        }
        if let Some(line) = self.current_instruction() {
            writeln!(out, "{}", line.green())?;
        }
        if let Err(err) = self.vm.step() {
            self.failure = Some(err.to_string());
        }
        self.flush_output(out)?;
        if let Some(failure) = &self.failure {
            writeln!(out, "{}", failure.red())?;
        }
        Ok(())
    }

    fn run_to_end(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.finished(out)? {
            return Ok(());
        }
        let result = self.vm.run();
        self.flush_output(out)?;
        match result {
            Ok(()) => writeln!(out, "{}", "program finished".yellow()),
            Err(err) => {
                let message = err.to_string();
                writeln!(out, "{}", message.red())?;
                self.failure = Some(message);
                Ok(())
            }
        }
    }

    /// Forward whatever the program printed, when output is captured.
    fn flush_output(&mut self, out: &mut impl Write) -> io::Result<()> {
        for line in self.vm.take_output() {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    fn context(&self) -> Option<&ModuleContext> {
        self.vm.contexts().last()
    }

    fn frame(&self) -> Option<&CallFrame> {
        self.context().and_then(|ctx| ctx.frames.last())
    }

    fn const_text(&self, unit: UnitId, idx: u32) -> Option<String> {
        self.vm
            .proto(unit)
            .and_then(|p| p.consts.get(idx as usize))
            .map(ToString::to_string)
    }

    fn current_instruction(&self) -> Option<String> {
        let frame = self.frame()?;
        let ins = decode(&frame.text, frame.pc).ok()?;
        Some(render(&ins, &|unit, idx| self.const_text(unit, idx)))
    }

    fn show_symbols(&self, out: &mut impl Write) -> io::Result<()> {
        let Some(frame) = self.frame() else {
            return writeln!(out, "no active frame");
        };
        if frame.symbols.is_empty() {
            return writeln!(out, "(empty)");
        }
        for (slot, cell) in frame.symbols.iter().enumerate() {
            writeln!(out, "{:4}: {}", slot, cell.borrow())?;
        }
        Ok(())
    }

    fn show_upvalues(&self, out: &mut impl Write) -> io::Result<()> {
        let Some(frame) = self.frame() else {
            return writeln!(out, "no active frame");
        };
        if frame.upvalues.is_empty() {
            return writeln!(out, "(empty)");
        }
        for (idx, cell) in frame.upvalues.iter().enumerate() {
            writeln!(out, "{:4}: {}", idx, cell.borrow())?;
        }
        Ok(())
    }

    fn show_stack(&self, out: &mut impl Write) -> io::Result<()> {
        let Some(ctx) = self.context() else {
            return writeln!(out, "no module is executing");
        };
        if ctx.stack.is_empty() {
            return writeln!(out, "(empty)");
        }
        for (i, value) in ctx.stack.iter().enumerate().rev() {
            writeln!(out, "{:4}: {}", i, value)?;
        }
        Ok(())
    }

    /// `code [start] [count]`, starting at the current pc by default.
    fn show_code(&self, args: &[&str], out: &mut impl Write) -> io::Result<()> {
        let Some(frame) = self.frame() else {
            return writeln!(out, "no active frame");
        };
        let Some(start) = parse_arg(args.first(), frame.pc, out)? else {
            return Ok(());
        };
        let Some(count) = parse_arg(args.get(1), DEFAULT_CODE_COUNT, out)? else {
            return Ok(());
        };
        let consts = |unit, idx| self.const_text(unit, idx);
        for line in listing(&frame.text, start, count, &consts) {
            let marker = if line.starts_with(&format!("{:04} ", frame.pc)) {
                "=>"
            } else {
                "  "
            };
            writeln!(out, "{} {}", marker.green(), line)?;
        }
        Ok(())
    }

    fn show_constants(&self, args: &[&str], out: &mut impl Write) -> io::Result<()> {
        let Some(module) = parse_arg(args.first(), usize::MAX, out)? else {
            return Ok(());
        };
        let Some(proto) = self.vm.protos().get(module) else {
            return writeln!(out, "{}", "usage: const <module>".red());
        };
        for (idx, constant) in proto.consts.iter().enumerate() {
            writeln!(out, "{:4}: {}", idx, constant)?;
        }
        Ok(())
    }

    fn current_unit(&self) -> Option<UnitId> {
        self.context().map(|ctx| ctx.unit)
    }

    fn show_functions(&self, args: &[&str], out: &mut impl Write) -> io::Result<()> {
        let Some(proto) = self.current_unit().and_then(|unit| self.vm.proto(unit)) else {
            return writeln!(out, "no module is executing");
        };
        if args.is_empty() {
            for (idx, func) in proto.funcs.iter().enumerate() {
                writeln!(out, "{:4}: {}", idx, func.name)?;
            }
            return Ok(());
        }
        let Some(idx) = parse_arg(args.first(), 0, out)? else {
            return Ok(());
        };
        let Some(func) = proto.funcs.get(idx) else {
            return writeln!(out, "{}", format!("no function {}", idx).red());
        };
        writeln!(out, "{}", format!("func {}", func.name).cyan())?;
        let consts = |unit, idx| self.const_text(unit, idx);
        for line in listing(&func.info.text, 0, usize::MAX, &consts) {
            writeln!(out, "   {}", line)?;
        }
        Ok(())
    }

    fn show_anonymous(&self, args: &[&str], out: &mut impl Write) -> io::Result<()> {
        let Some(proto) = self.current_unit().and_then(|unit| self.vm.proto(unit)) else {
            return writeln!(out, "no module is executing");
        };
        let Some(idx) = parse_arg(args.first(), usize::MAX, out)? else {
            return Ok(());
        };
        let Some(func) = proto.anonymous_funcs.get(idx) else {
            return writeln!(out, "{}", "usage: ff <idx>".red());
        };
        let consts = |unit, idx| self.const_text(unit, idx);
        for line in listing(&func.info.text, 0, usize::MAX, &consts) {
            writeln!(out, "   {}", line)?;
        }
        Ok(())
    }
}

/// Parse an optional numeric argument. Prints an error and yields `None`
/// when it is not a number.
fn parse_arg(arg: Option<&&str>, default: usize, out: &mut impl Write) -> io::Result<Option<usize>> {
    match arg {
        None => Ok(Some(default)),
        Some(text) => match text.parse() {
            Ok(n) => Ok(Some(n)),
            Err(_) => {
                writeln!(out, "{}", format!("'{}' is not a number", text).red())?;
                Ok(None)
            }
        },
    }
}

fn history_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(HISTORY_FILE),
        None => PathBuf::from(HISTORY_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::module::compile_source;
    use crate::stdlib;
    use tempfile::tempdir;

    fn debugger(source: &str, history: PathBuf) -> Debugger {
        let protos = compile_source(source, "main.gs", &Config::default()).unwrap();
        let mut vm = Vm::new(protos, stdlib::compile_all().unwrap(), &Config::default());
        vm.capture_output();
        Debugger::with_history_file(vm, history)
    }

    fn exec(debugger: &mut Debugger, line: &str) -> String {
        let mut out = Vec::new();
        debugger.execute(line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_step_and_inspect() {
        colored::control::set_override(false);
        let dir = tempdir().unwrap();
        let mut dbg = debugger("let a = 40\nlet b = a + 2\nprint(b)\n", dir.path().join("h"));

        // Both top-level names get their slots first.
        assert!(exec(&mut dbg, "n").contains("PUSH_NAME_NIL"));
        exec(&mut dbg, "n");
        let first = exec(&mut dbg, "n");
        assert!(first.contains("LOAD_CONST"));
        assert!(exec(&mut dbg, "s").contains("40"));
        exec(&mut dbg, "n");
        assert!(exec(&mut dbg, "v").contains("0: 40"));

        let code = exec(&mut dbg, "c 0 3");
        assert_eq!(code.lines().count(), 3);
        assert!(exec(&mut dbg, "const 0").contains("0: 40"));

        let rest = exec(&mut dbg, "r");
        assert!(rest.contains("42"));
        assert!(rest.contains("program finished"));
        assert!(exec(&mut dbg, "n").contains("program finished"));
    }

    #[test]
    fn test_function_listings() {
        colored::control::set_override(false);
        let dir = tempdir().unwrap();
        let mut dbg = debugger(
            "func add(a, b) { return a + b }\nlet f = func() { return 1 }\n",
            dir.path().join("h"),
        );
        assert!(exec(&mut dbg, "f").contains("0: add"));
        assert!(exec(&mut dbg, "f 0").contains("BINARY_ADD"));
        assert!(exec(&mut dbg, "ff 0").contains("RETURN"));
        assert!(exec(&mut dbg, "ff x").contains("is not a number"));
    }

    #[test]
    fn test_quit_and_unknown_commands() {
        let dir = tempdir().unwrap();
        let mut dbg = debugger("print(1)\n", dir.path().join("h"));
        let mut out = Vec::new();
        assert_eq!(dbg.execute("quit", &mut out).unwrap(), Flow::Quit);
        assert!(exec(&mut dbg, "bogus").contains("unknown command"));
    }

    #[test]
    fn test_history_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history");
        std::fs::write(&path, "n\n\nv\n").unwrap();
        let mut dbg = debugger("print(1)\n", path.clone());
        assert_eq!(dbg.history, vec!["n".to_string(), "v".to_string()]);
        dbg.history.push("r".to_string());
        dbg.save_history();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "n\nv\nr\n");
    }
}
