//! gsc: run, debug and build gscript programs.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use colored::Colorize;
use tracing_subscriber::EnvFilter;

use gscript::config::Config;
use gscript::error::GscriptError;
use gscript::vm::{disassemble, format, Debugger};

const VERSION: &str = "0.1";

/// CLI command to execute.
enum Command {
    /// Compile (or load) and execute a file
    Run { file: PathBuf },
    /// Step through a file interactively
    Debug { file: PathBuf },
    /// Write the binary format or a disassembly listing
    Build {
        file: PathBuf,
        output: Option<PathBuf>,
        asm: bool,
    },
    Version,
}

fn print_usage() {
    eprintln!("gsc {} - gscript compiler and VM", VERSION);
    eprintln!();
    eprintln!("Usage: gsc run <file>");
    eprintln!("       gsc debug <file>");
    eprintln!("       gsc build [-o out] [-a] <file>");
    eprintln!("       gsc version");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run <file>     Run a source file or a compiled .gsproto file");
    eprintln!("  debug <file>   Step through a program in the interactive debugger");
    eprintln!("  build <file>   Compile to the binary proto format");
    eprintln!("  version        Print the version");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o <out>       Output path for build (default: <file>.gsproto or <file>.gsasm)");
    eprintln!("  -a             Write a disassembly listing instead of the binary format");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  GSC_LOG              Log filter (default: warn)");
    eprintln!("  GSC_MAX_SOURCE_SIZE  Largest accepted source file in bytes");
    eprintln!("  GSC_MAX_CALL_DEPTH   Deepest call stack before a fatal error");
    eprintln!("  GSC_MAX_BUFFER_SIZE  Largest buffer a script may allocate in bytes");
}

fn usage_error(message: &str) -> ! {
    eprintln!("{}", message.red());
    print_usage();
    process::exit(64);
}

fn parse_args(args: &[String]) -> Command {
    let Some((command, rest)) = args.split_first() else {
        usage_error("missing command");
    };
    match command.as_str() {
        "run" | "debug" => {
            let [file] = rest else {
                usage_error(&format!("{} command requires exactly one file", command));
            };
            let file = PathBuf::from(file);
            if command == "run" {
                Command::Run { file }
            } else {
                Command::Debug { file }
            }
        }
        "build" => parse_build(rest),
        "version" | "--version" | "-v" => Command::Version,
        "help" | "--help" | "-h" => {
            print_usage();
            process::exit(0);
        }
        other => usage_error(&format!("unknown command: {}", other)),
    }
}

fn parse_build(args: &[String]) -> Command {
    let mut output = None;
    let mut asm = false;
    let mut file = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-o" => {
                i += 1;
                let Some(out) = args.get(i) else {
                    usage_error("-o requires an output path");
                };
                output = Some(PathBuf::from(out));
            }
            "-a" => asm = true,
            arg if arg.starts_with('-') => {
                usage_error(&format!("unknown option for build command: {}", arg))
            }
            arg => {
                if file.is_some() {
                    usage_error(&format!("unexpected argument: {}", arg));
                }
                file = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }
    let Some(file) = file else {
        usage_error("build command requires a file");
    };
    Command::Build { file, output, asm }
}

fn install_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn fail(err: GscriptError) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err.to_string().red());
    process::exit(1);
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = parse_args(&args);
    let config = Config::from_env();
    install_tracing(&config);

    let result = match command {
        Command::Run { file } => run(&file, &config),
        Command::Debug { file } => debug(&file, &config),
        Command::Build { file, output, asm } => build(&file, output, asm, &config),
        Command::Version => {
            println!("{}", VERSION);
            Ok(0)
        }
    };

    match result {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(err) => fail(err),
    }
}

fn run(file: &Path, config: &Config) -> Result<i32, GscriptError> {
    gscript::run_file(file, config)
}

fn debug(file: &Path, config: &Config) -> Result<i32, GscriptError> {
    let protos = gscript::load(file, config)?;
    let vm = gscript::new_vm(protos, config)?;
    let mut debugger = Debugger::new(vm);
    debugger.run()?;
    Ok(debugger.vm().exit_code().unwrap_or(0))
}

fn build(
    file: &Path,
    output: Option<PathBuf>,
    asm: bool,
    config: &Config,
) -> Result<i32, GscriptError> {
    let protos = gscript::compile_file(file, config)?;
    let extension = if asm { "gsasm" } else { "gsproto" };
    let output = output.unwrap_or_else(|| file.with_extension(extension));
    if asm {
        fs::write(&output, disassemble(&protos))?;
    } else {
        format::save(&output, &protos)?;
    }
    tracing::debug!(output = %output.display(), modules = protos.len(), "build finished");
    Ok(0)
}
