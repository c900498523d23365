//! The import graph: every reachable file compiled to one proto.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ast::ImportSource;
use crate::config::Config;
use crate::error::CompileError;
use crate::lexer::Scanner;
use crate::parser::Parser;
use crate::stdlib;
use crate::vm::compiler::{Compiler, ImportBinding, UnitId};
use crate::vm::proto::Proto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

#[derive(Debug)]
struct Node {
    path: PathBuf,
    imports: Vec<u32>,
    proto: Option<Proto>,
}

impl Node {
    fn display(&self) -> String {
        self.path.display().to_string()
    }
}

/// User modules keyed by absolute path. A node's index is its proto number.
pub struct ModuleGraph<'a> {
    config: &'a Config,
    nodes: Vec<Node>,
    by_path: HashMap<PathBuf, u32>,
}

impl<'a> ModuleGraph<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    /// Node for `path`, created on first sight.
    fn insert(&mut self, path: PathBuf) -> u32 {
        if let Some(&idx) = self.by_path.get(&path) {
            return idx;
        }
        let idx = self.nodes.len() as u32;
        self.by_path.insert(path.clone(), idx);
        self.nodes.push(Node {
            path,
            imports: Vec::new(),
            proto: None,
        });
        idx
    }

    /// Compile the entry file and everything it imports.
    pub fn compile_entry(mut self, path: &Path) -> Result<Vec<Proto>, CompileError> {
        let path = absolute(path);
        let file = path.display().to_string();
        let source = read_source(&path, self.config)?;
        let root = self.insert(path);
        self.compile_node(root, &source, &file)?;
        self.finish()
    }

    /// Compile in-memory source as the entry module. Relative imports resolve
    /// against the current directory.
    pub fn compile_text(mut self, source: &str, name: &str) -> Result<Vec<Proto>, CompileError> {
        check_size(name, source.len() as u64, self.config)?;
        let root = self.insert(absolute(Path::new(name)));
        self.compile_node(root, source, name)?;
        self.finish()
    }

    fn compile_node(&mut self, idx: u32, source: &str, file: &str) -> Result<(), CompileError> {
        let tokens = Scanner::new(source)
            .scan_tokens()
            .map_err(|err| CompileError::syntax(file, err))?;
        let program = Parser::new(tokens)
            .parse()
            .map_err(|err| CompileError::syntax(file, err))?;

        let dir = self.nodes[idx as usize]
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut bindings = Vec::with_capacity(program.imports.len());
        let mut discovered = Vec::new();
        for import in &program.imports {
            let unit = match &import.source {
                ImportSource::Stdlib(name) => UnitId::Stdlib(
                    stdlib::index_of(name)
                        .ok_or_else(|| stdlib::unknown(name, file, import.span))?,
                ),
                ImportSource::File(relative) => {
                    let target = absolute(&dir.join(format!("{}.gs", relative)));
                    tracing::trace!(from = file, to = %target.display(), "import edge");
                    let child = self.insert(target);
                    self.nodes[idx as usize].imports.push(child);
                    discovered.push(child);
                    UnitId::User(child)
                }
            };
            bindings.push(ImportBinding {
                unit,
                alias: import.alias.clone(),
                span: import.span,
            });
        }

        let proto = Compiler::compile(&program, &bindings, UnitId::User(idx), file)?;
        self.nodes[idx as usize].proto = Some(proto);

        for child in discovered {
            let node = &self.nodes[child as usize];
            if node.proto.is_some() {
                continue;
            }
            let path = node.path.clone();
            let child_file = node.display();
            let source = read_source(&path, self.config)?;
            self.compile_node(child, &source, &child_file)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<Proto>, CompileError> {
        if let Some(idx) = self.find_cycle() {
            return Err(CompileError::ImportCycle {
                file: self.nodes[idx as usize].display(),
            });
        }
        self.nodes
            .into_iter()
            .map(|node| {
                let file = node.display();
                node.proto.ok_or_else(|| {
                    CompileError::new("module was never compiled", file, Default::default())
                })
            })
            .collect()
    }

    /// Depth-first search with white/grey/black colouring. Returns a node on
    /// the first cycle found.
    fn find_cycle(&self) -> Option<u32> {
        let mut colors = vec![Color::White; self.nodes.len()];
        (0..self.nodes.len() as u32).find_map(|idx| {
            if colors[idx as usize] == Color::White {
                self.visit(idx, &mut colors)
            } else {
                None
            }
        })
    }

    fn visit(&self, idx: u32, colors: &mut [Color]) -> Option<u32> {
        colors[idx as usize] = Color::Grey;
        for &next in &self.nodes[idx as usize].imports {
            match colors[next as usize] {
                Color::Grey => return Some(next),
                Color::White => {
                    if let Some(found) = self.visit(next, colors) {
                        return Some(found);
                    }
                }
                Color::Black => {}
            }
        }
        colors[idx as usize] = Color::Black;
        None
    }
}

/// Compile `path` and its imports. The result is indexed by proto number.
pub fn compile_file(path: &Path, config: &Config) -> Result<Vec<Proto>, CompileError> {
    ModuleGraph::new(config).compile_entry(path)
}

pub fn compile_source(source: &str, name: &str, config: &Config) -> Result<Vec<Proto>, CompileError> {
    ModuleGraph::new(config).compile_text(source, name)
}

/// Resolve symlinks when the file exists, otherwise anchor at the current
/// directory so the missing file is reported with a full path.
fn absolute(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn check_size(file: &str, size: u64, config: &Config) -> Result<(), CompileError> {
    if size > config.max_source_size {
        return Err(CompileError::SourceTooLarge {
            file: file.to_string(),
            size,
            limit: config.max_source_size,
        });
    }
    Ok(())
}

fn read_source(path: &Path, config: &Config) -> Result<String, CompileError> {
    let file = path.display().to_string();
    let meta = fs::metadata(path).map_err(|err| CompileError::io(&file, err))?;
    check_size(&file, meta.len(), config)?;
    fs::read_to_string(path).map_err(|err| CompileError::io(&file, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_protos_numbered_in_discovery_order() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("main.gs"),
            "import \"./a\", \"./lib/b\"\nprint(a, b)\n",
        )
        .unwrap();
        fs::write(dir.path().join("a.gs"), "import \"./lib/b\"\nexport b + 1\n").unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/b.gs"), "export 41\n").unwrap();

        let protos = compile_file(&dir.path().join("main.gs"), &Config::default()).unwrap();
        assert_eq!(protos.len(), 3);
        assert!(protos[0].file_path.ends_with("main.gs"));
        assert!(protos[1].file_path.ends_with("a.gs"));
        assert!(protos[2].file_path.ends_with("b.gs"));
    }

    #[test]
    fn test_import_cycle_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.gs"), "import \"./a\"\n").unwrap();
        fs::write(dir.path().join("a.gs"), "import \"./b\"\nexport 1\n").unwrap();
        fs::write(dir.path().join("b.gs"), "import \"./a\"\nexport 2\n").unwrap();

        let err = compile_file(&dir.path().join("main.gs"), &Config::default()).unwrap_err();
        assert!(matches!(err, CompileError::ImportCycle { .. }));
    }

    #[test]
    fn test_oversized_source_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.gs");
        fs::write(&path, "let x = 1\n".repeat(10)).unwrap();
        let config = Config {
            max_source_size: 16,
            ..Config::default()
        };
        let err = compile_file(&path, &config).unwrap_err();
        assert!(matches!(err, CompileError::SourceTooLarge { limit: 16, .. }));
    }

    #[test]
    fn test_unknown_stdlib_and_missing_file() {
        let err = compile_source("import net\n", "main.gs", &Config::default()).unwrap_err();
        assert!(err.to_string().contains("invalid std library: net"));

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.gs"), "import \"./nowhere\"\n").unwrap();
        let err = compile_file(&dir.path().join("main.gs"), &Config::default()).unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }

    #[test]
    fn test_stdlib_imports_do_not_take_proto_numbers() {
        let protos = compile_source("import fs, os\nprint(fs, os)\n", "main.gs", &Config::default())
            .unwrap();
        assert_eq!(protos.len(), 1);
    }
}
