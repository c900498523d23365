//! Module loading for gscript.
//!
//! This module provides:
//! - Import path resolution (`import "./util"` is `./util.gs` next to the importer)
//! - Proto numbering in discovery order, the entry file being 0
//! - Import cycle detection

mod graph;

pub use graph::{compile_file, compile_source, ModuleGraph};
