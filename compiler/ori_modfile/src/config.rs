//! Writer options and loader configuration.

use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::format::{DOC_EXTENSION, MODULE_EXTENSION};

/// Which IR function bodies the writer includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IrBodies {
    /// No bodies; every function is written as a declaration.
    None,
    /// Bodies of transparent functions only.
    #[default]
    Transparent,
    /// Every body.
    All,
}

impl IrBodies {
    /// Check if a body with the given transparency should be written.
    #[must_use]
    pub fn includes(self, transparent: bool) -> bool {
        match self {
            Self::None => false,
            Self::Transparent => transparent,
            Self::All => true,
        }
    }
}

/// Options for [`serialize_module`](crate::serialize_module).
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Version string stored in the control block.
    pub compiler_version: String,
    /// Function bodies to include in the IR block.
    pub ir_bodies: IrBodies,
    /// Write block and record names into the block-info block.
    pub record_names: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compiler_version: format!("ori {}", env!("CARGO_PKG_VERSION")),
            ir_bodies: IrBodies::default(),
            record_names: true,
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_compiler_version(mut self, version: impl Into<String>) -> Self {
        self.compiler_version = version.into();
        self
    }

    #[must_use]
    pub fn with_ir_bodies(mut self, bodies: IrBodies) -> Self {
        self.ir_bodies = bodies;
        self
    }

    #[must_use]
    pub fn with_record_names(mut self, enabled: bool) -> Self {
        self.record_names = enabled;
        self
    }
}

/// Where and how the [`ModuleLoader`](crate::ModuleLoader) finds modules.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Searched for `<dir>/<name>.<ext>`, in order.
    pub search_paths: Vec<PathBuf>,
    /// Searched for `<dir>/<name>.framework/Modules/<name>.<ext>`, in order.
    pub framework_paths: Vec<PathBuf>,
    /// Searched last, for the standard library.
    pub runtime_path: Option<PathBuf>,
    /// Module file extension, without the dot.
    pub extension: String,
    /// Documentation file extension, without the dot.
    pub doc_extension: String,
    /// Load companion documentation files.
    pub load_docs: bool,
    /// Module files registered in memory; these win over the file system.
    pub memory_modules: FxHashMap<String, Arc<[u8]>>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            framework_paths: Vec::new(),
            runtime_path: None,
            extension: MODULE_EXTENSION.to_owned(),
            doc_extension: DOC_EXTENSION.to_owned(),
            load_docs: true,
            memory_modules: FxHashMap::default(),
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    #[must_use]
    pub fn with_framework_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.framework_paths.push(dir.into());
        self
    }

    #[must_use]
    pub fn with_runtime_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_path = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    #[must_use]
    pub fn with_doc_extension(mut self, ext: impl Into<String>) -> Self {
        self.doc_extension = ext.into();
        self
    }

    #[must_use]
    pub fn with_docs(mut self, enabled: bool) -> Self {
        self.load_docs = enabled;
        self
    }

    /// Register a module file held in memory.
    #[must_use]
    pub fn with_memory_module(
        mut self,
        name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        self.memory_modules.insert(name.into(), bytes.into());
        self
    }
}
