//! Per-module data.

use rustc_hash::FxHashMap;

use crate::{DeclId, ModuleId, Name};

/// A dependency of a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImportedModule {
    pub module: ModuleId,
    /// Re-exported to clients of the importing module.
    pub exported: bool,
}

/// Kind of library a module links against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LinkLibraryKind {
    Library = 0,
    Framework = 1,
}

impl LinkLibraryKind {
    /// Decode a stored discriminant.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => LinkLibraryKind::Library,
            1 => LinkLibraryKind::Framework,
            _ => return None,
        })
    }
}

/// A library clients of the module must link.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinkLibrary {
    pub name: String,
    pub kind: LinkLibraryKind,
}

/// Everything a context knows about one module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleData {
    pub name: Name,
    /// Top-level declarations in source order.
    pub top_level: Vec<DeclId>,
    pub imports: Vec<ImportedModule>,
    pub link_libraries: Vec<LinkLibrary>,
    pub source_files: Vec<String>,
    /// Name of the underlying module this module shadows, if any.
    pub shadows: Option<Name>,
    /// Brief documentation comments for declarations of this module.
    pub doc_comments: FxHashMap<DeclId, String>,
}

impl ModuleData {
    pub(crate) fn new(name: Name) -> Self {
        ModuleData {
            name,
            top_level: Vec::new(),
            imports: Vec::new(),
            link_libraries: Vec::new(),
            source_files: Vec::new(),
            shadows: None,
            doc_comments: FxHashMap::default(),
        }
    }
}
