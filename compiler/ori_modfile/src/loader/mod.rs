//! Module loader.
//!
//! [`ModuleLoader`] discovers module files, opens them, loads their
//! dependencies, registers each with the semantic context and answers
//! lookups by decoding only what a lookup touches.
//!
//! Every lookup runs in its own [`ReadSession`], which populates all shells
//! it created before returning, so callers always see complete
//! declarations. The IR module entities decode into is owned by the loader.

pub mod search;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

use ori_sema::{
    ConformanceId, DeclId, DeclKind, ImportedModule, KnownProtocol, LinkLibrary, ModuleId,
    OperatorFixity, SemaContext,
};
use ori_tir::{FuncId, GlobalId, TirModule, VTableId, WitnessTableId};

use crate::module_file::{IndexKind, IrTable, ModuleFile};
use crate::name_index::{qualified_decl_name, witness_table_key, IndexEntry};
use crate::reader::ReadSession;
use crate::{DocFile, LoadError, LoaderConfig};

/// A module loaded by a [`ModuleLoader`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModuleHandle {
    file: usize,
    module: ModuleId,
}

impl ModuleHandle {
    /// Module the file was registered as.
    pub fn module(self) -> ModuleId {
        self.module
    }
}

/// Loads module files into a semantic context.
pub struct ModuleLoader {
    config: LoaderConfig,
    files: Vec<ModuleFile>,
    by_name: FxHashMap<String, usize>,
    /// Modules whose dependencies are being loaded, to cut import cycles.
    loading: FxHashSet<String>,
    tir: TirModule,
}

impl ModuleLoader {
    pub fn new(config: LoaderConfig) -> Self {
        ModuleLoader {
            config,
            files: Vec::new(),
            by_name: FxHashMap::default(),
            loading: FxHashSet::default(),
            tir: TirModule::new(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// IR decoded so far.
    pub fn ir(&self) -> &TirModule {
        &self.tir
    }

    pub fn into_ir(self) -> TirModule {
        self.tir
    }

    pub fn file(&self, handle: ModuleHandle) -> &ModuleFile {
        &self.files[handle.file]
    }

    /// Handle of an already loaded module.
    pub fn handle(&self, name: &str) -> Option<ModuleHandle> {
        let &file = self.by_name.get(name)?;
        let module = self.files[file].module?;
        Some(ModuleHandle { file, module })
    }

    // ── Loading ─────────────────────────────────────────────────────

    /// Load the module `name` and everything it imports.
    pub fn load_module(
        &mut self,
        ctx: &mut SemaContext,
        name: &str,
    ) -> Result<ModuleHandle, LoadError> {
        if let Some(handle) = self.handle(name) {
            self.files[handle.file].check_status()?;
            return Ok(handle);
        }
        let located = search::locate_module(&self.config, name)?.ok_or_else(|| {
            LoadError::NotFound {
                module: name.to_owned(),
            }
        })?;
        let mut file = ModuleFile::open(name, located.data, located.path.as_deref())?;

        self.loading.insert(name.to_owned());
        let deps = self.load_dependencies(ctx, &file);
        let shadowed = match &file.shadowed {
            Some(underlying) if deps.is_ok() => Some(self.load_shadowed(ctx, name, underlying)),
            _ => None,
        };
        self.loading.remove(name);
        let deps = deps?;
        let shadowed = shadowed.transpose()?;

        let module = ctx.add_module(name);
        let data = ctx.module_mut(module);
        data.imports = deps;
        data.link_libraries.clone_from(&file.link_libraries);
        data.source_files.clone_from(&file.source_files);
        data.shadows = shadowed;
        file.module = Some(module);

        if self.config.load_docs {
            file.docs = self.load_docs(name, &file);
        }

        debug!(
            module = name,
            decls = file.decl_count(),
            imports = file.imports.len(),
            docs = file.docs.is_some(),
            "module loaded"
        );
        let index = self.files.len();
        self.files.push(file);
        self.by_name.insert(name.to_owned(), index);
        Ok(ModuleHandle {
            file: index,
            module,
        })
    }

    /// Load every import of `file`. Missing modules are collected across
    /// all imports and reported together.
    fn load_dependencies(
        &mut self,
        ctx: &mut SemaContext,
        file: &ModuleFile,
    ) -> Result<Vec<ImportedModule>, LoadError> {
        let mut imports = Vec::with_capacity(file.imports.len());
        let mut missing: Vec<String> = Vec::new();
        for import in &file.imports {
            if self.loading.contains(&import.name) {
                trace!(module = %file.name, import = %import.name, "import cycle; deferring");
                continue;
            }
            match self.load_module(ctx, &import.name) {
                Ok(handle) => imports.push(ImportedModule {
                    module: handle.module,
                    exported: import.exported,
                }),
                Err(LoadError::NotFound { module }) => {
                    if !missing.contains(&module) {
                        missing.push(module);
                    }
                }
                Err(LoadError::MissingDependency { missing: nested, .. }) => {
                    for module in nested {
                        if !missing.contains(&module) {
                            missing.push(module);
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }
        if !missing.is_empty() {
            return Err(LoadError::MissingDependency {
                module: file.name.to_string(),
                missing,
            });
        }
        Ok(imports)
    }

    fn load_shadowed(
        &mut self,
        ctx: &mut SemaContext,
        name: &str,
        underlying: &str,
    ) -> Result<ori_sema::Name, LoadError> {
        let interned = ctx.intern(underlying);
        if ctx.module_by_name(interned).is_some() {
            return Ok(interned);
        }
        let missing = || LoadError::MissingShadowedModule {
            module: name.to_owned(),
            underlying: underlying.to_owned(),
        };
        if underlying == name || self.loading.contains(underlying) {
            return Err(missing());
        }
        self.load_module(ctx, underlying).map_err(|_| missing())?;
        Ok(interned)
    }

    /// The companion documentation file, if there is a usable one.
    fn load_docs(&self, name: &str, file: &ModuleFile) -> Option<DocFile> {
        let path = search::doc_path(&self.config, file.path()?)?;
        let opened = search::read_file(&path).and_then(|data| DocFile::open(name, data));
        match opened {
            Ok(docs) => Some(docs),
            Err(err) => {
                warn!(
                    module = name,
                    path = %path.display(),
                    error = %err,
                    "ignoring documentation file"
                );
                None
            }
        }
    }

    // ── Sessions ────────────────────────────────────────────────────

    /// Run `f` in a fresh read session and populate every shell it
    /// created.
    fn with_session<T>(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        f: impl FnOnce(&mut ReadSession<'_>, usize) -> Result<T, LoadError>,
    ) -> Result<T, LoadError> {
        self.files[handle.file].check_status()?;
        let mut session = ReadSession::new(ctx, &mut self.tir, &mut self.files, &self.by_name);
        let value = f(&mut session, handle.file)?;
        session.finish()?;
        Ok(value)
    }

    fn entry_ids(
        &self,
        handle: ModuleHandle,
        kind: IndexKind,
        name: &str,
        keep: impl Fn(&IndexEntry) -> bool,
    ) -> Result<Vec<u64>, LoadError> {
        let file = &self.files[handle.file];
        file.check_status()?;
        Ok(file
            .index_entries(kind, name)?
            .into_iter()
            .filter(|e| keep(e))
            .map(|e| u64::from(e.id))
            .collect())
    }

    // ── Declarations ────────────────────────────────────────────────

    /// Every top-level declaration, in source order.
    pub fn top_level_decls(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
    ) -> Result<Vec<DeclId>, LoadError> {
        let ids = self.files[handle.file].top_level.clone();
        let decls = self.with_session(ctx, handle, |s, file| s.resolve_decls(file, &ids))?;
        let data = ctx.module_mut(handle.module);
        if data.top_level.is_empty() {
            data.top_level.clone_from(&decls);
        }
        Ok(decls)
    }

    /// Top-level values and types named `name`.
    pub fn lookup_value(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        name: &str,
    ) -> Result<Vec<DeclId>, LoadError> {
        let ids = self.entry_ids(handle, IndexKind::TopLevelValues, name, |_| true)?;
        self.with_session(ctx, handle, |s, file| s.resolve_decls(file, &ids))
    }

    /// The operator declaration named `name` with the given fixity.
    pub fn lookup_operator(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        name: &str,
        fixity: OperatorFixity,
    ) -> Result<Option<DeclId>, LoadError> {
        let ids = self.entry_ids(handle, IndexKind::Operators, name, |e| {
            e.disambiguator == fixity as u8
        })?;
        let Some(&id) = ids.first() else {
            return Ok(None);
        };
        self.with_session(ctx, handle, |s, file| s.resolve_decl(file, id))
            .map(Some)
    }

    /// Extensions of `nominal` declared in this module.
    pub fn lookup_extensions(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        nominal: DeclId,
    ) -> Result<Vec<DeclId>, LoadError> {
        let tag = ctx.decl(nominal).tag() as u8;
        let ids = self.entry_ids(handle, IndexKind::Extensions, ctx.decl_name(nominal), |e| {
            e.disambiguator == tag
        })?;
        let decls = self.with_session(ctx, handle, |s, file| s.resolve_decls(file, &ids))?;
        // Distinct nominals can share a name.
        Ok(decls
            .into_iter()
            .filter(|&d| match &ctx.decl(d).kind {
                DeclKind::Extension(ext) => ctx.nominal_of_type(ext.extended) == Some(nominal),
                _ => false,
            })
            .collect())
    }

    /// Members named `name` of the module's classes and class extensions.
    pub fn lookup_class_members(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        name: &str,
    ) -> Result<Vec<DeclId>, LoadError> {
        let ids = self.entry_ids(handle, IndexKind::ClassMembers, name, |_| true)?;
        self.with_session(ctx, handle, |s, file| s.resolve_decls(file, &ids))
    }

    /// Operator implementations named `name` declared inside types.
    pub fn lookup_operator_methods(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        name: &str,
    ) -> Result<Vec<DeclId>, LoadError> {
        let ids = self.entry_ids(handle, IndexKind::OperatorMethods, name, |_| true)?;
        self.with_session(ctx, handle, |s, file| s.resolve_decls(file, &ids))
    }

    /// Raw entries of a name table, without decoding anything.
    pub fn index_entries(
        &self,
        handle: ModuleHandle,
        kind: IndexKind,
        name: &str,
    ) -> Result<Vec<IndexEntry>, LoadError> {
        let file = &self.files[handle.file];
        file.check_status()?;
        file.index_entries(kind, name)
    }

    /// Nominal types and extensions that adopt `known`.
    pub fn known_protocol_adopters(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        known: KnownProtocol,
    ) -> Result<Vec<DeclId>, LoadError> {
        let ids = self.files[handle.file]
            .known_adopters
            .get(&known)
            .cloned()
            .unwrap_or_default();
        self.with_session(ctx, handle, |s, file| s.resolve_decls(file, &ids))
    }

    // ── Module metadata ─────────────────────────────────────────────

    pub fn imported_modules(&self, handle: ModuleHandle) -> &[crate::ImportInfo] {
        self.files[handle.file].imports()
    }

    /// Call `f` with every library the module and its transitive imports
    /// link against, each module visited once.
    pub fn collect_link_libraries(&self, handle: ModuleHandle, mut f: impl FnMut(&LinkLibrary)) {
        let mut seen = FxHashSet::default();
        let mut stack = vec![handle.file];
        while let Some(file) = stack.pop() {
            if !seen.insert(file) {
                continue;
            }
            let file = &self.files[file];
            for lib in &file.link_libraries {
                f(lib);
            }
            for import in &file.imports {
                if let Some(&dep) = self.by_name.get(&import.name) {
                    stack.push(dep);
                }
            }
        }
    }

    /// Brief comment of the top-level declaration `name`, from the
    /// companion documentation file.
    pub fn brief_comment(&self, handle: ModuleHandle, name: &str) -> Option<&str> {
        let file = &self.files[handle.file];
        match file.docs.as_ref()?.brief_comment(name) {
            Ok(comment) => comment,
            Err(err) => {
                warn!(module = %file.name, error = %err, "unreadable documentation entry");
                None
            }
        }
    }

    // ── IR ──────────────────────────────────────────────────────────

    /// The function with linkage name `name`. With `declaration_only`, the
    /// body is left unread.
    pub fn function_by_name(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        name: &str,
        declaration_only: bool,
    ) -> Result<Option<FuncId>, LoadError> {
        let Some(entry) = self.ir_entry(handle, IrTable::Functions, name)? else {
            return Ok(None);
        };
        self.with_session(ctx, handle, |s, file| {
            if declaration_only {
                s.resolve_function_decl(file, entry)
            } else {
                s.resolve_function(file, entry)
            }
        })
        .map(Some)
    }

    pub fn global_by_name(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        name: &str,
    ) -> Result<Option<GlobalId>, LoadError> {
        let Some(entry) = self.ir_entry(handle, IrTable::Globals, name)? else {
            return Ok(None);
        };
        self.with_session(ctx, handle, |s, file| s.resolve_global(file, entry))
            .map(Some)
    }

    /// The vtable this module stores for `class`.
    pub fn vtable_for_class(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        class: DeclId,
    ) -> Result<Option<VTableId>, LoadError> {
        let Some(key) = qualified_decl_name(ctx, class) else {
            return Ok(None);
        };
        let Some(entry) = self.ir_entry(handle, IrTable::VTables, &key)? else {
            return Ok(None);
        };
        let id = self.with_session(ctx, handle, |s, file| s.resolve_vtable(file, entry))?;
        Ok((self.tir.vtable(id).class == class).then_some(id))
    }

    /// The witness table this module stores for a normal conformance.
    pub fn witness_table_for(
        &mut self,
        ctx: &mut SemaContext,
        handle: ModuleHandle,
        conformance: ConformanceId,
    ) -> Result<Option<WitnessTableId>, LoadError> {
        let Some(key) = witness_table_key(ctx, conformance) else {
            return Ok(None);
        };
        let Some(entry) = self.ir_entry(handle, IrTable::WitnessTables, &key)? else {
            return Ok(None);
        };
        let id =
            self.with_session(ctx, handle, |s, file| s.resolve_witness_table(file, entry))?;
        Ok((self.tir.witness_table(id).conformance == conformance).then_some(id))
    }

    fn ir_entry(
        &self,
        handle: ModuleHandle,
        table: IrTable,
        name: &str,
    ) -> Result<Option<u64>, LoadError> {
        let file = &self.files[handle.file];
        file.check_status()?;
        Ok(file
            .ir_entries(table, name)?
            .first()
            .map(|e| u64::from(e.id)))
    }
}

#[cfg(test)]
mod tests;
