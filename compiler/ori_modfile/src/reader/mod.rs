//! Lazy deserializer.
//!
//! A [`ReadSession`] borrows the semantic context, the IR module and every
//! opened [`ModuleFile`] for the duration of one loader request. Entities
//! are decoded on demand from the file's parked cursors and memoized in the
//! file's slot tables, so a second request for the same id does no I/O.
//!
//! # Shells
//!
//! Declarations are built in two phases. The shell phase reads the head
//! record, allocates the declaration with an empty payload, marks its slot
//! ready, and then creates everything identity lookups need: normal
//! conformance shells from the protocol list and the member shells. The
//! population phase re-reads the head record and fills in types,
//! parameters, generic parameter lists and conformance contents. Shells are
//! queued and populated when the request finishes, which keeps recursion
//! bounded by the nesting depth rather than by the size of the graph.
//!
//! - `decls.rs`: declaration shells and population
//! - `types.rs`: type records
//! - `conformance.rs`: conformances, substitutions and requirements
//! - `xref.rs`: cross-references into other modules
//! - `ir.rs`: IR functions, globals, vtables and witness tables

mod conformance;
mod decls;
mod ir;
mod types;
mod xref;

use std::sync::Arc;

use ori_bitstream::Record;
use ori_sema::{DeclId, ModuleId, Name, SemaContext};
use ori_tir::TirModule;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::module_file::{FileStatus, ModuleFile, Population, Section};
use crate::{ensure_sufficient_stack, LoadError};

/// Sequential access to the fields of one record.
pub(crate) struct Fields {
    record: Record,
    pos: usize,
    module: Arc<str>,
}

impl Fields {
    pub(crate) fn code(&self) -> u32 {
        self.record.code
    }

    pub(crate) fn remaining(&self) -> usize {
        self.record.fields.len().saturating_sub(self.pos)
    }

    pub(crate) fn next(&mut self) -> Result<u64, LoadError> {
        let value = self.record.fields.get(self.pos).copied().ok_or_else(|| {
            self.malformed(format!("record {} is too short", self.record.code))
        })?;
        self.pos += 1;
        Ok(value)
    }

    pub(crate) fn next_u32(&mut self, what: &str) -> Result<u32, LoadError> {
        let value = self.next()?;
        u32::try_from(value).map_err(|_| self.malformed(format!("{what} {value} is out of range")))
    }

    pub(crate) fn next_u8(&mut self, what: &str) -> Result<u8, LoadError> {
        let value = self.next()?;
        u8::try_from(value).map_err(|_| self.malformed(format!("{what} {value} is out of range")))
    }

    pub(crate) fn next_bool(&mut self) -> Result<bool, LoadError> {
        Ok(self.next()? != 0)
    }

    /// The next `count` fields.
    pub(crate) fn take(&mut self, count: u64) -> Result<Vec<u64>, LoadError> {
        let count = usize::try_from(count)
            .ok()
            .filter(|&n| n <= self.remaining())
            .ok_or_else(|| self.malformed(format!("record {} is too short", self.record.code)))?;
        let out = self.record.fields[self.pos..self.pos + count].to_vec();
        self.pos += count;
        Ok(out)
    }

    /// Every field not consumed yet.
    pub(crate) fn rest(&mut self) -> Vec<u64> {
        let out = self.record.fields[self.pos.min(self.record.fields.len())..].to_vec();
        self.pos = self.record.fields.len();
        out
    }

    /// Remaining fields as pairs; an odd count is malformed.
    pub(crate) fn rest_pairs(&mut self) -> Result<Vec<(u64, u64)>, LoadError> {
        if self.remaining() % 2 != 0 {
            return Err(self.malformed(format!(
                "record {} has an odd number of paired fields",
                self.record.code
            )));
        }
        Ok(self.rest().chunks_exact(2).map(|p| (p[0], p[1])).collect())
    }

    pub(crate) fn malformed(&self, detail: impl Into<String>) -> LoadError {
        LoadError::malformed(&self.module, detail)
    }
}

/// One loader request's view of everything it may decode into.
pub(crate) struct ReadSession<'a> {
    pub(crate) ctx: &'a mut SemaContext,
    pub(crate) tir: &'a mut TirModule,
    pub(crate) files: &'a mut [ModuleFile],
    /// File index by module name.
    pub(crate) by_name: &'a FxHashMap<String, usize>,
    /// Declarations whose context is being resolved, to reject cyclic
    /// parent chains.
    context_chain: Vec<(usize, usize)>,
    /// Set while a function body is read. A bad id in a body costs only
    /// that body.
    in_body: bool,
}

impl<'a> ReadSession<'a> {
    pub(crate) fn new(
        ctx: &'a mut SemaContext,
        tir: &'a mut TirModule,
        files: &'a mut [ModuleFile],
        by_name: &'a FxHashMap<String, usize>,
    ) -> Self {
        ReadSession {
            ctx,
            tir,
            files,
            by_name,
            context_chain: Vec::new(),
            in_body: false,
        }
    }

    // ── Cursor discipline ───────────────────────────────────────────

    /// Run `f` with the cursor of `section` at `bit`, restoring the previous
    /// position afterwards whether or not `f` succeeds.
    pub(crate) fn with_cursor_at<T>(
        &mut self,
        file: usize,
        section: Section,
        bit: u64,
        f: impl FnOnce(&mut Self) -> Result<T, LoadError>,
    ) -> Result<T, LoadError> {
        self.files[file].check_status()?;
        let saved = self.files[file].current_bit(section)?;
        self.files[file].jump(section, bit)?;
        let result = f(self);
        let restored = self.files[file].jump(section, saved);
        let value = result?;
        restored?;
        Ok(value)
    }

    /// The record at the cursor of `section`.
    pub(crate) fn record(&mut self, file: usize, section: Section) -> Result<Fields, LoadError> {
        let record = self.files[file].next_record(section)?;
        Ok(self.fields(file, record))
    }

    /// The record at the cursor if its code is one of `codes`.
    pub(crate) fn peek(
        &mut self,
        file: usize,
        section: Section,
        codes: &[u32],
    ) -> Result<Option<Fields>, LoadError> {
        let record = self.files[file].peek_record(section, codes)?;
        Ok(record.map(|r| self.fields(file, r)))
    }

    /// The record at the cursor, which must have code `code`.
    pub(crate) fn expect(
        &mut self,
        file: usize,
        section: Section,
        code: u32,
    ) -> Result<Fields, LoadError> {
        let fields = self.record(file, section)?;
        if fields.code() != code {
            return Err(fields.malformed(format!(
                "expected record {code}, found {}",
                fields.code()
            )));
        }
        Ok(fields)
    }

    fn fields(&self, file: usize, record: Record) -> Fields {
        Fields {
            record,
            pos: 0,
            module: Arc::clone(&self.files[file].name),
        }
    }

    // ── Shared helpers ──────────────────────────────────────────────

    pub(crate) fn malformed(&self, file: usize, detail: impl Into<String>) -> LoadError {
        self.files[file].malformed(detail)
    }

    /// A malformed error that also poisons the file, unless a function
    /// body is being read.
    pub(crate) fn reject(&mut self, file: usize, detail: String) -> LoadError {
        let err = self.malformed(file, detail);
        if !self.in_body {
            self.poison(file, &err);
        }
        err
    }

    /// Module the file was registered as.
    pub(crate) fn module_of(&self, file: usize) -> Result<ModuleId, LoadError> {
        self.files[file]
            .module
            .ok_or_else(|| LoadError::NotLoaded {
                module: self.files[file].name.to_string(),
            })
    }

    pub(crate) fn ident(&mut self, file: usize, id: u64) -> Result<Name, LoadError> {
        self.files[file].identifier(self.ctx, id)
    }

    /// File a module reference points at: 0 is `file` itself, anything
    /// else names a module that must already be loaded.
    pub(crate) fn module_ref(&self, file: usize, module_ref: u64) -> Result<usize, LoadError> {
        if module_ref == 0 {
            return Ok(file);
        }
        let name = self.files[file].identifier_str(module_ref)?;
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| LoadError::MissingDependency {
                module: self.files[file].name.to_string(),
                missing: vec![name.to_owned()],
            })
    }

    /// File that created `decl`, with the declaration's table index.
    pub(crate) fn origin(&self, decl: DeclId) -> Option<(usize, usize)> {
        let module = self.ctx.decl(decl).module;
        self.files.iter().enumerate().find_map(|(file, f)| {
            if f.module != Some(module) {
                return None;
            }
            f.decl_index.get(&decl).map(|&index| (file, index))
        })
    }

    /// Record a terminal error on the file.
    pub(crate) fn poison(&mut self, file: usize, err: &LoadError) {
        if let LoadError::Malformed { .. } = err {
            if self.files[file].status == FileStatus::Valid {
                warn!(module = %self.files[file].name, error = %err, "module file is malformed");
                self.files[file].status = FileStatus::Malformed(err.clone());
            }
        }
    }

    // ── Population queue ────────────────────────────────────────────

    pub(crate) fn enqueue(&mut self, file: usize, index: usize) {
        let f = &mut self.files[file];
        f.population[index] = Population::Pending;
        f.pending.push_back(index);
    }

    /// Populate `decl` now if it is still queued. A declaration already
    /// being populated further up the stack is left as it is.
    pub(crate) fn ensure_populated(&mut self, decl: DeclId) -> Result<(), LoadError> {
        match self.origin(decl) {
            Some((file, index)) => self.populate(file, index),
            None => Ok(()),
        }
    }

    pub(crate) fn is_populating(&self, decl: DeclId) -> bool {
        self.origin(decl).is_some_and(|(file, index)| {
            self.files[file].population[index] == Population::Populating
        })
    }

    fn populate(&mut self, file: usize, index: usize) -> Result<(), LoadError> {
        if self.files[file].population[index] != Population::Pending {
            return Ok(());
        }
        self.files[file].population[index] = Population::Populating;
        let result = ensure_sufficient_stack(|| self.populate_decl(file, index));
        self.files[file].population[index] = Population::Done;
        if let Err(err) = &result {
            self.poison(file, err);
        }
        result
    }

    /// Populate every queued shell, including shells created while doing
    /// so.
    pub(crate) fn finish(&mut self) -> Result<(), LoadError> {
        loop {
            let next = self
                .files
                .iter_mut()
                .enumerate()
                .find_map(|(file, f)| f.pending.pop_front().map(|index| (file, index)));
            let Some((file, index)) = next else {
                return Ok(());
            };
            self.populate(file, index)?;
        }
    }
}

#[cfg(test)]
mod tests;
