//! Cross-references into other modules.
//!
//! A path is walked piece by piece from the referenced module's top level.
//! Every step must leave exactly one candidate; a path that matches nothing
//! or matches ambiguously makes the referencing file malformed.

use ori_sema::{DeclId, DeclKindTag, Name};
use tracing::trace;

use crate::format::xref;
use crate::module_file::{IndexKind, Section};
use crate::LoadError;

use super::ReadSession;

/// One raw path piece: record code and fields.
type RawPiece = (u32, Vec<u64>);

impl ReadSession<'_> {
    /// Resolve the `XREF` group at `offset` in `file`'s decls block.
    pub(crate) fn resolve_xref(&mut self, file: usize, offset: u64) -> Result<DeclId, LoadError> {
        let (module_ref, pieces) = self.with_cursor_at(file, Section::Decls, offset, |s| {
            let mut head = s.expect(file, Section::Decls, xref::XREF)?;
            let module_ref = head.next()?;
            let count = head.next()?;
            let mut pieces: Vec<RawPiece> = Vec::new();
            for _ in 0..count {
                let mut piece = s.record(file, Section::Decls)?;
                pieces.push((piece.code(), piece.rest()));
            }
            Ok((module_ref, pieces))
        })?;

        let target = self.module_ref(file, module_ref)?;
        let mut path = self.files[target].name.to_string();
        let mut current: Option<DeclId> = None;
        // File whose extensions the next named piece is limited to.
        let mut extension_file: Option<usize> = None;
        let mut pieces = pieces.into_iter().peekable();

        while let Some((code, fields)) = pieces.next() {
            let field = |i: usize| fields.get(i).copied().unwrap_or(0);
            match code {
                xref::EXTENSION_PIECE => {
                    extension_file = Some(self.module_ref(file, field(0))?);
                }
                xref::TYPE_PIECE | xref::VALUE_PIECE => {
                    let want_type = code == xref::TYPE_PIECE;
                    let name = self.ident(file, field(0))?;
                    path.push('.');
                    path.push_str(self.ctx.name_str(name));

                    let mut candidates = match current {
                        None => self.top_level_candidates(target, name, want_type)?,
                        Some(parent) => {
                            let module = match extension_file.take() {
                                Some(ext_file) => {
                                    self.load_extensions_of(ext_file, parent)?;
                                    Some(self.module_of(ext_file)?)
                                }
                                None => None,
                            };
                            let mut found = self.ctx.members_named(parent, name, module);
                            found.retain(|&d| self.ctx.decl(d).tag().is_type() == want_type);
                            found
                        }
                    };

                    if let Some((xref::OPERATOR_FILTER, filter)) = pieces.peek() {
                        let fixity = filter.first().copied().unwrap_or(0);
                        pieces.next();
                        candidates = self.filter_by_fixity(candidates, fixity)?;
                    }

                    let expected = field(1);
                    if !want_type && expected != 0 && candidates.len() > 1 {
                        candidates = self.filter_by_type(file, candidates, expected)?;
                    }

                    current = Some(match candidates.as_slice() {
                        [one] => *one,
                        [] => {
                            return Err(self.malformed(
                                file,
                                format!("cross-reference {path} does not resolve"),
                            ));
                        }
                        _ => {
                            return Err(self.malformed(
                                file,
                                format!("cross-reference {path} is ambiguous"),
                            ));
                        }
                    });
                }
                xref::GENERIC_PARAM_PIECE => {
                    let owner = current.ok_or_else(|| {
                        self.malformed(file, "generic parameter piece without an owner")
                    })?;
                    self.ensure_populated(owner)?;
                    let index = field(0);
                    path.push_str(&format!("<{index}>"));
                    let param = usize::try_from(index).ok().and_then(|i| {
                        self.ctx
                            .decl(owner)
                            .generics()
                            .and_then(|g| g.params.get(i).copied())
                    });
                    current = Some(param.ok_or_else(|| {
                        self.malformed(file, format!("cross-reference {path} does not resolve"))
                    })?);
                }
                code => {
                    return Err(self.malformed(
                        file,
                        format!("record {code} is not a cross-reference piece"),
                    ));
                }
            }
        }

        let decl = current
            .ok_or_else(|| self.malformed(file, "empty cross-reference path"))?;
        trace!(module = %self.files[file].name, %path, "resolved cross-reference");
        Ok(decl)
    }

    /// Top-level declarations of `target` named `name`, types or values.
    fn top_level_candidates(
        &mut self,
        target: usize,
        name: Name,
        want_type: bool,
    ) -> Result<Vec<DeclId>, LoadError> {
        let text = self.ctx.name_str(name).to_owned();
        let mut ids: Vec<u64> = self.files[target]
            .index_entries(IndexKind::TopLevelValues, &text)?
            .into_iter()
            .filter(|e| {
                DeclKindTag::from_raw(e.disambiguator).is_some_and(|t| t.is_type() == want_type)
            })
            .map(|e| u64::from(e.id))
            .collect();
        if !want_type {
            ids.extend(
                self.files[target]
                    .index_entries(IndexKind::Operators, &text)?
                    .into_iter()
                    .map(|e| u64::from(e.id)),
            );
        }
        self.resolve_decls(target, &ids)
    }

    /// Candidates declared with operator fixity `fixity`. Operator methods
    /// only carry their fixity once populated.
    fn filter_by_fixity(
        &mut self,
        candidates: Vec<DeclId>,
        fixity: u64,
    ) -> Result<Vec<DeclId>, LoadError> {
        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            self.ensure_populated(candidate)?;
            let matches = self
                .ctx
                .decl(candidate)
                .operator_fixity()
                .is_some_and(|f| f as u64 == fixity);
            if matches || self.is_populating(candidate) {
                kept.push(candidate);
            }
        }
        Ok(kept)
    }

    /// Candidates whose value type is `expected`. A candidate still being
    /// populated further up the stack cannot be checked and is kept.
    fn filter_by_type(
        &mut self,
        file: usize,
        candidates: Vec<DeclId>,
        expected: u64,
    ) -> Result<Vec<DeclId>, LoadError> {
        let expected = self.resolve_type(file, expected)?;
        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            self.ensure_populated(candidate)?;
            if self.is_populating(candidate)
                || self.ctx.decl(candidate).value_type() == Some(expected)
            {
                kept.push(candidate);
            }
        }
        Ok(kept)
    }
}
