//! Cross-references to declarations owned by other modules.
//!
//! A foreign declaration is written as a name path from its module's top
//! level:
//!
//! ```text
//! XREF [module_ref, path_length]
//!   TYPE_PIECE [name] | VALUE_PIECE [name, expected_type]
//!   OPERATOR_FILTER [fixity]          after an operator's value piece
//!   EXTENSION_PIECE [module_ref]      before a member of an extension
//!   GENERIC_PARAM_PIECE [index]       a generic parameter of the path so far
//! ```

use ori_sema::{DeclContext, DeclId, DeclKind, ModuleId};

use crate::format::xref;
use crate::SerializeError;

use super::ModuleWriter;

/// One path piece, before encoding.
enum Piece {
    Type(DeclId),
    Value(DeclId),
    OperatorFilter(u64),
    Extension(ModuleId),
    GenericParam(u64),
}

impl ModuleWriter<'_> {
    pub(super) fn write_xref(&mut self, id: DeclId) -> Result<(), SerializeError> {
        let mut pieces = Vec::new();
        let base = self.xref_path(id, &mut pieces)?;
        tracing::trace!(
            decl = self.ctx.decl_name(id),
            module = self.ctx.module_name(base),
            pieces = pieces.len(),
            "writing cross-reference"
        );

        let module = self.module_ref(base, id)?;
        self.record(xref::XREF, &[module, pieces.len() as u64])?;
        let ctx = self.ctx;
        for piece in pieces {
            match piece {
                Piece::Type(d) => {
                    let name = self.ident(ctx.decl(d).name)?;
                    self.record(xref::TYPE_PIECE, &[name])?;
                }
                Piece::Value(d) => {
                    let decl = ctx.decl(d);
                    let name = self.ident(decl.name)?;
                    let expected = self.opt_type_id(decl.value_type())?;
                    self.record(xref::VALUE_PIECE, &[name, expected])?;
                }
                Piece::OperatorFilter(fixity) => {
                    self.record(xref::OPERATOR_FILTER, &[fixity])?;
                }
                Piece::Extension(m) => {
                    let module = self.module_ref(m, id)?;
                    self.record(xref::EXTENSION_PIECE, &[module])?;
                }
                Piece::GenericParam(index) => {
                    self.record(xref::GENERIC_PARAM_PIECE, &[index])?;
                }
            }
        }
        Ok(())
    }

    /// Append the path to `id` and return the module the path starts in.
    fn xref_path(&self, id: DeclId, pieces: &mut Vec<Piece>) -> Result<ModuleId, SerializeError> {
        let ctx = self.ctx;
        let decl = ctx.decl(id);
        let unreferenceable = |reason| SerializeError::Unreferenceable {
            decl: ctx.decl_name(id).to_owned(),
            reason,
        };

        let parent = match decl.context {
            DeclContext::Module(module) => {
                self.named_piece(id, pieces);
                return Ok(module);
            }
            DeclContext::Decl(parent) => parent,
        };

        if let DeclKind::GenericTypeParam { .. } = decl.kind {
            let index = ctx
                .decl(parent)
                .generics()
                .and_then(|g| g.params.iter().position(|&p| p == id))
                .ok_or_else(|| unreferenceable("generic parameter is not in its owner's list"))?;
            let base = self.xref_path(parent, pieces)?;
            pieces.push(Piece::GenericParam(index as u64));
            return Ok(base);
        }

        let parent_decl = ctx.decl(parent);
        let base = match &parent_decl.kind {
            DeclKind::Extension(ext) => {
                let nominal = ctx
                    .nominal_of_type(ext.extended)
                    .ok_or_else(|| unreferenceable("extension of a non-nominal type"))?;
                let base = self.xref_path(nominal, pieces)?;
                pieces.push(Piece::Extension(parent_decl.module));
                base
            }
            _ if parent_decl.tag().is_nominal_type() => self.xref_path(parent, pieces)?,
            _ => return Err(unreferenceable("declared in a local scope")),
        };
        self.named_piece(id, pieces);
        Ok(base)
    }

    fn named_piece(&self, id: DeclId, pieces: &mut Vec<Piece>) {
        let decl = self.ctx.decl(id);
        if decl.tag().is_type() {
            pieces.push(Piece::Type(id));
        } else {
            pieces.push(Piece::Value(id));
            if let Some(fixity) = decl.operator_fixity() {
                pieces.push(Piece::OperatorFilter(fixity as u64));
            }
        }
    }
}
