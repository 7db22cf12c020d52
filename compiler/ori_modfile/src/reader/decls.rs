//! Declaration shells and population.

use ori_sema::{
    Associativity, Decl, DeclContext, DeclFlags, DeclId, DeclKind, DeclKindTag, ExtensionData,
    FuncData, GenericParamList, KnownProtocol, NominalData, NormalConformance, OperatorFixity,
    ProtocolData, TypeId,
};
use tracing::trace;

use crate::format::{common, decode_signed, table_index, xref};
use crate::module_file::{Section, Slot};
use crate::{ensure_sufficient_stack, LoadError};

use super::{Fields, ReadSession};

impl ReadSession<'_> {
    /// The declaration with on-disk id `id` in `file`, as a shell if it has
    /// not been populated yet.
    pub(crate) fn resolve_decl(&mut self, file: usize, id: u64) -> Result<DeclId, LoadError> {
        let Some(index) = table_index(id) else {
            return Err(self.reject(file, "declaration id 0".to_owned()));
        };
        let offset = match self.files[file].decls.get(index) {
            Some(Slot::Ready(decl)) => return Ok(*decl),
            Some(Slot::InProgress) => {
                return Err(self.malformed(
                    file,
                    format!("declaration {id} refers to itself while being read"),
                ));
            }
            Some(Slot::Unread(offset)) => *offset,
            None => {
                return Err(self.reject(file, format!("declaration {id} is out of range")));
            }
        };
        let result = ensure_sufficient_stack(|| self.read_decl(file, index, offset));
        if let Err(err) = &result {
            if self.files[file].decls[index] == Slot::InProgress {
                self.files[file].decls[index] = Slot::Unread(offset);
            }
            self.poison(file, err);
        }
        result
    }

    pub(crate) fn opt_decl(&mut self, file: usize, id: u64) -> Result<Option<DeclId>, LoadError> {
        if id == 0 {
            return Ok(None);
        }
        self.resolve_decl(file, id).map(Some)
    }

    pub(crate) fn resolve_decls(
        &mut self,
        file: usize,
        ids: &[u64],
    ) -> Result<Vec<DeclId>, LoadError> {
        ids.iter().map(|&id| self.resolve_decl(file, id)).collect()
    }

    fn read_decl(&mut self, file: usize, index: usize, offset: u64) -> Result<DeclId, LoadError> {
        let mut head =
            self.with_cursor_at(file, Section::Decls, offset, |s| s.record(file, Section::Decls))?;
        if head.code() == xref::XREF {
            self.files[file].decls[index] = Slot::InProgress;
            let decl = self.resolve_xref(file, offset)?;
            self.files[file].decls[index] = Slot::Ready(decl);
            return Ok(decl);
        }

        let tag = u8::try_from(head.code())
            .ok()
            .and_then(DeclKindTag::from_raw)
            .ok_or_else(|| head.malformed(format!("record {} is not a declaration", head.code())))?;
        let name_id = head.next()?;
        let context_id = head.next()?;
        let flags = DeclFlags::from_bits_truncate(head.next_u8("declaration flags")?);
        let module = self.module_of(file)?;

        let context = if context_id == 0 {
            DeclContext::Module(module)
        } else {
            let parent_ready = matches!(
                table_index(context_id).and_then(|i| self.files[file].decls.get(i)),
                Some(Slot::Ready(_))
            );
            if !parent_ready && self.context_chain.contains(&(file, index)) {
                return Err(head.malformed(format!("declaration {} is its own parent", index + 1)));
            }
            self.context_chain.push((file, index));
            let parent = self.resolve_decl(file, context_id);
            self.context_chain.pop();
            let parent = parent?;
            // The parent's shell creates its member shells, which may
            // include this one.
            if let Slot::Ready(decl) = self.files[file].decls[index] {
                return Ok(decl);
            }
            DeclContext::Decl(parent)
        };

        self.files[file].decls[index] = Slot::InProgress;
        let name = self.ident(file, name_id)?;
        let kind = self.shell_kind(file, tag, &mut head)?;
        let decl = self
            .ctx
            .add_decl(Decl::new(name, context, module, kind).with_flags(flags));
        self.files[file].decls[index] = Slot::Ready(decl);
        self.files[file].decl_index.insert(decl, index);
        trace!(
            module = %self.files[file].name,
            decl = self.ctx.name_str(name),
            ?tag,
            "declaration shell"
        );

        self.enqueue(file, index);
        self.attach_shell_parts(file, decl, tag, head)?;
        Ok(decl)
    }

    /// Payload of a fresh shell. Only an extension's extended type is
    /// resolved here, so the extension is registered with its nominal
    /// from the start.
    fn shell_kind(
        &mut self,
        file: usize,
        tag: DeclKindTag,
        head: &mut Fields,
    ) -> Result<DeclKind, LoadError> {
        Ok(match tag {
            DeclKindTag::TypeAlias => DeclKind::TypeAlias {
                underlying: None,
                generics: None,
            },
            DeclKindTag::Struct => DeclKind::Struct(NominalData::default()),
            DeclKindTag::Class => DeclKind::Class {
                nominal: NominalData::default(),
                superclass: None,
            },
            DeclKindTag::Enum => DeclKind::Enum {
                nominal: NominalData::default(),
                raw_type: None,
            },
            DeclKindTag::EnumCase => DeclKind::EnumCase {
                argument_type: None,
                raw_value: None,
            },
            DeclKindTag::Protocol => DeclKind::Protocol(ProtocolData::default()),
            DeclKindTag::Func => DeclKind::Func(FuncData::default()),
            DeclKindTag::Constructor => DeclKind::Constructor {
                func: FuncData::default(),
                failable: false,
            },
            DeclKindTag::Destructor => DeclKind::Destructor {
                interface_type: None,
            },
            DeclKindTag::Var => DeclKind::Var {
                ty: None,
                is_let: false,
            },
            DeclKindTag::Subscript => DeclKind::Subscript {
                index_type: None,
                element_type: None,
            },
            DeclKindTag::PatternBinding => DeclKind::PatternBinding { vars: Vec::new() },
            DeclKindTag::InfixOperator => operator_shell(OperatorFixity::Infix),
            DeclKindTag::PrefixOperator => operator_shell(OperatorFixity::Prefix),
            DeclKindTag::PostfixOperator => operator_shell(OperatorFixity::Postfix),
            DeclKindTag::Extension => {
                let extended = self.resolve_type(file, head.next()?)?;
                DeclKind::Extension(ExtensionData {
                    extended,
                    generics: None,
                    inherited: Vec::new(),
                    members: Vec::new(),
                    conformances: Vec::new(),
                })
            }
            DeclKindTag::GenericTypeParam => DeclKind::GenericTypeParam {
                depth: head.next_u32("generic parameter depth")?,
                index: head.next_u32("generic parameter index")?,
                inherited: Vec::new(),
                superclass: None,
            },
            DeclKindTag::AssociatedType => DeclKind::AssociatedType {
                default: None,
                inherited: Vec::new(),
            },
        })
    }

    /// Conformance shells and member shells, read from the rest of the
    /// head record.
    fn attach_shell_parts(
        &mut self,
        file: usize,
        decl: DeclId,
        tag: DeclKindTag,
        mut head: Fields,
    ) -> Result<(), LoadError> {
        match tag {
            DeclKindTag::Struct | DeclKindTag::Class | DeclKindTag::Enum => {
                head.next()?;
                let n_inherited = head.next()?;
                let n_conformances = head.next()?;
                head.take(n_inherited)?;
                let protocols = head.take(n_conformances)?;
                self.conformance_shells(file, decl, decl, &protocols)?;
                self.member_shells(file, decl, &head.rest())
            }
            DeclKindTag::Extension => {
                let n_inherited = head.next()?;
                let n_conformances = head.next()?;
                head.take(n_inherited)?;
                let protocols = head.take(n_conformances)?;
                if !protocols.is_empty() {
                    let nominal = match &self.ctx.decl(decl).kind {
                        DeclKind::Extension(ext) => self.ctx.nominal_of_type(ext.extended),
                        _ => None,
                    }
                    .ok_or_else(|| {
                        head.malformed("conformance on an extension of a non-nominal type")
                    })?;
                    self.conformance_shells(file, nominal, decl, &protocols)?;
                }
                self.member_shells(file, decl, &head.rest())
            }
            DeclKindTag::Protocol => {
                head.next()?;
                head.next()?;
                let n_inherited = head.next()?;
                head.take(n_inherited)?;
                self.member_shells(file, decl, &head.rest())
            }
            _ => Ok(()),
        }
    }

    fn conformance_shells(
        &mut self,
        file: usize,
        nominal: DeclId,
        context: DeclId,
        protocols: &[u64],
    ) -> Result<(), LoadError> {
        let module = self.module_of(file)?;
        for &protocol in protocols {
            if protocol == 0 {
                continue;
            }
            let protocol = self.resolve_decl(file, protocol)?;
            let shell = NormalConformance::shell(protocol, nominal, context, module);
            self.ctx.alloc_normal_conformance(shell);
        }
        Ok(())
    }

    fn member_shells(&mut self, file: usize, parent: DeclId, ids: &[u64]) -> Result<(), LoadError> {
        for &id in ids {
            let member = self.resolve_decl(file, id)?;
            if !self.ctx.add_member(parent, member) {
                return Err(self.malformed(file, "members on a declaration that cannot have them"));
            }
        }
        Ok(())
    }

    // ── Population ──────────────────────────────────────────────────

    pub(crate) fn populate_decl(&mut self, file: usize, index: usize) -> Result<(), LoadError> {
        let Slot::Ready(decl) = self.files[file].decls[index] else {
            return Ok(());
        };
        let offset = self.files[file].decl_offsets[index];
        self.with_cursor_at(file, Section::Decls, offset, |s| {
            let mut head = s.record(file, Section::Decls)?;
            head.take(3)?;
            let kind = s.full_kind(file, decl, &mut head)?;
            s.install_kind(decl, kind);
            s.read_trailing_records(file, decl)
        })
    }

    fn full_kind(
        &mut self,
        file: usize,
        decl: DeclId,
        head: &mut Fields,
    ) -> Result<DeclKind, LoadError> {
        let tag = self.ctx.decl(decl).tag();
        Ok(match tag {
            DeclKindTag::TypeAlias => DeclKind::TypeAlias {
                underlying: self.opt_type(file, head.next()?)?,
                generics: None,
            },
            DeclKindTag::Struct => DeclKind::Struct(self.nominal_data(file, head)?.1),
            DeclKindTag::Class => {
                let (superclass, nominal) = self.nominal_data(file, head)?;
                DeclKind::Class {
                    nominal,
                    superclass,
                }
            }
            DeclKindTag::Enum => {
                let (raw_type, nominal) = self.nominal_data(file, head)?;
                DeclKind::Enum { nominal, raw_type }
            }
            DeclKindTag::EnumCase => {
                let argument_type = self.opt_type(file, head.next()?)?;
                let has_raw = head.next_bool()?;
                let raw = decode_signed(head.next()?);
                DeclKind::EnumCase {
                    argument_type,
                    raw_value: has_raw.then_some(raw),
                }
            }
            DeclKindTag::Protocol => {
                let class_bound = head.next_bool()?;
                let known = match head.next_u8("known protocol")? {
                    0 => None,
                    raw => {
                        let known = KnownProtocol::from_raw(raw);
                        if known.is_none() {
                            trace!(raw, "ignoring unknown known-protocol tag");
                        }
                        known
                    }
                };
                let n_inherited = head.next()?;
                let inherited = head.take(n_inherited)?;
                DeclKind::Protocol(ProtocolData {
                    inherited: self.resolve_decls(file, &inherited)?,
                    members: Vec::new(),
                    class_bound,
                    known,
                })
            }
            DeclKindTag::Func => {
                let interface_type = self.opt_type(file, head.next()?)?;
                let operator = match head.next_u8("operator fixity")? {
                    0 => None,
                    raw => Some(
                        OperatorFixity::from_raw(raw)
                            .ok_or_else(|| head.malformed(format!("invalid fixity {raw}")))?,
                    ),
                };
                let mut func = self.func_tail(file, head)?;
                func.interface_type = interface_type;
                func.operator = operator;
                DeclKind::Func(func)
            }
            DeclKindTag::Constructor => {
                let interface_type = self.opt_type(file, head.next()?)?;
                let failable = head.next_bool()?;
                let mut func = self.func_tail(file, head)?;
                func.interface_type = interface_type;
                DeclKind::Constructor { func, failable }
            }
            DeclKindTag::Destructor => DeclKind::Destructor {
                interface_type: self.opt_type(file, head.next()?)?,
            },
            DeclKindTag::Var => DeclKind::Var {
                ty: self.opt_type(file, head.next()?)?,
                is_let: head.next_bool()?,
            },
            DeclKindTag::Subscript => DeclKind::Subscript {
                index_type: self.opt_type(file, head.next()?)?,
                element_type: self.opt_type(file, head.next()?)?,
            },
            DeclKindTag::PatternBinding => DeclKind::PatternBinding {
                vars: self.resolve_decls(file, &head.rest())?,
            },
            DeclKindTag::InfixOperator
            | DeclKindTag::PrefixOperator
            | DeclKindTag::PostfixOperator => {
                let fixity = head.next_u8("operator fixity")?;
                let associativity = head.next_u8("associativity")?;
                DeclKind::Operator {
                    fixity: OperatorFixity::from_raw(fixity)
                        .ok_or_else(|| head.malformed(format!("invalid fixity {fixity}")))?,
                    associativity: Associativity::from_raw(associativity).ok_or_else(|| {
                        head.malformed(format!("invalid associativity {associativity}"))
                    })?,
                    precedence: head.next_u8("precedence")?,
                }
            }
            DeclKindTag::Extension => {
                let extended = self.resolve_type(file, head.next()?)?;
                let n_inherited = head.next()?;
                let n_conformances = head.next()?;
                let inherited = head.take(n_inherited)?;
                head.take(n_conformances)?;
                DeclKind::Extension(ExtensionData {
                    extended,
                    generics: None,
                    inherited: self.resolve_types(file, &inherited)?,
                    members: Vec::new(),
                    conformances: Vec::new(),
                })
            }
            DeclKindTag::GenericTypeParam => {
                let depth = head.next_u32("generic parameter depth")?;
                let index = head.next_u32("generic parameter index")?;
                let superclass = self.opt_type(file, head.next()?)?;
                DeclKind::GenericTypeParam {
                    depth,
                    index,
                    inherited: self.resolve_types(file, &head.rest())?,
                    superclass,
                }
            }
            DeclKindTag::AssociatedType => DeclKind::AssociatedType {
                default: self.opt_type(file, head.next()?)?,
                inherited: self.resolve_types(file, &head.rest())?,
            },
        })
    }

    /// `(extra, payload)` of a struct, class or enum. Members and
    /// conformances stay with the shell.
    fn nominal_data(
        &mut self,
        file: usize,
        head: &mut Fields,
    ) -> Result<(Option<TypeId>, NominalData), LoadError> {
        let extra = self.opt_type(file, head.next()?)?;
        let n_inherited = head.next()?;
        let n_conformances = head.next()?;
        let inherited = head.take(n_inherited)?;
        head.take(n_conformances)?;
        Ok((
            extra,
            NominalData {
                inherited: self.resolve_types(file, &inherited)?,
                ..NominalData::default()
            },
        ))
    }

    /// `[overridden, params...]` of functions and constructors.
    fn func_tail(&mut self, file: usize, head: &mut Fields) -> Result<FuncData, LoadError> {
        let overridden = self.opt_decl(file, head.next()?)?;
        let params = self.resolve_decls(file, &head.rest())?;
        Ok(FuncData {
            overridden,
            params,
            ..FuncData::default()
        })
    }

    /// Swap in the populated payload, keeping the members and conformances
    /// the shell phase attached.
    fn install_kind(&mut self, decl: DeclId, kind: DeclKind) {
        let current = self.ctx.decl_mut(decl);
        let members = current.members_mut().map(std::mem::take).unwrap_or_default();
        let conformances = current
            .conformances_mut()
            .map(std::mem::take)
            .unwrap_or_default();
        current.kind = kind;
        if let Some(slot) = current.members_mut() {
            *slot = members;
        }
        if let Some(slot) = current.conformances_mut() {
            *slot = conformances;
        }
    }

    /// The generic parameter list, then one normal conformance per
    /// conformance shell.
    fn read_trailing_records(&mut self, file: usize, decl: DeclId) -> Result<(), LoadError> {
        if let Some(mut list) = self.peek(file, Section::Decls, &[common::GENERIC_PARAM_LIST])? {
            let params = self.resolve_decls(file, &list.rest())?;
            let requirements = self.read_requirements(file, Section::Decls)?;
            match self.ctx.decl_mut(decl).generics_mut() {
                Some(slot) => *slot = Some(GenericParamList::new(params, requirements)),
                None => {
                    return Err(list.malformed("generic parameters on a declaration without them"));
                }
            }
        }
        let conformances = self.ctx.decl(decl).conformances().to_vec();
        for conformance in conformances {
            self.read_normal_conformance(file, conformance)?;
        }
        Ok(())
    }
}

fn operator_shell(fixity: OperatorFixity) -> DeclKind {
    DeclKind::Operator {
        fixity,
        associativity: Associativity::None,
        precedence: 0,
    }
}
