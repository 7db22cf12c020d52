//! Declaration records.
//!
//! Every declaration record starts with `[name, context, flags]`; the
//! kind-specific fields follow. A declaration with its own generic
//! parameters is followed by its parameter list, and a nominal type or
//! extension by one `NORMAL_CONFORMANCE` per conformance it declares.

use ori_sema::{ConformanceId, DeclContext, DeclId, DeclKind, FuncData, NominalData, TypeId};

use crate::format::encode_signed;
use crate::SerializeError;

use super::ModuleWriter;

impl ModuleWriter<'_> {
    pub(super) fn write_decl(&mut self, id: DeclId) -> Result<(), SerializeError> {
        let ctx = self.ctx;
        let decl = ctx.decl(id);
        if decl.module != self.module {
            return self.write_xref(id);
        }
        tracing::trace!(decl = ctx.decl_name(id), tag = ?decl.tag(), "writing declaration");

        let mut fields = vec![
            self.ident(decl.name)?,
            match decl.context {
                DeclContext::Module(_) => 0,
                DeclContext::Decl(parent) => self.decl_id(parent)?,
            },
            u64::from(decl.flags.bits()),
        ];

        match &decl.kind {
            DeclKind::TypeAlias { underlying, .. } => {
                fields.push(self.opt_type_id(*underlying)?);
            }
            DeclKind::Struct(nominal) => self.nominal_fields(&mut fields, nominal, None)?,
            DeclKind::Class {
                nominal,
                superclass,
            } => self.nominal_fields(&mut fields, nominal, *superclass)?,
            DeclKind::Enum { nominal, raw_type } => {
                self.nominal_fields(&mut fields, nominal, *raw_type)?;
            }
            DeclKind::EnumCase {
                argument_type,
                raw_value,
            } => {
                fields.push(self.opt_type_id(*argument_type)?);
                fields.push(u64::from(raw_value.is_some()));
                fields.push(encode_signed(raw_value.unwrap_or(0)));
            }
            DeclKind::Protocol(proto) => {
                fields.push(u64::from(proto.class_bound));
                fields.push(proto.known.map_or(0, |k| k as u64));
                fields.push(proto.inherited.len() as u64);
                for &p in &proto.inherited {
                    fields.push(self.decl_id(p)?);
                }
                for &m in &proto.members {
                    fields.push(self.decl_id(m)?);
                }
            }
            DeclKind::Func(func) => {
                fields.push(self.opt_type_id(func.interface_type)?);
                fields.push(func.operator.map_or(0, |f| f as u64));
                self.func_tail(&mut fields, func)?;
            }
            DeclKind::Constructor { func, failable } => {
                fields.push(self.opt_type_id(func.interface_type)?);
                fields.push(u64::from(*failable));
                self.func_tail(&mut fields, func)?;
            }
            DeclKind::Destructor { interface_type } => {
                fields.push(self.opt_type_id(*interface_type)?);
            }
            DeclKind::Var { ty, is_let } => {
                fields.push(self.opt_type_id(*ty)?);
                fields.push(u64::from(*is_let));
            }
            DeclKind::Subscript {
                index_type,
                element_type,
            } => {
                fields.push(self.opt_type_id(*index_type)?);
                fields.push(self.opt_type_id(*element_type)?);
            }
            DeclKind::PatternBinding { vars } => {
                for &v in vars {
                    fields.push(self.decl_id(v)?);
                }
            }
            DeclKind::Operator {
                fixity,
                associativity,
                precedence,
            } => {
                fields.push(*fixity as u64);
                fields.push(*associativity as u64);
                fields.push(u64::from(*precedence));
            }
            DeclKind::Extension(ext) => {
                fields.push(self.type_id(ext.extended)?);
                fields.push(ext.inherited.len() as u64);
                fields.push(ext.conformances.len() as u64);
                for &ty in &ext.inherited {
                    fields.push(self.type_id(ty)?);
                }
                self.conformance_protocols(&mut fields, &ext.conformances)?;
                for &m in &ext.members {
                    fields.push(self.decl_id(m)?);
                }
            }
            DeclKind::GenericTypeParam {
                depth,
                index,
                inherited,
                superclass,
            } => {
                fields.push(u64::from(*depth));
                fields.push(u64::from(*index));
                fields.push(self.opt_type_id(*superclass)?);
                for &ty in inherited {
                    fields.push(self.type_id(ty)?);
                }
            }
            DeclKind::AssociatedType { default, inherited } => {
                fields.push(self.opt_type_id(*default)?);
                for &ty in inherited {
                    fields.push(self.type_id(ty)?);
                }
            }
        }
        self.record(u32::from(decl.tag() as u8), &fields)?;

        if let Some(generics) = decl.generics() {
            self.write_generic_param_list(generics)?;
        }
        for &conformance in decl.conformances() {
            self.write_normal_conformance(conformance)?;
        }
        Ok(())
    }

    /// `[extra, n_inherited, n_protocols, inherited..., protocols...,
    /// members...]` for structs, classes and enums.
    fn nominal_fields(
        &mut self,
        fields: &mut Vec<u64>,
        nominal: &NominalData,
        extra: Option<TypeId>,
    ) -> Result<(), SerializeError> {
        fields.push(self.opt_type_id(extra)?);
        fields.push(nominal.inherited.len() as u64);
        fields.push(nominal.conformances.len() as u64);
        for &ty in &nominal.inherited {
            fields.push(self.type_id(ty)?);
        }
        self.conformance_protocols(fields, &nominal.conformances)?;
        for &m in &nominal.members {
            fields.push(self.decl_id(m)?);
        }
        Ok(())
    }

    /// Protocols of declared conformances, in declaration order. The
    /// reader allocates conformance shells from these before it reads any
    /// member.
    fn conformance_protocols(
        &mut self,
        fields: &mut Vec<u64>,
        conformances: &[ConformanceId],
    ) -> Result<(), SerializeError> {
        let ctx = self.ctx;
        for &c in conformances {
            let protocol = ctx.conformance_protocol(c);
            fields.push(self.opt_decl_id(protocol)?);
        }
        Ok(())
    }

    /// `[overridden, params...]` shared by functions and constructors.
    fn func_tail(&mut self, fields: &mut Vec<u64>, func: &FuncData) -> Result<(), SerializeError> {
        fields.push(self.opt_decl_id(func.overridden)?);
        for &p in &func.params {
            fields.push(self.decl_id(p)?);
        }
        Ok(())
    }
}
