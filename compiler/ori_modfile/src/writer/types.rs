//! Type records.

use ori_sema::{BuiltinType, TypeId, TypeKind};

use crate::format::type_code;
use crate::SerializeError;

use super::ModuleWriter;

/// `[kind, width]` of a builtin type.
fn builtin_fields(builtin: BuiltinType) -> [u64; 2] {
    match builtin {
        BuiltinType::Integer { width } => [0, u64::from(width)],
        BuiltinType::Float { width } => [1, u64::from(width)],
        BuiltinType::Word => [2, 0],
        BuiltinType::RawPointer => [3, 0],
        BuiltinType::NativeObject => [4, 0],
        BuiltinType::UnknownObject => [5, 0],
    }
}

impl ModuleWriter<'_> {
    pub(super) fn write_type(&mut self, id: TypeId) -> Result<(), SerializeError> {
        let ctx = self.ctx;
        let (code, fields) = match ctx.ty(id) {
            TypeKind::Builtin(builtin) => (type_code::BUILTIN, builtin_fields(*builtin).to_vec()),
            TypeKind::Nominal { decl, parent } => (
                type_code::NOMINAL,
                vec![self.decl_id(*decl)?, self.opt_type_id(*parent)?],
            ),
            TypeKind::BoundGeneric { decl, parent, args } => {
                let mut fields = vec![self.decl_id(*decl)?, self.opt_type_id(*parent)?];
                for &arg in args {
                    fields.push(self.type_id(arg)?);
                }
                (type_code::BOUND_GENERIC, fields)
            }
            TypeKind::Tuple(elements) => {
                let mut fields = Vec::with_capacity(elements.len() * 2);
                for element in elements {
                    fields.push(self.ident(element.name)?);
                    fields.push(self.type_id(element.ty)?);
                }
                (type_code::TUPLE, fields)
            }
            TypeKind::Function {
                input,
                result,
                flags,
            } => (
                type_code::FUNCTION,
                vec![
                    self.type_id(*input)?,
                    self.type_id(*result)?,
                    u64::from(flags.bits()),
                ],
            ),
            TypeKind::GenericFunction {
                signature,
                input,
                result,
                flags,
            } => {
                let mut fields = vec![
                    self.type_id(*input)?,
                    self.type_id(*result)?,
                    u64::from(flags.bits()),
                ];
                for &param in &signature.params {
                    fields.push(self.type_id(param)?);
                }
                self.record(type_code::GENERIC_FUNCTION, &fields)?;
                return self.write_requirements(&signature.requirements);
            }
            TypeKind::Metatype { instance, repr } => (
                type_code::METATYPE,
                vec![self.type_id(*instance)?, *repr as u64],
            ),
            TypeKind::Archetype(data) => {
                let mut fields = vec![
                    self.ident(data.name)?,
                    u64::from(data.index.is_some()),
                    u64::from(data.index.unwrap_or(0)),
                    self.opt_type_id(data.parent)?,
                    self.opt_decl_id(data.assoc)?,
                    self.opt_type_id(data.superclass)?,
                    data.conforms_to.len() as u64,
                ];
                for &protocol in &data.conforms_to {
                    fields.push(self.decl_id(protocol)?);
                }
                for &(name, nested) in &data.nested {
                    fields.push(self.ident(name)?);
                    fields.push(self.type_id(nested)?);
                }
                (type_code::ARCHETYPE, fields)
            }
            TypeKind::GenericParam { decl, depth, index } => (
                type_code::GENERIC_PARAM,
                vec![self.decl_id(*decl)?, u64::from(*depth), u64::from(*index)],
            ),
            TypeKind::DependentMember { base, assoc } => (
                type_code::DEPENDENT_MEMBER,
                vec![self.type_id(*base)?, self.decl_id(*assoc)?],
            ),
            TypeKind::ProtocolComposition(protocols) => (
                type_code::PROTOCOL_COMPOSITION,
                protocols
                    .iter()
                    .map(|&p| self.type_id(p))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            TypeKind::ReferenceStorage {
                ownership,
                referent,
            } => (
                type_code::REFERENCE_STORAGE,
                vec![*ownership as u64, self.type_id(*referent)?],
            ),
            TypeKind::IrFunction {
                convention,
                params,
                result,
            } => {
                let mut fields = vec![*convention as u64, self.type_id(*result)?];
                for param in params {
                    fields.push(self.type_id(param.ty)?);
                    fields.push(param.convention as u64);
                }
                (type_code::IR_FUNCTION, fields)
            }
            TypeKind::ArraySlice(element) => {
                (type_code::ARRAY_SLICE, vec![self.type_id(*element)?])
            }
            TypeKind::Optional(wrapped) => (type_code::OPTIONAL, vec![self.type_id(*wrapped)?]),
            TypeKind::Substituted {
                original,
                replacement,
            } => (
                type_code::SUBSTITUTED,
                vec![self.type_id(*original)?, self.type_id(*replacement)?],
            ),
        };
        self.record(code, &fields)
    }
}
