//! Type records.

use ori_sema::{
    ArchetypeData, BuiltinType, FunctionFlags, GenericSignature, IrConvention, IrParam,
    MetatypeRepr, Ownership, ParamConvention, TupleElement, TypeId, TypeKind,
};

use crate::format::{table_index, type_code};
use crate::module_file::{Section, Slot};
use crate::{ensure_sufficient_stack, LoadError};

use super::{Fields, ReadSession};

impl ReadSession<'_> {
    pub(crate) fn resolve_type(&mut self, file: usize, id: u64) -> Result<TypeId, LoadError> {
        let Some(index) = table_index(id) else {
            return Err(self.reject(file, "type id 0".to_owned()));
        };
        let offset = match self.files[file].types.get(index) {
            Some(Slot::Ready(ty)) => return Ok(*ty),
            Some(Slot::InProgress) => {
                return Err(self.malformed(file, format!("cyclic type {id}")));
            }
            Some(Slot::Unread(offset)) => *offset,
            None => return Err(self.reject(file, format!("type {id} is out of range"))),
        };
        self.files[file].types[index] = Slot::InProgress;
        let result = ensure_sufficient_stack(|| {
            self.with_cursor_at(file, Section::Decls, offset, |s| s.read_type(file, index))
        });
        match &result {
            Ok(ty) => self.files[file].types[index] = Slot::Ready(*ty),
            Err(err) => {
                if self.files[file].types[index] == Slot::InProgress {
                    self.files[file].types[index] = Slot::Unread(offset);
                }
                self.poison(file, err);
            }
        }
        result
    }

    pub(crate) fn opt_type(&mut self, file: usize, id: u64) -> Result<Option<TypeId>, LoadError> {
        if id == 0 {
            return Ok(None);
        }
        self.resolve_type(file, id).map(Some)
    }

    pub(crate) fn resolve_types(
        &mut self,
        file: usize,
        ids: &[u64],
    ) -> Result<Vec<TypeId>, LoadError> {
        ids.iter().map(|&id| self.resolve_type(file, id)).collect()
    }

    fn read_type(&mut self, file: usize, index: usize) -> Result<TypeId, LoadError> {
        let mut f = self.record(file, Section::Decls)?;
        let kind = match f.code() {
            type_code::BUILTIN => {
                let kind = f.next()?;
                let width = u16::try_from(f.next()?)
                    .map_err(|_| f.malformed("builtin width is out of range"))?;
                TypeKind::Builtin(match kind {
                    0 => BuiltinType::Integer { width },
                    1 => BuiltinType::Float { width },
                    2 => BuiltinType::Word,
                    3 => BuiltinType::RawPointer,
                    4 => BuiltinType::NativeObject,
                    5 => BuiltinType::UnknownObject,
                    other => return Err(f.malformed(format!("unknown builtin type {other}"))),
                })
            }
            type_code::NOMINAL => TypeKind::Nominal {
                decl: self.resolve_decl(file, f.next()?)?,
                parent: self.opt_type(file, f.next()?)?,
            },
            type_code::BOUND_GENERIC => TypeKind::BoundGeneric {
                decl: self.resolve_decl(file, f.next()?)?,
                parent: self.opt_type(file, f.next()?)?,
                args: self.resolve_types(file, &f.rest())?,
            },
            type_code::TUPLE => {
                let mut elements = Vec::new();
                for (name, ty) in f.rest_pairs()? {
                    elements.push(TupleElement {
                        name: self.ident(file, name)?,
                        ty: self.resolve_type(file, ty)?,
                    });
                }
                TypeKind::Tuple(elements)
            }
            type_code::FUNCTION => TypeKind::Function {
                input: self.resolve_type(file, f.next()?)?,
                result: self.resolve_type(file, f.next()?)?,
                flags: FunctionFlags::from_bits_truncate(f.next_u8("function flags")?),
            },
            type_code::GENERIC_FUNCTION => {
                let input = self.resolve_type(file, f.next()?)?;
                let result = self.resolve_type(file, f.next()?)?;
                let flags = FunctionFlags::from_bits_truncate(f.next_u8("function flags")?);
                let params = self.resolve_types(file, &f.rest())?;
                let requirements = self.read_requirements(file, Section::Decls)?;
                TypeKind::GenericFunction {
                    signature: GenericSignature {
                        params,
                        requirements,
                    },
                    input,
                    result,
                    flags,
                }
            }
            type_code::METATYPE => {
                let instance = self.resolve_type(file, f.next()?)?;
                let raw = f.next_u8("metatype representation")?;
                TypeKind::Metatype {
                    instance,
                    repr: MetatypeRepr::from_raw(raw).ok_or_else(|| {
                        f.malformed(format!("unknown metatype representation {raw}"))
                    })?,
                }
            }
            type_code::ARCHETYPE => return self.read_archetype(file, index, f),
            type_code::GENERIC_PARAM => TypeKind::GenericParam {
                decl: self.resolve_decl(file, f.next()?)?,
                depth: f.next_u32("generic parameter depth")?,
                index: f.next_u32("generic parameter index")?,
            },
            type_code::DEPENDENT_MEMBER => TypeKind::DependentMember {
                base: self.resolve_type(file, f.next()?)?,
                assoc: self.resolve_decl(file, f.next()?)?,
            },
            type_code::PROTOCOL_COMPOSITION => {
                TypeKind::ProtocolComposition(self.resolve_types(file, &f.rest())?)
            }
            type_code::REFERENCE_STORAGE => {
                let raw = f.next_u8("ownership")?;
                let ownership = Ownership::from_raw(raw)
                    .ok_or_else(|| f.malformed(format!("unknown ownership {raw}")))?;
                TypeKind::ReferenceStorage {
                    ownership,
                    referent: self.resolve_type(file, f.next()?)?,
                }
            }
            type_code::IR_FUNCTION => {
                let raw = f.next_u8("calling convention")?;
                let convention = IrConvention::from_raw(raw)
                    .ok_or_else(|| f.malformed(format!("unknown calling convention {raw}")))?;
                let result = self.resolve_type(file, f.next()?)?;
                let mut params = Vec::new();
                for (ty, raw) in f.rest_pairs()? {
                    let convention = u8::try_from(raw)
                        .ok()
                        .and_then(ParamConvention::from_raw)
                        .ok_or_else(|| f.malformed(format!("unknown parameter convention {raw}")))?;
                    params.push(IrParam {
                        ty: self.resolve_type(file, ty)?,
                        convention,
                    });
                }
                TypeKind::IrFunction {
                    convention,
                    params,
                    result,
                }
            }
            type_code::ARRAY_SLICE => TypeKind::ArraySlice(self.resolve_type(file, f.next()?)?),
            type_code::OPTIONAL => TypeKind::Optional(self.resolve_type(file, f.next()?)?),
            type_code::SUBSTITUTED => TypeKind::Substituted {
                original: self.resolve_type(file, f.next()?)?,
                replacement: self.resolve_type(file, f.next()?)?,
            },
            code => return Err(f.malformed(format!("record {code} is not a type"))),
        };
        Ok(self.ctx.intern_type(kind))
    }

    /// Archetypes may refer to themselves through their nested types, so the
    /// identity is allocated and published before any field is resolved.
    fn read_archetype(
        &mut self,
        file: usize,
        index: usize,
        mut f: Fields,
    ) -> Result<TypeId, LoadError> {
        let ty = self.ctx.alloc_archetype(ArchetypeData::default());
        self.files[file].types[index] = Slot::Ready(ty);

        let name = self.ident(file, f.next()?)?;
        let has_index = f.next_bool()?;
        let position = f.next_u32("archetype index")?;
        let parent = self.opt_type(file, f.next()?)?;
        let assoc = self.opt_decl(file, f.next()?)?;
        let superclass = self.opt_type(file, f.next()?)?;
        let n_protocols = f.next()?;
        let protocols = f.take(n_protocols)?;
        let conforms_to = self.resolve_decls(file, &protocols)?;
        let mut nested = Vec::new();
        for (name, ty) in f.rest_pairs()? {
            nested.push((self.ident(file, name)?, self.resolve_type(file, ty)?));
        }

        let data = ArchetypeData {
            name,
            index: has_index.then_some(position),
            parent,
            assoc,
            superclass,
            conforms_to,
            nested,
        };
        match self.ctx.archetype_mut(ty) {
            Some(slot) => *slot = data,
            None => return Err(f.malformed("archetype identity was replaced")),
        }
        Ok(ty)
    }
}
