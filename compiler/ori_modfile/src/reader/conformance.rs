//! Conformances, substitutions and generic requirements.

use ori_sema::{
    ConformanceId, ConformanceRef, ConformanceState, DeclId, Requirement, Substitution,
    TypeWitness, ValueWitness,
};
use tracing::trace;

use crate::format::{common, requirement_kind};
use crate::module_file::{IndexKind, Section};
use crate::LoadError;

use super::ReadSession;

impl ReadSession<'_> {
    /// Requirement records up to and including `LAST_GENERIC_REQUIREMENT`.
    pub(crate) fn read_requirements(
        &mut self,
        file: usize,
        section: Section,
    ) -> Result<Vec<Requirement>, LoadError> {
        let mut requirements = Vec::new();
        loop {
            let mut f = self.record(file, section)?;
            match f.code() {
                common::LAST_GENERIC_REQUIREMENT => return Ok(requirements),
                common::GENERIC_REQUIREMENT => {
                    let kind = f.next()?;
                    let first = self.resolve_type(file, f.next()?)?;
                    let second = f.next()?;
                    requirements.push(match kind {
                        requirement_kind::CONFORMANCE => Requirement::Conformance {
                            subject: first,
                            constraint: self.resolve_type(file, second)?,
                        },
                        requirement_kind::SAME_TYPE => Requirement::SameType {
                            first,
                            second: self.resolve_type(file, second)?,
                        },
                        requirement_kind::WITNESS_MARKER => {
                            Requirement::WitnessMarker { ty: first }
                        }
                        other => {
                            return Err(f.malformed(format!("unknown requirement kind {other}")));
                        }
                    });
                }
                code => {
                    return Err(f.malformed(format!(
                        "expected a generic requirement, found record {code}"
                    )));
                }
            }
        }
    }

    /// One conformance reference at the cursor of `section`.
    pub(crate) fn read_conformance_ref(
        &mut self,
        file: usize,
        section: Section,
    ) -> Result<ConformanceRef, LoadError> {
        let mut f = self.record(file, section)?;
        match f.code() {
            common::ABSTRACT_CONFORMANCE => Ok(ConformanceRef::Abstract {
                protocol: self.resolve_decl(file, f.next()?)?,
            }),
            common::CONFORMANCE_XREF => {
                let protocol = f.next()?;
                let nominal = f.next()?;
                let module = f.next()?;
                self.lookup_normal(file, protocol, nominal, module)
                    .map(ConformanceRef::Concrete)
            }
            common::SPECIALIZED_CONFORMANCE => {
                let protocol = f.next()?;
                let ty = self.resolve_type(file, f.next()?)?;
                let n_substitutions = f.next()?;
                let inline = f.next_bool()?;
                let nominal = f.next()?;
                let module = f.next()?;
                let mut substitutions = Vec::new();
                for _ in 0..n_substitutions {
                    substitutions.push(self.read_substitution(file, section)?);
                }
                let generic = self.underlying(file, section, inline, protocol, nominal, module)?;
                Ok(ConformanceRef::Concrete(self.ctx.specialized_conformance(
                    ty,
                    generic,
                    substitutions,
                )))
            }
            common::INHERITED_CONFORMANCE => {
                let protocol = f.next()?;
                let ty = self.resolve_type(file, f.next()?)?;
                let inline = f.next_bool()?;
                let nominal = f.next()?;
                let module = f.next()?;
                let from = self.underlying(file, section, inline, protocol, nominal, module)?;
                Ok(ConformanceRef::Concrete(
                    self.ctx.inherited_conformance(ty, from),
                ))
            }
            code => Err(f.malformed(format!("record {code} is not a conformance"))),
        }
    }

    /// The conformance a derived conformance wraps: either the next
    /// reference in the stream or a normal conformance named by identity.
    fn underlying(
        &mut self,
        file: usize,
        section: Section,
        inline: bool,
        protocol: u64,
        nominal: u64,
        module: u64,
    ) -> Result<ConformanceId, LoadError> {
        if inline {
            return match self.read_conformance_ref(file, section)? {
                ConformanceRef::Concrete(id) => Ok(id),
                ConformanceRef::Abstract { .. } => {
                    Err(self.malformed(file, "derived conformance wraps an abstract one"))
                }
            };
        }
        self.lookup_normal(file, protocol, nominal, module)
    }

    pub(crate) fn read_substitution(
        &mut self,
        file: usize,
        section: Section,
    ) -> Result<Substitution, LoadError> {
        let mut f = self.expect(file, section, common::SUBSTITUTION)?;
        let placeholder = self.resolve_type(file, f.next()?)?;
        let replacement = self.resolve_type(file, f.next()?)?;
        let count = f.next()?;
        let mut conformances = Vec::new();
        for _ in 0..count {
            conformances.push(self.read_conformance_ref(file, section)?);
        }
        Ok(Substitution {
            placeholder,
            replacement,
            conformances,
        })
    }

    /// The normal conformance of `nominal` to `protocol` declared in the
    /// module `module_ref` names. Conformances declared by extensions are
    /// found by loading the declaring module's extensions of the nominal.
    pub(crate) fn lookup_normal(
        &mut self,
        file: usize,
        protocol: u64,
        nominal: u64,
        module_ref: u64,
    ) -> Result<ConformanceId, LoadError> {
        let protocol = self.resolve_decl(file, protocol)?;
        let nominal = self.resolve_decl(file, nominal)?;
        let target = self.module_ref(file, module_ref)?;
        let module = self.module_of(target)?;
        if let Some(found) = self.ctx.find_normal_conformance(nominal, protocol, Some(module)) {
            return Ok(found);
        }
        self.load_extensions_of(target, nominal)?;
        self.ctx
            .find_normal_conformance(nominal, protocol, Some(module))
            .ok_or_else(|| {
                self.malformed(
                    file,
                    format!(
                        "no conformance of {} to {} in module {}",
                        self.ctx.decl_name(nominal),
                        self.ctx.decl_name(protocol),
                        self.files[target].name
                    ),
                )
            })
    }

    /// Shells of every extension of `nominal` that `file` declares.
    pub(crate) fn load_extensions_of(
        &mut self,
        file: usize,
        nominal: DeclId,
    ) -> Result<(), LoadError> {
        let tag = self.ctx.decl(nominal).tag() as u8;
        let entries = self.files[file]
            .index_entries(IndexKind::Extensions, self.ctx.decl_name(nominal))?;
        for entry in entries {
            if entry.disambiguator != tag {
                continue;
            }
            let ext = self.resolve_decl(file, u64::from(entry.id))?;
            trace!(
                module = %self.files[file].name,
                nominal = self.ctx.decl_name(nominal),
                ext = ext.raw(),
                "loaded extension"
            );
        }
        Ok(())
    }

    /// Fill in a normal conformance shell from the `NORMAL_CONFORMANCE`
    /// group at the decls cursor.
    pub(crate) fn read_normal_conformance(
        &mut self,
        file: usize,
        conformance: ConformanceId,
    ) -> Result<(), LoadError> {
        let mut f = self.expect(file, Section::Decls, common::NORMAL_CONFORMANCE)?;
        let protocol = self.resolve_decl(file, f.next()?)?;
        let expected = self.ctx.normal_conformance(conformance).map(|n| n.protocol);
        if expected != Some(protocol) {
            return Err(f.malformed("conformance record does not match its declaration"));
        }
        let conforming_type = self.opt_type(file, f.next()?)?;
        let n_value = f.next()?;
        let n_type = f.next()?;
        let n_inherited = f.next()?;
        let n_defaulted = f.next()?;

        let mut value_heads = Vec::new();
        for _ in 0..n_value {
            let requirement = self.resolve_decl(file, f.next()?)?;
            let witness = self.opt_decl(file, f.next()?)?;
            let n_subs = f.next()?;
            value_heads.push((requirement, witness, n_subs));
        }
        let assocs = f.take(n_type)?;
        let assocs = self.resolve_decls(file, &assocs)?;
        let inherited_protocols = f.take(n_inherited)?;
        let inherited_protocols = self.resolve_decls(file, &inherited_protocols)?;
        let defaulted = f.take(n_defaulted)?;
        let defaulted = self.resolve_decls(file, &defaulted)?;

        let mut inherited = Vec::with_capacity(inherited_protocols.len());
        for protocol in inherited_protocols {
            match self.read_conformance_ref(file, Section::Decls)? {
                ConformanceRef::Concrete(id) => inherited.push((protocol, id)),
                ConformanceRef::Abstract { .. } => {
                    return Err(f.malformed("inherited conformance is abstract"));
                }
            }
        }
        let mut value_witnesses = Vec::with_capacity(value_heads.len());
        for (requirement, witness, n_subs) in value_heads {
            let mut substitutions = Vec::new();
            for _ in 0..n_subs {
                substitutions.push(self.read_substitution(file, Section::Decls)?);
            }
            value_witnesses.push(ValueWitness {
                requirement,
                witness,
                substitutions,
            });
        }
        let mut type_witnesses = Vec::with_capacity(assocs.len());
        for assoc in assocs {
            type_witnesses.push(TypeWitness {
                assoc,
                substitution: self.read_substitution(file, Section::Decls)?,
            });
        }

        let Some(normal) = self.ctx.normal_conformance_mut(conformance) else {
            return Err(f.malformed("conformance shell is not a normal conformance"));
        };
        normal.conforming_type = conforming_type;
        normal.value_witnesses = value_witnesses;
        normal.type_witnesses = type_witnesses;
        normal.inherited = inherited;
        normal.defaulted = defaulted;
        normal.state = ConformanceState::Complete;
        Ok(())
    }
}
