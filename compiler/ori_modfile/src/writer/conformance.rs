//! Conformance, substitution and generic-requirement records.
//!
//! These records are shared by the decls block and the IR block, so they
//! go through [`ModuleWriter::record`], which picks the abbreviation of
//! whichever block is open.

use ori_sema::{
    Conformance, ConformanceId, ConformanceRef, GenericParamList, Requirement, Substitution,
};

use crate::format::{common, requirement_kind};
use crate::SerializeError;

use super::ModuleWriter;

impl ModuleWriter<'_> {
    /// `GENERIC_PARAM_LIST`, the requirements, `LAST_GENERIC_REQUIREMENT`.
    pub(super) fn write_generic_param_list(
        &mut self,
        generics: &GenericParamList,
    ) -> Result<(), SerializeError> {
        let params = generics
            .params
            .iter()
            .map(|&p| self.decl_id(p))
            .collect::<Result<Vec<_>, _>>()?;
        self.record(common::GENERIC_PARAM_LIST, &params)?;
        self.write_requirements(&generics.requirements)
    }

    /// Requirement records terminated by `LAST_GENERIC_REQUIREMENT`.
    pub(super) fn write_requirements(
        &mut self,
        requirements: &[Requirement],
    ) -> Result<(), SerializeError> {
        for req in requirements {
            let fields = match *req {
                Requirement::Conformance {
                    subject,
                    constraint,
                } => [
                    requirement_kind::CONFORMANCE,
                    self.type_id(subject)?,
                    self.type_id(constraint)?,
                ],
                Requirement::SameType { first, second } => [
                    requirement_kind::SAME_TYPE,
                    self.type_id(first)?,
                    self.type_id(second)?,
                ],
                Requirement::WitnessMarker { ty } => {
                    [requirement_kind::WITNESS_MARKER, self.type_id(ty)?, 0]
                }
            };
            self.record(common::GENERIC_REQUIREMENT, &fields)?;
        }
        self.record(common::LAST_GENERIC_REQUIREMENT, &[])
    }

    /// Full contents of a normal conformance, trailing its declaring
    /// declaration.
    ///
    /// ```text
    /// NORMAL_CONFORMANCE [protocol, type, n_value, n_type, n_inherited,
    ///                     n_defaulted,
    ///                     (requirement, witness, n_substitutions)...,
    ///                     assoc..., inherited_protocol..., defaulted...]
    /// inherited conformance refs      (n_inherited)
    /// value witness substitutions     (sum of n_substitutions)
    /// type witness substitutions      (n_type)
    /// ```
    pub(super) fn write_normal_conformance(
        &mut self,
        id: ConformanceId,
    ) -> Result<(), SerializeError> {
        let ctx = self.ctx;
        let Some(normal) = ctx.normal_conformance(id) else {
            return Ok(());
        };
        let mut fields = vec![
            self.decl_id(normal.protocol)?,
            self.opt_type_id(normal.conforming_type)?,
            normal.value_witnesses.len() as u64,
            normal.type_witnesses.len() as u64,
            normal.inherited.len() as u64,
            normal.defaulted.len() as u64,
        ];
        for witness in &normal.value_witnesses {
            fields.push(self.decl_id(witness.requirement)?);
            fields.push(self.opt_decl_id(witness.witness)?);
            fields.push(witness.substitutions.len() as u64);
        }
        for witness in &normal.type_witnesses {
            fields.push(self.decl_id(witness.assoc)?);
        }
        for &(protocol, _) in &normal.inherited {
            fields.push(self.decl_id(protocol)?);
        }
        for &d in &normal.defaulted {
            fields.push(self.decl_id(d)?);
        }
        self.record(common::NORMAL_CONFORMANCE, &fields)?;

        for &(_, inherited) in &normal.inherited {
            self.write_conformance_ref(ConformanceRef::Concrete(inherited))?;
        }
        for witness in &normal.value_witnesses {
            for sub in &witness.substitutions {
                self.write_substitution(sub)?;
            }
        }
        for witness in &normal.type_witnesses {
            self.write_substitution(&witness.substitution)?;
        }
        Ok(())
    }

    /// A reference to a conformance from anywhere other than its declaring
    /// context.
    ///
    /// Normal conformances are written by identity (protocol, nominal,
    /// module). Derived conformances carry a one-bit `inline` field: 0 when
    /// the wrapped conformance is normal and identified by the record's
    /// nominal and module fields, 1 when the wrapped conformance follows as
    /// its own reference.
    pub(super) fn write_conformance_ref(
        &mut self,
        conformance: ConformanceRef,
    ) -> Result<(), SerializeError> {
        let id = match conformance {
            ConformanceRef::Abstract { protocol } => {
                let protocol = self.decl_id(protocol)?;
                return self.record(common::ABSTRACT_CONFORMANCE, &[protocol]);
            }
            ConformanceRef::Concrete(id) => id,
        };
        let ctx = self.ctx;
        let protocol = self.opt_decl_id(ctx.conformance_protocol(id))?;
        match ctx.conformance(id) {
            Conformance::Normal(normal) => {
                let nominal = self.decl_id(normal.nominal)?;
                let module = self.module_ref(normal.module, normal.nominal)?;
                self.record(common::CONFORMANCE_XREF, &[protocol, nominal, module])
            }
            Conformance::Specialized {
                ty,
                generic,
                substitutions,
            } => {
                let ty = self.type_id(*ty)?;
                let (inline, nominal, module) = self.underlying_fields(*generic)?;
                self.record(
                    common::SPECIALIZED_CONFORMANCE,
                    &[
                        protocol,
                        ty,
                        substitutions.len() as u64,
                        u64::from(inline),
                        nominal,
                        module,
                    ],
                )?;
                for sub in substitutions {
                    self.write_substitution(sub)?;
                }
                if inline {
                    self.write_conformance_ref(ConformanceRef::Concrete(*generic))?;
                }
                Ok(())
            }
            Conformance::Inherited { ty, inherited_from } => {
                let ty = self.type_id(*ty)?;
                let (inline, nominal, module) = self.underlying_fields(*inherited_from)?;
                self.record(
                    common::INHERITED_CONFORMANCE,
                    &[protocol, ty, u64::from(inline), nominal, module],
                )?;
                if inline {
                    self.write_conformance_ref(ConformanceRef::Concrete(*inherited_from))?;
                }
                Ok(())
            }
        }
    }

    /// `(inline, nominal, module)` for the conformance a derived one wraps.
    fn underlying_fields(
        &mut self,
        underlying: ConformanceId,
    ) -> Result<(bool, u64, u64), SerializeError> {
        let ctx = self.ctx;
        match ctx.normal_conformance(underlying) {
            Some(normal) => Ok((
                false,
                self.decl_id(normal.nominal)?,
                self.module_ref(normal.module, normal.nominal)?,
            )),
            None => Ok((true, 0, 0)),
        }
    }

    /// `SUBSTITUTION [placeholder, replacement, n]` and `n` conformance
    /// references.
    pub(super) fn write_substitution(&mut self, sub: &Substitution) -> Result<(), SerializeError> {
        let placeholder = self.type_id(sub.placeholder)?;
        let replacement = self.type_id(sub.replacement)?;
        self.record(
            common::SUBSTITUTION,
            &[placeholder, replacement, sub.conformances.len() as u64],
        )?;
        for &conformance in &sub.conformances {
            self.write_conformance_ref(conformance)?;
        }
        Ok(())
    }
}
