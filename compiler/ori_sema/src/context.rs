//! The semantic context: arenas for every entity plus the builder API.
//!
//! # Construction discipline
//!
//! Entities are allocated first and populated afterwards. A declaration is
//! pushed with whatever is known about it and then completed through
//! [`SemaContext::decl_mut`]; a normal conformance starts as a
//! [`NormalConformance::shell`]; an archetype is allocated with
//! [`SemaContext::alloc_archetype`] and filled through
//! [`SemaContext::archetype_mut`]. Readers of cyclic graphs rely on this:
//! the identity exists before anything that might refer back to it is
//! built.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{
    ArchetypeData, Conformance, ConformanceId, Decl, DeclContext, DeclId, DeclKind, ModuleData,
    ModuleId, Name, NormalConformance, StringInterner, Substitution, TypeId, TypeKind,
};

/// Arena owner for modules, declarations, types and conformances.
pub struct SemaContext {
    interner: StringInterner,
    modules: Vec<ModuleData>,
    module_names: FxHashMap<Name, ModuleId>,
    decls: Vec<Decl>,
    types: Vec<TypeKind>,
    type_map: FxHashMap<TypeKind, TypeId>,
    conformances: Vec<Conformance>,
    /// Hash-consing map for specialized and inherited conformances.
    derived_conformances: FxHashMap<Conformance, ConformanceId>,
    /// Normal conformances by `(nominal, protocol)`.
    normal_index: FxHashMap<(DeclId, DeclId), SmallVec<[ConformanceId; 1]>>,
    /// Extensions by extended nominal.
    extensions: FxHashMap<DeclId, Vec<DeclId>>,
}

impl Default for SemaContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SemaContext {
    pub fn new() -> Self {
        SemaContext {
            interner: StringInterner::new(),
            modules: Vec::new(),
            module_names: FxHashMap::default(),
            decls: Vec::new(),
            types: Vec::new(),
            type_map: FxHashMap::default(),
            conformances: Vec::new(),
            derived_conformances: FxHashMap::default(),
            normal_index: FxHashMap::default(),
            extensions: FxHashMap::default(),
        }
    }

    // ── Names ───────────────────────────────────────────────────────

    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    /// Intern a string.
    pub fn intern(&mut self, s: &str) -> Name {
        self.interner.intern(s)
    }

    /// The string behind a name.
    pub fn name_str(&self, name: Name) -> &str {
        self.interner.lookup(name)
    }

    // ── Modules ─────────────────────────────────────────────────────

    /// Register a new module. The first module registered under a name is
    /// the one [`module_by_name`](Self::module_by_name) returns.
    pub fn add_module(&mut self, name: &str) -> ModuleId {
        let name = self.interner.intern(name);
        let id = ModuleId::from_len(self.modules.len());
        self.modules.push(ModuleData::new(name));
        self.module_names.entry(name).or_insert(id);
        id
    }

    pub fn module(&self, id: ModuleId) -> &ModuleData {
        &self.modules[id.index()]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut ModuleData {
        &mut self.modules[id.index()]
    }

    pub fn module_by_name(&self, name: Name) -> Option<ModuleId> {
        self.module_names.get(&name).copied()
    }

    /// Name of a module as a string.
    pub fn module_name(&self, id: ModuleId) -> &str {
        self.name_str(self.module(id).name)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    // ── Declarations ────────────────────────────────────────────────

    /// Allocate a declaration. Extensions whose extended type is already a
    /// nominal type are registered with that nominal.
    pub fn add_decl(&mut self, decl: Decl) -> DeclId {
        let id = DeclId::from_len(self.decls.len());
        let is_extension = matches!(decl.kind, DeclKind::Extension(_));
        self.decls.push(decl);
        if is_extension {
            self.register_extension(id);
        }
        id
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.index()]
    }

    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }

    /// Name of a declaration as a string.
    pub fn decl_name(&self, id: DeclId) -> &str {
        self.name_str(self.decl(id).name)
    }

    /// Append `decl` to the module's top-level declarations.
    pub fn add_top_level(&mut self, module: ModuleId, decl: DeclId) {
        self.module_mut(module).top_level.push(decl);
    }

    /// Append `member` to `parent`'s member list. Returns `false` if
    /// `parent` cannot have members.
    pub fn add_member(&mut self, parent: DeclId, member: DeclId) -> bool {
        match self.decl_mut(parent).members_mut() {
            Some(members) => {
                members.push(member);
                true
            }
            None => false,
        }
    }

    /// The type a type declaration declares.
    ///
    /// Nested nominals get their enclosing type as parent; generic
    /// parameters become [`TypeKind::GenericParam`].
    pub fn declared_type(&mut self, decl: DeclId) -> TypeId {
        let parent = match self.decl(decl).context {
            DeclContext::Module(_) => None,
            DeclContext::Decl(outer) => {
                let outer_decl = self.decl(outer);
                if let DeclKind::Extension(ext) = &outer_decl.kind {
                    Some(ext.extended)
                } else if outer_decl.tag().is_nominal_type() {
                    Some(self.declared_type(outer))
                } else {
                    None
                }
            }
        };
        let kind = match self.decl(decl).kind {
            DeclKind::GenericTypeParam { depth, index, .. } => TypeKind::GenericParam {
                decl,
                depth,
                index,
            },
            _ => TypeKind::Nominal { decl, parent },
        };
        self.intern_type(kind)
    }

    // ── Extensions ──────────────────────────────────────────────────

    /// Record `ext` as an extension of its extended nominal. Idempotent.
    pub fn register_extension(&mut self, ext: DeclId) {
        let DeclKind::Extension(data) = &self.decl(ext).kind else {
            return;
        };
        let Some(nominal) = self.ty(data.extended).nominal_decl() else {
            return;
        };
        let list = self.extensions.entry(nominal).or_default();
        if !list.contains(&ext) {
            list.push(ext);
        }
    }

    /// Extensions of `nominal` known to this context.
    pub fn extensions_of(&self, nominal: DeclId) -> &[DeclId] {
        self.extensions.get(&nominal).map_or(&[], Vec::as_slice)
    }

    /// Members of `parent` named `name`.
    ///
    /// Without a module filter, this covers the declaration's own members
    /// and members of all known extensions. With a filter, only members of
    /// extensions declared in that module are considered.
    pub fn members_named(
        &self,
        parent: DeclId,
        name: Name,
        extension_module: Option<ModuleId>,
    ) -> Vec<DeclId> {
        let mut found = Vec::new();
        if extension_module.is_none() {
            found.extend(
                self.decl(parent)
                    .members()
                    .iter()
                    .copied()
                    .filter(|&m| self.decl(m).name == name),
            );
        }
        for &ext in self.extensions_of(parent) {
            if extension_module.is_some_and(|m| self.decl(ext).module != m) {
                continue;
            }
            found.extend(
                self.decl(ext)
                    .members()
                    .iter()
                    .copied()
                    .filter(|&m| self.decl(m).name == name),
            );
        }
        found
    }

    // ── Types ───────────────────────────────────────────────────────

    /// Hash-cons a type. Archetypes are never uniqued: passing one here
    /// allocates a fresh archetype.
    pub fn intern_type(&mut self, kind: TypeKind) -> TypeId {
        if let TypeKind::Archetype(data) = kind {
            return self.alloc_archetype(data);
        }
        if let Some(&id) = self.type_map.get(&kind) {
            return id;
        }
        let id = TypeId::from_len(self.types.len());
        self.types.push(kind.clone());
        self.type_map.insert(kind, id);
        id
    }

    /// Allocate a distinct archetype.
    pub fn alloc_archetype(&mut self, data: ArchetypeData) -> TypeId {
        let id = TypeId::from_len(self.types.len());
        self.types.push(TypeKind::Archetype(data));
        id
    }

    /// Mutable archetype payload, for populating an allocated archetype.
    pub fn archetype_mut(&mut self, id: TypeId) -> Option<&mut ArchetypeData> {
        match &mut self.types[id.index()] {
            TypeKind::Archetype(data) => Some(data),
            _ => None,
        }
    }

    pub fn ty(&self, id: TypeId) -> &TypeKind {
        &self.types[id.index()]
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// The nominal declaration behind a type, if any.
    pub fn nominal_of_type(&self, ty: TypeId) -> Option<DeclId> {
        self.ty(ty).nominal_decl()
    }

    // ── Conformances ────────────────────────────────────────────────

    /// Allocate a normal conformance and attach it to its declaring
    /// context.
    pub fn alloc_normal_conformance(&mut self, normal: NormalConformance) -> ConformanceId {
        let id = ConformanceId::from_len(self.conformances.len());
        let key = (normal.nominal, normal.protocol);
        let context = normal.context;
        self.conformances.push(Conformance::Normal(normal));
        self.normal_index.entry(key).or_default().push(id);
        if let Some(list) = self.decl_mut(context).conformances_mut() {
            list.push(id);
        }
        id
    }

    pub fn conformance(&self, id: ConformanceId) -> &Conformance {
        &self.conformances[id.index()]
    }

    pub fn conformance_count(&self) -> usize {
        self.conformances.len()
    }

    pub fn normal_conformance(&self, id: ConformanceId) -> Option<&NormalConformance> {
        self.conformance(id).as_normal()
    }

    pub fn normal_conformance_mut(&mut self, id: ConformanceId) -> Option<&mut NormalConformance> {
        match &mut self.conformances[id.index()] {
            Conformance::Normal(n) => Some(n),
            _ => None,
        }
    }

    /// Normal conformances of `nominal` to `protocol`, optionally limited
    /// to those declared in `module`.
    pub fn find_normal_conformance(
        &self,
        nominal: DeclId,
        protocol: DeclId,
        module: Option<ModuleId>,
    ) -> Option<ConformanceId> {
        self.normal_index
            .get(&(nominal, protocol))?
            .iter()
            .copied()
            .find(|&c| {
                module.map_or(true, |m| {
                    self.normal_conformance(c).is_some_and(|n| n.module == m)
                })
            })
    }

    /// Intern a specialized conformance.
    pub fn specialized_conformance(
        &mut self,
        ty: TypeId,
        generic: ConformanceId,
        substitutions: Vec<Substitution>,
    ) -> ConformanceId {
        self.intern_derived(Conformance::Specialized {
            ty,
            generic,
            substitutions,
        })
    }

    /// Intern an inherited conformance.
    pub fn inherited_conformance(
        &mut self,
        ty: TypeId,
        inherited_from: ConformanceId,
    ) -> ConformanceId {
        self.intern_derived(Conformance::Inherited { ty, inherited_from })
    }

    fn intern_derived(&mut self, conformance: Conformance) -> ConformanceId {
        if let Some(&id) = self.derived_conformances.get(&conformance) {
            return id;
        }
        let id = ConformanceId::from_len(self.conformances.len());
        self.conformances.push(conformance.clone());
        self.derived_conformances.insert(conformance, id);
        id
    }

    /// The normal conformance at the root of a chain of derived ones.
    pub fn root_conformance(&self, id: ConformanceId) -> ConformanceId {
        let mut current = id;
        while let Some(next) = self.conformance(current).underlying() {
            current = next;
        }
        current
    }

    /// Protocol a conformance is to.
    pub fn conformance_protocol(&self, id: ConformanceId) -> Option<DeclId> {
        self.normal_conformance(self.root_conformance(id))
            .map(|n| n.protocol)
    }

    /// Conforming type of a conformance.
    pub fn conformance_type(&self, id: ConformanceId) -> Option<TypeId> {
        match self.conformance(id) {
            Conformance::Normal(n) => n.conforming_type,
            Conformance::Specialized { ty, .. } | Conformance::Inherited { ty, .. } => Some(*ty),
        }
    }
}

#[cfg(test)]
mod tests;
