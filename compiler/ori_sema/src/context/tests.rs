use pretty_assertions::assert_eq;

use super::*;
use crate::{
    ConformanceRef, ConformanceState, DeclKindTag, ExtensionData, FuncData, NominalData,
    ProtocolData, TupleElement,
};

struct Fixture {
    ctx: SemaContext,
    module: ModuleId,
}

impl Fixture {
    fn new() -> Self {
        let mut ctx = SemaContext::new();
        let module = ctx.add_module("Shapes");
        Fixture { ctx, module }
    }

    fn top_level(&mut self, name: &str, kind: DeclKind) -> DeclId {
        let name = self.ctx.intern(name);
        let id = self
            .ctx
            .add_decl(Decl::new(name, DeclContext::Module(self.module), self.module, kind));
        self.ctx.add_top_level(self.module, id);
        id
    }

    fn member(&mut self, parent: DeclId, name: &str, kind: DeclKind) -> DeclId {
        let name = self.ctx.intern(name);
        let id = self
            .ctx
            .add_decl(Decl::new(name, DeclContext::Decl(parent), self.module, kind));
        assert!(self.ctx.add_member(parent, id));
        id
    }
}

#[test]
fn structural_types_are_hash_consed() {
    let mut f = Fixture::new();
    let int = f.ctx.intern_type(TypeKind::Builtin(crate::BuiltinType::Integer { width: 64 }));
    let label = f.ctx.intern("x");
    let tuple = || {
        TypeKind::Tuple(vec![TupleElement {
            name: label,
            ty: int,
        }])
    };
    let a = f.ctx.intern_type(tuple());
    let b = f.ctx.intern_type(tuple());
    assert_eq!(a, b);
    assert_eq!(f.ctx.type_count(), 2);
}

#[test]
fn archetypes_are_never_uniqued() {
    let mut f = Fixture::new();
    let name = f.ctx.intern("T");
    let data = ArchetypeData {
        name,
        index: Some(0),
        ..ArchetypeData::default()
    };
    let a = f.ctx.alloc_archetype(data.clone());
    let b = f.ctx.intern_type(TypeKind::Archetype(data));
    assert_ne!(a, b);

    let nested = f.ctx.intern("Element");
    f.ctx
        .archetype_mut(a)
        .unwrap_or_else(|| panic!("archetype expected"))
        .nested
        .push((nested, b));
    assert!(matches!(f.ctx.ty(a), TypeKind::Archetype(d) if d.nested == vec![(nested, b)]));
}

#[test]
fn declared_type_of_nested_nominal_has_parent() {
    let mut f = Fixture::new();
    let outer = f.top_level("Outer", DeclKind::Struct(NominalData::default()));
    let inner = f.member(outer, "Inner", DeclKind::Struct(NominalData::default()));
    let outer_ty = f.ctx.declared_type(outer);
    let inner_ty = f.ctx.declared_type(inner);
    assert_eq!(
        f.ctx.ty(inner_ty),
        &TypeKind::Nominal {
            decl: inner,
            parent: Some(outer_ty)
        }
    );
    assert_eq!(f.ctx.declared_type(inner), inner_ty);
}

#[test]
fn conformances_attach_to_context_and_are_found() {
    let mut f = Fixture::new();
    let proto = f.top_level("Shape", DeclKind::Protocol(ProtocolData::default()));
    let circle = f.top_level("Circle", DeclKind::Struct(NominalData::default()));
    let id = f
        .ctx
        .alloc_normal_conformance(NormalConformance::shell(proto, circle, circle, f.module));

    assert_eq!(f.ctx.decl(circle).conformances(), &[id]);
    assert_eq!(f.ctx.find_normal_conformance(circle, proto, None), Some(id));
    assert_eq!(
        f.ctx.find_normal_conformance(circle, proto, Some(f.module)),
        Some(id)
    );
    let other = f.ctx.add_module("Other");
    assert_eq!(f.ctx.find_normal_conformance(circle, proto, Some(other)), None);
    assert_eq!(
        f.ctx.normal_conformance(id).map(|n| n.state),
        Some(ConformanceState::Shell)
    );
}

#[test]
fn derived_conformances_are_interned_and_rooted() {
    let mut f = Fixture::new();
    let proto = f.top_level("Shape", DeclKind::Protocol(ProtocolData::default()));
    let boxed = f.top_level("Box", DeclKind::Struct(NominalData::default()));
    let normal = f
        .ctx
        .alloc_normal_conformance(NormalConformance::shell(proto, boxed, boxed, f.module));
    let box_ty = f.ctx.declared_type(boxed);
    let int = f.ctx.intern_type(TypeKind::Builtin(crate::BuiltinType::Word));
    let subs = vec![Substitution {
        placeholder: box_ty,
        replacement: int,
        conformances: vec![ConformanceRef::Abstract { protocol: proto }],
    }];

    let a = f.ctx.specialized_conformance(int, normal, subs.clone());
    let b = f.ctx.specialized_conformance(int, normal, subs);
    assert_eq!(a, b);

    let inherited = f.ctx.inherited_conformance(int, a);
    assert_eq!(f.ctx.root_conformance(inherited), normal);
    assert_eq!(f.ctx.conformance_protocol(inherited), Some(proto));
    assert_eq!(f.ctx.conformance_type(inherited), Some(int));
}

#[test]
fn extension_members_are_visible_through_members_named() {
    let mut f = Fixture::new();
    let circle = f.top_level("Circle", DeclKind::Struct(NominalData::default()));
    let area = f.member(circle, "area", DeclKind::Func(FuncData::default()));
    let circle_ty = f.ctx.declared_type(circle);

    let other = f.ctx.add_module("Geometry");
    let ext = f.ctx.add_decl(Decl::new(
        Name::EMPTY,
        DeclContext::Module(other),
        other,
        DeclKind::Extension(ExtensionData {
            extended: circle_ty,
            generics: None,
            inherited: Vec::new(),
            members: Vec::new(),
            conformances: Vec::new(),
        }),
    ));
    let name = f.ctx.intern("area");
    let ext_area = f.ctx.add_decl(Decl::new(
        name,
        DeclContext::Decl(ext),
        other,
        DeclKind::Func(FuncData::default()),
    ));
    f.ctx.add_member(ext, ext_area);

    assert_eq!(f.ctx.extensions_of(circle), &[ext]);
    f.ctx.register_extension(ext);
    assert_eq!(f.ctx.extensions_of(circle), &[ext]);

    assert_eq!(f.ctx.members_named(circle, name, None), vec![area, ext_area]);
    assert_eq!(f.ctx.members_named(circle, name, Some(other)), vec![ext_area]);
    assert_eq!(
        f.ctx.members_named(circle, name, Some(f.module)),
        Vec::<DeclId>::new()
    );
}

#[test]
fn decl_tags_round_trip_through_raw() {
    for raw in 1..=18u8 {
        let tag = DeclKindTag::from_raw(raw).unwrap_or_else(|| panic!("tag {raw}"));
        assert_eq!(tag as u8, raw);
    }
    assert_eq!(DeclKindTag::from_raw(0), None);
    assert_eq!(DeclKindTag::from_raw(19), None);
}

#[test]
fn module_lookup_by_name() {
    let mut f = Fixture::new();
    let name = f.ctx.intern("Shapes");
    assert_eq!(f.ctx.module_by_name(name), Some(f.module));
    assert_eq!(f.ctx.module_name(f.module), "Shapes");
    let missing = f.ctx.intern("Nope");
    assert_eq!(f.ctx.module_by_name(missing), None);
}
