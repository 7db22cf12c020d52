//! The IR module: functions, globals, vtables and witness tables, each with
//! a by-key lookup table.

use ori_sema::{ConformanceId, ConformanceRef, DeclId, Name, TypeId};
use rustc_hash::FxHashMap;

use crate::{FuncId, GlobalId, Linkage, TirFunction, VTableId, WitnessTableId};

/// A global variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TirGlobal {
    pub name: Name,
    pub linkage: Linkage,
    pub ty: TypeId,
    /// Source variable declaration, if any.
    pub decl: Option<DeclId>,
}

/// One vtable slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VTableEntry {
    pub method: DeclId,
    pub func: FuncId,
}

/// Dynamic-dispatch table of a class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VTable {
    pub class: DeclId,
    pub entries: Vec<VTableEntry>,
}

/// One witness-table slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WitnessEntry {
    /// Implementation of a protocol requirement. `None` if the
    /// implementation was not serialized.
    Method {
        requirement: DeclId,
        func: Option<FuncId>,
    },
    /// Conformance to an inherited protocol.
    Base {
        protocol: DeclId,
        conformance: ConformanceId,
    },
    AssociatedType {
        assoc: DeclId,
        ty: TypeId,
    },
    /// Conformance of an associated type to one of its protocols.
    AssociatedProtocol {
        assoc: DeclId,
        protocol: DeclId,
        conformance: ConformanceRef,
    },
}

/// Persisted table of implementations satisfying a normal conformance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessTable {
    pub conformance: ConformanceId,
    pub linkage: Linkage,
    pub entries: Vec<WitnessEntry>,
}

/// All IR known to one compilation.
#[derive(Clone, Debug, Default)]
pub struct TirModule {
    functions: Vec<TirFunction>,
    function_names: FxHashMap<Name, FuncId>,
    globals: Vec<TirGlobal>,
    global_names: FxHashMap<Name, GlobalId>,
    vtables: Vec<VTable>,
    vtable_classes: FxHashMap<DeclId, VTableId>,
    witness_tables: Vec<WitnessTable>,
    witness_conformances: FxHashMap<ConformanceId, WitnessTableId>,
}

impl TirModule {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Functions ───────────────────────────────────────────────────

    /// Add a function and register its name. If a function with the same
    /// name exists, that one is returned and `func` is dropped.
    pub fn add_function(&mut self, func: TirFunction) -> FuncId {
        if let Some(&id) = self.function_names.get(&func.name) {
            return id;
        }
        let id = FuncId::from_len(self.functions.len());
        self.function_names.insert(func.name, id);
        self.functions.push(func);
        id
    }

    pub fn function(&self, id: FuncId) -> &TirFunction {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut TirFunction {
        &mut self.functions[id.index()]
    }

    pub fn function_by_name(&self, name: Name) -> Option<FuncId> {
        self.function_names.get(&name).copied()
    }

    /// All functions with their ids.
    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &TirFunction)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId::from_len(i), f))
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    // ── Globals ─────────────────────────────────────────────────────

    /// Add a global and register its name; an existing global with the
    /// same name wins.
    pub fn add_global(&mut self, global: TirGlobal) -> GlobalId {
        if let Some(&id) = self.global_names.get(&global.name) {
            return id;
        }
        let id = GlobalId::from_len(self.globals.len());
        self.global_names.insert(global.name, id);
        self.globals.push(global);
        id
    }

    pub fn global(&self, id: GlobalId) -> &TirGlobal {
        &self.globals[id.index()]
    }

    pub fn global_by_name(&self, name: Name) -> Option<GlobalId> {
        self.global_names.get(&name).copied()
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &TirGlobal)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, g)| (GlobalId::from_len(i), g))
    }

    // ── VTables ─────────────────────────────────────────────────────

    /// Add a vtable; an existing vtable for the same class wins.
    pub fn add_vtable(&mut self, vtable: VTable) -> VTableId {
        if let Some(&id) = self.vtable_classes.get(&vtable.class) {
            return id;
        }
        let id = VTableId::from_len(self.vtables.len());
        self.vtable_classes.insert(vtable.class, id);
        self.vtables.push(vtable);
        id
    }

    pub fn vtable(&self, id: VTableId) -> &VTable {
        &self.vtables[id.index()]
    }

    pub fn vtable_for_class(&self, class: DeclId) -> Option<VTableId> {
        self.vtable_classes.get(&class).copied()
    }

    pub fn vtables(&self) -> impl Iterator<Item = (VTableId, &VTable)> {
        self.vtables
            .iter()
            .enumerate()
            .map(|(i, v)| (VTableId::from_len(i), v))
    }

    // ── Witness tables ──────────────────────────────────────────────

    /// Add a witness table; an existing table for the same conformance
    /// wins.
    pub fn add_witness_table(&mut self, table: WitnessTable) -> WitnessTableId {
        if let Some(&id) = self.witness_conformances.get(&table.conformance) {
            return id;
        }
        let id = WitnessTableId::from_len(self.witness_tables.len());
        self.witness_conformances.insert(table.conformance, id);
        self.witness_tables.push(table);
        id
    }

    pub fn witness_table(&self, id: WitnessTableId) -> &WitnessTable {
        &self.witness_tables[id.index()]
    }

    pub fn witness_table_for(&self, conformance: ConformanceId) -> Option<WitnessTableId> {
        self.witness_conformances.get(&conformance).copied()
    }

    pub fn witness_tables(&self) -> impl Iterator<Item = (WitnessTableId, &WitnessTable)> {
        self.witness_tables
            .iter()
            .enumerate()
            .map(|(i, w)| (WitnessTableId::from_len(i), w))
    }
}
