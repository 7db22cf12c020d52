//! Module-file format constants.
//!
//! # Layout
//!
//! ```text
//! "ORIM"
//! MODULE_BLOCK
//!   BLOCKINFO              names, DECLS_AND_TYPES and IR abbreviations
//!   CONTROL_BLOCK          METADATA, MODULE_NAME, SHADOWED_MODULE?
//!   INPUT_BLOCK            IMPORTED_MODULE, LINK_LIBRARY, SOURCE_FILE
//!   IR_BLOCK?              functions, globals, vtables, witness tables
//!   IR_INDEX_BLOCK?        offsets and name tables for the IR block
//!   DECLS_AND_TYPES_BLOCK  one record group per declaration and type
//!   IDENTIFIER_DATA_BLOCK  one blob of NUL-terminated strings
//!   INDEX_BLOCK            offsets, top-level decls, name tables
//! ```
//!
//! # Conventions
//!
//! - Entity ids are 1-based on disk; 0 means "none".
//! - Offsets are absolute bit offsets from the start of the file. The magic
//!   word occupies bits 0..32, so offset 0 is never a record.
//! - Identifier offsets index into the identifier blob, whose byte 0 is
//!   reserved.
//! - Module references are 0 for the module being read and otherwise the
//!   identifier id of the referenced module's name.

/// File signature.
pub const MAGIC: [u8; 4] = *b"ORIM";

/// Signature of the companion documentation file.
pub const DOC_MAGIC: [u8; 4] = *b"ORID";

/// Major version written by this compiler. Readers reject newer majors.
pub const VERSION_MAJOR: u64 = 1;

/// Minor version written by this compiler. Newer minors are accepted.
pub const VERSION_MINOR: u64 = 0;

/// Oldest major version this compiler can read.
pub const MIN_SUPPORTED_MAJOR: u64 = 1;

/// Default file extension of module files.
pub const MODULE_EXTENSION: &str = "orim";

/// Default file extension of documentation files.
pub const DOC_EXTENSION: &str = "orimdoc";

/// Block ids.
pub mod block {
    pub const MODULE: u32 = 7;
    pub const CONTROL: u32 = 8;
    pub const INPUT: u32 = 9;
    pub const DECLS_AND_TYPES: u32 = 10;
    pub const IDENTIFIER_DATA: u32 = 11;
    pub const INDEX: u32 = 12;
    pub const IR: u32 = 13;
    pub const IR_INDEX: u32 = 14;
    pub const DOC: u32 = 15;
}

/// Abbreviation width of the outer module block.
pub const MODULE_ABBREV_WIDTH: u32 = 3;
/// Abbreviation width of small blocks (control, input, index).
pub const SMALL_ABBREV_WIDTH: u32 = 4;
/// Abbreviation width of the decls and IR blocks, which carry one
/// block-info abbreviation per record code.
pub const WIDE_ABBREV_WIDTH: u32 = 7;

/// Records of the control block.
pub mod control {
    /// `[major, minor]`, blob: compiler version string.
    pub const METADATA: u32 = 1;
    /// blob: module name.
    pub const MODULE_NAME: u32 = 2;
    /// blob: name of the module this one shadows.
    pub const SHADOWED_MODULE: u32 = 3;
}

/// Records of the input block.
pub mod input {
    /// `[exported]`, blob: module name.
    pub const IMPORTED_MODULE: u32 = 1;
    /// `[kind]`, blob: library name.
    pub const LINK_LIBRARY: u32 = 2;
    /// blob: source file path.
    pub const SOURCE_FILE: u32 = 3;
}

/// Type records of the decls block.
///
/// Declaration records use the declaration's
/// [`DeclKindTag`](ori_sema::DeclKindTag) as their code (1..=18).
pub mod type_code {
    pub const BUILTIN: u32 = 30;
    pub const NOMINAL: u32 = 31;
    pub const BOUND_GENERIC: u32 = 32;
    pub const TUPLE: u32 = 33;
    pub const FUNCTION: u32 = 34;
    pub const GENERIC_FUNCTION: u32 = 35;
    pub const METATYPE: u32 = 36;
    pub const ARCHETYPE: u32 = 37;
    pub const GENERIC_PARAM: u32 = 38;
    pub const DEPENDENT_MEMBER: u32 = 39;
    pub const PROTOCOL_COMPOSITION: u32 = 40;
    pub const REFERENCE_STORAGE: u32 = 41;
    pub const IR_FUNCTION: u32 = 42;
    pub const ARRAY_SLICE: u32 = 43;
    pub const OPTIONAL: u32 = 44;
    pub const SUBSTITUTED: u32 = 45;
}

/// Cross-reference records of the decls block.
pub mod xref {
    /// `[module_ref, path_length]`, followed by `path_length` pieces.
    pub const XREF: u32 = 60;
    /// `[name]`
    pub const TYPE_PIECE: u32 = 61;
    /// `[name, expected_type]`
    pub const VALUE_PIECE: u32 = 62;
    /// `[module_ref]`: the next piece only matches members of extensions
    /// declared in that module.
    pub const EXTENSION_PIECE: u32 = 63;
    /// `[fixity]`
    pub const OPERATOR_FILTER: u32 = 64;
    /// `[index]` into the current declaration's generic parameters.
    pub const GENERIC_PARAM_PIECE: u32 = 65;
}

/// Records that may appear in both the decls block and the IR block.
pub mod common {
    /// `[protocol]`
    pub const ABSTRACT_CONFORMANCE: u32 = 100;
    /// `[protocol, nominal, module_ref]`
    pub const CONFORMANCE_XREF: u32 = 101;
    /// `[protocol, type, substitution_count, underlying_inline, nominal,
    /// module_ref]`, then substitutions, then the underlying conformance
    /// if inline.
    pub const SPECIALIZED_CONFORMANCE: u32 = 102;
    /// `[protocol, type, underlying_inline, nominal, module_ref]`, then the
    /// underlying conformance if inline.
    pub const INHERITED_CONFORMANCE: u32 = 103;
    /// Full normal conformance, trailing its declaring declaration.
    pub const NORMAL_CONFORMANCE: u32 = 104;
    /// `[placeholder, replacement, conformance_count]`, then conformances.
    pub const SUBSTITUTION: u32 = 105;
    /// `[param...]`, then requirements, then `LAST_GENERIC_REQUIREMENT`.
    pub const GENERIC_PARAM_LIST: u32 = 106;
    /// `[kind, type, type]`
    pub const GENERIC_REQUIREMENT: u32 = 107;
    pub const LAST_GENERIC_REQUIREMENT: u32 = 108;
}

/// Requirement kinds in `GENERIC_REQUIREMENT`.
pub mod requirement_kind {
    pub const CONFORMANCE: u64 = 0;
    pub const SAME_TYPE: u64 = 1;
    pub const WITNESS_MARKER: u64 = 2;
}

/// Records of the identifier block.
pub mod identifier {
    /// blob: NUL-terminated identifiers; byte 0 is reserved.
    pub const IDENTIFIER_DATA: u32 = 1;
}

/// Records of the index block.
pub mod index {
    pub const DECL_OFFSETS: u32 = 1;
    pub const TYPE_OFFSETS: u32 = 2;
    pub const IDENTIFIER_OFFSETS: u32 = 3;
    pub const TOP_LEVEL_DECLS: u32 = 4;
    /// `[table_offset]`, blob: on-disk table.
    pub const TOP_LEVEL_VALUES: u32 = 5;
    pub const OPERATORS: u32 = 6;
    pub const EXTENSIONS: u32 = 7;
    pub const CLASS_MEMBERS: u32 = 8;
    pub const OPERATOR_METHODS: u32 = 9;
    /// `[known_protocol, decl...]`
    pub const KNOWN_PROTOCOL_ADOPTERS: u32 = 10;
}

/// Records of the IR block.
pub mod ir {
    /// `[linkage, type, name, attrs, decl, is_declaration, block_count]`
    pub const FUNCTION: u32 = 1;
    /// `[index, arg_type...]`
    pub const BASIC_BLOCK: u32 = 2;
    /// `[opcode, attr]`
    pub const INST_NO_OPERAND: u32 = 3;
    /// `[opcode, attr, type]`
    pub const INST_ONE_TYPE: u32 = 4;
    /// `[opcode, attr, value, result]`
    pub const INST_ONE_OPERAND: u32 = 5;
    /// `[opcode, attr, type, value, result]`
    pub const INST_ONE_TYPE_ONE_OPERAND: u32 = 6;
    /// `[opcode, attr, type_or_0, value, result, value, result]`
    pub const INST_TWO_OPERANDS: u32 = 7;
    /// `[opcode, attr, type_or_0, list...]`
    pub const INST_ONE_TYPE_VALUES: u32 = 8;
    /// `[opcode, substitution_count, callee_type, result_type, callee,
    /// callee_result, (value, result)...]`, then substitutions.
    pub const INST_APPLY: u32 = 9;
    /// `[linkage, type, name, decl]`
    pub const GLOBAL_VAR: u32 = 10;
    /// `[class, (method, function)...]`
    pub const VTABLE: u32 = 11;
    /// `[linkage, entry_count]`, then the conformance, then entries.
    pub const WITNESS_TABLE: u32 = 12;
    /// `[requirement, function_or_0]`
    pub const WITNESS_METHOD_ENTRY: u32 = 13;
    /// `[protocol]`, then the conformance.
    pub const WITNESS_BASE_ENTRY: u32 = 14;
    /// `[assoc, type]`
    pub const WITNESS_ASSOC_ENTRY: u32 = 15;
    /// `[assoc, protocol]`, then the conformance.
    pub const WITNESS_ASSOC_PROTOCOL_ENTRY: u32 = 16;
}

/// Records of the IR index block.
pub mod ir_index {
    pub const FUNCTION_OFFSETS: u32 = 1;
    pub const GLOBAL_OFFSETS: u32 = 2;
    pub const VTABLE_OFFSETS: u32 = 3;
    pub const WITNESS_TABLE_OFFSETS: u32 = 4;
    /// `[table_offset]`, blob: linkage name → function id.
    pub const FUNCTION_NAMES: u32 = 5;
    pub const GLOBAL_NAMES: u32 = 6;
    /// Qualified class name → vtable id.
    pub const VTABLE_NAMES: u32 = 7;
    /// `Nominal:Protocol` → witness table id.
    pub const WITNESS_TABLE_NAMES: u32 = 8;
}

/// Records of the documentation file's doc block.
pub mod doc {
    /// `[major, minor]`
    pub const METADATA: u32 = 1;
    /// `[table_offset]`, blob: top-level name → brief comment.
    pub const BRIEF_COMMENTS: u32 = 2;
}

/// Record names for the decls block, written to the block-info block.
pub const DECLS_RECORD_NAMES: &[(u32, &str)] = &[
    (1, "TYPE_ALIAS_DECL"),
    (2, "STRUCT_DECL"),
    (3, "CLASS_DECL"),
    (4, "ENUM_DECL"),
    (5, "ENUM_CASE_DECL"),
    (6, "PROTOCOL_DECL"),
    (7, "FUNC_DECL"),
    (8, "CONSTRUCTOR_DECL"),
    (9, "DESTRUCTOR_DECL"),
    (10, "VAR_DECL"),
    (11, "SUBSCRIPT_DECL"),
    (12, "PATTERN_BINDING_DECL"),
    (13, "INFIX_OPERATOR_DECL"),
    (14, "PREFIX_OPERATOR_DECL"),
    (15, "POSTFIX_OPERATOR_DECL"),
    (16, "EXTENSION_DECL"),
    (17, "GENERIC_TYPE_PARAM_DECL"),
    (18, "ASSOCIATED_TYPE_DECL"),
    (type_code::BUILTIN, "BUILTIN_TYPE"),
    (type_code::NOMINAL, "NOMINAL_TYPE"),
    (type_code::BOUND_GENERIC, "BOUND_GENERIC_TYPE"),
    (type_code::TUPLE, "TUPLE_TYPE"),
    (type_code::FUNCTION, "FUNCTION_TYPE"),
    (type_code::GENERIC_FUNCTION, "GENERIC_FUNCTION_TYPE"),
    (type_code::METATYPE, "METATYPE_TYPE"),
    (type_code::ARCHETYPE, "ARCHETYPE_TYPE"),
    (type_code::GENERIC_PARAM, "GENERIC_PARAM_TYPE"),
    (type_code::DEPENDENT_MEMBER, "DEPENDENT_MEMBER_TYPE"),
    (type_code::PROTOCOL_COMPOSITION, "PROTOCOL_COMPOSITION_TYPE"),
    (type_code::REFERENCE_STORAGE, "REFERENCE_STORAGE_TYPE"),
    (type_code::IR_FUNCTION, "IR_FUNCTION_TYPE"),
    (type_code::ARRAY_SLICE, "ARRAY_SLICE_TYPE"),
    (type_code::OPTIONAL, "OPTIONAL_TYPE"),
    (type_code::SUBSTITUTED, "SUBSTITUTED_TYPE"),
    (xref::XREF, "XREF"),
    (xref::TYPE_PIECE, "XREF_TYPE_PATH_PIECE"),
    (xref::VALUE_PIECE, "XREF_VALUE_PATH_PIECE"),
    (xref::EXTENSION_PIECE, "XREF_EXTENSION_PATH_PIECE"),
    (xref::OPERATOR_FILTER, "XREF_OPERATOR_OR_ACCESSOR_PATH_PIECE"),
    (xref::GENERIC_PARAM_PIECE, "XREF_GENERIC_PARAM_PATH_PIECE"),
];

/// Record names shared by the decls and IR blocks.
pub const COMMON_RECORD_NAMES: &[(u32, &str)] = &[
    (common::ABSTRACT_CONFORMANCE, "ABSTRACT_CONFORMANCE"),
    (common::CONFORMANCE_XREF, "CONFORMANCE_XREF"),
    (common::SPECIALIZED_CONFORMANCE, "SPECIALIZED_CONFORMANCE"),
    (common::INHERITED_CONFORMANCE, "INHERITED_CONFORMANCE"),
    (common::NORMAL_CONFORMANCE, "NORMAL_CONFORMANCE"),
    (common::SUBSTITUTION, "SUBSTITUTION"),
    (common::GENERIC_PARAM_LIST, "GENERIC_PARAM_LIST"),
    (common::GENERIC_REQUIREMENT, "GENERIC_REQUIREMENT"),
    (common::LAST_GENERIC_REQUIREMENT, "LAST_GENERIC_REQUIREMENT"),
];

/// Record names for the IR block.
pub const IR_RECORD_NAMES: &[(u32, &str)] = &[
    (ir::FUNCTION, "IR_FUNCTION"),
    (ir::BASIC_BLOCK, "IR_BASIC_BLOCK"),
    (ir::INST_NO_OPERAND, "IR_INST_NO_OPERAND"),
    (ir::INST_ONE_TYPE, "IR_INST_ONE_TYPE"),
    (ir::INST_ONE_OPERAND, "IR_INST_ONE_OPERAND"),
    (ir::INST_ONE_TYPE_ONE_OPERAND, "IR_INST_ONE_TYPE_ONE_OPERAND"),
    (ir::INST_TWO_OPERANDS, "IR_INST_TWO_OPERANDS"),
    (ir::INST_ONE_TYPE_VALUES, "IR_INST_ONE_TYPE_VALUES"),
    (ir::INST_APPLY, "IR_INST_APPLY"),
    (ir::GLOBAL_VAR, "IR_GLOBAL_VAR"),
    (ir::VTABLE, "IR_VTABLE"),
    (ir::WITNESS_TABLE, "IR_WITNESS_TABLE"),
    (ir::WITNESS_METHOD_ENTRY, "IR_WITNESS_METHOD_ENTRY"),
    (ir::WITNESS_BASE_ENTRY, "IR_WITNESS_BASE_ENTRY"),
    (ir::WITNESS_ASSOC_ENTRY, "IR_WITNESS_ASSOC_ENTRY"),
    (ir::WITNESS_ASSOC_PROTOCOL_ENTRY, "IR_WITNESS_ASSOC_PROTOCOL_ENTRY"),
];

// ── Field encodings ─────────────────────────────────────────────────

/// Zigzag-encode a signed value so small magnitudes stay small in VBR.
#[inline]
pub fn encode_signed(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`encode_signed`].
#[inline]
pub fn decode_signed(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// On-disk id for a 0-based table index.
#[inline]
pub fn disk_id(index: usize) -> u64 {
    index as u64 + 1
}

/// 0-based table index for an on-disk id; `None` for id 0.
#[inline]
pub fn table_index(id: u64) -> Option<usize> {
    usize::try_from(id).ok()?.checked_sub(1)
}
