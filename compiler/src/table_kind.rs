// table_kind.rs — Backing-storage classification
//
// Tables and counters choose their map kind from a handful of booleans.
// Both decisions live here as explicit decision functions so the layout
// invariants are checked in one place.
//
// Preconditions: the declared kind comes from a recognized constructor.
// Postconditions: a ternary key never yields `LpmTrie`.
// Failure modes: two or more lpm fields → `KindError::MultipleLpm`.
// Side effects: none.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Array,
    Hash,
    LpmTrie,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableKind::Array => "array",
            TableKind::Hash => "hash",
            TableKind::LpmTrie => "lpm_trie",
        };
        f.write_str(s)
    }
}

/// Match-kind census of a key, the only input the decision needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyShape {
    pub lpm_fields: usize,
    pub has_ternary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindError {
    MultipleLpm,
}

/// Classify a table's storage.
///
/// | lpm fields | ternary | result          |
/// |------------|---------|-----------------|
/// | ≥ 2        | any     | `MultipleLpm`   |
/// | any        | yes     | declared        |
/// | 1          | no      | `LpmTrie`       |
/// | 0          | no      | declared        |
pub fn select_table_kind(declared: TableKind, shape: KeyShape) -> Result<TableKind, KindError> {
    match (shape.lpm_fields, shape.has_ternary) {
        (n, _) if n >= 2 => Err(KindError::MultipleLpm),
        (_, true) => Ok(declared),
        (1, false) => Ok(TableKind::LpmTrie),
        _ => Ok(declared),
    }
}

/// Counters: sparse index spaces use a hash, dense ones an array.
pub fn select_counter_kind(sparse: bool) -> TableKind {
    if sparse {
        TableKind::Hash
    } else {
        TableKind::Array
    }
}
