// model.rs — Names fixed by the target architecture model
//
// The architecture description (match kinds, the no-op action, the table
// implementation externs, the counter extern) is declared by the core and
// target libraries. Lowering recognizes these by name.

/// Match kinds declared by the core library.
pub const EXACT_MATCH: &str = "exact";
pub const TERNARY_MATCH: &str = "ternary";
pub const LPM_MATCH: &str = "lpm";
pub const SELECTOR_MATCH: &str = "selector";

/// The built-in no-op action; always discriminant 0.
pub const NO_ACTION: &str = "NoAction";
/// Union member holding the no-op action's empty payload.
pub const NO_ACTION_VARIANT: &str = "_NoAction";

/// Table property naming the backing implementation.
pub const TABLE_IMPL_PROPERTY: &str = "implementation";

/// Table implementation constructors and their size parameter.
pub const ARRAY_TABLE: &str = "array_table";
pub const HASH_TABLE: &str = "hash_table";
pub const TABLE_SIZE_PARAM: &str = "size";

/// Counter extern and its constructor parameters and methods.
pub const COUNTER_ARRAY: &str = "CounterArray";
pub const COUNTER_MAX_INDEX_PARAM: &str = "max_index";
pub const COUNTER_SPARSE_PARAM: &str = "sparse";
pub const COUNTER_INCREMENT: &str = "increment";
pub const COUNTER_ADD: &str = "add";
pub const COUNTER_INDEX_TYPE: &str = "u32";
pub const COUNTER_VALUE_TYPE: &str = "u32";

/// Key layout fields.
pub const PREFIX_FIELD: &str = "prefixlen";
pub const PREFIX_FIELD_WIDTH: u32 = 32;
pub const DUMMY_KEY_FIELD: &str = "__dummy_table_key";
pub const KEY_ALIGNMENT: u32 = 4;

/// Value layout discriminant.
pub const DISCRIMINANT_FIELD: &str = "action";

/// Index type of single-slot array maps and the user-space zero key.
pub const ARRAY_INDEX_TYPE: &str = "u32";
pub const ZERO_KEY: &str = "ebpf_zero";

/// Widest field any layout may hold.
pub const MAX_FIELD_WIDTH: u32 = 64;
