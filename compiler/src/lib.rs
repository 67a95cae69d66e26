// mtlc — Match-action table lowering compiler
//
// Library root. Lowers type-checked packet tables and counters to C for the
// eBPF map runtime.

pub mod builder;
pub mod codegen;
pub mod counter;
pub mod diag;
pub mod emit;
pub mod ir;
pub mod key_layout;
pub mod model;
pub mod names;
pub mod pass;
pub mod pipeline;
pub mod table;
pub mod table_kind;
pub mod types;
pub mod value_layout;

#[cfg(test)]
mod test_support;
