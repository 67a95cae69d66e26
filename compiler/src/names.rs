// names.rs — Declaration lookup and fresh-name allocation
//
// `RefMap` answers "what does this DeclId denote?" for every declaration in
// the program. `NameGen` is the single allocator for synthetic C identifiers;
// every temporary introduced by emission goes through it so generated names
// never collide with user declarations or with each other.
//
// Preconditions: DeclIds in the program are unique.
// Postconditions: `RefMap::new` indexes actions, their parameters, tables,
//   externs, and other declarations.
// Failure modes: a DeclId used twice is an `InternalError`.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::diag::InternalError;
use crate::ir::{DeclId, Program};

/// What a DeclId resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Action { name: String },
    /// A formal parameter; `owner` is the declaring action.
    Param { name: String, owner: DeclId },
    Table { name: String },
    Extern { name: String, type_name: String },
    Other { name: String },
}

impl Resolved {
    pub fn name(&self) -> &str {
        match self {
            Resolved::Action { name }
            | Resolved::Param { name, .. }
            | Resolved::Table { name }
            | Resolved::Extern { name, .. }
            | Resolved::Other { name } => name,
        }
    }
}

#[derive(Debug, Default)]
pub struct RefMap {
    decls: HashMap<DeclId, Resolved>,
}

impl RefMap {
    pub fn new(program: &Program) -> Result<Self, InternalError> {
        let mut map = RefMap::default();
        for action in &program.actions {
            map.insert(
                action.decl,
                Resolved::Action {
                    name: action.name.clone(),
                },
            )?;
            for param in &action.params {
                map.insert(
                    param.decl,
                    Resolved::Param {
                        name: param.name.clone(),
                        owner: action.decl,
                    },
                )?;
            }
        }
        for table in &program.tables {
            map.insert(
                table.decl,
                Resolved::Table {
                    name: table.name.clone(),
                },
            )?;
        }
        for ext in &program.externs {
            map.insert(
                ext.decl,
                Resolved::Extern {
                    name: ext.name.clone(),
                    type_name: ext.type_name.clone(),
                },
            )?;
        }
        for decl in &program.declarations {
            map.insert(
                decl.decl,
                Resolved::Other {
                    name: decl.name.clone(),
                },
            )?;
        }
        Ok(map)
    }

    fn insert(&mut self, id: DeclId, resolved: Resolved) -> Result<(), InternalError> {
        if let Some(prev) = self.decls.get(&id) {
            return Err(InternalError::DuplicateDecl {
                id: id.0,
                first: prev.name().to_string(),
                second: resolved.name().to_string(),
            });
        }
        self.decls.insert(id, resolved);
        Ok(())
    }

    pub fn get(&self, id: DeclId) -> Option<&Resolved> {
        self.decls.get(&id)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

/// Collision-free generator for synthetic identifiers.
#[derive(Debug, Default)]
pub struct NameGen {
    used: HashSet<String>,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with every name declared in the program.
    pub fn for_program(program: &Program) -> Self {
        let mut gen = NameGen::new();
        for action in &program.actions {
            gen.reserve(&action.name);
            for param in &action.params {
                gen.reserve(&param.name);
            }
        }
        for table in &program.tables {
            gen.reserve(&table.name);
        }
        for ext in &program.externs {
            gen.reserve(&ext.name);
        }
        for decl in &program.declarations {
            gen.reserve(&decl.name);
        }
        for param in &program.context {
            gen.reserve(&param.name);
        }
        gen
    }

    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    /// Return `base` if unused, otherwise the first free `base_<n>`.
    pub fn new_name(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 0u32;
        loop {
            let candidate = format!("{}_{}", base, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
