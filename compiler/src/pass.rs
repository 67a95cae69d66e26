// pass.rs — Lowering passes, their artifacts and dependency order
//
// Declares the lowering passes, their dependency edges, and the artifacts
// they produce. Used by the pipeline runner to compute the minimal pass
// subset for each --emit stage.

use std::collections::HashSet;
use std::fmt;

// ── Pass and artifact identifiers ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    /// Table and counter descriptor construction.
    Build,
    Types,
    Instances,
    /// Per-table apply functions (key, lookup, dispatch).
    Apply,
    /// User-space static initializer.
    Initializer,
}

/// Machine-readable artifact identifiers. Each maps to a field of the
/// compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Descriptors, // Lowering
    TypeDecls,   // String
    MapDecls,    // String
    ApplyFns,    // String
    InitFn,      // String
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a lowering pass.
pub struct PassDescriptor {
    /// Human-readable name for logs.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Build => PassDescriptor {
            name: "build",
            inputs: &[],
            outputs: &[ArtifactId::Descriptors],
            invariants: "layouts immutable, kind and capacity chosen for keyed tables",
        },
        PassId::Types => PassDescriptor {
            name: "types",
            inputs: &[PassId::Build],
            outputs: &[ArtifactId::TypeDecls],
            invariants: "one key and one value struct per table",
        },
        PassId::Instances => PassDescriptor {
            name: "instances",
            inputs: &[PassId::Types],
            outputs: &[ArtifactId::MapDecls],
            invariants: "default-action map declared for every table",
        },
        PassId::Apply => PassDescriptor {
            name: "apply",
            inputs: &[PassId::Instances],
            outputs: &[ArtifactId::ApplyFns],
            invariants: "every dispatch has a trapping default branch",
        },
        PassId::Initializer => PassDescriptor {
            name: "initializer",
            inputs: &[PassId::Types],
            outputs: &[ArtifactId::InitFn],
            invariants: "one upsert per default action and literal entry",
        },
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(descriptor(*self).name)
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

pub const ALL_PASSES: [PassId; 5] = [
    PassId::Build,
    PassId::Types,
    PassId::Instances,
    PassId::Apply,
    PassId::Initializer,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_stage_skips_initializer() {
        let passes = required_passes(PassId::Apply);
        assert_eq!(
            passes,
            vec![PassId::Build, PassId::Types, PassId::Instances, PassId::Apply]
        );
        assert!(!passes.contains(&PassId::Initializer));
    }

    #[test]
    fn user_stage_skips_instances_and_apply() {
        let passes = required_passes(PassId::Initializer);
        assert_eq!(
            passes,
            vec![PassId::Build, PassId::Types, PassId::Initializer]
        );
    }

    #[test]
    fn build_is_minimal() {
        assert_eq!(required_passes(PassId::Build), vec![PassId::Build]);
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let order = required_passes(*pass);
            for dep in descriptor(*pass).inputs {
                let dep_pos = order.iter().position(|p| p == dep);
                let self_pos = order.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
