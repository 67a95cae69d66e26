// pipeline.rs — Compilation state and pass orchestration
//
// Holds every pass artifact and runs the minimal set of passes for a given
// terminal PassId.
//
// Preconditions: the program is set before calling run_pipeline.
// Postconditions: artifacts for the required passes are populated, or
//   has_error is set and no generated file is produced.
// Failure modes: any pass emitting error-level diagnostics; an internal
//   error from a broken collaborator contract.
// Side effects: calls on_pass_complete after each pass for immediate display.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::codegen::{self, CodegenOptions, GeneratedCode, Lowering};
use crate::diag::{has_errors, Diagnostic, InternalError};
use crate::ir::Program;
use crate::names::NameGen;
use crate::pass::{required_passes, PassId};

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible builds.
///
/// `program_hash`: SHA-256 of `Program::canonical_json()`.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub program_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the program hash (64 characters).
    pub fn program_hash_hex(&self) -> String {
        bytes_to_hex(&self.program_hash)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"program_hash\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.program_hash_hex(),
            self.compiler_version,
        )
    }

    /// C comment placed at the top of each generated file.
    pub fn header_comment(&self) -> String {
        format!(
            "/* Automatically generated by {} {} from program {} */\n",
            env!("CARGO_PKG_NAME"),
            self.compiler_version,
            self.program_hash_hex()
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn compute_provenance(program: &Program) -> Provenance {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(program.canonical_json().as_bytes());
    let mut program_hash = [0u8; 32];
    program_hash.copy_from_slice(&hasher.finalize());

    Provenance {
        program_hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Artifact storage ───────────────────────────────────────────────────────

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub program: Program,
    pub provenance: Option<Provenance>,
    pub lowering: Option<Lowering>,
    pub names: NameGen,
    pub type_decls: Option<String>,
    pub map_decls: Option<String>,
    pub apply_fns: Option<String>,
    pub init_fn: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl CompilationState {
    pub fn new(program: Program) -> Self {
        let names = codegen::name_gen(&program);
        Self {
            program,
            provenance: None,
            lowering: None,
            names,
            type_decls: None,
            map_decls: None,
            apply_fns: None,
            init_fn: None,
            diagnostics: Vec::new(),
            has_error: false,
        }
    }

    /// Assemble whichever output files the completed passes allow. Nothing
    /// is produced once any error has been reported.
    pub fn generated(&self, options: &CodegenOptions) -> GeneratedCode {
        if self.has_error {
            return GeneratedCode::default();
        }
        let header = self
            .provenance
            .as_ref()
            .map(Provenance::header_comment)
            .unwrap_or_default();

        let kernel_source = match (&self.type_decls, &self.map_decls, &self.apply_fns) {
            (Some(types), Some(maps), Some(apply)) => Some(codegen::assemble_kernel(
                &header, options, types, maps, apply,
            )),
            _ => None,
        };
        let user_source = match (&self.type_decls, &self.init_fn) {
            (Some(types), Some(init)) => Some(codegen::assemble_user(&header, types, init)),
            _ => None,
        };
        GeneratedCode {
            kernel_source,
            user_source,
            types: self.type_decls.clone(),
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution stopped. User diagnostics are available in
/// `CompilationState.diagnostics`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{failing_pass} pass reported errors")]
    Diagnostics { failing_pass: PassId },
    #[error("internal error in {pass} pass: {source}")]
    Internal {
        pass: PassId,
        #[source]
        source: InternalError,
    },
}

/// Per-pass post-processing: callback, accumulate, log, error check.
fn finish_pass(
    all_diags: &mut Vec<Diagnostic>,
    has_error: &mut bool,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_errors(&diags);
    debug!(
        pass = %pass_id,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        diagnostics = diags.len(),
        "pass complete"
    );
    all_diags.extend(diags);
    if is_err {
        *has_error = true;
        return Err(PipelineError::Diagnostics {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

fn internal(has_error: &mut bool, pass: PassId, source: InternalError) -> PipelineError {
    *has_error = true;
    PipelineError::Internal { pass, source }
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → log → error check.
/// The build pass always runs first; every other pass reads its descriptors.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &CodegenOptions,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    let passes = required_passes(terminal);
    let CompilationState {
        program,
        provenance,
        lowering,
        names,
        type_decls,
        map_decls,
        apply_fns,
        init_fn,
        diagnostics,
        has_error,
    } = state;
    *provenance = Some(compute_provenance(program));

    let t = Instant::now();
    let mut diags = Vec::new();
    let built = codegen::build_descriptors(program, &mut diags)
        .map_err(|e| internal(has_error, PassId::Build, e))?;
    let built: &Lowering = lowering.insert(built);
    finish_pass(
        diagnostics,
        has_error,
        PassId::Build,
        diags,
        t.elapsed(),
        &mut on_pass_complete,
    )?;

    for &pass_id in &passes {
        let t = Instant::now();
        let mut diags = Vec::new();
        match pass_id {
            PassId::Build => continue,
            PassId::Types => {
                *type_decls = Some(codegen::emit_types(built, &mut diags));
            }
            PassId::Instances => {
                *map_decls = Some(codegen::emit_instances(
                    program, built, options, names, &mut diags,
                ));
            }
            PassId::Apply => {
                let text = codegen::emit_apply_functions(program, built, options, names, &mut diags)
                    .map_err(|e| internal(has_error, pass_id, e))?;
                *apply_fns = Some(text);
            }
            PassId::Initializer => {
                let text = codegen::emit_init_function(program, built, options, names, &mut diags)
                    .map_err(|e| internal(has_error, pass_id, e))?;
                *init_fn = Some(text);
            }
        }
        finish_pass(
            diagnostics,
            has_error,
            pass_id,
            diags,
            t.elapsed(),
            &mut on_pass_complete,
        )?;
    }

    Ok(())
}
