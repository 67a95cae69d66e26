use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

use mtlc::codegen::{CodegenOptions, TargetKind};
use mtlc::diag::Diagnostic;
use mtlc::ir::Program;
use mtlc::pass::PassId;
use mtlc::pipeline::{compute_provenance, run_pipeline, CompilationState, PipelineError};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Kernel program: types, maps, apply functions
    Kernel,
    /// User-space loader: types, init_tables
    User,
    /// Key and value type declarations only
    Types,
    /// Provenance JSON
    BuildInfo,
    /// The loaded program as pretty JSON
    Ir,
}

impl EmitStage {
    fn terminal_pass(self) -> Option<PassId> {
        match self {
            EmitStage::Kernel => Some(PassId::Apply),
            EmitStage::User => Some(PassId::Initializer),
            EmitStage::Types => Some(PassId::Types),
            EmitStage::BuildInfo | EmitStage::Ir => None,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "mtlc",
    version,
    about = "Match-action table lowering compiler — lowers type-checked packet tables to eBPF C"
)]
struct Cli {
    /// Input program (type-checked IR as JSON)
    input: PathBuf,

    /// Output file path (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Kernel)]
    emit: EmitStage,

    /// Map and helper flavour of the generated C
    #[arg(long, value_enum, default_value_t = TargetKind::Kernel)]
    target: TargetKind,

    /// Emit runtime trace messages in generated code
    #[arg(long)]
    trace: bool,

    /// Log compiler passes and timing to stderr
    #[arg(long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "mtlc=debug" } else { "mtlc=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_diagnostic(d: &Diagnostic) {
    eprintln!("mtlc: {}", d);
    for r in &d.related_spans {
        eprintln!("  note: {} (at {}..{})", r.label, r.span.start, r.span.end);
    }
}

fn write_output(cli: &Cli, text: &str) {
    let result = match &cli.output {
        Some(path) => std::fs::write(path, text),
        None => std::io::stdout().write_all(text.as_bytes()),
    };
    if let Err(e) = result {
        let dest = cli
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string());
        eprintln!("mtlc: error: {}: {}", dest, e);
        std::process::exit(2);
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tracing::debug!(input = %cli.input.display(), emit = ?cli.emit, target = ?cli.target, "mtlc");

    // ── Load program ──
    let program = match Program::load(&cli.input) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("mtlc: error: {}", e);
            std::process::exit(2);
        }
    };

    let Some(terminal) = cli.emit.terminal_pass() else {
        let text = match cli.emit {
            EmitStage::BuildInfo => compute_provenance(&program).to_json(),
            _ => match serde_json::to_string_pretty(&program) {
                Ok(mut s) => {
                    s.push('\n');
                    s
                }
                Err(e) => {
                    eprintln!("mtlc: error: {}", e);
                    std::process::exit(2);
                }
            },
        };
        write_output(&cli, &text);
        return;
    };

    // ── Lower ──
    let options = CodegenOptions {
        target: cli.target,
        emit_trace_messages: cli.trace,
    };
    let mut state = CompilationState::new(program);
    let result = run_pipeline(&mut state, terminal, &options, |_, diags| {
        for d in diags {
            print_diagnostic(d);
        }
    });
    match result {
        Ok(()) => {}
        Err(PipelineError::Diagnostics { failing_pass }) => {
            tracing::debug!(pass = %failing_pass, "stopped");
            std::process::exit(1);
        }
        Err(e @ PipelineError::Internal { .. }) => {
            eprintln!("mtlc: {}", e);
            std::process::exit(101);
        }
    }

    let generated = state.generated(&options);
    let text = match cli.emit {
        EmitStage::Kernel => generated.kernel_source,
        EmitStage::User => generated.user_source,
        _ => generated.types,
    };
    match text {
        Some(text) => write_output(&cli, &text),
        None => {
            eprintln!("mtlc: error: nothing generated");
            std::process::exit(1);
        }
    }
}
