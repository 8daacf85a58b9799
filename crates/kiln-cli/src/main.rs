use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use kiln_cli::desc;
use kiln_sched::{dump_schedule, Scheduler};
use kiln_trace::{
    trace_compilation, TraceConfig, FX_GRAPH_READABLE, FX_GRAPH_RUNNABLE, FX_GRAPH_TRANSFORMED,
    OUTPUT_CODE,
};

/// Kiln — graph scheduling and fusion driver
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input graph description (JSON)
    input: PathBuf,

    /// Write a debug trace under this directory
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Dump the pre-fusion schedule to stderr
    #[arg(long)]
    emit_ir: bool,

    /// Parse and schedule without writing a trace
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    // 1. Read the graph description.
    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    // 2. Parse it into a graph.
    let graph = desc::parse_graph(&source)
        .into_diagnostic()
        .wrap_err("graph description rejected")?;

    // 3. Schedule.
    let mut scheduler = Scheduler::new(&graph)
        .into_diagnostic()
        .wrap_err("scheduling failed")?;

    // 4. Optionally dump the pre-fusion schedule to stderr.
    if cli.emit_ir {
        eprintln!("{}", dump_schedule(scheduler.units()));
    }

    // 5. Fuse and report.
    let pre_fusion = scheduler.units().to_vec();
    scheduler.fuse();
    println!(
        "scheduled {} nodes into {} units",
        pre_fusion.len(),
        scheduler.units().len()
    );

    // 6. Dry-run: stop here.
    if cli.dry_run {
        return Ok(());
    }

    // 7. Write the debug trace.
    let config = match &cli.trace_dir {
        Some(dir) => TraceConfig::enabled_at(dir.clone()),
        None => TraceConfig::disabled(),
    };
    let name = cli
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("graph");
    let artifacts = vec![
        (FX_GRAPH_READABLE.to_owned(), desc::describe_graph(&graph)),
        (FX_GRAPH_RUNNABLE.to_owned(), source),
        (FX_GRAPH_TRANSFORMED.to_owned(), dump_schedule(&pre_fusion)),
        (OUTPUT_CODE.to_owned(), dump_schedule(scheduler.units())),
    ];
    let written = trace_compilation(&config, name, &pre_fusion, scheduler.units(), &artifacts)
        .into_diagnostic()
        .wrap_err("failed to write debug trace")?;
    if let Some(dir) = written {
        println!("trace written to {}", dir.display());
    }

    Ok(())
}
