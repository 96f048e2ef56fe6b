//! mddlme command-line entry point.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{debug, error, info};
use mddlme_core::Drawable;
use mddlme_io::{read_mesh, write_mesh, PlyEncoding, PlyWriter};
use mddlme_simplification::{
    MeshPartitioner, PartitionedSimplifier, PipelineReport, DEFAULT_NUM_PARTITIONS,
};

mod config;

use config::{
    apply_overrides, check_input, load_config, resolve_log_level, CliError, LogLevel, Overrides,
    DEFAULT_TARGET_RATIO,
};

/// Partitioned, border-preserving mesh simplification.
#[derive(Parser, Debug)]
#[command(name = "mddlme", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simplify a mesh and write the result.
    Simplify(SimplifyArgs),
    /// Print mesh and partition statistics.
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct SimplifyArgs {
    /// Input mesh (.ply).
    input: PathBuf,
    /// Output mesh (.ply).
    output: PathBuf,
    /// Fraction of vertices to retain, in (0, 1].
    #[arg(short, long)]
    ratio: Option<f32>,
    /// Requested number of partitions.
    #[arg(short = 'n', long)]
    partitions: Option<usize>,
    /// Worker threads for per-partition simplification.
    #[arg(long)]
    threads: Option<usize>,
    /// Simplify partitions one after another.
    #[arg(long)]
    sequential: bool,
    /// Match border vertices by position within this distance.
    #[arg(long, value_name = "TOL")]
    proximity: Option<f32>,
    /// Write binary little-endian PLY.
    #[arg(long)]
    binary: bool,
    /// Write the run report as JSON.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Input mesh (.ply).
    input: PathBuf,
    /// Requested number of partitions.
    #[arg(short = 'n', long)]
    partitions: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            init_logger(&resolve_log_level(cli.log_level, &Default::default()));
            return report_error(&anyhow::Error::new(err));
        }
    };
    init_logger(&resolve_log_level(cli.log_level, &config));

    let result = match cli.command {
        Command::Simplify(args) => simplify(args, config),
        Command::Inspect(args) => inspect(args, config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err),
    }
}

fn simplify(args: SimplifyArgs, mut config: config::MddlmeConfig) -> anyhow::Result<()> {
    check_input(&args.input)?;

    let overrides = Overrides {
        target_ratio: args.ratio,
        partitions: args.partitions,
        threads: args.threads,
        sequential: args.sequential,
        proximity: args.proximity,
    };
    for entry in apply_overrides(&mut config, &overrides)? {
        debug!("CLI override: {}", entry);
    }
    let target_ratio = config.target_ratio.unwrap_or(DEFAULT_TARGET_RATIO);

    let mesh = read_mesh(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    info!(
        "Loaded {}: {} vertices, {} faces",
        args.input.display(),
        mesh.vertex_count(),
        mesh.face_count()
    );

    info!(
        "Simplifying to ratio {} with {} worker thread(s)",
        target_ratio,
        config.pipeline.parallel.effective_threads()
    );
    let simplifier = PartitionedSimplifier::with_config(config.pipeline);
    let result = simplifier
        .run(&mesh, target_ratio)
        .context("simplification failed")?;

    let written = if args.binary {
        PlyWriter::write_mesh_encoded(&result.mesh, &args.output, PlyEncoding::BinaryLittleEndian)
    } else {
        write_mesh(&result.mesh, &args.output)
    };
    written.with_context(|| format!("failed to write {}", args.output.display()))?;
    info!("Wrote {}", args.output.display());

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&result.report)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    let report = &result.report;
    println!(
        "{} -> {} vertices ({:.1}%), {} -> {} faces, {} partitions, {:.3}s",
        report.input_vertices,
        report.output_vertices,
        100.0 * report.vertex_ratio(),
        report.input_faces,
        report.output_faces,
        report.partitions.len(),
        report.processing_time
    );
    if let Some(line) = short_partition_summary(report) {
        println!("{}", line);
    }
    Ok(())
}

/// One line naming the partitions that stopped above their vertex target.
fn short_partition_summary(report: &PipelineReport) -> Option<String> {
    let ids: Vec<String> = report
        .short_partitions()
        .map(|p| p.partition_id.to_string())
        .collect();
    if ids.is_empty() {
        return None;
    }
    Some(format!(
        "{} of {} partitions stopped short of the target: {}",
        ids.len(),
        report.partitions.len(),
        ids.join(", ")
    ))
}

fn inspect(args: InspectArgs, config: config::MddlmeConfig) -> anyhow::Result<()> {
    check_input(&args.input)?;
    let mesh = read_mesh(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    mesh.validate()?;

    let num_partitions = args
        .partitions
        .unwrap_or(if config.pipeline.num_partitions > 0 {
            config.pipeline.num_partitions
        } else {
            DEFAULT_NUM_PARTITIONS
        });
    let partitioning = MeshPartitioner::new(&mesh, num_partitions)?.partition();
    let bounds = mesh.bounding_box();

    println!("{}", args.input.display());
    println!(
        "  vertices: {} ({} referenced)",
        mesh.vertex_count(),
        mesh.referenced_vertex_count()
    );
    println!("  faces:    {}", mesh.face_count());
    println!(
        "  bounds:   [{:.4}, {:.4}, {:.4}] - [{:.4}, {:.4}, {:.4}]",
        bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
    );
    println!("  extent:   {:.4}", bounds.max_extent());
    println!(
        "  grid:     {}^3, {} non-empty partitions, {} border vertices",
        partitioning.divisions,
        partitioning.len(),
        partitioning.border_vertex_count()
    );
    for partition in &partitioning.partitions {
        println!(
            "    partition {:>4} cell {:?}: {} faces, {} border vertices",
            partition.id,
            partition.cell,
            partition.face_count(),
            partition.border_vertices.len()
        );
    }
    Ok(())
}

fn init_logger(level: &str) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(log::LevelFilter::Info);
    builder.parse_filters(level);
    builder.format(|buf, record| {
        use std::io::Write;
        let module = record.module_path().unwrap_or(record.target());
        writeln!(
            buf,
            "{} [{}] {}: {}",
            buf.timestamp_millis(),
            record.level(),
            module,
            record.args()
        )
    });

    if let Err(err) = builder.try_init() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

fn report_error(err: &anyhow::Error) -> ExitCode {
    error!("{:#}", err);
    match err.downcast_ref::<CliError>() {
        Some(cli_err) => {
            eprintln!("hint: {}", cli_err.suggestion());
            ExitCode::from(1)
        }
        None => ExitCode::from(2),
    }
}
