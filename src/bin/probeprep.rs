use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

use probeprep::{
    BlenderInvoker, CropMode, DistributeConfig, FailurePolicy, PostProcessConfig, RenderMode,
    RunReport, ToneMapParams, distribute, parse_job_list, postprocess_dataset,
};

#[derive(Parser, Debug)]
#[command(name = "probeprep", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render this worker's shard of probe spheres via headless Blender.
    Render(RenderArgs),
    /// Crop, tone-map and composite rendered HDR probes into 8-bit PNGs.
    Crop(CropArgs),
    /// Render everything with a single worker, then post-process.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Directory of environment map EXRs.
    #[arg(long = "input-dir")]
    input_dir: PathBuf,

    /// Directory the renderer writes HDR probe renders into.
    #[arg(long = "output-dir")]
    output_dir: PathBuf,

    /// Comma-separated job types, dispatched in this order per batch.
    #[arg(long, default_value = "mirror,matte_silver,diffuse")]
    tasks: String,

    /// This worker's index, 0-based.
    #[arg(long = "worker-index", default_value_t = 0)]
    worker_index: usize,

    /// Total number of worker instances across all machines.
    #[arg(long = "worker-count", default_value_t = 1)]
    worker_count: usize,

    /// Items per renderer invocation.
    #[arg(long = "batch-size", default_value_t = 10)]
    batch_size: usize,

    /// Blender executable.
    #[arg(long = "blender-path", default_value = "blender")]
    blender_path: PathBuf,

    /// Directory holding the per-job scene scripts.
    #[arg(long = "scripts-dir", default_value = "renderer")]
    scripts_dir: PathBuf,

    /// Camera setup the scene scripts target.
    #[arg(long, value_enum, default_value_t = ModeChoice::Front)]
    mode: ModeChoice,

    /// Render resolution as a percentage of full frame.
    #[arg(long, default_value_t = 50)]
    resolution: u32,

    /// Render sample count.
    #[arg(long, default_value_t = 5)]
    samples: u32,

    /// What to do when a renderer invocation fails.
    #[arg(long = "on-failure", value_enum, default_value_t = FailureChoice::Continue)]
    on_failure: FailureChoice,
}

#[derive(Parser, Debug)]
struct CropArgs {
    /// Directory of rendered HDR probes, grouped by job-type subdirectory.
    #[arg(long = "input-dir")]
    input_dir: PathBuf,

    /// Directory the PNGs are written into, mirroring the group layout.
    #[arg(long = "output-dir")]
    output_dir: PathBuf,

    /// Comma-separated group subdirectories to process.
    #[arg(long, default_value = "mirror,matte_silver,diffuse")]
    groups: String,

    /// Which fixed crop window to apply.
    #[arg(long, value_enum, default_value_t = ModeChoice::Front)]
    mode: ModeChoice,

    /// Clip HDR values to [0, 1] instead of tone-mapping.
    #[arg(long = "clip-only")]
    clip_only: bool,

    /// Tone-map display gamma.
    #[arg(long, default_value_t = 2.4)]
    gamma: f32,

    /// Percentile of positive samples mapped to the target value.
    #[arg(long, default_value_t = 97.5)]
    percentile: f32,

    /// Display value the chosen percentile maps to.
    #[arg(long = "max-mapping", default_value_t = 0.9)]
    max_mapping: f32,

    /// Keep the alpha channel instead of compositing over white.
    #[arg(long = "no-white-bg")]
    no_white_bg: bool,

    /// Worker pool size for parallel post-processing.
    #[arg(long, default_value_t = 16)]
    jobs: usize,

    /// Write a JSON run report (counts plus per-item failures) here.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Directory of environment map EXRs.
    #[arg(long = "envmap-dir")]
    envmap_dir: PathBuf,

    /// Directory for intermediate HDR probe renders.
    #[arg(long = "render-dir")]
    render_dir: PathBuf,

    /// Directory for the final cropped PNGs.
    #[arg(long = "output-dir")]
    output_dir: PathBuf,

    /// Blender executable.
    #[arg(long = "blender-path", default_value = "blender")]
    blender_path: PathBuf,

    /// Directory holding the per-job scene scripts.
    #[arg(long = "scripts-dir", default_value = "renderer")]
    scripts_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Front,
    Standard,
}

impl ModeChoice {
    fn render_mode(self) -> RenderMode {
        match self {
            ModeChoice::Front => RenderMode::Front,
            ModeChoice::Standard => RenderMode::Standard,
        }
    }

    fn crop_mode(self) -> CropMode {
        match self {
            ModeChoice::Front => CropMode::Front,
            ModeChoice::Standard => CropMode::Standard,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FailureChoice {
    /// Log the failed batch and keep going; rerun later to fill gaps.
    Continue,
    /// Stop the shard at the first failed invocation.
    Abort,
}

impl FailureChoice {
    fn policy(self) -> FailurePolicy {
        match self {
            FailureChoice::Continue => FailurePolicy::LogAndContinue,
            FailureChoice::Abort => FailurePolicy::Abort,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Crop(args) => cmd_crop(args),
        Command::Run(args) => cmd_run(args),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let cfg = DistributeConfig {
        input_dir: args.input_dir.clone(),
        output_dir: args.output_dir.clone(),
        jobs: parse_job_list(&args.tasks)?,
        worker_index: args.worker_index,
        worker_count: args.worker_count,
        batch_size: args.batch_size,
        policy: args.on_failure.policy(),
    };

    let invoker = BlenderInvoker::new(
        args.blender_path,
        args.scripts_dir,
        args.input_dir,
        args.output_dir,
        args.mode.render_mode(),
    )
    .with_quality(args.resolution, args.samples);

    let summary = distribute(&cfg, &invoker)?;
    eprintln!(
        "dispatched {} invocation(s) over {} batch(es), {} failed",
        summary.invocations, summary.batches, summary.failures
    );
    Ok(())
}

fn cmd_crop(args: CropArgs) -> anyhow::Result<()> {
    let cfg = PostProcessConfig {
        input_dir: args.input_dir,
        output_dir: args.output_dir,
        groups: args
            .groups
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect(),
        crop_mode: args.mode.crop_mode(),
        clip_only: args.clip_only,
        tone: ToneMapParams {
            gamma: args.gamma,
            percentile: args.percentile,
            max_mapping: args.max_mapping,
        },
        white_background: !args.no_white_bg,
        pool_size: args.jobs,
    };

    let report = postprocess_dataset(&cfg, |done, total| {
        eprint!("\rprocessed {done}/{total}");
        let _ = std::io::stderr().flush();
    })?;
    eprintln!();

    report_summary(&report);
    if let Some(path) = args.report {
        write_report(&path, &report)?;
        eprintln!("wrote report {}", path.display());
    }
    Ok(())
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let render_args = RenderArgs {
        input_dir: args.envmap_dir,
        output_dir: args.render_dir.clone(),
        tasks: "mirror,matte_silver,diffuse".to_string(),
        worker_index: 0,
        worker_count: 1,
        batch_size: 10,
        blender_path: args.blender_path,
        scripts_dir: args.scripts_dir,
        mode: ModeChoice::Front,
        resolution: 50,
        samples: 5,
        on_failure: FailureChoice::Continue,
    };
    cmd_render(render_args)?;

    let crop_args = CropArgs {
        input_dir: args.render_dir,
        output_dir: args.output_dir,
        groups: "mirror,matte_silver,diffuse".to_string(),
        mode: ModeChoice::Front,
        clip_only: false,
        gamma: 2.4,
        percentile: 97.5,
        max_mapping: 0.9,
        no_white_bg: false,
        jobs: 16,
        report: None,
    };
    cmd_crop(crop_args)
}

fn report_summary(report: &RunReport) {
    if report.all_succeeded() {
        eprintln!("post-processed {} item(s)", report.completed);
    } else {
        eprintln!(
            "post-processed {} of {} item(s); {} failed",
            report.completed,
            report.total,
            report.failures.len()
        );
        for failure in &report.failures {
            eprintln!("  {}/{}: {}", failure.group, failure.file_name, failure.error);
        }
    }
}

fn write_report(path: &PathBuf, report: &RunReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create report dir '{}'", parent.display()))?;
    }
    let f = std::fs::File::create(path)
        .with_context(|| format!("create report '{}'", path.display()))?;
    serde_json::to_writer_pretty(f, report).context("serialize run report")?;
    Ok(())
}
