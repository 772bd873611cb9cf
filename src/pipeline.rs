//! End-to-end stage glue: shard-and-render, then post-process.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::batch::{BatchScheduler, DispatchSummary, FailurePolicy, JobType, RenderInvoker};
use crate::error::ProbeResult;
use crate::hdr::{CropMode, load_exr, save_png};
use crate::postprocess::PostProcessor;
use crate::queue::{WorkItem, count_render_inputs, enumerate_work_items};
use crate::runner::{RunReport, run_all};
use crate::shard::shard;
use crate::tonemap::ToneMapParams;

/// Configuration for the distribution (render) stage of one worker instance.
#[derive(Clone, Debug)]
pub struct DistributeConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub jobs: Vec<JobType>,
    pub worker_index: usize,
    pub worker_count: usize,
    pub batch_size: usize,
    pub policy: FailurePolicy,
}

/// Render this worker's shard of the input environment maps.
///
/// Horizontal scaling is external: every machine runs this with the same
/// inputs and a different `worker_index`; the shards are disjoint by
/// construction so the instances never need to talk to each other.
pub fn distribute(
    cfg: &DistributeConfig,
    invoker: &dyn RenderInvoker,
) -> ProbeResult<DispatchSummary> {
    let total = count_render_inputs(&cfg.input_dir)?;
    let range = shard(total, cfg.worker_count, cfg.worker_index)?.clamp_to(total);

    tracing::info!(
        total,
        worker = cfg.worker_index,
        of = cfg.worker_count,
        begin = range.begin,
        end = range.end,
        "rendering shard"
    );

    let scheduler = BatchScheduler::new(cfg.batch_size, cfg.jobs.clone(), cfg.policy)?;
    scheduler.run(range, invoker)
}

/// Configuration for the post-processing stage.
#[derive(Clone, Debug)]
pub struct PostProcessConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub groups: Vec<String>,
    pub crop_mode: CropMode,
    pub clip_only: bool,
    pub tone: ToneMapParams,
    pub white_background: bool,
    pub pool_size: usize,
}

/// Convert every rendered HDR file under the configured groups into an 8-bit
/// PNG mirroring the group layout.
pub fn postprocess_dataset(
    cfg: &PostProcessConfig,
    on_progress: impl Fn(usize, usize) + Sync,
) -> ProbeResult<RunReport> {
    let processor = PostProcessor::new(
        cfg.crop_mode,
        cfg.clip_only,
        cfg.tone,
        cfg.white_background,
    )?;

    let items = enumerate_work_items(&cfg.input_dir, &cfg.groups)?;
    for group in &cfg.groups {
        let dir = cfg.output_dir.join(group);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create output dir '{}'", dir.display()))?;
    }

    tracing::info!(items = items.len(), pool = cfg.pool_size, "post-processing renders");

    run_all(
        &items,
        |item| process_one(&cfg.input_dir, &cfg.output_dir, &processor, item),
        cfg.pool_size,
        on_progress,
    )
}

fn process_one(
    input_dir: &Path,
    output_dir: &Path,
    processor: &PostProcessor,
    item: &WorkItem,
) -> ProbeResult<()> {
    let render = load_exr(&item.input_path(input_dir))?;
    let viewable = processor.process(&render)?;
    save_png(&item.output_path(output_dir), &viewable)
}
