#![forbid(unsafe_code)]

pub mod batch;
pub mod error;
pub mod hdr;
pub mod pipeline;
pub mod postprocess;
pub mod queue;
pub mod runner;
pub mod shard;
pub mod tonemap;

pub use batch::{
    BatchScheduler, BlenderInvoker, DispatchSummary, FailurePolicy, JobType, RenderInvoker,
    RenderMode, parse_job_list,
};
pub use error::{ProbeError, ProbeResult};
pub use hdr::{AlphaMask, CropMode, CropWindow, HdrImage, ProbeRender, load_exr, save_png};
pub use pipeline::{DistributeConfig, PostProcessConfig, distribute, postprocess_dataset};
pub use postprocess::PostProcessor;
pub use queue::{WorkItem, count_render_inputs, enumerate_work_items};
pub use runner::{ItemFailure, RunReport, run_all};
pub use shard::{Batch, ShardRange, batches, shard};
pub use tonemap::{ToneMapParams, ToneMapResult, ToneMapper};
