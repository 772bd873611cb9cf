//! Batch dispatch to the external renderer.
//!
//! A shard is walked in ascending fixed-size batches; for each batch every
//! requested job type is dispatched in caller order, one blocking renderer
//! invocation at a time. Job types stay sequential because they share the
//! render device. Skip-if-output-exists idempotency lives in the renderer
//! scene scripts; the scheduler never inspects output files, so a killed run
//! is recovered by simply rerunning the same shard.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;

use anyhow::Context as _;

use crate::error::{ProbeError, ProbeResult};
use crate::shard::{Batch, ShardRange, batches};

/// The closed set of probe materials the renderer can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobType {
    Diffuse,
    MatteSilver,
    Mirror,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::Mirror, JobType::MatteSilver, JobType::Diffuse];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Diffuse => "diffuse",
            JobType::MatteSilver => "matte_silver",
            JobType::Mirror => "mirror",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ProbeError;

    fn from_str(s: &str) -> ProbeResult<Self> {
        match s {
            "diffuse" => Ok(JobType::Diffuse),
            "matte_silver" => Ok(JobType::MatteSilver),
            "mirror" => Ok(JobType::Mirror),
            other => Err(ProbeError::config(format!(
                "unknown job type '{other}' (expected one of: diffuse, matte_silver, mirror)"
            ))),
        }
    }
}

/// Parse a comma-separated job list, e.g. `"mirror,matte_silver,diffuse"`.
/// Unknown tags are rejected here, at configuration-load time.
pub fn parse_job_list(s: &str) -> ProbeResult<Vec<JobType>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(JobType::from_str)
        .collect()
}

/// Camera setup the scene scripts were authored for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    Front,
    Standard,
}

/// What to do when a renderer invocation exits unsuccessfully.
///
/// The renderer skips already-rendered outputs, so a failed batch is
/// recoverable by rerunning; logging and continuing is therefore the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    LogAndContinue,
    Abort,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub batches: usize,
    pub invocations: usize,
    pub failures: usize,
}

/// One external render invocation per (job, batch) pair.
pub trait RenderInvoker {
    /// Reject a job the invoker cannot dispatch. Called for every job of a
    /// batch before that batch issues its first invocation.
    fn ensure_supported(&self, job: JobType) -> ProbeResult<()>;

    /// Run the renderer for `job` over `batch`, blocking until it exits.
    fn invoke(&self, job: JobType, batch: Batch) -> ProbeResult<()>;
}

pub struct BatchScheduler {
    batch_size: usize,
    jobs: Vec<JobType>,
    policy: FailurePolicy,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, jobs: Vec<JobType>, policy: FailurePolicy) -> ProbeResult<Self> {
        if batch_size == 0 {
            return Err(ProbeError::config("batch size must be positive"));
        }
        if jobs.is_empty() {
            return Err(ProbeError::config("at least one job type is required"));
        }
        Ok(Self {
            batch_size,
            jobs,
            policy,
        })
    }

    /// Walk `range` batch by batch, dispatching every configured job type in
    /// order. Unsupported jobs fail before any invocation of the offending
    /// batch is issued; renderer failures follow the configured policy.
    pub fn run(
        &self,
        range: ShardRange,
        invoker: &dyn RenderInvoker,
    ) -> ProbeResult<DispatchSummary> {
        let mut summary = DispatchSummary::default();

        for batch in batches(range, self.batch_size)? {
            for &job in &self.jobs {
                invoker.ensure_supported(job)?;
            }

            summary.batches += 1;
            for &job in &self.jobs {
                summary.invocations += 1;
                match invoker.invoke(job, batch) {
                    Ok(()) => {}
                    Err(err @ (ProbeError::Config(_) | ProbeError::Unsupported(_))) => {
                        return Err(err);
                    }
                    Err(err) => match self.policy {
                        FailurePolicy::Abort => return Err(err),
                        FailurePolicy::LogAndContinue => {
                            tracing::warn!(
                                job = %job,
                                begin = batch.begin,
                                end = batch.end,
                                error = %err,
                                "render invocation failed; continuing"
                            );
                            summary.failures += 1;
                        }
                    },
                }
            }
        }

        Ok(summary)
    }
}

/// Dispatches render jobs to a headless Blender process, one scene script per
/// job type.
pub struct BlenderInvoker {
    blender_path: PathBuf,
    scripts_dir: PathBuf,
    input_dir: PathBuf,
    output_dir: PathBuf,
    mode: RenderMode,
    resolution_percent: u32,
    sample_count: u32,
}

impl BlenderInvoker {
    pub fn new(
        blender_path: impl Into<PathBuf>,
        scripts_dir: impl Into<PathBuf>,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        mode: RenderMode,
    ) -> Self {
        Self {
            blender_path: blender_path.into(),
            scripts_dir: scripts_dir.into(),
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            mode,
            resolution_percent: 50,
            sample_count: 5,
        }
    }

    pub fn with_quality(mut self, resolution_percent: u32, sample_count: u32) -> Self {
        self.resolution_percent = resolution_percent;
        self.sample_count = sample_count;
        self
    }

    fn script_for(&self, job: JobType) -> ProbeResult<PathBuf> {
        let name = match (self.mode, job) {
            (RenderMode::Front, JobType::Diffuse) => "front_diffuse.py",
            (RenderMode::Front, JobType::MatteSilver) => "front_matte_silver.py",
            (RenderMode::Front, JobType::Mirror) => "front_mirror.py",
            (RenderMode::Standard, job) => {
                return Err(ProbeError::unsupported(format!(
                    "no standard-mode scene script for job '{job}'"
                )));
            }
        };
        Ok(self.scripts_dir.join(name))
    }
}

impl RenderInvoker for BlenderInvoker {
    fn ensure_supported(&self, job: JobType) -> ProbeResult<()> {
        self.script_for(job).map(|_| ())
    }

    fn invoke(&self, job: JobType, batch: Batch) -> ProbeResult<()> {
        let script = self.script_for(job)?;

        let mut cmd = Command::new(&self.blender_path);
        cmd.arg("--background")
            .arg("--python")
            .arg(&script)
            .arg("--")
            .arg(self.resolution_percent.to_string())
            .arg(self.sample_count.to_string())
            .arg(&self.input_dir)
            .arg(&self.output_dir)
            .arg(batch.begin.to_string())
            .arg(batch.end.to_string());

        tracing::info!(
            job = %job,
            begin = batch.begin,
            end = batch.end,
            script = %script.display(),
            "dispatching render batch"
        );

        let status = cmd.status().with_context(|| {
            format!(
                "spawn renderer '{}' (is it installed and on PATH?)",
                self.blender_path.display()
            )
        })?;

        if !status.success() {
            return Err(ProbeError::render(format!(
                "renderer exited with {status} for job '{job}' batch [{}, {})",
                batch.begin, batch.end
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    struct Recording {
        calls: Mutex<Vec<(JobType, Batch)>>,
        fail_jobs: Vec<JobType>,
        unsupported: Vec<JobType>,
    }

    impl Recording {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_jobs: Vec::new(),
                unsupported: Vec::new(),
            }
        }

        fn calls(&self) -> Vec<(JobType, Batch)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RenderInvoker for Recording {
        fn ensure_supported(&self, job: JobType) -> ProbeResult<()> {
            if self.unsupported.contains(&job) {
                return Err(ProbeError::unsupported(format!("job '{job}'")));
            }
            Ok(())
        }

        fn invoke(&self, job: JobType, batch: Batch) -> ProbeResult<()> {
            self.calls.lock().unwrap().push((job, batch));
            if self.fail_jobs.contains(&job) {
                return Err(ProbeError::render(format!("job '{job}' exploded")));
            }
            Ok(())
        }
    }

    #[test]
    fn parse_job_list_accepts_known_tags_in_order() {
        let jobs = parse_job_list("mirror, matte_silver,diffuse").unwrap();
        assert_eq!(jobs, vec![JobType::Mirror, JobType::MatteSilver, JobType::Diffuse]);
    }

    #[test]
    fn parse_job_list_rejects_unknown_tags() {
        assert!(parse_job_list("mirror,chrome").is_err());
    }

    #[test]
    fn dispatch_preserves_batch_then_job_order() {
        let invoker = Recording::new();
        let scheduler = BatchScheduler::new(
            4,
            vec![JobType::Mirror, JobType::Diffuse],
            FailurePolicy::Abort,
        )
        .unwrap();

        let summary = scheduler
            .run(ShardRange { begin: 0, end: 6 }, &invoker)
            .unwrap();

        assert_eq!(summary.batches, 2);
        assert_eq!(summary.invocations, 4);
        assert_eq!(summary.failures, 0);
        assert_eq!(
            invoker.calls(),
            vec![
                (JobType::Mirror, Batch { begin: 0, end: 4 }),
                (JobType::Diffuse, Batch { begin: 0, end: 4 }),
                (JobType::Mirror, Batch { begin: 4, end: 6 }),
                (JobType::Diffuse, Batch { begin: 4, end: 6 }),
            ]
        );
    }

    #[test]
    fn log_and_continue_counts_failures_and_keeps_going() {
        let mut invoker = Recording::new();
        invoker.fail_jobs.push(JobType::Mirror);
        let scheduler = BatchScheduler::new(
            5,
            vec![JobType::Mirror, JobType::Diffuse],
            FailurePolicy::LogAndContinue,
        )
        .unwrap();

        let summary = scheduler
            .run(ShardRange { begin: 0, end: 10 }, &invoker)
            .unwrap();

        assert_eq!(summary.batches, 2);
        assert_eq!(summary.invocations, 4);
        assert_eq!(summary.failures, 2);
    }

    #[test]
    fn abort_policy_stops_at_first_failure() {
        let mut invoker = Recording::new();
        invoker.fail_jobs.push(JobType::Mirror);
        let scheduler =
            BatchScheduler::new(5, vec![JobType::Mirror, JobType::Diffuse], FailurePolicy::Abort)
                .unwrap();

        assert!(
            scheduler
                .run(ShardRange { begin: 0, end: 10 }, &invoker)
                .is_err()
        );
        assert_eq!(invoker.calls().len(), 1);
    }

    #[test]
    fn unsupported_job_fails_before_any_invocation() {
        let mut invoker = Recording::new();
        invoker.unsupported.push(JobType::Diffuse);
        let scheduler = BatchScheduler::new(
            5,
            vec![JobType::Mirror, JobType::Diffuse],
            FailurePolicy::LogAndContinue,
        )
        .unwrap();

        let err = scheduler
            .run(ShardRange { begin: 0, end: 5 }, &invoker)
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unsupported(_)));
        assert!(invoker.calls().is_empty());
    }

    #[test]
    fn standard_mode_has_no_scene_scripts() {
        let invoker = BlenderInvoker::new(
            "blender",
            "renderer",
            "in",
            "out",
            RenderMode::Standard,
        );
        for job in JobType::ALL {
            assert!(matches!(
                invoker.ensure_supported(job),
                Err(ProbeError::Unsupported(_))
            ));
        }
    }

    #[test]
    fn front_mode_maps_each_job_to_a_script() {
        let invoker =
            BlenderInvoker::new("blender", "renderer", "in", "out", RenderMode::Front);
        for job in JobType::ALL {
            assert!(invoker.ensure_supported(job).is_ok());
        }
        assert_eq!(
            invoker.script_for(JobType::MatteSilver).unwrap(),
            Path::new("renderer").join("front_matte_silver.py")
        );
    }

    #[test]
    fn scheduler_rejects_degenerate_configuration() {
        assert!(BatchScheduler::new(0, vec![JobType::Mirror], FailurePolicy::default()).is_err());
        assert!(BatchScheduler::new(10, vec![], FailurePolicy::default()).is_err());
    }
}
