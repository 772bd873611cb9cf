use std::path::PathBuf;
use std::sync::Mutex;

use probeprep::{
    Batch, DistributeConfig, FailurePolicy, JobType, ProbeResult, RenderInvoker, distribute,
};

struct Recording {
    calls: Mutex<Vec<(JobType, Batch)>>,
}

impl Recording {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl RenderInvoker for Recording {
    fn ensure_supported(&self, _job: JobType) -> ProbeResult<()> {
        Ok(())
    }

    fn invoke(&self, job: JobType, batch: Batch) -> ProbeResult<()> {
        self.calls.lock().unwrap().push((job, batch));
        Ok(())
    }
}

fn envmap_dir(name: &str, count: usize) -> PathBuf {
    let dir = PathBuf::from("target").join("distribute_tests").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    for i in 0..count {
        std::fs::write(dir.join(format!("env{i:03}.exr")), b"").unwrap();
    }
    dir
}

fn config(input_dir: PathBuf, worker_index: usize, worker_count: usize) -> DistributeConfig {
    DistributeConfig {
        output_dir: input_dir.join("out"),
        input_dir,
        jobs: vec![JobType::Mirror, JobType::Diffuse],
        worker_index,
        worker_count,
        batch_size: 10,
        policy: FailurePolicy::LogAndContinue,
    }
}

#[test]
fn middle_worker_renders_only_its_shard() {
    let input = envmap_dir("middle_worker", 25);
    let invoker = Recording::new();

    // 25 items over 3 workers: ceil(25/3) = 9, worker 1 owns [9, 18).
    let summary = distribute(&config(input, 1, 3), &invoker).unwrap();
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.invocations, 2);

    let calls = invoker.calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            (JobType::Mirror, Batch { begin: 9, end: 18 }),
            (JobType::Diffuse, Batch { begin: 9, end: 18 }),
        ]
    );
}

#[test]
fn last_worker_shard_is_clamped_to_the_item_count() {
    let input = envmap_dir("last_worker", 25);
    let invoker = Recording::new();

    let mut cfg = config(input, 2, 3);
    cfg.batch_size = 4;
    distribute(&cfg, &invoker).unwrap();

    let calls = invoker.calls.lock().unwrap();
    let batches: Vec<Batch> = calls
        .iter()
        .filter(|(job, _)| *job == JobType::Mirror)
        .map(|&(_, batch)| batch)
        .collect();
    assert_eq!(
        batches,
        vec![Batch { begin: 18, end: 22 }, Batch { begin: 22, end: 25 }]
    );
}

#[test]
fn single_worker_covers_all_items_in_order() {
    let input = envmap_dir("single_worker", 12);
    let invoker = Recording::new();

    let mut cfg = config(input, 0, 1);
    cfg.batch_size = 5;
    cfg.jobs = vec![JobType::MatteSilver];
    let summary = distribute(&cfg, &invoker).unwrap();

    assert_eq!(summary.batches, 3);
    let calls = invoker.calls.lock().unwrap();
    let ends: Vec<usize> = calls.iter().map(|&(_, b)| b.end).collect();
    assert_eq!(ends, vec![5, 10, 12]);
}

#[test]
fn out_of_range_worker_index_is_a_config_error() {
    let input = envmap_dir("bad_index", 5);
    let invoker = Recording::new();
    assert!(distribute(&config(input, 3, 3), &invoker).is_err());
    assert!(invoker.calls.lock().unwrap().is_empty());
}
