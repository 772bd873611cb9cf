//! Bounded-pool fan-out for per-item post-processing.
//!
//! The first item always runs synchronously, outside the pool: a systemic
//! misconfiguration (bad paths, bad parameters) then surfaces immediately
//! instead of after spawning a full pool of doomed workers. Once the probe
//! item succeeds, the remaining items fan out over a fixed-size thread pool.
//! Items are independent (one input file in, one distinct output file out),
//! so later failures are collected and reported at the end rather than
//! tearing the run down.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context as _;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{ProbeError, ProbeResult};
use crate::queue::WorkItem;

/// One item that failed after the probe phase.
#[derive(Clone, Debug, Serialize)]
pub struct ItemFailure {
    pub group: String,
    pub file_name: String,
    pub error: String,
}

/// Outcome of a full post-processing run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub completed: usize,
    pub failures: Vec<ItemFailure>,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run `worker` over every item with at most `pool_size` items in flight.
///
/// `on_progress(done, total)` fires once per completed item, including
/// failed ones, with no completion-order guarantee after the probe item.
pub fn run_all<W, P>(
    items: &[WorkItem],
    worker: W,
    pool_size: usize,
    on_progress: P,
) -> ProbeResult<RunReport>
where
    W: Fn(&WorkItem) -> ProbeResult<()> + Sync,
    P: Fn(usize, usize) + Sync,
{
    if pool_size == 0 {
        return Err(ProbeError::config("worker pool size must be positive"));
    }

    let total = items.len();
    let Some((probe, rest)) = items.split_first() else {
        return Ok(RunReport::default());
    };

    // Fail-fast probe: an error here aborts the whole run.
    worker(probe)?;
    on_progress(1, total);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size)
        .build()
        .context("build post-processing thread pool")?;

    let done = AtomicUsize::new(1);
    let failures: Vec<ItemFailure> = pool.install(|| {
        rest.par_iter()
            .filter_map(|item| {
                let outcome = worker(item);
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                on_progress(finished, total);
                match outcome {
                    Ok(()) => None,
                    Err(err) => {
                        tracing::warn!(
                            group = %item.group,
                            file = %item.file_name,
                            error = %err,
                            "post-processing failed; continuing"
                        );
                        Some(ItemFailure {
                            group: item.group.clone(),
                            file_name: item.file_name.clone(),
                            error: err.to_string(),
                        })
                    }
                }
            })
            .collect()
    });

    Ok(RunReport {
        total,
        completed: total - failures.len(),
        failures,
    })
}
