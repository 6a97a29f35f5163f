// 全ジョブ実行: rayonのスレッドプールでファイル単位に並列化

use rayon::prelude::*;
use tracing::warn;

use crate::pipeline::job_runner::{JobConfig, JobResult, run_job};

/// Run multiple jobs, collecting results in job order.
///
/// Each file is an independent run, so files are processed in parallel on a
/// pool of `parallel_workers` threads (0 = one per CPU). One job failure does
/// NOT prevent other jobs from running.
pub fn run_all_jobs(
    jobs: &[JobConfig],
    parallel_workers: usize,
) -> Vec<crate::error::Result<JobResult>> {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(parallel_workers)
        .build()
    {
        Ok(pool) => pool.install(|| jobs.par_iter().map(run_job).collect()),
        Err(e) => {
            warn!(error = %e, "Thread pool unavailable, running jobs sequentially");
            jobs.iter().map(run_job).collect()
        }
    }
}
