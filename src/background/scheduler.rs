//! Explicit timer abstraction. Production jobs run on tokio intervals; tests
//! register the same jobs with [`ManualScheduler`] and fire them by hand.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure into a [`Job`].
pub fn job<F, Fut>(f: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

pub trait Scheduler: Send + Sync {
    fn schedule(&self, every: Duration, job: Job) -> CancelToken;
}

/// Handle to a scheduled job. Cancelling stops future ticks; a tick already
/// running is left to finish.
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CancelToken {
    fn new(cancelled: Arc<AtomicBool>, handle: Option<JoinHandle<()>>) -> Self {
        Self { cancelled, handle }
    }

    pub fn cancel(mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Detaching rather than aborting lets an in-flight tick complete.
        self.handle.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, every: Duration, job: Job) -> CancelToken {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                job().await;
            }
        });

        CancelToken::new(cancelled, Some(handle))
    }
}

struct ManualEntry {
    every: Duration,
    job: Job,
    cancelled: Arc<AtomicBool>,
}

/// Scheduler whose jobs only run when a test calls [`ManualScheduler::fire_all`].
#[derive(Clone, Default)]
pub struct ManualScheduler {
    entries: Arc<Mutex<Vec<ManualEntry>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_jobs(&self) -> Vec<(Duration, Job)> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|e| !e.cancelled.load(Ordering::SeqCst));
        entries.iter().map(|e| (e.every, e.job.clone())).collect()
    }

    /// Runs every live job once, in registration order.
    pub async fn fire_all(&self) {
        for (_, job) in self.live_jobs() {
            job().await;
        }
    }

    /// Runs the live jobs registered with exactly this interval.
    pub async fn fire_every(&self, every: Duration) {
        for (_, job) in self.live_jobs().into_iter().filter(|(d, _)| *d == every) {
            job().await;
        }
    }

    pub fn live_count(&self) -> usize {
        self.live_jobs().len()
    }

    /// Intervals of the live jobs, shortest first.
    pub fn intervals(&self) -> Vec<Duration> {
        let mut intervals: Vec<Duration> = self.live_jobs().into_iter().map(|(every, _)| every).collect();
        intervals.sort();
        intervals
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, every: Duration, job: Job) -> CancelToken {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ManualEntry {
                every,
                job,
                cancelled: cancelled.clone(),
            });
        CancelToken::new(cancelled, None)
    }
}
