//! Progress reporting and cooperative cancellation for coordinator runs.
//!
//! The coordinator stamps one [`ProgressInfo`] per outer iteration and fans it out to
//! every registered [`ProgressCallback`]. Callbacks run on the coordinator's thread
//! between iterations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Snapshot of a run after one outer iteration.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Completed outer iterations.
    pub iteration: usize,
    pub total_iterations: Option<usize>,
    /// Voxels the labeller changed during the iteration.
    pub relabelled: usize,
    /// Voxels carrying the object label afterwards.
    pub object_voxels: usize,
    /// Mean vertex motion of the last solver step.
    pub motion: f64,
    pub elapsed: Duration,
    /// Linear extrapolation from the time spent so far.
    pub estimated_remaining: Option<Duration>,
    /// Extra named values, reported in insertion order.
    pub metrics: Vec<(String, f64)>,
}

impl ProgressInfo {
    pub fn new(iteration: usize, total_iterations: Option<usize>, elapsed: Duration) -> Self {
        let estimated_remaining = match total_iterations {
            Some(total) if iteration > 0 => {
                let per_iteration = elapsed.as_secs_f64() / iteration as f64;
                Some(Duration::from_secs_f64(
                    per_iteration * total.saturating_sub(iteration) as f64,
                ))
            }
            _ => None,
        };
        Self {
            iteration,
            total_iterations,
            relabelled: 0,
            object_voxels: 0,
            motion: 0.0,
            elapsed,
            estimated_remaining,
            metrics: Vec::new(),
        }
    }

    /// Share of the budget spent, in percent. An empty budget counts as finished.
    pub fn progress_percent(&self) -> Option<f64> {
        self.total_iterations.map(|total| match total {
            0 => 100.0,
            _ => 100.0 * self.iteration as f64 / total as f64,
        })
    }

    pub fn add_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.push((name.into(), value));
    }

    fn is_last(&self) -> bool {
        self.total_iterations == Some(self.iteration)
    }
}

/// Receiver of run progress. Only `on_progress` is required.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, info: &ProgressInfo);

    fn on_start(&self) {}

    /// Called once after the last iteration of the budget.
    fn on_complete(&self, _info: &ProgressInfo) {}

    /// Called when a run aborts, including on cancellation.
    fn on_error(&self, _error: &str) {}
}

/// Logs every `log_interval`-th iteration, and the last one, through `tracing`.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl ConsoleProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.iteration % self.log_interval != 0 && !info.is_last() {
            return;
        }
        let eta = info
            .estimated_remaining
            .map(|d| format!("{:.1}s", d.as_secs_f64()))
            .unwrap_or_else(|| "-".to_string());
        tracing::info!(
            iteration = info.iteration,
            percent = info.progress_percent().unwrap_or(0.0),
            relabelled = info.relabelled,
            object_voxels = info.object_voxels,
            motion = info.motion,
            elapsed_s = info.elapsed.as_secs_f64(),
            %eta,
            "segmentation progress"
        );
        for (name, value) in &info.metrics {
            tracing::info!(metric = name.as_str(), value, "segmentation metric");
        }
    }

    fn on_start(&self) {
        tracing::info!("segmentation started");
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            iterations = info.iteration,
            object_voxels = info.object_voxels,
            elapsed_s = info.elapsed.as_secs_f64(),
            "segmentation finished"
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!(error, "segmentation aborted");
    }
}

/// Keeps every reported snapshot, mostly useful in tests.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    records: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_history(&self) -> Vec<ProgressInfo> {
        lock(&self.records).clone()
    }

    pub fn clear(&self) {
        lock(&self.records).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        lock(&self.records).push(info.clone());
    }
}

/// Cooperative cancellation flag shared between a caller and a running coordinator.
///
/// The coordinator checks the flag between outer iterations only; a pass that has
/// started always completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Fans progress out to registered callbacks and keeps the run clock.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    started: Arc<Mutex<Option<Instant>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    pub fn is_started(&self) -> bool {
        lock(&self.started).is_some()
    }

    /// Start the clock and notify callbacks.
    pub fn start(&self) {
        *lock(&self.started) = Some(Instant::now());
        self.callbacks.iter().for_each(|c| c.on_start());
    }

    /// Fresh snapshot stamped with the time since [`start`](Self::start).
    pub fn info(&self, iteration: usize, total_iterations: Option<usize>) -> ProgressInfo {
        let started = *lock(&self.started);
        let elapsed = started.map_or(Duration::ZERO, |t| t.elapsed());
        ProgressInfo::new(iteration, total_iterations, elapsed)
    }

    pub fn update(&self, info: &ProgressInfo) {
        self.callbacks.iter().for_each(|c| c.on_progress(info));
    }

    pub fn complete(&self, info: &ProgressInfo) {
        self.callbacks.iter().for_each(|c| c.on_complete(info));
    }

    pub fn error(&self, error: &str) {
        self.callbacks.iter().for_each(|c| c.on_error(error));
    }
}

// Callbacks never panic while holding a lock, so a poisoned lock still holds valid data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_and_estimate() {
        let info = ProgressInfo::new(10, Some(100), Duration::from_secs(10));
        assert_eq!(info.progress_percent(), Some(10.0));
        let remaining = info.estimated_remaining.unwrap();
        assert!((remaining.as_secs_f64() - 90.0).abs() < 1e-6);

        let unbounded = ProgressInfo::new(3, None, Duration::from_secs(1));
        assert_eq!(unbounded.progress_percent(), None);
        assert!(unbounded.estimated_remaining.is_none());
        assert_eq!(ProgressInfo::new(0, Some(0), Duration::ZERO).progress_percent(), Some(100.0));
    }

    #[test]
    fn test_history_callback() {
        let callback = HistoryCallback::new();
        callback.on_progress(&ProgressInfo::new(1, Some(10), Duration::ZERO));
        callback.on_progress(&ProgressInfo::new(2, Some(10), Duration::ZERO));

        let history = callback.get_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].iteration, 2);

        callback.clear();
        assert!(callback.get_history().is_empty());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_tracker_fans_out() {
        let history = Arc::new(HistoryCallback::new());
        let mut tracker = ProgressTracker::new();
        tracker.add_callback(history.clone());
        assert!(!tracker.is_started());
        tracker.start();
        assert!(tracker.is_started());

        let mut info = tracker.info(1, Some(10));
        info.object_voxels = 42;
        info.add_metric("mesh_interior", 40.0);
        tracker.update(&info);
        tracker.complete(&info);

        let recorded = history.get_history();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].object_voxels, 42);
        assert_eq!(recorded[0].metrics, vec![("mesh_interior".to_string(), 40.0)]);
    }
}
