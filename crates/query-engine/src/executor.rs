//! Query Executor
//!
//! A fixed group of workers pulls [`QueryTask`]s from one bounded channel.
//! Each worker paces the start of its own requests, bounds every request by
//! a timeout, retries transient failures with capped exponential backoff and
//! writes successful batches through to the result store before reporting
//! them. Outcomes are returned in completion order.

use crate::backend::MetricsBackend;
use crate::backoff::BackoffPolicy;
use crate::error::{BackendError, FailureCause, QueryError};
use crate::task::QueryTask;
use alert_model::{RawSample, TimeRange};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use storage::{ResultStore, TaskId};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Worker pool settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of workers
    pub concurrency: usize,
    /// Minimum time between request starts of one worker
    pub delay: Duration,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Delay schedule between retries
    pub backoff: BackoffPolicy,
    /// Narrowest range (seconds) a resolution-exceeded range is halved to
    pub min_split_width: i64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: 12,
            delay: Duration::from_millis(250),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            min_split_width: 120,
        }
    }
}

/// Result of one task
#[derive(Debug)]
pub struct TaskOutcome {
    /// The task as it finished, with its final attempt count
    pub task: QueryTask,
    pub result: Result<Vec<RawSample>, QueryError>,
}

/// Spaces the request starts of a single worker
struct Pacer {
    delay: Duration,
    last_start: Option<Instant>,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_start: None,
        }
    }

    async fn wait(&mut self) {
        if let Some(last) = self.last_start {
            sleep_until(last + self.delay).await;
        }
        self.last_start = Some(Instant::now());
    }
}

/// Bounded worker pool fetching sub-ranges from a metrics backend
#[derive(Clone)]
pub struct QueryExecutor {
    backend: Arc<dyn MetricsBackend>,
    store: Arc<dyn ResultStore>,
    config: Arc<ExecutorConfig>,
}

impl QueryExecutor {
    /// Create an executor writing through to `store`
    pub fn new(
        backend: Arc<dyn MetricsBackend>,
        store: Arc<dyn ResultStore>,
        config: ExecutorConfig,
    ) -> Self {
        info!(
            "Creating query executor: workers={}, delay={:?}, timeout={:?}, max_retries={}",
            config.concurrency, config.delay, config.timeout, config.max_retries
        );
        Self {
            backend,
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `tasks` to completion.
    ///
    /// Cancelling `cancel` stops dispatching immediately; tasks already
    /// picked up by a worker finish (without further retries) and are
    /// included in the returned outcomes.
    pub async fn execute<I>(&self, tasks: I, cancel: CancellationToken) -> Vec<TaskOutcome>
    where
        I: IntoIterator<Item = QueryTask>,
    {
        let concurrency = self.config.concurrency.max(1);
        let (task_tx, task_rx) = mpsc::channel::<QueryTask>(concurrency * 2);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency {
            workers.spawn(self.clone().run_worker(
                worker_id,
                Arc::clone(&task_rx),
                result_tx.clone(),
                cancel.clone(),
            ));
        }
        drop(result_tx);

        let mut dispatched = 0usize;
        for task in tasks {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Run cancelled after dispatching {} task(s)", dispatched);
                    break;
                }
                sent = task_tx.send(task) => {
                    if sent.is_err() {
                        break;
                    }
                    dispatched += 1;
                }
            }
        }
        drop(task_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Query worker aborted: {}", e);
            }
        }

        let mut outcomes = Vec::with_capacity(dispatched);
        while let Some(outcome) = result_rx.recv().await {
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(
            "Executed {} task(s): {} succeeded, {} failed",
            outcomes.len(),
            outcomes.len() - failed,
            failed
        );
        outcomes
    }

    async fn run_worker(
        self,
        worker_id: usize,
        queue: Arc<Mutex<mpsc::Receiver<QueryTask>>>,
        results: mpsc::UnboundedSender<TaskOutcome>,
        cancel: CancellationToken,
    ) {
        let mut pacer = Pacer::new(self.config.delay);

        loop {
            let next = {
                let mut queue = queue.lock().await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    task = queue.recv() => task,
                }
            };
            let Some(mut task) = next else {
                break;
            };

            debug!("Worker {} picked task {} ({})", worker_id, task.id, task.range);
            let result = self.run_task(&mut task, &mut pacer, &cancel).await;
            if results.send(TaskOutcome { task, result }).is_err() {
                break;
            }
        }

        debug!("Worker {} stopped", worker_id);
    }

    async fn run_task(
        &self,
        task: &mut QueryTask,
        pacer: &mut Pacer,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawSample>, QueryError> {
        let result = match self.fetch_task(task, pacer, cancel).await {
            Ok(samples) => self.write_through(task.id, samples).await,
            Err(err) => Err(FailureCause::Backend(err)),
        };

        result.map_err(|cause| {
            counter!("alertmagnet_query_failures_total", "kind" => cause.kind()).increment(1);
            warn!("Task {} for {} failed: {}", task.id, task.range, cause);
            QueryError {
                task: task.clone(),
                cause,
                attempts: task.attempt,
            }
        })
    }

    /// Append a batch on the blocking pool; stores may do file I/O
    async fn write_through(&self, task_id: TaskId, samples: Vec<RawSample>) -> Result<Vec<RawSample>, FailureCause> {
        let store = Arc::clone(&self.store);
        let appended = tokio::task::spawn_blocking(move || store.append(task_id, &samples).map(|_| samples))
            .await
            .map_err(|e| FailureCause::Store(e.to_string()))?;
        appended.map_err(|e| FailureCause::Store(e.to_string()))
    }

    /// Fetch the whole task range, halving sub-ranges the backend rejects as
    /// too fine-grained
    async fn fetch_task(
        &self,
        task: &mut QueryTask,
        pacer: &mut Pacer,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawSample>, BackendError> {
        let mut pending = vec![task.range];
        let mut samples = Vec::new();

        while let Some(range) = pending.pop() {
            match self.fetch_range(task, &range, pacer, cancel).await {
                Ok(batch) => samples.extend(batch),
                Err(BackendError::ResolutionExceeded(message)) => {
                    let (older, newer) = range
                        .split_half(self.config.min_split_width)
                        .ok_or(BackendError::ResolutionExceeded(message))?;
                    debug!("Task {}: halving {} into {} and {}", task.id, range, older, newer);
                    pending.push(newer);
                    pending.push(older);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(samples)
    }

    /// One request with timeout and retries
    async fn fetch_range(
        &self,
        task: &mut QueryTask,
        range: &TimeRange,
        pacer: &mut Pacer,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawSample>, BackendError> {
        let mut retries = 0u32;

        loop {
            pacer.wait().await;
            task.attempt += 1;
            counter!("alertmagnet_query_attempts_total").increment(1);

            let request = self.backend.query(&task.query, range, task.resolution);
            let err = match timeout(self.config.timeout, request).await {
                Ok(Ok(samples)) => {
                    debug!("Task {}: {} sample(s) for {}", task.id, samples.len(), range);
                    return Ok(samples);
                }
                Ok(Err(err)) => err,
                Err(_) => BackendError::Timeout(self.config.timeout),
            };

            if !err.is_retryable() || retries >= self.config.max_retries {
                return Err(err);
            }

            let delay = self.config.backoff.next_delay(retries);
            retries += 1;
            warn!(
                "Task {} attempt {} failed: {}; retrying in {:?}",
                task.id, task.attempt, err, delay
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(err),
                _ = sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Resolution;
    use crate::mock::MockBackend;
    use std::collections::BTreeMap;
    use storage::{MemoryStore, RunManifest, StorageError};

    fn sample(timestamp: i64) -> RawSample {
        RawSample::new("A", BTreeMap::new(), timestamp, 1.0)
    }

    fn tasks(count: u64, width: i64) -> Vec<QueryTask> {
        (0..count)
            .map(|id| {
                let start = id as i64 * width;
                let range = TimeRange::new(start, start + width).unwrap();
                QueryTask::new(id, range, "ALERTS", Resolution::Raw)
            })
            .collect()
    }

    fn config(concurrency: usize, max_retries: u32) -> ExecutorConfig {
        ExecutorConfig {
            concurrency,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
            max_retries,
            backoff: BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(2)),
            min_split_width: 10,
        }
    }

    fn executor(backend: &Arc<MockBackend>, store: Arc<dyn ResultStore>, config: ExecutorConfig) -> QueryExecutor {
        QueryExecutor::new(backend.clone(), store, config)
    }

    fn server_error() -> BackendError {
        BackendError::Server {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let backend = Arc::new(MockBackend::new(vec![sample(10)]).with_failures(vec![server_error(); 2]));
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config(1, 3));

        let outcomes = executor.execute(tasks(1, 100), CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].task.attempt, 3);
        assert_eq!(outcomes[0].result.as_ref().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let backend = Arc::new(MockBackend::new(vec![sample(10)]).with_failures(vec![server_error(); 5]));
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config(1, 2));

        let outcomes = executor.execute(tasks(1, 100), CancellationToken::new()).await;

        let err = outcomes[0].result.as_ref().unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.cause, FailureCause::Backend(server_error()));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried() {
        let failure = BackendError::Client {
            status: 400,
            message: "parse error".to_string(),
        };
        let backend = Arc::new(MockBackend::new(vec![]).with_failures([failure]));
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config(1, 3));

        let outcomes = executor.execute(tasks(1, 100), CancellationToken::new()).await;

        assert_eq!(outcomes[0].result.as_ref().unwrap_err().attempts, 1);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported() {
        let backend = Arc::new(MockBackend::new(vec![]).with_latency(Duration::from_secs(60)));
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config(1, 0));

        let outcomes = executor.execute(tasks(1, 100), CancellationToken::new()).await;

        assert!(matches!(
            outcomes[0].result.as_ref().unwrap_err().cause,
            FailureCause::Backend(BackendError::Timeout(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_workers_run_in_parallel() {
        let backend = Arc::new(MockBackend::new(vec![]).with_latency(Duration::from_secs(1)));
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config(5, 0));
        let started = Instant::now();

        let outcomes = executor.execute(tasks(10, 100), CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 10);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_per_worker() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let mut config = config(1, 0);
        config.delay = Duration::from_secs(5);
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config);
        let started = Instant::now();

        executor.execute(tasks(5, 100), CancellationToken::new()).await;

        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_does_not_serialize_workers() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let mut config = config(2, 0);
        config.delay = Duration::from_secs(5);
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config);
        let started = Instant::now();

        let outcomes = executor.execute(tasks(6, 100), CancellationToken::new()).await;

        // 3 request starts per worker at 0s, 5s and 10s; one shared pace
        // would need 25s
        assert_eq!(outcomes.len(), 6);
        assert_eq!(backend.call_count(), 6);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_exceeded_is_halved() {
        let samples = [10, 30, 70, 130, 170].into_iter().map(sample).collect();
        let backend = Arc::new(MockBackend::new(samples).with_max_width(50));
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config(1, 0));

        let outcomes = executor.execute(tasks(1, 200), CancellationToken::new()).await;

        let fetched = outcomes[0].result.as_ref().unwrap();
        let timestamps: Vec<_> = fetched.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![10, 30, 70, 130, 170]);
        assert_eq!(backend.call_count(), 7);
        assert_eq!(outcomes[0].task.attempt, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halving_stops_at_min_width() {
        let backend = Arc::new(MockBackend::new(vec![]).with_max_width(1));
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config(1, 0));

        let outcomes = executor.execute(tasks(1, 40), CancellationToken::new()).await;

        assert!(matches!(
            outcomes[0].result.as_ref().unwrap_err().cause,
            FailureCause::Backend(BackendError::ResolutionExceeded(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config(2, 0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = executor.execute(tasks(10, 100), cancel).await;

        assert!(outcomes.is_empty());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_lets_in_flight_tasks_finish() {
        let backend = Arc::new(MockBackend::new(vec![sample(10)]).with_latency(Duration::from_secs(3)));
        let executor = executor(&backend, Arc::new(MemoryStore::new()), config(2, 0));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let outcomes = executor.execute(tasks(10, 100), cancel).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_through() {
        let backend = Arc::new(MockBackend::new(vec![sample(10), sample(150)]));
        let store = Arc::new(MemoryStore::new());
        let executor = executor(&backend, store.clone(), config(3, 0));

        let outcomes = executor.execute(tasks(4, 100), CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 4);
        assert_eq!(store.batch_count(), 4);
        let mut ids = store.task_ids();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(store.read_all().unwrap().len(), 2);
    }

    struct RejectingStore;

    impl ResultStore for RejectingStore {
        fn append(&self, _task_id: TaskId, _samples: &[RawSample]) -> Result<(), StorageError> {
            Err(StorageError::LockPoisoned("store closed".to_string()))
        }

        fn read_all(&self) -> Result<Vec<RawSample>, StorageError> {
            Ok(Vec::new())
        }

        fn write_manifest(&self, _manifest: &RunManifest) -> Result<(), StorageError> {
            Ok(())
        }

        fn read_manifest(&self) -> Result<Option<RunManifest>, StorageError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_fails_task() {
        let backend = Arc::new(MockBackend::new(vec![sample(10)]));
        let executor = executor(&backend, Arc::new(RejectingStore), config(1, 3));

        let outcomes = executor.execute(tasks(1, 100), CancellationToken::new()).await;

        let err = outcomes[0].result.as_ref().unwrap_err();
        assert!(matches!(err.cause, FailureCause::Store(_)));
        assert_eq!(backend.call_count(), 1);
    }
}
