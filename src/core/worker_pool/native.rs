//! Thread-backed pool: dedicated OS threads, each with its own
//! single-threaded tokio runtime.
//!
//! Threads are spawned lazily, up to `max_concurrency`, when the queued work
//! exceeds the free slots of the live workers. Each worker runs up to
//! `per_worker_concurrency` tasks at once and exits after `idle_timeout`
//! without work.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on the job channel; replies travel over a
//!   oneshot, drain waits on a `Notify`
//! - **Clean shutdown**: dropping the sender lets workers finish what is
//!   queued, then exit

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::core::{Resource, TaskContext, TaskError, TaskHandler};

use super::{ExecutionPool, PoolCounters, PoolError, PoolStats};

/// A task waiting for a worker.
struct Job {
    resource: Resource,
    ctx: TaskContext,
    reply: oneshot::Sender<Result<(), TaskError>>,
    enqueued_at: Instant,
}

/// State shared between the pool handle and its worker threads.
struct Shared {
    id: String,
    config: PoolConfig,
    handler: Arc<dyn TaskHandler>,
    counters: PoolCounters,
    live_workers: AtomicUsize,
    spawned_workers: AtomicUsize,
}

/// Pool running task bodies on dedicated OS threads.
pub struct ThreadPool {
    shared: Arc<Shared>,

    /// Job sender. `None` once the pool is shut down.
    job_tx: Mutex<Option<Sender<Job>>>,

    /// Receiver cloned into each lazily spawned worker.
    job_rx: Receiver<Job>,

    needs_drain: AtomicBool,
}

impl ThreadPool {
    /// Create a pool. No thread is spawned until work arrives.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn new(id: impl Into<String>, config: PoolConfig, handler: Arc<dyn TaskHandler>) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        let id = id.into();
        let (job_tx, job_rx) = unbounded();

        info!(
            pool = %id,
            max_concurrency = config.max_concurrency,
            per_worker_concurrency = config.per_worker_concurrency,
            "thread pool initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                config,
                handler,
                counters: PoolCounters::default(),
                live_workers: AtomicUsize::new(0),
                spawned_workers: AtomicUsize::new(0),
            }),
            job_tx: Mutex::new(Some(job_tx)),
            job_rx,
            needs_drain: AtomicBool::new(false),
        })
    }

    /// Spawn one more worker if queued work exceeds the free slots.
    fn ensure_worker(&self) -> Result<(), PoolError> {
        let shared = &self.shared;
        let per_worker = shared.config.per_worker_concurrency;
        loop {
            let live = shared.live_workers.load(Ordering::Acquire);
            let in_flight = usize::try_from(shared.counters.in_flight()).unwrap_or(usize::MAX);
            if live >= shared.config.max_concurrency || in_flight <= live * per_worker {
                return Ok(());
            }
            if shared
                .live_workers
                .compare_exchange(live, live + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        let worker_id = shared.spawned_workers.fetch_add(1, Ordering::Relaxed);
        let worker_shared = Arc::clone(shared);
        let rx = self.job_rx.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-worker-{worker_id}", shared.id))
            .stack_size(shared.config.thread_stack_size)
            .spawn(move || worker_main(worker_id, &worker_shared, &rx));

        if let Err(e) = spawned {
            shared.live_workers.fetch_sub(1, Ordering::AcqRel);
            error!(pool = %shared.id, error = %e, "failed to spawn worker thread");
            return Err(PoolError::Internal(format!("failed to spawn worker thread: {e}")));
        }
        Ok(())
    }

    /// Drop the job sender. Workers finish the queued jobs, then exit.
    fn shutdown(&self) {
        if self.job_tx.lock().take().is_some() {
            info!(pool = %self.shared.id, "thread pool shut down");
        }
    }
}

#[async_trait]
impl ExecutionPool for ThreadPool {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    fn is_available(&self) -> bool {
        !self.needs_drain.load(Ordering::Acquire)
    }

    async fn run(&self, resource: Resource, ctx: TaskContext) -> Result<(), PoolError> {
        if !self.is_available() {
            return Err(PoolError::Draining);
        }

        let (reply, response) = oneshot::channel();
        let task = ctx.name.clone();
        let job = Job {
            resource,
            ctx,
            reply,
            enqueued_at: Instant::now(),
        };

        let Some(tx) = self.job_tx.lock().clone() else {
            return Err(PoolError::PoolShutdown);
        };
        // Counted before a worker is ensured so the new job claims a slot.
        self.shared.counters.submitted();
        if let Err(e) = self.ensure_worker() {
            self.shared.counters.abandoned();
            return Err(e);
        }
        if tx.send(job).is_err() {
            self.shared.counters.abandoned();
            return Err(PoolError::PoolShutdown);
        }
        drop(tx);
        debug!(pool = %self.shared.id, task = %task, "task queued");

        match response.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(PoolError::TaskFailed(err)),
            Err(_) => Err(PoolError::Internal(format!("worker dropped task `{task}`"))),
        }
    }

    async fn drain(&self) -> bool {
        self.needs_drain.store(true, Ordering::Release);
        let timeout = self.shared.config.close_timeout();
        info!(pool = %self.shared.id, in_flight = self.shared.counters.in_flight(), "draining pool");

        let finished = self.shared.counters.wait_idle(timeout).await;
        if !finished {
            warn!(
                pool = %self.shared.id,
                in_flight = self.shared.counters.in_flight(),
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "pool did not drain within close timeout"
            );
        }
        self.shutdown();
        finished
    }

    fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot(
            &self.shared.config,
            self.shared.live_workers.load(Ordering::Relaxed),
            !self.is_available(),
        )
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Workers are detached, not joined.
        self.shutdown();
    }
}

/// Body of a worker thread.
fn worker_main(worker_id: usize, shared: &Arc<Shared>, rx: &Receiver<Job>) {
    debug!(pool = %shared.id, worker_id, "worker thread started");

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(pool = %shared.id, worker_id, error = %e, "failed to create worker runtime");
            shared.live_workers.fetch_sub(1, Ordering::AcqRel);
            return;
        }
    };

    rt.block_on(worker_loop(worker_id, Arc::clone(shared), rx.clone()));
    debug!(pool = %shared.id, worker_id, "worker thread exiting");
}

/// Receive jobs and run up to `per_worker_concurrency` of them at once.
///
/// Decrements `live_workers` itself when it decides to exit so a concurrent
/// `run` sees the vacancy and spawns a replacement.
async fn worker_loop(worker_id: usize, shared: Arc<Shared>, rx: Receiver<Job>) {
    let slots = shared.config.per_worker_concurrency;
    let permits = Arc::new(Semaphore::new(slots));
    let idle_timeout = shared.config.idle_timeout();
    let mut running = tokio::task::JoinSet::new();

    loop {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };

        let job_rx = rx.clone();
        let received = tokio::task::spawn_blocking(move || job_rx.recv_timeout(idle_timeout)).await;

        match received {
            Ok(Ok(job)) => {
                let shared = Arc::clone(&shared);
                running.spawn(async move {
                    execute(worker_id, &shared, job).await;
                    drop(permit);
                });
            }
            Ok(Err(RecvTimeoutError::Timeout)) => {
                drop(permit);
                if permits.available_permits() < slots || !should_exit(&shared, &rx) {
                    continue;
                }
                debug!(pool = %shared.id, worker_id, "worker idle, exiting");
                while running.join_next().await.is_some() {}
                return;
            }
            Ok(Err(RecvTimeoutError::Disconnected)) => break,
            Err(e) => {
                error!(pool = %shared.id, worker_id, error = %e, "job receiver failed");
                break;
            }
        }

        // Reap finished tasks without waiting.
        while running.try_join_next().is_some() {}
    }

    while running.join_next().await.is_some() {}
    shared.live_workers.fetch_sub(1, Ordering::AcqRel);
}

/// Leave the live set unless a job slipped in meanwhile. Returns `true` when
/// the worker is no longer counted as live.
fn should_exit(shared: &Shared, rx: &Receiver<Job>) -> bool {
    shared.live_workers.fetch_sub(1, Ordering::AcqRel);
    if rx.is_empty() {
        return true;
    }
    let rejoined = shared
        .live_workers
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
            (live < shared.config.max_concurrency).then_some(live + 1)
        })
        .is_ok();
    !rejoined
}

async fn execute(worker_id: usize, shared: &Shared, job: Job) {
    let Job {
        resource,
        ctx,
        reply,
        enqueued_at,
    } = job;
    let mut guard = shared.counters.start();
    let task = ctx.name.clone();
    let key = resource.key();
    debug!(
        pool = %shared.id,
        worker_id,
        task = %task,
        resource = %key,
        waited_ms = u64::try_from(enqueued_at.elapsed().as_millis()).unwrap_or(u64::MAX),
        "worker executing task"
    );

    let result = shared.handler.run(resource, ctx).await;
    if result.is_ok() {
        guard.succeeded();
    }
    drop(guard);

    if let Err(err) = &result {
        debug!(pool = %shared.id, worker_id, task = %task, resource = %key, error = %err, "task failed");
    }
    if reply.send(result).is_err() {
        warn!(pool = %shared.id, task = %task, resource = %key, "task caller went away before the result");
    }
}

/// Time since `start`, capped at `u64::MAX` milliseconds. Used in tests.
#[cfg(test)]
fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
