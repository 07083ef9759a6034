//! Per-worker acquire/use/release loop.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::core::error::PoolError;
use crate::core::error_sink::ErrorSink;
use crate::core::resource_pool::ResourcePool;
use crate::state::{Component, ComponentId, ComponentState, Transition, WorkerId};
use crate::sync::{CancelFlag, StartGate};

use super::PoolCounters;

/// State shared by every worker of one run.
pub(crate) struct RunShared {
    pub pool: Arc<ResourcePool>,
    pub cancel: Arc<CancelFlag>,
    pub gate: StartGate,
    pub counters: Arc<PoolCounters>,
    pub error_sink: Arc<dyn ErrorSink>,
    pub iterations: u64,
    pub min_use_ms: u64,
    pub max_use_ms: u64,
    failed: AtomicBool,
}

impl RunShared {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<ResourcePool>,
        cancel: Arc<CancelFlag>,
        gate: StartGate,
        counters: Arc<PoolCounters>,
        error_sink: Arc<dyn ErrorSink>,
        iterations: u64,
        min_use_ms: u64,
        max_use_ms: u64,
    ) -> Self {
        Self {
            pool,
            cancel,
            gate,
            counters,
            error_sink,
            iterations,
            min_use_ms,
            max_use_ms,
            failed: AtomicBool::new(false),
        }
    }

    /// Report a fatal failure and tear the run down.
    pub fn fail(&self, component: ComponentId, error: &PoolError) {
        self.failed.store(true, Ordering::Release);
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        self.error_sink.report(component, error);
        self.cancel.cancel();
        self.pool.shutdown();
        self.gate.abort();
    }

    /// Whether any failure was reported during the run.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

/// Decrements the live thread count when the worker closure is dropped,
/// whether it ran to completion or the spawn failed.
struct LiveThread(Arc<AtomicUsize>);

impl LiveThread {
    fn enter(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self(live)
    }
}

impl Drop for LiveThread {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Spawn the thread for one worker.
pub(crate) fn spawn_worker(
    worker: Arc<Component>,
    worker_id: WorkerId,
    shared: Arc<RunShared>,
    live_threads: Arc<AtomicUsize>,
    stack_size: usize,
) -> io::Result<JoinHandle<()>> {
    let live = LiveThread::enter(live_threads);
    thread::Builder::new()
        .name(format!("rp-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            let _live = live;
            debug!(worker_id, "worker thread started");
            run_worker(&worker, worker_id, &shared);
            debug!(worker_id, "worker thread exiting");
        })
}

fn run_worker(worker: &Component, worker_id: WorkerId, shared: &RunShared) {
    if !shared.gate.arrive_and_wait(&shared.cancel) {
        shared.counters.cancellations.fetch_add(1, Ordering::Relaxed);
        worker.apply(Transition::to(ComponentState::Done).message("cancelled before start"));
        return;
    }

    let mut rng = rand::rng();
    let mut completed = 0_u64;
    while !shared.cancel.is_cancelled() && completed < shared.iterations {
        worker.set_state(ComponentState::Acquiring);
        let resource = match shared.pool.acquire(worker_id) {
            Ok(resource) => resource,
            Err(PoolError::Cancelled) => {
                shared.counters.cancellations.fetch_add(1, Ordering::Relaxed);
                debug!(worker_id, completed, "acquire cancelled");
                worker.apply(
                    Transition::to(ComponentState::Done).message("cancelled while acquiring"),
                );
                return;
            }
            Err(err) => {
                worker.apply(Transition::to(ComponentState::Error).error(err.to_string()));
                shared.fail(ComponentId::Worker(worker_id), &err);
                return;
            }
        };

        shared.counters.acquisitions.fetch_add(1, Ordering::Relaxed);
        shared.counters.enter_gazing();
        worker.apply(Transition::to(ComponentState::Gazing).link(Some(resource.id())));

        let use_ms = rng.random_range(shared.min_use_ms..=shared.max_use_ms);
        let used = shared.cancel.sleep(Duration::from_millis(use_ms));
        shared.counters.leave_gazing();

        worker.set_state(ComponentState::Releasing);
        shared.pool.release(Some(&resource));

        if let Err(err) = used {
            shared.counters.interruptions.fetch_add(1, Ordering::Relaxed);
            warn!(worker_id, resource_id = resource.id(), completed, "resource use interrupted");
            worker.apply(
                Transition::to(ComponentState::Done)
                    .link(None)
                    .message(err.to_string()),
            );
            return;
        }

        completed += 1;
        shared
            .counters
            .completed_iterations
            .fetch_add(1, Ordering::Relaxed);
        worker.apply(
            Transition::to(ComponentState::Idle)
                .link(None)
                .completed(completed),
        );
    }

    let message = if completed >= shared.iterations {
        "iteration target reached"
    } else {
        shared.counters.cancellations.fetch_add(1, Ordering::Relaxed);
        "cancelled between iterations"
    };
    debug!(worker_id, completed, "{message}");
    worker.apply(Transition::to(ComponentState::Done).message(message));
}
