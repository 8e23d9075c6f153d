//! Bounded worker pool that executes simulation requests.
//!
//! Each submitted request gets its own reply channel. The worker reports
//! `Started` (with the instant it began) when it picks the request up and
//! `Finished` when the simulator returns, so the timeout runs from the start
//! of the simulation rather than from its time in the queue.
//!
//! A caller that gives up on a task drops its receiver. A worker that finds
//! the receiver gone when it picks the task up skips it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::warn;

use crate::config::RuntimeConfig;
use crate::error::{EvalError, ExecutionError, SimulatorError};
use crate::simulator::{Continuation, ProcessSimulator, SimulationRequest};

use super::SimulationFailure;

enum TaskEvent {
    Started(Instant),
    Finished(Result<Continuation, SimulatorError>),
}

struct Task {
    request: SimulationRequest,
    reply: Sender<TaskEvent>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Reply side of one submitted simulation.
pub(crate) struct TaskHandle {
    rx: Receiver<TaskEvent>,
}

impl TaskHandle {
    /// Waits for the worker to start the task (until `start_deadline`) and
    /// then for the simulation to finish within `timeout` of its start.
    pub(crate) fn wait(
        self,
        start_deadline: Instant,
        timeout: Duration,
    ) -> Result<Continuation, SimulationFailure> {
        let started = match self.rx.recv_deadline(start_deadline) {
            Ok(TaskEvent::Started(at)) => at,
            Ok(TaskEvent::Finished(result)) => return result.map_err(SimulationFailure::Simulator),
            Err(RecvTimeoutError::Timeout) => {
                return Err(SimulationFailure::NotStarted);
            }
            Err(RecvTimeoutError::Disconnected) => return Err(SimulationFailure::Disconnected),
        };

        match self.rx.recv_deadline(started + timeout) {
            Ok(TaskEvent::Finished(result)) => result.map_err(SimulationFailure::Simulator),
            Ok(TaskEvent::Started(_)) => Err(SimulationFailure::Disconnected),
            Err(RecvTimeoutError::Timeout) => Err(SimulationFailure::Timeout {
                duration_ms: duration_ms(timeout),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(SimulationFailure::Disconnected),
        }
    }
}

/// Fixed-size pool of simulation workers fed by a bounded queue.
pub(crate) struct WorkerPool {
    tx: Sender<Task>,
    workers: Vec<JoinHandle<()>>,
    size: usize,
}

impl WorkerPool {
    pub(crate) fn start(config: &RuntimeConfig, simulator: Arc<dyn ProcessSimulator>) -> Self {
        let size = config.workers.max(1);
        let (tx, rx) = bounded::<Task>(config.queue_capacity.max(1));

        let mut workers = Vec::with_capacity(size);
        for idx in 0..size {
            let rx: Receiver<Task> = rx.clone();
            let simulator = Arc::clone(&simulator);
            let handle = thread::Builder::new()
                .name(format!("recsim-worker-{idx}"))
                .spawn(move || {
                    while let Ok(Task { request, reply }) = rx.recv() {
                        // Receiver gone: the task was already reported as failed.
                        if reply.send(TaskEvent::Started(Instant::now())).is_err() {
                            continue;
                        }
                        let result = panic::catch_unwind(AssertUnwindSafe(|| simulator.simulate(&request)))
                            .unwrap_or_else(|payload| {
                                Err(SimulatorError::Panicked {
                                    message: panic_message(payload.as_ref()),
                                })
                            });
                        let _ = reply.send(TaskEvent::Finished(result));
                    }
                })
                .expect("failed to spawn recsim worker");
            workers.push(handle);
        }

        Self { tx, workers, size }
    }

    /// Number of worker threads.
    pub(crate) const fn size(&self) -> usize {
        self.size
    }

    /// Queues a request, blocking for at most `timeout` while the queue is full.
    ///
    /// A full queue that does not drain in time yields `Ok(Err(NotStarted))`;
    /// a pool whose workers are gone is fatal.
    pub(crate) fn submit(
        &self,
        request: SimulationRequest,
        timeout: Duration,
    ) -> Result<Result<TaskHandle, SimulationFailure>, EvalError> {
        let (reply, rx) = bounded::<TaskEvent>(2);
        match self.tx.send_timeout(Task { request, reply }, timeout) {
            Ok(()) => Ok(Ok(TaskHandle { rx })),
            Err(SendTimeoutError::Timeout(_)) => Ok(Err(SimulationFailure::NotStarted)),
            Err(SendTimeoutError::Disconnected(_)) => Err(ExecutionError::Disconnected.into()),
        }
    }

    /// Closes the queue and joins workers.
    ///
    /// With `grace` set, workers still busy after it elapses (a simulator that
    /// never returned) are detached instead of joined.
    pub(crate) fn shutdown(self, grace: Option<Duration>) {
        drop(self.tx);
        let deadline = grace.map(|g| Instant::now() + g);
        for handle in self.workers {
            if let Some(deadline) = deadline {
                while !handle.is_finished() && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(1));
                }
                if !handle.is_finished() {
                    warn!(worker = ?handle.thread().name(), "detaching simulation worker that is still busy");
                    continue;
                }
            }
            let _ = handle.join();
        }
    }
}
