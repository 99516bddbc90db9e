//! Bounded-concurrency request dispatcher
//!
//! A fixed number of lanes, each an ordered queue drained by at most one task.
//! An operation goes to the least-loaded lane and stays there: failed attempts
//! are pushed back to the front of the same lane, so per-lane ordering holds
//! and in-flight work never exceeds the lane count.

use crate::clock::ServerClock;
use crate::config::DispatcherConfig;
use crate::types::{HttpRequest, HttpResponse};
use crate::{ContextHost, FarmError, FarmResult, Transport};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Work accepted by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// A network call through the transport
    Request(HttpRequest),
    /// Open a new execution context and hold the lane until it is ready
    OpenContext { url: String },
}

impl Operation {
    fn describe(&self) -> &str {
        match self {
            Operation::Request(request) => &request.url,
            Operation::OpenContext { url } => url,
        }
    }
}

/// Successful result of an [`Operation`]
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Response(HttpResponse),
    ContextReady,
}

struct Job {
    id: Uuid,
    operation: Operation,
    attempts: u32,
    max_attempts: u32,
    reply: oneshot::Sender<FarmResult<Completion>>,
}

#[derive(Default)]
struct LaneState {
    queue: VecDeque<Job>,
    /// A task is draining this lane
    active: bool,
}

impl LaneState {
    fn load(&self) -> usize {
        self.queue.len() + usize::from(self.active)
    }
}

/// Handle to a submitted operation
#[derive(Debug)]
pub struct Pending {
    rx: oneshot::Receiver<FarmResult<Completion>>,
}

impl Pending {
    /// Wait for success or exhausted-retry failure
    pub async fn wait(self) -> FarmResult<Completion> {
        self.rx.await.unwrap_or(Err(FarmError::DispatcherClosed))
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Point-in-time dispatcher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

impl DispatchStats {
    /// Operations that have signalled an outcome
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Cheaply cloneable dispatcher handle
#[derive(Clone)]
pub struct Dispatcher {
    lanes: Arc<Vec<Mutex<LaneState>>>,
    transport: Arc<dyn Transport + Send + Sync>,
    context_host: Option<Arc<dyn ContextHost + Send + Sync>>,
    clock: Option<Arc<ServerClock>>,
    max_attempts: u32,
    counters: Arc<Counters>,
}

impl Dispatcher {
    pub fn new(config: &DispatcherConfig, transport: Arc<dyn Transport + Send + Sync>) -> Self {
        let lanes = (0..config.lanes.max(1))
            .map(|_| Mutex::new(LaneState::default()))
            .collect();
        Self {
            lanes: Arc::new(lanes),
            transport,
            context_host: None,
            clock: None,
            max_attempts: config.max_attempts.max(1),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Host used for [`Operation::OpenContext`]
    pub fn with_context_host(mut self, host: Arc<dyn ContextHost + Send + Sync>) -> Self {
        self.context_host = Some(host);
        self
    }

    /// Feed response `Date` headers into a server clock
    pub fn with_clock(mut self, clock: Arc<ServerClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Queue an operation on the least-loaded lane, starting the lane if idle
    pub async fn submit(&self, operation: Operation) -> Pending {
        self.enqueue(operation, self.max_attempts).await
    }

    /// Queue an operation that gets exactly one attempt.
    ///
    /// For requests that must not be repeated, such as sending a command.
    pub async fn submit_once(&self, operation: Operation) -> Pending {
        self.enqueue(operation, 1).await
    }

    async fn enqueue(&self, operation: Operation, max_attempts: u32) -> Pending {
        let (tx, rx) = oneshot::channel();
        let job = Job {
            id: Uuid::new_v4(),
            operation,
            attempts: 0,
            max_attempts,
            reply: tx,
        };

        let mut chosen = 0;
        let mut lowest = usize::MAX;
        for (index, lane) in self.lanes.iter().enumerate() {
            let load = lane.lock().await.load();
            if load < lowest {
                lowest = load;
                chosen = index;
            }
        }

        debug!(lane = chosen, job = %job.id, url = job.operation.describe(), "operation queued");

        let start = {
            let mut lane = self.lanes[chosen].lock().await;
            lane.queue.push_back(job);
            !std::mem::replace(&mut lane.active, true)
        };
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        if start {
            let this = self.clone();
            tokio::spawn(async move { this.run_lane(chosen).await });
        }

        Pending { rx }
    }

    /// Submit a request and wait for its response
    pub async fn fetch(&self, request: HttpRequest) -> FarmResult<HttpResponse> {
        match self.submit(Operation::Request(request)).await.wait().await? {
            Completion::Response(response) => Ok(response),
            Completion::ContextReady => Err(FarmError::DispatcherClosed),
        }
    }

    /// Send a request once and wait for its response; failures are not retried
    pub async fn fetch_once(&self, request: HttpRequest) -> FarmResult<HttpResponse> {
        match self.submit_once(Operation::Request(request)).await.wait().await? {
            Completion::Response(response) => Ok(response),
            Completion::ContextReady => Err(FarmError::DispatcherClosed),
        }
    }

    /// Open an execution context and wait until it is ready
    pub async fn open_context(&self, url: impl Into<String>) -> FarmResult<()> {
        self.submit(Operation::OpenContext { url: url.into() })
            .await
            .wait()
            .await
            .map(|_| ())
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::Relaxed),
        }
    }

    async fn run_lane(self, lane: usize) {
        loop {
            let mut job = {
                let mut state = self.lanes[lane].lock().await;
                match state.queue.pop_front() {
                    Some(job) => job,
                    None => {
                        state.active = false;
                        return;
                    }
                }
            };

            let now_in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters
                .peak_in_flight
                .fetch_max(now_in_flight, Ordering::SeqCst);

            let result = self.perform(&job.operation).await;

            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

            match result {
                Ok(completion) => {
                    self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    let _ = job.reply.send(Ok(completion));
                }
                Err(error) => {
                    job.attempts += 1;
                    if error.is_recoverable() && job.attempts < job.max_attempts {
                        warn!(
                            lane,
                            job = %job.id,
                            attempt = job.attempts,
                            url = job.operation.describe(),
                            %error,
                            "operation failed, retrying"
                        );
                        self.counters.retried.fetch_add(1, Ordering::Relaxed);
                        self.lanes[lane].lock().await.queue.push_front(job);
                    } else {
                        warn!(
                            lane,
                            job = %job.id,
                            attempts = job.attempts,
                            url = job.operation.describe(),
                            %error,
                            "operation failed"
                        );
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                        let error = if error.is_recoverable() && job.max_attempts > 1 {
                            FarmError::RetriesExhausted {
                                attempts: job.attempts,
                                last_error: error.to_string(),
                            }
                        } else {
                            error
                        };
                        let _ = job.reply.send(Err(error));
                    }
                }
            }
        }
    }

    async fn perform(&self, operation: &Operation) -> FarmResult<Completion> {
        match operation {
            Operation::Request(request) => {
                let response = self.transport.send(request).await?;
                if let (Some(clock), Some(date)) = (&self.clock, response.header("Date")) {
                    clock.observe_date_header(date);
                }
                if !response.is_success() {
                    return Err(FarmError::HttpStatus {
                        status: response.status,
                        url: request.url.clone(),
                    });
                }
                Ok(Completion::Response(response))
            }
            Operation::OpenContext { url } => {
                let host = self
                    .context_host
                    .as_ref()
                    .ok_or_else(|| FarmError::ContextUnavailable { url: url.clone() })?;
                host.open(url).await?;
                Ok(Completion::ContextReady)
            }
        }
    }
}
