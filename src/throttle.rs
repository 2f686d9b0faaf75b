use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ThrottleConfig;
use crate::error::ApiError;

/// Default priority for throttled requests; lower values are more urgent.
pub const DEFAULT_PRIORITY: i32 = 10;

const RATE_WINDOW: Duration = Duration::from_secs(60);
const CEILING_BACKOFF: Duration = Duration::from_secs(2);
const DISPATCH_YIELD: Duration = Duration::from_millis(100);

type Job = Box<dyn FnOnce(Option<ApiError>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct QueuedRequest {
    id: String,
    priority: i32,
    seq: u64,
    job: Job,
}

// BinaryHeap is a max-heap; reverse the comparison so the lowest
// (priority, seq) pair pops first — priority order, FIFO within a priority.
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

struct ThrottleState {
    queue: BinaryHeap<QueuedRequest>,
    dispatch_log: VecDeque<Instant>,
    last_dispatch: Option<Instant>,
    processing: bool,
    next_seq: u64,
}

/// Serializes and paces outbound calls to a rate-limited API: at most
/// `max_requests_per_minute` dispatches in any rolling 60-second window,
/// with a minimum delay between consecutive dispatches. One request is in
/// flight at a time; pending requests dispatch in priority order (ties
/// FIFO). An entry already dispatched is never preempted.
#[derive(Clone)]
pub struct RequestThrottler {
    state: Arc<Mutex<ThrottleState>>,
    max_per_minute: usize,
    min_delay: Duration,
}

impl RequestThrottler {
    pub fn new(config: &ThrottleConfig) -> Self {
        debug!(
            "initializing throttler: {}/min, {}ms floor",
            config.max_requests_per_minute, config.min_delay_ms
        );
        Self {
            state: Arc::new(Mutex::new(ThrottleState {
                queue: BinaryHeap::new(),
                dispatch_log: VecDeque::new(),
                last_dispatch: None,
                processing: false,
                next_seq: 0,
            })),
            max_per_minute: config.max_requests_per_minute,
            min_delay: Duration::from_millis(config.min_delay_ms),
        }
    }

    /// Queue an operation and wait for its result. The returned value (or
    /// error) is exactly what the operation itself produced, delivered at
    /// whatever future time the throttler dispatches it.
    pub async fn enqueue<T, F, Fut>(
        &self,
        id: impl Into<String>,
        operation: F,
        priority: i32,
    ) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let id = id.into();
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |cancelled| {
            Box::pin(async move {
                let outcome = match cancelled {
                    Some(reason) => Err(reason),
                    None => operation().await,
                };
                let _ = tx.send(outcome);
            })
        });

        {
            let mut state = self.state.lock().await;
            let seq = state.next_seq;
            state.next_seq += 1;
            debug!(id = %id, priority, "queueing throttled request");
            state.queue.push(QueuedRequest {
                id,
                priority,
                seq,
                job,
            });
            if !state.processing {
                state.processing = true;
                self.spawn_processing();
            }
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ApiError::cancelled("throttled request dropped")),
        }
    }

    /// Same as [`enqueue`](Self::enqueue) with a generated request id.
    pub async fn enqueue_anonymous<T, F, Fut>(&self, operation: F, priority: i32) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        self.enqueue(Uuid::new_v4().to_string(), operation, priority).await
    }

    /// Requests dispatched within the current rolling window.
    pub async fn current_rate(&self) -> usize {
        let mut state = self.state.lock().await;
        Self::prune_log(&mut state.dispatch_log);
        state.dispatch_log.len()
    }

    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Reject every still-pending request with `reason`. Requests already
    /// dispatched run to completion. Returns the number rejected.
    pub async fn clear_queue(&self, reason: &str) -> usize {
        let drained: Vec<QueuedRequest> = {
            let mut state = self.state.lock().await;
            state.queue.drain().collect()
        };
        let rejected = drained.len();
        if rejected > 0 {
            warn!("clearing throttle queue, rejecting {} requests: {}", rejected, reason);
        }
        for request in drained {
            (request.job)(Some(ApiError::cancelled(reason))).await;
        }
        rejected
    }

    fn spawn_processing(&self) {
        let state = self.state.clone();
        let max_per_minute = self.max_per_minute;
        let min_delay = self.min_delay;
        tokio::spawn(async move {
            Self::process_queue(state, max_per_minute, min_delay).await;
        });
    }

    // 单个串行调度循环：空闲即退出，入队时重新拉起
    async fn process_queue(
        state: Arc<Mutex<ThrottleState>>,
        max_per_minute: usize,
        min_delay: Duration,
    ) {
        loop {
            let next = {
                let mut s = state.lock().await;
                Self::prune_log(&mut s.dispatch_log);

                if s.queue.is_empty() {
                    s.processing = false;
                    debug!("throttle queue drained");
                    return;
                }

                if s.dispatch_log.len() >= max_per_minute {
                    None
                } else {
                    s.queue.pop().map(|request| {
                        let wait = s
                            .last_dispatch
                            .map(|at| (at + min_delay).saturating_duration_since(Instant::now()))
                            .unwrap_or(Duration::ZERO);
                        (request, wait)
                    })
                }
            };

            match next {
                None => {
                    info!("throttle ceiling reached, waiting before next request");
                    sleep(CEILING_BACKOFF).await;
                }
                Some((request, wait)) => {
                    if wait > Duration::ZERO {
                        sleep(wait).await;
                    }
                    {
                        let mut s = state.lock().await;
                        let now = Instant::now();
                        s.dispatch_log.push_back(now);
                        s.last_dispatch = Some(now);
                    }
                    debug!(id = %request.id, "dispatching throttled request");
                    (request.job)(None).await;
                    sleep(DISPATCH_YIELD).await;
                }
            }
        }
    }

    fn prune_log(log: &mut VecDeque<Instant>) {
        let cutoff = Instant::now();
        while let Some(front) = log.front() {
            if cutoff.duration_since(*front) > RATE_WINDOW {
                log.pop_front();
            } else {
                break;
            }
        }
    }
}
