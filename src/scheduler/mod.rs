//! Throttled request scheduler.
//!
//! Every API call goes through a FIFO queue and is dispatched only while the
//! throttle budget allows. A 429 from the shop sends the request back to the
//! queue, drops the budget to zero and starts a cooldown: a recovery timer adds
//! one unit per tick until the ceiling is reached again ("slow start"), and
//! completions give nothing back until then. Outside a cooldown every
//! completion returns its unit, so a long queue keeps the budget saturated.
//! The `used/ceiling` header reported on every response can only lower the
//! budget; a clamp to zero also starts a cooldown.
//!
//! All shared state lives behind one mutex, so "check budget, decrement,
//! dispatch" happens in a single critical section and two passes triggered by
//! concurrent completions can never spend the same unit twice.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::transport::{ApiRequest, CallLimit, Transport, TransportError, TransportResponse};

/// The platform's maximum concurrent request allowance.
pub const DEFAULT_CEILING: u32 = 40;

pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(2);

const TOO_MANY_REQUESTS: u16 = 429;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Scheduler shut down before the request completed")]
    Closed,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Hard cap on budget and on requests in flight.
    pub ceiling: u32,
    /// Budget available before the first response arrives.
    pub initial_budget: u32,
    /// Period of the recovery timer; one budget unit per tick.
    pub recovery_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
            initial_budget: DEFAULT_CEILING,
            recovery_interval: DEFAULT_RECOVERY_INTERVAL,
        }
    }
}

/// Point-in-time view of the throttle, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSnapshot {
    pub budget: u32,
    pub in_flight: u32,
    pub queued: usize,
    pub recovering: bool,
}

struct Queued {
    id: u64,
    request: Arc<ApiRequest>,
    dispatched: bool,
    attempts: u32,
    reply: oneshot::Sender<Result<Value, ApiError>>,
}

struct State {
    pending: VecDeque<Queued>,
    budget: u32,
    in_flight: u32,
    next_id: u64,
    /// Budget was forced to zero; only the recovery timer refills it.
    cooling_down: bool,
    recovery: Option<JoinHandle<()>>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: ThrottleConfig,
    state: Mutex<State>,
}

/// Cheap to clone; all clones share one queue and one budget.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(transport: Arc<dyn Transport>, config: ThrottleConfig) -> Self {
        let budget = config.initial_budget.min(config.ceiling);
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                state: Mutex::new(State {
                    pending: VecDeque::new(),
                    budget,
                    in_flight: 0,
                    next_id: 0,
                    cooling_down: false,
                    recovery: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.inner.config
    }

    /// Queue a request and wait for its outcome.
    ///
    /// Rate-limit rejections never surface here: the request is retried until
    /// it gets a real answer. Any other non-2xx status comes back as
    /// [`ApiError::Status`].
    pub async fn enqueue(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.lock();
            let id = state.next_id;
            state.next_id += 1;
            trace!(id, method = %request.method, path = %request.path, "enqueue");
            state.pending.push_back(Queued {
                id,
                request: Arc::new(request),
                dispatched: false,
                attempts: 0,
                reply: tx,
            });
        }
        self.inner.dispatch();
        rx.await.map_err(|_| ApiError::Closed)?
    }

    pub fn snapshot(&self) -> ThrottleSnapshot {
        let state = self.inner.lock();
        ThrottleSnapshot {
            budget: state.budget,
            in_flight: state.in_flight,
            queued: state.pending.len(),
            recovering: state.recovery.is_some(),
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check and dispatch. A no-op when nothing is eligible.
    fn dispatch(self: &Arc<Self>) {
        let batch = {
            let mut state = self.lock();
            let eligible = state.pending.iter().filter(|q| !q.dispatched).count();
            if eligible == 0 {
                return;
            }

            let room = self.config.ceiling.saturating_sub(state.in_flight);
            let take = state.budget.min(room) as usize;

            let batch: Vec<(u64, Arc<ApiRequest>)> = state
                .pending
                .iter_mut()
                .filter(|q| !q.dispatched)
                .take(take)
                .map(|q| {
                    q.dispatched = true;
                    q.attempts += 1;
                    (q.id, Arc::clone(&q.request))
                })
                .collect();

            let sent = batch.len() as u32;
            state.budget -= sent;
            state.in_flight += sent;

            // With nothing in flight no completion will return budget either.
            let starved = state.cooling_down || state.in_flight == 0;
            if state.budget == 0 && eligible > batch.len() && starved {
                state.cooling_down = true;
                self.arm_recovery(&mut state);
            }

            if sent > 0 {
                debug!(
                    sent,
                    budget = state.budget,
                    in_flight = state.in_flight,
                    queued = eligible - batch.len(),
                    "dispatch"
                );
            }
            batch
        };

        for (id, request) in batch {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                let outcome = inner.transport.send(&request).await;
                inner.complete(id, outcome);
            });
        }
    }

    fn complete(self: &Arc<Self>, id: u64, outcome: Result<TransportResponse, TransportError>) {
        let delivery = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);

            let Some(pos) = state.pending.iter().position(|q| q.id == id) else {
                return;
            };

            match outcome {
                Err(err) => {
                    state.budget = (state.budget + 1).min(self.config.ceiling);
                    state
                        .pending
                        .remove(pos)
                        .map(|q| (q.reply, Err(ApiError::Transport { message: err.message })))
                }
                Ok(response) if response.status == TOO_MANY_REQUESTS => {
                    self.apply_call_limit(&mut state, &response);
                    state.budget = 0;
                    state.cooling_down = true;
                    let queued = &mut state.pending[pos];
                    queued.dispatched = false;
                    debug!(
                        path = %queued.request.path,
                        attempts = queued.attempts,
                        "rate limited, request requeued"
                    );
                    None
                }
                Ok(response) => {
                    if !state.cooling_down {
                        state.budget = (state.budget + 1).min(self.config.ceiling);
                    }
                    self.apply_call_limit(&mut state, &response);
                    state
                        .pending
                        .remove(pos)
                        .map(|q| (q.reply, into_result(response)))
                }
            }
        };

        if let Some((reply, result)) = delivery {
            // The caller may have stopped waiting; nothing to do then.
            let _ = reply.send(result);
        }
        self.dispatch();
    }

    /// Cap the budget at what the shop says is left, minus what is still on
    /// the wire and not yet counted there. Never raises it.
    fn apply_call_limit(&self, state: &mut State, response: &TransportResponse) {
        let Some(raw) = response.call_limit.as_deref() else {
            return;
        };
        match CallLimit::parse(raw) {
            Some(limit) => {
                let remaining = limit.remaining().saturating_sub(state.in_flight);
                if state.budget > remaining {
                    trace!(from = state.budget, to = remaining, "budget capped by call limit");
                    state.budget = remaining;
                    if remaining == 0 {
                        state.cooling_down = true;
                    }
                }
            }
            None => warn!("Bad call limit header: {}", raw),
        }
    }

    fn arm_recovery(self: &Arc<Self>, state: &mut State) {
        if state.recovery.is_some() {
            return;
        }
        let period = self.config.recovery_interval;
        debug!(?period, "budget exhausted, starting recovery timer");

        let weak: Weak<Inner> = Arc::downgrade(self);
        state.recovery = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let finished = inner.recover_one();
                inner.dispatch();
                if finished {
                    break;
                }
            }
        }));
    }

    /// One recovery tick. Returns true once the ceiling is reached and the
    /// timer has been released.
    fn recover_one(&self) -> bool {
        let mut state = self.lock();
        state.budget = (state.budget + 1).min(self.config.ceiling);
        if state.budget >= self.config.ceiling {
            debug!(budget = state.budget, "budget recovered, stopping timer");
            state.recovery = None;
            state.cooling_down = false;
            true
        } else {
            false
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = state.recovery.take() {
            handle.abort();
        }
    }
}

fn into_result(response: TransportResponse) -> Result<Value, ApiError> {
    if (200..300).contains(&response.status) {
        return Ok(response.body);
    }
    Err(ApiError::Status {
        status: response.status,
        message: error_message(response.status, &response.body),
    })
}

/// The shop reports failures as `{"error": ...}` or `{"errors": ...}`.
fn error_message(status: u16, body: &Value) -> String {
    let detail = body.get("error").or_else(|| body.get("errors")).or(match body {
        Value::String(_) => Some(body),
        _ => None,
    });

    match detail {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown error")
            .to_string(),
    }
}
