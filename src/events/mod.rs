//! Shell event bus: publish/subscribe fan-out with bounded history.
//!
//! Every event is appended to an in-memory ring buffer and then delivered to
//! the subscribers of its type **sequentially, in subscription order**. Each
//! subscriber is awaited to completion before the next one runs, so logging
//! and usage tracking observe commands in a deterministic order.
//!
//! A subscriber that returns an error or panics is logged and skipped; it never
//! stops the remaining subscribers and never propagates out of [`EventBus::emit`].
//!
//! Subscribing to an event type while that type is being delivered is deferred:
//! the new subscription is queued and applied once the fan-out completes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default number of events retained in [`EventBus::history`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

// ── Event kinds emitted by the core ─────────────────────────────

pub const COMMAND_EXECUTED: &str = "command.executed";
pub const COMMAND_COMPLETED: &str = "command.completed";
pub const PLUGIN_LOADED: &str = "plugin.loaded";
pub const PLUGIN_UNLOADED: &str = "plugin.unloaded";
pub const PLUGIN_FAILED: &str = "plugin.failed";

// ── Event ───────────────────────────────────────────────────────

/// An immutable notification. Created by the emitter, read-only to subscribers.
#[derive(Debug, Clone)]
pub struct Event {
    kind: String,
    data: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// String field lookup, `None` when absent or not a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Build an event payload from a `serde_json::json!({...})` object literal.
///
/// Non-object values produce an empty payload.
pub fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ── Subscribers ─────────────────────────────────────────────────

/// A subscriber for one event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Adapter turning a plain closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

/// Wrap a synchronous closure as a shareable subscriber.
pub fn handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

// ── Event Bus ───────────────────────────────────────────────────

#[derive(Default)]
struct BusState {
    subscribers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    history: VecDeque<Arc<Event>>,
    /// Fan-outs currently running, per event type.
    delivering: HashMap<String, usize>,
    /// Subscriptions queued while their type was being delivered.
    pending: Vec<(String, Arc<dyn EventHandler>)>,
}

/// Publish/subscribe bus. No subscriber deduplication, no priorities and no
/// removal API: a subscription lives as long as the bus.
pub struct EventBus {
    state: Mutex<BusState>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            capacity: capacity.max(1),
        }
    }

    /// Append `handler` to the subscriber sequence of `kind`.
    pub fn subscribe(&self, kind: &str, handler: Arc<dyn EventHandler>) {
        let mut state = self.state.lock();
        if state.delivering.get(kind).copied().unwrap_or(0) > 0 {
            debug!(event = kind, "subscription deferred until delivery completes");
            state.pending.push((kind.to_string(), handler));
            return;
        }
        state
            .subscribers
            .entry(kind.to_string())
            .or_default()
            .push(handler);
    }

    /// Subscribe a synchronous closure.
    pub fn subscribe_fn<F>(&self, kind: &str, f: F)
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(kind, handler_fn(f));
    }

    /// Record an event and deliver it to every current subscriber of its type.
    pub async fn emit(&self, kind: &str, data: Map<String, Value>) -> Arc<Event> {
        let event = Arc::new(Event::new(kind, data));
        let handlers = {
            let mut state = self.state.lock();
            if state.history.len() == self.capacity {
                state.history.pop_front();
            }
            state.history.push_back(Arc::clone(&event));
            *state.delivering.entry(kind.to_string()).or_insert(0) += 1;
            state.subscribers.get(kind).cloned().unwrap_or_default()
        };

        for (index, handler) in handlers.iter().enumerate() {
            match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event = kind, subscriber = index, error = %e, "event handler failed");
                }
                Err(_) => {
                    error!(event = kind, subscriber = index, "event handler panicked");
                }
            }
        }

        self.finish_delivery(kind);
        event
    }

    fn finish_delivery(&self, kind: &str) {
        let mut state = self.state.lock();
        let remaining = match state.delivering.get_mut(kind) {
            Some(depth) => {
                *depth = depth.saturating_sub(1);
                *depth
            }
            None => 0,
        };
        if remaining > 0 {
            return;
        }
        state.delivering.remove(kind);

        let pending = std::mem::take(&mut state.pending);
        let (ready, still_waiting): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|(k, _)| k == kind);
        state.pending = still_waiting;
        for (k, handler) in ready {
            state.subscribers.entry(k).or_default().push(handler);
        }
    }

    /// Retained events, oldest first.
    pub fn history(&self) -> Vec<Arc<Event>> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// The most recent `n` retained events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Arc<Event>> {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn history_capacity(&self) -> usize {
        self.capacity
    }

    /// Number of subscribers currently attached to `kind`.
    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.state.lock().subscribers.get(kind).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ───────────────────────────────────────────────────────
