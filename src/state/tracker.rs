use crate::{CallsStatus, registry::BatchRecord};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Settled batches kept in memory when no capacity is configured
pub const DEFAULT_RETAINED_BATCHES: usize = 1024;

/// Lifecycle state of one batch handle
#[derive(Debug, Clone)]
pub enum BatchState {
    /// The batch is being followed; cancelling the token stops its poll loop.
    /// `claimed` is set once a poll loop owns the handle.
    Polling { cancel: CancellationToken, claimed: bool },
    /// The wallet reported a terminal status
    Terminal(CallsStatus),
    /// Polling stopped before a terminal status was observed
    Abandoned(String),
}

/// Result of asking to poll a batch handle
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The caller now owns the poll loop of the handle
    Claimed,
    /// Another poll loop already owns the handle
    Busy,
    /// A terminal status was already observed
    Terminal(CallsStatus),
}

/// Serializable view of a tracked batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedBatch {
    pub calls_id: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CallsStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Registry row, for batches no longer held in memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<BatchRecord>,
}

impl From<BatchRecord> for TrackedBatch {
    fn from(record: BatchRecord) -> Self {
        Self {
            calls_id: record.calls_id.clone(),
            state: "recorded",
            status: None,
            reason: None,
            record: Some(record),
        }
    }
}

#[derive(Default)]
struct Batches {
    entries: HashMap<String, BatchState>,
    /// Settled calls ids, oldest first
    settled: VecDeque<String>,
}

impl Batches {
    /// Store a terminal or abandoned state and evict the oldest settled
    /// entries beyond `capacity`
    fn settle(&mut self, calls_id: &str, state: BatchState, capacity: usize) {
        self.entries.insert(calls_id.to_string(), state);
        if !self.settled.iter().any(|id| id == calls_id) {
            self.settled.push_back(calls_id.to_string());
        }

        while self.settled.len() > capacity {
            let Some(oldest) = self.settled.pop_front() else { break };
            if !matches!(self.entries.get(&oldest), Some(BatchState::Polling { .. })) {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// In-memory table of batch handles
///
/// Handles being polled are always kept. Of the settled ones only the most
/// recent `capacity` are kept; the registry holds the rest.
///
/// Cheap to clone; all clones share the same table.
#[derive(Clone)]
pub struct BatchTracker {
    batches: Arc<RwLock<Batches>>,
    capacity: usize,
}

impl Default for BatchTracker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETAINED_BATCHES)
    }
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { batches: Arc::new(RwLock::new(Batches::default())), capacity }
    }

    /// Register `calls_id` as followed, before any poll loop owns it
    pub async fn track(&self, calls_id: &str, cancel: CancellationToken) {
        let mut batches = self.batches.write().await;
        batches.entries.insert(calls_id.to_string(), BatchState::Polling { cancel, claimed: false });
    }

    /// Take ownership of the poll loop of `calls_id`
    ///
    /// At most one caller holds a handle at a time. The caller's token
    /// replaces the registered one, so `cancel` reaches the running loop.
    pub async fn claim(&self, calls_id: &str, cancel: &CancellationToken) -> Claim {
        let mut batches = self.batches.write().await;
        match batches.entries.get(calls_id) {
            Some(BatchState::Polling { claimed: true, .. }) => return Claim::Busy,
            Some(BatchState::Terminal(status)) => return Claim::Terminal(status.clone()),
            Some(BatchState::Polling { cancel: registered, .. }) if registered.is_cancelled() => cancel.cancel(),
            _ => {}
        }

        let state = BatchState::Polling { cancel: cancel.clone(), claimed: true };
        batches.entries.insert(calls_id.to_string(), state);
        Claim::Claimed
    }

    pub async fn finish(&self, calls_id: &str, status: CallsStatus) {
        let mut batches = self.batches.write().await;
        batches.settle(calls_id, BatchState::Terminal(status), self.capacity);
    }

    pub async fn abandon(&self, calls_id: &str, reason: String) {
        let mut batches = self.batches.write().await;
        batches.settle(calls_id, BatchState::Abandoned(reason), self.capacity);
    }

    /// Cancel the poll loop of `calls_id`
    ///
    /// Returns `false` if the batch is unknown or no longer polling.
    pub async fn cancel(&self, calls_id: &str) -> bool {
        let batches = self.batches.read().await;
        match batches.entries.get(calls_id) {
            Some(BatchState::Polling { cancel, .. }) => {
                cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, calls_id: &str) -> Option<TrackedBatch> {
        let batches = self.batches.read().await;
        let (state, status, reason) = match batches.entries.get(calls_id)? {
            BatchState::Polling { .. } => ("polling", None, None),
            BatchState::Terminal(status) => ("terminal", Some(status.clone()), None),
            BatchState::Abandoned(reason) => ("abandoned", None, Some(reason.clone())),
        };
        Some(TrackedBatch { calls_id: calls_id.to_string(), state, status, reason, record: None })
    }

    /// Number of handles held in memory
    pub async fn retained(&self) -> usize {
        self.batches.read().await.entries.len()
    }
}
