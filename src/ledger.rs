//! Bounded execution history.
//!
//! Every tool invocation appends an [`ExecutionRecord`]. The ledger keeps at
//! most `capacity` records; appending beyond that drops the oldest first.
//! All operations take `&self` and lock internally, so concurrent requests
//! can append without losing entries.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ToolStatus;

/// One tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub tool: String,
    pub query: String,
    pub status: ToolStatus,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Build a record stamped with the current time.
    pub fn now(tool: &str, query: &str, status: ToolStatus, duration_ms: u64) -> Self {
        Self {
            tool: tool.to_owned(),
            query: query.to_owned(),
            status,
            duration_ms,
            timestamp: Utc::now(),
        }
    }
}

/// FIFO-bounded, thread-safe history of tool invocations.
#[derive(Debug)]
pub struct ExecutionLedger {
    capacity: usize,
    entries: Mutex<VecDeque<ExecutionRecord>>,
}

impl ExecutionLedger {
    /// Create a ledger holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Append a record, evicting the oldest if the ledger is full.
    pub fn append(&self, record: ExecutionRecord) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push_back(record);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Trim the ledger to at most `max_len` most recent records.
    ///
    /// Returns the number of records dropped.
    pub fn compact(&self, max_len: usize) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let excess = entries.len().saturating_sub(max_len);
        if excess > 0 {
            entries.drain(..excess);
            tracing::info!(
                dropped = excess,
                remaining = entries.len(),
                "compacted execution history"
            );
        }
        excess
    }

    /// Copy of the `n` most recent records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ExecutionRecord> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Copy of every record, oldest first.
    pub fn snapshot(&self) -> Vec<ExecutionRecord> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of records kept before the oldest is dropped.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
