//! Concurrency gate and request-size validation.
//!
//! The gate is a fixed pool of slots backed by a tokio [`Semaphore`].
//! Holding a [`GatePermit`] means the request is active; dropping it (on
//! success, error, panic or cancellation) frees the slot and removes the
//! request from the active set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{Result, RouterError};
use crate::types::SearchParams;

/// A request currently holding a slot.
#[derive(Debug, Clone)]
pub struct ActiveRequest {
    pub request_id: Uuid,
    pub client_id: String,
    /// Query as submitted, before preprocessing.
    pub query: String,
    /// When the slot was granted.
    pub started: Instant,
}

/// Snapshot of gate occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    /// Total slots.
    pub capacity: usize,
    /// Slots held by in-flight requests.
    pub active: usize,
}

/// Fixed-capacity slot pool.
#[derive(Debug)]
pub struct ConcurrencyGate {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    active: Arc<Mutex<HashMap<Uuid, ActiveRequest>>>,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for a free slot and register the request as active.
    ///
    /// # Errors
    ///
    /// Only fails if the semaphore was closed, which this crate never does.
    pub async fn acquire(&self, client_id: &str, query: &str) -> Result<GatePermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| RouterError::Config(format!("concurrency gate closed: {e}")))?;

        let request_id = Uuid::new_v4();
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                request_id,
                ActiveRequest {
                    request_id,
                    client_id: client_id.to_owned(),
                    query: query.to_owned(),
                    started: Instant::now(),
                },
            );
        tracing::trace!(%request_id, client = client_id, "slot acquired");

        Ok(GatePermit {
            request_id,
            active: Arc::clone(&self.active),
            _permit: permit,
        })
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Copy of the requests currently holding slots.
    pub fn active_requests(&self) -> Vec<ActiveRequest> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            capacity: self.capacity,
            active: self.active_count(),
        }
    }
}

/// RAII slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct GatePermit {
    request_id: Uuid,
    active: Arc<Mutex<HashMap<Uuid, ActiveRequest>>>,
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    /// Id assigned to the request holding this slot.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.request_id);
        tracing::trace!(request_id = %self.request_id, "slot released");
    }
}

/// Check the serialized size of `{"query": ..., ...params}` against `max_bytes`.
///
/// Returns the measured size on success.
///
/// # Errors
///
/// Returns [`RouterError::RequestTooLarge`] if the size exceeds `max_bytes`,
/// or [`RouterError::Parse`] if the request cannot be serialized.
pub fn validate_request_size(query: &str, params: &SearchParams, max_bytes: usize) -> Result<usize> {
    let mut body = serde_json::Map::with_capacity(params.len() + 1);
    body.insert("query".to_owned(), serde_json::json!(query));
    for (key, value) in params {
        body.insert(key.clone(), value.clone());
    }
    let size = serde_json::to_vec(&body)
        .map_err(|e| RouterError::Parse(format!("cannot serialize request: {e}")))?
        .len();

    if size > max_bytes {
        tracing::warn!(size, max_bytes, "request too large");
        return Err(RouterError::RequestTooLarge(format!(
            "{size} bytes exceeds maximum of {max_bytes} bytes"
        )));
    }
    Ok(size)
}
