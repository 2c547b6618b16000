//! Bulk batch accumulation and flushing.
//!
//! Transformed documents are turned into write operations and grouped into
//! [`BulkBatch`]es of at most `max_batch_size` operations. A batch is sealed
//! the moment it reaches that size, so a fanned-out result that straddles the
//! boundary is split across two consecutive batches.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::config::{BulkAction, BulkConfig, Endpoint};
use crate::document::{Document, TransformResult};
use crate::error::Result;
use crate::store::{BulkResponse, DocumentStore};

/// Header of one bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionHeader {
    /// Write action.
    pub action: BulkAction,
    /// Target document identifier.
    pub id: String,
}

/// One (header, payload) pair. Delete operations carry no payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOp {
    /// Action header.
    pub header: ActionHeader,
    /// Document body.
    pub payload: Option<Document>,
}

/// Ordered operations sent to the target in one bulk call.
#[derive(Debug, Clone)]
pub struct BulkBatch {
    target: Endpoint,
    ops: Vec<BulkOp>,
}

impl BulkBatch {
    /// Creates an empty batch bound to `target`.
    pub fn new(target: Endpoint) -> Self {
        Self {
            target,
            ops: Vec::new(),
        }
    }

    /// Target collection.
    #[must_use]
    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// Operations in write order.
    #[must_use]
    pub fn ops(&self) -> &[BulkOp] {
        &self.ops
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch holds no operation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Appends an operation.
    pub fn push(&mut self, action: BulkAction, id: String, doc: Document) {
        let payload = action.has_payload().then_some(doc);
        self.ops.push(BulkOp {
            header: ActionHeader { action, id },
            payload,
        });
    }
}

/// A bulk item the target refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Document identifier.
    pub id: String,
    /// Item status code.
    pub status: u16,
    /// Reason reported by the store.
    pub reason: String,
    /// Sequence number of the batch the item was sent in (1-based).
    pub batch: u64,
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default)]
pub struct BulkResult {
    /// Sequence number of the batch (1-based).
    pub batch: u64,
    /// Operations sent.
    pub submitted: usize,
    /// Operations the store applied.
    pub applied: u64,
    /// Operations the store refused.
    pub failures: Vec<ItemFailure>,
}

impl BulkResult {
    fn from_response(batch: u64, submitted: usize, response: BulkResponse) -> Self {
        let mut applied = 0;
        let mut failures = Vec::new();
        for item in response.items {
            match item.error {
                None => applied += 1,
                Some(reason) => failures.push(ItemFailure {
                    id: item.id,
                    status: item.status,
                    reason,
                    batch,
                }),
            }
        }
        Self {
            batch,
            submitted,
            applied,
            failures,
        }
    }

    /// Whether some items were refused.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Buffers write operations and flushes them in bounded batches.
#[derive(Debug)]
pub struct BatchAccumulator {
    target: Endpoint,
    action: BulkAction,
    max_batch_size: Option<usize>,
    current: BulkBatch,
    ready: VecDeque<BulkBatch>,
    flushed: u64,
}

impl BatchAccumulator {
    /// Creates an accumulator writing to `target`.
    pub fn new(target: Endpoint, bulk: &BulkConfig) -> Self {
        Self {
            current: BulkBatch::new(target.clone()),
            target,
            action: bulk.action,
            max_batch_size: bulk.max_batch_size,
            ready: VecDeque::new(),
            flushed: 0,
        }
    }

    /// Adds the operations of one transform result.
    ///
    /// Returns the number of operations added.
    pub fn add(&mut self, result: TransformResult, parent_id: &str) -> usize {
        let pairs = result.into_pairs(parent_id);
        let added = pairs.len();
        for (id, doc) in pairs {
            self.current.push(self.action, id, doc);
            if self.max_batch_size.is_some_and(|max| self.current.len() >= max) {
                self.seal();
            }
        }
        added
    }

    /// Whether a full batch is waiting to be flushed.
    #[must_use]
    pub fn should_flush(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Operations buffered in the open (not yet full) batch.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    /// Number of batches flushed so far.
    #[must_use]
    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    /// Closes the open batch so the next flush sends it, even if short.
    pub fn seal(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let full = std::mem::replace(&mut self.current, BulkBatch::new(self.target.clone()));
        self.ready.push_back(full);
    }

    /// Sends the oldest sealed batch. Returns `None` if nothing is sealed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the bulk call itself failed; refused items are
    /// reported in the [`BulkResult`].
    pub async fn flush(&mut self, store: &dyn DocumentStore) -> Result<Option<BulkResult>> {
        let Some(batch) = self.ready.pop_front() else {
            return Ok(None);
        };
        self.flushed += 1;
        let number = self.flushed;

        debug!(
            collection = %batch.target().collection,
            batch = number,
            ops = batch.len(),
            "Flushing bulk batch"
        );

        let response = store.bulk(&batch).await?;
        let result = BulkResult::from_response(number, batch.len(), response);

        for failure in &result.failures {
            warn!(
                batch = number,
                id = %failure.id,
                status = failure.status,
                "Bulk item rejected: {}",
                failure.reason
            );
        }

        Ok(Some(result))
    }

    /// Seals the open batch and flushes everything that is sealed.
    ///
    /// # Errors
    ///
    /// Returns an error if a bulk call fails outright.
    pub async fn flush_remainder(&mut self, store: &dyn DocumentStore) -> Result<Vec<BulkResult>> {
        self.seal();
        let mut results = Vec::with_capacity(self.ready.len());
        while let Some(result) = self.flush(store).await? {
            results.push(result);
        }
        Ok(results)
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
