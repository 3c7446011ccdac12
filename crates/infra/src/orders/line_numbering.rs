//! Read side of line numbering: the highest line number already assigned.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use orders_storage_core::OrderId;

use super::error::StoreError;

/// Reports the highest line number already assigned to an order's lines.
///
/// Must answer 0, not an error, when no line has been numbered yet.
#[async_trait]
pub trait LineNumberingQuery: Send + Sync + 'static {
    async fn last_assigned_sequence(&self, order_id: OrderId) -> Result<i64, StoreError>;
}

/// In-memory line numbering for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLineNumbering {
    last: RwLock<HashMap<OrderId, i64>>,
    unavailable: AtomicBool,
}

impl InMemoryLineNumbering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that line `sequence` of `order_id` has been numbered.
    pub fn record(&self, order_id: OrderId, sequence: i64) {
        if let Ok(mut last) = self.last.write() {
            let entry = last.entry(order_id).or_insert(0);
            *entry = (*entry).max(sequence);
        }
    }

    /// Make every query fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl LineNumberingQuery for InMemoryLineNumbering {
    async fn last_assigned_sequence(&self, order_id: OrderId) -> Result<i64, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("line numbering unavailable".to_string()));
        }

        let last = self
            .last
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(last.get(&order_id).copied().unwrap_or(0))
    }
}
