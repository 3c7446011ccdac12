//! Per-order line-number counter.
//!
//! Each purchase order being line-numbered owns one counter, addressed by a
//! name derived from the order id. Existence of the counter is meaningful
//! state: it is created with the order, dropped when the order is finalized or
//! deleted, and recreated above the last assigned number when an order goes
//! back to `Pending`.

use async_trait::async_trait;

use orders_storage_core::OrderId;

use super::error::StoreError;
use super::transaction::TransactionalStore;

/// Default counter name prefix.
pub const DEFAULT_COUNTER_PREFIX: &str = "po_line_number_";

/// Highest line number a counter may issue by default.
pub const DEFAULT_MAX_LINE_NUMBER: i64 = 999;

/// Longest usable prefix: Postgres truncates identifiers past 63 bytes and
/// the order id takes 32 of them.
pub const MAX_COUNTER_PREFIX_LEN: usize = 63 - 32;

/// Naming and bounds shared by every counter of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSettings {
    prefix: String,
    max_value: i64,
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_COUNTER_PREFIX.to_string(),
            max_value: DEFAULT_MAX_LINE_NUMBER,
        }
    }
}

impl CounterSettings {
    /// Use `prefix` for counter names.
    ///
    /// Anything outside `[a-z0-9_]` is dropped so names stay valid unquoted
    /// SQL identifiers, and the result is cut to [`MAX_COUNTER_PREFIX_LEN`].
    pub fn with_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        let mut prefix = sanitize_prefix(prefix.as_ref());
        prefix.truncate(MAX_COUNTER_PREFIX_LEN);
        self.prefix = prefix;
        self
    }

    pub fn with_max_value(mut self, max_value: i64) -> Self {
        self.max_value = max_value.max(1);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn max_value(&self) -> i64 {
        self.max_value
    }

    /// Deterministic counter name for an order.
    pub fn name_for(&self, order_id: OrderId) -> String {
        format!("{}{}", self.prefix, order_id.simple())
    }

    /// Reject start values a counter could never issue.
    pub fn check_start(&self, order_id: OrderId, start: i64) -> Result<(), StoreError> {
        if (1..=self.max_value).contains(&start) {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "start {start} for counter of order {order_id} is outside 1..={}",
                self.max_value
            )))
        }
    }
}

/// Lowercase `raw` and keep only `[a-z0-9_]`.
pub fn sanitize_prefix(raw: &str) -> String {
    raw.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Counter resource operations.
///
/// `create`, `create_if_absent` and `drop_counter` join the caller's
/// transaction. The read paths and `next_value` run on their own.
#[async_trait]
pub trait SequenceCounter: TransactionalStore {
    /// Create a counter whose first issued value is `start`.
    ///
    /// Fails with `AlreadyExists` if the order already has a counter.
    async fn create(&self, tx: &mut Self::Tx, order_id: OrderId, start: i64)
    -> Result<(), StoreError>;

    /// Create the counter unless one exists, as a single conditional step.
    ///
    /// Returns whether this call created it.
    async fn create_if_absent(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        start: i64,
    ) -> Result<bool, StoreError>;

    /// Whether the order has a counter.
    ///
    /// A failed read answers `false`: absence is never confused with a
    /// confirmed counter that would block recreation.
    async fn exists(&self, order_id: OrderId) -> bool;

    /// Last value issued by the counter; 0 when it issued nothing or is absent.
    async fn current_count(&self, order_id: OrderId) -> Result<i64, StoreError>;

    /// Issue the next line number.
    async fn next_value(&self, order_id: OrderId) -> Result<i64, StoreError>;

    /// Remove the counter. Removing an absent counter is not an error.
    async fn drop_counter(&self, tx: &mut Self::Tx, order_id: OrderId) -> Result<(), StoreError>;
}
