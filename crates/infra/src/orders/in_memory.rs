use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use orders_storage_core::OrderId;
use orders_storage_purchasing::PurchaseOrder;

use super::counter::{CounterSettings, SequenceCounter};
use super::error::StoreError;
use super::repository::{require_id, OrderRepository};
use super::transaction::TransactionalStore;

/// How long a drop waits under [`Fault::SlowCounterDrop`].
pub const SLOW_DROP_DELAY: Duration = Duration::from_secs(2);

/// Failure that can be switched on in [`InMemoryOrderStore`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    OrderInsert,
    OrderUpdate,
    OrderDelete,
    CounterCreate,
    CounterDrop,
    /// Existence and count reads fail.
    CounterRead,
    /// Counter drops stall for [`SLOW_DROP_DELAY`] before succeeding.
    SlowCounterDrop,
    Rollback,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Counter {
    next: i64,
    last_issued: i64,
}

#[derive(Debug, Clone, Default)]
struct State {
    orders: HashMap<OrderId, JsonValue>,
    counters: HashMap<OrderId, Counter>,
}

#[derive(Debug, Clone)]
enum Op {
    InsertOrder(OrderId, JsonValue),
    UpdateOrder(OrderId, JsonValue),
    DeleteOrder(OrderId),
    CreateCounter { order_id: OrderId, start: i64 },
    CreateCounterIfAbsent { order_id: OrderId, start: i64 },
    DropCounter(OrderId),
}

impl State {
    /// Apply one write. The flag is only meaningful for conditional creates.
    fn apply(&mut self, op: &Op) -> Result<bool, StoreError> {
        match op {
            Op::InsertOrder(id, doc) => {
                if self.orders.contains_key(id) {
                    return Err(StoreError::AlreadyExists(format!("purchase order {id}")));
                }
                self.orders.insert(*id, doc.clone());
            }
            Op::UpdateOrder(id, doc) => match self.orders.get_mut(id) {
                Some(row) => *row = doc.clone(),
                None => return Err(StoreError::NotFound(format!("purchase order {id}"))),
            },
            Op::DeleteOrder(id) => {
                if self.orders.remove(id).is_none() {
                    return Err(StoreError::NotFound(format!("purchase order {id}")));
                }
            }
            Op::CreateCounter { order_id, start } => {
                if self.counters.contains_key(order_id) {
                    return Err(StoreError::AlreadyExists(format!(
                        "line-number counter of order {order_id}"
                    )));
                }
                self.counters.insert(*order_id, Counter { next: *start, last_issued: 0 });
            }
            Op::CreateCounterIfAbsent { order_id, start } => {
                if self.counters.contains_key(order_id) {
                    return Ok(false);
                }
                self.counters.insert(*order_id, Counter { next: *start, last_issued: 0 });
            }
            Op::DropCounter(order_id) => {
                self.counters.remove(order_id);
            }
        }
        Ok(true)
    }
}

/// Transaction of [`InMemoryOrderStore`].
///
/// Writes are applied to a private working copy and replayed against the
/// shared state on commit, all or nothing.
#[derive(Debug)]
pub struct InMemoryTx {
    working: State,
    ops: Vec<Op>,
}

impl InMemoryTx {
    fn stage(&mut self, op: Op) -> Result<bool, StoreError> {
        let flag = self.working.apply(&op)?;
        self.ops.push(op);
        Ok(flag)
    }
}

/// In-memory order rows and counters.
///
/// Intended for tests/dev: supports switching on failures per operation.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: RwLock<State>,
    settings: CounterSettings,
    faults: RwLock<HashSet<Fault>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: CounterSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn inject(&self, fault: Fault) {
        if let Ok(mut faults) = self.faults.write() {
            faults.insert(fault);
        }
    }

    pub fn clear(&self, fault: Fault) {
        if let Ok(mut faults) = self.faults.write() {
            faults.remove(&fault);
        }
    }

    /// Committed order row, if any.
    pub fn order(&self, id: OrderId) -> Option<PurchaseOrder> {
        let state = self.state.read().ok()?;
        let doc = state.orders.get(&id)?.clone();
        PurchaseOrder::from_document(doc).ok()
    }

    /// Committed counter existence, bypassing injected faults.
    pub fn has_counter(&self, id: OrderId) -> bool {
        self.state
            .read()
            .map(|state| state.counters.contains_key(&id))
            .unwrap_or(false)
    }

    pub fn counter_count(&self) -> usize {
        self.state.read().map(|state| state.counters.len()).unwrap_or(0)
    }

    fn check(&self, fault: Fault, what: &str) -> Result<(), StoreError> {
        let active = self
            .faults
            .read()
            .map(|faults| faults.contains(&fault))
            .unwrap_or(false);
        if active {
            Err(StoreError::Backend(format!("injected failure: {what}")))
        } else {
            Ok(())
        }
    }

    fn is_active(&self, fault: Fault) -> bool {
        self.check(fault, "").is_err()
    }

    fn document(order: &PurchaseOrder) -> Result<(OrderId, JsonValue), StoreError> {
        let id = require_id(order)?;
        let doc = order
            .to_document()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok((id, doc))
    }
}

#[async_trait]
impl TransactionalStore for InMemoryOrderStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(InMemoryTx {
            working: state.clone(),
            ops: Vec::new(),
        })
    }

    async fn commit(&self, tx: InMemoryTx) -> Result<(), StoreError> {
        let mut live = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        // Replay against the latest state so concurrent commits are not lost.
        let mut next = live.clone();
        for op in &tx.ops {
            next.apply(op)?;
        }
        *live = next;
        Ok(())
    }

    async fn rollback(&self, _tx: InMemoryTx) -> Result<(), StoreError> {
        self.check(Fault::Rollback, "rollback")
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderStore {
    async fn insert(&self, tx: &mut InMemoryTx, order: &PurchaseOrder) -> Result<(), StoreError> {
        self.check(Fault::OrderInsert, "order insert")?;
        let (id, doc) = Self::document(order)?;
        tx.stage(Op::InsertOrder(id, doc)).map(|_| ())
    }

    async fn update(
        &self,
        tx: &mut InMemoryTx,
        id: OrderId,
        order: &PurchaseOrder,
    ) -> Result<(), StoreError> {
        self.check(Fault::OrderUpdate, "order update")?;
        let (_, doc) = Self::document(order)?;
        tx.stage(Op::UpdateOrder(id, doc)).map(|_| ())
    }

    async fn delete(&self, tx: &mut InMemoryTx, id: OrderId) -> Result<(), StoreError> {
        self.check(Fault::OrderDelete, "order delete")?;
        tx.stage(Op::DeleteOrder(id)).map(|_| ())
    }
}

#[async_trait]
impl SequenceCounter for InMemoryOrderStore {
    async fn create(
        &self,
        tx: &mut InMemoryTx,
        order_id: OrderId,
        start: i64,
    ) -> Result<(), StoreError> {
        self.check(Fault::CounterCreate, "counter create")?;
        self.settings.check_start(order_id, start)?;
        tx.stage(Op::CreateCounter { order_id, start }).map(|_| ())
    }

    async fn create_if_absent(
        &self,
        tx: &mut InMemoryTx,
        order_id: OrderId,
        start: i64,
    ) -> Result<bool, StoreError> {
        self.check(Fault::CounterCreate, "counter create")?;
        self.settings.check_start(order_id, start)?;
        tx.stage(Op::CreateCounterIfAbsent { order_id, start })
    }

    async fn exists(&self, order_id: OrderId) -> bool {
        if self.is_active(Fault::CounterRead) {
            return false;
        }
        self.has_counter(order_id)
    }

    async fn current_count(&self, order_id: OrderId) -> Result<i64, StoreError> {
        self.check(Fault::CounterRead, "counter read")?;
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(state
            .counters
            .get(&order_id)
            .map(|c| c.last_issued)
            .unwrap_or(0))
    }

    async fn next_value(&self, order_id: OrderId) -> Result<i64, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let counter = state.counters.get_mut(&order_id).ok_or_else(|| {
            StoreError::NotFound(format!("line-number counter of order {order_id}"))
        })?;

        let max = self.settings.max_value();
        if counter.next > max || counter.last_issued >= max {
            return Err(StoreError::Conflict(format!(
                "line-number counter of order {order_id} reached its maximum {max}"
            )));
        }

        let value = counter.next;
        counter.last_issued = value;
        counter.next = value.saturating_add(1);
        Ok(value)
    }

    async fn drop_counter(&self, tx: &mut InMemoryTx, order_id: OrderId) -> Result<(), StoreError> {
        if self.is_active(Fault::SlowCounterDrop) {
            tokio::time::sleep(SLOW_DROP_DELAY).await;
        }
        self.check(Fault::CounterDrop, "counter drop")?;
        tx.stage(Op::DropCounter(order_id)).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orders_storage_purchasing::WorkflowStatus;

    async fn committed_counter(store: &InMemoryOrderStore, id: OrderId, start: i64) {
        let mut tx = store.begin().await.unwrap();
        store.create(&mut tx, id, start).await.unwrap();
        store.commit(tx).await.unwrap();
    }

    #[tokio::test]
    async fn counter_issues_from_start_and_reports_current() {
        let store = InMemoryOrderStore::new();
        let id = OrderId::new();
        committed_counter(&store, id, 5).await;

        assert!(store.exists(id).await);
        assert_eq!(store.current_count(id).await.unwrap(), 0);
        assert_eq!(store.next_value(id).await.unwrap(), 5);
        assert_eq!(store.next_value(id).await.unwrap(), 6);
        assert_eq!(store.current_count(id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn create_rejects_existing_counter() {
        let store = InMemoryOrderStore::new();
        let id = OrderId::new();
        committed_counter(&store, id, 1).await;

        let mut tx = store.begin().await.unwrap();
        let err = store.create(&mut tx, id, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn conditional_create_only_creates_once() {
        let store = InMemoryOrderStore::new();
        let id = OrderId::new();

        let mut tx = store.begin().await.unwrap();
        assert!(store.create_if_absent(&mut tx, id, 3).await.unwrap());
        assert!(!store.create_if_absent(&mut tx, id, 9).await.unwrap());
        store.commit(tx).await.unwrap();

        assert_eq!(store.next_value(id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn concurrent_conditional_creates_do_not_collide() {
        let store = InMemoryOrderStore::new();
        let id = OrderId::new();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(store.create_if_absent(&mut first, id, 4).await.unwrap());
        assert!(store.create_if_absent(&mut second, id, 4).await.unwrap());

        store.commit(first).await.unwrap();
        store.commit(second).await.unwrap();
        assert_eq!(store.counter_count(), 1);
    }

    #[tokio::test]
    async fn drop_is_idempotent() {
        let store = InMemoryOrderStore::new();
        let id = OrderId::new();

        let mut tx = store.begin().await.unwrap();
        store.drop_counter(&mut tx, id).await.unwrap();
        store.drop_counter(&mut tx, id).await.unwrap();
        store.commit(tx).await.unwrap();
        assert!(!store.exists(id).await);
    }

    #[tokio::test]
    async fn read_failure_looks_absent_and_count_errors() {
        let store = InMemoryOrderStore::new();
        let id = OrderId::new();
        committed_counter(&store, id, 1).await;

        store.inject(Fault::CounterRead);
        assert!(!store.exists(id).await);
        assert!(store.current_count(id).await.is_err());

        store.clear(Fault::CounterRead);
        assert!(store.exists(id).await);
    }

    #[tokio::test]
    async fn absent_counter_counts_zero_and_cannot_issue() {
        let store = InMemoryOrderStore::new();
        let id = OrderId::new();
        assert_eq!(store.current_count(id).await.unwrap(), 0);
        assert!(matches!(store.next_value(id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn counter_stops_at_max_value() {
        let store = InMemoryOrderStore::with_settings(CounterSettings::default().with_max_value(2));
        let id = OrderId::new();
        committed_counter(&store, id, 2).await;

        assert_eq!(store.next_value(id).await.unwrap(), 2);
        assert!(matches!(store.next_value(id).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn counter_at_i64_max_issues_once_then_stops() {
        let store =
            InMemoryOrderStore::with_settings(CounterSettings::default().with_max_value(i64::MAX));
        let id = OrderId::new();
        committed_counter(&store, id, i64::MAX).await;

        assert_eq!(store.next_value(id).await.unwrap(), i64::MAX);
        assert!(matches!(store.next_value(id).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.current_count(id).await.unwrap(), i64::MAX);
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let store = InMemoryOrderStore::new();
        let id = OrderId::new();
        let order = PurchaseOrder::new(WorkflowStatus::Open).with_id(id);

        let mut tx = store.begin().await.unwrap();
        let err = store.update(&mut tx, id, &order).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
