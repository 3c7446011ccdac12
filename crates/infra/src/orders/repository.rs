use async_trait::async_trait;

use orders_storage_core::OrderId;
use orders_storage_purchasing::PurchaseOrder;

use super::error::StoreError;
use super::transaction::TransactionalStore;

/// Create/update/delete of the primary purchase order record.
///
/// The payload shape belongs to the caller: implementations persist the whole
/// order document and only index it by id.
#[async_trait]
pub trait OrderRepository: TransactionalStore {
    /// Insert a new row. `AlreadyExists` when the id is taken.
    ///
    /// The order must carry an id.
    async fn insert(&self, tx: &mut Self::Tx, order: &PurchaseOrder) -> Result<(), StoreError>;

    /// Replace the row stored under `id`. `NotFound` when no row matched.
    async fn update(
        &self,
        tx: &mut Self::Tx,
        id: OrderId,
        order: &PurchaseOrder,
    ) -> Result<(), StoreError>;

    /// Remove the row stored under `id`. `NotFound` when no row matched.
    async fn delete(&self, tx: &mut Self::Tx, id: OrderId) -> Result<(), StoreError>;
}

pub(crate) fn require_id(order: &PurchaseOrder) -> Result<OrderId, StoreError> {
    order
        .id
        .ok_or_else(|| StoreError::Backend("purchase order has no id".to_string()))
}
