//! Scoped unit of work: one backend transaction plus the entity being mutated.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use super::error::{OrderError, StoreError};

/// A backend able to open, commit and roll back transactions.
///
/// Repository and counter operations that participate in a unit of work take
/// the transaction handle (`Tx`) explicitly, so a single handle can carry
/// several steps that commit or roll back together.
#[async_trait]
pub trait TransactionalStore: Send + Sync + 'static {
    type Tx: Send + 'static;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;
}

/// A transaction handle bundled with the entity under mutation.
///
/// The context is consumed by [`commit`](Self::commit),
/// [`rollback`](Self::rollback) or [`finish`](Self::finish); the handle is
/// released on every path.
pub struct TransactionContext<S: TransactionalStore, E> {
    store: Arc<S>,
    tx: S::Tx,
    entity: E,
}

impl<S: TransactionalStore, E: Send> TransactionContext<S, E> {
    pub async fn begin(store: Arc<S>, entity: E) -> Result<Self, OrderError> {
        let tx = store.begin().await.map_err(OrderError::backend)?;
        Ok(Self { store, tx, entity })
    }

    /// Borrow the store, the transaction handle and the entity at once.
    pub fn parts(&mut self) -> (&S, &mut S::Tx, &E) {
        let Self { store, tx, entity } = self;
        (&**store, tx, &*entity)
    }

    /// Commit and hand back the entity.
    pub async fn commit(self) -> Result<E, OrderError> {
        let Self { store, tx, entity } = self;
        store.commit(tx).await.map_err(OrderError::backend)?;
        debug!("transaction committed");
        Ok(entity)
    }

    /// Roll back and return `cause` unchanged.
    ///
    /// A failing rollback is logged; the caller still sees the original cause.
    pub async fn rollback(self, cause: OrderError) -> OrderError {
        let Self { store, tx, .. } = self;
        match store.rollback(tx).await {
            Ok(()) => debug!(cause = %cause, "transaction rolled back"),
            Err(rollback_err) => error!(
                cause = %cause,
                error = %rollback_err,
                "rollback failed; backend will discard the transaction"
            ),
        }
        cause
    }

    /// Commit if every composed step succeeded, otherwise roll back.
    pub async fn finish(self, outcome: Result<(), OrderError>) -> Result<E, OrderError> {
        match outcome {
            Ok(()) => self.commit().await,
            Err(cause) => Err(self.rollback(cause).await),
        }
    }
}
