//! Purchase order lifecycle: create, update and delete of an order together
//! with its line-number counter.
//!
//! ## Atomicity
//!
//! - **Create**: row insert and counter creation share one transaction.
//! - **Delete**: counter drop and row delete share one transaction; the drop
//!   runs first so a failing drop leaves the row untouched.
//! - **Update to `Pending`**: a missing counter is recreated above the last
//!   assigned line number. With [`RecreateMode::BestEffort`] the recreation is
//!   its own unit of work and its failure is only logged; with
//!   [`RecreateMode::Strict`] it shares the row update's transaction.
//! - **Update to a finalized status**: the row update is the only outcome the
//!   caller sees. On success a detached task drops the counter; its failure is
//!   logged and never retried.
//!
//! What happens to the counter is decided by
//! [`counter_action`](orders_storage_purchasing::counter_action).

use std::sync::Arc;

use tracing::{debug, field, info, instrument, warn, Instrument, Span};

use orders_storage_core::OrderId;
use orders_storage_purchasing::{
    counter_action, reseed_start, CounterAction, CounterState, PurchaseOrder, Transition,
};

use crate::config::{LifecycleConfig, RecreateMode};

use super::counter::SequenceCounter;
use super::error::{OrderError, StoreError};
use super::line_numbering::LineNumberingQuery;
use super::repository::OrderRepository;
use super::transaction::TransactionContext;

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub order: PurchaseOrder,
    /// Reference to the new resource, for a `Location` header.
    pub location: String,
}

impl CreatedOrder {
    pub fn id(&self) -> Option<OrderId> {
        self.order.id
    }
}

/// Orchestrates purchase order mutations and their counter side effects.
pub struct OrderLifecycle<S, L: ?Sized> {
    store: Arc<S>,
    line_numbering: Arc<L>,
    config: LifecycleConfig,
}

impl<S, L: ?Sized> Clone for OrderLifecycle<S, L> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            line_numbering: self.line_numbering.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, L> OrderLifecycle<S, L>
where
    S: OrderRepository + SequenceCounter,
    L: LineNumberingQuery + ?Sized,
{
    pub fn new(store: Arc<S>, line_numbering: Arc<L>, config: LifecycleConfig) -> Self {
        Self {
            store,
            line_numbering,
            config,
        }
    }

    /// Insert a new order and its counter, seeded at the first line number.
    ///
    /// An id is generated when the order has none. Either both the row and
    /// the counter exist afterwards, or neither does.
    #[instrument(skip_all, fields(order_id = field::Empty))]
    pub async fn create_order(&self, mut order: PurchaseOrder) -> Result<CreatedOrder, OrderError> {
        let order_id = order.ensure_id();
        Span::current().record("order_id", field::display(order_id));
        debug!("creating purchase order");

        let mut ctx = TransactionContext::begin(self.store.clone(), order).await?;
        let outcome = async {
            let (store, tx, order) = ctx.parts();
            store.insert(tx, order).await.map_err(OrderError::from_row)?;
            self.counter_step(&mut ctx, order_id, counter_action(Transition::Create))
                .await
        }
        .await;
        let order = ctx.finish(outcome).await?;

        info!("purchase order created");
        Ok(CreatedOrder {
            location: self.config.location_of(order_id),
            order,
        })
    }

    /// Replace the order stored under `id`.
    ///
    /// Only the row update decides the outcome, except in strict recreate
    /// mode where a failed counter recreation is reported too.
    #[instrument(skip(self, order), fields(order_id = %id, status = %order.workflow_status))]
    pub async fn update_order(&self, id: OrderId, mut order: PurchaseOrder) -> Result<(), OrderError> {
        order.bind_to(id)?;

        let mut transition = Transition::Update {
            target: order.workflow_status,
            counter: CounterState::Unknown,
        };
        if transition.needs_existence_check() {
            transition = Transition::Update {
                target: order.workflow_status,
                counter: self.store.exists(id).await.into(),
            };
        }

        match counter_action(transition) {
            CounterAction::Keep => self.update_row(id, order).await,
            CounterAction::RecreateAfterLastAssigned => match self.config.recreate_mode {
                RecreateMode::BestEffort => {
                    self.recreate_best_effort(id).await;
                    self.update_row(id, order).await
                }
                RecreateMode::Strict => self.recreate_and_update(id, order).await,
            },
            CounterAction::DropDetached => {
                self.update_row(id, order).await?;
                self.spawn_counter_drop(id);
                Ok(())
            }
            action @ (CounterAction::Create { .. }
            | CounterAction::DropRequired
            | CounterAction::Probe) => Err(OrderError::BackendFailure(format!(
                "unexpected counter action {action:?} for update"
            ))),
        }
    }

    /// Remove the order and its counter.
    ///
    /// The counter goes first; if it cannot be removed the row stays.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn delete_order(&self, id: OrderId) -> Result<(), OrderError> {
        let mut ctx = TransactionContext::begin(self.store.clone(), id).await?;
        let outcome = async {
            self.counter_step(&mut ctx, id, counter_action(Transition::Delete))
                .await?;
            let (store, tx, id) = ctx.parts();
            store.delete(tx, *id).await.map_err(OrderError::from_row)
        }
        .await;
        ctx.finish(outcome).await?;

        info!("purchase order deleted");
        Ok(())
    }

    /// Issue the next line number of a live order.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn next_line_number(&self, id: OrderId) -> Result<i64, OrderError> {
        self.store.next_value(id).await.map_err(|e| match e {
            StoreError::NotFound(msg) => OrderError::NotFound(msg),
            StoreError::Conflict(msg) => OrderError::Conflict(msg),
            other => OrderError::backend(other),
        })
    }

    /// Last line number issued by the order's counter; 0 when none.
    pub async fn issued_line_numbers(&self, id: OrderId) -> Result<i64, OrderError> {
        self.store.current_count(id).await.map_err(OrderError::backend)
    }

    /// Run a counter action as one step of an open transaction.
    async fn counter_step<E: Send>(
        &self,
        ctx: &mut TransactionContext<S, E>,
        order_id: OrderId,
        action: CounterAction,
    ) -> Result<(), OrderError> {
        match action {
            CounterAction::Keep => Ok(()),
            CounterAction::Create { start } => {
                let (store, tx, _) = ctx.parts();
                store
                    .create(tx, order_id, start)
                    .await
                    .map_err(OrderError::counter_create)
            }
            CounterAction::RecreateAfterLastAssigned => {
                let start = self.recreate_start(order_id).await?;
                let (store, tx, _) = ctx.parts();
                let created = store
                    .create_if_absent(tx, order_id, start)
                    .await
                    .map_err(OrderError::counter_create)?;
                if created {
                    info!(start, "line-number counter recreated");
                } else {
                    debug!("line-number counter already present");
                }
                Ok(())
            }
            CounterAction::DropRequired => {
                let (store, tx, _) = ctx.parts();
                store
                    .drop_counter(tx, order_id)
                    .await
                    .map_err(OrderError::counter_drop)
            }
            CounterAction::DropDetached | CounterAction::Probe => Err(OrderError::BackendFailure(
                format!("counter action {action:?} cannot run inside a transaction"),
            )),
        }
    }

    /// First value of a recreated counter: one past the last assigned line.
    async fn recreate_start(&self, order_id: OrderId) -> Result<i64, OrderError> {
        let last = self
            .line_numbering
            .last_assigned_sequence(order_id)
            .await
            .map_err(|e| {
                OrderError::CounterCreateFailed(format!(
                    "last assigned line number unavailable: {e}"
                ))
            })?;
        Ok(reseed_start(last))
    }

    async fn update_row(&self, id: OrderId, order: PurchaseOrder) -> Result<(), OrderError> {
        let mut ctx = TransactionContext::begin(self.store.clone(), order).await?;
        let (store, tx, order) = ctx.parts();
        let outcome = store.update(tx, id, order).await.map_err(OrderError::from_row);
        ctx.finish(outcome).await?;

        info!("purchase order updated");
        Ok(())
    }

    async fn recreate_best_effort(&self, id: OrderId) {
        let outcome = async {
            let mut ctx = TransactionContext::begin(self.store.clone(), id).await?;
            let step = self
                .counter_step(&mut ctx, id, CounterAction::RecreateAfterLastAssigned)
                .await;
            ctx.finish(step).await
        }
        .await;

        if let Err(e) = outcome {
            warn!(error = %e, "line-number counter recreation failed; updating order anyway");
        }
    }

    async fn recreate_and_update(&self, id: OrderId, order: PurchaseOrder) -> Result<(), OrderError> {
        let mut ctx = TransactionContext::begin(self.store.clone(), order).await?;
        let outcome = async {
            self.counter_step(&mut ctx, id, CounterAction::RecreateAfterLastAssigned)
                .await?;
            let (store, tx, order) = ctx.parts();
            store.update(tx, id, order).await.map_err(OrderError::from_row)
        }
        .await;
        ctx.finish(outcome).await?;

        info!("purchase order updated with recreated line-number counter");
        Ok(())
    }

    /// Drop the counter of a finalized order without making anyone wait.
    fn spawn_counter_drop(&self, id: OrderId) {
        let store = self.store.clone();

        let task = async move {
            let outcome = async {
                let mut ctx = TransactionContext::begin(store, id).await?;
                let (store, tx, _) = ctx.parts();
                let step = store
                    .drop_counter(tx, id)
                    .await
                    .map_err(OrderError::counter_drop);
                ctx.finish(step).await
            }
            .await;

            match outcome {
                Ok(_) => debug!("line-number counter of finalized order dropped"),
                Err(e) => warn!(error = %e, "failed to drop line-number counter of finalized order"),
            }
        };
        tokio::spawn(task.instrument(Span::current()));
    }
}
