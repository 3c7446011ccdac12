//! Purchase order persistence and the lifecycle of per-order line-number
//! counters.
//!
//! The orchestrator ([`OrderLifecycle`]) is backend-agnostic: it composes
//! [`OrderRepository`] and [`SequenceCounter`] steps inside a
//! [`TransactionContext`]. Two backends ship with the crate:
//!
//! - [`PostgresOrderStore`]: JSONB rows plus one `SEQUENCE` per order.
//! - [`InMemoryOrderStore`]: for tests/dev, with injectable failures.

pub mod counter;
pub mod error;
pub mod in_memory;
pub mod lifecycle;
pub mod line_numbering;
pub mod postgres;
pub mod repository;
pub mod transaction;

pub use counter::{
    CounterSettings, SequenceCounter, DEFAULT_COUNTER_PREFIX, DEFAULT_MAX_LINE_NUMBER,
    MAX_COUNTER_PREFIX_LEN,
};
pub use error::{OrderError, StoreError};
pub use in_memory::{Fault, InMemoryOrderStore, InMemoryTx};
pub use lifecycle::{CreatedOrder, OrderLifecycle};
pub use line_numbering::{InMemoryLineNumbering, LineNumberingQuery};
pub use postgres::{PostgresLineNumbering, PostgresOrderStore};
pub use repository::OrderRepository;
pub use transaction::{TransactionContext, TransactionalStore};
