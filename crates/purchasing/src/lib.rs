//! Purchasing domain module (purchase orders and their line-number counters).
//!
//! This crate contains the order model and the rules deciding what happens to
//! an order's line-number counter on each lifecycle transition, implemented
//! purely as deterministic domain logic (no IO, no storage).

pub mod order;
pub mod policy;

pub use order::{PurchaseOrder, WorkflowStatus};
pub use policy::{
    counter_action, reseed_start, CounterAction, CounterState, Transition, FIRST_LINE_NUMBER,
};
