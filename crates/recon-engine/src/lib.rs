//! Reconciliation Engine (spec §4.4): computes and applies the delta between
//! an incoming batch of stamped chunks and whatever a `VectorStoreAdapter`
//! already holds, in the fixed delete → add → touch → expire order.

mod fanout;
mod plan;
mod reconcile;

#[cfg(test)]
mod e2e_scenario;
#[cfg(test)]
pub(crate) mod test_support;

pub use plan::{compute_delta_plan, DeltaPlan, DEFAULT_WORKER_POOL_SIZE};
pub use reconcile::{expire, reconcile, reconcile_with_worker_pool, ReconcileError, ReconcileOutcome, Strategy};
