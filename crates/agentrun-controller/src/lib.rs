//! Reconcilers for tasks, batch runs and cron tasks, and the watch-driven runtime that drives them.
//!
//! Every reconciler is a stateless function of the stored object and the observed world. It
//! returns an [`Action`] telling the [`Controller`] when to look again instead of sleeping.

mod action;
pub use action::Action;

mod error;
pub use error::ReconcileError;

mod reconciler;
pub use reconciler::{Deps, Reconciler};

mod metrics;
pub use metrics::ControllerMetrics;

pub mod runtime;
pub use runtime::Controller;

pub mod task;
pub use task::TaskReconciler;

pub mod batch;
pub use batch::BatchReconciler;

pub mod cron;
pub use cron::CronReconciler;

#[cfg(test)]
mod testutil;
