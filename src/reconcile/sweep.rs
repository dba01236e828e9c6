//! Bounded reconciliation sweep over recent pending orders
//!
//! Items are processed sequentially with per-item isolation: one order's
//! lookup failure is recorded in the report and never aborts the rest. The
//! sweep holds no lock of any kind; each item is an independent sync.

use serde::Serialize;
use uuid::Uuid;

use crate::db::orders as order_store;
use crate::error::AppResult;
use crate::state::AppState;

use super::{SyncOutcome, sync_order};

/// One failed item in a sweep
#[derive(Debug, Serialize)]
pub struct SweepFailure {
    pub order_id: Uuid,
    pub error: String,
}

/// Aggregate result of one sweep run
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub still_pending: usize,
    pub no_payment: usize,
    pub failures: Vec<SweepFailure>,
}

/// Sweep recently created pending orders, oldest first, bounded by the
/// configured batch size and creation window.
pub async fn run_sweep(state: &AppState) -> AppResult<SweepReport> {
    let pending = order_store::list_pending_for_sweep(
        &state.pool,
        state.config.sweep_window_hours,
        state.config.sweep_batch_size,
    )
    .await?;

    let mut report = SweepReport {
        scanned: pending.len(),
        ..Default::default()
    };

    for order in &pending {
        match sync_order(state, order.id).await {
            Ok(SyncOutcome::Confirmed) => report.confirmed += 1,
            Ok(SyncOutcome::Cancelled) => report.cancelled += 1,
            Ok(SyncOutcome::StillPending) => report.still_pending += 1,
            Ok(SyncOutcome::NoPaymentFound) => report.no_payment += 1,
            // A sibling settlement can terminate an order before its own
            // sweep item reaches it.
            Ok(SyncOutcome::AlreadyFinal) => {}
            Err(e) => {
                tracing::warn!(order = %order.id, error = %e, "Sweep item failed");
                report.failures.push(SweepFailure {
                    order_id: order.id,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        confirmed = report.confirmed,
        cancelled = report.cancelled,
        failed = report.failures.len(),
        "Reconciliation sweep finished"
    );
    Ok(report)
}
