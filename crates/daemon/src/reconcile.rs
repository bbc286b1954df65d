// SPDX-License-Identifier: MIT

//! The reconciliation loop (spec.md §4.F, §8 invariant 8): every
//! `reconcile_interval_secs`, walk this instance's own `ServiceRecord`s and
//! signal 0 each supervisor pid. A row whose status isn't already `killed`
//! but whose pid is gone is deleted; a `killed` row whose pid is still
//! alive is left for `Kill`'s own retry loop to finish off.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use zallet_core::{ServiceRecord, Status};
use zallet_storage::{Catalog, CatalogFilter};

use crate::state::AppState;

pub async fn run(state: AppState, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(state.config.reconcile_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }
        if let Err(err) = reconcile_once(&state).await {
            // spec.md §7: "Reconciliation errors are logged and the loop
            // continues."
            tracing::warn!(%err, "reconciliation pass failed");
        }
    }
}

async fn reconcile_once(state: &AppState) -> Result<(), zallet_storage::StorageError> {
    let filter = CatalogFilter { instance_id: Some(state.instance_id.clone()), ..Default::default() };
    let rows = state.catalog.list(&filter).await?;
    for row in rows {
        reconcile_row(state, &row).await;
    }
    Ok(())
}

async fn reconcile_row(state: &AppState, row: &ServiceRecord) {
    let alive = row.pid.is_some_and(pid_alive);
    if row.status == Status::Killed {
        if alive {
            tracing::debug!(service_id = %row.id, "killed service's supervisor is still alive; Kill will retry");
        }
        return;
    }
    if !alive {
        tracing::info!(service_id = %row.id, "supervisor pid gone, deleting stale service record");
        let _ = state.catalog.delete_by_id(&row.id).await;
        state.supervisors.lock().remove(row.id.as_str());
    }
}

fn pid_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}
