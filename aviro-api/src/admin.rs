use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use aviro_booking::ReconcileOptions;
use aviro_core::ReconciliationRun;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/admin/reconcile", post(trigger_reconcile))
}

#[derive(Debug, Default, Deserialize)]
struct ReconcileRequest {
    limit: Option<i64>,
    #[serde(default)]
    dry_run: bool,
}

/// POST /admin/reconcile
///
/// Runs one reconciliation sweep on demand, same engine the scheduler uses.
async fn trigger_reconcile(
    State(state): State<AppState>,
    payload: Option<Json<ReconcileRequest>>,
) -> Result<Json<ReconciliationRun>, AppError> {
    let req = payload.map(|Json(r)| r).unwrap_or_default();

    let mut opts = ReconcileOptions::default();
    if let Some(limit) = req.limit.filter(|l| *l > 0) {
        opts.limit = limit;
    }
    opts.dry_run = req.dry_run;
    opts.run_by = "manual".to_string();

    let run = state.reconciler.reconcile_once(&opts).await?;
    Ok(Json(run))
}
