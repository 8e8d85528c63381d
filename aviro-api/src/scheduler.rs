use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use aviro_booking::{ReconcileOptions, ReconciliationEngine};

/// Spawns the periodic reconciliation sweep. An in-process flag skips a
/// tick when the previous sweep is still running; this service is deployed
/// as a single instance, so no distributed lock is taken.
pub fn spawn_reconcile_loop(
    engine: Arc<ReconciliationEngine>,
    interval_secs: u64,
    limit: i64,
) -> tokio::task::JoinHandle<()> {
    let running = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs, "reconciliation scheduler started");

        loop {
            ticker.tick().await;

            if running.swap(true, Ordering::SeqCst) {
                warn!("previous reconciliation sweep still running, skipping tick");
                continue;
            }

            let opts = ReconcileOptions {
                limit,
                dry_run: false,
                run_by: "scheduler".to_string(),
            };
            match engine.reconcile_once(&opts).await {
                Ok(run) => {
                    if run.scanned > 0 {
                        info!(
                            scanned = run.scanned,
                            retried = run.retried,
                            expired = run.expired,
                            skipped = run.skipped,
                            errors = run.errors,
                            "scheduled reconciliation sweep finished"
                        );
                    }
                }
                Err(e) => error!("scheduled reconciliation sweep failed: {}", e),
            }

            running.store(false, Ordering::SeqCst);
        }
    })
}
