// presencebot-core/src/tasks/health_sweep.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::services::SessionManager;

/// Spawns the periodic health sweep: memory check, cleanup and restarts.
pub fn spawn_health_sweep_task(
    manager: Arc<SessionManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(interval) => {}
            }
            let report = manager.run_health_check().await;
            if report.restarted > 0 || report.pruned_sessions > 0 {
                info!(
                    "(HealthSweep) memory={:.1}% restarted={} pruned_sessions={}",
                    report.usage_percent, report.restarted, report.pruned_sessions
                );
            } else {
                debug!("(HealthSweep) memory={:.1}%", report.usage_percent);
            }
        }
        debug!("(HealthSweep) stopped");
    })
}
