use std::sync::Arc;

use tracing::{error, info};

use crate::services::SessionManager;
use crate::Error;

/// Called at startup: restores the holders that were streaming when the
/// process last stopped, then starts any holders named explicitly.
pub async fn run_autostart(manager: Arc<SessionManager>, extra_holders: &[String]) -> Result<usize, Error> {
    let mut started = manager.restore_active().await?;

    for holder in extra_holders {
        if manager.is_active(holder) {
            continue;
        }
        info!("Autostart: attempting to start holder='{}'", holder);
        match manager.start_for_holder(holder).await {
            Ok(start) if start.report.success => {
                started += 1;
                if start.used_default_config {
                    info!("Autostart: holder='{}' has no config yet, using the default one", holder);
                }
            }
            Ok(start) => error!(
                "Autostart: holder='{}' started nothing: {:?}",
                holder, start.report.failures
            ),
            Err(e) => error!("Autostart failed for holder='{}': {:?}", holder, e),
        }
    }

    info!("Autostart finished; {} holder(s) streaming", started);
    Ok(started)
}
