use busline_order::Sweeper;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::state::Workers;

/// Start the notification worker and the periodic sweeper
pub fn spawn(workers: Workers, sweeper: Arc<Sweeper>, sweep_every: Duration) -> Vec<JoinHandle<()>> {
    let Workers { notifier, events } = workers;
    info!(sweep_interval_secs = sweep_every.as_secs(), "Starting background workers");

    vec![tokio::spawn(notifier.run(events)), sweeper.spawn(sweep_every)]
}
