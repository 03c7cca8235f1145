use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::shared::Shared;
use super::stats::{StatsReporter, StatsSnapshot};

pub(super) const REQUEST_CAPACITY: usize = 16;

/// Work the tick hands off so it never blocks on a mode switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorRequest {
    OutputFailed(String),
    PhysicalConnected,
}

pub(super) async fn run_supervisor_loop(shared: Arc<Shared>, token: CancellationToken) {
    let mut requests = shared.requests_rx.lock().await;
    info!("Supervisor started");

    let mut reconnect = tokio::time::interval(shared.settings.reconnect_interval());
    reconnect.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let stats_period = shared.settings.stats_interval();
    let mut stats_timer = tokio::time::interval_at(Instant::now() + stats_period, stats_period);
    let mut reporter = StatsReporter::new(current_stats(&shared));

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            Some(request) = requests.recv() => handle_request(&shared, request).await,
            _ = reconnect.tick() => {
                if !shared.output_healthy.load(Ordering::Acquire) {
                    reconnect_output(&shared).await;
                }
            }
            _ = stats_timer.tick() => reporter.report(current_stats(&shared)),
        }
    }
    info!("Supervisor stopped");
}

fn current_stats(shared: &Shared) -> StatsSnapshot {
    shared.stats.snapshot(shared.queue.dropped_count())
}

async fn handle_request(shared: &Arc<Shared>, request: SupervisorRequest) {
    debug!("Supervisor handling {:?}", request);
    let worker = shared.clone();
    // Mode switches persist to disk, keep them off the runtime threads
    let result = tokio::task::spawn_blocking(move || match request {
        SupervisorRequest::OutputFailed(reason) => worker
            .modes
            .fallback_to_native(&reason)
            .map(Some),
        SupervisorRequest::PhysicalConnected => worker.modes.on_physical_controller_connected(),
    })
    .await;

    match result {
        Ok(Ok(Some(change))) if change.changed() => {
            info!("Supervisor switched {} -> {}", change.previous, change.current)
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Supervisor mode switch failed: {}", e),
        Err(e) => error!("Supervisor worker failed: {}", e),
    }
}

async fn reconnect_output(shared: &Arc<Shared>) {
    let worker = shared.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut pad = worker.pad.lock();
        let result = pad.connect();
        if result.is_ok() {
            worker.output_healthy.store(true, Ordering::Release);
        }
        result
    })
    .await;

    match result {
        Ok(Ok(())) => info!("Virtual pad reconnected"),
        Ok(Err(e)) => debug!("Virtual pad reconnect failed: {}", e),
        Err(e) => error!("Reconnect worker failed: {}", e),
    }
}
