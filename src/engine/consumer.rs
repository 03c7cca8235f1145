use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::shared::Shared;

/// Upper bound on events folded before yielding back to the runtime
const BATCH_LIMIT: usize = 256;

/// Single consumer: drains in FIFO order, sleeps on the queue's notify
/// permit when empty
pub(super) async fn run_consumer_loop(shared: Arc<Shared>, token: CancellationToken) {
    info!("Input consumer started");
    let mut batch = Vec::with_capacity(BATCH_LIMIT);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = shared.queue.ready() => {}
        }

        loop {
            batch.clear();
            let count = shared.queue.drain_into(&mut batch);
            if count == 0 {
                break;
            }
            for chunk in batch.chunks(BATCH_LIMIT) {
                shared.apply_events(chunk);
            }
            trace!("Folded {} events", count);
            tokio::task::yield_now().await;
            if token.is_cancelled() {
                break;
            }
        }
    }

    let remaining = shared.queue.len();
    if remaining > 0 {
        debug!("Input consumer stopping with {} events still queued", remaining);
    }
    info!("Input consumer stopped");
}
