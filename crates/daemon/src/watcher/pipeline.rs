// Watcher → debounce → event loop.
//
// Each path is delivered once per burst, as its net change. The loop still
// reconciles against the disk, so the kind only saves it work: a file that
// came and went never reaches it.

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::debounce::{DebounceConfig, Debouncer};
use super::RawFsEvent;
use crate::app::{LoopEvent, LoopSender};

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub debounce: DebounceConfig,
}

/// Exits when `raw_rx` closes (watcher dropped), the loop is gone, or
/// `shutdown` fires.
pub async fn run_pipeline(
    mut raw_rx: mpsc::Receiver<RawFsEvent>,
    loop_tx: LoopSender,
    config: PipelineConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut debouncer = Debouncer::new(config.debounce);
    info!("watcher pipeline started");

    loop {
        let deadline = debouncer.next_deadline().map(Instant::from_std);
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                debug!("watcher pipeline shutting down");
                break;
            }

            maybe_event = raw_rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        trace!(path = %event.path.display(), kind = ?event.kind, "raw event received");
                        debouncer.push(event);
                    }
                    None => {
                        info!("raw event channel closed, pipeline exiting");
                        break;
                    }
                }
            }

            _ = sleep_until_settled(deadline), if deadline.is_some() => {}
        }

        for event in debouncer.drain_ready() {
            if loop_tx.send(LoopEvent::Fs(event)).is_err() {
                debug!("event loop gone, pipeline exiting");
                return;
            }
        }
    }
}

async fn sleep_until_settled(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}
