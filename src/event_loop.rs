// src/event_loop.rs
use crate::certstream::CertStreamChannels;
use crate::matcher::Matcher;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why the event loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// The event channel was closed by its producer
    StreamClosed,
}

/// Drive the matcher from the certstream channels until `shutdown` flips
/// to true (or its sender is dropped).
///
/// Stream errors are logged and the loop keeps going. Deliveries and
/// debounce timers already in flight are left running.
pub async fn run(
    matcher: &Matcher,
    mut channels: CertStreamChannels,
    mut shutdown: watch::Receiver<bool>,
) -> LoopExit {
    info!("Watching {} targets", matcher.target_count());

    let mut errors_open = true;

    loop {
        if *shutdown.borrow_and_update() {
            info!("goodbye");
            return LoopExit::Cancelled;
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    info!("goodbye");
                    return LoopExit::Cancelled;
                }
            }
            event = channels.events.recv() => {
                match event {
                    Some(raw) => {
                        matcher.process_raw(&raw).await;
                    }
                    None => {
                        warn!("Certstream event channel closed");
                        return LoopExit::StreamClosed;
                    }
                }
            }
            err = channels.errors.recv(), if errors_open => {
                match err {
                    Some(e) => warn!("certstream error: {:#}", e),
                    None => {
                        debug!("Certstream error channel closed");
                        errors_open = false;
                    }
                }
            }
        }
    }
}
