// src/certstream.rs
//! Websocket client for a certstream server

use crate::config::CertstreamConfig;
use anyhow::anyhow;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_SIZE: usize = 1000;
const ERROR_CHANNEL_SIZE: usize = 16;

/// Receiving ends handed to the event loop
pub struct CertStreamChannels {
    /// Raw text frames, undecoded
    pub events: mpsc::Receiver<String>,
    pub errors: mpsc::Receiver<anyhow::Error>,
}

pub struct CertStream {
    url: String,
    reconnect_delay: Duration,
}

impl CertStream {
    pub fn new(config: &CertstreamConfig) -> Self {
        Self {
            url: config.url.clone(),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
        }
    }

    /// Start the connection task.
    ///
    /// The task reconnects after `reconnect_delay` whenever the connection
    /// drops, and stops once the event receiver is dropped.
    pub fn spawn(self) -> (CertStreamChannels, JoinHandle<()>) {
        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (errors_tx, errors) = mpsc::channel(ERROR_CHANNEL_SIZE);

        let handle = tokio::spawn(async move {
            self.run(events_tx, errors_tx).await;
        });

        (CertStreamChannels { events, errors }, handle)
    }

    async fn run(self, events_tx: mpsc::Sender<String>, errors_tx: mpsc::Sender<anyhow::Error>) {
        loop {
            match connect_async(self.url.as_str()).await {
                Ok((mut ws_stream, _)) => {
                    info!("Connected to certstream at {}", self.url);

                    // Pongs are queued by tungstenite and flushed on the next read
                    loop {
                        let frame = tokio::select! {
                            frame = ws_stream.next() => frame,
                            _ = events_tx.closed() => {
                                debug!("Event receiver dropped, stopping certstream client");
                                return;
                            }
                        };
                        let Some(frame) = frame else {
                            break;
                        };

                        match frame {
                            Ok(Message::Text(text)) => {
                                if events_tx.send(text.to_string()).await.is_err() {
                                    debug!("Event receiver dropped, stopping certstream client");
                                    return;
                                }
                            }
                            Ok(Message::Close(_)) => {
                                debug!("Certstream server closed the connection");
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                report(&errors_tx, anyhow!("websocket error: {}", e));
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    report(
                        &errors_tx,
                        anyhow!("failed to connect to {}: {}", self.url, e),
                    );
                }
            }

            if events_tx.is_closed() {
                return;
            }

            warn!(
                "Certstream connection lost, reconnecting in {:?}",
                self.reconnect_delay
            );
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = events_tx.closed() => return,
            }
        }
    }
}

/// Errors are best-effort; a full or closed error channel drops them
fn report(errors_tx: &mpsc::Sender<anyhow::Error>, err: anyhow::Error) {
    if errors_tx.try_send(err).is_err() {
        debug!("Certstream error channel unavailable, dropping error");
    }
}
