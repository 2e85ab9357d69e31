//! WebSocket driver: owns the socket and the three connection tasks.
//!
//! All protocol logic lives in [`WireLink`]; this module only moves bytes.
//! Three tasks run per connection:
//!
//! - writer: drains the outbound frame channel into the socket sink,
//! - reader: feeds every inbound text frame to [`WireLink::handle_frame`],
//! - ticker: drives [`WireLink::pump_tick`] at the dispatch cadence.
//!
//! The reader observing end-of-stream (or an error) marks the link
//! disconnected, which resets the queue and cancels pending ack waits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::domain::status::SessionConnectivity;
use crate::infrastructure::link::{DeviceLink, WireLink};

/// A live device connection and its driver tasks.
pub struct Connection {
    link: Arc<WireLink>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    pub fn link(&self) -> Arc<WireLink> {
        Arc::clone(&self.link)
    }

    /// Stops the driver tasks and marks the link disconnected.
    pub fn shutdown(self) {
        self.link.set_connected(false);
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Dials the device and starts the connection tasks.
pub async fn connect(
    url: &str,
    dispatch_tick: Duration,
    connectivity: Arc<SessionConnectivity>,
) -> anyhow::Result<Connection> {
    info!(url, "connecting to device");
    let (socket, _response) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    let (mut sink, mut stream) = socket.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let link = Arc::new(WireLink::new(outbound_tx, connectivity));
    link.set_connected(true);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            // Line frames are UTF-8; stream chunks may not be.
            let message = match String::from_utf8(frame) {
                Ok(text) => Message::Text(text),
                Err(raw) => Message::Binary(raw.into_bytes()),
            };
            if let Err(error) = sink.send(message).await {
                warn!(%error, "socket write failed");
                break;
            }
        }
    });

    let reader = {
        let link = Arc::clone(&link);
        tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                match next {
                    Ok(Message::Text(text)) => {
                        link.handle_frame(text.trim_end_matches(['\r', '\n']));
                    }
                    Ok(Message::Close(_)) => {
                        debug!("device closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "socket read failed");
                        break;
                    }
                }
            }
            link.set_connected(false);
        })
    };

    let ticker = {
        let link = Arc::clone(&link);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dispatch_tick);
            while link.is_connected() {
                interval.tick().await;
                link.pump_tick();
            }
        })
    };

    Ok(Connection {
        link,
        tasks: vec![writer, reader, ticker],
    })
}
