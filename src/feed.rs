/// Ingests the game-side state feed.
///
/// The client plugin serves JSON text frames on a local websocket. Each frame
/// is handed to `StateStore::apply_raw`; malformed frames are dropped there.
/// When the connection drops (or never comes up) we wait `backoff` and dial
/// again, forever. The store keeps its last snapshot across reconnects.
use crate::state::StateStore;
use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

pub async fn run(url: String, store: Arc<StateStore>, backoff: Duration) {
    tracing::info!("Feed ingester starting: {}", url);
    loop {
        match session(&url, &store).await {
            Ok(applied) => {
                tracing::warn!("Feed closed after {} message(s); reconnecting in {:?}", applied, backoff)
            }
            Err(e) => tracing::warn!("Feed connection error: {:#}. Reconnecting in {:?}", e, backoff),
        }
        tokio::time::sleep(backoff).await;
    }
}

/// One connection. Returns the number of frames applied once the peer closes.
async fn session(url: &str, store: &StateStore) -> Result<usize> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("connecting to {}", url))?;
    tracing::info!("Feed connected");

    let mut applied = 0;
    while let Some(msg) = ws.next().await {
        match msg.context("reading feed frame")? {
            Message::Text(text) => {
                if store.apply_raw(text.as_str()) {
                    applied += 1;
                }
            }
            Message::Close(frame) => {
                tracing::debug!("Feed close frame: {:?}", frame);
                break;
            }
            // Pings are answered by tungstenite; binary frames are not part of the feed.
            _ => {}
        }
    }
    Ok(applied)
}
