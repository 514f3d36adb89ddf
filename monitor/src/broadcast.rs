//! Live device feed: one loop per connected subscriber.
//!
//! Each loop waits for its interval, re-reads the whole collection from the
//! store, and pushes a `devices_update` envelope to its own socket. Loops
//! share nothing but the [`ConnectionRegistry`], so a slow or broken
//! subscriber never holds up the others.

use crate::metrics::{
    FEED_ADMITTED_TOTAL, FEED_ENVELOPES_TOTAL, FEED_SEND_FAILURES_TOTAL,
    FEED_STORE_FAILURES_TOTAL, FEED_SUBSCRIBERS, FEED_TICK_SECONDS,
};
use crate::model::Envelope;
use crate::registry::{ConnectionRegistry, SubscriberId};
use crate::store::DeviceStore;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite;
use tracing::{debug, info, trace, warn};

pub const DEFAULT_FEED_INTERVAL: Duration = Duration::from_secs(2);

/// Result of pushing one frame to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Closed,
    Failed(String),
}

/// What the subscriber sent us. Message content is never inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message,
    Closed,
    Failed(String),
}

/// Transport seam between the feed loop and a subscriber connection.
///
/// `recv` must be cancel safe: the loop drops a pending receive whenever
/// the interval elapses first.
#[async_trait]
pub trait FeedSocket: Send {
    async fn send_text(&mut self, text: String) -> SendOutcome;

    async fn recv(&mut self) -> Inbound;
}

#[async_trait]
impl FeedSocket for WebSocket {
    async fn send_text(&mut self, text: String) -> SendOutcome {
        match self.send(Message::Text(text)).await {
            Ok(()) => SendOutcome::Sent,
            Err(e) if is_closed(&e) => SendOutcome::Closed,
            Err(e) => SendOutcome::Failed(e.to_string()),
        }
    }

    async fn recv(&mut self) -> Inbound {
        match WebSocket::recv(self).await {
            None | Some(Ok(Message::Close(_))) => Inbound::Closed,
            Some(Ok(_)) => Inbound::Message,
            Some(Err(e)) => Inbound::Failed(e.to_string()),
        }
    }
}

/// Walks the source chain looking for a peer that has already gone away.
fn is_closed(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(ws) = e.downcast_ref::<tungstenite::Error>() {
            if matches!(
                ws,
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
            ) {
                return true;
            }
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Why a feed loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    ClientClosed,
    TransportClosed,
    TransportError(String),
    EncodeError(String),
}

enum Tick {
    Delivered(usize),
    Skipped,
    Stop(Termination),
}

/// Runs one subscriber's feed until its connection goes away.
///
/// The subscriber is admitted on entry and deregistered on every exit path.
pub async fn run_feed<S: FeedSocket>(
    mut socket: S,
    store: Arc<dyn DeviceStore>,
    registry: Arc<ConnectionRegistry>,
    period: Duration,
) -> Termination {
    let admission = registry.admit();
    let id = admission.id();
    FEED_ADMITTED_TOTAL.inc();
    FEED_SUBSCRIBERS.set(registry.len() as f64);
    info!(subscriber = %id, "Subscriber admitted, interval {:?}", period);

    // First envelope goes out one full interval after admission
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let termination = loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Inbound::Message => {
                        trace!(subscriber = %id, "Inbound message ignored");
                    }
                    Inbound::Closed => break Termination::ClientClosed,
                    Inbound::Failed(e) => break Termination::TransportError(e),
                }
            }

            _ = ticker.tick() => {
                match tick(&mut socket, store.as_ref(), id).await {
                    Tick::Delivered(count) => {
                        debug!(subscriber = %id, "Sent {} device snapshots", count);
                    }
                    Tick::Skipped => {}
                    Tick::Stop(reason) => break reason,
                }
            }
        }
    };

    drop(admission);
    FEED_SUBSCRIBERS.set(registry.len() as f64);
    info!(subscriber = %id, "Subscriber terminated: {:?}", termination);

    termination
}

async fn tick<S: FeedSocket>(socket: &mut S, store: &dyn DeviceStore, id: SubscriberId) -> Tick {
    let timer = FEED_TICK_SECONDS.start_timer();

    let devices = match store.list_all().await {
        Ok(devices) => devices,
        Err(e) => {
            // Never send a partial or empty envelope in place of real data
            FEED_STORE_FAILURES_TOTAL.inc();
            warn!(subscriber = %id, "Skipping tick, device store unavailable: {}", e);
            timer.stop_and_discard();
            return Tick::Skipped;
        }
    };

    let text = match serde_json::to_string(&Envelope::devices_update(&devices)) {
        Ok(text) => text,
        Err(e) => {
            timer.stop_and_discard();
            return Tick::Stop(Termination::EncodeError(e.to_string()));
        }
    };

    let outcome = socket.send_text(text).await;
    timer.observe_duration();

    match outcome {
        SendOutcome::Sent => {
            FEED_ENVELOPES_TOTAL.inc();
            Tick::Delivered(devices.len())
        }
        SendOutcome::Closed => {
            FEED_SEND_FAILURES_TOTAL.inc();
            Tick::Stop(Termination::TransportClosed)
        }
        SendOutcome::Failed(e) => {
            FEED_SEND_FAILURES_TOTAL.inc();
            Tick::Stop(Termination::TransportError(e))
        }
    }
}
