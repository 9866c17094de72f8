//! Real-time event streaming via Server-Sent Events.
//!
//! Each viewer gets its own broker subscription and its own forwarding
//! task, so a slow viewer only ever blocks itself.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::response::sse::Event;
use futures_util::Stream;
use jobbox_core::{Broker, BrokerError, QueueLayout, Subscription};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;

/// One outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// A broadcast message, forwarded unchanged.
    Event(String),
    /// Keep-alive for idle connections.
    Heartbeat,
}

impl StreamFrame {
    /// Encode as a Server-Sent Events frame.
    pub fn into_event(self) -> Event {
        match self {
            StreamFrame::Event(raw) => Event::default().data(raw),
            StreamFrame::Heartbeat => Event::default().event("ping").data("{}"),
        }
    }
}

/// Event bridge settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Channel the transitions are broadcast on.
    pub channel: String,
    /// Interval between heartbeats; the first comes after one full period.
    pub heartbeat: Duration,
    /// Frames buffered per viewer before the forwarding task waits.
    pub buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel: QueueLayout::default().events_channel,
            heartbeat: Duration::from_secs(15),
            buffer: 64,
        }
    }
}

impl BridgeConfig {
    pub fn for_layout(layout: &QueueLayout) -> Self {
        Self {
            channel: layout.events_channel.clone(),
            ..Self::default()
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

/// Turns broadcast transitions into per-viewer streams.
pub struct EventBridge<B> {
    broker: Arc<B>,
    config: BridgeConfig,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<B> Clone for EventBridge<B> {
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<B: Broker> EventBridge<B> {
    pub fn new(broker: Arc<B>, config: BridgeConfig) -> Self {
        Self {
            broker,
            config,
            shutdown: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Open a stream for one viewer.
    ///
    /// The subscription is in place when this returns, so every message
    /// published afterwards reaches the stream.
    pub async fn open(&self) -> Result<ViewerStream, BrokerError> {
        let subscription = self.broker.subscribe(&self.config.channel).await?;
        let (tx, rx) = mpsc::channel(self.config.buffer.max(1));
        let (cancel_tx, cancel_rx) = oneshot::channel();

        tokio::spawn(forward(
            subscription,
            tx,
            cancel_rx,
            self.shutdown.subscribe(),
            self.config.heartbeat,
        ));

        Ok(ViewerStream {
            frames: ReceiverStream::new(rx),
            _cancel: cancel_tx,
        })
    }

    /// End every open viewer stream, and any opened later.
    ///
    /// HTTP graceful shutdown waits for streaming responses to finish, so
    /// this has to run before the server is awaited.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

async fn forward<S: Subscription>(
    mut subscription: S,
    tx: mpsc::Sender<StreamFrame>,
    mut cancel: oneshot::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
    heartbeat: Duration,
) {
    tracing::debug!("Viewer connected");

    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let frame = tokio::select! {
            _ = &mut cancel => break,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            message = subscription.next_message() => match message {
                Some(raw) => StreamFrame::Event(raw),
                None => break,
            },
            _ = ticker.tick() => StreamFrame::Heartbeat,
        };

        if tx.send(frame).await.is_err() {
            break;
        }
    }

    drop(ticker);
    if let Err(e) = subscription.unsubscribe().await {
        tracing::debug!(error = %e, "Unsubscribe failed");
    }
    drop(subscription);

    tracing::debug!("Viewer disconnected");
}

/// Frames for one viewer.
///
/// Dropping it (or calling [`ViewerStream::close`]) stops the forwarding
/// task and releases the subscription.
pub struct ViewerStream {
    frames: ReceiverStream<StreamFrame>,
    _cancel: oneshot::Sender<()>,
}

impl ViewerStream {
    /// Next frame, or `None` once the broadcast side has ended.
    pub async fn next_frame(&mut self) -> Option<StreamFrame> {
        futures_util::StreamExt::next(self).await
    }

    /// Disconnect the viewer.
    pub fn close(self) {
        drop(self);
    }
}

impl Stream for ViewerStream {
    type Item = StreamFrame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().frames).poll_next(cx)
    }
}
