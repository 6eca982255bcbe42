//! Feed connection manager for the private positions feed and the public
//! candle feed.
//!
//! Each connection runs in its own task:
//!
//! ```text
//! FeedConnection::spawn_private() / spawn_public()
//!        │
//!        ├─► run_connection_loop (reconnects after a fixed delay, forever)
//!        │   └─► connect_and_run: login/subscribe, heartbeat, parse frames
//!        │
//!        └─► FeedHandle (subscribe more instruments, shutdown)
//! ```
//!
//! Frames are parsed and forwarded as [`FeedEvent`]s on the caller's channel.
//! The heartbeat is the literal text frame `ping`; missing replies are not
//! treated as failures. The loop only ends on shutdown or when the event
//! receiver is gone.

use chrono::Utc;
use futures_util::{Sink, SinkExt, StreamExt};
use position_guard_core::{ApiCredentials, CandleUpdate, OkxConfig, PositionSnapshot};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::auth;
use crate::error::OkxError;
use crate::messages::{parse_frame, subscribe_frame, EventFrame, FeedFrame, SubscriptionArg};

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Private,
    Public,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => f.write_str("private"),
            Self::Public => f.write_str("public"),
        }
    }
}

/// Events emitted by a feed connection.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Connection is up and subscriptions were sent.
    Connected { kind: FeedKind },
    /// Connection dropped; a reconnect follows after the fixed delay.
    Disconnected { kind: FeedKind, reason: String },
    /// Positions push, one snapshot per row.
    Positions(Vec<PositionSnapshot>),
    /// Newest candle for one instrument.
    Candle(CandleUpdate),
    /// Error event from the server (failed login, bad subscription).
    Rejected {
        kind: FeedKind,
        code: Option<String>,
        message: Option<String>,
    },
}

/// Connection settings shared by both feeds.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub url: String,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub inst_type: String,
    pub candle_channel: String,
}

impl FeedSettings {
    #[must_use]
    pub fn private(config: &OkxConfig) -> Self {
        Self::with_url(config, config.ws_private_url.clone())
    }

    #[must_use]
    pub fn public(config: &OkxConfig) -> Self {
        Self::with_url(config, config.ws_public_url.clone())
    }

    fn with_url(config: &OkxConfig, url: String) -> Self {
        Self {
            url,
            heartbeat_interval: config.heartbeat_interval(),
            reconnect_delay: config.reconnect_delay(),
            inst_type: config.inst_type.clone(),
            candle_channel: config.candle_channel(),
        }
    }
}

enum FeedControl {
    Subscribe(Vec<SubscriptionArg>),
}

/// Handle to a running feed connection. Dropping it stops the connection.
pub struct FeedHandle {
    kind: FeedKind,
    control_tx: mpsc::UnboundedSender<FeedControl>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    #[must_use]
    pub const fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Adds subscriptions on the open connection without reconnecting.
    /// Arguments already subscribed are skipped.
    pub fn subscribe(&self, args: Vec<SubscriptionArg>) {
        if args.is_empty() {
            return;
        }
        if self.control_tx.send(FeedControl::Subscribe(args)).is_err() {
            warn!(kind = %self.kind, "Feed task gone, subscription dropped");
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals the connection loop to close and stop reconnecting.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub struct FeedConnection;

impl FeedConnection {
    /// Opens the private positions feed for one account.
    #[must_use]
    pub fn spawn_private(
        settings: FeedSettings,
        credentials: Arc<ApiCredentials>,
        event_tx: mpsc::Sender<FeedEvent>,
    ) -> FeedHandle {
        let subscriptions = BTreeSet::from([SubscriptionArg::positions(&settings.inst_type)]);
        Self::spawn(FeedKind::Private, settings, Some(credentials), subscriptions, event_tx)
    }

    /// Opens the public candle feed for the given instrument ids.
    #[must_use]
    pub fn spawn_public(
        settings: FeedSettings,
        inst_ids: &[String],
        event_tx: mpsc::Sender<FeedEvent>,
    ) -> FeedHandle {
        let subscriptions = inst_ids
            .iter()
            .map(|inst_id| SubscriptionArg::candle(&settings.candle_channel, inst_id))
            .collect();
        Self::spawn(FeedKind::Public, settings, None, subscriptions, event_tx)
    }

    fn spawn(
        kind: FeedKind,
        settings: FeedSettings,
        credentials: Option<Arc<ApiCredentials>>,
        subscriptions: BTreeSet<SubscriptionArg>,
        event_tx: mpsc::Sender<FeedEvent>,
    ) -> FeedHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connection = Connection {
            kind,
            settings,
            credentials,
            subscriptions,
            event_tx,
            control_rx,
            shutdown_rx,
        };
        let task = tokio::spawn(connection.run_connection_loop());
        FeedHandle {
            kind,
            control_tx,
            shutdown_tx,
            task,
        }
    }
}

/// Why a single connection attempt ended.
enum Exit {
    Shutdown,
    ReceiverGone,
}

struct Connection {
    kind: FeedKind,
    settings: FeedSettings,
    credentials: Option<Arc<ApiCredentials>>,
    subscriptions: BTreeSet<SubscriptionArg>,
    event_tx: mpsc::Sender<FeedEvent>,
    control_rx: mpsc::UnboundedReceiver<FeedControl>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Connection {
    async fn run_connection_loop(mut self) {
        let mut attempts: u64 = 0;
        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            info!(kind = %self.kind, url = %self.settings.url, "Connecting to OKX websocket");
            match self.connect_and_run().await {
                Ok(Exit::Shutdown) => {
                    info!(kind = %self.kind, "Websocket closed on shutdown");
                    break;
                }
                Ok(Exit::ReceiverGone) => {
                    debug!(kind = %self.kind, "Event receiver dropped, stopping feed");
                    break;
                }
                Err(e) => {
                    attempts += 1;
                    error!(kind = %self.kind, error = %e, attempt = attempts, "Websocket connection failed");
                    let _ = self
                        .event_tx
                        .send(FeedEvent::Disconnected {
                            kind: self.kind,
                            reason: e.to_string(),
                        })
                        .await;

                    info!(kind = %self.kind, delay = ?self.settings.reconnect_delay, "Waiting before reconnect");
                    tokio::select! {
                        () = sleep(self.settings.reconnect_delay) => {}
                        _ = self.shutdown_rx.changed() => break,
                    }
                }
            }
        }
    }

    async fn connect_and_run(&mut self) -> Result<Exit, OkxError> {
        let (ws_stream, _response) = connect_async(&self.settings.url)
            .await
            .map_err(|e| OkxError::ConnectionFailed(e.to_string()))?;
        info!(kind = %self.kind, "Websocket connected");

        let (mut write, mut read) = ws_stream.split();

        // Private feeds subscribe only after the login acknowledgement.
        let mut ready = match &self.credentials {
            Some(credentials) => {
                let frame = auth::login_frame(credentials, Utc::now())?;
                write.send(Message::Text(frame.to_string())).await?;
                debug!(kind = %self.kind, "Sent login frame");
                false
            }
            None => {
                self.send_subscriptions(&mut write).await?;
                if self.emit(FeedEvent::Connected { kind: self.kind }).await.is_err() {
                    return Ok(Exit::ReceiverGone);
                }
                true
            }
        };

        let period = self.settings.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    info!(kind = %self.kind, "Shutdown signal received, closing websocket");
                    let _ = write.close().await;
                    return Ok(Exit::Shutdown);
                }

                _ = heartbeat.tick() => {
                    debug!(kind = %self.kind, "Sending ping");
                    write.send(Message::Text("ping".to_string())).await?;
                }

                Some(control) = self.control_rx.recv() => match control {
                    FeedControl::Subscribe(args) => {
                        let fresh: Vec<SubscriptionArg> = args
                            .into_iter()
                            .filter(|arg| self.subscriptions.insert(arg.clone()))
                            .collect();
                        if ready && !fresh.is_empty() {
                            debug!(kind = %self.kind, count = fresh.len(), "Subscribing on open connection");
                            write.send(Message::Text(subscribe_frame(&fresh).to_string())).await?;
                        }
                    }
                },

                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match parse_frame(&text, &self.settings.candle_channel) {
                            FeedFrame::Event(event) if event.is_login_ok() && !ready => {
                                info!(kind = %self.kind, "Login acknowledged");
                                self.send_subscriptions(&mut write).await?;
                                ready = true;
                                if self.emit(FeedEvent::Connected { kind: self.kind }).await.is_err() {
                                    return Ok(Exit::ReceiverGone);
                                }
                            }
                            FeedFrame::Event(event) => {
                                if self.handle_event(event).await.is_err() {
                                    return Ok(Exit::ReceiverGone);
                                }
                            }
                            FeedFrame::Positions(positions) => {
                                if self.emit(FeedEvent::Positions(positions)).await.is_err() {
                                    return Ok(Exit::ReceiverGone);
                                }
                            }
                            FeedFrame::Candle(candle) => {
                                if self.emit(FeedEvent::Candle(candle)).await.is_err() {
                                    return Ok(Exit::ReceiverGone);
                                }
                            }
                            FeedFrame::Pong | FeedFrame::Ignored => {}
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(kind = %self.kind, frame = ?frame, "Received close frame");
                        return Err(OkxError::ConnectionFailed(
                            frame.map_or_else(|| "connection closed".to_string(), |f| f.reason.to_string()),
                        ));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(OkxError::WebSocket(e)),
                    None => return Err(OkxError::ConnectionFailed("stream ended".to_string())),
                },
            }
        }
    }

    async fn send_subscriptions<S>(&self, write: &mut S) -> Result<(), OkxError>
    where
        S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        if self.subscriptions.is_empty() {
            return Ok(());
        }
        let args: Vec<SubscriptionArg> = self.subscriptions.iter().cloned().collect();
        debug!(kind = %self.kind, count = args.len(), "Sending subscriptions");
        write.send(Message::Text(subscribe_frame(&args).to_string())).await?;
        Ok(())
    }

    async fn handle_event(&self, event: EventFrame) -> Result<(), mpsc::error::SendError<FeedEvent>> {
        if event.is_error() {
            warn!(kind = %self.kind, code = ?event.code, msg = ?event.msg, "Feed reported error");
            return self
                .emit(FeedEvent::Rejected {
                    kind: self.kind,
                    code: event.code,
                    message: event.msg,
                })
                .await;
        }
        debug!(kind = %self.kind, event = %event.event, arg = ?event.arg, "Feed event");
        Ok(())
    }

    async fn emit(&self, event: FeedEvent) -> Result<(), mpsc::error::SendError<FeedEvent>> {
        self.event_tx.send(event).await
    }
}
