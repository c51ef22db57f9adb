//! Subscription manager.
//!
//! Owns the upstream connection lifecycle as an explicit state machine:
//!
//! `Disconnected → Connecting → Unsubscribing → Subscribing → Streaming`,
//! with any transport error or close leading to `Reconnecting` and, once the
//! configured attempt budget is spent, to the terminal `Exhausted` state.
//! Exhaustion is reported to the caller, never retried automatically.
//!
//! While streaming, every inbound delta is forwarded unmodified and in
//! arrival order to the dispatch engine. A malformed frame is discarded with
//! a warning; it never tears the session down.

use futures_util::{SinkExt, StreamExt};
use signalbridge_common::{
    BridgeError, BridgeMetrics, PathSubscription, Result, SubscribeRequest, TelemetryDelta,
    UnsubscribeRequest, UpstreamConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use url::Url;

/// Pause between the unsubscribe-all and the fresh subscribe, giving the
/// upstream time to drop stale subscriptions.
const SETTLE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Unsubscribing,
    Subscribing,
    Streaming,
    Reconnecting { attempt: u32 },
    Exhausted,
}

enum SessionEnd {
    Shutdown,
    StreamClosed,
}

pub struct SubscriptionManager {
    config: UpstreamConfig,
    context: String,
    subscriptions: Vec<PathSubscription>,
    metrics: Arc<BridgeMetrics>,
    state: watch::Sender<ConnectionState>,
}

impl SubscriptionManager {
    pub fn new(
        config: UpstreamConfig,
        context: String,
        subscriptions: Vec<PathSubscription>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            context,
            subscriptions,
            metrics,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions, e.g. for health reporting.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The single subscribe instruction sent on every (re)connect: one entry
    /// per distinct path with its resolved delivery settings.
    pub fn subscribe_request(&self) -> SubscribeRequest {
        SubscribeRequest {
            context: self.context.clone(),
            subscribe: self.subscriptions.clone(),
        }
    }

    /// Drive the connection until shutdown is requested or the reconnect
    /// budget is exhausted.
    pub async fn run(
        self,
        delta_tx: mpsc::Sender<TelemetryDelta>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            match self
                .run_session(&delta_tx, &mut shutdown, &mut failures)
                .await
            {
                Ok(SessionEnd::Shutdown) => {
                    info!("Shutdown requested, closing upstream connection");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Ok(SessionEnd::StreamClosed) => {
                    warn!("Upstream stream ended");
                }
                Err(e) => {
                    self.metrics.record_connection_failure();
                    warn!("Upstream session failed: {}", e);
                }
            }

            failures += 1;
            if failures >= self.config.max_reconnect_attempts {
                self.set_state(ConnectionState::Exhausted);
                error!(
                    "Giving up on upstream after {} consecutive failed attempts",
                    failures
                );
                return Err(BridgeError::ReconnectExhausted { attempts: failures });
            }

            self.set_state(ConnectionState::Reconnecting { attempt: failures });
            self.metrics.record_reconnect_attempt();
            info!(
                "Reconnecting to upstream in {:?} (attempt {}/{})",
                self.config.reconnect_delay(),
                failures,
                self.config.max_reconnect_attempts
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.set_state(ConnectionState::Disconnected);
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn run_session(
        &self,
        delta_tx: &mpsc::Sender<TelemetryDelta>,
        shutdown: &mut watch::Receiver<bool>,
        failures: &mut u32,
    ) -> Result<SessionEnd> {
        let url = Url::parse(&self.config.url)?;
        let (ws_stream, _) = connect_async(url).await?;
        info!("Connected to upstream at {}", self.config.url);
        self.metrics.record_connection();

        let (mut write, mut read) = ws_stream.split();

        // Drop whatever subscriptions a previous session left behind
        self.set_state(ConnectionState::Unsubscribing);
        let unsubscribe = serde_json::to_string(&UnsubscribeRequest::all())?;
        write.send(Message::Text(unsubscribe)).await?;
        tokio::time::sleep(SETTLE_DELAY).await;

        self.set_state(ConnectionState::Subscribing);
        let subscribe = serde_json::to_string(&self.subscribe_request())?;
        write.send(Message::Text(subscribe)).await?;
        info!("Subscribed to {} upstream paths", self.subscriptions.len());

        self.set_state(ConnectionState::Streaming);
        // Reaching the stream resets the consecutive-failure streak
        *failures = 0;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = write.close().await;
                        return Ok(SessionEnd::Shutdown);
                    }
                }
                frame = read.next() => match frame {
                    None => return Ok(SessionEnd::StreamClosed),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(message)) => {
                        if !self.handle_frame(message, delta_tx).await? {
                            return Ok(SessionEnd::StreamClosed);
                        }
                    }
                }
            }
        }
    }

    /// Returns false when the session should end.
    async fn handle_frame(
        &self,
        message: Message,
        delta_tx: &mpsc::Sender<TelemetryDelta>,
    ) -> Result<bool> {
        match message {
            Message::Text(text) => {
                match serde_json::from_str::<TelemetryDelta>(&text) {
                    Ok(delta) => {
                        // Dispatch gone means nothing left to feed
                        delta_tx
                            .send(delta)
                            .await
                            .map_err(|_| BridgeError::ChannelSend)?;
                    }
                    Err(e) => {
                        // One bad frame never stops the stream
                        self.metrics.record_parse_error();
                        warn!("Discarding malformed upstream message: {}", e);
                    }
                }
                Ok(true)
            }
            Message::Ping(_) => {
                debug!("Received upstream ping");
                Ok(true)
            }
            Message::Pong(_) => Ok(true),
            Message::Binary(_) => {
                warn!("Unexpected binary frame from upstream, ignoring");
                Ok(true)
            }
            Message::Close(_) => {
                warn!("Upstream closed the connection");
                Ok(false)
            }
            Message::Frame(_) => Ok(true),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        debug!("Connection state -> {:?}", next);
        let _ = self.state.send(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalbridge_common::SubscriptionDefaults;
    use std::sync::atomic::Ordering;

    fn subscriptions(paths: &[&str]) -> Vec<PathSubscription> {
        let defaults = SubscriptionDefaults::default();
        paths
            .iter()
            .map(|p| PathSubscription {
                path: (*p).to_string(),
                period: defaults.period,
                format: defaults.format.clone(),
                policy: defaults.policy.clone(),
                min_period: defaults.min_period,
            })
            .collect()
    }

    fn manager(max_attempts: u32) -> SubscriptionManager {
        SubscriptionManager::new(
            UpstreamConfig {
                // Nothing listens here; connections fail fast
                url: "ws://127.0.0.1:9".to_string(),
                reconnect_delay_ms: 10,
                max_reconnect_attempts: max_attempts,
            },
            "signalbridge".to_string(),
            subscriptions(&["Vehicle.Speed", "Vehicle.Navigation.CourseOverGround"]),
            Arc::new(BridgeMetrics::new()),
        )
    }

    #[test]
    fn test_subscribe_request_lists_every_path_with_settings() {
        let manager = manager(3);
        let request = manager.subscribe_request();

        assert_eq!(request.context, "signalbridge");
        let paths: Vec<&str> = request.subscribe.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(
            paths,
            ["Vehicle.Speed", "Vehicle.Navigation.CourseOverGround"]
        );
        assert!(request.subscribe.iter().all(|s| s.period > 0));
    }

    #[tokio::test]
    async fn test_exhaustion_after_max_consecutive_failures() {
        let manager = manager(3);
        let metrics = Arc::clone(&manager.metrics);
        let state = manager.watch_state();

        let (delta_tx, _delta_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            manager.run(delta_tx, shutdown_rx),
        )
        .await
        .expect("exhaustion should be quick with a 10ms delay");

        match result {
            Err(BridgeError::ReconnectExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {:?}", other),
        }

        // Exactly three connection attempts were made, then reporting stopped
        assert_eq!(metrics.connections_failed.load(Ordering::Relaxed), 3);
        assert_eq!(*state.borrow(), ConnectionState::Exhausted);
    }

    #[tokio::test]
    async fn test_shutdown_request_stops_before_connecting() {
        let manager = manager(3);
        let (delta_tx, _delta_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(true);

        manager.run(delta_tx, shutdown_rx).await.unwrap();
        drop(shutdown_tx);
    }

    #[tokio::test]
    async fn test_shutdown_during_reconnect_wait() {
        let manager = SubscriptionManager::new(
            UpstreamConfig {
                url: "ws://127.0.0.1:9".to_string(),
                // Long enough that the test must interrupt the wait
                reconnect_delay_ms: 60_000,
                max_reconnect_attempts: 10,
            },
            "signalbridge".to_string(),
            subscriptions(&["Vehicle.Speed"]),
            Arc::new(BridgeMetrics::new()),
        );

        let (delta_tx, _delta_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(manager.run(delta_tx, shutdown_rx));
        // Give the first connect time to fail and enter the reconnect wait
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("shutdown must interrupt the reconnect timer")
            .unwrap();
        assert!(result.is_ok());
    }
}
