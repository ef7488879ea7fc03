use crate::api::binance::ws::{stream_url, Connector, FrameStream, StreamMessage};
use crate::market::Symbol;
use crate::error::{CryptoWatchError, Result};
use crate::feed::backoff::BackoffPolicy;
use crate::feed::{EventBus, FeedEvent, SubscriptionId};
use futures::future::BoxFuture;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What a consumer needs to render feed health and offer a manual retry.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    /// A reconnect timer is armed
    pub reconnect_pending: bool,
    /// Retries ran out; nothing happens until `connect` or `reconnect`
    pub exhausted: bool,
    pub symbols: BTreeSet<Symbol>,
}

enum Command {
    Connect {
        symbols: BTreeSet<Symbol>,
        ack: oneshot::Sender<()>,
    },
    UpdateSymbols {
        symbols: BTreeSet<Symbol>,
        ack: oneshot::Sender<()>,
    },
    Reconnect {
        ack: oneshot::Sender<()>,
    },
    Disconnect {
        ack: oneshot::Sender<()>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Pending reconnect. Dropping it cancels the attempt.
struct ReconnectTimer {
    sleep: Pin<Box<Sleep>>,
}

impl ReconnectTimer {
    fn new(delay: Duration) -> Self {
        Self {
            sleep: Box::pin(sleep(delay)),
        }
    }
}

/// Zero or one session or timer, never both.
enum Phase {
    Idle,
    Connecting(BoxFuture<'static, Result<FrameStream>>),
    Connected(FrameStream),
    Backoff(ReconnectTimer),
}

enum PhaseEvent {
    Opened(FrameStream),
    OpenFailed(CryptoWatchError),
    Frame(String),
    TransportError(CryptoWatchError),
    Closed,
    TimerFired,
}

impl Phase {
    fn state(&self) -> ConnectionState {
        match self {
            Phase::Connecting(_) => ConnectionState::Connecting,
            Phase::Connected(_) => ConnectionState::Connected,
            Phase::Idle | Phase::Backoff(_) => ConnectionState::Disconnected,
        }
    }

    async fn next_event(&mut self) -> PhaseEvent {
        match self {
            Phase::Idle => std::future::pending().await,
            Phase::Connecting(open) => match open.await {
                Ok(frames) => PhaseEvent::Opened(frames),
                Err(e) => PhaseEvent::OpenFailed(e),
            },
            Phase::Connected(frames) => match frames.next().await {
                Some(Ok(text)) => PhaseEvent::Frame(text),
                Some(Err(e)) => PhaseEvent::TransportError(e),
                None => PhaseEvent::Closed,
            },
            Phase::Backoff(timer) => {
                timer.sleep.as_mut().await;
                PhaseEvent::TimerFired
            }
        }
    }
}

/// Owns the streaming session. Runs as a single task; every state change
/// goes through its command queue.
struct FeedManager<C> {
    connector: C,
    base_url: String,
    policy: BackoffPolicy,
    symbols: BTreeSet<Symbol>,
    attempts: u32,
    exhausted: bool,
    connected: bool,
    phase: Phase,
    bus: EventBus,
    status: watch::Sender<ConnectionSnapshot>,
}

impl<C: Connector> FeedManager<C> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let event = tokio::select! {
                biased;
                command = commands.recv() => {
                    let keep_running = match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            self.shutdown();
                            false
                        }
                    };
                    if keep_running {
                        continue;
                    }
                    return;
                }
                event = self.phase.next_event() => event,
            };
            self.handle_phase_event(event);
        }
    }

    /// Returns false once the task should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect { symbols, ack } => {
                self.attempts = 0;
                self.exhausted = false;
                let live = matches!(self.phase, Phase::Connecting(_) | Phase::Connected(_));
                if live && symbols == self.symbols {
                    debug!("Already subscribed to {} streams", symbols.len());
                    self.publish_snapshot();
                } else {
                    self.symbols = symbols;
                    self.open_session();
                }
                let _ = ack.send(());
            }
            Command::UpdateSymbols { symbols, ack } => {
                info!("Resubscribing to {} symbols", symbols.len());
                self.symbols = symbols;
                self.exhausted = false;
                self.open_session();
                let _ = ack.send(());
            }
            Command::Reconnect { ack } => {
                self.attempts = 0;
                self.exhausted = false;
                self.open_session();
                let _ = ack.send(());
            }
            Command::Disconnect { ack } => {
                info!("Disconnecting feed");
                self.close_session();
                self.publish_snapshot();
                let _ = ack.send(());
            }
            Command::Shutdown { ack } => {
                self.shutdown();
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    fn handle_phase_event(&mut self, event: PhaseEvent) {
        match event {
            PhaseEvent::Opened(frames) => {
                info!("Feed connected ({} symbols)", self.symbols.len());
                self.phase = Phase::Connected(frames);
                self.attempts = 0;
                self.exhausted = false;
                self.set_connected(true);
                self.publish_snapshot();
            }
            PhaseEvent::OpenFailed(e) => {
                warn!("Connection error: {}", e);
                self.close_session();
                self.schedule_reconnect();
            }
            PhaseEvent::Frame(text) => match serde_json::from_str::<StreamMessage>(&text) {
                Ok(message) => self.bus.publish(FeedEvent::MessageReceived(message)),
                Err(e) => warn!("Failed to parse ticker data: {}", e),
            },
            PhaseEvent::TransportError(e) => {
                error!("WebSocket error: {}", e);
                self.close_session();
                self.schedule_reconnect();
            }
            PhaseEvent::Closed => {
                info!("WebSocket connection closed");
                self.close_session();
                self.schedule_reconnect();
            }
            PhaseEvent::TimerFired => self.open_session(),
        }
    }

    /// Replace whatever is running with a fresh session for `self.symbols`.
    fn open_session(&mut self) {
        self.close_session();
        if self.symbols.is_empty() {
            info!("No symbols to stream; staying disconnected");
            self.publish_snapshot();
            return;
        }
        let url = stream_url(&self.base_url, &self.symbols);
        self.phase = Phase::Connecting(self.connector.open(url));
        self.publish_snapshot();
    }

    /// Drop the active session and any pending timer.
    fn close_session(&mut self) {
        self.phase = Phase::Idle;
        self.set_connected(false);
    }

    fn schedule_reconnect(&mut self) {
        match self.policy.next_delay(&mut self.attempts) {
            Some(delay) => {
                info!(
                    "Reconnecting in {}ms... (Attempt {})",
                    delay.as_millis(),
                    self.attempts
                );
                self.phase = Phase::Backoff(ReconnectTimer::new(delay));
            }
            None => {
                error!("Max reconnection attempts reached");
                self.exhausted = true;
                self.bus.publish(FeedEvent::ReconnectAbandoned {
                    attempts: self.attempts,
                });
            }
        }
        self.publish_snapshot();
    }

    fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            self.connected = connected;
            self.bus.publish(FeedEvent::StatusChanged(connected));
        }
    }

    fn publish_snapshot(&self) {
        self.status.send_replace(ConnectionSnapshot {
            state: self.phase.state(),
            reconnect_attempts: self.attempts,
            reconnect_pending: matches!(self.phase, Phase::Backoff(_)),
            exhausted: self.exhausted,
            symbols: self.symbols.clone(),
        });
    }

    fn shutdown(&mut self) {
        self.close_session();
        self.publish_snapshot();
        self.bus.clear();
        info!("Feed manager stopped");
    }
}

/// Control surface of the feed task.
///
/// Dropping the handle stops the task, which closes the session, cancels
/// any reconnect timer, and unregisters every listener.
pub struct FeedHandle {
    commands: mpsc::Sender<Command>,
    bus: EventBus,
    status: watch::Receiver<ConnectionSnapshot>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub fn spawn<C: Connector>(connector: C, base_url: &str, policy: BackoffPolicy) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(ConnectionSnapshot {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            reconnect_pending: false,
            exhausted: false,
            symbols: BTreeSet::new(),
        });
        let bus = EventBus::new();

        let manager = FeedManager {
            connector,
            base_url: base_url.to_string(),
            policy,
            symbols: BTreeSet::new(),
            attempts: 0,
            exhausted: false,
            connected: false,
            phase: Phase::Idle,
            bus: bus.clone(),
            status: status_tx,
        };
        let task = tokio::spawn(manager.run(commands_rx));

        Self {
            commands: commands_tx,
            bus,
            status: status_rx,
            task,
        }
    }

    async fn request<F>(&self, make: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<()>) -> Command,
    {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(make(ack_tx))
            .await
            .map_err(|_| CryptoWatchError::FeedClosed)?;
        ack_rx.await.map_err(|_| CryptoWatchError::FeedClosed)
    }

    /// Open a session for `symbols` with a full retry budget.
    pub async fn connect(&self, symbols: BTreeSet<Symbol>) -> Result<()> {
        self.request(|ack| Command::Connect { symbols, ack }).await
    }

    /// Swap the subscription: close the current session, then open one for
    /// the new set.
    pub async fn update_symbols(&self, symbols: BTreeSet<Symbol>) -> Result<()> {
        self.request(|ack| Command::UpdateSymbols { symbols, ack })
            .await
    }

    /// Manual retry with the current symbols.
    pub async fn reconnect(&self) -> Result<()> {
        self.request(|ack| Command::Reconnect { ack }).await
    }

    /// Returns once the session is closed and no timer is pending.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|ack| Command::Disconnect { ack }).await
    }

    pub fn subscribe(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<FeedEvent>) {
        self.bus.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn status(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.status.clone()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.status.borrow().clone()
    }

    /// Tear down the session, unregister listeners and wait for the task.
    pub async fn shutdown(self) {
        if self.request(|ack| Command::Shutdown { ack }).await.is_err() {
            self.bus.clear();
        }
        if let Err(e) = self.task.await {
            error!("Feed task failed: {}", e);
        }
    }
}
