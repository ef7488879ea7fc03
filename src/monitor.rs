//! The price pipeline: feed events in, price updates and alerts out.

use crate::error::Result;
use crate::feed::{FeedEvent, FeedHandle};
use crate::market::alerts::{AlertConfig, AlertEngine, AlertRecord, NotificationMethods};
use crate::market::prices::{PriceRecord, PriceStore};
use crate::market::targets::{TargetBook, TargetPrice};
use crate::market::ticks::{self, PriceTick};
use crate::market::Symbol;
use crate::notify::Dispatcher;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use tokio::sync::mpsc;

/// Consumer-facing output of the pipeline.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    ConnectionStatus(bool),
    PriceUpdate(PriceRecord),
    Alert(AlertRecord),
    TargetReached {
        symbol: Symbol,
        target: TargetPrice,
        price: f64,
    },
    ReconnectAbandoned {
        attempts: u32,
    },
}

/// Mutations of the alert settings. Applied only through
/// [`PriceMonitor::apply_settings`].
#[derive(Debug, Clone)]
pub enum SettingsUpdate {
    Threshold(f64),
    AddSymbol(String),
    RemoveSymbol(String),
    Methods(NotificationMethods),
    Replace(AlertConfig),
}

pub struct PriceMonitor {
    prices: PriceStore,
    alerts: AlertEngine,
    targets: TargetBook,
    config: AlertConfig,
    dispatcher: Dispatcher,
    connected: bool,
}

impl PriceMonitor {
    pub fn new(config: AlertConfig, dispatcher: Dispatcher) -> Self {
        Self {
            prices: PriceStore::new(),
            alerts: AlertEngine::new(),
            targets: TargetBook::new(),
            config,
            dispatcher,
            connected: false,
        }
    }

    pub fn handle_feed_event(&mut self, event: FeedEvent) -> Vec<MonitorEvent> {
        match event {
            FeedEvent::StatusChanged(connected) => {
                self.connected = connected;
                vec![MonitorEvent::ConnectionStatus(connected)]
            }
            FeedEvent::MessageReceived(message) => match ticks::normalize(&message) {
                Some(tick) => self.process_tick(&tick),
                None => {
                    debug!("Ignoring frame from {:?}", message.stream);
                    Vec::new()
                }
            },
            FeedEvent::ReconnectAbandoned { attempts } => {
                self.connected = false;
                vec![MonitorEvent::ReconnectAbandoned { attempts }]
            }
        }
    }

    /// Store the tick, then check the alert threshold and price targets.
    pub fn process_tick(&mut self, tick: &PriceTick) -> Vec<MonitorEvent> {
        let record = self.prices.apply_tick(tick);
        let mut out = vec![MonitorEvent::PriceUpdate(record.clone())];

        if let Some(alert) = self.alerts.evaluate(&record, &self.config) {
            info!(
                "ALERT: {} moved {:+.2}% ({} -> {})",
                alert.symbol, alert.change_percent, alert.previous_price, alert.current_price
            );
            self.dispatcher.dispatch(&alert, &self.config.methods);
            out.push(MonitorEvent::Alert(alert));
        }

        for target in self.targets.check(&record.symbol, record.price) {
            info!(
                "Target {:?} {} reached for {} at {}",
                target.kind, target.price, record.symbol, record.price
            );
            out.push(MonitorEvent::TargetReached {
                symbol: record.symbol.clone(),
                target,
                price: record.price,
            });
        }
        out
    }

    /// Apply a settings change. Returns the new subscription when the
    /// enabled symbol set changed, so the feed can be resubscribed.
    pub fn apply_settings(&mut self, update: SettingsUpdate) -> Option<BTreeSet<Symbol>> {
        let symbols_changed = match update {
            SettingsUpdate::Threshold(threshold) => {
                self.config.set_threshold(threshold);
                false
            }
            SettingsUpdate::AddSymbol(symbol) => self.config.add_symbol(&symbol),
            SettingsUpdate::RemoveSymbol(symbol) => self.config.remove_symbol(&symbol),
            SettingsUpdate::Methods(methods) => {
                self.config.set_methods(methods);
                false
            }
            SettingsUpdate::Replace(config) => {
                let changed = config.enabled_symbols != self.config.enabled_symbols;
                self.config = config;
                changed
            }
        };
        symbols_changed.then(|| self.config.enabled_symbols.clone())
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub fn prices(&self) -> &PriceStore {
        &self.prices
    }

    pub fn prices_mut(&mut self) -> &mut PriceStore {
        &mut self.prices
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn alerts_mut(&mut self) -> &mut AlertEngine {
        &mut self.alerts
    }

    pub fn targets(&self) -> &TargetBook {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut TargetBook {
        &mut self.targets
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Drive `monitor` from `feed` until the settings channel closes or the
/// consumer goes away. The feed is connected to the enabled symbols on
/// entry and every symbol-set change is pushed to it. Returns the monitor
/// so its state can be inspected after the session.
pub async fn run_monitor(
    mut monitor: PriceMonitor,
    feed: &FeedHandle,
    mut settings: mpsc::Receiver<SettingsUpdate>,
    events: mpsc::Sender<MonitorEvent>,
) -> Result<PriceMonitor> {
    let (subscription, mut feed_events) = feed.subscribe();
    feed.connect(monitor.config().enabled_symbols.clone()).await?;

    'session: loop {
        tokio::select! {
            event = feed_events.recv() => {
                let Some(event) = event else {
                    warn!("Feed event stream ended");
                    break 'session;
                };
                for out in monitor.handle_feed_event(event) {
                    if events.send(out).await.is_err() {
                        info!("Monitor consumer dropped");
                        break 'session;
                    }
                }
            }
            update = settings.recv() => {
                let Some(update) = update else {
                    break 'session;
                };
                if let Some(symbols) = monitor.apply_settings(update) {
                    feed.update_symbols(symbols).await?;
                }
            }
        }
    }

    feed.unsubscribe(subscription);
    Ok(monitor)
}
