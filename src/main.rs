use cryptowatch::api::binance::rest::MetadataClient;
use cryptowatch::api::binance::ws::WsConnector;
use cryptowatch::catalog::CoinCatalog;
use cryptowatch::config::Config;
use cryptowatch::feed::FeedHandle;
use cryptowatch::monitor::{run_monitor, MonitorEvent, PriceMonitor};
use cryptowatch::notify::{self, DesktopNotifier, Dispatcher, NotificationPermission, TerminalBell};
use env_logger::Builder;
use log::{debug, error, info, warn, LevelFilter};
use std::error::Error;
use std::io::Write;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Configure logger
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("cryptowatch", LevelFilter::Debug)
        .format(|buf, record| {
            // Price updates log at debug; keep the terminal readable
            if record.level() <= LevelFilter::Info {
                let ts = chrono::Local::now().format("%H:%M:%S%.3f");
                writeln!(
                    buf,
                    "[{} {:<5} {}] {}",
                    ts,
                    record.level(),
                    record.target(),
                    record.args()
                )
            } else {
                Ok(())
            }
        })
        .target(env_logger::Target::Stderr)
        .write_style(env_logger::WriteStyle::Always)
        .init();

    info!("Starting Cryptowatch...");

    let config = Config::from_env()?;
    info!(
        "Watching {} symbols, alert threshold {}%",
        config.alerts.enabled_symbols.len(),
        config.alerts.threshold_percent
    );

    let feed = FeedHandle::spawn(WsConnector, &config.ws_base_url, config.backoff);
    let dispatcher = Dispatcher::new()
        .with_sink(DesktopNotifier::new(NotificationPermission::Granted))
        .with_sink(TerminalBell::stderr());
    let monitor = PriceMonitor::new(config.alerts.clone(), dispatcher);

    // Create channels
    let (settings_tx, settings_rx) = mpsc::channel(16);
    let (event_tx, mut event_rx) = mpsc::channel(config.event_buffer);

    // Static metadata for the watched symbols
    let catalog_handle = tokio::spawn({
        let client = MetadataClient::new(&config.rest_base_url);
        let enabled = config.alerts.enabled_symbols.clone();
        async move {
            let mut catalog = CoinCatalog::new();
            if catalog.refresh(&client).await.is_err() {
                return;
            }
            let stats = catalog.stats();
            info!(
                "Catalog: {} symbols, {} trading, {} priced",
                stats.total, stats.trading, stats.with_prices
            );
            for symbol in &enabled {
                match catalog.get(symbol.as_str()) {
                    Some(coin) => info!(
                        "{} {:?}: last {:?}, 24h {:?}%",
                        coin.name, coin.status, coin.price, coin.price_change_percent
                    ),
                    None => warn!("{} is not listed on the exchange", symbol.display_name()),
                }
            }
        }
    });

    let monitor_handle = tokio::spawn(async move {
        let result = run_monitor(monitor, &feed, settings_rx, event_tx).await;
        feed.shutdown().await;
        result
    });

    let consumer_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                MonitorEvent::ConnectionStatus(true) => info!("Connected"),
                MonitorEvent::ConnectionStatus(false) => warn!("Disconnected"),
                MonitorEvent::PriceUpdate(record) => debug!(
                    "{}: Price = {:.4} (Change: {:+.2}%)",
                    record.symbol.display_name(),
                    record.price,
                    record.change_percent
                ),
                MonitorEvent::Alert(alert) => {
                    info!("{} | {}", notify::title(&alert), notify::body(&alert))
                }
                MonitorEvent::TargetReached {
                    symbol,
                    target,
                    price,
                } => info!(
                    "{} reached {:?} target {} at {}",
                    symbol.display_name(),
                    target.kind,
                    target.price,
                    price
                ),
                MonitorEvent::ReconnectAbandoned { attempts } => error!(
                    "Gave up reconnecting after {} attempts; restart to retry",
                    attempts
                ),
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = consumer_handle => {},
    };

    drop(settings_tx);
    match monitor_handle.await {
        Ok(Ok(monitor)) => info!(
            "{} alerts raised ({} unread)",
            monitor.alerts().len(),
            monitor.alerts().unread_count()
        ),
        Ok(Err(e)) => error!("Monitor failed: {}", e),
        Err(e) => error!("Monitor task failed: {}", e),
    }
    catalog_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
