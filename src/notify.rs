//! Best-effort fan-out of alerts to presentation side effects.

use crate::market::alerts::{AlertRecord, NotificationMethods};
use crate::error::Result;
use log::{debug, info, warn};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Visual,
    Sound,
}

/// OS-level notification permission, as granted by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
    Default,
}

pub trait AlertSink: Send {
    fn channel(&self) -> Channel;
    fn deliver(&mut self, alert: &AlertRecord) -> Result<()>;
}

pub fn title(alert: &AlertRecord) -> String {
    format!("Price Alert: {}", alert.symbol.display_name())
}

pub fn body(alert: &AlertRecord) -> String {
    let arrow = if alert.change_percent > 0.0 { "📈" } else { "📉" };
    format!("{} {:.2}% change", arrow, alert.change_percent.abs())
}

/// Desktop notification, delivered only when permission is granted.
#[derive(Debug)]
pub struct DesktopNotifier {
    permission: NotificationPermission,
}

impl DesktopNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self { permission }
    }

    pub fn set_permission(&mut self, permission: NotificationPermission) {
        self.permission = permission;
    }
}

impl AlertSink for DesktopNotifier {
    fn channel(&self) -> Channel {
        Channel::Visual
    }

    fn deliver(&mut self, alert: &AlertRecord) -> Result<()> {
        if self.permission != NotificationPermission::Granted {
            debug!("Notification permission {:?}; skipping", self.permission);
            return Ok(());
        }
        info!(target: "cryptowatch::notify", "{} | {}", title(alert), body(alert));
        Ok(())
    }
}

/// Rings the terminal bell.
pub struct TerminalBell<W> {
    out: W,
}

impl TerminalBell<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self {
            out: std::io::stderr(),
        }
    }
}

impl<W: Write + Send> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> AlertSink for TerminalBell<W> {
    fn channel(&self) -> Channel {
        Channel::Sound
    }

    fn deliver(&mut self, _alert: &AlertRecord) -> Result<()> {
        self.out.write_all(b"\x07")?;
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Default)]
pub struct Dispatcher {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl AlertSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    /// Deliver to every sink whose channel is enabled. Failures are logged
    /// and skipped. Returns how many sinks succeeded.
    pub fn dispatch(&mut self, alert: &AlertRecord, methods: &NotificationMethods) -> usize {
        let mut delivered = 0;
        for sink in self.sinks.iter_mut() {
            let enabled = match sink.channel() {
                Channel::Visual => methods.visual,
                Channel::Sound => methods.sound,
            };
            if !enabled {
                continue;
            }
            match sink.deliver(alert) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("{:?} notification for {} failed: {}", sink.channel(), alert.symbol, e),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Symbol;
    use crate::error::CryptoWatchError;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    fn alert(change_percent: f64) -> AlertRecord {
        AlertRecord {
            id: 7,
            symbol: Symbol::new("btcusdt"),
            previous_price: 100.0,
            current_price: 100.0 + change_percent,
            change_percent,
            timestamp: Utc::now(),
            read: false,
        }
    }

    struct Recording {
        channel: Channel,
        seen: Arc<Mutex<Vec<u64>>>,
    }

    impl AlertSink for Recording {
        fn channel(&self) -> Channel {
            self.channel
        }

        fn deliver(&mut self, alert: &AlertRecord) -> Result<()> {
            self.seen.lock().unwrap().push(alert.id);
            Ok(())
        }
    }

    struct Broken;

    impl AlertSink for Broken {
        fn channel(&self) -> Channel {
            Channel::Sound
        }

        fn deliver(&mut self, _alert: &AlertRecord) -> Result<()> {
            Err(CryptoWatchError::Notify("audio device unavailable".to_string()))
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn formats_title_and_body() {
        assert_eq!(title(&alert(3.0)), "Price Alert: BTCUSDT");
        assert_eq!(body(&alert(3.0)), "📈 3.00% change");
        assert_eq!(body(&alert(-2.5)), "📉 2.50% change");
    }

    #[test]
    fn methods_gate_channels() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new()
            .with_sink(Recording {
                channel: Channel::Visual,
                seen: seen.clone(),
            })
            .with_sink(Recording {
                channel: Channel::Sound,
                seen: seen.clone(),
            });

        let visual_only = NotificationMethods {
            visual: true,
            sound: false,
        };
        assert_eq!(dispatcher.dispatch(&alert(3.0), &visual_only), 1);

        let both = NotificationMethods {
            visual: true,
            sound: true,
        };
        assert_eq!(dispatcher.dispatch(&alert(3.0), &both), 2);
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn failures_do_not_propagate() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new().with_sink(Broken).with_sink(Recording {
            channel: Channel::Visual,
            seen: seen.clone(),
        });
        dispatcher.add_sink(Box::new(TerminalBell::new(FailingWriter)));

        let methods = NotificationMethods {
            visual: true,
            sound: true,
        };
        assert_eq!(dispatcher.dispatch(&alert(5.0), &methods), 1);
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn desktop_notifier_respects_permission() {
        let mut notifier = DesktopNotifier::new(NotificationPermission::Denied);
        assert!(notifier.deliver(&alert(3.0)).is_ok());
        notifier.set_permission(NotificationPermission::Granted);
        assert!(notifier.deliver(&alert(3.0)).is_ok());
    }

    #[test]
    fn bell_writes_bel() {
        let mut bell = TerminalBell::new(Vec::new());
        bell.deliver(&alert(3.0)).unwrap();
        assert_eq!(bell.out, b"\x07");
    }
}
