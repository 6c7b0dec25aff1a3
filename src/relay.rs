//! Producer-facing entry point wiring the filter, audit log and sender.

use crate::audit::AuditLog;
use crate::config::Config;
use crate::delivery::{
    BatchSender, DeliveryOutcome, DeliveryStats, EventQueue, PendingStore, SenderConfig,
    SenderError, SenderState, Transport,
};
use crate::event::{looks_sensitive, Event};
use std::sync::Arc;

/// Accepts events from capture sources and forwards them reliably.
pub struct Relay {
    sensitive_keywords: Vec<String>,
    audit: AuditLog,
    sender: BatchSender,
}

impl Relay {
    /// Build a relay from configuration and a delivery transport.
    ///
    /// Events left undelivered by a previous run are picked up immediately.
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let sender = BatchSender::new(
            SenderConfig::new(config.send_interval(), config.batch_size()),
            EventQueue::new(),
            PendingStore::new(config.pending_cache_path()),
            transport,
        );

        Self {
            sensitive_keywords: config.sensitive_title_keywords.clone(),
            audit: AuditLog::new(&config.log_dir),
            sender,
        }
    }

    /// Record an event from a producer.
    ///
    /// Returns `false` if the event was dropped, either because its window
    /// title looks sensitive or because the relay has been stopped. Every
    /// accepted event is eventually delivered or left in the pending store.
    pub fn record(&self, event: Event) -> bool {
        if self.is_stopped() {
            tracing::warn!("Relay is stopped, dropping {} event", event.kind());
            return false;
        }
        if let Some(title) = event.window() {
            if looks_sensitive(title, self.sensitive_keywords.as_slice()) {
                tracing::debug!("Skipping {} event due to sensitive window", event.kind());
                return false;
            }
        }

        if let Err(e) = self.audit.append(&event) {
            tracing::warn!("Could not append event to audit log: {}", e);
        }
        match self.sender.enqueue(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Event not queued: {}", e);
                false
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.state() == SenderState::Stopped
    }

    pub fn start(&self) -> Result<(), SenderError> {
        self.sender.start()
    }

    /// Stop sending and persist everything undelivered.
    pub fn stop(&self) {
        self.sender.stop();
    }

    /// Run one send cycle now instead of waiting for the next tick.
    pub fn flush_now(&self) -> Result<Option<DeliveryOutcome>, SenderError> {
        self.sender.run_cycle()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.sender.stats()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn sender(&self) -> &BatchSender {
        &self.sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTransport {
        events: AtomicUsize,
    }

    impl Transport for CountingTransport {
        fn send(&self, events: &[Event]) -> Result<(), TransportError> {
            self.events.fetch_add(events.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config {
            log_dir: dir.path().to_path_buf(),
            batch_size: 2,
            ..Config::default()
        }
    }

    #[test]
    fn test_sensitive_events_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let relay = Relay::new(&test_config(&dir), Arc::new(CountingTransport::default()));

        assert!(!relay.record(Event::keyboard("x").with_window("Bank Login")));
        assert!(relay.record(Event::keyboard("y").with_window("Notes")));
        assert!(relay.record(Event::screenshot("aGk=", "png")));

        assert_eq!(relay.stats().pending, 2);
        assert_eq!(relay.audit().read_recent(10).unwrap().len(), 2);
    }

    #[test]
    fn test_flush_now_delivers() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(CountingTransport::default());
        let relay = Relay::new(&test_config(&dir), transport.clone());

        for i in 0..5 {
            relay.record(Event::keyboard(i.to_string()));
        }
        let outcome = relay.flush_now().unwrap().unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered(5));
        assert_eq!(transport.events.load(Ordering::SeqCst), 5);
        assert_eq!(
            relay.stats(),
            DeliveryStats {
                delivered: 5,
                pending: 0
            }
        );
    }

    #[test]
    fn test_record_after_stop_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let transport = Arc::new(CountingTransport::default());
        let relay = Relay::new(&config, transport.clone());

        relay.start().unwrap();
        assert!(relay.record(Event::keyboard("early")));
        relay.stop();

        assert!(relay.is_stopped());
        assert!(!relay.record(Event::keyboard("late")));
        drop(relay);

        // Only the event accepted before `stop` is in the store.
        let stored = PendingStore::new(config.pending_cache_path()).load();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get("data").and_then(|v| v.as_str()), Some("early"));
        assert_eq!(transport.events.load(Ordering::SeqCst), 0);
        assert_eq!(
            AuditLog::new(&config.log_dir).read_recent(10).unwrap().len(),
            1
        );
    }
}
