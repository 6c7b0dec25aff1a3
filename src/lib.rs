//! Input Relay - store-and-forward delivery of captured input events.
//!
//! Capture sources (keyboard and mouse hooks, screenshot timers) hand events
//! to a [`Relay`], which forwards them to a remote collector in batches and
//! keeps anything undelivered on disk until the collector accepts it.
//!
//! # Delivery Guarantees
//!
//! - **At-least-once**: an event leaves the pending store only after the
//!   request carrying it succeeded; a lost response means it is sent again
//! - **Ordered**: persisted events are always sent before newer ones
//! - **Restart-safe**: the pending store is rewritten atomically and reloaded
//!   on startup
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Input Relay                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │  Producers  │──▶│ EventQueue  │──▶│ BatchSender │──▶ HTTP│
//! │  │ (capture)   │   │ (unbounded) │   │ (interval)  │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │         │                               │     ▲             │
//! │         ▼                               ▼     │             │
//! │  ┌─────────────┐                     ┌─────────────┐        │
//! │  │  Audit Log  │                     │PendingStore │        │
//! │  │  (JSONL)    │                     │  (JSONL)    │        │
//! │  └─────────────┘                     └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use input_relay::{Config, Event, HttpTransport, Relay};
//!
//! let config = Config::load().expect("Failed to load config");
//! let transport = HttpTransport::new(&config.webhook_url, config.request_timeout())
//!     .expect("Invalid webhook");
//! let relay = Relay::new(&config, Arc::new(transport));
//!
//! relay.start().expect("Failed to start sender");
//! relay.record(Event::keyboard("a").with_window("Editor"));
//! relay.stop();
//! ```

pub mod audit;
pub mod config;
pub mod delivery;
pub mod event;
pub mod relay;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use audit::{AuditError, AuditLog};
pub use config::{Config, ConfigError};
pub use delivery::{
    BatchSender, DeliveryOutcome, DeliveryStats, EventQueue, HttpTransport, PendingStore,
    SenderConfig, SenderError, SenderState, StatsTracker, StoreError, Transport, TransportError,
};
pub use event::{Event, EventKind};
pub use relay::Relay;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
