//! Reliable batched delivery of captured events.
//!
//! ```text
//!  producers ──enqueue──▶ EventQueue ──drain──▶ BatchSender ──POST──▶ webhook
//!                                                 │   ▲
//!                                          failed │   │ next cycle
//!                                                 ▼   │
//!                                             PendingStore (JSONL)
//! ```
//!
//! Delivery is at-least-once: a chunk whose response is lost may be sent
//! again on the next cycle.

pub mod queue;
pub mod sender;
pub mod stats;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use queue::EventQueue;
pub use sender::{chunk, BatchSender, DeliveryOutcome, SenderConfig, SenderError, SenderState};
pub use stats::{DeliveryStats, SharedStats, StatsTracker};
pub use store::{PendingStore, StoreError};
pub use transport::{BatchPayload, HttpTransport, Transport, TransportError};
