//! Event records produced by capture sources.
//!
//! The relay treats events as opaque payloads: only the `type` key is
//! typed, every other key is carried through verbatim.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp format stamped onto captured events.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of captured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Keyboard,
    Mouse,
    Screenshot,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Keyboard => "keyboard",
            EventKind::Mouse => "mouse",
            EventKind::Screenshot => "screenshot",
        };
        f.write_str(name)
    }
}

/// A single captured action or artifact.
///
/// Serialized as a flat JSON object: `{"type": "mouse", "data": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Event {
    /// Create an event with no extra fields.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            fields: Map::new(),
        }
    }

    /// A key press, stamped with the current time.
    pub fn keyboard(data: impl Into<String>) -> Self {
        Self::new(EventKind::Keyboard)
            .with_field("data", data.into())
            .with_timestamp()
    }

    /// A mouse button press or release at absolute position `(x, y)`.
    pub fn mouse_click(button: &str, pressed: bool, x: i32, y: i32) -> Self {
        let state = if pressed { "pressed" } else { "released" };
        Self::new(EventKind::Mouse)
            .with_field("data", format!("{button}-{state}"))
            .with_field("position", format!("{x},{y}"))
            .with_timestamp()
    }

    /// A scroll of `(dx, dy)` at position `(x, y)`.
    pub fn mouse_scroll(x: i32, y: i32, dx: i32, dy: i32) -> Self {
        Self::new(EventKind::Mouse)
            .with_field("data", "scroll")
            .with_field("delta", format!("{dx},{dy}"))
            .with_field("position", format!("{x},{y}"))
            .with_timestamp()
    }

    /// A base64-encoded screenshot.
    pub fn screenshot(encoded: impl Into<String>, format: impl Into<String>) -> Self {
        Self::new(EventKind::Screenshot)
            .with_field("data", encoded.into())
            .with_field("format", format.into())
    }

    /// Attach an arbitrary field, replacing any previous value under `key`.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        // `type` is owned by `kind`; a second one would not survive a round trip.
        if key != "type" {
            self.fields.insert(key, value.into());
        }
        self
    }

    /// Attach the title of the window that was focused when the event occurred.
    pub fn with_window(self, title: impl Into<String>) -> Self {
        self.with_field("window", title.into())
    }

    fn with_timestamp(self) -> Self {
        let now = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        self.with_field("timestamp", now)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Look up a payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Focused window title, if the producer recorded one.
    pub fn window(&self) -> Option<&str> {
        self.get("window").and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Whether a window title suggests the user may be entering credentials.
pub fn looks_sensitive<S: AsRef<str>>(title: &str, keywords: &[S]) -> bool {
    let title = title.to_lowercase();
    keywords
        .iter()
        .any(|k| !k.as_ref().is_empty() && title.contains(&k.as_ref().to_lowercase()))
}
