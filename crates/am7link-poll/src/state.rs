use std::fmt;

use serde::Serialize;

/// Where the link is in its lifecycle.
///
/// Transitions run `Idle → Discovering → Configuring → Polling ⇄ Stale`;
/// losing the transport from any state returns to `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No transport open.
    #[default]
    Idle,
    /// Looking for the sensor's bridge.
    Discovering,
    /// Applying line settings.
    Configuring,
    /// Device open, request/response cycle running.
    Polling,
    /// Device open but no valid frame within the liveness window.
    Stale,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Idle => "idle",
            LinkState::Discovering => "discovering",
            LinkState::Configuring => "configuring",
            LinkState::Polling => "polling",
            LinkState::Stale => "stale",
        }
    }

    /// Whether a device is open and being polled.
    pub fn is_polling(&self) -> bool {
        matches!(self, LinkState::Polling | LinkState::Stale)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
