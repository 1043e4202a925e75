//! Unsolicited gateway traffic, fanned out to listeners.

use serde::Serialize;

use meshgate_api::model::ModelMessage;
use meshgate_api::wire::CurrentFaults;

/// An event nobody asked for: a node talking, or a health server
/// reporting its current faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ModelMessage(ModelMessage),
    CurrentFaults(CurrentFaults),
}

impl Notification {
    pub fn source_address(&self) -> u16 {
        match self {
            Self::ModelMessage(m) => m.source_address,
            Self::CurrentFaults(f) => f.address,
        }
    }
}
