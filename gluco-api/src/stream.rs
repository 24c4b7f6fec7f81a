//! Wire format of the live glucose push channel.
//!
//! Every frame is a JSON object tagged by `kind`. Kinds this client does not
//! know about decode to [`StreamMessage::Unknown`] instead of failing, so the
//! backend can add message types without breaking older clients.

use crate::endpoints::alerts::{AlertEvent, Severity};
use crate::endpoints::glucose::GlucoseReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamMessage {
    Reading(GlucoseReading),
    Alert(AlertMessage),
    #[serde(other)]
    Unknown,
}

impl StreamMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Alert body as pushed; the receive time is stamped client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AlertMessage {
    pub fn into_event(self, received_at: DateTime<Utc>) -> AlertEvent {
        AlertEvent {
            alert_type: self.alert_type,
            severity: self.severity,
            payload: self.payload,
            received_at,
        }
    }
}
