use super::{Endpoint, NoData, RequestData};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// Common

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "critical" | "urgent" | "high" => Severity::Critical,
            "warning" | "warn" | "medium" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// A pushed alert. Transient: handed to the alerting collaborator once and
/// never merged into dashboard state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

// Requests

#[derive(Debug, Clone)]
pub struct AcknowledgeAlert {
    id: String,
}

impl AcknowledgeAlert {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Endpoint for AcknowledgeAlert {
    type Data = NoData;
    type Response = Option<AlertAck>;

    fn method(&self) -> Method {
        Method::POST
    }

    fn endpoint(&self) -> Cow<'_, str> {
        format!("/alerts/{}/ack", self.id).into()
    }

    fn data(&self) -> RequestData<&NoData> {
        RequestData::Empty
    }
}

// Responses

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertAck {
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
}
