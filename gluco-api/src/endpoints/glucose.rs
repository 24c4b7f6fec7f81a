use super::{Endpoint, RequestData};
use crate::macros::opt_setter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// Common

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Flat,
}

/// A single glucose measurement, polled or pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlucoseReading {
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub trend: Option<Trend>,
    pub measured_at: DateTime<Utc>,
}

impl GlucoseReading {
    /// Whether this reading was measured strictly after `other`.
    pub fn is_newer_than(&self, other: &GlucoseReading) -> bool {
        self.measured_at > other.measured_at
    }
}

// Requests

#[derive(Default, Debug, Clone, Serialize)]
pub struct ListReadings {
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    since: Option<DateTime<Utc>>,
}

impl ListReadings {
    pub fn new() -> Self {
        Self::default()
    }

    opt_setter!(limit: u32, since: DateTime<Utc>);
}

impl Endpoint for ListReadings {
    type Data = Self;
    type Response = ReadingsResponse;

    fn endpoint(&self) -> Cow<'_, str> {
        "/glucose/readings".into()
    }

    fn data(&self) -> RequestData<&Self> {
        RequestData::Query(self)
    }
}

// Responses

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingsResponse {
    pub readings: Vec<GlucoseReading>,
}
