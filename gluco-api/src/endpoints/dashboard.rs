use super::glucose::GlucoseReading;
use super::{Endpoint, NoData, RequestData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// Common

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationSummary {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub last_dose_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_dose_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub adherence_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub active_minutes: Option<u32>,
    #[serde(default)]
    pub calories: Option<f64>,
}

/// An alert as listed by the dashboard endpoint. Only polling populates
/// these; pushed alerts never land here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAlert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: super::alerts::Severity,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated read model for the dashboard.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    #[serde(default)]
    pub glucose: Option<GlucoseReading>,
    #[serde(default)]
    pub medication: Option<MedicationSummary>,
    #[serde(default)]
    pub activity: Option<ActivitySummary>,
    #[serde(default)]
    pub alerts: Vec<DashboardAlert>,
    #[serde(default)]
    pub health_score: Option<f64>,
}

// Requests

#[derive(Default, Debug, Clone)]
pub struct GetDashboard;

impl GetDashboard {
    pub fn new() -> Self {
        Self
    }
}

impl Endpoint for GetDashboard {
    type Data = NoData;
    type Response = DashboardSnapshot;

    fn endpoint(&self) -> Cow<'_, str> {
        "/dashboard".into()
    }

    fn data(&self) -> RequestData<&NoData> {
        RequestData::Empty
    }
}
