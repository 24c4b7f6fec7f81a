use crate::endpoints::{alerts::AcknowledgeAlert, dashboard::GetDashboard, glucose::ListReadings};

pub struct AlertRepository;

impl AlertRepository {
    pub fn new() -> Self {
        Self {}
    }

    pub fn acknowledge(&self, alert_id: impl Into<String>) -> AcknowledgeAlert {
        AcknowledgeAlert::new(alert_id)
    }
}

pub struct DashboardRepository;

impl DashboardRepository {
    pub fn new() -> Self {
        Self {}
    }

    pub fn get(&self) -> GetDashboard {
        GetDashboard::new()
    }
}

pub struct GlucoseRepository;

impl GlucoseRepository {
    pub fn new() -> Self {
        Self {}
    }

    pub fn readings(&self) -> ListReadings {
        ListReadings::new()
    }
}
