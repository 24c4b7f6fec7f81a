pub mod endpoints;
mod error;
mod macros;
pub mod repositories;
pub mod stream;

pub use crate::error::{ApiError, ErrorResponse};
use repositories::*;

/// Entry point for building typed backend requests.
pub struct Request;

impl Request {
    pub fn alerts() -> AlertRepository {
        AlertRepository::new()
    }

    pub fn dashboard() -> DashboardRepository {
        DashboardRepository::new()
    }

    pub fn glucose() -> GlucoseRepository {
        GlucoseRepository::new()
    }
}
