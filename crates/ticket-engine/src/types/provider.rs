//! Service providers and coordinates

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Moderator review state of a provider registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ApprovalStatus::Pending),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            other => Err(format!("Unknown approval status: {}", other)),
        }
    }
}

/// A technician company that can be assigned tickets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProvider {
    pub id: Uuid,
    pub company_name: String,
    /// Free-form skill labels such as "Refrigeration" or "POS Systems"
    pub skills: Vec<String>,
    /// `None` when the stored coordinates could not be read
    pub location: Option<GeoPoint>,
    /// Maximum number of tickets held at once
    pub capacity_per_day: u32,
    /// Tickets currently assigned, `0 <= current_load <= capacity_per_day`
    pub current_load: u32,
    pub approval_status: ApprovalStatus,
    /// At least one linked user account is active
    pub active: bool,
}

impl ServiceProvider {
    /// Create an approved, active provider with no load
    pub fn new(company_name: impl Into<String>, skills: Vec<String>, capacity_per_day: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_name: company_name.into(),
            skills,
            location: None,
            capacity_per_day,
            current_load: 0,
            approval_status: ApprovalStatus::Approved,
            active: true,
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(GeoPoint::new(latitude, longitude));
        self
    }

    pub fn with_load(mut self, current_load: u32) -> Self {
        self.current_load = current_load;
        self
    }

    pub fn has_capacity(&self) -> bool {
        self.current_load < self.capacity_per_day
    }

    /// Approved, active and under capacity
    pub fn is_routable(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved && self.active && self.has_capacity()
    }

    /// Remaining capacity as a fraction, a zero capacity counts as one slot
    pub fn availability_ratio(&self) -> f64 {
        1.0 - self.current_load as f64 / self.capacity_per_day.max(1) as f64
    }
}
