use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::provider::GeoPoint;
use super::ticket::TicketStatus;

/// A retail location that reports tickets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    pub location: GeoPoint,
    /// Moderator who receives escalations for this store
    pub moderator_id: Option<Uuid>,
}

impl Store {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            location: GeoPoint::new(latitude, longitude),
            moderator_id: None,
        }
    }

    pub fn with_moderator(mut self, moderator_id: Uuid) -> Self {
        self.moderator_id = Some(moderator_id);
        self
    }
}

/// Ticket counts per status for one store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreTicketStats {
    pub store_id: Uuid,
    pub by_status: HashMap<TicketStatus, u64>,
}

impl StoreTicketStats {
    pub fn count(&self, status: TicketStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.by_status.values().sum()
    }
}
