use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Maximum minutes allowed from request to completion.
    pub const fn max_minutes(self) -> i64 {
        match self {
            Priority::Low => 120,
            Priority::Normal => 60,
            Priority::High => 30,
            Priority::Urgent => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    PickingUp,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled | DeliveryStatus::Failed
        )
    }

    /// A rider is actively working the delivery in these states.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Assigned | DeliveryStatus::PickingUp | DeliveryStatus::InTransit
        )
    }

    /// Forward edges of the lifecycle, plus cancellation and administrative
    /// failure from any non-terminal state.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            DeliveryStatus::Cancelled | DeliveryStatus::Failed => true,
            DeliveryStatus::Assigned => self == DeliveryStatus::Pending,
            DeliveryStatus::PickingUp => self == DeliveryStatus::Assigned,
            DeliveryStatus::InTransit => self == DeliveryStatus::PickingUp,
            DeliveryStatus::Delivered => self == DeliveryStatus::InTransit,
            DeliveryStatus::Pending => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
    pub point: GeoPoint,
    pub contact_name: String,
    pub contact_phone: String,
}

/// Append-only log entry; owned by its delivery, no back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub event: String,
    pub status: DeliveryStatus,
    pub position: Option<GeoPoint>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_number: String,
    pub pickup: Address,
    pub dropoff: Address,
    pub status: DeliveryStatus,
    pub priority: Priority,
    pub weight_kg: f64,
    pub requested_at: DateTime<Utc>,
    pub estimated_pickup_at: Option<DateTime<Utc>>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    pub actual_pickup_at: Option<DateTime<Utc>>,
    pub actual_delivery_at: Option<DateTime<Utc>>,
    pub estimated_distance_km: Option<f64>,
    pub actual_distance_km: Option<f64>,
    /// Weak reference: the delivery knows its rider's id only.
    pub assigned_rider: Option<Uuid>,
    pub rating: Option<u8>,
    pub feedback: Option<String>,
    pub history: Vec<HistoryEntry>,
}

impl Delivery {
    pub fn record_history(&mut self, event: impl Into<String>, position: Option<GeoPoint>) {
        self.history.push(HistoryEntry {
            event: event.into(),
            status: self.status,
            position,
            recorded_at: Utc::now(),
        });
    }
}
