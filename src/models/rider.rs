use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiderStatus {
    Offline,
    Available,
    Busy,
    Break,
    Returning,
}

impl RiderStatus {
    /// Only available riders may receive new assignments.
    pub fn is_assignable(self) -> bool {
        self == RiderStatus::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleClass {
    Bike,
    Motorcycle,
    Car,
    Truck,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleLimits {
    pub max_weight_kg: f64,
    pub max_distance_km: f64,
}

impl VehicleClass {
    pub const fn limits(self) -> VehicleLimits {
        match self {
            VehicleClass::Bike => VehicleLimits {
                max_weight_kg: 5.0,
                max_distance_km: 2.0,
            },
            VehicleClass::Motorcycle => VehicleLimits {
                max_weight_kg: 10.0,
                max_distance_km: 5.0,
            },
            VehicleClass::Car => VehicleLimits {
                max_weight_kg: 20.0,
                max_distance_km: 10.0,
            },
            VehicleClass::Truck => VehicleLimits {
                max_weight_kg: 50.0,
                max_distance_km: 20.0,
            },
        }
    }

    pub fn can_carry(self, weight_kg: f64) -> bool {
        weight_kg <= self.limits().max_weight_kg
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub status: RiderStatus,
    pub vehicle: VehicleClass,
    /// None until the first location report or simulator update.
    pub position: Option<GeoPoint>,
    pub last_position_at: Option<DateTime<Utc>>,
    pub shift_started_at: Option<DateTime<Utc>>,
    pub shift_ended_at: Option<DateTime<Utc>>,
    pub total_deliveries: u32,
    pub average_rating: f64,
    pub registered_at: DateTime<Utc>,
}
