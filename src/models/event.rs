use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::delivery::DeliveryStatus;
use crate::models::rider::RiderStatus;

/// Everything published to the broadcast sink. Fire-and-forget; observers
/// subscribe and consume at their own pace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchEvent {
    Assignment {
        rider_id: Uuid,
        delivery_id: Uuid,
        order_context: String,
    },
    StatusChange {
        delivery_id: Uuid,
        new_status: DeliveryStatus,
    },
    Location {
        rider_id: Uuid,
        name: String,
        lat: f64,
        lon: f64,
        status: RiderStatus,
        description: String,
        timestamp_millis: i64,
    },
    Delay {
        delivery_id: Uuid,
        order_number: String,
        delay_minutes: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::DispatchEvent;
    use uuid::Uuid;

    #[test]
    fn location_event_serializes_with_kind_tag() {
        let event = DispatchEvent::Location {
            rider_id: Uuid::from_u128(7),
            name: "Kim".to_string(),
            lat: 37.5,
            lon: 127.0,
            status: crate::models::rider::RiderStatus::Busy,
            description: "heading to pickup".to_string(),
            timestamp_millis: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"location\""));
        assert!(json.contains("\"lat\":37.5"));
        assert!(json.contains("\"timestamp_millis\":1700000000000"));
    }
}
