use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::geo::{GeoPoint, haversine_km};
use crate::models::delivery::Delivery;
use crate::models::rider::{Rider, RiderStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Read/write access to rider and delivery records. The engine and the
/// simulator only ever talk to storage through this trait; the in-memory
/// implementation below is the one shipped, other backends plug in here.
pub trait DataGateway: Send + Sync {
    fn find_rider(&self, id: &Uuid) -> Result<Option<Rider>, StoreError>;

    fn find_rider_by_email(&self, email: &str) -> Result<Option<Rider>, StoreError>;

    fn find_rider_by_phone(&self, phone: &str) -> Result<Option<Rider>, StoreError>;

    fn find_delivery(&self, id: &Uuid) -> Result<Option<Delivery>, StoreError>;

    /// Available riders with a known position within `radius_km` of
    /// `center`, sorted by distance then rider id so callers see a stable
    /// ranking.
    fn available_riders_within_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Rider>, StoreError>;

    /// Pending deliveries, highest priority first, oldest request first
    /// within a priority.
    fn pending_deliveries(&self) -> Result<Vec<Delivery>, StoreError>;

    /// Deliveries being actively worked whose estimated delivery time has
    /// already passed.
    fn delayed_deliveries(&self, now: DateTime<Utc>) -> Result<Vec<Delivery>, StoreError>;

    fn deliveries_for_rider(&self, rider_id: &Uuid) -> Result<Vec<Delivery>, StoreError>;

    fn save_rider(&self, rider: &Rider) -> Result<(), StoreError>;

    fn save_delivery(&self, delivery: &Delivery) -> Result<(), StoreError>;

    /// Atomically flip a rider's status from `from` to `to`. Returns false
    /// when the rider is missing or no longer in `from`; this is the
    /// compare-and-set that keeps two concurrent assignments from both
    /// claiming the same rider.
    fn try_transition_rider(
        &self,
        id: &Uuid,
        from: RiderStatus,
        to: RiderStatus,
    ) -> Result<bool, StoreError>;
}

#[derive(Default)]
pub struct InMemoryGateway {
    riders: DashMap<Uuid, Rider>,
    deliveries: DashMap<Uuid, Delivery>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataGateway for InMemoryGateway {
    fn find_rider(&self, id: &Uuid) -> Result<Option<Rider>, StoreError> {
        Ok(self.riders.get(id).map(|entry| entry.value().clone()))
    }

    fn find_rider_by_email(&self, email: &str) -> Result<Option<Rider>, StoreError> {
        Ok(self
            .riders
            .iter()
            .find(|entry| entry.value().email == email)
            .map(|entry| entry.value().clone()))
    }

    fn find_rider_by_phone(&self, phone: &str) -> Result<Option<Rider>, StoreError> {
        Ok(self
            .riders
            .iter()
            .find(|entry| entry.value().phone == phone)
            .map(|entry| entry.value().clone()))
    }

    fn find_delivery(&self, id: &Uuid) -> Result<Option<Delivery>, StoreError> {
        Ok(self.deliveries.get(id).map(|entry| entry.value().clone()))
    }

    fn available_riders_within_radius(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Rider>, StoreError> {
        let mut nearby: Vec<(f64, Rider)> = self
            .riders
            .iter()
            .filter_map(|entry| {
                let rider = entry.value();
                if rider.status != RiderStatus::Available {
                    return None;
                }
                let position = rider.position.as_ref()?;
                let distance = haversine_km(position, center);
                (distance <= radius_km).then(|| (distance, rider.clone()))
            })
            .collect();

        nearby.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));

        Ok(nearby.into_iter().map(|(_, rider)| rider).collect())
    }

    fn pending_deliveries(&self) -> Result<Vec<Delivery>, StoreError> {
        use crate::models::delivery::DeliveryStatus;

        let mut pending: Vec<Delivery> = self
            .deliveries
            .iter()
            .filter(|entry| entry.value().status == DeliveryStatus::Pending)
            .map(|entry| entry.value().clone())
            .collect();

        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.requested_at.cmp(&b.requested_at))
        });

        Ok(pending)
    }

    fn delayed_deliveries(&self, now: DateTime<Utc>) -> Result<Vec<Delivery>, StoreError> {
        Ok(self
            .deliveries
            .iter()
            .filter(|entry| {
                let delivery = entry.value();
                delivery.status.is_active()
                    && delivery
                        .estimated_delivery_at
                        .is_some_and(|estimate| estimate < now)
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn deliveries_for_rider(&self, rider_id: &Uuid) -> Result<Vec<Delivery>, StoreError> {
        Ok(self
            .deliveries
            .iter()
            .filter(|entry| entry.value().assigned_rider == Some(*rider_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn save_rider(&self, rider: &Rider) -> Result<(), StoreError> {
        self.riders.insert(rider.id, rider.clone());
        Ok(())
    }

    fn save_delivery(&self, delivery: &Delivery) -> Result<(), StoreError> {
        self.deliveries.insert(delivery.id, delivery.clone());
        Ok(())
    }

    fn try_transition_rider(
        &self,
        id: &Uuid,
        from: RiderStatus,
        to: RiderStatus,
    ) -> Result<bool, StoreError> {
        // The entry guard holds the shard lock, making check-and-set atomic.
        match self.riders.get_mut(id) {
            Some(mut entry) if entry.value().status == from => {
                entry.value_mut().status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DataGateway, InMemoryGateway};
    use crate::geo::GeoPoint;
    use crate::models::delivery::{Address, Delivery, DeliveryStatus, Priority};
    use crate::models::rider::{Rider, RiderStatus, VehicleClass};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn rider(id_seed: u128, lat: f64, lon: f64, status: RiderStatus) -> Rider {
        Rider {
            id: Uuid::from_u128(id_seed),
            name: format!("rider-{id_seed}"),
            phone: format!("010-0000-{id_seed:04}"),
            email: format!("rider{id_seed}@example.com"),
            status,
            vehicle: VehicleClass::Motorcycle,
            position: Some(GeoPoint { lat, lon }),
            last_position_at: Some(Utc::now()),
            shift_started_at: Some(Utc::now()),
            shift_ended_at: None,
            total_deliveries: 0,
            average_rating: 5.0,
            registered_at: Utc::now(),
        }
    }

    fn address(lat: f64, lon: f64) -> Address {
        Address {
            address: "somewhere".to_string(),
            point: GeoPoint { lat, lon },
            contact_name: "contact".to_string(),
            contact_phone: "010-9999-0000".to_string(),
        }
    }

    fn delivery(id_seed: u128, status: DeliveryStatus, priority: Priority) -> Delivery {
        Delivery {
            id: Uuid::from_u128(id_seed),
            order_number: format!("ORD-{id_seed:05}"),
            pickup: address(37.50, 127.00),
            dropoff: address(37.51, 127.02),
            status,
            priority,
            weight_kg: 3.0,
            requested_at: Utc::now(),
            estimated_pickup_at: None,
            estimated_delivery_at: None,
            actual_pickup_at: None,
            actual_delivery_at: None,
            estimated_distance_km: None,
            actual_distance_km: None,
            assigned_rider: None,
            rating: None,
            feedback: None,
            history: Vec::new(),
        }
    }

    #[test]
    fn radius_query_filters_status_position_and_distance() {
        let store = InMemoryGateway::new();
        let center = GeoPoint {
            lat: 37.50,
            lon: 127.00,
        };

        store.save_rider(&rider(1, 37.501, 127.001, RiderStatus::Available)).unwrap();
        store.save_rider(&rider(2, 37.501, 127.001, RiderStatus::Busy)).unwrap();
        // Roughly 20 km north, outside a 5 km radius.
        store.save_rider(&rider(3, 37.68, 127.00, RiderStatus::Available)).unwrap();
        let mut no_position = rider(4, 0.0, 0.0, RiderStatus::Available);
        no_position.position = None;
        store.save_rider(&no_position).unwrap();

        let found = store.available_riders_within_radius(&center, 5.0).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, Uuid::from_u128(1));
    }

    #[test]
    fn radius_query_sorts_by_distance_then_id() {
        let store = InMemoryGateway::new();
        let center = GeoPoint {
            lat: 37.50,
            lon: 127.00,
        };

        store.save_rider(&rider(5, 37.52, 127.00, RiderStatus::Available)).unwrap();
        store.save_rider(&rider(1, 37.505, 127.00, RiderStatus::Available)).unwrap();
        // Same spot as rider 1; the lower id must come first.
        store.save_rider(&rider(3, 37.505, 127.00, RiderStatus::Available)).unwrap();

        let found = store.available_riders_within_radius(&center, 5.0).unwrap();
        let ids: Vec<Uuid> = found.iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(1), Uuid::from_u128(3), Uuid::from_u128(5)]
        );
    }

    #[test]
    fn pending_deliveries_ordered_by_priority_then_request_time() {
        let store = InMemoryGateway::new();

        let mut old_low = delivery(1, DeliveryStatus::Pending, Priority::Low);
        old_low.requested_at = Utc::now() - Duration::minutes(30);
        let mut new_urgent = delivery(2, DeliveryStatus::Pending, Priority::Urgent);
        new_urgent.requested_at = Utc::now();
        let mut old_urgent = delivery(3, DeliveryStatus::Pending, Priority::Urgent);
        old_urgent.requested_at = Utc::now() - Duration::minutes(10);
        let assigned = delivery(4, DeliveryStatus::Assigned, Priority::Urgent);

        for d in [&old_low, &new_urgent, &old_urgent, &assigned] {
            store.save_delivery(d).unwrap();
        }

        let pending = store.pending_deliveries().unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|d| d.id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(3), Uuid::from_u128(2), Uuid::from_u128(1)]
        );
    }

    #[test]
    fn delayed_deliveries_only_cover_active_statuses_past_estimate() {
        let store = InMemoryGateway::new();
        let now = Utc::now();

        let mut late_transit = delivery(1, DeliveryStatus::InTransit, Priority::Normal);
        late_transit.estimated_delivery_at = Some(now - Duration::minutes(20));
        let mut on_time = delivery(2, DeliveryStatus::InTransit, Priority::Normal);
        on_time.estimated_delivery_at = Some(now + Duration::minutes(20));
        let mut late_pending = delivery(3, DeliveryStatus::Pending, Priority::Normal);
        late_pending.estimated_delivery_at = Some(now - Duration::minutes(20));
        let mut late_delivered = delivery(4, DeliveryStatus::Delivered, Priority::Normal);
        late_delivered.estimated_delivery_at = Some(now - Duration::minutes(20));

        for d in [&late_transit, &on_time, &late_pending, &late_delivered] {
            store.save_delivery(d).unwrap();
        }

        let delayed = store.delayed_deliveries(now).unwrap();
        assert_eq!(delayed.len(), 1);
        assert_eq!(delayed[0].id, Uuid::from_u128(1));
    }

    #[test]
    fn transition_cas_succeeds_exactly_once() {
        let store = InMemoryGateway::new();
        let subject = rider(1, 37.50, 127.00, RiderStatus::Available);
        store.save_rider(&subject).unwrap();

        assert!(
            store
                .try_transition_rider(&subject.id, RiderStatus::Available, RiderStatus::Busy)
                .unwrap()
        );
        // Second attempt sees Busy, not Available.
        assert!(
            !store
                .try_transition_rider(&subject.id, RiderStatus::Available, RiderStatus::Busy)
                .unwrap()
        );
        assert_eq!(
            store.find_rider(&subject.id).unwrap().unwrap().status,
            RiderStatus::Busy
        );
    }

    #[test]
    fn transition_cas_on_missing_rider_is_false() {
        let store = InMemoryGateway::new();
        assert!(
            !store
                .try_transition_rider(
                    &Uuid::from_u128(99),
                    RiderStatus::Available,
                    RiderStatus::Busy
                )
                .unwrap()
        );
    }

    #[test]
    fn deliveries_for_rider_matches_assigned_reference() {
        let store = InMemoryGateway::new();
        let rider_id = Uuid::from_u128(7);

        let mut assigned = delivery(1, DeliveryStatus::Assigned, Priority::Normal);
        assigned.assigned_rider = Some(rider_id);
        let unassigned = delivery(2, DeliveryStatus::Pending, Priority::Normal);

        store.save_delivery(&assigned).unwrap();
        store.save_delivery(&unassigned).unwrap();

        let found = store.deliveries_for_rider(&rider_id).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, Uuid::from_u128(1));
    }
}
