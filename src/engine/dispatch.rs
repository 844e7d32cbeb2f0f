use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::engine::optimizer::{self, RoutePlan};
use crate::error::DispatchError;
use crate::geo::{self, GeoPoint, haversine_km};
use crate::models::delivery::{Address, Delivery, DeliveryStatus, HistoryEntry, Priority};
use crate::models::event::DispatchEvent;
use crate::models::rider::{Rider, RiderStatus, VehicleClass};
use crate::observability::metrics::Metrics;
use crate::store::DataGateway;

#[derive(Debug, Clone)]
pub struct RiderRegistration {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub vehicle: VehicleClass,
}

#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub order_number: String,
    pub pickup: Address,
    pub dropoff: Address,
    pub priority: Priority,
    pub weight_kg: f64,
}

/// Drives the forward lifecycle. Cancellation and failure have their own
/// operations because they require a reason.
#[derive(Debug, Clone)]
pub struct DeliveryStatusUpdate {
    pub status: DeliveryStatus,
    pub position: Option<GeoPoint>,
    pub actual_distance_km: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum AssignmentOutcome {
    Assigned { rider_id: Uuid, distance_km: f64 },
    /// Zero eligible riders. The delivery stays pending; an external
    /// scheduler may retry via `assign_pending`.
    NoCandidate,
}

#[derive(Debug, Clone)]
pub struct TrackingSnapshot {
    pub delivery_id: Uuid,
    pub status: DeliveryStatus,
    pub rider_position: Option<GeoPoint>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    pub history: Vec<HistoryEntry>,
}

pub struct DispatchEngine {
    store: Arc<dyn DataGateway>,
    broadcaster: Broadcaster,
    metrics: Metrics,
    assignment_radius_km: f64,
    /// Serializes the read-filter-rank-commit window so two concurrent
    /// assignments cannot both claim the same rider.
    assign_lock: Mutex<()>,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn DataGateway>,
        broadcaster: Broadcaster,
        metrics: Metrics,
        assignment_radius_km: f64,
    ) -> Self {
        Self {
            store,
            broadcaster,
            metrics,
            assignment_radius_km,
            assign_lock: Mutex::new(()),
        }
    }

    pub fn register_rider(&self, registration: RiderRegistration) -> Result<Rider, DispatchError> {
        if self
            .store
            .find_rider_by_email(&registration.email)?
            .is_some()
        {
            return Err(DispatchError::Duplicate(format!(
                "email {} already registered",
                registration.email
            )));
        }
        if self
            .store
            .find_rider_by_phone(&registration.phone)?
            .is_some()
        {
            return Err(DispatchError::Duplicate(format!(
                "phone {} already registered",
                registration.phone
            )));
        }

        let rider = Rider {
            id: Uuid::new_v4(),
            name: registration.name,
            phone: registration.phone,
            email: registration.email,
            status: RiderStatus::Offline,
            vehicle: registration.vehicle,
            position: None,
            last_position_at: None,
            shift_started_at: None,
            shift_ended_at: None,
            total_deliveries: 0,
            average_rating: 5.0,
            registered_at: Utc::now(),
        };
        self.store.save_rider(&rider)?;

        info!(rider_id = %rider.id, vehicle = ?rider.vehicle, "rider registered");
        Ok(rider)
    }

    pub fn start_shift(&self, rider_id: &Uuid) -> Result<Rider, DispatchError> {
        let mut rider = self.require_rider(rider_id)?;
        rider.shift_started_at = Some(Utc::now());
        rider.shift_ended_at = None;
        rider.status = RiderStatus::Available;
        self.store.save_rider(&rider)?;

        info!(rider_id = %rider.id, "shift started");
        Ok(rider)
    }

    /// Rejected while the rider still has deliveries in flight.
    pub fn end_shift(&self, rider_id: &Uuid) -> Result<Rider, DispatchError> {
        let mut rider = self.require_rider(rider_id)?;
        let active = self.active_deliveries_for(rider_id)?;
        if !active.is_empty() {
            return Err(DispatchError::PreconditionFailed(format!(
                "rider {} has {} active deliveries",
                rider_id,
                active.len()
            )));
        }

        rider.shift_ended_at = Some(Utc::now());
        rider.status = RiderStatus::Offline;
        self.store.save_rider(&rider)?;

        info!(rider_id = %rider.id, "shift ended");
        Ok(rider)
    }

    /// Operator override, e.g. `Break` or `Returning`.
    pub fn update_rider_status(
        &self,
        rider_id: &Uuid,
        status: RiderStatus,
    ) -> Result<Rider, DispatchError> {
        let mut rider = self.require_rider(rider_id)?;
        rider.status = status;
        self.store.save_rider(&rider)?;

        info!(rider_id = %rider.id, status = ?status, "rider status updated");
        Ok(rider)
    }

    /// Manual GPS report, the non-simulated path for position updates.
    pub fn report_rider_location(
        &self,
        rider_id: &Uuid,
        point: GeoPoint,
    ) -> Result<Rider, DispatchError> {
        let mut rider = self.require_rider(rider_id)?;
        rider.position = Some(point);
        rider.last_position_at = Some(Utc::now());
        self.store.save_rider(&rider)?;

        self.broadcaster.emit(DispatchEvent::Location {
            rider_id: rider.id,
            name: rider.name.clone(),
            lat: point.lat,
            lon: point.lon,
            status: rider.status,
            description: "location report".to_string(),
            timestamp_millis: Utc::now().timestamp_millis(),
        });

        Ok(rider)
    }

    pub fn deactivate_rider(&self, rider_id: &Uuid) -> Result<Rider, DispatchError> {
        let mut rider = self.require_rider(rider_id)?;
        let active = self.active_deliveries_for(rider_id)?;
        if !active.is_empty() {
            return Err(DispatchError::PreconditionFailed(format!(
                "rider {} has {} active deliveries",
                rider_id,
                active.len()
            )));
        }

        rider.status = RiderStatus::Offline;
        self.store.save_rider(&rider)?;

        info!(rider_id = %rider.id, "rider deactivated");
        Ok(rider)
    }

    /// Creates a pending delivery with its estimates, then attempts
    /// automatic assignment. A no-candidate outcome is not an error.
    pub async fn create_delivery(
        &self,
        request: DeliveryRequest,
    ) -> Result<(Delivery, AssignmentOutcome), DispatchError> {
        if request.weight_kg <= 0.0 {
            return Err(DispatchError::PreconditionFailed(
                "weight must be positive".to_string(),
            ));
        }
        if request.order_number.trim().is_empty() {
            return Err(DispatchError::PreconditionFailed(
                "order number cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let mut delivery = Delivery {
            id: Uuid::new_v4(),
            order_number: request.order_number,
            pickup: request.pickup,
            dropoff: request.dropoff,
            status: DeliveryStatus::Pending,
            priority: request.priority,
            weight_kg: request.weight_kg,
            requested_at: now,
            estimated_pickup_at: None,
            estimated_delivery_at: Some(now + Duration::minutes(request.priority.max_minutes())),
            actual_pickup_at: None,
            actual_delivery_at: None,
            estimated_distance_km: None,
            actual_distance_km: None,
            assigned_rider: None,
            rating: None,
            feedback: None,
            history: Vec::new(),
        };
        delivery.estimated_distance_km =
            Some(haversine_km(&delivery.pickup.point, &delivery.dropoff.point));
        delivery.record_history("delivery created", None);
        self.store.save_delivery(&delivery)?;

        info!(
            delivery_id = %delivery.id,
            order_number = %delivery.order_number,
            priority = ?delivery.priority,
            "delivery created"
        );

        let outcome = self.assign_optimal(&delivery.id).await?;
        let delivery = self
            .require_delivery(&delivery.id)
            .map_err(|_| DispatchError::Internal("delivery vanished after creation".to_string()))?;
        Ok((delivery, outcome))
    }

    /// Nearest-available-rider assignment. Candidates come back from the
    /// store ordered by distance then id, so the ranking is deterministic.
    pub async fn assign_optimal(
        &self,
        delivery_id: &Uuid,
    ) -> Result<AssignmentOutcome, DispatchError> {
        let _guard = self.assign_lock.lock().await;
        self.timed_assignment(|engine| engine.assign_optimal_inner(delivery_id))
    }

    /// Operator assignment to a named rider; the rider must be available
    /// and the delivery pending.
    pub async fn assign_manual(
        &self,
        delivery_id: &Uuid,
        rider_id: &Uuid,
    ) -> Result<Delivery, DispatchError> {
        let _guard = self.assign_lock.lock().await;
        self.timed_assignment(|engine| engine.assign_manual_inner(delivery_id, rider_id))
    }

    /// Releases the current rider, resets the delivery to pending, then
    /// assigns to the given rider or re-runs automatic assignment.
    pub async fn reassign(
        &self,
        delivery_id: &Uuid,
        new_rider: Option<Uuid>,
    ) -> Result<(Delivery, AssignmentOutcome), DispatchError> {
        let _guard = self.assign_lock.lock().await;

        let mut delivery = self.require_delivery(delivery_id)?;
        if delivery.status.is_terminal() {
            return Err(DispatchError::PreconditionFailed(format!(
                "delivery {} is {:?} and cannot be reassigned",
                delivery_id, delivery.status
            )));
        }

        if let Some(rider_id) = delivery.assigned_rider {
            self.release_rider(&rider_id);
        }
        delivery.assigned_rider = None;
        delivery.status = DeliveryStatus::Pending;
        delivery.estimated_pickup_at = None;
        delivery.record_history("reassignment requested", None);
        self.store.save_delivery(&delivery)?;

        let outcome = match new_rider {
            Some(rider_id) => {
                let assigned = self
                    .timed_assignment(|engine| engine.assign_manual_inner(delivery_id, &rider_id))?;
                let distance_km = self
                    .require_rider(&rider_id)?
                    .position
                    .map(|position| haversine_km(&position, &assigned.pickup.point))
                    .unwrap_or_default();
                AssignmentOutcome::Assigned {
                    rider_id,
                    distance_km,
                }
            }
            None => self.timed_assignment(|engine| engine.assign_optimal_inner(delivery_id))?,
        };

        let delivery = self.require_delivery(delivery_id)?;
        Ok((delivery, outcome))
    }

    fn assign_optimal_inner(&self, delivery_id: &Uuid) -> Result<AssignmentOutcome, DispatchError> {
        let mut delivery = self.require_delivery(delivery_id)?;
        if delivery.status != DeliveryStatus::Pending {
            return Err(DispatchError::PreconditionFailed(format!(
                "delivery {} is {:?}, not pending",
                delivery_id, delivery.status
            )));
        }

        let candidates = self
            .store
            .available_riders_within_radius(&delivery.pickup.point, self.assignment_radius_km)?;

        let weight_kg = delivery.weight_kg;
        for rider in candidates
            .iter()
            .filter(|rider| rider.vehicle.can_carry(weight_kg))
        {
            // A candidate whose status changed since the query is skipped,
            // the next-nearest one is tried.
            if self.commit_assignment(&mut delivery, rider)? {
                let distance_km = rider
                    .position
                    .map(|position| haversine_km(&position, &delivery.pickup.point))
                    .unwrap_or_default();
                return Ok(AssignmentOutcome::Assigned {
                    rider_id: rider.id,
                    distance_km,
                });
            }
        }

        warn!(delivery_id = %delivery_id, "no eligible riders; delivery stays pending");
        Ok(AssignmentOutcome::NoCandidate)
    }

    fn assign_manual_inner(
        &self,
        delivery_id: &Uuid,
        rider_id: &Uuid,
    ) -> Result<Delivery, DispatchError> {
        let mut delivery = self.require_delivery(delivery_id)?;
        let rider = self.require_rider(rider_id)?;

        if rider.status != RiderStatus::Available {
            return Err(DispatchError::PreconditionFailed(format!(
                "rider {} is {:?}, not available",
                rider_id, rider.status
            )));
        }
        if delivery.status != DeliveryStatus::Pending {
            return Err(DispatchError::PreconditionFailed(format!(
                "delivery {} is {:?}, not pending",
                delivery_id, delivery.status
            )));
        }

        if !self.commit_assignment(&mut delivery, &rider)? {
            return Err(DispatchError::PreconditionFailed(format!(
                "rider {} is no longer available",
                rider_id
            )));
        }

        Ok(delivery)
    }

    /// Claims the rider via compare-and-set, then persists the delivery.
    /// Returns false when the claim is lost to a concurrent status writer.
    /// The rider claim is rolled back if the delivery save fails, so a
    /// store error never strands a busy rider without a delivery.
    fn commit_assignment(
        &self,
        delivery: &mut Delivery,
        rider: &Rider,
    ) -> Result<bool, DispatchError> {
        if !self
            .store
            .try_transition_rider(&rider.id, RiderStatus::Available, RiderStatus::Busy)?
        {
            return Ok(false);
        }

        delivery.status = DeliveryStatus::Assigned;
        delivery.assigned_rider = Some(rider.id);
        if let Some(position) = rider.position {
            let pickup_minutes =
                geo::travel_minutes(haversine_km(&position, &delivery.pickup.point));
            delivery.estimated_pickup_at = Some(Utc::now() + Duration::minutes(pickup_minutes));
        }
        delivery.record_history(format!("assigned to rider {}", rider.name), rider.position);

        if let Err(err) = self.store.save_delivery(delivery) {
            let _ = self.store.try_transition_rider(
                &rider.id,
                RiderStatus::Busy,
                RiderStatus::Available,
            );
            return Err(err.into());
        }

        self.broadcaster.emit(DispatchEvent::Assignment {
            rider_id: rider.id,
            delivery_id: delivery.id,
            order_context: format!(
                "order {} pickup at {}",
                delivery.order_number, delivery.pickup.address
            ),
        });

        if delivery.priority == Priority::Urgent {
            warn!(
                delivery_id = %delivery.id,
                due_minutes = Priority::Urgent.max_minutes(),
                "urgent delivery assigned"
            );
        }

        info!(
            delivery_id = %delivery.id,
            rider_id = %rider.id,
            "delivery assigned"
        );
        Ok(true)
    }

    fn timed_assignment<T>(
        &self,
        op: impl FnOnce(&Self) -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        let start = Instant::now();
        let result = op(self);
        let elapsed = start.elapsed().as_secs_f64();

        let outcome = match &result {
            Ok(_) => "success",
            Err(_) => "error",
        };
        self.metrics
            .assignment_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed);
        self.metrics
            .assignments_total
            .with_label_values(&[outcome])
            .inc();

        result
    }

    /// Drives the forward lifecycle: assigned, picking up, in transit,
    /// delivered. Assignment and cancellation have their own operations.
    pub fn update_delivery_status(
        &self,
        delivery_id: &Uuid,
        update: DeliveryStatusUpdate,
    ) -> Result<Delivery, DispatchError> {
        let mut delivery = self.require_delivery(delivery_id)?;
        let new_status = update.status;

        match new_status {
            DeliveryStatus::Pending | DeliveryStatus::Assigned => {
                return Err(DispatchError::PreconditionFailed(format!(
                    "{new_status:?} is driven by the assignment operations"
                )));
            }
            DeliveryStatus::Cancelled | DeliveryStatus::Failed => {
                return Err(DispatchError::PreconditionFailed(
                    "cancellation and failure require a reason; use the dedicated operations"
                        .to_string(),
                ));
            }
            _ => {}
        }

        if !delivery.status.can_transition_to(new_status) {
            return Err(DispatchError::PreconditionFailed(format!(
                "cannot move delivery {} from {:?} to {:?}",
                delivery_id, delivery.status, new_status
            )));
        }

        delivery.status = new_status;
        match new_status {
            DeliveryStatus::PickingUp => {
                delivery.actual_pickup_at = Some(Utc::now());
            }
            DeliveryStatus::Delivered => {
                delivery.actual_delivery_at = Some(Utc::now());
                delivery.actual_distance_km = update.actual_distance_km;
                self.complete_rider_delivery(&delivery);
            }
            _ => {}
        }
        delivery.record_history(format!("status updated to {new_status:?}"), update.position);
        self.store.save_delivery(&delivery)?;

        self.emit_status_change(&delivery);
        info!(
            delivery_id = %delivery.id,
            status = ?delivery.status,
            "delivery status updated"
        );
        Ok(delivery)
    }

    pub fn cancel_delivery(
        &self,
        delivery_id: &Uuid,
        reason: &str,
    ) -> Result<Delivery, DispatchError> {
        self.terminate_delivery(delivery_id, DeliveryStatus::Cancelled, reason)
    }

    /// Administrative force-set; terminal.
    pub fn fail_delivery(
        &self,
        delivery_id: &Uuid,
        reason: &str,
    ) -> Result<Delivery, DispatchError> {
        self.terminate_delivery(delivery_id, DeliveryStatus::Failed, reason)
    }

    fn terminate_delivery(
        &self,
        delivery_id: &Uuid,
        terminal: DeliveryStatus,
        reason: &str,
    ) -> Result<Delivery, DispatchError> {
        if reason.trim().is_empty() {
            return Err(DispatchError::PreconditionFailed(
                "a reason is required".to_string(),
            ));
        }

        let mut delivery = self.require_delivery(delivery_id)?;
        if !delivery.status.can_transition_to(terminal) {
            return Err(DispatchError::PreconditionFailed(format!(
                "delivery {} is already {:?}",
                delivery_id, delivery.status
            )));
        }

        if let Some(rider_id) = delivery.assigned_rider {
            self.release_rider(&rider_id);
        }

        delivery.status = terminal;
        let event = match terminal {
            DeliveryStatus::Cancelled => format!("delivery cancelled: {reason}"),
            _ => format!("delivery failed: {reason}"),
        };
        delivery.record_history(event, None);
        self.store.save_delivery(&delivery)?;

        self.emit_status_change(&delivery);
        info!(
            delivery_id = %delivery.id,
            status = ?terminal,
            reason,
            "delivery terminated"
        );
        Ok(delivery)
    }

    pub fn track_delivery(&self, delivery_id: &Uuid) -> Result<TrackingSnapshot, DispatchError> {
        let delivery = self.require_delivery(delivery_id)?;

        let rider_position = match delivery.assigned_rider {
            Some(rider_id) => self.store.find_rider(&rider_id)?.and_then(|r| r.position),
            None => None,
        };

        Ok(TrackingSnapshot {
            delivery_id: delivery.id,
            status: delivery.status,
            rider_position,
            estimated_delivery_at: delivery.estimated_delivery_at,
            history: delivery.history,
        })
    }

    /// A delivered, unrated delivery may be rated once; the rider's rolling
    /// average moves with it.
    pub fn rate_delivery(
        &self,
        delivery_id: &Uuid,
        rating: u8,
        feedback: Option<String>,
    ) -> Result<Delivery, DispatchError> {
        if !(1..=5).contains(&rating) {
            return Err(DispatchError::PreconditionFailed(
                "rating must be between 1 and 5".to_string(),
            ));
        }

        let mut delivery = self.require_delivery(delivery_id)?;
        if delivery.status != DeliveryStatus::Delivered {
            return Err(DispatchError::PreconditionFailed(format!(
                "delivery {} is {:?}, not delivered",
                delivery_id, delivery.status
            )));
        }
        if delivery.rating.is_some() {
            return Err(DispatchError::PreconditionFailed(format!(
                "delivery {} is already rated",
                delivery_id
            )));
        }

        delivery.rating = Some(rating);
        delivery.feedback = feedback;
        self.store.save_delivery(&delivery)?;

        if let Some(rider_id) = delivery.assigned_rider {
            if let Some(mut rider) = self.store.find_rider(&rider_id)? {
                let completed = rider.total_deliveries.max(1) as f64;
                rider.average_rating =
                    (rider.average_rating * completed + f64::from(rating)) / (completed + 1.0);
                self.store.save_rider(&rider)?;
            }
        }

        info!(delivery_id = %delivery.id, rating, "delivery rated");
        Ok(delivery)
    }

    pub fn pending_deliveries(&self) -> Result<Vec<Delivery>, DispatchError> {
        Ok(self.store.pending_deliveries()?)
    }

    /// External-scheduler hook: retry automatic assignment for everything
    /// pending, highest priority first. Returns how many got a rider.
    pub async fn assign_pending(&self) -> Result<usize, DispatchError> {
        let pending = self.store.pending_deliveries()?;
        let mut assigned = 0;
        for delivery in pending {
            if let AssignmentOutcome::Assigned { .. } = self.assign_optimal(&delivery.id).await? {
                assigned += 1;
            }
        }
        Ok(assigned)
    }

    pub fn delayed_deliveries(&self, now: DateTime<Utc>) -> Result<Vec<Delivery>, DispatchError> {
        Ok(self.store.delayed_deliveries(now)?)
    }

    /// Emits a delay event for every delivery past its estimate.
    pub fn report_delays(&self, now: DateTime<Utc>) -> Result<usize, DispatchError> {
        let delayed = self.store.delayed_deliveries(now)?;
        for delivery in &delayed {
            let delay_minutes = delivery
                .estimated_delivery_at
                .map(|estimate| (now - estimate).num_minutes())
                .unwrap_or_default();

            warn!(
                delivery_id = %delivery.id,
                order_number = %delivery.order_number,
                delay_minutes,
                "delivery is delayed"
            );
            self.broadcaster.emit(DispatchEvent::Delay {
                delivery_id: delivery.id,
                order_number: delivery.order_number.clone(),
                delay_minutes,
            });
        }
        Ok(delayed.len())
    }

    /// Multi-stop plan over the rider's in-flight deliveries, starting at
    /// the rider's current position.
    pub fn plan_rider_route(&self, rider_id: &Uuid) -> Result<RoutePlan, DispatchError> {
        let rider = self.require_rider(rider_id)?;
        let Some(position) = rider.position else {
            return Err(DispatchError::PreconditionFailed(format!(
                "rider {} has no known position",
                rider_id
            )));
        };

        let mut active = self.active_deliveries_for(rider_id)?;
        // Stable input order keeps the greedy plan deterministic.
        active.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then(a.id.cmp(&b.id)));

        Ok(optimizer::optimize_route(&position, &active))
    }

    fn require_rider(&self, rider_id: &Uuid) -> Result<Rider, DispatchError> {
        self.store
            .find_rider(rider_id)?
            .ok_or_else(|| DispatchError::NotFound(format!("rider {} not found", rider_id)))
    }

    fn require_delivery(&self, delivery_id: &Uuid) -> Result<Delivery, DispatchError> {
        self.store
            .find_delivery(delivery_id)?
            .ok_or_else(|| DispatchError::NotFound(format!("delivery {} not found", delivery_id)))
    }

    fn active_deliveries_for(&self, rider_id: &Uuid) -> Result<Vec<Delivery>, DispatchError> {
        Ok(self
            .store
            .deliveries_for_rider(rider_id)?
            .into_iter()
            .filter(|delivery| delivery.status.is_active())
            .collect())
    }

    /// On completion the rider goes back to available and its lifetime
    /// count moves, in the same logical operation as the delivery save.
    fn complete_rider_delivery(&self, delivery: &Delivery) {
        let Some(rider_id) = delivery.assigned_rider else {
            return;
        };
        match self.store.find_rider(&rider_id) {
            Ok(Some(mut rider)) => {
                rider.status = RiderStatus::Available;
                rider.total_deliveries += 1;
                if let Err(err) = self.store.save_rider(&rider) {
                    warn!(rider_id = %rider_id, error = %err, "failed to release rider");
                }
            }
            Ok(None) => warn!(rider_id = %rider_id, "assigned rider record is missing"),
            Err(err) => warn!(rider_id = %rider_id, error = %err, "failed to load rider"),
        }
    }

    fn release_rider(&self, rider_id: &Uuid) {
        match self.store.find_rider(rider_id) {
            Ok(Some(mut rider)) => {
                rider.status = RiderStatus::Available;
                if let Err(err) = self.store.save_rider(&rider) {
                    warn!(rider_id = %rider_id, error = %err, "failed to release rider");
                }
            }
            Ok(None) => warn!(rider_id = %rider_id, "assigned rider record is missing"),
            Err(err) => warn!(rider_id = %rider_id, error = %err, "failed to load rider"),
        }
    }

    fn emit_status_change(&self, delivery: &Delivery) {
        self.metrics
            .delivery_status_total
            .with_label_values(&[&format!("{:?}", delivery.status)])
            .inc();
        self.broadcaster.emit(DispatchEvent::StatusChange {
            delivery_id: delivery.id,
            new_status: delivery.status,
        });
    }
}
