use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::error::DispatchError;
use crate::geo::GeoPoint;
use crate::models::event::DispatchEvent;
use crate::models::rider::RiderStatus;
use crate::models::route::{RouteCatalog, RouteDefinition};
use crate::observability::metrics::Metrics;
use crate::store::DataGateway;

/// What a tick does with an active route whose rider record is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRiderPolicy {
    /// Leave the route active and skip the update.
    Keep,
    /// Remove the route from the active set.
    Drop,
}

impl FromStr for MissingRiderPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "keep" => Ok(MissingRiderPolicy::Keep),
            "drop" => Ok(MissingRiderPolicy::Drop),
            other => Err(format!("expected keep or drop, got {other}")),
        }
    }
}

struct ActiveRoute {
    route: RouteDefinition,
    started_at: DateTime<Utc>,
    cursor: usize,
}

/// Replays predefined routes on a fixed tick, moving each active rider to
/// the latest waypoint whose offset has elapsed. Drives the same store and
/// event fan-out as real GPS reports, so downstream consumers cannot tell
/// the difference.
pub struct LocationSimulator {
    catalog: RouteCatalog,
    store: Arc<dyn DataGateway>,
    broadcaster: Broadcaster,
    metrics: Metrics,
    tick_interval: Duration,
    missing_rider_policy: MissingRiderPolicy,
    active: Mutex<HashMap<Uuid, ActiveRoute>>,
}

impl LocationSimulator {
    pub fn new(
        catalog: RouteCatalog,
        store: Arc<dyn DataGateway>,
        broadcaster: Broadcaster,
        metrics: Metrics,
        tick_interval: Duration,
        missing_rider_policy: MissingRiderPolicy,
    ) -> Self {
        Self {
            catalog,
            store,
            broadcaster,
            metrics,
            tick_interval,
            missing_rider_policy,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Ticks forever. Each tick is awaited to completion before the next
    /// is scheduled, so ticks never overlap; an overrunning tick simply
    /// delays the next one.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            routes = self.catalog.len(),
            interval_secs = self.tick_interval.as_secs(),
            "location simulator running"
        );

        loop {
            ticker.tick().await;
            let updated = self.tick().await;
            if updated > 0 {
                debug!(updated, "simulation tick");
            }
        }
    }

    /// Activates the rider's predefined route. No-op when the rider has no
    /// route or the route is already running; returns whether it started.
    pub async fn start_route(&self, rider_id: &Uuid) -> bool {
        let mut active = self.active.lock().await;
        if active.contains_key(rider_id) {
            debug!(rider_id = %rider_id, "route already active");
            return false;
        }
        let Some(route) = self.catalog.get(rider_id) else {
            warn!(rider_id = %rider_id, "no predefined route for rider");
            return false;
        };

        info!(rider_id = %rider_id, route_name = %route.route_name, "route started");
        active.insert(
            *rider_id,
            ActiveRoute {
                route: route.clone(),
                started_at: Utc::now(),
                cursor: 0,
            },
        );
        self.metrics.active_routes.set(active.len() as i64);
        true
    }

    /// Idempotent; returns whether a route was actually stopped.
    pub async fn stop_route(&self, rider_id: &Uuid) -> bool {
        let mut active = self.active.lock().await;
        let stopped = active.remove(rider_id).is_some();
        if stopped {
            info!(rider_id = %rider_id, "route stopped");
            self.metrics.active_routes.set(active.len() as i64);
        }
        stopped
    }

    /// Clears the active set and re-activates routes for every rider the
    /// store still shows as busy, so a restart resumes mid-shift work
    /// instead of resurrecting finished routes.
    pub async fn restart_all(&self) -> Result<usize, DispatchError> {
        let mut active = self.active.lock().await;
        active.clear();

        let mut restarted = 0;
        for rider_id in self.catalog.rider_ids() {
            let Some(rider) = self.store.find_rider(rider_id)? else {
                continue;
            };
            if rider.status != RiderStatus::Busy {
                continue;
            }
            if let Some(route) = self.catalog.get(rider_id) {
                active.insert(
                    *rider_id,
                    ActiveRoute {
                        route: route.clone(),
                        started_at: Utc::now(),
                        cursor: 0,
                    },
                );
                restarted += 1;
            }
        }

        self.metrics.active_routes.set(active.len() as i64);
        info!(restarted, "simulation restarted from persisted rider status");
        Ok(restarted)
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    pub async fn tick(&self) -> usize {
        self.tick_at(Utc::now()).await
    }

    /// One simulation step at the given instant. Cursor and membership
    /// decisions happen under the lock; store writes and event emission
    /// happen after it is released. Returns the number of riders moved.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> usize {
        let mut emissions = Vec::new();
        {
            let mut active = self.active.lock().await;
            let mut completed = Vec::new();

            for (rider_id, progress) in active.iter_mut() {
                let waypoints = &progress.route.waypoints;
                // A route without waypoints stays active but never emits.
                if waypoints.is_empty() {
                    continue;
                }

                let elapsed = (now - progress.started_at).num_seconds().max(0) as u64;
                while progress.cursor + 1 < waypoints.len()
                    && waypoints[progress.cursor + 1].offset_seconds <= elapsed
                {
                    progress.cursor += 1;
                }

                emissions.push((*rider_id, waypoints[progress.cursor].clone()));

                // The final waypoint is still emitted on the tick that
                // completes the route.
                if progress.cursor + 1 >= waypoints.len() {
                    completed.push(*rider_id);
                }
            }

            for rider_id in &completed {
                active.remove(rider_id);
                info!(rider_id = %rider_id, "route completed");
            }
            self.metrics.active_routes.set(active.len() as i64);
        }

        let mut updated = 0;
        let mut missing = Vec::new();
        for (rider_id, waypoint) in emissions {
            let mut rider = match self.store.find_rider(&rider_id) {
                Ok(Some(rider)) => rider,
                Ok(None) => {
                    warn!(
                        rider_id = %rider_id,
                        policy = ?self.missing_rider_policy,
                        "active route references a missing rider"
                    );
                    if self.missing_rider_policy == MissingRiderPolicy::Drop {
                        missing.push(rider_id);
                    }
                    continue;
                }
                // One bad route must not abort the whole tick.
                Err(err) => {
                    warn!(rider_id = %rider_id, error = %err, "failed to load rider");
                    continue;
                }
            };

            rider.position = Some(GeoPoint {
                lat: waypoint.lat,
                lon: waypoint.lon,
            });
            rider.last_position_at = Some(now);
            if let Err(err) = self.store.save_rider(&rider) {
                warn!(rider_id = %rider_id, error = %err, "failed to save rider position");
                continue;
            }

            self.broadcaster.emit(DispatchEvent::Location {
                rider_id: rider.id,
                name: rider.name.clone(),
                lat: waypoint.lat,
                lon: waypoint.lon,
                status: rider.status,
                description: waypoint.description.clone(),
                timestamp_millis: now.timestamp_millis(),
            });
            self.metrics.location_updates_total.inc();
            updated += 1;
        }

        if !missing.is_empty() {
            let mut active = self.active.lock().await;
            for rider_id in &missing {
                active.remove(rider_id);
            }
            self.metrics.active_routes.set(active.len() as i64);
        }

        updated
    }
}

#[cfg(test)]
mod tests {
    use super::{LocationSimulator, MissingRiderPolicy};
    use crate::broadcast::Broadcaster;
    use crate::geo::GeoPoint;
    use crate::models::event::DispatchEvent;
    use crate::models::rider::{Rider, RiderStatus, VehicleClass};
    use crate::models::route::{RouteCatalog, RouteDefinition, Waypoint};
    use crate::observability::metrics::Metrics;
    use crate::store::{DataGateway, InMemoryGateway};
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    fn waypoint(lat: f64, offset_seconds: u64) -> Waypoint {
        Waypoint {
            lat,
            lon: 127.0,
            offset_seconds,
            description: format!("stop at {offset_seconds}s"),
        }
    }

    fn route(rider_id: Uuid, offsets: &[u64]) -> RouteDefinition {
        RouteDefinition {
            rider_id,
            route_name: format!("route-{rider_id}"),
            waypoints: offsets
                .iter()
                .enumerate()
                .map(|(index, offset)| waypoint(37.50 + index as f64 * 0.01, *offset))
                .collect(),
        }
    }

    fn rider(id: Uuid, status: RiderStatus) -> Rider {
        Rider {
            id,
            name: format!("rider-{id}"),
            phone: format!("010-{id}"),
            email: format!("{id}@example.com"),
            status,
            vehicle: VehicleClass::Motorcycle,
            position: Some(GeoPoint {
                lat: 37.50,
                lon: 127.0,
            }),
            last_position_at: None,
            shift_started_at: Some(Utc::now()),
            shift_ended_at: None,
            total_deliveries: 0,
            average_rating: 5.0,
            registered_at: Utc::now(),
        }
    }

    fn simulator(
        definitions: Vec<RouteDefinition>,
        policy: MissingRiderPolicy,
    ) -> (LocationSimulator, Arc<InMemoryGateway>, Broadcaster) {
        let store = Arc::new(InMemoryGateway::new());
        let broadcaster = Broadcaster::new(64);
        let simulator = LocationSimulator::new(
            RouteCatalog::from_definitions(definitions),
            store.clone(),
            broadcaster.clone(),
            Metrics::new(),
            std::time::Duration::from_secs(5),
            policy,
        );
        (simulator, store, broadcaster)
    }

    #[tokio::test]
    async fn cursor_lands_on_latest_due_waypoint() {
        let rider_id = Uuid::from_u128(1);
        let (sim, store, _) = simulator(
            vec![route(rider_id, &[0, 60, 120])],
            MissingRiderPolicy::Keep,
        );
        store.save_rider(&rider(rider_id, RiderStatus::Busy)).unwrap();

        assert!(sim.start_route(&rider_id).await);
        let later = Utc::now() + Duration::seconds(65);
        let updated = sim.tick_at(later).await;

        assert_eq!(updated, 1);
        // 65s in: past the second waypoint, short of the third.
        let moved = store.find_rider(&rider_id).unwrap().unwrap();
        assert_eq!(moved.position.unwrap().lat, 37.51);
        assert_eq!(sim.active_count().await, 1);
    }

    #[tokio::test]
    async fn first_waypoint_is_emitted_before_its_offset() {
        let rider_id = Uuid::from_u128(2);
        let (sim, store, _) = simulator(
            vec![route(rider_id, &[3000, 6000])],
            MissingRiderPolicy::Keep,
        );
        store.save_rider(&rider(rider_id, RiderStatus::Busy)).unwrap();

        sim.start_route(&rider_id).await;
        let updated = sim.tick_at(Utc::now()).await;

        assert_eq!(updated, 1);
        let moved = store.find_rider(&rider_id).unwrap().unwrap();
        assert_eq!(moved.position.unwrap().lat, 37.50);
        assert_eq!(sim.active_count().await, 1);
    }

    #[tokio::test]
    async fn route_is_removed_after_emitting_its_final_waypoint() {
        let rider_id = Uuid::from_u128(3);
        let (sim, store, _) = simulator(
            vec![route(rider_id, &[0, 10])],
            MissingRiderPolicy::Keep,
        );
        store.save_rider(&rider(rider_id, RiderStatus::Busy)).unwrap();

        sim.start_route(&rider_id).await;
        let later = Utc::now() + Duration::seconds(20);
        let updated = sim.tick_at(later).await;

        // The completing tick still moves the rider to the last waypoint.
        assert_eq!(updated, 1);
        let moved = store.find_rider(&rider_id).unwrap().unwrap();
        assert_eq!(moved.position.unwrap().lat, 37.51);
        assert_eq!(sim.active_count().await, 0);

        let idle = sim.tick_at(later + Duration::seconds(10)).await;
        assert_eq!(idle, 0);
    }

    #[tokio::test]
    async fn single_waypoint_route_emits_once() {
        let rider_id = Uuid::from_u128(4);
        let (sim, store, _) =
            simulator(vec![route(rider_id, &[0])], MissingRiderPolicy::Keep);
        store.save_rider(&rider(rider_id, RiderStatus::Busy)).unwrap();

        sim.start_route(&rider_id).await;
        assert_eq!(sim.tick_at(Utc::now()).await, 1);
        assert_eq!(sim.active_count().await, 0);
        assert_eq!(sim.tick_at(Utc::now()).await, 0);
    }

    #[tokio::test]
    async fn empty_route_stays_active_without_emitting() {
        let rider_id = Uuid::from_u128(5);
        let (sim, store, _) =
            simulator(vec![route(rider_id, &[])], MissingRiderPolicy::Keep);
        store.save_rider(&rider(rider_id, RiderStatus::Busy)).unwrap();

        sim.start_route(&rider_id).await;
        assert_eq!(sim.tick_at(Utc::now()).await, 0);
        assert_eq!(sim.active_count().await, 1);
    }

    #[tokio::test]
    async fn start_is_noop_for_active_or_unknown_riders() {
        let rider_id = Uuid::from_u128(6);
        let (sim, store, _) = simulator(
            vec![route(rider_id, &[0, 3000])],
            MissingRiderPolicy::Keep,
        );
        store.save_rider(&rider(rider_id, RiderStatus::Busy)).unwrap();

        assert!(sim.start_route(&rider_id).await);
        assert!(!sim.start_route(&rider_id).await);
        assert!(!sim.start_route(&Uuid::from_u128(999)).await);
        assert_eq!(sim.active_count().await, 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let rider_id = Uuid::from_u128(7);
        let (sim, store, _) =
            simulator(vec![route(rider_id, &[0, 3000])], MissingRiderPolicy::Keep);
        store.save_rider(&rider(rider_id, RiderStatus::Busy)).unwrap();

        sim.start_route(&rider_id).await;
        assert!(sim.stop_route(&rider_id).await);
        assert!(!sim.stop_route(&rider_id).await);
        assert_eq!(sim.active_count().await, 0);
    }

    #[tokio::test]
    async fn restart_reseeds_only_busy_riders() {
        let busy = Uuid::from_u128(10);
        let available = Uuid::from_u128(11);
        let ghost = Uuid::from_u128(12);
        let (sim, store, _) = simulator(
            vec![
                route(busy, &[0, 3000]),
                route(available, &[0, 3000]),
                route(ghost, &[0, 3000]),
            ],
            MissingRiderPolicy::Keep,
        );
        store.save_rider(&rider(busy, RiderStatus::Busy)).unwrap();
        store
            .save_rider(&rider(available, RiderStatus::Available))
            .unwrap();

        // The available rider's running route does not survive a restart.
        sim.start_route(&available).await;
        let restarted = sim.restart_all().await.unwrap();

        assert_eq!(restarted, 1);
        assert_eq!(sim.active_count().await, 1);
        assert_eq!(sim.tick_at(Utc::now()).await, 1);
        let moved = store.find_rider(&busy).unwrap().unwrap();
        assert!(moved.last_position_at.is_some());
    }

    #[tokio::test]
    async fn keep_policy_retains_route_for_missing_rider() {
        let ghost = Uuid::from_u128(20);
        let (sim, _, _) =
            simulator(vec![route(ghost, &[0, 3000])], MissingRiderPolicy::Keep);

        sim.start_route(&ghost).await;
        assert_eq!(sim.tick_at(Utc::now()).await, 0);
        assert_eq!(sim.active_count().await, 1);
    }

    #[tokio::test]
    async fn drop_policy_removes_route_for_missing_rider() {
        let ghost = Uuid::from_u128(21);
        let (sim, _, _) =
            simulator(vec![route(ghost, &[0, 3000])], MissingRiderPolicy::Drop);

        sim.start_route(&ghost).await;
        assert_eq!(sim.tick_at(Utc::now()).await, 0);
        assert_eq!(sim.active_count().await, 0);
    }

    #[tokio::test]
    async fn tick_emits_location_events() {
        let rider_id = Uuid::from_u128(30);
        let (sim, store, broadcaster) = simulator(
            vec![route(rider_id, &[0, 3000])],
            MissingRiderPolicy::Keep,
        );
        store.save_rider(&rider(rider_id, RiderStatus::Busy)).unwrap();
        let mut events = broadcaster.subscribe();

        sim.start_route(&rider_id).await;
        let now = Utc::now();
        sim.tick_at(now).await;

        match events.try_recv().unwrap() {
            DispatchEvent::Location {
                rider_id: subject,
                status,
                description,
                timestamp_millis,
                ..
            } => {
                assert_eq!(subject, rider_id);
                assert_eq!(status, RiderStatus::Busy);
                assert_eq!(description, "stop at 0s");
                assert_eq!(timestamp_millis, now.timestamp_millis());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn missing_rider_policy_parses_case_insensitively() {
        assert_eq!("keep".parse(), Ok(MissingRiderPolicy::Keep));
        assert_eq!("DROP".parse(), Ok(MissingRiderPolicy::Drop));
        assert!("purge".parse::<MissingRiderPolicy>().is_err());
    }
}
