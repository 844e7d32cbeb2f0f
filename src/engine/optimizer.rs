use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::geo::{self, GeoPoint, haversine_km};
use crate::models::delivery::Delivery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    Pickup,
    Dropoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub delivery_id: Uuid,
    pub kind: StopKind,
    pub point: GeoPoint,
    pub address: String,
    pub leg_distance_km: f64,
    /// Minutes from the previous stop to this one.
    pub leg_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePlan {
    pub total_distance_km: f64,
    pub estimated_minutes: i64,
    pub stops: Vec<RouteStop>,
    pub optimization_score: f64,
}

impl RoutePlan {
    fn empty() -> Self {
        Self {
            total_distance_km: 0.0,
            estimated_minutes: 0,
            stops: Vec::new(),
            optimization_score: 0.0,
        }
    }
}

/// Greedy nearest-neighbor over delivery pickups. Each pickup is followed
/// immediately by its drop-off. Ties on distance keep the first delivery in
/// the supplied order, so identical inputs always produce identical plans.
pub fn optimize_route(start: &GeoPoint, deliveries: &[Delivery]) -> RoutePlan {
    if deliveries.is_empty() {
        return RoutePlan::empty();
    }

    let mut stops = Vec::with_capacity(deliveries.len() * 2);
    let mut visited = vec![false; deliveries.len()];
    let mut current = *start;
    let mut total_distance = 0.0;

    for _ in 0..deliveries.len() {
        let nearest = deliveries
            .iter()
            .enumerate()
            .filter(|(index, _)| !visited[*index])
            .min_by(|(_, a), (_, b)| {
                haversine_km(&current, &a.pickup.point)
                    .total_cmp(&haversine_km(&current, &b.pickup.point))
            });

        let Some((index, delivery)) = nearest else {
            break;
        };

        let pickup_distance = haversine_km(&current, &delivery.pickup.point);
        total_distance += pickup_distance;
        stops.push(RouteStop {
            delivery_id: delivery.id,
            kind: StopKind::Pickup,
            point: delivery.pickup.point,
            address: delivery.pickup.address.clone(),
            leg_distance_km: pickup_distance,
            leg_minutes: geo::travel_minutes(pickup_distance),
        });

        let dropoff_distance = haversine_km(&delivery.pickup.point, &delivery.dropoff.point);
        total_distance += dropoff_distance;
        stops.push(RouteStop {
            delivery_id: delivery.id,
            kind: StopKind::Dropoff,
            point: delivery.dropoff.point,
            address: delivery.dropoff.address.clone(),
            leg_distance_km: dropoff_distance,
            leg_minutes: geo::travel_minutes(dropoff_distance),
        });

        current = delivery.dropoff.point;
        visited[index] = true;
    }

    let plan = RoutePlan {
        total_distance_km: total_distance,
        estimated_minutes: geo::route_minutes(total_distance),
        optimization_score: optimization_score(total_distance, deliveries.len()),
        stops,
    };

    debug!(
        deliveries = deliveries.len(),
        total_km = plan.total_distance_km,
        score = plan.optimization_score,
        "route plan computed"
    );

    plan
}

/// 0-100 score from the average distance a single delivery adds to the
/// route.
fn optimization_score(total_distance_km: f64, delivery_count: usize) -> f64 {
    let avg_per_delivery = total_distance_km / delivery_count as f64;
    if avg_per_delivery < 2.0 {
        100.0
    } else if avg_per_delivery < 5.0 {
        80.0
    } else if avg_per_delivery < 10.0 {
        60.0
    } else {
        40.0
    }
}

/// How close actual travel came to the estimate, capped at 100. Zero when
/// either total is missing or non-positive.
pub fn route_efficiency(estimated_total_km: f64, actual_total_km: f64) -> f64 {
    if estimated_total_km <= 0.0 || actual_total_km <= 0.0 {
        return 0.0;
    }
    (estimated_total_km / actual_total_km * 100.0).min(100.0)
}
