mod broadcast;
mod config;
mod engine;
mod error;
mod geo;
mod models;
mod observability;
mod store;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::engine::dispatch::{DeliveryRequest, DispatchEngine};
use crate::engine::simulator::LocationSimulator;
use crate::error::DispatchError;
use crate::geo::GeoPoint;
use crate::models::delivery::{Address, Priority};
use crate::models::rider::{Rider, RiderStatus, VehicleClass};
use crate::models::route::RouteCatalog;
use crate::observability::metrics::Metrics;
use crate::store::{DataGateway, InMemoryGateway};

#[tokio::main]
async fn main() -> Result<(), DispatchError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store: Arc<InMemoryGateway> = Arc::new(InMemoryGateway::new());
    let broadcaster = Broadcaster::new(config.event_buffer_size);
    let metrics = Metrics::new();

    let engine = Arc::new(DispatchEngine::new(
        store.clone(),
        broadcaster.clone(),
        metrics.clone(),
        config.assignment_radius_km,
    ));

    let catalog = match RouteCatalog::from_file(&config.route_file) {
        Ok(catalog) => {
            info!(routes = catalog.len(), file = %config.route_file, "route catalog loaded");
            catalog
        }
        Err(err) => {
            warn!(error = %err, file = %config.route_file, "no route catalog; simulation is idle");
            RouteCatalog::default()
        }
    };
    let simulator = Arc::new(LocationSimulator::new(
        catalog,
        store.clone(),
        broadcaster.clone(),
        metrics.clone(),
        Duration::from_secs(config.tick_interval_secs),
        config.missing_rider_policy,
    ));

    info!(
        radius_km = config.assignment_radius_km,
        tick_secs = config.tick_interval_secs,
        "dispatch engine started"
    );

    // Every event, logged as the JSON an external sink would receive.
    let mut events = broadcaster.stream();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Ok(json) = serde_json::to_string(&event) {
                info!(event = %json, "dispatch event");
            }
        }
    });

    seed_demo_data(store.as_ref(), &engine).await?;

    let resumed = simulator.restart_all().await?;
    info!(resumed, "routes activated for busy riders");

    let sim = simulator.clone();
    tokio::spawn(async move { sim.run().await });

    let sweep_engine = engine.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            if let Err(err) = sweep_engine.report_delays(Utc::now()) {
                error!(error = %err, "delay sweep failed");
            }
        }
    });

    shutdown_signal().await;
    info!("dispatch engine shutting down");
    Ok(())
}

/// Two riders on shift near City Hall, one off duty, and two orders that
/// assignment picks up immediately. Rider ids are fixed so the route file
/// can reference them.
async fn seed_demo_data(
    store: &dyn DataGateway,
    engine: &DispatchEngine,
) -> Result<(), DispatchError> {
    let riders = [
        demo_rider(
            "a3e1c9d4-7b42-4f6e-8a15-2d9c01b7f330",
            "Kim Minjun",
            "010-2345-1001",
            "kim.minjun@example.com",
            VehicleClass::Motorcycle,
            RiderStatus::Available,
            Some(GeoPoint {
                lat: 37.5665,
                lon: 126.9780,
            }),
        )?,
        demo_rider(
            "5f8e2b16-9d4c-4a73-b081-7c3a94e6d215",
            "Lee Seoyeon",
            "010-2345-1002",
            "lee.seoyeon@example.com",
            VehicleClass::Bike,
            RiderStatus::Available,
            Some(GeoPoint {
                lat: 37.5700,
                lon: 126.9800,
            }),
        )?,
        demo_rider(
            "e7c4a92b-1f58-4d06-9b3a-84f2c6d01e97",
            "Park Jisoo",
            "010-2345-1003",
            "park.jisoo@example.com",
            VehicleClass::Car,
            RiderStatus::Offline,
            None,
        )?,
    ];
    for rider in &riders {
        store.save_rider(rider)?;
    }
    info!(riders = riders.len(), "demo riders seeded");

    let orders = [
        DeliveryRequest {
            order_number: "ORD-10001".to_string(),
            pickup: Address {
                address: "Sejong-daero 110, Jung-gu".to_string(),
                point: GeoPoint {
                    lat: 37.5663,
                    lon: 126.9779,
                },
                contact_name: "City Hall Deli".to_string(),
                contact_phone: "02-120-0001".to_string(),
            },
            dropoff: Address {
                address: "Euljiro 281, Jung-gu".to_string(),
                point: GeoPoint {
                    lat: 37.5664,
                    lon: 127.0092,
                },
                contact_name: "Hana Kim".to_string(),
                contact_phone: "010-7788-2301".to_string(),
            },
            priority: Priority::Normal,
            weight_kg: 3.5,
        },
        DeliveryRequest {
            order_number: "ORD-10002".to_string(),
            pickup: Address {
                address: "Myeongdong-gil 26, Jung-gu".to_string(),
                point: GeoPoint {
                    lat: 37.5637,
                    lon: 126.9838,
                },
                contact_name: "Myeongdong Bakery".to_string(),
                contact_phone: "02-776-0002".to_string(),
            },
            dropoff: Address {
                address: "Itaewon-ro 177, Yongsan-gu".to_string(),
                point: GeoPoint {
                    lat: 37.5345,
                    lon: 126.9946,
                },
                contact_name: "Joon Park".to_string(),
                contact_phone: "010-9911-4502".to_string(),
            },
            priority: Priority::High,
            weight_kg: 2.0,
        },
    ];
    for order in orders {
        let (delivery, outcome) = engine.create_delivery(order).await?;
        info!(
            delivery_id = %delivery.id,
            order_number = %delivery.order_number,
            outcome = ?outcome,
            "demo delivery seeded"
        );
    }

    Ok(())
}

fn demo_rider(
    id: &str,
    name: &str,
    phone: &str,
    email: &str,
    vehicle: VehicleClass,
    status: RiderStatus,
    position: Option<GeoPoint>,
) -> Result<Rider, DispatchError> {
    let id = Uuid::parse_str(id)
        .map_err(|err| DispatchError::Internal(format!("invalid seed rider id: {err}")))?;
    let now = Utc::now();
    Ok(Rider {
        id,
        name: name.to_string(),
        phone: phone.to_string(),
        email: email.to_string(),
        status,
        vehicle,
        position,
        last_position_at: position.map(|_| now),
        shift_started_at: (status == RiderStatus::Available).then_some(now),
        shift_ended_at: None,
        total_deliveries: 0,
        average_rating: 5.0,
        registered_at: now,
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
