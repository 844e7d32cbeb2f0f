use std::env;

use crate::engine::simulator::MissingRiderPolicy;
use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub assignment_radius_km: f64,
    pub tick_interval_secs: u64,
    pub event_buffer_size: usize,
    pub route_file: String,
    pub missing_rider_policy: MissingRiderPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            assignment_radius_km: parse_or_default("ASSIGNMENT_RADIUS_KM", 5.0)?,
            tick_interval_secs: parse_or_default("TICK_INTERVAL_SECS", 5)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            route_file: env::var("ROUTE_FILE").unwrap_or_else(|_| "data/rider-routes.json".to_string()),
            missing_rider_policy: parse_or_default("MISSING_RIDER_POLICY", MissingRiderPolicy::Keep)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
