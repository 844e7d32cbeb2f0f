use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RouteLoadError {
    #[error("failed to read route file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse route file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    /// Seconds from route start at which this waypoint is reached.
    pub offset_seconds: u64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub rider_id: Uuid,
    pub route_name: String,
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Deserialize)]
struct RouteFile {
    routes: Vec<RouteDefinition>,
}

/// Predefined simulation routes keyed by rider id. Loaded once at startup,
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct RouteCatalog {
    routes: HashMap<Uuid, RouteDefinition>,
}

impl RouteCatalog {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RouteLoadError> {
        let raw = fs::read_to_string(path)?;
        let file: RouteFile = serde_json::from_str(&raw)?;
        Ok(Self::from_definitions(file.routes))
    }

    pub fn from_definitions(definitions: Vec<RouteDefinition>) -> Self {
        let mut routes = HashMap::new();
        // First definition wins when a rider appears twice.
        for definition in definitions {
            routes.entry(definition.rider_id).or_insert(definition);
        }
        Self { routes }
    }

    pub fn get(&self, rider_id: &Uuid) -> Option<&RouteDefinition> {
        self.routes.get(rider_id)
    }

    pub fn rider_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.routes.keys()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
