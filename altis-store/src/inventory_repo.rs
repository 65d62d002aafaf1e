use altis_core::search::parse_local_datetime;
use altis_core::{InventoryFlight, InventoryStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::error::Error;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read inventory file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse inventory file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Internal inventory loaded once from a JSON array of `InventoryFlight` rows.
/// Read-only after load, so it is shared across searches without locking.
pub struct JsonInventoryStore {
    flights: Vec<InventoryFlight>,
}

impl JsonInventoryStore {
    pub fn from_flights(flights: Vec<InventoryFlight>) -> Self {
        Self { flights }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StoreError::Io { path: shown.clone(), source })?;
        let flights: Vec<InventoryFlight> = serde_json::from_str(&raw)
            .map_err(|source| StoreError::Parse { path: shown.clone(), source })?;

        info!("Loaded {} inventory flights from {}", flights.len(), shown);
        Ok(Self { flights })
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

#[async_trait]
impl InventoryStore for JsonInventoryStore {
    async fn find_departures(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        min_seats: u32,
    ) -> Result<Vec<InventoryFlight>, Box<dyn Error + Send + Sync>> {
        let matches: Vec<InventoryFlight> = self
            .flights
            .iter()
            .filter(|f| f.origin_airport_code.eq_ignore_ascii_case(origin))
            .filter(|f| f.destination_airport_code.eq_ignore_ascii_case(destination))
            .filter(|f| {
                parse_local_datetime(&f.departure_time)
                    .map(|dt| dt.date() == date)
                    .unwrap_or(false)
            })
            .filter(|f| f.remaining_seats >= min_seats)
            .cloned()
            .collect();

        debug!(
            "Inventory lookup {} -> {} on {}: {} candidates",
            origin,
            destination,
            date,
            matches.len()
        );
        Ok(matches)
    }
}
