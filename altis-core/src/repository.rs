use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A scheduled departure held in the internal inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryFlight {
    pub flight_id: String,
    pub flight_number: String,
    pub airline_code: String,
    pub airline_name: String,
    pub origin_airport_code: String,
    pub destination_airport_code: String,
    pub departure_time: String,
    pub arrival_time: String,
    #[serde(default)]
    pub stop_airports: Vec<String>,
    pub remaining_seats: u32,
    pub price_amount: f64,
    pub price_currency: String,
}

/// Read access to the internal flight inventory
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Departures on `date` between two airport codes with at least `min_seats` left.
    async fn find_departures(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        min_seats: u32,
    ) -> Result<Vec<InventoryFlight>, Box<dyn std::error::Error + Send + Sync>>;
}
