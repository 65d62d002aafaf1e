use altis_core::{
    minutes_between, Airline, Flight, FlightProvider, InventoryFlight, InventoryStore, LegResult,
    LegSearch, ProviderId, Stop,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{finish_leg, SupplierError};

/// Offers from the internal inventory. Rows without enough seats for the
/// whole party are never offered.
pub struct InventoryProvider {
    store: Arc<dyn InventoryStore>,
}

impl InventoryProvider {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    async fn run_leg(&self, search: &LegSearch) -> Result<Vec<Flight>, SupplierError> {
        let rows = self
            .store
            .find_departures(
                search.leg.origin.trim(),
                search.leg.destination.trim(),
                search.leg.departure_date,
                search.passengers,
            )
            .await
            .map_err(|e| SupplierError::Store(e.to_string()))?;

        Ok(rows.into_iter().map(|row| to_flight(row, search.leg_index)).collect())
    }
}

fn to_flight(row: InventoryFlight, leg_index: usize) -> Flight {
    let stops: Vec<Stop> = row
        .stop_airports
        .iter()
        .map(|code| Stop { airport_code: code.clone(), layover_minutes: 0 })
        .collect();

    Flight {
        id: row.flight_id,
        price: row.price_amount,
        currency: row.price_currency,
        duration_minutes: minutes_between(&row.departure_time, &row.arrival_time).unwrap_or(0),
        origin_iata: row.origin_airport_code,
        destination_iata: row.destination_airport_code,
        departure: row.departure_time,
        arrival: row.arrival_time,
        airline: Airline { code: row.airline_code, name: row.airline_name, logo_url: None },
        flight_number: row.flight_number,
        stops_count: Some(stops.len() as u32),
        stops,
        provider_id: ProviderId::Inventory,
        leg_index,
    }
}

#[async_trait]
impl FlightProvider for InventoryProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Inventory
    }

    async fn search_leg(&self, search: LegSearch, cancel: CancellationToken) -> LegResult {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SupplierError::Cancelled),
            result = self.run_leg(&search) => result,
        };
        finish_leg(ProviderId::Inventory, search.leg_index, outcome)
    }
}
