pub mod search;
pub mod supplier;
pub mod repository;

pub use search::{
    MAX_PASSENGERS, minutes_between, parse_local_datetime, Airline, CabinClass, Flight, Leg, LegFailure, LegResult, LegSearch, ProviderId, SearchFilters,
    SearchRequest, SearchResponse, SessionContext, SessionStatus, Stop, TimeRange,
};
pub use supplier::FlightProvider;
pub use repository::{InventoryFlight, InventoryStore};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid search request: {0}")]
    RequestInvalid(String),
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}
