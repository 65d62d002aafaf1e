//! Offer sources behind the `FlightProvider` contract, plus the outbound
//! plumbing they share: the transient HTTP client, retry policy and place
//! resolution.

pub mod decode;
pub mod duffel;
pub mod http;
pub mod inventory;
pub mod places;
pub mod retry;
pub mod sky_scrapper;
pub mod synthetic;

pub use duffel::DuffelProvider;
pub use http::{HttpTransport, MockReply, MockTransport, ReqwestTransport, TransientClient, UpstreamError};
pub use inventory::InventoryProvider;
pub use places::{PlaceError, PlaceResolver, ResolvedPlace};
pub use retry::RetryPolicy;
pub use sky_scrapper::SkyScrapperProvider;
pub use synthetic::SyntheticProvider;

use altis_core::{Flight, LegResult, ProviderId};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SupplierError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Place(#[from] PlaceError),

    #[error("Inventory lookup failed: {0}")]
    Store(String),

    #[error("Leg search exceeded {0:?}")]
    LegTimeout(Duration),

    #[error("Leg search cancelled")]
    Cancelled,
}

/// Fold a provider's per-leg outcome into the never-failing `LegResult`.
///
/// Place resolution failures are surfaced on the leg; everything else is
/// logged and becomes "zero flights from this provider".
pub fn finish_leg(
    provider: ProviderId,
    leg_index: usize,
    outcome: Result<Vec<Flight>, SupplierError>,
) -> LegResult {
    match outcome {
        Ok(flights) => {
            info!(provider = %provider, leg_index, offers = flights.len(), "Leg search finished");
            LegResult::with_flights(leg_index, flights)
        }
        Err(SupplierError::Place(err)) => {
            warn!(provider = %provider, leg_index, error = %err, "Place resolution failed, leg not searchable");
            LegResult::failed(leg_index, provider, err.to_string())
        }
        Err(err) => {
            warn!(provider = %provider, leg_index, error = %err, "Provider failed for leg, returning no offers");
            LegResult::empty(leg_index)
        }
    }
}
