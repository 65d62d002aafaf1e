//! Single-call upstream (Duffel offer requests): one POST per leg returns
//! every offer at once.

mod mapping;

use altis_core::{Flight, FlightProvider, LegResult, LegSearch, ProviderId, MAX_PASSENGERS};
use altis_store::app_config::DuffelConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::http::{HttpTransport, TransientClient};
use crate::decode::null_as_default;
use crate::retry::{with_retry, RetryPolicy};
use crate::{finish_leg, SupplierError};

const OFFER_REQUESTS_PATH: &str = "/air/offer_requests";

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct OfferRequestEnvelope {
    #[serde(deserialize_with = "null_as_default")]
    data: OfferRequestData,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct OfferRequestData {
    id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    offers: Vec<Value>,
}

pub struct DuffelProvider {
    client: Option<TransientClient>,
    config: DuffelConfig,
    retry: RetryPolicy,
}

impl DuffelProvider {
    /// Without an access token every leg comes back empty.
    pub fn new(config: DuffelConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let client = config.access_token().map(|token| {
            TransientClient::new(transport, config.base_url.clone())
                .with_header("Authorization", format!("Bearer {}", token))
                .with_header("Duffel-Version", config.api_version.clone())
        });
        let retry = RetryPolicy::new(config.max_attempts, config.backoff_base());
        Self { client, config, retry }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    async fn run_leg(&self, client: &TransientClient, search: &LegSearch) -> Result<Vec<Flight>, SupplierError> {
        let body = offer_request_body(search);
        let query = [("return_offers", "true".to_string())];

        let envelope: OfferRequestEnvelope = with_retry(&self.retry, "duffel offer request", |_| {
            client.post_json(OFFER_REQUESTS_PATH, &query, body.clone(), self.config.timeout())
        })
        .await?;

        debug!(
            offer_request = envelope.data.id.as_deref().unwrap_or(""),
            offers = envelope.data.offers.len(),
            "Offer request answered"
        );
        Ok(mapping::to_flights(envelope.data.offers, search))
    }
}

fn offer_request_body(search: &LegSearch) -> Value {
    let party = search.passengers.clamp(1, MAX_PASSENGERS);
    let passengers: Vec<Value> = (0..party).map(|_| json!({ "type": "adult" })).collect();
    let mut data = json!({
        "slices": [{
            "origin": search.leg.origin.trim().to_uppercase(),
            "destination": search.leg.destination.trim().to_uppercase(),
            "departure_date": search.leg.departure_date.to_string(),
        }],
        "passengers": passengers,
        "cabin_class": search.cabin_class.as_str(),
    });
    if let Some(max_stops) = search.max_stops() {
        data["max_connections"] = json!(max_stops.min(2));
    }
    json!({ "data": data })
}

#[async_trait]
impl FlightProvider for DuffelProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Duffel
    }

    async fn search_leg(&self, search: LegSearch, cancel: CancellationToken) -> LegResult {
        let Some(client) = &self.client else {
            debug!(leg_index = search.leg_index, "No access token configured, skipping");
            return LegResult::empty(search.leg_index);
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SupplierError::Cancelled),
            result = self.run_leg(client, &search) => result,
        };
        finish_leg(ProviderId::Duffel, search.leg_index, outcome)
    }
}
