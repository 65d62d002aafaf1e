//! Two-phase polling upstream (Sky Scrapper on RapidAPI).
//!
//! A search returns whatever itineraries are ready plus a session to poll for
//! more. The first non-empty page is the floor: later polls may replace it
//! with an equal or larger page but never with a smaller one.

mod mapping;

use altis_core::{
    Flight, FlightProvider, LegResult, LegSearch, ProviderId, SessionContext, SessionStatus,
};
use altis_store::app_config::SkyScrapperConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decode::{lenient_string, lenient_u32, null_as_default};
use crate::http::{HttpTransport, TransientClient, UpstreamError};
use crate::places::{PlaceResolver, ResolvedPlace};
use crate::retry::{with_retry, RetryPolicy};
use crate::{finish_leg, SupplierError};

const SEARCH_PATH: &str = "/api/v2/flights/searchFlights";
const POLL_PATH: &str = "/api/v2/flights/searchIncomplete";

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SearchEnvelope {
    status: Option<Value>,
    message: Option<Value>,
    #[serde(deserialize_with = "null_as_default")]
    data: SearchData,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SearchData {
    #[serde(deserialize_with = "null_as_default")]
    context: RawContext,
    #[serde(deserialize_with = "null_as_default")]
    itineraries: Vec<Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawContext {
    #[serde(deserialize_with = "lenient_string")]
    status: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    session_id: Option<String>,
    #[serde(deserialize_with = "lenient_u32")]
    total_results: Option<u32>,
}

/// One decoded response page.
#[derive(Debug)]
struct SearchPage {
    context: SessionContext,
    itineraries: Vec<Value>,
}

impl SearchEnvelope {
    fn into_page(self) -> Result<SearchPage, UpstreamError> {
        // RapidAPI reports logical failures with HTTP 200 and `status: false`
        if self.status == Some(Value::Bool(false)) && self.data.itineraries.is_empty() {
            let message = match self.message {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => "upstream reported an unsuccessful search".to_string(),
            };
            return Err(UpstreamError::Status { status: 200, message });
        }

        let context = self.data.context;
        let status = match context.status.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("complete") => SessionStatus::Complete,
            // "incomplete" and anything unrecognized
            _ => SessionStatus::Pending,
        };
        debug!(
            status = ?status,
            itineraries = self.data.itineraries.len(),
            total_results = context.total_results,
            "Decoded search page"
        );
        Ok(SearchPage {
            context: SessionContext { session_id: context.session_id, status },
            itineraries: self.data.itineraries,
        })
    }
}

struct SkyScrapperApi {
    client: Arc<TransientClient>,
    places: PlaceResolver,
}

pub struct SkyScrapperProvider {
    api: Option<SkyScrapperApi>,
    config: SkyScrapperConfig,
}

impl SkyScrapperProvider {
    /// Without an API key the provider stays registered but every leg comes
    /// back empty.
    pub fn new(config: SkyScrapperConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let api = config.api_key().map(|key| {
            let client = Arc::new(
                TransientClient::new(transport, config.base_url())
                    .with_header("x-rapidapi-key", key)
                    .with_header("x-rapidapi-host", config.host.clone()),
            );
            SkyScrapperApi {
                places: PlaceResolver::new(client.clone(), config.locale.clone(), config.place_timeout()),
                client,
            }
        });
        Self { api, config }
    }

    pub fn is_configured(&self) -> bool {
        self.api.is_some()
    }

    async fn run_leg(&self, api: &SkyScrapperApi, search: &LegSearch) -> Result<Vec<Flight>, SupplierError> {
        let (origin, destination) = api
            .places
            .resolve_pair(&search.leg.origin, &search.leg.destination)
            .await?;

        let first = self.initial_search(api, &origin, &destination, search).await?;
        if first.itineraries.is_empty() {
            info!(leg_index = search.leg_index, "Initial search returned nothing, not polling");
            return Ok(Vec::new());
        }

        let itineraries = if first.context.needs_polling() {
            self.poll(api, first, search).await
        } else {
            first.itineraries
        };

        Ok(mapping::to_flights(itineraries, search))
    }

    async fn initial_search(
        &self,
        api: &SkyScrapperApi,
        origin: &ResolvedPlace,
        destination: &ResolvedPlace,
        search: &LegSearch,
    ) -> Result<SearchPage, UpstreamError> {
        let mut query = vec![
            ("originSkyId", origin.sky_id.clone()),
            ("destinationSkyId", destination.sky_id.clone()),
            ("originEntityId", origin.entity_id.clone()),
            ("destinationEntityId", destination.entity_id.clone()),
            ("date", search.leg.departure_date.to_string()),
            ("adults", search.passengers.to_string()),
            ("cabinClass", search.cabin_class.as_str().to_string()),
        ];
        query.extend(self.market_params(search));

        let retry = RetryPolicy::new(2, Duration::from_millis(400));
        let envelope: SearchEnvelope = with_retry(&retry, "sky_scrapper search", |_| {
            api.client.get_json(SEARCH_PATH, &query, self.config.initial_timeout())
        })
        .await?;
        envelope.into_page()
    }

    /// Bounded polling phase. Never fails: a poll error ends polling and the
    /// best page held so far is returned.
    async fn poll(&self, api: &SkyScrapperApi, floor: SearchPage, search: &LegSearch) -> Vec<Value> {
        let budget = self.config.poll_budget();
        let started = Instant::now();
        let mut session_id = floor.context.session_id.unwrap_or_default();
        let mut best = floor.itineraries;

        for attempt in 1..=self.config.poll_max_attempts {
            let wait = self.config.poll_interval() * attempt;
            let remaining = budget.saturating_sub(started.elapsed());
            if wait >= remaining {
                debug!(attempt, "Poll budget exhausted");
                break;
            }
            tokio::time::sleep(wait).await;

            let call_timeout = self
                .config
                .poll_timeout()
                .min(budget.saturating_sub(started.elapsed()));
            let mut query = vec![("sessionId", session_id.clone())];
            query.extend(self.market_params(search));

            let page = match api
                .client
                .get_json::<SearchEnvelope>(POLL_PATH, &query, call_timeout)
                .await
                .and_then(SearchEnvelope::into_page)
            {
                Ok(page) => page,
                Err(err) => {
                    warn!(attempt, held = best.len(), error = %err, "Poll failed, keeping best result");
                    break;
                }
            };

            let complete = page.context.status == SessionStatus::Complete;
            if page.itineraries.len() >= best.len() {
                debug!(attempt, from = best.len(), to = page.itineraries.len(), "Poll improved result");
                best = page.itineraries;
            } else {
                debug!(attempt, held = best.len(), got = page.itineraries.len(), "Discarding smaller poll result");
            }
            if let Some(next) = page.context.session_id.filter(|s| !s.is_empty()) {
                session_id = next;
            }
            if complete {
                break;
            }
        }

        best
    }

    fn market_params(&self, search: &LegSearch) -> [(&'static str, String); 3] {
        [
            ("currency", search.currency.clone()),
            ("market", self.config.market.clone()),
            ("countryCode", self.config.market.clone()),
        ]
    }
}

#[async_trait]
impl FlightProvider for SkyScrapperProvider {
    fn id(&self) -> ProviderId {
        ProviderId::SkyScrapper
    }

    async fn search_leg(&self, search: LegSearch, cancel: CancellationToken) -> LegResult {
        let Some(api) = &self.api else {
            debug!(leg_index = search.leg_index, "No API key configured, skipping");
            return LegResult::empty(search.leg_index);
        };

        let deadline = self.config.leg_timeout();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SupplierError::Cancelled),
            result = tokio::time::timeout(deadline, self.run_leg(api, &search)) => {
                result.unwrap_or(Err(SupplierError::LegTimeout(deadline)))
            }
        };
        finish_leg(ProviderId::SkyScrapper, search.leg_index, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{MockReply, MockTransport};
    use altis_core::{Leg, SearchRequest};
    use altis_store::Secret;
    use chrono::NaiveDate;
    use serde_json::json;

    const AUTOCOMPLETE: &str = "/api/v1/flights/searchAirport";

    fn config() -> SkyScrapperConfig {
        SkyScrapperConfig {
            api_key: Some(Secret::from("rapid-test-key")),
            base_url: Some("https://sky.test".to_string()),
            ..Default::default()
        }
    }

    fn place(code: &str, entity: &str) -> Value {
        json!({
            "skyId": code,
            "entityId": entity,
            "navigation": {
                "entityId": entity,
                "entityType": "AIRPORT",
                "localizedName": code,
                "relevantFlightParams": { "skyId": code, "entityId": entity, "flightPlaceType": "AIRPORT" }
            }
        })
    }

    fn itinerary(id: &str, price: f64) -> Value {
        json!({
            "id": id,
            "price": { "raw": price },
            "legs": [{
                "origin": { "displayCode": "HAV" },
                "destination": { "displayCode": "IST" },
                "durationInMinutes": 900,
                "stopCount": 0,
                "departure": "2026-03-10T10:00:00",
                "arrival": "2026-03-11T07:00:00",
                "carriers": { "marketing": [{ "alternateId": "TK", "name": "Turkish Airlines" }] },
                "segments": [{ "flightNumber": "184", "marketingCarrier": { "alternateId": "TK" } }]
            }]
        })
    }

    fn page(status: &str, session: Option<&str>, count: usize) -> Value {
        let itineraries: Vec<Value> = (0..count)
            .map(|i| itinerary(&format!("it-{}", i), 400.0 + i as f64))
            .collect();
        json!({
            "status": true,
            "data": {
                "context": { "status": status, "sessionId": session, "totalResults": count },
                "itineraries": itineraries
            }
        })
    }

    fn mock_with_places() -> Arc<MockTransport> {
        let mock = Arc::new(MockTransport::new());
        mock.enqueue(&format!("{}?query=HAV", AUTOCOMPLETE), MockReply::ok(json!({ "data": [place("HAV", "95673330")] })));
        mock.enqueue(&format!("{}?query=IST", AUTOCOMPLETE), MockReply::ok(json!({ "data": [place("IST", "128667143")] })));
        mock
    }

    fn search() -> LegSearch {
        let request = SearchRequest {
            legs: vec![Leg {
                origin: "HAV".to_string(),
                destination: "IST".to_string(),
                departure_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            }],
            passengers: 2,
            filters: None,
            currency: "USD".to_string(),
            cabin_class: Default::default(),
        };
        request.leg_searches().remove(0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_keeps_initial_itineraries() {
        let mock = mock_with_places();
        mock.enqueue(SEARCH_PATH, MockReply::ok(page("incomplete", Some("sess-1"), 3)));
        mock.enqueue(POLL_PATH, MockReply::status(500, json!({ "message": "boom" })));
        let provider = SkyScrapperProvider::new(config(), mock.clone());

        let result = provider.search_leg(search(), CancellationToken::new()).await;

        assert_eq!(result.flights.len(), 3);
        assert!(result.failures.is_empty());
        assert_eq!(mock.call_count(POLL_PATH), 1);

        let initial = mock.calls().into_iter().find(|c| c.path() == SEARCH_PATH).unwrap();
        assert_eq!(initial.query_value("originEntityId"), Some("95673330"));
        assert_eq!(initial.query_value("adults"), Some("2"));
        assert_eq!(initial.header("x-rapidapi-key"), Some("rapid-test-key"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_smaller_poll_never_replaces_floor() {
        let mock = mock_with_places();
        mock.enqueue(SEARCH_PATH, MockReply::ok(page("incomplete", Some("sess-1"), 3)));
        mock.enqueue(POLL_PATH, MockReply::ok(page("incomplete", Some("sess-1"), 1)))
            .enqueue(POLL_PATH, MockReply::ok(page("complete", Some("sess-1"), 5)));
        let provider = SkyScrapperProvider::new(config(), mock.clone());

        let result = provider.search_leg(search(), CancellationToken::new()).await;

        assert_eq!(result.flights.len(), 5);
        assert_eq!(mock.call_count(POLL_PATH), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regressed_final_poll_is_discarded() {
        let mock = mock_with_places();
        mock.enqueue(SEARCH_PATH, MockReply::ok(page("incomplete", Some("sess-1"), 3)));
        mock.enqueue(POLL_PATH, MockReply::ok(page("complete", Some("sess-1"), 2)));
        let provider = SkyScrapperProvider::new(config(), mock.clone());

        let result = provider.search_leg(search(), CancellationToken::new()).await;

        assert_eq!(result.flights.len(), 3);
        assert_eq!(mock.call_count(POLL_PATH), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_initial_result_skips_polling() {
        let mock = mock_with_places();
        mock.enqueue(SEARCH_PATH, MockReply::ok(page("complete", Some("sess-1"), 2)));
        let provider = SkyScrapperProvider::new(config(), mock.clone());

        let result = provider.search_leg(search(), CancellationToken::new()).await;

        assert_eq!(result.flights.len(), 2);
        assert_eq!(mock.call_count(POLL_PATH), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_currency_drives_market_params() {
        let mock = mock_with_places();
        mock.enqueue(SEARCH_PATH, MockReply::ok(page("complete", None, 1)));
        let provider = SkyScrapperProvider::new(config(), mock.clone());
        let mut leg = search();
        leg.currency = "EUR".to_string();

        let result = provider.search_leg(leg, CancellationToken::new()).await;

        assert_eq!(result.flights[0].currency, "EUR");
        let initial = mock.calls().into_iter().find(|c| c.path() == SEARCH_PATH).unwrap();
        assert_eq!(initial.query_value("currency"), Some("EUR"));
        assert_eq!(initial.query_value("market"), Some("US"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_initial_result_is_never_polled() {
        let mock = mock_with_places();
        mock.enqueue(SEARCH_PATH, MockReply::ok(page("incomplete", Some("sess-1"), 0)));
        let provider = SkyScrapperProvider::new(config(), mock.clone());

        let result = provider.search_leg(search(), CancellationToken::new()).await;

        assert!(result.flights.is_empty());
        assert_eq!(mock.call_count(POLL_PATH), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_attempts_are_bounded() {
        let mock = mock_with_places();
        mock.enqueue(SEARCH_PATH, MockReply::ok(page("incomplete", Some("sess-1"), 1)));
        mock.enqueue(POLL_PATH, MockReply::ok(page("incomplete", Some("sess-1"), 1)));
        let provider = SkyScrapperProvider::new(
            SkyScrapperConfig { poll_max_attempts: 10, ..config() },
            mock.clone(),
        );

        let result = provider.search_leg(search(), CancellationToken::new()).await;

        assert_eq!(result.flights.len(), 1);
        // waits of 1s and 2s fit in the 6s budget, a 3s wait does not
        assert_eq!(mock.call_count(POLL_PATH), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_leg_returns_empty_after_outer_timeout() {
        let mock = mock_with_places();
        mock.enqueue(SEARCH_PATH, MockReply::Hang);
        let provider = SkyScrapperProvider::new(
            SkyScrapperConfig { leg_timeout_ms: 2_000, ..config() },
            mock.clone(),
        );
        let started = Instant::now();

        let result = provider.search_leg(search(), CancellationToken::new()).await;

        assert!(result.flights.is_empty());
        assert!(result.failures.is_empty());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_place_is_a_leg_failure() {
        let mock = Arc::new(MockTransport::new());
        mock.enqueue(AUTOCOMPLETE, MockReply::ok(json!({ "data": [] })));
        let provider = SkyScrapperProvider::new(config(), mock.clone());

        let result = provider.search_leg(search(), CancellationToken::new()).await;

        assert!(result.flights.is_empty());
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].provider, ProviderId::SkyScrapper);
        assert_eq!(mock.call_count(SEARCH_PATH), 0);
    }

    #[tokio::test]
    async fn test_missing_key_returns_empty_without_calls() {
        let mock = Arc::new(MockTransport::new());
        let provider = SkyScrapperProvider::new(SkyScrapperConfig::default(), mock.clone());
        assert!(!provider.is_configured());

        let result = provider.search_leg(search(), CancellationToken::new()).await;

        assert!(result.flights.is_empty());
        assert!(mock.calls().is_empty());
    }
}
