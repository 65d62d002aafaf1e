use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::decode::{lenient_string, null_as_default};
use crate::http::{TransientClient, UpstreamError};
use crate::retry::{with_retry, RetryPolicy};

const AUTOCOMPLETE_PATH: &str = "/api/v1/flights/searchAirport";

#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    #[error("No place matches \"{0}\"")]
    NotFound(String),

    #[error("No usable place identifier for \"{0}\"")]
    Resolution(String),

    #[error("Place lookup for \"{query}\" failed: {source}")]
    Upstream {
        query: String,
        #[source]
        source: UpstreamError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceKind {
    Airport,
    City,
    Other,
}

/// One autocomplete suggestion, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceCandidate {
    pub kind: PlaceKind,
    /// Upper-cased place code (`JFK`, `NYCA`).
    pub code: Option<String>,
    /// Code the flight search endpoint expects, when it differs from `code`.
    pub flight_code: Option<String>,
    pub entity_id: Option<String>,
    pub name: String,
}

/// Identifiers the search endpoint needs for one end of a leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlace {
    pub sky_id: String,
    pub entity_id: String,
    pub name: String,
}

impl PlaceCandidate {
    fn resolved(&self) -> Option<ResolvedPlace> {
        let sky_id = self.flight_code.clone().or_else(|| self.code.clone())?;
        let entity_id = self.entity_id.clone()?;
        Some(ResolvedPlace {
            sky_id,
            entity_id,
            name: self.name.clone(),
        })
    }

    fn matches_exactly(&self, query: &str) -> bool {
        self.code.as_deref() == Some(query) || self.flight_code.as_deref() == Some(query)
    }

    /// Equal, prefix or suffix match. The match is also widened so a
    /// short query such as `NYC` accepts a longer city code like `NYCA`.
    fn matches_city(&self, query: &str) -> bool {
        match self.code.as_deref() {
            Some(code) if !code.is_empty() => {
                code == query
                    || query.starts_with(code)
                    || code.starts_with(query)
                    || query.ends_with(code)
            }
            _ => false,
        }
    }
}

/// Pick the best candidate for `query`, in priority order:
/// 1. an airport whose code (or flight-search code) equals the query,
/// 2. the first airport,
/// 3. a city whose code equals, prefixes or suffix-matches the query
///    (or extends a shorter query),
/// 4. the first usable candidate of any kind.
///
/// Candidates without the identifiers the search call needs are skipped.
pub fn select_place(query: &str, candidates: &[PlaceCandidate]) -> Result<ResolvedPlace, PlaceError> {
    if candidates.is_empty() {
        return Err(PlaceError::NotFound(query.to_string()));
    }

    let wanted = query.trim().to_uppercase();
    let usable: Vec<(&PlaceCandidate, ResolvedPlace)> = candidates
        .iter()
        .filter_map(|c| c.resolved().map(|r| (c, r)))
        .collect();

    if usable.is_empty() {
        return Err(PlaceError::Resolution(query.to_string()));
    }

    let airports = || usable.iter().filter(|(c, _)| c.kind == PlaceKind::Airport);

    if let Some((_, place)) = airports().find(|(c, _)| c.matches_exactly(&wanted)) {
        debug!(query, sky_id = %place.sky_id, "Exact airport match");
        return Ok(place.clone());
    }
    if let Some((_, place)) = airports().next() {
        debug!(query, sky_id = %place.sky_id, "Falling back to first airport");
        return Ok(place.clone());
    }
    if let Some((_, place)) = usable
        .iter()
        .find(|(c, _)| c.kind == PlaceKind::City && c.matches_city(&wanted))
    {
        debug!(query, sky_id = %place.sky_id, "City match");
        return Ok(place.clone());
    }

    let (_, first) = &usable[0];
    debug!(query, sky_id = %first.sky_id, "Using first suggestion");
    Ok(first.clone())
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct AutocompleteEnvelope {
    #[serde(deserialize_with = "null_as_default")]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawPlace {
    #[serde(deserialize_with = "lenient_string")]
    sky_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    entity_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    presentation: RawPresentation,
    #[serde(deserialize_with = "null_as_default")]
    navigation: RawNavigation,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawPresentation {
    #[serde(deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    suggestion_title: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawNavigation {
    #[serde(deserialize_with = "lenient_string")]
    entity_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    entity_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    localized_name: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    relevant_flight_params: RawFlightParams,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawFlightParams {
    #[serde(deserialize_with = "lenient_string")]
    sky_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    entity_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    flight_place_type: Option<String>,
}

impl From<RawPlace> for PlaceCandidate {
    fn from(raw: RawPlace) -> Self {
        let nav = raw.navigation;
        let params = nav.relevant_flight_params;
        let kind_label = nav.entity_type.or(params.flight_place_type).unwrap_or_default();
        let kind = match kind_label.to_uppercase().as_str() {
            "AIRPORT" => PlaceKind::Airport,
            "CITY" => PlaceKind::City,
            _ => PlaceKind::Other,
        };
        let upper = |s: String| s.trim().to_uppercase();

        PlaceCandidate {
            kind,
            code: raw.sky_id.map(upper),
            flight_code: params.sky_id.map(upper),
            entity_id: params.entity_id.or(nav.entity_id).or(raw.entity_id),
            name: nav
                .localized_name
                .or(raw.presentation.suggestion_title)
                .or(raw.presentation.title)
                .unwrap_or_default(),
        }
    }
}

/// Decode an autocomplete payload entry by entry; an entry of the wrong shape
/// becomes an unusable candidate instead of failing the whole list.
fn decode_candidates(envelope: AutocompleteEnvelope) -> Vec<PlaceCandidate> {
    envelope
        .data
        .into_iter()
        .map(|entry| serde_json::from_value::<RawPlace>(entry).unwrap_or_default().into())
        .collect()
}

// ============================================================================
// Resolver
// ============================================================================

pub struct PlaceResolver {
    client: Arc<TransientClient>,
    locale: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl PlaceResolver {
    pub fn new(client: Arc<TransientClient>, locale: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            locale: locale.into(),
            timeout,
            retry: RetryPolicy::new(2, Duration::from_millis(300)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn candidates(&self, query: &str) -> Result<Vec<PlaceCandidate>, UpstreamError> {
        let params = [("query", query.trim().to_string()), ("locale", self.locale.clone())];
        let envelope: AutocompleteEnvelope = with_retry(&self.retry, "place autocomplete", |_| {
            self.client.get_json(AUTOCOMPLETE_PATH, &params, self.timeout)
        })
        .await?;
        Ok(decode_candidates(envelope))
    }

    pub async fn resolve(&self, query: &str) -> Result<ResolvedPlace, PlaceError> {
        let candidates = self
            .candidates(query)
            .await
            .map_err(|source| PlaceError::Upstream { query: query.to_string(), source })?;
        select_place(query, &candidates)
    }

    /// Resolve both ends of a leg concurrently.
    pub async fn resolve_pair(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<(ResolvedPlace, ResolvedPlace), PlaceError> {
        tokio::try_join!(self.resolve(origin), self.resolve(destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{MockReply, MockTransport};
    use serde_json::json;
    use test_case::test_case;

    fn candidate(kind: PlaceKind, code: &str, entity: Option<&str>) -> PlaceCandidate {
        PlaceCandidate {
            kind,
            code: Some(code.to_string()),
            flight_code: None,
            entity_id: entity.map(|e| e.to_string()),
            name: code.to_string(),
        }
    }

    fn sky_entry(sky_id: &str, entity_id: &str, entity_type: &str) -> Value {
        json!({
            "skyId": sky_id,
            "entityId": entity_id,
            "presentation": { "title": sky_id, "suggestionTitle": format!("{} ({})", sky_id, sky_id) },
            "navigation": {
                "entityId": entity_id,
                "entityType": entity_type,
                "localizedName": sky_id,
                "relevantFlightParams": { "skyId": sky_id, "entityId": entity_id, "flightPlaceType": entity_type }
            }
        })
    }

    #[test]
    fn test_exact_airport_beats_earlier_airports() {
        let candidates = vec![
            candidate(PlaceKind::City, "NYCA", Some("1")),
            candidate(PlaceKind::Airport, "EWR", Some("2")),
            candidate(PlaceKind::Airport, "JFK", Some("3")),
        ];
        let place = select_place("jfk", &candidates).unwrap();
        assert_eq!(place.sky_id, "JFK");
        assert_eq!(place.entity_id, "3");
    }

    #[test]
    fn test_nested_flight_code_counts_as_exact() {
        let mut airport = candidate(PlaceKind::Airport, "XXX", Some("9"));
        airport.flight_code = Some("LGA".to_string());
        let candidates = vec![candidate(PlaceKind::Airport, "JFK", Some("1")), airport];

        let place = select_place("LGA", &candidates).unwrap();
        assert_eq!(place.entity_id, "9");
        assert_eq!(place.sky_id, "LGA");
    }

    #[test]
    fn test_first_airport_is_fuzzy_fallback() {
        let candidates = vec![
            candidate(PlaceKind::City, "LOND", Some("1")),
            candidate(PlaceKind::Airport, "LHR", Some("2")),
            candidate(PlaceKind::Airport, "LGW", Some("3")),
        ];
        assert_eq!(select_place("London", &candidates).unwrap().sky_id, "LHR");
    }

    #[test_case("NYCA", "NYCA" ; "equal")]
    #[test_case("NYC", "NYCA" ; "widened short query prefixes longer code")]
    #[test_case("PARIS", "PARI" ; "code prefixes query")]
    #[test_case("XPAR", "PAR" ; "code suffixes query")]
    fn test_city_matching(query: &str, code: &str) {
        let candidates = vec![
            candidate(PlaceKind::Other, "ZZZ", Some("0")),
            candidate(PlaceKind::City, code, Some("7")),
        ];
        assert_eq!(select_place(query, &candidates).unwrap().entity_id, "7");
    }

    #[test]
    fn test_last_resort_is_first_usable_candidate() {
        let candidates = vec![
            candidate(PlaceKind::Other, "QQQ", None),
            candidate(PlaceKind::Other, "RRR", Some("5")),
            candidate(PlaceKind::City, "SSS", Some("6")),
        ];
        assert_eq!(select_place("Nowhere", &candidates).unwrap().entity_id, "5");
    }

    #[test]
    fn test_empty_and_malformed_lists() {
        assert!(matches!(select_place("JFK", &[]), Err(PlaceError::NotFound(_))));

        let malformed = vec![candidate(PlaceKind::Airport, "JFK", None)];
        assert!(matches!(select_place("JFK", &malformed), Err(PlaceError::Resolution(_))));
    }

    #[test]
    fn test_decoding_tolerates_bad_entries() {
        let envelope = AutocompleteEnvelope {
            data: vec![json!("garbage"), sky_entry("JFK", "95565058", "AIRPORT")],
        };
        let candidates = decode_candidates(envelope);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].entity_id, None);
        assert_eq!(candidates[1].kind, PlaceKind::Airport);
        assert_eq!(candidates[1].code.as_deref(), Some("JFK"));
    }

    #[tokio::test]
    async fn test_resolve_pair_queries_both_ends() {
        let mock = Arc::new(MockTransport::new());
        mock.enqueue(
            "/api/v1/flights/searchAirport?query=Havana",
            MockReply::ok(json!({ "status": true, "data": [sky_entry("HAV", "95673330", "AIRPORT")] })),
        );
        mock.enqueue(
            "/api/v1/flights/searchAirport?query=IST",
            MockReply::ok(json!({ "status": true, "data": [
                sky_entry("SAW", "95673599", "AIRPORT"),
                sky_entry("IST", "128667143", "AIRPORT")
            ] })),
        );
        let client = Arc::new(TransientClient::new(mock.clone(), "https://sky.test"));
        let resolver = PlaceResolver::new(client, "en-US", Duration::from_secs(5));

        let (origin, destination) = resolver.resolve_pair("Havana", "IST").await.unwrap();

        assert_eq!(origin.sky_id, "HAV");
        assert_eq!(destination.entity_id, "128667143");
        assert_eq!(mock.call_count(AUTOCOMPLETE_PATH), 2);
    }

    #[tokio::test]
    async fn test_resolve_reports_not_found() {
        let mock = Arc::new(MockTransport::new());
        mock.enqueue(AUTOCOMPLETE_PATH, MockReply::ok(json!({ "status": true, "data": [] })));
        let client = Arc::new(TransientClient::new(mock, "https://sky.test"));
        let resolver = PlaceResolver::new(client, "en-US", Duration::from_secs(5));

        assert!(matches!(resolver.resolve("Atlantis").await, Err(PlaceError::NotFound(_))));
    }
}
