use serde::{Deserialize, Serialize};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

use crate::CoreError;

/// Largest party a single search may ask for.
pub const MAX_PASSENGERS: u32 = 9;

// ============================================================================
// Request Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    pub legs: Vec<Leg>,
    pub passengers: u32,
    #[serde(default)]
    pub filters: Option<SearchFilters>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub cabin_class: CabinClass,
}

fn default_currency() -> String { "USD".to_string() }

/// One directional origin -> destination request. Places are free-form
/// (IATA code or city name) and resolved per provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Leg {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate, // Just date, providers pick the times
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchFilters {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub max_stops: Option<u32>,
    #[serde(default)]
    pub airline_codes: Vec<String>,
    pub departure_time_range: Option<TimeRange>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    pub from: NaiveTime,
    pub to: NaiveTime,
}

impl TimeRange {
    /// Inclusive on both ends. A window whose `from` is after `to` wraps midnight.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.from <= self.to {
            time >= self.from && time <= self.to
        } else {
            time >= self.from || time <= self.to
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinClass::Economy => "economy",
            CabinClass::PremiumEconomy => "premium_economy",
            CabinClass::Business => "business",
            CabinClass::First => "first",
        }
    }
}

impl SearchRequest {
    /// Structural checks run before any provider is contacted.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.legs.is_empty() {
            return Err(CoreError::RequestInvalid("at least one leg is required".to_string()));
        }
        if self.passengers < 1 {
            return Err(CoreError::RequestInvalid("passengers must be at least 1".to_string()));
        }
        if self.passengers > MAX_PASSENGERS {
            return Err(CoreError::RequestInvalid(format!(
                "passengers must be at most {}",
                MAX_PASSENGERS
            )));
        }

        for (index, leg) in self.legs.iter().enumerate() {
            if leg.origin.trim().is_empty() || leg.destination.trim().is_empty() {
                return Err(CoreError::RequestInvalid(format!(
                    "leg {} needs both an origin and a destination",
                    index
                )));
            }
        }

        if let Some(filters) = &self.filters {
            let negative = |v: Option<f64>| v.map(|p| p < 0.0 || p.is_nan()).unwrap_or(false);
            if negative(filters.min_price) || negative(filters.max_price) {
                return Err(CoreError::RequestInvalid("price bounds must be non-negative".to_string()));
            }
            if let (Some(min), Some(max)) = (filters.min_price, filters.max_price) {
                if min > max {
                    return Err(CoreError::RequestInvalid(format!(
                        "min_price {} exceeds max_price {}",
                        min, max
                    )));
                }
            }
        }

        Ok(())
    }

    /// Split the request into one owned unit of work per leg.
    pub fn leg_searches(&self) -> Vec<LegSearch> {
        self.legs
            .iter()
            .enumerate()
            .map(|(leg_index, leg)| LegSearch {
                leg_index,
                leg: leg.clone(),
                passengers: self.passengers,
                filters: self.filters.clone(),
                currency: self.currency.clone(),
                cabin_class: self.cabin_class,
            })
            .collect()
    }
}

/// Everything a provider needs to search a single leg.
#[derive(Debug, Clone, PartialEq)]
pub struct LegSearch {
    pub leg_index: usize,
    pub leg: Leg,
    pub passengers: u32,
    pub filters: Option<SearchFilters>,
    pub currency: String,
    pub cabin_class: CabinClass,
}

impl LegSearch {
    pub fn max_stops(&self) -> Option<u32> {
        self.filters.as_ref().and_then(|f| f.max_stops)
    }
}

// ============================================================================
// Canonical Offer Models
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    SkyScrapper,
    Duffel,
    Synthetic,
    Inventory,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::SkyScrapper,
        ProviderId::Duffel,
        ProviderId::Synthetic,
        ProviderId::Inventory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::SkyScrapper => "sky_scrapper",
            ProviderId::Duffel => "duffel",
            ProviderId::Synthetic => "synthetic",
            ProviderId::Inventory => "inventory",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| CoreError::UnknownProvider(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Airline {
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub airport_code: String,
    pub layover_minutes: u32,
}

/// A single priced offer for one leg, normalized across providers.
///
/// `id` is stable for a given provider offer so callers can deduplicate on
/// `(provider_id, id)`. `stops_count` is `None` when the upstream did not say;
/// when `stops` is populated its length equals `stops_count`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    pub id: String,
    pub price: f64,
    pub currency: String,
    pub duration_minutes: u32,
    pub origin_iata: String,
    pub destination_iata: String,
    pub departure: String,
    pub arrival: String,
    pub airline: Airline,
    pub flight_number: String,
    pub stops_count: Option<u32>,
    #[serde(default)]
    pub stops: Vec<Stop>,
    pub provider_id: ProviderId,
    pub leg_index: usize,
}

impl Flight {
    /// Local departure time, if the provider gave a parseable timestamp.
    pub fn departure_time(&self) -> Option<NaiveTime> {
        parse_local_datetime(&self.departure).map(|dt| dt.time())
    }
}

/// Parse the timestamp shapes upstreams send: naive ISO-8601 with or without
/// seconds, or RFC 3339 with an offset (the local wall time is kept).
pub fn parse_local_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Minutes between two upstream timestamps, if both parse and are ordered.
pub fn minutes_between(from: &str, to: &str) -> Option<u32> {
    let start = parse_local_datetime(from)?;
    let end = parse_local_datetime(to)?;
    let minutes = (end - start).num_minutes();
    u32::try_from(minutes).ok()
}

// ============================================================================
// Response Models
// ============================================================================

/// A leg-scoped failure surfaced to the caller instead of being swallowed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegFailure {
    pub provider: ProviderId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegResult {
    pub leg_index: usize,
    pub flights: Vec<Flight>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<LegFailure>,
}

impl LegResult {
    pub fn empty(leg_index: usize) -> Self {
        Self {
            leg_index,
            flights: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn with_flights(leg_index: usize, flights: Vec<Flight>) -> Self {
        Self {
            leg_index,
            flights,
            failures: Vec::new(),
        }
    }

    pub fn failed(leg_index: usize, provider: ProviderId, message: impl Into<String>) -> Self {
        Self {
            leg_index,
            flights: Vec::new(),
            failures: vec![LegFailure {
                provider,
                message: message.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub legs: Vec<LegResult>,
}

// ============================================================================
// Polling Session
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Complete,
}

/// Held only while one leg is being searched against a polling upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: Option<String>,
    pub status: SessionStatus,
}

impl SessionContext {
    /// Polling only makes sense with a session to poll and an unfinished search.
    pub fn needs_polling(&self) -> bool {
        self.status == SessionStatus::Pending
            && self.session_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}
