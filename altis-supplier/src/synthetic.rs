use altis_core::{Airline, Flight, FlightProvider, LegResult, LegSearch, ProviderId, Stop};
use altis_store::app_config::{AirlineEntry, SyntheticConfig};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveTime, Timelike};
use tokio_util::sync::CancellationToken;

use crate::{finish_leg, SupplierError};

const MINUTES_PER_DAY: u32 = 24 * 60;
const DEFAULT_EARLIEST_DEPARTURE: u32 = 6 * 60;
const DEFAULT_LATEST_DEPARTURE: u32 = 22 * 60;
const DEFAULT_MIN_PRICE: f64 = 60.0;
const DEFAULT_MAX_PRICE: f64 = 1400.0;
// Keeps every generated price exactly representable as f64.
const MAX_PRICE_STEP: u64 = (1 << 53) / 5;

/// Offer generator with no upstream. The same leg, passenger count and
/// filters always yield byte-identical offers.
pub struct SyntheticProvider {
    airlines: Vec<AirlineEntry>,
    hubs: Vec<String>,
}

impl SyntheticProvider {
    pub fn new(config: &SyntheticConfig) -> Self {
        let defaults = SyntheticConfig::default();
        let airlines = if config.airlines.is_empty() { defaults.airlines } else { config.airlines.clone() };
        let hubs = if config.hubs.is_empty() { defaults.hubs } else { config.hubs.clone() };
        Self { airlines, hubs }
    }

    pub fn generate(&self, search: &LegSearch) -> Vec<Flight> {
        let origin = search.leg.origin.trim().to_uppercase();
        let destination = search.leg.destination.trim().to_uppercase();
        let filters_json = serde_json::to_string(&search.filters).unwrap_or_default();
        let seed = string_hash(&format!(
            "{}|{}|{}|{}|{}",
            origin, destination, search.leg.departure_date, search.passengers, filters_json
        ));

        let filters = search.filters.clone().unwrap_or_default();
        let Some(prices) = PriceWindow::new(filters.min_price, filters.max_price) else {
            return Vec::new();
        };
        let (window_start, window_span) = match filters.departure_time_range {
            Some(range) => {
                let from = minute_of_day(range.from);
                let to = minute_of_day(range.to);
                (from, (to + MINUTES_PER_DAY - from) % MINUTES_PER_DAY)
            }
            None => (DEFAULT_EARLIEST_DEPARTURE, DEFAULT_LATEST_DEPARTURE - DEFAULT_EARLIEST_DEPARTURE),
        };
        let max_stops = search.max_stops().unwrap_or(2).min(2);
        let layover_hubs: Vec<&String> = self
            .hubs
            .iter()
            .filter(|h| h.as_str() != origin && h.as_str() != destination)
            .collect();

        let mut rng = Lcg::new(seed);
        let count = rng.between(5, 12);
        let mut flights = Vec::with_capacity(count as usize);

        for i in 0..count {
            let carrier = &self.airlines[rng.next_u32() as usize % self.airlines.len()];

            let stops_count = if layover_hubs.is_empty() { 0 } else { rng.between(0, max_stops) };
            let first_hub = rng.next_u32() as usize;
            let stops: Vec<Stop> = (0..stops_count as usize)
                .map(|k| Stop {
                    airport_code: layover_hubs[(first_hub + k) % layover_hubs.len()].clone(),
                    layover_minutes: rng.between(45, 240),
                })
                .collect();

            let duration_minutes = rng.between(75, 720) + 55 * stops_count;
            let offset = 5 * rng.between(0, window_span / 5);
            let departure_minute = (window_start + offset) % MINUTES_PER_DAY;
            let Some(departure) =
                search.leg.departure_date.and_hms_opt(departure_minute / 60, departure_minute % 60, 0)
            else {
                continue;
            };
            let arrival = departure + ChronoDuration::minutes(i64::from(duration_minutes));

            flights.push(Flight {
                id: format!("syn-{:08x}-{}", seed, i),
                price: prices.pick(&mut rng),
                currency: search.currency.clone(),
                duration_minutes,
                origin_iata: origin.clone(),
                destination_iata: destination.clone(),
                departure: departure.format("%Y-%m-%dT%H:%M:%S").to_string(),
                arrival: arrival.format("%Y-%m-%dT%H:%M:%S").to_string(),
                airline: Airline {
                    code: carrier.code.clone(),
                    name: carrier.name.clone(),
                    logo_url: None,
                },
                flight_number: format!("{}{}", carrier.code, rng.between(100, 999)),
                stops_count: Some(stops_count),
                stops,
                provider_id: ProviderId::Synthetic,
                leg_index: search.leg_index,
            });
        }

        flights.sort_by(|a, b| a.price.total_cmp(&b.price));
        flights
    }
}

#[async_trait]
impl FlightProvider for SyntheticProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Synthetic
    }

    async fn search_leg(&self, search: LegSearch, cancel: CancellationToken) -> LegResult {
        let outcome = if cancel.is_cancelled() {
            Err(SupplierError::Cancelled)
        } else {
            Ok(self.generate(&search))
        };
        finish_leg(ProviderId::Synthetic, search.leg_index, outcome)
    }
}

/// 32-bit multiplicative hash; order-sensitive.
fn string_hash(input: &str) -> u32 {
    input
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

struct Lcg(u32);

impl Lcg {
    fn new(seed: u32) -> Self {
        Lcg(seed)
    }

    fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0 >> 8
    }

    /// Inclusive on both ends.
    fn between(&mut self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        let span = u64::from(high - low) + 1;
        low + (u64::from(self.next_u32()) % span) as u32
    }

    fn between_u64(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        low + u64::from(self.next_u32()) % (high - low + 1)
    }
}

/// Price bounds expressed as multiples of 5.
struct PriceWindow {
    lowest_step: u64,
    highest_step: u64,
}

impl PriceWindow {
    fn new(min: Option<f64>, max: Option<f64>) -> Option<Self> {
        let low = match (min, max) {
            (Some(min), _) => min,
            (None, Some(max)) => DEFAULT_MIN_PRICE.min(max),
            (None, None) => DEFAULT_MIN_PRICE,
        }
        .max(0.0);
        let high = max.unwrap_or_else(|| DEFAULT_MAX_PRICE.max(low + DEFAULT_MAX_PRICE));
        let lowest_step = (low / 5.0).ceil();
        let highest_step = (high / 5.0).floor();
        if !lowest_step.is_finite() || !highest_step.is_finite() || lowest_step > highest_step {
            return None;
        }
        // Saturating casts, then clamp into the exact range.
        let lowest_step = lowest_step as u64;
        let highest_step = (highest_step as u64).min(MAX_PRICE_STEP);
        if lowest_step > highest_step {
            return None;
        }
        Some(Self { lowest_step, highest_step })
    }

    fn pick(&self, rng: &mut Lcg) -> f64 {
        (rng.between_u64(self.lowest_step, self.highest_step) * 5) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use altis_core::{Leg, SearchFilters, TimeRange};
    use chrono::NaiveDate;

    fn search(filters: Option<SearchFilters>, passengers: u32) -> LegSearch {
        LegSearch {
            leg_index: 0,
            leg: Leg {
                origin: "HAV".to_string(),
                destination: "IST".to_string(),
                departure_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            },
            passengers,
            filters,
            currency: "USD".to_string(),
            cabin_class: Default::default(),
        }
    }

    fn provider() -> SyntheticProvider {
        SyntheticProvider::new(&SyntheticConfig::default())
    }

    #[test]
    fn test_direct_only_offers_are_sorted_multiples_of_five() {
        let filters = SearchFilters { max_stops: Some(0), ..Default::default() };
        let flights = provider().generate(&search(Some(filters), 2));

        assert!((5..=12).contains(&flights.len()));
        assert!(flights.iter().all(|f| f.stops_count == Some(0) && f.stops.is_empty()));
        assert!(flights.windows(2).all(|w| w[0].price <= w[1].price));
        assert!(flights.iter().all(|f| f.price % 5.0 == 0.0 && (60.0..=1400.0).contains(&f.price)));
        assert!(flights.iter().all(|f| f.provider_id == ProviderId::Synthetic && f.origin_iata == "HAV"));
    }

    #[test]
    fn test_identical_inputs_identical_output() {
        let a = serde_json::to_string(&provider().generate(&search(None, 2))).unwrap();
        let b = serde_json::to_string(&provider().generate(&search(None, 2))).unwrap();
        assert_eq!(a, b);

        let other = serde_json::to_string(&provider().generate(&search(None, 3))).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_offers_respect_price_and_time_windows() {
        let filters = SearchFilters {
            min_price: Some(201.0),
            max_price: Some(299.0),
            departure_time_range: Some(TimeRange {
                from: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                to: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            }),
            ..Default::default()
        };
        let window = filters.departure_time_range.unwrap();
        let flights = provider().generate(&search(Some(filters), 1));

        assert!(!flights.is_empty());
        for flight in &flights {
            assert!((205.0..=295.0).contains(&flight.price), "price {}", flight.price);
            assert!(window.contains(flight.departure_time().unwrap()));
            assert_eq!(flight.stops.len() as u32, flight.stops_count.unwrap());
            assert!(flight.duration_minutes >= 75);
        }
    }

    #[test]
    fn test_window_without_a_multiple_of_five_is_empty() {
        let filters = SearchFilters { min_price: Some(101.0), max_price: Some(104.0), ..Default::default() };
        assert!(provider().generate(&search(Some(filters), 1)).is_empty());
    }

    #[test]
    fn test_huge_price_window_stays_in_bounds() {
        let filters = SearchFilters { min_price: Some(9e9), max_price: Some(1e10), ..Default::default() };
        let flights = provider().generate(&search(Some(filters), 1));

        assert!(!flights.is_empty());
        assert!(flights.iter().all(|f| f.price % 5.0 == 0.0 && (9e9..=1e10).contains(&f.price)));
    }

    #[test]
    fn test_unbounded_ceiling_does_not_overflow() {
        let filters = SearchFilters { min_price: Some(1.0), max_price: Some(1e300), ..Default::default() };
        let flights = provider().generate(&search(Some(filters), 1));

        assert!(!flights.is_empty());
        assert!(flights.iter().all(|f| f.price >= 5.0 && f.price.is_finite()));
    }

    #[test]
    fn test_low_max_price_alone_still_yields_offers() {
        let filters = SearchFilters { max_price: Some(50.0), ..Default::default() };
        let flights = provider().generate(&search(Some(filters), 1));

        assert!(!flights.is_empty());
        assert!(flights.iter().all(|f| f.price <= 50.0));
    }

    #[test]
    fn test_between_covers_full_u32_range() {
        let mut rng = Lcg::new(7);
        let value = rng.between(0, u32::MAX);
        assert_eq!(value, Lcg::new(7).next_u32());
        assert_eq!(rng.between(u32::MAX, u32::MAX), u32::MAX);
    }

    #[test]
    fn test_layovers_avoid_endpoints() {
        let flights = provider().generate(&search(None, 1));
        for stop in flights.iter().flat_map(|f| f.stops.iter()) {
            assert_ne!(stop.airport_code, "IST");
            assert_ne!(stop.airport_code, "HAV");
        }
    }

    #[tokio::test]
    async fn test_cancelled_search_returns_empty_leg() {
        let token = CancellationToken::new();
        token.cancel();
        let result = provider().search_leg(search(None, 1), token).await;
        assert_eq!(result.leg_index, 0);
        assert!(result.flights.is_empty());
    }
}
