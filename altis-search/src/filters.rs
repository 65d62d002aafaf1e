use altis_core::{Flight, LegResult, ProviderId, SearchFilters};
use std::collections::HashSet;

/// Merge every provider's result for one leg into the response entry:
/// concatenate, dedupe, filter, then sort by price.
pub fn merge_leg(leg_index: usize, results: Vec<LegResult>, filters: Option<&SearchFilters>) -> LegResult {
    let mut flights = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        flights.extend(result.flights);
        failures.extend(result.failures);
    }

    let mut flights = dedupe(flights);
    if let Some(filters) = filters {
        flights = apply_filters(flights, filters);
    }
    sort_by_price(&mut flights);

    LegResult { leg_index, flights, failures }
}

/// Keep the first occurrence of each `(provider_id, id)`.
pub fn dedupe(flights: Vec<Flight>) -> Vec<Flight> {
    let mut seen: HashSet<(ProviderId, String)> = HashSet::with_capacity(flights.len());
    flights
        .into_iter()
        .filter(|f| seen.insert((f.provider_id, f.id.clone())))
        .collect()
}

/// Price window, airline allow-list, max stops, departure window; in that
/// order. Unknown stop counts and unparseable departure times pass.
pub fn apply_filters(flights: Vec<Flight>, filters: &SearchFilters) -> Vec<Flight> {
    let airlines: Vec<String> = filters
        .airline_codes
        .iter()
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .collect();

    flights
        .into_iter()
        .filter(|f| filters.min_price.map_or(true, |min| f.price >= min))
        .filter(|f| filters.max_price.map_or(true, |max| f.price <= max))
        .filter(|f| airlines.is_empty() || airlines.contains(&f.airline.code.trim().to_uppercase()))
        .filter(|f| match (filters.max_stops, f.stops_count) {
            (Some(max), Some(stops)) => stops <= max,
            _ => true,
        })
        .filter(|f| match (filters.departure_time_range, f.departure_time()) {
            (Some(window), Some(time)) => window.contains(time),
            _ => true,
        })
        .collect()
}

/// Stable ascending sort; equal prices keep provider order.
pub fn sort_by_price(flights: &mut [Flight]) {
    flights.sort_by(|a, b| a.price.total_cmp(&b.price));
}
