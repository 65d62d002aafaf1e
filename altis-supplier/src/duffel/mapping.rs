use altis_core::{minutes_between, Airline, Flight, LegSearch, ProviderId, Stop};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::decode::{lenient_f64, lenient_string, null_as_default};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawOffer {
    #[serde(deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    total_amount: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    total_currency: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    owner: RawCarrier,
    #[serde(deserialize_with = "null_as_default")]
    slices: Vec<RawSlice>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
struct RawCarrier {
    #[serde(deserialize_with = "lenient_string")]
    iata_code: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    logo_symbol_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawSlice {
    #[serde(deserialize_with = "lenient_string")]
    duration: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawSegment {
    #[serde(deserialize_with = "null_as_default")]
    origin: RawAirport,
    #[serde(deserialize_with = "null_as_default")]
    destination: RawAirport,
    #[serde(deserialize_with = "lenient_string")]
    departing_at: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    arriving_at: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    duration: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    marketing_carrier: RawCarrier,
    #[serde(deserialize_with = "lenient_string")]
    marketing_carrier_flight_number: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    operating_carrier: RawCarrier,
    #[serde(deserialize_with = "lenient_string")]
    operating_carrier_flight_number: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawAirport {
    #[serde(deserialize_with = "lenient_string")]
    iata_code: Option<String>,
}

pub(super) fn to_flights(offers: Vec<Value>, search: &LegSearch) -> Vec<Flight> {
    offers
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<RawOffer>(raw) {
            Ok(offer) => Some(to_flight(offer, search)),
            Err(err) => {
                debug!(error = %err, "Skipping undecodable offer");
                None
            }
        })
        .collect()
}

fn to_flight(offer: RawOffer, search: &LegSearch) -> Flight {
    let slice = offer.slices.into_iter().next().unwrap_or_default();
    let first = slice.segments.first();
    let last = slice.segments.last();

    let departure = first.and_then(|s| s.departing_at.clone()).unwrap_or_default();
    let arrival = last.and_then(|s| s.arriving_at.clone()).unwrap_or_default();

    let duration_minutes = slice
        .duration
        .as_deref()
        .and_then(parse_iso_duration)
        .or_else(|| summed_segment_minutes(&slice.segments))
        .or_else(|| minutes_between(&departure, &arrival))
        .unwrap_or(0);

    let marketing = first.map(|s| s.marketing_carrier.clone()).unwrap_or_default();
    let carrier = if offer.owner.iata_code.is_some() { offer.owner } else { marketing };

    let stops: Vec<Stop> = slice
        .segments
        .windows(2)
        .map(|pair| Stop {
            airport_code: pair[0].destination.iata_code.clone().unwrap_or_default(),
            layover_minutes: match (&pair[0].arriving_at, &pair[1].departing_at) {
                (Some(landed), Some(next)) => minutes_between(landed, next).unwrap_or(0),
                _ => 0,
            },
        })
        .collect();
    let stops_count = (!slice.segments.is_empty()).then_some(stops.len() as u32);

    let flight_number = first.map(designator).unwrap_or_default();

    Flight {
        id: offer
            .id
            .unwrap_or_else(|| format!("{}-{}", flight_number, departure)),
        price: offer.total_amount.unwrap_or(0.0),
        currency: offer.total_currency.unwrap_or_else(|| search.currency.clone()),
        duration_minutes,
        origin_iata: first
            .and_then(|s| s.origin.iata_code.clone())
            .unwrap_or_else(|| search.leg.origin.trim().to_uppercase()),
        destination_iata: last
            .and_then(|s| s.destination.iata_code.clone())
            .unwrap_or_else(|| search.leg.destination.trim().to_uppercase()),
        departure,
        arrival,
        airline: Airline {
            code: carrier.iata_code.unwrap_or_default(),
            name: carrier.name.unwrap_or_default(),
            logo_url: carrier.logo_symbol_url,
        },
        flight_number,
        stops_count,
        stops,
        provider_id: ProviderId::Duffel,
        leg_index: search.leg_index,
    }
}

/// Marketing carrier designator first, operating carrier as fallback.
fn designator(segment: &RawSegment) -> String {
    let pick = |carrier: &RawCarrier, number: &Option<String>| match (&carrier.iata_code, number) {
        (Some(code), Some(number)) => Some(format!("{}{}", code, number)),
        _ => None,
    };
    pick(&segment.marketing_carrier, &segment.marketing_carrier_flight_number)
        .or_else(|| pick(&segment.operating_carrier, &segment.operating_carrier_flight_number))
        .unwrap_or_default()
}

fn summed_segment_minutes(segments: &[RawSegment]) -> Option<u32> {
    if segments.is_empty() {
        return None;
    }
    segments
        .iter()
        .map(|s| s.duration.as_deref().and_then(parse_iso_duration))
        .sum()
}

/// Minutes in an ISO-8601 duration such as `PT7H35M` or `P1DT2H`.
pub(super) fn parse_iso_duration(value: &str) -> Option<u32> {
    let body = value.trim().strip_prefix('P')?;
    let mut minutes = 0.0;
    let mut number = String::new();
    let mut in_time = false;
    let mut any_component = false;

    for c in body.chars() {
        match c {
            'T' if number.is_empty() => in_time = true,
            '0'..='9' | '.' => number.push(c),
            unit => {
                let amount: f64 = number.parse().ok()?;
                number.clear();
                any_component = true;
                minutes += match (unit, in_time) {
                    ('W', false) => amount * 7.0 * 1440.0,
                    ('D', false) => amount * 1440.0,
                    ('H', true) => amount * 60.0,
                    ('M', true) => amount,
                    ('S', true) => amount / 60.0,
                    _ => return None,
                };
            }
        }
    }

    if !any_component || !number.is_empty() {
        return None;
    }
    Some(minutes.round() as u32)
}
