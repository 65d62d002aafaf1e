use altis_core::{minutes_between, Airline, Flight, LegSearch, ProviderId, Stop};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::decode::{lenient_f64, lenient_string, lenient_u32, null_as_default};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawItinerary {
    #[serde(deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    price: RawPrice,
    #[serde(deserialize_with = "null_as_default")]
    legs: Vec<RawLeg>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawPrice {
    #[serde(deserialize_with = "lenient_f64")]
    raw: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    formatted: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawLeg {
    #[serde(deserialize_with = "null_as_default")]
    origin: RawPlaceRef,
    #[serde(deserialize_with = "null_as_default")]
    destination: RawPlaceRef,
    #[serde(deserialize_with = "lenient_u32")]
    duration_in_minutes: Option<u32>,
    #[serde(deserialize_with = "lenient_u32")]
    stop_count: Option<u32>,
    #[serde(deserialize_with = "lenient_string")]
    departure: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    arrival: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    carriers: RawCarriers,
    #[serde(deserialize_with = "null_as_default")]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawPlaceRef {
    #[serde(deserialize_with = "lenient_string")]
    display_code: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    flight_place_id: Option<String>,
}

impl RawPlaceRef {
    fn code(&self) -> Option<String> {
        self.display_code.clone().or_else(|| self.flight_place_id.clone())
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawCarriers {
    #[serde(deserialize_with = "null_as_default")]
    marketing: Vec<RawCarrier>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default, rename_all = "camelCase")]
struct RawCarrier {
    #[serde(deserialize_with = "lenient_string")]
    alternate_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    logo_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawSegment {
    #[serde(deserialize_with = "null_as_default")]
    origin: RawPlaceRef,
    #[serde(deserialize_with = "null_as_default")]
    destination: RawPlaceRef,
    #[serde(deserialize_with = "lenient_string")]
    departure: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    arrival: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    flight_number: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    marketing_carrier: RawCarrier,
}

/// Map raw itineraries into canonical flights. Entries that are not even
/// objects are dropped; any missing nested field degrades to a default.
pub(super) fn to_flights(itineraries: Vec<Value>, search: &LegSearch) -> Vec<Flight> {
    itineraries
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<RawItinerary>(raw) {
            Ok(itinerary) => Some(to_flight(itinerary, search)),
            Err(err) => {
                debug!(error = %err, "Skipping undecodable itinerary");
                None
            }
        })
        .collect()
}

fn to_flight(itinerary: RawItinerary, search: &LegSearch) -> Flight {
    let leg = itinerary.legs.into_iter().next().unwrap_or_default();
    let first_segment = leg.segments.first();

    let carrier = leg
        .carriers
        .marketing
        .first()
        .cloned()
        .or_else(|| first_segment.map(|s| s.marketing_carrier.clone()))
        .unwrap_or_default();
    let airline_code = carrier.alternate_id.clone().unwrap_or_default();

    let flight_number = first_segment
        .and_then(|segment| {
            let number = segment.flight_number.as_deref()?;
            let prefix = segment
                .marketing_carrier
                .alternate_id
                .as_deref()
                .unwrap_or(&airline_code);
            Some(format!("{}{}", prefix, number))
        })
        .unwrap_or_default();

    let stops: Vec<Stop> = leg
        .segments
        .windows(2)
        .map(|pair| Stop {
            airport_code: pair[0].destination.code().unwrap_or_default(),
            layover_minutes: match (&pair[0].arrival, &pair[1].departure) {
                (Some(landed), Some(next)) => minutes_between(landed, next).unwrap_or(0),
                _ => 0,
            },
        })
        .collect();
    let stops_count = if leg.segments.is_empty() {
        leg.stop_count
    } else {
        Some(stops.len() as u32)
    };

    let departure = leg.departure.unwrap_or_default();
    let arrival = leg.arrival.unwrap_or_default();
    let duration_minutes = leg
        .duration_in_minutes
        .or_else(|| minutes_between(&departure, &arrival))
        .unwrap_or(0);

    let price = itinerary
        .price
        .raw
        .or_else(|| itinerary.price.formatted.as_deref().and_then(parse_formatted_price))
        .unwrap_or(0.0);

    Flight {
        id: itinerary
            .id
            .unwrap_or_else(|| format!("{}-{}", flight_number, departure)),
        price,
        currency: search.currency.clone(),
        duration_minutes,
        origin_iata: leg
            .origin
            .code()
            .unwrap_or_else(|| search.leg.origin.trim().to_uppercase()),
        destination_iata: leg
            .destination
            .code()
            .unwrap_or_else(|| search.leg.destination.trim().to_uppercase()),
        departure,
        arrival,
        airline: Airline {
            code: airline_code,
            name: carrier.name.unwrap_or_default(),
            logo_url: carrier.logo_url,
        },
        flight_number,
        stops_count,
        stops,
        provider_id: ProviderId::SkyScrapper,
        leg_index: search.leg_index,
    }
}

/// `"$1,234"` -> `1234.0`
fn parse_formatted_price(formatted: &str) -> Option<f64> {
    let digits: String = formatted
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}
