//! Leg Deriver: adjacent-pair scan over each journey's cleaned arrivals.
//!
//! Every consecutive pair of stop visits becomes one leg candidate;
//! candidates failing the plausibility bounds are dropped silently (GPS
//! and clock glitches, mis-sequenced records), never errored. Journeys
//! are processed independently, so the per-journey work runs on the rayon
//! pool.

use rayon::prelude::*;
use tracing::debug;

use crate::etl::direction::CanonicalDirections;
use crate::geo::haversine_meters;
use crate::model::{CleanArrival, Leg};

/// Upper bound for |delay|, |deviation| and planned duration, seconds.
pub const MAX_PLAUSIBLE_SECONDS: i64 = 7200;
/// Legs implying a faster straight-line speed than this are glitches.
pub const MAX_PLAUSIBLE_SPEED_KMH: f64 = 250.0;

/// Derives all plausible legs from one cleaned day partition.
///
/// `clean` must be ordered by (journey, sequence number), which is what
/// the Arrival Cleaner emits. Output order follows the input, so repeated
/// runs over the same partition produce identical output.
pub fn derive_legs(clean: &[CleanArrival], directions: &CanonicalDirections) -> Vec<Leg> {
    let mut journeys: Vec<&[CleanArrival]> = Vec::new();
    let mut rest = clean;
    while let Some(first) = rest.first() {
        let len = rest
            .iter()
            .take_while(|row| row.journey_key() == first.journey_key())
            .count();
        let (journey, tail) = rest.split_at(len);
        journeys.push(journey);
        rest = tail;
    }

    let legs: Vec<Leg> = journeys
        .par_iter()
        .flat_map_iter(|journey| {
            journey
                .windows(2)
                .filter_map(|pair| derive_leg(&pair[0], &pair[1], directions))
                .collect::<Vec<_>>()
        })
        .collect();

    debug!(
        journeys = journeys.len(),
        legs = legs.len(),
        "Legs derived"
    );
    legs
}

/// Derives the leg between two consecutive stop visits of one journey, or
/// `None` when any required field is missing or a plausibility bound fails.
fn derive_leg(
    prev: &CleanArrival,
    cur: &CleanArrival,
    directions: &CanonicalDirections,
) -> Option<Leg> {
    // Zero-distance "legs" carry no travel-time signal.
    if prev.stop == cur.stop {
        return None;
    }

    let start_time = prev.arrival_time.or(prev.departure_time)?;
    let end_time = cur.arrival_time.or(cur.departure_time)?;
    let actual_duration = (end_time - start_time).num_seconds();

    let planned_start = prev.aimed_arrival_time.or(prev.aimed_departure_time)?;
    let planned_end = cur.aimed_arrival_time.or(cur.aimed_departure_time)?;
    let planned_duration = (planned_end - planned_start).num_seconds();

    let delay = match (cur.arrival_time, cur.aimed_arrival_time) {
        (Some(actual), Some(aimed)) => (actual - aimed).num_seconds(),
        _ => match (cur.departure_time, cur.aimed_departure_time) {
            (Some(actual), Some(aimed)) => (actual - aimed).num_seconds(),
            _ => return None,
        },
    };
    let deviation = actual_duration - planned_duration;

    let air_distance_meters = haversine_meters(prev.lat, prev.lon, cur.lat, cur.lon);

    let plausible = actual_duration > 0
        && (0..=MAX_PLAUSIBLE_SECONDS).contains(&planned_duration)
        && delay.abs() < MAX_PLAUSIBLE_SECONDS
        && deviation.abs() < MAX_PLAUSIBLE_SECONDS
        && air_distance_meters > 0.0
        && implied_speed_kmh(air_distance_meters, actual_duration) < MAX_PLAUSIBLE_SPEED_KMH;
    if !plausible {
        return None;
    }

    let direction = directions
        .canonical(
            cur.operating_date,
            &cur.data_source,
            &cur.line_ref,
            &cur.direction_ref,
        )
        .unwrap_or(cur.direction_ref.as_str())
        .to_string();

    Some(Leg {
        operating_date: cur.operating_date,
        line_ref: cur.line_ref.clone(),
        data_source: cur.data_source.clone(),
        direction_ref: cur.direction_ref.clone(),
        direction,
        service_journey_id: cur.service_journey_id.clone(),
        from_stop: prev.stop.clone(),
        to_stop: cur.stop.clone(),
        from_lat: prev.lat,
        from_lon: prev.lon,
        to_lat: cur.lat,
        to_lon: cur.lon,
        start_time,
        actual_duration,
        planned_duration,
        delay,
        deviation,
        air_distance_meters,
    })
}

fn implied_speed_kmh(air_distance_meters: f64, actual_duration_secs: i64) -> f64 {
    (air_distance_meters / 1000.0) / (actual_duration_secs as f64 / 3600.0)
}
