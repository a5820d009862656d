//! Arrival Cleaner: raw events down to one authoritative row per
//! (journey, resolved stop).
//!
//! Three passes per day partition, in order: resolve stop references
//! (unresolvable rows are expected noise and dropped), keep the
//! lowest-sequence row per duplicated stop visit, and drop every journey
//! that carries a cancellation/estimated/extra-call flag on any retained
//! row. A journey is all-or-nothing.

use itertools::Itertools;
use tracing::debug;

use crate::model::{ArrivalEvent, CleanArrival};
use crate::stops::StopRegistry;

/// Cleans one day partition of raw arrival events.
///
/// Output is ordered by (journey, sequence number), with exactly one row
/// per distinct resolved stop within each surviving journey.
pub fn clean_arrivals(events: Vec<ArrivalEvent>, stops: &StopRegistry) -> Vec<CleanArrival> {
    let total = events.len();

    let mut resolved: Vec<(CleanArrival, bool)> = events
        .into_iter()
        .filter_map(|event| {
            let identity = stops.resolve(&event.stop_point_ref)?;
            let flagged = event.is_flagged();
            Some((
                CleanArrival {
                    line_ref: event.line_ref,
                    direction_ref: event.direction_ref,
                    operating_date: event.operating_date,
                    service_journey_id: event.service_journey_id,
                    sequence_nr: event.sequence_nr,
                    stop: identity.name.clone(),
                    quay_id: identity.quay_id.clone(),
                    stop_id: identity.stop_id.clone(),
                    lat: identity.lat,
                    lon: identity.lon,
                    aimed_arrival_time: event.aimed_arrival_time,
                    arrival_time: event.arrival_time,
                    aimed_departure_time: event.aimed_departure_time,
                    departure_time: event.departure_time,
                    data_source: event.data_source,
                    data_source_name: event.data_source_name,
                },
                flagged,
            ))
        })
        .collect();

    resolved.sort_by(|(a, _), (b, _)| {
        (a.journey_key(), a.sequence_nr).cmp(&(b.journey_key(), b.sequence_nr))
    });

    let mut clean = Vec::with_capacity(resolved.len());
    for (_, journey) in &resolved
        .into_iter()
        .chunk_by(|(row, _)| (row.service_journey_id.clone(), row.operating_date))
    {
        // Rows arrive sequence-sorted, so keeping the first occurrence per
        // resolved stop implements the lowest-sequence-number tie-break.
        let mut seen = std::collections::HashSet::new();
        let retained: Vec<(CleanArrival, bool)> = journey
            .filter(|(row, _)| seen.insert((row.quay_id.clone(), row.stop_id.clone())))
            .collect();

        if retained.iter().any(|(_, flagged)| *flagged) {
            continue;
        }
        clean.extend(retained.into_iter().map(|(row, _)| row));
    }

    debug!(
        raw = total,
        clean = clean.len(),
        "Arrival partition cleaned"
    );
    clean
}
