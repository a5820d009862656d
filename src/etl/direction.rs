//! Canonical Direction Resolver.
//!
//! Operators reassign numeric direction codes over time, so legs are
//! labeled with a canonical direction instead: per day and
//! (dataSource, lineRef, directionRef) group the most frequent
//! (origin, destination) stop pair is recorded, and across all recorded
//! days the directionRef observed earliest for that physical
//! (origin, destination) route becomes the canonical label.

use std::collections::HashMap;

use chrono::NaiveDate;
use itertools::Itertools;

use crate::model::{CleanArrival, RouteName};

/// Derives one day's route-name rows: the most frequently observed
/// (origin, destination) per (dataSource, lineRef, directionRef).
///
/// `clean` must have each journey's rows consecutive, which is what the
/// Arrival Cleaner emits. Frequency ties break deterministically to the
/// lexicographically smallest (origin, destination) pair.
pub fn discover_route_names(clean: &[CleanArrival]) -> Vec<RouteName> {
    // (date, dataSource, line, direction) -> (origin, destination) -> journeys
    let mut counts: HashMap<(NaiveDate, &str, &str, &str), HashMap<(&str, &str), u64>> =
        HashMap::new();

    for (_, journey) in &clean.iter().chunk_by(|row| row.journey_key()) {
        let rows: Vec<&CleanArrival> = journey.collect();
        let origin = rows
            .iter()
            .min_by_key(|r| r.sequence_nr)
            .expect("chunk_by groups are never empty");
        let destination = rows
            .iter()
            .max_by_key(|r| r.sequence_nr)
            .expect("chunk_by groups are never empty");

        *counts
            .entry((
                origin.operating_date,
                origin.data_source.as_str(),
                origin.line_ref.as_str(),
                origin.direction_ref.as_str(),
            ))
            .or_default()
            .entry((origin.stop.as_str(), destination.stop.as_str()))
            .or_default() += 1;
    }

    let mut names: Vec<RouteName> = counts
        .into_iter()
        .map(|((date, data_source, line_ref, direction_ref), pairs)| {
            let ((origin, destination), _) = pairs
                .into_iter()
                .min_by(|(pair_a, count_a), (pair_b, count_b)| {
                    count_b.cmp(count_a).then(pair_a.cmp(pair_b))
                })
                .expect("count maps are never empty");
            RouteName {
                operating_date: date,
                data_source: data_source.to_string(),
                line_ref: line_ref.to_string(),
                direction_ref: direction_ref.to_string(),
                origin: origin.to_string(),
                destination: destination.to_string(),
            }
        })
        .collect();

    names.sort_by(|a, b| {
        (
            a.operating_date,
            &a.data_source,
            &a.line_ref,
            &a.direction_ref,
        )
            .cmp(&(
                b.operating_date,
                &b.data_source,
                &b.line_ref,
                &b.direction_ref,
            ))
    });
    names
}

/// Lookup from (operatingDate, dataSource, lineRef, directionRef) to the
/// canonical direction label, built from the full route-name history.
#[derive(Debug, Default)]
pub struct CanonicalDirections {
    map: HashMap<(NaiveDate, String, String, String), String>,
}

impl CanonicalDirections {
    /// Builds the mapping. For each (dataSource, lineRef, origin,
    /// destination) the directionRef of the earliest operatingDate wins;
    /// date ties break to the lexicographically smallest directionRef.
    pub fn from_records(records: &[RouteName]) -> Self {
        // (dataSource, line, origin, destination) -> (first date, directionRef)
        let mut earliest: HashMap<(&str, &str, &str, &str), (NaiveDate, &str)> = HashMap::new();
        for r in records {
            let key = (
                r.data_source.as_str(),
                r.line_ref.as_str(),
                r.origin.as_str(),
                r.destination.as_str(),
            );
            let candidate = (r.operating_date, r.direction_ref.as_str());
            earliest
                .entry(key)
                .and_modify(|current| {
                    if candidate < *current {
                        *current = candidate;
                    }
                })
                .or_insert(candidate);
        }

        let mut map = HashMap::new();
        for r in records {
            let key = (
                r.data_source.as_str(),
                r.line_ref.as_str(),
                r.origin.as_str(),
                r.destination.as_str(),
            );
            let (_, canonical) = earliest[&key];
            map.insert(
                (
                    r.operating_date,
                    r.data_source.clone(),
                    r.line_ref.clone(),
                    r.direction_ref.clone(),
                ),
                canonical.to_string(),
            );
        }
        CanonicalDirections { map }
    }

    /// Canonical label for a raw directionRef on a given operating date.
    pub fn canonical(
        &self,
        date: NaiveDate,
        data_source: &str,
        line_ref: &str,
        direction_ref: &str,
    ) -> Option<&str> {
        self.map
            .get(&(
                date,
                data_source.to_string(),
                line_ref.to_string(),
                direction_ref.to_string(),
            ))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
