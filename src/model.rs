//! Row types for every dataset the pipeline reads or writes.
//!
//! All of these are flat records serialized with `csv` + `serde`; optional
//! timestamp fields round-trip as empty CSV fields.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A stop-place reference row. Coarse-grained; may lack geolocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StopPlace {
    pub id: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// A quay reference row, tied to a parent stop place.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Quay {
    pub id: String,
    pub stop_place_ref: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Canonical stop identity merged from stop-place and quay data.
///
/// Stop-place values are authoritative; quay values fill the gaps. A stop
/// with no geolocation in either source never becomes an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct StopIdentity {
    pub quay_id: String,
    pub stop_id: String,
    pub lat: f64,
    pub lon: f64,
    pub name: String,
}

/// A raw realtime arrival/departure event, one row per broadcast stop visit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArrivalEvent {
    pub line_ref: String,
    pub direction_ref: String,
    pub operating_date: NaiveDate,
    pub service_journey_id: String,
    pub stop_point_ref: String,
    pub sequence_nr: u32,
    pub aimed_arrival_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub aimed_departure_time: Option<DateTime<Utc>>,
    pub departure_time: Option<DateTime<Utc>>,
    pub extra_call: bool,
    pub estimated: bool,
    pub journey_cancellation: bool,
    pub stop_cancellation: bool,
    pub data_source: String,
    pub data_source_name: String,
}

impl ArrivalEvent {
    /// Whether any flag disqualifies the whole journey this row belongs to.
    pub fn is_flagged(&self) -> bool {
        self.extra_call || self.estimated || self.journey_cancellation || self.stop_cancellation
    }
}

/// An arrival event with its stop reference resolved, one row per
/// (journey, resolved stop) after deduplication.
#[derive(Debug, Clone)]
pub struct CleanArrival {
    pub line_ref: String,
    pub direction_ref: String,
    pub operating_date: NaiveDate,
    pub service_journey_id: String,
    pub sequence_nr: u32,
    pub stop: String,
    pub quay_id: String,
    pub stop_id: String,
    pub lat: f64,
    pub lon: f64,
    pub aimed_arrival_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub aimed_departure_time: Option<DateTime<Utc>>,
    pub departure_time: Option<DateTime<Utc>>,
    pub data_source: String,
    pub data_source_name: String,
}

impl CleanArrival {
    /// Key identifying the journey this row belongs to.
    pub fn journey_key(&self) -> (&str, NaiveDate) {
        (self.service_journey_id.as_str(), self.operating_date)
    }
}

/// One derived leg between two consecutive stops of a journey.
///
/// Pure derived fact: never mutated after creation, partitioned by
/// operating date.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Leg {
    pub operating_date: NaiveDate,
    pub line_ref: String,
    pub data_source: String,
    pub direction_ref: String,
    /// Canonical direction label, stable across operator-side code churn.
    pub direction: String,
    pub service_journey_id: String,
    pub from_stop: String,
    pub to_stop: String,
    pub from_lat: f64,
    pub from_lon: f64,
    pub to_lat: f64,
    pub to_lon: f64,
    pub start_time: DateTime<Utc>,
    /// Seconds actually spent travelling the leg. Always > 0.
    pub actual_duration: i64,
    /// Seconds the timetable allotted. Always in [0, 7200].
    pub planned_duration: i64,
    /// Accumulated lateness at the destination stop, seconds.
    pub delay: i64,
    /// actual_duration - planned_duration, seconds.
    pub deviation: i64,
    pub air_distance_meters: f64,
}

/// Per-day most-frequent (origin, destination) observed for a
/// (dataSource, lineRef, directionRef) group.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteName {
    pub operating_date: NaiveDate,
    pub data_source: String,
    pub line_ref: String,
    pub direction_ref: String,
    pub origin: String,
    pub destination: String,
}

/// Joined hourly + monthly aggregate for one stop pair, the unit the
/// serving layer reads. Only materialized for groups with more than 20
/// weekday legs in the hour and an air distance above 50 meters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LegStat {
    pub month: NaiveDate,
    pub hour: u32,
    pub data_source: String,
    pub from_stop: String,
    pub to_stop: String,

    pub hourly_quartile: f64,
    pub hourly_duration: f64,
    pub hourly_delay: f64,
    pub hourly_deviation: f64,
    pub mean_hourly_duration: f64,
    pub hourly_count: u64,

    pub monthly_duration: f64,
    pub monthly_quartile: f64,
    pub monthly_delay: f64,
    pub monthly_deviation: f64,
    pub mean_monthly_duration: f64,
    pub monthly_count: u64,

    /// Hourly 75th-percentile duration over monthly median duration.
    /// Near 1.0 means no rush effect, above 1.0 means slower than typical.
    pub rush_intensity: f64,

    pub air_distance_meters: f64,
    pub from_lat: f64,
    pub from_lon: f64,
    pub to_lat: f64,
    pub to_lon: f64,
}

/// Distinct (dataSource, lineRef, stop pair) mapping for the serving layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub struct StopLine {
    pub data_source: String,
    pub line_ref: String,
    pub from_stop: String,
    pub to_stop: String,
}
