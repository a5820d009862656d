//! Aggregator: hourly and monthly leg statistics per stop pair.
//!
//! For one month partition, weekday legs (Mon-Fri) are grouped twice: by
//! (dataSource, fromStop, toStop, hour) and by (dataSource, fromStop,
//! toStop). The hourly rows are joined onto their monthly baseline and
//! only groups with enough samples and a plausible stop-pair distance are
//! materialized, suppressing low-confidence statistics.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Timelike, Weekday};
use rayon::prelude::*;
use tracing::debug;

use crate::etl::partitioning::truncate_to_month;
use crate::model::{Leg, LegStat};
use crate::stats::{Metric, MetricSummary};

/// Hourly groups must have strictly more legs than this to materialize.
pub const MIN_HOURLY_COUNT: usize = 20;
/// Stop pairs closer than this (meters) are statistically meaningless.
pub const MIN_AIR_DISTANCE_METERS: f64 = 50.0;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct PairKey {
    data_source: String,
    from_stop: String,
    to_stop: String,
}

impl PairKey {
    fn of(leg: &Leg) -> Self {
        PairKey {
            data_source: leg.data_source.clone(),
            from_stop: leg.from_stop.clone(),
            to_stop: leg.to_stop.clone(),
        }
    }
}

struct MonthlyAggregate {
    duration: MetricSummary,
    delay: MetricSummary,
    deviation: MetricSummary,
    count: usize,
    /// Representative values: taken from the group's first leg in
    /// (start_time, journey) order, so recomputation is deterministic.
    air_distance_meters: f64,
    from_lat: f64,
    from_lon: f64,
    to_lat: f64,
    to_lon: f64,
}

/// Computes all LegStat rows for one month partition.
pub fn aggregate_month(legs: &[Leg], month: NaiveDate) -> Vec<LegStat> {
    let mut weekday_legs: Vec<&Leg> = legs
        .iter()
        .filter(|leg| truncate_to_month(leg.operating_date) == month)
        .filter(|leg| {
            let weekday = leg.start_time.weekday();
            weekday != Weekday::Sat && weekday != Weekday::Sun
        })
        .collect();
    weekday_legs.sort_by(|a, b| {
        (a.start_time, &a.service_journey_id, a.sequence_key())
            .cmp(&(b.start_time, &b.service_journey_id, b.sequence_key()))
    });

    let mut monthly_groups: HashMap<PairKey, Vec<&Leg>> = HashMap::new();
    let mut hourly_groups: HashMap<(PairKey, u32), Vec<&Leg>> = HashMap::new();
    for leg in &weekday_legs {
        let key = PairKey::of(leg);
        monthly_groups.entry(key.clone()).or_default().push(leg);
        hourly_groups
            .entry((key, leg.start_time.hour()))
            .or_default()
            .push(leg);
    }

    let monthly: HashMap<&PairKey, MonthlyAggregate> = monthly_groups
        .iter()
        .filter_map(|(key, group)| Some((key, summarize_monthly(group)?)))
        .collect();

    let mut hourly_keys: Vec<&(PairKey, u32)> = hourly_groups.keys().collect();
    hourly_keys.sort();

    let mut rows: Vec<LegStat> = hourly_keys
        .par_iter()
        .filter_map(|key| {
            let (pair, hour) = key;
            let group = &hourly_groups[*key];
            if group.len() <= MIN_HOURLY_COUNT {
                return None;
            }
            let baseline = monthly.get(pair)?;
            if baseline.air_distance_meters <= MIN_AIR_DISTANCE_METERS {
                return None;
            }
            summarize_hourly(pair, *hour, group, baseline, month)
        })
        .collect();

    rows.sort_by(|a, b| {
        (&a.data_source, &a.from_stop, &a.to_stop, a.hour)
            .cmp(&(&b.data_source, &b.from_stop, &b.to_stop, b.hour))
    });

    debug!(
        month = %month,
        weekday_legs = weekday_legs.len(),
        groups = rows.len(),
        "Month aggregated"
    );
    rows
}

fn summaries(group: &[&Leg]) -> Option<(MetricSummary, MetricSummary, MetricSummary)> {
    let durations: Vec<i64> = group.iter().map(|l| l.actual_duration).collect();
    let delays: Vec<i64> = group.iter().map(|l| l.delay).collect();
    let deviations: Vec<i64> = group.iter().map(|l| l.deviation).collect();
    Some((
        MetricSummary::compute(Metric::Duration, &durations)?,
        MetricSummary::compute(Metric::Delay, &delays)?,
        MetricSummary::compute(Metric::Deviation, &deviations)?,
    ))
}

fn summarize_monthly(group: &[&Leg]) -> Option<MonthlyAggregate> {
    let first = group.first()?;
    let (duration, delay, deviation) = summaries(group)?;
    Some(MonthlyAggregate {
        duration,
        delay,
        deviation,
        count: group.len(),
        air_distance_meters: first.air_distance_meters,
        from_lat: first.from_lat,
        from_lon: first.from_lon,
        to_lat: first.to_lat,
        to_lon: first.to_lon,
    })
}

fn summarize_hourly(
    pair: &PairKey,
    hour: u32,
    group: &[&Leg],
    baseline: &MonthlyAggregate,
    month: NaiveDate,
) -> Option<LegStat> {
    let (duration, delay, deviation) = summaries(group)?;
    let hourly_quartile = duration.upper_quartile() as f64;
    // Monthly median duration is positive: every leg duration is > 0.
    let rush_intensity = hourly_quartile / baseline.duration.median;

    Some(LegStat {
        month,
        hour,
        data_source: pair.data_source.clone(),
        from_stop: pair.from_stop.clone(),
        to_stop: pair.to_stop.clone(),

        hourly_quartile,
        hourly_duration: duration.median,
        hourly_delay: delay.median,
        hourly_deviation: deviation.median,
        mean_hourly_duration: duration.mean,
        hourly_count: group.len() as u64,

        monthly_duration: baseline.duration.median,
        monthly_quartile: baseline.duration.upper_quartile() as f64,
        monthly_delay: baseline.delay.median,
        monthly_deviation: baseline.deviation.median,
        mean_monthly_duration: baseline.duration.mean,
        monthly_count: baseline.count as u64,

        rush_intensity,

        air_distance_meters: baseline.air_distance_meters,
        from_lat: baseline.from_lat,
        from_lon: baseline.from_lon,
        to_lat: baseline.to_lat,
        to_lon: baseline.to_lon,
    })
}

impl Leg {
    /// Secondary sort key so representative values stay stable across runs.
    fn sequence_key(&self) -> (&str, &str) {
        (self.from_stop.as_str(), self.to_stop.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn month() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    /// 2024-03-04 is a Monday.
    fn weekday_ts(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    fn leg(start_time: DateTime<Utc>, actual: i64) -> Leg {
        Leg {
            operating_date: start_time.date_naive(),
            line_ref: "L1".into(),
            data_source: "SRC".into(),
            direction_ref: "0".into(),
            direction: "0".into(),
            service_journey_id: "j1".into(),
            from_stop: "A".into(),
            to_stop: "B".into(),
            from_lat: 59.900,
            from_lon: 10.700,
            to_lat: 59.910,
            to_lon: 10.700,
            start_time,
            actual_duration: actual,
            planned_duration: 90,
            delay: 40,
            deviation: actual - 90,
            air_distance_meters: 1100.0,
        }
    }

    fn monday_legs(count: usize, hour: u32) -> Vec<Leg> {
        (0..count)
            .map(|i| leg(weekday_ts(4, hour, i as u32 % 60), 100 + i as i64))
            .collect()
    }

    #[test]
    fn test_group_with_twenty_legs_is_excluded() {
        let legs = monday_legs(20, 8);
        assert!(aggregate_month(&legs, month()).is_empty());
    }

    #[test]
    fn test_group_with_twenty_one_legs_is_included() {
        let legs = monday_legs(21, 8);
        let rows = aggregate_month(&legs, month());
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.hour, 8);
        assert_eq!(row.hourly_count, 21);
        assert_eq!(row.monthly_count, 21);
        // Durations are 100..=120: median 110, mean 110, p75 115.
        assert_eq!(row.hourly_duration, 110.0);
        assert_eq!(row.mean_hourly_duration, 110.0);
        assert_eq!(row.hourly_quartile, 115.0);
        assert_eq!(row.hourly_delay, 40.0);
        assert!((row.rush_intensity - 115.0 / 110.0).abs() < 1e-12);
    }

    #[test]
    fn test_weekend_legs_are_ignored() {
        // 2024-03-02 and 2024-03-03 are a weekend.
        let mut legs = monday_legs(21, 8);
        for leg in legs.iter_mut().take(10) {
            leg.start_time = weekday_ts(2, 8, 0);
            leg.operating_date = leg.start_time.date_naive();
        }
        assert!(aggregate_month(&legs, month()).is_empty());
    }

    #[test]
    fn test_other_months_are_ignored() {
        let mut legs = monday_legs(42, 8);
        for leg in legs.iter_mut().take(21) {
            // 2024-02-05 is also a Monday.
            leg.start_time = Utc.with_ymd_and_hms(2024, 2, 5, 8, 0, 0).unwrap();
            leg.operating_date = leg.start_time.date_naive();
        }
        let rows = aggregate_month(&legs, month());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hourly_count, 21);
    }

    #[test]
    fn test_short_air_distance_is_excluded() {
        let mut legs = monday_legs(21, 8);
        for leg in legs.iter_mut() {
            leg.air_distance_meters = 50.0;
        }
        assert!(aggregate_month(&legs, month()).is_empty());
    }

    #[test]
    fn test_monthly_baseline_spans_all_hours() {
        let mut legs = monday_legs(21, 8);
        // A slow evening hour for the same pair.
        legs.extend((0..21).map(|i| leg(weekday_ts(4, 17, i % 60), 200)));

        let rows = aggregate_month(&legs, month());
        assert_eq!(rows.len(), 2);

        let evening = rows.iter().find(|r| r.hour == 17).unwrap();
        assert_eq!(evening.monthly_count, 42);
        assert!(evening.rush_intensity > 1.0);

        let morning = rows.iter().find(|r| r.hour == 8).unwrap();
        assert_eq!(morning.monthly_count, 42);
        assert!(morning.rush_intensity < 1.0);
    }

    #[test]
    fn test_pairs_do_not_mix() {
        let mut legs = monday_legs(21, 8);
        let mut other = monday_legs(21, 8);
        for leg in other.iter_mut() {
            leg.to_stop = "C".into();
        }
        legs.extend(other);

        let rows = aggregate_month(&legs, month());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.monthly_count == 21));
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let legs = monday_legs(25, 8);
        let a = aggregate_month(&legs, month());
        let b = aggregate_month(&legs, month());
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].rush_intensity, b[0].rush_intensity);
        assert_eq!(a[0].from_lat, b[0].from_lat);
    }
}
