//! Partition Tracker: which time partitions exist, and which need work.
//!
//! `needed` is a pure function over two sets of partition keys so the
//! incremental-recomputation contract stays independent of storage
//! mechanics. The most recent source partition is always recomputed to
//! absorb late-arriving data, at the cost of redundant work per run.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use chrono::{Datelike, NaiveDate};

use crate::store;

/// Day partitions present in a day-partitioned dataset.
pub fn available_daily(dir: &Path) -> Result<BTreeSet<NaiveDate>> {
    store::list_partitions(dir, store::DAY_KEY)
}

/// Month partitions present in a month-partitioned dataset.
pub fn available_monthly(dir: &Path) -> Result<BTreeSet<NaiveDate>> {
    store::list_partitions(dir, store::MONTH_KEY)
}

/// Month partitions covered by a day-partitioned dataset, by truncation.
pub fn available_monthly_from_daily(dir: &Path) -> Result<BTreeSet<NaiveDate>> {
    Ok(available_daily(dir)?
        .into_iter()
        .map(truncate_to_month)
        .collect())
}

/// First day of the month containing `day`.
pub fn truncate_to_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).expect("every month has a first day")
}

/// Partitions that must be (re)computed.
///
/// With `invalidate_all`, every source partition from `from_date` on.
/// Otherwise the source partitions missing from the destination, plus the
/// most recent source partition, filtered to `from_date` and later.
pub fn needed(
    source: &BTreeSet<NaiveDate>,
    dest: &BTreeSet<NaiveDate>,
    invalidate_all: bool,
    from_date: NaiveDate,
) -> BTreeSet<NaiveDate> {
    let candidates: BTreeSet<NaiveDate> = if invalidate_all {
        source.clone()
    } else {
        let mut missing: BTreeSet<NaiveDate> = source.difference(dest).copied().collect();
        if let Some(&latest) = source.last() {
            missing.insert(latest);
        }
        missing
    };

    candidates
        .into_iter()
        .filter(|p| *p >= from_date)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn months(list: &[(i32, u32)]) -> BTreeSet<NaiveDate> {
        list.iter().map(|&(y, m)| day(y, m, 1)).collect()
    }

    #[test]
    fn test_missing_plus_latest() {
        let source = months(&[(2024, 1), (2024, 2), (2024, 3)]);
        let dest = months(&[(2024, 1)]);
        let got = needed(&source, &dest, false, day(2020, 1, 1));
        assert_eq!(got, months(&[(2024, 2), (2024, 3)]));
    }

    #[test]
    fn test_latest_is_always_recomputed() {
        let source = months(&[(2024, 1), (2024, 2), (2024, 3)]);
        let dest = source.clone();
        let got = needed(&source, &dest, false, day(2020, 1, 1));
        assert_eq!(got, months(&[(2024, 3)]));
    }

    #[test]
    fn test_invalidate_takes_everything() {
        let source = months(&[(2024, 1), (2024, 2), (2024, 3)]);
        let dest = months(&[(2024, 1)]);
        let got = needed(&source, &dest, true, day(2020, 1, 1));
        assert_eq!(got, source);
    }

    #[test]
    fn test_from_date_filters_even_the_latest() {
        let source = months(&[(2024, 1), (2024, 2), (2024, 3)]);
        let got = needed(&source, &BTreeSet::new(), false, day(2024, 4, 1));
        assert!(got.is_empty());
    }

    #[test]
    fn test_from_date_cuts_older_partitions() {
        let source = months(&[(2024, 1), (2024, 2), (2024, 3)]);
        let got = needed(&source, &BTreeSet::new(), true, day(2024, 2, 1));
        assert_eq!(got, months(&[(2024, 2), (2024, 3)]));
    }

    #[test]
    fn test_empty_source_is_empty() {
        let got = needed(&BTreeSet::new(), &months(&[(2024, 1)]), false, day(2020, 1, 1));
        assert!(got.is_empty());
    }

    #[test]
    fn test_truncate_to_month() {
        assert_eq!(truncate_to_month(day(2024, 3, 17)), day(2024, 3, 1));
        assert_eq!(truncate_to_month(day(2024, 3, 1)), day(2024, 3, 1));
    }
}
